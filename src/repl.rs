//! Terminal front-end.
//!
//! Reads commands from an async line source and renders store changes to an
//! async writer. Anything not starting with `/` is streamed to the agent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::client::ChatBackend;
use crate::api::types::TypewriterConfig;
use crate::chat::export::{read_export, write_export};
use crate::chat::ids::MessageId;
use crate::chat::store::{ChatStore, SharedStore, StoreEvent};
use crate::chat::types::{MessageType, Role};
use crate::settings::config::{FontSize, THEME_PRESETS, ThemeMode};
use crate::settings::store::SettingsStore;
use crate::stream::controller::ChatController;
use crate::typewriter::{TypewriterDriver, TypewriterOptions};

const HELP: &str = "\
Commands:
  <text>                     stream a message to the agent
  /plain <text>              send without streaming
  /new [title]               start a conversation
  /list                      list conversations
  /switch <n>                select conversation n
  /delete <n>                delete conversation n
  /rename <title>            rename the current conversation
  /stop                      stop the live stream
  /export [dir]              export conversations
  /import <file>             import conversations
  /clear                     delete every conversation
  /typewriter on|off [ms]    configure the typewriter
  /theme [light|dark|auto]   set or toggle the theme
  /font small|medium|large   set the font size
  /preset <name|#rrggbb>     set the primary color
  /settings                  show settings
  /settings export [dir]     export settings
  /settings import <file>    import settings
  /settings reset            restore default settings
  /health                    check the backend
  /help                      show this help
  /quit                      exit
";

/// A parsed input line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Stream a message.
    Send(String),
    /// Send without streaming.
    Plain(String),
    /// Start a conversation.
    New(Option<String>),
    /// List conversations.
    List,
    /// Select a conversation by 1-based list position.
    Switch(usize),
    /// Delete a conversation by 1-based list position.
    Delete(usize),
    /// Rename the current conversation.
    Rename(String),
    /// Stop the live stream.
    Stop,
    /// Export conversations into a directory.
    Export(Option<PathBuf>),
    /// Import conversations from a file.
    Import(PathBuf),
    /// Delete every conversation.
    Clear,
    /// Configure the typewriter.
    Typewriter {
        /// Reveal on or off.
        enabled: bool,
        /// New delay, if given.
        delay: Option<u64>,
    },
    /// Set or toggle the theme.
    Theme(Option<ThemeMode>),
    /// Set the font size.
    Font(FontSize),
    /// Set the primary color by preset name or hex value.
    Preset(String),
    /// Show settings.
    Settings,
    /// Export settings into a directory.
    SettingsExport(Option<PathBuf>),
    /// Import settings from a file.
    SettingsImport(PathBuf),
    /// Restore default settings.
    SettingsReset,
    /// Check the backend.
    Health,
    /// Show help.
    Help,
    /// Exit.
    Quit,
    /// Blank line.
    Empty,
}

impl Command {
    /// Parse one input line.
    ///
    /// # Errors
    /// Returns a usage message for malformed commands.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Empty);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Send(line.to_string()));
        };

        let (name, args) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(name, args)| (name, args.trim()));
        let path = |args: &str| (!args.is_empty()).then(|| PathBuf::from(args));

        match name {
            "plain" if !args.is_empty() => Ok(Self::Plain(args.to_string())),
            "plain" => Err("usage: /plain <text>".to_string()),
            "new" => Ok(Self::New((!args.is_empty()).then(|| args.to_string()))),
            "list" | "ls" => Ok(Self::List),
            "switch" => parse_position(args).map(Self::Switch),
            "delete" => parse_position(args).map(Self::Delete),
            "rename" if !args.is_empty() => Ok(Self::Rename(args.to_string())),
            "rename" => Err("usage: /rename <title>".to_string()),
            "stop" => Ok(Self::Stop),
            "export" => Ok(Self::Export(path(args))),
            "import" => path(args)
                .map(Self::Import)
                .ok_or_else(|| "usage: /import <file>".to_string()),
            "clear" => Ok(Self::Clear),
            "typewriter" => parse_typewriter(args),
            "theme" => match args {
                "" => Ok(Self::Theme(None)),
                "light" => Ok(Self::Theme(Some(ThemeMode::Light))),
                "dark" => Ok(Self::Theme(Some(ThemeMode::Dark))),
                "auto" => Ok(Self::Theme(Some(ThemeMode::Auto))),
                _ => Err("usage: /theme [light|dark|auto]".to_string()),
            },
            "font" => match args {
                "small" => Ok(Self::Font(FontSize::Small)),
                "medium" => Ok(Self::Font(FontSize::Medium)),
                "large" => Ok(Self::Font(FontSize::Large)),
                _ => Err("usage: /font small|medium|large".to_string()),
            },
            "preset" if !args.is_empty() => Ok(Self::Preset(args.to_string())),
            "preset" => Err("usage: /preset <name|#rrggbb>".to_string()),
            "settings" => {
                let (action, target) = args
                    .split_once(char::is_whitespace)
                    .map_or((args, ""), |(action, target)| (action, target.trim()));
                match action {
                    "" => Ok(Self::Settings),
                    "export" => Ok(Self::SettingsExport(path(target))),
                    "import" => path(target)
                        .map(Self::SettingsImport)
                        .ok_or_else(|| "usage: /settings import <file>".to_string()),
                    "reset" => Ok(Self::SettingsReset),
                    _ => Err("usage: /settings [export|import|reset]".to_string()),
                }
            }
            "health" => Ok(Self::Health),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command /{other}, try /help")),
        }
    }
}

fn parse_position(args: &str) -> Result<usize, String> {
    match args.parse::<usize>() {
        Ok(position) if position > 0 => Ok(position),
        _ => Err("expected a conversation number from /list".to_string()),
    }
}

fn parse_typewriter(args: &str) -> Result<Command, String> {
    let mut parts = args.split_whitespace();
    let enabled = match parts.next() {
        Some("on") => true,
        Some("off") => false,
        _ => return Err("usage: /typewriter on|off [ms]".to_string()),
    };
    let delay = parts
        .next()
        .map(|raw| raw.parse::<u64>().map_err(|_| "delay must be in milliseconds".to_string()))
        .transpose()?;
    Ok(Command::Typewriter { enabled, delay })
}

/// Print streamed text as it arrives.
pub fn spawn_renderer<W>(
    store: SharedStore,
    mut events: broadcast::Receiver<StoreEvent>,
    mut output: W,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut renderer = Renderer::default();
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Renderer lagged behind store events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let text = renderer.render(&*store.lock().await, &event);
            if let Some(text) = text {
                if output.write_all(text.as_bytes()).await.is_err() {
                    break;
                }
                let _ = output.flush().await;
            }
        }
    })
}

/// Turns store events into terminal text.
///
/// Tracks how much of each message was already written so only the new
/// suffix is printed.
#[derive(Debug, Default)]
struct Renderer {
    printed: HashMap<MessageId, usize>,
    last_error: Option<String>,
}

impl Renderer {
    fn render(&mut self, store: &ChatStore, event: &StoreEvent) -> Option<String> {
        match event {
            StoreEvent::MessageAppended { message_id, .. } => {
                let message = store.message(message_id)?;
                (message.message_type == MessageType::ToolActivity)
                    .then(|| format!("\n  [tool] {}\n", message.content))
            }
            StoreEvent::MessageUpdated {
                message_id,
                is_complete,
                ..
            } => {
                let message = store.message(message_id)?;
                if message.role != Role::Assistant {
                    return None;
                }
                let already = self.printed.entry(*message_id).or_insert(0);
                let mut text = match message.content.get(*already..) {
                    Some(fresh) => fresh.to_string(),
                    None => format!("\n{}", message.content),
                };
                *already = message.content.len();
                if *is_complete {
                    self.printed.remove(message_id);
                    text.push('\n');
                }
                (!text.is_empty()).then_some(text)
            }
            StoreEvent::StatusChanged => {
                let error = store.error().map(ToString::to_string);
                if error == self.last_error {
                    return None;
                }
                self.last_error.clone_from(&error);
                error.map(|error| format!("\n! {error}\n"))
            }
            _ => None,
        }
    }
}

/// Output of one command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Status text.
    Text(String),
    /// A complete agent reply, revealed through the typewriter when enabled.
    Agent(String),
}

fn text(message: impl Into<String>) -> Option<Reply> {
    Some(Reply::Text(message.into()))
}

/// Interactive session over the controller and settings.
pub struct Repl {
    controller: Arc<ChatController>,
    backend: Arc<dyn ChatBackend>,
    settings: SettingsStore,
}

impl Repl {
    /// Build a session.
    #[must_use]
    pub fn new(
        controller: Arc<ChatController>,
        backend: Arc<dyn ChatBackend>,
        settings: SettingsStore,
    ) -> Self {
        Self {
            controller,
            backend,
            settings,
        }
    }

    /// Read commands until `/quit` or end of input.
    ///
    /// # Errors
    /// Returns an error if reading input or writing output fails.
    pub async fn run<R, W>(mut self, input: R, mut output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        output
            .write_all(b"agent-chat ready, /help for commands\n")
            .await?;
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await.context("reading input")? {
            let reply = match Command::parse(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => self.execute(command).await,
                Err(usage) => Some(Reply::Text(usage)),
            };
            match reply {
                Some(Reply::Agent(answer)) => {
                    let typewriter = self.settings.preferences().agent.typewriter;
                    if typewriter.enabled {
                        reveal(&answer, typewriter.delay, &mut output).await?;
                    } else {
                        output.write_all(answer.as_bytes()).await?;
                    }
                }
                Some(Reply::Text(message)) => output.write_all(message.as_bytes()).await?,
                None => continue,
            }
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        self.controller.stop().await;
        Ok(())
    }

    /// Run one command.
    pub async fn execute(&mut self, command: Command) -> Option<Reply> {
        let store = self.controller.store();
        match command {
            Command::Send(message) => {
                let current = store.lock().await.current_conversation_id();
                self.controller.send_stream(&message, current).await;
                None
            }
            Command::Plain(message) => {
                let current = store.lock().await.current_conversation_id();
                self.controller.send(&message, current).await;
                let store = store.lock().await;
                if let Some(error) = store.error() {
                    return text(format!("! {error}"));
                }
                store
                    .current_messages()
                    .last()
                    .filter(|m| m.role == Role::Assistant)
                    .map(|m| Reply::Agent(m.content.clone()))
            }
            Command::New(title) => {
                let id = store.lock().await.create_conversation(title.as_deref());
                text(format!("Started conversation {id}"))
            }
            Command::List => text(list(&*store.lock().await)),
            Command::Switch(position) => {
                let mut store = store.lock().await;
                let id = store
                    .conversation_list()
                    .get(position.checked_sub(1)?)
                    .map(|c| c.id)?;
                store.switch_conversation(&id);
                let title = store.conversation(&id).map(|c| c.title.clone())?;
                text(format!("Switched to {title}"))
            }
            Command::Delete(position) => {
                let mut store = store.lock().await;
                let id = store
                    .conversation_list()
                    .get(position.checked_sub(1)?)
                    .map(|c| c.id)?;
                store.delete_conversation(&id);
                text("Deleted")
            }
            Command::Rename(title) => {
                let mut store = store.lock().await;
                let id = store.current_conversation_id()?;
                store.rename_conversation(&id, &title);
                text(format!("Renamed to {title}"))
            }
            Command::Stop => {
                self.controller.stop().await;
                text("Stopped")
            }
            Command::Export(dir) => {
                let data = store.lock().await.export_snapshot();
                let dir = dir.unwrap_or_else(|| PathBuf::from("."));
                text(write_export(&dir, &data).await.map_or_else(
                    || "Export failed, see log".to_string(),
                    |path| format!("Exported to {}", path.display()),
                ))
            }
            Command::Import(path) => text(match read_export(&path).await {
                Ok(data) => {
                    let count = store.lock().await.import_conversations(data);
                    format!("Imported {count} conversations")
                }
                Err(err) => format!("Import failed: {err}"),
            }),
            Command::Clear => {
                self.controller.stop().await;
                store.lock().await.clear_all_conversations();
                text("All conversations deleted")
            }
            Command::Typewriter { enabled, delay } => {
                let previous = self.settings.preferences().agent.typewriter;
                let config = TypewriterConfig {
                    enabled,
                    delay: delay.unwrap_or(previous.delay),
                };
                let result = self
                    .settings
                    .update_typewriter_config(self.backend.as_ref(), config)
                    .await;
                text(match result {
                    Ok(()) => format!("Typewriter {} ({} ms)", on_off(enabled), config.delay),
                    Err(err) => format!("Typewriter update failed: {err}"),
                })
            }
            Command::Theme(mode) => {
                let mode = match mode {
                    Some(mode) => {
                        self.settings.set_theme(mode).await;
                        mode
                    }
                    None => self.settings.toggle_theme().await,
                };
                text(format!("Theme {mode:?}"))
            }
            Command::Font(size) => {
                self.settings.set_font_size(size).await;
                text(format!("Font {size:?} (x{})", size.multiplier()))
            }
            Command::Preset(name) => {
                let color = THEME_PRESETS
                    .iter()
                    .find(|preset| preset.name.eq_ignore_ascii_case(&name))
                    .map_or(name.as_str(), |preset| preset.color)
                    .to_string();
                let patch = serde_json::json!({ "theme": { "primaryColor": color } });
                if self.settings.import_config(&patch).await {
                    text(format!("Primary color {color}"))
                } else {
                    text(format!("Unknown preset {name}"))
                }
            }
            Command::Settings => text(
                serde_json::to_string_pretty(self.settings.preferences())
                    .unwrap_or_else(|err| format!("Cannot show settings: {err}")),
            ),
            Command::SettingsExport(dir) => {
                let dir = dir.unwrap_or_else(|| PathBuf::from("."));
                text(match self.settings.export_config().write_to(&dir).await {
                    Ok(path) => format!("Settings exported to {}", path.display()),
                    Err(err) => {
                        warn!(error = %err, "Settings export failed");
                        format!("Settings export failed: {err}")
                    }
                })
            }
            Command::SettingsImport(path) => {
                let parsed = match tokio::fs::read_to_string(&path).await {
                    Ok(json) => serde_json::from_str::<serde_json::Value>(&json)
                        .map_err(|err| err.to_string()),
                    Err(err) => Err(err.to_string()),
                };
                text(match parsed {
                    Ok(value) if self.settings.import_config(&value).await => {
                        "Settings imported".to_string()
                    }
                    Ok(_) => "Settings file rejected".to_string(),
                    Err(err) => format!("Settings import failed: {err}"),
                })
            }
            Command::SettingsReset => {
                self.settings.reset_to_defaults().await;
                text("Settings reset")
            }
            Command::Health => text(match self.backend.health().await {
                Ok(status) => format!("Backend: {status}"),
                Err(err) => format!("Backend unreachable: {}", err.user_message()),
            }),
            Command::Help => text(HELP.trim_end()),
            Command::Quit | Command::Empty => None,
        }
    }
}

fn list(store: &ChatStore) -> String {
    let current = store.current_conversation_id();
    let conversations = store.conversation_list();
    if conversations.is_empty() {
        return "No conversations".to_string();
    }
    conversations
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let marker = if Some(c.id) == current { '*' } else { ' ' };
            format!("{marker} {}. {} ({} messages)", i + 1, c.title, c.messages.len())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

const fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

/// Play `answer` through a typewriter into `output`.
async fn reveal<W>(answer: &str, delay_ms: u64, output: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if answer.is_empty() {
        return Ok(());
    }
    let options = TypewriterOptions::default()
        .with_speed(Duration::from_millis(delay_ms.max(1)))
        .with_cursor(false);
    let driver = TypewriterDriver::spawn(answer, options);
    let mut views = driver.subscribe();
    let mut shown = 0;
    loop {
        let view = views.borrow_and_update().clone();
        if let Some(fresh) = view.displayed.get(shown..) {
            output.write_all(fresh.as_bytes()).await?;
            output.flush().await?;
        }
        shown = view.displayed.len();
        if view.is_complete || views.changed().await.is_err() {
            return Ok(());
        }
    }
}
