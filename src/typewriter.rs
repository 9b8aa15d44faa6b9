//! Character-by-character reveal of assistant text.
//!
//! [`Typewriter`] is the pure state: every timer event is a method call.
//! [`TypewriterDriver`] runs it on tokio timers and publishes snapshots over a
//! `watch` channel. The driver task is aborted when the driver is dropped.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::debug;

/// Reveal options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypewriterOptions {
    /// Delay between characters.
    pub speed: Duration,
    /// Start typing as soon as there is text.
    pub auto_start: bool,
    /// Append a cursor while typing.
    pub show_cursor: bool,
    /// Cursor character.
    pub cursor_char: char,
    /// Cursor blink period.
    pub blink_interval: Duration,
    /// Replay the text after it completes.
    pub repeat: bool,
    /// Pause between the end of a reveal and the replay.
    pub repeat_pause: Duration,
}

impl Default for TypewriterOptions {
    fn default() -> Self {
        Self {
            speed: Duration::from_millis(50),
            auto_start: true,
            show_cursor: true,
            cursor_char: '|',
            blink_interval: Duration::from_millis(500),
            repeat: false,
            repeat_pause: Duration::from_secs(2),
        }
    }
}

impl TypewriterOptions {
    /// Set the per-character delay.
    #[must_use]
    pub const fn with_speed(mut self, speed: Duration) -> Self {
        self.speed = speed;
        self
    }

    /// Enable or disable auto start.
    #[must_use]
    pub const fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Show or hide the cursor.
    #[must_use]
    pub const fn with_cursor(mut self, show_cursor: bool) -> Self {
        self.show_cursor = show_cursor;
        self
    }

    /// Replay the text `pause` after each completed reveal.
    #[must_use]
    pub const fn with_repeat(mut self, pause: Duration) -> Self {
        self.repeat = true;
        self.repeat_pause = pause;
        self
    }
}

/// Reveal state for one target text.
#[derive(Clone, Debug)]
pub struct Typewriter {
    options: TypewriterOptions,
    target: Vec<char>,
    displayed: String,
    index: usize,
    typing: bool,
    complete: bool,
    cursor_visible: bool,
}

impl Typewriter {
    /// New typewriter; starts right away when auto start is on and `text` is not empty.
    #[must_use]
    pub fn new(text: &str, options: TypewriterOptions) -> Self {
        let mut typewriter = Self {
            options,
            target: text.chars().collect(),
            displayed: String::new(),
            index: 0,
            typing: false,
            complete: false,
            cursor_visible: true,
        };
        if options.auto_start && !text.is_empty() {
            typewriter.start();
        }
        typewriter
    }

    /// Options in use.
    #[must_use]
    pub const fn options(&self) -> &TypewriterOptions {
        &self.options
    }

    /// Restart from the first character. No-op while typing.
    pub fn start(&mut self) {
        if self.typing {
            return;
        }
        self.typing = true;
        self.complete = false;
        self.index = 0;
        self.displayed.clear();
        self.cursor_visible = true;
        self.advance();
    }

    /// Reveal the next character; called once per `speed`.
    pub fn tick(&mut self) {
        if self.typing {
            self.advance();
        }
    }

    fn advance(&mut self) {
        if let Some(&next) = self.target.get(self.index) {
            self.displayed.push(next);
            self.index += 1;
        } else {
            self.typing = false;
            self.complete = true;
            self.cursor_visible = true;
        }
    }

    /// Toggle the cursor; called once per blink interval.
    pub fn blink(&mut self) {
        if self.typing && self.options.show_cursor {
            self.cursor_visible = !self.cursor_visible;
        }
    }

    /// Pause where it is.
    pub fn stop(&mut self) {
        self.typing = false;
        self.cursor_visible = true;
    }

    /// Clear everything revealed so far.
    pub fn reset(&mut self) {
        self.stop();
        self.displayed.clear();
        self.index = 0;
        self.complete = false;
    }

    /// Jump to the full text.
    pub fn complete(&mut self) {
        self.stop();
        self.displayed = self.target.iter().collect();
        self.index = self.target.len();
        self.complete = true;
    }

    /// Replace the target text. With auto start, a different text restarts
    /// the reveal from the beginning.
    pub fn retarget(&mut self, text: &str) {
        if self.target.iter().copied().eq(text.chars()) {
            return;
        }
        self.target = text.chars().collect();
        if self.options.auto_start {
            self.reset();
            self.start();
        }
    }

    /// Text revealed so far.
    #[must_use]
    pub fn displayed(&self) -> &str {
        &self.displayed
    }

    /// Revealed text plus the cursor when it should show.
    #[must_use]
    pub fn text_with_cursor(&self) -> String {
        let mut text = self.displayed.clone();
        if self.options.show_cursor && (self.typing || !self.complete) && self.cursor_visible {
            text.push(self.options.cursor_char);
        }
        text
    }

    /// Characters are still being revealed.
    #[must_use]
    pub const fn is_typing(&self) -> bool {
        self.typing
    }

    /// The full text has been revealed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    /// Cursor blink state.
    #[must_use]
    pub const fn cursor_visible(&self) -> bool {
        self.cursor_visible
    }
}

/// Snapshot published by the driver.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypewriterView {
    /// Text revealed so far.
    pub displayed: String,
    /// Revealed text plus cursor.
    pub text_with_cursor: String,
    /// Characters are still being revealed.
    pub is_typing: bool,
    /// The full text has been revealed.
    pub is_complete: bool,
}

impl From<&Typewriter> for TypewriterView {
    fn from(typewriter: &Typewriter) -> Self {
        Self {
            displayed: typewriter.displayed().to_string(),
            text_with_cursor: typewriter.text_with_cursor(),
            is_typing: typewriter.is_typing(),
            is_complete: typewriter.is_complete(),
        }
    }
}

/// Commands accepted by the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypewriterCommand {
    /// Restart the reveal.
    Start,
    /// Pause.
    Stop,
    /// Clear.
    Reset,
    /// Reveal everything now.
    Complete,
    /// Replace the target text.
    Retarget(String),
}

/// Runs a [`Typewriter`] on tokio timers.
pub struct TypewriterDriver {
    commands: mpsc::UnboundedSender<TypewriterCommand>,
    view: watch::Receiver<TypewriterView>,
    handle: JoinHandle<()>,
}

impl TypewriterDriver {
    /// Spawn a driver for `text`.
    #[must_use]
    pub fn spawn(text: &str, options: TypewriterOptions) -> Self {
        let state = Typewriter::new(text, options);
        let (view_tx, view) = watch::channel(TypewriterView::from(&state));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(drive(state, command_rx, view_tx));
        Self {
            commands,
            view,
            handle,
        }
    }

    /// Send a command. Returns `false` once the driver task is gone.
    pub fn send(&self, command: TypewriterCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Replace the target text.
    pub fn retarget(&self, text: impl Into<String>) -> bool {
        self.send(TypewriterCommand::Retarget(text.into()))
    }

    /// Latest snapshot.
    #[must_use]
    pub fn view(&self) -> TypewriterView {
        self.view.borrow().clone()
    }

    /// Receiver notified on every snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TypewriterView> {
        self.view.clone()
    }
}

impl Drop for TypewriterDriver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn drive(
    mut state: Typewriter,
    mut commands: mpsc::UnboundedReceiver<TypewriterCommand>,
    view: watch::Sender<TypewriterView>,
) {
    let options = *state.options();
    let mut typing = interval_at(Instant::now() + options.speed, options.speed);
    typing.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut blinking = interval_at(
        Instant::now() + options.blink_interval,
        options.blink_interval,
    );
    blinking.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Only a reveal finished by ticking schedules a replay.
    let mut replay_at: Option<Instant> = None;

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("Typewriter driver shutting down");
                    break;
                };
                replay_at = None;
                let restarts = matches!(
                    command,
                    TypewriterCommand::Start | TypewriterCommand::Retarget(_)
                );
                match command {
                    TypewriterCommand::Start => state.start(),
                    TypewriterCommand::Stop => state.stop(),
                    TypewriterCommand::Reset => state.reset(),
                    TypewriterCommand::Complete => state.complete(),
                    TypewriterCommand::Retarget(text) => state.retarget(&text),
                }
                if restarts && state.is_typing() {
                    typing.reset();
                    blinking.reset();
                }
            }
            _ = typing.tick(), if state.is_typing() => {
                state.tick();
                if options.repeat && state.is_complete() {
                    replay_at = Some(Instant::now() + options.repeat_pause);
                }
            }
            _ = blinking.tick(), if state.is_typing() => state.blink(),
            () = sleep_until(replay_at.unwrap_or_else(Instant::now)), if replay_at.is_some() => {
                replay_at = None;
                state.start();
                typing.reset();
                blinking.reset();
            }
        }
        view.send_replace(TypewriterView::from(&state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> TypewriterOptions {
        TypewriterOptions::default()
    }

    #[test]
    fn test_auto_start_reveals_first_character() {
        let typewriter = Typewriter::new("Hi", options());
        assert_eq!(typewriter.displayed(), "H");
        assert!(typewriter.is_typing());
        assert_eq!(typewriter.text_with_cursor(), "H|");

        let idle = Typewriter::new("Hi", options().with_auto_start(false));
        assert_eq!(idle.displayed(), "");
        assert!(!idle.is_typing());
    }

    #[test]
    fn test_ticks_reveal_then_complete() {
        let mut typewriter = Typewriter::new("Héllo", options());
        for _ in 0..4 {
            typewriter.tick();
        }
        assert_eq!(typewriter.displayed(), "Héllo");
        assert!(!typewriter.is_complete());

        typewriter.tick();
        assert!(typewriter.is_complete());
        assert!(!typewriter.is_typing());
        assert_eq!(typewriter.text_with_cursor(), "Héllo");
    }

    #[test]
    fn test_blink_only_while_typing() {
        let mut typewriter = Typewriter::new("abc", options());
        typewriter.blink();
        assert!(!typewriter.cursor_visible());
        assert_eq!(typewriter.text_with_cursor(), "a");

        typewriter.stop();
        assert!(typewriter.cursor_visible());
        typewriter.blink();
        assert!(typewriter.cursor_visible());
        // Stopped but not complete: cursor still shown.
        assert_eq!(typewriter.text_with_cursor(), "a|");
    }

    #[test]
    fn test_complete_and_reset() {
        let mut typewriter = Typewriter::new("abc", options());
        typewriter.complete();
        assert_eq!(typewriter.displayed(), "abc");
        assert!(typewriter.is_complete());

        typewriter.reset();
        assert_eq!(typewriter.displayed(), "");
        assert!(!typewriter.is_complete());
        assert!(!typewriter.is_typing());
    }

    #[test]
    fn test_retarget_restarts_with_auto_start() {
        let mut typewriter = Typewriter::new("first", options());
        typewriter.tick();
        typewriter.retarget("first");
        assert_eq!(typewriter.displayed(), "fi");

        typewriter.retarget("second");
        assert_eq!(typewriter.displayed(), "s");
        assert!(typewriter.is_typing());

        let mut manual = Typewriter::new("one", options().with_auto_start(false));
        manual.retarget("two");
        assert_eq!(manual.displayed(), "");
        manual.start();
        assert_eq!(manual.displayed(), "t");
    }

    #[test]
    fn test_hidden_cursor() {
        let typewriter = Typewriter::new("abc", options().with_cursor(false));
        assert_eq!(typewriter.text_with_cursor(), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_reveals_on_cadence() {
        let driver = TypewriterDriver::spawn("Hello", options());
        assert_eq!(driver.view().displayed, "H");

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(driver.view().displayed, "He");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(driver.view().displayed, "Hello");

        tokio::time::sleep(Duration::from_millis(100)).await;
        let view = driver.view();
        assert!(view.is_complete);
        assert!(!view.is_typing);
        assert_eq!(view.text_with_cursor, "Hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_commands() {
        let driver = TypewriterDriver::spawn("Hello there", options());
        let mut views = driver.subscribe();

        assert!(driver.send(TypewriterCommand::Complete));
        views.changed().await.unwrap();
        assert_eq!(driver.view().displayed, "Hello there");
        assert!(driver.view().is_complete);

        assert!(driver.retarget("Bye"));
        views.changed().await.unwrap();
        assert_eq!(driver.view().displayed, "B");
        assert!(driver.view().is_typing);

        tokio::time::sleep(Duration::from_millis(160)).await;
        assert_eq!(driver.view().displayed, "Bye");
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_replays_after_pause() {
        let options = options().with_repeat(Duration::from_secs(2));
        let driver = TypewriterDriver::spawn("Hi", options);

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(driver.view().is_complete);
        assert_eq!(driver.view().displayed, "Hi");

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(driver.view().is_complete);

        tokio::time::sleep(Duration::from_millis(120)).await;
        let view = driver.view();
        assert_eq!(view.displayed, "H");
        assert!(view.is_typing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_command_does_not_replay() {
        let options = options().with_repeat(Duration::from_millis(100));
        let driver = TypewriterDriver::spawn("Hello", options);
        let mut views = driver.subscribe();

        assert!(driver.send(TypewriterCommand::Complete));
        views.changed().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(driver.view().displayed, "Hello");
        assert!(driver.view().is_complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_driver() {
        let driver = TypewriterDriver::spawn("Hello", options());
        let mut views = driver.subscribe();
        drop(driver);
        tokio::task::yield_now().await;
        assert!(views.changed().await.is_err());
    }
}
