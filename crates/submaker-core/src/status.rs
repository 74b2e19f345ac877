//! Status line shown under the subtitle menu.

use crate::timers::{TimerCommand, TimerSet};

/// Visual tone of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    /// Neutral progress information.
    Info,
    /// Completed action.
    Success,
    /// Something needs attention but nothing failed.
    Warning,
    /// Failed action.
    Error,
}

/// One status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    /// Text to display.
    pub text: String,
    /// Tone.
    pub tone: StatusTone,
    /// Persistent messages stay until replaced; others clear themselves.
    pub persistent: bool,
}

impl StatusMessage {
    /// Transient message.
    #[must_use]
    pub fn transient(text: impl Into<String>, tone: StatusTone) -> Self {
        Self {
            text: text.into(),
            tone,
            persistent: false,
        }
    }

    /// Message that stays until superseded.
    #[must_use]
    pub fn persistent(text: impl Into<String>, tone: StatusTone) -> Self {
        Self {
            text: text.into(),
            tone,
            persistent: true,
        }
    }
}

/// Single timer of the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusClear;

/// Current message plus its auto-clear timer.
#[derive(Debug)]
pub struct StatusLine {
    current: Option<StatusMessage>,
    clear_after_ms: u64,
    timers: TimerSet<StatusClear>,
}

impl StatusLine {
    /// Status line clearing transient messages after `clear_after_ms`.
    #[must_use]
    pub fn new(clear_after_ms: u64) -> Self {
        Self {
            current: None,
            clear_after_ms,
            timers: TimerSet::default(),
        }
    }

    /// Message on screen.
    #[must_use]
    pub const fn current(&self) -> Option<&StatusMessage> {
        self.current.as_ref()
    }

    /// Whether the auto-clear timer is armed.
    #[must_use]
    pub fn has_timer(&self) -> bool {
        !self.timers.is_empty()
    }

    /// Replace the message; transient ones arm the clear timer.
    pub fn set(
        &mut self,
        message: StatusMessage,
        now_ms: u64,
    ) -> Option<TimerCommand<StatusClear>> {
        let command = if message.persistent {
            self.timers.disarm(&StatusClear)
        } else {
            Some(self.timers.arm(StatusClear, now_ms, self.clear_after_ms))
        };
        self.current = Some(message);
        command
    }

    /// Clear timer expired. Returns `true` when a message was removed.
    pub fn on_timer(&mut self) -> bool {
        if !self.timers.fire(&StatusClear) {
            return false;
        }
        self.current.take().is_some()
    }

    /// Remove the message and its timer.
    pub fn clear(&mut self) -> Option<TimerCommand<StatusClear>> {
        self.current = None;
        self.timers.disarm(&StatusClear)
    }
}
