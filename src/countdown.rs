//! Confirmation countdown.
//!
//! Gives the wearer a fixed number of one-second ticks to cancel a detected
//! fall before it is confirmed. The timer knows nothing about episodes; the
//! engine starts it on a fall edge and reacts to its expiry.

use serde::{Deserialize, Serialize};

/// Configuration for the confirmation countdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownConfig {
    /// Number of ticks before confirmation.
    pub ticks: u8,
    /// Tick period in milliseconds. The engine counts ticks; the monitor
    /// uses this to drive them.
    pub tick_interval_ms: u64,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            ticks: 10,
            tick_interval_ms: 1000,
        }
    }
}

/// Phase of the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TimerPhase {
    #[default]
    Idle,
    CountingDown { remaining: u8 },
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No countdown was running.
    Idle,
    /// Countdown still running with this many ticks left.
    Remaining(u8),
    /// The last tick elapsed. The timer is idle again.
    Expired,
}

/// Cancellable countdown state machine.
#[derive(Debug, Clone)]
pub struct ConfirmationTimer {
    ticks: u8,
    phase: TimerPhase,
}

impl ConfirmationTimer {
    pub fn new(config: &CountdownConfig) -> Self {
        Self {
            ticks: config.ticks.max(1),
            phase: TimerPhase::Idle,
        }
    }

    /// Start counting down. Returns false (and changes nothing) when a
    /// countdown is already running.
    pub fn start(&mut self) -> bool {
        if self.is_active() {
            return false;
        }
        self.phase = TimerPhase::CountingDown {
            remaining: self.ticks,
        };
        true
    }

    /// Advance by one tick.
    pub fn tick(&mut self) -> TickOutcome {
        match self.phase {
            TimerPhase::Idle => TickOutcome::Idle,
            TimerPhase::CountingDown { remaining } => {
                let remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    self.phase = TimerPhase::Idle;
                    TickOutcome::Expired
                } else {
                    self.phase = TimerPhase::CountingDown { remaining };
                    TickOutcome::Remaining(remaining)
                }
            }
        }
    }

    /// Stop the countdown. Returns true if one was running.
    pub fn cancel(&mut self) -> bool {
        let was_active = self.is_active();
        self.phase = TimerPhase::Idle;
        was_active
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, TimerPhase::CountingDown { .. })
    }

    /// Ticks left, or `None` when idle.
    pub fn remaining(&self) -> Option<u8> {
        match self.phase {
            TimerPhase::Idle => None,
            TimerPhase::CountingDown { remaining } => Some(remaining),
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }
}
