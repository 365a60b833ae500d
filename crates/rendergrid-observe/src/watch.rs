//! TaskWatch — the per-pool progress/stall state machine.
//!
//! Pure over explicit `Instant`s so stall timing is testable without
//! sleeping. Two states: waiting for a task, or tracking one task's
//! progress. A progress percentage that does not change for longer than
//! the stall timeout counts as a failure; any change resets the clock.

use std::time::{Duration, Instant};

use crate::classifier::LineEvent;

/// Terminal outcome of a watched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug)]
enum WatchState {
    WaitingForTask,
    TaskInProgress {
        last_percent: Option<f64>,
        last_change: Instant,
    },
}

/// Tracks one pool's task through classified log events.
#[derive(Debug)]
pub struct TaskWatch {
    state: WatchState,
    stall_timeout: Duration,
}

impl TaskWatch {
    pub fn new(stall_timeout: Duration) -> Self {
        Self {
            state: WatchState::WaitingForTask,
            stall_timeout,
        }
    }

    /// Whether a task is currently in progress.
    pub fn in_progress(&self) -> bool {
        matches!(self.state, WatchState::TaskInProgress { .. })
    }

    /// When the current task will count as stalled, if one is in progress.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            WatchState::TaskInProgress { last_change, .. } => {
                Some(*last_change + self.stall_timeout)
            }
            WatchState::WaitingForTask => None,
        }
    }

    /// Feed one classified event. Returns a terminal outcome when the event
    /// ends the task; the watch returns to waiting in that case.
    pub fn observe(&mut self, event: LineEvent, now: Instant) -> Option<TaskOutcome> {
        match event {
            LineEvent::TaskStart => {
                self.state = WatchState::TaskInProgress {
                    last_percent: None,
                    last_change: now,
                };
                None
            }
            LineEvent::Success => {
                self.state = WatchState::WaitingForTask;
                Some(TaskOutcome::Succeeded)
            }
            LineEvent::Error => {
                self.state = WatchState::WaitingForTask;
                Some(TaskOutcome::Failed)
            }
            LineEvent::Progress(percent) => self.observe_progress(percent, now),
            LineEvent::Other => None,
        }
    }

    fn observe_progress(&mut self, percent: f64, now: Instant) -> Option<TaskOutcome> {
        let WatchState::TaskInProgress {
            last_percent,
            last_change,
        } = &mut self.state
        else {
            // Progress with no task started: nothing to track.
            return None;
        };

        if *last_percent == Some(percent) {
            if now.duration_since(*last_change) > self.stall_timeout {
                self.state = WatchState::WaitingForTask;
                return Some(TaskOutcome::Failed);
            }
        } else {
            *last_percent = Some(percent);
            *last_change = now;
        }
        None
    }

    /// Time-driven stall check, for when the log goes quiet entirely.
    pub fn check_stall(&mut self, now: Instant) -> Option<TaskOutcome> {
        if let WatchState::TaskInProgress { last_change, .. } = &self.state
            && now.duration_since(*last_change) >= self.stall_timeout
        {
            self.state = WatchState::WaitingForTask;
            return Some(TaskOutcome::Failed);
        }
        None
    }
}
