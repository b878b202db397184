//! Lock-free task lifecycle state.
//!
//! Replaces ad-hoc "running" booleans with a three-phase state so observers
//! can tell a task that was asked to stop from one that has finished
//! stopping. Stored in a single `AtomicU8` for cheap cross-thread reads.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskPhase {
    Stopped = 0,
    Running = 1,
    StopRequested = 2,
}

impl TaskPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => TaskPhase::Running,
            2 => TaskPhase::StopRequested,
            _ => TaskPhase::Stopped,
        }
    }
}

#[derive(Debug)]
pub struct TaskState(AtomicU8);

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskState {
    pub fn new() -> Self {
        Self(AtomicU8::new(TaskPhase::Stopped as u8))
    }

    pub fn phase(&self) -> TaskPhase {
        TaskPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, phase: TaskPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }

    /// Ask a running task to stop. Returns false if it was not running.
    pub fn request_stop(&self) -> bool {
        self.0
            .compare_exchange(
                TaskPhase::Running as u8,
                TaskPhase::StopRequested as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn stop_requested(&self) -> bool {
        self.phase() == TaskPhase::StopRequested
    }

    pub fn is_running(&self) -> bool {
        self.phase() == TaskPhase::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_stopped() {
        let s = TaskState::new();
        assert_eq!(s.phase(), TaskPhase::Stopped);
        assert!(!s.is_running());
    }

    #[test]
    fn stop_request_only_applies_to_running() {
        let s = TaskState::new();
        assert!(!s.request_stop());
        s.set(TaskPhase::Running);
        assert!(s.request_stop());
        assert_eq!(s.phase(), TaskPhase::StopRequested);
        // Second request is a no-op.
        assert!(!s.request_stop());
    }
}
