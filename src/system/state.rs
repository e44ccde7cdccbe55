//! Robot State Management
//!
//! Holds the one piece of state shared between the control tasks: whether the
//! robot is allowed to drive.
//!
//! # State Components
//! - `Run`: line following is active
//! - `Stop`: motors are held stopped (set while a capture handshake is in flight)
//! - `Error`: motors are held stopped until an external reset
//!
//! # Access Pattern
//! The proximity task writes, the line-follow task reads. The value is a single
//! atomic byte, so every read sees a whole state and no lock is held across the
//! busy-wait sensor reads.
//! ```rust,ignore
//! let state = ROBOT_STATE.get();
//! ROBOT_STATE.set(RobotState::Stop);
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

/// Global robot state, `Run` at power-up
pub static ROBOT_STATE: SharedRobotState = SharedRobotState::new(RobotState::Run);

/// Robot drive permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RobotState {
    /// Line following active
    Run = 0,
    /// Stopped, waiting for the capture handshake to finish
    Stop = 1,
    /// Stopped until externally reset
    Error = 2,
}

impl From<u8> for RobotState {
    /// Unknown raw values are treated as `Error` so they always stop the motors
    fn from(raw: u8) -> Self {
        match raw {
            0 => RobotState::Run,
            1 => RobotState::Stop,
            _ => RobotState::Error,
        }
    }
}

/// Atomic cell holding a [`RobotState`]
pub struct SharedRobotState {
    raw: AtomicU8,
}

impl SharedRobotState {
    /// Creates a cell with the given initial state
    pub const fn new(initial: RobotState) -> Self {
        Self {
            raw: AtomicU8::new(initial as u8),
        }
    }

    /// Current state
    pub fn get(&self) -> RobotState {
        RobotState::from(self.raw.load(Ordering::Acquire))
    }

    /// Overwrites the state
    pub fn set(&self, state: RobotState) {
        self.raw.store(state as u8, Ordering::Release);
    }

    /// Writes `state` unless the robot is in `Error`.
    ///
    /// Returns false if the fault kept the write from happening.
    pub fn commit(&self, state: RobotState) -> bool {
        self.raw
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (RobotState::from(raw) != RobotState::Error).then_some(state as u8)
            })
            .is_ok()
    }

    /// Moves the robot into `Error`. Nothing inside the core calls this.
    pub fn inject_fault(&self) {
        warn!("Fault injected, robot halted");
        self.set(RobotState::Error);
    }

    /// Clears `Error` back to `Run`. Other states are left alone.
    ///
    /// Returns true if the state was reset.
    pub fn reset(&self) -> bool {
        let reset = self
            .raw
            .compare_exchange(
                RobotState::Error as u8,
                RobotState::Run as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if reset {
            info!("Robot state reset to Run");
        }
        reset
    }

    /// Is the robot currently in `Error`?
    pub fn is_faulted(&self) -> bool {
        self.get() == RobotState::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_requested_state() {
        let state = SharedRobotState::new(RobotState::Run);
        assert_eq!(state.get(), RobotState::Run);
    }

    #[test]
    fn unknown_raw_value_reads_as_error() {
        assert_eq!(RobotState::from(7), RobotState::Error);
        assert_eq!(RobotState::from(1), RobotState::Stop);
    }

    #[test]
    fn fault_is_sticky_until_reset() {
        let state = SharedRobotState::new(RobotState::Run);
        state.inject_fault();
        assert!(state.is_faulted());

        assert!(state.reset());
        assert_eq!(state.get(), RobotState::Run);
    }

    #[test]
    fn commit_never_overwrites_error() {
        let state = SharedRobotState::new(RobotState::Run);
        assert!(state.commit(RobotState::Stop));
        assert_eq!(state.get(), RobotState::Stop);

        state.inject_fault();
        assert!(!state.commit(RobotState::Run));
        assert!(state.is_faulted());
    }

    #[test]
    fn reset_leaves_stop_alone() {
        let state = SharedRobotState::new(RobotState::Stop);
        assert!(!state.reset());
        assert_eq!(state.get(), RobotState::Stop);
    }
}
