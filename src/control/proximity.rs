//! Proximity State Machine
//!
//! Debounces range readings and runs the capture handshake when an object stays
//! close to the robot.
//!
//! # Debounce
//! A reading counts as "near" when it is a valid distance below the stop
//! distance. Consecutive near readings are counted; any other reading clears
//! the count. Reaching the threshold while running is an edge.
//!
//! # Edge Handling
//! On an edge the shared state is set to `Stop` so the steering loop halts, the
//! capture round-trip runs to completion, and then the robot is released back to
//! `Run` with a cleared count. The machine itself never stays in `Stop`, so an
//! object that does not move away triggers a new capture every threshold ticks.
//!
//! `Error` belongs to whoever injected it: while faulted nothing is committed.

use embassy_time::Duration;

use super::capture::{CaptureError, CaptureTrigger};
use crate::driver::ultrasonic::RangeReading;
use crate::system::state::{RobotState, SharedRobotState};

/// Debounce parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProximityConfig {
    /// Distances strictly below this count as near
    pub stop_distance_cm: u16,
    /// Consecutive near readings needed for an edge
    pub confirm_threshold: u8,
    /// Ranging period
    pub period: Duration,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            stop_distance_cm: 5,
            confirm_threshold: 3,
            period: Duration::from_millis(200),
        }
    }
}

/// What one reading asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transition {
    /// Commit this state
    Commit(RobotState),
    /// Run the capture handshake
    Capture,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProximityOutcome {
    /// State written without a handshake
    Committed(RobotState),
    /// A handshake ran, robot released back to `Run`
    Captured(Result<u32, CaptureError>),
    /// Robot is faulted, nothing written
    Faulted,
}

/// Debounced obstacle detector
pub struct ProximityMonitor {
    config: ProximityConfig,
    counter: u8,
    committed: RobotState,
}

impl ProximityMonitor {
    pub fn new(config: ProximityConfig) -> Self {
        Self {
            config,
            counter: 0,
            committed: RobotState::Run,
        }
    }

    pub fn config(&self) -> &ProximityConfig {
        &self.config
    }

    /// Consecutive near readings so far
    pub fn counter(&self) -> u8 {
        self.counter
    }

    /// Last committed state
    pub fn committed(&self) -> RobotState {
        self.committed
    }

    fn is_near(&self, reading: RangeReading) -> bool {
        matches!(reading, RangeReading::Distance(cm) if cm > 0 && cm < self.config.stop_distance_cm)
    }

    /// Updates the count and decides what to do, without touching shared state
    pub fn observe(&mut self, reading: RangeReading) -> Transition {
        self.counter = if self.is_near(reading) {
            self.counter.saturating_add(1)
        } else {
            0
        };

        let candidate = if self.counter >= self.config.confirm_threshold.max(1) {
            RobotState::Stop
        } else {
            RobotState::Run
        };

        if self.committed == RobotState::Run && candidate == RobotState::Stop {
            Transition::Capture
        } else {
            Transition::Commit(candidate)
        }
    }

    /// Processes one reading against the shared state
    pub async fn tick<T: CaptureTrigger>(
        &mut self,
        reading: RangeReading,
        state: &SharedRobotState,
        capture: &mut T,
    ) -> ProximityOutcome {
        if state.is_faulted() {
            self.counter = 0;
            return ProximityOutcome::Faulted;
        }

        match self.observe(reading) {
            Transition::Commit(next) => {
                self.committed = next;
                if state.commit(next) {
                    ProximityOutcome::Committed(next)
                } else {
                    ProximityOutcome::Faulted
                }
            }
            Transition::Capture => {
                info!("Object confirmed after {} readings, stopping", self.counter);
                state.commit(RobotState::Stop);

                let result = capture.request_capture().await;
                if let Err(e) = result {
                    warn!("Capture failed: {:?}", e);
                }

                self.counter = 0;
                self.committed = RobotState::Run;
                state.commit(RobotState::Run);
                ProximityOutcome::Captured(result)
            }
        }
    }
}
