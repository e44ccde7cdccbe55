//! Steering Controller
//!
//! PD controller turning the line position into a differential duty pair.
//!
//! # Control Law
//! - `error = position - center`
//! - `correction = Kp * error + Kd * (error - previous_error)`
//! - `left = base - correction`, `right = base + correction`, clamped to `[0, max]`
//!
//! A positive error raises the right duty and lowers the left one. Which way
//! that turns the robot depends on how the array is mounted.

use embassy_time::Duration;

use crate::driver::motor::Actuator;
use crate::driver::reflectance::{LinePosition, LineSensor};
use crate::system::state::RobotState;

/// Controller gains and duty limits
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SteeringConfig {
    /// Proportional gain, duty per position unit
    pub kp: f32,
    /// Derivative gain, duty per position unit per step
    pub kd: f32,
    /// Duty of both sides when centered
    pub base_duty: u16,
    /// Upper clamp for either side
    pub max_duty: u16,
    /// Setpoint, the position of the array center
    pub center: u32,
    /// Control period
    pub period: Duration,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            kp: 0.018,
            kd: 0.0001,
            base_duty: 3500,
            max_duty: 6000,
            center: 3500,
            period: Duration::from_millis(10),
        }
    }
}

/// Output of one control step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriveCommand {
    /// Forward with the given duty per side
    Differential { left: u16, right: u16 },
    /// Full stop
    Stop,
}

impl DriveCommand {
    /// Hands the command to the actuator
    pub async fn apply<A: Actuator>(self, actuator: &mut A) {
        match self {
            DriveCommand::Differential { left, right } => actuator.set_differential_duty(left, right).await,
            DriveCommand::Stop => actuator.stop().await,
        }
    }
}

/// Line-following PD controller
pub struct SteeringController {
    config: SteeringConfig,
    previous_error: i32,
}

impl SteeringController {
    pub fn new(config: SteeringConfig) -> Self {
        Self {
            config,
            previous_error: 0,
        }
    }

    pub fn config(&self) -> &SteeringConfig {
        &self.config
    }

    /// Error of the last corrected step
    pub fn previous_error(&self) -> i32 {
        self.previous_error
    }

    /// Runs one control step for the given robot state.
    ///
    /// The sensor is only read while running; every other state stops the motors.
    pub fn step<S: LineSensor>(&mut self, state: RobotState, sensor: &mut S) -> DriveCommand {
        match state {
            RobotState::Run => match sensor.read_position() {
                LinePosition::Detected(position) => self.correct(position),
                LinePosition::Lost => DriveCommand::Stop,
            },
            RobotState::Stop | RobotState::Error => DriveCommand::Stop,
        }
    }

    /// PD correction for a detected position
    pub fn correct(&mut self, position: u32) -> DriveCommand {
        let error = i64::from(position) - i64::from(self.config.center);
        let error = error.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;

        let derivative = error.saturating_sub(self.previous_error);
        // float to int casts truncate toward zero and saturate
        let correction = (self.config.kp * error as f32 + self.config.kd * derivative as f32) as i32;
        self.previous_error = error;

        let base = i32::from(self.config.base_duty);
        let max = i32::from(self.config.max_duty);
        let left = base.saturating_sub(correction).clamp(0, max);
        let right = base.saturating_add(correction).clamp(0, max);

        DriveCommand::Differential {
            left: left as u16,
            right: right as u16,
        }
    }
}
