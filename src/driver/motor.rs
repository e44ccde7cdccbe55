//! Differential Motor Driver
//!
//! Drives two DC motors through an H-bridge (L298N style): a direction pin pair
//! and a PWM enable per side.
//!
//! # Duty Shaping
//! - Nonzero duties below the start floor are raised to it, below that the
//!   motors hum without turning
//! - Duties above the PWM ceiling are clamped
//!
//! # Kick-Start
//! The first nonzero command after a stop drives both sides at the kick duty for
//! a short time to break static friction, then settles to the commanded duty.
//! This happens at most once per stop→run transition, so the first run command
//! after a stop takes the kick time longer to return.

use embassy_time::Duration;
use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use embedded_hal_async::delay::DelayNs;

/// Motor actuator consumed by the steering loop
#[allow(async_fn_in_trait)]
pub trait Actuator {
    /// Drive forward with independent left and right duties
    async fn set_differential_duty(&mut self, left: u16, right: u16);
    /// Release both motors
    async fn stop(&mut self);
}

/// Duty shaping and kick-start parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveConfig {
    /// Highest duty ever written
    pub max_duty: u16,
    /// Lowest nonzero duty ever written
    pub start_min_duty: u16,
    /// Duty applied during the kick
    pub kick_duty: u16,
    /// Length of the kick
    pub kick_time: Duration,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            max_duty: 8191,
            start_min_duty: 4200,
            kick_duty: 6500,
            kick_time: Duration::from_millis(60),
        }
    }
}

impl DriveConfig {
    /// Applies the start floor and the ceiling to a commanded duty
    pub fn shape(&self, duty: u16) -> u16 {
        match duty {
            0 => 0,
            d if d < self.start_min_duty => self.start_min_duty.min(self.max_duty),
            d => d.min(self.max_duty),
        }
    }
}

/// One side of the H-bridge
pub struct MotorChannel<P, W> {
    forward: P,
    backward: P,
    enable: W,
}

impl<P, W> MotorChannel<P, W>
where
    P: OutputPin,
    W: SetDutyCycle,
{
    pub fn new(forward: P, backward: P, enable: W) -> Self {
        Self {
            forward,
            backward,
            enable,
        }
    }

    fn set_forward(&mut self) {
        let _ = self.forward.set_high();
        let _ = self.backward.set_low();
    }

    fn release(&mut self) {
        let _ = self.forward.set_low();
        let _ = self.backward.set_low();
    }

    fn set_duty(&mut self, duty: u16) {
        let duty = duty.min(self.enable.max_duty_cycle());
        let _ = self.enable.set_duty_cycle(duty);
    }
}

/// Left/right motor pair with kick-start
pub struct DifferentialDrive<P, W, D> {
    left: MotorChannel<P, W>,
    right: MotorChannel<P, W>,
    delay: D,
    config: DriveConfig,
    started: bool,
}

impl<P, W, D> DifferentialDrive<P, W, D>
where
    P: OutputPin,
    W: SetDutyCycle,
    D: DelayNs,
{
    /// Creates the drive with both motors released
    pub fn new(left: MotorChannel<P, W>, right: MotorChannel<P, W>, delay: D, config: DriveConfig) -> Self {
        let mut drive = Self {
            left,
            right,
            delay,
            config,
            started: false,
        };
        drive.release_all();
        drive
    }

    /// Has the kick for the current run already been applied?
    pub fn is_started(&self) -> bool {
        self.started
    }

    fn release_all(&mut self) {
        self.started = false;
        self.left.release();
        self.right.release();
        self.left.set_duty(0);
        self.right.set_duty(0);
    }
}

impl<P, W, D> Actuator for DifferentialDrive<P, W, D>
where
    P: OutputPin,
    W: SetDutyCycle,
    D: DelayNs,
{
    async fn set_differential_duty(&mut self, left: u16, right: u16) {
        let left = self.config.shape(left);
        let right = self.config.shape(right);

        self.left.set_forward();
        self.right.set_forward();

        if !self.started && (left > 0 || right > 0) {
            let kick = self.config.kick_duty.min(self.config.max_duty);
            debug!("Kick-start at {} for {}ms", kick, self.config.kick_time.as_millis());
            self.left.set_duty(kick);
            self.right.set_duty(kick);
            self.delay.delay_ms(self.config.kick_time.as_millis() as u32).await;
            self.started = true;
        }

        self.left.set_duty(left);
        self.right.set_duty(right);
    }

    async fn stop(&mut self) {
        self.release_all();
    }
}
