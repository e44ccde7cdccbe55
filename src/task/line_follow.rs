//! Line Following Task
//!
//! Runs the steering loop: read the reflectance array, compute the PD
//! correction and drive the motors, once per control period.
//!
//! # Hardware
//! - Eight RC reflectance sensors (QTR-8RC style) on plain GPIOs. Each line is
//!   charged as an output, then released to an input and timed until it reads low.
//! - L298N dual H-bridge: IN1-IN4 as direction pins, ENA/ENB on one PWM slice
//!   at 13 bit resolution and ~3kHz
//!
//! The sensor read busy-waits up to its timeout, so the loop period is a floor,
//! not a guarantee. The task runs alone on core1: the busy-wait holds up nothing
//! else, and nothing on core0 can delay a steering step.

use defmt::info;
use embassy_rp::gpio::{Flex, Level, Output};
use embassy_rp::pwm::{self, Pwm};
use embassy_time::{Delay, Ticker};
use line_robot::control::steering::{DriveCommand, SteeringConfig, SteeringController};
use line_robot::driver::motor::{DifferentialDrive, DriveConfig, MotorChannel};
use line_robot::driver::reflectance::{ChargeLine, ReflectanceArray, ReflectanceConfig};
use line_robot::driver::timing::SystemClock;
use line_robot::system::event::{self, Events};
use line_robot::system::state::{RobotState, ROBOT_STATE};

use crate::task::resources::{MotorResources, ReflectanceResources};

/// PWM counter top, 13 bit duty resolution
const PWM_TOP: u16 = 8191;

/// Clock divider giving ~3kHz at 150MHz system clock with the top above
const PWM_DIVIDER: u8 = 6;

/// Reflectance sensor line on a bidirectional GPIO
struct FlexLine(Flex<'static>);

impl ChargeLine for FlexLine {
    fn charge(&mut self) {
        self.0.set_high();
        self.0.set_as_output();
    }

    fn release(&mut self) {
        self.0.set_as_input();
    }

    fn is_discharged(&mut self) -> bool {
        self.0.is_low()
    }
}

/// Steering loop configuration handed over at spawn
#[derive(Clone, Copy)]
pub struct LineFollowConfig {
    pub reflectance: ReflectanceConfig,
    pub steering: SteeringConfig,
    pub drive: DriveConfig,
}

#[embassy_executor::task]
pub async fn line_follow(sensors: ReflectanceResources, motors: MotorResources, config: LineFollowConfig) {
    let lines = [
        FlexLine(Flex::new(sensors.line0)),
        FlexLine(Flex::new(sensors.line1)),
        FlexLine(Flex::new(sensors.line2)),
        FlexLine(Flex::new(sensors.line3)),
        FlexLine(Flex::new(sensors.line4)),
        FlexLine(Flex::new(sensors.line5)),
        FlexLine(Flex::new(sensors.line6)),
        FlexLine(Flex::new(sensors.line7)),
    ];
    let mut array = ReflectanceArray::new(lines, SystemClock, Delay, config.reflectance);

    let mut pwm_config = pwm::Config::default();
    pwm_config.divider = PWM_DIVIDER.into();
    pwm_config.top = PWM_TOP;
    let pwm = Pwm::new_output_ab(motors.slice, motors.left_enable_pin, motors.right_enable_pin, pwm_config);
    let (Some(left_enable), Some(right_enable)) = pwm.split() else {
        defmt::error!("Motor PWM outputs unavailable, line following disabled");
        return;
    };

    let left = MotorChannel::new(
        Output::new(motors.left_forward_pin, Level::Low),
        Output::new(motors.left_backward_pin, Level::Low),
        left_enable,
    );
    let right = MotorChannel::new(
        Output::new(motors.right_forward_pin, Level::Low),
        Output::new(motors.right_backward_pin, Level::Low),
        right_enable,
    );
    let mut drive = DifferentialDrive::new(left, right, Delay, config.drive);

    let mut controller = SteeringController::new(config.steering);
    let mut ticker = Ticker::every(config.steering.period);
    let mut line_seen = true;

    info!("Line following started");
    loop {
        let state = ROBOT_STATE.get();
        let command = controller.step(state, &mut array);

        if state == RobotState::Run {
            let seen = command != DriveCommand::Stop;
            if seen != line_seen {
                event::send(if seen { Events::LineFound } else { Events::LineLost });
                line_seen = seen;
            }
        }

        command.apply(&mut drive).await;
        ticker.next().await;
    }
}
