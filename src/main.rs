//! Robot firmware entry point
//!
//! Loads the configuration from flash, brings up the radio UART and spawns the
//! control tasks.
//!
//! # Cores
//! - core0: orchestrator, radio receive and proximity watch. All of them await
//!   their I/O, so they share one executor.
//! - core1: line following alone. Its reflectance read busy-waits, so it gets a
//!   core of its own.

#![no_std]
#![no_main]

use defmt::info;
use embassy_executor::{Executor, Spawner};
use embassy_rp::block::ImageDef;
use embassy_rp::config::Config;
use embassy_rp::multicore::{spawn_core1, Stack};
use embassy_rp::uart::{self, BufferedUart};
use line_robot::system::event::{self, Events};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::task::{
    flash_storage::load_config,
    line_follow::{line_follow, LineFollowConfig},
    orchestrate::orchestrate,
    proximity_watch::{proximity_watch, ProximityWatchConfig},
    radio_receive::radio_receive,
    resources::{
        AssignedResources, Irqs, MotorResources, RadioResources, RangeResources, ReflectanceResources,
        SteeringCoreResources, StorageResources,
    },
};

/// Firmware image type for bootloader
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: ImageDef = ImageDef::secure_exe();

/// Task implementations
mod task;

/// Radio module serial speed
const RADIO_BAUD: u32 = 9600;

static RADIO_TX_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static RADIO_RX_BUF: StaticCell<[u8; 64]> = StaticCell::new();

static CORE1_STACK: StaticCell<Stack<8192>> = StaticCell::new();
static CORE1_EXECUTOR: StaticCell<Executor> = StaticCell::new();

/// Firmware entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Config::default());
    let r = split_resources!(p);

    // configuration must be in place before any control task starts
    let (config, source) = load_config(r.storage).await;
    info!("Running with {:?} configuration", source);

    let mut uart_config = uart::Config::default();
    uart_config.baudrate = RADIO_BAUD;
    let radio = BufferedUart::new(
        r.radio.uart,
        Irqs,
        r.radio.tx_pin,
        r.radio.rx_pin,
        RADIO_TX_BUF.init([0; 64]),
        RADIO_RX_BUF.init([0; 64]),
        uart_config,
    );
    let (radio_tx, radio_rx) = radio.split();

    spawner.spawn(orchestrate()).unwrap();
    event::send(Events::ConfigLoaded(source));

    spawner
        .spawn(radio_receive(radio_rx, config.capture.local_address))
        .unwrap();
    let line_config = LineFollowConfig {
        reflectance: config.reflectance,
        steering: config.steering,
        drive: config.drive,
    };
    let (sensors, motors) = (r.reflectance, r.motors);
    spawn_core1(r.steering_core.core, CORE1_STACK.init(Stack::new()), move || {
        let executor = CORE1_EXECUTOR.init(Executor::new());
        executor.run(|spawner| spawner.spawn(line_follow(sensors, motors, line_config)).unwrap());
    });

    spawner
        .spawn(proximity_watch(
            r.range,
            radio_tx,
            ProximityWatchConfig {
                range: config.range,
                proximity: config.proximity,
                capture: config.capture,
            },
        ))
        .unwrap();
}
