//! Proximity Watch Task
//!
//! Pings the HC-SR04 every ranging period and feeds the reading to the
//! proximity state machine. Echo edges are awaited, so a ping never holds up
//! the other core0 tasks. When an object is confirmed the task waits on the
//! capture handshake, holding the robot stopped until the camera answers.

use defmt::{debug, info};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::UART0;
use embassy_rp::uart::BufferedUartTx;
use embassy_time::{Delay, Ticker};
use line_robot::control::capture::{CaptureConfig, CaptureRequester, CAPTURE_ACK};
use line_robot::control::proximity::{ProximityConfig, ProximityMonitor, ProximityOutcome};
use line_robot::driver::radio::FrameWriter;
use line_robot::driver::timing::SystemClock;
use line_robot::driver::ultrasonic::{RangeConfig, RangeFinder};
use line_robot::system::state::ROBOT_STATE;

use crate::task::resources::RangeResources;

/// Obstacle handling configuration handed over at spawn
#[derive(Clone, Copy)]
pub struct ProximityWatchConfig {
    pub range: RangeConfig,
    pub proximity: ProximityConfig,
    pub capture: CaptureConfig,
}

#[embassy_executor::task]
pub async fn proximity_watch(
    r: RangeResources,
    radio_tx: BufferedUartTx<'static, UART0>,
    config: ProximityWatchConfig,
) {
    let trigger = Output::new(r.trigger_pin, Level::Low);
    let echo = Input::new(r.echo_pin, Pull::Down);
    let mut finder = RangeFinder::new(trigger, echo, SystemClock, Delay, config.range);

    let mut monitor = ProximityMonitor::new(config.proximity);
    let mut capture = CaptureRequester::new(FrameWriter::new(radio_tx), &CAPTURE_ACK, config.capture);
    let mut ticker = Ticker::every(config.proximity.period);

    info!("Proximity watch started");
    loop {
        let reading = finder.measure().await;
        debug!("Range reading: {:?}", reading);

        match monitor.tick(reading, &ROBOT_STATE, &mut capture).await {
            ProximityOutcome::Captured(Ok(sequence)) => {
                info!("Picture {} taken, resuming", sequence);
                // the handshake may have taken far longer than one period
                ticker.reset();
            }
            ProximityOutcome::Captured(Err(_)) => ticker.reset(),
            ProximityOutcome::Committed(_) | ProximityOutcome::Faulted => {}
        }

        ticker.next().await;
    }
}
