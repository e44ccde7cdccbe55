//! Orchestrator Module
//!
//! Logs the events the control tasks report and prints a status line every few
//! seconds. It never writes the robot state: driving decisions stay with the
//! control tasks.

use defmt::{info, warn};
use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Ticker};
use line_robot::system::event::{self, Events};
use line_robot::system::state::ROBOT_STATE;

/// Interval between status reports
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Running totals for the status report
#[derive(Default)]
struct Tally {
    captures: u32,
    timeouts: u32,
    line_losses: u32,
}

#[embassy_executor::task]
pub async fn orchestrate() {
    info!("Orchestrator started");
    let mut tally = Tally::default();
    let mut status = Ticker::every(STATUS_INTERVAL);

    loop {
        match select(event::wait(), status.next()).await {
            Either::First(event) => handle_event(event, &mut tally),
            Either::Second(()) => info!(
                "Status: {:?}, {} captures, {} timeouts, {} line losses",
                ROBOT_STATE.get(),
                tally.captures,
                tally.timeouts,
                tally.line_losses
            ),
        }
    }
}

fn handle_event(event: Events, tally: &mut Tally) {
    match event {
        Events::LineLost => {
            tally.line_losses += 1;
            info!("Line lost");
        }
        Events::LineFound => info!("Line found"),
        Events::CaptureRequested(sequence) => info!("Capture {} requested", sequence),
        Events::CaptureAcknowledged(sequence) => {
            tally.captures += 1;
            info!("Capture {} acknowledged", sequence);
        }
        Events::CaptureTimedOut(sequence) => {
            tally.timeouts += 1;
            warn!("Capture {} timed out", sequence);
        }
        Events::ConfigLoaded(source) => info!("Configuration source: {:?}", source),
    }
}
