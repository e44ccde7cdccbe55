//! System Events
//!
//! Defines events and the channel the control tasks report through.
//!
//! Producers never wait on the channel: a control loop that stalls on a full
//! queue would stop steering, so events are dropped instead.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::system::config::ConfigSource;

/// Multi-producer, single-consumer event channel with capacity of 10
pub static EVENT_CHANNEL: Channel<CriticalSectionRawMutex, Events, 10> = Channel::new();

/// Queues an event for the orchestrator, dropping it if the channel is full
pub fn send(event: Events) {
    if EVENT_CHANNEL.try_send(event).is_err() {
        debug!("Event channel full, dropped {:?}", event);
    }
}

/// Receives the next event from the system channel
pub async fn wait() -> Events {
    EVENT_CHANNEL.receive().await
}

/// System-wide events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Events {
    /// Reflectance array no longer sees the line
    LineLost,
    /// Line reacquired after being lost
    LineFound,
    /// Picture request with this sequence number went out
    CaptureRequested(u32),
    /// Camera confirmed the picture
    CaptureAcknowledged(u32),
    /// Every attempt of the request ran out of time
    CaptureTimedOut(u32),
    /// Configuration in effect after boot
    ConfigLoaded(ConfigSource),
}
