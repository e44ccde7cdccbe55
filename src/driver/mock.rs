//! Host-side stand-ins for pins, clocks and delays

use core::cell::{Cell, RefCell};
use core::convert::Infallible;

use embassy_time::Instant;
use embedded_hal::digital::{ErrorType, OutputPin, PinState};
use embedded_hal_async::digital::Wait;

use super::reflectance::ChargeLine;
use super::timing::Clock;

/// Clock that advances by a fixed step every time it is read.
///
/// Delays advance it by the requested amount, so sensor code that busy-polls
/// sees time pass without any real waiting.
pub struct MockClock {
    micros: Cell<u64>,
    step: u64,
}

impl MockClock {
    pub fn new(step_micros: u64) -> Self {
        Self {
            micros: Cell::new(0),
            step: step_micros,
        }
    }

    /// Current time without advancing
    pub fn peek(&self) -> u64 {
        self.micros.get()
    }

    pub fn advance(&self, micros: u64) {
        self.micros.set(self.micros.get() + micros);
    }

    /// Moves time forward to `micros`, never backwards
    pub fn advance_to(&self, micros: u64) {
        self.micros.set(self.micros.get().max(micros));
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        let now = self.micros.get();
        self.micros.set(now + self.step);
        Instant::from_micros(now)
    }
}

impl embedded_hal::delay::DelayNs for &MockClock {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(u64::from(ns).div_ceil(1_000));
    }
}

/// Async delay that records how long it was asked to wait
#[derive(Default)]
pub struct RecordingDelay {
    pub total_ms: u32,
    pub calls: u32,
}

impl embedded_hal_async::delay::DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.total_ms += ns / 1_000_000;
        self.calls += 1;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.total_ms += ms;
        self.calls += 1;
    }
}

/// Output pin that remembers every level it was driven to
#[derive(Default)]
pub struct RecordingPin {
    pub history: RefCell<Vec<PinState>>,
}

impl RecordingPin {
    pub fn is_set_high(&self) -> bool {
        self.history.borrow().last() == Some(&PinState::High)
    }
}

impl ErrorType for &RecordingPin {
    type Error = Infallible;
}

impl OutputPin for &RecordingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.history.borrow_mut().push(PinState::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.history.borrow_mut().push(PinState::High);
        Ok(())
    }
}

/// Echo line that rises at `rise_at` and falls at `fall_at` microseconds.
///
/// Waiting for an edge jumps the clock to it; a missing edge never arrives.
pub struct ScriptedEcho<'a> {
    pub clock: &'a MockClock,
    pub rise_at: Option<u64>,
    pub fall_at: Option<u64>,
}

impl ScriptedEcho<'_> {
    async fn edge(&self, at: Option<u64>) -> Result<(), Infallible> {
        match at {
            Some(at) => {
                self.clock.advance_to(at);
                Ok(())
            }
            None => core::future::pending().await,
        }
    }
}

impl ErrorType for ScriptedEcho<'_> {
    type Error = Infallible;
}

impl Wait for ScriptedEcho<'_> {
    async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
        self.edge(self.rise_at).await
    }

    async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
        self.edge(self.fall_at).await
    }

    async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
        self.edge(self.rise_at).await
    }

    async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
        self.edge(self.fall_at).await
    }

    async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
        self.edge(self.rise_at.or(self.fall_at)).await
    }
}

/// Reflectance channel that discharges a fixed time after release
pub struct MockLine<'a> {
    pub clock: &'a MockClock,
    /// `None` models a hung channel that never discharges
    pub discharge_after: Option<u64>,
    pub released_at: Option<u64>,
    pub charges: u32,
}

impl<'a> MockLine<'a> {
    pub fn new(clock: &'a MockClock, discharge_after: Option<u64>) -> Self {
        Self {
            clock,
            discharge_after,
            released_at: None,
            charges: 0,
        }
    }
}

impl ChargeLine for MockLine<'_> {
    fn charge(&mut self) {
        self.charges += 1;
        self.released_at = None;
    }

    fn release(&mut self) {
        self.released_at = Some(self.clock.peek());
    }

    fn is_discharged(&mut self) -> bool {
        match (self.released_at, self.discharge_after) {
            (Some(released), Some(after)) => self.clock.peek() >= released + after,
            _ => false,
        }
    }
}
