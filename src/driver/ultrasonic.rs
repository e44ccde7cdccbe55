//! HC-SR04 ultrasonic range finder
//!
//! Measures distance by timing the echo pulse after a trigger pulse.
//!
//! # Sensor Operation
//! - 10µs trigger pulse starts a ping
//! - Echo line goes high when the burst leaves and low when it returns
//! - 58µs of echo time per centimeter (round trip at ~343m/s)
//!
//! # Timing
//! Both echo edges are awaited under a timeout, so other tasks keep running
//! while the ping is in flight and a disconnected sensor costs at most two
//! timeouts. The pulse width is taken between the two wakeups, so executor
//! latency adds to it.
//!
//! # Validity
//! Anything outside the sensor's physical band (2-400cm) is reported as
//! `OutOfBand` rather than as a distance.

use embassy_time::{with_timeout, Duration};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::digital::Wait;

use super::timing::Clock;

/// Default wait for each echo edge
pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_millis(30);
/// Echo microseconds per centimeter of distance
pub const DEFAULT_MICROS_PER_CM: u32 = 58;

/// Settle time with the trigger held low before the pulse
const TRIGGER_SETTLE: Duration = Duration::from_micros(5);

/// A failed range measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangeFault {
    /// Echo line never rose or never fell within the timeout
    NoEcho,
    /// Decoded distance (cm) outside the plausible band
    OutOfBand(u32),
}

/// Result of one ranging cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangeReading {
    /// Valid distance in centimeters
    Distance(u16),
    Fault(RangeFault),
}

impl RangeReading {
    /// Distance in centimeters, if the reading is valid
    pub fn distance_cm(&self) -> Option<u16> {
        match self {
            RangeReading::Distance(cm) => Some(*cm),
            RangeReading::Fault(_) => None,
        }
    }
}

/// Range finder timing and validity parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RangeConfig {
    /// Length of the high trigger pulse
    pub trigger_pulse: Duration,
    /// Bound on each of the two echo edge waits
    pub echo_timeout: Duration,
    /// Echo time per centimeter
    pub micros_per_cm: u32,
    /// Smallest plausible distance
    pub min_cm: u16,
    /// Largest plausible distance
    pub max_cm: u16,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            trigger_pulse: Duration::from_micros(10),
            echo_timeout: DEFAULT_ECHO_TIMEOUT,
            micros_per_cm: DEFAULT_MICROS_PER_CM,
            min_cm: 2,
            max_cm: 400,
        }
    }
}

impl RangeConfig {
    /// Converts an echo pulse width to a reading
    pub fn decode(&self, echo: Duration) -> RangeReading {
        let cm = echo.as_micros() / u64::from(self.micros_per_cm.max(1));
        let cm = cm.min(u64::from(u32::MAX)) as u32;
        if cm < u32::from(self.min_cm) || cm > u32::from(self.max_cm) {
            return RangeReading::Fault(RangeFault::OutOfBand(cm));
        }
        RangeReading::Distance(cm as u16)
    }
}

/// HC-SR04 on a trigger output and an edge-waitable echo input
pub struct RangeFinder<T, E, C, D> {
    trigger: T,
    echo: E,
    clock: C,
    delay: D,
    config: RangeConfig,
}

impl<T, E, C, D> RangeFinder<T, E, C, D>
where
    T: OutputPin,
    E: Wait,
    C: Clock,
    D: DelayNs,
{
    pub fn new(mut trigger: T, echo: E, clock: C, delay: D, config: RangeConfig) -> Self {
        let _ = trigger.set_low();
        Self {
            trigger,
            echo,
            clock,
            delay,
            config,
        }
    }

    pub fn config(&self) -> &RangeConfig {
        &self.config
    }

    /// Fires one ping and times its echo.
    ///
    /// Only the 15µs trigger pulse blocks; both edges are awaited. Echo pin
    /// errors end in `NoEcho`.
    pub async fn measure(&mut self) -> RangeReading {
        let _ = self.trigger.set_low();
        self.delay.delay_us(TRIGGER_SETTLE.as_micros() as u32);
        let _ = self.trigger.set_high();
        self.delay.delay_us(self.config.trigger_pulse.as_micros() as u32);
        let _ = self.trigger.set_low();

        let timeout = self.config.echo_timeout;

        if !matches!(with_timeout(timeout, self.echo.wait_for_high()).await, Ok(Ok(()))) {
            return RangeReading::Fault(RangeFault::NoEcho);
        }
        let rose_at = self.clock.now();

        if !matches!(with_timeout(timeout, self.echo.wait_for_low()).await, Ok(Ok(()))) {
            return RangeReading::Fault(RangeFault::NoEcho);
        }
        let width = self.clock.now().saturating_duration_since(rose_at);

        self.config.decode(width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{MockClock, RecordingPin, ScriptedEcho};
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embedded_hal::digital::PinState;

    fn finder<'a>(
        clock: &'a MockClock,
        trigger: &'a RecordingPin,
        rise_at: Option<u64>,
        fall_at: Option<u64>,
    ) -> RangeFinder<&'a RecordingPin, ScriptedEcho<'a>, &'a MockClock, &'a MockClock> {
        let echo = ScriptedEcho {
            clock,
            rise_at,
            fall_at,
        };
        RangeFinder::new(trigger, echo, clock, clock, RangeConfig::default())
    }

    #[test]
    fn decodes_band_edges() {
        let config = RangeConfig::default();
        assert_eq!(config.decode(Duration::from_micros(2 * 58)), RangeReading::Distance(2));
        assert_eq!(config.decode(Duration::from_micros(400 * 58)), RangeReading::Distance(400));
        assert_eq!(
            config.decode(Duration::from_micros(58)),
            RangeReading::Fault(RangeFault::OutOfBand(1))
        );
        assert_eq!(
            config.decode(Duration::from_micros(401 * 58)),
            RangeReading::Fault(RangeFault::OutOfBand(401))
        );
    }

    #[test]
    fn measures_echo_width() {
        let clock = MockClock::new(1);
        let trigger = RecordingPin::default();
        // echo rises 200µs after the trigger and stays high for 25cm worth of time
        let mut sensor = finder(&clock, &trigger, Some(215), Some(215 + 25 * 58 + 30));

        assert_eq!(block_on(sensor.measure()), RangeReading::Distance(25));
        assert_eq!(
            trigger.history.borrow().as_slice(),
            &[PinState::Low, PinState::Low, PinState::High, PinState::Low]
        );
    }

    #[test]
    fn silent_echo_times_out() {
        let clock = MockClock::new(10);
        let trigger = RecordingPin::default();
        let mut sensor = finder(&clock, &trigger, None, None);

        assert_eq!(block_on(sensor.measure()), RangeReading::Fault(RangeFault::NoEcho));
    }

    #[test]
    fn stuck_high_echo_times_out() {
        let clock = MockClock::new(10);
        let trigger = RecordingPin::default();
        let mut sensor = finder(&clock, &trigger, Some(100), None);

        assert_eq!(block_on(sensor.measure()), RangeReading::Fault(RangeFault::NoEcho));
    }

    #[test]
    fn waiting_for_echo_lets_other_work_run() {
        let clock = MockClock::new(10);
        let trigger = RecordingPin::default();
        let mut sensor = finder(&clock, &trigger, None, None);
        let mut ran_meanwhile = false;

        let (reading, _) = block_on(join(sensor.measure(), async {
            ran_meanwhile = true;
        }));

        assert_eq!(reading, RangeReading::Fault(RangeFault::NoEcho));
        assert!(ran_meanwhile);
    }

    #[test]
    fn too_close_is_out_of_band() {
        let clock = MockClock::new(1);
        let trigger = RecordingPin::default();
        let mut sensor = finder(&clock, &trigger, Some(100), Some(100 + 60));

        assert_eq!(block_on(sensor.measure()), RangeReading::Fault(RangeFault::OutOfBand(1)));
    }

    #[test]
    fn distance_accessor() {
        assert_eq!(RangeReading::Distance(12).distance_cm(), Some(12));
        assert_eq!(RangeReading::Fault(RangeFault::NoEcho).distance_cm(), None);
    }
}
