//! Reflectance sensor array (QTR-8RC style)
//!
//! Each channel is an IR phototransistor discharging a small capacitor. The line
//! is charged high, released to input, and the time until it reads low is the
//! reflectance: dark surfaces reflect less and discharge slower.
//!
//! # Acquisition
//! 1. Drive every line high for the charge interval
//! 2. Release every line to input at once and start a shared timer
//! 3. Poll the unresolved lines, recording the elapsed time when each reads low
//! 4. Anything still high at the timeout is clamped to the timeout
//!
//! # Position
//! The line position is the reflectance-weighted centroid of the channel
//! indices, scaled by the weight step (0..7000 for 8 channels at 1000).

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;

use super::timing::{poll_until, Clock};

/// Default charge pulse
pub const DEFAULT_CHARGE_TIME: Duration = Duration::from_micros(10);
/// Default discharge timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_micros(3_000);
/// Default distance between adjacent channels in position units
pub const DEFAULT_WEIGHT_STEP: u32 = 1_000;
/// Largest weight step that keeps positions of arrays up to 4096 channels in `u32`
pub const MAX_WEIGHT_STEP: u32 = u32::MAX / 4095;

/// One sensor channel that can be charged and then sensed
///
/// On the target this is a GPIO switched between push-pull output and input.
pub trait ChargeLine {
    /// Configure as output and drive high
    fn charge(&mut self);
    /// Configure as high-impedance input
    fn release(&mut self);
    /// Has the line decayed to logic low?
    fn is_discharged(&mut self) -> bool;
}

/// Anything that can report where the line is
pub trait LineSensor {
    fn read_position(&mut self) -> LinePosition;
}

/// Lateral line position estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinePosition {
    /// Weighted centroid in position units, 0 at the leftmost channel
    Detected(u32),
    /// No reflectance on any channel
    Lost,
}

/// Reflectance array timing parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReflectanceConfig {
    /// How long the lines are driven high before release
    pub charge_time: Duration,
    /// Discharge time recorded for channels that never read low
    pub timeout: Duration,
    /// Position units between adjacent channels
    pub weight_step: u32,
}

impl Default for ReflectanceConfig {
    fn default() -> Self {
        Self {
            charge_time: DEFAULT_CHARGE_TIME,
            timeout: DEFAULT_TIMEOUT,
            weight_step: DEFAULT_WEIGHT_STEP,
        }
    }
}

/// Discharge times of one acquisition, in microseconds, left to right
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorSample<const N: usize> {
    values: [u32; N],
}

impl<const N: usize> SensorSample<N> {
    pub const fn new(values: [u32; N]) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[u32; N] {
        &self.values
    }

    /// Line position of this sample, see [`position_of`]
    pub fn position(&self, weight_step: u32) -> LinePosition {
        position_of(&self.values, weight_step)
    }
}

/// Weighted centroid of `values`.
///
/// Returns `Lost` when every value is zero, otherwise a position in
/// `0..=(values.len() - 1) * weight_step`, saturated at `u32::MAX`.
pub fn position_of(values: &[u32], weight_step: u32) -> LinePosition {
    let (weighted, sum) = values
        .iter()
        .enumerate()
        .fold((0u64, 0u64), |(weighted, sum), (index, &value)| {
            let value = u64::from(value);
            (
                weighted + value * index as u64 * u64::from(weight_step),
                sum + value,
            )
        });

    if sum == 0 {
        return LinePosition::Lost;
    }
    LinePosition::Detected(u32::try_from(weighted / sum).unwrap_or(u32::MAX))
}

/// An array of `N` reflectance channels sharing one clock
pub struct ReflectanceArray<L, C, D, const N: usize> {
    lines: [L; N],
    clock: C,
    delay: D,
    config: ReflectanceConfig,
}

impl<L, C, D, const N: usize> ReflectanceArray<L, C, D, N>
where
    L: ChargeLine,
    C: Clock,
    D: DelayNs,
{
    /// Creates the array and parks every line as an input
    pub fn new(mut lines: [L; N], clock: C, delay: D, config: ReflectanceConfig) -> Self {
        for line in lines.iter_mut() {
            line.release();
        }
        Self {
            lines,
            clock,
            delay,
            config,
        }
    }

    pub fn config(&self) -> &ReflectanceConfig {
        &self.config
    }

    /// Runs one charge/discharge cycle over all channels.
    ///
    /// Never takes longer than the charge time plus the configured timeout
    /// (plus one poll iteration).
    pub fn acquire(&mut self) -> SensorSample<N> {
        let timeout_us = self.config.timeout.as_micros().min(u64::from(u32::MAX)) as u32;

        for line in self.lines.iter_mut() {
            line.charge();
        }
        self.delay.delay_us(self.config.charge_time.as_micros() as u32);
        for line in self.lines.iter_mut() {
            line.release();
        }

        let mut resolved: [Option<u32>; N] = [None; N];
        let start = self.clock.now();
        let lines = &mut self.lines;

        let outcome = poll_until(&self.clock, start, self.config.timeout, |elapsed| {
            let elapsed_us = elapsed.as_micros().min(u64::from(timeout_us)) as u32;
            let mut pending = false;
            for (line, slot) in lines.iter_mut().zip(resolved.iter_mut()) {
                if slot.is_none() {
                    if line.is_discharged() {
                        *slot = Some(elapsed_us);
                    } else {
                        pending = true;
                    }
                }
            }
            (!pending).then_some(())
        });

        if outcome.is_err() {
            trace!("Reflectance read hit timeout");
        }

        SensorSample::new(resolved.map(|value| value.unwrap_or(timeout_us)))
    }
}

impl<L, C, D, const N: usize> LineSensor for ReflectanceArray<L, C, D, N>
where
    L: ChargeLine,
    C: Clock,
    D: DelayNs,
{
    fn read_position(&mut self) -> LinePosition {
        let sample = self.acquire();
        let position = sample.position(self.config.weight_step);
        trace!("QTR {} -> {}", sample.values(), position);
        position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{MockClock, MockLine};

    #[test]
    fn centroid_of_symmetric_edges_is_exact() {
        let sample = SensorSample::new([3000, 3000, 0, 0, 0, 0, 3000, 3000]);
        // weighted = 3000 * (0 + 1 + 6 + 7) * 1000 = 42_000_000, sum = 12_000
        assert_eq!(sample.position(1000), LinePosition::Detected(3500));
    }

    #[test]
    fn all_zero_sample_is_lost() {
        assert_eq!(position_of(&[0; 8], 1000), LinePosition::Lost);
    }

    #[test]
    fn single_channel_maps_to_its_index() {
        for index in 0..8 {
            let mut values = [0u32; 8];
            values[index] = 1234;
            assert_eq!(
                position_of(&values, 1000),
                LinePosition::Detected(index as u32 * 1000)
            );
        }
    }

    #[test]
    fn position_stays_within_array_span() {
        let samples: [[u32; 8]; 4] = [
            [3000; 8],
            [1, 0, 0, 0, 0, 0, 0, 3000],
            [3000, 2999, 1, 0, 0, 0, 0, 0],
            [17, 250, 900, 3000, 3000, 1200, 40, 5],
        ];
        for values in samples {
            match position_of(&values, 1000) {
                LinePosition::Detected(position) => assert!(position <= 7000),
                LinePosition::Lost => panic!("nonzero sample reported lost"),
            }
            assert_eq!(position_of(&values, 1000), position_of(&values, 1000));
        }
    }

    #[test]
    fn oversized_weight_step_saturates() {
        assert_eq!(position_of(&[0, 0, 5], u32::MAX), LinePosition::Detected(u32::MAX));

        let mut wide = [0u32; 4096];
        wide[4095] = 1;
        assert_eq!(
            position_of(&wide, MAX_WEIGHT_STEP),
            LinePosition::Detected(4095 * MAX_WEIGHT_STEP)
        );
    }

    #[test]
    fn single_channel_array_sits_at_zero() {
        assert_eq!(position_of(&[42], 1000), LinePosition::Detected(0));
    }

    #[test]
    fn acquire_records_discharge_times() {
        let clock = MockClock::new(1);
        let lines = [
            MockLine::new(&clock, Some(100)),
            MockLine::new(&clock, Some(500)),
            MockLine::new(&clock, Some(2_000)),
        ];
        let mut array = ReflectanceArray::new(lines, &clock, &clock, ReflectanceConfig::default());

        let sample = array.acquire();

        let expected = [100u32, 500, 2_000];
        for (value, expected) in sample.values().iter().zip(expected) {
            assert!(value.abs_diff(expected) <= 2, "{value} vs {expected}");
        }
        assert!(array.lines.iter().all(|line| line.charges == 1));
    }

    #[test]
    fn hung_channel_is_clamped_to_timeout() {
        let clock = MockClock::new(3);
        let lines = [
            MockLine::new(&clock, Some(40)),
            MockLine::new(&clock, None),
        ];
        let mut array = ReflectanceArray::new(lines, &clock, &clock, ReflectanceConfig::default());

        let sample = array.acquire();

        assert!(sample.values()[0] < 50);
        assert_eq!(sample.values()[1], 3_000);
    }

    #[test]
    fn dead_array_returns_within_timeout() {
        let clock = MockClock::new(5);
        let lines = [
            MockLine::new(&clock, None),
            MockLine::new(&clock, None),
            MockLine::new(&clock, None),
            MockLine::new(&clock, None),
        ];
        let mut array = ReflectanceArray::new(lines, &clock, &clock, ReflectanceConfig::default());

        let sample = array.acquire();

        assert_eq!(sample.values(), &[3_000; 4]);
        // charge pulse + timeout + one poll step of slack
        assert!(clock.peek() <= 10 + 3_000 + 10);
    }

    #[test]
    fn immediate_discharge_is_not_repolled() {
        let clock = MockClock::new(1);
        let lines = [MockLine::new(&clock, Some(0)), MockLine::new(&clock, Some(300))];
        let mut array = ReflectanceArray::new(lines, &clock, &clock, ReflectanceConfig::default());

        let sample = array.acquire();

        assert!(sample.values()[0] <= 2);
        assert!(sample.values()[1] >= 298);
    }
}
