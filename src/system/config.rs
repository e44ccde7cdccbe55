//! Robot Configuration
//!
//! All tunables in one place, persisted to flash with `sequential-storage`.
//!
//! # Storage Layout
//! The configuration is a single map item under [`StorageKey::RobotConfig`].
//! Values are little endian, prefixed by a layout version byte:
//!
//! | group       | fields                                                      |
//! |-------------|-------------------------------------------------------------|
//! | reflectance | charge µs u32, timeout µs u32, weight step u32              |
//! | range       | trigger µs u32, echo timeout µs u32, µs/cm u32, min u16, max u16 |
//! | steering    | kp f32, kd f32, base u16, max u16, center u32, period ms u32 |
//! | proximity   | stop cm u16, threshold u8, period ms u32                    |
//! | capture     | peer [u8; 6], local [u8; 6], ack timeout ms u32, attempts u8 |
//! | drive       | max u16, start min u16, kick u16, kick ms u32               |
//!
//! A stored item with another version is rejected as `InvalidFormat` and the
//! robot runs on defaults.

use core::ops::Range;

use embassy_time::Duration;
use embedded_storage_async::nor_flash::NorFlash;
use sequential_storage::{
    cache::NoCache,
    map::{fetch_item, store_item, Key, SerializationError, Value},
};

use crate::control::capture::CaptureConfig;
use crate::control::proximity::ProximityConfig;
use crate::control::steering::SteeringConfig;
use crate::driver::motor::DriveConfig;
use crate::driver::reflectance::{ReflectanceConfig, MAX_WEIGHT_STEP};
use crate::driver::ultrasonic::RangeConfig;

/// Layout version written in front of every stored config
const CONFIG_VERSION: u8 = 1;

/// Serialized size of [`RobotConfig`]
pub const CONFIG_LEN: usize = 1 + 12 + 16 + 20 + 7 + 17 + 10;

/// Scratch buffer size for flash reads and writes, item header included
pub const CONFIG_BUFFER_LEN: usize = 128;

/// Storage keys for sequential-storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum StorageKey {
    RobotConfig = 0,
}

impl Key for StorageKey {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        if buffer.is_empty() {
            return Err(SerializationError::BufferTooSmall);
        }
        buffer[0] = *self as u8;
        Ok(1)
    }

    fn deserialize_from(buffer: &[u8]) -> Result<(Self, usize), SerializationError>
    where
        Self: Sized,
    {
        match buffer.first() {
            None => Err(SerializationError::BufferTooSmall),
            Some(0) => Ok((StorageKey::RobotConfig, 1)),
            Some(_) => Err(SerializationError::InvalidFormat),
        }
    }
}

/// Where the configuration in effect came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigSource {
    /// Read from flash
    Stored,
    /// Nothing stored yet, defaults were written
    Defaults,
    /// Flash unreadable, running on defaults
    Fallback,
}

/// Every tunable of the robot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RobotConfig {
    pub reflectance: ReflectanceConfig,
    pub range: RangeConfig,
    pub steering: SteeringConfig,
    pub proximity: ProximityConfig,
    pub capture: CaptureConfig,
    pub drive: DriveConfig,
}

fn or_default(value: Duration, default: Duration) -> Duration {
    if value.as_ticks() == 0 {
        default
    } else {
        value
    }
}

impl RobotConfig {
    /// Replaces values the control loops cannot work with
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();

        let reflectance = &mut self.reflectance;
        reflectance.timeout = or_default(reflectance.timeout, defaults.reflectance.timeout);
        if reflectance.weight_step == 0 {
            reflectance.weight_step = defaults.reflectance.weight_step;
        }
        reflectance.weight_step = reflectance.weight_step.min(MAX_WEIGHT_STEP);

        let range = &mut self.range;
        range.echo_timeout = or_default(range.echo_timeout, defaults.range.echo_timeout);
        range.micros_per_cm = range.micros_per_cm.max(1);
        if range.min_cm > range.max_cm {
            range.min_cm = defaults.range.min_cm;
            range.max_cm = defaults.range.max_cm;
        }

        let steering = &mut self.steering;
        if !steering.kp.is_finite() {
            steering.kp = defaults.steering.kp;
        }
        if !steering.kd.is_finite() {
            steering.kd = defaults.steering.kd;
        }
        steering.base_duty = steering.base_duty.min(steering.max_duty);
        steering.period = or_default(steering.period, defaults.steering.period);

        let proximity = &mut self.proximity;
        proximity.confirm_threshold = proximity.confirm_threshold.max(1);
        proximity.period = or_default(proximity.period, defaults.proximity.period);

        self.capture.max_attempts = self.capture.max_attempts.max(1);

        let drive = &mut self.drive;
        drive.start_min_duty = drive.start_min_duty.min(drive.max_duty);
        drive.kick_duty = drive.kick_duty.min(drive.max_duty);

        self
    }
}

/// Sequential writer over a byte buffer
struct Writer<'a> {
    buffer: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn put(&mut self, bytes: &[u8]) -> Result<(), SerializationError> {
        let end = self.pos + bytes.len();
        self.buffer
            .get_mut(self.pos..end)
            .ok_or(SerializationError::BufferTooSmall)?
            .copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn micros(&mut self, duration: Duration) -> Result<(), SerializationError> {
        self.put(&saturate(duration.as_micros()).to_le_bytes())
    }

    fn millis(&mut self, duration: Duration) -> Result<(), SerializationError> {
        self.put(&saturate(duration.as_millis()).to_le_bytes())
    }
}

fn saturate(value: u64) -> u32 {
    value.min(u64::from(u32::MAX)) as u32
}

/// Sequential reader over a byte buffer
struct Reader<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], SerializationError> {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(
            self.buffer
                .get(self.pos..self.pos + N)
                .ok_or(SerializationError::BufferTooSmall)?,
        );
        self.pos += N;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, SerializationError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, SerializationError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32, SerializationError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn f32(&mut self) -> Result<f32, SerializationError> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    fn micros(&mut self) -> Result<Duration, SerializationError> {
        Ok(Duration::from_micros(u64::from(self.u32()?)))
    }

    fn millis(&mut self) -> Result<Duration, SerializationError> {
        Ok(Duration::from_millis(u64::from(self.u32()?)))
    }
}

impl Value<'_> for RobotConfig {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        if buffer.len() < CONFIG_LEN {
            return Err(SerializationError::BufferTooSmall);
        }
        let mut w = Writer { buffer, pos: 0 };

        w.put(&[CONFIG_VERSION])?;

        let reflectance = &self.reflectance;
        w.micros(reflectance.charge_time)?;
        w.micros(reflectance.timeout)?;
        w.put(&reflectance.weight_step.to_le_bytes())?;

        let range = &self.range;
        w.micros(range.trigger_pulse)?;
        w.micros(range.echo_timeout)?;
        w.put(&range.micros_per_cm.to_le_bytes())?;
        w.put(&range.min_cm.to_le_bytes())?;
        w.put(&range.max_cm.to_le_bytes())?;

        let steering = &self.steering;
        w.put(&steering.kp.to_le_bytes())?;
        w.put(&steering.kd.to_le_bytes())?;
        w.put(&steering.base_duty.to_le_bytes())?;
        w.put(&steering.max_duty.to_le_bytes())?;
        w.put(&steering.center.to_le_bytes())?;
        w.millis(steering.period)?;

        let proximity = &self.proximity;
        w.put(&proximity.stop_distance_cm.to_le_bytes())?;
        w.put(&[proximity.confirm_threshold])?;
        w.millis(proximity.period)?;

        let capture = &self.capture;
        w.put(&capture.peer_address)?;
        w.put(&capture.local_address)?;
        w.millis(capture.ack_timeout)?;
        w.put(&[capture.max_attempts])?;

        let drive = &self.drive;
        w.put(&drive.max_duty.to_le_bytes())?;
        w.put(&drive.start_min_duty.to_le_bytes())?;
        w.put(&drive.kick_duty.to_le_bytes())?;
        w.millis(drive.kick_time)?;

        Ok(w.pos)
    }

    fn deserialize_from(buffer: &[u8]) -> Result<Self, SerializationError>
    where
        Self: Sized,
    {
        if buffer.len() < CONFIG_LEN {
            return Err(SerializationError::BufferTooSmall);
        }
        let mut r = Reader { buffer, pos: 0 };

        if r.u8()? != CONFIG_VERSION {
            return Err(SerializationError::InvalidFormat);
        }

        let reflectance = ReflectanceConfig {
            charge_time: r.micros()?,
            timeout: r.micros()?,
            weight_step: r.u32()?,
        };
        let range = RangeConfig {
            trigger_pulse: r.micros()?,
            echo_timeout: r.micros()?,
            micros_per_cm: r.u32()?,
            min_cm: r.u16()?,
            max_cm: r.u16()?,
        };
        let steering = SteeringConfig {
            kp: r.f32()?,
            kd: r.f32()?,
            base_duty: r.u16()?,
            max_duty: r.u16()?,
            center: r.u32()?,
            period: r.millis()?,
        };
        let proximity = ProximityConfig {
            stop_distance_cm: r.u16()?,
            confirm_threshold: r.u8()?,
            period: r.millis()?,
        };
        let capture = CaptureConfig {
            peer_address: r.take()?,
            local_address: r.take()?,
            ack_timeout: r.millis()?,
            max_attempts: r.u8()?,
        };
        let drive = DriveConfig {
            max_duty: r.u16()?,
            start_min_duty: r.u16()?,
            kick_duty: r.u16()?,
            kick_time: r.millis()?,
        };

        Ok(Self {
            reflectance,
            range,
            steering,
            proximity,
            capture,
            drive,
        })
    }
}

/// Loads the stored configuration, writing defaults on first boot.
///
/// Never fails: an unreadable store yields the defaults.
pub async fn load_or_init<F: NorFlash>(flash: &mut F, range: Range<u32>) -> (RobotConfig, ConfigSource) {
    let mut buffer = [0u8; CONFIG_BUFFER_LEN];

    let fetched = fetch_item::<StorageKey, RobotConfig, _>(
        flash,
        range.clone(),
        &mut NoCache::new(),
        &mut buffer,
        &StorageKey::RobotConfig,
    )
    .await;

    match fetched {
        Ok(Some(config)) => {
            info!("Configuration loaded from flash");
            (config.sanitized(), ConfigSource::Stored)
        }
        Ok(None) => {
            info!("No stored configuration, writing defaults");
            let defaults = RobotConfig::default();
            let stored = store_item(
                flash,
                range,
                &mut NoCache::new(),
                &mut buffer,
                &StorageKey::RobotConfig,
                &defaults,
            )
            .await;
            if stored.is_err() {
                warn!("Failed to store default configuration");
            }
            (defaults, ConfigSource::Defaults)
        }
        Err(_) => {
            error!("Stored configuration unreadable, running on defaults");
            (RobotConfig::default(), ConfigSource::Fallback)
        }
    }
}
