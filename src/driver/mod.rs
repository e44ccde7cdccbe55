//! Hardware drivers, generic over `embedded-hal` so they run against mocks on the host
pub mod motor;
pub mod radio;
pub mod reflectance;
pub mod timing;
pub mod ultrasonic;

#[cfg(test)]
pub(crate) mod mock;
