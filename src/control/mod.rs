//! Control logic: steering, obstacle debounce and the capture handshake
pub mod capture;
pub mod proximity;
pub mod steering;
