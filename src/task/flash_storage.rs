//! Flash storage for the robot configuration
//!
//! The configuration lives in the last two sectors of flash, managed by
//! `sequential-storage` for wear leveling. It is read once at boot before any
//! control task starts, so no task owns the flash afterwards.

use embassy_rp::flash::{Async, Flash, ERASE_SIZE};
use embassy_rp::peripherals::FLASH;
use line_robot::system::config::{self, ConfigSource, RobotConfig};

use crate::task::resources::StorageResources;

/// Total flash size of the board
const FLASH_SIZE: usize = 2048 * 1024;

/// Number of sectors to use for storage (2 sectors for wear leveling)
const STORAGE_SECTOR_COUNT: usize = 2;

/// Total storage size
const STORAGE_SIZE: usize = ERASE_SIZE * STORAGE_SECTOR_COUNT;

/// Flash storage offset, the last two sectors
const STORAGE_OFFSET: u32 = (FLASH_SIZE - STORAGE_SIZE) as u32;

/// Loads the configuration, storing defaults if none exist yet
pub async fn load_config(r: StorageResources) -> (RobotConfig, ConfigSource) {
    let mut flash = Flash::<FLASH, Async, FLASH_SIZE>::new(r.flash, r.dma);
    let flash_range = STORAGE_OFFSET..STORAGE_OFFSET + STORAGE_SIZE as u32;

    config::load_or_init(&mut flash, flash_range).await
}
