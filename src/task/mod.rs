pub mod flash_storage;
pub mod line_follow;
pub mod orchestrate;
pub mod proximity_watch;
pub mod radio_receive;
pub mod resources;
