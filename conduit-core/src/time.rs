//! Timestamp helpers shared across crates that need wall-clock seconds or
//! milliseconds since the Unix epoch.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

pub fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}
