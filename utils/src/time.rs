//! Timestamp helper used for superblock and inode fields.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, clamped to 0 on a clock before 1970.
pub fn get_timestamp() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs() as i64)
		.unwrap_or(0)
}
