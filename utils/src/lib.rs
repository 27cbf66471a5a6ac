//! Small helpers shared by the `wfs-mkfs` and `wfsd` binaries.

use std::fmt::Display;
use std::process::exit;

pub mod disk;
pub mod time;

/// Prints `bin: msg` to stderr and exits the process with status 1.
///
/// Mirrors the CLI error convention used by both binaries: validation and
/// I/O failures are reported this way rather than via a panic.
pub fn error(bin: &str, msg: impl Display) -> ! {
	eprintln!("{bin}: {msg}");
	exit(1);
}
