//! Disk sizing helpers.

use libc::ioctl;
use std::ffi::c_long;
use std::fs::{self, File};
use std::io::{self, Error};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

macro_rules! ioc {
	($a:expr, $b:expr, $c:expr, $d:expr) => {
		(($a) << 30) | (($b) << 8) | ($c) | (($d) << 16)
	};
}

macro_rules! ior {
	($a:expr, $b:expr, $c:ty) => {
		ioc!(2, $a, $b, std::mem::size_of::<$c>() as c_long)
	};
}

/// ioctl command: get the size of a block device, in bytes.
const BLKGETSIZE64: c_long = ior!(0x12, 114, u64);

/// Returns the size in bytes of the file or block device at `path`.
pub fn get_disk_size(path: &Path) -> io::Result<u64> {
	let metadata = fs::metadata(path)?;
	let file_type = metadata.file_type();

	if file_type.is_block_device() || file_type.is_char_device() {
		let dev = File::open(path)?;
		let mut size: u64 = 0;
		let ret = unsafe { ioctl(dev.as_raw_fd(), BLKGETSIZE64 as _, &mut size) };
		if ret < 0 {
			return Err(Error::last_os_error());
		}
		Ok(size)
	} else {
		Ok(metadata.len())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::io::Write;

	#[test]
	fn regular_file_size() {
		let mut f = tempfile::NamedTempFile::new().unwrap();
		f.write_all(&[0u8; 4096]).unwrap();
		let size = get_disk_size(f.path()).unwrap();
		assert_eq!(size, 4096);
	}
}
