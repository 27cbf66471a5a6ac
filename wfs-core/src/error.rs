//! Error currency shared by every `wfs-core` operation.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum WfsError {
	/// A path component, dentry, or inode number does not exist.
	NotFound,
	/// A dentry with the requested name already exists.
	Exists,
	/// The inode or data bitmap has no free bits.
	NoSpace,
	/// An internal invariant was violated, or an underlying I/O call failed.
	IoError(String),
	/// Arguments supplied to `mkfs` failed validation.
	InvalidArgument(String),
	/// Superblocks in a disk set disagree; the set cannot be mounted.
	SetMismatch,
	/// The target of a directory-only operation is a regular file.
	NotADirectory,
	/// The target of a file-only operation is a directory.
	IsADirectory,
}

impl fmt::Display for WfsError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NotFound => write!(f, "no such file or directory"),
			Self::Exists => write!(f, "file exists"),
			Self::NoSpace => write!(f, "no space left on device"),
			Self::IoError(msg) => write!(f, "I/O error: {msg}"),
			Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
			Self::SetMismatch => write!(f, "disk set superblocks do not match"),
			Self::NotADirectory => write!(f, "not a directory"),
			Self::IsADirectory => write!(f, "is a directory"),
		}
	}
}

impl std::error::Error for WfsError {}

impl From<io::Error> for WfsError {
	fn from(e: io::Error) -> Self {
		WfsError::IoError(e.to_string())
	}
}

impl WfsError {
	/// Maps this error onto the errno FUSE expects in a reply.
	pub fn errno(&self) -> i32 {
		match self {
			Self::NotFound => libc::ENOENT,
			Self::Exists => libc::EEXIST,
			Self::NoSpace => libc::ENOSPC,
			Self::IoError(_) => libc::EIO,
			Self::InvalidArgument(_) => libc::EINVAL,
			Self::SetMismatch => libc::EIO,
			Self::NotADirectory => libc::ENOTDIR,
			Self::IsADirectory => libc::EISDIR,
		}
	}
}

pub type Result<T> = std::result::Result<T, WfsError>;
