//! Translates FUSE requests into `wfs-core` operations.
//!
//! FUSE reserves inode 1 for the mount root; wfs inode 0 ("/") is mapped to
//! it, and every other wfs inode number `n` is exposed as FUSE inode `n+1`.
//! FUSE does not hand `readdir`/`getattr` a parent inode, so this adapter
//! keeps its own small `fuse_ino -> parent fuse_ino` map, populated as
//! `lookup`/`mknod`/`mkdir` discover entries, and uses it to synthesize the
//! `.`/`..` entries that `wfs-core::ops::readdir` does not.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request};

use wfs_core::disk::DiskSet;
use wfs_core::layout::S_IFDIR;
use wfs_core::ops::{self, Attr};

const TTL: Duration = Duration::from_secs(1);

fn to_fuse_ino(wfs_inum: u32) -> u64 {
	wfs_inum as u64 + 1
}

fn to_wfs_inum(fuse_ino: u64) -> u32 {
	(fuse_ino - 1) as u32
}

fn secs_to_time(secs: i64) -> SystemTime {
	if secs >= 0 {
		UNIX_EPOCH + Duration::from_secs(secs as u64)
	} else {
		UNIX_EPOCH
	}
}

fn to_file_attr(attr: &Attr) -> FileAttr {
	let kind = if attr.mode & S_IFDIR != 0 { FileType::Directory } else { FileType::RegularFile };
	FileAttr {
		ino: to_fuse_ino(attr.ino),
		size: attr.size,
		blocks: attr.blocks,
		atime: secs_to_time(attr.atim),
		mtime: secs_to_time(attr.mtim),
		ctime: secs_to_time(attr.ctim),
		crtime: secs_to_time(attr.ctim),
		kind,
		perm: (attr.mode & 0o7777) as u16,
		nlink: attr.nlinks,
		uid: attr.uid,
		gid: attr.gid,
		rdev: 0,
		blksize: wfs_core::layout::BLOCK_SIZE as u32,
		flags: 0,
	}
}

pub struct WfsFilesystem {
	set: DiskSet,
	parent_of: HashMap<u64, u64>,
}

impl WfsFilesystem {
	pub fn new(set: DiskSet) -> Self {
		let mut parent_of = HashMap::new();
		parent_of.insert(1, 1); // root is its own parent
		WfsFilesystem { set, parent_of }
	}

	fn remember(&mut self, child: u64, parent: u64) {
		self.parent_of.insert(child, parent);
	}
}

impl Filesystem for WfsFilesystem {
	fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
		log::trace!("lookup(parent={parent}, name={name:?})");
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match wfs_core::dentry::find(&mut self.set, to_wfs_inum(parent), name) {
			Ok(child) => match ops::getattr(&mut self.set, child as u32) {
				Ok(attr) => {
					self.remember(to_fuse_ino(child as u32), parent);
					log::trace!("lookup(parent={parent}, name={name:?}) -> ino={child}");
					reply.entry(&TTL, &to_file_attr(&attr), 0);
				}
				Err(e) => reply.error(e.errno()),
			},
			Err(e) => {
				log::debug!("lookup(parent={parent}, name={name:?}) failed: {e}");
				reply.error(e.errno());
			}
		}
	}

	fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
		log::trace!("getattr(ino={ino})");
		match ops::getattr(&mut self.set, to_wfs_inum(ino)) {
			Ok(attr) => reply.attr(&TTL, &to_file_attr(&attr)),
			Err(e) => {
				log::debug!("getattr(ino={ino}) failed: {e}");
				reply.error(e.errno());
			}
		}
	}

	fn mknod(
		&mut self,
		req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		mode: u32,
		_umask: u32,
		_rdev: u32,
		reply: ReplyEntry,
	) {
		log::trace!("mknod(parent={parent}, name={name:?}, mode={mode:o})");
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match ops::mknod(&mut self.set, to_wfs_inum(parent), name, mode & 0o7777, req.uid(), req.gid()) {
			Ok(num) => {
				self.remember(to_fuse_ino(num), parent);
				let attr = ops::getattr(&mut self.set, num).expect("just created");
				log::trace!("mknod(parent={parent}, name={name:?}) -> ino={num}");
				reply.entry(&TTL, &to_file_attr(&attr), 0);
			}
			Err(e) => {
				log::debug!("mknod(parent={parent}, name={name:?}) failed: {e}");
				reply.error(e.errno());
			}
		}
	}

	fn mkdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
		log::trace!("mkdir(parent={parent}, name={name:?}, mode={mode:o})");
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match ops::mkdir(&mut self.set, to_wfs_inum(parent), name, mode & 0o7777, req.uid(), req.gid()) {
			Ok(num) => {
				self.remember(to_fuse_ino(num), parent);
				let attr = ops::getattr(&mut self.set, num).expect("just created");
				log::trace!("mkdir(parent={parent}, name={name:?}) -> ino={num}");
				reply.entry(&TTL, &to_file_attr(&attr), 0);
			}
			Err(e) => {
				log::debug!("mkdir(parent={parent}, name={name:?}) failed: {e}");
				reply.error(e.errno());
			}
		}
	}

	fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		log::trace!("unlink(parent={parent}, name={name:?})");
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match ops::unlink(&mut self.set, to_wfs_inum(parent), name) {
			Ok(()) => reply.ok(),
			Err(e) => {
				log::debug!("unlink(parent={parent}, name={name:?}) failed: {e}");
				reply.error(e.errno());
			}
		}
	}

	fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		log::trace!("rmdir(parent={parent}, name={name:?})");
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match ops::rmdir(&mut self.set, to_wfs_inum(parent), name) {
			Ok(()) => reply.ok(),
			Err(e) => {
				log::debug!("rmdir(parent={parent}, name={name:?}) failed: {e}");
				reply.error(e.errno());
			}
		}
	}

	fn read(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		size: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyData,
	) {
		log::trace!("read(ino={ino}, offset={offset}, size={size})");
		match ops::read(&mut self.set, to_wfs_inum(ino), offset as u64, size as usize) {
			Ok(data) => {
				log::trace!("read(ino={ino}, offset={offset}) -> {} bytes", data.len());
				reply.data(&data);
			}
			Err(e) => {
				log::debug!("read(ino={ino}, offset={offset}) failed: {e}");
				reply.error(e.errno());
			}
		}
	}

	fn write(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		data: &[u8],
		_write_flags: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyWrite,
	) {
		log::trace!("write(ino={ino}, offset={offset}, len={})", data.len());
		match ops::write(&mut self.set, to_wfs_inum(ino), data, offset as u64) {
			Ok(n) => {
				log::trace!("write(ino={ino}, offset={offset}) -> {n} bytes");
				reply.written(n as u32);
			}
			Err(e) => {
				log::debug!("write(ino={ino}, offset={offset}) failed: {e}");
				reply.error(e.errno());
			}
		}
	}

	fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
		log::trace!("readdir(ino={ino}, offset={offset})");
		let wfs_inum = to_wfs_inum(ino);
		let parent = *self.parent_of.get(&ino).unwrap_or(&ino);

		let entries = match ops::readdir(&mut self.set, wfs_inum) {
			Ok(e) => e,
			Err(e) => {
				log::debug!("readdir(ino={ino}) failed: {e}");
				reply.error(e.errno());
				return;
			}
		};

		let mut all: Vec<(u64, FileType, String)> = vec![
			(ino, FileType::Directory, ".".to_string()),
			(parent, FileType::Directory, "..".to_string()),
		];
		for (num, name) in entries {
			let kind = match ops::getattr(&mut self.set, num as u32) {
				Ok(a) if a.mode & S_IFDIR != 0 => FileType::Directory,
				_ => FileType::RegularFile,
			};
			all.push((to_fuse_ino(num as u32), kind, name));
		}

		let total = all.len();
		for (i, (ino, kind, name)) in all.into_iter().enumerate().skip(offset as usize) {
			if reply.add(ino, (i + 1) as i64, kind, &name) {
				break;
			}
		}
		log::trace!("readdir(ino={ino}, offset={offset}) -> {total} entries");
		reply.ok();
	}

	fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
		log::trace!("open(ino={ino}, flags={flags:#x})");
		reply.opened(0, 0);
	}

	fn opendir(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
		log::trace!("opendir(ino={ino}, flags={flags:#x})");
		reply.opened(0, 0);
	}
}
