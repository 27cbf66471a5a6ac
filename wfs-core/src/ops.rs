//! Path- and inode-based filesystem operations, tying together the
//! directory, inode, block-addressing, and RAID-voting components.
//!
//! Synthesizing `.`/`..` for directory listings is left to the host
//! integration layer (it already tracks parent/child inode relationships
//! for the host's own inode table); this module returns real entries only.

use crate::block;
use crate::dentry;
use crate::disk::DiskSet;
use crate::error::{Result, WfsError};
use crate::inode;
use crate::layout::{Inode, BLOCK_SIZE, S_IFDIR, S_IFREG};
use crate::raid;
use utils::time::get_timestamp;

/// File/directory metadata returned by `getattr`.
#[derive(Clone, Copy, Debug)]
pub struct Attr {
	pub ino: u32,
	pub mode: u32,
	pub uid: u32,
	pub gid: u32,
	pub size: u64,
	pub nlinks: u32,
	pub atim: i64,
	pub mtim: i64,
	pub ctim: i64,
	pub blocks: u64,
}

fn attr_of(num: u32, inode: &Inode) -> Attr {
	Attr {
		ino: num,
		mode: inode.mode,
		uid: inode.uid,
		gid: inode.gid,
		size: inode.size,
		nlinks: inode.nlinks,
		atim: inode.atim,
		mtim: inode.mtim,
		ctim: inode.ctim,
		blocks: inode.size.div_ceil(BLOCK_SIZE as u64),
	}
}

pub fn getattr(set: &mut DiskSet, inum: u32) -> Result<Attr> {
	log::trace!("getattr(inum={inum})");
	let inode = inode::get(set.disk(0), inum).ok_or(WfsError::NotFound)?;
	let attr = attr_of(inum, inode);
	log::trace!("getattr(inum={inum}) -> size={} mode={:o}", attr.size, attr.mode);
	Ok(attr)
}

pub fn getattr_path(set: &mut DiskSet, path: &str) -> Result<Attr> {
	log::trace!("getattr_path({path})");
	let inum = resolve_path(set, path)?;
	getattr(set, inum as u32)
}

pub fn readdir(set: &mut DiskSet, dir_inum: u32) -> Result<Vec<(i32, String)>> {
	log::trace!("readdir(dir_inum={dir_inum})");
	let inode = inode::get(set.disk(0), dir_inum).ok_or(WfsError::NotFound)?;
	if !inode.is_dir() {
		return Err(WfsError::NotADirectory);
	}
	let entries = dentry::list(set, dir_inum)?;
	log::trace!("readdir(dir_inum={dir_inum}) -> {} entries", entries.len());
	Ok(entries)
}

pub fn readdir_path(set: &mut DiskSet, path: &str) -> Result<Vec<(i32, String)>> {
	log::trace!("readdir_path({path})");
	let inum = resolve_path(set, path)?;
	readdir(set, inum as u32)
}

fn resolve_path(set: &mut DiskSet, path: &str) -> Result<i32> {
	log::trace!("resolve_path({path})");
	if path == "/" || path.is_empty() {
		return Ok(0);
	}
	dentry::walk(set, path)
}

fn create(set: &mut DiskSet, parent: u32, name: &str, mode: u32, uid: u32, gid: u32) -> Result<u32> {
	let parent_inode = inode::get(set.disk(0), parent).ok_or(WfsError::NotFound)?;
	if !parent_inode.is_dir() {
		return Err(WfsError::NotADirectory);
	}
	if dentry::find(set, parent, name).is_ok() {
		return Err(WfsError::Exists);
	}
	let num = inode::allocate(set)?;
	log::debug!("create: allocated inode {num} for {parent}/{name} mode={mode:o}");
	inode::initialize(set, num, mode, uid, gid)?;
	if let Err(e) = dentry::add(set, parent, name, num as i32) {
		inode::free(set, num).ok();
		return Err(e);
	}
	inode::mutate(set, parent, |_, inode| inode.mtim = get_timestamp())?;
	Ok(num)
}

pub fn mknod(set: &mut DiskSet, parent: u32, name: &str, perm: u32, uid: u32, gid: u32) -> Result<u32> {
	log::trace!("mknod(parent={parent}, name={name}, perm={perm:o})");
	let num = create(set, parent, name, S_IFREG | (perm & 0o7777), uid, gid)?;
	log::trace!("mknod(parent={parent}, name={name}) -> inum={num}");
	Ok(num)
}

pub fn mknod_path(set: &mut DiskSet, path: &str, perm: u32, uid: u32, gid: u32) -> Result<u32> {
	log::trace!("mknod_path({path})");
	let (parent, name) = dentry::split_parent(path)?;
	let parent_inum = resolve_path(set, parent)?;
	mknod(set, parent_inum as u32, name, perm, uid, gid)
}

pub fn mkdir(set: &mut DiskSet, parent: u32, name: &str, perm: u32, uid: u32, gid: u32) -> Result<u32> {
	log::trace!("mkdir(parent={parent}, name={name}, perm={perm:o})");
	let num = create(set, parent, name, S_IFDIR | (perm & 0o7777), uid, gid)?;
	log::trace!("mkdir(parent={parent}, name={name}) -> inum={num}");
	Ok(num)
}

pub fn mkdir_path(set: &mut DiskSet, path: &str, perm: u32, uid: u32, gid: u32) -> Result<u32> {
	log::trace!("mkdir_path({path})");
	let (parent, name) = dentry::split_parent(path)?;
	let parent_inum = resolve_path(set, parent)?;
	mkdir(set, parent_inum as u32, name, perm, uid, gid)
}

pub fn read(set: &mut DiskSet, inum: u32, off: u64, len: usize) -> Result<Vec<u8>> {
	log::trace!("read(inum={inum}, off={off}, len={len})");
	let inode = inode::get(set.disk(0), inum).ok_or(WfsError::NotFound)?;
	if inode.is_dir() {
		return Err(WfsError::IsADirectory);
	}
	let size = inode.size;
	if off >= size {
		return Ok(Vec::new());
	}
	let clipped = len.min((size - off) as usize);
	let data = raid::read(set, inum, off, clipped)?;
	log::trace!("read(inum={inum}, off={off}) -> {} bytes", data.len());
	Ok(data)
}

pub fn read_path(set: &mut DiskSet, path: &str, off: u64, len: usize) -> Result<Vec<u8>> {
	log::trace!("read_path({path}, off={off}, len={len})");
	let inum = resolve_path(set, path)?;
	read(set, inum as u32, off, len)
}

/// Writes `buf` at inode-relative offset `off`, replaying the mutation on
/// every disk so the reported byte count is always `buf.len()` regardless
/// of RAID mode.
pub fn write(set: &mut DiskSet, inum: u32, buf: &[u8], off: u64) -> Result<usize> {
	log::trace!("write(inum={inum}, off={off}, len={})", buf.len());
	if inode::get(set.disk(0), inum).ok_or(WfsError::NotFound)?.is_dir() {
		return Err(WfsError::IsADirectory);
	}

	let num_disks = set.num_disks();
	let raid = set.raid_mode();
	let mut remaining = buf;
	let mut pos = off;

	while !remaining.is_empty() {
		let block_off = pos % BLOCK_SIZE as u64;
		let chunk = ((BLOCK_SIZE as u64 - block_off) as usize).min(remaining.len());

		if raid == crate::layout::RAID_0 {
			let addr = block::resolve(set, inum, pos, true, 0)?;
			set.disk_mut(addr.disk)
				.bytes_at_mut(addr.offset, chunk)
				.copy_from_slice(&remaining[..chunk]);
		} else {
			for disk_idx in 0..num_disks {
				let addr = block::resolve(set, inum, pos, true, disk_idx)?;
				set.disk_mut(addr.disk)
					.bytes_at_mut(addr.offset, chunk)
					.copy_from_slice(&remaining[..chunk]);
			}
		}

		pos += chunk as u64;
		remaining = &remaining[chunk..];
	}

	let end = off + buf.len() as u64;
	inode::mutate(set, inum, |_, inode| {
		inode.size = inode.size.max(end);
		inode.mtim = get_timestamp();
	})?;
	log::trace!("write(inum={inum}, off={off}) -> {} bytes", buf.len());
	Ok(buf.len())
}

pub fn write_path(set: &mut DiskSet, path: &str, buf: &[u8], off: u64) -> Result<usize> {
	log::trace!("write_path({path}, off={off}, len={})", buf.len());
	let inum = resolve_path(set, path)?;
	write(set, inum as u32, buf, off)
}

fn free_file_blocks(set: &mut DiskSet, inum: u32) -> Result<()> {
	for disk_idx in 0..set.num_disks() {
		block::free_all(set, inum, disk_idx)?;
	}
	Ok(())
}

pub fn unlink(set: &mut DiskSet, parent: u32, name: &str) -> Result<()> {
	log::trace!("unlink(parent={parent}, name={name})");
	let child = dentry::find(set, parent, name)?;
	// Per the known wfs_unlink defect, only this file's own blocks are
	// freed; a wholesale bitmap wipe is never performed.
	free_file_blocks(set, child as u32)?;
	dentry::remove(set, parent, name)?;
	inode::free(set, child as u32)?;
	inode::mutate(set, parent, |_, inode| inode.mtim = get_timestamp())?;
	log::trace!("unlink(parent={parent}, name={name}) -> freed inode {child}");
	Ok(())
}

pub fn unlink_path(set: &mut DiskSet, path: &str) -> Result<()> {
	log::trace!("unlink_path({path})");
	let (parent, name) = dentry::split_parent(path)?;
	let parent_inum = resolve_path(set, parent)?;
	unlink(set, parent_inum as u32, name)
}

/// Removes an empty directory. Emptiness is only checked when built with
/// the `strict-rmdir` feature; by default this mirrors the permissive
/// behavior observed in the system this design was distilled from.
pub fn rmdir(set: &mut DiskSet, parent: u32, name: &str) -> Result<()> {
	log::trace!("rmdir(parent={parent}, name={name})");
	let child = dentry::find(set, parent, name)?;

	#[cfg(feature = "strict-rmdir")]
	{
		let entries = readdir(set, child as u32)?;
		if !entries.is_empty() {
			return Err(WfsError::InvalidArgument("directory not empty".into()));
		}
	}

	free_file_blocks(set, child as u32)?;
	dentry::remove(set, parent, name)?;
	inode::free(set, child as u32)?;
	inode::mutate(set, parent, |_, inode| inode.mtim = get_timestamp())?;
	log::trace!("rmdir(parent={parent}, name={name}) -> freed inode {child}");
	Ok(())
}

pub fn rmdir_path(set: &mut DiskSet, path: &str) -> Result<()> {
	log::trace!("rmdir_path({path})");
	let (parent, name) = dentry::split_parent(path)?;
	let parent_inum = resolve_path(set, parent)?;
	rmdir(set, parent_inum as u32, name)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::disk::DiskSet;
	use crate::layout::{Layout, RAID_0, RAID_1, RAID_1V};
	use crate::testutil::make_disk;

	fn mkfs_set(num_disks: usize, raid: u32, num_inodes: u32, num_blocks: u32) -> DiskSet {
		let layout = Layout::compute(num_inodes, num_blocks);
		let disks = (0..num_disks).map(|i| make_disk(&layout, i as u32, raid, 1)).collect();
		let mut set = DiskSet::from_disks(disks, raid);
		let root = inode::allocate(&mut set).unwrap();
		assert_eq!(root, 0);
		inode::initialize(&mut set, root, S_IFDIR | 0o755, 0, 0).unwrap();
		set
	}

	#[test]
	fn scenario_mkdir_mknod_write_read() {
		let mut set = mkfs_set(2, RAID_1, 32, 32);
		let a = mkdir_path(&mut set, "/a", 0o755, 0, 0).unwrap();
		assert_ne!(a, 0);
		let f = mknod_path(&mut set, "/a/f", 0o644, 0, 0).unwrap();

		let n = write_path(&mut set, "/a/f", b"hello", 0).unwrap();
		assert_eq!(n, 5);

		let data = read_path(&mut set, "/a/f", 0, 5).unwrap();
		assert_eq!(&data, b"hello");

		let attr = getattr_path(&mut set, "/a/f").unwrap();
		assert_eq!(attr.size, 5);
		assert_eq!(attr.nlinks, 1);
		assert_eq!(attr.ino, f);
	}

	#[test]
	fn write_returns_full_byte_count_under_raid0() {
		let mut set = mkfs_set(3, RAID_0, 32, 64);
		mknod_path(&mut set, "/g", 0o644, 0, 0).unwrap();
		let buf = vec![7u8; 2048];
		let n = write_path(&mut set, "/g", &buf, 0).unwrap();
		assert_eq!(n, 2048);
		let data = read_path(&mut set, "/g", 0, 2048).unwrap();
		assert_eq!(data, buf);
	}

	#[test]
	fn unlink_frees_blocks_without_wiping_whole_bitmap() {
		let mut set = mkfs_set(2, RAID_1, 32, 32);
		mkdir_path(&mut set, "/a", 0o755, 0, 0).unwrap();
		mknod_path(&mut set, "/a/f", 0o644, 0, 0).unwrap();
		write_path(&mut set, "/a/f", b"hello", 0).unwrap();

		let other = mknod_path(&mut set, "/keep", 0o644, 0, 0).unwrap();
		write_path(&mut set, "/keep", b"data", 0).unwrap();

		unlink_path(&mut set, "/a/f").unwrap();
		assert!(readdir_path(&mut set, "/a").unwrap().is_empty());

		// The unrelated file's inode and data survive unlink of /a/f.
		let attr = getattr(&mut set, other).unwrap();
		assert_eq!(attr.size, 4);
		let data = read_path(&mut set, "/keep", 0, 4).unwrap();
		assert_eq!(&data, b"data");
	}

	#[test]
	fn unlink_under_raid0_frees_only_its_own_striped_blocks() {
		let mut set = mkfs_set(3, RAID_0, 32, 64);
		mknod_path(&mut set, "/f", 0o644, 0, 0).unwrap();
		let buf = vec![9u8; 3000];
		write_path(&mut set, "/f", &buf, 0).unwrap();

		let other = mknod_path(&mut set, "/keep", 0o644, 0, 0).unwrap();
		let keep_buf = vec![5u8; 3000];
		write_path(&mut set, "/keep", &keep_buf, 0).unwrap();

		unlink_path(&mut set, "/f").unwrap();

		// A file spanning many stripes across all three disks must not
		// corrupt the unrelated file's blocks on any disk.
		let attr = getattr(&mut set, other).unwrap();
		assert_eq!(attr.size, 3000);
		let data = read_path(&mut set, "/keep", 0, 3000).unwrap();
		assert_eq!(data, keep_buf);
	}

	#[test]
	fn raid1v_read_tolerates_single_disk_corruption() {
		let mut set = mkfs_set(3, RAID_1V, 32, 32);
		mknod_path(&mut set, "/f", 0o644, 0, 0).unwrap();
		write_path(&mut set, "/f", b"abcd", 0).unwrap();

		let addr = block::resolve(&mut set, 1, 0, false, 1).unwrap();
		set.disk_mut(addr.disk).bytes_at_mut(addr.offset, 4).copy_from_slice(b"abXd");

		let data = read_path(&mut set, "/f", 0, 4).unwrap();
		assert_eq!(&data, b"abcd");
	}
}
