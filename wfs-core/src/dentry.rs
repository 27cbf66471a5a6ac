//! Directory entry scan, insert, and removal; path walking from the root.
//!
//! Directory entries are data, addressed through the same block addresser
//! as file bytes (§4.C/§4.D): under RAID 0 they are striped across disks by
//! block number, so a mutation runs once through the addresser (which picks
//! the stripe-owning disk internally); under RAID 1/1v the caller replays
//! the mutation once per disk. Only the parent inode's `size`/`nlinks` are
//! mirrored metadata (via [`inode::mutate`]), never the dentry bytes
//! themselves. Reads of an already-written directory use disk 0 as the
//! entry point to the addresser; under RAID 0 the addresser still resolves
//! each block to its real stripe-owning disk regardless of that index.

use crate::block;
use crate::disk::DiskSet;
use crate::error::{Result, WfsError};
use crate::inode;
use crate::layout::{Dentry, BLOCK_SIZE, RAID_0};

const RESERVED_SLOTS: u64 = 2; // "." and ".." are synthesized, never stored.
const CANONICAL_DISK: usize = 0;

fn read_dentry(set: &mut DiskSet, inum: u32, idx: u64, disk_idx: usize) -> Result<Dentry> {
	let off = idx * Dentry::SIZE as u64;
	let addr = block::resolve(set, inum, off, false, disk_idx)?;
	let bytes = set.disk(addr.disk).bytes_at(addr.offset, Dentry::SIZE);
	Ok(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const Dentry) })
}

fn write_dentry(set: &mut DiskSet, inum: u32, idx: u64, disk_idx: usize, d: &Dentry, allocate: bool) -> Result<()> {
	let off = idx * Dentry::SIZE as u64;
	let addr = block::resolve(set, inum, off, allocate, disk_idx)?;
	let bytes = set.disk_mut(addr.disk).bytes_at_mut(addr.offset, Dentry::SIZE);
	unsafe { std::ptr::write_unaligned(bytes.as_mut_ptr() as *mut Dentry, *d) };
	Ok(())
}

/// Disk indices a dentry mutation must be replayed on: under RAID 0 the
/// addresser already picks the correct stripe-owning disk from a single
/// call, so one (arbitrary) entry point suffices; under RAID 1/1v each disk
/// holds an independent copy and must be written separately.
fn write_targets(set: &DiskSet) -> Vec<usize> {
	if set.raid_mode() == RAID_0 {
		vec![CANONICAL_DISK]
	} else {
		(0..set.num_disks()).collect()
	}
}

/// Scans directory `dir_inum` for `name` against the canonical (disk 0) copy.
pub fn find(set: &mut DiskSet, dir_inum: u32, name: &str) -> Result<i32> {
	let size = inode::get(set.disk(CANONICAL_DISK), dir_inum).ok_or(WfsError::NotFound)?.size;
	let count = size / Dentry::SIZE as u64;
	for idx in 0..count {
		let d = read_dentry(set, dir_inum, idx, CANONICAL_DISK)?;
		if d.num != 0 && d.name_str() == name {
			return Ok(d.num);
		}
	}
	Err(WfsError::NotFound)
}

/// Inserts `(child_inum, name)` into directory `dir_inum` (striped under
/// RAID 0, replicated per disk otherwise — see [`write_targets`]). Reuses a
/// tombstoned slot past the reserved `.`/`..` slots if one exists; otherwise
/// appends, growing the directory.
pub fn add(set: &mut DiskSet, dir_inum: u32, name: &str, child_inum: i32) -> Result<()> {
	if find(set, dir_inum, name).is_ok() {
		return Err(WfsError::Exists);
	}

	let mut entry = Dentry::free();
	entry.num = child_inum;
	entry.set_name(name);

	let size = inode::get(set.disk(CANONICAL_DISK), dir_inum).ok_or(WfsError::NotFound)?.size;
	let count = size / Dentry::SIZE as u64;
	let targets = write_targets(set);

	for idx in RESERVED_SLOTS..count {
		let existing = read_dentry(set, dir_inum, idx, CANONICAL_DISK)?;
		if existing.num == 0 {
			for &disk_idx in &targets {
				write_dentry(set, dir_inum, idx, disk_idx, &entry, false)?;
			}
			bump_nlinks(set, dir_inum)?;
			return Ok(());
		}
	}

	let append_idx = count.max(RESERVED_SLOTS);
	for &disk_idx in &targets {
		write_dentry(set, dir_inum, append_idx, disk_idx, &entry, true)?;
	}
	let new_size = (append_idx + 1) * Dentry::SIZE as u64;
	let rounded = new_size.max(BLOCK_SIZE as u64).div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64;
	inode::mutate(set, dir_inum, |_, inode| inode.size = inode.size.max(rounded))?;
	bump_nlinks(set, dir_inum)?;
	Ok(())
}

fn bump_nlinks(set: &mut DiskSet, dir_inum: u32) -> Result<()> {
	inode::mutate(set, dir_inum, |_, inode| inode.nlinks += 1)
}

/// Tombstones the dentry named `name` in directory `dir_inum`.
/// Does not compact the directory's remaining entries.
pub fn remove(set: &mut DiskSet, dir_inum: u32, name: &str) -> Result<i32> {
	let size = inode::get(set.disk(CANONICAL_DISK), dir_inum).ok_or(WfsError::NotFound)?.size;
	let count = size / Dentry::SIZE as u64;
	let targets = write_targets(set);
	for idx in 0..count {
		let d = read_dentry(set, dir_inum, idx, CANONICAL_DISK)?;
		if d.num != 0 && d.name_str() == name {
			for &disk_idx in &targets {
				write_dentry(set, dir_inum, idx, disk_idx, &Dentry::free(), false)?;
			}
			return Ok(d.num);
		}
	}
	Err(WfsError::NotFound)
}

/// Lists every live dentry's name in directory `dir_inum`.
pub fn list(set: &mut DiskSet, dir_inum: u32) -> Result<Vec<(i32, String)>> {
	let size = inode::get(set.disk(CANONICAL_DISK), dir_inum).ok_or(WfsError::NotFound)?.size;
	let count = size / Dentry::SIZE as u64;
	let mut out = Vec::new();
	for idx in 0..count {
		let d = read_dentry(set, dir_inum, idx, CANONICAL_DISK)?;
		if d.num != 0 {
			out.push((d.num, d.name_str()));
		}
	}
	Ok(out)
}

/// Walks `path` (an absolute, `/`-separated path) from the root inode (0),
/// returning the inode number of the final component.
pub fn walk(set: &mut DiskSet, path: &str) -> Result<i32> {
	let mut current: i32 = 0;
	for component in path.split('/').filter(|c| !c.is_empty()) {
		let inode = inode::get(set.disk(CANONICAL_DISK), current as u32).ok_or(WfsError::NotFound)?;
		if !inode.is_dir() {
			return Err(WfsError::NotADirectory);
		}
		current = find(set, current as u32, component)?;
	}
	Ok(current)
}

/// Splits `path` into `(parent_path, leaf_name)`; fails on `/` or an empty path.
pub fn split_parent(path: &str) -> Result<(&str, &str)> {
	let trimmed = path.trim_end_matches('/');
	if trimmed.is_empty() {
		return Err(WfsError::InvalidArgument("cannot operate on the root directory".into()));
	}
	match trimmed.rfind('/') {
		Some(idx) => {
			let parent = &trimmed[..idx];
			let parent = if parent.is_empty() { "/" } else { parent };
			Ok((parent, &trimmed[idx + 1..]))
		}
		None => Ok(("/", trimmed)),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::disk::DiskSet;
	use crate::layout::{Layout, RAID_0, S_IFDIR, S_IFREG};
	use crate::testutil::make_disk;

	fn root_set(num_disks: usize, raid: u32) -> DiskSet {
		let layout = Layout::compute(32, 32);
		let disks = (0..num_disks).map(|i| make_disk(&layout, i as u32, raid, 0)).collect();
		let mut set = DiskSet::from_disks(disks, raid);
		let root = inode::allocate(&mut set).unwrap();
		assert_eq!(root, 0);
		inode::initialize(&mut set, root, S_IFDIR | 0o755, 0, 0).unwrap();
		set
	}

	#[test]
	fn add_find_remove_roundtrip() {
		let mut set = root_set(1, 1);
		let child = inode::allocate(&mut set).unwrap();
		inode::initialize(&mut set, child, S_IFREG | 0o644, 0, 0).unwrap();

		add(&mut set, 0, "f", child as i32).unwrap();
		assert_eq!(find(&mut set, 0, "f").unwrap(), child as i32);

		assert_eq!(remove(&mut set, 0, "f").unwrap(), child as i32);
		assert!(matches!(find(&mut set, 0, "f"), Err(WfsError::NotFound)));
	}

	#[test]
	fn add_duplicate_name_fails() {
		let mut set = root_set(1, 1);
		let child = inode::allocate(&mut set).unwrap();
		inode::initialize(&mut set, child, S_IFREG | 0o644, 0, 0).unwrap();
		add(&mut set, 0, "f", child as i32).unwrap();
		assert!(matches!(add(&mut set, 0, "f", child as i32), Err(WfsError::Exists)));
	}

	#[test]
	fn removed_slot_is_reused_by_next_add() {
		let mut set = root_set(1, 1);
		let a = inode::allocate(&mut set).unwrap();
		inode::initialize(&mut set, a, S_IFREG | 0o644, 0, 0).unwrap();
		add(&mut set, 0, "a", a as i32).unwrap();
		remove(&mut set, 0, "a").unwrap();

		let size_before = inode::get(set.disk(0), 0).unwrap().size;
		let b = inode::allocate(&mut set).unwrap();
		inode::initialize(&mut set, b, S_IFREG | 0o644, 0, 0).unwrap();
		add(&mut set, 0, "b", b as i32).unwrap();
		let size_after = inode::get(set.disk(0), 0).unwrap().size;
		assert_eq!(size_before, size_after);
	}

	#[test]
	fn path_walk_nested() {
		let mut set = root_set(1, 1);
		let a = inode::allocate(&mut set).unwrap();
		inode::initialize(&mut set, a, S_IFDIR | 0o755, 0, 0).unwrap();
		add(&mut set, 0, "a", a as i32).unwrap();

		let f = inode::allocate(&mut set).unwrap();
		inode::initialize(&mut set, f, S_IFREG | 0o644, 0, 0).unwrap();
		add(&mut set, a, "f", f as i32).unwrap();

		assert_eq!(walk(&mut set, "/a/f").unwrap(), f as i32);
	}

	#[test]
	fn split_parent_examples() {
		assert_eq!(split_parent("/a/f").unwrap(), ("/a", "f"));
		assert_eq!(split_parent("/f").unwrap(), ("/", "f"));
		assert!(split_parent("/").is_err());
	}

	#[test]
	fn raid0_directory_content_is_striped_metadata_is_mirrored() {
		let mut set = root_set(3, RAID_0);
		let child = inode::allocate(&mut set).unwrap();
		inode::initialize(&mut set, child, S_IFREG | 0o644, 0, 0).unwrap();
		add(&mut set, 0, "f", child as i32).unwrap();

		assert_eq!(find(&mut set, 0, "f").unwrap(), child as i32);

		// Inode metadata (size/nlinks) is mirrored across every disk...
		let root0 = inode::get(set.disk(0), 0).unwrap();
		let (size0, nlinks0) = (root0.size, root0.nlinks);
		for disk_idx in 1..3 {
			let root_i = inode::get(set.disk(disk_idx), 0).unwrap();
			assert_eq!(root_i.size, size0);
			assert_eq!(root_i.nlinks, nlinks0);
		}

		// ...but the dentry bytes themselves live on exactly one stripe-owning
		// disk, not copied to every disk.
		let addr = block::resolve(&mut set, 0, RESERVED_SLOTS * Dentry::SIZE as u64, false, 0).unwrap();
		for other in (0..3).filter(|&d| d != addr.disk) {
			let bytes = set.disk(other).bytes_at(addr.offset, Dentry::SIZE);
			let d: Dentry = unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const Dentry) };
			assert_eq!(d.num, 0, "entry must not be duplicated onto non-owning disk {other}");
		}
	}
}
