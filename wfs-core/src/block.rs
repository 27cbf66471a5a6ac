//! Inode-relative offset to disk address translation, RAID-mode aware.
//!
//! Under RAID 0 only the inode itself and indirect index blocks are
//! mirrored (the same bit index is allocated in every disk's data bitmap
//! for an indirect block, the same way inode numbers are mirrored by
//! [`crate::inode::allocate`]); every direct and indirect *data* block —
//! file bytes and directory-entry bytes alike — is striped across disks by
//! `blk_num % num_disks`. Under RAID 1/1v every disk owns an independent
//! allocation for every block, direct or indirect.

use crate::bitmap;
use crate::disk::DiskSet;
use crate::error::{Result, WfsError};
use crate::layout::{BLOCK_SIZE, D_BLOCK, IND_BLOCK, MAX_FILE_SIZE, PTRS_PER_BLOCK, RAID_0};

/// A resolved, concrete disk location: `disk` holds the target disk index,
/// `offset` the absolute byte offset of the addressed block (the caller
/// adds any within-block offset it still needs).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockAddr {
	pub disk: usize,
	pub offset: u64,
}

fn data_bitmap_words(disk: &mut crate::disk::Disk) -> (u64, usize) {
	let sb = disk.superblock();
	(sb.d_bitmap_ptr, (sb.num_data_blocks / 32) as usize)
}

/// Allocates the same data-bitmap bit on every disk, returning the absolute
/// offset of the resulting block (identical on every disk, since layout is
/// identical across a set). Used for metadata that must be mirrored.
fn alloc_mirrored_block(set: &mut DiskSet) -> Result<u64> {
	let idx = {
		let disk = set.disk_mut(0);
		let (ptr, count) = data_bitmap_words(disk);
		let words = disk.words_mut(ptr, count);
		bitmap::alloc_bit(words)?
	};
	for i in 1..set.num_disks() {
		let disk = set.disk_mut(i);
		let (ptr, count) = data_bitmap_words(disk);
		let words = disk.words_mut(ptr, count);
		if bitmap::is_set(words, idx) {
			return Err(WfsError::IoError("data bitmaps diverged across disk set".into()));
		}
		let wi = (idx / 32) as usize;
		words[wi] |= 1 << (idx % 32);
	}
	let d_blocks_ptr = set.disk(0).superblock().d_blocks_ptr;
	Ok(d_blocks_ptr + idx as u64 * BLOCK_SIZE as u64)
}

/// Allocates a data block on exactly one disk, returning its absolute offset.
fn alloc_local_block(set: &mut DiskSet, disk_idx: usize) -> Result<u64> {
	let disk = set.disk_mut(disk_idx);
	let (ptr, count) = data_bitmap_words(disk);
	let words = disk.words_mut(ptr, count);
	let idx = bitmap::alloc_bit(words)?;
	Ok(disk.superblock().d_blocks_ptr + idx as u64 * BLOCK_SIZE as u64)
}

fn free_local_block(set: &mut DiskSet, disk_idx: usize, offset: u64) {
	let disk = set.disk_mut(disk_idx);
	let d_blocks_ptr = disk.superblock().d_blocks_ptr;
	let idx = ((offset - d_blocks_ptr) / BLOCK_SIZE as u64) as u32;
	disk.bytes_at_mut(offset, BLOCK_SIZE).fill(0);
	let (ptr, count) = data_bitmap_words(disk);
	let words = disk.words_mut(ptr, count);
	bitmap::free_bit(words, idx);
}

fn read_indirect_array(set: &DiskSet, disk_idx: usize, ind_off: u64) -> Vec<i64> {
	let bytes = set.disk(disk_idx).bytes_at(ind_off, BLOCK_SIZE);
	let mut out = Vec::with_capacity(PTRS_PER_BLOCK);
	for i in 0..PTRS_PER_BLOCK {
		let b: [u8; 8] = bytes[i * 8..i * 8 + 8].try_into().unwrap();
		out.push(i64::from_ne_bytes(b));
	}
	out
}

fn write_indirect_entry(set: &mut DiskSet, disk_idx: usize, ind_off: u64, local: usize, value: i64) {
	let disk = set.disk_mut(disk_idx);
	let bytes = disk.bytes_at_mut(ind_off, BLOCK_SIZE);
	bytes[local * 8..local * 8 + 8].copy_from_slice(&value.to_ne_bytes());
}

/// Resolves `off` within inode `inum` to a concrete disk address.
///
/// `disk_idx` selects which disk's metadata/data to address under RAID 1/1v;
/// it is ignored under RAID 0, where placement (for data bytes — file or
/// directory-entry content alike) is computed from `off` alone. Allocates on
/// demand when `allocate` is true; otherwise a missing block is an
/// [`WfsError::IoError`] (callers only read within `[0, inode.size)`, which
/// is always fully backed).
pub fn resolve(set: &mut DiskSet, inum: u32, off: u64, allocate: bool, disk_idx: usize) -> Result<BlockAddr> {
	if off >= MAX_FILE_SIZE {
		return Err(WfsError::IoError(format!("offset {off} beyond maximum file size")));
	}
	let raid = set.raid_mode();
	let blk = (off / BLOCK_SIZE as u64) as usize;
	let within = off % BLOCK_SIZE as u64;

	let meta_disk = if raid == RAID_0 { 0 } else { disk_idx };
	let target_disk = if raid == RAID_0 { blk % set.num_disks() } else { disk_idx };

	let data_off = if blk < D_BLOCK {
		direct_block(set, inum, blk, raid, meta_disk, target_disk, allocate)?
	} else {
		indirect_block(set, inum, blk - D_BLOCK, raid, meta_disk, target_disk, allocate)?
	};

	Ok(BlockAddr {
		disk: target_disk,
		offset: data_off + within,
	})
}

fn direct_block(
	set: &mut DiskSet,
	inum: u32,
	slot: usize,
	raid: u32,
	meta_disk: usize,
	target_disk: usize,
	allocate: bool,
) -> Result<u64> {
	let existing = crate::inode::get(set.disk(meta_disk), inum)
		.ok_or(WfsError::NotFound)?
		.blocks[slot];
	if existing != 0 {
		return Ok(existing as u64);
	}
	if !allocate {
		return Err(WfsError::IoError("read of unallocated block".into()));
	}
	let new_off = alloc_local_block(set, target_disk)?;
	if raid == RAID_0 {
		crate::inode::mutate(set, inum, |_, inode| inode.blocks[slot] = new_off as i64)?;
	} else {
		let inode = crate::inode::get_mut(set.disk_mut(meta_disk), inum).ok_or(WfsError::NotFound)?;
		inode.blocks[slot] = new_off as i64;
	}
	Ok(new_off)
}

fn indirect_block(
	set: &mut DiskSet,
	inum: u32,
	local: usize,
	raid: u32,
	meta_disk: usize,
	target_disk: usize,
	allocate: bool,
) -> Result<u64> {
	let ind_ptr = crate::inode::get(set.disk(meta_disk), inum)
		.ok_or(WfsError::NotFound)?
		.blocks[IND_BLOCK];

	let ind_off = if ind_ptr != 0 {
		ind_ptr as u64
	} else {
		if !allocate {
			return Err(WfsError::IoError("read of unallocated indirect block".into()));
		}
		let off = if raid == RAID_0 {
			alloc_mirrored_block(set)?
		} else {
			alloc_local_block(set, meta_disk)?
		};
		set.disk_mut(meta_disk).bytes_at_mut(off, BLOCK_SIZE).fill(0);
		if raid == RAID_0 {
			crate::inode::mutate(set, inum, |_, inode| inode.blocks[IND_BLOCK] = off as i64)?;
		} else {
			let inode = crate::inode::get_mut(set.disk_mut(meta_disk), inum).ok_or(WfsError::NotFound)?;
			inode.blocks[IND_BLOCK] = off as i64;
		}
		off
	};

	let array = read_indirect_array(set, meta_disk, ind_off);
	let existing = array[local];
	if existing != 0 {
		return Ok(existing as u64);
	}
	if !allocate {
		return Err(WfsError::IoError("read of unallocated indirect entry".into()));
	}
	let new_off = alloc_local_block(set, target_disk)?;
	if raid == RAID_0 {
		for i in 0..set.num_disks() {
			write_indirect_entry(set, i, ind_off, local, new_off as i64);
		}
	} else {
		write_indirect_entry(set, meta_disk, ind_off, local, new_off as i64);
	}
	Ok(new_off)
}

/// Frees every block (direct, indirect index, and indirect data) owned by
/// inode `inum`, as seen from the outer loop's `disk_idx`. Under RAID 0,
/// each data block (direct or indirect) is striped, so its true owning disk
/// is recomputed from its slot position (`slot % num_disks`, matching how
/// [`resolve`] placed it) rather than taken from `disk_idx`; only the
/// indirect index block itself (mirrored, one independent bitmap bit per
/// disk) is freed on `disk_idx` directly. Under RAID 1/1v every block
/// belongs to `disk_idx`. Callers loop over every disk to cover the whole set.
pub fn free_all(set: &mut DiskSet, inum: u32, disk_idx: usize) -> Result<()> {
	let raid = set.raid_mode();
	let num_disks = set.num_disks();
	let meta_disk = if raid == RAID_0 { 0 } else { disk_idx };
	let blocks = {
		let inode = crate::inode::get(set.disk(meta_disk), inum).ok_or(WfsError::NotFound)?;
		inode.blocks
	};

	for (slot, block) in blocks.iter().take(D_BLOCK).enumerate() {
		if *block != 0 {
			let owner = if raid == RAID_0 { slot % num_disks } else { disk_idx };
			free_local_block(set, owner, *block as u64);
		}
	}

	let ind_ptr = blocks[IND_BLOCK];
	if ind_ptr != 0 {
		let array = read_indirect_array(set, meta_disk, ind_ptr as u64);
		for (local, entry) in array.into_iter().enumerate() {
			if entry != 0 {
				let owner = if raid == RAID_0 { (D_BLOCK + local) % num_disks } else { disk_idx };
				free_local_block(set, owner, entry as u64);
			}
		}
		free_local_block(set, disk_idx, ind_ptr as u64);
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::disk::DiskSet;
	use crate::inode;
	use crate::layout::{Layout, S_IFREG};
	use crate::testutil::make_disk;

	fn make_set(num_disks: usize, raid: u32) -> DiskSet {
		let layout = Layout::compute(32, 64);
		let disks = (0..num_disks).map(|i| make_disk(&layout, i as u32, raid, 1000)).collect();
		DiskSet::from_disks(disks, raid)
	}

	#[test]
	fn raid0_stripes_direct_blocks_across_disks() {
		let mut set = make_set(3, RAID_0);
		let num = inode::allocate(&mut set).unwrap();
		inode::initialize(&mut set, num, S_IFREG | 0o644, 0, 0).unwrap();

		let mut targets = Vec::new();
		for blk in 0..4 {
			let addr = resolve(&mut set, num, blk * BLOCK_SIZE as u64, true, 0).unwrap();
			targets.push(addr.disk);
		}
		assert_eq!(targets, vec![0, 1, 2, 0]);

		for i in 0..3 {
			let inode = inode::get(set.disk(i), num).unwrap();
			assert_eq!(inode.blocks[0..4], inode::get(set.disk(0), num).unwrap().blocks[0..4]);
		}
	}

	#[test]
	fn raid1_each_disk_owns_independent_allocation() {
		let mut set = make_set(2, crate::layout::RAID_1);
		let num = inode::allocate(&mut set).unwrap();
		inode::initialize(&mut set, num, S_IFREG | 0o644, 0, 0).unwrap();

		let a0 = resolve(&mut set, num, 0, true, 0).unwrap();
		let a1 = resolve(&mut set, num, 0, true, 1).unwrap();
		assert_eq!(a0.disk, 0);
		assert_eq!(a1.disk, 1);
	}

	#[test]
	fn indirect_block_allocated_past_direct_region() {
		let mut set = make_set(1, crate::layout::RAID_1);
		let num = inode::allocate(&mut set).unwrap();
		inode::initialize(&mut set, num, S_IFREG | 0o644, 0, 0).unwrap();

		let off = (D_BLOCK as u64) * BLOCK_SIZE as u64;
		let addr = resolve(&mut set, num, off, true, 0).unwrap();
		assert_eq!(addr.disk, 0);
		let inode = inode::get(set.disk(0), num).unwrap();
		assert_ne!(inode.blocks[IND_BLOCK], 0);
	}

	#[test]
	fn raid0_free_all_only_clears_blocks_it_actually_owns() {
		let mut set = make_set(3, RAID_0);
		let victim = inode::allocate(&mut set).unwrap();
		inode::initialize(&mut set, victim, S_IFREG | 0o644, 0, 0).unwrap();
		let keeper = inode::allocate(&mut set).unwrap();
		inode::initialize(&mut set, keeper, S_IFREG | 0o644, 0, 0).unwrap();

		// Both files get 4 direct blocks, striping disks 0,1,2,0. Mark each of
		// the keeper's blocks with non-zero bytes so a wrongly-zeroed block is
		// detectable below.
		for blk in 0..4 {
			resolve(&mut set, victim, blk * BLOCK_SIZE as u64, true, 0).unwrap();
		}
		for blk in 0..4 {
			let addr = resolve(&mut set, keeper, blk * BLOCK_SIZE as u64, true, 0).unwrap();
			set.disk_mut(addr.disk).bytes_at_mut(addr.offset, 4).copy_from_slice(b"live");
		}
		let keeper_blocks = inode::get(set.disk(0), keeper).unwrap().blocks;

		for disk_idx in 0..3 {
			free_all(&mut set, victim, disk_idx).unwrap();
		}

		// The keeper's blocks on every disk must still read back as allocated
		// and unmodified: freeing the victim's striped blocks using the naive
		// `disk_idx` (rather than each slot's true owner) would zero the wrong
		// disk's data here, since both files stripe the same sequence of disks.
		for (slot, &blk) in keeper_blocks.iter().take(4).enumerate() {
			let owner = slot % 3;
			let bytes = set.disk(owner).bytes_at(blk as u64, 4);
			assert_eq!(bytes, b"live", "keeper's block on disk {owner} must survive victim's free_all");
		}
	}

	#[test]
	fn offset_beyond_max_file_size_is_io_error() {
		let mut set = make_set(1, crate::layout::RAID_1);
		let num = inode::allocate(&mut set).unwrap();
		inode::initialize(&mut set, num, S_IFREG | 0o644, 0, 0).unwrap();
		let err = resolve(&mut set, num, MAX_FILE_SIZE, true, 0).unwrap_err();
		assert!(matches!(err, WfsError::IoError(_)));
	}
}
