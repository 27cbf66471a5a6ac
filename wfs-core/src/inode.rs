//! Inode allocation, initialization, lookup and teardown across a disk set.

use utils::time::get_timestamp;

use crate::bitmap;
use crate::disk::{Disk, DiskSet};
use crate::error::{Result, WfsError};
use crate::layout::{Inode, N_BLOCKS, BLOCK_SIZE};

fn inode_offset(disk: &Disk, num: u32) -> u64 {
	disk.superblock().i_blocks_ptr + num as u64 * BLOCK_SIZE as u64
}

fn bitmap_words(disk: &mut Disk) -> (u64, usize) {
	let sb = disk.superblock();
	(sb.i_bitmap_ptr, (sb.num_inodes / 32) as usize)
}

/// Returns the inode if its bit is set in this disk's inode bitmap.
pub fn get(disk: &Disk, num: u32) -> Option<&Inode> {
	let sb = disk.superblock();
	if num >= sb.num_inodes {
		return None;
	}
	let words = disk.words(sb.i_bitmap_ptr, (sb.num_inodes / 32) as usize);
	if !bitmap::is_set(words, num) {
		return None;
	}
	Some(unsafe { disk.read_at::<Inode>(inode_offset(disk, num)) })
}

/// See [`get`]; does not check the bitmap (callers that just allocated the
/// bit know it is set).
pub fn get_mut(disk: &mut Disk, num: u32) -> Option<&mut Inode> {
	let off = inode_offset(disk, num);
	let sb = disk.superblock();
	if num >= sb.num_inodes {
		return None;
	}
	Some(unsafe { disk.read_at_mut::<Inode>(off) })
}

/// Allocates the same inode number on every disk of the set.
///
/// Inode allocation is always mirrored, even under RAID 0: only file/
/// directory *data* is striped.
pub fn allocate(set: &mut DiskSet) -> Result<u32> {
	let idx = {
		let disk = set.disk_mut(0);
		let (ptr, count) = bitmap_words(disk);
		let words = disk.words_mut(ptr, count);
		bitmap::alloc_bit(words)?
	};
	for i in 1..set.num_disks() {
		let disk = set.disk_mut(i);
		let (ptr, count) = bitmap_words(disk);
		let words = disk.words_mut(ptr, count);
		if bitmap::is_set(words, idx) {
			return Err(WfsError::IoError("inode bitmaps diverged across disk set".into()));
		}
		let wi = (idx / 32) as usize;
		words[wi] |= 1 << (idx % 32);
	}
	Ok(idx)
}

/// Initializes a freshly allocated inode identically on every disk.
pub fn initialize(set: &mut DiskSet, num: u32, mode: u32, uid: u32, gid: u32) -> Result<()> {
	let now = get_timestamp();
	set.for_each_disk(|_, disk| {
		let inode = get_mut(disk, num).ok_or(WfsError::IoError("inode not allocated".into()))?;
		*inode = Inode {
			num: num as i32,
			mode,
			uid,
			gid,
			size: 0,
			nlinks: 1,
			atim: now,
			mtim: now,
			ctim: now,
			blocks: [0; N_BLOCKS],
		};
		Ok(())
	})
}

/// Applies `f` to this inode's in-memory record on every disk; `f` receives
/// the disk index so RAID-0 callers can record per-disk block pointers.
pub fn mutate(set: &mut DiskSet, num: u32, mut f: impl FnMut(usize, &mut Inode)) -> Result<()> {
	set.for_each_disk(|i, disk| {
		let inode = get_mut(disk, num).ok_or(WfsError::NotFound)?;
		f(i, inode);
		Ok(())
	})
}

/// Clears the inode bit and zeroes the inode's block on every disk.
/// Does not free the data blocks it pointed to; callers must do that first.
pub fn free(set: &mut DiskSet, num: u32) -> Result<()> {
	set.for_each_disk(|_, disk| {
		let off = inode_offset(disk, num);
		disk.bytes_at_mut(off, BLOCK_SIZE).fill(0);
		let (ptr, count) = bitmap_words(disk);
		let words = disk.words_mut(ptr, count);
		bitmap::free_bit(words, num);
		Ok(())
	})
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::layout::{Layout, S_IFDIR};
	use crate::testutil::make_disk;

	#[test]
	fn allocate_initialize_get_free_roundtrip() {
		let layout = Layout::compute(32, 32);
		let mut set = DiskSet::from_disks(vec![make_disk(&layout, 0, 0, 0)], 0);

		let num = allocate(&mut set).unwrap();
		assert_eq!(num, 0);
		initialize(&mut set, num, S_IFDIR | 0o755, 0, 0).unwrap();

		let inode = get(set.disk(0), num).unwrap();
		assert!(inode.is_dir());
		assert_eq!(inode.nlinks, 1);

		free(&mut set, num).unwrap();
		assert!(get(set.disk(0), num).is_none());
	}
}
