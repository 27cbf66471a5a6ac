//! In-memory disk fixtures shared by unit tests across modules.

use crate::disk::Disk;
use crate::layout::{Layout, Superblock};

/// Builds a single anonymous-mmap disk with a superblock matching `layout`,
/// zeroed bitmaps, and a zeroed inode/data region. No root inode is
/// allocated; callers allocate it via [`crate::inode::allocate`] as needed.
pub fn make_disk(layout: &Layout, disk_id: u32, raid_mode: u32, tim: u64) -> Disk {
	let mut disk = Disk::anon(layout.total_size() as usize).unwrap();
	*disk.superblock_mut() = Superblock {
		num_inodes: layout.num_inodes,
		num_data_blocks: layout.num_data_blocks,
		i_bitmap_ptr: layout.i_bitmap_ptr,
		d_bitmap_ptr: layout.d_bitmap_ptr,
		i_blocks_ptr: layout.i_blocks_ptr,
		d_blocks_ptr: layout.d_blocks_ptr,
		tim,
		raid_mode,
		disk_id,
	};
	disk
}
