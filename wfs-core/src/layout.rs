//! Bit-exact on-disk structures and layout constants.
//!
//! The superblock's first 48 bytes (`num_inodes` through `tim`) must be
//! identical across every disk of a set; `raid_mode` and `disk_id` follow
//! immediately after and are checked separately at daemon startup.

use std::mem::size_of;

pub const BLOCK_SIZE: usize = 512;
pub const MAX_DISKS: usize = 8;
pub const MAX_NAME: usize = 28;
pub const D_BLOCK: usize = 6;
pub const IND_BLOCK: usize = 6;
pub const N_BLOCKS: usize = 7;
pub const PTRS_PER_BLOCK: usize = BLOCK_SIZE / size_of::<i64>();
pub const MAX_FILE_BLOCKS: usize = D_BLOCK + PTRS_PER_BLOCK;
pub const MAX_FILE_SIZE: u64 = (MAX_FILE_BLOCKS * BLOCK_SIZE) as u64;

pub const RAID_0: u32 = 0;
pub const RAID_1: u32 = 1;
pub const RAID_1V: u32 = 2;

pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;

/// Superblock written at offset 0 of every disk in a set.
///
/// Field order matters: `num_inodes` through `tim` occupy the first 48
/// bytes and must match byte-for-byte across disks; `raid_mode` and
/// `disk_id` are validated as separate scalar fields.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Superblock {
	pub num_inodes: u32,
	pub num_data_blocks: u32,
	pub i_bitmap_ptr: u64,
	pub d_bitmap_ptr: u64,
	pub i_blocks_ptr: u64,
	pub d_blocks_ptr: u64,
	pub tim: u64,
	pub raid_mode: u32,
	pub disk_id: u32,
}

/// Byte length of the prefix that must be identical across a disk set.
pub const SB_MATCH_PREFIX: usize = 48;

impl Superblock {
	pub const SIZE: usize = size_of::<Superblock>();

	/// The first [`SB_MATCH_PREFIX`] bytes, used for the cross-disk equality check.
	pub fn match_prefix(&self) -> [u8; SB_MATCH_PREFIX] {
		let mut out = [0u8; SB_MATCH_PREFIX];
		out[0..4].copy_from_slice(&self.num_inodes.to_ne_bytes());
		out[4..8].copy_from_slice(&self.num_data_blocks.to_ne_bytes());
		out[8..16].copy_from_slice(&self.i_bitmap_ptr.to_ne_bytes());
		out[16..24].copy_from_slice(&self.d_bitmap_ptr.to_ne_bytes());
		out[24..32].copy_from_slice(&self.i_blocks_ptr.to_ne_bytes());
		out[32..40].copy_from_slice(&self.d_blocks_ptr.to_ne_bytes());
		out[40..48].copy_from_slice(&self.tim.to_ne_bytes());
		out
	}
}

/// A single inode slot; occupies exactly one block on disk.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Inode {
	pub num: i32,
	pub mode: u32,
	pub uid: u32,
	pub gid: u32,
	pub size: u64,
	pub nlinks: u32,
	pub atim: i64,
	pub mtim: i64,
	pub ctim: i64,
	pub blocks: [i64; N_BLOCKS],
}

impl Default for Inode {
	fn default() -> Self {
		Inode {
			num: -1,
			mode: 0,
			uid: 0,
			gid: 0,
			size: 0,
			nlinks: 0,
			atim: 0,
			mtim: 0,
			ctim: 0,
			blocks: [0; N_BLOCKS],
		}
	}
}

impl Inode {
	pub const SIZE: usize = size_of::<Inode>();

	pub fn is_dir(&self) -> bool {
		self.mode & S_IFDIR != 0
	}

	pub fn is_reg(&self) -> bool {
		self.mode & S_IFREG != 0
	}
}

/// A directory entry: an inode number paired with a NUL-padded name.
/// `num == 0` marks a free/tombstoned slot.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Dentry {
	pub num: i32,
	pub name: [u8; MAX_NAME],
}

impl Dentry {
	pub const SIZE: usize = size_of::<Dentry>();

	pub fn free() -> Self {
		Dentry {
			num: 0,
			name: [0; MAX_NAME],
		}
	}

	pub fn name_str(&self) -> String {
		let end = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME);
		String::from_utf8_lossy(&self.name[..end]).into_owned()
	}

	pub fn set_name(&mut self, name: &str) {
		self.name = [0; MAX_NAME];
		let bytes = name.as_bytes();
		let n = bytes.len().min(MAX_NAME - 1);
		self.name[..n].copy_from_slice(&bytes[..n]);
	}
}

/// Rounds `n` up to the next multiple of 32 (bitmap word alignment).
pub fn round_up32(n: u32) -> u32 {
	n.div_ceil(32) * 32
}

/// Computed absolute byte offsets of every region, given inode/block counts.
#[derive(Clone, Copy, Debug)]
pub struct Layout {
	pub num_inodes: u32,
	pub num_data_blocks: u32,
	pub i_bitmap_ptr: u64,
	pub d_bitmap_ptr: u64,
	pub i_blocks_ptr: u64,
	pub d_blocks_ptr: u64,
}

impl Layout {
	pub fn compute(num_inodes: u32, num_data_blocks: u32) -> Layout {
		let num_inodes = round_up32(num_inodes);
		let num_data_blocks = round_up32(num_data_blocks);

		let i_bitmap_ptr = Superblock::SIZE as u64;
		let i_bitmap_bytes = (num_inodes / 8) as u64;
		let d_bitmap_ptr = i_bitmap_ptr + i_bitmap_bytes;
		let d_bitmap_bytes = (num_data_blocks / 8) as u64;

		let after_bitmaps = d_bitmap_ptr + d_bitmap_bytes;
		let i_blocks_ptr = after_bitmaps.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64;
		let d_blocks_ptr = i_blocks_ptr + num_inodes as u64 * BLOCK_SIZE as u64;

		Layout {
			num_inodes,
			num_data_blocks,
			i_bitmap_ptr,
			d_bitmap_ptr,
			i_blocks_ptr,
			d_blocks_ptr,
		}
	}

	pub fn total_size(&self) -> u64 {
		self.d_blocks_ptr + self.num_data_blocks as u64 * BLOCK_SIZE as u64
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn superblock_prefix_is_48_bytes() {
		assert_eq!(SB_MATCH_PREFIX, 48);
	}

	#[test]
	fn layout_rounds_up_to_32() {
		let l = Layout::compute(5, 10);
		assert_eq!(l.num_inodes, 32);
		assert_eq!(l.num_data_blocks, 32);
	}

	#[test]
	fn layout_inode_region_block_aligned() {
		let l = Layout::compute(32, 32);
		assert_eq!(l.i_blocks_ptr % BLOCK_SIZE as u64, 0);
		assert_eq!(l.d_blocks_ptr, l.i_blocks_ptr + l.num_inodes as u64 * BLOCK_SIZE as u64);
	}

	#[test]
	fn max_file_size_matches_formula() {
		assert_eq!(MAX_FILE_SIZE, ((D_BLOCK + 64) * BLOCK_SIZE) as u64);
	}
}
