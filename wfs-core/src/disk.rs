//! Memory-mapped disk images and disk-set startup verification.

use std::fs::OpenOptions;
use std::mem::size_of;
use std::path::Path;
use std::slice;

use memmap2::MmapMut;

use crate::error::{Result, WfsError};
use crate::layout::Superblock;

/// One memory-mapped backing image.
pub struct Disk {
	map: MmapMut,
}

impl Disk {
	/// Opens `path` read/write and maps its entire contents.
	pub fn open(path: &Path) -> Result<Disk> {
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		let map = unsafe { MmapMut::map_mut(&file)? };
		Ok(Disk { map })
	}

	/// An anonymous, file-less mapping of `len` zeroed bytes, used by tests
	/// to exercise the allocator and addressing logic without touching disk.
	pub fn anon(len: usize) -> Result<Disk> {
		let map = MmapMut::map_anon(len)?;
		Ok(Disk { map })
	}

	pub fn len(&self) -> usize {
		self.map.len()
	}

	pub fn is_empty(&self) -> bool {
		self.map.is_empty()
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.map
	}

	pub fn as_bytes_mut(&mut self) -> &mut [u8] {
		&mut self.map
	}

	/// Flushes pending writes to the backing file.
	pub fn flush(&self) -> Result<()> {
		self.map.flush()?;
		Ok(())
	}

	pub fn superblock(&self) -> &Superblock {
		unsafe { &*(self.map.as_ptr() as *const Superblock) }
	}

	pub fn superblock_mut(&mut self) -> &mut Superblock {
		unsafe { &mut *(self.map.as_mut_ptr() as *mut Superblock) }
	}

	/// Reads `count` `u32` words starting at byte offset `ptr`.
	pub fn words(&self, ptr: u64, count: usize) -> &[u32] {
		let base = self.map.as_ptr().wrapping_add(ptr as usize) as *const u32;
		unsafe { slice::from_raw_parts(base, count) }
	}

	pub fn words_mut(&mut self, ptr: u64, count: usize) -> &mut [u32] {
		let base = self.map.as_mut_ptr().wrapping_add(ptr as usize) as *mut u32;
		unsafe { slice::from_raw_parts_mut(base, count) }
	}

	/// Returns a raw byte slice of `len` bytes starting at absolute offset `off`.
	pub fn bytes_at(&self, off: u64, len: usize) -> &[u8] {
		&self.map[off as usize..off as usize + len]
	}

	pub fn bytes_at_mut(&mut self, off: u64, len: usize) -> &mut [u8] {
		&mut self.map[off as usize..off as usize + len]
	}

	/// Reinterprets the `size_of::<T>()` bytes at `off` as `&T`.
	///
	/// # Safety
	/// `T` must be `#[repr(C)]` and `off` must be aligned/within bounds for `T`.
	pub unsafe fn read_at<T>(&self, off: u64) -> &T {
		&*(self.map.as_ptr().wrapping_add(off as usize) as *const T)
	}

	/// See [`Disk::read_at`].
	pub unsafe fn read_at_mut<T>(&mut self, off: u64) -> &mut T {
		&mut *(self.map.as_mut_ptr().wrapping_add(off as usize) as *mut T)
	}
}

/// An ordered, mapped, verified collection of disks backing one filesystem.
pub struct DiskSet {
	disks: Vec<Disk>,
	raid_mode: u32,
}

impl DiskSet {
	/// Opens every image, verifies they form one matching set, and reorders
	/// them so `disks()[k]` is the disk whose superblock records `disk_id == k`.
	pub fn open(paths: &[impl AsRef<Path>]) -> Result<DiskSet> {
		let mut disks: Vec<Disk> = Vec::with_capacity(paths.len());
		for p in paths {
			disks.push(Disk::open(p.as_ref())?);
		}

		let first = disks[0].superblock().match_prefix();
		let tim = disks[0].superblock().tim;
		let raid_mode = disks[0].superblock().raid_mode;
		for d in &disks[1..] {
			let sb = d.superblock();
			if sb.match_prefix() != first || sb.tim != tim || sb.raid_mode != raid_mode {
				log::error!("superblock mismatch while opening disk set");
				return Err(WfsError::SetMismatch);
			}
		}

		let mut ordered: Vec<Option<Disk>> = (0..disks.len()).map(|_| None).collect();
		for d in disks {
			let id = d.superblock().disk_id as usize;
			if id >= ordered.len() || ordered[id].is_some() {
				return Err(WfsError::SetMismatch);
			}
			ordered[id] = Some(d);
		}
		let disks: Vec<Disk> = ordered
			.into_iter()
			.map(|d| d.ok_or(WfsError::SetMismatch))
			.collect::<Result<_>>()?;

		log::debug!("opened disk set: {} disks, raid_mode={}", disks.len(), raid_mode);
		Ok(DiskSet { disks, raid_mode })
	}

	/// Builds a `DiskSet` from already-prepared disks without re-verifying
	/// them; used by tests that construct in-memory images directly.
	pub fn from_disks(disks: Vec<Disk>, raid_mode: u32) -> DiskSet {
		DiskSet { disks, raid_mode }
	}

	pub fn num_disks(&self) -> usize {
		self.disks.len()
	}

	pub fn raid_mode(&self) -> u32 {
		self.raid_mode
	}

	pub fn disk(&self, i: usize) -> &Disk {
		&self.disks[i]
	}

	pub fn disk_mut(&mut self, i: usize) -> &mut Disk {
		&mut self.disks[i]
	}

	pub fn disks(&self) -> &[Disk] {
		&self.disks
	}

	/// Runs `f` against every disk in the set, in index order.
	pub fn for_each_disk(&mut self, mut f: impl FnMut(usize, &mut Disk) -> Result<()>) -> Result<()> {
		for i in 0..self.disks.len() {
			f(i, &mut self.disks[i])?;
		}
		Ok(())
	}

	pub fn flush_all(&self) -> Result<()> {
		for d in &self.disks {
			d.flush()?;
		}
		Ok(())
	}
}

const _: () = assert!(size_of::<Superblock>() >= 48);

#[cfg(test)]
mod test {
	use super::*;
	use crate::layout::Layout;
	use std::io::Write;

	fn write_disk_image(path: &Path, layout: &Layout, raid_mode: u32, disk_id: u32, tim: u64) {
		let sb = Superblock {
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
		let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(path).unwrap();
		let bytes = unsafe { slice::from_raw_parts(&sb as *const Superblock as *const u8, Superblock::SIZE) };
		file.write_all(bytes).unwrap();
		file.write_all(&vec![0u8; layout.total_size() as usize - Superblock::SIZE]).unwrap();
	}

	#[test]
	fn open_reorders_disks_by_disk_id() {
		let dir = tempfile::tempdir().unwrap();
		let layout = Layout::compute(32, 32);
		let p0 = dir.path().join("d0");
		let p1 = dir.path().join("d1");
		// Written out of order: disk_id 1 first, then disk_id 0.
		write_disk_image(&p1, &layout, crate::layout::RAID_1, 1, 42);
		write_disk_image(&p0, &layout, crate::layout::RAID_1, 0, 42);

		let set = DiskSet::open(&[&p1, &p0]).unwrap();
		assert_eq!(set.num_disks(), 2);
		assert_eq!(set.disk(0).superblock().disk_id, 0);
		assert_eq!(set.disk(1).superblock().disk_id, 1);
	}

	#[test]
	fn open_rejects_mismatched_superblocks() {
		let dir = tempfile::tempdir().unwrap();
		let layout_a = Layout::compute(32, 32);
		let layout_b = Layout::compute(64, 64);
		let p0 = dir.path().join("d0");
		let p1 = dir.path().join("d1");
		write_disk_image(&p0, &layout_a, crate::layout::RAID_1, 0, 7);
		write_disk_image(&p1, &layout_b, crate::layout::RAID_1, 1, 7);

		let err = DiskSet::open(&[&p0, &p1]).unwrap_err();
		assert!(matches!(err, WfsError::SetMismatch));
	}

	#[test]
	fn open_rejects_duplicate_disk_id() {
		let dir = tempfile::tempdir().unwrap();
		let layout = Layout::compute(32, 32);
		let p0 = dir.path().join("d0");
		let p1 = dir.path().join("d1");
		write_disk_image(&p0, &layout, crate::layout::RAID_1, 0, 7);
		write_disk_image(&p1, &layout, crate::layout::RAID_1, 0, 7);

		let err = DiskSet::open(&[&p0, &p1]).unwrap_err();
		assert!(matches!(err, WfsError::SetMismatch));
	}
}
