//! RAID read dispatch: disk-0 reads for R0/R1, majority-vote reads for R1v.

use crate::block;
use crate::disk::DiskSet;
use crate::error::Result;
use crate::layout::RAID_1V;

/// Additive byte-sum checksum; a cheap, sufficient tiebreaker for same-length
/// buffers within one voting round.
fn checksum(buf: &[u8]) -> u64 {
	buf.iter().fold(0u64, |acc, &b| acc.wrapping_add(b as u64))
}

/// Reads `len` bytes at inode-relative `off` from inode `inum`, selecting the
/// disk to read from per the active RAID mode: the stripe-owning disk for
/// R0, disk 0 for R1, and the plurality-checksum disk for R1v.
pub fn read(set: &mut DiskSet, inum: u32, off: u64, len: usize) -> Result<Vec<u8>> {
	log::trace!("raid::read(inum={inum}, off={off}, len={len}, mode={})", set.raid_mode());
	if set.raid_mode() != RAID_1V {
		return read_from(set, inum, off, len, 0);
	}

	let num_disks = set.num_disks();
	let mut copies = Vec::with_capacity(num_disks);
	for disk_idx in 0..num_disks {
		copies.push(read_from(set, inum, off, len, disk_idx)?);
	}

	let winner = vote(&copies);
	let winner_sum = checksum(&copies[winner]);
	let agree = copies.iter().filter(|c| checksum(c) == winner_sum).count();
	if agree < num_disks {
		log::warn!(
			"raid1v read(inum={inum}, off={off}): disk checksums disagree, {agree}/{num_disks} agree, picking disk {winner}"
		);
		if agree * 2 <= num_disks {
			log::error!(
				"raid1v read(inum={inum}, off={off}): no clear majority among {num_disks} disks, result may be wrong"
			);
		}
	}
	Ok(copies[winner].clone())
}

/// Groups `copies` by checksum and returns the index of a member of the
/// largest group, breaking ties toward the lowest disk index.
fn vote(copies: &[Vec<u8>]) -> usize {
	let sums: Vec<u64> = copies.iter().map(|c| checksum(c)).collect();
	let mut best_idx = 0;
	let mut best_count = 0usize;
	for i in 0..copies.len() {
		let count = sums.iter().filter(|&&s| s == sums[i]).count();
		if count > best_count {
			best_count = count;
			best_idx = i;
		}
	}
	best_idx
}

fn read_from(set: &mut DiskSet, inum: u32, off: u64, len: usize, disk_idx: usize) -> Result<Vec<u8>> {
	let mut out = Vec::with_capacity(len);
	let mut remaining = len;
	let mut pos = off;
	while remaining > 0 {
		let addr = block::resolve(set, inum, pos, false, disk_idx)?;
		let block_off = pos % crate::layout::BLOCK_SIZE as u64;
		let chunk = (crate::layout::BLOCK_SIZE as u64 - block_off).min(remaining as u64) as usize;
		out.extend_from_slice(set.disk(addr.disk).bytes_at(addr.offset, chunk));
		pos += chunk as u64;
		remaining -= chunk;
	}
	Ok(out)
}
