//! Initializes one or more backing disk images with a `wfs` superblock,
//! bitmaps, inode region, and a root directory inode.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use wfs_core::layout::{Layout, Superblock, Inode, BLOCK_SIZE, N_BLOCKS, RAID_0, RAID_1, RAID_1V, S_IFDIR};

const BIN: &str = "wfs-mkfs";

#[derive(Parser, Debug)]
#[command(name = "wfs-mkfs", about = "Initialize wfs disk images")]
struct Args {
	/// RAID mode: 0 (striped), 1 (mirrored), or 1v (mirrored, voting reads)
	#[arg(short = 'r', value_name = "MODE")]
	raid: String,

	/// Backing disk image, repeated at least twice
	#[arg(short = 'd', value_name = "PATH")]
	disk: Vec<PathBuf>,

	/// Number of inodes to provision (rounded up to a multiple of 32)
	#[arg(short = 'i', value_name = "N")]
	inodes: u32,

	/// Number of data blocks to provision (rounded up to a multiple of 32)
	#[arg(short = 'b', value_name = "N")]
	blocks: u32,

	/// Raise log verbosity
	#[arg(short = 'v', long)]
	verbose: bool,
}

fn parse_raid_mode(s: &str) -> Option<u32> {
	match s {
		"0" => Some(RAID_0),
		"1" => Some(RAID_1),
		"1v" => Some(RAID_1V),
		_ => None,
	}
}

fn main() {
	let args = Args::parse();

	let level = if args.verbose { "debug" } else { "info" };
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

	if let Err(e) = run(&args) {
		eprintln!("{BIN}: {e}");
		exit(1);
	}
	println!("Success");
}

fn run(args: &Args) -> Result<(), String> {
	let raid_mode = parse_raid_mode(&args.raid).ok_or_else(|| format!("invalid RAID mode: {}", args.raid))?;
	if args.disk.len() < 2 {
		return Err("at least two disks are required".into());
	}
	if args.inodes == 0 {
		return Err("inode count must be positive".into());
	}
	if args.blocks == 0 {
		return Err("block count must be positive".into());
	}

	let layout = Layout::compute(args.inodes, args.blocks);
	let total = layout.total_size();
	log::debug!(
		"layout: inodes={} blocks={} total_size={}",
		layout.num_inodes,
		layout.num_data_blocks,
		total
	);

	for path in &args.disk {
		let size = utils::disk::get_disk_size(path).map_err(|e| format!("{}: {e}", path.display()))?;
		if size < total {
			return Err(format!(
				"{}: too small for the requested layout ({size} < {total} bytes)",
				path.display()
			));
		}
	}

	let tim = utils::time::get_timestamp() as u64;

	for (disk_id, path) in args.disk.iter().enumerate() {
		write_disk(path, &layout, raid_mode, disk_id as u32, tim)
			.map_err(|e| format!("{}: {e}", path.display()))?;
	}

	Ok(())
}

fn write_disk(path: &PathBuf, layout: &Layout, raid_mode: u32, disk_id: u32, tim: u64) -> std::io::Result<()> {
	use std::io::{Seek, SeekFrom, Write};

	let mut file = OpenOptions::new().write(true).open(path)?;

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

	file.seek(SeekFrom::Start(0))?;
	let sb_bytes = unsafe {
		std::slice::from_raw_parts((&sb as *const Superblock) as *const u8, Superblock::SIZE)
	};
	file.write_all(sb_bytes)?;

	let i_bitmap_bytes = (layout.num_inodes / 8) as usize;
	let mut i_bitmap = vec![0u8; i_bitmap_bytes];
	i_bitmap[0] |= 1; // root inode (0) allocated
	file.seek(SeekFrom::Start(layout.i_bitmap_ptr))?;
	file.write_all(&i_bitmap)?;

	let d_bitmap_bytes = (layout.num_data_blocks / 8) as usize;
	file.seek(SeekFrom::Start(layout.d_bitmap_ptr))?;
	file.write_all(&vec![0u8; d_bitmap_bytes])?;

	file.seek(SeekFrom::Start(layout.i_blocks_ptr))?;
	file.write_all(&vec![0u8; layout.num_inodes as usize * BLOCK_SIZE])?;

	let root = Inode {
		num: 0,
		mode: S_IFDIR | 0o700,
		uid: 0,
		gid: 0,
		size: 0,
		nlinks: 1,
		atim: tim as i64,
		mtim: tim as i64,
		ctim: tim as i64,
		blocks: [0i64; N_BLOCKS],
	};
	file.seek(SeekFrom::Start(layout.i_blocks_ptr))?;
	let root_bytes = unsafe { std::slice::from_raw_parts((&root as *const Inode) as *const u8, Inode::SIZE) };
	file.write_all(root_bytes)?;

	file.flush()
}
