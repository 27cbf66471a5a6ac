//! Opens a `wfs` disk set, verifies it, and serves it as a FUSE mount.

mod adapter;

use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use wfs_core::disk::DiskSet;

const BIN: &str = "wfsd";

#[derive(Parser, Debug)]
#[command(name = "wfsd", about = "Mount a wfs disk set")]
struct Args {
	/// Backing disk images followed by the mount point
	#[arg(required = true, num_args = 3..)]
	paths: Vec<PathBuf>,

	/// Raise log verbosity
	#[arg(short = 'v', long)]
	verbose: bool,
}

fn main() {
	let args = Args::parse();

	let level = if args.verbose { "debug" } else { "info" };
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

	let (disks, mountpoint) = args.paths.split_at(args.paths.len() - 1);
	let mountpoint = &mountpoint[0];

	let set = match DiskSet::open(disks) {
		Ok(set) => set,
		Err(e) => {
			eprintln!("{BIN}: {e}");
			exit(1);
		}
	};

	log::info!(
		"mounting {} disks (raid_mode={}) at {}",
		set.num_disks(),
		set.raid_mode(),
		mountpoint.display()
	);

	let fs = adapter::WfsFilesystem::new(set);
	let options = vec![fuser::MountOption::FSName("wfs".to_string())];
	if let Err(e) = fuser::mount2(fs, mountpoint, &options) {
		eprintln!("{BIN}: mount failed: {e}");
		exit(1);
	}
}
