//! Core of the `wfs` multi-disk filesystem: on-disk layout, bitmap
//! allocation, block addressing with RAID-aware placement, the directory
//! and inode engines, disk-set startup, and RAID-1v read voting.
//!
//! This crate has no knowledge of the host filesystem interface; `wfsd`
//! adapts [`ops`] onto that protocol.

pub mod bitmap;
pub mod block;
pub mod dentry;
pub mod disk;
pub mod error;
pub mod inode;
pub mod layout;
pub mod ops;
pub mod raid;

#[cfg(test)]
mod testutil;

pub use disk::DiskSet;
pub use error::{Result, WfsError};
