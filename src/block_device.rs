//! The emulated disk: a blocking API over a host file with fixed 4 KiB blocks and a block
//! count fixed at `init` time. Everything above this layer talks to the disk only through the
//! [`BlockDevice`] trait, in the same spirit as this codebase's disk-backed `Disk` type treating
//! a [`File`] as a fixed-size block store.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::codec::{BLOCK_SIZE, Block};

/// Opaque provider of fixed-size block reads and writes. Reads beyond `size()` or with a
/// mis-sized buffer are programming errors in callers; the trait itself does not bounds-check.
pub trait BlockDevice {
	/// Total number of blocks on the disk, fixed since `init`/construction.
	fn size(&self) -> u32;

	/// Reads block `block` into `buf`.
	fn read_block(&mut self, block: u32, buf: &mut Block) -> io::Result<()>;

	/// Writes `buf` to block `block`.
	fn write_block(&mut self, block: u32, buf: &Block) -> io::Result<()>;
}

/// A disk image backed by a single host file, one [`BLOCK_SIZE`]-byte region per block.
pub struct FileBlockDevice {
	file: File,
	nblocks: u32,
}

impl FileBlockDevice {
	/// Creates or opens `path` and ensures it is exactly `nblocks * BLOCK_SIZE` bytes, per the
	/// `disk_init(path, nblocks)` contract in §6.
	pub fn init(path: &std::path::Path, nblocks: u32) -> io::Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(false)
			.open(path)?;
		file.set_len(nblocks as u64 * BLOCK_SIZE as u64)?;
		Ok(Self { file, nblocks })
	}

	/// Flushes the backing file. The file is also flushed on `Drop`, but callers that want to
	/// observe I/O errors at a known point (the shell's `quit`/`exit`) should call this
	/// explicitly.
	pub fn close(mut self) -> io::Result<()> {
		self.file.flush()
	}
}

impl BlockDevice for FileBlockDevice {
	fn size(&self) -> u32 {
		self.nblocks
	}

	fn read_block(&mut self, block: u32, buf: &mut Block) -> io::Result<()> {
		debug_assert!(block < self.nblocks, "block {block} out of range");
		self.file
			.seek(SeekFrom::Start(block as u64 * BLOCK_SIZE as u64))?;
		self.file.read_exact(buf)
	}

	fn write_block(&mut self, block: u32, buf: &Block) -> io::Result<()> {
		debug_assert!(block < self.nblocks, "block {block} out of range");
		self.file
			.seek(SeekFrom::Start(block as u64 * BLOCK_SIZE as u64))?;
		self.file.write_all(buf)
	}
}

impl Drop for FileBlockDevice {
	fn drop(&mut self) {
		let _ = self.file.flush();
	}
}

/// An in-memory block device, primarily intended for tests: no host file, no I/O errors.
#[derive(Clone)]
pub struct MemBlockDevice {
	blocks: Vec<Block>,
}

impl MemBlockDevice {
	pub fn new(nblocks: u32) -> Self {
		Self {
			blocks: vec![[0u8; BLOCK_SIZE]; nblocks as usize],
		}
	}
}

impl BlockDevice for MemBlockDevice {
	fn size(&self) -> u32 {
		self.blocks.len() as u32
	}

	fn read_block(&mut self, block: u32, buf: &mut Block) -> io::Result<()> {
		buf.copy_from_slice(&self.blocks[block as usize]);
		Ok(())
	}

	fn write_block(&mut self, block: u32, buf: &Block) -> io::Result<()> {
		self.blocks[block as usize].copy_from_slice(buf);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mem_device_round_trips_blocks() {
		let mut dev = MemBlockDevice::new(4);
		assert_eq!(dev.size(), 4);
		let mut block = [7u8; BLOCK_SIZE];
		dev.write_block(2, &block).unwrap();
		block = [0u8; BLOCK_SIZE];
		dev.read_block(2, &mut block).unwrap();
		assert!(block.iter().all(|b| *b == 7));
		let mut untouched = [1u8; BLOCK_SIZE];
		dev.read_block(0, &mut untouched).unwrap();
		assert!(untouched.iter().all(|b| *b == 0));
	}

	#[test]
	fn file_device_persists_across_reopen() {
		let dir = std::env::temp_dir();
		let path = dir.join(format!("simplefs-test-{}.img", std::process::id()));
		{
			let mut dev = FileBlockDevice::init(&path, 5).unwrap();
			assert_eq!(dev.size(), 5);
			let block = [9u8; BLOCK_SIZE];
			dev.write_block(3, &block).unwrap();
			dev.close().unwrap();
		}
		{
			let mut dev = FileBlockDevice::init(&path, 5).unwrap();
			let mut block = [0u8; BLOCK_SIZE];
			dev.read_block(3, &mut block).unwrap();
			assert!(block.iter().all(|b| *b == 9));
		}
		let _ = std::fs::remove_file(&path);
	}
}
