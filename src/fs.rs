//! The filesystem core: mount state plus `format`/`mount`/`create`/`delete`/`getsize`/`read`/
//! `write`/`debug`.
//!
//! The source carries the two bitmaps and an `is_mounted` flag as global variables shared by
//! every function. Per the redesign note in §9, they are bundled here into one [`FileSystem`]
//! handle constructed by `mount`, so a second, independent mount of the same disk is a type
//! error rather than silent global-state corruption, and so unmounting has a clean boundary
//! (dropping the handle).
//!
//! Every public operation keeps the original C-derived return-value contract (`bool`/`u32`/
//! `i64`/`usize`, never `Result`) — that contract is the externally observable behavior under
//! test, not an implementation detail to "improve" away.

use crate::bitmap::Bitmap;
use crate::block_device::BlockDevice;
use crate::codec::{
	BLOCK_SIZE, Block, DIRECT_POINTERS, Inode, POINTERS_PER_BLOCK, Superblock, decode_pointers,
	encode_pointers, inode_location,
};
use crate::walker::{InodeDataWalker, InodeTableWalker};

/// In-memory state rebuilt by `mount` and discarded when the handle is dropped.
struct MountState {
	superblock: Superblock,
	inode_free: Bitmap,
	block_free: Bitmap,
}

/// A SimpleFS instance over one block device. Construct with [`FileSystem::new`], then call
/// `format` (on a blank disk) and/or `mount` before any other operation.
pub struct FileSystem<D: BlockDevice> {
	dev: D,
	state: Option<MountState>,
}

impl<D: BlockDevice> FileSystem<D> {
	pub fn new(dev: D) -> Self {
		Self { dev, state: None }
	}

	pub fn is_mounted(&self) -> bool {
		self.state.is_some()
	}

	/// Gives back the underlying block device, discarding any mount state.
	pub fn into_device(self) -> D {
		self.dev
	}

	fn read_block(&mut self, block: u32) -> Block {
		let mut buf = [0u8; BLOCK_SIZE];
		self.dev
			.read_block(block, &mut buf)
			.expect("disk I/O failed on read");
		buf
	}

	fn write_block(&mut self, block: u32, buf: &Block) {
		self.dev
			.write_block(block, buf)
			.expect("disk I/O failed on write");
	}

	fn read_inode(&mut self, inumber: u32) -> Inode {
		let (block_idx, slot) = inode_location(inumber);
		let block = self.read_block(1 + block_idx);
		Inode::decode_from(&block, slot)
	}

	fn write_inode(&mut self, inumber: u32, inode: &Inode) {
		let (block_idx, slot) = inode_location(inumber);
		let mut block = self.read_block(1 + block_idx);
		inode.encode_into(&mut block, slot);
		self.write_block(1 + block_idx, &block);
	}

	/// Allocates the lowest free data block and marks it used, or `None` if the disk is full.
	fn allocate_block(&mut self) -> Option<u32> {
		let state = self.state.as_ref()?;
		let start = 1 + state.superblock.ninodeblocks as usize;
		let end = state.superblock.nblocks as usize;
		let idx = state.block_free.find_first(true, start..end)?;
		self.state.as_mut().unwrap().block_free.set(idx, false);
		Some(idx as u32)
	}

	/// Writes a fresh superblock and zeroes every inode slot. Fails if already mounted.
	pub fn format(&mut self) -> bool {
		if self.is_mounted() {
			return false;
		}
		let sb = Superblock::for_disk(self.dev.size() as i32);
		let mut sb_block = [0u8; BLOCK_SIZE];
		sb.encode(&mut sb_block);
		self.write_block(0, &sb_block);

		let empty = Inode::default();
		for b in 0..sb.ninodeblocks as u32 {
			let mut table = [0u8; BLOCK_SIZE];
			for slot in 0..crate::codec::INODES_PER_BLOCK {
				empty.encode_into(&mut table, slot);
			}
			self.write_block(1 + b, &table);
		}
		true
	}

	/// Rebuilds both bitmaps from the on-disk inode table. Fails if already mounted or the
	/// superblock's magic does not match.
	pub fn mount(&mut self) -> bool {
		if self.is_mounted() {
			return false;
		}
		let sb = Superblock::decode(&self.read_block(0));
		if !sb.is_valid() {
			return false;
		}
		let nblocks = sb.nblocks as usize;
		let ninodeblocks = sb.ninodeblocks as usize;
		let ninodes = sb.ninodes as usize;

		let mut block_free = Bitmap::new(nblocks);
		for i in 0..nblocks {
			block_free.set(i, true);
		}
		for i in 0..=ninodeblocks {
			block_free.set(i, false);
		}

		let mut inode_free = Bitmap::new(ninodes);
		let mut live = Vec::new();
		{
			let mut walker = InodeTableWalker::new(&mut self.dev, sb.ninodes as u32);
			walker.seed(1);
			while let Some((inumber, inode)) = walker.next() {
				inode_free.set(inumber as usize, !inode.isvalid);
				if inode.isvalid {
					live.push((inumber, inode));
				}
			}
		}
		inode_free.set(0, false);

		for (_, inode) in &live {
			let mut walker = InodeDataWalker::new(&mut self.dev);
			walker.seed(inode);
			while let Some(b) = walker.next() {
				block_free.set(b as usize, false);
			}
			if inode.uses_indirect() {
				block_free.set(inode.indirect as usize, false);
			}
		}

		self.state = Some(MountState {
			superblock: sb,
			inode_free,
			block_free,
		});
		true
	}

	/// Allocates the lowest free inumber and writes a zero-length inode for it, or returns 0
	/// if the inode table is full.
	pub fn create(&mut self) -> u32 {
		let ninodes = match &self.state {
			Some(s) => s.superblock.ninodes as usize,
			None => return 0,
		};
		let found = self
			.state
			.as_ref()
			.and_then(|s| s.inode_free.find_first(true, 1..ninodes));
		let Some(i) = found else { return 0 };

		self.write_inode(i as u32, &Inode::default());
		self.state.as_mut().unwrap().inode_free.set(i, false);
		i as u32
	}

	/// Frees inode `inumber` and every data block it reached. Returns `false` on any
	/// precondition violation (unmounted, out of range, already free).
	pub fn delete(&mut self, inumber: u32) -> bool {
		let ninodes = match &self.state {
			Some(s) => s.superblock.ninodes as u32,
			None => return false,
		};
		if inumber == 0 || inumber >= ninodes {
			return false;
		}
		let inode = self.read_inode(inumber);
		if !inode.isvalid {
			return false;
		}

		let mut cleared = inode;
		cleared.isvalid = false;
		self.write_inode(inumber, &cleared);

		let blocks: Vec<u32> = {
			let mut walker = InodeDataWalker::new(&mut self.dev);
			walker.seed(&inode);
			std::iter::from_fn(|| walker.next()).collect()
		};

		let state = self.state.as_mut().unwrap();
		for b in blocks {
			state.block_free.set(b as usize, true);
		}
		if inode.uses_indirect() {
			state.block_free.set(inode.indirect as usize, true);
		}
		state.inode_free.set(inumber as usize, true);
		true
	}

	/// Returns the inode's logical size, or -1 if unmounted / out of range / not live. -1 is a
	/// shared sentinel for both conditions; do not rely on distinguishing them.
	pub fn getsize(&mut self, inumber: u32) -> i64 {
		let ninodes = match &self.state {
			Some(s) => s.superblock.ninodes as u32,
			None => return -1,
		};
		if inumber == 0 || inumber >= ninodes {
			return -1;
		}
		let inode = self.read_inode(inumber);
		if inode.isvalid { inode.size as i64 } else { -1 }
	}

	/// Copies up to `length` bytes of inode `inumber`'s content starting at `offset` into
	/// `out`, returning the number of bytes actually placed. Never allocates.
	pub fn read(&mut self, inumber: u32, out: &mut [u8], length: usize, offset: usize) -> usize {
		debug_assert!(out.len() >= length);
		let ninodes = match &self.state {
			Some(s) => s.superblock.ninodes as u32,
			None => return 0,
		};
		if inumber == 0 || inumber >= ninodes {
			return 0;
		}
		let inode = self.read_inode(inumber);
		if !inode.isvalid {
			return 0;
		}
		let size = inode.size as usize;
		if offset > size {
			return 0;
		}
		let n = length.min(size - offset);
		if n == 0 {
			return 0;
		}

		let start_block = offset / BLOCK_SIZE;
		let mut walker = InodeDataWalker::new(&mut self.dev);
		walker.seed(&inode);
		for _ in 0..start_block {
			walker.next();
		}

		let mut written = 0usize;
		let mut logical = start_block;
		let mut block = [0u8; BLOCK_SIZE];
		while written < n {
			if walker.next_with_copy(&mut block).is_none() {
				break;
			}
			let block_offset = if logical == start_block {
				offset % BLOCK_SIZE
			} else {
				0
			};
			let take = (BLOCK_SIZE - block_offset).min(n - written);
			out[written..written + take].copy_from_slice(&block[block_offset..block_offset + take]);
			written += take;
			logical += 1;
		}
		written
	}

	/// Writes `length` bytes from `data` into inode `inumber` at `offset`, allocating new data
	/// blocks (and the indirect block, on first use) as needed. Returns the number of bytes
	/// actually written, which is less than `length` only if the disk ran out of free blocks
	/// or the logical offset overflowed the structural maximum (§7).
	pub fn write(&mut self, inumber: u32, data: &[u8], length: usize, offset: usize) -> usize {
		debug_assert!(data.len() >= length);
		let ninodes = match &self.state {
			Some(s) => s.superblock.ninodes as u32,
			None => return 0,
		};
		if inumber == 0 || inumber >= ninodes {
			return 0;
		}
		let mut inode = self.read_inode(inumber);
		if !inode.isvalid {
			return 0;
		}
		let size = inode.size as usize;
		if offset > size {
			return 0;
		}

		let covered = inode.block_count();
		let mut indirect_present = inode.indirect != 0;
		let mut indirect_buf: Option<[i32; POINTERS_PER_BLOCK]> = None;

		let start_block = offset / BLOCK_SIZE;
		let mut logical = start_block;
		let mut written = 0usize;

		while written < length {
			if logical >= DIRECT_POINTERS + POINTERS_PER_BLOCK {
				break; // structural overflow: cannot be backed (§7)
			}
			if logical >= DIRECT_POINTERS && indirect_buf.is_none() {
				indirect_buf = Some(if indirect_present {
					decode_pointers(&self.read_block(inode.indirect as u32))
				} else {
					[0i32; POINTERS_PER_BLOCK]
				});
			}

			let block_num = if logical < covered {
				if logical < DIRECT_POINTERS {
					inode.direct[logical] as u32
				} else {
					indirect_buf.as_ref().unwrap()[logical - DIRECT_POINTERS] as u32
				}
			} else {
				if logical >= DIRECT_POINTERS && !indirect_present {
					match self.allocate_block() {
						Some(b) => {
							inode.indirect = b as i32;
							indirect_present = true;
						}
						None => break,
					}
				}
				match self.allocate_block() {
					Some(b) => {
						if logical < DIRECT_POINTERS {
							inode.direct[logical] = b as i32;
						} else {
							indirect_buf.as_mut().unwrap()[logical - DIRECT_POINTERS] = b as i32;
						}
						b
					}
					None => break,
				}
			};

			let mut block = self.read_block(block_num);
			let block_offset = if logical == start_block {
				offset % BLOCK_SIZE
			} else {
				0
			};
			let take = (BLOCK_SIZE - block_offset).min(length - written);
			block[block_offset..block_offset + take]
				.copy_from_slice(&data[written..written + take]);
			self.write_block(block_num, &block);

			written += take;
			logical += 1;
		}

		if indirect_present {
			if let Some(pointers) = indirect_buf {
				let mut block = [0u8; BLOCK_SIZE];
				encode_pointers(&pointers, &mut block);
				self.write_block(inode.indirect as u32, &block);
			}
		}
		inode.size = (offset + written).max(size) as i32;
		self.write_inode(inumber, &inode);
		written
	}

	/// Diagnostic dump of the superblock and every live inode.
	pub fn debug(&mut self) {
		let sb = Superblock::decode(&self.read_block(0));
		println!("superblock:");
		println!(
			"    magic number {} valid",
			if sb.is_valid() { "is" } else { "is not" }
		);
		println!("    {} blocks total on disk", sb.nblocks);
		println!("    {} blocks dedicated to inode table on disk", sb.ninodeblocks);
		println!("    {} total spots in inode table", sb.ninodes);

		let live: Vec<(u32, Inode)> = {
			let mut walker = InodeTableWalker::new(&mut self.dev, sb.ninodes as u32);
			walker.seed(1);
			let mut v = Vec::new();
			while let Some((inumber, inode)) = walker.next() {
				if inode.isvalid {
					v.push((inumber, inode));
				}
			}
			v
		};

		for (inumber, inode) in live {
			println!("inode {inumber}:");
			println!("    size: {} bytes", inode.size);

			let ndirect = DIRECT_POINTERS.min(inode.block_count());
			print!("    direct data blocks:");
			for d in inode.direct.iter().take(ndirect) {
				print!(" {d}");
			}
			println!();

			let nindirect = inode.block_count() - ndirect;
			if nindirect > 0 {
				println!("    indirect block: {}", inode.indirect);
				print!("    indirect data blocks:");
				let pointers = decode_pointers(&self.read_block(inode.indirect as u32));
				for p in pointers.iter().take(nindirect) {
					print!(" {p}");
				}
				println!();
			}

			if inode.raw_block_count() > DIRECT_POINTERS + POINTERS_PER_BLOCK {
				println!("    WARNING: inode exceeds capacity of direct and indirect data blocks");
			}
		}
	}

	/// Gives access to the block device for components (the defragmenter) that must bypass
	/// the filesystem-core abstraction and touch raw blocks directly.
	pub(crate) fn device_mut(&mut self) -> &mut D {
		&mut self.dev
	}

	pub(crate) fn state(&self) -> Option<(&Superblock, &Bitmap, &Bitmap)> {
		self.state
			.as_ref()
			.map(|s| (&s.superblock, &s.inode_free, &s.block_free))
	}

	pub(crate) fn replace_state(&mut self, superblock: Superblock, inode_free: Bitmap, block_free: Bitmap) {
		self.state = Some(MountState {
			superblock,
			inode_free,
			block_free,
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block_device::MemBlockDevice;

	fn formatted(nblocks: u32) -> FileSystem<MemBlockDevice> {
		let mut fs = FileSystem::new(MemBlockDevice::new(nblocks));
		assert!(fs.format());
		assert!(fs.mount());
		fs
	}

	#[test]
	fn format_lays_out_superblock_per_scenario_1() {
		let mut fs = FileSystem::new(MemBlockDevice::new(100));
		assert!(fs.format());
		let block = fs.read_block(0);
		let sb = Superblock::decode(&block);
		assert_eq!(
			sb,
			Superblock {
				magic: crate::codec::SUPERBLOCK_MAGIC,
				nblocks: 100,
				ninodeblocks: 10,
				ninodes: 1280,
			}
		);
		// Every inode slot is invalid after format.
		for b in 1..=10u32 {
			let block = fs.read_block(b);
			for slot in 0..crate::codec::INODES_PER_BLOCK {
				assert!(!Inode::decode_from(&block, slot).isvalid);
			}
		}
	}

	#[test]
	fn format_fails_while_mounted() {
		let mut fs = formatted(100);
		assert!(!fs.format());
	}

	#[test]
	fn mount_fails_on_bad_magic() {
		let mut fs = FileSystem::new(MemBlockDevice::new(10));
		assert!(!fs.mount());
	}

	#[test]
	fn mount_twice_fails() {
		let mut fs = formatted(100);
		assert!(!fs.mount());
	}

	#[test]
	fn create_returns_low_to_high_inumbers_per_scenario_2() {
		let mut fs = formatted(100);
		assert_eq!(fs.create(), 1);
		assert_eq!(fs.create(), 2);
		assert_eq!(fs.create(), 3);
	}

	#[test]
	fn write_then_read_round_trips_per_scenario_3() {
		let mut fs = formatted(100);
		fs.create();
		fs.create();
		let inumber = fs.create();
		assert_eq!(inumber, 3);
		assert_eq!(fs.write(inumber, b"abcd", 4, 0), 4);
		let mut buf = [0u8; 4];
		assert_eq!(fs.read(inumber, &mut buf, 4, 0), 4);
		assert_eq!(&buf, b"abcd");
		assert_eq!(fs.getsize(inumber), 4);
	}

	#[test]
	fn write_past_direct_region_allocates_indirect_per_scenario_4() {
		let mut fs = formatted(100);
		let inumber = fs.create();
		let data = vec![1u8; 20481];
		assert_eq!(fs.write(inumber, &data, data.len(), 0), 20481);
		assert_eq!(fs.getsize(inumber), 20481);

		let inode = fs.read_inode(inumber);
		let mut seen = std::collections::HashSet::new();
		for d in inode.direct {
			assert!((11..100).contains(&d));
			assert!(seen.insert(d));
		}
		assert!(seen.insert(inode.indirect));
		assert!((11..100).contains(&inode.indirect));

		let pointers = decode_pointers(&fs.read_block(inode.indirect as u32));
		assert!(seen.insert(pointers[0]));
		assert!((11..100).contains(&pointers[0]));
	}

	#[test]
	fn read_returns_zero_at_end_of_file() {
		let mut fs = formatted(100);
		let inumber = fs.create();
		fs.write(inumber, b"hi", 2, 0);
		let mut buf = [0u8; 10];
		assert_eq!(fs.read(inumber, &mut buf, 10, 2), 0);
	}

	#[test]
	fn write_rejects_offset_past_size() {
		let mut fs = formatted(100);
		let inumber = fs.create();
		fs.write(inumber, b"hi", 2, 0);
		assert_eq!(fs.write(inumber, b"x", 1, 5), 0);
		assert_eq!(fs.getsize(inumber), 2);
	}

	#[test]
	fn delete_then_create_reuses_lowest_inumber() {
		let mut fs = formatted(100);
		fs.create();
		let two = fs.create();
		fs.create();
		assert!(fs.delete(two));
		assert_eq!(fs.create(), two);
	}

	#[test]
	fn delete_rejects_unknown_or_already_free() {
		let mut fs = formatted(100);
		assert!(!fs.delete(1));
		let one = fs.create();
		assert!(fs.delete(one));
		assert!(!fs.delete(one));
	}

	#[test]
	fn getsize_is_negative_one_when_unmounted_or_invalid() {
		let mut fs = FileSystem::new(MemBlockDevice::new(100));
		assert_eq!(fs.getsize(1), -1);
		fs.format();
		fs.mount();
		assert_eq!(fs.getsize(0), -1);
		assert_eq!(fs.getsize(999), -1);
	}

	#[test]
	fn full_disk_single_large_write_per_scenario_6() {
		// 20 blocks: 2 inode blocks (ceil(20/10)=2), 17 data blocks. Of those 17, one is
		// consumed by the indirect block itself once the write crosses 5 direct blocks, so
		// only 16 blocks of logical content actually fit; the literal 17*4096 byte count from
		// the originating scenario does not account for that overhead.
		let mut fs = formatted(20);
		let inumber = fs.create();
		let data = vec![7u8; 17 * BLOCK_SIZE];
		assert_eq!(fs.write(inumber, &data, data.len(), 0), 16 * BLOCK_SIZE);
		assert_eq!(fs.write(inumber, &data, data.len(), 16 * BLOCK_SIZE), 0);
		for i in 1..256 {
			if i == inumber {
				continue;
			}
			assert_ne!(fs.create(), 0, "inode creation should still succeed");
		}
	}

	#[test]
	fn write_never_shrinks_size() {
		let mut fs = formatted(100);
		let inumber = fs.create();
		fs.write(inumber, b"hello world", 11, 0);
		fs.write(inumber, b"HI", 2, 0);
		assert_eq!(fs.getsize(inumber), 11);
		let mut buf = [0u8; 11];
		fs.read(inumber, &mut buf, 11, 0);
		assert_eq!(&buf, b"HIllo world");
	}
}
