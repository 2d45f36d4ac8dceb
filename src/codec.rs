//! Interprets a raw 4 096-byte block as one of the typed views SimpleFS knows about:
//! superblock, inode table block, indirect pointer block, or raw data.
//!
//! The source reinterprets a single buffer as a C `union`; here each view decodes a
//! `[u8; BLOCK_SIZE]` on demand instead of relying on overlapped storage, so there is exactly
//! one place that knows the on-disk byte order and field widths.

/// Size in bytes of one disk block, fixed by the block device.
pub const BLOCK_SIZE: usize = 4096;

/// Sentinel identifying a formatted SimpleFS superblock.
pub const SUPERBLOCK_MAGIC: i32 = 0xF0F0_3410u32 as i32;

/// Number of direct data-block pointers held inline in an inode.
pub const DIRECT_POINTERS: usize = 5;

/// Number of inode records packed into one inode-table block.
pub const INODES_PER_BLOCK: usize = 128;

/// Number of 4-byte pointers packed into one indirect block.
pub const POINTERS_PER_BLOCK: usize = 1024;

/// Byte size of one packed inode record.
pub const INODE_SIZE: usize = 32;

/// One raw disk block.
pub type Block = [u8; BLOCK_SIZE];

/// Block 0's contents: global filesystem parameters, fixed at `format` time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Superblock {
	pub magic: i32,
	pub nblocks: i32,
	pub ninodeblocks: i32,
	pub ninodes: i32,
}

impl Superblock {
	/// Computes the inode-table size and inode count a freshly formatted disk of `nblocks`
	/// blocks gets, per the `ceil(nblocks / 10)` policy.
	pub fn for_disk(nblocks: i32) -> Self {
		let ninodeblocks = nblocks.div_ceil(10);
		Self {
			magic: SUPERBLOCK_MAGIC,
			nblocks,
			ninodeblocks,
			ninodes: ninodeblocks * INODES_PER_BLOCK as i32,
		}
	}

	pub fn is_valid(&self) -> bool {
		self.magic == SUPERBLOCK_MAGIC
	}

	pub fn decode(block: &Block) -> Self {
		Self {
			magic: read_i32(block, 0),
			nblocks: read_i32(block, 4),
			ninodeblocks: read_i32(block, 8),
			ninodes: read_i32(block, 12),
		}
	}

	pub fn encode(&self, block: &mut Block) {
		block.fill(0);
		write_i32(block, 0, self.magic);
		write_i32(block, 4, self.nblocks);
		write_i32(block, 8, self.ninodeblocks);
		write_i32(block, 12, self.ninodes);
	}
}

/// One 32-byte inode record: `{isvalid, size, direct[5], indirect}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Inode {
	pub isvalid: bool,
	pub size: i32,
	pub direct: [i32; DIRECT_POINTERS],
	pub indirect: i32,
}

impl Inode {
	/// Number of logical 4 KiB blocks this inode's `size` spans, with no cap. Used only to
	/// detect the structural-overflow condition in `debug`; every other consumer wants
	/// `block_count`.
	pub fn raw_block_count(&self) -> usize {
		self.size.max(0).div_ceil(BLOCK_SIZE as i32) as usize
	}

	/// Number of logical 4 KiB blocks this inode's `size` spans, capped at the structural
	/// maximum of 5 direct + 1024 indirect blocks.
	pub fn block_count(&self) -> usize {
		self.raw_block_count()
			.min(DIRECT_POINTERS + POINTERS_PER_BLOCK)
	}

	pub fn uses_indirect(&self) -> bool {
		self.size as usize > DIRECT_POINTERS * BLOCK_SIZE
	}

	/// Decodes the inode at `slot` (0..128) out of a freshly read inode-table block.
	pub fn decode_from(block: &Block, slot: usize) -> Self {
		let base = slot * INODE_SIZE;
		let isvalid = read_i32(block, base) != 0;
		let size = read_i32(block, base + 4);
		let mut direct = [0i32; DIRECT_POINTERS];
		for (i, d) in direct.iter_mut().enumerate() {
			*d = read_i32(block, base + 8 + i * 4);
		}
		let indirect = read_i32(block, base + 8 + DIRECT_POINTERS * 4);
		Self {
			isvalid,
			size,
			direct,
			indirect,
		}
	}

	/// Encodes this inode into `slot` (0..128) of a table block, leaving the other 127 slots
	/// untouched.
	pub fn encode_into(&self, block: &mut Block, slot: usize) {
		let base = slot * INODE_SIZE;
		write_i32(block, base, self.isvalid as i32);
		write_i32(block, base + 4, self.size);
		for (i, d) in self.direct.iter().enumerate() {
			write_i32(block, base + 8 + i * 4, *d);
		}
		write_i32(block, base + 8 + DIRECT_POINTERS * 4, self.indirect);
	}
}

/// Splits a global inumber into the (0-based) inode-table block index and in-block slot.
pub fn inode_location(inumber: u32) -> (u32, usize) {
	(
		inumber / INODES_PER_BLOCK as u32,
		(inumber % INODES_PER_BLOCK as u32) as usize,
	)
}

/// Decodes an indirect block's 1024 pointers.
pub fn decode_pointers(block: &Block) -> [i32; POINTERS_PER_BLOCK] {
	let mut pointers = [0i32; POINTERS_PER_BLOCK];
	for (i, p) in pointers.iter_mut().enumerate() {
		*p = read_i32(block, i * 4);
	}
	pointers
}

/// Encodes 1024 pointers into an indirect block.
pub fn encode_pointers(pointers: &[i32; POINTERS_PER_BLOCK], block: &mut Block) {
	for (i, p) in pointers.iter().enumerate() {
		write_i32(block, i * 4, *p);
	}
}

fn read_i32(block: &Block, offset: usize) -> i32 {
	i32::from_ne_bytes(block[offset..offset + 4].try_into().unwrap())
}

fn write_i32(block: &mut Block, offset: usize, value: i32) {
	block[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn superblock_round_trip() {
		let sb = Superblock::for_disk(100);
		assert_eq!(
			sb,
			Superblock {
				magic: SUPERBLOCK_MAGIC,
				nblocks: 100,
				ninodeblocks: 10,
				ninodes: 1280,
			}
		);
		let mut block = [0u8; BLOCK_SIZE];
		sb.encode(&mut block);
		assert_eq!(Superblock::decode(&block), sb);
		assert!(block[16..].iter().all(|b| *b == 0));
	}

	#[test]
	fn superblock_rejects_bad_magic() {
		let block = [0u8; BLOCK_SIZE];
		assert!(!Superblock::decode(&block).is_valid());
	}

	#[test]
	fn inode_round_trip_preserves_other_slots() {
		let mut block = [0xAAu8; BLOCK_SIZE];
		let inode = Inode {
			isvalid: true,
			size: 4096 * 3 + 10,
			direct: [11, 12, 13, 0, 0],
			indirect: 0,
		};
		inode.encode_into(&mut block, 5);
		assert_eq!(Inode::decode_from(&block, 5), inode);
		// An untouched slot still reads back as the un-initialized fill pattern.
		let other = Inode::decode_from(&block, 6);
		assert_eq!(other.isvalid, true); // 0xAAAAAAAA != 0
		assert_eq!(inode.block_count(), 3);
		assert!(!inode.uses_indirect());
	}

	#[test]
	fn indirect_block_round_trip() {
		let mut pointers = [0i32; POINTERS_PER_BLOCK];
		pointers[0] = 42;
		pointers[1023] = -1;
		let mut block = [0u8; BLOCK_SIZE];
		encode_pointers(&pointers, &mut block);
		assert_eq!(decode_pointers(&block), pointers);
	}

	#[test]
	fn inode_location_splits_global_index() {
		assert_eq!(inode_location(0), (0, 0));
		assert_eq!(inode_location(127), (0, 127));
		assert_eq!(inode_location(128), (1, 0));
		assert_eq!(inode_location(255), (1, 127));
	}
}
