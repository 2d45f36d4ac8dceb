//! Offline compaction: rewrites the inode table and data region into contiguous prefixes
//! without changing any live inode's content or size.
//!
//! Grounded on the same table/data-walker primitives `fs.rs` uses for `mount`; the relocation
//! bookkeeping (two cursors, an in-memory inode-table image and data-region image, flushed once
//! at the end) follows the defragmenter's specified algorithm directly rather than any one
//! teacher file, since nothing in the pack implements compaction — the walkers and bitmap it
//! reuses are grounded the same way they are in `fs.rs`.

use crate::bitmap::Bitmap;
use crate::block_device::BlockDevice;
use crate::codec::{
	BLOCK_SIZE, Block, DIRECT_POINTERS, INODES_PER_BLOCK, Inode, decode_pointers,
	encode_pointers, inode_location,
};
use crate::fs::FileSystem;
use crate::walker::InodeTableWalker;

/// Compacts a mounted filesystem so that live inumbers occupy `1..M` and used data blocks
/// occupy a contiguous prefix of the data region, preserving every inode's bytes and size.
/// Returns `false` if the filesystem is not mounted.
pub fn defrag<D: BlockDevice>(fs: &mut FileSystem<D>) -> bool {
	let Some((sb, _, _)) = fs.state() else {
		return false;
	};
	let sb = *sb;
	let ninodeblocks = sb.ninodeblocks as u32;
	let ninodes = sb.ninodes as u32;
	let nblocks = sb.nblocks as u32;
	let data_capacity = (nblocks - ninodeblocks - 1) as usize;

	let mut table_image = vec![[0u8; BLOCK_SIZE]; ninodeblocks as usize];
	let empty = Inode::default();
	for block in &mut table_image {
		for slot in 0..INODES_PER_BLOCK {
			empty.encode_into(block, slot);
		}
	}
	let mut data_image: Vec<Block> = vec![[0u8; BLOCK_SIZE]; data_capacity];

	let live: Vec<(u32, Inode)> = {
		let dev = fs.device_mut();
		let mut walker = InodeTableWalker::new(dev, ninodes);
		walker.seed(1);
		let mut v = Vec::new();
		while let Some((inumber, inode)) = walker.next() {
			if inode.isvalid {
				v.push((inumber, inode));
			}
		}
		v
	};

	let mut next_inum = 1u32;
	let mut next_data = 0usize;

	for (_, inode) in live {
		let mut relocated = inode;
		let num_blocks = inode.block_count();
		let ndirect = num_blocks.min(DIRECT_POINTERS);

		for slot in 0..ndirect {
			let src = inode.direct[slot] as u32;
			let block = {
				let dev = fs.device_mut();
				let mut buf = [0u8; BLOCK_SIZE];
				dev.read_block(src, &mut buf)
					.expect("disk I/O failed reading data block during defrag");
				buf
			};
			data_image[next_data] = block;
			relocated.direct[slot] = (1 + ninodeblocks as usize + next_data) as i32;
			next_data += 1;
		}
		for slot in ndirect..DIRECT_POINTERS {
			relocated.direct[slot] = 0;
		}

		let nindirect = num_blocks - ndirect;
		if nindirect > 0 {
			let mut pointers = {
				let dev = fs.device_mut();
				let mut buf = [0u8; BLOCK_SIZE];
				dev.read_block(inode.indirect as u32, &mut buf)
					.expect("disk I/O failed reading indirect block during defrag");
				decode_pointers(&buf)
			};
			for p in pointers.iter_mut().take(nindirect) {
				let src = *p as u32;
				let block = {
					let dev = fs.device_mut();
					let mut buf = [0u8; BLOCK_SIZE];
					dev.read_block(src, &mut buf)
						.expect("disk I/O failed reading data block during defrag");
					buf
				};
				data_image[next_data] = block;
				*p = (1 + ninodeblocks as usize + next_data) as i32;
				next_data += 1;
			}
			for p in pointers.iter_mut().skip(nindirect) {
				*p = 0;
			}
			let mut indirect_block = [0u8; BLOCK_SIZE];
			encode_pointers(&pointers, &mut indirect_block);
			data_image[next_data] = indirect_block;
			relocated.indirect = (1 + ninodeblocks as usize + next_data) as i32;
			next_data += 1;
		} else {
			relocated.indirect = 0;
		}

		let (block_idx, slot) = inode_location(next_inum);
		relocated.encode_into(&mut table_image[block_idx as usize], slot);
		next_inum += 1;
	}

	{
		let dev = fs.device_mut();
		for (i, block) in table_image.iter().enumerate() {
			dev.write_block(1 + i as u32, block)
				.expect("disk I/O failed writing inode table during defrag");
		}
		for (i, block) in data_image.iter().take(next_data).enumerate() {
			dev.write_block(1 + ninodeblocks + i as u32, block)
				.expect("disk I/O failed writing data region during defrag");
		}
	}

	let mut inode_free = Bitmap::new(ninodes as usize);
	for i in next_inum as usize..ninodes as usize {
		inode_free.set(i, true);
	}
	let mut block_free = Bitmap::new(nblocks as usize);
	for i in (1 + ninodeblocks as usize + next_data)..nblocks as usize {
		block_free.set(i, true);
	}
	fs.replace_state(sb, inode_free, block_free);
	true
}
