//! SimpleFS: a small user-space filesystem over a fixed-size emulated block disk.

pub mod bitmap;
pub mod block_device;
pub mod codec;
pub mod defrag;
pub mod fs;
pub mod walker;
