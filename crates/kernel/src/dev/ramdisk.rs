//! Memory-backed block device.
//!
//! The zero-hardware device: a `Vec` behind a lock. Used for ram-backed
//! mounts and as the fixture device in the buffer-cache tests.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use fos_utils::Mutex;

use super::{BlockDevice, BlockError};

pub struct Ramdisk {
    block_size: usize,
    num_blocks: u64,
    data: Mutex<Vec<u8>>,
}

impl Ramdisk {
    /// Allocate a zero-filled ramdisk of `num_blocks` blocks.
    pub fn new(block_size: usize, num_blocks: u64) -> Arc<Self> {
        Arc::new(Self {
            block_size,
            num_blocks,
            data: Mutex::new(vec![0; block_size * num_blocks as usize]),
        })
    }

    fn check(&self, blkno: u64, len: usize) -> Result<usize, BlockError> {
        if len == 0 || len % self.block_size != 0 {
            return Err(BlockError::InvalidBufferSize);
        }
        let nblocks = (len / self.block_size) as u64;
        if blkno + nblocks > self.num_blocks {
            return Err(BlockError::OutOfRange);
        }
        Ok(blkno as usize * self.block_size)
    }
}

impl BlockDevice for Ramdisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> u64 {
        self.num_blocks
    }

    fn read_blocks(&self, blkno: u64, buf: &mut [u8]) -> Result<(), BlockError> {
        let start = self.check(blkno, buf.len())?;
        let data = self.data.lock();
        buf.copy_from_slice(&data[start..start + buf.len()]);
        Ok(())
    }

    fn write_blocks(&self, blkno: u64, buf: &[u8]) -> Result<(), BlockError> {
        let start = self.check(blkno, buf.len())?;
        let mut data = self.data.lock();
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}
