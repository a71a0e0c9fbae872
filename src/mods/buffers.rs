//! src/mods/buffers.rs
//! FFT workspace: four equal-capacity f32 arrays carved out of one linear-memory block.
//!
//! Layout of the block is `[search_re | search_im | product_re | product_im]`, each `capacity`
//! floats. Capacity only grows. Views are never cached across calls into the FFT primitive;
//! [`BufferManager::revalidate`] re-derives them from the current heap before every read.

use crate::error::{ MatchError, Result };
use crate::logger::Logger;
use crate::mods::memory::{ LinearMemory, Ptr };

/// Offsets of the four arrays inside linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspacePtrs {
    pub search_re: Ptr,
    pub search_im: Ptr,
    pub product_re: Ptr,
    pub product_im: Ptr,
}

/// Mutable views of the four arrays, valid until the next call that can touch linear memory.
pub struct WorkspaceViews<'a> {
    pub search_re: &'a mut [f32],
    pub search_im: &'a mut [f32],
    pub product_re: &'a mut [f32],
    pub product_im: &'a mut [f32],
}

pub struct BufferManager {
    block: Option<Ptr>,
    capacity: usize,
    seen_generation: u64,
    reallocations: u64,
    revalidations: u64,
}

impl Default for BufferManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferManager {
    pub fn new() -> Self {
        BufferManager {
            block: None,
            capacity: 0,
            seen_generation: 0,
            reallocations: 0,
            revalidations: 0,
        }
    }

    /// Floats per array.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many times the block was replaced by a bigger one.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// How many times a heap relocation forced the views to be re-derived.
    pub fn revalidations(&self) -> u64 {
        self.revalidations
    }

    pub fn ptrs(&self) -> Result<WorkspacePtrs> {
        let base = self.block.ok_or_else(||
            MatchError::Resource("FFT workspace used before allocation".to_string())
        )?;
        let n = self.capacity;
        Ok(WorkspacePtrs {
            search_re: base,
            search_im: base.offset(n),
            product_re: base.offset(2 * n),
            product_im: base.offset(3 * n),
        })
    }

    /// Make room for `n` floats per array. Growth frees the old block and allocates `4 × n`
    /// fresh; otherwise the existing block is kept and revalidated.
    pub fn ensure_capacity(
        &mut self,
        mem: &mut LinearMemory,
        n: usize,
        logger: Option<&Logger>
    ) -> Result<WorkspacePtrs> {
        if self.block.is_none() || n > self.capacity {
            if let Some(old) = self.block.take() {
                mem.free(old)?;
            }
            self.capacity = 0;
            let block = mem.malloc(4 * n)?;
            self.block = Some(block);
            self.capacity = n;
            self.seen_generation = mem.generation();
            self.reallocations += 1;
            if let Some(log) = logger {
                crate::log_debug!(
                    log,
                    "FFT workspace allocated: {} floats per array ({} bytes total), heap {} bytes",
                    n,
                    4 * n * 4,
                    mem.size_bytes()
                );
            }
            return self.ptrs();
        }
        self.revalidate(mem, logger)?;
        self.ptrs()
    }

    /// Re-derive the workspace location against the current heap. Called after every FFT call
    /// and before any read of the arrays.
    pub fn revalidate(&mut self, mem: &LinearMemory, logger: Option<&Logger>) -> Result<()> {
        let ptrs = self.ptrs()?;
        if mem.generation() != self.seen_generation {
            // the block must still be live and whole after the move
            mem.slice(ptrs.search_re, 4 * self.capacity)?;
            self.seen_generation = mem.generation();
            self.revalidations += 1;
            if let Some(log) = logger {
                crate::log_debug!(
                    log,
                    "linear memory relocated (generation {}); workspace views re-derived",
                    self.seen_generation
                );
            }
        }
        Ok(())
    }

    /// Split the block into the four arrays. Revalidates first.
    pub fn views<'a>(
        &mut self,
        mem: &'a mut LinearMemory,
        logger: Option<&Logger>
    ) -> Result<WorkspaceViews<'a>> {
        self.revalidate(mem, logger)?;
        let ptrs = self.ptrs()?;
        let n = self.capacity;
        let block = mem.slice_mut(ptrs.search_re, 4 * n)?;
        let (search_re, rest) = block.split_at_mut(n);
        let (search_im, rest) = rest.split_at_mut(n);
        let (product_re, product_im) = rest.split_at_mut(n);
        Ok(WorkspaceViews { search_re, search_im, product_re, product_im })
    }

    /// Release the block back to linear memory.
    pub fn release(&mut self, mem: &mut LinearMemory) -> Result<()> {
        if let Some(block) = self.block.take() {
            mem.free(block)?;
        }
        self.capacity = 0;
        Ok(())
    }
}
