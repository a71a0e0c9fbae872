//! src/mods/memory.rs
//! Growable f32 linear memory with a first-fit allocator.
//!
//! This stands in for the heap of a foreign module (a WASM instance, a C FFT library) that the
//! FFT primitive reads and writes through offsets. Growing the heap may move it, which is
//! tracked by a generation counter so that holders of offsets know to re-derive their views.

use crate::error::{ MatchError, Result };

/// Offset (in f32 units) of an allocation inside [`LinearMemory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ptr(pub usize);

impl Ptr {
    pub fn offset(self, floats: usize) -> Ptr {
        Ptr(self.0 + floats)
    }
}

#[derive(Debug, Clone, Copy)]
struct Block {
    start: usize,
    len: usize,
}

pub struct LinearMemory {
    heap: Vec<f32>,
    live: Vec<Block>,
    max_floats: usize,
    generation: u64,
    grow_count: u64,
}

const MIN_HEAP_FLOATS: usize = 1 << 12;

impl LinearMemory {
    /// `max_bytes` caps the heap; allocations past it fail with [`MatchError::Resource`].
    pub fn new(max_bytes: usize) -> Self {
        LinearMemory {
            heap: Vec::new(),
            live: Vec::new(),
            max_floats: max_bytes / std::mem::size_of::<f32>(),
            generation: 0,
            grow_count: 0,
        }
    }

    /// Bumped every time growth may have moved the heap.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn grow_count(&self) -> u64 {
        self.grow_count
    }

    pub fn size_bytes(&self) -> usize {
        self.heap.len() * std::mem::size_of::<f32>()
    }

    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    /// First-fit allocation of `floats` zeroed f32 slots. Grows the heap when nothing fits.
    pub fn malloc(&mut self, floats: usize) -> Result<Ptr> {
        if floats == 0 {
            return Err(MatchError::Resource("zero-sized allocation".to_string()));
        }
        let start = match self.find_gap(floats) {
            Some(start) => start,
            None => {
                let start = self.live
                    .last()
                    .map(|b| b.start + b.len)
                    .unwrap_or(0);
                self.grow(start + floats)?;
                start
            }
        };
        self.heap[start..start + floats].fill(0.0);
        let idx = self.live.partition_point(|b| b.start < start);
        self.live.insert(idx, Block { start, len: floats });
        Ok(Ptr(start))
    }

    pub fn free(&mut self, ptr: Ptr) -> Result<()> {
        match self.live.iter().position(|b| b.start == ptr.0) {
            Some(idx) => {
                self.live.remove(idx);
                Ok(())
            }
            None => Err(MatchError::Resource(format!("free of unknown pointer {}", ptr.0))),
        }
    }

    fn find_gap(&self, floats: usize) -> Option<usize> {
        let mut cursor = 0usize;
        for b in &self.live {
            if b.start - cursor >= floats {
                return Some(cursor);
            }
            cursor = b.start + b.len;
        }
        if self.heap.len().saturating_sub(cursor) >= floats {
            Some(cursor)
        } else {
            None
        }
    }

    fn grow(&mut self, needed: usize) -> Result<()> {
        if needed <= self.heap.len() {
            return Ok(());
        }
        if needed > self.max_floats {
            return Err(
                MatchError::Resource(
                    format!(
                        "linear memory limit reached: need {} bytes, limit {} bytes",
                        needed * 4,
                        self.max_floats * 4
                    )
                )
            );
        }
        let new_len = needed
            .next_power_of_two()
            .max(MIN_HEAP_FLOATS)
            .min(self.max_floats);
        let extra = new_len - self.heap.len();
        self.heap
            .try_reserve_exact(extra)
            .map_err(|e| MatchError::Resource(format!("heap growth to {} floats failed: {}", new_len, e)))?;
        self.heap.resize(new_len, 0.0);
        self.generation += 1;
        self.grow_count += 1;
        Ok(())
    }

    fn check(&self, ptr: Ptr, len: usize) -> Result<()> {
        let end = ptr.0.checked_add(len);
        let inside = self.live.iter().any(|b| ptr.0 >= b.start && end.map_or(false, |e| e <= b.start + b.len));
        if inside {
            Ok(())
        } else {
            Err(
                MatchError::Resource(
                    format!("access [{}, {}) is outside any live allocation", ptr.0, ptr.0 + len)
                )
            )
        }
    }

    pub fn slice(&self, ptr: Ptr, len: usize) -> Result<&[f32]> {
        self.check(ptr, len)?;
        Ok(&self.heap[ptr.0..ptr.0 + len])
    }

    pub fn slice_mut(&mut self, ptr: Ptr, len: usize) -> Result<&mut [f32]> {
        self.check(ptr, len)?;
        Ok(&mut self.heap[ptr.0..ptr.0 + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malloc_reuses_freed_gaps() {
        let mut mem = LinearMemory::new(1 << 20);
        let a = mem.malloc(100).unwrap();
        let b = mem.malloc(100).unwrap();
        assert_eq!(a, Ptr(0));
        assert_eq!(b, Ptr(100));
        mem.free(a).unwrap();
        let c = mem.malloc(50).unwrap();
        assert_eq!(c, Ptr(0));
        assert_eq!(mem.live_allocations(), 2);
    }

    #[test]
    fn growth_bumps_generation() {
        let mut mem = LinearMemory::new(1 << 24);
        mem.malloc(10).unwrap();
        let g = mem.generation();
        mem.malloc(MIN_HEAP_FLOATS).unwrap();
        assert!(mem.generation() > g);
        let g2 = mem.generation();
        mem.malloc(1).unwrap();
        assert_eq!(mem.generation(), g2);
    }

    #[test]
    fn limit_is_a_resource_error() {
        let mut mem = LinearMemory::new(1024);
        assert!(matches!(mem.malloc(1000), Err(MatchError::Resource(_))));
    }

    #[test]
    fn access_outside_allocation_is_rejected() {
        let mut mem = LinearMemory::new(1 << 20);
        let p = mem.malloc(8).unwrap();
        assert!(mem.slice(p, 8).is_ok());
        assert!(mem.slice(p, 9).is_err());
        mem.free(p).unwrap();
        assert!(mem.slice(p, 1).is_err());
        assert!(mem.free(p).is_err());
    }

    #[test]
    fn fresh_allocations_are_zeroed() {
        let mut mem = LinearMemory::new(1 << 20);
        let p = mem.malloc(4).unwrap();
        mem.slice_mut(p, 4).unwrap().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        mem.free(p).unwrap();
        let q = mem.malloc(4).unwrap();
        assert_eq!(mem.slice(q, 4).unwrap(), &[0.0; 4]);
    }
}
