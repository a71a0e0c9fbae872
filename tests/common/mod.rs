#![allow(dead_code)]

use std::f32::consts::PI;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::Arc;

use sonar_match::mods::fft::{ FftBackend, RustFftBackend };
use sonar_match::mods::memory::{ LinearMemory, Ptr };
use sonar_match::Result;

/// Linear chirp from `f0` to `f1` Hz over `n` samples.
pub fn gen_chirp(f0: f32, f1: f32, sr: u32, n: usize) -> Vec<f32> {
    let dur = n as f32 / sr as f32;
    let k = (f1 - f0) / dur;
    (0..n)
        .map(|i| {
            let t = i as f32 / sr as f32;
            (2.0 * PI * (f0 * t + 0.5 * k * t * t)).sin()
        })
        .collect()
}

pub fn gen_noise(n: usize, seed: u32, amp: f32) -> Vec<f32> {
    let mut s = seed;
    (0..n)
        .map(|_| {
            s = s.wrapping_mul(1664525).wrapping_add(1013904223);
            amp * (((s >> 8) as f32) / 8388608.0 - 1.0)
        })
        .collect()
}

pub fn insert_at(dst: &mut [f32], at: usize, src: &[f32]) {
    dst[at..at + src.len()].copy_from_slice(src);
}

/// 16-bit PCM WAV with exactly the given integer samples.
pub fn wav_i16(samples: &[i16], sr: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sr.to_le_bytes());
    out.extend_from_slice(&(sr * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

pub fn to_i16(x: &[f32]) -> Vec<i16> {
    x.iter()
        .map(|v| (v.clamp(-1.0, 1.0) * 32767.0).round() as i16)
        .collect()
}

/// Counts calls into the wrapped primitive.
pub struct CountingBackend {
    inner: RustFftBackend,
    pub calls: Arc<AtomicUsize>,
}

impl CountingBackend {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (CountingBackend { inner: RustFftBackend::new(), calls: calls.clone() }, calls)
    }
}

impl FftBackend for CountingBackend {
    fn forward(
        &mut self,
        mem: &mut LinearMemory,
        n: usize,
        in_re: Ptr,
        in_im: Ptr,
        out_re: Ptr,
        out_im: Ptr
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.forward(mem, n, in_re, in_im, out_re, out_im)
    }

    fn inverse(
        &mut self,
        mem: &mut LinearMemory,
        n: usize,
        in_re: Ptr,
        in_im: Ptr,
        out_re: Ptr,
        out_im: Ptr
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.inverse(mem, n, in_re, in_im, out_re, out_im)
    }
}

/// Allocates a large scratch block in linear memory on every call, forcing the heap to grow and
/// move underneath the caller's workspace. Scratch is never freed, like a leaky foreign module.
pub struct GrowingBackend {
    inner: RustFftBackend,
    grow_by: usize,
}

impl GrowingBackend {
    pub fn new(grow_by: usize) -> Self {
        GrowingBackend { inner: RustFftBackend::new(), grow_by }
    }
}

impl FftBackend for GrowingBackend {
    fn forward(
        &mut self,
        mem: &mut LinearMemory,
        n: usize,
        in_re: Ptr,
        in_im: Ptr,
        out_re: Ptr,
        out_im: Ptr
    ) -> Result<()> {
        let scratch = mem.malloc(self.grow_by)?;
        mem.slice_mut(scratch, self.grow_by)?.fill(f32::NAN);
        self.inner.forward(mem, n, in_re, in_im, out_re, out_im)
    }

    fn inverse(
        &mut self,
        mem: &mut LinearMemory,
        n: usize,
        in_re: Ptr,
        in_im: Ptr,
        out_re: Ptr,
        out_im: Ptr
    ) -> Result<()> {
        let scratch = mem.malloc(self.grow_by)?;
        mem.slice_mut(scratch, self.grow_by)?.fill(f32::NAN);
        self.inner.inverse(mem, n, in_re, in_im, out_re, out_im)
    }
}
