//! src/mods/fft.rs
//! The complex FFT primitive, called with split real/imag buffers that live in linear memory.

use std::collections::HashMap;
use std::sync::Arc;

use rustfft::{ num_complex::Complex, Fft, FftPlanner };

use crate::error::{ MatchError, Result };
use crate::mods::memory::{ LinearMemory, Ptr };

/// Split-complex FFT over buffers in [`LinearMemory`]. Both directions are unnormalized.
///
/// Implementations may allocate from `mem` while running, which can relocate the heap; callers
/// must re-derive any views they hold once the call returns. Input and output pointers may be
/// the same (in-place).
pub trait FftBackend {
    fn forward(
        &mut self,
        mem: &mut LinearMemory,
        n: usize,
        in_re: Ptr,
        in_im: Ptr,
        out_re: Ptr,
        out_im: Ptr
    ) -> Result<()>;

    fn inverse(
        &mut self,
        mem: &mut LinearMemory,
        n: usize,
        in_re: Ptr,
        in_im: Ptr,
        out_re: Ptr,
        out_im: Ptr
    ) -> Result<()>;
}

/// rustfft-backed primitive. Plans are cached per (size, direction).
pub struct RustFftBackend {
    planner: FftPlanner<f32>,
    plans: HashMap<(usize, bool), Arc<dyn Fft<f32>>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Default for RustFftBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RustFftBackend {
    pub fn new() -> Self {
        RustFftBackend {
            planner: FftPlanner::new(),
            plans: HashMap::new(),
            buffer: Vec::new(),
            scratch: Vec::new(),
        }
    }

    fn run(
        &mut self,
        mem: &mut LinearMemory,
        n: usize,
        forward: bool,
        (in_re, in_im): (Ptr, Ptr),
        (out_re, out_im): (Ptr, Ptr)
    ) -> Result<()> {
        if n == 0 || !n.is_power_of_two() {
            return Err(MatchError::Fft(format!("size {} is not a power of two", n)));
        }
        let planner = &mut self.planner;
        let fft = self.plans
            .entry((n, forward))
            .or_insert_with(|| {
                if forward { planner.plan_fft_forward(n) } else { planner.plan_fft_inverse(n) }
            })
            .clone();

        {
            let re = mem.slice(in_re, n)?;
            let im = mem.slice(in_im, n)?;
            self.buffer.clear();
            self.buffer.extend(
                re
                    .iter()
                    .zip(im)
                    .map(|(&r, &i)| Complex::new(r, i))
            );
        }

        let scratch_len = fft.get_inplace_scratch_len();
        if self.scratch.len() < scratch_len {
            self.scratch.resize(scratch_len, Complex::new(0.0, 0.0));
        }
        fft.process_with_scratch(&mut self.buffer, &mut self.scratch[..scratch_len]);

        let out = mem.slice_mut(out_re, n)?;
        for (o, c) in out.iter_mut().zip(&self.buffer) {
            *o = c.re;
        }
        let out = mem.slice_mut(out_im, n)?;
        for (o, c) in out.iter_mut().zip(&self.buffer) {
            *o = c.im;
        }
        Ok(())
    }
}

impl FftBackend for RustFftBackend {
    fn forward(
        &mut self,
        mem: &mut LinearMemory,
        n: usize,
        in_re: Ptr,
        in_im: Ptr,
        out_re: Ptr,
        out_im: Ptr
    ) -> Result<()> {
        self.run(mem, n, true, (in_re, in_im), (out_re, out_im))
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
        self.run(mem, n, false, (in_re, in_im), (out_re, out_im))
    }
}
