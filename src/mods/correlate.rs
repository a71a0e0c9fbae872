//! src/mods/correlate.rs
//! Normalized cross-correlation of a pattern against every alignment in a search signal.
//!
//! One forward FFT carries both signals: the search in the real channel and the reversed,
//! zero-mean pattern in the imaginary channel. The two spectra are pulled apart with the
//! Hermitian identities
//!
//! ```text
//! X[k] = (C[k] + conj(C[N-k])) / 2
//! Y[k] = (C[k] - conj(C[N-k])) / 2i
//! ```
//!
//! multiplied, mirrored back into a Hermitian product spectrum and inverted once. The valid part
//! of the resulting linear convolution is normalized with running window statistics.

use std::time::{ Duration, Instant };

use crate::error::{ MatchError, Result };
use crate::logger::Logger;
use crate::mods::buffers::BufferManager;
use crate::mods::fft::FftBackend;
use crate::mods::memory::LinearMemory;

/// Denominators below this give a coefficient of 0.
pub const NCC_EPSILON: f64 = 1e-10;

/// Per-sample window variance at or below this (about -120 dBFS) counts as silence.
///
/// The convolution comes out of an f32 FFT whose round-off is spread over every bin, so near a
/// loud passage a window's numerator carries noise around `1e-7` of the loud energy. Against a
/// window this quiet that noise, not the signal, sets the ratio, and the epsilon test alone
/// would let it through as a spurious ±1.
pub const SILENT_VARIANCE: f64 = 1e-12;

#[derive(Debug, Clone, Default)]
pub struct CorrelationTimings {
    pub nfft: usize,
    pub pattern_stats: Duration,
    pub prepare: Duration,
    pub forward_fft: Duration,
    pub unpack_multiply: Duration,
    pub inverse_fft: Duration,
    pub sliding_stats: Duration,
    pub total: Duration,
}

/// Owns the linear memory, the workspace carved out of it, and the FFT primitive.
/// One correlation at a time: every entry point takes `&mut self`.
pub struct Correlator {
    mem: LinearMemory,
    buffers: BufferManager,
    fft: Box<dyn FftBackend>,
    fft_calls: u64,
}

impl Correlator {
    pub fn new(fft: Box<dyn FftBackend>, max_memory_bytes: usize) -> Self {
        Correlator {
            mem: LinearMemory::new(max_memory_bytes),
            buffers: BufferManager::new(),
            fft,
            fft_calls: 0,
        }
    }

    pub fn workspace_capacity(&self) -> usize {
        self.buffers.capacity()
    }

    pub fn workspace_reallocations(&self) -> u64 {
        self.buffers.reallocations()
    }

    pub fn view_revalidations(&self) -> u64 {
        self.buffers.revalidations()
    }

    pub fn heap_bytes(&self) -> usize {
        self.mem.size_bytes()
    }

    /// Times the linear memory had to grow.
    pub fn heap_grows(&self) -> u64 {
        self.mem.grow_count()
    }

    pub fn fft_calls(&self) -> u64 {
        self.fft_calls
    }

    /// Free the workspace. The correlator stays usable; the next call reallocates.
    pub fn release(&mut self) -> Result<()> {
        self.buffers.release(&mut self.mem)
    }

    /// NCC of `pattern` against `search`, one value per alignment
    /// (`search.len() - pattern.len() + 1` of them).
    pub fn ncc(
        &mut self,
        search: &[f32],
        pattern: &[f32],
        logger: Option<&Logger>
    ) -> Result<(Vec<f32>, CorrelationTimings)> {
        let t_start = Instant::now();
        let n1 = search.len();
        let m = pattern.len();
        if m == 0 || n1 == 0 {
            return Err(MatchError::Input("cannot correlate an empty signal".to_string()));
        }
        if m > n1 {
            return Err(MatchError::PatternTooLong { pattern: m, search: n1 });
        }

        let full_len = n1 + m - 1;
        let nfft = full_len.next_power_of_two();
        let mut timings = CorrelationTimings { nfft, ..Default::default() };

        // pattern mean and L2 norm of the zero-mean pattern
        let t0 = Instant::now();
        let (mut ps, mut psq) = (0.0f64, 0.0f64);
        for &v in pattern {
            let v = v as f64;
            ps += v;
            psq += v * v;
        }
        let p_mean = ps / (m as f64);
        let p_var = (psq / (m as f64) - p_mean * p_mean).max(0.0);
        let p_energy = if p_var > 0.0 { (p_var * (m as f64)).sqrt() } else { 0.0 };
        timings.pattern_stats = t0.elapsed();

        if let Some(log) = logger {
            crate::log_debug!(
                log,
                "NCC: search={} pattern={} full={} nfft={} pattern_energy={:.6}",
                n1,
                m,
                full_len,
                nfft,
                p_energy
            );
        }

        // pack: search -> real, reversed zero-mean pattern -> imag
        let t0 = Instant::now();
        let ptrs = self.buffers.ensure_capacity(&mut self.mem, nfft, logger)?;
        {
            let v = self.buffers.views(&mut self.mem, logger)?;
            v.search_re[..n1].copy_from_slice(search);
            v.search_re[n1..nfft].fill(0.0);
            for (dst, &src) in v.search_im[..m].iter_mut().zip(pattern.iter().rev()) {
                *dst = ((src as f64) - p_mean) as f32;
            }
            v.search_im[m..nfft].fill(0.0);
        }
        timings.prepare = t0.elapsed();

        let t0 = Instant::now();
        self.fft.forward(
            &mut self.mem,
            nfft,
            ptrs.search_re,
            ptrs.search_im,
            ptrs.search_re,
            ptrs.search_im
        )?;
        self.fft_calls += 1;
        timings.forward_fft = t0.elapsed();

        let t0 = Instant::now();
        {
            let v = self.buffers.views(&mut self.mem, logger)?;
            unpack_and_multiply(v.search_re, v.search_im, v.product_re, v.product_im, nfft);
        }
        timings.unpack_multiply = t0.elapsed();

        let t0 = Instant::now();
        self.fft.inverse(
            &mut self.mem,
            nfft,
            ptrs.product_re,
            ptrs.product_im,
            ptrs.product_re,
            ptrs.product_im
        )?;
        self.fft_calls += 1;
        timings.inverse_fft = t0.elapsed();

        let t0 = Instant::now();
        let ncc = {
            let v = self.buffers.views(&mut self.mem, logger)?;
            let scale = 1.0 / (nfft as f64);
            sliding_ncc(search, m, &v.product_re[m - 1..n1], scale, p_energy)
        };
        timings.sliding_stats = t0.elapsed();
        timings.total = t_start.elapsed();

        Ok((ncc, timings))
    }
}

/// Recover both spectra from the packed transform `C = sr + i·si`, multiply them, and write the
/// Hermitian-symmetric product into `pr + i·pi`.
fn unpack_and_multiply(sr: &[f32], si: &[f32], pr: &mut [f32], pi: &mut [f32], nfft: usize) {
    let half = nfft / 2;
    for k in 0..=half {
        let km = if k == 0 { 0 } else { nfft - k };

        let (cr, ci) = (sr[k] as f64, si[k] as f64);
        let (dr, di) = (sr[km] as f64, si[km] as f64); // C[N-k]

        // X = (C[k] + conj(C[N-k])) / 2
        let xr = 0.5 * (cr + dr);
        let xi = 0.5 * (ci - di);
        // Y = (C[k] - conj(C[N-k])) / 2i
        let yr = 0.5 * (ci + di);
        let yi = 0.5 * (dr - cr);

        let re = xr * yr - xi * yi;
        let im = xr * yi + xi * yr;

        pr[k] = re as f32;
        pi[k] = im as f32;
        if k != 0 && k != half {
            pr[km] = re as f32;
            pi[km] = -im as f32;
        }
    }
    if nfft == 1 {
        return;
    }
    // DC and Nyquist of a real signal's spectrum are real
    pi[0] = 0.0;
    pi[half] = 0.0;
}

/// NCC from the valid slice of the (unscaled) convolution and running window sums.
fn sliding_ncc(search: &[f32], m: usize, conv: &[f32], scale: f64, p_energy: f64) -> Vec<f32> {
    let n_out = search.len() - m + 1;
    let mut ncc = Vec::with_capacity(n_out);
    let m_f = m as f64;

    let (mut ss, mut ssq) = (0.0f64, 0.0f64);
    for &v in &search[..m] {
        let v = v as f64;
        ss += v;
        ssq += v * v;
    }

    for i in 0..n_out {
        if i > 0 {
            let add = search[i + m - 1] as f64;
            let rem = search[i - 1] as f64;
            ss += add - rem;
            ssq += add * add - rem * rem;
        }
        let mean = ss / m_f;
        let var = (ssq / m_f - mean * mean).max(0.0);
        let denom = (var * m_f).sqrt() * p_energy;
        let value = if var <= SILENT_VARIANCE || denom < NCC_EPSILON {
            0.0
        } else {
            ((conv[i] as f64) * scale / denom).clamp(-1.0, 1.0)
        };
        ncc.push(value as f32);
    }
    ncc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::fft::RustFftBackend;

    fn correlator() -> Correlator {
        Correlator::new(Box::new(RustFftBackend::new()), 64 << 20)
    }

    /// O(N·M) reference.
    fn direct_ncc(search: &[f32], pattern: &[f32]) -> Vec<f32> {
        let m = pattern.len();
        let pm = pattern.iter().map(|&v| v as f64).sum::<f64>() / (m as f64);
        let pn = pattern
            .iter()
            .map(|&v| ((v as f64) - pm).powi(2))
            .sum::<f64>()
            .sqrt();
        (0..=search.len() - m)
            .map(|i| {
                let w = &search[i..i + m];
                let wm = w.iter().map(|&v| v as f64).sum::<f64>() / (m as f64);
                let wn = w
                    .iter()
                    .map(|&v| ((v as f64) - wm).powi(2))
                    .sum::<f64>()
                    .sqrt();
                let num: f64 = w
                    .iter()
                    .zip(pattern)
                    .map(|(&a, &b)| (a as f64) * ((b as f64) - pm))
                    .sum();
                if wn * pn < 1e-10 { 0.0 } else { (num / (wn * pn)) as f32 }
            })
            .collect()
    }

    fn lcg_noise(n: usize, seed: u32) -> Vec<f32> {
        let mut s = seed;
        (0..n)
            .map(|_| {
                s = s.wrapping_mul(1664525).wrapping_add(1013904223);
                ((s >> 8) as f32) / 8388608.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn matches_direct_computation() {
        let search = lcg_noise(300, 7);
        let pattern = search[120..170].to_vec();
        let (ncc, t) = correlator().ncc(&search, &pattern, None).unwrap();
        assert_eq!(t.nfft, 512);
        let reference = direct_ncc(&search, &pattern);
        assert_eq!(ncc.len(), reference.len());
        for (i, (a, b)) in ncc.iter().zip(&reference).enumerate() {
            assert!((a - b).abs() < 1e-3, "offset {}: {} vs {}", i, a, b);
        }
        assert!((ncc[120] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn scaled_and_offset_copy_scores_one() {
        let pattern = lcg_noise(64, 3);
        let mut search = lcg_noise(400, 11);
        for (j, &p) in pattern.iter().enumerate() {
            search[200 + j] = 0.3 * p + 0.25;
        }
        let (ncc, _) = correlator().ncc(&search, &pattern, None).unwrap();
        assert!((ncc[200] - 1.0).abs() < 1e-4, "got {}", ncc[200]);
        let best = ncc
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap().0;
        assert_eq!(best, 200);
    }

    #[test]
    fn inverted_copy_scores_minus_one() {
        let pattern = lcg_noise(32, 5);
        let mut search = vec![0.0f32; 100];
        for (j, &p) in pattern.iter().enumerate() {
            search[10 + j] = -2.0 * p;
        }
        let (ncc, _) = correlator().ncc(&search, &pattern, None).unwrap();
        assert!((ncc[10] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn flat_pattern_and_silence_give_zero() {
        let search = lcg_noise(200, 1);
        let (ncc, _) = correlator().ncc(&search, &[0.5; 20], None).unwrap();
        assert!(ncc.iter().all(|&v| v == 0.0));

        let silent = vec![0.0f32; 200];
        let (ncc, _) = correlator().ncc(&silent, &lcg_noise(20, 2), None).unwrap();
        assert!(ncc.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn silence_after_a_loud_burst_stays_zero() {
        let pattern = lcg_noise(50, 9);
        let mut search = vec![0.0f32; 1000];
        search[100..150].copy_from_slice(&pattern);
        let (ncc, _) = correlator().ncc(&search, &pattern, None).unwrap();
        assert!(ncc[200..].iter().all(|&v| v == 0.0));
        assert!(ncc.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn near_silent_tail_after_a_burst_stays_zero() {
        let pattern = lcg_noise(50, 9);
        let mut search = vec![0.0f32; 1000];
        search[100..150].copy_from_slice(&pattern);
        // about -180 dBFS, far under the FFT round-off left by the burst
        for (i, v) in lcg_noise(700, 13).iter().enumerate() {
            search[300 + i] = v * 1e-9;
        }
        let (ncc, _) = correlator().ncc(&search, &pattern, None).unwrap();

        // the denominator alone would not reject these windows
        let w = &search[400..450];
        let mean = w.iter().map(|&v| v as f64).sum::<f64>() / 50.0;
        let var = w.iter().map(|&v| ((v as f64) - mean).powi(2)).sum::<f64>() / 50.0;
        let p_mean = pattern.iter().map(|&v| v as f64).sum::<f64>() / 50.0;
        let p_energy = pattern
            .iter()
            .map(|&v| ((v as f64) - p_mean).powi(2))
            .sum::<f64>()
            .sqrt();
        assert!((var * 50.0).sqrt() * p_energy > NCC_EPSILON);
        assert!(var <= SILENT_VARIANCE);

        assert!(ncc[300..].iter().all(|&v| v == 0.0));
        assert!((ncc[100] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn equal_lengths_give_single_value() {
        let x = lcg_noise(77, 4);
        let (ncc, t) = correlator().ncc(&x, &x, None).unwrap();
        assert_eq!(ncc.len(), 1);
        assert_eq!(t.nfft, 256);
        assert!((ncc[0] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn uses_exactly_two_fft_calls() {
        let mut c = correlator();
        c.ncc(&lcg_noise(100, 1), &lcg_noise(10, 2), None).unwrap();
        assert_eq!(c.fft_calls(), 2);
    }

    #[test]
    fn pattern_longer_than_search_is_rejected_before_any_fft() {
        let mut c = correlator();
        let err = c.ncc(&[0.0; 10], &[0.0; 11], None).unwrap_err();
        assert_eq!(err, MatchError::PatternTooLong { pattern: 11, search: 10 });
        assert_eq!(c.fft_calls(), 0);
        assert_eq!(c.workspace_capacity(), 0);
    }

    #[test]
    fn workspace_is_reused_across_runs() {
        let mut c = correlator();
        c.ncc(&lcg_noise(3000, 1), &lcg_noise(100, 2), None).unwrap();
        let cap = c.workspace_capacity();
        c.ncc(&lcg_noise(200, 3), &lcg_noise(20, 4), None).unwrap();
        assert_eq!(c.workspace_capacity(), cap);
        assert_eq!(c.workspace_reallocations(), 1);
    }

    #[test]
    fn memory_limit_is_a_resource_error() {
        let mut c = Correlator::new(Box::new(RustFftBackend::new()), 4096);
        let err = c.ncc(&lcg_noise(4000, 1), &lcg_noise(100, 2), None).unwrap_err();
        assert!(matches!(err, MatchError::Resource(_)));
    }
}
