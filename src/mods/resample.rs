//! src/mods/resample.rs
//! Decimation to the matching rate: single-pole anti-alias low-pass, then linear interpolation.

/// Cutoff of the anti-alias filter as a fraction of the output rate.
pub const LOWPASS_CUTOFF_FRAC: f32 = 0.45;

/// One-pole IIR low-pass, `y += α·(x − y)` with `α = dt / (RC + dt)`.
pub fn lowpass_single_pole(x: &[f32], sr_in: u32, cutoff_hz: f32) -> Vec<f32> {
    if x.is_empty() || sr_in == 0 || cutoff_hz <= 0.0 {
        return x.to_vec();
    }
    let dt = 1.0 / (sr_in as f64);
    let rc = 1.0 / (2.0 * std::f64::consts::PI * (cutoff_hz as f64));
    let alpha = (dt / (rc + dt)) as f32;

    let mut out = Vec::with_capacity(x.len());
    let mut y = x[0];
    out.push(y);
    for &v in &x[1..] {
        y += alpha * (v - y);
        out.push(y);
    }
    out
}

/// Linear resampler (mono). Downsampling is low-passed first; upsampling and equal rates are not.
///
/// Output length is `floor(len × sr_out / sr_in)`, at least 1 for non-empty input. Reads past the
/// end of the source clamp to its last sample.
pub fn resample_linear_mono(x: &[f32], sr_in: u32, sr_out: u32) -> Vec<f32> {
    if x.is_empty() || sr_in == 0 || sr_out == 0 || sr_in == sr_out {
        return x.to_vec();
    }
    let ratio = (sr_out as f64) / (sr_in as f64);
    let n_out = ((x.len() as f64) * ratio).floor().max(1.0) as usize;

    let filtered;
    let src: &[f32] = if sr_out < sr_in {
        filtered = lowpass_single_pole(x, sr_in, LOWPASS_CUTOFF_FRAC * (sr_out as f32));
        &filtered
    } else {
        x
    };
    let last = src[src.len() - 1];

    let mut y = Vec::with_capacity(n_out);
    for i in 0..n_out {
        let pos = (i as f64) / ratio; // position in input
        let i0 = pos.floor() as usize;
        let t = (pos - (i0 as f64)) as f32; // frac
        let a = src.get(i0).copied().unwrap_or(last);
        let b = src.get(i0 + 1).copied().unwrap_or(a);
        y.push(a + (b - a) * t); // lerp
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_rates_are_identity() {
        let x = vec![0.1, -0.7, 0.3, 0.9];
        assert_eq!(resample_linear_mono(&x, 44100, 44100), x);
    }

    #[test]
    fn output_length_is_floored_ratio() {
        let x = vec![0.0f32; 44101];
        assert_eq!(resample_linear_mono(&x, 44100, 2000).len(), 2000);
        assert_eq!(resample_linear_mono(&[0.5; 3], 48000, 2000).len(), 1);
        assert_eq!(resample_linear_mono(&[0.5; 10], 1000, 3000).len(), 30);
    }

    #[test]
    fn upsampling_interpolates_without_filtering() {
        let y = resample_linear_mono(&[0.0, 1.0, 0.0], 1000, 2000);
        assert_eq!(y.len(), 6);
        assert!((y[0] - 0.0).abs() < 1e-6);
        assert!((y[1] - 0.5).abs() < 1e-6);
        assert!((y[2] - 1.0).abs() < 1e-6);
        assert!((y[3] - 0.5).abs() < 1e-6);
        // past the last sample reads clamp to it
        assert!((y[5] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn downsampling_passes_dc() {
        let x = vec![0.8f32; 4800];
        let y = resample_linear_mono(&x, 48000, 2000);
        assert_eq!(y.len(), 200);
        assert!(y.iter().all(|v| (v - 0.8).abs() < 1e-5));
    }

    #[test]
    fn lowpass_attenuates_above_cutoff() {
        let sr = 48000;
        let tone: Vec<f32> = (0..sr)
            .map(|i| (2.0 * std::f32::consts::PI * 15000.0 * (i as f32) / (sr as f32)).sin())
            .collect();
        let y = lowpass_single_pole(&tone, sr as u32, 900.0);
        let peak = y[sr / 2..].iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(peak < 0.15, "peak after filter {}", peak);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(resample_linear_mono(&[], 48000, 2000).is_empty());
    }
}
