//! src/mods/matcher.rs
//! Runs a full match: decode both inputs, normalize, correlate, pick peaks, convert to seconds.

use std::sync::Arc;
use std::time::{ Duration, Instant };

use crate::error::{ MatchError, Result };
use crate::logger::Logger;
use crate::mods::correlate::{ CorrelationTimings, Correlator };
use crate::mods::decode::{ AudioDecoder, SymphoniaDecoder };
use crate::mods::fft::{ FftBackend, RustFftBackend };
use crate::mods::peaks::find_peaks;
use crate::mods::resample::resample_linear_mono;
use crate::mods::wav::{ parse_wav_mono, WavParse };

/// Peaks at or below this absolute amplitude leave a signal untouched by normalization.
pub const NORMALIZE_FLOOR: f32 = 1e-10;

#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Rate both inputs are brought to before correlating.
    pub target_sample_rate: u32,
    /// Minimum NCC for a match.
    pub threshold: f32,
    /// Minimum spacing between matches in samples; `None` uses a quarter of the pattern length.
    pub min_distance: Option<usize>,
    /// Cap on the linear memory backing the FFT workspace.
    pub max_memory_bytes: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 2000,
            threshold: 0.7,
            min_distance: None,
            max_memory_bytes: 256 << 20,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target_sample_rate == 0 {
            return Err(MatchError::Input("target sample rate must be positive".to_string()));
        }
        if !self.threshold.is_finite() {
            return Err(MatchError::Input("threshold must be a finite number".to_string()));
        }
        Ok(())
    }
}

/// One located occurrence of the pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub position: usize,
    pub start_s: f64,
    pub end_s: f64,
    pub similarity: f32,
    /// RMS of the normalized search signal under the match.
    pub rms: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMethod {
    WavFast,
    Decoder,
}

impl LoadMethod {
    pub fn as_str(&self) -> &str {
        match self {
            LoadMethod::WavFast => "wav-fast",
            LoadMethod::Decoder => "decoder",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadMetrics {
    pub method: LoadMethod,
    pub native_sr: u32,
    pub length_samples: usize,
    pub duration_s: f64,
    pub parse: Duration,
    pub decode: Duration,
    pub resample: Duration,
    pub normalize: Duration,
}

#[derive(Debug, Clone)]
pub struct RunMetrics {
    pub pattern: LoadMetrics,
    pub search: LoadMetrics,
    pub correlation: CorrelationTimings,
    pub workspace_capacity: usize,
    pub heap_bytes: usize,
    pub heap_grows: u64,
    pub min_distance: usize,
    pub peaks: Duration,
    pub total: Duration,
}

#[derive(Debug, Clone)]
pub struct MatchReport {
    pub matches: Vec<Match>,
    pub metrics: RunMetrics,
}

/// A normalized mono signal at the target rate.
#[derive(Debug, Clone)]
pub struct Signal {
    pub samples: Vec<f32>,
    pub sr: u32,
}

impl Signal {
    pub fn duration_s(&self) -> f64 {
        if self.sr == 0 { 0.0 } else { (self.samples.len() as f64) / (self.sr as f64) }
    }
}

/// Scale to unit peak amplitude in place; near-silent input is left alone.
pub fn normalize_peak(x: &mut [f32]) {
    let max_abs = x.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    if max_abs > NORMALIZE_FLOOR {
        let s = 1.0 / max_abs;
        for v in x.iter_mut() {
            *v *= s;
        }
    }
}

fn rms(x: &[f32]) -> f32 {
    let e = x.iter().map(|&v| (v as f64) * (v as f64)).sum::<f64>() / (x.len().max(1) as f64);
    e.sqrt() as f32
}

/// Matching session. Owns the FFT workspace between runs so buffers are reused;
/// create one per thread.
pub struct Matcher {
    config: MatchConfig,
    correlator: Option<Correlator>,
    decoder: Box<dyn AudioDecoder>,
    logger: Arc<Logger>,
}

impl Matcher {
    /// Session with the rustfft primitive and the symphonia fallback decoder.
    pub fn open(config: MatchConfig, logger: Arc<Logger>) -> Result<Self> {
        Self::with_parts(config, Box::new(RustFftBackend::new()), Box::new(SymphoniaDecoder), logger)
    }

    pub fn with_parts(
        config: MatchConfig,
        fft: Box<dyn FftBackend>,
        decoder: Box<dyn AudioDecoder>,
        logger: Arc<Logger>
    ) -> Result<Self> {
        config.validate()?;
        crate::log_debug!(
            logger,
            "matcher open: target_sr={} threshold={:.2} max_memory={} bytes",
            config.target_sample_rate,
            config.threshold,
            config.max_memory_bytes
        );
        let correlator = Correlator::new(fft, config.max_memory_bytes);
        Ok(Matcher {
            config,
            correlator: Some(correlator),
            decoder,
            logger,
        })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Release the FFT workspace. Later runs fail with a resource error.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut c) = self.correlator.take() {
            c.release()?;
            crate::log_debug!(self.logger, "matcher closed after {} FFT calls", c.fft_calls());
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.correlator.is_some()
    }

    pub fn correlator(&self) -> Option<&Correlator> {
        self.correlator.as_ref()
    }

    /// Decode `bytes` to a mono signal at the target rate. `label` only appears in logs.
    pub fn load(&self, bytes: &[u8], hint_ext: Option<&str>, label: &str) -> Result<(Signal, LoadMetrics)> {
        let target_sr = self.config.target_sample_rate;
        if bytes.is_empty() {
            return Err(MatchError::Input(format!("{} input is empty", label)));
        }

        let t0 = Instant::now();
        let parsed = parse_wav_mono(bytes);
        let parse = t0.elapsed();

        let fallback = |reason: Option<&str>| -> Result<_> {
            if let Some(reason) = reason {
                crate::log_info!(self.logger, "{}: WAV fast path skipped ({}); using decoder", label, reason);
            }
            let t0 = Instant::now();
            let dec = self.decoder.decode(bytes, hint_ext, target_sr)?;
            Ok((dec.samples, LoadMethod::Decoder, dec.native_sr, t0.elapsed(), Duration::ZERO))
        };

        let (samples, method, native_sr, decode, resample) = match parsed {
            WavParse::Wav(wav) => {
                let t0 = Instant::now();
                let out = resample_linear_mono(&wav.samples_mono, wav.sr, target_sr);
                (out, LoadMethod::WavFast, wav.sr, Duration::ZERO, t0.elapsed())
            }
            WavParse::Malformed(reason) => {
                crate::log_error!(self.logger, "{}: malformed WAV: {}", label, reason);
                return Err(MatchError::MalformedWav(reason));
            }
            WavParse::Unsupported(reason) => fallback(Some(&reason))?,
            WavParse::NotWav => fallback(None)?,
        };

        if samples.is_empty() {
            return Err(MatchError::Input(format!("{} decoded to zero samples", label)));
        }

        let mut signal = Signal { samples, sr: target_sr };
        let t0 = Instant::now();
        normalize_peak(&mut signal.samples);
        let normalize = t0.elapsed();

        let metrics = LoadMetrics {
            method,
            native_sr,
            length_samples: signal.samples.len(),
            duration_s: signal.duration_s(),
            parse,
            decode,
            resample,
            normalize,
        };
        crate::log_info!(
            self.logger,
            "{}: {} {} Hz -> {} Hz, {} samples ({:.2}s)",
            label,
            method.as_str(),
            native_sr,
            target_sr,
            metrics.length_samples,
            metrics.duration_s
        );
        Ok((signal, metrics))
    }

    /// Locate `pattern` in `search` given as raw file bytes.
    pub fn find_matches(&mut self, pattern_bytes: &[u8], search_bytes: &[u8]) -> Result<MatchReport> {
        self.find_matches_with_hints(pattern_bytes, None, search_bytes, None)
    }

    pub fn find_matches_with_hints(
        &mut self,
        pattern_bytes: &[u8],
        pattern_ext: Option<&str>,
        search_bytes: &[u8],
        search_ext: Option<&str>
    ) -> Result<MatchReport> {
        let t_start = Instant::now();
        let (pattern, pattern_metrics) = self.load(pattern_bytes, pattern_ext, "pattern")?;
        let (search, search_metrics) = self.load(search_bytes, search_ext, "search")?;

        let (matches, correlation, min_distance, peaks) = self.match_signals(&pattern, &search)?;
        let correlator = self.correlator.as_ref();

        let metrics = RunMetrics {
            pattern: pattern_metrics,
            search: search_metrics,
            correlation,
            workspace_capacity: correlator.map(|c| c.workspace_capacity()).unwrap_or(0),
            heap_bytes: correlator.map(|c| c.heap_bytes()).unwrap_or(0),
            heap_grows: correlator.map(|c| c.heap_grows()).unwrap_or(0),
            min_distance,
            peaks,
            total: t_start.elapsed(),
        };
        crate::log_debug!(
            self.logger,
            "run metrics: nfft={} heap={} bytes ({} grows) prepare={:?} fft={:?} multiply={:?} ifft={:?} sliding={:?} peaks={:?} total={:?}",
            metrics.correlation.nfft,
            metrics.heap_bytes,
            metrics.heap_grows,
            metrics.correlation.prepare,
            metrics.correlation.forward_fft,
            metrics.correlation.unpack_multiply,
            metrics.correlation.inverse_fft,
            metrics.correlation.sliding_stats,
            metrics.peaks,
            metrics.total
        );
        Ok(MatchReport { matches, metrics })
    }

    /// Correlate two already-normalized signals at the target rate.
    pub fn match_signals(
        &mut self,
        pattern: &Signal,
        search: &Signal
    ) -> Result<(Vec<Match>, CorrelationTimings, usize, Duration)> {
        let m = pattern.samples.len();
        let n = search.samples.len();
        if m == 0 || n == 0 {
            return Err(MatchError::Input("cannot match an empty signal".to_string()));
        }
        if m > n {
            crate::log_error!(self.logger, "pattern ({} samples) is longer than search ({} samples)", m, n);
            return Err(MatchError::PatternTooLong { pattern: m, search: n });
        }
        let sr = self.config.target_sample_rate as f64;
        let threshold = self.config.threshold;
        let min_distance = self.config.min_distance.unwrap_or(((m as f64) * 0.25).floor() as usize);

        let correlator = self.correlator
            .as_mut()
            .ok_or_else(|| MatchError::Resource("matcher is closed".to_string()))?;
        let (ncc, timings) = correlator.ncc(&search.samples, &pattern.samples, Some(self.logger.as_ref()))?;

        let t0 = Instant::now();
        let peaks = find_peaks(&ncc, threshold, min_distance);
        let peaks_time = t0.elapsed();

        let matches: Vec<Match> = peaks
            .iter()
            .map(|p| Match {
                position: p.position,
                start_s: (p.position as f64) / sr,
                end_s: ((p.position + m) as f64) / sr,
                similarity: p.value,
                rms: rms(&search.samples[p.position..p.position + m]),
            })
            .collect();

        crate::log_info!(
            self.logger,
            "{} match(es) above {:.2} (min distance {} samples, nfft {})",
            matches.len(),
            threshold,
            min_distance,
            timings.nfft
        );
        Ok((matches, timings, min_distance, peaks_time))
    }
}

impl Drop for Matcher {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// One-shot convenience: open a session, match, close.
pub fn find_matches(
    pattern_bytes: &[u8],
    search_bytes: &[u8],
    target_sample_rate: u32,
    threshold: f32,
    min_distance: Option<usize>
) -> Result<Vec<Match>> {
    let config = MatchConfig {
        target_sample_rate,
        threshold,
        min_distance,
        ..MatchConfig::default()
    };
    let mut matcher = Matcher::open(config, Arc::new(Logger::disabled()))?;
    let report = matcher.find_matches(pattern_bytes, search_bytes)?;
    matcher.close()?;
    Ok(report.matches)
}
