//! src/mods/wav.rs
//! Fast path for RIFF/WAVE input: PCM 16/24/32-bit and IEEE float 32-bit, first channel only.

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xfffe;

/// Mono samples at the file's native rate.
#[derive(Debug, Clone, PartialEq)]
pub struct WavAudio {
    pub sr: u32,
    pub channels: u16,
    pub samples_mono: Vec<f32>,
}

/// Outcome of sniffing and parsing a byte buffer.
///
/// `NotWav` and `Unsupported` send the caller to the fallback decoder;
/// `Malformed` means the bytes claim to be a WAV but are broken, and the run fails.
#[derive(Debug, Clone, PartialEq)]
pub enum WavParse {
    Wav(WavAudio),
    NotWav,
    Unsupported(String),
    Malformed(String),
}

#[derive(Debug, Clone, Copy)]
struct FmtChunk {
    format: u16,
    channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

#[derive(Debug, Clone, Copy)]
enum SampleKind {
    Pcm16,
    Pcm24,
    Pcm32,
    Float32,
}

impl SampleKind {
    fn width(self) -> usize {
        match self {
            SampleKind::Pcm16 => 2,
            SampleKind::Pcm24 => 3,
            SampleKind::Pcm32 | SampleKind::Float32 => 4,
        }
    }

    #[inline]
    fn read(self, b: &[u8]) -> f32 {
        match self {
            SampleKind::Pcm16 => (i16::from_le_bytes([b[0], b[1]]) as f32) / 32768.0,
            SampleKind::Pcm24 => {
                // place the 3 bytes in the top of an i32, then arithmetic shift sign-extends
                let v = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
                (v as f32) / 8388608.0
            }
            SampleKind::Pcm32 => ((i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64) / 2147483648.0) as f32,
            SampleKind::Float32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        }
    }
}

#[inline]
fn u16_at(bytes: &[u8], pos: usize) -> Option<u16> {
    bytes.get(pos..pos + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

#[inline]
fn u32_at(bytes: &[u8], pos: usize) -> Option<u32> {
    bytes.get(pos..pos + 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn looks_like_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

fn parse_fmt(body: &[u8]) -> Result<FmtChunk, String> {
    if body.len() < 16 {
        return Err(format!("fmt chunk too small ({} bytes)", body.len()));
    }
    let mut fmt = FmtChunk {
        format: u16_at(body, 0).unwrap_or(0),
        channels: u16_at(body, 2).unwrap_or(0),
        sample_rate: u32_at(body, 4).unwrap_or(0),
        block_align: u16_at(body, 12).unwrap_or(0),
        bits_per_sample: u16_at(body, 14).unwrap_or(0),
    };
    if fmt.format == FORMAT_EXTENSIBLE {
        // cbSize(2) validBits(2) channelMask(4) then the sub-format GUID, whose first two bytes are the tag
        match u16_at(body, 24) {
            Some(tag) => {
                fmt.format = tag;
            }
            None => {
                return Err("extensible fmt chunk is missing its sub-format".to_string());
            }
        }
    }
    Ok(fmt)
}

/// Parse a RIFF/WAVE buffer down to its first channel.
pub fn parse_wav_mono(bytes: &[u8]) -> WavParse {
    if !looks_like_wav(bytes) {
        return WavParse::NotWav;
    }

    let mut pos = 12usize;
    let mut fmt: Option<FmtChunk> = None;
    let mut data: Option<&[u8]> = None;

    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = u32_at(bytes, pos + 4).unwrap_or(0) as usize;
        let body_start = pos + 8;
        // streaming writers leave the size oversized; take what is actually there
        let body_end = body_start.saturating_add(size).min(bytes.len());
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " => {
                match parse_fmt(body) {
                    Ok(f) => {
                        fmt = Some(f);
                    }
                    Err(msg) => {
                        return WavParse::Malformed(msg);
                    }
                }
            }
            b"data" => {
                data = Some(body);
            }
            _ => {}
        }

        // chunks are word aligned
        pos = body_start.saturating_add(size).saturating_add(size & 1);
    }

    let fmt = match fmt {
        Some(f) => f,
        None => {
            return WavParse::Malformed("missing fmt chunk".to_string());
        }
    };
    let data = match data {
        Some(d) => d,
        None => {
            return WavParse::Malformed("missing data chunk".to_string());
        }
    };
    if fmt.channels == 0 {
        return WavParse::Malformed("zero channels".to_string());
    }
    if fmt.sample_rate == 0 {
        return WavParse::Malformed("zero sample rate".to_string());
    }

    let kind = match (fmt.format, fmt.bits_per_sample) {
        (FORMAT_PCM, 16) => SampleKind::Pcm16,
        (FORMAT_PCM, 24) => SampleKind::Pcm24,
        (FORMAT_PCM, 32) => SampleKind::Pcm32,
        (FORMAT_IEEE_FLOAT, 32) => SampleKind::Float32,
        (format, bits) => {
            return WavParse::Unsupported(
                format!("format tag {} with {} bits per sample", format, bits)
            );
        }
    };

    let frame_stride = fmt.block_align as usize;
    if frame_stride < kind.width() {
        return WavParse::Malformed(
            format!(
                "block align {} is smaller than one {}-byte sample",
                frame_stride,
                kind.width()
            )
        );
    }

    // a trailing partial frame is dropped
    let samples_mono: Vec<f32> = data
        .chunks_exact(frame_stride)
        .map(|frame| kind.read(&frame[..kind.width()]))
        .collect();

    WavParse::Wav(WavAudio {
        sr: fmt.sample_rate,
        channels: fmt.channels,
        samples_mono,
    })
}

/// Little-endian 16-bit PCM writer, used to build fixtures and by callers that want to
/// dump a decimated signal for inspection.
pub fn encode_pcm16(samples: &[f32], sr: u32, channels: u16) -> Vec<u8> {
    let channels = channels.max(1);
    let block_align = 2 * (channels as u32);
    let data_len = (samples.len() as u32) * block_align;

    let mut out = Vec::with_capacity(44 + (data_len as usize));
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sr.to_le_bytes());
    out.extend_from_slice(&(sr * block_align).to_le_bytes());
    out.extend_from_slice(&(block_align as u16).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        for _ in 0..channels {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}
