//! src/mods/decode.rs
//! Fallback decoder for anything the WAV fast path does not take (MP3/MP4/AAC/FLAC/Vorbis,
//! 8-bit or ADPCM WAV), using symphonia.

use std::io::Cursor;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::DecoderOptions,
    errors::Error,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use symphonia::default::{ get_codecs, get_probe };

use crate::error::{ MatchError, Result };
use crate::mods::resample::resample_linear_mono;

/// Decoded first channel, resampled to the requested rate.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub native_sr: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

/// Turns raw container bytes into mono samples at `target_sr`.
pub trait AudioDecoder {
    fn decode(&self, bytes: &[u8], hint_ext: Option<&str>, target_sr: u32) -> Result<DecodedAudio>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: &[u8], hint_ext: Option<&str>, target_sr: u32) -> Result<DecodedAudio> {
        let (native_sr, channels, mono) = load_first_channel(bytes, hint_ext)?;
        Ok(DecodedAudio {
            native_sr,
            channels,
            samples: resample_linear_mono(&mono, native_sr, target_sr),
        })
    }
}

fn decode_err(err: Error) -> MatchError {
    MatchError::Decode(err.to_string())
}

/// First channel at the native rate: `(sr, channels, samples)`.
pub fn load_first_channel(bytes: &[u8], hint_ext: Option<&str>) -> Result<(u32, u16, Vec<f32>)> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = hint_ext {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(decode_err)?;
    let mut format = probed.format;

    let (track_id, codec_params) = {
        let track = format
            .default_track()
            .ok_or_else(|| MatchError::Decode("no default audio track found".to_string()))?;
        (track.id, track.codec_params.clone())
    };

    let mut decoder = get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(decode_err)?;

    let sr = codec_params.sample_rate.ok_or_else(||
        MatchError::Decode("unknown sample rate".to_string())
    )?;
    let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(1u16);

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut mono = Vec::<f32>::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(err) => {
                return Err(decode_err(err));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // a corrupt packet is skipped, not fatal
            Err(Error::DecodeError(_)) => {
                continue;
            }
            Err(err) => {
                return Err(decode_err(err));
            }
        };

        let spec = *decoded.spec();
        let chan_count = spec.channels.count().max(1);

        let too_small = sample_buf
            .as_ref()
            .map(|b| b.capacity() < decoded.capacity())
            .unwrap_or(true);
        if too_small {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            mono.extend(buf.samples().iter().step_by(chan_count));
        }
    }

    if mono.is_empty() {
        return Err(MatchError::Decode("stream decoded to zero samples".to_string()));
    }
    Ok((sr, channels, mono))
}
