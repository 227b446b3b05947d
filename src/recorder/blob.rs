//! Recorded audio blobs
//!
//! The recorder emits raw 16-bit big-endian PCM (`audio/L16`, RFC 2586).
//! L16 has no header, so chunks can be concatenated into a complete blob and
//! the duration follows from the byte count. [`AudioBlob::to_wav`] wraps the
//! samples in a WAV container for export.

use std::io::Cursor;

use crate::error::{AudioError, Result};

pub const L16_MIME: &str = "audio/L16";

/// Bytes per L16 sample
pub const L16_SAMPLE_BYTES: usize = 2;

/// Immutable binary audio with its MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Parameters carried by an `audio/L16` MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L16Format {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBlob {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    /// Mono L16 blob at `sample_rate`
    pub fn l16(sample_rate: u32, bytes: Vec<u8>) -> Self {
        Self::new(
            format!("{}; rate={}; channels=1", L16_MIME, sample_rate),
            bytes,
        )
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Sample rate and channel count, if this is an L16 blob
    pub fn l16_format(&self) -> Option<L16Format> {
        parse_l16(&self.mime)
    }

    /// Re-encode as a 16-bit PCM WAV file
    ///
    /// WAV blobs are returned as they are; other containers are not
    /// transcoded.
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        if is_wav_mime(&self.mime) {
            return Ok(self.bytes.clone());
        }
        let format = self.l16_format().ok_or_else(|| {
            AudioError::DecodeError(format!("cannot convert {} to WAV", self.mime))
        })?;

        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::with_capacity(self.bytes.len() + 44));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
            for sample in decode_l16(&self.bytes) {
                writer.write_sample(sample).map_err(wav_error)?;
            }
            writer.finalize().map_err(wav_error)?;
        }
        Ok(cursor.into_inner())
    }
}

fn wav_error(e: hound::Error) -> AudioError {
    match e {
        hound::Error::IoError(io) => AudioError::Io(io),
        other => AudioError::Io(std::io::Error::other(other)),
    }
}

fn is_wav_mime(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or("").trim();
    ["audio/wav", "audio/wave", "audio/x-wav", "audio/vnd.wave"]
        .iter()
        .any(|m| essence.eq_ignore_ascii_case(m))
}

/// Parse `audio/L16; rate=<sr>; channels=<n>`
///
/// `channels` defaults to 1 when absent; `rate` is required.
pub fn parse_l16(mime: &str) -> Option<L16Format> {
    let mut parts = mime.split(';').map(str::trim);
    if !parts.next()?.eq_ignore_ascii_case(L16_MIME) {
        return None;
    }

    let mut sample_rate = None;
    let mut channels = 1u16;
    for param in parts {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "rate" => sample_rate = value.trim().parse().ok(),
            "channels" => channels = value.trim().parse().ok()?,
            _ => {}
        }
    }

    match sample_rate {
        Some(rate) if rate > 0 && channels > 0 => Some(L16Format {
            sample_rate: rate,
            channels,
        }),
        _ => None,
    }
}

/// Encode float samples as big-endian 16-bit PCM
pub fn encode_l16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * L16_SAMPLE_BYTES);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        bytes.extend_from_slice(&value.to_be_bytes());
    }
    bytes
}

/// Decode big-endian 16-bit PCM; a trailing odd byte is ignored
pub fn decode_l16(bytes: &[u8]) -> impl Iterator<Item = i16> + '_ {
    bytes
        .chunks_exact(L16_SAMPLE_BYTES)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l16_mime() {
        let blob = AudioBlob::l16(44_100, Vec::new());
        assert_eq!(blob.mime, "audio/L16; rate=44100; channels=1");
        assert_eq!(
            blob.l16_format(),
            Some(L16Format {
                sample_rate: 44_100,
                channels: 1
            })
        );

        assert_eq!(
            parse_l16("audio/l16;rate=8000;channels=2"),
            Some(L16Format {
                sample_rate: 8000,
                channels: 2
            })
        );
        assert_eq!(parse_l16("audio/L16"), None);
        assert_eq!(parse_l16("audio/webm; rate=48000"), None);
    }

    #[test]
    fn test_encode_clamps_and_is_big_endian() {
        let bytes = encode_l16(&[0.0, 1.0, -2.0]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(&bytes[0..2], &[0x00, 0x00]);
        assert_eq!(&bytes[2..4], &[0x7f, 0xff]);

        let decoded: Vec<i16> = decode_l16(&bytes).collect();
        assert_eq!(decoded, vec![0, i16::MAX, -i16::MAX]);
    }

    #[test]
    fn test_to_wav() {
        let blob = AudioBlob::l16(8000, encode_l16(&[0.5; 800]));
        let wav = blob.to_wav().unwrap();

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.duration(), 800);
    }

    #[test]
    fn test_to_wav_rejects_unknown_containers() {
        let blob = AudioBlob::new("audio/webm", vec![1, 2, 3]);
        assert!(matches!(blob.to_wav(), Err(AudioError::DecodeError(_))));

        let wav = AudioBlob::new("audio/wav", vec![1, 2, 3]);
        assert_eq!(wav.to_wav().unwrap(), vec![1, 2, 3]);
    }
}
