//! Blob duration probing
//!
//! L16 blobs are measured from their byte count. Anything else goes through
//! symphonia: the track's declared frame count when present, otherwise the
//! summed packet durations of a full read.

use std::io::Cursor;
use std::thread;

use crossbeam_channel::{bounded, Receiver};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use crate::error::{AudioError, Result};
use crate::recorder::{AudioBlob, L16_SAMPLE_BYTES};

/// Playback duration of a blob in milliseconds
pub fn duration_ms(blob: &AudioBlob) -> Result<u64> {
    if let Some(format) = blob.l16_format() {
        let frame_bytes = L16_SAMPLE_BYTES as u64 * format.channels as u64;
        let frames = blob.len() as u64 / frame_bytes;
        let rate = format.sample_rate as u64;
        return Ok((frames * 1000 + rate / 2) / rate);
    }
    decode_duration_ms(blob)
}

/// Run [`duration_ms`] on a background thread
///
/// The receiver yields exactly one result.
pub fn probe_duration(blob: AudioBlob) -> Receiver<Result<u64>> {
    let (tx, rx) = bounded(1);
    let fallback = tx.clone();
    let spawned = thread::Builder::new()
        .name("duration-probe".into())
        .spawn(move || {
            let _ = tx.send(duration_ms(&blob));
        });
    if let Err(e) = spawned {
        let _ = fallback.send(Err(e.into()));
    }
    rx
}

fn decode_duration_ms(blob: &AudioBlob) -> Result<u64> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(blob.bytes.clone())), Default::default());

    let mut hint = Hint::new();
    let essence = blob.mime.split(';').next().unwrap_or("").trim();
    if !essence.is_empty() {
        hint.mime_type(essence);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::DecodeError(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::DecodeError("no audio track".into()))?;
    let track_id = track.id;
    let params = &track.codec_params;
    let time_base = params
        .time_base
        .or_else(|| params.sample_rate.map(|sr| TimeBase::new(1, sr)))
        .ok_or_else(|| AudioError::DecodeError("unknown time base".into()))?;

    if let Some(n_frames) = params.n_frames {
        return Ok(time_to_ms(time_base.calc_time(n_frames)));
    }

    // No declared length, so read every packet
    let mut total = 0u64;
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => total += packet.dur,
            Ok(_) => {}
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioError::DecodeError(e.to_string())),
        }
    }
    Ok(time_to_ms(time_base.calc_time(total)))
}

fn time_to_ms(time: Time) -> u64 {
    time.seconds * 1000 + (time.frac * 1000.0).round() as u64
}
