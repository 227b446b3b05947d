//! Clip metadata handed to persistence

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::probe;
use crate::recorder::AudioBlob;

/// Opaque clip identifier
///
/// `<unix millis>-<sequence>-<pid>-<random>`, all hex. IDs from one process
/// sort by creation order; the pid and random parts keep IDs from separate
/// runs apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(String);

static CLIP_COUNTER: AtomicU32 = AtomicU32::new(0);

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// 64 bits from the std hasher's per-process random keys
fn random_u64(sequence: u32) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(nanos);
    hasher.write_u32(sequence);
    hasher.finish()
}

impl ClipId {
    pub fn generate() -> Self {
        let sequence = CLIP_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "{:012x}-{:08x}-{:08x}-{:016x}",
            unix_millis(),
            sequence,
            std::process::id(),
            random_u64(sequence)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A finished recording, as stored alongside its blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub filename: String,
    /// Zero when the duration could not be determined
    pub duration_ms: u64,
    /// Key of the blob in the persistence layer
    pub blob_key: String,
}

impl Clip {
    /// Build a clip for `blob`, probing its duration
    ///
    /// A blob that cannot be decoded still yields a clip, with zero duration,
    /// so the recording is kept.
    pub fn from_blob(
        filename: impl Into<String>,
        blob_key: impl Into<String>,
        blob: &AudioBlob,
    ) -> Self {
        let filename = filename.into();
        let duration_ms = match probe::duration_ms(blob) {
            Ok(ms) => ms,
            Err(e) => {
                log::warn!("Could not read duration of {}: {}", filename, e);
                0
            }
        };

        Self {
            id: ClipId::generate(),
            filename,
            duration_ms,
            blob_key: blob_key.into(),
        }
    }

    /// `recording-<unix millis>.wav`
    pub fn default_filename() -> String {
        format!("recording-{}.wav", unix_millis())
    }
}

/// Format a duration as `m:ss`
pub fn fmt_ms(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::encode_l16;

    #[test]
    fn test_fmt_ms() {
        assert_eq!(fmt_ms(0), "0:00");
        assert_eq!(fmt_ms(2_000), "0:02");
        assert_eq!(fmt_ms(59_999), "0:59");
        assert_eq!(fmt_ms(61_000), "1:01");
        assert_eq!(fmt_ms(3_600_000), "60:00");
    }

    #[test]
    fn test_clip_from_recording() {
        let blob = AudioBlob::l16(8_000, encode_l16(&vec![0.1; 16_000]));
        let clip = Clip::from_blob("take-1.wav", "blob-1", &blob);

        assert_eq!(clip.duration_ms, 2000);
        assert_eq!(clip.filename, "take-1.wav");
        assert_eq!(clip.blob_key, "blob-1");
    }

    #[test]
    fn test_undecodable_blob_keeps_clip() {
        let blob = AudioBlob::new("audio/ogg", vec![1, 2, 3, 4]);
        let clip = Clip::from_blob("broken.ogg", "blob-2", &blob);
        assert_eq!(clip.duration_ms, 0);
    }

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let a = ClipId::generate();
        let b = ClipId::generate();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_ids_carry_process_and_random_parts() {
        let id = ClipId::generate();
        let parts: Vec<&str> = id.as_str().split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[2], format!("{:08x}", std::process::id()));
        assert_eq!(parts[3].len(), 16);

        // Two runs starting in the same millisecond with the same counter
        // still differ in the random part
        assert_ne!(random_u64(0), random_u64(0));
    }

    #[test]
    fn test_clip_json() {
        let blob = AudioBlob::l16(8_000, Vec::new());
        let clip = Clip::from_blob("empty.wav", "blob-3", &blob);

        let json = serde_json::to_value(&clip).unwrap();
        assert_eq!(json["id"], clip.id.as_str());
        assert_eq!(json["duration_ms"], 0);

        let back: Clip = serde_json::from_value(json).unwrap();
        assert_eq!(back, clip);
    }
}
