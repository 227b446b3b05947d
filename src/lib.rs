//! songsketch-audio - real-time audio core for a songwriting notebook
//!
//! - [`metronome`]: lookahead-scheduled click track with tap tempo
//! - [`pitch`]: microphone tuner built on an FFT peak picker
//! - [`recorder`]: chunked microphone recording into L16 blobs
//! - [`probe`]: duration of recorded or imported blobs
//! - [`clip`]: clip metadata handed to persistence
//!
//! Every component reaches the hardware through [`audio::AudioBackend`];
//! [`audio::CpalBackend`] is the default.

pub mod audio;
pub mod clip;
pub mod error;
pub mod metronome;
pub mod pitch;
pub mod probe;
pub mod recorder;
pub mod settings;

pub use audio::{AudioBackend, CpalBackend};
pub use clip::{fmt_ms, Clip, ClipId};
pub use error::{AudioError, Result};
pub use metronome::{Metronome, TapTempo};
pub use pitch::{Note, PitchDetector, PitchReading, TuningStatus};
pub use probe::{duration_ms, probe_duration};
pub use recorder::{AudioBlob, AudioRecorder, RecorderState};
pub use settings::AudioSettings;
