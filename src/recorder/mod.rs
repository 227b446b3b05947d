//! Microphone recorder
//!
//! Captured samples cross from the input callback to a slicer thread through
//! the lock-free sample buffer. Every timeslice the slicer encodes what has
//! arrived as an L16 chunk and reports it. On stop the final partial slice is
//! flushed and the chunks are joined into one [`AudioBlob`].

mod blob;

pub use blob::{decode_l16, encode_l16, parse_l16, AudioBlob, L16Format, L16_MIME, L16_SAMPLE_BYTES};

use crossbeam_channel::{bounded, RecvTimeoutError, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::{sample_buffer, AudioBackend, SampleConsumer, StreamHandle};
use crate::error::Result;
use crate::settings::RecorderSettings;

/// Receives each encoded chunk, in capture order
pub type ChunkCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Receives the finished blob when a recording stops
pub type StopCallback = Box<dyn FnMut(&AudioBlob) + Send + 'static>;

/// Highest capture rate the sample buffer is sized for
const MAX_SAMPLE_RATE: u32 = 192_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderState {
    #[default]
    Inactive,
    Recording,
    Paused,
}

struct Session {
    stop_tx: Sender<()>,
    worker: Option<JoinHandle<Vec<u8>>>,
    stream: StreamHandle,
    sample_rate: u32,
    paused: bool,
}

pub struct AudioRecorder {
    backend: Arc<dyn AudioBackend>,
    settings: RecorderSettings,
    on_data: Arc<Mutex<Option<ChunkCallback>>>,
    on_stop: Option<StopCallback>,
    session: Option<Session>,
}

impl AudioRecorder {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        settings: &RecorderSettings,
        on_data: Option<ChunkCallback>,
        on_stop: Option<StopCallback>,
    ) -> Self {
        Self {
            backend,
            settings: settings.clone(),
            on_data: Arc::new(Mutex::new(on_data)),
            on_stop,
            session: None,
        }
    }

    /// Open the microphone and start recording; does nothing if a recording
    /// is already in progress
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let capacity = MAX_SAMPLE_RATE as usize * self.settings.buffer_secs.max(1) as usize;
        let (mut producer, consumer) = sample_buffer(capacity);
        let stream = self.backend.open_input(Box::new(move |samples| {
            producer.push_slice(samples);
        }))?;
        let sample_rate = stream.info().sample_rate;

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let slicer = Slicer {
            consumer,
            on_data: Arc::clone(&self.on_data),
            recording: Vec::new(),
            scratch: Vec::new(),
            timeslice: Duration::from_millis(self.settings.timeslice_ms.max(1)),
        };
        let worker = thread::Builder::new()
            .name("recorder".into())
            .spawn(move || slicer.run(stop_rx))?;

        log::info!("Recording started ({} Hz)", sample_rate);
        self.session = Some(Session {
            stop_tx,
            worker: Some(worker),
            stream,
            sample_rate,
            paused: false,
        });
        Ok(())
    }

    /// Stop recording and return the finished blob
    ///
    /// The microphone is released before the final chunk is flushed. Returns
    /// `None` when nothing was being recorded.
    pub fn stop(&mut self) -> Option<AudioBlob> {
        let mut session = self.session.take()?;

        drop(session.stream);
        let _ = session.stop_tx.try_send(());
        let bytes = match session.worker.take().map(JoinHandle::join) {
            Some(Ok(bytes)) => bytes,
            Some(Err(_)) => {
                log::error!("Recorder worker panicked, recording lost");
                return None;
            }
            None => Vec::new(),
        };

        let blob = AudioBlob::l16(session.sample_rate, bytes);
        log::info!("Recording stopped ({} bytes)", blob.len());
        if let Some(callback) = self.on_stop.as_mut() {
            callback(&blob);
        }
        Some(blob)
    }

    /// Suspend capture without releasing the microphone
    pub fn pause(&mut self) -> Result<()> {
        match self.session.as_mut() {
            Some(session) if !session.paused => {
                session.stream.pause()?;
                session.paused = true;
                log::debug!("Recording paused");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        match self.session.as_mut() {
            Some(session) if session.paused => {
                session.stream.resume()?;
                session.paused = false;
                log::debug!("Recording resumed");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> RecorderState {
        match &self.session {
            None => RecorderState::Inactive,
            Some(session) if session.paused => RecorderState::Paused,
            Some(_) => RecorderState::Recording,
        }
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        if self.session.is_some() {
            log::warn!("Recorder dropped while recording, discarding audio");
            self.on_stop = None;
            self.stop();
        }
    }
}

/// Cuts captured audio into chunks on the recorder thread
struct Slicer {
    consumer: SampleConsumer,
    on_data: Arc<Mutex<Option<ChunkCallback>>>,
    recording: Vec<u8>,
    scratch: Vec<f32>,
    timeslice: Duration,
}

impl Slicer {
    /// Slice until stopped, then flush and return every byte recorded
    fn run(mut self, stop_rx: Receiver<()>) -> Vec<u8> {
        loop {
            match stop_rx.recv_timeout(self.timeslice) {
                Err(RecvTimeoutError::Timeout) => self.emit_chunk(),
                _ => break,
            }
        }
        self.emit_chunk();

        let dropped = self.consumer.samples_dropped();
        if dropped > 0 {
            log::warn!("Recorder buffer overflowed, {} samples lost", dropped);
        }
        self.recording
    }

    fn emit_chunk(&mut self) {
        self.scratch.clear();
        if self.consumer.drain_into(&mut self.scratch) == 0 {
            return;
        }

        let chunk = encode_l16(&self.scratch);
        if let Some(callback) = self
            .on_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(&chunk))).is_err() {
                log::error!("Chunk callback panicked, chunk kept in the recording");
            }
        }
        self.recording.extend_from_slice(&chunk);
    }
}
