//! Live pitch detection
//!
//! The input callback pushes microphone samples into a lock-free buffer. A
//! worker thread wakes once per display frame, refreshes a rolling window of
//! the latest samples, analyses it and reports the dominant note to the
//! registered callback.

mod analyser;
mod note;

pub use analyser::{bin_to_hz, loudest_bin, PeakGate, SpectrumAnalyser};
pub use note::{c0_hz, note_for, note_to_frequency, Note, NoteOffset, TuningStatus, A4_HZ};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::{sample_buffer, AudioBackend, RollingWindow, SampleConsumer, StreamHandle};
use crate::error::Result;
use crate::settings::PitchSettings;

/// Result of one analysis frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchReading {
    pub note: Note,
    pub cents: i32,
    pub frequency_hz: f32,
}

impl PitchReading {
    pub fn status(&self) -> TuningStatus {
        TuningStatus::from_cents(self.cents)
    }
}

/// Receives each reading, on the detector's worker thread
pub type PitchCallback = Box<dyn FnMut(PitchReading) + Send + 'static>;

struct Session {
    active: Arc<AtomicBool>,
    stop_tx: Sender<()>,
    worker: Option<JoinHandle<()>>,
    stream: StreamHandle,
}

pub struct PitchDetector {
    backend: Arc<dyn AudioBackend>,
    settings: PitchSettings,
    on_pitch: Arc<Mutex<PitchCallback>>,
    session: Option<Session>,
}

impl PitchDetector {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        settings: &PitchSettings,
        on_pitch: PitchCallback,
    ) -> Self {
        Self {
            backend,
            settings: settings.clone(),
            on_pitch: Arc::new(Mutex::new(on_pitch)),
            session: None,
        }
    }

    /// Open the microphone and start detecting; does nothing if running
    ///
    /// Fails with `PermissionDenied` or `CaptureUnavailable`, leaving the
    /// detector stopped.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let window_size = self.settings.window_size.max(2);
        let (mut producer, consumer) = sample_buffer(window_size * 8);
        let stream = self.backend.open_input(Box::new(move |samples| {
            producer.push_slice(samples);
        }))?;
        let sample_rate = stream.info().sample_rate;

        let active = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let frame_interval = Duration::from_millis(self.settings.frame_interval_ms.max(1));
        let mut frame = DetectionFrame {
            consumer,
            window: RollingWindow::new(window_size),
            samples: vec![0.0; window_size],
            analyser: SpectrumAnalyser::new(window_size, self.settings.smoothing),
            gate: PeakGate::from(&self.settings),
            sample_rate,
        };

        let worker = {
            let active = Arc::clone(&active);
            let on_pitch = Arc::clone(&self.on_pitch);
            thread::Builder::new()
                .name("pitch-detector".into())
                .spawn(move || loop {
                    if !active.load(Ordering::Acquire) {
                        break;
                    }
                    if let Some(reading) = frame.run() {
                        if !active.load(Ordering::Acquire) {
                            break;
                        }
                        deliver(&on_pitch, reading);
                    }
                    match stop_rx.recv_timeout(frame_interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                })?
        };

        log::info!(
            "Pitch detection started ({} Hz, window {})",
            sample_rate,
            window_size
        );
        self.session = Some(Session {
            active,
            stop_tx,
            worker: Some(worker),
            stream,
        });
        Ok(())
    }

    /// Stop detecting and release the microphone; safe to call at any time
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.active.store(false, Ordering::Release);
        let _ = session.stop_tx.try_send(());
        if let Some(worker) = session.worker.take() {
            if worker.join().is_err() {
                log::error!("Pitch detection worker panicked");
            }
        }
        drop(session.stream);
        log::info!("Pitch detection stopped");
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for PitchDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Hand a reading to the user callback; a panicking callback is logged and
/// the detector keeps running
fn deliver(on_pitch: &Mutex<PitchCallback>, reading: PitchReading) {
    let mut callback = on_pitch.lock().unwrap_or_else(PoisonError::into_inner);
    if panic::catch_unwind(AssertUnwindSafe(|| callback(reading))).is_err() {
        log::error!("Pitch callback panicked on {} Hz", reading.frequency_hz);
    }
}

/// Per-session analysis state, owned by the worker
struct DetectionFrame {
    consumer: SampleConsumer,
    window: RollingWindow,
    samples: Vec<f32>,
    analyser: SpectrumAnalyser,
    gate: PeakGate,
    sample_rate: u32,
}

impl DetectionFrame {
    /// Analyse the latest window; a failed frame is logged and skipped
    fn run(&mut self) -> Option<PitchReading> {
        self.consumer.drain_into_window(&mut self.window);
        if !self.window.is_full() {
            return None;
        }

        self.window.copy_chronological(&mut self.samples);
        let window_size = self.analyser.window_size();
        match self.analyser.process(&self.samples) {
            Ok(spectrum) => {
                self.gate
                    .detect(spectrum, self.sample_rate, window_size)
            }
            Err(e) => {
                log::warn!("Skipping analysis frame: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::{MockBackend, MockFailure};
    use crate::error::AudioError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    const SR: u32 = 48_000;

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (std::f32::consts::TAU * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    fn settings() -> PitchSettings {
        PitchSettings {
            frame_interval_ms: 2,
            ..PitchSettings::default()
        }
    }

    fn collecting_detector(
        backend: &Arc<MockBackend>,
    ) -> (PitchDetector, Arc<Mutex<Vec<PitchReading>>>) {
        let readings = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&readings);
        let detector = PitchDetector::new(
            backend.clone(),
            &settings(),
            Box::new(move |reading| sink.lock().unwrap().push(reading)),
        );
        (detector, readings)
    }

    fn wait_for(readings: &Mutex<Vec<PitchReading>>, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if !readings.lock().unwrap().is_empty() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_detects_a440() {
        let backend = Arc::new(MockBackend::new(SR));
        let (mut detector, readings) = collecting_detector(&backend);

        detector.start().unwrap();
        backend.feed_input(&sine(440.0, 0.5, 4096));
        assert!(wait_for(&readings, Duration::from_secs(2)));
        detector.stop();

        let first = readings.lock().unwrap()[0];
        assert_eq!(first.note, Note::A);
        assert!(first.cents.abs() <= 50);
        assert!(first.frequency_hz > 400.0 && first.frequency_hz < 480.0);
    }

    #[test]
    fn test_silence_produces_no_readings() {
        let backend = Arc::new(MockBackend::new(SR));
        let (mut detector, readings) = collecting_detector(&backend);

        detector.start().unwrap();
        backend.feed_input(&vec![0.0; 4096]);
        thread::sleep(Duration::from_millis(60));
        detector.stop();

        assert!(readings.lock().unwrap().is_empty());
    }

    #[test]
    fn test_no_readings_after_stop() {
        let backend = Arc::new(MockBackend::new(SR));
        let (mut detector, readings) = collecting_detector(&backend);

        detector.start().unwrap();
        backend.feed_input(&sine(330.0, 0.5, 4096));
        assert!(wait_for(&readings, Duration::from_secs(2)));
        detector.stop();
        let count = readings.lock().unwrap().len();

        backend.feed_input(&sine(330.0, 0.5, 4096));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(readings.lock().unwrap().len(), count);
        assert_eq!(backend.live_inputs(), 0);
        assert!(!detector.is_active());
    }

    #[test]
    fn test_bad_frame_does_not_end_session() {
        let backend = Arc::new(MockBackend::new(SR));
        let (mut detector, readings) = collecting_detector(&backend);

        detector.start().unwrap();
        backend.feed_input(&vec![f32::NAN; 2048]);
        thread::sleep(Duration::from_millis(30));
        assert!(detector.is_active());

        backend.feed_input(&sine(440.0, 0.5, 4096));
        assert!(wait_for(&readings, Duration::from_secs(2)));
        detector.stop();
    }

    #[test]
    fn test_panicking_callback_keeps_detecting() {
        let backend = Arc::new(MockBackend::new(SR));
        let calls = Arc::new(AtomicUsize::new(0));
        let readings = Arc::new(Mutex::new(Vec::new()));
        let (counter, sink) = (Arc::clone(&calls), Arc::clone(&readings));
        let mut detector = PitchDetector::new(
            backend.clone(),
            &settings(),
            Box::new(move |reading: PitchReading| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("display went away");
                }
                sink.lock().unwrap().push(reading);
            }),
        );

        detector.start().unwrap();
        backend.feed_input(&sine(440.0, 0.5, 4096));
        assert!(wait_for(&readings, Duration::from_secs(2)));
        assert!(detector.is_active());
        assert!(calls.load(Ordering::SeqCst) >= 2);

        detector.stop();
        assert!(!detector.is_active());
        assert_eq!(readings.lock().unwrap()[0].note, Note::A);
    }

    #[test]
    fn test_denied_start_leaves_detector_stopped() {
        let backend = Arc::new(MockBackend::new(SR));
        let (mut detector, _) = collecting_detector(&backend);

        backend.fail_with(MockFailure::Denied);
        let err = detector.start().unwrap_err();
        assert!(matches!(err, AudioError::PermissionDenied(_)));
        assert!(!detector.is_active());
        assert_eq!(backend.live_inputs(), 0);

        // Retry without calling stop first
        backend.clear_failure();
        detector.start().unwrap();
        assert!(detector.is_active());
    }

    #[test]
    fn test_stop_before_start_and_twice() {
        let backend = Arc::new(MockBackend::new(SR));
        let (mut detector, _) = collecting_detector(&backend);

        detector.stop();
        detector.start().unwrap();
        detector.start().unwrap();
        assert_eq!(backend.opened(), 1);
        detector.stop();
        detector.stop();
        assert!(!detector.is_active());
    }
}
