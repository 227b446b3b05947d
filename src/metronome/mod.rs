//! Metronome
//!
//! A worker thread polls the [`LookaheadScheduler`] against the output
//! stream's clock and hands each beat to the click renderer, which starts it
//! on the exact output frame. The optional tick callback fires when a beat
//! is scheduled, which is up to the lookahead window before it is heard.

mod click;
mod scheduler;
mod tap;

pub use click::{click_channel, AudioClock, Click, ClickRenderer, ClickSender, ACCENT_HZ, BEAT_HZ};
pub use scheduler::{
    clamp_bpm, Beat, ClockState, LookaheadScheduler, BEATS_PER_BAR, MAX_BPM, MIN_BPM,
};
pub use tap::TapTempo;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::{AudioBackend, StreamHandle};
use crate::error::Result;
use crate::settings::MetronomeSettings;

/// Called once per scheduled beat, on the metronome worker thread
pub type TickCallback = Box<dyn FnMut(Beat) + Send + 'static>;

struct Session {
    active: Arc<AtomicBool>,
    stop_tx: Sender<()>,
    worker: Option<JoinHandle<()>>,
    /// Output stream; the audio clock lives and dies with it
    stream: StreamHandle,
}

pub struct Metronome {
    backend: Arc<dyn AudioBackend>,
    scheduler: Arc<Mutex<LookaheadScheduler>>,
    on_tick: Arc<Mutex<Option<TickCallback>>>,
    poll_interval: Duration,
    click_gain: f32,
    session: Option<Session>,
}

impl Metronome {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        settings: &MetronomeSettings,
        on_tick: Option<TickCallback>,
    ) -> Self {
        Self {
            backend,
            scheduler: Arc::new(Mutex::new(LookaheadScheduler::new(
                settings.default_bpm,
                settings.schedule_ahead_secs,
            ))),
            on_tick: Arc::new(Mutex::new(on_tick)),
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
            click_gain: settings.click_gain,
            session: None,
        }
    }

    /// Open the output stream and start clicking; does nothing if running
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let clock = AudioClock::new();
        let (clicks, mut renderer) = click_channel(clock.clone(), self.click_gain);
        let stream = self
            .backend
            .open_output(Box::new(move |out, sample_rate| renderer.render(out, sample_rate)))?;
        let start_time = clock.now();

        let active = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = bounded::<()>(1);

        // Held until the worker exists, so a failed spawn leaves the
        // scheduler untouched and the first poll sees the new run
        let mut scheduler = self.lock_scheduler();
        let worker = {
            let active = Arc::clone(&active);
            let shared = Arc::clone(&self.scheduler);
            let on_tick = Arc::clone(&self.on_tick);
            let poll_interval = self.poll_interval;
            let mut clicks = clicks;
            thread::Builder::new()
                .name("metronome".into())
                .spawn(move || loop {
                    if !active.load(Ordering::Acquire) {
                        break;
                    }
                    schedule_due_beats(&clock, &shared, &active, &mut clicks, &on_tick);
                    match stop_rx.recv_timeout(poll_interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                })?
        };
        scheduler.start(start_time);
        let bpm = scheduler.bpm();
        drop(scheduler);

        log::info!("Metronome started at {} BPM", bpm);
        self.session = Some(Session {
            active,
            stop_tx,
            worker: Some(worker),
            stream,
        });
        Ok(())
    }

    /// Stop clicking and release the output; safe to call at any time
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.active.store(false, Ordering::Release);
        let _ = session.stop_tx.try_send(());
        if let Some(worker) = session.worker.take() {
            if worker.join().is_err() {
                log::error!("Metronome worker panicked");
            }
        }
        self.lock_scheduler().stop();
        drop(session.stream);
        log::info!("Metronome stopped");
    }

    /// Set the tempo, clamped to [40, 200]; the next scheduled beat uses it
    pub fn set_bpm(&mut self, bpm: u32) -> u32 {
        let bpm = self.lock_scheduler().set_bpm(bpm);
        log::debug!("Metronome tempo set to {} BPM", bpm);
        bpm
    }

    pub fn bpm(&self) -> u32 {
        self.lock_scheduler().bpm()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Current scheduler state
    pub fn clock_state(&self) -> ClockState {
        self.lock_scheduler().state()
    }

    fn lock_scheduler(&self) -> std::sync::MutexGuard<'_, LookaheadScheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One poll of the scheduling loop
fn schedule_due_beats(
    clock: &AudioClock,
    scheduler: &Mutex<LookaheadScheduler>,
    active: &AtomicBool,
    clicks: &mut ClickSender,
    on_tick: &Mutex<Option<TickCallback>>,
) {
    let now = clock.now();
    let mut due = Vec::new();
    scheduler
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .poll(now, |beat| due.push(beat));

    for beat in due {
        if !active.load(Ordering::Acquire) {
            return;
        }
        if !clicks.send(Click::for_beat(beat.time, beat.accented)) {
            log::warn!("Click queue full, beat {} not sounded", beat.index);
        }
        log::trace!("Beat {} at {:.3}s", beat.index, beat.time);
        if let Some(callback) = on_tick
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(beat))).is_err() {
                log::error!("Tick callback panicked on beat {}", beat.index);
            }
        }
    }
}
