//! Lookahead beat scheduling
//!
//! Timer callbacks fire late and irregularly, so beats are not timed by the
//! timer itself. Each poll looks a short window ahead of the audio clock and
//! queues every beat that falls inside it at its exact timestamp. The audio
//! thread then starts each click on the right sample.

/// Slowest tempo accepted
pub const MIN_BPM: u32 = 40;
/// Fastest tempo accepted
pub const MAX_BPM: u32 = 200;
/// Beats per bar; the first beat of each bar is accented
pub const BEATS_PER_BAR: u64 = 4;

/// Clamp a requested tempo into the supported range
pub fn clamp_bpm(bpm: u32) -> u32 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// Scheduler state, in seconds of audio-clock time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockState {
    pub next_event_time: f64,
    pub bpm: u32,
    pub running: bool,
}

/// A beat queued for playback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beat {
    /// Position within the run, starting at 0
    pub index: u64,
    /// Audio-clock time at which the click starts
    pub time: f64,
    pub accented: bool,
}

#[derive(Debug, Clone)]
pub struct LookaheadScheduler {
    state: ClockState,
    next_index: u64,
    schedule_ahead: f64,
}

impl LookaheadScheduler {
    pub fn new(bpm: u32, schedule_ahead: f64) -> Self {
        Self {
            state: ClockState {
                next_event_time: 0.0,
                bpm: clamp_bpm(bpm),
                running: false,
            },
            next_index: 0,
            schedule_ahead: schedule_ahead.max(0.0),
        }
    }

    /// Begin a run with the first beat at `now`
    pub fn start(&mut self, now: f64) {
        self.state.next_event_time = now;
        self.state.running = true;
        self.next_index = 0;
    }

    pub fn stop(&mut self) {
        self.state.running = false;
    }

    /// Change tempo; the beat already queued keeps its time, the spacing
    /// after it uses the new value
    pub fn set_bpm(&mut self, bpm: u32) -> u32 {
        self.state.bpm = clamp_bpm(bpm);
        self.state.bpm
    }

    pub fn bpm(&self) -> u32 {
        self.state.bpm
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Seconds between consecutive beats at the current tempo
    pub fn beat_interval(&self) -> f64 {
        60.0 / self.state.bpm as f64
    }

    /// Queue every beat starting before `now + schedule_ahead`
    pub fn poll(&mut self, now: f64, mut emit: impl FnMut(Beat)) -> usize {
        if !self.state.running {
            return 0;
        }

        let horizon = now + self.schedule_ahead;
        let mut emitted = 0;
        while self.state.next_event_time < horizon {
            emit(Beat {
                index: self.next_index,
                time: self.state.next_event_time,
                accented: self.next_index % BEATS_PER_BAR == 0,
            });
            self.next_index += 1;
            self.state.next_event_time += self.beat_interval();
            emitted += 1;
        }
        emitted
    }
}
