//! Click synthesis on the output stream
//!
//! The scheduler runs on a worker thread and only knows clock times. It
//! sends [`Click`]s through a lock-free queue; the output callback turns
//! each one into a decaying sine voice that starts on the exact frame for
//! its time. The callback also publishes how much audio it has rendered,
//! which is the monotonic clock the scheduler reads.

use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Pitch of the first beat of a bar
pub const ACCENT_HZ: f32 = 1000.0;
/// Pitch of every other beat
pub const BEAT_HZ: f32 = 800.0;
/// Click length in seconds
pub const CLICK_SECS: f32 = 0.05;
/// Level the envelope decays to by the end of the click
const CLICK_FLOOR: f32 = 0.01;

const QUEUE_CAPACITY: usize = 64;

/// Seconds of audio rendered since the output stream opened
#[derive(Clone, Default)]
pub struct AudioClock {
    seconds_bits: Arc<AtomicU64>,
}

impl AudioClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> f64 {
        f64::from_bits(self.seconds_bits.load(Ordering::Acquire))
    }

    fn publish(&self, seconds: f64) {
        self.seconds_bits.store(seconds.to_bits(), Ordering::Release);
    }
}

/// A click to start at `start_time` on the audio clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Click {
    pub start_time: f64,
    pub frequency: f32,
}

impl Click {
    pub fn for_beat(start_time: f64, accented: bool) -> Self {
        Self {
            start_time,
            frequency: if accented { ACCENT_HZ } else { BEAT_HZ },
        }
    }
}

/// Sending half of the click queue (owned by the scheduling worker)
pub struct ClickSender {
    producer: ringbuf::HeapProd<Click>,
}

impl ClickSender {
    /// Queue a click; returns false if the renderer is too far behind
    pub fn send(&mut self, click: Click) -> bool {
        self.producer.try_push(click).is_ok()
    }
}

struct Voice {
    start_frame: u64,
    phase: f32,
    phase_inc: f32,
    envelope: f32,
    decay: f32,
    frames_left: u32,
}

impl Voice {
    fn new(click: &Click, start_frame: u64, gain: f32, sample_rate: f32) -> Self {
        let length = (CLICK_SECS * sample_rate).round().max(1.0);
        Self {
            start_frame,
            phase: 0.0,
            phase_inc: std::f32::consts::TAU * click.frequency / sample_rate,
            envelope: gain,
            decay: (CLICK_FLOOR / gain.max(CLICK_FLOOR)).powf(1.0 / length),
            frames_left: length as u32,
        }
    }
}

/// Output-side click synthesizer (owned by the render callback)
pub struct ClickRenderer {
    clicks: ringbuf::HeapCons<Click>,
    pending: Vec<Click>,
    voices: Vec<Voice>,
    frames_rendered: u64,
    clock: AudioClock,
    gain: f32,
}

/// Create a connected click queue and renderer sharing `clock`
pub fn click_channel(clock: AudioClock, gain: f32) -> (ClickSender, ClickRenderer) {
    let rb = HeapRb::<Click>::new(QUEUE_CAPACITY);
    let (producer, consumer) = rb.split();
    (
        ClickSender { producer },
        ClickRenderer {
            clicks: consumer,
            pending: Vec::with_capacity(QUEUE_CAPACITY),
            voices: Vec::with_capacity(QUEUE_CAPACITY),
            frames_rendered: 0,
            clock,
            gain: gain.clamp(0.0, 1.0),
        },
    )
}

impl ClickRenderer {
    /// Render one mono block and advance the clock
    pub fn render(&mut self, out: &mut [f32], sample_rate: u32) {
        out.fill(0.0);
        let sr = sample_rate.max(1) as f32;
        let block_start = self.frames_rendered;
        let block_end = block_start + out.len() as u64;

        while let Some(click) = self.clicks.try_pop() {
            self.pending.push(click);
        }

        // Clicks due in this block become voices; a click scheduled in the
        // past starts at the top of the block
        let gain = self.gain;
        let voices = &mut self.voices;
        self.pending.retain(|click| {
            let start_frame = (click.start_time.max(0.0) * sr as f64).round() as u64;
            if start_frame < block_end {
                voices.push(Voice::new(click, start_frame.max(block_start), gain, sr));
                false
            } else {
                true
            }
        });

        for voice in self.voices.iter_mut() {
            let offset = voice.start_frame.saturating_sub(block_start) as usize;
            for sample in out.iter_mut().skip(offset) {
                if voice.frames_left == 0 {
                    break;
                }
                *sample += voice.phase.sin() * voice.envelope;
                voice.phase += voice.phase_inc;
                voice.envelope *= voice.decay;
                voice.frames_left -= 1;
            }
        }
        self.voices.retain(|v| v.frames_left > 0);

        self.frames_rendered = block_end;
        self.clock.publish(block_end as f64 / sr as f64);
    }
}
