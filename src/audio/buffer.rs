//! Lock-free sample buffer for moving audio out of the real-time callback
//!
//! The audio callback runs on a real-time thread and must never block on a
//! lock held by a worker. Samples are handed over through an SPSC ring
//! buffer from the `ringbuf` crate:
//! - the stream callback is the single producer
//! - the analysis or recording worker is the single consumer
//!
//! The pitch detector additionally keeps a [`RollingWindow`], a fixed-size
//! circular snapshot of the most recent samples that the analyser reads once
//! per frame.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Producer half of the sample buffer (owned by the stream callback)
pub struct SampleProducer {
    producer: ringbuf::HeapProd<f32>,
    samples_written: Arc<AtomicU64>,
    samples_dropped: Arc<AtomicU64>,
}

impl SampleProducer {
    /// Push a block of samples into the buffer
    ///
    /// Lock-free and safe to call from audio callbacks. Samples that do not
    /// fit are dropped and counted.
    #[inline]
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        let pushed = self.producer.push_slice(samples);
        self.samples_written
            .fetch_add(pushed as u64, Ordering::Relaxed);
        if pushed < samples.len() {
            self.samples_dropped
                .fetch_add((samples.len() - pushed) as u64, Ordering::Relaxed);
        }
        pushed
    }
}

/// Consumer half of the sample buffer (owned by a worker thread)
pub struct SampleConsumer {
    consumer: ringbuf::HeapCons<f32>,
    samples_written: Arc<AtomicU64>,
    samples_dropped: Arc<AtomicU64>,
}

impl SampleConsumer {
    /// Move every available sample to the end of `out`, in capture order
    pub fn drain_into(&mut self, out: &mut Vec<f32>) -> usize {
        let available = self.consumer.occupied_len();
        out.reserve(available);
        let mut count = 0;
        while let Some(sample) = self.consumer.try_pop() {
            out.push(sample);
            count += 1;
        }
        count
    }

    /// Feed every available sample into a rolling window
    pub fn drain_into_window(&mut self, window: &mut RollingWindow) -> usize {
        let mut count = 0;
        while let Some(sample) = self.consumer.try_pop() {
            window.push(sample);
            count += 1;
        }
        count
    }

    /// Total samples accepted by the producer
    pub fn samples_written(&self) -> u64 {
        self.samples_written.load(Ordering::Relaxed)
    }

    /// Total samples the producer had to discard because the buffer was full
    pub fn samples_dropped(&self) -> u64 {
        self.samples_dropped.load(Ordering::Relaxed)
    }
}

/// Create a connected producer/consumer pair holding up to `capacity` samples
pub fn sample_buffer(capacity: usize) -> (SampleProducer, SampleConsumer) {
    let rb = HeapRb::<f32>::new(capacity.max(1));
    let (prod, cons) = rb.split();

    let samples_written = Arc::new(AtomicU64::new(0));
    let samples_dropped = Arc::new(AtomicU64::new(0));

    (
        SampleProducer {
            producer: prod,
            samples_written: Arc::clone(&samples_written),
            samples_dropped: Arc::clone(&samples_dropped),
        },
        SampleConsumer {
            consumer: cons,
            samples_written,
            samples_dropped,
        },
    )
}

/// Fixed-size circular snapshot of the most recent samples
pub struct RollingWindow {
    snapshot: Vec<f32>,
    /// Next write position (also the oldest sample once full)
    write_pos: usize,
    filled: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshot: vec![0.0; capacity],
            write_pos: 0,
            filled: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, sample: f32) {
        let capacity = self.snapshot.len();
        self.snapshot[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % capacity;
        self.filled = (self.filled + 1).min(capacity);
    }

    pub fn capacity(&self) -> usize {
        self.snapshot.len()
    }

    /// Whether a full window of samples has been captured
    pub fn is_full(&self) -> bool {
        self.filled == self.snapshot.len()
    }

    /// Copy the window into `out` in chronological order (oldest first)
    ///
    /// `out` must be exactly `capacity()` long. Until the window is full the
    /// unwritten head is zeros.
    pub fn copy_chronological(&self, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.snapshot.len());
        let (newer, older) = self.snapshot.split_at(self.write_pos);
        out[..older.len()].copy_from_slice(older);
        out[older.len()..].copy_from_slice(newer);
    }
}
