//! Spectrum analysis and peak picking
//!
//! Each frame goes through the following steps:
//! 1. Blackman window over the latest `window_size` samples
//! 2. Forward FFT (RustFFT), magnitude scaled by `1/N`
//! 3. Exponential smoothing against the previous frame
//! 4. Conversion to decibels
//!
//! The loudest bin is then taken as the pitch. There is no interpolation
//! and no harmonic correction, so this suits monophonic input (a voice or
//! a single string) and misreads chords and noisy signals.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::note::note_for;
use super::PitchReading;
use crate::error::{AudioError, Result};
use crate::settings::PitchSettings;

/// Blackman window coefficients for `n` samples
fn blackman(n: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;
    let len = n as f32;
    (0..n)
        .map(|i| {
            let x = std::f32::consts::TAU * i as f32 / len;
            A0 - A1 * x.cos() + A2 * (2.0 * x).cos()
        })
        .collect()
}

pub struct SpectrumAnalyser {
    window_size: usize,
    smoothing: f32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Smoothed linear magnitudes, one per bin below Nyquist
    smoothed: Vec<f32>,
    decibels: Vec<f32>,
}

impl SpectrumAnalyser {
    pub fn new(window_size: usize, smoothing: f32) -> Self {
        let window_size = window_size.max(2);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window_size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        let bins = window_size / 2;

        Self {
            window_size,
            smoothing: smoothing.clamp(0.0, 1.0),
            fft,
            window: blackman(window_size),
            buffer: vec![Complex::default(); window_size],
            scratch,
            smoothed: vec![0.0; bins],
            decibels: vec![f32::NEG_INFINITY; bins],
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of frequency bins in each spectrum
    pub fn bin_count(&self) -> usize {
        self.smoothed.len()
    }

    /// Analyse one frame and return the smoothed spectrum in dB
    ///
    /// A frame containing NaN or infinite samples is rejected without
    /// touching the smoothing state.
    pub fn process(&mut self, frame: &[f32]) -> Result<&[f32]> {
        if frame.len() != self.window_size {
            return Err(AudioError::Analysis(format!(
                "frame has {} samples, expected {}",
                frame.len(),
                self.window_size
            )));
        }
        if frame.iter().any(|s| !s.is_finite()) {
            return Err(AudioError::Analysis("non-finite sample in frame".into()));
        }

        for ((slot, &sample), &w) in self.buffer.iter_mut().zip(frame).zip(&self.window) {
            *slot = Complex {
                re: sample * w,
                im: 0.0,
            };
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 1.0 / self.window_size as f32;
        let tau = self.smoothing;
        for ((smoothed, db), bin) in self
            .smoothed
            .iter_mut()
            .zip(self.decibels.iter_mut())
            .zip(&self.buffer)
        {
            let magnitude = bin.norm() * scale;
            let next = tau * *smoothed + (1.0 - tau) * magnitude;
            *smoothed = if next.is_finite() { next } else { 0.0 };
            *db = 20.0 * smoothed.log10();
        }

        Ok(&self.decibels)
    }

    /// Forget the smoothing history
    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
        self.decibels.fill(f32::NEG_INFINITY);
    }
}

/// Thresholds a spectral peak must pass to count as a pitch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakGate {
    pub min_db: f32,
    pub min_hz: f32,
    pub max_hz: f32,
}

impl From<&PitchSettings> for PeakGate {
    fn from(settings: &PitchSettings) -> Self {
        Self {
            min_db: settings.min_db,
            min_hz: settings.min_hz,
            max_hz: settings.max_hz,
        }
    }
}

impl Default for PeakGate {
    fn default() -> Self {
        Self::from(&PitchSettings::default())
    }
}

/// Index and level of the loudest bin; the first one wins a tie
pub fn loudest_bin(spectrum_db: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &db) in spectrum_db.iter().enumerate() {
        match best {
            Some((_, best_db)) if db <= best_db => {}
            _ if db.is_nan() => {}
            _ => best = Some((i, db)),
        }
    }
    best
}

/// Centre frequency of an FFT bin
pub fn bin_to_hz(bin: usize, sample_rate: u32, window_size: usize) -> f32 {
    bin as f32 * sample_rate as f32 / window_size as f32
}

impl PeakGate {
    /// Turn a dB spectrum into a reading, if its peak is loud enough and in range
    pub fn detect(
        &self,
        spectrum_db: &[f32],
        sample_rate: u32,
        window_size: usize,
    ) -> Option<PitchReading> {
        let (bin, db) = loudest_bin(spectrum_db)?;
        let frequency_hz = bin_to_hz(bin, sample_rate, window_size);

        if db > self.min_db && frequency_hz > self.min_hz && frequency_hz < self.max_hz {
            let nearest = note_for(frequency_hz);
            Some(PitchReading {
                note: nearest.note,
                cents: nearest.cents,
                frequency_hz,
            })
        } else {
            None
        }
    }
}
