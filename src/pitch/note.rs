//! Equal-tempered note names and frequency mapping (A4 = 440 Hz)

use std::fmt;

use serde::{Deserialize, Serialize};

pub const A4_HZ: f64 = 440.0;

/// Frequency of C0, 57 semitones below A4
pub fn c0_hz() -> f64 {
    A4_HZ * 2f64.powf(-4.75)
}

/// One of the twelve pitch classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Note {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl Note {
    pub const ALL: [Note; 12] = [
        Note::C,
        Note::CSharp,
        Note::D,
        Note::DSharp,
        Note::E,
        Note::F,
        Note::FSharp,
        Note::G,
        Note::GSharp,
        Note::A,
        Note::ASharp,
        Note::B,
    ];

    /// Pitch class for any semitone count, negative values included
    pub fn from_semitone(semitone: i64) -> Note {
        Self::ALL[semitone.rem_euclid(12) as usize]
    }

    /// Semitones above C
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Note::C => "C",
            Note::CSharp => "C#",
            Note::D => "D",
            Note::DSharp => "D#",
            Note::E => "E",
            Note::F => "F",
            Note::FSharp => "F#",
            Note::G => "G",
            Note::GSharp => "G#",
            Note::A => "A",
            Note::ASharp => "A#",
            Note::B => "B",
        }
    }

    /// Parse a note name; accepts sharps (`C#`) and flats (`Db`)
    pub fn from_name(name: &str) -> Option<Note> {
        let mut chars = name.trim().chars();
        let natural = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let shift = match chars.as_str() {
            "" => 0,
            "#" | "♯" => 1,
            "b" | "♭" => -1,
            _ => return None,
        };
        Some(Note::from_semitone(natural + shift))
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Nearest note to a frequency and the offset from it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteOffset {
    pub note: Note,
    pub cents: i32,
}

/// Nearest equal-tempered note and its cents deviation
///
/// Non-positive (and non-finite) frequencies map to `C` with no offset.
pub fn note_for(frequency_hz: f32) -> NoteOffset {
    let freq = frequency_hz as f64;
    if !freq.is_finite() || freq <= 0.0 {
        return NoteOffset {
            note: Note::C,
            cents: 0,
        };
    }

    let exact = 12.0 * (freq / c0_hz()).log2();
    let half_steps = exact.round();
    NoteOffset {
        note: Note::from_semitone(half_steps as i64),
        cents: ((exact - half_steps) * 100.0).round() as i32,
    }
}

/// Frequency of `note` in `octave` (A4 = 440 Hz, C4 = middle C)
pub fn note_to_frequency(note: Note, octave: i32) -> f32 {
    let semitones_from_a4 = note.index() as f64 - 9.0 + 12.0 * (octave as f64 - 4.0);
    (A4_HZ * 2f64.powf(semitones_from_a4 / 12.0)) as f32
}

/// How a cents offset reads on a tuner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TuningStatus {
    InTune,
    Sharp,
    Flat,
}

impl TuningStatus {
    /// Offsets under 10 cents either way count as in tune
    pub fn from_cents(cents: i32) -> Self {
        if cents.abs() < 10 {
            TuningStatus::InTune
        } else if cents > 0 {
            TuningStatus::Sharp
        } else {
            TuningStatus::Flat
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TuningStatus::InTune => "In tune",
            TuningStatus::Sharp => "Sharp",
            TuningStatus::Flat => "Flat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a440() {
        let reading = note_for(440.0);
        assert_eq!(reading.note, Note::A);
        assert!(reading.cents.abs() < 10);
    }

    #[test]
    fn test_degenerate_frequencies() {
        let expected = NoteOffset {
            note: Note::C,
            cents: 0,
        };
        assert_eq!(note_for(0.0), expected);
        assert_eq!(note_for(-100.0), expected);
        assert_eq!(note_for(f32::NAN), expected);
    }

    #[test]
    fn test_rederived_frequency_keeps_note() {
        let c0 = c0_hz();
        let mut freq = 80.0f64;
        while freq < 1000.0 {
            let original = note_for(freq as f32);
            let half_steps = (12.0 * (freq / c0).log2()).round();
            let snapped = c0 * 2f64.powf(half_steps / 12.0);

            let rederived = note_for(snapped as f32);
            assert_eq!(rederived.note, original.note, "at {} Hz", freq);
            assert_eq!(rederived.cents, 0);
            freq *= 1.013;
        }
    }

    #[test]
    fn test_cents_offsets() {
        // A quarter tone above A4
        let sharp = note_for((440.0 * 2f64.powf(0.25 / 12.0)) as f32);
        assert_eq!(sharp.note, Note::A);
        assert_eq!(sharp.cents, 25);

        let flat = note_for((440.0 * 2f64.powf(-0.3 / 12.0)) as f32);
        assert_eq!(flat.note, Note::A);
        assert_eq!(flat.cents, -30);
    }

    #[test]
    fn test_note_to_frequency() {
        assert!((note_to_frequency(Note::A, 4) - 440.0).abs() < 1e-3);
        assert!((note_to_frequency(Note::C, 4) - 261.63).abs() < 0.01);
        assert!((note_to_frequency(Note::G, 4) - 392.00).abs() < 0.01);
        assert!((note_to_frequency(Note::A, 3) - 220.0).abs() < 1e-3);
        assert!((note_to_frequency(Note::A, 5) - 880.0).abs() < 1e-3);
    }

    #[test]
    fn test_note_names() {
        assert_eq!(Note::from_name("C#"), Some(Note::CSharp));
        assert_eq!(Note::from_name("Db"), Some(Note::CSharp));
        assert_eq!(Note::from_name("Cb"), Some(Note::B));
        assert_eq!(Note::from_name("a"), Some(Note::A));
        assert_eq!(Note::from_name("X"), None);
        assert_eq!(Note::from_name("C##"), None);
        assert_eq!(Note::GSharp.to_string(), "G#");
    }

    #[test]
    fn test_tuning_status() {
        assert_eq!(TuningStatus::from_cents(0), TuningStatus::InTune);
        assert_eq!(TuningStatus::from_cents(-9), TuningStatus::InTune);
        assert_eq!(TuningStatus::from_cents(10), TuningStatus::Sharp);
        assert_eq!(TuningStatus::from_cents(-25), TuningStatus::Flat);
    }
}
