//! Corpus data model: reference songs, their instrument parts, and the
//! recorded fragments ("figures") the generator recombines.
//!
//! All types are plain data with serde derives so a host can materialize a
//! corpus from whatever store it keeps; the engine itself only ever reads
//! the typed graph.

use serde::{Deserialize, Serialize};

use crate::theory::structure::FormType;

/// Finest internal time unit. All note timestamps are integer ticks with
/// 16 ticks per beat; conversion to real time happens at the rendering
/// boundary, outside this crate.
pub const TICKS_PER_BEAT: i32 = 16;

/// Number of chord quality indices (`ChordPair::sign` range).
pub const CHORD_SIGN_COUNT: usize = 20;

/// A chord symbol: semitone root (0..12) plus quality index (0..20).
///
/// Equality is by `(root, sign)`; the component-pitch tables live in
/// [`crate::theory::harmony`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChordPair {
    pub root: i32,
    pub sign: i32,
}

impl ChordPair {
    pub fn new(root: i32, sign: i32) -> Self {
        Self { root, sign }
    }
}

/// A single note event on the tick timeline.
///
/// `start < end` except for transient intermediate states inside the
/// stretching routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchNote {
    /// MIDI pitch, 0..=127.
    pub pitch: u8,
    /// MIDI velocity, 0..=127.
    pub velocity: u8,
    /// Start tick (16 ticks per beat).
    pub start: i32,
    /// End tick, exclusive.
    pub end: i32,
}

impl PitchNote {
    pub fn new(pitch: u8, velocity: u8, start: i32, end: i32) -> Self {
        Self {
            pitch,
            velocity,
            start,
            end,
        }
    }
}

/// Instrument-family classifier used for figure matching.
///
/// The order matches the GM timbre grouping tables in
/// [`crate::theory::orchestration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FigureBank {
    Piano,
    Melody,
    Guitar,
    Bass,
    Organ,
    Drums,
    Strings,
    Wind,
    Effect,
    National,
    Unsorted,
}

impl FigureBank {
    /// All banks in table order.
    pub const ALL: [FigureBank; 11] = [
        FigureBank::Piano,
        FigureBank::Melody,
        FigureBank::Guitar,
        FigureBank::Bass,
        FigureBank::Organ,
        FigureBank::Drums,
        FigureBank::Strings,
        FigureBank::Wind,
        FigureBank::Effect,
        FigureBank::National,
        FigureBank::Unsorted,
    ];

    /// Position in the static orchestration tables.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Solo-versus-chordal role classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FigureClass {
    Chord,
    Solo,
    Dec,
}

/// A recorded fragment: the notes of one structural section of one part,
/// with the chord actually sounding under every beat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureEntry {
    /// Which structural role this fragment was recorded as.
    pub segment: FormType,
    /// First bar of the fragment within its source song.
    pub begin: i32,
    /// One past the last bar.
    pub end: i32,
    /// Beat-alignment offset applied when the fragment is re-used.
    pub offset: i32,
    /// One chord per beat of the recording. Invariant: length equals
    /// `(end - begin) * time_beats` of the owning song.
    pub chords: Vec<ChordPair>,
    /// The recorded notes. May be empty; an empty figure contributes
    /// silence, which is not an error.
    pub notes: Vec<PitchNote>,
}

impl FigureEntry {
    /// Length of the recording in bars.
    pub fn bar_len(&self) -> i32 {
        self.end - self.begin
    }
}

/// One instrument part of one reference song: all of its recorded figures
/// under a single `(timbre_bank, figure_bank, figure_class)` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartEntry {
    /// GM program number (128 = drum kit).
    pub timbre_bank: i32,
    pub figure_bank: FigureBank,
    pub figure_class: FigureClass,
    pub figures: Vec<FigureEntry>,
}

/// One reference song: recorded parts plus the classification tags the
/// query layer filters on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongEntry {
    /// Key root, 0..12.
    pub key: i32,
    /// Scale index: 0 = major, 1 = minor.
    pub scale: i32,
    /// Recorded tempo in BPM; carried through to the composition header.
    pub tempo: f32,
    /// Beats per bar of the recording (the corpus is natively 4).
    pub time_beats: i32,
    /// Beat unit of the time signature (unused by the generator).
    pub time_beat_type: i32,
    /// Musical-character tags.
    pub character: Vec<i32>,
    /// Genre tags.
    pub genre: Vec<i32>,
    pub for_rhythm: bool,
    pub for_chord: bool,
    pub for_timbre: bool,
    pub parts: Vec<PartEntry>,
}

impl SongEntry {
    pub fn has_character(&self, character: i32) -> bool {
        self.character.contains(&character)
    }

    pub fn has_genre(&self, genre: i32) -> bool {
        self.genre.contains(&genre)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chord_pair_equality_is_by_root_and_sign() {
        assert_eq!(ChordPair::new(0, 1), ChordPair::new(0, 1));
        assert_ne!(ChordPair::new(0, 1), ChordPair::new(1, 1));
        assert_ne!(ChordPair::new(0, 1), ChordPair::new(0, 2));
    }

    #[test]
    fn figure_bar_len() {
        let fig = FigureEntry {
            segment: FormType::Verse11,
            begin: 8,
            end: 16,
            offset: 0,
            chords: Vec::new(),
            notes: Vec::new(),
        };
        assert_eq!(fig.bar_len(), 8);
    }

    #[test]
    fn bank_index_matches_table_order() {
        assert_eq!(FigureBank::Piano.index(), 0);
        assert_eq!(FigureBank::Drums.index(), 5);
        assert_eq!(FigureBank::Unsorted.index(), 10);
        for (i, bank) in FigureBank::ALL.iter().enumerate() {
            assert_eq!(bank.index(), i);
        }
    }

    #[test]
    fn song_entry_tag_lookup() {
        let entry = SongEntry {
            key: 0,
            scale: 0,
            tempo: 120.0,
            time_beats: 4,
            time_beat_type: 4,
            character: vec![3, 7],
            genre: vec![1],
            for_rhythm: false,
            for_chord: true,
            for_timbre: false,
            parts: Vec::new(),
        };
        assert!(entry.has_character(7));
        assert!(!entry.has_character(4));
        assert!(entry.has_genre(1));
        assert!(!entry.has_genre(2));
    }
}
