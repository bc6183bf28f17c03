//! Read-only corpus store and its tag-filtered queries.
//!
//! A [`KnowledgeBase`] owns every reference song for the lifetime of the
//! engine; all downstream code addresses entries by [`EntryId`] so that
//! session memory (avoid-repeat lists, per-track reuse) survives borrows.

pub mod entry;

pub use entry::{
    ChordPair, FigureBank, FigureClass, FigureEntry, PartEntry, PitchNote, SongEntry,
    CHORD_SIGN_COUNT, TICKS_PER_BEAT,
};

use crate::error::{Error, Result};

/// Stable index of a song within its [`KnowledgeBase`].
pub type EntryId = usize;

/// The immutable reference-song corpus.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: Vec<SongEntry>,
}

impl KnowledgeBase {
    /// Build a corpus from already-materialized entries, validating the
    /// per-figure chord-list invariant up front.
    pub fn new(entries: Vec<SongEntry>) -> Result<Self> {
        let kb = Self { entries };
        kb.validate()?;
        Ok(kb)
    }

    /// Deserialize a corpus from YAML.
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let entries: Vec<SongEntry> =
            serde_yaml::from_str(source).map_err(|e| Error::ResourceUnavailable(e.to_string()))?;
        Self::new(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: EntryId) -> &SongEntry {
        &self.entries[id]
    }

    pub fn entries(&self) -> &[SongEntry] {
        &self.entries
    }

    /// Every entry id, in corpus order. The widest possible search pool.
    pub fn all_ids(&self) -> Vec<EntryId> {
        (0..self.entries.len()).collect()
    }

    /// Chord-donor entries matching a character tag.
    pub fn chord_entries(&self, character: i32) -> Result<Vec<EntryId>> {
        self.filtered("chord entries for character", |e| {
            e.for_chord && e.has_character(character)
        })
    }

    /// Timbre-donor entries matching a genre tag.
    pub fn timbre_entries(&self, genre: i32) -> Result<Vec<EntryId>> {
        self.filtered("timbre entries for genre", |e| {
            e.for_timbre && e.has_genre(genre)
        })
    }

    /// All entries matching a character tag, regardless of donor roles.
    pub fn entries_by_character(&self, character: i32) -> Result<Vec<EntryId>> {
        self.filtered("entries for character", |e| e.has_character(character))
    }

    /// All entries matching both a character and a genre tag.
    pub fn entries_by_character_genre(&self, character: i32, genre: i32) -> Result<Vec<EntryId>> {
        self.filtered("entries for character and genre", |e| {
            e.has_character(character) && e.has_genre(genre)
        })
    }

    fn filtered<F>(&self, query: &'static str, pred: F) -> Result<Vec<EntryId>>
    where
        F: Fn(&SongEntry) -> bool,
    {
        let ids: Vec<EntryId> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| pred(e))
            .map(|(i, _)| i)
            .collect();
        if ids.is_empty() {
            return Err(Error::CorpusExhausted { query });
        }
        Ok(ids)
    }

    /// Every figure must carry exactly one chord per recorded beat; a
    /// mismatch would silently desynchronize the harmonic remap, so it is
    /// fatal at load time.
    fn validate(&self) -> Result<()> {
        for (id, entry) in self.entries.iter().enumerate() {
            if entry.time_beats <= 0 {
                return Err(Error::MalformedInput(format!(
                    "entry {id}: non-positive beats per bar ({})",
                    entry.time_beats
                )));
            }
            if entry.for_chord && entry.parts.is_empty() {
                return Err(Error::MalformedInput(format!(
                    "entry {id}: chord donor has no parts"
                )));
            }
            for (p, part) in entry.parts.iter().enumerate() {
                for (f, figure) in part.figures.iter().enumerate() {
                    if figure.end < figure.begin {
                        return Err(Error::MalformedInput(format!(
                            "entry {id} part {p} figure {f}: bar range {}..{} is inverted",
                            figure.begin, figure.end
                        )));
                    }
                    let expected = figure.bar_len() * entry.time_beats;
                    if figure.chords.len() as i32 != expected {
                        return Err(Error::MalformedInput(format!(
                            "entry {id} part {p} figure {f}: chord list length {}, expected {expected}",
                            figure.chords.len()
                        )));
                    }
                    for chord in &figure.chords {
                        if !(0..12).contains(&chord.root)
                            || !(0..CHORD_SIGN_COUNT as i32).contains(&chord.sign)
                        {
                            return Err(Error::MalformedInput(format!(
                                "entry {id} part {p} figure {f}: chord ({}, {}) out of range",
                                chord.root, chord.sign
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
