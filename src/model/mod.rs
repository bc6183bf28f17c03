//! Track generation models. The set is closed: every `(figure bank,
//! figure class)` pair dispatches to exactly one of four generators, so a
//! request can never fail for lack of a model.

pub mod chord;
pub mod percussion;
pub mod solo;

use rand_chacha::ChaCha8Rng;

use crate::error::Result;
use crate::knowledge::entry::{ChordPair, FigureBank, FigureClass, FigureEntry, PitchNote};
use crate::theory::structure::FormType;

/// Which generator a track uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Chord,
    Percussion,
    SoloMelody,
    SoloInstrumental,
}

impl ModelKind {
    /// Total dispatch over bank and class. Melody and drum banks override
    /// the class; everything else splits on chordal versus solo.
    pub fn for_track(bank: FigureBank, class: FigureClass) -> Self {
        match bank {
            FigureBank::Melody => ModelKind::SoloMelody,
            FigureBank::Drums => ModelKind::Percussion,
            _ => {
                if class == FigureClass::Chord {
                    ModelKind::Chord
                } else {
                    ModelKind::SoloInstrumental
                }
            }
        }
    }
}

/// Everything a generator needs about the section it renders.
pub struct ModelInput<'a> {
    /// Figure bank of the source part (guitar gets special handling).
    pub src_figure_bank: FigureBank,
    /// Source chords, stretched to the section length, one per 4/4 beat.
    pub src_chords: &'a [ChordPair],
    /// Source notes, stretched to the section length.
    pub src_notes: &'a [PitchNote],
    /// Structural role of the section being rendered.
    pub form_kind: FormType,
    /// Target chords, one per output beat.
    pub dst_chords: &'a [ChordPair],
    /// Beat-alignment offset of the section's source figure.
    pub dst_offset: i32,
    /// Section length in bars.
    pub dst_bars: i32,
    /// Key of the song the source notes were recorded in.
    pub src_key: i32,
    pub key: i32,
    pub scale: i32,
    /// Output beats per bar.
    pub beats: i32,
}

/// Rhythm skeleton figures shared by the whole composition, bucketed for
/// the two solo models.
pub struct RhythmBank<'a> {
    /// Figure lists of the rhythm donor's melody solo parts.
    pub melody: Vec<&'a [FigureEntry]>,
    /// Figure lists of the rhythm donor's non-melody solo parts.
    pub solo: Vec<&'a [FigureEntry]>,
}

/// Run one model over one section.
pub fn generate(
    kind: ModelKind,
    input: &ModelInput<'_>,
    rhythm: &RhythmBank<'_>,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<PitchNote>> {
    match kind {
        ModelKind::Chord => chord::generate(input),
        ModelKind::Percussion => Ok(percussion::generate(input)),
        ModelKind::SoloMelody => solo::generate(input, &rhythm.melody, false, rng),
        ModelKind::SoloInstrumental => solo::generate(input, &rhythm.solo, true, rng),
    }
}
