//! Automuse — a corpus-driven generative composer.
//!
//! A [`KnowledgeBase`] of reference songs supplies harmony, rhythm, and
//! figure material; a [`Composer`] resolves a [`CompositionRequest`] into
//! global parameters and arranges a multi-track [`Composition`], fully
//! determined by the request seed.

pub mod compose;
pub mod error;
pub mod knowledge;
pub mod model;
pub mod params;
pub mod select;
pub mod theory;

pub use compose::{Composer, Composition, TrackChain};
pub use error::{Error, Result};
pub use knowledge::entry::{
    ChordPair, FigureBank, FigureClass, FigureEntry, PartEntry, PitchNote, SongEntry,
    TICKS_PER_BEAT,
};
pub use knowledge::{EntryId, KnowledgeBase};
pub use params::{CompositionRequest, ParameterGenerator, ResolvedParameters};
pub use theory::structure::{FormType, StructureForm, FORM_TEMPLATE_COUNT};
pub use theory::{key_name, scale_name, TrackLayout, MAX_TRACKS, SCALE_COUNT};
