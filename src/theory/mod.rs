//! Music-theory primitives: structural forms, harmonic remapping, and
//! orchestration tables.

pub mod harmony;
pub mod orchestration;
pub mod structure;

pub use harmony::{key_name, scale_name, SCALE_COUNT};
pub use orchestration::{TrackLayout, MAX_TRACKS};
pub use structure::{FormType, StructureForm};
