//! The composition top level: owns the random stream and the session
//! memory, resolves parameters, assigns source material to every track,
//! runs the models section by section, and post-processes velocities.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::knowledge::entry::{FigureBank, FigureClass, PitchNote, TICKS_PER_BEAT};
use crate::knowledge::{EntryId, KnowledgeBase};
use crate::model::{self, ModelInput, ModelKind, RhythmBank};
use crate::params::{
    CompositionChainNode, CompositionRequest, ParameterGenerator, ResolvedParameters,
};
use crate::select;
use crate::theory::orchestration::{self, TrackLayout};
use crate::theory::structure::{self, FormType};

/// A finished piece: global parameters plus one section chain per track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composition {
    pub key: i32,
    pub scale: i32,
    pub beats: i32,
    /// Tempo in BPM, inherited from the harmony donor.
    pub tempo: f32,
    pub tracks: Vec<TrackChain>,
}

/// One instrument track: its identity and its notes, section by section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackChain {
    pub layout: TrackLayout,
    pub sections: Vec<CompositionChainNode>,
}

impl TrackChain {
    /// All notes of the track on the absolute tick timeline, with each
    /// section shifted to its bar position.
    pub fn notes(&self, beats: i32) -> Vec<PitchNote> {
        let mut notes = Vec::new();
        for section in &self.sections {
            let shift = section.form.begin * beats * TICKS_PER_BEAT;
            for note in &section.notes {
                notes.push(PitchNote::new(
                    note.pitch,
                    note.velocity,
                    note.start + shift,
                    note.end + shift,
                ));
            }
        }
        notes
    }
}

/// Build the weighted candidate pool for donor searches: the primary list
/// (matching character and genre) ten times over, then the secondary list
/// (matching character only), minus the exclusions. If excluding empties
/// the pool, the exclusions are waived rather than failing.
pub fn candidate_pool(
    primary: &[EntryId],
    secondary: &[EntryId],
    exclude: &[EntryId],
) -> Vec<EntryId> {
    let build = |with_exclusions: bool| {
        let mut pool = Vec::with_capacity(primary.len() * 10 + secondary.len());
        for _ in 0..10 {
            pool.extend_from_slice(primary);
        }
        pool.extend_from_slice(secondary);
        if with_exclusions {
            pool.retain(|id| !exclude.contains(id));
        }
        pool
    };
    let pool = build(true);
    if pool.is_empty() {
        build(false)
    } else {
        pool
    }
}

/// First part of `entry` matching the raw bank/class pair that is not in
/// `used`; marks it used on success.
fn unused_part(
    kb: &KnowledgeBase,
    entry_id: EntryId,
    figure_bank: FigureBank,
    figure_class: FigureClass,
    used: &mut Vec<(EntryId, usize)>,
) -> Option<usize> {
    for (i, part) in kb.entry(entry_id).parts.iter().enumerate() {
        if part.figure_bank == figure_bank
            && part.figure_class == figure_class
            && !used.contains(&(entry_id, i))
        {
            used.push((entry_id, i));
            return Some(i);
        }
    }
    None
}

/// Drives the whole pipeline. One composer per corpus session; its donor
/// memory spans requests, so consecutive pieces differ even with related
/// seeds.
pub struct Composer<'kb> {
    kb: &'kb KnowledgeBase,
    generator: ParameterGenerator,
    rng: ChaCha8Rng,
    params: Option<ResolvedParameters>,
    rhythm_entry: Option<EntryId>,
    timbre_entries: Vec<EntryId>,
    exclude_rhythm: Vec<EntryId>,
    exclude_figures: Vec<EntryId>,
}

impl<'kb> Composer<'kb> {
    pub fn new(kb: &'kb KnowledgeBase) -> Self {
        Self {
            kb,
            generator: ParameterGenerator::new(),
            rng: ChaCha8Rng::seed_from_u64(0),
            params: None,
            rhythm_entry: None,
            timbre_entries: Vec::new(),
            exclude_rhythm: Vec::new(),
            exclude_figures: Vec::new(),
        }
    }

    /// Resolved parameters of the last request, if any.
    pub fn parameters(&self) -> Option<&ResolvedParameters> {
        self.params.as_ref()
    }

    /// Ban an entry from future rhythm-donor selection.
    pub fn exclude_rhythm_entry(&mut self, id: EntryId) {
        self.exclude_rhythm.push(id);
    }

    /// Ban an entry from future figure-donor selection.
    pub fn exclude_figure_entry(&mut self, id: EntryId) {
        self.exclude_figures.push(id);
    }

    /// Phase one: reseed the random stream and resolve global parameters.
    pub fn generate_parameters(&mut self, request: &CompositionRequest) -> Result<()> {
        self.rng = ChaCha8Rng::seed_from_u64(request.seed);
        let params = self.generator.generate(self.kb, request, &mut self.rng)?;
        self.params = Some(params);
        Ok(())
    }

    /// Phase two: arrange all tracks against the resolved parameters.
    pub fn arrange(&mut self) -> Result<Composition> {
        let params = self.params.clone().ok_or(Error::PreconditionViolated)?;

        let primary = self
            .kb
            .entries_by_character_genre(params.character, params.genre)?;
        let secondary = self.kb.entries_by_character(params.character)?;

        // The rhythm donor is chosen once and memoized for the session.
        if self.rhythm_entry.is_none() {
            let mut exclude = vec![params.chord_entry];
            exclude.extend_from_slice(&self.exclude_rhythm);
            let mut pool = candidate_pool(&primary, &secondary, &exclude);
            pool.retain(|&id| self.kb.entry(id).for_rhythm);
            if pool.is_empty() {
                return Err(Error::CorpusExhausted {
                    query: "rhythm donors",
                });
            }
            self.rhythm_entry = Some(*select::random_choice(&mut self.rng, &pool));
        }
        let rhythm_entry = self.rhythm_entry.ok_or(Error::PreconditionViolated)?;

        let rhythm_donor = self.kb.entry(rhythm_entry);
        let mut rhythm = RhythmBank {
            melody: Vec::new(),
            solo: Vec::new(),
        };
        for part in &rhythm_donor.parts {
            if part.figure_class != FigureClass::Solo {
                continue;
            }
            if part.figure_bank == FigureBank::Melody {
                rhythm.melody.push(part.figures.as_slice());
            } else {
                rhythm.solo.push(part.figures.as_slice());
            }
        }

        // Assign a (donor entry, part) source to every track.
        let mut track_sources: Vec<(EntryId, usize)> = Vec::with_capacity(params.layout.len());
        let mut used_parts: Vec<(EntryId, usize)> = Vec::new();

        for (i, track) in params.layout.iter().enumerate() {
            if let Some(&entry_id) = self.timbre_entries.get(i) {
                let part = match unused_part(
                    self.kb,
                    entry_id,
                    track.figure_bank,
                    track.figure_class,
                    &mut used_parts,
                ) {
                    Some(part) => (entry_id, part),
                    None => orchestration::find_figures(
                        self.kb,
                        &self.kb.all_ids(),
                        track.figure_bank,
                        track.figure_class,
                        &mut self.rng,
                    )
                    .ok_or(Error::CorpusExhausted {
                        query: "figures for a reused timbre donor",
                    })?,
                };
                track_sources.push(part);
            } else {
                let mut exclude = vec![params.chord_entry, rhythm_entry];
                exclude.extend_from_slice(&self.timbre_entries);
                let figure_exclusions = self.exclude_figures.len().min(i);
                exclude.extend_from_slice(&self.exclude_figures[..figure_exclusions]);

                let pool = candidate_pool(&primary, &secondary, &exclude);
                let found = orchestration::find_figures(
                    self.kb,
                    &pool,
                    track.figure_bank,
                    track.figure_class,
                    &mut self.rng,
                )
                .or_else(|| {
                    // Candidate pool came up empty; retry over the whole
                    // corpus before giving up.
                    orchestration::find_figures(
                        self.kb,
                        &self.kb.all_ids(),
                        track.figure_bank,
                        track.figure_class,
                        &mut self.rng,
                    )
                })
                .ok_or(Error::CorpusExhausted {
                    query: "figures for a timbre request",
                })?;

                self.timbre_entries.push(found.0);
                track_sources.push(found);
            }
        }

        // Materialize per-track chains from the planned sections.
        let mut tracks: Vec<Vec<CompositionChainNode>> = params
            .layout
            .iter()
            .map(|_| {
                params
                    .chains
                    .iter()
                    .map(CompositionChainNode::from_form_node)
                    .collect()
            })
            .collect();

        for (t, &(entry_id, part_index)) in track_sources.iter().enumerate() {
            let donor = self.kb.entry(entry_id);
            let figures = &donor.parts[part_index].figures;
            if figures.is_empty() {
                continue;
            }
            let track_key = donor.key;
            let layout = params.layout[t];
            let kind = ModelKind::for_track(layout.figure_bank, layout.figure_class);

            for node in &mut tracks[t] {
                if node.form.kind == FormType::Blank {
                    continue;
                }
                let src_figure = structure::pick_figure(node.form.kind, figures, &mut self.rng);
                if src_figure.notes.is_empty() {
                    continue;
                }

                let src_bars = src_figure.bar_len();
                let dst_bars = node.form.bar_len();
                node.offset = src_figure.offset;

                let stretched_chords = structure::stretch_chord_sequence(
                    &src_figure.chords,
                    src_bars,
                    dst_bars,
                    4,
                );
                let stretched_notes = structure::stretch_figure_sequence(
                    &src_figure.notes,
                    src_bars,
                    dst_bars,
                    4,
                );

                let dst_chords = node.chords.clone();
                let input = ModelInput {
                    src_figure_bank: layout.figure_bank,
                    src_chords: &stretched_chords,
                    src_notes: &stretched_notes,
                    form_kind: node.form.kind,
                    dst_chords: &dst_chords,
                    dst_offset: src_figure.offset,
                    dst_bars,
                    src_key: track_key,
                    key: params.key,
                    scale: params.scale,
                    beats: params.beats,
                };
                node.notes = model::generate(kind, &input, &rhythm, &mut self.rng)?;
            }
        }

        orchestration::process_velocity(&mut tracks, &params.layout, &mut self.rng, 1.0, 1.0);

        Ok(Composition {
            key: params.key,
            scale: params.scale,
            beats: params.beats,
            tempo: params.tempo,
            tracks: params
                .layout
                .iter()
                .zip(tracks)
                .map(|(&layout, sections)| TrackChain { layout, sections })
                .collect(),
        })
    }

    /// Resolve parameters and arrange in one step.
    pub fn compose(&mut self, request: &CompositionRequest) -> Result<Composition> {
        self.generate_parameters(request)?;
        self.arrange()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrange_before_parameters_is_rejected() {
        let kb = KnowledgeBase::new(Vec::new()).unwrap();
        let mut composer = Composer::new(&kb);
        assert!(matches!(
            composer.arrange(),
            Err(Error::PreconditionViolated)
        ));
    }

    #[test]
    fn candidate_pool_weights_primary_ten_to_one() {
        let pool = candidate_pool(&[1], &[2], &[]);
        assert_eq!(pool.iter().filter(|&&id| id == 1).count(), 10);
        assert_eq!(pool.iter().filter(|&&id| id == 2).count(), 1);
    }

    #[test]
    fn candidate_pool_applies_exclusions() {
        let pool = candidate_pool(&[1], &[2, 3], &[1]);
        assert!(!pool.contains(&1));
        assert!(pool.contains(&2));
    }

    #[test]
    fn candidate_pool_waives_exclusions_when_emptied() {
        let pool = candidate_pool(&[1], &[], &[1]);
        assert_eq!(pool.iter().filter(|&&id| id == 1).count(), 10);
    }
}
