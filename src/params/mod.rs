//! Global parameter resolution: turns a [`CompositionRequest`] into the
//! key, scale, structure, per-section chord progressions, and instrument
//! manifest that the composition stage consumes.

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::knowledge::entry::{ChordPair, FigureEntry, PitchNote};
use crate::knowledge::{EntryId, KnowledgeBase};
use crate::select;
use crate::theory::orchestration::{self, TrackLayout};
use crate::theory::structure::{self, FormType, StructureForm};
use crate::theory::{harmony, structure::FORM_TEMPLATE_COUNT};

/// What the caller asks for: structure, mood tags, meter, and the
/// deterministic steering knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionRequest {
    /// Index into the form-template catalogue.
    pub form_template: usize,
    /// Character tag driving harmony selection.
    pub character: i32,
    /// Genre tag driving instrumentation selection.
    pub genre: i32,
    /// Beats per bar of the output, 3 or 4.
    pub beats: i32,
    /// Seed for the composition's random stream. Identical requests with
    /// identical seeds reproduce the same composition.
    pub seed: u64,
    /// Optional position steer for the harmony-donor pick, `0.0..=1.0`.
    pub chord_factor: Option<f64>,
    /// Optional position steer for the instrumentation-donor pick.
    pub timbre_factor: Option<f64>,
}

impl CompositionRequest {
    pub fn validate(&self) -> Result<()> {
        if self.beats != 3 && self.beats != 4 {
            return Err(Error::MalformedInput(format!(
                "unsupported meter: {} beats per bar",
                self.beats
            )));
        }
        if self.form_template >= FORM_TEMPLATE_COUNT {
            return Err(Error::MalformedInput(format!(
                "unknown form template {}",
                self.form_template
            )));
        }
        Ok(())
    }
}

/// One section of the planned song: its structural slot, the chord
/// progression stretched to its length, and the source figure the chords
/// came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormChainNode {
    pub form: StructureForm,
    /// One chord per beat over the section.
    pub chords: Vec<ChordPair>,
    /// Source figure backing the progression; `None` for the blank
    /// lead-in.
    pub figure: Option<FigureEntry>,
    /// Beat-alignment offset inherited from the source figure.
    pub offset: i32,
}

/// A [`FormChainNode`] plus the notes one track actually plays over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionChainNode {
    pub form: StructureForm,
    pub chords: Vec<ChordPair>,
    pub figure: Option<FigureEntry>,
    pub offset: i32,
    pub notes: Vec<PitchNote>,
}

impl CompositionChainNode {
    pub fn from_form_node(node: &FormChainNode) -> Self {
        Self {
            form: node.form,
            chords: node.chords.clone(),
            figure: node.figure.clone(),
            offset: node.offset,
            notes: Vec::new(),
        }
    }
}

/// Everything the composition stage needs, resolved once per request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParameters {
    pub key: i32,
    pub scale: i32,
    pub beats: i32,
    pub character: i32,
    pub genre: i32,
    pub tempo: f32,
    /// Entry whose harmony the whole piece borrows.
    pub chord_entry: EntryId,
    /// Entry whose instrumentation the track manifest derives from.
    pub timbre_entry: EntryId,
    pub layout: Vec<TrackLayout>,
    pub forms: Vec<StructureForm>,
    pub chains: Vec<FormChainNode>,
}

/// Resolves global parameters; remembers its previous donor picks so
/// consecutive requests on one session avoid immediate repetition.
#[derive(Debug, Default)]
pub struct ParameterGenerator {
    prev_chord_entry: Option<EntryId>,
    prev_timbre_entry: Option<EntryId>,
}

impl ParameterGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a request against the corpus.
    pub fn generate(
        &mut self,
        kb: &KnowledgeBase,
        request: &CompositionRequest,
        rng: &mut ChaCha8Rng,
    ) -> Result<ResolvedParameters> {
        request.validate()?;

        let chord_entry = self.select_chord_entry(kb, request, rng)?;
        let entry = kb.entry(chord_entry);
        let key = entry.key;
        let scale = entry.scale;
        let tempo = entry.tempo;

        let forms = resolve_forms(request.form_template)?;
        let src_figures = &entry
            .parts
            .first()
            .ok_or(Error::PreconditionViolated)?
            .figures;
        let mut chains = coordinate_chords(&forms, src_figures, key, scale, rng)?;
        remap_chain_beats(&mut chains, 4, request.beats);

        let timbre_entry = self.select_timbre_entry(kb, request, rng)?;
        let src_layouts = orchestration::part_layouts(kb.entry(timbre_entry));
        let layout = orchestration::layout_timbres(&src_layouts, false, rng);

        Ok(ResolvedParameters {
            key,
            scale,
            beats: request.beats,
            character: request.character,
            genre: request.genre,
            tempo,
            chord_entry,
            timbre_entry,
            layout,
            forms,
            chains,
        })
    }

    /// Pick the harmony donor: entries of the requested character, minus
    /// the previous pick, preferring mostly-diatonic progressions when
    /// enough of them exist.
    fn select_chord_entry(
        &mut self,
        kb: &KnowledgeBase,
        request: &CompositionRequest,
        rng: &mut ChaCha8Rng,
    ) -> Result<EntryId> {
        let mut candidates = kb.chord_entries(request.character)?;
        if let Some(prev) = self.prev_chord_entry {
            candidates.retain(|&id| id != prev);
        }
        if candidates.is_empty() {
            return Err(Error::CorpusExhausted {
                query: "chord entries excluding previous pick",
            });
        }

        let mut preferred: Vec<EntryId> = Vec::new();
        for &id in &candidates {
            let entry = kb.entry(id);
            let figures = match entry.parts.first() {
                Some(part) => &part.figures,
                None => continue,
            };
            let mut out_of_key = 0usize;
            let mut total = 0usize;
            for figure in figures {
                for chord in &figure.chords {
                    if !harmony::chord_is_in_key(chord, entry.key, entry.scale) {
                        out_of_key += 1;
                    }
                }
                total += figure.chords.len();
            }
            if total > 0 && (out_of_key as f32 / total as f32) <= 0.05 {
                preferred.push(id);
            }
        }

        let pool = if preferred.len() > 10 {
            &preferred
        } else {
            &candidates
        };
        let picked = *select::steered_choice(rng, pool, request.chord_factor);
        self.prev_chord_entry = Some(picked);
        Ok(picked)
    }

    /// Pick the instrumentation donor among entries of the requested
    /// genre, avoiding the previous pick.
    fn select_timbre_entry(
        &mut self,
        kb: &KnowledgeBase,
        request: &CompositionRequest,
        rng: &mut ChaCha8Rng,
    ) -> Result<EntryId> {
        let mut candidates = kb.timbre_entries(request.genre)?;
        if let Some(prev) = self.prev_timbre_entry {
            candidates.retain(|&id| id != prev);
        }
        if candidates.is_empty() {
            return Err(Error::CorpusExhausted {
                query: "timbre entries excluding previous pick",
            });
        }
        let picked = *select::steered_choice(rng, &candidates, request.timbre_factor);
        self.prev_timbre_entry = Some(picked);
        Ok(picked)
    }
}

/// Materialize a form template and assign bar positions. A one-bar blank
/// lead-in is guaranteed at the front, so the section chain partitions
/// the whole timeline.
fn resolve_forms(template: usize) -> Result<Vec<StructureForm>> {
    let mut forms = structure::get_form_template(template)?;
    if forms.first().map(|f| f.kind) != Some(FormType::Blank) {
        forms.insert(0, StructureForm::new(FormType::Blank, 1));
    }
    let mut bar = 0;
    for form in &mut forms {
        form.begin = bar;
        bar += form.bars;
        form.end = bar;
    }
    Ok(forms)
}

/// Attach a chord progression to every section.
///
/// Each non-blank section borrows the progression of the best-matching
/// source figure, stretched to the section length; sections leading into
/// an ending or interlude are cadenced onto the tonic. The blank lead-in
/// repeats the first real chord of the song.
fn coordinate_chords(
    forms: &[StructureForm],
    src_figures: &[FigureEntry],
    key: i32,
    scale: i32,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<FormChainNode>> {
    if src_figures.is_empty() {
        return Err(Error::CorpusExhausted {
            query: "figures of the harmony donor",
        });
    }

    let mut chains: Vec<FormChainNode> = Vec::with_capacity(forms.len());
    for (i, form) in forms.iter().enumerate() {
        if form.kind == FormType::Blank {
            chains.push(FormChainNode {
                form: *form,
                chords: Vec::new(),
                figure: None,
                offset: 0,
            });
            continue;
        }

        let figure = structure::pick_figure(form.kind, src_figures, rng);
        let mut chords =
            structure::stretch_chord_sequence(&figure.chords, figure.bar_len(), form.bar_len(), 4);

        if let Some(next) = forms.get(i + 1) {
            if next.kind.wants_preceding_cadence() && chords.len() >= 4 {
                let n = chords.len();
                let tonic = ChordPair::new(key, scale);
                if chords[n - 3] != chords[n - 2] {
                    chords[n - 2] = tonic;
                    chords[n - 1] = tonic;
                } else {
                    for slot in &mut chords[n - 4..] {
                        *slot = tonic;
                    }
                }
            }
        }

        chains.push(FormChainNode {
            form: *form,
            chords,
            figure: Some(figure.clone()),
            offset: figure.offset,
        });
    }

    // Fill the lead-in with the first chord of the first real section.
    if chains.len() > 1 && chains[0].form.kind == FormType::Blank {
        if let Some(&main_chord) = chains[1].chords.first() {
            chains[0].chords = vec![main_chord; 4];
        }
    }
    Ok(chains)
}

/// Convert every section's per-beat chord list between meters. 4/4 to 3/4
/// keeps each group-of-four's third chord, repeated over the shortened
/// bar; 3/4 to 4/4 pads each triple with its last chord.
fn remap_chain_beats(chains: &mut [FormChainNode], native_beats: i32, dst_beats: i32) {
    if native_beats == dst_beats {
        return;
    }
    for chain in chains.iter_mut() {
        let src = &chain.chords;
        let mut dst: Vec<ChordPair> = Vec::new();
        if native_beats == 4 && dst_beats == 3 {
            let mut j = 0;
            while j + 2 < src.len() {
                for _ in 0..3 {
                    dst.push(src[j + 2]);
                }
                j += 4;
            }
        } else if native_beats == 3 && dst_beats == 4 {
            let mut j = 0;
            while j + 2 < src.len() {
                dst.extend_from_slice(&src[j..j + 3]);
                dst.push(src[j + 2]);
                j += 3;
            }
        } else {
            continue;
        }
        chain.chords = dst;
    }
}

/// Expose the 4/4-to-3/4 chord conversion for direct use on a bare list.
pub fn remap_beats_4_to_3(chords: &[ChordPair]) -> Vec<ChordPair> {
    let mut node = FormChainNode {
        form: StructureForm::new(FormType::Verse11, 0),
        chords: chords.to_vec(),
        figure: None,
        offset: 0,
    };
    remap_chain_beats(std::slice::from_mut(&mut node), 4, 3);
    node.chords
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::entry::{FigureBank, FigureClass, PartEntry, SongEntry};
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(11)
    }

    fn figure(segment: FormType, bars: i32, root: i32) -> FigureEntry {
        FigureEntry {
            segment,
            begin: 0,
            end: bars,
            offset: 0,
            chords: (0..bars * 4)
                .map(|i| ChordPair::new((root + i / 4) % 12, 0))
                .collect(),
            notes: Vec::new(),
        }
    }

    fn corpus() -> KnowledgeBase {
        let chord_donor = SongEntry {
            key: 0,
            scale: 0,
            tempo: 96.0,
            time_beats: 4,
            time_beat_type: 4,
            character: vec![1],
            genre: vec![2],
            for_rhythm: false,
            for_chord: true,
            for_timbre: false,
            parts: vec![PartEntry {
                timbre_bank: 0,
                figure_bank: FigureBank::Piano,
                figure_class: FigureClass::Chord,
                figures: vec![
                    figure(FormType::Prelude, 8, 0),
                    figure(FormType::Verse11, 8, 5),
                    figure(FormType::Chorus11, 8, 7),
                    figure(FormType::Ending, 4, 0),
                ],
            }],
        };
        let timbre_donor = SongEntry {
            key: 0,
            scale: 0,
            tempo: 120.0,
            time_beats: 4,
            time_beat_type: 4,
            character: vec![1],
            genre: vec![2],
            for_rhythm: false,
            for_chord: false,
            for_timbre: true,
            parts: vec![
                PartEntry {
                    timbre_bank: 0,
                    figure_bank: FigureBank::Piano,
                    figure_class: FigureClass::Chord,
                    figures: Vec::new(),
                },
                PartEntry {
                    timbre_bank: 128,
                    figure_bank: FigureBank::Drums,
                    figure_class: FigureClass::Chord,
                    figures: Vec::new(),
                },
            ],
        };
        KnowledgeBase::new(vec![chord_donor, timbre_donor]).unwrap()
    }

    fn request() -> CompositionRequest {
        CompositionRequest {
            form_template: 0,
            character: 1,
            genre: 2,
            beats: 4,
            seed: 1,
            chord_factor: None,
            timbre_factor: None,
        }
    }

    #[test]
    fn rejects_unsupported_meter() {
        let mut req = request();
        req.beats = 5;
        assert!(matches!(
            req.validate(),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn short_template_partitions_the_timeline() {
        let kb = corpus();
        let mut gen = ParameterGenerator::new();
        let params = gen.generate(&kb, &request(), &mut rng()).unwrap();

        assert_eq!(params.chains.len(), 5);
        let extents: Vec<(i32, i32)> = params
            .chains
            .iter()
            .map(|c| (c.form.begin, c.form.end))
            .collect();
        assert_eq!(extents, vec![(0, 1), (1, 9), (9, 17), (17, 25), (25, 29)]);
        let chord_lens: Vec<usize> = params.chains.iter().map(|c| c.chords.len()).collect();
        assert_eq!(chord_lens, vec![4, 32, 32, 32, 16]);
    }

    #[test]
    fn every_section_carries_one_chord_per_beat() {
        let kb = corpus();
        let mut gen = ParameterGenerator::new();
        let mut req = request();
        req.form_template = 2;
        let params = gen.generate(&kb, &req, &mut rng()).unwrap();
        for chain in &params.chains {
            assert_eq!(
                chain.chords.len() as i32,
                chain.form.bar_len() * params.beats,
                "section {:?}",
                chain.form.kind
            );
        }
    }

    #[test]
    fn sections_before_ending_cadence_on_the_tonic() {
        let kb = corpus();
        let mut gen = ParameterGenerator::new();
        let params = gen.generate(&kb, &request(), &mut rng()).unwrap();
        let tonic = ChordPair::new(params.key, params.scale);
        for pair in params.chains.windows(2) {
            if pair[1].form.kind.wants_preceding_cadence() {
                let chords = &pair[0].chords;
                let n = chords.len();
                assert_eq!(chords[n - 1], tonic);
                assert_eq!(chords[n - 2], tonic);
            }
        }
    }

    fn cadence_forms() -> Vec<StructureForm> {
        let mut verse = StructureForm::new(FormType::Verse11, 2);
        verse.end = 2;
        let mut ending = StructureForm::new(FormType::Ending, 2);
        ending.begin = 2;
        ending.end = 4;
        vec![verse, ending]
    }

    fn cadence_figure(chords: Vec<ChordPair>) -> FigureEntry {
        FigureEntry {
            segment: FormType::Verse11,
            begin: 0,
            end: 2,
            offset: 0,
            chords,
            notes: Vec::new(),
        }
    }

    #[test]
    fn repeated_chords_before_a_cadence_yield_four_tonic_beats() {
        // The whole last bar sits on one chord, so the cadence replaces
        // the final four beats.
        let figs = vec![cadence_figure(vec![ChordPair::new(7, 0); 8])];
        let chains = coordinate_chords(&cadence_forms(), &figs, 0, 0, &mut rng()).unwrap();
        let tonic = ChordPair::new(0, 0);
        assert_eq!(&chains[0].chords[4..], &[tonic; 4]);
        assert_eq!(&chains[0].chords[..4], &[ChordPair::new(7, 0); 4]);
    }

    #[test]
    fn changing_chords_before_a_cadence_yield_two_tonic_beats() {
        // The last bar alternates chords, so only the final two beats
        // cadence and the beats before them survive.
        let figs = vec![cadence_figure(
            (0..8)
                .map(|i| ChordPair::new(if i % 2 == 0 { 7 } else { 5 }, 0))
                .collect(),
        )];
        let chains = coordinate_chords(&cadence_forms(), &figs, 0, 0, &mut rng()).unwrap();
        let tonic = ChordPair::new(0, 0);
        let chords = &chains[0].chords;
        assert_eq!(chords[7], tonic);
        assert_eq!(chords[6], tonic);
        assert_eq!(chords[5], ChordPair::new(5, 0));
        assert_eq!(chords[4], ChordPair::new(7, 0));
    }

    #[test]
    fn blank_lead_in_repeats_the_opening_chord() {
        let kb = corpus();
        let mut gen = ParameterGenerator::new();
        let params = gen.generate(&kb, &request(), &mut rng()).unwrap();
        let opening = params.chains[1].chords[0];
        assert_eq!(params.chains[0].chords, vec![opening; 4]);
    }

    #[test]
    fn key_scale_tempo_come_from_the_harmony_donor() {
        let kb = corpus();
        let mut gen = ParameterGenerator::new();
        let params = gen.generate(&kb, &request(), &mut rng()).unwrap();
        assert_eq!(params.chord_entry, 0);
        assert_eq!(params.key, 0);
        assert_eq!(params.scale, 0);
        assert_eq!(params.tempo, 96.0);
    }

    #[test]
    fn lead_track_heads_the_layout() {
        let kb = corpus();
        let mut gen = ParameterGenerator::new();
        let params = gen.generate(&kb, &request(), &mut rng()).unwrap();
        assert_eq!(params.layout[0].figure_bank, FigureBank::Melody);
        assert_eq!(params.layout[0].figure_class, FigureClass::Solo);
        assert!(params.layout.len() >= 2);
    }

    #[test]
    fn beat_remap_4_to_3_keeps_third_of_each_group() {
        let src: Vec<ChordPair> = (0..32).map(|i| ChordPair::new(i % 12, 0)).collect();
        let dst = remap_beats_4_to_3(&src);
        assert_eq!(dst.len(), 24);
        for (group, triple) in dst.chunks(3).enumerate() {
            let expected = src[group * 4 + 2];
            assert!(triple.iter().all(|&c| c == expected));
        }
    }

    #[test]
    fn three_beat_request_converts_every_section() {
        let kb = corpus();
        let mut gen = ParameterGenerator::new();
        let mut req = request();
        req.beats = 3;
        let params = gen.generate(&kb, &req, &mut rng()).unwrap();
        for chain in &params.chains {
            assert_eq!(chain.chords.len() as i32, chain.form.bar_len() * 3);
        }
    }

    #[test]
    fn consecutive_requests_avoid_the_same_donor() {
        let chord_a = {
            let mut donor = corpus().entry(0).clone();
            donor.tempo = 100.0;
            donor
        };
        let mut entries = vec![
            chord_a,
            corpus().entry(0).clone(),
            corpus().entry(1).clone(),
            corpus().entry(1).clone(),
        ];
        entries[1].tempo = 101.0;
        entries[3].tempo = 121.0;
        let kb = KnowledgeBase::new(entries).unwrap();

        let mut gen = ParameterGenerator::new();
        let mut r = rng();
        let first = gen.generate(&kb, &request(), &mut r).unwrap();
        let second = gen.generate(&kb, &request(), &mut r).unwrap();
        assert_ne!(first.chord_entry, second.chord_entry);
    }

    #[test]
    fn chord_factor_steers_the_donor_pick() {
        let mut entries = Vec::new();
        for i in 0..4 {
            let mut donor = corpus().entry(0).clone();
            donor.tempo = 90.0 + i as f32;
            entries.push(donor);
        }
        entries.push(corpus().entry(1).clone());
        let kb = KnowledgeBase::new(entries).unwrap();

        let mut gen = ParameterGenerator::new();
        let mut req = request();
        req.chord_factor = Some(0.0);
        let params = gen.generate(&kb, &req, &mut rng()).unwrap();
        assert_eq!(params.chord_entry, 0);
    }
}
