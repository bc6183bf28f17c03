//! Song-structure vocabulary: section roles, whole-song form templates,
//! the replacement ladder for missing sections, and the bar-count
//! stretching applied when a recorded fragment is re-used at a different
//! length.

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::knowledge::entry::{ChordPair, FigureEntry, PitchNote, TICKS_PER_BEAT};
use crate::select;

/// Structural role of a section. The vocabulary is closed; corpus figures
/// and template slots both use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormType {
    Blank,
    Prelude,
    Verse11,
    Verse12,
    Bridge1,
    Chorus11,
    Chorus12,
    Interlude1,
    Interlude2,
    Verse21,
    Verse22,
    Chorus21,
    Chorus22,
    Ending,
    Verse13,
    Verse23,
    Verse31,
    Verse32,
    Verse33,
    Chorus31,
    Chorus32,
    Bridge2,
    Trans1,
    Trans2,
    Trans3,
    Bridge3,
}

impl FormType {
    /// Ordered stand-in roles tried when no figure of this exact role
    /// exists in a source part. First match wins.
    pub fn replacements(self) -> &'static [FormType] {
        use FormType::*;
        match self {
            Blank => &[Verse11, Blank],
            Prelude => &[Interlude1],
            Verse11 => &[Prelude],
            Verse12 => &[Verse11, Prelude],
            Bridge1 => &[Verse11, Prelude],
            Chorus11 => &[Verse11, Bridge1],
            Chorus12 => &[Chorus11, Verse11, Bridge1],
            Interlude1 => &[Prelude, Verse11, Bridge1, Chorus11],
            Interlude2 => &[Interlude1, Prelude, Verse11, Bridge1, Chorus11],
            Verse21 => &[Verse11, Verse12],
            Verse22 => &[Verse12, Verse11],
            Chorus21 => &[Chorus11, Chorus12],
            Chorus22 => &[Chorus21, Chorus12, Chorus11],
            Ending => &[Prelude, Interlude1, Interlude2],
            Verse13 => &[Verse11, Verse12],
            Verse23 => &[Verse13, Verse11, Verse12],
            Verse31 => &[Verse21, Verse11, Verse12],
            Verse32 => &[Verse22, Verse31, Verse12, Verse11],
            Verse33 => &[Verse23, Ending, Verse11, Verse12],
            Chorus31 => &[Chorus21, Chorus11, Chorus12],
            Chorus32 => &[Chorus22, Chorus12, Chorus11],
            Bridge2 => &[Bridge1, Verse11, Prelude],
            Trans1 => &[Verse12, Verse11],
            Trans2 => &[Trans1, Verse22, Verse21, Verse12, Verse11],
            Trans3 => &[Trans2, Verse32, Verse31, Verse12, Verse11],
            Bridge3 => &[Bridge2, Bridge1, Verse11, Prelude],
        }
    }

    /// True for the section roles that close a phrase and therefore force
    /// a cadence onto the section preceding them.
    pub fn wants_preceding_cadence(self) -> bool {
        matches!(self, FormType::Ending | FormType::Interlude1 | FormType::Interlude2)
    }
}

/// One slot of a resolved song structure: a role with its bar extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureForm {
    pub kind: FormType,
    pub bars: i32,
    /// First bar of this section within the song.
    pub begin: i32,
    /// One past the last bar.
    pub end: i32,
}

impl StructureForm {
    pub fn new(kind: FormType, bars: i32) -> Self {
        Self {
            kind,
            bars,
            begin: 0,
            end: 0,
        }
    }

    pub fn bar_len(&self) -> i32 {
        self.end - self.begin
    }
}

/// The fixed catalogue of whole-song structures, from a short
/// prelude/verse/chorus song up to a three-verse arrangement.
const FORM_TEMPLATES: [&[(FormType, i32)]; 8] = [
    &[
        (FormType::Blank, 1),
        (FormType::Prelude, 8),
        (FormType::Verse11, 8),
        (FormType::Chorus11, 8),
        (FormType::Ending, 4),
    ],
    &[
        (FormType::Blank, 1),
        (FormType::Prelude, 8),
        (FormType::Verse11, 8),
        (FormType::Verse12, 8),
        (FormType::Chorus11, 8),
        (FormType::Chorus12, 8),
        (FormType::Ending, 4),
    ],
    &[
        (FormType::Blank, 1),
        (FormType::Prelude, 8),
        (FormType::Verse11, 8),
        (FormType::Verse12, 8),
        (FormType::Chorus11, 8),
        (FormType::Chorus12, 8),
        (FormType::Interlude1, 8),
        (FormType::Verse21, 8),
        (FormType::Chorus21, 8),
        (FormType::Ending, 4),
    ],
    &[
        (FormType::Blank, 1),
        (FormType::Prelude, 8),
        (FormType::Verse11, 8),
        (FormType::Chorus11, 8),
        (FormType::Verse12, 8),
        (FormType::Interlude1, 8),
        (FormType::Verse21, 8),
        (FormType::Chorus21, 8),
        (FormType::Verse22, 8),
        (FormType::Ending, 4),
    ],
    &[
        (FormType::Blank, 1),
        (FormType::Prelude, 8),
        (FormType::Verse11, 8),
        (FormType::Verse12, 8),
        (FormType::Trans1, 2),
        (FormType::Chorus11, 8),
        (FormType::Chorus12, 8),
        (FormType::Interlude1, 8),
        (FormType::Verse21, 8),
        (FormType::Trans2, 2),
        (FormType::Chorus21, 8),
        (FormType::Chorus22, 8),
        (FormType::Ending, 4),
    ],
    &[
        (FormType::Blank, 1),
        (FormType::Prelude, 8),
        (FormType::Verse11, 8),
        (FormType::Verse12, 8),
        (FormType::Trans1, 2),
        (FormType::Chorus11, 8),
        (FormType::Chorus12, 8),
        (FormType::Interlude1, 8),
        (FormType::Verse21, 8),
        (FormType::Trans2, 2),
        (FormType::Chorus21, 8),
        (FormType::Chorus22, 8),
        (FormType::Interlude2, 8),
        (FormType::Bridge1, 8),
        (FormType::Chorus31, 8),
        (FormType::Chorus32, 8),
        (FormType::Ending, 4),
    ],
    &[
        (FormType::Blank, 1),
        (FormType::Prelude, 8),
        (FormType::Verse11, 8),
        (FormType::Verse12, 8),
        (FormType::Bridge1, 8),
        (FormType::Chorus11, 8),
        (FormType::Chorus12, 8),
        (FormType::Interlude1, 8),
        (FormType::Verse21, 8),
        (FormType::Bridge2, 8),
        (FormType::Chorus21, 8),
        (FormType::Chorus22, 8),
        (FormType::Interlude2, 8),
        (FormType::Chorus31, 8),
        (FormType::Chorus32, 8),
        (FormType::Ending, 4),
    ],
    &[
        (FormType::Blank, 1),
        (FormType::Chorus11, 8),
        (FormType::Prelude, 8),
        (FormType::Verse11, 8),
        (FormType::Verse12, 8),
        (FormType::Bridge1, 8),
        (FormType::Trans1, 2),
        (FormType::Chorus11, 8),
        (FormType::Chorus12, 8),
        (FormType::Interlude1, 8),
        (FormType::Verse21, 8),
        (FormType::Verse22, 8),
        (FormType::Bridge2, 8),
        (FormType::Trans1, 2),
        (FormType::Chorus21, 8),
        (FormType::Chorus22, 8),
        (FormType::Interlude2, 8),
        (FormType::Verse31, 8),
        (FormType::Bridge3, 8),
        (FormType::Trans3, 2),
        (FormType::Chorus31, 8),
        (FormType::Chorus32, 8),
        (FormType::Verse32, 8),
        (FormType::Ending, 4),
    ],
];

/// Number of selectable form templates.
pub const FORM_TEMPLATE_COUNT: usize = FORM_TEMPLATES.len();

/// Materialize form template `id` as a section list. Bar extents
/// (`begin`/`end`) are left at zero; the parameter layer assigns them
/// after any lead-in insertion.
pub fn get_form_template(id: usize) -> Result<Vec<StructureForm>> {
    let template = FORM_TEMPLATES
        .get(id)
        .ok_or_else(|| Error::MalformedInput(format!("unknown form template {id}")))?;
    Ok(template
        .iter()
        .map(|&(kind, bars)| StructureForm::new(kind, bars))
        .collect())
}

/// Choose the source figure for a target section role.
///
/// Exact role match first, then the static replacement ladder in order,
/// then a uniform random figure. Never fails on a non-empty list.
pub fn pick_figure<'a>(
    kind: FormType,
    figures: &'a [FigureEntry],
    rng: &mut ChaCha8Rng,
) -> &'a FigureEntry {
    if let Some(found) = figures.iter().find(|f| f.segment == kind) {
        return found;
    }
    for &candidate in kind.replacements() {
        if let Some(found) = figures.iter().find(|f| f.segment == candidate) {
            return found;
        }
    }
    select::random_choice(rng, figures)
}

/// Stretch a per-beat chord list from `src_barlen` bars to `dst_barlen`.
///
/// Lengthening cyclically repeats the trailing bars of the source;
/// shortening removes a contiguous span from the middle of the list.
pub fn stretch_chord_sequence(
    src: &[ChordPair],
    src_barlen: i32,
    dst_barlen: i32,
    beats: i32,
) -> Vec<ChordPair> {
    if src.is_empty() || src_barlen == dst_barlen {
        return src.to_vec();
    }
    let bar_diff = (dst_barlen - src_barlen).abs();
    if src_barlen < dst_barlen {
        let mut dst = src.to_vec();
        let mut deficit = bar_diff;
        while deficit > 0 {
            let take = ((deficit * beats) as usize).min(src.len());
            dst.extend_from_slice(&src[src.len() - take..]);
            deficit = dst_barlen - dst.len() as i32 / beats;
        }
        dst
    } else {
        let cut_from = (src_barlen * beats / 2 - bar_diff * beats / 2) as usize;
        let cut_to = (src_barlen * beats / 2 + bar_diff * beats / 2) as usize;
        let mut dst = Vec::with_capacity(src.len() - (cut_to - cut_from));
        dst.extend_from_slice(&src[..cut_from.min(src.len())]);
        if cut_to < src.len() {
            dst.extend_from_slice(&src[cut_to..]);
        }
        dst
    }
}

/// Stretch a note list from `src_barlen` bars to `dst_barlen`.
///
/// Lengthening appends copies of the trailing source bars, re-timed past
/// the current end, until the target length is reached. Shortening drops
/// the notes of a middle span and shifts everything after it left.
pub fn stretch_figure_sequence(
    src: &[PitchNote],
    src_barlen: i32,
    dst_barlen: i32,
    beats: i32,
) -> Vec<PitchNote> {
    let mut dst = src.to_vec();
    let bar_diff = (dst_barlen - src_barlen).abs();
    if src_barlen < dst_barlen {
        if src_barlen <= 0 {
            return dst;
        }
        let mut cur_barlen = src_barlen;
        let mut deficit = bar_diff;
        while deficit > 0 {
            let need = deficit.min(src_barlen);
            let tail_start = (src_barlen - need) * beats * TICKS_PER_BEAT;
            let offset = cur_barlen * beats * TICKS_PER_BEAT;
            for note in src {
                if note.start >= tail_start {
                    dst.push(PitchNote::new(
                        note.pitch,
                        note.velocity,
                        note.start - tail_start + offset,
                        note.end - tail_start + offset,
                    ));
                }
            }
            cur_barlen += need;
            deficit = dst_barlen - cur_barlen;
        }
    } else if src_barlen > dst_barlen {
        let cut_from = (src_barlen - bar_diff) * beats / 2 * TICKS_PER_BEAT;
        let cut_to = (src_barlen + bar_diff) * beats / 2 * TICKS_PER_BEAT;
        let shift = bar_diff * beats * TICKS_PER_BEAT;
        dst.retain(|note| note.start < cut_from || note.start >= cut_to);
        for note in &mut dst {
            if note.start >= cut_to {
                note.start -= shift;
                note.end -= shift;
            }
        }
    }
    dst
}

/// Re-window a note list recorded on a 4-beat grid into 3-beat bars,
/// clamping every note end to its bar boundary so nothing bleeds across.
pub fn clip_to_three_beat_bars(figures: &[PitchNote], bars: i32) -> Vec<PitchNote> {
    let bar_ticks = 3 * TICKS_PER_BEAT;
    let mut dst = Vec::new();
    for bar in 0..bars {
        let from = bar * bar_ticks;
        let to = (bar + 1) * bar_ticks;
        for note in figures {
            if from <= note.start && note.start < to {
                dst.push(PitchNote::new(
                    note.pitch,
                    note.velocity,
                    note.start,
                    note.end.min(to),
                ));
            }
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn chord(root: i32) -> ChordPair {
        ChordPair::new(root, 0)
    }

    fn figure(segment: FormType) -> FigureEntry {
        FigureEntry {
            segment,
            begin: 0,
            end: 4,
            offset: 0,
            chords: vec![chord(0); 16],
            notes: Vec::new(),
        }
    }

    #[test]
    fn template_zero_is_the_short_song() {
        let forms = get_form_template(0).unwrap();
        let kinds: Vec<FormType> = forms.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FormType::Blank,
                FormType::Prelude,
                FormType::Verse11,
                FormType::Chorus11,
                FormType::Ending
            ]
        );
        let bars: Vec<i32> = forms.iter().map(|f| f.bars).collect();
        assert_eq!(bars, vec![1, 8, 8, 8, 4]);
    }

    #[test]
    fn unknown_template_id_is_rejected() {
        assert!(get_form_template(FORM_TEMPLATE_COUNT).is_err());
    }

    #[test]
    fn pick_figure_prefers_exact_match() {
        let figs = vec![figure(FormType::Prelude), figure(FormType::Chorus11)];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let picked = pick_figure(FormType::Chorus11, &figs, &mut rng);
        assert_eq!(picked.segment, FormType::Chorus11);
    }

    #[test]
    fn pick_figure_walks_replacement_ladder_in_order() {
        // Chorus12 replaces with [Chorus11, Verse11, Bridge1]; only Verse11
        // and Bridge1 are present, so Verse11 must win.
        let figs = vec![figure(FormType::Bridge1), figure(FormType::Verse11)];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let picked = pick_figure(FormType::Chorus12, &figs, &mut rng);
        assert_eq!(picked.segment, FormType::Verse11);
    }

    #[test]
    fn pick_figure_falls_back_to_random() {
        let figs = vec![figure(FormType::Trans1)];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let picked = pick_figure(FormType::Ending, &figs, &mut rng);
        assert_eq!(picked.segment, FormType::Trans1);
    }

    #[test]
    fn chord_stretch_lengthens_by_repeating_the_tail() {
        // 2 bars -> 4 bars at 4 beats: 8 chords -> 16, tail repeated.
        let src: Vec<ChordPair> = (0..8).map(chord).collect();
        let dst = stretch_chord_sequence(&src, 2, 4, 4);
        assert_eq!(dst.len(), 16);
        assert_eq!(&dst[..8], &src[..]);
        assert_eq!(&dst[8..], &src[..]);
    }

    #[test]
    fn chord_stretch_shortens_from_the_middle() {
        // 4 bars -> 2 bars: drop the middle 8 of 16 chords.
        let src: Vec<ChordPair> = (0..16).map(chord).collect();
        let dst = stretch_chord_sequence(&src, 4, 2, 4);
        assert_eq!(dst.len(), 8);
        let roots: Vec<i32> = dst.iter().map(|c| c.root).collect();
        assert_eq!(roots, vec![0, 1, 2, 3, 12, 13, 14, 15]);
    }

    #[test]
    fn chord_stretch_noop_when_lengths_match() {
        let src: Vec<ChordPair> = (0..8).map(chord).collect();
        assert_eq!(stretch_chord_sequence(&src, 2, 2, 4), src);
    }

    #[test]
    fn chord_stretch_survives_large_deficit() {
        // Deficit larger than the source: repeats the whole list instead of
        // indexing before its start.
        let src: Vec<ChordPair> = (0..4).map(chord).collect();
        let dst = stretch_chord_sequence(&src, 1, 4, 4);
        assert_eq!(dst.len(), 16);
    }

    #[test]
    fn figure_stretch_lengthens_past_current_end() {
        let src = vec![
            PitchNote::new(60, 90, 0, 32),
            PitchNote::new(64, 90, 64, 96),
        ];
        // 2 bars -> 3 bars at 4 beats (bar = 64 ticks): append bar 1 again.
        let dst = stretch_figure_sequence(&src, 2, 3, 4);
        assert_eq!(dst.len(), 3);
        assert_eq!(dst[2].pitch, 64);
        assert_eq!(dst[2].start, 128);
        assert_eq!(dst[2].end, 160);
    }

    #[test]
    fn figure_stretch_shortens_middle_span() {
        // 4 bars -> 2 bars: notes in bars 1..3 vanish, bar 3 shifts to bar 1.
        let src = vec![
            PitchNote::new(60, 90, 0, 16),
            PitchNote::new(62, 90, 64, 80),
            PitchNote::new(64, 90, 128, 144),
            PitchNote::new(65, 90, 192, 208),
        ];
        let dst = stretch_figure_sequence(&src, 4, 2, 4);
        assert_eq!(dst.len(), 2);
        assert_eq!(dst[0].pitch, 60);
        assert_eq!(dst[1].pitch, 65);
        assert_eq!(dst[1].start, 64);
    }

    #[test]
    fn three_beat_clip_clamps_note_ends() {
        // A note starting in 3/4 bar 0 (ticks 0..48) running long.
        let src = vec![PitchNote::new(60, 90, 40, 100)];
        let dst = clip_to_three_beat_bars(&src, 2);
        assert_eq!(dst.len(), 1);
        assert_eq!(dst[0].end, 48);
    }

    #[test]
    fn three_beat_clip_drops_notes_past_last_bar() {
        let src = vec![PitchNote::new(60, 90, 96, 112)];
        assert!(clip_to_three_beat_bars(&src, 2).is_empty());
    }
}
