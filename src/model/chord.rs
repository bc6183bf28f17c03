//! Chordal accompaniment: harmonic remap of the source figure, plus the
//! guitar strum treatment and the 3/4 re-windowing.

use crate::error::Result;
use crate::knowledge::entry::{FigureBank, PitchNote};
use crate::model::ModelInput;
use crate::theory::harmony::transform_figure_chord;
use crate::theory::structure::clip_to_three_beat_bars;

pub fn generate(input: &ModelInput<'_>) -> Result<Vec<PitchNote>> {
    let remapped = transform_figure_chord(
        input.src_key,
        input.src_chords,
        input.src_notes,
        input.dst_bars,
        input.key,
        input.dst_chords,
        input.scale,
        0,
        input.beats,
        4,
    )?;

    let guitar = input.src_figure_bank == FigureBank::Guitar;
    Ok(match (input.beats, guitar) {
        (3, true) => decluster_strums(&clip_to_three_beat_bars(&remapped, input.dst_bars)),
        (_, true) => decluster_strums(&remapped),
        (3, false) => clip_to_three_beat_bars(&remapped, input.dst_bars),
        _ => remapped,
    })
}

/// Spread simultaneous guitar notes into a strum: runs of 3 to 6 notes
/// sharing a start tick are sorted by pitch and staggered by one tick per
/// pair.
fn decluster_strums(src: &[PitchNote]) -> Vec<PitchNote> {
    let mut dst: Vec<PitchNote> = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < src.len() {
        let start = src[i].start;
        let mut run_end = i + 1;
        while run_end < src.len() && src[run_end].start == start {
            run_end += 1;
        }
        let mut cluster: Vec<PitchNote> = src[i..run_end].to_vec();
        if cluster.len() > 2 && cluster.len() <= 6 {
            cluster.sort_by_key(|n| n.pitch);
            for (k, note) in cluster.iter_mut().enumerate() {
                note.start += (k / 2) as i32;
            }
        }
        dst.extend_from_slice(&cluster);
        i = run_end;
    }
    dst
}
