//! Percussion: drum figures carry no harmony, so the source notes pass
//! through untouched in 4/4 and are re-windowed beat by beat for 3/4.

use crate::knowledge::entry::{PitchNote, TICKS_PER_BEAT};
use crate::model::ModelInput;

pub fn generate(input: &ModelInput<'_>) -> Vec<PitchNote> {
    if input.beats == 4 {
        return input.src_notes.to_vec();
    }

    // 3/4: drop every third beat of each source group of four and close
    // the gaps, mirroring the chord-list conversion.
    let mut dst = Vec::new();
    let mut dropped = 0;
    for i in 0..(input.dst_bars * 4) {
        if i % 4 == 2 {
            dropped += 1;
            continue;
        }
        let from = if i == 0 {
            0
        } else {
            TICKS_PER_BEAT * (i + input.dst_offset)
        };
        let to = TICKS_PER_BEAT * (i + input.dst_offset + 1);
        let shift = TICKS_PER_BEAT * dropped;
        for note in input.src_notes {
            if from <= note.start && note.start < to {
                dst.push(PitchNote::new(
                    note.pitch,
                    note.velocity,
                    note.start - shift,
                    note.end - shift,
                ));
            }
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::entry::{ChordPair, FigureBank};
    use crate::theory::structure::FormType;

    fn input<'a>(
        chords: &'a [ChordPair],
        notes: &'a [PitchNote],
        beats: i32,
    ) -> ModelInput<'a> {
        ModelInput {
            src_figure_bank: FigureBank::Drums,
            src_chords: chords,
            src_notes: notes,
            form_kind: FormType::Verse11,
            dst_chords: chords,
            dst_offset: 0,
            dst_bars: 1,
            src_key: 0,
            key: 0,
            scale: 0,
            beats,
        }
    }

    #[test]
    fn four_beats_is_identity() {
        let chords = vec![ChordPair::new(0, 0); 4];
        let notes: Vec<PitchNote> = (0..4)
            .map(|i| PitchNote::new(36, 100, i * 16, i * 16 + 8))
            .collect();
        assert_eq!(generate(&input(&chords, &notes, 4)), notes);
    }

    #[test]
    fn three_beats_drops_the_third_beat_and_closes_gaps() {
        let chords = vec![ChordPair::new(0, 0); 4];
        let notes: Vec<PitchNote> = (0..4)
            .map(|i| PitchNote::new(36, 100, i * 16, i * 16 + 8))
            .collect();
        let out = generate(&input(&chords, &notes, 3));
        assert_eq!(out.len(), 3);
        let starts: Vec<i32> = out.iter().map(|n| n.start).collect();
        assert_eq!(starts, vec![0, 16, 32]);
    }
}
