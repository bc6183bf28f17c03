//! Solo lines (lead melody and instrumental solos).
//!
//! A solo is built in three stages: the section's notes are re-timed onto
//! a rhythm skeleton borrowed from the rhythm donor, harmonically
//! remapped onto the target progression, then smoothed so the line moves
//! in steps, resolves strong beats onto chord tones, and cadences onto
//! the tonic.

use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};
use crate::knowledge::entry::{ChordPair, FigureEntry, PitchNote, TICKS_PER_BEAT};
use crate::model::ModelInput;
use crate::select;
use crate::theory::harmony::{
    floor_mod, pitch_get_in_chord, pitch_get_in_octave_1, pitch_get_in_scale, pitch_is_in_chord,
    transform_figure_chord,
};
use crate::theory::structure::{pick_figure, stretch_figure_sequence};

/// Generate a solo line for one section.
///
/// `scan_nonempty` selects the instrumental variant: each rhythm-donor
/// part nominates its best figure for the section's role, and the first
/// nominee with actual notes wins. The melody variant always takes the
/// first nominee.
pub fn generate(
    input: &ModelInput<'_>,
    rhythm_parts: &[&[FigureEntry]],
    scan_nonempty: bool,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<PitchNote>> {
    let mut candidates: Vec<&FigureEntry> = Vec::with_capacity(rhythm_parts.len());
    for figures in rhythm_parts {
        if !figures.is_empty() {
            candidates.push(pick_figure(input.form_kind, figures, rng));
        }
    }
    let Some(&first) = candidates.first() else {
        return Err(Error::CorpusExhausted {
            query: "solo rhythm figures",
        });
    };
    let current = if scan_nonempty {
        candidates
            .iter()
            .find(|f| !f.notes.is_empty())
            .copied()
            .unwrap_or(first)
    } else {
        first
    };

    let rhythm_barlen = current.bar_len();
    let new_offset = current.offset;

    let timed = apply_rhythm(
        input.src_notes,
        &current.notes,
        rhythm_barlen,
        input.dst_bars,
        input.src_chords,
        4,
    );
    let remapped = transform_figure_chord(
        input.src_key,
        input.src_chords,
        &timed,
        input.dst_bars,
        input.key,
        input.dst_chords,
        input.scale,
        new_offset,
        input.beats,
        4,
    )?;
    Ok(smooth_line(
        &remapped,
        input.dst_bars,
        new_offset,
        input.dst_chords,
        input.key,
        input.scale,
        input.beats,
        rng,
    ))
}

/// Re-time the section's pitch material onto a rhythm skeleton.
///
/// Bar by bar, each rhythm note adopts a pitch from the pitch notes
/// overlapping it: a lone candidate directly, several candidates by
/// favoring in-chord pitches nearest the bar's average. A rhythm note
/// with no candidates (and the last of each bar) takes the bar's final
/// source pitch.
pub fn apply_rhythm(
    src_notes: &[PitchNote],
    rhythm_notes: &[PitchNote],
    rhythm_barlen: i32,
    dst_barlen: i32,
    chords: &[ChordPair],
    beats: i32,
) -> Vec<PitchNote> {
    let rhythm = if rhythm_barlen != dst_barlen {
        stretch_figure_sequence(rhythm_notes, rhythm_barlen, dst_barlen, beats)
    } else {
        rhythm_notes.to_vec()
    };

    let mut dst = Vec::new();
    for bar in 0..dst_barlen {
        let bar_start = bar * TICKS_PER_BEAT * beats;
        let bar_end = (bar + 1) * TICKS_PER_BEAT * beats;

        let pitch_window: Vec<PitchNote> = src_notes
            .iter()
            .filter(|n| bar_start <= n.start && n.start < bar_end)
            .copied()
            .collect();
        let mut rhythm_window: Vec<PitchNote> = rhythm
            .iter()
            .filter(|n| bar_start <= n.start && n.start < bar_end)
            .copied()
            .collect();

        let window_len = rhythm_window.len();
        for (j, slot) in rhythm_window.iter_mut().enumerate() {
            let candidates: Vec<PitchNote> = pitch_window
                .iter()
                .filter(|p| p.end > slot.start || slot.end < p.start)
                .copied()
                .collect();

            if !candidates.is_empty() {
                if candidates.len() == 1 {
                    slot.pitch = candidates[0].pitch;
                } else {
                    let chord = &chords[(bar as usize).min(chords.len() - 1)];
                    let mut in_chord: Vec<usize> = Vec::new();
                    let mut pitch_sum = 0i32;
                    for (k, candidate) in candidates.iter().enumerate() {
                        if pitch_is_in_chord(candidate.pitch as i32, chord) {
                            in_chord.push(k);
                        }
                        pitch_sum += candidate.pitch as i32;
                    }
                    let avg_pitch = (pitch_sum as f32 / candidates.len() as f32) as i32;

                    slot.pitch = match in_chord.len() {
                        1 => candidates[in_chord[0]].pitch,
                        n if n > 1 => nearest_pitch(
                            in_chord.iter().map(|&k| candidates[k].pitch),
                            avg_pitch,
                        ),
                        _ => nearest_pitch(candidates.iter().map(|c| c.pitch), avg_pitch),
                    };
                }
            }
            if (candidates.is_empty() || j == window_len - 1) && !pitch_window.is_empty() {
                slot.pitch = pitch_window[pitch_window.len() - 1].pitch;
            }
        }
        dst.extend_from_slice(&rhythm_window);
    }
    dst
}

fn nearest_pitch(pitches: impl Iterator<Item = u8>, target: i32) -> u8 {
    let mut best = target.clamp(0, 127) as u8;
    let mut best_distance = 129;
    for pitch in pitches {
        let distance = (pitch as i32 - target).abs();
        if distance < best_distance {
            best_distance = distance;
            best = pitch;
        }
    }
    best
}

/// Melodic smoothing over two-bar windows.
///
/// Weak-beat notes between two neighbors get stepwise motion, random
/// variety when the line flattens, and spike suppression; strong-beat
/// notes resolve onto the underlying chord; each window's final note
/// resolves onto its last chord, forced to the root at a final cadence on
/// the tonic.
#[allow(clippy::too_many_arguments)]
fn smooth_line(
    src: &[PitchNote],
    barlen: i32,
    offset: i32,
    chords: &[ChordPair],
    key: i32,
    scale: i32,
    beats: i32,
    rng: &mut ChaCha8Rng,
) -> Vec<PitchNote> {
    let offset_ticks = offset * TICKS_PER_BEAT;
    let avg_pitch = if src.is_empty() {
        0
    } else {
        (src.iter().map(|n| n.pitch as i32).sum::<i32>() as f32 / src.len() as f32) as i32
    };

    let mut dst: Vec<PitchNote> = Vec::new();
    let mut n = 0;
    while n < barlen {
        let window_start = n * TICKS_PER_BEAT * beats;
        let window_end = (n + 2) * TICKS_PER_BEAT * beats;

        // Clamp overlaps against the window edge and the next note.
        let mut window: Vec<PitchNote> = Vec::new();
        for (j, note) in src.iter().enumerate() {
            if !(window_start <= note.start && note.start < window_end) {
                continue;
            }
            let mut clamped = *note;
            if clamped.end > window_end {
                clamped.end = window_end;
            }
            if let Some(next) = src.get(j + 1) {
                if clamped.end > next.start {
                    clamped.end = next.start;
                }
            }
            if clamped.start < clamped.end {
                window.push(clamped);
            }
        }
        if window.is_empty() {
            n += 2;
            continue;
        }

        if avg_pitch != 0 {
            for note in &mut window {
                note.pitch = pitch_get_in_octave_1(note.pitch as i32, avg_pitch).clamp(0, 127) as u8;
            }
        }
        dst.push(window[0]);

        let window_span_quarter =
            (window[window.len() - 1].end - window[0].start) / 4 + window[0].start;

        for i in 1..window.len().saturating_sub(1) {
            let pre = window[i - 1];
            let cur = window[i];
            let next = window[i + 1];
            let (pre_pitch, cur_pitch, next_pitch) =
                (pre.pitch as i32, cur.pitch as i32, next.pitch as i32);

            let beat_phase = floor_mod(cur.start - offset_ticks, 32);
            let is_strong =
                (cur.start >= offset_ticks && beat_phase < 2) || beat_phase > 30;

            if !is_strong {
                let tight_left = (pre.end - cur.start).abs() <= 4;
                let tight_right = (cur.end - next.start).abs() <= 4;
                let leap = (next_pitch - pre_pitch).abs();

                if tight_left
                    && tight_right
                    && (3..=4).contains(&leap)
                    && pre.end - pre.start >= cur.end - cur.start
                    && next.end - next.start >= cur.end - cur.start
                {
                    // Fill a third with a passing tone.
                    let step = if next_pitch > pre_pitch { 1 } else { -1 };
                    window[i].pitch =
                        pitch_get_in_scale(pre_pitch, step, key, scale).clamp(0, 127) as u8;
                } else if tight_left
                    && tight_right
                    && next_pitch == pre_pitch
                    && next_pitch == cur_pitch
                    && (cur.start > window_span_quarter || select::random_index(rng, 101) < 50)
                {
                    // Break up a flat stretch.
                    let step = if (avg_pitch - cur_pitch).abs() > 5 {
                        if cur_pitch < avg_pitch {
                            1
                        } else {
                            -1
                        }
                    } else if select::random_index(rng, 101) < 50 {
                        -1
                    } else {
                        1
                    };
                    window[i].pitch =
                        pitch_get_in_scale(pre_pitch, step, key, scale).clamp(0, 127) as u8;
                } else if (pre.end - cur.start).abs() < 4
                    && (cur.end - next.start).abs() < 4
                    && ((cur_pitch - next_pitch > 4 && cur_pitch - pre_pitch > 4)
                        || (next_pitch - cur_pitch > 4 && pre_pitch - cur_pitch > 4))
                {
                    // Pull an isolated spike back toward its neighbors.
                    let p = window[i].pitch as i32;
                    if p - pre_pitch.max(next_pitch) > 4 {
                        window[i].pitch =
                            pitch_get_in_scale(p, -2, key, scale).clamp(0, 127) as u8;
                    }
                    let p = window[i].pitch as i32;
                    if p - pre_pitch.min(next_pitch) < -4 {
                        window[i].pitch =
                            pitch_get_in_scale(p, 2, key, scale).clamp(0, 127) as u8;
                    }
                }
            } else {
                let chord_index = ((cur.start - offset_ticks) / TICKS_PER_BEAT)
                    .clamp(0, chords.len() as i32 - 1) as usize;
                let chord = &chords[chord_index];
                let mut p = pitch_get_in_chord(cur_pitch, chord, None, 128);
                if p - pre_pitch > 4 {
                    p = pitch_get_in_scale(p, -2, key, scale);
                } else if p - pre_pitch < -4 {
                    p = pitch_get_in_scale(p, 2, key, scale);
                }
                window[i].pitch = p.clamp(0, 127) as u8;
            }

            // A weak note hanging out of key next to an out-of-key
            // neighbor steps off the previous pitch instead.
            let cur_pitch = window[i].pitch as i32;
            let tonic = ChordPair::new(key, scale);
            if !is_strong
                && (pre.end - window[i].start).abs() < 4
                && (window[i].end - next.start).abs() < 4
                && !pitch_is_in_chord(cur_pitch, &tonic)
                && !pitch_is_in_chord(pre_pitch, &tonic)
            {
                let step = if cur_pitch < avg_pitch { 1 } else { -1 };
                window[i].pitch =
                    pitch_get_in_scale(pre_pitch, step, key, scale).clamp(0, 127) as u8;
            }
            dst.push(window[i]);
        }

        if window.len() > 1 {
            let last = window.len() - 1;
            let last_chord_index =
                (((n + 2) * beats - 1) as usize).min(chords.len().saturating_sub(1));
            let last_chord = &chords[last_chord_index];
            let pitch = window[last].pitch as i32;
            let resolved = if n + 2 >= barlen && window.len() > 2 && key == last_chord.root {
                // Final cadence on the tonic lands on the chord root.
                pitch_get_in_chord(pitch, last_chord, Some(0), avg_pitch)
            } else {
                pitch_get_in_chord(pitch, last_chord, None, 128)
            };
            window[last].pitch = resolved.clamp(0, 127) as u8;
            dst.push(window[last]);
        }
        n += 2;
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::entry::FigureBank;
    use crate::theory::structure::FormType;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(5)
    }

    fn note(pitch: u8, start: i32, end: i32) -> PitchNote {
        PitchNote::new(pitch, 90, start, end)
    }

    #[test]
    fn rhythm_slots_adopt_single_candidate_pitch() {
        let chords = vec![ChordPair::new(0, 0); 4];
        let src = vec![note(64, 0, 8)];
        let rhythm = vec![note(1, 0, 16), note(1, 16, 32)];
        let out = apply_rhythm(&src, &rhythm, 1, 1, &chords, 4);
        assert_eq!(out.len(), 2);
        // Both slots resolve to the only pitch around (the second via the
        // bar-final rule).
        assert!(out.iter().all(|n| n.pitch == 64));
        // Timing comes from the rhythm, not the source.
        assert_eq!(out[0].start, 0);
        assert_eq!(out[1].start, 16);
    }

    #[test]
    fn rhythm_prefers_in_chord_pitches() {
        let chords = vec![ChordPair::new(0, 0); 4];
        // Two overlapping candidates: D (out of chord) and E (in chord).
        let src = vec![note(62, 0, 64), note(64, 0, 64)];
        let rhythm = vec![note(1, 0, 16), note(1, 16, 32)];
        let out = apply_rhythm(&src, &rhythm, 1, 1, &chords, 4);
        assert_eq!(out[0].pitch, 64);
    }

    #[test]
    fn rhythm_is_stretched_to_the_section() {
        let chords = vec![ChordPair::new(0, 0); 8];
        let src = vec![note(60, 0, 8), note(60, 64, 72)];
        let rhythm = vec![note(1, 0, 16)];
        // 1-bar rhythm over a 2-bar section: the skeleton repeats.
        let out = apply_rhythm(&src, &rhythm, 1, 2, &chords, 4);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].start, 64);
    }

    #[test]
    fn empty_rhythm_bank_is_reported() {
        let chords = vec![ChordPair::new(0, 0); 4];
        let notes = vec![note(60, 0, 16)];
        let input = ModelInput {
            src_figure_bank: FigureBank::Melody,
            src_chords: &chords,
            src_notes: &notes,
            form_kind: FormType::Verse11,
            dst_chords: &chords,
            dst_offset: 0,
            dst_bars: 1,
            src_key: 0,
            key: 0,
            scale: 0,
            beats: 4,
        };
        let result = generate(&input, &[], false, &mut rng());
        assert!(matches!(result, Err(Error::CorpusExhausted { .. })));
    }

    #[test]
    fn generate_produces_notes_from_rhythm_and_pitches() {
        let chords = vec![ChordPair::new(0, 0); 8];
        let src: Vec<PitchNote> = (0..8)
            .map(|i| note(60 + (i % 3) as u8 * 2, i * 16, i * 16 + 12))
            .collect();
        let rhythm_figures = vec![FigureEntry {
            segment: FormType::Verse11,
            begin: 0,
            end: 2,
            offset: 0,
            chords: vec![ChordPair::new(0, 0); 8],
            notes: (0..8).map(|i| note(1, i * 16, i * 16 + 12)).collect(),
        }];
        let input = ModelInput {
            src_figure_bank: FigureBank::Melody,
            src_chords: &chords,
            src_notes: &src,
            form_kind: FormType::Verse11,
            dst_chords: &chords,
            dst_offset: 0,
            dst_bars: 2,
            src_key: 0,
            key: 0,
            scale: 0,
            beats: 4,
        };
        let out = generate(&input, &[rhythm_figures.as_slice()], false, &mut rng()).unwrap();
        assert!(!out.is_empty());
        // Everything lands inside the 2-bar section.
        assert!(out.iter().all(|n| n.start >= 0 && n.end <= 128));
        assert!(out.iter().all(|n| n.pitch >= 48 && n.pitch <= 84));
    }

    #[test]
    fn smoothing_preserves_note_count_per_window() {
        // Three clean quarter notes in one window: first kept, middle
        // smoothed, last resolved onto the chord. Count is unchanged.
        let chords = vec![ChordPair::new(0, 0); 8];
        let src = vec![note(60, 0, 14), note(62, 16, 30), note(64, 32, 46)];
        let out = smooth_line(&src, 2, 0, &chords, 0, 0, 4, &mut rng());
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].start, 0);
        assert_eq!(out[2].start, 32);
    }
}
