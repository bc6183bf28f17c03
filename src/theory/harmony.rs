//! Harmonic arithmetic: chord and scale component tables, in-key and
//! in-chord tests, nearest-pitch mapping, and the beat-by-beat harmonic
//! remap that re-targets a recorded fragment onto a new chord progression.
//!
//! All pitch math is integer semitones; the two-octave scale tables give
//! enough headroom for the degree offsets the smoothing passes ask for.

use std::fmt;

use crate::error::{Error, Result};
use crate::knowledge::entry::{ChordPair, PitchNote, CHORD_SIGN_COUNT, TICKS_PER_BEAT};

const KEY_NAMES: [&str; 12] = [
    "C", "#C", "D", "#D", "E", "F", "#F", "G", "#G", "A", "#A", "B",
];

const CHORD_SIGN_NAMES: [&str; CHORD_SIGN_COUNT] = [
    "", "m", "m7", "7", "M7", "aug", "dim", "dim7", "sus2", "sus4", "7sus4", "6sus4", "6", "m6",
    "-5", "+5", "M7+5", "m-5", "7-5", "7+5",
];

/// Semitone offsets of the four component pitches of each chord quality.
const CHORD_COMPONENT: [[i32; 4]; CHORD_SIGN_COUNT] = [
    [0, 4, 7, 12],  //
    [0, 3, 7, 12],  // m
    [0, 3, 7, 10],  // m7
    [0, 4, 7, 10],  // 7
    [0, 4, 7, 11],  // M7
    [0, 4, 8, 12],  // aug
    [0, 3, 6, 12],  // dim
    [0, 3, 6, 9],   // dim7
    [0, 2, 7, 12],  // sus2
    [0, 5, 7, 12],  // sus4
    [0, 5, 7, 10],  // 7sus4
    [0, 5, 7, 9],   // 6sus4
    [0, 4, 7, 9],   // 6
    [0, 3, 7, 9],   // m6
    [0, 4, 6, 12],  // -5
    [0, 4, 8, 12],  // +5
    [0, 4, 8, 11],  // M7+5
    [0, 3, 6, 12],  // m-5
    [0, 4, 6, 10],  // 7-5
    [0, 4, 8, 10],  // 7+5
];

/// Number of supported scales (major, minor).
pub const SCALE_COUNT: usize = 2;

const SCALE_NAMES: [&str; SCALE_COUNT] = ["Major", "Minor"];

/// Two octaves of scale degrees per scale, in semitones from the key root.
const SCALE_DEGREE_COUNT: usize = 14;
const SCALE_COMPONENT: [[i32; SCALE_DEGREE_COUNT]; SCALE_COUNT] = [
    [0, 2, 4, 5, 7, 9, 11, 12, 14, 16, 17, 19, 21, 23],
    [0, 2, 3, 5, 7, 8, 10, 12, 14, 15, 17, 19, 20, 22],
];

/// The diatonic `(root offset, quality)` pairs of each scale; a chord is
/// in-key exactly when its shape appears here.
const NATURAL_CHORDS: [[(i32, i32); 10]; SCALE_COUNT] = [
    [
        (0, 0),
        (2, 1),
        (2, 2),
        (4, 1),
        (4, 2),
        (5, 0),
        (7, 0),
        (9, 1),
        (9, 2),
        (7, 3),
    ],
    [
        (0, 1),
        (0, 2),
        (10, 3),
        (3, 0),
        (5, 1),
        (5, 2),
        (7, 1),
        (7, 2),
        (8, 0),
        (10, 0),
    ],
];

/// Mathematical modulo: result always in `[0, b)` for positive `b`.
pub(crate) fn floor_mod(a: i32, b: i32) -> i32 {
    ((a % b) + b) % b
}

fn components(sign: i32) -> &'static [i32; 4] {
    // Signs are range-checked at corpus load; anything else collapses to
    // the plain triad rather than indexing out of the table.
    CHORD_COMPONENT
        .get(sign as usize)
        .unwrap_or(&CHORD_COMPONENT[0])
}

impl fmt::Display for ChordPair {
    /// Standard chord symbol, e.g. `C`, `#Fm7`. Out-of-range fields print
    /// as `null`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if (0..12).contains(&self.root) && (0..CHORD_SIGN_COUNT as i32).contains(&self.sign) {
            write!(
                f,
                "{}{}",
                KEY_NAMES[self.root as usize], CHORD_SIGN_NAMES[self.sign as usize]
            )
        } else {
            write!(f, "null")
        }
    }
}

/// Display name of a key root, or `null` when out of range.
pub fn key_name(key: i32) -> &'static str {
    if (0..12).contains(&key) {
        KEY_NAMES[key as usize]
    } else {
        "null"
    }
}

/// Display name of a scale, or `null` when out of range.
pub fn scale_name(scale: i32) -> &'static str {
    if (0..SCALE_COUNT as i32).contains(&scale) {
        SCALE_NAMES[scale as usize]
    } else {
        "null"
    }
}

/// Scale-degree index (0..14) of a chord root relative to a key. A root
/// not on any degree resolves to the nearest degree below the first one
/// above it.
pub fn chord_degree(key: i32, chord_root: i32, scale: i32) -> usize {
    let degrees = &SCALE_COMPONENT[scale as usize];
    let offset = floor_mod(chord_root - key, 12);
    for (i, &d) in degrees.iter().enumerate() {
        if offset == d {
            return i;
        }
    }
    let mut i = 0;
    while i < SCALE_DEGREE_COUNT - 1 {
        if !(offset > degrees[i] && degrees[i] < 12) {
            break;
        }
        i += 1;
    }
    i
}

/// Whether a chord is diatonic to the given key and scale.
pub fn chord_is_in_key(chord: &ChordPair, key: i32, scale: i32) -> bool {
    if !(0..SCALE_COUNT as i32).contains(&scale) {
        return false;
    }
    let offset = floor_mod(chord.root - key, 12);
    NATURAL_CHORDS[scale as usize]
        .iter()
        .any(|&(root, sign)| root == offset && sign == chord.sign)
}

/// Whether a pitch lands on one of the chord's component pitches.
pub fn pitch_is_in_chord(pitch: i32, chord: &ChordPair) -> bool {
    let offset = floor_mod(pitch - chord.root, 12);
    components(chord.sign).contains(&offset)
}

/// Nearest in-scale pitch, shifted by `diff_tone` scale degrees.
///
/// An out-of-scale input first snaps to a neighboring degree (direction
/// chosen by the sign of `diff_tone`), then the degree offset is applied
/// with octave wrapping.
pub fn pitch_get_in_scale(pitch: i32, diff_tone: i32, key: i32, scale: i32) -> i32 {
    let degrees = &SCALE_COMPONENT[scale as usize];
    let count = SCALE_DEGREE_COUNT as i32;

    let mut pitch_offset = floor_mod(pitch - key, 12);
    let mut index = degrees
        .iter()
        .position(|&d| d == pitch_offset)
        .map(|i| i as i32)
        .unwrap_or(count);
    if index == count {
        index = count - 1;
        if diff_tone > 0 {
            for (i, &d) in degrees.iter().enumerate() {
                if pitch_offset < d {
                    index = floor_mod(i as i32 - 1, count);
                    break;
                }
            }
        } else {
            for (i, &d) in degrees.iter().enumerate() {
                if pitch_offset < d {
                    index = i as i32;
                    break;
                }
            }
        }
    }

    let mut shifted = index + diff_tone;
    while shifted >= count {
        shifted -= count / 2;
        pitch_offset -= 12;
    }
    while shifted < 0 {
        shifted += count / 2;
        pitch_offset += 12;
    }

    pitch + (degrees[shifted as usize] - pitch_offset)
}

/// Snap a pitch onto the given chord.
///
/// With `inchord_tone == None`: an already in-chord pitch is returned
/// unchanged; otherwise the nearest component pitch is chosen, upward when
/// the pitch sits below `avg_pitch` and downward when above. With
/// `Some(tone)`: that component is forced, dropped by octaves until it
/// stays within a sixth above `avg_pitch`.
pub fn pitch_get_in_chord(
    pitch: i32,
    chord: &ChordPair,
    inchord_tone: Option<usize>,
    avg_pitch: i32,
) -> i32 {
    let comps = components(chord.sign);
    let octave = (pitch - chord.root) / 12;
    let tone = floor_mod(pitch - chord.root, 12);

    match inchord_tone {
        None => {
            // The first three components count as in-chord; the fourth is
            // the upward fall-through target.
            if comps[..3].contains(&tone) {
                return pitch;
            }
            let dst_tone = if pitch < avg_pitch {
                let mut index = 3;
                for (i, &c) in comps[..3].iter().enumerate() {
                    if c >= tone {
                        index = i;
                        break;
                    }
                }
                comps[index]
            } else {
                let mut index = 0;
                for i in (0..3).rev() {
                    if comps[i] <= tone {
                        index = i;
                        break;
                    }
                }
                comps[index]
            };
            octave * 12 + dst_tone + chord.root
        }
        Some(forced) => {
            let dst_tone = comps[forced.min(3)];
            let mut dst_octave = octave + 1;
            while dst_octave * 12 + dst_tone + chord.root > avg_pitch + 6 {
                dst_octave -= 1;
            }
            dst_octave * 12 + dst_tone + chord.root
        }
    }
}

/// Shift a pitch by whole octaves until it lies within a fifth of
/// `dst_pitch`.
pub fn pitch_get_in_octave_1(mut pitch: i32, dst_pitch: i32) -> i32 {
    while pitch - dst_pitch > 7 {
        pitch -= 12;
    }
    while pitch - dst_pitch < -7 {
        pitch += 12;
    }
    pitch
}

/// Remap one beat-slice of notes from a source chord onto a destination
/// chord, preserving per-note octave register.
fn remap_slice(
    dst: &mut Vec<PitchNote>,
    slice: &[PitchNote],
    src_key: i32,
    src_chord: &ChordPair,
    dst_key: i32,
    dst_chord: &ChordPair,
    dst_scale: i32,
) {
    let src_comps = components(src_chord.sign);
    let dst_comps = components(dst_chord.sign);
    let degrees = &SCALE_COMPONENT[dst_scale as usize];
    let dst_chord_tone = chord_degree(dst_key, dst_chord.root, dst_scale);

    if src_chord == dst_chord && src_key == dst_key {
        dst.extend_from_slice(slice);
        return;
    }

    let offset = if dst_chord.root - src_chord.root > 5 {
        -1
    } else if dst_chord.root - src_chord.root < -5 {
        1
    } else {
        0
    };

    for note in slice {
        let octave = ((note.pitch as i32 - src_chord.root) / 12 + offset).clamp(0, 10);
        let tone = floor_mod(note.pitch as i32 - src_chord.root, 12);

        let dst_index = match src_comps.iter().position(|&c| c == tone) {
            Some(j) => dst_comps[j] + dst_chord.root,
            None => {
                // Non-component pitch: nearest scale degree above the
                // chord's own degree.
                let mut min_delta = 100;
                let mut min_index = 0;
                for j in (dst_chord_tone + 1)..SCALE_DEGREE_COUNT {
                    let note24 = degrees[j];
                    let cur_delta = (note24 - degrees[dst_chord_tone] - tone).abs();
                    if ((note24 - degrees[dst_chord_tone]).abs() - tone).abs() < min_delta {
                        min_delta = cur_delta;
                        min_index = j - (dst_chord_tone + 1);
                    }
                }
                degrees[min_index] - degrees[dst_chord_tone] + dst_chord.root
            }
        };

        let pitch = (octave * 12 + dst_index).clamp(0, 127) as u8;
        dst.push(PitchNote::new(pitch, note.velocity, note.start, note.end));
    }
}

/// Remap a fragment onto a new key and chord progression, beat by beat.
///
/// Both chord lists carry one chord per beat over `num_bars`; the figure
/// is sliced at (offset-shifted) beat boundaries and each slice is
/// remapped against its own source/destination chord pair. When the
/// destination meter is 3/4 against a 4/4 source, every third source beat
/// of each group of four is dropped and later slices close the gap.
#[allow(clippy::too_many_arguments)]
pub fn transform_figure_chord(
    src_key: i32,
    src_chords: &[ChordPair],
    src_figures: &[PitchNote],
    num_bars: i32,
    dst_key: i32,
    dst_chords: &[ChordPair],
    dst_scale: i32,
    dst_offset: i32,
    dst_beats: i32,
    src_beats: i32,
) -> Result<Vec<PitchNote>> {
    if src_chords.is_empty() || dst_chords.is_empty() {
        return Err(Error::MalformedInput(
            "harmonic remap requires non-empty chord lists".into(),
        ));
    }
    if src_chords.len() as i32 / src_beats != dst_chords.len() as i32 / dst_beats {
        log::warn!(
            "harmonic remap: bar counts disagree (src {} / {} vs dst {} / {})",
            src_chords.len(),
            src_beats,
            dst_chords.len(),
            dst_beats
        );
    }

    // Repeat the final chord so the slice at the last beat boundary has a
    // chord to land on.
    let mut reg_src = src_chords.to_vec();
    let mut reg_dst = dst_chords.to_vec();
    reg_src.push(*reg_src.last().ok_or(Error::PreconditionViolated)?);
    reg_dst.push(*reg_dst.last().ok_or(Error::PreconditionViolated)?);

    let src_num_beats = (num_bars * src_beats) as usize;
    if src_num_beats + 1 != reg_src.len() {
        return Err(Error::MalformedInput(format!(
            "chord list length {}, expected {src_num_beats}",
            reg_src.len() - 1
        )));
    }
    let dst_num_beats = (num_bars * dst_beats) as usize;
    if dst_num_beats + 1 != reg_dst.len() {
        return Err(Error::MalformedInput(format!(
            "chord list length {}, expected {dst_num_beats}",
            reg_dst.len() - 1
        )));
    }

    let mut dst = Vec::new();
    let mut j = 0usize;
    let mut dropped = 0;

    for i in 0..src_num_beats {
        let beat = i as i32;
        let from = if i == 0 {
            0
        } else {
            TICKS_PER_BEAT * (beat + dst_offset)
        };
        let to = TICKS_PER_BEAT * (beat + dst_offset + 1);

        if src_beats == dst_beats {
            let slice: Vec<PitchNote> = src_figures
                .iter()
                .filter(|n| from <= n.start && n.start < to)
                .copied()
                .collect();
            remap_slice(
                &mut dst, &slice, src_key, &reg_src[i], dst_key, &reg_dst[i], dst_scale,
            );
        } else {
            if i % 4 == 2 {
                dropped += 1;
                continue;
            }
            let shift = TICKS_PER_BEAT * dropped;
            let slice: Vec<PitchNote> = src_figures
                .iter()
                .filter(|n| from <= n.start && n.start < to)
                .map(|n| PitchNote::new(n.pitch, n.velocity, n.start - shift, n.end - shift))
                .collect();
            remap_slice(
                &mut dst, &slice, src_key, &reg_src[i], dst_key, &reg_dst[j], dst_scale,
            );
            j += 1;
        }
    }
    Ok(dst)
}
