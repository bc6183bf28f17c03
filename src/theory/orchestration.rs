//! Orchestration: GM timbre grouping, track-layout derivation, figure
//! discovery across the corpus, and the humanizing velocity passes.

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::knowledge::entry::{FigureBank, FigureClass, SongEntry};
use crate::knowledge::{EntryId, KnowledgeBase};
use crate::params::CompositionChainNode;
use crate::select;

/// Hard cap on the number of instrument tracks in one composition.
pub const MAX_TRACKS: usize = 6;

/// GM program numbers belonging to each figure bank. The melody bank is
/// empty: any non-drum program can carry a melody.
const GM_TIMBRE_BANKS: [&[i32]; 11] = [
    &[0, 1, 2, 3, 4, 5, 6, 7],                                     // Piano
    &[],                                                           // Melody
    &[24, 25, 26, 27, 28, 29, 30, 31],                             // Guitar
    &[32, 33, 34, 35, 36, 37, 38, 39],                             // Bass
    &[16, 17, 18, 19, 20, 21, 22, 23],                             // Organ
    &[128],                                                        // Drums
    &[40, 41, 42, 43, 44, 45, 48, 49, 50, 51, 52, 53, 54, 55],     // Strings
    &[
        56, 57, 58, 59, 60, 61, 62, 63, 64, 65, 66, 67, 68, 69, 70, 71, 72, 73, 74, 75, 76, 77,
        78, 79,
    ], // Wind
    &[
        80, 81, 82, 83, 84, 85, 86, 87, 88, 89, 90, 91, 92, 93, 94, 95, 96, 97, 98, 99, 100, 101,
        102, 103,
    ], // Effect
    &[104, 105, 106, 107, 108, 109, 110, 111],                     // National
    &[
        8, 9, 10, 11, 12, 13, 14, 15, 46, 47, 112, 113, 114, 115, 116, 117, 118, 119, 120, 121,
        122, 123, 124, 125, 126, 127,
    ], // Unsorted
];

/// GM programs suitable for carrying the lead line.
const SOLO_INSTRUMENTS: [i32; 18] = [
    0, 1, 3, 4, 5, 11, 18, 21, 22, 23, 24, 29, 65, 68, 71, 72, 73, 80,
];

/// Banks whose figures are interchangeable with each bank, in preference
/// order. Used to widen figure discovery when exact matches run short.
const RELATED_BANKS: [&[FigureBank]; 11] = [
    &[
        FigureBank::Guitar,
        FigureBank::Piano,
        FigureBank::Strings,
        FigureBank::Wind,
        FigureBank::Organ,
        FigureBank::Effect,
        FigureBank::Unsorted,
    ], // Piano
    &[FigureBank::Melody],
    &[
        FigureBank::Guitar,
        FigureBank::Piano,
        FigureBank::Strings,
        FigureBank::Wind,
        FigureBank::Organ,
        FigureBank::Effect,
        FigureBank::Unsorted,
    ], // Guitar
    &[FigureBank::Bass],
    &[
        FigureBank::Strings,
        FigureBank::Wind,
        FigureBank::Organ,
        FigureBank::Effect,
        FigureBank::Piano,
    ], // Organ
    &[FigureBank::Drums],
    &[
        FigureBank::Wind,
        FigureBank::Strings,
        FigureBank::Organ,
        FigureBank::Effect,
        FigureBank::Piano,
    ], // Strings
    &[
        FigureBank::Organ,
        FigureBank::Strings,
        FigureBank::Wind,
        FigureBank::Effect,
        FigureBank::Piano,
    ], // Wind
    &[
        FigureBank::Effect,
        FigureBank::Strings,
        FigureBank::Wind,
        FigureBank::Organ,
        FigureBank::Piano,
    ], // Effect
    &[
        FigureBank::National,
        FigureBank::Piano,
        FigureBank::Strings,
        FigureBank::Wind,
        FigureBank::Organ,
        FigureBank::Effect,
        FigureBank::Unsorted,
    ], // National
    &[
        FigureBank::Unsorted,
        FigureBank::Piano,
        FigureBank::Wind,
        FigureBank::Organ,
        FigureBank::Effect,
        FigureBank::National,
    ], // Unsorted
];

const MAX_VELOCITY: i32 = 127;
const RANDOM_VELOCITY_FACTOR: f32 = 0.2;
const RANDOM_VELOCITY_THRESHOLD: f32 = 0.3;
const SOLO_VELOCITY_PROPORTION: f32 = 1.2;

/// One instrument track's identity: what it sounds like and what kind of
/// figures it plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackLayout {
    /// GM program number (128 = drum kit).
    pub timbre_bank: i32,
    pub figure_bank: FigureBank,
    pub figure_class: FigureClass,
}

/// Whether a GM program belongs to a figure bank. The melody bank accepts
/// everything except the drum kit.
fn is_grouped(bank: FigureBank, gm_timbre: i32) -> bool {
    let programs = GM_TIMBRE_BANKS[bank.index()];
    if programs.is_empty() {
        return gm_timbre != 128;
    }
    programs.contains(&gm_timbre)
}

/// Figure bank of a GM program: first non-melody bank that groups it.
fn bank_for_timbre(gm_timbre: i32) -> FigureBank {
    for bank in FigureBank::ALL {
        if bank == FigureBank::Melody {
            continue;
        }
        if is_grouped(bank, gm_timbre) {
            return bank;
        }
    }
    FigureBank::Unsorted
}

/// Whether figures of `other` can stand in for figures of `bank`.
pub fn is_related(bank: FigureBank, other: FigureBank) -> bool {
    RELATED_BANKS[bank.index()].contains(&other)
}

/// Per-part layout triples of one reference song, with chordal non-melody
/// non-drum banks corrected from the part's actual GM program.
pub fn part_layouts(entry: &SongEntry) -> Vec<TrackLayout> {
    entry
        .parts
        .iter()
        .map(|part| {
            let mut figure_bank = part.figure_bank;
            if part.figure_class != FigureClass::Solo
                && figure_bank != FigureBank::Melody
                && figure_bank != FigureBank::Drums
            {
                figure_bank = bank_for_timbre(part.timbre_bank);
            }
            TrackLayout {
                timbre_bank: part.timbre_bank,
                figure_bank,
                figure_class: part.figure_class,
            }
        })
        .collect()
}

/// Derive the composition's track manifest from a source song's layout.
///
/// Track 0 is always the lead: a random solo instrument, or the source's
/// melody instrument when `has_melody` asks for one. Track 1 is the first
/// non-melody solo part (or another random solo instrument). Remaining
/// tracks take the source's drum part (at most one) and chordal parts, up
/// to [`MAX_TRACKS`].
pub fn layout_timbres(
    src: &[TrackLayout],
    has_melody: bool,
    rng: &mut ChaCha8Rng,
) -> Vec<TrackLayout> {
    let mut dst: Vec<TrackLayout> = Vec::new();

    let mut lead_timbre = *select::random_choice(rng, &SOLO_INSTRUMENTS);
    if has_melody {
        if let Some(part) = src
            .iter()
            .find(|p| p.figure_bank == FigureBank::Melody && p.figure_class == FigureClass::Solo)
        {
            lead_timbre = part.timbre_bank;
        }
    }
    dst.push(TrackLayout {
        timbre_bank: lead_timbre,
        figure_bank: FigureBank::Melody,
        figure_class: FigureClass::Solo,
    });

    match src
        .iter()
        .find(|p| p.figure_bank != FigureBank::Melody && p.figure_class == FigureClass::Solo)
    {
        Some(part) => {
            let mut figure_bank = part.figure_bank;
            if !is_grouped(figure_bank, part.timbre_bank) {
                figure_bank = bank_for_timbre(part.timbre_bank);
            }
            dst.push(TrackLayout {
                timbre_bank: part.timbre_bank,
                figure_bank,
                figure_class: FigureClass::Solo,
            });
        }
        None => {
            let timbre = *select::random_choice(rng, &SOLO_INSTRUMENTS);
            dst.push(TrackLayout {
                timbre_bank: timbre,
                figure_bank: bank_for_timbre(timbre),
                figure_class: FigureClass::Solo,
            });
        }
    }

    for part in src {
        if part.figure_bank == FigureBank::Drums {
            if dst.iter().any(|t| t.figure_bank == FigureBank::Drums) {
                continue;
            }
            let timbre = if is_grouped(FigureBank::Drums, part.timbre_bank) {
                part.timbre_bank
            } else {
                *select::random_choice(rng, GM_TIMBRE_BANKS[FigureBank::Drums.index()])
            };
            dst.push(TrackLayout {
                timbre_bank: timbre,
                figure_bank: FigureBank::Drums,
                figure_class: FigureClass::Chord,
            });
        } else if part.figure_class == FigureClass::Chord {
            let mut figure_bank = part.figure_bank;
            if !is_grouped(figure_bank, part.timbre_bank) {
                figure_bank = bank_for_timbre(part.timbre_bank);
            }
            dst.push(TrackLayout {
                timbre_bank: part.timbre_bank,
                figure_bank,
                figure_class: FigureClass::Chord,
            });
        }
        if dst.len() >= MAX_TRACKS {
            break;
        }
    }
    dst
}

/// Find a `(song, part)` whose figures fit the requested bank and class.
///
/// Exact matches across the pool are collected first; when fewer than ten
/// exist, parts of related banks (same class) are added before the random
/// pick. `None` means the caller should widen the pool.
pub fn find_figures(
    kb: &KnowledgeBase,
    pool: &[EntryId],
    figure_bank: FigureBank,
    figure_class: FigureClass,
    rng: &mut ChaCha8Rng,
) -> Option<(EntryId, usize)> {
    let mut matched: Vec<(EntryId, usize)> = Vec::new();
    let mut related: Vec<(EntryId, usize)> = Vec::new();

    for &id in pool {
        let layouts = part_layouts(kb.entry(id));
        if let Some(j) = layouts
            .iter()
            .position(|t| t.figure_bank == figure_bank && t.figure_class == figure_class)
        {
            matched.push((id, j));
            continue;
        }
        if let Some(j) = layouts
            .iter()
            .position(|t| t.figure_class == figure_class && is_related(figure_bank, t.figure_bank))
        {
            related.push((id, j));
        }
    }

    if matched.len() < 10 {
        matched.append(&mut related);
    }
    if matched.is_empty() {
        return None;
    }
    Some(matched[select::random_index(rng, matched.len())])
}

/// Humanize and normalize note velocities across all tracks.
///
/// Pass one jitters any non-drum track whose velocities are nearly
/// uniform. Pass two recenters every track on a global benchmark, with
/// solo tracks boosted by a fixed proportion.
pub fn process_velocity(
    tracks: &mut [Vec<CompositionChainNode>],
    layouts: &[TrackLayout],
    rng: &mut ChaCha8Rng,
    velocity_factor: f32,
    solo_proportion: f32,
) {
    let velocity_factor = velocity_factor * RANDOM_VELOCITY_FACTOR;
    let solo_proportion = solo_proportion * SOLO_VELOCITY_PROPORTION;

    for (track, layout) in tracks.iter_mut().zip(layouts) {
        if layout.figure_bank == FigureBank::Drums {
            continue;
        }
        let mut dull = 0usize;
        let mut count = 0usize;
        for section in track.iter() {
            if let Some(first) = section.notes.first() {
                let velocity = first.velocity;
                for note in &section.notes {
                    if note.velocity != velocity {
                        dull += 1;
                    }
                    count += 1;
                }
            }
        }
        if count > 0 && (dull as f32 / count as f32) < RANDOM_VELOCITY_THRESHOLD {
            let benchmark = (MAX_VELOCITY as f32 * velocity_factor) as i32;
            for section in track.iter_mut() {
                for note in &mut section.notes {
                    let low = (note.velocity as i32 - benchmark).max(0);
                    let high = (note.velocity as i32 + benchmark).min(MAX_VELOCITY);
                    note.velocity = select::random_between(rng, low, high) as u8;
                }
            }
        }
    }

    let mut sum = 0i64;
    let mut total = 0i64;
    for track in tracks.iter() {
        for section in track {
            for note in &section.notes {
                sum += note.velocity as i64;
                total += 1;
            }
        }
    }
    if total == 0 {
        return;
    }
    let average = (sum / total) as i32;
    let chord_benchmark = average;
    let solo_benchmark = ((average as f32 * solo_proportion) as i32).min(MAX_VELOCITY);

    for (track, layout) in tracks.iter_mut().zip(layouts) {
        let mut dc_sum = 0i64;
        let mut dc_count = 0i64;
        for section in track.iter() {
            for note in &section.notes {
                dc_sum += note.velocity as i64;
                dc_count += 1;
            }
        }
        if dc_count == 0 {
            continue;
        }
        let dc_offset = (dc_sum / dc_count) as i32;
        let benchmark = if layout.figure_class == FigureClass::Solo {
            solo_benchmark
        } else {
            chord_benchmark
        };
        for section in track.iter_mut() {
            for note in &mut section.notes {
                let mut v = benchmark + (note.velocity as i32 - dc_offset);
                if v > MAX_VELOCITY {
                    v = MAX_VELOCITY;
                }
                if v < 0 {
                    v = dc_offset / 2;
                }
                note.velocity = v as u8;
            }
        }
    }
}
