//! Deterministic selection helpers.
//!
//! Every random decision in the pipeline goes through one explicitly-seeded
//! [`ChaCha8Rng`] owned by the caller, so identical seeds replay the exact
//! same composition. Ambient entropy (`thread_rng` etc.) is never used.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Pick one element of `items` uniformly at random.
///
/// Panics on an empty slice; callers guarantee non-emptiness (the query
/// layer reports [`crate::Error::CorpusExhausted`] before we get here).
pub fn random_choice<'a, T>(rng: &mut ChaCha8Rng, items: &'a [T]) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

/// Pick the element whose position proportion equals `factor` (0.0 = first,
/// 1.0 = last, rounded to the nearest index).
pub fn factor_choice<T>(items: &[T], factor: f64) -> &T {
    let idx = (factor * (items.len() - 1) as f64).round() as usize;
    &items[idx.min(items.len() - 1)]
}

/// Steered selection: a factor in `[0, 1]` picks deterministically by
/// position, no factor falls back to a uniform draw.
pub fn steered_choice<'a, T>(rng: &mut ChaCha8Rng, items: &'a [T], factor: Option<f64>) -> &'a T {
    match factor {
        Some(f) if (0.0..=1.0).contains(&f) => factor_choice(items, f),
        _ => random_choice(rng, items),
    }
}

/// Uniform draw from the inclusive range `[low, high]`.
pub fn random_between(rng: &mut ChaCha8Rng, low: i32, high: i32) -> i32 {
    if low >= high {
        return low;
    }
    rng.gen_range(low..=high)
}

/// Uniform draw from `[0, size)`.
pub fn random_index(rng: &mut ChaCha8Rng, size: usize) -> usize {
    rng.gen_range(0..size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    #[test]
    fn factor_choice_endpoints() {
        let items = [10, 20, 30, 40, 50];
        assert_eq!(*factor_choice(&items, 0.0), 10);
        assert_eq!(*factor_choice(&items, 1.0), 50);
        assert_eq!(*factor_choice(&items, 0.5), 30);
    }

    #[test]
    fn factor_choice_rounds_to_nearest() {
        let items = [0, 1, 2, 3];
        // 0.4 * 3 = 1.2 -> index 1; 0.6 * 3 = 1.8 -> index 2
        assert_eq!(*factor_choice(&items, 0.4), 1);
        assert_eq!(*factor_choice(&items, 0.6), 2);
    }

    #[test]
    fn steered_choice_uses_factor_when_in_range() {
        let items = [7, 8, 9];
        let mut r = rng(1);
        assert_eq!(*steered_choice(&mut r, &items, Some(1.0)), 9);
    }

    #[test]
    fn steered_choice_falls_back_to_random() {
        let items = [7, 8, 9];
        let mut a = rng(42);
        let mut b = rng(42);
        // Out-of-range factor behaves like no factor: same rng, same pick.
        let x = *steered_choice(&mut a, &items, Some(-1.0));
        let y = *steered_choice(&mut b, &items, None);
        assert_eq!(x, y);
    }

    #[test]
    fn random_choice_is_deterministic_per_seed() {
        let items: Vec<u32> = (0..100).collect();
        let picks_a: Vec<u32> = {
            let mut r = rng(9);
            (0..10).map(|_| *random_choice(&mut r, &items)).collect()
        };
        let picks_b: Vec<u32> = {
            let mut r = rng(9);
            (0..10).map(|_| *random_choice(&mut r, &items)).collect()
        };
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn random_between_handles_degenerate_range() {
        let mut r = rng(3);
        assert_eq!(random_between(&mut r, 5, 5), 5);
        assert_eq!(random_between(&mut r, 7, 2), 7);
    }
}
