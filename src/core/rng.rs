//! Deterministic Random Number Generator
//!
//! Xorshift128+ seeded through SplitMix64.
//! Ticks run in separate invocations with no memory of each other, so every
//! step derives a fresh seed from the match id and tick number instead of
//! carrying generator state in the persisted record.

use sha2::{Sha256, Digest};

use super::grid::Cell;

/// Deterministic PRNG using the Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use serpent_arena::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(12345);
/// let mut b = DeterministicRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// RNG for one simulation step of one match.
    pub fn for_tick(match_id: &str, tick: u64) -> Self {
        Self::new(derive_tick_seed(match_id, tick))
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Modulo bias is negligible for grid-sized ranges
        (self.next_u64() % max as u64) as u32
    }

    /// Uniform cell in `[0, width) x [0, height)`.
    pub fn random_cell(&mut self, width: u32, height: u32) -> Cell {
        let x = self.next_int(width) as i32;
        let y = self.next_int(height) as i32;
        Cell::new(x, y)
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive the seed for one tick of one match.
pub fn derive_tick_seed(match_id: &str, tick: u64) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"SERPENT_ARENA_TICK_V1");
    hasher.update(match_id.as_bytes());
    hasher.update(tick.to_le_bytes());

    let hash = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(seed)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(54321);

        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_next_int() {
        let mut rng = DeterministicRng::new(1234);

        for _ in 0..1000 {
            assert!(rng.next_int(100) < 100);
        }

        assert_eq!(rng.next_int(0), 0);
        assert_eq!(rng.next_int(1), 0);
    }

    #[test]
    fn test_random_cell_in_bounds() {
        let mut rng = DeterministicRng::new(7777);

        for _ in 0..500 {
            let cell = rng.random_cell(40, 25);
            assert!(cell.in_bounds(40, 25));
        }
    }

    #[test]
    fn test_tick_seed() {
        let a = derive_tick_seed("match-a", 7);
        assert_eq!(a, derive_tick_seed("match-a", 7));
        assert_ne!(a, derive_tick_seed("match-a", 8));
        assert_ne!(a, derive_tick_seed("match-b", 7));
    }
}
