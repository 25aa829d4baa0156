//! Transfer-code generation and normalization.
//!
//! Codes are `WORD-WORD-WORD-XXXX`: three distinct entries from a fixed
//! 24-word list plus four characters from an alphabet with the visually
//! confusable `0 O 1 I` left out. No collision check against live codes is
//! performed; the code space makes a clash with an unexpired row vanishingly
//! unlikely, and lookup simply returns the oldest match.

use rand::seq::IndexedRandom;
use rand::Rng;

pub const TRANSFER_WORDS: [&str; 24] = [
    "TREE", "FISH", "MOON", "STAR", "BIRD", "LAKE", "FIRE", "SNOW", "RAIN", "WIND", "CAVE",
    "LEAF", "WAVE", "ROCK", "CORN", "BEAR", "FROG", "LION", "WOLF", "DEER", "DUCK", "HAWK",
    "SEAL", "CRAB",
];

pub const CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Anything shorter cannot be a valid code; rejected before hitting the server.
pub const MIN_CODE_LEN: usize = 10;

pub fn generate_transfer_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let words: Vec<&str> = TRANSFER_WORDS
        .choose_multiple(rng, 3)
        .copied()
        .collect();
    let alphabet: Vec<char> = CODE_ALPHABET.chars().collect();
    let suffix: String = (0..4)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())])
        .collect();
    format!("{}-{}-{}-{}", words[0], words[1], words[2], suffix)
}

/// Trim and uppercase user input; `None` when it is too short to be a code.
pub fn normalize_code(input: &str) -> Option<String> {
    let cleaned = input.trim().to_ascii_uppercase();
    (cleaned.chars().count() >= MIN_CODE_LEN).then_some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_codes_use_three_distinct_words_and_the_safe_alphabet() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let code = generate_transfer_code(&mut rng);
            let parts: Vec<&str> = code.split('-').collect();
            assert_eq!(parts.len(), 4);
            assert!(TRANSFER_WORDS.contains(&parts[0]));
            assert!(TRANSFER_WORDS.contains(&parts[1]));
            assert!(TRANSFER_WORDS.contains(&parts[2]));
            assert_ne!(parts[0], parts[1]);
            assert_ne!(parts[1], parts[2]);
            assert_ne!(parts[0], parts[2]);
            assert_eq!(parts[3].len(), 4);
            assert!(parts[3].chars().all(|c| CODE_ALPHABET.contains(c)));
        }
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let a = generate_transfer_code(&mut StdRng::seed_from_u64(42));
        let b = generate_transfer_code(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn normalization_trims_uppercases_and_rejects_short_input() {
        assert_eq!(
            normalize_code("  tree-fish-moon-ab23 ").as_deref(),
            Some("TREE-FISH-MOON-AB23")
        );
        assert_eq!(normalize_code("short"), None);
        assert_eq!(normalize_code(""), None);
    }
}
