use rand::seq::SliceRandom;
use rand::Rng;

/// Characters a transaction key is drawn from.
pub const TRANSACTION_KEY_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const TRANSACTION_KEY_LENGTH: usize = 6;

/// Six distinct characters sampled uniformly from [`TRANSACTION_KEY_ALPHABET`].
pub fn generate_transaction_key<R: Rng + ?Sized>(rng: &mut R) -> String {
    TRANSACTION_KEY_ALPHABET
        .choose_multiple(rng, TRANSACTION_KEY_LENGTH)
        .map(|&b| char::from(b))
        .collect()
}

/// Normalises user input for lookup: trimmed and uppercased.
pub fn normalize_transaction_key(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn is_well_formed(key: &str) -> bool {
        key.len() == TRANSACTION_KEY_LENGTH
            && key.bytes().all(|b| TRANSACTION_KEY_ALPHABET.contains(&b))
    }

    proptest! {
        #[test]
        fn keys_are_six_distinct_alphabet_chars(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let key = generate_transaction_key(&mut rng);

            prop_assert!(is_well_formed(&key));
            let distinct: HashSet<char> = key.chars().collect();
            prop_assert_eq!(distinct.len(), TRANSACTION_KEY_LENGTH);
        }
    }

    #[test]
    fn normalizes_lookup_input() {
        assert_eq!(normalize_transaction_key("  ab12cd \n"), "AB12CD");
    }

    #[test]
    fn seeded_keys_are_reproducible() {
        let first = generate_transaction_key(&mut StdRng::seed_from_u64(7));
        let second = generate_transaction_key(&mut StdRng::seed_from_u64(7));
        assert_eq!(first, second);
        assert!(is_well_formed(&first));
    }
}
