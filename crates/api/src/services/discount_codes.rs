//! Checkout discount code generation.

use rand::seq::IndexedRandom;

/// Uppercase letters and digits without the easily confused `0 O 1 I L`.
const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of the random part of a code.
pub const CODE_LENGTH: usize = 12;

/// Generate a new code such as `B2B-7KQ2M9XR4TWA`.
///
/// Uniqueness is enforced by the database; callers retry on conflict.
#[must_use]
pub fn generate_code(prefix: &str) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..CODE_LENGTH)
        .filter_map(|_| ALPHABET.choose(&mut rng))
        .map(|&b| char::from(b))
        .collect();

    format!("{prefix}-{suffix}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_code_shape() {
        let code = generate_code("B2B");
        let suffix = code.strip_prefix("B2B-").unwrap_or_default();

        assert_eq!(suffix.len(), CODE_LENGTH);
        assert!(suffix.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn test_codes_differ() {
        let codes: HashSet<String> = (0..200).map(|_| generate_code("B2B")).collect();
        assert_eq!(codes.len(), 200);
    }
}
