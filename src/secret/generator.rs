//! High-entropy secret generation.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::secret::Secret;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
// Visible ASCII that survives header transport and CDN config consoles unquoted.
const PUNCT: &[u8] = b"!#$%&*+-.^_|~";

/// Generate a secret of `length` characters from the OS CSPRNG.
///
/// Every character class appears at least once.
pub fn generate_secret(length: usize) -> Secret {
    let classes: [&[u8]; 4] = [LOWER, UPPER, DIGITS, PUNCT];
    let length = length.max(classes.len());
    let mut rng = OsRng;

    let mut bytes: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();

    let alphabet: Vec<u8> = classes.concat();
    while bytes.len() < length {
        bytes.push(alphabet[rng.gen_range(0..alphabet.len())]);
    }
    bytes.shuffle(&mut rng);

    // Only ASCII from the tables above, so this cannot fail.
    let value: String = bytes.into_iter().map(char::from).collect();
    Secret::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_length_and_classes() {
        let secret = generate_secret(64);
        let value = secret.expose();
        assert_eq!(value.len(), 64);
        assert!(value.bytes().any(|b| LOWER.contains(&b)));
        assert!(value.bytes().any(|b| UPPER.contains(&b)));
        assert!(value.bytes().any(|b| DIGITS.contains(&b)));
        assert!(value.bytes().any(|b| PUNCT.contains(&b)));
    }

    #[test]
    fn test_values_are_header_safe() {
        for _ in 0..50 {
            let secret = generate_secret(48);
            assert!(HeaderValue::from_str(secret.expose()).is_ok());
        }
    }

    #[test]
    fn test_values_differ() {
        assert_ne!(generate_secret(64), generate_secret(64));
    }
}
