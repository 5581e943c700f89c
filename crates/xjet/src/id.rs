//! 14-character base-36 identifier generation for suites and runners.

use rand::Rng;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn fragment(rng: &mut impl Rng) -> String {
    (0..7).map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char).collect()
}

/// Generate a 14-character id as two concatenated 7-character base-36
/// fragments. Not cryptographically secure; uniqueness is "good enough"
/// per run, matching the source's process-local RNG contract.
pub fn generate_id() -> String {
    let mut rng = rand::rng();
    format!("{}{}", fragment(&mut rng), fragment(&mut rng))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_fourteen_chars() {
        let id = generate_id();
        assert_eq!(id.len(), 14);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn generates_distinct_ids() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
    }
}
