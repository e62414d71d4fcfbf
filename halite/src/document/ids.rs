use crate::common::{ID_ALPHABET, ID_LENGTH};
use rand::Rng;

/// Generates a 16-character opaque document identifier drawn uniformly from
/// an alphanumeric alphabet. Uniqueness is enforced by the caller against
/// the `_id` index; a collision is a retry condition, not an error.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| {
            let index = rng.gen_range(0..ID_ALPHABET.len());
            ID_ALPHABET[index] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_length() {
        assert_eq!(generate_id().len(), ID_LENGTH);
    }

    #[test]
    fn test_generated_id_alphabet() {
        let id = generate_id();
        assert!(id.bytes().all(|b| ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_generated_ids_differ() {
        let ids: Vec<String> = (0..100).map(|_| generate_id()).collect();
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }
}
