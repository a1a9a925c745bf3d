//! Blake3 fingerprints for record identity and dedup

/// Separator between identity components, so `("ab", "c")` and `("a", "bc")` differ.
const PART_SEPARATOR: &[u8] = b"::";

/// Hash `parts` joined by `::` and return the full hex digest.
pub fn fingerprint_parts(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(PART_SEPARATOR);
        }
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Identifier of a dataset record: bundle root, file path and fragment text.
pub fn record_id(bundle_root: &str, file_path: &str, fragment: &str) -> String {
    fingerprint_parts(&[bundle_root, file_path, fragment])
}

/// Dedup key over a prompt/completion pair.
///
/// The concatenation is trimmed and lower-cased first, so records that only
/// differ in surrounding whitespace or letter case collapse together.
pub fn content_fingerprint(prompt: &str, completion: &str) -> blake3::Hash {
    let joined = format!("{prompt}{completion}");
    blake3::hash(joined.trim().to_lowercase().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_deterministic() {
        let a = record_id("/srv/res", "/srv/res/client.lua", "function foo() end");
        let b = record_id("/srv/res", "/srv/res/client.lua", "function foo() end");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn record_id_separates_components() {
        assert_ne!(record_id("ab", "c", "x"), record_id("a", "bc", "x"));
    }

    #[test]
    fn content_fingerprint_normalizes() {
        let a = content_fingerprint("  Prompt ", "Answer\n");
        let b = content_fingerprint("prompt ", "ANSWER");
        assert_eq!(a, b);
    }

    #[test]
    fn content_fingerprint_distinguishes_text() {
        assert_ne!(
            content_fingerprint("prompt", "one"),
            content_fingerprint("prompt", "two")
        );
    }
}
