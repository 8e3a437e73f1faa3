//! Vault note IRIs
//!
//! The host identifies notes with `obsidian://vault/<url-encoded-path>`
//! IRIs. Path separators survive encoding so that note hierarchies stay
//! readable; everything else is percent-encoded per segment.

use crate::{Dictionary, Node};
use std::borrow::Cow;

/// IRI prefix for vault note resources
pub const VAULT_SCHEME: &str = "obsidian://vault/";

/// Build the IRI node for a note path
///
/// Each `/`-separated segment is percent-encoded; the separators themselves
/// are preserved, so `Projects/Task 1.md` becomes
/// `obsidian://vault/Projects/Task%201.md`.
pub fn note_iri<'a>(dict: &Dictionary, path: &str) -> Node<'a> {
    let mut iri = String::with_capacity(VAULT_SCHEME.len() + path.len());
    iri.push_str(VAULT_SCHEME);
    for (i, segment) in path.split('/').enumerate() {
        if i > 0 {
            iri.push('/');
        }
        iri.push_str(&urlencoding::encode(segment));
    }
    Node::iri(dict.intern(&iri))
}

/// Recover the note path from a vault IRI
///
/// Returns `None` for IRIs outside the vault scheme or with undecodable
/// percent escapes.
pub fn note_path(iri: &str) -> Option<String> {
    let encoded = iri.strip_prefix(VAULT_SCHEME)?;
    let mut path = String::with_capacity(encoded.len());
    for (i, segment) in encoded.split('/').enumerate() {
        if i > 0 {
            path.push('/');
        }
        match urlencoding::decode(segment) {
            Ok(Cow::Borrowed(s)) => path.push_str(s),
            Ok(Cow::Owned(s)) => path.push_str(&s),
            Err(_) => return None,
        }
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slashes_survive_encoding() {
        let dict = Dictionary::new();
        let node = note_iri(&dict, "Projects/Task 1.md");
        assert_eq!(
            node.as_iri().unwrap().as_str(),
            "obsidian://vault/Projects/Task%201.md"
        );
    }

    #[test]
    fn round_trip() {
        let dict = Dictionary::new();
        let path = "Areas/Health & Fitness/2024 plan.md";
        let node = note_iri(&dict, path);
        assert_eq!(note_path(node.as_iri().unwrap().as_str()).as_deref(), Some(path));
    }

    #[test]
    fn foreign_iri_is_not_a_note() {
        assert_eq!(note_path("http://example.org/x"), None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Encoding and decoding a note path is lossless for any path
            #[test]
            fn note_iri_round_trips(path in "\\PC{0,40}") {
                let dict = Dictionary::new();
                let node = note_iri(&dict, &path);
                let iri = node.as_iri().unwrap().as_str();
                prop_assert!(iri.starts_with(VAULT_SCHEME));
                let decoded = note_path(iri);
                prop_assert_eq!(decoded.as_deref(), Some(path.as_str()));
            }
        }
    }
}
