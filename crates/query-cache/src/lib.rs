//! Query result caching and incremental invalidation
//!
//! [`QueryCache`] maps normalized query text to typed results with LRU
//! capacity, TTL expiry, per-entry source-file tags and a size ceiling.
//! [`ChangeRecorder`] coalesces vault file-change events into invalidation
//! batches and tracks `(mtime, size)` per path so unchanged files skip
//! reparsing.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod cache;
mod indexer;

pub use cache::{CacheConfig, CacheError, CacheStats, CachedResult, QueryCache};
pub use indexer::{ChangeKind, ChangeRecorder, PathChange};

/// Normalize query text for cache keying
///
/// Strips `#` comments (outside string literals) and collapses whitespace
/// runs, so formatting differences share one cache entry.
pub fn normalize_query(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string: Option<char> = None;
    let mut last_was_space = true;

    while let Some(c) = chars.next() {
        match in_string {
            Some(quote) => {
                out.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == quote {
                    in_string = None;
                }
                last_was_space = false;
            }
            None => match c {
                '#' => {
                    for skipped in chars.by_ref() {
                        if skipped == '\n' {
                            break;
                        }
                    }
                    if !last_was_space {
                        out.push(' ');
                        last_was_space = true;
                    }
                }
                '"' | '\'' => {
                    out.push(c);
                    in_string = Some(c);
                    last_was_space = false;
                }
                c if c.is_whitespace() => {
                    if !last_was_space {
                        out.push(' ');
                        last_was_space = true;
                    }
                }
                c => {
                    out.push(c);
                    last_was_space = false;
                }
            },
        }
    }
    out.trim().to_string()
}
