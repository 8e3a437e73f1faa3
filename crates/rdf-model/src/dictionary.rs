//! String interning dictionary and blank-node allocation
//!
//! Every IRI, lexical form, language tag and datatype in the engine is
//! interned once. Nodes then hold plain `&str` references, which makes term
//! equality a cheap slice comparison and keeps index keys small.

#![allow(unsafe_code)]  // Stable 'static references out of Arc<str>

use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Thread-safe string interning dictionary
///
/// Stores each distinct string once and returns stable references.
/// Strings are never removed, so a returned reference stays valid for as
/// long as any clone of the dictionary is alive.
#[derive(Clone)]
pub struct Dictionary {
    strings: Arc<RwLock<FxHashSet<Arc<str>>>>,
}

impl Dictionary {
    /// Create a new empty dictionary
    pub fn new() -> Self {
        Self {
            strings: Arc::new(RwLock::new(FxHashSet::default())),
        }
    }

    /// Intern a string and return a stable reference
    ///
    /// Returns the existing reference when the string was interned before.
    pub fn intern(&self, s: &str) -> &'static str {
        {
            let guard = self.strings.read();
            if let Some(existing) = guard.get(s) {
                // SAFETY: the Arc<str> is never removed from the set, so the
                // allocation outlives every node built from this dictionary.
                return unsafe { &*(Arc::as_ptr(existing) as *const str) };
            }
        }

        let mut guard = self.strings.write();
        // Another writer may have interned it between the two locks
        if let Some(existing) = guard.get(s) {
            return unsafe { &*(Arc::as_ptr(existing) as *const str) };
        }

        let arc: Arc<str> = s.into();
        let ptr = Arc::as_ptr(&arc);
        guard.insert(arc);

        // SAFETY: same as above
        unsafe { &*(ptr as *const str) }
    }

    /// Whether the dictionary holds no strings
    pub fn is_empty(&self) -> bool {
        self.strings.read().is_empty()
    }

    /// Number of distinct interned strings
    pub fn len(&self) -> usize {
        self.strings.read().len()
    }

    /// Whether a string has been interned
    pub fn contains(&self, s: &str) -> bool {
        self.strings.read().contains(s)
    }

    /// Approximate memory held by interned string data, in bytes
    pub fn memory_usage(&self) -> usize {
        self.strings.read().iter().map(|s| s.len()).sum()
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocator for document-scoped blank node identifiers
///
/// Blank node identity is meaningful only within the document or store the
/// node originated in; handing out ids from one allocator per scope keeps
/// identifiers from colliding across loads.
pub struct BlankNodeAllocator {
    next: AtomicU64,
}

impl BlankNodeAllocator {
    /// Create an allocator starting at id 0
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    /// Hand out a fresh identifier
    pub fn fresh(&self) -> crate::BlankNodeId {
        crate::BlankNodeId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for BlankNodeAllocator {
    fn default() -> Self {
        Self::new()
    }
}
