//! In-memory batch of resolved documents
//!
//! The batch lives for one run only. It grows until the cap and is drained
//! exactly once, when it is handed to the publisher.

use crate::documents::CelexId;
use std::collections::HashSet;

/// A document identifier paired with its extracted text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub identifier: CelexId,
    pub text: String,
}

impl ResolvedEntry {
    /// Pairs an identifier with its text; None if the text is blank
    pub fn new(identifier: CelexId, text: String) -> Option<Self> {
        if text.trim().is_empty() {
            None
        } else {
            Some(Self { identifier, text })
        }
    }
}

/// Bounded, ordered collection of resolved entries
#[derive(Debug)]
pub struct BatchAccumulator {
    entries: Vec<ResolvedEntry>,
    identifiers: HashSet<CelexId>,
    cap: usize,
}

impl BatchAccumulator {
    /// Creates an empty accumulator holding at most `cap` entries
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::with_capacity(cap.min(1024)),
            identifiers: HashSet::new(),
            cap,
        }
    }

    /// Appends `entry` if below the cap; returns whether it was added
    pub fn add(&mut self, entry: ResolvedEntry) -> bool {
        if self.is_full() {
            return false;
        }
        self.identifiers.insert(entry.identifier.clone());
        self.entries.push(entry);
        true
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.cap
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Free slots before the cap is reached
    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.entries.len())
    }

    pub fn contains(&self, identifier: &CelexId) -> bool {
        self.identifiers.contains(identifier)
    }

    /// Returns the collected entries in insertion order and empties the batch
    pub fn drain(&mut self) -> Vec<ResolvedEntry> {
        self.identifiers.clear();
        std::mem::take(&mut self.entries)
    }
}
