//! Accumulates the diagnostics pushed during one session.

use crate::types::Diagnostic;

/// Arrival-ordered diagnostics for a single document.
///
/// No deduplication and no sorting: a server that publishes the same finding
/// in two waves produces two entries.
#[derive(Debug, Default)]
pub struct DiagnosticAggregator {
    items: Vec<Diagnostic>,
}

impl DiagnosticAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diagnostics);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Take everything accumulated so far, leaving the aggregator empty.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.items)
    }
}
