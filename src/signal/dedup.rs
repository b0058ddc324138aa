use std::collections::HashSet;

/// Set of signal ids that already reached order submission
///
/// Ids are added only after an entry order was actually routed, not merely
/// parsed - a signal whose submission failed stays unmarked and can be
/// retried if the producer re-emits it. The set is append-only for the
/// lifetime of the process; the source behavior has no eviction.
#[derive(Debug, Default)]
pub struct DedupLedger {
    seen: HashSet<String>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Has this signal identity never been routed before?
    pub fn is_new(&self, id: &str) -> bool {
        !self.seen.contains(id)
    }

    pub fn mark_processed(&mut self, id: String) {
        self.seen.insert(id);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
