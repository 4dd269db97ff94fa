//! Metrics collection for ingestion and search.

use metrics::{counter, gauge};

/// Metric names used across the library
pub struct MetricsCollector {
    /// Messages newly written to the prepared store
    pub messages_ingested_total: &'static str,
    /// Contacts newly written to the prepared store
    pub contacts_ingested_total: &'static str,
    /// Batches committed (messages and contacts)
    pub batches_committed_total: &'static str,
    /// Messages added to the FTS index
    pub messages_indexed_total: &'static str,
    /// FTS search calls served
    pub searches_total: &'static str,
    /// Body-decode cache hits over one ingestion run
    pub body_cache_hits: &'static str,
    /// Body-decode cache misses over one ingestion run
    pub body_cache_misses: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            messages_ingested_total: "chattracks_messages_ingested_total",
            contacts_ingested_total: "chattracks_contacts_ingested_total",
            batches_committed_total: "chattracks_batches_committed_total",
            messages_indexed_total: "chattracks_messages_indexed_total",
            searches_total: "chattracks_searches_total",
            body_cache_hits: "chattracks_body_cache_hits",
            body_cache_misses: "chattracks_body_cache_misses",
        }
    }
}

impl MetricsCollector {
    /// Record messages written by one batch
    pub fn record_messages_ingested(&self, count: usize) {
        counter!(self.messages_ingested_total).increment(count as u64);
    }

    /// Record contacts written by one batch
    pub fn record_contacts_ingested(&self, count: usize) {
        counter!(self.contacts_ingested_total).increment(count as u64);
    }

    /// Record one committed batch
    pub fn record_batch_committed(&self) {
        counter!(self.batches_committed_total).increment(1);
    }

    /// Record rows added to the FTS index
    pub fn record_messages_indexed(&self, count: usize) {
        counter!(self.messages_indexed_total).increment(count as u64);
    }

    /// Record one search call
    pub fn record_search(&self) {
        counter!(self.searches_total).increment(1);
    }

    /// Record the body-cache counters at the end of a run
    #[allow(clippy::cast_precision_loss)]
    pub fn record_body_cache(&self, hits: u64, misses: u64) {
        gauge!(self.body_cache_hits).set(hits as f64);
        gauge!(self.body_cache_misses).set(misses as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_prefixed() {
        let collector = MetricsCollector::default();
        assert!(collector
            .messages_ingested_total
            .starts_with("chattracks_"));
        assert!(collector.searches_total.starts_with("chattracks_"));
    }
}
