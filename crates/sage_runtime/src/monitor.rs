//! Execution metrics.
//!
//! Counted per execution and attached to its result for diagnostics.

/// Execution metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Document-level queries executed
    pub queries_executed: u64,
    /// Artifact resolutions started
    pub fields_executed: u64,
    /// Artifact resolutions that produced a value
    pub fields_completed: u64,
    /// Artifact resolutions that failed
    pub fields_failed: u64,
    /// Tasks drained from the queue
    pub total_ticks: u64,
}

impl Metrics {
    /// Create new metrics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a query execution
    pub fn record_query(&mut self) {
        self.queries_executed += 1;
    }

    /// Record a field resolution
    pub fn record_execution(&mut self) {
        self.fields_executed += 1;
    }

    /// Record a field completion
    pub fn record_completion(&mut self) {
        self.fields_completed += 1;
    }

    /// Record a field failure
    pub fn record_failure(&mut self) {
        self.fields_failed += 1;
    }

    /// Record drained tasks
    pub fn record_ticks(&mut self, ticks: u64) {
        self.total_ticks += ticks;
    }

    /// Share of started resolutions that failed, 0.0 when none started
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        if self.fields_executed == 0 {
            return 0.0;
        }
        self.fields_failed as f64 / self.fields_executed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_rate() {
        let mut metrics = Metrics::new();
        assert_eq!(metrics.failure_rate(), 0.0);

        for _ in 0..4 {
            metrics.record_execution();
        }
        metrics.record_completion();
        metrics.record_completion();
        metrics.record_completion();
        metrics.record_failure();
        assert_eq!(metrics.failure_rate(), 0.25);
    }

    #[test]
    fn test_ticks_accumulate() {
        let mut metrics = Metrics::new();
        metrics.record_ticks(12);
        metrics.record_ticks(3);
        assert_eq!(metrics.total_ticks, 15);
    }
}
