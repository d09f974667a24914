//! Aggregate statistics for a run

use billsort_domain::ProcessingOutcome;
use serde::Serialize;
use std::time::Duration;

/// Counts and timing of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    /// Wall-clock time of the run in seconds
    pub elapsed_secs: f64,
    /// Files attempted
    pub total: usize,
    /// Files that produced a record
    pub success: usize,
    /// Files that failed
    pub failed: usize,
    /// Files skipped by the pre-filter
    pub skipped: usize,
    /// Successful share of attempted files, in percent
    pub success_rate: f64,
}

impl RunStats {
    /// Tally `outcomes`
    pub fn from_outcomes(outcomes: &[ProcessingOutcome], elapsed: Duration) -> Self {
        let success = outcomes.iter().filter(|o| o.is_success()).count();
        let skipped = outcomes.iter().filter(|o| o.is_skipped()).count();
        let total = outcomes.len();
        Self {
            elapsed_secs: elapsed.as_secs_f64(),
            total,
            success,
            failed: total - success - skipped,
            skipped,
            success_rate: if total > 0 {
                success as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    /// Generate a summary report
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Run Summary".to_string(),
            "===========".to_string(),
            format!("Files:        {}", self.total),
            format!("Succeeded:    {}", self.success),
            format!("Failed:       {}", self.failed),
        ];
        if self.skipped > 0 {
            lines.push(format!("Skipped:      {}", self.skipped));
        }
        lines.push(format!("Success rate: {:.1}%", self.success_rate));
        lines.push(format!("Elapsed:      {:.1}s", self.elapsed_secs));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billsort_domain::{Record, RecordFields};

    #[test]
    fn test_empty_run() {
        let stats = RunStats::from_outcomes(&[], Duration::ZERO);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[test]
    fn test_counts() {
        let outcomes = vec![
            ProcessingOutcome::success("a.pdf", Record::new(RecordFields::default(), "llm")),
            ProcessingOutcome::failed("b.pdf", "boom"),
            ProcessingOutcome::skipped("c.pdf", "too large"),
            ProcessingOutcome::success("d.pdf", Record::new(RecordFields::default(), "llm")),
        ];
        let stats = RunStats::from_outcomes(&outcomes, Duration::from_millis(1500));
        assert_eq!((stats.total, stats.success, stats.failed, stats.skipped), (4, 2, 1, 1));
        assert_eq!(stats.success_rate, 50.0);
        assert_eq!(stats.elapsed_secs, 1.5);

        let summary = stats.summary();
        assert!(summary.contains("Skipped:      1"));
        assert!(summary.contains("Success rate: 50.0%"));
    }
}
