//! Outcome comparison and verification summaries.

use serde::{Deserialize, Serialize};

/// Result of verifying a single bind case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Name of the fixture case.
    pub case_name: String,
    /// Whether the case passed.
    pub passed: bool,
    /// Expected observation, rendered as `bound=<port|any> redirects=[..]`.
    pub expected: String,
    /// Actual observation in the same form.
    pub actual: String,
    /// Mismatch description, or an explanatory note on a tolerated deviation.
    pub diff: Option<String>,
}

/// Aggregate verification summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<VerificationResult>,
}

impl VerificationSummary {
    /// Build a summary from a list of results.
    #[must_use]
    pub fn from_results(results: Vec<VerificationResult>) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let failed = total - passed;
        Self {
            total,
            passed,
            failed,
            results,
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
