//! Field-level validation with typed aggregation.
//!
//! Boundary checks collect every failing field before reporting, so a bad
//! config or payload surfaces all problems in one pass instead of one per
//! restart.

use serde::Serialize;

use crate::error::Fr0gError;

/// One failed check, addressed by dotted field path.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

/// Accumulates validation issues across many fields.
#[derive(Debug, Default)]
pub struct Validator {
    issues: Vec<ValidationIssue>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            field: field.to_string(),
            message: message.into(),
        });
    }

    /// TCP port must be in [1, 65535]. Zero means "unset" and fails.
    pub fn port(&mut self, field: &str, value: u32) {
        if value == 0 || value > 65_535 {
            self.fail(field, format!("port {value} outside [1, 65535]"));
        }
    }

    /// URL must be non-empty and carry an http(s) scheme.
    pub fn url(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.fail(field, "URL must not be empty");
        } else if !value.starts_with("http://") && !value.starts_with("https://") {
            self.fail(field, format!("URL '{value}' must start with http:// or https://"));
        }
    }

    /// Inclusive numeric range check.
    pub fn range_f64(&mut self, field: &str, value: f64, min: f64, max: f64) {
        if !(min..=max).contains(&value) {
            self.fail(field, format!("{value} outside [{min}, {max}]"));
        }
    }

    pub fn range_u64(&mut self, field: &str, value: u64, min: u64, max: u64) {
        if !(min..=max).contains(&value) {
            self.fail(field, format!("{value} outside [{min}, {max}]"));
        }
    }

    pub fn positive(&mut self, field: &str, value: u64) {
        if value == 0 {
            self.fail(field, "must be greater than zero");
        }
    }

    pub fn non_empty(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.fail(field, "must not be empty");
        }
    }

    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Collapse into a single error listing every failing field.
    pub fn finish(self) -> Result<(), Fr0gError> {
        if self.issues.is_empty() {
            return Ok(());
        }
        let summary = self
            .issues
            .iter()
            .map(|i| format!("{}: {}", i.field, i.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(Fr0gError::Validation(summary))
    }
}

/// Validate a downstream health response.
///
/// A `"healthy"` status combined with a non-empty `error` field is rejected:
/// the two are contradictory and the reporting service is misbehaving.
pub fn validate_health_response(status: &str, error: Option<&str>) -> Result<(), Fr0gError> {
    let mut v = Validator::new();
    match status {
        "healthy" | "ok" => {
            if error.is_some_and(|e| !e.is_empty()) {
                v.fail("error", "must be empty when status is healthy");
            }
        }
        "degraded" | "unhealthy" => {}
        other => v.fail("status", format!("unknown health status '{other}'")),
    }
    v.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_aggregates_all_failures() {
        let mut v = Validator::new();
        v.port("http.port", 0);
        v.url("registry.url", "ftp://nope");
        v.range_f64("mcp.adaptation_threshold", 1.5, 0.0, 1.0);
        assert_eq!(v.issues().len(), 3);
        let err = v.finish().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("http.port"));
        assert!(msg.contains("registry.url"));
        assert!(msg.contains("adaptation_threshold"));
    }

    #[test]
    fn valid_fields_pass() {
        let mut v = Validator::new();
        v.port("http.port", 8080);
        v.url("openwebui.base_url", "http://localhost:3000");
        v.range_f64("threshold", 0.5, 0.0, 1.0);
        v.positive("timeout", 30);
        assert!(v.finish().is_ok());
    }

    #[test]
    fn healthy_with_error_is_rejected() {
        assert!(validate_health_response("healthy", Some("boom")).is_err());
        assert!(validate_health_response("healthy", None).is_ok());
        assert!(validate_health_response("healthy", Some("")).is_ok());
        assert!(validate_health_response("degraded", Some("partial outage")).is_ok());
    }
}
