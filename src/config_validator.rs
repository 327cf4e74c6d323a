//! Configuration Validation
//!
//! Validates governance configuration at startup.
//! Rejects invalid values with explicit error messages; secret values are
//! never echoed back.

/// Configuration validation errors
#[derive(Debug)]
pub struct ConfigValidationError {
    pub field: String,
    pub value: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid configuration for '{}': {} (value: {})",
            self.field, self.message, self.value
        )
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of config validation
pub type ConfigResult<T> = Result<T, Vec<ConfigValidationError>>;

const REDACTED: &str = "<redacted>";

/// Configuration validator
pub struct ConfigValidator {
    errors: Vec<ConfigValidationError>,
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Add an error
    fn error(&mut self, field: &str, value: impl std::fmt::Display, message: &str) {
        self.errors.push(ConfigValidationError {
            field: field.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        });
    }

    /// Validate positive integer
    pub fn validate_positive(&mut self, field: &str, value: i64) -> &mut Self {
        if value <= 0 {
            self.error(field, value, "Value must be positive");
        }
        self
    }

    /// Validate range (inclusive)
    pub fn validate_range(&mut self, field: &str, value: i64, min: i64, max: i64) -> &mut Self {
        if value < min || value > max {
            self.error(field, value, &format!("Value must be between {} and {}", min, max));
        }
        self
    }

    /// Validate non-empty string
    pub fn validate_non_empty(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.error(field, value, "Value cannot be empty");
        }
        self
    }

    /// Validate an absolute http(s) URL; empty values are left to `validate_non_empty`
    pub fn validate_http_url(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            return self;
        }
        match url::Url::parse(value.trim()) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => self.error(field, value, "URL must be an absolute http:// or https:// URL"),
        }
        self
    }

    /// Validate that a secret is set, without recording its value
    pub fn validate_secret_present(&mut self, field: &str, secret: &str) -> &mut Self {
        if secret.trim().is_empty() {
            self.error(field, REDACTED, "Secret must be set");
        }
        self
    }

    /// Finish validation and return result
    pub fn finish(self) -> ConfigResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    /// Check if any errors occurred
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_validation() {
        let mut v = ConfigValidator::new();
        v.validate_range("quota.reset_day", 15, 1, 31);
        assert!(v.finish().is_ok());

        let mut v = ConfigValidator::new();
        v.validate_range("quota.reset_day", 32, 1, 31);
        let err = v.finish().unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err[0].message.contains("between"));
    }

    #[test]
    fn test_url_validation() {
        let mut v = ConfigValidator::new();
        v.validate_http_url("url", "https://backend.io")
            .validate_http_url("url", "");
        assert!(!v.has_errors());

        let mut v = ConfigValidator::new();
        v.validate_http_url("url", "backend.io")
            .validate_http_url("url", "ftp://backend.io");
        assert_eq!(v.finish().unwrap_err().len(), 2);
    }

    #[test]
    fn test_secret_is_redacted() {
        let mut v = ConfigValidator::new();
        v.validate_secret_present("anon_key", " ");
        let errors = v.finish().unwrap_err();
        assert_eq!(errors[0].value, REDACTED);
    }

    #[test]
    fn test_multiple_errors() {
        let mut v = ConfigValidator::new();
        v.validate_positive("timeout", -5)
            .validate_non_empty("url", "")
            .validate_secret_present("key", "");

        let errors = v.finish().unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
