//! # Magic Links (Passwordless Authentication)
//!
//! Local checks run before a magic-link challenge reaches the backend:
//! email format and a per-email hourly rate limit. Token issuance and
//! verification belong to the backend.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::errors::{AuthError, AuthResult};

// ==================
// Rate Limiting
// ==================

/// Map size at which closed windows are swept before inserting a new email
const PRUNE_THRESHOLD: usize = 1024;

/// Rate limit entry
#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: DateTime<Utc>,
}

// ==================
// Magic Link Guard
// ==================

/// Pre-flight checks for magic-link requests
pub struct MagicLinkGuard {
    /// Maximum requests per email per hour
    rate_limit: u32,
    /// Keyed by hashed, lower-cased email
    rate_limits: Mutex<HashMap<String, RateLimitEntry>>,
}

impl MagicLinkGuard {
    pub fn new(rate_limit: u32) -> Self {
        Self {
            rate_limit,
            rate_limits: Mutex::new(HashMap::new()),
        }
    }

    /// Validate the email and count one request against its hourly budget
    pub fn admit(&self, email: &str) -> AuthResult<()> {
        self.admit_at(email, Utc::now())
    }

    /// [`admit`](Self::admit) at an explicit instant
    pub fn admit_at(&self, email: &str, now: DateTime<Utc>) -> AuthResult<()> {
        if !is_valid_email(email) {
            return Err(AuthError::InvalidEmail("Invalid email format".to_string()));
        }

        let key = hash_email(email);
        let hour_ago = now - Duration::hours(1);
        let mut rate_limits = self.rate_limits.lock();

        if rate_limits.len() >= PRUNE_THRESHOLD && !rate_limits.contains_key(&key) {
            rate_limits.retain(|_, entry| entry.window_start > hour_ago);
        }

        let entry = rate_limits.entry(key).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });

        if entry.window_start <= hour_ago {
            // Reset window
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.rate_limit {
            return Err(AuthError::RateLimitExceeded(
                "Too many sign-in links requested. Please try again later.".to_string(),
            ));
        }

        entry.count += 1;
        Ok(())
    }

    /// Drop windows that closed before `now`
    pub fn cleanup_expired(&self, now: DateTime<Utc>) {
        let hour_ago = now - Duration::hours(1);
        self.rate_limits
            .lock()
            .retain(|_, entry| entry.window_start > hour_ago);
    }
}

// ==================
// Helper Functions
// ==================

/// Hash an email for use as a map key
fn hash_email(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

/// Basic email validation
pub fn is_valid_email(email: &str) -> bool {
    let parts: Vec<&str> = email.trim().split('@').collect();
    if parts.len() != 2 {
        return false;
    }

    let local = parts[0];
    let domain = parts[1];

    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}
