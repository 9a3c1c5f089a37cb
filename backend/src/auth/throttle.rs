//! Failed-login counter and temporary lockout.
//!
//! State lives in the client's storage as a JSON blob under
//! [`LOGIN_ATTEMPTS_KEY`]. Storage failures never reach the caller: an
//! unreadable blob counts as "no attempts recorded" and a failed write is
//! dropped after logging.

use serde::{Deserialize, Serialize};

use crate::storage::KeyValueStorage;

/// Consecutive failures allowed before the lockout kicks in.
pub const MAX_ATTEMPTS: u32 = 5;

/// Lockout length, also the window after which old failures are forgotten.
pub const LOCKOUT_DURATION_MS: i64 = 15 * 60 * 1000;

pub const LOGIN_ATTEMPTS_KEY: &str = "loginAttempts";

/// Persisted throttle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttempts {
    pub attempts: u32,
    /// Epoch milliseconds of the last failed attempt
    pub last_attempt: i64,
    /// Epoch milliseconds until which logins are refused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<i64>,
}

/// What a failed attempt did to the throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The lockout has just been triggered.
    Locked { until: i64 },
    /// More attempts are allowed.
    Remaining(u32),
}

impl LoginAttempts {
    /// Whole minutes left on an active lockout, rounded up.
    pub fn lockout_remaining_minutes(&self, now: i64) -> Option<i64> {
        match self.locked_until {
            Some(until) if now < until => Some(ceil_minutes(until - now)),
            _ => None,
        }
    }

    /// Whether the last failure is older than the lockout window.
    pub fn is_stale(&self, now: i64) -> bool {
        now - self.last_attempt > LOCKOUT_DURATION_MS
    }

    pub fn record_failure(&mut self, now: i64) -> FailureOutcome {
        self.attempts += 1;
        self.last_attempt = now;

        if self.attempts >= MAX_ATTEMPTS {
            let until = now + LOCKOUT_DURATION_MS;
            self.locked_until = Some(until);
            FailureOutcome::Locked { until }
        } else {
            FailureOutcome::Remaining(MAX_ATTEMPTS - self.attempts)
        }
    }
}

fn ceil_minutes(ms: i64) -> i64 {
    (ms + 59_999) / 60_000
}

/// Load throttle state, treating any storage or parse failure as empty.
pub fn load(storage: &dyn KeyValueStorage) -> LoginAttempts {
    match storage.get(LOGIN_ATTEMPTS_KEY) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable login attempts: {}", e);
            LoginAttempts::default()
        }),
        Ok(None) => LoginAttempts::default(),
        Err(e) => {
            tracing::warn!("Error reading login attempts: {}", e);
            LoginAttempts::default()
        }
    }
}

pub fn save(storage: &dyn KeyValueStorage, attempts: &LoginAttempts) {
    let raw = match serde_json::to_string(attempts) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("Error encoding login attempts: {}", e);
            return;
        }
    };
    if let Err(e) = storage.set(LOGIN_ATTEMPTS_KEY, &raw) {
        tracing::warn!("Error updating login attempts: {}", e);
    }
}

pub fn clear(storage: &dyn KeyValueStorage) {
    if let Err(e) = storage.remove(LOGIN_ATTEMPTS_KEY) {
        tracing::warn!("Error clearing login attempts: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageError};

    struct BrokenStorage;

    impl KeyValueStorage for BrokenStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("disk on fire".to_string()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disk on fire".to_string()))
        }
        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disk on fire".to_string()))
        }
        fn is_empty(&self) -> Result<bool, StorageError> {
            Err(StorageError::Unavailable("disk on fire".to_string()))
        }
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let attempts = LoginAttempts {
            attempts: 2,
            last_attempt: 1_000,
            locked_until: Some(2_000),
        };
        let json = serde_json::to_string(&attempts).unwrap();
        assert_eq!(json, r#"{"attempts":2,"lastAttempt":1000,"lockedUntil":2000}"#);
    }

    #[test]
    fn test_lock_after_max_attempts() {
        let mut attempts = LoginAttempts::default();
        for i in 1..MAX_ATTEMPTS {
            assert_eq!(attempts.record_failure(0), FailureOutcome::Remaining(MAX_ATTEMPTS - i));
        }
        assert_eq!(
            attempts.record_failure(0),
            FailureOutcome::Locked { until: LOCKOUT_DURATION_MS }
        );
    }

    #[test]
    fn test_remaining_minutes_rounds_up() {
        let attempts = LoginAttempts {
            attempts: MAX_ATTEMPTS,
            last_attempt: 0,
            locked_until: Some(LOCKOUT_DURATION_MS),
        };
        assert_eq!(attempts.lockout_remaining_minutes(0), Some(15));
        assert_eq!(attempts.lockout_remaining_minutes(1), Some(15));
        assert_eq!(attempts.lockout_remaining_minutes(60_001), Some(14));
        assert_eq!(attempts.lockout_remaining_minutes(LOCKOUT_DURATION_MS - 1), Some(1));
        assert_eq!(attempts.lockout_remaining_minutes(LOCKOUT_DURATION_MS), None);
    }

    #[test]
    fn test_stale_window() {
        let attempts = LoginAttempts {
            attempts: 3,
            last_attempt: 1_000,
            locked_until: None,
        };
        assert!(!attempts.is_stale(1_000 + LOCKOUT_DURATION_MS));
        assert!(attempts.is_stale(1_001 + LOCKOUT_DURATION_MS));
    }

    #[test]
    fn test_load_garbage_is_empty() {
        let storage = MemoryStorage::new();
        storage.set(LOGIN_ATTEMPTS_KEY, "{not json").unwrap();
        assert_eq!(load(&storage), LoginAttempts::default());
    }

    #[test]
    fn test_storage_errors_fail_open() {
        let storage = BrokenStorage;
        assert_eq!(load(&storage), LoginAttempts::default());
        save(&storage, &LoginAttempts::default());
        clear(&storage);
    }

    #[test]
    fn test_save_then_load() {
        let storage = MemoryStorage::new();
        let mut attempts = LoginAttempts::default();
        attempts.record_failure(42);
        save(&storage, &attempts);
        assert_eq!(load(&storage), attempts);
        clear(&storage);
        assert_eq!(load(&storage), LoginAttempts::default());
    }
}
