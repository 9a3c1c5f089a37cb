//! Admin authentication: credential check, login throttle and session flags.
//!
//! Session flags and throttle state both live in the calling client's
//! [`KeyValueStorage`]. The two lifecycles are independent; what happens to
//! the throttle on logout is decided by [`LogoutPolicy`].

pub mod credentials;
pub mod throttle;

pub use credentials::{CredentialVerifier, StaticCredentials};
pub use throttle::{LoginAttempts, LOCKOUT_DURATION_MS, MAX_ATTEMPTS};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::storage::KeyValueStorage;
use throttle::FailureOutcome;

pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const AUTH_TOKEN_VALUE: &str = "admin_authenticated";
pub const USER_ROLE_KEY: &str = "user_role";
pub const USER_ROLE_VALUE: &str = "admin";

/// What logout does to the failed-attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutPolicy {
    /// Forget all failed attempts, even during an active lockout.
    #[default]
    ClearThrottle,
    /// Leave the throttle untouched.
    KeepThrottle,
}

/// Result of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginOutcome {
    pub success: bool,
    pub message: String,
}

impl LoginOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            message: "Login successful.".to_string(),
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
        }
    }
}

fn lockout_message(minutes: i64) -> String {
    format!("Account locked. Try again in {} minutes.", minutes)
}

/// Admin login gate.
pub struct AdminAuth {
    verifier: Arc<dyn CredentialVerifier>,
    clock: Arc<dyn Clock>,
    logout_policy: LogoutPolicy,
}

impl AdminAuth {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        clock: Arc<dyn Clock>,
        logout_policy: LogoutPolicy,
    ) -> Self {
        Self {
            verifier,
            clock,
            logout_policy,
        }
    }

    pub fn logout_policy(&self) -> LogoutPolicy {
        self.logout_policy
    }

    /// Attempt an admin login on behalf of the client owning `storage`.
    pub fn attempt_login(
        &self,
        storage: &dyn KeyValueStorage,
        username: &str,
        password: &str,
    ) -> LoginOutcome {
        let now = self.clock.now_ms();
        let mut attempts = throttle::load(storage);

        if let Some(minutes) = attempts.lockout_remaining_minutes(now) {
            tracing::debug!("Login refused, locked for {} more minutes", minutes);
            return LoginOutcome::failed(lockout_message(minutes));
        }

        if attempts.is_stale(now) {
            attempts = LoginAttempts::default();
            throttle::clear(storage);
        }

        if self.verifier.verify(username, password) {
            throttle::clear(storage);
            set_flag(storage, AUTH_TOKEN_KEY, AUTH_TOKEN_VALUE);
            set_flag(storage, USER_ROLE_KEY, USER_ROLE_VALUE);
            tracing::info!("Admin login succeeded for {}", username);
            return LoginOutcome::ok();
        }

        let outcome = attempts.record_failure(now);
        throttle::save(storage, &attempts);

        match outcome {
            FailureOutcome::Locked { until } => {
                tracing::warn!(
                    "Admin login locked until {} after {} failed attempts (last username: {})",
                    until,
                    attempts.attempts,
                    username
                );
                let minutes = attempts.lockout_remaining_minutes(now).unwrap_or(0);
                LoginOutcome::failed(lockout_message(minutes))
            }
            FailureOutcome::Remaining(left) => {
                tracing::info!("Admin login failed for {}, {} attempts left", username, left);
                LoginOutcome::failed(format!("Invalid credentials. {} attempts remaining.", left))
            }
        }
    }

    /// Whether both session flags hold their expected values.
    pub fn is_authenticated(&self, storage: &dyn KeyValueStorage) -> bool {
        let flag_matches = |key: &str, expected: &str| match storage.get(key) {
            Ok(value) => value.as_deref() == Some(expected),
            Err(e) => {
                tracing::warn!("Auth check error: {}", e);
                false
            }
        };
        flag_matches(AUTH_TOKEN_KEY, AUTH_TOKEN_VALUE) && flag_matches(USER_ROLE_KEY, USER_ROLE_VALUE)
    }

    /// End the session. Throttle handling follows the configured policy.
    pub fn logout(&self, storage: &dyn KeyValueStorage) {
        remove_flag(storage, AUTH_TOKEN_KEY);
        remove_flag(storage, USER_ROLE_KEY);
        if self.logout_policy == LogoutPolicy::ClearThrottle {
            throttle::clear(storage);
        }
    }

    /// Current throttle state for the client, for diagnostics.
    pub fn attempts(&self, storage: &dyn KeyValueStorage) -> LoginAttempts {
        throttle::load(storage)
    }
}

fn set_flag(storage: &dyn KeyValueStorage, key: &str, value: &str) {
    if let Err(e) = storage.set(key, value) {
        tracing::warn!("Error setting {}: {}", key, e);
    }
}

fn remove_flag(storage: &dyn KeyValueStorage, key: &str) {
    if let Err(e) = storage.remove(key) {
        tracing::warn!("Error removing {}: {}", key, e);
    }
}
