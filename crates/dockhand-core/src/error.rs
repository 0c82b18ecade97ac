// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for dockhand-core.
//!
//! Provides a unified error type for the record store and the state machine.

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors raised by the app record store and transition checks.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// App was not found in the database.
    AppNotFound {
        /// The app ID that was not found.
        app_id: String,
    },

    /// App already exists (duplicate insert).
    AppAlreadyExists {
        /// The app ID that already exists.
        app_id: String,
    },

    /// A constrained update matched the row but not its state predicate.
    StateConflict {
        /// The app ID.
        app_id: String,
        /// Human readable rendering of the violated constraint.
        constraint: String,
    },

    /// The requested target state cannot be issued from the current state.
    InvalidTransition {
        /// The app ID.
        app_id: String,
        /// Current installation state.
        current: String,
        /// Requested installation state.
        target: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AppNotFound { .. } => "APP_NOT_FOUND",
            Self::AppAlreadyExists { .. } => "APP_ALREADY_EXISTS",
            Self::StateConflict { .. } => "STATE_CONFLICT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }

    /// Whether the error reports a lost compare-and-swap race or an illegal transition.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::StateConflict { .. } | Self::InvalidTransition { .. }
        )
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AppNotFound { app_id } => write!(f, "App '{}' not found", app_id),
            Self::AppAlreadyExists { app_id } => write!(f, "App '{}' already exists", app_id),
            Self::StateConflict { app_id, constraint } => {
                write!(
                    f,
                    "App '{}' is not in a state that allows this change ({})",
                    app_id, constraint
                )
            }
            Self::InvalidTransition {
                app_id,
                current,
                target,
            } => {
                write!(
                    f,
                    "App '{}' cannot move from '{}' to '{}'",
                    app_id, current, target
                )
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let cases = vec![
            (
                CoreError::AppNotFound {
                    app_id: "a".into(),
                },
                "APP_NOT_FOUND",
            ),
            (
                CoreError::StateConflict {
                    app_id: "a".into(),
                    constraint: "installation_state IN (installed)".into(),
                },
                "STATE_CONFLICT",
            ),
            (
                CoreError::InvalidTransition {
                    app_id: "a".into(),
                    current: "error".into(),
                    target: "pending_update".into(),
                },
                "INVALID_TRANSITION",
            ),
            (
                CoreError::DatabaseError {
                    operation: "query".into(),
                    details: "boom".into(),
                },
                "DATABASE_ERROR",
            ),
        ];

        for (err, code) in cases {
            assert_eq!(err.error_code(), code);
        }
    }

    #[test]
    fn test_conflict_classification() {
        let conflict = CoreError::StateConflict {
            app_id: "a".into(),
            constraint: "x".into(),
        };
        assert!(conflict.is_conflict());
        assert!(
            !CoreError::AppNotFound {
                app_id: "a".into()
            }
            .is_conflict()
        );
    }

    #[test]
    fn test_display_mentions_states() {
        let err = CoreError::InvalidTransition {
            app_id: "app-1".into(),
            current: "error".into(),
            target: "pending_backup".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("app-1"));
        assert!(msg.contains("error"));
        assert!(msg.contains("pending_backup"));
    }
}
