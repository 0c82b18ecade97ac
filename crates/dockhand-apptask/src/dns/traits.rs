// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! DNS provider trait and error taxonomy.

use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::retry::{RetryPolicy, retry};

/// DNS record types the executor manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// IPv4 address.
    A,
    /// IPv6 address.
    Aaaa,
    /// Canonical name.
    Cname,
    /// Text record.
    Txt,
}

impl RecordType {
    /// Wire name of the record type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Txt => "TXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DNS provider errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DomainError {
    /// Record or zone does not exist.
    #[error("DNS Record not found: {0}")]
    NotFound(String),

    /// Record exists with a value this app did not set.
    #[error("DNS Record already exists: {0}")]
    AlreadyExists(String),

    /// Provider API failed or timed out.
    #[error("DNS provider error: {0}")]
    ExternalError(String),

    /// Provider rejected a field.
    #[error("Bad DNS field: {0}")]
    BadField(String),

    /// Provider is processing a previous change.
    #[error("DNS provider is still busy")]
    StillBusy,

    /// Credentials rejected.
    #[error("DNS access denied: {0}")]
    AccessDenied(String),

    /// Unexpected provider behavior.
    #[error("DNS internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Whether the call may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StillBusy | Self::ExternalError(_))
    }
}

/// Result type for DNS operations.
pub type Result<T> = std::result::Result<T, DomainError>;

/// DNS/domain provider.
///
/// `name` is the subdomain part (empty for the zone apex) and `domain` the
/// zone it lives in.
#[async_trait]
pub trait DomainProvider: Send + Sync {
    /// Provider name for logging.
    fn provider_type(&self) -> &'static str;

    /// Current values of a record set, empty when absent.
    async fn get_records(
        &self,
        name: &str,
        domain: &str,
        record_type: RecordType,
    ) -> Result<Vec<String>>;

    /// Create or replace a record set.
    async fn upsert_records(
        &self,
        name: &str,
        domain: &str,
        record_type: RecordType,
        values: &[String],
    ) -> Result<()>;

    /// Remove a record set. Fails with `NotFound` when absent.
    async fn remove_records(
        &self,
        name: &str,
        domain: &str,
        record_type: RecordType,
        values: &[String],
    ) -> Result<()>;

    /// Poll until `fqdn` resolves to `value`, giving up after `policy`.
    ///
    /// The default implementation uses the system resolver and only
    /// understands address records.
    async fn wait_for_record(
        &self,
        fqdn: &str,
        _domain: &str,
        record_type: RecordType,
        value: &str,
        policy: RetryPolicy,
    ) -> Result<()> {
        if !matches!(record_type, RecordType::A | RecordType::Aaaa) {
            return Err(DomainError::BadField(format!(
                "cannot wait for {} records",
                record_type
            )));
        }
        let expected: IpAddr = value
            .parse()
            .map_err(|_| DomainError::BadField(format!("invalid address {}", value)))?;

        retry(
            policy,
            "dns_propagation",
            |attempt| async move {
                debug!(fqdn, attempt, "Checking DNS propagation");
                let resolved = tokio::net::lookup_host((fqdn, 0))
                    .await
                    .map_err(|e| {
                        DomainError::ExternalError(format!("{} does not resolve: {}", fqdn, e))
                    })?;
                if resolved.map(|addr| addr.ip()).any(|ip| ip == expected) {
                    Ok(())
                } else {
                    Err(DomainError::ExternalError(format!(
                        "{} does not resolve to {} yet",
                        fqdn, expected
                    )))
                }
            },
            DomainError::is_retryable,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DomainError::StillBusy.is_retryable());
        assert!(DomainError::ExternalError("timeout".into()).is_retryable());
        assert!(!DomainError::NotFound("x".into()).is_retryable());
        assert!(!DomainError::AlreadyExists("x".into()).is_retryable());
        assert!(!DomainError::AccessDenied("x".into()).is_retryable());
    }

    #[test]
    fn test_record_type_display() {
        assert_eq!(RecordType::A.to_string(), "A");
        assert_eq!(RecordType::Aaaa.to_string(), "AAAA");
    }
}
