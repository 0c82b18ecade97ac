// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! DNS registration for app hostnames.
//!
//! The provider trait is a thin record-set API. Ownership rules live in
//! [`register_subdomain`] and [`unregister_subdomain`]: a record that
//! already points elsewhere is only replaced with `overwrite`, and a
//! record that is already gone counts as removed.

pub mod manual;
pub mod mock;
pub mod noop;
pub mod traits;

pub use manual::ManualDomainProvider;
pub use mock::MockDomainProvider;
pub use noop::NoopDomainProvider;
pub use traits::*;

use dockhand_core::app::fqdn;
use tracing::{debug, info};

use crate::retry::{RetryPolicy, retry};

/// Point `name.domain` at `ip`.
///
/// A record that already holds exactly `ip` is left alone. A record with
/// any other value fails with [`DomainError::AlreadyExists`] unless
/// `overwrite` is set, without mutating the provider. Transient provider
/// errors are retried under `policy`.
pub async fn register_subdomain(
    provider: &dyn DomainProvider,
    policy: RetryPolicy,
    name: &str,
    domain: &str,
    ip: &str,
    overwrite: bool,
) -> Result<()> {
    let hostname = fqdn(name, domain);
    info!(
        fqdn = %hostname,
        ip,
        overwrite,
        provider = provider.provider_type(),
        "Registering subdomain"
    );

    let hostname = hostname.as_str();
    retry(
        policy,
        "dns_register",
        |_| async move {
            let existing = provider.get_records(name, domain, RecordType::A).await?;
            if existing.len() == 1 && existing[0] == ip {
                debug!(fqdn = %hostname, "Subdomain already registered");
                return Ok(());
            }
            if !existing.is_empty() && !overwrite {
                return Err(DomainError::AlreadyExists(hostname.to_string()));
            }
            provider
                .upsert_records(name, domain, RecordType::A, &[ip.to_string()])
                .await
        },
        DomainError::is_retryable,
    )
    .await
}

/// Remove the A record of `name.domain`. A missing record is success.
pub async fn unregister_subdomain(
    provider: &dyn DomainProvider,
    policy: RetryPolicy,
    name: &str,
    domain: &str,
    ip: &str,
) -> Result<()> {
    let hostname = fqdn(name, domain);
    info!(fqdn = %hostname, provider = provider.provider_type(), "Unregistering subdomain");

    let removed = retry(
        policy,
        "dns_unregister",
        |_| async move {
            provider
                .remove_records(name, domain, RecordType::A, &[ip.to_string()])
                .await
        },
        DomainError::is_retryable,
    )
    .await;

    match removed {
        Err(DomainError::NotFound(_)) => {
            debug!(fqdn = %hostname, "Subdomain already unregistered");
            Ok(())
        }
        other => other,
    }
}

/// Wait until `name.domain` resolves to `ip`.
pub async fn wait_for_subdomain(
    provider: &dyn DomainProvider,
    policy: RetryPolicy,
    name: &str,
    domain: &str,
    ip: &str,
) -> Result<()> {
    let hostname = fqdn(name, domain);
    info!(fqdn = %hostname, ip, "Waiting for DNS propagation");
    provider
        .wait_for_record(&hostname, domain, RecordType::A, ip, policy)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    const IP: &str = "203.0.113.10";

    #[tokio::test]
    async fn test_register_creates_record() {
        let provider = MockDomainProvider::new();
        register_subdomain(&provider, RetryPolicy::once(), "notes", "example.com", IP, false)
            .await
            .unwrap();
        assert_eq!(
            provider.records("notes.example.com").await,
            Some(vec![IP.to_string()])
        );
        assert_eq!(provider.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_register_same_value_is_silent() {
        let provider = MockDomainProvider::new()
            .with_record("notes.example.com", IP)
            .await;
        register_subdomain(&provider, RetryPolicy::once(), "notes", "example.com", IP, false)
            .await
            .unwrap();
        assert_eq!(provider.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_register_conflict_does_not_mutate() {
        let provider = MockDomainProvider::new()
            .with_record("notes.example.com", "198.51.100.7")
            .await;
        let err =
            register_subdomain(&provider, RetryPolicy::once(), "notes", "example.com", IP, false)
                .await
                .unwrap_err();

        assert_eq!(err, DomainError::AlreadyExists("notes.example.com".into()));
        assert_eq!(provider.mutation_count(), 0);
        assert_eq!(
            provider.records("notes.example.com").await,
            Some(vec!["198.51.100.7".to_string()])
        );
    }

    #[tokio::test]
    async fn test_register_overwrite_replaces_record() {
        let provider = MockDomainProvider::new()
            .with_record("notes.example.com", "198.51.100.7")
            .await;
        register_subdomain(&provider, RetryPolicy::once(), "notes", "example.com", IP, true)
            .await
            .unwrap();
        assert_eq!(
            provider.records("notes.example.com").await,
            Some(vec![IP.to_string()])
        );
    }

    #[tokio::test]
    async fn test_register_retries_busy_provider() {
        let provider = MockDomainProvider::busy(2);
        register_subdomain(
            &provider,
            RetryPolicy::immediate(3),
            "notes",
            "example.com",
            IP,
            false,
        )
        .await
        .unwrap();
        assert_eq!(provider.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_register_gives_up_after_budget() {
        let provider = MockDomainProvider::busy(5);
        let err = register_subdomain(
            &provider,
            RetryPolicy::immediate(2),
            "notes",
            "example.com",
            IP,
            false,
        )
        .await
        .unwrap_err();
        assert_eq!(err, DomainError::StillBusy);
    }

    #[tokio::test]
    async fn test_unregister_missing_record_is_ok() {
        let provider = MockDomainProvider::new();
        unregister_subdomain(&provider, RetryPolicy::once(), "notes", "example.com", IP)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unregister_apex() {
        let provider = MockDomainProvider::new().with_record("example.com", IP).await;
        unregister_subdomain(&provider, RetryPolicy::once(), "", "example.com", IP)
            .await
            .unwrap();
        assert_eq!(provider.records("example.com").await, None);
    }

    #[tokio::test]
    async fn test_wait_for_subdomain() {
        let provider = MockDomainProvider::new()
            .with_record("notes.example.com", IP)
            .await;
        wait_for_subdomain(&provider, RetryPolicy::once(), "notes", "example.com", IP)
            .await
            .unwrap();

        let err = wait_for_subdomain(
            &provider,
            RetryPolicy::immediate(2),
            "wiki",
            "example.com",
            IP,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DomainError::ExternalError(_)));
    }

    #[tokio::test]
    async fn test_noop_provider_accepts_everything() {
        let provider = NoopDomainProvider;
        register_subdomain(&provider, RetryPolicy::once(), "notes", "example.com", IP, false)
            .await
            .unwrap();
        wait_for_subdomain(&provider, RetryPolicy::once(), "notes", "example.com", IP)
            .await
            .unwrap();
        unregister_subdomain(&provider, RetryPolicy::once(), "notes", "example.com", IP)
            .await
            .unwrap();
    }
}
