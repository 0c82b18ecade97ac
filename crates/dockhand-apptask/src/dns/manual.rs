// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provider for manually managed DNS.

use async_trait::async_trait;
use tracing::debug;

use super::traits::*;

/// Leaves records to the operator but still waits for them to resolve
/// through the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualDomainProvider;

#[async_trait]
impl DomainProvider for ManualDomainProvider {
    fn provider_type(&self) -> &'static str {
        "manual"
    }

    async fn get_records(
        &self,
        _name: &str,
        _domain: &str,
        _record_type: RecordType,
    ) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn upsert_records(
        &self,
        name: &str,
        domain: &str,
        record_type: RecordType,
        values: &[String],
    ) -> Result<()> {
        debug!(name, domain, %record_type, ?values, "Record must be created manually");
        Ok(())
    }

    async fn remove_records(
        &self,
        name: &str,
        domain: &str,
        record_type: RecordType,
        _values: &[String],
    ) -> Result<()> {
        debug!(name, domain, %record_type, "Record must be removed manually");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;

    #[tokio::test]
    async fn test_waits_on_system_resolver() {
        let provider = ManualDomainProvider;
        provider
            .wait_for_record(
                "localhost",
                "localhost",
                RecordType::A,
                "127.0.0.1",
                RetryPolicy::once(),
            )
            .await
            .unwrap();

        let err = provider
            .wait_for_record(
                "localhost",
                "localhost",
                RecordType::A,
                "203.0.113.10",
                RetryPolicy::immediate(2),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ExternalError(_)));
    }

    #[tokio::test]
    async fn test_writes_are_accepted() {
        let provider = ManualDomainProvider;
        provider
            .upsert_records("notes", "example.com", RecordType::A, &["203.0.113.10".into()])
            .await
            .unwrap();
        provider
            .remove_records("notes", "example.com", RecordType::A, &[])
            .await
            .unwrap();
        assert!(
            provider
                .get_records("notes", "example.com", RecordType::A)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
