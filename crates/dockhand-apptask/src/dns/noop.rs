// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provider that skips DNS entirely.

use async_trait::async_trait;

use super::traits::*;
use crate::retry::RetryPolicy;

/// Accepts every call without touching DNS, including propagation waits.
/// For hosts reached through a local resolver or `/etc/hosts`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDomainProvider;

#[async_trait]
impl DomainProvider for NoopDomainProvider {
    fn provider_type(&self) -> &'static str {
        "noop"
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
        _name: &str,
        _domain: &str,
        _record_type: RecordType,
        _values: &[String],
    ) -> Result<()> {
        Ok(())
    }

    async fn remove_records(
        &self,
        _name: &str,
        _domain: &str,
        _record_type: RecordType,
        _values: &[String],
    ) -> Result<()> {
        Ok(())
    }

    async fn wait_for_record(
        &self,
        _fqdn: &str,
        _domain: &str,
        _record_type: RecordType,
        _value: &str,
        _policy: RetryPolicy,
    ) -> Result<()> {
        Ok(())
    }
}
