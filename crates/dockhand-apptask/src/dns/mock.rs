// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock DNS provider for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dockhand_core::app::fqdn;
use tokio::sync::Mutex;

use super::traits::*;
use crate::retry::{RetryPolicy, retry};

/// In-memory DNS zone keyed by fqdn and record type.
pub struct MockDomainProvider {
    records: Arc<Mutex<HashMap<(String, RecordType), Vec<String>>>>,
    /// Number of mutations answered with `StillBusy` before succeeding
    pub still_busy: AtomicU32,
    mutations: AtomicU32,
    removals: Arc<Mutex<Vec<String>>>,
    waits: Arc<Mutex<Vec<String>>>,
    /// If true, every mutation fails with `AccessDenied`
    pub should_fail: bool,
}

impl Default for MockDomainProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDomainProvider {
    /// Create an empty zone.
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            still_busy: AtomicU32::new(0),
            mutations: AtomicU32::new(0),
            removals: Arc::new(Mutex::new(Vec::new())),
            waits: Arc::new(Mutex::new(Vec::new())),
            should_fail: false,
        }
    }

    /// Create a provider that rejects every mutation.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    /// Create a provider that answers the first `n` mutations with `StillBusy`.
    pub fn busy(n: u32) -> Self {
        let provider = Self::new();
        provider.still_busy.store(n, Ordering::SeqCst);
        provider
    }

    /// Seed an A record.
    pub async fn with_record(self, fqdn: &str, value: &str) -> Self {
        self.records
            .lock()
            .await
            .insert((fqdn.to_string(), RecordType::A), vec![value.to_string()]);
        self
    }

    /// Current A record values for `fqdn`.
    pub async fn records(&self, fqdn: &str) -> Option<Vec<String>> {
        self.records
            .lock()
            .await
            .get(&(fqdn.to_string(), RecordType::A))
            .cloned()
    }

    /// Every A record, keyed by fqdn.
    pub async fn a_records(&self) -> BTreeMap<String, Vec<String>> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|((_, record_type), _)| *record_type == RecordType::A)
            .map(|((fqdn, _), values)| (fqdn.clone(), values.clone()))
            .collect()
    }

    /// Fqdns removed, in order.
    pub async fn removals(&self) -> Vec<String> {
        self.removals.lock().await.clone()
    }

    /// Fqdns waited on for propagation, in order.
    pub async fn waits(&self) -> Vec<String> {
        self.waits.lock().await.clone()
    }

    /// Number of successful upserts and removals.
    pub fn mutation_count(&self) -> u32 {
        self.mutations.load(Ordering::SeqCst)
    }

    fn check_mutation(&self) -> Result<()> {
        if self.should_fail {
            return Err(DomainError::AccessDenied("mock provider rejects writes".into()));
        }
        let busy = self
            .still_busy
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if busy.is_ok() {
            return Err(DomainError::StillBusy);
        }
        Ok(())
    }
}

#[async_trait]
impl DomainProvider for MockDomainProvider {
    fn provider_type(&self) -> &'static str {
        "mock"
    }

    async fn get_records(
        &self,
        name: &str,
        domain: &str,
        record_type: RecordType,
    ) -> Result<Vec<String>> {
        let records = self.records.lock().await;
        Ok(records
            .get(&(fqdn(name, domain), record_type))
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_records(
        &self,
        name: &str,
        domain: &str,
        record_type: RecordType,
        values: &[String],
    ) -> Result<()> {
        self.check_mutation()?;
        self.records
            .lock()
            .await
            .insert((fqdn(name, domain), record_type), values.to_vec());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_records(
        &self,
        name: &str,
        domain: &str,
        record_type: RecordType,
        _values: &[String],
    ) -> Result<()> {
        self.check_mutation()?;
        let key = (fqdn(name, domain), record_type);
        match self.records.lock().await.remove(&key) {
            Some(_) => {
                self.mutations.fetch_add(1, Ordering::SeqCst);
                self.removals.lock().await.push(key.0);
                Ok(())
            }
            None => Err(DomainError::NotFound(key.0)),
        }
    }

    async fn wait_for_record(
        &self,
        fqdn: &str,
        _domain: &str,
        record_type: RecordType,
        value: &str,
        policy: RetryPolicy,
    ) -> Result<()> {
        self.waits.lock().await.push(fqdn.to_string());
        let key = (fqdn.to_string(), record_type);
        retry(
            policy,
            "dns_propagation",
            |_| {
                let records = self.records.clone();
                let key = key.clone();
                async move {
                    let records = records.lock().await;
                    match records.get(&key) {
                        Some(values) if values.iter().any(|v| v == value) => Ok(()),
                        _ => Err(DomainError::ExternalError(format!(
                            "{} does not resolve to {} yet",
                            key.0, value
                        ))),
                    }
                }
            },
            DomainError::is_retryable,
        )
        .await
    }
}
