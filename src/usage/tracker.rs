//! Per-model request counters shared by all in-flight generations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::clock::{Clock, SystemClock};
use super::record::{UsageRecord, reconcile};
use crate::models::{ModelDescriptor, ModelId, ModelRegistry};

/// One row of the status view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub descriptor: ModelDescriptor,
    pub usage: UsageRecord,
    pub is_available: bool,
}

impl ModelStatus {
    pub fn remaining(&self) -> u32 {
        self.descriptor.max_requests.saturating_sub(self.usage.count)
    }

    pub fn resets_at(&self) -> DateTime<Utc> {
        chrono::TimeDelta::from_std(self.descriptor.reset_interval)
            .ok()
            .and_then(|interval| self.usage.window_start.checked_add_signed(interval))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Soft client-side quota accounting.
///
/// Counters are not locked across select-then-record, so concurrent
/// requests may overshoot a model's cap by a few requests.
#[derive(Debug)]
pub struct UsageTracker {
    registry: Arc<ModelRegistry>,
    records: DashMap<ModelId, UsageRecord>,
    clock: Arc<dyn Clock>,
}

impl UsageTracker {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self::with_clock(registry, Arc::new(SystemClock))
    }

    pub fn with_clock(registry: Arc<ModelRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            records: DashMap::new(),
            clock,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Current time on the tracker's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current usage with window expiry applied. Never stores anything.
    pub fn get_usage(&self, id: &str) -> UsageRecord {
        let now = self.clock.now();
        match self.records.get(id) {
            Some(record) => self.reconciled(id, *record, now),
            None => UsageRecord::fresh(now),
        }
    }

    pub fn record_usage(&self, id: &str) {
        let now = self.clock.now();
        if self.registry.get(id).is_none() {
            tracing::warn!(model = id, "recording usage for unregistered model");
        }

        let mut entry = self
            .records
            .entry(id.to_string())
            .or_insert_with(|| UsageRecord::fresh(now));
        let updated = self.reconciled(id, *entry, now).incremented();
        *entry = updated;

        tracing::trace!(model = id, count = updated.count, "usage recorded");
    }

    pub fn is_available(&self, descriptor: &ModelDescriptor) -> bool {
        self.get_usage(&descriptor.id).count < descriptor.max_requests
    }

    pub fn snapshot(&self) -> Vec<ModelStatus> {
        self.registry
            .iter()
            .map(|descriptor| {
                let usage = self.get_usage(&descriptor.id);
                ModelStatus {
                    is_available: usage.count < descriptor.max_requests,
                    descriptor: descriptor.clone(),
                    usage,
                }
            })
            .collect()
    }

    pub fn reset_all(&self) {
        self.records.clear();
        tracing::info!("usage counters reset");
    }

    fn reconciled(&self, id: &str, record: UsageRecord, now: DateTime<Utc>) -> UsageRecord {
        match self.registry.get(id) {
            Some(descriptor) => reconcile(record, now, descriptor.reset_interval),
            None => record,
        }
    }
}
