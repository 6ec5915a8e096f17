//! In-memory store implementations for unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use uuid::Uuid;

use super::{AggregateStore, EntityDirectory, EntityKind, ReadingStore, RollupRange, SystemLog};
use crate::models::{
    AggregateResult, DateWindow, MetricKey, MetricValue, MonthlyAggregateRow, MonthlySummary,
    NewReading, ReadingPoint, ReadingRow, StoredReading,
};

// ---

fn in_window(window: DateWindow, day: NaiveDate) -> bool {
    window.start <= day && day <= window.end
}

#[derive(Default)]
pub struct MemoryReadingStore {
    rows: Mutex<Vec<StoredReading>>,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub calls: AtomicUsize,
}

impl MemoryReadingStore {
    pub fn all(&self) -> Vec<StoredReading> {
        self.rows.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn matching(&self, farm_id: Uuid, system_id: Uuid, window: DateWindow) -> Vec<StoredReading> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.farm_id == farm_id && r.system_id == system_id)
            .filter(|r| in_window(window, r.created_at.date_naive()))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn append(&self, reading: &NewReading) -> Result<StoredReading> {
        self.touch();
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("write refused");
        }
        let stored = StoredReading {
            id: Uuid::new_v4(),
            farm_id: reading.farm_id,
            system_id: reading.system_id,
            ppm: reading.ppm,
            ph: reading.ph,
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn bulk_append(&self, rows: &[ReadingRow]) -> Result<u64> {
        self.touch();
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("write refused");
        }
        let mut stored = self.rows.lock().unwrap();
        for row in rows {
            stored.push(StoredReading {
                id: Uuid::new_v4(),
                farm_id: row.farm_id,
                system_id: row.system_id,
                ppm: row.ppm,
                ph: row.ph,
                created_at: row.created_at,
            });
        }
        Ok(rows.len() as u64)
    }

    async fn range(
        &self,
        farm_id: Uuid,
        system_id: Uuid,
        window: DateWindow,
    ) -> Result<Vec<ReadingPoint>> {
        self.touch();
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("read refused");
        }
        Ok(self
            .matching(farm_id, system_id, window)
            .into_iter()
            .map(|r| ReadingPoint {
                ppm: r.ppm,
                ph: r.ph,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn live_aggregate(
        &self,
        farm_id: Uuid,
        system_id: Uuid,
        window: DateWindow,
    ) -> Result<AggregateResult> {
        self.touch();
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("read refused");
        }
        let rows = self.matching(farm_id, system_id, window);
        if rows.is_empty() {
            return Ok(AggregateResult::default());
        }
        let mut result = AggregateResult {
            total_data: rows.len() as i64,
            min_ppm: f64::INFINITY,
            max_ppm: f64::NEG_INFINITY,
            min_ph: f64::INFINITY,
            max_ph: f64::NEG_INFINITY,
            ..Default::default()
        };
        for r in &rows {
            result.total_ppm += r.ppm;
            result.total_ph += r.ph;
            result.min_ppm = result.min_ppm.min(r.ppm);
            result.max_ppm = result.max_ppm.max(r.ppm);
            result.min_ph = result.min_ph.min(r.ph);
            result.max_ph = result.max_ph.max(r.ph);
        }
        Ok(result.with_averages())
    }

    async fn monthly_summaries(&self, range: RollupRange) -> Result<Vec<MonthlySummary>> {
        self.touch();
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("read refused");
        }
        let mut groups: BTreeMap<(i32, u32, Uuid, Uuid), MonthlySummary> = BTreeMap::new();
        for r in self.rows.lock().unwrap().iter() {
            let after_start = range.from.map_or(true, |from| r.created_at >= from);
            if !after_start || r.created_at >= range.until {
                continue;
            }
            let key = (r.created_at.year(), r.created_at.month(), r.farm_id, r.system_id);
            let entry = groups.entry(key).or_insert_with(|| MonthlySummary {
                farm_id: r.farm_id,
                system_id: r.system_id,
                year: r.created_at.year(),
                month: r.created_at.month() as i32,
                total_data: 0,
                total_ppm: 0.0,
                total_ph: 0.0,
                max_ppm: r.ppm,
                min_ppm: r.ppm,
                max_ph: r.ph,
                min_ph: r.ph,
            });
            entry.total_data += 1;
            entry.total_ppm += r.ppm;
            entry.total_ph += r.ph;
            entry.max_ppm = entry.max_ppm.max(r.ppm);
            entry.min_ppm = entry.min_ppm.min(r.ppm);
            entry.max_ph = entry.max_ph.max(r.ph);
            entry.min_ph = entry.min_ph.min(r.ph);
        }
        Ok(groups.into_values().collect())
    }
}

// ---

#[derive(Default)]
pub struct MemoryAggregateStore {
    rows: Mutex<Vec<MonthlyAggregateRow>>,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub calls: AtomicUsize,
}

impl MemoryAggregateStore {
    pub fn all(&self) -> Vec<MonthlyAggregateRow> {
        self.rows.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AggregateStore for MemoryAggregateStore {
    async fn bulk_insert(&self, rows: &[MonthlyAggregateRow]) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("write refused");
        }
        self.rows.lock().unwrap().extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn pivot(
        &self,
        farm_id: Uuid,
        system_id: Uuid,
        window: DateWindow,
    ) -> Result<Vec<MetricValue>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("read refused");
        }
        let rows = self.rows.lock().unwrap();
        let in_range: Vec<&MonthlyAggregateRow> = rows
            .iter()
            .filter(|r| r.farm_id == farm_id && r.system_id == system_id)
            .filter(|r| r.bucket_date().is_some_and(|d| in_window(window, d)))
            .collect();
        Ok(MetricKey::ALL
            .into_iter()
            .map(|metric| {
                let values: Vec<f64> = in_range
                    .iter()
                    .filter(|r| r.metric == metric)
                    .map(|r| r.value)
                    .collect();
                let value = if values.is_empty() {
                    0.0
                } else {
                    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                    metric.reducer().pick(max, min, values.iter().sum())
                };
                MetricValue { metric, value }
            })
            .collect())
    }
}

// ---

#[derive(Default)]
pub struct MemoryDirectory {
    farms: Mutex<HashSet<Uuid>>,
    systems: Mutex<HashSet<Uuid>>,
}

impl MemoryDirectory {
    pub fn with(farm_id: Uuid, system_id: Uuid) -> Self {
        let dir = Self::default();
        dir.farms.lock().unwrap().insert(farm_id);
        dir.systems.lock().unwrap().insert(system_id);
        dir
    }
}

#[async_trait]
impl EntityDirectory for MemoryDirectory {
    async fn exists(&self, kind: EntityKind, id: Uuid) -> Result<bool> {
        let set = match kind {
            EntityKind::Farm => &self.farms,
            EntityKind::SystemUnit => &self.systems,
        };
        Ok(set.lock().unwrap().contains(&id))
    }
}

// ---

#[derive(Default)]
pub struct MemorySystemLog {
    entries: Mutex<Vec<String>>,
}

impl MemorySystemLog {
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SystemLog for MemorySystemLog {
    async fn record(&self, message: &str) -> Result<()> {
        self.entries.lock().unwrap().push(message.to_string());
        Ok(())
    }
}
