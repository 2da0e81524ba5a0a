//! Store and source traits consumed by the performance service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{EntityId, PerformanceDataPoint, PerformanceDataSet};
use crate::errors::Result;

/// Persists and queries blocks of performance data.
///
/// Blocks for one entity may overlap in effective time and differ in as-of
/// time; reconciling them is left to the caller.
pub trait BlockStoreTrait: Send + Sync {
    /// Store a block, stamping it with the current time if it has no as-of.
    fn add_block(
        &self,
        entity: &EntityId,
        block: PerformanceDataSet,
        performance_scope: Option<&str>,
    ) -> Result<Arc<PerformanceDataSet>>;

    /// All blocks held for an entity, in no particular order.
    fn get_blocks(
        &self,
        entity: &EntityId,
        performance_scope: Option<&str>,
    ) -> Result<Vec<Arc<PerformanceDataSet>>>;

    /// Blocks overlapping `[from_date, to_date]` that were known at `asat`.
    fn find_blocks(
        &self,
        entity: &EntityId,
        from_date: NaiveDate,
        to_date: NaiveDate,
        asat: DateTime<Utc>,
        performance_scope: Option<&str>,
    ) -> Result<Vec<Arc<PerformanceDataSet>>> {
        Ok(self
            .get_blocks(entity, performance_scope)?
            .into_iter()
            .filter(|b| b.to_date >= from_date && b.from_date <= to_date && b.committed_at() <= asat)
            .collect())
    }

    /// The last point before `date` in the latest block known at `asat` that
    /// starts before `date`.
    fn get_previous_record(
        &self,
        entity: &EntityId,
        date: NaiveDate,
        asat: DateTime<Utc>,
        performance_scope: Option<&str>,
    ) -> Result<Option<PerformanceDataPoint>> {
        let blocks = self.get_blocks(entity, performance_scope)?;
        let mut latest: Option<&Arc<PerformanceDataSet>> = None;
        for block in blocks
            .iter()
            .filter(|b| b.committed_at() <= asat && b.from_date < date)
        {
            if latest.map_or(true, |current| block.committed_at() > current.committed_at()) {
                latest = Some(block);
            }
        }

        match latest {
            Some(block) => Ok(block
                .get_data_points()?
                .iter()
                .take_while(|p| p.date < date)
                .last()
                .cloned()),
            None => Ok(None),
        }
    }

    /// Earliest block start for the entity, regardless of as-of time.
    fn get_first_date(
        &self,
        entity: &EntityId,
        performance_scope: Option<&str>,
    ) -> Result<Option<NaiveDate>> {
        Ok(self
            .get_blocks(entity, performance_scope)?
            .iter()
            .map(|b| b.from_date)
            .min())
    }
}

/// A raw row supplied by a performance source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SourceRow {
    /// End-of-day value and flows for one attribution key.
    Values {
        date: NaiveDate,
        key: String,
        mv: Decimal,
        flows: Decimal,
    },
    /// A precomputed return with its weight.
    Returns {
        date: NaiveDate,
        weight: Decimal,
        ror: Decimal,
    },
}

impl SourceRow {
    pub fn date(&self) -> NaiveDate {
        match self {
            SourceRow::Values { date, .. } | SourceRow::Returns { date, .. } => *date,
        }
    }
}

/// Supplies market values and flows (or returns) for an entity.
pub trait PerformanceSourceTrait: Send + Sync {
    /// Rows for `[start_date, end_date]` as known at `asat`.
    fn get_perf_data(
        &self,
        entity: &EntityId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        asat: DateTime<Utc>,
        performance_scope: Option<&str>,
    ) -> Result<Vec<SourceRow>>;

    /// Earliest effective date whose data changed between `last_asat` and
    /// `asat`. `None` when the source cannot tell.
    fn get_changes(
        &self,
        _entity: &EntityId,
        _last_date: NaiveDate,
        _last_asat: DateTime<Utc>,
        _asat: DateTime<Utc>,
    ) -> Result<Option<NaiveDate>> {
        Ok(None)
    }

    /// Annual risk free rate over `elapsed_days` starting at `start_date`.
    fn risk_free_rate(&self, _start_date: NaiveDate, _elapsed_days: i64) -> Option<Decimal> {
        None
    }
}
