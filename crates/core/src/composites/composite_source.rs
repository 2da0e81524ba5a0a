use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use std::sync::Arc;

use super::{CompositeMembershipTrait, CompositeMethod};
use crate::errors::Result;
use crate::merge::Merger;
use crate::performance::{
    BlockStoreTrait, EntityId, PerformanceDataPoint, PerformanceQuery, PerformanceService,
    PerformanceSourceTrait, SourceRow,
};
use crate::settings::PerformanceSettings;
use crate::utils::time_utils::shift_days;

/// Serves a composite's rows by combining its members' locked performance.
///
/// Each member is read through its own [`PerformanceService`] over the
/// shared block store, so members must already have performance on file or
/// a source able to produce it.
pub struct CompositeSource {
    membership: Arc<dyn CompositeMembershipTrait>,
    member_source: Arc<dyn PerformanceSourceTrait>,
    block_store: Arc<dyn BlockStoreTrait>,
    method: CompositeMethod,
    settings: PerformanceSettings,
}

impl CompositeSource {
    pub fn new(
        membership: Arc<dyn CompositeMembershipTrait>,
        member_source: Arc<dyn PerformanceSourceTrait>,
        block_store: Arc<dyn BlockStoreTrait>,
        method: CompositeMethod,
        settings: PerformanceSettings,
    ) -> Self {
        Self {
            membership,
            member_source,
            block_store,
            method,
            settings,
        }
    }

    pub fn method(&self) -> CompositeMethod {
        self.method
    }

    fn member_points(
        &self,
        member: &EntityId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        asat: DateTime<Utc>,
        performance_scope: Option<&str>,
    ) -> Result<Vec<PerformanceDataPoint>> {
        let service = PerformanceService::new(
            member.clone(),
            Arc::clone(&self.member_source),
            Arc::clone(&self.block_store),
            self.settings.clone(),
            None,
        )?;
        let mut query = PerformanceQuery::new(start_date, end_date, asat).locked(true);
        if let Some(scope) = performance_scope {
            query = query.with_scope(scope);
        }
        service.get_performance(&query)?.collect()
    }
}

impl PerformanceSourceTrait for CompositeSource {
    fn get_perf_data(
        &self,
        entity: &EntityId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        asat: DateTime<Utc>,
        performance_scope: Option<&str>,
    ) -> Result<Vec<SourceRow>> {
        let members = self
            .membership
            .get_composite_members(entity, start_date, end_date, asat)?;

        let mut merger = Merger::new(|p: &PerformanceDataPoint| p.date);
        for (member, ranges) in &members {
            for (i, (range_start, range_end)) in ranges.iter().enumerate() {
                if *range_start > end_date || *range_end < start_date {
                    continue;
                }
                let from = shift_days((*range_start).max(start_date), self.method.start_offset_days());
                let to = (*range_end).min(end_date);
                if from > to {
                    continue;
                }
                let points = self.member_points(member, from, to, asat, performance_scope)?;
                debug!(
                    "Composite {} member {} contributes {} points over [{}, {}]",
                    entity,
                    member,
                    points.len(),
                    from,
                    to
                );
                merger.include(format!("{}#{}", member, i), points);
            }
        }

        Ok(merger
            .merge()
            .map(|(date, points)| self.method.combine(date, &points))
            .collect())
    }
}
