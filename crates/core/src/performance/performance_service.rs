use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};
use rust_decimal::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use super::block_merge::{self, CombinedPoints};
use super::{
    BlockStoreTrait, EntityId, PerformanceDataPoint, PerformanceDataSet, PerformanceSourceTrait,
    SourceRow, ValueRow,
};
use crate::constants::{CORRECTION_PRECISION, FLOW_PRECISION, PORTFOLIO_TOTAL_KEY};
use crate::errors::{Error, Result, ValidationError};
use crate::periods::{self, ExtensionDates, Measure, Period, DAY};
use crate::settings::PerformanceSettings;
use crate::utils::time_utils::{annualise, next_day, previous_day, safe_divide};

fn inception_poisoned() -> Error {
    Error::Unexpected("inception date lock poisoned".to_string())
}

/// Parameters of a bi-temporal performance request.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceQuery {
    /// Report dates as first committed rather than as later corrected.
    pub locked: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub asat: DateTime<Utc>,
    pub performance_scope: Option<String>,
    /// Persist every block computed while answering the query.
    pub create: bool,
}

impl PerformanceQuery {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, asat: DateTime<Utc>) -> Self {
        Self {
            locked: false,
            start_date,
            end_date,
            asat,
            performance_scope: None,
            create: false,
        }
    }

    pub fn locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn with_scope(mut self, performance_scope: impl Into<String>) -> Self {
        self.performance_scope = Some(performance_scope.into());
        self
    }

    fn scope(&self) -> Option<&str> {
        self.performance_scope.as_deref()
    }
}

/// One reported date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub date: NaiveDate,
    pub mv: Decimal,
    pub flows: Decimal,
    pub key: String,
    pub wt: Decimal,
    pub inception: Decimal,
    /// Requested field code to value.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Decimal>,
    pub correction: Decimal,
    pub flow_correction: Decimal,
}

/// Computes, persists and reports performance for a single entity.
pub struct PerformanceService {
    entity: EntityId,
    source: Arc<dyn PerformanceSourceTrait>,
    block_store: Arc<dyn BlockStoreTrait>,
    settings: PerformanceSettings,
    /// Caller-supplied inception, applied to every performance scope.
    configured_start: Option<NaiveDate>,
    /// Inception per performance scope, resolved from the store on first use.
    perf_start: RwLock<HashMap<Option<String>, NaiveDate>>,
}

impl PerformanceService {
    /// Creates the service. Without an explicit inception date each
    /// performance scope uses the earliest block start stored for it.
    pub fn new(
        entity: EntityId,
        source: Arc<dyn PerformanceSourceTrait>,
        block_store: Arc<dyn BlockStoreTrait>,
        settings: PerformanceSettings,
        perf_start: Option<NaiveDate>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            entity,
            source,
            block_store,
            settings,
            configured_start: perf_start,
            perf_start: RwLock::new(HashMap::new()),
        })
    }

    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    /// Start of the entity's tracked history in `performance_scope`, if known.
    pub fn inception_date(&self, performance_scope: Option<&str>) -> Result<Option<NaiveDate>> {
        let key = performance_scope.map(str::to_string);
        if let Some(date) = self.perf_start.read().map_err(|_| inception_poisoned())?.get(&key) {
            return Ok(Some(*date));
        }

        let resolved = match self.configured_start {
            Some(date) => Some(date),
            None => self.block_store.get_first_date(&self.entity, performance_scope)?,
        };
        if let Some(date) = resolved {
            debug!(
                "Inception of {} in scope {:?} is {}",
                self.entity, performance_scope, date
            );
            let mut guard = self.perf_start.write().map_err(|_| inception_poisoned())?;
            let entry = guard.entry(key).or_insert(date);
            return Ok(Some(*entry));
        }
        Ok(None)
    }

    fn lower_inception_date(
        &self,
        performance_scope: Option<&str>,
        start_date: NaiveDate,
    ) -> Result<()> {
        let current = self.inception_date(performance_scope)?;
        let mut guard = self.perf_start.write().map_err(|_| inception_poisoned())?;
        let lowered = current.map_or(start_date, |date| date.min(start_date));
        let entry = guard
            .entry(performance_scope.map(str::to_string))
            .or_insert(lowered);
        *entry = (*entry).min(lowered);
        Ok(())
    }

    /// Merged performance for the query window, extending stored coverage
    /// from the source where it is stale or short.
    pub fn get_performance(&self, query: &PerformanceQuery) -> Result<CombinedPoints> {
        if query.start_date > query.end_date {
            return Err(ValidationError::InvalidDateRange {
                start: query.start_date,
                end: query.end_date,
            }
            .into());
        }
        let mut blocks = self.block_store.find_blocks(
            &self.entity,
            query.start_date,
            query.end_date,
            query.asat,
            query.scope(),
        )?;

        let top = blocks.iter().max_by_key(|b| b.committed_at()).cloned();
        match top {
            Some(top) => {
                debug!(
                    "Found {} blocks for {} over [{}, {}], latest as at {:?} ending {}",
                    blocks.len(),
                    self.entity,
                    query.start_date,
                    query.end_date,
                    top.asat,
                    top.to_date
                );
                let asat_matters = !query.locked || query.create;
                if (asat_matters && top.committed_at() < query.asat) || top.to_date < query.end_date {
                    if let Some(block) = self.addendum(top.to_date, top.committed_at(), query)? {
                        blocks.push(block);
                    }
                }
            }
            None => {
                let start = self.inception_date(query.scope())?.unwrap_or(query.start_date);
                debug!(
                    "No blocks for {} over [{}, {}], reading from {}",
                    self.entity, query.start_date, query.end_date, start
                );
                blocks.push(self.read_block(start, query.end_date, None, query)?);
            }
        }

        Ok(block_merge::combine(
            &blocks,
            query.locked,
            query.start_date,
            query.end_date,
        ))
    }

    /// Reads the block that brings coverage up to `query.asat` and
    /// `query.end_date`, chained off the last stored point before it.
    pub fn addendum(
        &self,
        last_date: NaiveDate,
        last_asat: DateTime<Utc>,
        query: &PerformanceQuery,
    ) -> Result<Option<Arc<PerformanceDataSet>>> {
        let from_date = self
            .source
            .get_changes(&self.entity, last_date, last_asat, query.asat)?
            .unwrap_or_else(|| next_day(last_date));

        if from_date > query.end_date {
            debug!(
                "No addendum needed for {}: changes start {} after {}",
                self.entity, from_date, query.end_date
            );
            return Ok(None);
        }

        debug!("Reading addendum for {} from {}", self.entity, from_date);
        let previous =
            self.block_store
                .get_previous_record(&self.entity, from_date, query.asat, query.scope())?;
        self.read_block(from_date, query.end_date, previous, query)
            .map(Some)
    }

    /// Builds one block from source rows over `[start_date, end_date]`.
    pub fn read_block(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        previous: Option<PerformanceDataPoint>,
        query: &PerformanceQuery,
    ) -> Result<Arc<PerformanceDataSet>> {
        let mut block = PerformanceDataSet::new(start_date, end_date, Some(query.asat))
            .with_previous(previous)
            .with_pnl_precision(self.settings.pnl_precision);

        let rows = self.source.get_perf_data(
            &self.entity,
            start_date,
            end_date,
            query.asat,
            query.scope(),
        )?;

        // Rows must fall inside the block and after the point it chains from
        let floor = block.previous().map(|p| p.date);
        let mut by_date: BTreeMap<NaiveDate, Vec<SourceRow>> = BTreeMap::new();
        let mut skipped = 0usize;
        for row in rows {
            let date = row.date();
            if date < start_date || date > end_date || floor.is_some_and(|f| date <= f) {
                skipped += 1;
                continue;
            }
            by_date.entry(date).or_default().push(row);
        }
        if skipped > 0 {
            warn!(
                "Skipped {} source rows for {} outside [{}, {}] or not after {:?}",
                skipped, self.entity, start_date, end_date, floor
            );
        }

        for (date, group) in &by_date {
            let returns = group.iter().find_map(|row| match row {
                SourceRow::Returns { weight, ror, .. } => Some((*weight, *ror)),
                SourceRow::Values { .. } => None,
            });
            match returns {
                Some((weight, ror)) => {
                    if group.len() > 1 {
                        warn!(
                            "{} source rows for {} on {}; using the first return row",
                            group.len(),
                            self.entity,
                            date
                        );
                    }
                    block.add_returns(*date, weight, ror)?;
                }
                None => {
                    let values: Vec<ValueRow> = group
                        .iter()
                        .filter_map(|row| match row {
                            SourceRow::Values { key, mv, flows, .. } => {
                                Some(ValueRow::new(key.clone(), *mv, *flows))
                            }
                            SourceRow::Returns { .. } => None,
                        })
                        .collect();
                    block.add_values(*date, &values)?;
                }
            }
        }

        debug!(
            "Read block [{}, {}] for {} with {} dates (persist: {})",
            start_date,
            end_date,
            self.entity,
            by_date.len(),
            query.create
        );

        if query.create {
            let stored = self
                .block_store
                .add_block(&self.entity, block, query.scope())?;
            self.lower_inception_date(query.scope(), start_date)?;
            Ok(stored)
        } else {
            Ok(Arc::new(block))
        }
    }

    /// Reports `fields` for every date in the query window.
    pub fn report(
        &self,
        query: &PerformanceQuery,
        fields: &[String],
        extensions: &ExtensionDates,
    ) -> Result<PerformanceReport> {
        let perf_start = self
            .inception_date(query.scope())?
            .map_or(query.start_date, |inception| inception.min(query.start_date));

        let mut resolved = Vec::with_capacity(fields.len());
        let mut min_date = query.start_date;
        for code in fields {
            let (measure, period) = periods::resolve_field(code, extensions)?;
            min_date = periods::start_date(code, query.start_date, Some(min_date), extensions)?;
            resolved.push(ReportField {
                code: code.clone(),
                measure,
                period,
            });
        }
        let min_date = min_date.max(perf_start);

        let lookback = PerformanceQuery {
            start_date: min_date,
            ..query.clone()
        };
        let mut lookup = BTreeMap::new();
        for point in self.get_performance(&lookback)? {
            let point = point?;
            lookup.insert(point.date, point);
        }

        let pending: Vec<PerformanceDataPoint> = lookup
            .range(query.start_date..)
            .map(|(_, p)| p.clone())
            .collect();
        debug!(
            "Reporting {} dates for {} with lookback from {}",
            pending.len(),
            self.entity,
            min_date
        );

        Ok(PerformanceReport {
            context: ReportContext {
                lookup,
                fields: resolved,
                perf_start,
                source: Arc::clone(&self.source),
                annualisation: self.settings.annualisation_factor(),
            },
            pending: pending.into_iter(),
        })
    }
}

struct ReportField {
    code: String,
    measure: Measure,
    period: Period,
}

struct ReportContext {
    lookup: BTreeMap<NaiveDate, PerformanceDataPoint>,
    fields: Vec<ReportField>,
    perf_start: NaiveDate,
    source: Arc<dyn PerformanceSourceTrait>,
    annualisation: Decimal,
}

impl ReportContext {
    fn comparison_point(&self, period: &Period, o: &PerformanceDataPoint) -> Option<&PerformanceDataPoint> {
        match period {
            Period::SinceInception => None,
            _ => self.lookup.get(&period.resolve(o.date)),
        }
    }

    fn period_return(&self, period: &Period, o: &PerformanceDataPoint) -> Decimal {
        match self.comparison_point(period, o) {
            Some(start) if start.date >= o.date => Decimal::ZERO,
            Some(start) => {
                safe_divide(o.linked.cum_fctr, start.linked.cum_fctr, Decimal::ONE) - Decimal::ONE
            }
            None => o.linked.cum_fctr - Decimal::ONE,
        }
    }

    fn period_start(&self, period: &Period, o: &PerformanceDataPoint) -> NaiveDate {
        self.comparison_point(period, o)
            .map_or(self.perf_start, |start| start.date)
    }

    fn annualised_return(&self, period: &Period, o: &PerformanceDataPoint) -> Decimal {
        let ror = self.period_return(period, o);
        if ror.is_zero() {
            return Decimal::ZERO;
        }
        annualise(self.period_start(period, o), o.date, ror)
    }

    fn annualised_inception_return(&self, o: &PerformanceDataPoint) -> Decimal {
        if o.linked.cum_fctr.is_zero() {
            return Decimal::ZERO;
        }
        annualise(self.perf_start, o.date, o.linked.cum_fctr - Decimal::ONE)
    }

    fn volatility(&self, period: &Period, o: &PerformanceDataPoint, annualised: bool) -> Decimal {
        let (sum_sqr, sum, n) = match self.comparison_point(period, o) {
            Some(start) => (
                o.linked.sum_ror_sqr - start.linked.sum_ror_sqr,
                o.linked.sum_ror - start.linked.sum_ror,
                o.linked.cnt.saturating_sub(start.linked.cnt),
            ),
            None => (o.linked.sum_ror_sqr, o.linked.sum_ror, o.linked.cnt),
        };
        if n < 2 {
            return Decimal::ZERO;
        }

        let stddev = sample_stddev(sum_sqr, sum, Decimal::from(n));
        if annualised {
            stddev.checked_mul(self.annualisation).unwrap_or(Decimal::ZERO)
        } else {
            stddev
        }
    }

    fn risk_free_rate(&self, period: &Period, o: &PerformanceDataPoint) -> Option<Decimal> {
        let start = self.period_start(period, o);
        self.source
            .risk_free_rate(start, (o.date - start).num_days())
    }

    fn sharpe_ratio(&self, period: &Period, o: &PerformanceDataPoint) -> Decimal {
        let Some(rfr) = self.risk_free_rate(period, o) else {
            warn!("No risk free rate for period ending {}, Sharpe ratio reported as 0", o.date);
            return Decimal::ZERO;
        };
        let vol = self.volatility(period, o, true);
        if vol.is_zero() {
            return Decimal::ZERO;
        }
        sharpe(self.annualised_return(period, o), rfr, vol)
    }

    fn evaluate(&self, field: &ReportField, o: &PerformanceDataPoint) -> Decimal {
        match field.measure {
            Measure::Return => self.period_return(&field.period, o),
            Measure::AnnualisedReturn => self.annualised_return(&field.period, o),
            Measure::AnnualisedInceptionReturn => self.annualised_inception_return(o),
            Measure::Volatility { annualised } => self.volatility(&field.period, o, annualised),
            Measure::SharpeRatio => self.sharpe_ratio(&field.period, o),
            Measure::RiskFreeRate => self
                .risk_free_rate(&field.period, o)
                .unwrap_or(Decimal::ZERO),
            Measure::AgeDays => Decimal::from((o.date - self.perf_start).num_days()),
        }
    }

    /// Flow since the previous day's point, which spans any gap in the points.
    fn calculated_flows(&self, o: &PerformanceDataPoint) -> Decimal {
        match self.lookup.get(&previous_day(o.date)) {
            Some(start) => (o.linked.cum_flow - start.linked.cum_flow).round_dp(FLOW_PRECISION),
            None => o.flows,
        }
    }

    fn row(&self, o: &PerformanceDataPoint) -> ReportRow {
        let flows = self.calculated_flows(o);
        let mut fields = BTreeMap::new();
        let mut day_return = None;
        for field in &self.fields {
            let value = self.evaluate(field, o);
            if day_return.is_none() && field.code.eq_ignore_ascii_case(DAY) {
                day_return = Some(value);
            }
            fields.insert(field.code.clone(), value);
        }

        let day_return = day_return.unwrap_or(o.ror);
        let correction = (safe_divide(
            day_return + Decimal::ONE,
            Decimal::ONE + o.ror,
            Decimal::ONE,
        ) - Decimal::ONE)
            .round_dp(CORRECTION_PRECISION);

        ReportRow {
            date: o.date,
            mv: o.tmv,
            flows,
            key: PORTFOLIO_TOTAL_KEY.to_string(),
            wt: o.weight,
            inception: o.linked.cum_fctr - Decimal::ONE,
            fields,
            correction,
            flow_correction: (flows - o.flows).round_dp(FLOW_PRECISION),
        }
    }
}

/// Sample standard deviation from the sums of `n` returns and their squares.
/// Zero when the moments overflow.
fn sample_stddev(sum_sqr: Decimal, sum: Decimal, n: Decimal) -> Decimal {
    let mean_sqr = safe_divide(sum_sqr, n, Decimal::ZERO);
    let mean = safe_divide(sum, n, Decimal::ZERO);
    mean.checked_mul(mean)
        .and_then(|mean_2| mean_sqr.checked_sub(mean_2))
        .and_then(|spread| spread.abs().checked_mul(n))
        .and_then(|scaled| scaled.checked_div(n - Decimal::ONE))
        .and_then(|variance| variance.sqrt())
        .unwrap_or(Decimal::ZERO)
}

/// Excess return per unit of volatility, zero when it cannot be represented.
fn sharpe(annualised_return: Decimal, risk_free: Decimal, volatility: Decimal) -> Decimal {
    annualised_return
        .checked_sub(risk_free)
        .and_then(|excess| excess.checked_div(volatility))
        .unwrap_or(Decimal::ZERO)
}

/// Lazily evaluated report rows, in ascending date order.
pub struct PerformanceReport {
    context: ReportContext,
    pending: std::vec::IntoIter<PerformanceDataPoint>,
}

impl Iterator for PerformanceReport {
    type Item = ReportRow;

    fn next(&mut self) -> Option<Self::Item> {
        let point = self.pending.next()?;
        Some(self.context.row(&point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sharpe_divides_excess_return_by_volatility() {
        assert_eq!(sharpe(dec!(0.12), dec!(0.02), dec!(0.2)), dec!(0.5));
    }

    #[test]
    fn sharpe_overflow_reports_zero() {
        assert_eq!(sharpe(Decimal::MAX, dec!(-1), dec!(0.5)), Decimal::ZERO);
        assert_eq!(sharpe(Decimal::MAX, Decimal::ZERO, dec!(0.0000000001)), Decimal::ZERO);
        assert_eq!(sharpe(dec!(0.1), Decimal::ZERO, Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn sample_stddev_of_two_returns() {
        // Returns 0.01 and 0.03: mean 0.02, sample variance 0.0002
        let stddev = sample_stddev(dec!(0.001), dec!(0.04), dec!(2));
        assert!((stddev - dec!(0.0141421356)).abs() < dec!(0.0000000001));
    }

    #[test]
    fn sample_stddev_overflow_reports_zero() {
        assert_eq!(sample_stddev(Decimal::MAX, Decimal::MAX, dec!(2)), Decimal::ZERO);
    }
}
