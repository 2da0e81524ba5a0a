use crate::constants::{BLOCK_FORMAT_VERSION, DEFAULT_PNL_PRECISION};
use crate::errors::{DataIntegrityError, Error, Result};
use crate::utils::time_utils::safe_divide;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, error};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Identifies an entity (portfolio, composite, ...) whose performance is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub scope: String,
    pub code: String,
}

impl EntityId {
    pub fn new(scope: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            code: code.into(),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.code)
    }
}

/// An end-of-day value and flow for one attribution key, as supplied by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRow {
    pub key: String,
    pub mv: Decimal,
    pub flows: Decimal,
}

impl ValueRow {
    pub fn new(key: impl Into<String>, mv: Decimal, flows: Decimal) -> Self {
        Self {
            key: key.into(),
            mv,
            flows,
        }
    }
}

/// One attribution component of a day's performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionDataPoint {
    pub date: NaiveDate,
    pub key: String,
    pub bod: Decimal,
    pub mv: Decimal,
    pub flows: Decimal,
    pub pnl: Decimal,
}

impl AttributionDataPoint {
    pub fn new(
        date: NaiveDate,
        key: impl Into<String>,
        bod: Decimal,
        eod: Decimal,
        flows: Decimal,
    ) -> Self {
        Self {
            date,
            key: key.into(),
            bod,
            mv: eod,
            flows,
            pnl: eod - bod - flows,
        }
    }
}

/// Running aggregates carried from one data point to the next.
///
/// Differences between two points' aggregates give period statistics
/// without rescanning the points in between.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAggregates {
    pub cum_fctr: Decimal,
    pub cum_flow: Decimal,
    pub cnt: u64,
    pub sum_ror: Decimal,
    pub sum_ror_sqr: Decimal,
}

impl LinkedAggregates {
    /// Saturates at the decimal range instead of overflowing.
    pub fn link(previous: Option<&LinkedAggregates>, ror: Decimal, flows: Decimal) -> Self {
        let factor = Decimal::ONE.saturating_add(ror);
        let ror_sqr = ror.saturating_mul(ror);
        match previous {
            Some(p) => Self {
                cum_fctr: factor.saturating_mul(p.cum_fctr),
                cum_flow: flows.saturating_add(p.cum_flow),
                cnt: p.cnt + 1,
                sum_ror: ror.saturating_add(p.sum_ror),
                sum_ror_sqr: ror_sqr.saturating_add(p.sum_ror_sqr),
            },
            None => Self {
                cum_fctr: factor,
                cum_flow: flows,
                cnt: 0,
                sum_ror: ror,
                sum_ror_sqr: ror_sqr,
            },
        }
    }
}

/// One effective date's performance record for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceDataPoint {
    pub date: NaiveDate,
    pub tmv: Decimal,
    pub flows: Decimal,
    /// Beginning-of-day value; the return's denominator.
    pub weight: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, AttributionDataPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl: Option<Decimal>,
    pub ror: Decimal,
    #[serde(flatten)]
    pub linked: LinkedAggregates,
}

impl PerformanceDataPoint {
    /// Builds a point from attribution rows, cross-checking the summed pnl
    /// against the pnl implied by total values and flows.
    pub fn from_values(
        date: NaiveDate,
        rows: Vec<AttributionDataPoint>,
        previous: Option<&PerformanceDataPoint>,
        pnl_precision: u32,
    ) -> Result<Self> {
        let mut tmv = Decimal::ZERO;
        let mut flows = Decimal::ZERO;
        let mut summed_pnl = Decimal::ZERO;
        let mut data = BTreeMap::new();
        for row in rows {
            tmv += row.mv;
            flows += row.flows;
            summed_pnl += row.pnl;
            data.insert(row.key.clone(), row);
        }

        let bod = previous.map_or(Decimal::ZERO, |p| p.tmv);
        let derived_pnl = tmv - bod - flows;
        if !(derived_pnl - summed_pnl).round_dp(pnl_precision).is_zero() {
            error!(
                "pnl mismatch on {}: attribution {} vs market value {} (bod {}, flows {})",
                date, summed_pnl, derived_pnl, bod, flows
            );
            return Err(DataIntegrityError::PnlMismatch {
                date,
                attributed: summed_pnl,
                derived: derived_pnl,
            }
            .into());
        }

        let ror = safe_divide(derived_pnl, bod, Decimal::ZERO);
        Ok(Self {
            date,
            tmv,
            flows,
            weight: bod,
            data: Some(data),
            pnl: Some(summed_pnl),
            ror,
            linked: LinkedAggregates::link(previous.map(|p| &p.linked), ror, flows),
        })
    }

    /// Builds a point from an externally supplied return and weight.
    pub fn from_returns(
        date: NaiveDate,
        weight: Decimal,
        ror: Decimal,
        previous: Option<&PerformanceDataPoint>,
    ) -> Self {
        let mut linked = LinkedAggregates::link(previous.map(|p| &p.linked), ror, Decimal::ZERO);
        linked.cum_flow = Decimal::ZERO;
        Self {
            date,
            tmv: Decimal::ZERO,
            flows: Decimal::ZERO,
            weight,
            data: None,
            pnl: None,
            ror,
            linked,
        }
    }

    /// Market value held under an attribution key, zero when absent.
    pub fn get_mv(&self, key: &str) -> Decimal {
        self.data
            .as_ref()
            .and_then(|data| data.get(key))
            .map_or(Decimal::ZERO, |adp| adp.mv)
    }
}

/// Produces a block's points on first access.
pub type BlockLoader = Box<dyn Fn() -> Result<Vec<PerformanceDataPoint>> + Send + Sync>;

enum PointsState {
    Unloaded(BlockLoader),
    Loaded(Arc<Vec<PerformanceDataPoint>>),
}

/// An as-of tagged block of performance data over `[from_date, to_date]`.
///
/// Points are appended in strictly increasing date order while the block is
/// built. Once handed to a block store the block is treated as immutable.
pub struct PerformanceDataSet {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub asat: Option<DateTime<Utc>>,
    pub version: String,
    previous: Option<PerformanceDataPoint>,
    pnl_precision: u32,
    points: Mutex<PointsState>,
}

impl PerformanceDataSet {
    pub fn new(from_date: NaiveDate, to_date: NaiveDate, asat: Option<DateTime<Utc>>) -> Self {
        Self {
            from_date,
            to_date,
            asat,
            version: BLOCK_FORMAT_VERSION.to_string(),
            previous: None,
            pnl_precision: DEFAULT_PNL_PRECISION,
            points: Mutex::new(PointsState::Loaded(Arc::new(Vec::new()))),
        }
    }

    /// A block whose points are fetched by `loader` on first access.
    pub fn lazy(
        from_date: NaiveDate,
        to_date: NaiveDate,
        asat: Option<DateTime<Utc>>,
        loader: BlockLoader,
    ) -> Self {
        Self {
            points: Mutex::new(PointsState::Unloaded(loader)),
            ..Self::new(from_date, to_date, asat)
        }
    }

    pub fn with_points(mut self, points: Vec<PerformanceDataPoint>) -> Self {
        self.points = Mutex::new(PointsState::Loaded(Arc::new(points)));
        self
    }

    /// Sets the point the first appended point chains from.
    pub fn with_previous(mut self, previous: Option<PerformanceDataPoint>) -> Self {
        self.previous = previous;
        self
    }

    pub fn with_pnl_precision(mut self, pnl_precision: u32) -> Self {
        self.pnl_precision = pnl_precision;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn previous(&self) -> Option<&PerformanceDataPoint> {
        self.previous.as_ref()
    }

    /// As-of time used for ordering; an unset as-of sorts first.
    pub fn committed_at(&self) -> DateTime<Utc> {
        self.asat.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Appends a point built from attribution values, using the latest point's
    /// per-key values as beginning-of-day values.
    pub fn add_values(&mut self, date: NaiveDate, rows: &[ValueRow]) -> Result<&mut Self> {
        let pnl_precision = self.pnl_precision;
        let previous_owned = self.previous.clone();
        let points = self.points_mut()?;
        let latest = points.last().or(previous_owned.as_ref());
        check_order(date, latest)?;

        let attribution = rows
            .iter()
            .map(|row| {
                let bod = latest.map_or(Decimal::ZERO, |p| p.get_mv(&row.key));
                AttributionDataPoint::new(date, row.key.clone(), bod, row.mv, row.flows)
            })
            .collect();
        let point = PerformanceDataPoint::from_values(date, attribution, latest, pnl_precision)?;
        points.push(point);
        Ok(self)
    }

    /// Appends a point built from a supplied weight and return.
    pub fn add_returns(&mut self, date: NaiveDate, weight: Decimal, ror: Decimal) -> Result<&mut Self> {
        let previous_owned = self.previous.clone();
        let points = self.points_mut()?;
        let latest = points.last().or(previous_owned.as_ref());
        check_order(date, latest)?;

        let point = PerformanceDataPoint::from_returns(date, weight, ror, latest);
        points.push(point);
        Ok(self)
    }

    /// Returns the block's points, running the loader on first access.
    pub fn get_data_points(&self) -> Result<Arc<Vec<PerformanceDataPoint>>> {
        let mut state = self
            .points
            .lock()
            .map_err(|_| Error::Repository("block point cache lock poisoned".to_string()))?;

        let loaded = match &*state {
            PointsState::Loaded(points) => return Ok(Arc::clone(points)),
            PointsState::Unloaded(loader) => Arc::new(loader()?),
        };
        debug!(
            "Loaded {} points for block [{}, {}]",
            loaded.len(),
            self.from_date,
            self.to_date
        );
        *state = PointsState::Loaded(Arc::clone(&loaded));
        Ok(loaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.points
            .lock()
            .map(|state| matches!(*state, PointsState::Loaded(_)))
            .unwrap_or(false)
    }

    fn points_mut(&mut self) -> Result<&mut Vec<PerformanceDataPoint>> {
        if !self.is_loaded() {
            self.get_data_points()?;
        }
        let state = self
            .points
            .get_mut()
            .map_err(|_| Error::Repository("block point cache lock poisoned".to_string()))?;
        match state {
            PointsState::Loaded(points) => Ok(Arc::make_mut(points)),
            PointsState::Unloaded(_) => Err(Error::Unexpected(
                "block points not materialised before append".to_string(),
            )),
        }
    }
}

fn check_order(date: NaiveDate, latest: Option<&PerformanceDataPoint>) -> Result<()> {
    match latest {
        Some(last) if date <= last.date => Err(Error::PointOutOfOrder {
            date,
            last: last.date,
        }),
        _ => Ok(()),
    }
}

impl fmt::Debug for PerformanceDataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceDataSet")
            .field("from_date", &self.from_date)
            .field("to_date", &self.to_date)
            .field("asat", &self.asat)
            .field("version", &self.version)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
