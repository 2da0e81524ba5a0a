use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Returns
pub const DAY: &str = "day";
pub const WTD: &str = "wtd";
pub const MTD: &str = "mtd";
pub const QTD: &str = "qtd";
pub const YTD: &str = "ytd";
pub const ROLL_WEEK: &str = "roll-w";
pub const ROLL_MONTH: &str = "roll-m";
pub const ROLL_QTR: &str = "roll-q";
pub const ROLL_YEAR: &str = "roll-y";
pub const ROLL_3YR: &str = "roll-3y";
pub const ROLL_5YR: &str = "roll-5y";
pub const ANN_1YR: &str = "ann-1y";
pub const ANN_3YR: &str = "ann-3y";
pub const ANN_5YR: &str = "ann-5y";
pub const ANN_INC: &str = "ann-inc";

// Volatility
pub const VOL_1YR: &str = "1yr_vol";
pub const VOL_3YR: &str = "3yr_vol";
pub const VOL_5YR: &str = "5yr_vol";
pub const VOL_INC: &str = "inc_vol";
pub const ANN_VOL_1YR: &str = "ann_1yr_vol";
pub const ANN_VOL_3YR: &str = "ann_3yr_vol";
pub const ANN_VOL_5YR: &str = "ann_5yr_vol";
pub const ANN_VOL_INC: &str = "ann_inc_vol";

// Sharpe ratios
pub const SHARPE_1YR: &str = "1yr_sharpe";
pub const SHARPE_3YR: &str = "3yr_sharpe";
pub const SHARPE_5YR: &str = "5yr_sharpe";

// Misc
pub const AGE_DAYS: &str = "days_old";
pub const RISK_FREE_1YR: &str = "1yr_risk_free";
pub const RISK_FREE_3YR: &str = "3yr_risk_free";
pub const RISK_FREE_5YR: &str = "5yr_risk_free";

/// How far back a field's comparison point lies from the reported date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Period {
    Days(i64),
    Months(i32),
    Years(i32),
    /// Most recent Friday strictly before the date.
    WeekToDate,
    /// Last day of the previous month.
    MonthToDate,
    /// Day before the first day of the date's calendar quarter.
    QuarterToDate,
    /// December 31st of the previous year.
    YearToDate,
    /// Measured from inception; the comparison date is the date itself.
    SinceInception,
    /// Start date supplied per entity by the caller.
    Extension(NaiveDate),
}

/// What a field computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Measure {
    Return,
    AnnualisedReturn,
    AnnualisedInceptionReturn,
    Volatility { annualised: bool },
    SharpeRatio,
    RiskFreeRate,
    AgeDays,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDefinition {
    pub code: &'static str,
    pub measure: Measure,
    pub period: Period,
}

const fn field(code: &'static str, measure: Measure, period: Period) -> FieldDefinition {
    FieldDefinition {
        code,
        measure,
        period,
    }
}

const VOL: Measure = Measure::Volatility { annualised: false };
const ANN_VOL: Measure = Measure::Volatility { annualised: true };

pub const FIELD_CATALOGUE: &[FieldDefinition] = &[
    field(DAY, Measure::Return, Period::Days(1)),
    field(WTD, Measure::Return, Period::WeekToDate),
    field(MTD, Measure::Return, Period::MonthToDate),
    field(QTD, Measure::Return, Period::QuarterToDate),
    field(YTD, Measure::Return, Period::YearToDate),
    field(ROLL_WEEK, Measure::Return, Period::Days(7)),
    field(ROLL_MONTH, Measure::Return, Period::Months(1)),
    field(ROLL_QTR, Measure::Return, Period::Months(3)),
    field(ROLL_YEAR, Measure::Return, Period::Years(1)),
    field(ROLL_3YR, Measure::Return, Period::Years(3)),
    field(ROLL_5YR, Measure::Return, Period::Years(5)),
    field(ANN_1YR, Measure::AnnualisedReturn, Period::Years(1)),
    field(ANN_3YR, Measure::AnnualisedReturn, Period::Years(3)),
    field(ANN_5YR, Measure::AnnualisedReturn, Period::Years(5)),
    field(ANN_INC, Measure::AnnualisedInceptionReturn, Period::SinceInception),
    field(VOL_1YR, VOL, Period::Years(1)),
    field(VOL_3YR, VOL, Period::Years(3)),
    field(VOL_5YR, VOL, Period::Years(5)),
    field(VOL_INC, VOL, Period::SinceInception),
    field(ANN_VOL_1YR, ANN_VOL, Period::Years(1)),
    field(ANN_VOL_3YR, ANN_VOL, Period::Years(3)),
    field(ANN_VOL_5YR, ANN_VOL, Period::Years(5)),
    field(ANN_VOL_INC, ANN_VOL, Period::SinceInception),
    field(SHARPE_1YR, Measure::SharpeRatio, Period::Years(1)),
    field(SHARPE_3YR, Measure::SharpeRatio, Period::Years(3)),
    field(SHARPE_5YR, Measure::SharpeRatio, Period::Years(5)),
    field(AGE_DAYS, Measure::AgeDays, Period::SinceInception),
    field(RISK_FREE_1YR, Measure::RiskFreeRate, Period::Years(1)),
    field(RISK_FREE_3YR, Measure::RiskFreeRate, Period::Years(3)),
    field(RISK_FREE_5YR, Measure::RiskFreeRate, Period::Years(5)),
];

/// Looks up a built-in field code, ignoring case.
pub fn find_field(code: &str) -> Option<&'static FieldDefinition> {
    FIELD_CATALOGUE
        .iter()
        .find(|f| f.code.eq_ignore_ascii_case(code))
}
