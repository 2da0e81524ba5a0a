use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::PORTFOLIO_TOTAL_KEY;
use crate::errors::{Error, ValidationError};
use crate::performance::{PerformanceDataPoint, SourceRow};
use crate::utils::time_utils::safe_divide;

/// How member performance is combined into composite performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompositeMethod {
    /// Return weighted by each member's beginning-of-day value.
    #[default]
    #[serde(rename = "asset")]
    AssetWeighted,
    /// Simple average of member returns.
    #[serde(rename = "equal")]
    EqualWeighted,
    /// Sum of member values and flows; the return is derived downstream.
    #[serde(rename = "agg")]
    Aggregate,
}

impl CompositeMethod {
    /// Days added to a membership start before member performance is used.
    /// A member's first day has no beginning value to weight its return by.
    pub fn start_offset_days(&self) -> i64 {
        match self {
            CompositeMethod::AssetWeighted | CompositeMethod::EqualWeighted => 1,
            CompositeMethod::Aggregate => 0,
        }
    }

    /// Folds the members' points for one date into a composite source row.
    pub fn combine(&self, date: NaiveDate, members: &[PerformanceDataPoint]) -> SourceRow {
        match self {
            CompositeMethod::AssetWeighted => {
                let weight: Decimal = members.iter().map(|p| p.weight).sum();
                let weighted: Decimal = members.iter().map(|p| p.weight * p.ror).sum();
                SourceRow::Returns {
                    date,
                    weight,
                    ror: safe_divide(weighted, weight, Decimal::ZERO),
                }
            }
            CompositeMethod::EqualWeighted => {
                let weight = Decimal::from(members.len());
                let total: Decimal = members.iter().map(|p| p.ror).sum();
                SourceRow::Returns {
                    date,
                    weight,
                    ror: safe_divide(total, weight, Decimal::ZERO),
                }
            }
            CompositeMethod::Aggregate => {
                let mv: Decimal = members.iter().map(|p| p.tmv).sum();
                // A member with no opening value enters with its whole value as a flow.
                let flows: Decimal = members
                    .iter()
                    .map(|p| if p.weight.is_zero() { p.tmv } else { p.flows })
                    .sum();
                SourceRow::Values {
                    date,
                    key: PORTFOLIO_TOTAL_KEY.to_string(),
                    mv,
                    flows,
                }
            }
        }
    }
}

impl FromStr for CompositeMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asset" => Ok(CompositeMethod::AssetWeighted),
            "equal" => Ok(CompositeMethod::EqualWeighted),
            "agg" => Ok(CompositeMethod::Aggregate),
            other => Err(ValidationError::InvalidInput(format!(
                "unknown composite method '{}', expected one of asset, equal, agg",
                other
            ))
            .into()),
        }
    }
}

impl fmt::Display for CompositeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompositeMethod::AssetWeighted => "asset",
            CompositeMethod::EqualWeighted => "equal",
            CompositeMethod::Aggregate => "agg",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, day).unwrap()
    }

    #[test]
    fn asset_weighted_uses_beginning_values() {
        let members = vec![
            PerformanceDataPoint::from_returns(d(2), dec!(100), dec!(0.01), None),
            PerformanceDataPoint::from_returns(d(2), dec!(300), dec!(0.03), None),
        ];
        assert_eq!(
            CompositeMethod::AssetWeighted.combine(d(2), &members),
            SourceRow::Returns {
                date: d(2),
                weight: dec!(400),
                ror: dec!(0.025)
            }
        );
    }

    #[test]
    fn equal_weighted_averages_returns() {
        let members = vec![
            PerformanceDataPoint::from_returns(d(2), dec!(100), dec!(0.01), None),
            PerformanceDataPoint::from_returns(d(2), dec!(300), dec!(0.03), None),
        ];
        assert_eq!(
            CompositeMethod::EqualWeighted.combine(d(2), &members),
            SourceRow::Returns {
                date: d(2),
                weight: dec!(2),
                ror: dec!(0.02)
            }
        );
    }

    #[test]
    fn zero_weight_members_yield_zero_return() {
        let members = vec![PerformanceDataPoint::from_returns(d(2), Decimal::ZERO, dec!(0.5), None)];
        match CompositeMethod::AssetWeighted.combine(d(2), &members) {
            SourceRow::Returns { ror, .. } => assert_eq!(ror, Decimal::ZERO),
            other => panic!("unexpected row {:?}", other),
        }
    }

    #[test]
    fn methods_parse_from_mode_names() {
        assert_eq!("asset".parse::<CompositeMethod>().unwrap(), CompositeMethod::AssetWeighted);
        assert_eq!("Equal".parse::<CompositeMethod>().unwrap(), CompositeMethod::EqualWeighted);
        assert_eq!("agg".parse::<CompositeMethod>().unwrap(), CompositeMethod::Aggregate);
        assert!("median".parse::<CompositeMethod>().is_err());
        assert_eq!(CompositeMethod::Aggregate.to_string(), "agg");
    }
}
