use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::performance::EntityId;

/// A precomputed daily return and the value it was earned on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRecord {
    pub date: NaiveDate,
    #[serde(alias = "wt")]
    pub weight: Decimal,
    pub ror: Decimal,
}

impl ReturnRecord {
    pub fn new(date: NaiveDate, weight: Decimal, ror: Decimal) -> Self {
        Self { date, weight, ror }
    }
}

/// Supplies externally computed returns for an entity.
pub trait ReturnSourceTrait: Send + Sync {
    fn get_return_data(
        &self,
        entity: &EntityId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        asat: DateTime<Utc>,
    ) -> Result<Vec<ReturnRecord>>;
}
