use chrono::{DateTime, NaiveDate, Utc};
use perfledger_core::performance::PerformanceDataPoint;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Index entry describing one stored block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockIndexEntry {
    pub id: Uuid,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub asat: DateTime<Utc>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<PerformanceDataPoint>,
}

impl BlockIndexEntry {
    pub fn points_file_name(&self) -> String {
        format!("block-{}.json", self.id)
    }
}

/// Contents of an entity directory's `index.json`, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockIndex {
    pub blocks: Vec<BlockIndexEntry>,
}
