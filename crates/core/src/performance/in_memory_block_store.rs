use chrono::Utc;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{BlockStoreTrait, EntityId, PerformanceDataSet};
use crate::errors::{Error, Result};

type BlockKey = (EntityId, Option<String>);

/// Block store that keeps every block in process memory.
#[derive(Debug, Default)]
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<BlockKey, Vec<Arc<PerformanceDataSet>>>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(entity: &EntityId, performance_scope: Option<&str>) -> BlockKey {
        (entity.clone(), performance_scope.map(str::to_string))
    }
}

impl BlockStoreTrait for InMemoryBlockStore {
    fn add_block(
        &self,
        entity: &EntityId,
        mut block: PerformanceDataSet,
        performance_scope: Option<&str>,
    ) -> Result<Arc<PerformanceDataSet>> {
        if block.asat.is_none() {
            block.asat = Some(Utc::now());
        }
        let block = Arc::new(block);

        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| Error::Repository("in-memory block store lock poisoned".to_string()))?;
        blocks
            .entry(Self::key(entity, performance_scope))
            .or_default()
            .push(Arc::clone(&block));

        debug!(
            "Stored block [{}, {}] for {} as at {:?}",
            block.from_date, block.to_date, entity, block.asat
        );
        Ok(block)
    }

    fn get_blocks(
        &self,
        entity: &EntityId,
        performance_scope: Option<&str>,
    ) -> Result<Vec<Arc<PerformanceDataSet>>> {
        let blocks = self
            .blocks
            .read()
            .map_err(|_| Error::Repository("in-memory block store lock poisoned".to_string()))?;
        Ok(blocks
            .get(&Self::key(entity, performance_scope))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::PerformanceDataPoint;
    use chrono::{DateTime, NaiveDate, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn at(y: i32, m: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, day, 0, 0, 0).unwrap()
    }

    /// Block with one return point per day; the weight tags the block.
    fn block(from: NaiveDate, to: NaiveDate, asat: DateTime<Utc>, tag: Decimal) -> PerformanceDataSet {
        let mut b = PerformanceDataSet::new(from, to, Some(asat));
        let mut date = from;
        while date <= to {
            b.add_returns(date, tag, dec!(0.01)).unwrap();
            date = date.succ_opt().unwrap();
        }
        b
    }

    fn entity() -> EntityId {
        EntityId::new("test", "PORT")
    }

    #[test]
    fn add_block_stamps_missing_asat() {
        let store = InMemoryBlockStore::new();
        let before = Utc::now();
        let stored = store
            .add_block(&entity(), PerformanceDataSet::new(d(2020, 1, 1), d(2020, 1, 5), None), None)
            .unwrap();
        assert!(stored.asat.unwrap() >= before);
    }

    #[test]
    fn blocks_are_partitioned_by_performance_scope() {
        let store = InMemoryBlockStore::new();
        store
            .add_block(&entity(), block(d(2020, 1, 1), d(2020, 1, 5), at(2020, 1, 5), dec!(1)), None)
            .unwrap();
        store
            .add_block(
                &entity(),
                block(d(2020, 1, 1), d(2020, 1, 5), at(2020, 1, 5), dec!(2)),
                Some("alt"),
            )
            .unwrap();

        assert_eq!(store.get_blocks(&entity(), None).unwrap().len(), 1);
        assert_eq!(store.get_blocks(&entity(), Some("alt")).unwrap().len(), 1);
        assert!(store.get_blocks(&EntityId::new("test", "OTHER"), None).unwrap().is_empty());
    }

    #[test]
    fn find_blocks_filters_on_both_axes() {
        let store = InMemoryBlockStore::new();
        let e = entity();
        store.add_block(&e, block(d(2020, 1, 1), d(2020, 1, 5), at(2020, 1, 5), dec!(1)), None).unwrap();
        store.add_block(&e, block(d(2020, 1, 6), d(2020, 1, 10), at(2020, 1, 10), dec!(2)), None).unwrap();
        store.add_block(&e, block(d(2020, 1, 8), d(2020, 1, 15), at(2020, 1, 15), dec!(3)), None).unwrap();

        let found = store.find_blocks(&e, d(2020, 1, 5), d(2020, 1, 7), at(2020, 1, 31), None).unwrap();
        assert_eq!(found.len(), 2);

        let found = store.find_blocks(&e, d(2020, 1, 1), d(2020, 1, 31), at(2020, 1, 10), None).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|b| b.asat.unwrap() <= at(2020, 1, 10)));

        let found = store.find_blocks(&e, d(2020, 2, 1), d(2020, 2, 28), at(2020, 12, 31), None).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn previous_record_uses_latest_qualifying_block() {
        let store = InMemoryBlockStore::new();
        let e = entity();
        store.add_block(&e, block(d(2020, 1, 1), d(2020, 1, 10), at(2020, 1, 10), dec!(1)), None).unwrap();
        store.add_block(&e, block(d(2020, 1, 3), d(2020, 1, 12), at(2020, 1, 12), dec!(2)), None).unwrap();

        let prev: Option<PerformanceDataPoint> =
            store.get_previous_record(&e, d(2020, 1, 8), at(2020, 1, 31), None).unwrap();
        let prev = prev.unwrap();
        assert_eq!(prev.date, d(2020, 1, 7));
        assert_eq!(prev.weight, dec!(2));

        // Before the later block was known, the earlier one answers.
        let prev = store
            .get_previous_record(&e, d(2020, 1, 8), at(2020, 1, 11), None)
            .unwrap()
            .unwrap();
        assert_eq!(prev.weight, dec!(1));

        // The later block starts on 01-03, so only the earlier block qualifies.
        let prev = store
            .get_previous_record(&e, d(2020, 1, 3), at(2020, 1, 31), None)
            .unwrap()
            .unwrap();
        assert_eq!(prev.date, d(2020, 1, 2));
        assert_eq!(prev.weight, dec!(1));
    }

    #[test]
    fn previous_record_is_none_at_or_before_first_block() {
        let store = InMemoryBlockStore::new();
        let e = entity();
        store.add_block(&e, block(d(2020, 1, 1), d(2020, 1, 10), at(2020, 1, 10), dec!(1)), None).unwrap();

        assert!(store.get_previous_record(&e, d(2020, 1, 1), at(2020, 1, 31), None).unwrap().is_none());
        assert!(store.get_previous_record(&e, d(2019, 12, 1), at(2020, 1, 31), None).unwrap().is_none());
    }

    #[test]
    fn first_date_ignores_asat() {
        let store = InMemoryBlockStore::new();
        let e = entity();
        assert_eq!(store.get_first_date(&e, None).unwrap(), None);

        store.add_block(&e, block(d(2020, 1, 6), d(2020, 1, 10), at(2020, 1, 10), dec!(1)), None).unwrap();
        store.add_block(&e, block(d(2020, 1, 2), d(2020, 1, 4), at(2021, 1, 1), dec!(2)), None).unwrap();
        assert_eq!(store.get_first_date(&e, None).unwrap(), Some(d(2020, 1, 2)));
    }
}
