use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};
use std::sync::Arc;

use super::ReturnSourceTrait;
use crate::errors::{Result, ValidationError};
use crate::performance::{BlockStoreTrait, EntityId, PerformanceDataSet};

/// Loads returns from a [`ReturnSourceTrait`] and stores them as one block
/// chained onto the entity's existing history.
pub struct ReturnsImporter {
    block_store: Arc<dyn BlockStoreTrait>,
    performance_scope: Option<String>,
}

impl ReturnsImporter {
    pub fn new(block_store: Arc<dyn BlockStoreTrait>) -> Self {
        Self {
            block_store,
            performance_scope: None,
        }
    }

    pub fn with_scope(mut self, performance_scope: impl Into<String>) -> Self {
        self.performance_scope = Some(performance_scope.into());
        self
    }

    pub fn import_data(
        &self,
        entity: &EntityId,
        source: &dyn ReturnSourceTrait,
        start_date: NaiveDate,
        end_date: NaiveDate,
        asat: DateTime<Utc>,
    ) -> Result<Arc<PerformanceDataSet>> {
        if start_date > end_date {
            return Err(ValidationError::InvalidDateRange {
                start: start_date,
                end: end_date,
            }
            .into());
        }
        let scope = self.performance_scope.as_deref();
        let previous = self
            .block_store
            .get_previous_record(entity, start_date, asat, scope)?;
        let mut block =
            PerformanceDataSet::new(start_date, end_date, Some(asat)).with_previous(previous);

        let mut records = source.get_return_data(entity, start_date, end_date, asat)?;
        records.sort_by_key(|r| r.date);
        let mut imported = 0usize;
        for record in records {
            if record.date < start_date || record.date > end_date {
                warn!(
                    "Skipping return for {} on {} outside [{}, {}]",
                    entity, record.date, start_date, end_date
                );
                continue;
            }
            block.add_returns(record.date, record.weight, record.ror)?;
            imported += 1;
        }

        debug!(
            "Imported {} returns for {} over [{}, {}]",
            imported, entity, start_date, end_date
        );
        self.block_store.add_block(entity, block, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::performance::{InMemoryBlockStore, PerformanceQuery, PerformanceService, PerformanceSourceTrait, SourceRow};
    use crate::returns::ReturnRecord;
    use crate::settings::PerformanceSettings;
    use chrono::{Duration, TimeZone};
    use rust_decimal::prelude::*;
    use rust_decimal_macros::dec;

    struct FixedReturns(Vec<ReturnRecord>);

    impl ReturnSourceTrait for FixedReturns {
        fn get_return_data(
            &self,
            _entity: &EntityId,
            start_date: NaiveDate,
            end_date: NaiveDate,
            _asat: DateTime<Utc>,
        ) -> Result<Vec<ReturnRecord>> {
            Ok(self
                .0
                .iter()
                .filter(|r| r.date >= start_date && r.date <= end_date)
                .cloned()
                .collect())
        }
    }

    struct NoSource;

    impl PerformanceSourceTrait for NoSource {
        fn get_perf_data(
            &self,
            _entity: &EntityId,
            _start_date: NaiveDate,
            _end_date: NaiveDate,
            _asat: DateTime<Utc>,
            _performance_scope: Option<&str>,
        ) -> Result<Vec<SourceRow>> {
            Ok(Vec::new())
        }
    }

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, m, day).unwrap()
    }

    fn at(m: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, m, day, 18, 0, 0).unwrap()
    }

    fn daily(from: NaiveDate, to: NaiveDate, ror: Decimal) -> FixedReturns {
        FixedReturns(
            from.iter_days()
                .take_while(|date| *date <= to)
                .map(|date| ReturnRecord::new(date, dec!(1000), ror))
                .collect(),
        )
    }

    #[test]
    fn import_persists_one_block() {
        let store = Arc::new(InMemoryBlockStore::new());
        let importer = ReturnsImporter::new(store.clone());
        let entity = EntityId::new("port", "IMPORTED");

        let block = importer
            .import_data(&entity, &daily(d(1, 1), d(1, 5), dec!(0.01)), d(1, 1), d(1, 5), at(1, 5))
            .unwrap();

        assert_eq!(block.asat, Some(at(1, 5)));
        let points = block.get_data_points().unwrap();
        assert_eq!(points.len(), 5);
        assert_eq!(points[4].linked.cum_fctr, dec!(1.01).powi(5));
        assert!(points.iter().all(|p| p.linked.cum_flow.is_zero()));
        assert_eq!(store.get_blocks(&entity, None).unwrap().len(), 1);
    }

    #[test]
    fn second_import_chains_off_previous_block() {
        let store = Arc::new(InMemoryBlockStore::new());
        let importer = ReturnsImporter::new(store.clone());
        let entity = EntityId::new("port", "IMPORTED");

        importer
            .import_data(&entity, &daily(d(1, 1), d(1, 5), dec!(0.01)), d(1, 1), d(1, 5), at(1, 5))
            .unwrap();
        let second = importer
            .import_data(&entity, &daily(d(1, 6), d(1, 10), dec!(0.02)), d(1, 6), d(1, 10), at(1, 10))
            .unwrap();

        let points = second.get_data_points().unwrap();
        assert_eq!(points[0].linked.cnt, 5);
        assert_eq!(
            points[4].linked.cum_fctr,
            dec!(1.01).powi(5) * dec!(1.02).powi(5)
        );

        // Imported history is served without touching a live source
        let service = PerformanceService::new(
            entity.clone(),
            Arc::new(NoSource),
            store.clone(),
            PerformanceSettings::default(),
            None,
        )
        .unwrap();
        assert_eq!(service.inception_date(None).unwrap(), Some(d(1, 1)));
        let query = PerformanceQuery::new(d(1, 1), d(1, 10), at(1, 10)).locked(true);
        let dates: Vec<NaiveDate> = service
            .get_performance(&query)
            .unwrap()
            .map(|p| p.map(|p| p.date))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(dates, d(1, 1).iter_days().take(10).collect::<Vec<_>>());
    }

    #[test]
    fn unsorted_records_are_ordered_before_linking() {
        let store = Arc::new(InMemoryBlockStore::new());
        let importer = ReturnsImporter::new(store);
        let entity = EntityId::new("port", "IMPORTED");
        let source = FixedReturns(vec![
            ReturnRecord::new(d(1, 2), dec!(10), dec!(0.02)),
            ReturnRecord::new(d(1, 1), dec!(10), dec!(0.01)),
        ]);

        let block = importer
            .import_data(&entity, &source, d(1, 1), d(1, 2), at(1, 2))
            .unwrap();
        let points = block.get_data_points().unwrap();
        assert_eq!(points[0].date, d(1, 1));
        assert_eq!(points[1].linked.cum_fctr, dec!(1.01) * dec!(1.02));
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let store = Arc::new(InMemoryBlockStore::new());
        let importer = ReturnsImporter::new(store.clone());
        let entity = EntityId::new("port", "IMPORTED");
        let source = FixedReturns(vec![
            ReturnRecord::new(d(1, 1), dec!(10), dec!(0.01)),
            ReturnRecord::new(d(1, 1), dec!(10), dec!(0.02)),
        ]);

        let result = importer.import_data(&entity, &source, d(1, 1), d(1, 2), at(1, 2));
        assert!(matches!(result, Err(Error::PointOutOfOrder { .. })));
        assert!(store.get_blocks(&entity, None).unwrap().is_empty());
    }

    #[test]
    fn scoped_imports_are_kept_apart() {
        let store = Arc::new(InMemoryBlockStore::new());
        let entity = EntityId::new("port", "IMPORTED");
        let importer = ReturnsImporter::new(store.clone()).with_scope("gross");

        importer
            .import_data(&entity, &daily(d(1, 1), d(1, 3), dec!(0.01)), d(1, 1), d(1, 3), at(1, 3))
            .unwrap();
        assert!(store.get_blocks(&entity, None).unwrap().is_empty());
        assert_eq!(store.get_blocks(&entity, Some("gross")).unwrap().len(), 1);

        let later = at(1, 3) + Duration::days(1);
        assert!(importer
            .import_data(&entity, &daily(d(1, 3), d(1, 3), dec!(0.01)), d(1, 4), d(1, 3), later)
            .is_err());
    }
}
