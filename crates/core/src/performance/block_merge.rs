//! Reconciles overlapping blocks into one date-ordered series.
//!
//! Blocks are visited in precedence order: ascending as-of when locked (the
//! first value committed for a date stands), descending as-of when unlocked
//! (the latest correction wins). Each block claims whatever part of the
//! requested window it covers that no higher-precedence block has claimed.
//! The claimed slices are then replayed in effective-date order.

use chrono::NaiveDate;
use log::debug;
use std::sync::Arc;

use super::{PerformanceDataPoint, PerformanceDataSet};
use crate::errors::Result;
use crate::utils::time_utils::{next_day, previous_day};

/// The part of a block that contributes to a merged series.
#[derive(Debug, Clone)]
pub struct MergeSlice {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub block: Arc<PerformanceDataSet>,
}

/// Works out which block supplies each date of `[from_date, to_date]`.
pub fn plan_slices(
    blocks: &[Arc<PerformanceDataSet>],
    locked: bool,
    from_date: NaiveDate,
    to_date: NaiveDate,
) -> Vec<MergeSlice> {
    if from_date > to_date {
        return Vec::new();
    }

    let mut ordered: Vec<&Arc<PerformanceDataSet>> = blocks.iter().collect();
    if locked {
        ordered.sort_by_key(|b| b.committed_at());
    } else {
        ordered.sort_by(|a, b| b.committed_at().cmp(&a.committed_at()));
    }

    // Disjoint, ascending ranges not yet supplied by any block.
    let mut uncovered = vec![(from_date, to_date)];
    let mut slices = Vec::new();

    for block in ordered {
        if uncovered.is_empty() {
            break;
        }
        let block_start = block.from_date.max(from_date);
        let block_end = block.to_date.min(to_date);
        if block_start > block_end {
            continue;
        }

        let mut remaining = Vec::with_capacity(uncovered.len() + 1);
        for (start, end) in uncovered {
            if end < block_start || start > block_end {
                remaining.push((start, end));
                continue;
            }
            slices.push(MergeSlice {
                start: start.max(block_start),
                end: end.min(block_end),
                block: Arc::clone(block),
            });
            if start < block_start {
                remaining.push((start, previous_day(block_start)));
            }
            if end > block_end {
                remaining.push((next_day(block_end), end));
            }
        }
        uncovered = remaining;
    }

    slices.sort_by_key(|s| s.start);
    debug!(
        "Merge plan ({}) for [{}, {}]: {:?}",
        if locked { "locked" } else { "unlocked" },
        from_date,
        to_date,
        slices
            .iter()
            .map(|s| (s.start, s.end, s.block.asat))
            .collect::<Vec<_>>()
    );
    slices
}

/// Merges `blocks` into one gap-free, duplicate-free series over
/// `[from_date, to_date]`. Points are read lazily as the iterator advances.
pub fn combine(
    blocks: &[Arc<PerformanceDataSet>],
    locked: bool,
    from_date: NaiveDate,
    to_date: NaiveDate,
) -> CombinedPoints {
    CombinedPoints::new(plan_slices(blocks, locked, from_date, to_date))
}

struct SliceCursor {
    points: Arc<Vec<PerformanceDataPoint>>,
    next: usize,
    end: NaiveDate,
}

/// Lazy iterator over merged points. Stops after the first load failure.
pub struct CombinedPoints {
    slices: std::vec::IntoIter<MergeSlice>,
    current: Option<SliceCursor>,
    failed: bool,
}

impl CombinedPoints {
    pub fn new(slices: Vec<MergeSlice>) -> Self {
        Self {
            slices: slices.into_iter(),
            current: None,
            failed: false,
        }
    }
}

impl Iterator for CombinedPoints {
    type Item = Result<PerformanceDataPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(cursor) = self.current.as_mut() {
                if let Some(point) = cursor.points.get(cursor.next) {
                    if point.date <= cursor.end {
                        cursor.next += 1;
                        return Some(Ok(point.clone()));
                    }
                }
                self.current = None;
            }

            let slice = self.slices.next()?;
            match slice.block.get_data_points() {
                Ok(points) => {
                    let next = points.partition_point(|p| p.date < slice.start);
                    self.current = Some(SliceCursor {
                        points,
                        next,
                        end: slice.end,
                    });
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn at(y: i32, m: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, day, 0, 0, 0).unwrap()
    }

    fn block(from: NaiveDate, to: NaiveDate, asat: DateTime<Utc>, tag: Decimal) -> Arc<PerformanceDataSet> {
        let mut b = PerformanceDataSet::new(from, to, Some(asat));
        let mut date = from;
        while date <= to {
            b.add_returns(date, tag, dec!(0.001)).unwrap();
            date = date.succ_opt().unwrap();
        }
        Arc::new(b)
    }

    fn collect(iter: CombinedPoints) -> Vec<(NaiveDate, Decimal)> {
        iter.map(|p| p.map(|p| (p.date, p.weight)))
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn scenario_blocks() -> Vec<Arc<PerformanceDataSet>> {
        vec![
            block(d(2020, 1, 1), d(2020, 1, 5), at(2020, 1, 5), dec!(1)),
            block(d(2020, 1, 6), d(2020, 1, 10), at(2020, 1, 10), dec!(2)),
            block(d(2020, 1, 8), d(2020, 1, 15), at(2020, 1, 15), dec!(3)),
        ]
    }

    #[test]
    fn unlocked_latest_block_wins_overlap() {
        let merged = collect(combine(&scenario_blocks(), false, d(2020, 1, 3), d(2020, 1, 15)));

        let dates: Vec<NaiveDate> = merged.iter().map(|(date, _)| *date).collect();
        let expected: Vec<NaiveDate> = (3..=15).map(|day| d(2020, 1, day)).collect();
        assert_eq!(dates, expected);

        for (date, tag) in merged {
            let want = if date <= d(2020, 1, 5) {
                dec!(1)
            } else if date <= d(2020, 1, 7) {
                dec!(2)
            } else {
                dec!(3)
            };
            assert_eq!(tag, want, "{}", date);
        }
    }

    #[test]
    fn locked_first_committed_value_stands() {
        let merged = collect(combine(&scenario_blocks(), true, d(2020, 1, 3), d(2020, 1, 15)));

        assert_eq!(merged.len(), 13);
        for (date, tag) in merged {
            let want = if date <= d(2020, 1, 5) {
                dec!(1)
            } else if date <= d(2020, 1, 10) {
                dec!(2)
            } else {
                dec!(3)
            };
            assert_eq!(tag, want, "{}", date);
        }
    }

    #[test]
    fn unlocked_overlap_two_blocks() {
        let a = block(d(2020, 1, 1), d(2020, 1, 20), at(2020, 1, 20), dec!(1));
        let b = block(d(2020, 1, 10), d(2020, 1, 31), at(2020, 2, 1), dec!(2));
        let merged = collect(combine(&[a, b], false, d(2020, 1, 1), d(2020, 1, 31)));

        assert_eq!(merged.len(), 31);
        assert!(merged
            .iter()
            .all(|(date, tag)| (*date < d(2020, 1, 10)) == (*tag == dec!(1))));
    }

    #[test]
    fn later_block_inside_earlier_block_does_not_hide_tail() {
        // A narrow correction nested inside a wide older block.
        let wide = block(d(2020, 1, 1), d(2020, 1, 31), at(2020, 2, 1), dec!(1));
        let narrow = block(d(2020, 1, 10), d(2020, 1, 12), at(2020, 2, 5), dec!(2));
        let merged = collect(combine(&[wide, narrow], false, d(2020, 1, 1), d(2020, 1, 31)));

        assert_eq!(merged.len(), 31);
        for (date, tag) in merged {
            let in_correction = date >= d(2020, 1, 10) && date <= d(2020, 1, 12);
            assert_eq!(tag == dec!(2), in_correction, "{}", date);
        }
    }

    #[test]
    fn output_is_clipped_to_window() {
        let merged = collect(combine(&scenario_blocks(), false, d(2020, 1, 4), d(2020, 1, 9)));
        assert_eq!(merged.first().map(|p| p.0), Some(d(2020, 1, 4)));
        assert_eq!(merged.last().map(|p| p.0), Some(d(2020, 1, 9)));
    }

    #[test]
    fn empty_inputs_yield_nothing() {
        assert!(collect(combine(&[], true, d(2020, 1, 1), d(2020, 1, 31))).is_empty());
        assert!(collect(combine(&scenario_blocks(), false, d(2020, 2, 1), d(2020, 1, 1))).is_empty());
    }

    #[test]
    fn unused_blocks_are_never_loaded() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let stale = Arc::new(PerformanceDataSet::lazy(
            d(2020, 1, 1),
            d(2020, 1, 5),
            Some(at(2020, 1, 1)),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }),
        ));
        let fresh = block(d(2020, 1, 1), d(2020, 1, 5), at(2020, 1, 6), dec!(2));

        let merged = collect(combine(&[stale, fresh], false, d(2020, 1, 1), d(2020, 1, 5)));
        assert_eq!(merged.len(), 5);
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn loader_failure_surfaces_once() {
        let broken = Arc::new(PerformanceDataSet::lazy(
            d(2020, 1, 1),
            d(2020, 1, 5),
            Some(at(2020, 1, 1)),
            Box::new(|| Err(Error::Repository("missing block file".to_string()))),
        ));
        let mut iter = combine(&[broken], true, d(2020, 1, 1), d(2020, 1, 5));
        assert!(matches!(iter.next(), Some(Err(Error::Repository(_)))));
        assert!(iter.next().is_none());
    }
}
