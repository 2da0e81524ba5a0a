use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{CompositeMembershipTrait, MemberRanges};
use crate::errors::{CompositeError, Error, Result, ValidationError};
use crate::performance::EntityId;
use crate::utils::time_utils::{next_day, previous_day};

#[derive(Debug, Clone)]
struct MembershipChange {
    asat: DateTime<Utc>,
    member: EntityId,
    from_date: NaiveDate,
    to_date: NaiveDate,
    included: bool,
}

/// Composite membership held in process memory.
///
/// Every change is kept with its as-of time, so membership can be read back
/// as it stood at any earlier as-of.
#[derive(Debug, Default)]
pub struct InMemoryComposite {
    composites: RwLock<HashMap<EntityId, Vec<MembershipChange>>>,
}

impl InMemoryComposite {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(
        &self,
        composite: &EntityId,
        member: &EntityId,
        from_date: NaiveDate,
        to_date: NaiveDate,
        included: bool,
    ) -> Result<DateTime<Utc>> {
        if from_date > to_date {
            return Err(ValidationError::InvalidDateRange {
                start: from_date,
                end: to_date,
            }
            .into());
        }
        let mut composites = self.composites.write().map_err(|_| lock_poisoned())?;
        let changes = composites
            .get_mut(composite)
            .ok_or_else(|| CompositeError::NotFound(composite.to_string()))?;

        let asat = Utc::now();
        changes.push(MembershipChange {
            asat,
            member: member.clone(),
            from_date,
            to_date,
            included,
        });
        debug!(
            "{} {} {} composite {} over [{}, {}]",
            if included { "Added" } else { "Removed" },
            member,
            if included { "to" } else { "from" },
            composite,
            from_date,
            to_date
        );
        Ok(asat)
    }
}

fn lock_poisoned() -> Error {
    Error::Repository("in-memory composite lock poisoned".to_string())
}

/// Adds a range to a sorted, disjoint set, joining touching ranges.
fn include_range(ranges: &mut Vec<(NaiveDate, NaiveDate)>, from: NaiveDate, to: NaiveDate) {
    ranges.push((from, to));
    ranges.sort();
    let mut joined: Vec<(NaiveDate, NaiveDate)> = Vec::with_capacity(ranges.len());
    for &(start, end) in ranges.iter() {
        match joined.last_mut() {
            Some(last) if start <= next_day(last.1) => last.1 = last.1.max(end),
            _ => joined.push((start, end)),
        }
    }
    *ranges = joined;
}

fn exclude_range(ranges: &mut Vec<(NaiveDate, NaiveDate)>, from: NaiveDate, to: NaiveDate) {
    let mut kept = Vec::with_capacity(ranges.len() + 1);
    for &(start, end) in ranges.iter() {
        if end < from || start > to {
            kept.push((start, end));
            continue;
        }
        if start < from {
            kept.push((start, previous_day(from)));
        }
        if end > to {
            kept.push((next_day(to), end));
        }
    }
    *ranges = kept;
}

impl CompositeMembershipTrait for InMemoryComposite {
    fn create_composite(&self, composite: &EntityId) -> Result<DateTime<Utc>> {
        let mut composites = self.composites.write().map_err(|_| lock_poisoned())?;
        if composites.contains_key(composite) {
            return Err(CompositeError::AlreadyExists(composite.to_string()).into());
        }
        composites.insert(composite.clone(), Vec::new());
        Ok(Utc::now())
    }

    fn add_composite_member(
        &self,
        composite: &EntityId,
        member: &EntityId,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<DateTime<Utc>> {
        self.record(composite, member, from_date, to_date, true)
    }

    fn remove_composite_member(
        &self,
        composite: &EntityId,
        member: &EntityId,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<DateTime<Utc>> {
        self.record(composite, member, from_date, to_date, false)
    }

    fn get_composite_members(
        &self,
        composite: &EntityId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        asat: DateTime<Utc>,
    ) -> Result<MemberRanges> {
        let composites = self.composites.read().map_err(|_| lock_poisoned())?;
        let changes = composites
            .get(composite)
            .ok_or_else(|| CompositeError::NotFound(composite.to_string()))?;

        let mut members = MemberRanges::new();
        for change in changes.iter().filter(|c| c.asat <= asat) {
            let ranges = members.entry(change.member.clone()).or_default();
            if change.included {
                include_range(ranges, change.from_date, change.to_date);
            } else {
                exclude_range(ranges, change.from_date, change.to_date);
            }
        }

        for ranges in members.values_mut() {
            *ranges = ranges
                .iter()
                .filter(|(start, end)| *start <= end_date && *end >= start_date)
                .map(|(start, end)| ((*start).max(start_date), (*end).min(end_date)))
                .collect();
        }
        members.retain(|_, ranges| !ranges.is_empty());
        Ok(members)
    }
}
