use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::errors::Result;
use crate::performance::EntityId;

/// Inclusive effective-date ranges a member belongs to a composite for.
pub type MemberRanges = BTreeMap<EntityId, Vec<(NaiveDate, NaiveDate)>>;

/// Maintains which entities belong to which composite, and when.
pub trait CompositeMembershipTrait: Send + Sync {
    /// Registers an empty composite. Returns the as-of time of the change.
    fn create_composite(&self, composite: &EntityId) -> Result<DateTime<Utc>>;

    /// Includes `member` over `[from_date, to_date]`.
    fn add_composite_member(
        &self,
        composite: &EntityId,
        member: &EntityId,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<DateTime<Utc>>;

    /// Excludes `member` over `[from_date, to_date]`.
    fn remove_composite_member(
        &self,
        composite: &EntityId,
        member: &EntityId,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<DateTime<Utc>>;

    /// Members and their ranges within `[start_date, end_date]` as known at `asat`.
    fn get_composite_members(
        &self,
        composite: &EntityId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        asat: DateTime<Utc>,
    ) -> Result<MemberRanges>;
}
