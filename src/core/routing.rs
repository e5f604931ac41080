//! Two-tier approval routing. Both the queue listings and the decide
//! entry points consult this one predicate, so the duration rule cannot
//! drift between call sites.

use chrono::NaiveDate;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ApprovalTier {
    DeputyWarden,
    Principal,
}

/// Inclusive day count of a leave range.
pub fn duration_days(from_date: NaiveDate, to_date: NaiveDate) -> i64 {
    to_date.signed_duration_since(from_date).num_days() + 1
}

/// The only tier allowed to decide an application with this range.
/// Duration within the threshold routes to the deputy warden, anything
/// longer to the principal.
pub fn required_tier(from_date: NaiveDate, to_date: NaiveDate, threshold_days: i64) -> ApprovalTier {
    if duration_days(from_date, to_date) > threshold_days {
        ApprovalTier::Principal
    } else {
        ApprovalTier::DeputyWarden
    }
}

/// Closed-interval overlap test for leave date ranges.
pub fn overlaps(a_from: NaiveDate, a_to: NaiveDate, b_from: NaiveDate, b_to: NaiveDate) -> bool {
    a_from <= b_to && b_from <= a_to
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn single_day_leave_counts_one_day() {
        assert_eq!(duration_days(d("2026-03-10"), d("2026-03-10")), 1);
        assert_eq!(duration_days(d("2026-03-10"), d("2026-03-12")), 3);
    }

    #[test]
    fn threshold_boundary_routes_to_deputy() {
        // exactly 15 days stays with the deputy warden
        assert_eq!(
            required_tier(d("2026-03-01"), d("2026-03-15"), 15),
            ApprovalTier::DeputyWarden
        );
        assert_eq!(
            required_tier(d("2026-03-01"), d("2026-03-16"), 15),
            ApprovalTier::Principal
        );
    }

    #[test]
    fn interval_overlap_is_inclusive() {
        assert!(overlaps(d("2026-03-01"), d("2026-03-05"), d("2026-03-05"), d("2026-03-09")));
        assert!(overlaps(d("2026-03-03"), d("2026-03-04"), d("2026-03-01"), d("2026-03-09")));
        assert!(!overlaps(d("2026-03-01"), d("2026-03-04"), d("2026-03-05"), d("2026-03-09")));
    }
}
