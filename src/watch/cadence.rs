//! Re-check cadence.
//!
//! Pure functions of a resource's timestamps and its resolved option. The
//! interval after a check is twice the time the resource has gone without a
//! change, clamped to `[min_cycle, max_cycle]`: a change snaps it back to
//! `min_cycle`, quiet checks relax it toward `max_cycle`.

use chrono::{DateTime, Duration, Utc};

use crate::watch::option::ResolvedOption;
use crate::watch::resource::TrackedResource;

pub const BACKOFF_FACTOR: i32 = 2;

/// Interval to wait after the last check.
pub fn interval_after_check(resource: &TrackedResource, option: &ResolvedOption) -> Duration {
    let Some(checked) = resource.last_checked_at else {
        return option.min_cycle;
    };
    let baseline = resource.last_modified_at.unwrap_or(resource.created_at);
    let quiet = (checked - baseline).max(Duration::zero());
    let stretched = quiet
        .checked_mul(BACKOFF_FACTOR)
        .unwrap_or(option.max_cycle);
    stretched.clamp(option.min_cycle, option.max_cycle)
}

/// When the resource may next be checked. Never-checked resources are due from creation.
pub fn next_eligible_time(resource: &TrackedResource, option: &ResolvedOption) -> DateTime<Utc> {
    match resource.last_checked_at {
        None => resource.created_at,
        Some(checked) => checked
            .checked_add_signed(interval_after_check(resource, option))
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    }
}

pub fn is_due(resource: &TrackedResource, option: &ResolvedOption, now: DateTime<Utc>) -> bool {
    option.enabled && now >= next_eligible_time(resource, option)
}

/// `weight * (1 + days overdue)`; resources not yet due only carry their weight.
pub fn priority_weight(
    resource: &TrackedResource,
    option: &ResolvedOption,
    now: DateTime<Utc>,
) -> f64 {
    let overdue = (now - next_eligible_time(resource, option)).max(Duration::zero());
    let overdue_days = overdue.num_seconds() as f64 / 86_400.0;
    option.weight * (1.0 + overdue_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::types::ResourceKind;
    use chrono::TimeZone;

    fn opt(min_days: i64, max_days: i64) -> ResolvedOption {
        ResolvedOption {
            min_cycle: Duration::days(min_days),
            max_cycle: Duration::days(max_days),
            weight: 0.5,
            limit: None,
            enabled: true,
            link_pattern: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn never_checked_is_due_immediately() {
        let r = TrackedResource::new("https://e.com/a", ResourceKind::Content, "", now());
        assert_eq!(next_eligible_time(&r, &opt(7, 30)), now());
        assert!(is_due(&r, &opt(7, 30), now()));
    }

    #[test]
    fn quiet_resource_backs_off_after_each_check() {
        // checked 10 days ago, never changed since creation at that moment
        let created = now() - Duration::days(10);
        let mut r = TrackedResource::new("https://e.com/a", ResourceKind::Content, "", created);
        r.last_checked_at = Some(created);
        let o = opt(7, 30);
        assert_eq!(interval_after_check(&r, &o), Duration::days(7));
        assert!(is_due(&r, &o, now()));

        r.record_check(now(), false);
        let next = interval_after_check(&r, &o);
        assert!(next > Duration::days(7));
        assert_eq!(next, Duration::days(20));
        assert!(!is_due(&r, &o, now()));
    }

    #[test]
    fn change_resets_to_min_cycle() {
        let created = now() - Duration::days(90);
        let mut r = TrackedResource::new("https://e.com/a", ResourceKind::Content, "", created);
        r.last_checked_at = Some(now() - Duration::days(30));
        let o = opt(7, 30);
        assert_eq!(interval_after_check(&r, &o), Duration::days(30));
        r.record_check(now(), true);
        assert_eq!(interval_after_check(&r, &o), Duration::days(7));
        assert_eq!(next_eligible_time(&r, &o), now() + Duration::days(7));
    }

    #[test]
    fn disabled_resources_are_never_due() {
        let r = TrackedResource::new("https://e.com/a", ResourceKind::Content, "", now());
        let mut o = opt(7, 30);
        o.enabled = false;
        assert!(!is_due(&r, &o, now() + Duration::days(365)));
    }

    #[test]
    fn priority_grows_with_staleness() {
        let r = TrackedResource::new("https://e.com/a", ResourceKind::Content, "", now());
        let o = opt(7, 30);
        assert_eq!(priority_weight(&r, &o, now()), 0.5);
        assert_eq!(priority_weight(&r, &o, now() + Duration::days(2)), 1.5);
    }
}
