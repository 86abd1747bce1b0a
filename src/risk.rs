use chrono::{DateTime, NaiveDateTime, Utc};

use crate::models::RiskLevel;

pub const HIGH_RISK_THRESHOLD: f64 = 70.0;
pub const MEDIUM_RISK_THRESHOLD: f64 = 40.0;

/// Days without activity after which a student counts as inactive.
pub const INACTIVE_AFTER_DAYS: u32 = 7;

pub fn classify(score: f64) -> RiskLevel {
    if score >= HIGH_RISK_THRESHOLD {
        RiskLevel::High
    } else if score >= MEDIUM_RISK_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn is_inactive(days_since_last_activity: Option<u32>) -> bool {
    days_since_last_activity.is_some_and(|days| days >= INACTIVE_AFTER_DAYS)
}

pub fn activity_label(days_since_last_activity: Option<u32>) -> String {
    match days_since_last_activity {
        None => "no activity recorded".to_string(),
        Some(0) => "active today".to_string(),
        Some(1) => "1 day ago".to_string(),
        Some(days) => format!("{days} days ago"),
    }
}

/// Difficulty tier of an H5P activity from its class-wide rates.
pub fn h5p_difficulty(not_max_rate: f64, avg_score: f64, completion_rate: f64) -> RiskLevel {
    if not_max_rate > 80.0 || avg_score < 50.0 || completion_rate < 50.0 {
        RiskLevel::High
    } else if not_max_rate > 60.0 || avg_score < 70.0 || completion_rate < 70.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn h5p_needs_attention(not_max_rate: f64, avg_score: f64, completion_rate: f64) -> bool {
    not_max_rate > 70.0 || avg_score < 60.0 || completion_rate < 60.0
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Relative age of an alert timestamp, or `None` when it cannot be parsed.
pub fn relative_time(created_at: &str, now: DateTime<Utc>) -> Option<String> {
    let created = parse_timestamp(created_at.trim())?;
    let hours = (now - created).num_hours();
    let days = hours / 24;
    Some(if days > 0 {
        format!("{days} days ago")
    } else if hours > 0 {
        format!("{hours} hours ago")
    } else {
        "just now".to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn classification_follows_thresholds() {
        assert_eq!(classify(95.0), RiskLevel::High);
        assert_eq!(classify(70.0), RiskLevel::High);
        assert_eq!(classify(69.9), RiskLevel::Medium);
        assert_eq!(classify(40.0), RiskLevel::Medium);
        assert_eq!(classify(12.0), RiskLevel::Low);
        assert_eq!(classify(0.0), RiskLevel::Low);
    }

    #[test]
    fn inactivity_starts_at_a_week() {
        assert!(!is_inactive(None));
        assert!(!is_inactive(Some(6)));
        assert!(is_inactive(Some(7)));
    }

    #[test]
    fn activity_labels_read_naturally() {
        assert_eq!(activity_label(None), "no activity recorded");
        assert_eq!(activity_label(Some(0)), "active today");
        assert_eq!(activity_label(Some(1)), "1 day ago");
        assert_eq!(activity_label(Some(12)), "12 days ago");
    }

    #[test]
    fn h5p_tiers_take_the_worst_rate() {
        assert_eq!(h5p_difficulty(85.0, 90.0, 95.0), RiskLevel::High);
        assert_eq!(h5p_difficulty(10.0, 45.0, 95.0), RiskLevel::High);
        assert_eq!(h5p_difficulty(65.0, 90.0, 95.0), RiskLevel::Medium);
        assert_eq!(h5p_difficulty(10.0, 90.0, 69.0), RiskLevel::Medium);
        assert_eq!(h5p_difficulty(60.0, 70.0, 70.0), RiskLevel::Low);

        assert!(h5p_needs_attention(71.0, 90.0, 90.0));
        assert!(h5p_needs_attention(10.0, 59.9, 90.0));
        assert!(!h5p_needs_attention(70.0, 60.0, 60.0));
    }

    #[test]
    fn relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        let three_days = (now - Duration::days(3)).format("%Y-%m-%dT%H:%M:%S").to_string();
        assert_eq!(relative_time(&three_days, now).as_deref(), Some("3 days ago"));
        assert_eq!(
            relative_time("2026-02-10T07:30:00+00:00", now).as_deref(),
            Some("4 hours ago")
        );
        assert_eq!(relative_time("2026-02-10T11:59:00", now).as_deref(), Some("just now"));
        assert_eq!(relative_time("yesterday", now), None);
    }
}
