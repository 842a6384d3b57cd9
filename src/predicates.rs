//! Predicate evaluation for rule conditions.
//!
//! Text predicates compare lowercased, trimmed strings. Date predicates
//! compare a received instant against a threshold resolved from the rule
//! value, which is either relative to `now` ("30 days", "3 months") or an
//! absolute date.
//!
//! Relative values describe an age: "Greater than 30 days" means the email
//! is older than 30 days, i.e. received before `now - 30 days`. Absolute
//! values describe an instant: "Greater than 2024-01-01" means received
//! after that date. Months are calendar months; when the day of month does
//! not exist in the target month the result clamps to that month's last day.

use crate::error::RuleError;
use crate::fields::FieldValue;
use crate::rules::{Field, Predicate};
use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// A date condition value resolved against `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// "N days" / "N months": compare the email's age
    Age(DateTime<Utc>),
    /// A literal date: compare the received instant
    Instant(DateTime<Utc>),
}

/// Fail fast when a predicate is applied to a field of the wrong type.
pub fn check_supported(field: Field, predicate: Predicate) -> Result<(), RuleError> {
    if field.kind() == predicate.kind() {
        Ok(())
    } else {
        Err(RuleError::UnsupportedPredicate {
            field: field.to_string(),
            predicate: predicate.to_string(),
        })
    }
}

pub fn matches(
    value: &FieldValue,
    predicate: Predicate,
    comparison: &str,
    now: DateTime<Utc>,
) -> Result<bool, RuleError> {
    match (value, predicate) {
        (FieldValue::Text(text), Predicate::Contains) => Ok(contains(text, comparison)),
        (FieldValue::Text(text), Predicate::DoesNotContain) => Ok(!contains(text, comparison)),
        (FieldValue::Text(text), Predicate::Equals) => Ok(equals(text, comparison)),
        (FieldValue::Text(text), Predicate::DoesNotEqual) => Ok(!equals(text, comparison)),
        (FieldValue::Date(received), Predicate::LessThan) => {
            Ok(compare_date(*received, false, resolve_threshold(comparison, now)?))
        }
        (FieldValue::Date(received), Predicate::GreaterThan) => {
            Ok(compare_date(*received, true, resolve_threshold(comparison, now)?))
        }
        (value, predicate) => Err(RuleError::UnsupportedPredicate {
            field: value.kind().to_string(),
            predicate: predicate.to_string(),
        }),
    }
}

fn contains(text: &str, needle: &str) -> bool {
    text.trim()
        .to_lowercase()
        .contains(&needle.trim().to_lowercase())
}

fn equals(text: &str, other: &str) -> bool {
    text.trim().to_lowercase() == other.trim().to_lowercase()
}

fn compare_date(received: DateTime<Utc>, greater_than: bool, threshold: Threshold) -> bool {
    match threshold {
        Threshold::Age(at) => {
            if greater_than {
                received < at
            } else {
                received > at
            }
        }
        Threshold::Instant(at) => {
            if greater_than {
                received > at
            } else {
                received < at
            }
        }
    }
}

/// Resolve a date condition value: "<N> day(s)", "<N> month(s)" (either
/// optionally followed by "ago") or an absolute date accepted by
/// [`parse_datetime`].
pub fn resolve_threshold(value: &str, now: DateTime<Utc>) -> Result<Threshold, RuleError> {
    let invalid = |reason: String| RuleError::InvalidCondition {
        value: value.to_string(),
        reason,
    };

    let lowered = value.trim().to_lowercase();
    let mut parts: Vec<&str> = lowered.split_whitespace().collect();
    if parts.len() == 3 && parts[2] == "ago" {
        parts.pop();
    }
    if let [count, unit] = parts.as_slice() {
        if matches!(*unit, "day" | "days" | "month" | "months") {
            let n: u32 = count
                .parse()
                .map_err(|_| invalid(format!("'{}' is not a positive integer", count)))?;
            if n == 0 {
                return Err(invalid("count must be a positive integer".to_string()));
            }
            let at = if unit.starts_with("day") {
                Duration::try_days(i64::from(n)).and_then(|d| now.checked_sub_signed(d))
            } else {
                now.checked_sub_months(Months::new(n))
            };
            return at
                .map(Threshold::Age)
                .ok_or_else(|| invalid("date out of range".to_string()));
        }
    }

    parse_datetime(value)
        .map(Threshold::Instant)
        .ok_or_else(|| invalid("expected '<N> days', '<N> months' or a date".to_string()))
}

/// Parse a persisted or user-supplied timestamp. Values without an offset
/// are taken as UTC; a bare date means midnight.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap()
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    #[test]
    fn test_contains_case_insensitive() {
        let value = text("Weekly Newsletter #42");
        assert!(matches(&value, Predicate::Contains, "newsletter", fixed_now()).unwrap());
        assert!(matches(&value, Predicate::Contains, "  NEWSLETTER ", fixed_now()).unwrap());
        assert!(!matches(&value, Predicate::Contains, "digest", fixed_now()).unwrap());
    }

    #[test]
    fn test_equals_after_normalization() {
        let value = text("  Boss@Example.com ");
        assert!(matches(&value, Predicate::Equals, "boss@example.com", fixed_now()).unwrap());
        assert!(!matches(&value, Predicate::Equals, "boss@example", fixed_now()).unwrap());
    }

    #[test]
    fn test_negated_predicates_are_exact_negations() {
        let pairs = [
            ("Weekly Newsletter", "newsletter"),
            ("Weekly Newsletter", "weekly newsletter"),
            ("", ""),
            ("", "x"),
            ("abc", ""),
            ("Ünïcode", "ünï"),
        ];
        for (field, comparison) in pairs {
            let value = text(field);
            let now = fixed_now();
            assert_ne!(
                matches(&value, Predicate::Contains, comparison, now).unwrap(),
                matches(&value, Predicate::DoesNotContain, comparison, now).unwrap()
            );
            assert_ne!(
                matches(&value, Predicate::Equals, comparison, now).unwrap(),
                matches(&value, Predicate::DoesNotEqual, comparison, now).unwrap()
            );
        }
    }

    #[test]
    fn test_relative_days_threshold() {
        let now = fixed_now();
        assert_eq!(
            resolve_threshold("30 days", now).unwrap(),
            Threshold::Age(now - Duration::days(30))
        );
        assert_eq!(
            resolve_threshold(" 1 Day ", now).unwrap(),
            Threshold::Age(now - Duration::days(1))
        );
    }

    #[test]
    fn test_relative_value_accepts_trailing_ago() {
        let now = fixed_now();
        assert_eq!(
            resolve_threshold("30 days ago", now).unwrap(),
            Threshold::Age(now - Duration::days(30))
        );
        assert_eq!(
            resolve_threshold("2 Months Ago", now).unwrap(),
            Threshold::Age(Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap())
        );
        assert!(resolve_threshold("30 ago", now).is_err());
        assert!(resolve_threshold("30 days ago now", now).is_err());
    }

    #[test]
    fn test_relative_months_are_calendar_months() {
        let now = Utc.with_ymd_and_hms(2024, 8, 15, 9, 30, 0).unwrap();
        assert_eq!(
            resolve_threshold("3 months", now).unwrap(),
            Threshold::Age(Utc.with_ymd_and_hms(2024, 5, 15, 9, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_relative_months_clamp_to_month_end() {
        // 2024 is a leap year
        assert_eq!(
            resolve_threshold("3 months", fixed_now()).unwrap(),
            Threshold::Age(Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap())
        );
        assert_eq!(
            resolve_threshold("1 month", fixed_now()).unwrap(),
            Threshold::Age(Utc.with_ymd_and_hms(2024, 4, 30, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_absolute_thresholds() {
        let now = fixed_now();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for value in [
            "2024-01-01",
            "2024-01-01T00:00:00",
            "2024-01-01 00:00:00",
            "2024-01-01T00:00:00Z",
            "2024-01-01T01:00:00+01:00",
            "Mon, 1 Jan 2024 00:00:00 +0000",
        ] {
            assert_eq!(
                resolve_threshold(value, now).unwrap(),
                Threshold::Instant(expected),
                "{}",
                value
            );
        }
    }

    #[test]
    fn test_invalid_threshold_values() {
        for value in ["", "soon", "0 days", "-3 days", "x months", "3 weeks", "2024-13-01"] {
            let err = resolve_threshold(value, fixed_now()).unwrap_err();
            assert!(
                matches!(err, RuleError::InvalidCondition { .. }),
                "{}",
                value
            );
        }
    }

    #[test]
    fn test_relative_greater_than_means_older() {
        let now = fixed_now();
        let old = FieldValue::Date(now - Duration::days(45));
        let recent = FieldValue::Date(now - Duration::days(5));

        assert!(matches(&old, Predicate::GreaterThan, "30 days", now).unwrap());
        assert!(!matches(&old, Predicate::LessThan, "30 days", now).unwrap());
        assert!(matches(&recent, Predicate::LessThan, "30 days", now).unwrap());
        assert!(!matches(&recent, Predicate::GreaterThan, "30 days", now).unwrap());
    }

    #[test]
    fn test_date_comparison_is_strict() {
        let now = fixed_now();
        let boundary = FieldValue::Date(now - Duration::days(30));
        assert!(!matches(&boundary, Predicate::GreaterThan, "30 days", now).unwrap());
        assert!(!matches(&boundary, Predicate::LessThan, "30 days", now).unwrap());

        let midnight = FieldValue::Date(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert!(!matches(&midnight, Predicate::GreaterThan, "2024-01-01", now).unwrap());
        assert!(!matches(&midnight, Predicate::LessThan, "2024-01-01", now).unwrap());
    }

    #[test]
    fn test_absolute_compares_instants() {
        let now = fixed_now();
        let received = FieldValue::Date(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert!(matches(&received, Predicate::GreaterThan, "2024-01-01", now).unwrap());
        assert!(matches(&received, Predicate::LessThan, "2024-04-01", now).unwrap());
        assert!(!matches(&received, Predicate::LessThan, "2024-01-01", now).unwrap());
    }

    #[test]
    fn test_mismatched_predicates_fail() {
        let now = fixed_now();
        let date = FieldValue::Date(now);
        let err = matches(&date, Predicate::Contains, "2024", now).unwrap_err();
        assert!(matches!(err, RuleError::UnsupportedPredicate { .. }));

        let err = matches(&text("hello"), Predicate::LessThan, "30 days", now).unwrap_err();
        assert!(matches!(err, RuleError::UnsupportedPredicate { .. }));

        assert!(check_supported(Field::Subject, Predicate::Contains).is_ok());
        let err = check_supported(Field::ReceivedDate, Predicate::Equals).unwrap_err();
        assert!(matches!(
            err,
            RuleError::UnsupportedPredicate { ref field, ref predicate }
                if field == "Received Date" && predicate == "Equals"
        ));
    }

    #[test]
    fn test_parse_datetime_rejects_garbage() {
        assert!(parse_datetime("yesterday").is_none());
        assert!(parse_datetime("").is_none());
        assert_eq!(
            parse_datetime("2024-01-01T12:00:00.250"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::milliseconds(250))
        );
    }
}
