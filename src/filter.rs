use crate::AlertRecord;

/// Region markers the feed uses for drills ("test", "periodic test")
pub const DRILL_MARKERS: [&str; 2] = ["בדיקה", "בדיקה מחזורית"];

/// Whether `record` is a drill that must not be published
///
/// Always false when drill alerts are included.
pub fn is_test_alert(record: &AlertRecord, include_test_alerts: bool) -> bool {
    if include_test_alerts {
        return false;
    }

    record
        .regions
        .iter()
        .any(|region| DRILL_MARKERS.iter().any(|marker| region.contains(marker)))
}
