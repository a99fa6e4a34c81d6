use crate::core::{CloudError, DeletedRecord, ErrorCode, Record, RecordId, ZoneId};
use serde::{Deserialize, Serialize};

/// A record the service rejected while the request as a whole succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub id: RecordId,
    pub error: CloudError,
}

/// Merged outcome of a modify call, in batch submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifyRecordsResult {
    pub saved_records: Vec<Record>,
    pub deleted_record_ids: Vec<RecordId>,
    /// Per-item rejections. These are not retried.
    pub failed_records: Vec<RecordFailure>,
}

impl ModifyRecordsResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of ids accounted for across saved, deleted and failed items.
    pub fn item_count(&self) -> usize {
        self.saved_records.len() + self.deleted_record_ids.len() + self.failed_records.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed_records.is_empty()
    }

    /// Summary error when some items were rejected.
    pub fn partial_failure(&self) -> Option<CloudError> {
        if self.failed_records.is_empty() {
            return None;
        }
        Some(CloudError::service(
            ErrorCode::PartialFailure,
            format!(
                "{} of {} records failed",
                self.failed_records.len(),
                self.item_count()
            ),
        ))
    }

    pub(crate) fn absorb(&mut self, other: ModifyRecordsResult) {
        self.saved_records.extend(other.saved_records);
        self.deleted_record_ids.extend(other.deleted_record_ids);
        self.failed_records.extend(other.failed_records);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchRecordsResult {
    /// Records that were found.
    pub found_records: Vec<Record>,
    /// Ids the service does not know; the request itself succeeded.
    pub not_found_record_ids: Vec<RecordId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchZoneChangesResult {
    pub changed_records: Vec<Record>,
    pub deleted_records: Vec<DeletedRecord>,
}

impl FetchZoneChangesResult {
    pub fn is_empty(&self) -> bool {
        self.changed_records.is_empty() && self.deleted_records.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchDatabaseChangesResult {
    pub changed_zone_ids: Vec<ZoneId>,
    pub deleted_zone_ids: Vec<ZoneId>,
    pub purged_zone_ids: Vec<ZoneId>,
}

impl FetchDatabaseChangesResult {
    pub fn is_empty(&self) -> bool {
        self.changed_zone_ids.is_empty()
            && self.deleted_zone_ids.is_empty()
            && self.purged_zone_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_failure_summary() {
        let mut result = ModifyRecordsResult::empty();
        assert!(result.partial_failure().is_none());

        result.deleted_record_ids.push(RecordId::new("a"));
        result.failed_records.push(RecordFailure {
            id: RecordId::new("b"),
            error: CloudError::service(ErrorCode::ServerRecordChanged, "stale"),
        });

        let summary = result.partial_failure().unwrap();
        assert!(summary.is_code(ErrorCode::PartialFailure));
        assert!(summary.to_string().contains("1 of 2 records failed"));
        assert!(!result.is_complete_success());
    }

    #[test]
    fn test_absorb_keeps_order() {
        let mut first = ModifyRecordsResult::empty();
        first.deleted_record_ids.push(RecordId::new("1"));
        let mut second = ModifyRecordsResult::empty();
        second.deleted_record_ids.push(RecordId::new("2"));

        first.absorb(second);
        let names: Vec<&str> = first
            .deleted_record_ids
            .iter()
            .map(|id| id.name.as_str())
            .collect();
        assert_eq!(names, vec!["1", "2"]);
    }
}
