use serde::{Deserialize, Serialize};

/// Serializable stand-in for `Result<T, E>`.
///
/// Encodes as `{"kind": "success" | "failure", "payload": ...}`. Converting
/// back and forth is explicit so call sites can reshape either side first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum RecordedResult<T, E> {
    Success(T),
    Failure(E),
}

impl<T, E> RecordedResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(error) => Err(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RecordedResult<U, E> {
        match self {
            Self::Success(value) => RecordedResult::Success(f(value)),
            Self::Failure(error) => RecordedResult::Failure(error),
        }
    }
}

impl<T, E> From<Result<T, E>> for RecordedResult<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Failure(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CloudError, ErrorCode, RecordId};
    use crate::result::ModifyRecordsResult;
    use serde_json::json;

    #[test]
    fn test_success_encoding() {
        let mut result = ModifyRecordsResult::empty();
        result.deleted_record_ids.push(RecordId::new("gone"));

        let recorded: RecordedResult<ModifyRecordsResult, CloudError> = Ok(result.clone()).into();
        let json = serde_json::to_value(&recorded).unwrap();
        assert_eq!(json["kind"], "success");
        assert_eq!(json["payload"]["deleted_record_ids"][0]["name"], "gone");

        let decoded: RecordedResult<ModifyRecordsResult, CloudError> =
            serde_json::from_value(json).unwrap();
        assert_eq!(decoded.into_result(), Ok(result));
    }

    #[test]
    fn test_failure_encoding() {
        let error = CloudError::service(ErrorCode::QuotaExceeded, "full");
        let recorded: RecordedResult<(), CloudError> = Err(error.clone()).into();

        let json = serde_json::to_value(&recorded).unwrap();
        assert_eq!(
            json,
            json!({
                "kind": "failure",
                "payload": {
                    "kind": "service",
                    "code": "quota_exceeded",
                    "message": "full",
                    "retry_after_ms": null
                }
            })
        );
        assert!(!recorded.is_success());
    }

    #[test]
    fn test_map_keeps_failure() {
        let recorded: RecordedResult<u32, String> = RecordedResult::Failure("boom".into());
        assert_eq!(recorded.map(|n| n + 1), RecordedResult::Failure("boom".to_string()));
    }
}
