pub mod recorded;
#[allow(clippy::module_inception)]
pub mod result;

pub use recorded::RecordedResult;
pub use result::{
    FetchDatabaseChangesResult, FetchRecordsResult, FetchZoneChangesResult, ModifyRecordsResult,
    RecordFailure,
};
