pub mod error;
pub mod types;
pub mod value;

pub use error::{CloudError, ErrorCode, Result};
pub use types::{
    ChangeToken, DatabaseScope, DeletedRecord, QualityOfService, Record, RecordId, ZoneId,
    DEFAULT_OWNER_NAME, DEFAULT_ZONE_NAME,
};
pub use value::Value;
