use super::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Logical partition of the remote database, each with independent connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseScope {
    Public,
    Private,
    Shared,
}

impl DatabaseScope {
    pub const ALL: [DatabaseScope; 3] = [Self::Public, Self::Private, Self::Shared];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Shared => "shared",
        }
    }
}

impl fmt::Display for DatabaseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling hint forwarded to the remote service with every request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityOfService {
    UserInteractive,
    UserInitiated,
    #[default]
    Default,
    Utility,
    Background,
}

pub const DEFAULT_ZONE_NAME: &str = "_defaultZone";
pub const DEFAULT_OWNER_NAME: &str = "__defaultOwner__";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId {
    pub name: String,
    pub owner: String,
}

impl ZoneId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: DEFAULT_OWNER_NAME.to_string(),
        }
    }

    pub fn with_owner(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_ZONE_NAME
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        Self::new(DEFAULT_ZONE_NAME)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    pub name: String,
    pub zone: ZoneId,
}

impl RecordId {
    /// Record id in the default zone.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            zone: ZoneId::default(),
        }
    }

    pub fn in_zone(name: impl Into<String>, zone: ZoneId) -> Self {
        Self {
            name: name.into(),
            zone,
        }
    }

    /// Fresh id with a random v4 UUID name.
    pub fn random(zone: ZoneId) -> Self {
        Self::in_zone(uuid::Uuid::new_v4().to_string(), zone)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.zone, self.name)
    }
}

/// Snapshot of a remote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub record_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Server-assigned version tag, absent until the record has been saved once.
    #[serde(default)]
    pub change_tag: Option<String>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(record_type: impl Into<String>, id: RecordId) -> Self {
        Self {
            id,
            record_type: record_type.into(),
            fields: BTreeMap::new(),
            change_tag: None,
            modified_at: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Compares identity, type and field contents, ignoring server metadata.
    pub fn same_content(&self, other: &Record) -> bool {
        self.id == other.id && self.record_type == other.record_type && self.fields == other.fields
    }
}

/// Opaque continuation cursor issued by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(pub String);

impl ChangeToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedRecord {
    pub id: RecordId,
    pub record_type: String,
}
