//! The raw network boundary to the remote record service.
//!
//! Gateways issue exactly one bounded request per call and report what the
//! service answered. They never split, retry or cache; that is the job of the
//! orchestrator sitting in front of them.

pub mod scripted;

use crate::core::{
    ChangeToken, CloudError, DeletedRecord, QualityOfService, Record, RecordId, Result, ZoneId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use scripted::{ModifyScript, ScriptedContainer, ScriptedDatabase, numbered_record};

/// One remote modify request: records to save followed by ids to delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifyBatch {
    pub saves: Vec<Record>,
    pub deletes: Vec<RecordId>,
}

impl ModifyBatch {
    pub fn new(saves: Vec<Record>, deletes: Vec<RecordId>) -> Self {
        Self { saves, deletes }
    }

    /// Combined number of saves and deletes.
    pub fn len(&self) -> usize {
        self.saves.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saves.is_empty() && self.deletes.is_empty()
    }

    /// Ids in submission order: saves first, then deletes.
    pub fn submitted_ids(&self) -> impl Iterator<Item = &RecordId> {
        self.saves
            .iter()
            .map(|record| &record.id)
            .chain(self.deletes.iter())
    }

    /// Splits into two non-empty halves that concatenate back to `self`.
    ///
    /// Returns `None` for batches with fewer than two items.
    pub fn split_in_half(self) -> Option<(ModifyBatch, ModifyBatch)> {
        let total = self.len();
        if total < 2 {
            return None;
        }

        let first_len = total / 2;
        let mut saves = self.saves;
        let mut deletes = self.deletes;

        if first_len <= saves.len() {
            let tail_saves = saves.split_off(first_len);
            Some((
                ModifyBatch::new(saves, Vec::new()),
                ModifyBatch::new(tail_saves, deletes),
            ))
        } else {
            let tail_deletes = deletes.split_off(first_len - saves.len());
            Some((
                ModifyBatch::new(saves, deletes),
                ModifyBatch::new(Vec::new(), tail_deletes),
            ))
        }
    }
}

/// Per-record outcome reported by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Saved { record: Record },
    Deleted { id: RecordId },
    Fetched { record: Record },
    Failed { id: RecordId, error: CloudError },
}

impl ItemOutcome {
    pub fn id(&self) -> &RecordId {
        match self {
            Self::Saved { record } | Self::Fetched { record } => &record.id,
            Self::Deleted { id } | Self::Failed { id, .. } => id,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// What one gateway request produced.
///
/// `overall` is the operation-level result. Per-item outcomes are only
/// meaningful when `overall` is `Ok`.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOutcome {
    pub overall: Result<()>,
    pub per_item: Vec<ItemOutcome>,
}

impl GatewayOutcome {
    pub fn success(per_item: Vec<ItemOutcome>) -> Self {
        Self {
            overall: Ok(()),
            per_item,
        }
    }

    pub fn failure(error: CloudError) -> Self {
        Self {
            overall: Err(error),
            per_item: Vec::new(),
        }
    }

    /// Collapses into the item list, or the operation-level error.
    pub fn into_result(self) -> Result<Vec<ItemOutcome>> {
        self.overall.map(|()| self.per_item)
    }
}

/// Zone to fetch together with the token to resume from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneFetch {
    pub zone: ZoneId,
    pub token: Option<ChangeToken>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneChangesRequest {
    pub zones: Vec<ZoneFetch>,
}

/// Where a zone stands after one page of changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneChangeState {
    pub zone: ZoneId,
    pub token: ChangeToken,
    pub more_coming: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneChangesPage {
    pub changed_records: Vec<Record>,
    pub deleted_records: Vec<DeletedRecord>,
    pub zones: Vec<ZoneChangeState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseChangesPage {
    pub changed_zone_ids: Vec<ZoneId>,
    pub deleted_zone_ids: Vec<ZoneId>,
    pub purged_zone_ids: Vec<ZoneId>,
    pub token: ChangeToken,
    pub more_coming: bool,
}

/// Raw connection to one database scope.
#[async_trait]
pub trait DatabaseGateway: Send + Sync {
    /// Saves and deletes the records of `batch` in one remote request.
    async fn modify_records(&self, batch: &ModifyBatch, qos: QualityOfService) -> GatewayOutcome;

    /// Fetches the records identified by `ids` in one remote request.
    async fn fetch_records(&self, ids: &[RecordId], qos: QualityOfService) -> GatewayOutcome;

    /// Fetches one page of record changes for the requested zones.
    async fn fetch_zone_changes(
        &self,
        request: &ZoneChangesRequest,
        qos: QualityOfService,
    ) -> Result<ZoneChangesPage>;

    /// Fetches one page of zone-level changes for the whole database.
    async fn fetch_database_changes(
        &self,
        token: Option<&ChangeToken>,
        qos: QualityOfService,
    ) -> Result<DatabaseChangesPage>;
}

/// Raw connection to the container-level API.
#[async_trait]
pub trait ContainerGateway: Send + Sync {
    async fn fetch_user_record_id(&self, qos: QualityOfService) -> Result<RecordId>;
}
