//! Scripted in-process gateways.
//!
//! Each request pops the next scripted answer for its family. When the script
//! for a family is exhausted the gateway falls back to a well-behaved default
//! (echo every save/delete, report fetched ids as unknown, return empty change
//! pages). Every request is recorded so tests can assert on what was sent.

use super::{
    ContainerGateway, DatabaseChangesPage, DatabaseGateway, GatewayOutcome, ItemOutcome,
    ModifyBatch, ZoneChangeState, ZoneChangesPage, ZoneChangesRequest,
};
use crate::core::{
    ChangeToken, CloudError, ErrorCode, QualityOfService, Record, RecordId, Result,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Scripted answer to one modify request.
#[derive(Debug, Clone)]
pub enum ModifyScript {
    /// Save and delete everything in the batch.
    Echo,
    /// Fail the whole request.
    Fail(CloudError),
    /// Return exactly this outcome.
    Outcome(GatewayOutcome),
    /// Echo the batch but reject the listed records individually.
    RejectItems(Vec<(RecordId, CloudError)>),
}

/// Hook invoked with the zero-based call index at the start of each modify request.
pub type CallHook = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Default)]
struct Scripts {
    modify: VecDeque<ModifyScript>,
    fetch: VecDeque<GatewayOutcome>,
    zone_changes: VecDeque<Result<ZoneChangesPage>>,
    database_changes: VecDeque<Result<DatabaseChangesPage>>,
}

#[derive(Default)]
struct Requests {
    modify: Vec<ModifyBatch>,
    fetch: Vec<Vec<RecordId>>,
    zone_changes: Vec<ZoneChangesRequest>,
    database_changes: Vec<Option<ChangeToken>>,
    qos: Vec<QualityOfService>,
}

/// Scripted [`DatabaseGateway`].
#[derive(Default)]
pub struct ScriptedDatabase {
    scripts: Mutex<Scripts>,
    requests: Mutex<Requests>,
    latency: Option<Duration>,
    modify_hook: Option<CallHook>,
    change_tag_seq: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_modify_hook(mut self, hook: CallHook) -> Self {
        self.modify_hook = Some(hook);
        self
    }

    pub fn push_modify(&self, script: ModifyScript) -> &Self {
        lock(&self.scripts).modify.push_back(script);
        self
    }

    pub fn push_fetch(&self, outcome: GatewayOutcome) -> &Self {
        lock(&self.scripts).fetch.push_back(outcome);
        self
    }

    pub fn push_zone_changes(&self, page: Result<ZoneChangesPage>) -> &Self {
        lock(&self.scripts).zone_changes.push_back(page);
        self
    }

    pub fn push_database_changes(&self, page: Result<DatabaseChangesPage>) -> &Self {
        lock(&self.scripts).database_changes.push_back(page);
        self
    }

    pub fn modify_requests(&self) -> Vec<ModifyBatch> {
        lock(&self.requests).modify.clone()
    }

    pub fn fetch_requests(&self) -> Vec<Vec<RecordId>> {
        lock(&self.requests).fetch.clone()
    }

    pub fn zone_change_requests(&self) -> Vec<ZoneChangesRequest> {
        lock(&self.requests).zone_changes.clone()
    }

    pub fn database_change_requests(&self) -> Vec<Option<ChangeToken>> {
        lock(&self.requests).database_changes.clone()
    }

    /// Quality-of-service hints of all requests, in arrival order.
    pub fn qos_log(&self) -> Vec<QualityOfService> {
        lock(&self.requests).qos.clone()
    }

    /// Total number of requests received across all families.
    pub fn request_count(&self) -> usize {
        lock(&self.requests).qos.len()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn echo(&self, batch: &ModifyBatch) -> Vec<ItemOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());
        for record in &batch.saves {
            let seq = self.change_tag_seq.fetch_add(1, Ordering::SeqCst) + 1;
            let mut saved = record.clone();
            saved.change_tag = Some(format!("tag-{seq}"));
            saved.modified_at = Some(Utc::now());
            outcomes.push(ItemOutcome::Saved { record: saved });
        }
        for id in &batch.deletes {
            outcomes.push(ItemOutcome::Deleted { id: id.clone() });
        }
        outcomes
    }
}

#[async_trait]
impl DatabaseGateway for ScriptedDatabase {
    async fn modify_records(&self, batch: &ModifyBatch, qos: QualityOfService) -> GatewayOutcome {
        let call_index = {
            let mut requests = lock(&self.requests);
            requests.modify.push(batch.clone());
            requests.qos.push(qos);
            requests.modify.len() - 1
        };
        if let Some(hook) = &self.modify_hook {
            hook(call_index);
        }
        self.simulate_latency().await;

        let script = lock(&self.scripts).modify.pop_front();
        match script.unwrap_or(ModifyScript::Echo) {
            ModifyScript::Echo => GatewayOutcome::success(self.echo(batch)),
            ModifyScript::Fail(error) => GatewayOutcome::failure(error),
            ModifyScript::Outcome(outcome) => outcome,
            ModifyScript::RejectItems(rejected) => {
                let per_item = self
                    .echo(batch)
                    .into_iter()
                    .map(|outcome| {
                        match rejected.iter().find(|(id, _)| id == outcome.id()) {
                            Some((id, error)) => ItemOutcome::Failed {
                                id: id.clone(),
                                error: error.clone(),
                            },
                            None => outcome,
                        }
                    })
                    .collect();
                GatewayOutcome::success(per_item)
            }
        }
    }

    async fn fetch_records(&self, ids: &[RecordId], qos: QualityOfService) -> GatewayOutcome {
        {
            let mut requests = lock(&self.requests);
            requests.fetch.push(ids.to_vec());
            requests.qos.push(qos);
        }
        self.simulate_latency().await;

        let scripted = lock(&self.scripts).fetch.pop_front();
        scripted.unwrap_or_else(|| {
            GatewayOutcome::success(
                ids.iter()
                    .map(|id| ItemOutcome::Failed {
                        id: id.clone(),
                        error: CloudError::service(ErrorCode::UnknownItem, "record not found"),
                    })
                    .collect(),
            )
        })
    }

    async fn fetch_zone_changes(
        &self,
        request: &ZoneChangesRequest,
        qos: QualityOfService,
    ) -> Result<ZoneChangesPage> {
        {
            let mut requests = lock(&self.requests);
            requests.zone_changes.push(request.clone());
            requests.qos.push(qos);
        }
        self.simulate_latency().await;

        let scripted = lock(&self.scripts).zone_changes.pop_front();
        scripted.unwrap_or_else(|| {
            Ok(ZoneChangesPage {
                zones: request
                    .zones
                    .iter()
                    .map(|fetch| ZoneChangeState {
                        zone: fetch.zone.clone(),
                        token: fetch
                            .token
                            .clone()
                            .unwrap_or_else(|| ChangeToken::new(format!("{}-initial", fetch.zone.name))),
                        more_coming: false,
                    })
                    .collect(),
                ..ZoneChangesPage::default()
            })
        })
    }

    async fn fetch_database_changes(
        &self,
        token: Option<&ChangeToken>,
        qos: QualityOfService,
    ) -> Result<DatabaseChangesPage> {
        {
            let mut requests = lock(&self.requests);
            requests.database_changes.push(token.cloned());
            requests.qos.push(qos);
        }
        self.simulate_latency().await;

        let scripted = lock(&self.scripts).database_changes.pop_front();
        scripted.unwrap_or_else(|| {
            Ok(DatabaseChangesPage {
                changed_zone_ids: Vec::new(),
                deleted_zone_ids: Vec::new(),
                purged_zone_ids: Vec::new(),
                token: token.cloned().unwrap_or_else(|| ChangeToken::new("database-initial")),
                more_coming: false,
            })
        })
    }
}

/// Scripted [`ContainerGateway`].
pub struct ScriptedContainer {
    user_record_id: RecordId,
    failures: Mutex<VecDeque<CloudError>>,
    qos: Mutex<Vec<QualityOfService>>,
}

impl ScriptedContainer {
    pub fn new(user_record_id: RecordId) -> Self {
        Self {
            user_record_id,
            failures: Mutex::new(VecDeque::new()),
            qos: Mutex::new(Vec::new()),
        }
    }

    /// The next call fails with `error` instead of answering.
    pub fn push_failure(&self, error: CloudError) -> &Self {
        lock(&self.failures).push_back(error);
        self
    }

    pub fn calls(&self) -> usize {
        lock(&self.qos).len()
    }

    /// Quality of service of every call, in order.
    pub fn qos_log(&self) -> Vec<QualityOfService> {
        lock(&self.qos).clone()
    }
}

impl Default for ScriptedContainer {
    fn default() -> Self {
        Self::new(RecordId::new("_current_user"))
    }
}

#[async_trait]
impl ContainerGateway for ScriptedContainer {
    async fn fetch_user_record_id(&self, qos: QualityOfService) -> Result<RecordId> {
        lock(&self.qos).push(qos);
        match lock(&self.failures).pop_front() {
            Some(error) => Err(error),
            None => Ok(self.user_record_id.clone()),
        }
    }
}

/// Record with a single `index` field, handy for bulk scenarios.
pub fn numbered_record(record_type: &str, index: usize) -> Record {
    Record::new(record_type, RecordId::new(format!("{}-{}", record_type.to_lowercase(), index)))
        .with_field("index", index as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_assigns_change_tags() {
        let db = ScriptedDatabase::new();
        let batch = ModifyBatch::new(
            vec![numbered_record("Note", 1), numbered_record("Note", 2)],
            vec![RecordId::new("gone")],
        );

        let items = db
            .modify_records(&batch, QualityOfService::Utility)
            .await
            .into_result()
            .unwrap();

        assert_eq!(items.len(), 3);
        match &items[0] {
            ItemOutcome::Saved { record } => assert_eq!(record.change_tag.as_deref(), Some("tag-1")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(items[2], ItemOutcome::Deleted { id: RecordId::new("gone") });
        assert_eq!(db.qos_log(), vec![QualityOfService::Utility]);
    }

    #[tokio::test]
    async fn test_scripts_are_consumed_in_order() {
        let db = ScriptedDatabase::new();
        let busy = CloudError::service(ErrorCode::ZoneBusy, "busy");
        db.push_modify(ModifyScript::Fail(busy.clone()));

        let batch = ModifyBatch::new(vec![numbered_record("Note", 1)], vec![]);
        let first = db.modify_records(&batch, QualityOfService::Default).await;
        let second = db.modify_records(&batch, QualityOfService::Default).await;

        assert_eq!(first.overall, Err(busy));
        assert!(second.overall.is_ok());
        assert_eq!(db.modify_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_reject_items() {
        let db = ScriptedDatabase::new();
        let conflict = CloudError::service(ErrorCode::ServerRecordChanged, "stale");
        db.push_modify(ModifyScript::RejectItems(vec![(
            RecordId::new("note-2"),
            conflict.clone(),
        )]));

        let batch = ModifyBatch::new(
            vec![numbered_record("Note", 1), numbered_record("Note", 2)],
            vec![],
        );
        let items = db
            .modify_records(&batch, QualityOfService::Default)
            .await
            .into_result()
            .unwrap();

        assert!(!items[0].is_failure());
        assert_eq!(
            items[1],
            ItemOutcome::Failed {
                id: RecordId::new("note-2"),
                error: conflict
            }
        );
    }

    #[tokio::test]
    async fn test_container_failures_then_success() {
        let container = ScriptedContainer::new(RecordId::new("user-7"));
        container.push_failure(CloudError::service(ErrorCode::NetworkFailure, "offline"));

        assert!(container.fetch_user_record_id(QualityOfService::Utility).await.is_err());
        assert_eq!(
            container
                .fetch_user_record_id(QualityOfService::UserInitiated)
                .await
                .unwrap(),
            RecordId::new("user-7")
        );
        assert_eq!(
            container.qos_log(),
            vec![QualityOfService::Utility, QualityOfService::UserInitiated]
        );
    }
}
