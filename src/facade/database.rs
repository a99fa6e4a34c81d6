use crate::connection::ClientConfig;
use crate::core::{
    ChangeToken, CloudError, DatabaseScope, ErrorCode, QualityOfService, Record, RecordId, Result,
    ZoneId,
};
use crate::gateway::{DatabaseGateway, ItemOutcome, ModifyBatch, ZoneChangesRequest, ZoneFetch};
use crate::orchestrator::{CancellationToken, RetryController, plan_fetch_batches, plan_modify_batches};
use crate::result::{
    FetchDatabaseChangesResult, FetchRecordsResult, FetchZoneChangesResult, ModifyRecordsResult,
    RecordFailure,
};
use crate::settings::{ExecutionMode, OperationFamily, SettingsProvider};
use crate::storage::{TokenKey, TokenStore};
use log::warn;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Public entry point for one database scope.
///
/// Wraps a raw [`DatabaseGateway`] with batch splitting, retries and change
/// token bookkeeping. Instances are cached per scope by
/// [`CloudClient`](crate::CloudClient); callers share them through `Arc`.
pub struct DatabaseApi {
    scope: DatabaseScope,
    gateway: Arc<dyn DatabaseGateway>,
    settings: SettingsProvider,
    tokens: Arc<dyn TokenStore>,
    max_batch_size: usize,
    retry: RetryController,
}

impl DatabaseApi {
    pub fn new(
        scope: DatabaseScope,
        gateway: Arc<dyn DatabaseGateway>,
        settings: SettingsProvider,
        tokens: Arc<dyn TokenStore>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            scope,
            gateway,
            settings,
            tokens,
            max_batch_size: config.max_batch_size,
            retry: RetryController::new(config.retry.clone()),
        }
    }

    pub fn scope(&self) -> DatabaseScope {
        self.scope
    }

    /// Reads the settings once and resolves the behavior for this call.
    fn execution_mode(&self, family: OperationFamily) -> Result<ExecutionMode> {
        let resolved = (self.settings)().resolve(family);
        if let Err(err) = &resolved {
            event!(Level::INFO, scope = %self.scope, family = %family, error = %err, "simulated failure");
        }
        resolved
    }

    // ========================================================================
    // Modify
    // ========================================================================

    /// Saves `saving` and deletes `deleting`.
    ///
    /// Oversized requests are split into sequential batches when the current
    /// behavior allows it. Each batch is an independent remote transaction,
    /// but the call reports all-or-nothing: the first batch that fails for
    /// good aborts the rest and its error is returned in place of any outcome
    /// merged so far. Records rejected individually inside a successful batch
    /// are listed in [`ModifyRecordsResult::failed_records`].
    pub async fn modify_records(
        &self,
        saving: Vec<Record>,
        deleting: Vec<RecordId>,
        qos: QualityOfService,
    ) -> Result<ModifyRecordsResult> {
        self.modify_records_with_cancel(saving, deleting, qos, &CancellationToken::new())
            .await
    }

    pub async fn modify_records_with_cancel(
        &self,
        saving: Vec<Record>,
        deleting: Vec<RecordId>,
        qos: QualityOfService,
        cancel: &CancellationToken,
    ) -> Result<ModifyRecordsResult> {
        let mode = self.execution_mode(OperationFamily::ModifyRecords)?;
        let span = info_span!(
            "modify_records",
            scope = %self.scope,
            saves = saving.len(),
            deletes = deleting.len()
        );
        self.run_modify(saving, deleting, qos, mode, cancel)
            .instrument(span)
            .await
    }

    async fn run_modify(
        &self,
        saving: Vec<Record>,
        deleting: Vec<RecordId>,
        qos: QualityOfService,
        mode: ExecutionMode,
        cancel: &CancellationToken,
    ) -> Result<ModifyRecordsResult> {
        ensure_unique_ids(&saving, &deleting)?;

        let mut pending: VecDeque<ModifyBatch> = if mode.split_oversized {
            plan_modify_batches(saving, deleting, self.max_batch_size)?.into()
        } else {
            VecDeque::from([ModifyBatch::new(saving, deleting)])
        };

        let mut merged = ModifyRecordsResult::empty();
        let mut submitted = 0usize;

        while let Some(batch) = pending.pop_front() {
            cancel.check()?;
            if batch.is_empty() {
                continue;
            }
            submitted += 1;

            let gateway = &self.gateway;
            let request = &batch;
            let outcome = self
                .retry
                .execute("modify_records", mode, cancel, move |_| async move {
                    gateway.modify_records(request, qos).await.into_result()
                })
                .await;

            match outcome {
                Ok(items) => {
                    event!(Level::DEBUG, batch = submitted, items = batch.len(), "batch committed");
                    merged.absorb(reconcile_modify(&batch, items));
                }
                Err(err)
                    if mode.split_oversized
                        && err.is_code(ErrorCode::LimitExceeded)
                        && batch.len() > 1 =>
                {
                    let size = batch.len();
                    match batch.split_in_half() {
                        Some((first, second)) => {
                            warn!(
                                "modify_records batch of {} items rejected as too large, retrying as {} + {}",
                                size,
                                first.len(),
                                second.len()
                            );
                            pending.push_front(second);
                            pending.push_front(first);
                        }
                        None => return Err(err),
                    }
                }
                Err(err) => {
                    event!(
                        Level::WARN,
                        batch = submitted,
                        remaining = pending.len(),
                        error = %err,
                        "modify_records aborted"
                    );
                    return Err(err);
                }
            }
        }

        Ok(merged)
    }

    // ========================================================================
    // Fetch records
    // ========================================================================

    /// Fetches records by id, in batches of at most the configured size.
    ///
    /// Unknown ids are reported in
    /// [`FetchRecordsResult::not_found_record_ids`]; any other per-record
    /// error fails the call.
    pub async fn fetch_records(
        &self,
        ids: Vec<RecordId>,
        qos: QualityOfService,
    ) -> Result<FetchRecordsResult> {
        self.fetch_records_with_cancel(ids, qos, &CancellationToken::new())
            .await
    }

    pub async fn fetch_records_with_cancel(
        &self,
        ids: Vec<RecordId>,
        qos: QualityOfService,
        cancel: &CancellationToken,
    ) -> Result<FetchRecordsResult> {
        let mode = self.execution_mode(OperationFamily::FetchRecords)?;
        let span = info_span!("fetch_records", scope = %self.scope, ids = ids.len());

        async {
            let mut result = FetchRecordsResult::default();
            for chunk in plan_fetch_batches(ids, self.max_batch_size)? {
                cancel.check()?;
                if chunk.is_empty() {
                    continue;
                }

                let gateway = &self.gateway;
                let request = chunk.as_slice();
                let items = self
                    .retry
                    .execute("fetch_records", mode, cancel, move |_| async move {
                        gateway.fetch_records(request, qos).await.into_result()
                    })
                    .await?;
                reconcile_fetch(&chunk, items, &mut result)?;
            }
            Ok::<_, CloudError>(result)
        }
        .instrument(span)
        .await
    }

    // ========================================================================
    // Zone changes
    // ========================================================================

    /// Fetches record changes in `zone_ids` since the stored tokens.
    ///
    /// Pages are followed until every zone reports no more changes. The new
    /// tokens are persisted once, after the whole call succeeded; a failed
    /// call leaves the stored tokens untouched. An expired token is cleared
    /// and the fetch restarts once from scratch.
    pub async fn fetch_zone_changes(
        &self,
        zone_ids: Vec<ZoneId>,
        qos: QualityOfService,
    ) -> Result<FetchZoneChangesResult> {
        self.fetch_zone_changes_with_cancel(zone_ids, qos, &CancellationToken::new())
            .await
    }

    pub async fn fetch_zone_changes_with_cancel(
        &self,
        zone_ids: Vec<ZoneId>,
        qos: QualityOfService,
        cancel: &CancellationToken,
    ) -> Result<FetchZoneChangesResult> {
        let mode = self.execution_mode(OperationFamily::FetchZoneChanges)?;
        let span = info_span!("fetch_zone_changes", scope = %self.scope, zones = zone_ids.len());

        async {
            match self
                .collect_zone_changes(&zone_ids, qos, mode, cancel, true)
                .await
            {
                Err(err) if err.is_code(ErrorCode::ChangeTokenExpired) => {
                    warn!(
                        "fetch_zone_changes: change token expired in {} scope, refetching from scratch",
                        self.scope
                    );
                    for zone in &zone_ids {
                        self.tokens
                            .clear(&TokenKey::zone(self.scope, zone.clone()))
                            .await?;
                    }
                    self.collect_zone_changes(&zone_ids, qos, mode, cancel, false)
                        .await
                }
                other => other,
            }
        }
        .instrument(span)
        .await
    }

    async fn collect_zone_changes(
        &self,
        zone_ids: &[ZoneId],
        qos: QualityOfService,
        mode: ExecutionMode,
        cancel: &CancellationToken,
        use_stored_tokens: bool,
    ) -> Result<FetchZoneChangesResult> {
        let mut pending = Vec::with_capacity(zone_ids.len());
        for zone in zone_ids {
            let token = if use_stored_tokens {
                self.tokens
                    .load(&TokenKey::zone(self.scope, zone.clone()))
                    .await?
            } else {
                None
            };
            pending.push(ZoneFetch {
                zone: zone.clone(),
                token,
            });
        }

        let requested: HashSet<&ZoneId> = zone_ids.iter().collect();
        let mut result = FetchZoneChangesResult::default();
        let mut latest: Vec<(ZoneId, ChangeToken)> = Vec::new();

        while !pending.is_empty() {
            cancel.check()?;
            let request = ZoneChangesRequest {
                zones: std::mem::take(&mut pending),
            };

            let gateway = &self.gateway;
            let request_ref = &request;
            let page = self
                .retry
                .execute("fetch_zone_changes", mode, cancel, move |_| {
                    gateway.fetch_zone_changes(request_ref, qos)
                })
                .await?;

            result.changed_records.extend(page.changed_records);
            result.deleted_records.extend(page.deleted_records);

            for state in page.zones {
                if !requested.contains(&state.zone) {
                    warn!(
                        "fetch_zone_changes: ignoring state for zone {} that was not requested",
                        state.zone
                    );
                    continue;
                }
                if state.more_coming {
                    let sent = request
                        .zones
                        .iter()
                        .find(|fetch| fetch.zone == state.zone)
                        .and_then(|fetch| fetch.token.as_ref());
                    if sent == Some(&state.token) {
                        return Err(CloudError::service(
                            ErrorCode::InternalError,
                            format!(
                                "zone {} reported more changes without advancing its token",
                                state.zone
                            ),
                        ));
                    }
                    pending.push(ZoneFetch {
                        zone: state.zone.clone(),
                        token: Some(state.token.clone()),
                    });
                }

                match latest.iter_mut().find(|(zone, _)| *zone == state.zone) {
                    Some(entry) => entry.1 = state.token,
                    None => latest.push((state.zone, state.token)),
                }
            }
        }

        cancel.check()?;
        for (zone, token) in latest {
            event!(Level::DEBUG, scope = %self.scope, zone = %zone, "zone change token persisted");
            self.tokens
                .save(&TokenKey::zone(self.scope, zone), token)
                .await?;
        }

        Ok(result)
    }

    // ========================================================================
    // Database changes
    // ========================================================================

    /// Fetches zone-level changes of this database since the stored token.
    ///
    /// Same token rules as [`fetch_zone_changes`](Self::fetch_zone_changes).
    pub async fn fetch_database_changes(
        &self,
        qos: QualityOfService,
    ) -> Result<FetchDatabaseChangesResult> {
        self.fetch_database_changes_with_cancel(qos, &CancellationToken::new())
            .await
    }

    pub async fn fetch_database_changes_with_cancel(
        &self,
        qos: QualityOfService,
        cancel: &CancellationToken,
    ) -> Result<FetchDatabaseChangesResult> {
        let mode = self.execution_mode(OperationFamily::FetchDatabaseChanges)?;
        let span = info_span!("fetch_database_changes", scope = %self.scope);

        async {
            match self.collect_database_changes(qos, mode, cancel, true).await {
                Err(err) if err.is_code(ErrorCode::ChangeTokenExpired) => {
                    warn!(
                        "fetch_database_changes: change token expired in {} scope, refetching from scratch",
                        self.scope
                    );
                    self.tokens.clear(&TokenKey::database(self.scope)).await?;
                    self.collect_database_changes(qos, mode, cancel, false)
                        .await
                }
                other => other,
            }
        }
        .instrument(span)
        .await
    }

    async fn collect_database_changes(
        &self,
        qos: QualityOfService,
        mode: ExecutionMode,
        cancel: &CancellationToken,
        use_stored_token: bool,
    ) -> Result<FetchDatabaseChangesResult> {
        let key = TokenKey::database(self.scope);
        let mut token = if use_stored_token {
            self.tokens.load(&key).await?
        } else {
            None
        };

        let mut result = FetchDatabaseChangesResult::default();
        let final_token = loop {
            cancel.check()?;

            let gateway = &self.gateway;
            let sent = token.as_ref();
            let page = self
                .retry
                .execute("fetch_database_changes", mode, cancel, move |_| {
                    gateway.fetch_database_changes(sent, qos)
                })
                .await?;

            result.changed_zone_ids.extend(page.changed_zone_ids);
            result.deleted_zone_ids.extend(page.deleted_zone_ids);
            result.purged_zone_ids.extend(page.purged_zone_ids);

            if !page.more_coming {
                break page.token;
            }
            if token.as_ref() == Some(&page.token) {
                return Err(CloudError::service(
                    ErrorCode::InternalError,
                    format!(
                        "{} database reported more changes without advancing its token",
                        self.scope
                    ),
                ));
            }
            token = Some(page.token);
        };

        cancel.check()?;
        event!(Level::DEBUG, scope = %self.scope, "database change token persisted");
        self.tokens.save(&key, final_token).await?;
        Ok(result)
    }
}

impl std::fmt::Debug for DatabaseApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseApi")
            .field("scope", &self.scope)
            .field("max_batch_size", &self.max_batch_size)
            .finish()
    }
}

/// Indexes outcomes by id, keeping the first one reported for each id.
fn index_outcomes(items: Vec<ItemOutcome>, operation: &str) -> HashMap<RecordId, ItemOutcome> {
    let mut by_id = HashMap::with_capacity(items.len());
    for item in items {
        match by_id.entry(item.id().clone()) {
            Entry::Occupied(entry) => {
                warn!("{}: duplicate outcome for {} ignored", operation, entry.key());
            }
            Entry::Vacant(entry) => {
                entry.insert(item);
            }
        }
    }
    by_id
}

/// Rejects requests that name the same record more than once.
fn ensure_unique_ids(saving: &[Record], deleting: &[RecordId]) -> Result<()> {
    let mut seen = HashSet::with_capacity(saving.len() + deleting.len());
    for id in saving.iter().map(|record| &record.id).chain(deleting) {
        if !seen.insert(id) {
            return Err(CloudError::InvalidRequest(format!(
                "record {} appears more than once in one modify request",
                id
            )));
        }
    }
    Ok(())
}

fn internal_failure(id: &RecordId, message: &str) -> RecordFailure {
    RecordFailure {
        id: id.clone(),
        error: CloudError::service(ErrorCode::InternalError, message),
    }
}

/// Lines up a batch's outcomes with what was submitted.
///
/// Every submitted id ends up in exactly one bucket. Saves only accept a
/// `Saved` outcome and deletes only a `Deleted` one; anything else, or no
/// outcome at all, is recorded as failed.
fn reconcile_modify(batch: &ModifyBatch, items: Vec<ItemOutcome>) -> ModifyRecordsResult {
    let mut by_id = index_outcomes(items, "modify_records");
    let mut result = ModifyRecordsResult::empty();

    for record in &batch.saves {
        match by_id.remove(&record.id) {
            Some(ItemOutcome::Saved { record }) => result.saved_records.push(record),
            Some(ItemOutcome::Failed { id, error }) => {
                result.failed_records.push(RecordFailure { id, error })
            }
            Some(_) => result
                .failed_records
                .push(internal_failure(&record.id, "service reported a non-save outcome for a saved record")),
            None => result
                .failed_records
                .push(internal_failure(&record.id, "service reported no outcome for this record")),
        }
    }

    for id in &batch.deletes {
        match by_id.remove(id) {
            Some(ItemOutcome::Deleted { id }) => result.deleted_record_ids.push(id),
            Some(ItemOutcome::Failed { id, error }) => {
                result.failed_records.push(RecordFailure { id, error })
            }
            Some(_) => result
                .failed_records
                .push(internal_failure(id, "service reported a non-delete outcome for a deleted record")),
            None => result
                .failed_records
                .push(internal_failure(id, "service reported no outcome for this record")),
        }
    }

    if !by_id.is_empty() {
        warn!(
            "modify_records: ignoring {} outcomes for records that were not submitted",
            by_id.len()
        );
    }
    result
}

fn reconcile_fetch(
    requested: &[RecordId],
    items: Vec<ItemOutcome>,
    result: &mut FetchRecordsResult,
) -> Result<()> {
    let mut by_id = index_outcomes(items, "fetch_records");

    for id in requested {
        match by_id.remove(id) {
            Some(ItemOutcome::Fetched { record }) | Some(ItemOutcome::Saved { record }) => {
                result.found_records.push(record)
            }
            Some(ItemOutcome::Failed { error, .. }) if !error.is_code(ErrorCode::UnknownItem) => {
                return Err(error);
            }
            Some(_) | None => result.not_found_record_ids.push(id.clone()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> Record {
        Record::new("Note", RecordId::new(name))
    }

    #[test]
    fn test_reconcile_accounts_for_every_id() {
        let batch = ModifyBatch::new(
            vec![record("a"), record("b"), record("c")],
            vec![RecordId::new("d")],
        );
        let items = vec![
            ItemOutcome::Deleted {
                id: RecordId::new("d"),
            },
            ItemOutcome::Saved { record: record("a") },
            ItemOutcome::Saved { record: record("a") },
            ItemOutcome::Saved {
                record: record("stranger"),
            },
            ItemOutcome::Failed {
                id: RecordId::new("c"),
                error: CloudError::service(ErrorCode::ServerRecordChanged, "stale"),
            },
        ];

        let result = reconcile_modify(&batch, items);

        assert_eq!(result.saved_records, vec![record("a")]);
        assert_eq!(result.deleted_record_ids, vec![RecordId::new("d")]);
        let failed: Vec<(&str, Option<ErrorCode>)> = result
            .failed_records
            .iter()
            .map(|f| (f.id.name.as_str(), f.error.code()))
            .collect();
        assert_eq!(
            failed,
            vec![
                ("b", Some(ErrorCode::InternalError)),
                ("c", Some(ErrorCode::ServerRecordChanged))
            ]
        );
        assert_eq!(result.item_count(), batch.len());
    }

    #[test]
    fn test_reconcile_checks_outcome_kind() {
        let batch = ModifyBatch::new(vec![record("a")], vec![RecordId::new("b")]);
        let items = vec![
            ItemOutcome::Deleted {
                id: RecordId::new("a"),
            },
            ItemOutcome::Saved { record: record("b") },
        ];

        let result = reconcile_modify(&batch, items);

        assert!(result.saved_records.is_empty());
        assert!(result.deleted_record_ids.is_empty());
        let failed: Vec<&str> = result.failed_records.iter().map(|f| f.id.name.as_str()).collect();
        assert_eq!(failed, vec!["a", "b"]);
        assert!(result
            .failed_records
            .iter()
            .all(|f| f.error.is_code(ErrorCode::InternalError)));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let err = ensure_unique_ids(&[record("a")], &[RecordId::new("a")]).unwrap_err();
        assert!(matches!(err, CloudError::InvalidRequest(_)));

        assert!(ensure_unique_ids(&[record("a"), record("b")], &[RecordId::new("c")]).is_ok());
        assert!(ensure_unique_ids(&[record("a"), record("a")], &[]).is_err());
    }

    #[test]
    fn test_reconcile_fetch() {
        let requested = vec![RecordId::new("a"), RecordId::new("b"), RecordId::new("c")];
        let items = vec![
            ItemOutcome::Fetched { record: record("a") },
            ItemOutcome::Failed {
                id: RecordId::new("b"),
                error: CloudError::service(ErrorCode::UnknownItem, "missing"),
            },
        ];

        let mut result = FetchRecordsResult::default();
        reconcile_fetch(&requested, items, &mut result).unwrap();
        assert_eq!(result.found_records, vec![record("a")]);
        assert_eq!(
            result.not_found_record_ids,
            vec![RecordId::new("b"), RecordId::new("c")]
        );
    }

    #[test]
    fn test_reconcile_fetch_fails_on_other_item_errors() {
        let denied = CloudError::service(ErrorCode::PermissionFailure, "denied");
        let items = vec![ItemOutcome::Failed {
            id: RecordId::new("a"),
            error: denied.clone(),
        }];

        let mut result = FetchRecordsResult::default();
        assert_eq!(
            reconcile_fetch(&[RecordId::new("a")], items, &mut result),
            Err(denied)
        );
    }
}
