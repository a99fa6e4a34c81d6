use crate::connection::ClientConfig;
use crate::core::{QualityOfService, RecordId, Result};
use crate::gateway::ContainerGateway;
use crate::orchestrator::{CancellationToken, RetryController};
use crate::settings::{OperationFamily, SettingsProvider};
use std::sync::Arc;
use tracing::{Instrument, info_span};

/// Container-level entry point, shared by every caller of a client.
pub struct ContainerApi {
    gateway: Arc<dyn ContainerGateway>,
    settings: SettingsProvider,
    retry: RetryController,
}

impl ContainerApi {
    pub fn new(
        gateway: Arc<dyn ContainerGateway>,
        settings: SettingsProvider,
        config: &ClientConfig,
    ) -> Self {
        Self {
            gateway,
            settings,
            retry: RetryController::new(config.retry.clone()),
        }
    }

    /// Id of the signed-in user's record. Transient failures are retried.
    pub async fn user_record_id(&self, qos: QualityOfService) -> Result<RecordId> {
        self.user_record_id_with_cancel(qos, &CancellationToken::new())
            .await
    }

    pub async fn user_record_id_with_cancel(
        &self,
        qos: QualityOfService,
        cancel: &CancellationToken,
    ) -> Result<RecordId> {
        let mode = (self.settings)().resolve(OperationFamily::Container)?;
        let span = info_span!("user_record_id", qos = ?qos);

        let gateway = &self.gateway;
        self.retry
            .execute("user_record_id", mode, cancel, move |_| {
                gateway.fetch_user_record_id(qos)
            })
            .instrument(span)
            .await
    }
}

impl std::fmt::Debug for ContainerApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerApi")
            .field("retry", self.retry.policy())
            .finish()
    }
}
