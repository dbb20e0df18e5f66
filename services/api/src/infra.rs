use metrics_exporter_prometheus::PrometheusHandle;
use role_verification::config::VerificationConfig;
use role_verification::error::AppError;
use role_verification::workflows::verification::{
    InMemoryFileStore, InMemoryVerificationRepository, NotificationError, NotificationPublisher,
    RolePolicyRegistry, UploadPolicy, VerificationNotice, VerificationOrchestrator,
};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type ServiceOrchestrator =
    VerificationOrchestrator<InMemoryVerificationRepository, LoggingNotifier, InMemoryFileStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Delivers notices to the service log; stands in for an outbound mail or push channel.
#[derive(Debug, Default, Clone)]
pub(crate) struct LoggingNotifier;

impl NotificationPublisher for LoggingNotifier {
    fn publish(&self, notice: VerificationNotice) -> Result<(), NotificationError> {
        let verification_id = notice
            .verification_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let document_id = notice
            .document_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        info!(
            template = notice.template.as_str(),
            user_id = %notice.user_id,
            verification_id = %verification_id,
            document_id = %document_id,
            details = ?notice.details,
            "verification notice dispatched"
        );
        Ok(())
    }
}

/// Reads the role table from `path` when given, otherwise the built-in table.
pub(crate) fn load_registry(path: Option<&Path>) -> Result<RolePolicyRegistry, AppError> {
    match path {
        Some(path) => {
            let registry = RolePolicyRegistry::from_path(path)?;
            info!(path = %path.display(), roles = registry.roles().count(), "role policy loaded");
            Ok(registry)
        }
        None => Ok(RolePolicyRegistry::standard()),
    }
}

pub(crate) fn build_orchestrator(
    config: &VerificationConfig,
) -> Result<Arc<ServiceOrchestrator>, AppError> {
    let registry = load_registry(config.role_policy_path.as_deref())?;
    let orchestrator = VerificationOrchestrator::new(
        Arc::new(InMemoryVerificationRepository::default()),
        Arc::new(LoggingNotifier),
        Arc::new(InMemoryFileStore::default()),
    )
    .with_registry(registry)
    .with_upload_policy(UploadPolicy::new(config.max_upload_bytes));

    Ok(Arc::new(orchestrator))
}
