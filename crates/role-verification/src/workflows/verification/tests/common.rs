use std::sync::{Arc, Barrier};

use axum::response::Response;
use serde_json::Value;

use crate::workflows::verification::{
    Caller, ChangeSet, Committed, Document, DocumentDraft, DocumentId, DocumentType, FileStore,
    FileUpload, InMemoryFileStore, InMemoryVerificationRepository, NotificationError,
    NotificationPublisher, RecordFilter, RecordingNotifier, RepositoryError, RoleName, UserId,
    VerificationId, VerificationNotice, VerificationOrchestrator, VerificationRecord,
    VerificationRepository,
};

pub(super) type MemoryOrchestrator =
    VerificationOrchestrator<InMemoryVerificationRepository, RecordingNotifier, InMemoryFileStore>;

pub(super) const ADVOCATE_DOCUMENTS: [&str; 3] =
    ["roll_number_cert", "practice_license", "work_certificate"];

pub(super) fn build_orchestrator() -> (
    MemoryOrchestrator,
    Arc<InMemoryVerificationRepository>,
    Arc<RecordingNotifier>,
    Arc<InMemoryFileStore>,
) {
    let repository = Arc::new(InMemoryVerificationRepository::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let files = Arc::new(InMemoryFileStore::default());
    let service = VerificationOrchestrator::new(repository.clone(), notifier.clone(), files.clone());
    (service, repository, notifier, files)
}

pub(super) fn admin() -> Caller {
    Caller::admin("admin-1")
}

pub(super) fn pdf(name: &str) -> FileUpload {
    FileUpload::new(
        format!("{name}.pdf"),
        Some("application/pdf"),
        b"%PDF-1.7 scanned certificate".to_vec(),
    )
}

pub(super) fn draft(document_type: &str) -> DocumentDraft {
    DocumentDraft {
        document_type: DocumentType::new(document_type),
        title: format!("{document_type} scan"),
        description: None,
    }
}

/// Registers `user` under `role`, returning the applicant caller and its record.
pub(super) fn enroll<R, N, F>(
    service: &VerificationOrchestrator<R, N, F>,
    user: &str,
    role: &str,
) -> (Caller, VerificationRecord)
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = Caller::applicant(user);
    let record = service
        .register(&caller.user_id, &RoleName::new(role))
        .expect("registration succeeds");
    (caller, record)
}

pub(super) fn upload_all<R, N, F>(
    service: &VerificationOrchestrator<R, N, F>,
    caller: &Caller,
    types: &[&str],
) -> Vec<Document>
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    types
        .iter()
        .map(|kind| {
            service
                .upload_document(caller, draft(kind), pdf(kind))
                .expect("upload accepted")
        })
        .collect()
}

#[derive(Default)]
pub(super) struct FailingNotifier;

impl NotificationPublisher for FailingNotifier {
    fn publish(&self, _notice: VerificationNotice) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay offline".to_string()))
    }
}

pub(super) struct UnavailableRepository;

impl VerificationRepository for UnavailableRepository {
    fn insert_record(
        &self,
        _record: VerificationRecord,
    ) -> Result<VerificationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_record(
        &self,
        _id: &VerificationId,
    ) -> Result<Option<VerificationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_record_for_user(
        &self,
        _user_id: &UserId,
    ) -> Result<Option<VerificationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn records(&self, _filter: &RecordFilter) -> Result<Vec<VerificationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_document(&self, _id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn documents_for_user(&self, _user_id: &UserId) -> Result<Vec<Document>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn pending_documents(&self) -> Result<Vec<Document>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn commit(&self, _changes: ChangeSet) -> Result<Committed, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Holds every `fetch_record` caller at a barrier so racing commands all decide
/// against the same snapshot before any of them commits.
pub(super) struct LockstepRepository {
    pub(super) inner: InMemoryVerificationRepository,
    pub(super) barrier: Barrier,
}

impl LockstepRepository {
    pub(super) fn new(inner: InMemoryVerificationRepository, parties: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(parties),
        }
    }
}

impl VerificationRepository for LockstepRepository {
    fn insert_record(
        &self,
        record: VerificationRecord,
    ) -> Result<VerificationRecord, RepositoryError> {
        self.inner.insert_record(record)
    }

    fn fetch_record(
        &self,
        id: &VerificationId,
    ) -> Result<Option<VerificationRecord>, RepositoryError> {
        let snapshot = self.inner.fetch_record(id);
        self.barrier.wait();
        snapshot
    }

    fn fetch_record_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerificationRecord>, RepositoryError> {
        self.inner.fetch_record_for_user(user_id)
    }

    fn records(&self, filter: &RecordFilter) -> Result<Vec<VerificationRecord>, RepositoryError> {
        self.inner.records(filter)
    }

    fn fetch_document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        self.inner.fetch_document(id)
    }

    fn documents_for_user(&self, user_id: &UserId) -> Result<Vec<Document>, RepositoryError> {
        self.inner.documents_for_user(user_id)
    }

    fn pending_documents(&self) -> Result<Vec<Document>, RepositoryError> {
        self.inner.pending_documents()
    }

    fn commit(&self, changes: ChangeSet) -> Result<Committed, RepositoryError> {
        self.inner.commit(changes)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
