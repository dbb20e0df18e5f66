use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::document::{Document, DocumentDraft, UploadPolicy};
use super::domain::{
    Caller, DocumentId, DocumentType, FileUpload, RoleName, StoredFile, UserId, VerificationId,
};
use super::error::{require_text, VerificationError};
use super::policy::{RolePolicy, RolePolicyRegistry};
use super::progress::Readiness;
use super::record::VerificationRecord;
use super::repository::{
    ChangeSet, DocumentChange, FileStore, NoticeTemplate, NotificationPublisher, RecordFilter,
    RepositoryError, VerificationNotice, VerificationRepository,
};
use super::statistics::VerificationStatistics;
use super::views::{DocumentView, PendingReviewEntry, VerificationRecordView};

static RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static DOCUMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_record_id() -> VerificationId {
    let id = RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    VerificationId(format!("ver-{id:06}"))
}

fn next_document_id() -> DocumentId {
    let id = DOCUMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DocumentId(format!("doc-{id:06}"))
}

/// One mutex per user, handed out on demand and dropped once no caller holds it.
#[derive(Default)]
struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    fn handle(&self, user_id: &UserId) -> Result<Arc<Mutex<()>>, VerificationError> {
        let mut locks = self.inner.lock().map_err(|_| poisoned())?;
        Ok(locks.entry(user_id.clone()).or_default().clone())
    }

    /// Runs `work` while holding the user's lock.
    fn run<T>(
        &self,
        user_id: &UserId,
        work: impl FnOnce() -> Result<T, VerificationError>,
    ) -> Result<T, VerificationError> {
        let handle = self.handle(user_id)?;
        let result = match handle.lock() {
            Ok(_guard) => work(),
            Err(_) => Err(poisoned()),
        };
        self.release(user_id, handle);
        result
    }

    fn release(&self, user_id: &UserId, handle: Arc<Mutex<()>>) {
        let Ok(mut locks) = self.inner.lock() else {
            return;
        };
        // clones are only handed out under the map lock: the map and `handle` are the last owners
        if Arc::strong_count(&handle) == 2 {
            locks.remove(user_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}

fn poisoned() -> VerificationError {
    RepositoryError::Unavailable("user lock poisoned".to_string()).into()
}

/// Single writer of verification records and documents.
///
/// Record commands decide against a snapshot and commit with the snapshot's
/// version, so two admins racing on the same record cannot both succeed. Document
/// reviews only serialize on the owner's lock while progress is recomputed.
pub struct VerificationOrchestrator<R, N, F> {
    registry: Arc<RolePolicyRegistry>,
    uploads: UploadPolicy,
    repository: Arc<R>,
    notifier: Arc<N>,
    files: Arc<F>,
    locks: UserLocks,
}

impl<R, N, F> VerificationOrchestrator<R, N, F>
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, files: Arc<F>) -> Self {
        Self {
            registry: Arc::new(RolePolicyRegistry::standard()),
            uploads: UploadPolicy::default(),
            repository,
            notifier,
            files,
            locks: UserLocks::default(),
        }
    }

    pub fn with_registry(mut self, registry: RolePolicyRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_upload_policy(mut self, uploads: UploadPolicy) -> Self {
        self.uploads = uploads;
        self
    }

    pub fn registry(&self) -> &RolePolicyRegistry {
        &self.registry
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        self.uploads
    }

    /// Creates the user's record, resolving its initial state from the role policy.
    pub fn register(
        &self,
        user_id: &UserId,
        role: &RoleName,
    ) -> Result<VerificationRecord, VerificationError> {
        let policy = self.registry.lookup(role)?;
        let record = VerificationRecord::create(
            next_record_id(),
            user_id.clone(),
            role.clone(),
            policy,
            Utc::now(),
        );

        let stored = self.repository.insert_record(record)?;
        info!(
            user_id = %stored.user_id,
            record_id = %stored.id,
            role = %stored.role,
            status = stored.status.as_str(),
            "verification record created"
        );
        Ok(stored)
    }

    /// Returns the user's record, creating it first for users that predate the workflow.
    pub fn ensure_registered(
        &self,
        user_id: &UserId,
        role: &RoleName,
    ) -> Result<VerificationRecord, VerificationError> {
        if let Some(existing) = self.repository.fetch_record_for_user(user_id)? {
            return Ok(existing);
        }

        match self.register(user_id, role) {
            Err(VerificationError::Repository(RepositoryError::Conflict(_))) => self
                .repository
                .fetch_record_for_user(user_id)?
                .ok_or_else(|| VerificationError::NoRecordForUser(user_id.clone())),
            other => other,
        }
    }

    pub fn upload_document(
        &self,
        caller: &Caller,
        draft: DocumentDraft,
        upload: FileUpload,
    ) -> Result<Document, VerificationError> {
        let record = self.record_for_user(&caller.user_id)?;
        let policy = self.registry.lookup(&record.role)?;
        let format = self.uploads.check(policy, &draft.document_type, &upload)?;
        require_text(&draft.title, "title")?;

        let file_ref = self.files.store(&caller.user_id, &upload)?;
        let file = StoredFile {
            file_ref: file_ref.clone(),
            file_name: upload.file_name.clone(),
            format,
            size_bytes: upload.size_bytes(),
        };

        let stored = Document::upload(
            next_document_id(),
            caller.user_id.clone(),
            draft,
            file,
            Utc::now(),
        )
        .and_then(|document| {
            self.repository
                .commit(ChangeSet::document(DocumentChange::Insert(document)))
                .map_err(VerificationError::from)
        });

        let committed = match stored {
            Ok(committed) => committed,
            Err(err) => {
                if let Err(discard) = self.files.discard(&file_ref) {
                    warn!(%file_ref, error = %discard, "failed to discard orphaned upload");
                }
                return Err(err);
            }
        };

        let document = committed
            .document
            .ok_or(VerificationError::Repository(RepositoryError::NotFound))?;
        info!(
            user_id = %document.owner,
            document_id = %document.id,
            document_type = %document.document_type,
            size_bytes = document.file.size_bytes,
            "document uploaded"
        );
        Ok(document)
    }

    /// Owner-only removal of a document that has not been reviewed yet.
    pub fn delete_document(
        &self,
        caller: &Caller,
        document_id: &DocumentId,
    ) -> Result<(), VerificationError> {
        let document = self.document(document_id)?;
        document.ensure_deletable_by(&caller.user_id)?;

        self.repository.commit(ChangeSet::document(DocumentChange::Delete {
            id: document.id.clone(),
            expected_version: document.version,
        }))?;

        if let Err(err) = self.files.discard(&document.file.file_ref) {
            warn!(document_id = %document.id, error = %err, "stored file could not be discarded");
        }
        info!(user_id = %caller.user_id, document_id = %document.id, "document deleted");
        Ok(())
    }

    pub fn verify_document(
        &self,
        caller: &Caller,
        document_id: &DocumentId,
        notes: Option<&str>,
    ) -> Result<Document, VerificationError> {
        let admin = caller.require_admin()?;
        let mut document = self.document(document_id)?;
        let expected_version = document.version;
        document.verify(admin, notes, Utc::now())?;

        let reviewed = self.commit_review(document, expected_version)?;
        info!(
            admin = %admin,
            user_id = %reviewed.owner,
            document_id = %reviewed.id,
            "document verified"
        );
        Ok(reviewed)
    }

    pub fn reject_document(
        &self,
        caller: &Caller,
        document_id: &DocumentId,
        reason: &str,
    ) -> Result<Document, VerificationError> {
        let admin = caller.require_admin()?;
        let mut document = self.document(document_id)?;
        let expected_version = document.version;
        document.reject(admin, reason, Utc::now())?;

        let reviewed = self.commit_review(document, expected_version)?;
        info!(
            admin = %admin,
            user_id = %reviewed.owner,
            document_id = %reviewed.id,
            "document rejected"
        );

        let mut details = BTreeMap::new();
        details.insert(
            "document_type".to_string(),
            reviewed.document_type.to_string(),
        );
        details.insert(
            "reason".to_string(),
            reviewed.review_notes.clone().unwrap_or_default(),
        );
        self.notify(VerificationNotice {
            template: NoticeTemplate::DocumentRejected,
            user_id: reviewed.owner.clone(),
            verification_id: None,
            document_id: Some(reviewed.id.clone()),
            details,
        });
        Ok(reviewed)
    }

    pub fn approve(
        &self,
        caller: &Caller,
        record_id: &VerificationId,
        notes: Option<&str>,
    ) -> Result<VerificationRecord, VerificationError> {
        let admin = caller.require_admin()?;
        let (mut record, readiness) = self.snapshot(record_id)?;
        let expected_version = record.version;
        record.approve(admin, notes, &readiness, Utc::now())?;

        let approved = self.commit_record(record, expected_version)?;
        info!(admin = %admin, record_id = %approved.id, user_id = %approved.user_id, "verification approved");

        let mut details = BTreeMap::new();
        details.insert("role".to_string(), approved.role.to_string());
        self.notify(VerificationNotice {
            template: NoticeTemplate::VerificationApproved,
            user_id: approved.user_id.clone(),
            verification_id: Some(approved.id.clone()),
            document_id: None,
            details,
        });
        Ok(approved)
    }

    pub fn reject(
        &self,
        caller: &Caller,
        record_id: &VerificationId,
        reason: &str,
    ) -> Result<VerificationRecord, VerificationError> {
        let admin = caller.require_admin()?;
        let (mut record, readiness) = self.snapshot(record_id)?;
        let expected_version = record.version;
        record.reject(admin, reason, &readiness, Utc::now())?;

        let rejected = self.commit_record(record, expected_version)?;
        info!(admin = %admin, record_id = %rejected.id, user_id = %rejected.user_id, "verification rejected");

        let mut details = BTreeMap::new();
        details.insert(
            "reason".to_string(),
            rejected.rejection_reason.clone().unwrap_or_default(),
        );
        self.notify(VerificationNotice {
            template: NoticeTemplate::VerificationRejected,
            user_id: rejected.user_id.clone(),
            verification_id: Some(rejected.id.clone()),
            document_id: None,
            details,
        });
        Ok(rejected)
    }

    pub fn request_documents(
        &self,
        caller: &Caller,
        record_id: &VerificationId,
        document_types: Vec<DocumentType>,
        message: &str,
    ) -> Result<VerificationRecord, VerificationError> {
        let admin = caller.require_admin()?;
        let mut record = self.fetch_record(record_id)?;
        let policy = self.registry.lookup(&record.role)?;
        let expected_version = record.version;
        let request =
            record.request_documents(admin, document_types, message, policy, Utc::now())?;

        let updated = self.commit_record(record, expected_version)?;
        info!(
            admin = %admin,
            record_id = %updated.id,
            requested = request.document_types.len(),
            "documents requested"
        );

        let mut details = BTreeMap::new();
        details.insert(
            "document_types".to_string(),
            request
                .document_types
                .iter()
                .map(DocumentType::as_str)
                .collect::<Vec<_>>()
                .join(","),
        );
        details.insert("message".to_string(), request.message.clone());
        self.notify(VerificationNotice {
            template: NoticeTemplate::DocumentsRequested,
            user_id: updated.user_id.clone(),
            verification_id: Some(updated.id.clone()),
            document_id: None,
            details,
        });
        Ok(updated)
    }

    pub fn my_status(&self, caller: &Caller) -> Result<VerificationRecordView, VerificationError> {
        let record = self.record_for_user(&caller.user_id)?;
        self.view(&record)
    }

    pub fn my_documents(&self, caller: &Caller) -> Result<Vec<DocumentView>, VerificationError> {
        let record = self.record_for_user(&caller.user_id)?;
        let documents = self.repository.documents_for_user(&record.user_id)?;
        Ok(documents
            .iter()
            .map(|document| DocumentView::build(document, &self.registry))
            .collect())
    }

    pub fn list_pending(
        &self,
        caller: &Caller,
    ) -> Result<Vec<VerificationRecordView>, VerificationError> {
        caller.require_admin()?;
        self.views(&RecordFilter::Pending)
    }

    pub fn list_by_role(
        &self,
        caller: &Caller,
        role: &RoleName,
    ) -> Result<Vec<VerificationRecordView>, VerificationError> {
        caller.require_admin()?;
        self.registry.lookup(role)?;
        self.views(&RecordFilter::Role(role.clone()))
    }

    pub fn record(
        &self,
        caller: &Caller,
        record_id: &VerificationId,
    ) -> Result<VerificationRecordView, VerificationError> {
        caller.require_admin()?;
        let record = self.fetch_record(record_id)?;
        self.view(&record)
    }

    pub fn pending_documents(
        &self,
        caller: &Caller,
    ) -> Result<Vec<DocumentView>, VerificationError> {
        caller.require_admin()?;
        let documents = self.repository.pending_documents()?;
        Ok(documents
            .iter()
            .map(|document| DocumentView::build(document, &self.registry))
            .collect())
    }

    /// Pending applicants who uploaded every required document type.
    pub fn users_needing_review(
        &self,
        caller: &Caller,
    ) -> Result<Vec<PendingReviewEntry>, VerificationError> {
        caller.require_admin()?;
        let mut entries = Vec::new();
        for record in self.repository.records(&RecordFilter::Pending)? {
            let Ok(policy) = self.registry.lookup(&record.role) else {
                debug!(record_id = %record.id, role = %record.role, "skipping record with unconfigured role");
                continue;
            };
            let documents = self.repository.documents_for_user(&record.user_id)?;
            if Readiness::assess(policy, &documents).all_required_uploaded() {
                entries.push(PendingReviewEntry::build(&record, &documents));
            }
        }
        Ok(entries)
    }

    pub fn statistics(&self, caller: &Caller) -> Result<VerificationStatistics, VerificationError> {
        caller.require_admin()?;
        let records = self.repository.records(&RecordFilter::All)?;
        Ok(VerificationStatistics::from_records(&self.registry, &records))
    }

    fn fetch_record(
        &self,
        record_id: &VerificationId,
    ) -> Result<VerificationRecord, VerificationError> {
        self.repository
            .fetch_record(record_id)?
            .ok_or_else(|| VerificationError::RecordNotFound(record_id.clone()))
    }

    fn record_for_user(&self, user_id: &UserId) -> Result<VerificationRecord, VerificationError> {
        self.repository
            .fetch_record_for_user(user_id)?
            .ok_or_else(|| VerificationError::NoRecordForUser(user_id.clone()))
    }

    fn document(&self, document_id: &DocumentId) -> Result<Document, VerificationError> {
        self.repository
            .fetch_document(document_id)?
            .ok_or_else(|| VerificationError::DocumentNotFound(document_id.clone()))
    }

    fn readiness(
        &self,
        policy: &RolePolicy,
        user_id: &UserId,
    ) -> Result<Readiness, VerificationError> {
        let documents = self.repository.documents_for_user(user_id)?;
        Ok(Readiness::assess(policy, &documents))
    }

    fn snapshot(
        &self,
        record_id: &VerificationId,
    ) -> Result<(VerificationRecord, Readiness), VerificationError> {
        let record = self.fetch_record(record_id)?;
        let policy = self.registry.lookup(&record.role)?;
        let readiness = self.readiness(policy, &record.user_id)?;
        Ok((record, readiness))
    }

    /// Commits a record decided against `expected_version` under the owner's lock.
    fn commit_record(
        &self,
        record: VerificationRecord,
        expected_version: u64,
    ) -> Result<VerificationRecord, VerificationError> {
        let user_id = record.user_id.clone();
        let record_id = record.id.clone();
        let committed = self.locks.run(&user_id, || {
            self.repository
                .commit(ChangeSet::record(record, expected_version))
                .map_err(|err| stale_as_conflict(err, "verification", &record_id.0))
        })?;
        committed
            .record
            .ok_or(VerificationError::RecordNotFound(record_id))
    }

    /// Persists a reviewed document together with the owner's recomputed progress.
    /// The record is re-read under the owner's lock so reviews of sibling documents
    /// do not invalidate each other.
    fn commit_review(
        &self,
        document: Document,
        expected_version: u64,
    ) -> Result<Document, VerificationError> {
        let owner = document.owner.clone();
        self.locks
            .run(&owner, || self.apply_review(document, expected_version))
    }

    fn apply_review(
        &self,
        document: Document,
        expected_version: u64,
    ) -> Result<Document, VerificationError> {
        let mut changes = ChangeSet::document(DocumentChange::Update {
            document: document.clone(),
            expected_version,
        });

        if let Some(mut record) = self.repository.fetch_record_for_user(&document.owner)? {
            let policy = self.registry.lookup(&record.role)?;
            let mut documents = self.repository.documents_for_user(&document.owner)?;
            for existing in documents.iter_mut() {
                if existing.id == document.id {
                    *existing = document.clone();
                }
            }

            let record_version = record.version;
            let before = record.progress;
            if record.recompute_progress(&Readiness::assess(policy, &documents)) {
                debug!(
                    record_id = %record.id,
                    from = before,
                    to = record.progress,
                    "progress recomputed"
                );
                record.updated_at = document.updated_at;
                changes = changes.with_record(record, record_version);
            }
        }

        let document_id = document.id.clone();
        let committed = self
            .repository
            .commit(changes)
            .map_err(|err| stale_as_conflict(err, "document", &document_id.0))?;
        committed
            .document
            .ok_or(VerificationError::DocumentNotFound(document_id))
    }

    fn view(&self, record: &VerificationRecord) -> Result<VerificationRecordView, VerificationError> {
        let documents = self.repository.documents_for_user(&record.user_id)?;
        Ok(VerificationRecordView::build(
            record,
            &documents,
            &self.registry,
        ))
    }

    fn views(&self, filter: &RecordFilter) -> Result<Vec<VerificationRecordView>, VerificationError> {
        self.repository
            .records(filter)?
            .iter()
            .map(|record| self.view(record))
            .collect()
    }

    fn notify(&self, notice: VerificationNotice) {
        let template = notice.template;
        let user_id = notice.user_id.clone();
        if let Err(err) = self.notifier.publish(notice) {
            warn!(template = template.as_str(), %user_id, error = %err, "notification dropped");
        }
    }
}

fn stale_as_conflict(err: RepositoryError, entity: &str, id: &str) -> VerificationError {
    match err {
        RepositoryError::StaleVersion { .. } => VerificationError::StateConflict(format!(
            "{entity} {id} was modified concurrently; reload and retry"
        )),
        other => other.into(),
    }
}
