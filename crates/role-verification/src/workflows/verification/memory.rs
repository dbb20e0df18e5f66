//! In-process adapters for the repository, file store, and notification seams.
//!
//! Used by the API service until a database-backed implementation lands, and by
//! tests across the workspace.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::document::Document;
use super::domain::{DocumentId, DocumentStatus, FileRef, FileUpload, UserId, VerificationId};
use super::record::VerificationRecord;
use super::repository::{
    ChangeSet, Committed, DocumentChange, FileStore, FileStoreError, NotificationError,
    NotificationPublisher, RecordFilter, RepositoryError, VerificationNotice,
    VerificationRepository,
};

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<VerificationId, VerificationRecord>,
    by_user: HashMap<UserId, VerificationId>,
    documents: HashMap<DocumentId, Document>,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryVerificationRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryVerificationRepository {
    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }
}

fn sorted_records(mut records: Vec<VerificationRecord>) -> Vec<VerificationRecord> {
    records.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.issue_order().cmp(&b.id.issue_order()))
    });
    records
}

fn sorted_documents(mut documents: Vec<Document>) -> Vec<Document> {
    documents.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.issue_order().cmp(&b.id.issue_order()))
    });
    documents
}

fn check_version(entity: String, expected: u64, found: u64) -> Result<(), RepositoryError> {
    if expected == found {
        Ok(())
    } else {
        Err(RepositoryError::StaleVersion {
            entity,
            expected,
            found,
        })
    }
}

impl VerificationRepository for InMemoryVerificationRepository {
    fn insert_record(
        &self,
        record: VerificationRecord,
    ) -> Result<VerificationRecord, RepositoryError> {
        let mut tables = self.lock()?;
        if tables.by_user.contains_key(&record.user_id) {
            return Err(RepositoryError::Conflict(format!(
                "user {} already has a verification record",
                record.user_id
            )));
        }
        if tables.records.contains_key(&record.id) {
            return Err(RepositoryError::Conflict(format!(
                "verification {} already exists",
                record.id
            )));
        }
        tables
            .by_user
            .insert(record.user_id.clone(), record.id.clone());
        tables.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch_record(
        &self,
        id: &VerificationId,
    ) -> Result<Option<VerificationRecord>, RepositoryError> {
        Ok(self.lock()?.records.get(id).cloned())
    }

    fn fetch_record_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerificationRecord>, RepositoryError> {
        let tables = self.lock()?;
        Ok(tables
            .by_user
            .get(user_id)
            .and_then(|id| tables.records.get(id))
            .cloned())
    }

    fn records(&self, filter: &RecordFilter) -> Result<Vec<VerificationRecord>, RepositoryError> {
        let tables = self.lock()?;
        let matching = tables
            .records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        Ok(sorted_records(matching))
    }

    fn fetch_document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        Ok(self.lock()?.documents.get(id).cloned())
    }

    fn documents_for_user(&self, user_id: &UserId) -> Result<Vec<Document>, RepositoryError> {
        let tables = self.lock()?;
        let owned = tables
            .documents
            .values()
            .filter(|document| &document.owner == user_id)
            .cloned()
            .collect();
        Ok(sorted_documents(owned))
    }

    fn pending_documents(&self) -> Result<Vec<Document>, RepositoryError> {
        let tables = self.lock()?;
        let pending = tables
            .documents
            .values()
            .filter(|document| document.status == DocumentStatus::Pending)
            .cloned()
            .collect();
        Ok(sorted_documents(pending))
    }

    fn commit(&self, changes: ChangeSet) -> Result<Committed, RepositoryError> {
        let mut tables = self.lock()?;

        // validate everything before touching the tables
        if let Some(change) = &changes.record {
            let current = tables
                .records
                .get(&change.record.id)
                .ok_or(RepositoryError::NotFound)?;
            check_version(
                format!("verification {}", change.record.id),
                change.expected_version,
                current.version,
            )?;
        }
        match &changes.document {
            Some(DocumentChange::Insert(document)) => {
                if tables.documents.contains_key(&document.id) {
                    return Err(RepositoryError::Conflict(format!(
                        "document {} already exists",
                        document.id
                    )));
                }
            }
            Some(DocumentChange::Update {
                document,
                expected_version,
            }) => {
                let current = tables
                    .documents
                    .get(&document.id)
                    .ok_or(RepositoryError::NotFound)?;
                check_version(
                    format!("document {}", document.id),
                    *expected_version,
                    current.version,
                )?;
            }
            Some(DocumentChange::Delete {
                id,
                expected_version,
            }) => {
                let current = tables.documents.get(id).ok_or(RepositoryError::NotFound)?;
                check_version(format!("document {id}"), *expected_version, current.version)?;
            }
            None => {}
        }

        let mut committed = Committed::default();

        if let Some(change) = changes.record {
            let mut record = change.record;
            record.version = change.expected_version + 1;
            tables.records.insert(record.id.clone(), record.clone());
            committed.record = Some(record);
        }
        match changes.document {
            Some(DocumentChange::Insert(document)) => {
                tables.documents.insert(document.id.clone(), document.clone());
                committed.document = Some(document);
            }
            Some(DocumentChange::Update {
                mut document,
                expected_version,
            }) => {
                document.version = expected_version + 1;
                tables.documents.insert(document.id.clone(), document.clone());
                committed.document = Some(document);
            }
            Some(DocumentChange::Delete { id, .. }) => {
                committed.document = tables.documents.remove(&id);
            }
            None => {}
        }

        Ok(committed)
    }
}

#[derive(Debug, Clone)]
struct StoredBlob {
    owner: UserId,
    bytes: Vec<u8>,
}

/// Keeps uploaded binaries in memory under `mem://` references.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFileStore {
    blobs: Arc<Mutex<HashMap<FileRef, StoredBlob>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryFileStore {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<FileRef, StoredBlob>>, FileStoreError> {
        self.blobs
            .lock()
            .map_err(|_| FileStoreError::Unavailable("file store mutex poisoned".to_string()))
    }

    pub fn contains(&self, file_ref: &FileRef) -> bool {
        self.lock()
            .map(|blobs| blobs.contains_key(file_ref))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read(&self, file_ref: &FileRef) -> Result<(UserId, Vec<u8>), FileStoreError> {
        let blobs = self.lock()?;
        blobs
            .get(file_ref)
            .map(|blob| (blob.owner.clone(), blob.bytes.clone()))
            .ok_or_else(|| FileStoreError::Missing(file_ref.clone()))
    }
}

impl FileStore for InMemoryFileStore {
    fn store(&self, owner: &UserId, upload: &FileUpload) -> Result<FileRef, FileStoreError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let file_ref = FileRef(format!("mem://{owner}/{id:06}-{}", upload.file_name));
        self.lock()?.insert(
            file_ref.clone(),
            StoredBlob {
                owner: owner.clone(),
                bytes: upload.bytes.clone(),
            },
        );
        Ok(file_ref)
    }

    fn discard(&self, file_ref: &FileRef) -> Result<(), FileStoreError> {
        match self.lock()?.remove(file_ref) {
            Some(_) => Ok(()),
            None => Err(FileStoreError::Missing(file_ref.clone())),
        }
    }
}

/// Captures published notices instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<VerificationNotice>>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<VerificationNotice> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl NotificationPublisher for RecordingNotifier {
    fn publish(&self, notice: VerificationNotice) -> Result<(), NotificationError> {
        self.events
            .lock()
            .map_err(|_| NotificationError::Transport("notifier mutex poisoned".to_string()))?
            .push(notice);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::verification::domain::{RoleName, VerificationStatus};
    use crate::workflows::verification::policy::RolePolicy;
    use chrono::Utc;

    fn record(id: &str, user: &str) -> VerificationRecord {
        VerificationRecord::create(
            VerificationId(id.to_string()),
            UserId(user.to_string()),
            RoleName::new("lawyer"),
            &RolePolicy::reviewed(&["professional_cert"], &[]),
            Utc::now(),
        )
    }

    #[test]
    fn one_record_per_user() {
        let repository = InMemoryVerificationRepository::default();
        repository.insert_record(record("ver-1", "u1")).expect("first");
        match repository.insert_record(record("ver-2", "u1")) {
            Err(RepositoryError::Conflict(reason)) => assert!(reason.contains("u1")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn stale_commit_leaves_state_intact() {
        let repository = InMemoryVerificationRepository::default();
        let stored = repository.insert_record(record("ver-1", "u1")).expect("insert");

        let mut first = stored.clone();
        first.status = VerificationStatus::Rejected;
        let committed = repository
            .commit(ChangeSet::record(first, stored.version))
            .expect("first writer wins");
        assert_eq!(committed.record.map(|r| r.version), Some(stored.version + 1));

        let mut second = stored.clone();
        second.status = VerificationStatus::Verified;
        match repository.commit(ChangeSet::record(second, stored.version)) {
            Err(RepositoryError::StaleVersion {
                expected, found, ..
            }) => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("expected stale version, got {other:?}"),
        }

        let current = repository
            .fetch_record(&stored.id)
            .expect("fetch")
            .expect("present");
        assert_eq!(current.status, VerificationStatus::Rejected);
    }

    #[test]
    fn file_store_round_trips_and_discards() {
        let store = InMemoryFileStore::default();
        let owner = UserId("u1".to_string());
        let file_ref = store
            .store(&owner, &FileUpload::new("id.pdf", None, b"%PDF".to_vec()))
            .expect("stored");
        assert!(store.contains(&file_ref));
        assert_eq!(store.read(&file_ref).expect("read").1, b"%PDF".to_vec());

        store.discard(&file_ref).expect("discarded");
        assert!(store.is_empty());
        assert!(matches!(
            store.discard(&file_ref),
            Err(FileStoreError::Missing(_))
        ));
    }
}
