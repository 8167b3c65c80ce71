use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Profile details reported by the chat transport on first contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Persisted shape for a learner.
///
/// `resume_cursor` is a coarse course position kept across process restarts;
/// in-session navigation never reads it back. `completed_at` is set when the
/// final test is finished and cleared by the next cursor update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub profile: UserProfile,
    pub resume_cursor: u32,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Repository contract for learner records.
#[async_trait]
pub trait UserRecordRepository: Send + Sync {
    /// Fetch the record for `user_id`, creating it from `profile` when missing.
    ///
    /// The stored `last_activity` is moved to `now`; the returned record keeps
    /// the previous value so callers can tell how long the user was away.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be read or written.
    async fn get_or_create(
        &self,
        user_id: UserId,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, StorageError>;

    /// Persist a new resume cursor, clear any completion mark and touch
    /// `last_activity`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user has no record.
    async fn update_cursor(
        &self,
        user_id: UserId,
        cursor: u32,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Mark the whole course, final test included, as finished.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user has no record.
    async fn mark_completed(&self, user_id: UserId, now: DateTime<Utc>) -> Result<(), StorageError>;

    /// Unfinished users with progress whose last activity is older than
    /// `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn inactive_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<UserRecord>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    users: Arc<Mutex<HashMap<UserId, UserRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Insert or replace a record as-is.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn insert(&self, record: UserRecord) -> Result<(), StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(record.user_id, record);
        Ok(())
    }
}

#[async_trait]
impl UserRecordRepository for InMemoryRepository {
    async fn get_or_create(
        &self,
        user_id: UserId,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let stored = guard.entry(user_id).or_insert_with(|| UserRecord {
            user_id,
            profile: profile.clone(),
            resume_cursor: 0,
            last_activity: now,
            created_at: now,
            completed_at: None,
        });
        let previous = stored.clone();
        stored.last_activity = now;
        Ok(previous)
    }

    async fn update_cursor(
        &self,
        user_id: UserId,
        cursor: u32,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let record = guard.get_mut(&user_id).ok_or(StorageError::NotFound)?;
        record.resume_cursor = cursor;
        record.completed_at = None;
        record.last_activity = now;
        Ok(())
    }

    async fn mark_completed(&self, user_id: UserId, now: DateTime<Utc>) -> Result<(), StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let record = guard.get_mut(&user_id).ok_or(StorageError::NotFound)?;
        record.completed_at = Some(now);
        record.last_activity = now;
        Ok(())
    }

    async fn inactive_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<UserRecord>, StorageError> {
        let guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found: Vec<UserRecord> = guard
            .values()
            .filter(|r| r.resume_cursor > 0 && r.completed_at.is_none() && r.last_activity < cutoff)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.user_id);
        Ok(found)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRecordRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let users: Arc<dyn UserRecordRepository> = Arc::new(InMemoryRepository::new());
        Self { users }
    }
}
