use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::UserId;

use super::SqliteRepository;
use super::mapping::map_user_row;
use crate::repository::{StorageError, UserProfile, UserRecord, UserRecordRepository};

const USER_COLUMNS: &str =
    "user_id, username, first_name, last_name, resume_cursor, last_activity, created_at, completed_at";

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl UserRecordRepository for SqliteRepository {
    async fn get_or_create(
        &self,
        user_id: UserId,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let existing = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"
        ))
        .bind(user_id.value())
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?;

        let record = if let Some(row) = existing {
            let record = map_user_row(&row)?;
            sqlx::query("UPDATE users SET last_activity = ?1 WHERE user_id = ?2")
                .bind(now)
                .bind(user_id.value())
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            record
        } else {
            sqlx::query(
                r"
                INSERT INTO users (user_id, username, first_name, last_name, resume_cursor, last_activity, created_at)
                VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
                ",
            )
            .bind(user_id.value())
            .bind(profile.username.as_deref())
            .bind(profile.first_name.as_deref())
            .bind(profile.last_name.as_deref())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
            tracing::debug!(%user_id, "created user record");
            UserRecord {
                user_id,
                profile: profile.clone(),
                resume_cursor: 0,
                last_activity: now,
                created_at: now,
                completed_at: None,
            }
        };

        tx.commit().await.map_err(conn)?;
        Ok(record)
    }

    async fn update_cursor(
        &self,
        user_id: UserId,
        cursor: u32,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            "UPDATE users SET resume_cursor = ?1, completed_at = NULL, last_activity = ?2
             WHERE user_id = ?3",
        )
        .bind(i64::from(cursor))
        .bind(now)
        .bind(user_id.value())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn mark_completed(&self, user_id: UserId, now: DateTime<Utc>) -> Result<(), StorageError> {
        let res =
            sqlx::query("UPDATE users SET completed_at = ?1, last_activity = ?1 WHERE user_id = ?2")
                .bind(now)
                .bind(user_id.value())
                .execute(&self.pool)
                .await
                .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn inactive_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<UserRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE resume_cursor > 0 AND completed_at IS NULL AND last_activity < ?1
             ORDER BY user_id"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_user_row).collect()
    }
}
