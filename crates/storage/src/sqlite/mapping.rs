use course_core::model::UserId;
use sqlx::Row;

use crate::repository::{StorageError, UserProfile, UserRecord};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn cursor_from_i64(v: i64) -> Result<u32, StorageError> {
    u32::try_from(v)
        .map_err(|_| StorageError::Serialization(format!("invalid resume_cursor: {v}")))
}

pub(crate) fn map_user_row(row: &sqlx::sqlite::SqliteRow) -> Result<UserRecord, StorageError> {
    Ok(UserRecord {
        user_id: UserId::new(row.try_get::<i64, _>("user_id").map_err(ser)?),
        profile: UserProfile {
            username: row.try_get("username").map_err(ser)?,
            first_name: row.try_get("first_name").map_err(ser)?,
            last_name: row.try_get("last_name").map_err(ser)?,
        },
        resume_cursor: cursor_from_i64(row.try_get::<i64, _>("resume_cursor").map_err(ser)?)?,
        last_activity: row.try_get("last_activity").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}
