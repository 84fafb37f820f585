use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::{format_timestamp, parse_timestamp, TaggingState, TaggingStatus};

use super::timestamp_or_now;

pub struct TaggingStatusRepository;

impl TaggingStatusRepository {
    pub async fn upsert(conn: &Connection, status: &TaggingStatus) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO note_tagging_status (
                note_id, client_id, state, attempts, last_error, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (note_id) DO UPDATE SET
                client_id = excluded.client_id,
                state = excluded.state,
                attempts = excluded.attempts,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            "#,
            params![
                status.note_id.clone(),
                status.client_id.clone(),
                status.state.to_string(),
                status.attempts as i64,
                status.last_error.clone(),
                format_timestamp(&status.updated_at),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn get(conn: &Connection, note_id: &str) -> Result<Option<TaggingStatus>> {
        let mut rows = conn
            .query(
                r#"
                SELECT note_id, client_id, state, attempts, last_error, updated_at
                FROM note_tagging_status
                WHERE note_id = ?1
                "#,
                params![note_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Self::row_to_status(&row)?),
            None => Ok(None),
        }
    }

    pub async fn get_by_client(conn: &Connection, client_id: &str) -> Result<Vec<TaggingStatus>> {
        let mut rows = conn
            .query(
                r#"
                SELECT note_id, client_id, state, attempts, last_error, updated_at
                FROM note_tagging_status
                WHERE client_id = ?1
                ORDER BY rowid ASC
                "#,
                params![client_id],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            if let Some(status) = Self::row_to_status(&row)? {
                results.push(status);
            }
        }
        Ok(results)
    }

    pub async fn latest_change(conn: &Connection, client_id: &str) -> Result<Option<DateTime<Utc>>> {
        let mut rows = conn
            .query(
                "SELECT MAX(updated_at) FROM note_tagging_status WHERE client_id = ?1",
                params![client_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let value: Option<String> = row.get(0)?;
                Ok(value.as_deref().and_then(parse_timestamp))
            }
            None => Ok(None),
        }
    }

    fn row_to_status(row: &Row) -> Result<Option<TaggingStatus>> {
        let note_id: String = row.get(0)?;
        let state = match row.get::<String>(2)?.parse::<TaggingState>() {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(note_id = %note_id, %error, "Skipping tagging status with unknown state");
                return Ok(None);
            }
        };

        Ok(Some(TaggingStatus {
            note_id,
            client_id: row.get(1)?,
            state,
            attempts: row.get::<i64>(3)?.max(0) as u32,
            last_error: row.get(4)?,
            updated_at: timestamp_or_now(&row.get::<String>(5)?),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::setup_test_db;
    use crate::models::now_timestamp;

    fn status(note_id: &str, state: TaggingState) -> TaggingStatus {
        TaggingStatus {
            note_id: note_id.to_string(),
            client_id: "client1".to_string(),
            state,
            attempts: 0,
            last_error: None,
            updated_at: now_timestamp(),
        }
    }

    #[tokio::test]
    async fn test_status_transitions_overwrite() {
        let conn = setup_test_db().await;

        TaggingStatusRepository::upsert(&conn, &status("n1", TaggingState::Pending))
            .await
            .unwrap();

        let mut failed = status("n1", TaggingState::Failed);
        failed.attempts = 4;
        failed.last_error = Some("timed out".to_string());
        TaggingStatusRepository::upsert(&conn, &failed).await.unwrap();

        let stored = TaggingStatusRepository::get(&conn, "n1").await.unwrap().unwrap();
        assert_eq!(stored.state, TaggingState::Failed);
        assert_eq!(stored.attempts, 4);
        assert_eq!(stored.last_error.as_deref(), Some("timed out"));
        assert_eq!(stored.updated_at, failed.updated_at);
    }

    #[tokio::test]
    async fn test_latest_change_per_client() {
        let conn = setup_test_db().await;
        assert!(TaggingStatusRepository::latest_change(&conn, "client1")
            .await
            .unwrap()
            .is_none());

        let first = status("n1", TaggingState::Tagged);
        let mut second = status("n2", TaggingState::Tagged);
        second.updated_at = first.updated_at + chrono::Duration::seconds(10);
        TaggingStatusRepository::upsert(&conn, &first).await.unwrap();
        TaggingStatusRepository::upsert(&conn, &second).await.unwrap();

        let latest = TaggingStatusRepository::latest_change(&conn, "client1")
            .await
            .unwrap();
        assert_eq!(latest, Some(second.updated_at));
        assert_eq!(
            TaggingStatusRepository::get_by_client(&conn, "client1").await.unwrap().len(),
            2
        );
    }
}
