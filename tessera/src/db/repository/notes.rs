use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::{format_date, format_timestamp, parse_date, DateRange, ProgressNote};

pub struct NoteRepository;

const NOTE_COLUMNS: &str =
    "n.id, n.client_id, n.therapist_id, n.session_id, n.session_date, n.content, n.status";

impl NoteRepository {
    pub async fn get_by_id(conn: &Connection, id: &str) -> Result<Option<ProgressNote>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM progress_notes n WHERE n.id = ?1");
        let mut rows = conn.query(&sql, params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Self::row_to_note(&row)?),
            None => Ok(None),
        }
    }

    /// Notes ascending by session date, ties in insertion order.
    pub async fn get_by_client(
        conn: &Connection,
        client_id: &str,
        range: Option<&DateRange>,
    ) -> Result<Vec<ProgressNote>> {
        let mut rows = match range {
            Some(range) => {
                let sql = format!(
                    "SELECT {NOTE_COLUMNS} FROM progress_notes n \
                     WHERE n.client_id = ?1 AND n.session_date BETWEEN ?2 AND ?3 \
                     ORDER BY n.session_date ASC, n.rowid ASC"
                );
                conn.query(
                    &sql,
                    params![
                        client_id,
                        format_date(&range.start),
                        format_date(&range.end)
                    ],
                )
                .await?
            }
            None => {
                let sql = format!(
                    "SELECT {NOTE_COLUMNS} FROM progress_notes n \
                     WHERE n.client_id = ?1 \
                     ORDER BY n.session_date ASC, n.rowid ASC"
                );
                conn.query(&sql, params![client_id]).await?
            }
        };

        Self::collect(&mut rows).await
    }

    /// Notes with no tagging status row at all.
    pub async fn list_untagged(conn: &Connection, limit: usize) -> Result<Vec<ProgressNote>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM progress_notes n \
             LEFT JOIN note_tagging_status s ON s.note_id = n.id \
             WHERE s.note_id IS NULL \
             ORDER BY n.rowid ASC \
             LIMIT ?1"
        );
        let mut rows = conn.query(&sql, params![limit as i64]).await?;
        Self::collect(&mut rows).await
    }

    pub async fn list_failed(
        conn: &Connection,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ProgressNote>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM progress_notes n \
             JOIN note_tagging_status s ON s.note_id = n.id \
             WHERE s.state = 'tagging_failed' AND s.updated_at < ?1 \
             ORDER BY s.updated_at ASC \
             LIMIT ?2"
        );
        let mut rows = conn
            .query(&sql, params![format_timestamp(&before), limit as i64])
            .await?;
        Self::collect(&mut rows).await
    }

    async fn collect(rows: &mut libsql::Rows) -> Result<Vec<ProgressNote>> {
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            if let Some(note) = Self::row_to_note(&row)? {
                results.push(note);
            }
        }
        Ok(results)
    }

    fn row_to_note(row: &Row) -> Result<Option<ProgressNote>> {
        let id: String = row.get(0)?;
        let raw_date: String = row.get(4)?;

        let Some(session_date) = parse_date(&raw_date) else {
            tracing::warn!(note_id = %id, session_date = %raw_date, "Skipping note with unparseable session date");
            return Ok(None);
        };

        Ok(Some(ProgressNote {
            id,
            client_id: row.get(1)?,
            therapist_id: row.get(2)?,
            session_id: row.get(3)?,
            session_date,
            content: row.get(5)?,
            status: row.get(6)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::{insert_note, setup_test_db};
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn test_client_notes_are_chronological_within_range() {
        let conn = setup_test_db().await;
        insert_note(&conn, "n3", "client1", "2024-03-01").await;
        insert_note(&conn, "n1", "client1", "2024-01-01").await;
        insert_note(&conn, "n2", "client1", "2024-02-01").await;
        insert_note(&conn, "other", "client2", "2024-02-01").await;

        let all = NoteRepository::get_by_client(&conn, "client1", None).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2", "n3"]);

        let range = DateRange::new(date("2024-01-15"), date("2024-03-01"));
        let ranged = NoteRepository::get_by_client(&conn, "client1", Some(&range))
            .await
            .unwrap();
        let ids: Vec<&str> = ranged.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n2", "n3"]);
    }

    #[tokio::test]
    async fn test_untagged_excludes_notes_with_status() {
        let conn = setup_test_db().await;
        insert_note(&conn, "n1", "client1", "2024-01-01").await;
        insert_note(&conn, "n2", "client1", "2024-01-02").await;
        conn.execute(
            "INSERT INTO note_tagging_status (note_id, client_id, state, attempts, updated_at)
             VALUES ('n1', 'client1', 'tagged', 1, '2024-01-01T00:00:00.000000Z')",
            (),
        )
        .await
        .unwrap();

        let untagged = NoteRepository::list_untagged(&conn, 10).await.unwrap();
        assert_eq!(untagged.len(), 1);
        assert_eq!(untagged[0].id, "n2");
    }

    #[tokio::test]
    async fn test_missing_note() {
        let conn = setup_test_db().await;
        assert!(NoteRepository::get_by_id(&conn, "nope").await.unwrap().is_none());
    }
}
