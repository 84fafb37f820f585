use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{format_timestamp, SessionTag, TagCategory};

use super::timestamp_or_now;

pub struct TagRepository;

impl TagRepository {
    /// Replace-by-category in a single statement.
    ///
    /// The conflict branch only fires for a strictly newer extraction that
    /// actually changes the record, so racing re-tags resolve by extraction
    /// timestamp and identical re-tags leave the row (id, created_at) intact.
    pub async fn upsert(conn: &Connection, tag: &SessionTag) -> Result<bool> {
        let affected = conn
            .execute(
                r#"
                INSERT INTO session_tags (
                    id, note_id, client_id, category, tag_values, confidence, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (note_id, category) DO UPDATE SET
                    tag_values = excluded.tag_values,
                    confidence = excluded.confidence,
                    created_at = excluded.created_at
                WHERE excluded.created_at > session_tags.created_at
                  AND (excluded.tag_values != session_tags.tag_values
                       OR excluded.confidence != session_tags.confidence)
                "#,
                params![
                    tag.id.clone(),
                    tag.note_id.clone(),
                    tag.client_id.clone(),
                    tag.category.to_string(),
                    serde_json::to_string(&tag.values)?,
                    tag.confidence,
                    format_timestamp(&tag.created_at),
                ],
            )
            .await?;

        Ok(affected > 0)
    }

    pub async fn get_by_note(conn: &Connection, note_id: &str) -> Result<Vec<SessionTag>> {
        let mut rows = conn
            .query(
                r#"
                SELECT id, note_id, client_id, category, tag_values, confidence, created_at
                FROM session_tags
                WHERE note_id = ?1
                ORDER BY rowid ASC
                "#,
                params![note_id],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            if let Some(tag) = Self::row_to_tag(&row)? {
                results.push(tag);
            }
        }
        Ok(results)
    }

    pub async fn get_by_client(
        conn: &Connection,
        client_id: &str,
        category: Option<TagCategory>,
    ) -> Result<Vec<SessionTag>> {
        let mut rows = match category {
            Some(category) => {
                conn.query(
                    r#"
                    SELECT id, note_id, client_id, category, tag_values, confidence, created_at
                    FROM session_tags
                    WHERE client_id = ?1 AND category = ?2
                    ORDER BY rowid ASC
                    "#,
                    params![client_id, category.to_string()],
                )
                .await?
            }
            None => {
                conn.query(
                    r#"
                    SELECT id, note_id, client_id, category, tag_values, confidence, created_at
                    FROM session_tags
                    WHERE client_id = ?1
                    ORDER BY rowid ASC
                    "#,
                    params![client_id],
                )
                .await?
            }
        };

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            if let Some(tag) = Self::row_to_tag(&row)? {
                results.push(tag);
            }
        }
        Ok(results)
    }

    /// Rows with a category this build does not know are skipped rather than
    /// failing the whole read.
    fn row_to_tag(row: &libsql::Row) -> Result<Option<SessionTag>> {
        let category = match row.get::<String>(3)?.parse::<TagCategory>() {
            Ok(category) => category,
            Err(error) => {
                tracing::warn!(%error, "Skipping tag row with unknown category");
                return Ok(None);
            }
        };

        Ok(Some(SessionTag {
            id: row.get(0)?,
            note_id: row.get(1)?,
            client_id: row.get(2)?,
            category,
            values: serde_json::from_str(&row.get::<String>(4)?).unwrap_or_default(),
            confidence: row.get(5)?,
            created_at: timestamp_or_now(&row.get::<String>(6)?),
        }))
    }
}
