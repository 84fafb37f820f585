use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{format_timestamp, InsightType, SessionInsight};

use super::timestamp_or_now;

pub struct InsightRepository;

impl InsightRepository {
    pub async fn insert_if_new(conn: &Connection, insight: &SessionInsight) -> Result<bool> {
        let affected = conn
            .execute(
                r#"
                INSERT INTO session_insights (
                    id, note_id, client_id, insight_type, text, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT (note_id, text) DO NOTHING
                "#,
                params![
                    insight.id.clone(),
                    insight.note_id.clone(),
                    insight.client_id.clone(),
                    insight.insight_type.to_string(),
                    insight.text.clone(),
                    format_timestamp(&insight.created_at),
                ],
            )
            .await?;

        Ok(affected > 0)
    }

    pub async fn get_by_note(conn: &Connection, note_id: &str) -> Result<Vec<SessionInsight>> {
        let mut rows = conn
            .query(
                r#"
                SELECT id, note_id, client_id, insight_type, text, created_at
                FROM session_insights
                WHERE note_id = ?1
                ORDER BY rowid ASC
                "#,
                params![note_id],
            )
            .await?;

        Self::collect(&mut rows).await
    }

    pub async fn get_by_client(conn: &Connection, client_id: &str) -> Result<Vec<SessionInsight>> {
        let mut rows = conn
            .query(
                r#"
                SELECT id, note_id, client_id, insight_type, text, created_at
                FROM session_insights
                WHERE client_id = ?1
                ORDER BY rowid ASC
                "#,
                params![client_id],
            )
            .await?;

        Self::collect(&mut rows).await
    }

    async fn collect(rows: &mut libsql::Rows) -> Result<Vec<SessionInsight>> {
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            let insight_type = match row.get::<String>(3)?.parse::<InsightType>() {
                Ok(insight_type) => insight_type,
                Err(error) => {
                    tracing::warn!(%error, "Skipping insight row with unknown type");
                    continue;
                }
            };

            results.push(SessionInsight {
                id: row.get(0)?,
                note_id: row.get(1)?,
                client_id: row.get(2)?,
                insight_type,
                text: row.get(4)?,
                created_at: timestamp_or_now(&row.get::<String>(5)?),
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::setup_test_db;
    use crate::models::now_timestamp;

    fn insight(id: &str, note_id: &str, text: &str) -> SessionInsight {
        SessionInsight {
            id: id.to_string(),
            note_id: note_id.to_string(),
            client_id: "client1".to_string(),
            insight_type: InsightType::Breakthrough,
            text: text.to_string(),
            created_at: now_timestamp(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_text_per_note_is_ignored() {
        let conn = setup_test_db().await;

        assert!(InsightRepository::insert_if_new(&conn, &insight("a", "n1", "Set a boundary"))
            .await
            .unwrap());
        assert!(!InsightRepository::insert_if_new(&conn, &insight("b", "n1", "Set a boundary"))
            .await
            .unwrap());
        // Same text on a different note is a separate observation
        assert!(InsightRepository::insert_if_new(&conn, &insight("c", "n2", "Set a boundary"))
            .await
            .unwrap());

        assert_eq!(InsightRepository::get_by_note(&conn, "n1").await.unwrap().len(), 1);
        assert_eq!(
            InsightRepository::get_by_client(&conn, "client1").await.unwrap().len(),
            2
        );
    }
}
