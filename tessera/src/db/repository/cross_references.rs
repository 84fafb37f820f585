use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{format_timestamp, CrossReference, LinkRelation};

use super::{placeholders, timestamp_or_now};

pub struct CrossReferenceRepository;

const SELECT_COLUMNS: &str = "SELECT id, client_id, source_note_id, target_note_id, relation, \
                              strength, shared_values, created_at FROM cross_references";

impl CrossReferenceRepository {
    pub async fn upsert(conn: &Connection, link: &CrossReference) -> Result<bool> {
        let affected = conn
            .execute(
                r#"
                INSERT INTO cross_references (
                    id, client_id, source_note_id, target_note_id, relation,
                    strength, shared_values, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT (source_note_id, target_note_id, relation) DO UPDATE SET
                    strength = excluded.strength,
                    shared_values = excluded.shared_values,
                    created_at = excluded.created_at
                WHERE excluded.strength != cross_references.strength
                   OR excluded.shared_values != cross_references.shared_values
                "#,
                params![
                    link.id.clone(),
                    link.client_id.clone(),
                    link.source_note_id.clone(),
                    link.target_note_id.clone(),
                    link.relation.to_string(),
                    link.strength,
                    serde_json::to_string(&link.shared_values)?,
                    format_timestamp(&link.created_at),
                ],
            )
            .await?;

        Ok(affected > 0)
    }

    pub async fn get_by_client(conn: &Connection, client_id: &str) -> Result<Vec<CrossReference>> {
        let sql = format!("{SELECT_COLUMNS} WHERE client_id = ?1 ORDER BY rowid ASC");
        let mut rows = conn.query(&sql, params![client_id]).await?;
        Self::collect(&mut rows).await
    }

    pub async fn get_by_note(conn: &Connection, note_id: &str) -> Result<Vec<CrossReference>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE source_note_id = ?1 OR target_note_id = ?1 ORDER BY rowid ASC"
        );
        let mut rows = conn.query(&sql, params![note_id]).await?;
        Self::collect(&mut rows).await
    }

    pub async fn prune_for_note(conn: &Connection, note_id: &str, keep: &[String]) -> Result<u64> {
        if keep.is_empty() {
            let affected = conn
                .execute(
                    "DELETE FROM cross_references WHERE source_note_id = ?1 OR target_note_id = ?1",
                    params![note_id],
                )
                .await?;
            return Ok(affected);
        }

        let keep_list = placeholders(2, keep.len());
        let sql = format!(
            "DELETE FROM cross_references \
             WHERE (source_note_id = ?1 AND target_note_id NOT IN ({keep_list})) \
                OR (target_note_id = ?1 AND source_note_id NOT IN ({keep_list}))"
        );

        let mut values = vec![libsql::Value::from(note_id.to_string())];
        values.extend(keep.iter().map(|id| libsql::Value::from(id.clone())));

        let affected = conn
            .execute(&sql, libsql::params_from_iter(values))
            .await?;
        Ok(affected)
    }

    async fn collect(rows: &mut libsql::Rows) -> Result<Vec<CrossReference>> {
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            let relation = match row.get::<String>(4)?.parse::<LinkRelation>() {
                Ok(relation) => relation,
                Err(error) => {
                    tracing::warn!(%error, "Skipping cross reference with unknown relation");
                    continue;
                }
            };

            results.push(CrossReference {
                id: row.get(0)?,
                client_id: row.get(1)?,
                source_note_id: row.get(2)?,
                target_note_id: row.get(3)?,
                relation,
                strength: row.get::<i64>(5)?.max(0) as u32,
                shared_values: serde_json::from_str(&row.get::<String>(6)?).unwrap_or_default(),
                created_at: timestamp_or_now(&row.get::<String>(7)?),
            });
        }
        Ok(results)
    }
}
