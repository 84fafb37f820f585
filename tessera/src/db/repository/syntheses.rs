use chrono::{DateTime, Utc};
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{format_date, format_timestamp, parse_date, parse_timestamp, DateRange, JourneySynthesis};

pub struct SynthesisRepository;

impl SynthesisRepository {
    pub async fn get(
        conn: &Connection,
        client_id: &str,
        range: &DateRange,
    ) -> Result<Option<JourneySynthesis>> {
        let mut rows = conn
            .query(
                r#"
                SELECT document FROM journey_syntheses
                WHERE client_id = ?1 AND range_start = ?2 AND range_end = ?3
                "#,
                params![client_id, format_date(&range.start), format_date(&range.end)],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let document: String = row.get(0)?;
        match serde_json::from_str::<JourneySynthesis>(&document) {
            Ok(synthesis) => Ok(Some(synthesis)),
            Err(error) => {
                // An unreadable cache entry is treated as a miss and regenerated
                tracing::warn!(client_id, %error, "Discarding unreadable cached synthesis");
                Ok(None)
            }
        }
    }

    pub async fn upsert(conn: &Connection, synthesis: &JourneySynthesis) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO journey_syntheses (
                client_id, range_start, range_end, document, source_tag_version, generated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (client_id, range_start, range_end) DO UPDATE SET
                document = excluded.document,
                source_tag_version = excluded.source_tag_version,
                generated_at = excluded.generated_at
            "#,
            params![
                synthesis.client_id.clone(),
                format_date(&synthesis.range_start),
                format_date(&synthesis.range_end),
                serde_json::to_string(synthesis)?,
                synthesis.source_tag_version.as_ref().map(format_timestamp),
                format_timestamp(&synthesis.generated_at),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn list_keys(conn: &Connection) -> Result<Vec<(String, DateRange)>> {
        let mut rows = conn
            .query(
                "SELECT client_id, range_start, range_end FROM journey_syntheses ORDER BY generated_at ASC",
                (),
            )
            .await?;

        let mut keys = Vec::new();
        while let Some(row) = rows.next().await? {
            let client_id: String = row.get(0)?;
            let start: String = row.get(1)?;
            let end: String = row.get(2)?;
            if let (Some(start), Some(end)) = (parse_date(&start), parse_date(&end)) {
                keys.push((client_id, DateRange::new(start, end)));
            }
        }
        Ok(keys)
    }

    /// Newest tag or insight among the client's notes dated inside `range`.
    pub async fn latest_source_version(
        conn: &Connection,
        client_id: &str,
        range: &DateRange,
    ) -> Result<Option<DateTime<Utc>>> {
        let mut rows = conn
            .query(
                r#"
                SELECT MAX(created_at) FROM (
                    SELECT t.created_at AS created_at
                    FROM session_tags t
                    JOIN progress_notes n ON n.id = t.note_id
                    WHERE t.client_id = ?1 AND n.session_date BETWEEN ?2 AND ?3
                    UNION ALL
                    SELECT i.created_at AS created_at
                    FROM session_insights i
                    JOIN progress_notes n ON n.id = i.note_id
                    WHERE i.client_id = ?1 AND n.session_date BETWEEN ?2 AND ?3
                )
                "#,
                params![client_id, format_date(&range.start), format_date(&range.end)],
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
}
