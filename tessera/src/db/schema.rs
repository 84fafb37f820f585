use libsql::Connection;

use crate::error::Result;

pub async fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Progress notes are owned by the note-storage collaborator. The table is
        -- created here only so a shared database has the shape we read from.
        CREATE TABLE IF NOT EXISTS progress_notes (
            id TEXT PRIMARY KEY,
            client_id TEXT NOT NULL,
            therapist_id TEXT NOT NULL,
            session_id TEXT,
            session_date TEXT NOT NULL,
            content TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_progress_notes_client_date
            ON progress_notes(client_id, session_date);

        -- One row per (note, category); re-tagging replaces in place
        CREATE TABLE IF NOT EXISTS session_tags (
            id TEXT PRIMARY KEY,
            note_id TEXT NOT NULL,
            client_id TEXT NOT NULL,
            category TEXT NOT NULL,
            tag_values TEXT NOT NULL DEFAULT '[]',
            confidence REAL NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (note_id, category)
        );

        CREATE INDEX IF NOT EXISTS idx_session_tags_client_id ON session_tags(client_id);

        -- Insights are additive, de-duplicated by exact text per note
        CREATE TABLE IF NOT EXISTS session_insights (
            id TEXT PRIMARY KEY,
            note_id TEXT NOT NULL,
            client_id TEXT NOT NULL,
            insight_type TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (note_id, text)
        );

        CREATE INDEX IF NOT EXISTS idx_session_insights_client_id ON session_insights(client_id);

        -- Undirected note-to-note links, endpoints stored sorted
        CREATE TABLE IF NOT EXISTS cross_references (
            id TEXT PRIMARY KEY,
            client_id TEXT NOT NULL,
            source_note_id TEXT NOT NULL,
            target_note_id TEXT NOT NULL,
            relation TEXT NOT NULL,
            strength INTEGER NOT NULL,
            shared_values TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            UNIQUE (source_note_id, target_note_id, relation),
            CHECK (source_note_id < target_note_id)
        );

        CREATE INDEX IF NOT EXISTS idx_cross_references_client_id ON cross_references(client_id);
        CREATE INDEX IF NOT EXISTS idx_cross_references_target ON cross_references(target_note_id);

        -- Cached journey syntheses, one per exact range
        CREATE TABLE IF NOT EXISTS journey_syntheses (
            client_id TEXT NOT NULL,
            range_start TEXT NOT NULL,
            range_end TEXT NOT NULL,
            document TEXT NOT NULL,
            source_tag_version TEXT,
            generated_at TEXT NOT NULL,
            PRIMARY KEY (client_id, range_start, range_end)
        );

        -- Tagging lifecycle per note
        CREATE TABLE IF NOT EXISTS note_tagging_status (
            note_id TEXT PRIMARY KEY,
            client_id TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_note_tagging_status_client ON note_tagging_status(client_id);
        CREATE INDEX IF NOT EXISTS idx_note_tagging_status_state ON note_tagging_status(state);
        "#,
    )
    .await?;

    Ok(())
}
