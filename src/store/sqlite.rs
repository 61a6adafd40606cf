//! SQLite evidence store
//!
//! Durable backend over a single database file. Thread-safe via an
//! internal mutex on the connection; WAL mode keeps concurrent readers
//! live during writes. The live-entity uniqueness constraint that
//! serializes concurrent create races is a partial unique index on
//! (org_id, normalized_text) WHERE absorbed_into IS NULL.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use super::traits::{EvidenceStore, ResolutionCommit, StorageError, StorageResult};
use crate::ledger::{MergeLedger, MergeReason, MergeRecord};
use crate::model::{Entity, EntityId, MentionId, MentionRecord, OrgId};

/// SQLite-backed evidence store and merge ledger.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Mention evidence. Every column except resolved_entity_id is
            -- write-once; no UPDATE in this module touches the others.
            CREATE TABLE IF NOT EXISTS mentions (
                id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL,
                extraction_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                raw_text TEXT NOT NULL,
                start_char INTEGER NOT NULL,
                end_char INTEGER NOT NULL,
                confidence REAL NOT NULL,
                response_hash TEXT NOT NULL,
                mention_type TEXT,
                resolved_entity_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_mentions_entity
                ON mentions(resolved_entity_id);
            CREATE INDEX IF NOT EXISTS idx_mentions_org
                ON mentions(org_id);

            -- Canonical entities
            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL,
                representative_text TEXT NOT NULL,
                normalized_text TEXT NOT NULL,
                type_labels_json TEXT NOT NULL,
                attributes_json TEXT NOT NULL,
                ontology_ref TEXT,
                grounding_confidence REAL NOT NULL,
                absorbed_into TEXT,
                created_at TEXT NOT NULL
            );

            -- One live entity per normalized surface form per tenant.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_live_norm
                ON entities(org_id, normalized_text)
                WHERE absorbed_into IS NULL;

            -- Blocking tokens for candidate generation. Rows for
            -- absorbed entities are filtered out by joining on liveness,
            -- so no cleanup is needed on merge.
            CREATE TABLE IF NOT EXISTS entity_tokens (
                org_id TEXT NOT NULL,
                token TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                PRIMARY KEY (org_id, token, entity_id)
            );

            -- Append-only merge history; seq preserves append order.
            CREATE TABLE IF NOT EXISTS merge_history (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                org_id TEXT NOT NULL,
                source TEXT NOT NULL,
                target TEXT NOT NULL,
                confidence REAL NOT NULL,
                reason TEXT NOT NULL,
                actor TEXT NOT NULL,
                note TEXT,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_source
                ON merge_history(source);
            CREATE INDEX IF NOT EXISTS idx_history_target
                ON merge_history(target);

            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn insert_entity_tx(conn: &Connection, entity: &Entity) -> StorageResult<()> {
        let result = conn.execute(
            r#"INSERT INTO entities
               (id, org_id, representative_text, normalized_text, type_labels_json,
                attributes_json, ontology_ref, grounding_confidence, absorbed_into, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                entity.id.to_string(),
                entity.org_id.as_str(),
                entity.representative_text,
                entity.normalized_text,
                serde_json::to_string(&entity.type_labels)?,
                serde_json::to_string(&entity.attributes)?,
                entity.ontology_ref,
                entity.grounding_confidence,
                entity.absorbed_into.map(|id| id.to_string()),
                entity.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {
                for token in entity.normalized_text.split_whitespace() {
                    conn.execute(
                        "INSERT OR IGNORE INTO entity_tokens (org_id, token, entity_id)
                         VALUES (?1, ?2, ?3)",
                        params![entity.org_id.as_str(), token, entity.id.to_string()],
                    )?;
                }
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // Surface the winner so the caller can re-run lookup.
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT id FROM entities
                         WHERE org_id = ?1 AND normalized_text = ?2 AND absorbed_into IS NULL",
                        params![entity.org_id.as_str(), entity.normalized_text],
                        |row| row.get(0),
                    )
                    .optional()?;
                match existing {
                    Some(id) => Err(StorageError::DuplicateEntity {
                        existing: parse_entity_id(&id)?,
                    }),
                    None => Err(StorageError::Busy(
                        "uniqueness conflict with no visible winner".into(),
                    )),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn insert_merge_tx(conn: &Connection, record: &MergeRecord) -> StorageResult<()> {
        conn.execute(
            r#"INSERT INTO merge_history
               (org_id, source, target, confidence, reason, actor, note, recorded_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                record.org_id.as_str(),
                record.source.to_string(),
                record.target.to_string(),
                record.confidence,
                record.reason.as_str(),
                record.actor,
                record.note,
                record.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn mention_count_tx(conn: &Connection, entity_id: &EntityId) -> StorageResult<usize> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mentions WHERE resolved_entity_id = ?1",
            params![entity_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl EvidenceStore for SqliteStore {
    fn insert_mention(&self, record: &MentionRecord) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO mentions
               (id, org_id, extraction_id, document_id, chunk_index, raw_text,
                start_char, end_char, confidence, response_hash, mention_type,
                resolved_entity_id, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
            params![
                record.id.to_string(),
                record.org_id.as_str(),
                record.extraction_id,
                record.document_id,
                record.chunk_index,
                record.raw_text,
                record.start_char as i64,
                record.end_char as i64,
                record.confidence,
                record.response_hash,
                record.mention_type,
                record.resolved_entity_id.map(|id| id.to_string()),
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_mention(&self, id: &MentionId) -> StorageResult<Option<MentionRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM mentions WHERE id = ?1",
            params![id.to_string()],
            row_to_mention,
        )
        .optional()
        .map_err(Into::into)
    }

    fn mentions_for_entity(&self, entity_id: &EntityId) -> StorageResult<Vec<MentionRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM mentions WHERE resolved_entity_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![entity_id.to_string()], row_to_mention)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn mention_count_for_entity(&self, entity_id: &EntityId) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        Self::mention_count_tx(&conn, entity_id)
    }

    fn create_entity(&self, entity: &Entity) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert_entity_tx(&conn, entity)
    }

    fn get_entity(&self, id: &EntityId) -> StorageResult<Option<Entity>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM entities WHERE id = ?1",
            params![id.to_string()],
            row_to_entity,
        )
        .optional()
        .map_err(Into::into)
    }

    fn update_entity(&self, entity: &Entity) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"UPDATE entities SET
               representative_text = ?2, type_labels_json = ?3, attributes_json = ?4,
               ontology_ref = ?5, grounding_confidence = ?6, absorbed_into = ?7
               WHERE id = ?1"#,
            params![
                entity.id.to_string(),
                entity.representative_text,
                serde_json::to_string(&entity.type_labels)?,
                serde_json::to_string(&entity.attributes)?,
                entity.ontology_ref,
                entity.grounding_confidence,
                entity.absorbed_into.map(|id| id.to_string()),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::EntityNotFound(entity.id));
        }
        Ok(())
    }

    fn find_live_by_normalized_text(
        &self,
        org: &OrgId,
        normalized: &str,
    ) -> StorageResult<Vec<Entity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM entities
             WHERE org_id = ?1 AND normalized_text = ?2 AND absorbed_into IS NULL
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![org.as_str(), normalized], row_to_entity)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn find_live_by_tokens(&self, org: &OrgId, tokens: &[String]) -> StorageResult<Vec<Entity>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = vec!["?"; tokens.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT e.* FROM entities e
             JOIN entity_tokens t ON t.entity_id = e.id AND t.org_id = e.org_id
             WHERE e.org_id = ? AND e.absorbed_into IS NULL AND t.token IN ({})
             ORDER BY e.id",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let org_value = org.as_str().to_string();
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&org_value];
        for token in tokens {
            values.push(token);
        }
        let rows = stmt.query_map(values.as_slice(), row_to_entity)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn live_normalized_texts(&self) -> StorageResult<Vec<(OrgId, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT org_id, normalized_text FROM entities WHERE absorbed_into IS NULL",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                OrgId::from(row.get::<_, String>(0)?),
                row.get::<_, String>(1)?,
            ))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn commit_resolution(&self, commit: &ResolutionCommit) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE mentions SET resolved_entity_id = ?2 WHERE id = ?1",
            params![commit.mention_id.to_string(), commit.entity_id.to_string()],
        )?;
        if changed == 0 {
            return Err(StorageError::MentionNotFound(commit.mention_id));
        }

        if let Some(merge) = &commit.merge {
            Self::insert_merge_tx(&tx, merge)?;
            if Self::mention_count_tx(&tx, &merge.source)? == 0 {
                tx.execute(
                    "UPDATE entities SET absorbed_into = ?2 WHERE id = ?1",
                    params![merge.source.to_string(), merge.target.to_string()],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn commit_split(
        &self,
        new_entity: &Entity,
        detached: &[MentionId],
        record: &MergeRecord,
    ) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        Self::insert_entity_tx(&tx, new_entity)?;
        for mention_id in detached {
            let changed = tx.execute(
                "UPDATE mentions SET resolved_entity_id = ?2 WHERE id = ?1",
                params![mention_id.to_string(), new_entity.id.to_string()],
            )?;
            if changed == 0 {
                return Err(StorageError::MentionNotFound(*mention_id));
            }
        }
        Self::insert_merge_tx(&tx, record)?;

        tx.commit()?;
        Ok(())
    }
}

impl MergeLedger for SqliteStore {
    fn record_merge(&self, record: &MergeRecord) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert_merge_tx(&conn, record)
    }

    fn history_for(&self, entity: &EntityId) -> StorageResult<Vec<MergeRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT org_id, source, target, confidence, reason, actor, note, recorded_at
             FROM merge_history WHERE source = ?1 OR target = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![entity.to_string()], row_to_merge)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn entry_count(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM merge_history", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

// === Row mapping ===
//
// Parse failures are reported through rusqlite's FromSqlError so the
// query_row/query_map error paths stay uniform.

fn row_to_mention(row: &rusqlite::Row<'_>) -> rusqlite::Result<MentionRecord> {
    let entity: Option<String> = row.get("resolved_entity_id")?;
    Ok(MentionRecord {
        id: parse_column(row, "id")?,
        org_id: OrgId::from(row.get::<_, String>("org_id")?),
        extraction_id: row.get("extraction_id")?,
        document_id: row.get("document_id")?,
        chunk_index: row.get("chunk_index")?,
        raw_text: row.get("raw_text")?,
        start_char: row.get::<_, i64>("start_char")? as usize,
        end_char: row.get::<_, i64>("end_char")? as usize,
        confidence: row.get("confidence")?,
        response_hash: row.get("response_hash")?,
        mention_type: row.get("mention_type")?,
        resolved_entity_id: entity.as_deref().map(parse_str).transpose()?,
        created_at: parse_timestamp(row, "created_at")?,
    })
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
    let labels: String = row.get("type_labels_json")?;
    let attributes: String = row.get("attributes_json")?;
    let absorbed: Option<String> = row.get("absorbed_into")?;
    Ok(Entity {
        id: parse_column(row, "id")?,
        org_id: OrgId::from(row.get::<_, String>("org_id")?),
        representative_text: row.get("representative_text")?,
        normalized_text: row.get("normalized_text")?,
        type_labels: serde_json::from_str::<BTreeSet<String>>(&labels)
            .map_err(from_sql_error)?,
        attributes: serde_json::from_str::<HashMap<String, serde_json::Value>>(&attributes)
            .map_err(from_sql_error)?,
        ontology_ref: row.get("ontology_ref")?,
        grounding_confidence: row.get("grounding_confidence")?,
        absorbed_into: absorbed.as_deref().map(parse_str).transpose()?,
        created_at: parse_timestamp(row, "created_at")?,
    })
}

fn row_to_merge(row: &rusqlite::Row<'_>) -> rusqlite::Result<MergeRecord> {
    let reason: String = row.get("reason")?;
    Ok(MergeRecord {
        org_id: OrgId::from(row.get::<_, String>("org_id")?),
        source: parse_column(row, "source")?,
        target: parse_column(row, "target")?,
        confidence: row.get("confidence")?,
        reason: MergeReason::from_str(&reason).map_err(from_sql_error)?,
        actor: row.get("actor")?,
        note: row.get("note")?,
        recorded_at: parse_timestamp(row, "recorded_at")?,
    })
}

fn from_sql_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(e),
    )
}

fn parse_str<T>(s: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    s.parse::<T>().map_err(from_sql_error)
}

fn parse_column<T>(row: &rusqlite::Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value: String = row.get(column)?;
    parse_str(&value)
}

fn parse_timestamp(
    row: &rusqlite::Row<'_>,
    column: &str,
) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    let value: String = row.get(column)?;
    chrono::DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(from_sql_error)
}

fn parse_entity_id(s: &str) -> StorageResult<EntityId> {
    s.parse::<EntityId>()
        .map_err(|e| StorageError::Corrupt(format!("bad entity id {}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MergeReason;
    use crate::model::MentionInput;

    fn mention(text: &str) -> MentionRecord {
        MentionRecord::from_input(
            OrgId::from("acme"),
            &MentionInput {
                raw_text: text.to_string(),
                start_char: 0,
                end_char: text.len(),
                confidence: 0.9,
                extraction_id: "run-1".into(),
                document_id: "doc-1".into(),
                chunk_index: 0,
                mention_type: None,
                raw_response: None,
            },
        )
    }

    #[test]
    fn mention_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let m = mention("Acme Corp");
        store.insert_mention(&m).unwrap();

        let loaded = store.get_mention(&m.id).unwrap().unwrap();
        assert_eq!(loaded.raw_text, m.raw_text);
        assert_eq!(loaded.response_hash, m.response_hash);
        assert_eq!(loaded.resolved_entity_id, None);
    }

    #[test]
    fn entity_round_trip_with_labels() {
        let store = SqliteStore::open_in_memory().unwrap();
        let e = Entity::seeded(OrgId::from("acme"), "Acme Corp", "acme corp", 0.9)
            .with_type_label("organization");
        store.create_entity(&e).unwrap();

        let loaded = store.get_entity(&e.id).unwrap().unwrap();
        assert!(loaded.type_labels.contains("organization"));
        assert!(loaded.is_live());
    }

    // === Scenario: Partial unique index serializes the create race ===
    #[test]
    fn duplicate_live_entity_reports_winner() {
        let store = SqliteStore::open_in_memory().unwrap();
        let winner = Entity::seeded(OrgId::from("acme"), "Acme Corp", "acme corp", 0.9);
        let loser = Entity::seeded(OrgId::from("acme"), "ACME corp", "acme corp", 0.8);

        store.create_entity(&winner).unwrap();
        match store.create_entity(&loser) {
            Err(StorageError::DuplicateEntity { existing }) => assert_eq!(existing, winner.id),
            other => panic!("expected DuplicateEntity, got {:?}", other.map(|_| ())),
        }
    }

    // === Scenario: Absorbed entities free their normalized form ===
    #[test]
    fn absorbed_entity_allows_new_live_claim() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut first = Entity::seeded(OrgId::from("acme"), "Acme", "acme", 0.9);
        store.create_entity(&first).unwrap();

        first.absorbed_into = Some(EntityId::new());
        store.update_entity(&first).unwrap();

        let second = Entity::seeded(OrgId::from("acme"), "Acme", "acme", 0.9);
        store.create_entity(&second).unwrap();
        assert_eq!(
            store
                .find_live_by_normalized_text(&OrgId::from("acme"), "acme")
                .unwrap()
                .len(),
            1
        );
    }

    // === Scenario: Commit is atomic — link plus ledger entry together ===
    #[test]
    fn commit_resolution_writes_link_and_ledger() {
        let store = SqliteStore::open_in_memory().unwrap();
        let org = OrgId::from("acme");

        let source = Entity::seeded(org.clone(), "Acme Corp", "acme corp", 0.9);
        let target = Entity::seeded(org.clone(), "Acme Corporation", "acme corporation", 0.9);
        store.create_entity(&source).unwrap();
        store.create_entity(&target).unwrap();

        let mut m = mention("Acme Corp");
        m.resolved_entity_id = Some(source.id);
        store.insert_mention(&m).unwrap();

        store
            .commit_resolution(&ResolutionCommit {
                mention_id: m.id,
                entity_id: target.id,
                merge: Some(MergeRecord::new(
                    org,
                    source.id,
                    target.id,
                    0.92,
                    MergeReason::EmbeddingSimilarity,
                    "resolver",
                )),
            })
            .unwrap();

        let loaded = store.get_mention(&m.id).unwrap().unwrap();
        assert_eq!(loaded.resolved_entity_id, Some(target.id));

        let history = store.history_for(&target.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, MergeReason::EmbeddingSimilarity);

        // Source lost its only mention, so it is folded into the target.
        let folded = store.get_entity(&source.id).unwrap().unwrap();
        assert_eq!(folded.absorbed_into, Some(target.id));
    }

    #[test]
    fn history_preserves_append_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let org = OrgId::from("acme");
        let (a, b, c) = (EntityId::new(), EntityId::new(), EntityId::new());

        for (src, reason) in [(a, MergeReason::Manual), (b, MergeReason::EmbeddingSimilarity)] {
            store
                .record_merge(&MergeRecord::new(org.clone(), src, c, 0.8, reason, "test"))
                .unwrap();
        }

        let history = store.history_for(&c).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].source, a);
        assert_eq!(history[1].source, b);
        assert_eq!(store.entry_count().unwrap(), 2);
    }

    // === Scenario: Every stored field survives the round trip ===
    #[test]
    fn merge_record_round_trips_reason_and_note() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (source, target) = (EntityId::new(), EntityId::new());
        let record = MergeRecord::new(
            OrgId::from("acme"),
            source,
            target,
            1.0,
            MergeReason::SplitReversal,
            "reviewer",
        )
        .with_note("wrong referent");
        store.record_merge(&record).unwrap();

        let loaded = &store.history_for(&source).unwrap()[0];
        assert_eq!(loaded.reason, MergeReason::SplitReversal);
        assert_eq!(loaded.actor, "reviewer");
        assert_eq!(loaded.note.as_deref(), Some("wrong referent"));
    }
}
