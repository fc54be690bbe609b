//! Single-file SQLite store for dog profiles and bark fingerprints.
//! Every public method opens its own connection and lets it drop at the
//! end of the call — no connection is ever held between calls.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use woof_protocol::dog::{normalize, DogProfile, EMBEDDING_DIM};
use woof_protocol::fingerprint::{BarkFingerprint, FingerprintMatch, MFCC_DIM};

use crate::codec::{deserialize_embedding, serialize_embedding};
use crate::error::StoreError;

const SCHEMA_VERSION: i64 = 4;

pub struct FingerprintStore {
    db_path: PathBuf,
}

#[derive(Default, Clone)]
pub struct FingerprintFilter {
    pub dog_id: Option<String>,
    pub tagged: Option<bool>,
    pub min_confidence: Option<f32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub rejected: Option<bool>,
}

impl FingerprintStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let store = FingerprintStore { db_path };
        let conn = store.connect()?;
        init_schema(&conn)?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.db_path)?)
    }

    // --- Dog profile operations ---

    pub fn create_dog(&self, name: &str, notes: &str) -> Result<DogProfile, StoreError> {
        let profile = DogProfile::new(name, notes);
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO dog_profiles
                (id, name, notes, created_at, updated_at, confirmed,
                 min_samples_for_auto_tag, sample_count, total_barks)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, 0, 0)",
            params![
                profile.id,
                profile.name,
                profile.notes,
                profile.created_at.to_rfc3339(),
                profile.updated_at.to_rfc3339(),
                profile.min_samples_for_auto_tag,
            ],
        )?;
        Ok(profile)
    }

    pub fn get_dog(&self, dog_id: &str) -> Result<Option<DogProfile>, StoreError> {
        let conn = self.connect()?;
        get_dog_in(&conn, dog_id)
    }

    pub fn list_dogs(&self) -> Result<Vec<DogProfile>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM dog_profiles ORDER BY name")?;
        let rows = stmt.query_map([], row_to_dog_row)?;
        let mut dogs = Vec::new();
        for row in rows {
            dogs.push(dog_row_to_profile(row?)?);
        }
        Ok(dogs)
    }

    pub fn update_dog(
        &self,
        dog_id: &str,
        name: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Option<DogProfile>, StoreError> {
        let conn = self.connect()?;
        if get_dog_in(&conn, dog_id)?.is_none() {
            return Ok(None);
        }

        let now = Utc::now();
        if let Some(name) = name {
            conn.execute(
                "UPDATE dog_profiles SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now.to_rfc3339(), dog_id],
            )?;
        }
        if let Some(notes) = notes {
            conn.execute(
                "UPDATE dog_profiles SET notes = ?1, updated_at = ?2 WHERE id = ?3",
                params![notes, now.to_rfc3339(), dog_id],
            )?;
        }

        get_dog_in(&conn, dog_id)
    }

    pub fn delete_dog(&self, dog_id: &str) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        // bark_fingerprints.dog_id has no FK cascade (rusqlite/SQLite FKs
        // are off by default); null it out explicitly before deleting.
        conn.execute(
            "UPDATE bark_fingerprints SET dog_id = NULL WHERE dog_id = ?1",
            params![dog_id],
        )?;
        let deleted = conn.execute("DELETE FROM dog_profiles WHERE id = ?1", params![dog_id])?;
        Ok(deleted > 0)
    }

    pub fn confirm_dog(
        &self,
        dog_id: &str,
        min_samples: Option<u32>,
    ) -> Result<Option<DogProfile>, StoreError> {
        let conn = self.connect()?;
        let now = Utc::now();
        if let Some(min_samples) = min_samples {
            conn.execute(
                "UPDATE dog_profiles SET confirmed = 1, confirmed_at = ?1,
                    min_samples_for_auto_tag = ?2, updated_at = ?1 WHERE id = ?3",
                params![now.to_rfc3339(), min_samples, dog_id],
            )?;
        } else {
            conn.execute(
                "UPDATE dog_profiles SET confirmed = 1, confirmed_at = ?1,
                    updated_at = ?1 WHERE id = ?2",
                params![now.to_rfc3339(), dog_id],
            )?;
        }
        get_dog_in(&conn, dog_id)
    }

    pub fn unconfirm_dog(&self, dog_id: &str) -> Result<Option<DogProfile>, StoreError> {
        let conn = self.connect()?;
        let now = Utc::now();
        conn.execute(
            "UPDATE dog_profiles SET confirmed = 0, confirmed_at = NULL,
                updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), dog_id],
        )?;
        get_dog_in(&conn, dog_id)
    }

    /// Re-centroids the dog's embedding and bumps its running stats
    /// (spec §4.7 "Incremental update"). Default weight `w = 1`.
    pub fn update_dog_stats(
        &self,
        dog_id: &str,
        new_embedding: &[f32; EMBEDDING_DIM],
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.connect()?;
        let Some(mut profile) = get_dog_in(&conn, dog_id)? else {
            return Ok(());
        };

        profile.update_embedding(new_embedding, 1.0);

        profile.first_seen = Some(match profile.first_seen {
            Some(existing) if existing <= timestamp => existing,
            _ => timestamp,
        });
        profile.last_seen = Some(match profile.last_seen {
            Some(existing) if existing >= timestamp => existing,
            _ => timestamp,
        });
        profile.total_barks += 1;

        conn.execute(
            "UPDATE dog_profiles SET
                embedding = ?1, sample_count = ?2, first_seen = ?3,
                last_seen = ?4, total_barks = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                profile.embedding.map(|e| serialize_embedding(&e)),
                profile.sample_count,
                profile.first_seen.map(|t| t.to_rfc3339()),
                profile.last_seen.map(|t| t.to_rfc3339()),
                profile.total_barks,
                Utc::now().to_rfc3339(),
                dog_id,
            ],
        )?;
        Ok(())
    }

    /// Reassigns all of `source`'s fingerprints to `target`, merges
    /// embeddings weighted by sample count, and deletes `source`.
    /// Single transaction (spec §4.7 "Merge" — atomic).
    pub fn merge(&self, source_id: &str, target_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let Some(source) = get_dog_in(&tx, source_id)? else {
            return Ok(false);
        };
        let Some(target) = get_dog_in(&tx, target_id)? else {
            return Ok(false);
        };

        tx.execute(
            "UPDATE bark_fingerprints SET dog_id = ?1 WHERE dog_id = ?2",
            params![target_id, source_id],
        )?;

        if let (Some(se), Some(te)) = (source.embedding, target.embedding) {
            let total = source.sample_count + target.sample_count;
            if total > 0 {
                let mut merged = [0.0f32; EMBEDDING_DIM];
                for i in 0..EMBEDDING_DIM {
                    merged[i] = (se[i] * source.sample_count as f32
                        + te[i] * target.sample_count as f32)
                        / total as f32;
                }
                normalize(&mut merged);

                tx.execute(
                    "UPDATE dog_profiles SET
                        embedding = ?1, sample_count = ?2,
                        total_barks = total_barks + ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![
                        serialize_embedding(&merged),
                        total,
                        source.total_barks,
                        Utc::now().to_rfc3339(),
                        target_id,
                    ],
                )?;
            }
        }

        tx.execute("DELETE FROM dog_profiles WHERE id = ?1", params![source_id])?;
        tx.commit()?;
        Ok(true)
    }

    // --- Fingerprint operations ---

    pub fn save_fingerprint(&self, fp: &BarkFingerprint) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO bark_fingerprints
                (id, timestamp, embedding, dog_id, match_confidence, cluster_id,
                 evidence_filename, rejection_reason, confirmed, confirmed_at,
                 detection_probability, doa_degrees, duration_ms, pitch_hz,
                 spectral_centroid_hz, mfcc_mean)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            params![
                fp.id,
                fp.timestamp.to_rfc3339(),
                fp.embedding.map(|e| serialize_embedding(&e)),
                fp.dog_id,
                fp.match_confidence,
                fp.cluster_id,
                fp.evidence_filename,
                fp.rejection_reason,
                fp.confirmed,
                fp.confirmed_at.map(|t| t.to_rfc3339()),
                fp.detection_probability,
                fp.doa_degrees,
                fp.duration_ms,
                fp.pitch_hz,
                fp.spectral_centroid_hz,
                fp.mfcc_mean.map(|e| serialize_embedding(&e)),
            ],
        )?;
        Ok(())
    }

    pub fn get_fingerprint(&self, id: &str) -> Result<Option<BarkFingerprint>, StoreError> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT * FROM bark_fingerprints WHERE id = ?1",
                params![id],
                row_to_fingerprint_row,
            )
            .optional()?;
        row.map(fingerprint_row_to_fingerprint).transpose()
    }

    pub fn reject_fingerprint(&self, id: &str, reason: &str) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE bark_fingerprints SET rejection_reason = ?1 WHERE id = ?2",
            params![reason, id],
        )?;
        Ok(updated > 0)
    }

    pub fn unreject_fingerprint(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE bark_fingerprints SET rejection_reason = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(updated > 0)
    }

    pub fn confirm_fingerprint(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE bark_fingerprints SET confirmed = 1, confirmed_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(updated > 0)
    }

    pub fn unconfirm_fingerprint(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE bark_fingerprints SET confirmed = 0, confirmed_at = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(updated > 0)
    }

    /// Cosine-similarity search against known dog centroids (spec §4.7
    /// "Similarity search").
    pub fn find_matches(
        &self,
        embedding: &[f32; EMBEDDING_DIM],
        threshold: f32,
        top_k: usize,
        only_auto_taggable: bool,
    ) -> Result<Vec<FingerprintMatch>, StoreError> {
        let mut query = *embedding;
        normalize(&mut query);

        let dogs = self.list_dogs()?;
        let mut matches: Vec<FingerprintMatch> = dogs
            .into_iter()
            .filter_map(|dog| {
                let dog_embedding = dog.embedding?;
                if only_auto_taggable && !dog.can_auto_tag() {
                    return None;
                }
                let similarity: f32 = query
                    .iter()
                    .zip(dog_embedding.iter())
                    .map(|(a, b)| a * b)
                    .sum();
                if similarity >= threshold {
                    Some(FingerprintMatch {
                        dog_id: dog.id,
                        dog_name: dog.name,
                        confidence: similarity,
                        sample_count: dog.sample_count,
                    })
                } else {
                    None
                }
            })
            .collect();

        matches.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
        matches.truncate(top_k);
        Ok(matches)
    }

    pub fn list_fingerprints(
        &self,
        limit: u32,
        offset: u32,
        filter: &FingerprintFilter,
    ) -> Result<(Vec<BarkFingerprint>, u64), StoreError> {
        let mut conditions = Vec::new();
        let mut sql_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(dog_id) = &filter.dog_id {
            conditions.push("dog_id = ?".to_string());
            sql_params.push(Box::new(dog_id.clone()));
        }
        match filter.tagged {
            Some(true) => conditions.push("dog_id IS NOT NULL".to_string()),
            Some(false) => conditions.push("dog_id IS NULL".to_string()),
            None => {}
        }
        if let Some(min_confidence) = filter.min_confidence {
            conditions.push("match_confidence >= ?".to_string());
            sql_params.push(Box::new(min_confidence));
        }
        if let Some(start) = filter.start_date {
            conditions.push("timestamp >= ?".to_string());
            sql_params.push(Box::new(start.to_rfc3339()));
        }
        if let Some(end) = filter.end_date {
            conditions.push("timestamp <= ?".to_string());
            sql_params.push(Box::new(end.to_rfc3339()));
        }
        match filter.rejected {
            Some(true) => conditions.push("rejection_reason IS NOT NULL".to_string()),
            Some(false) => conditions.push("rejection_reason IS NULL".to_string()),
            None => {}
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let conn = self.connect()?;

        let count_sql = format!("SELECT COUNT(*) FROM bark_fingerprints{where_clause}");
        let count_params: Vec<&dyn rusqlite::ToSql> =
            sql_params.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, count_params.as_slice(), |r| r.get(0))?;

        let list_sql = format!(
            "SELECT * FROM bark_fingerprints{where_clause} ORDER BY timestamp DESC LIMIT ? OFFSET ?"
        );
        let mut list_params = sql_params;
        list_params.push(Box::new(limit));
        list_params.push(Box::new(offset));
        let list_params_ref: Vec<&dyn rusqlite::ToSql> =
            list_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&list_sql)?;
        let rows = stmt.query_map(list_params_ref.as_slice(), row_to_fingerprint_row)?;

        let mut fingerprints = Vec::new();
        for row in rows {
            fingerprints.push(fingerprint_row_to_fingerprint(row?)?);
        }

        Ok((fingerprints, total))
    }

    pub fn purge_fingerprints(
        &self,
        before: Option<DateTime<Utc>>,
        untagged_only: bool,
    ) -> Result<u64, StoreError> {
        let mut conditions = Vec::new();
        let mut sql_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(before) = before {
            conditions.push("timestamp < ?".to_string());
            sql_params.push(Box::new(before.to_rfc3339()));
        }
        if untagged_only {
            conditions.push("dog_id IS NULL".to_string());
        }

        if conditions.is_empty() {
            log::warn!("purge_fingerprints called with no conditions, refusing");
            return Ok(0);
        }

        let where_clause = conditions.join(" AND ");
        let conn = self.connect()?;

        let count_sql = format!("SELECT COUNT(*) FROM bark_fingerprints WHERE {where_clause}");
        let params_ref: Vec<&dyn rusqlite::ToSql> =
            sql_params.iter().map(|p| p.as_ref()).collect();
        let count: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        if count > 0 {
            let delete_sql = format!("DELETE FROM bark_fingerprints WHERE {where_clause}");
            conn.execute(&delete_sql, params_ref.as_slice())?;
        }

        Ok(count)
    }

    /// Fixes cached `total_barks` drift against actual tagged-fingerprint
    /// counts (e.g. after a purge). Returns the number of dogs updated.
    pub fn recalculate_dog_bark_counts(&self) -> Result<u32, StoreError> {
        let conn = self.connect()?;

        let mut stmt = conn.prepare(
            "SELECT dog_id, COUNT(*) FROM bark_fingerprints
             WHERE dog_id IS NOT NULL GROUP BY dog_id",
        )?;
        let actual_counts: Vec<(String, i64)> = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<Result<_, _>>()?;

        let mut updated = 0;
        for (dog_id, actual) in actual_counts {
            let current: i64 = conn.query_row(
                "SELECT total_barks FROM dog_profiles WHERE id = ?1",
                params![dog_id],
                |r| r.get(0),
            )?;
            if current != actual {
                conn.execute(
                    "UPDATE dog_profiles SET total_barks = ?1 WHERE id = ?2",
                    params![actual, dog_id],
                )?;
                updated += 1;
            }
        }

        // Dogs with zero tagged fingerprints never appear in actual_counts;
        // their total_barks should also collapse to zero.
        let mut stmt = conn.prepare("SELECT id, total_barks FROM dog_profiles")?;
        let all_dogs: Vec<(String, i64)> = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<Result<_, _>>()?;
        for (dog_id, current) in all_dogs {
            let has_fingerprints: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM bark_fingerprints WHERE dog_id = ?1)",
                params![dog_id],
                |r| r.get(0),
            )?;
            if !has_fingerprints && current != 0 {
                conn.execute(
                    "UPDATE dog_profiles SET total_barks = 0 WHERE id = ?1",
                    params![dog_id],
                )?;
                updated += 1;
            }
        }

        Ok(updated)
    }
}

fn get_dog_in(conn: &Connection, dog_id: &str) -> Result<Option<DogProfile>, StoreError> {
    let row = conn
        .query_row(
            "SELECT * FROM dog_profiles WHERE id = ?1",
            params![dog_id],
            row_to_dog_row,
        )
        .optional()?;
    row.map(dog_row_to_profile).transpose()
}

struct DogRow {
    id: String,
    name: String,
    notes: String,
    created_at: String,
    updated_at: String,
    confirmed: bool,
    confirmed_at: Option<String>,
    min_samples_for_auto_tag: u32,
    embedding: Option<Vec<u8>>,
    sample_count: u32,
    first_seen: Option<String>,
    last_seen: Option<String>,
    total_barks: u32,
    avg_duration_ms: Option<f64>,
    avg_pitch_hz: Option<f64>,
}

fn row_to_dog_row(row: &rusqlite::Row) -> rusqlite::Result<DogRow> {
    Ok(DogRow {
        id: row.get("id")?,
        name: row.get("name")?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        confirmed: row.get::<_, i64>("confirmed")? != 0,
        confirmed_at: row.get("confirmed_at")?,
        min_samples_for_auto_tag: row.get("min_samples_for_auto_tag")?,
        embedding: row.get("embedding")?,
        sample_count: row.get("sample_count")?,
        first_seen: row.get("first_seen")?,
        last_seen: row.get("last_seen")?,
        total_barks: row.get("total_barks")?,
        avg_duration_ms: row.get("avg_duration_ms")?,
        avg_pitch_hz: row.get("avg_pitch_hz")?,
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn dog_row_to_profile(row: DogRow) -> Result<DogProfile, StoreError> {
    let embedding = row
        .embedding
        .map(|b| deserialize_embedding::<EMBEDDING_DIM>(&b))
        .transpose()?;

    Ok(DogProfile {
        id: row.id,
        name: row.name,
        notes: row.notes,
        created_at: parse_rfc3339(&row.created_at),
        updated_at: parse_rfc3339(&row.updated_at),
        confirmed: row.confirmed,
        confirmed_at: row.confirmed_at.as_deref().map(parse_rfc3339),
        min_samples_for_auto_tag: row.min_samples_for_auto_tag,
        embedding,
        sample_count: row.sample_count,
        first_seen: row.first_seen.as_deref().map(parse_rfc3339),
        last_seen: row.last_seen.as_deref().map(parse_rfc3339),
        total_barks: row.total_barks,
        avg_duration_ms: row.avg_duration_ms,
        avg_pitch_hz: row.avg_pitch_hz,
    })
}

struct FingerprintRow {
    id: String,
    timestamp: String,
    embedding: Option<Vec<u8>>,
    dog_id: Option<String>,
    match_confidence: Option<f32>,
    cluster_id: Option<String>,
    evidence_filename: Option<String>,
    rejection_reason: Option<String>,
    confirmed: Option<bool>,
    confirmed_at: Option<String>,
    detection_probability: f32,
    doa_degrees: Option<i32>,
    duration_ms: Option<f64>,
    pitch_hz: Option<f64>,
    spectral_centroid_hz: Option<f64>,
    mfcc_mean: Option<Vec<u8>>,
}

fn row_to_fingerprint_row(row: &rusqlite::Row) -> rusqlite::Result<FingerprintRow> {
    Ok(FingerprintRow {
        id: row.get("id")?,
        timestamp: row.get("timestamp")?,
        embedding: row.get("embedding")?,
        dog_id: row.get("dog_id")?,
        match_confidence: row.get("match_confidence")?,
        cluster_id: row.get("cluster_id")?,
        evidence_filename: row.get("evidence_filename")?,
        rejection_reason: row.get("rejection_reason")?,
        confirmed: row
            .get::<_, Option<i64>>("confirmed")?
            .map(|v| v != 0),
        confirmed_at: row.get("confirmed_at")?,
        detection_probability: row.get("detection_probability")?,
        doa_degrees: row.get("doa_degrees")?,
        duration_ms: row.get("duration_ms")?,
        pitch_hz: row.get("pitch_hz")?,
        spectral_centroid_hz: row.get("spectral_centroid_hz")?,
        mfcc_mean: row.get("mfcc_mean")?,
    })
}

fn fingerprint_row_to_fingerprint(row: FingerprintRow) -> Result<BarkFingerprint, StoreError> {
    let embedding = row
        .embedding
        .map(|b| deserialize_embedding::<EMBEDDING_DIM>(&b))
        .transpose()?;
    let mfcc_mean = row
        .mfcc_mean
        .map(|b| deserialize_embedding::<MFCC_DIM>(&b))
        .transpose()?;

    Ok(BarkFingerprint {
        id: row.id,
        timestamp: parse_rfc3339(&row.timestamp),
        embedding,
        dog_id: row.dog_id,
        match_confidence: row.match_confidence,
        cluster_id: row.cluster_id,
        evidence_filename: row.evidence_filename,
        rejection_reason: row.rejection_reason,
        confirmed: row.confirmed,
        confirmed_at: row.confirmed_at.as_deref().map(parse_rfc3339),
        detection_probability: row.detection_probability,
        doa_degrees: row.doa_degrees,
        duration_ms: row.duration_ms,
        pitch_hz: row.pitch_hz,
        spectral_centroid_hz: row.spectral_centroid_hz,
        mfcc_mean,
    })
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(Result::ok)
        .any(|name| name == column);
    Ok(exists)
}

fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<(), StoreError> {
    if !column_exists(conn, table, column)? {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {definition}"), [])?;
    }
    Ok(())
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS dog_profiles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            notes TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            confirmed INTEGER NOT NULL DEFAULT 0,
            confirmed_at TEXT,
            min_samples_for_auto_tag INTEGER NOT NULL DEFAULT 5,
            embedding BLOB,
            sample_count INTEGER NOT NULL DEFAULT 0,
            first_seen TEXT,
            last_seen TEXT,
            total_barks INTEGER NOT NULL DEFAULT 0,
            avg_duration_ms REAL,
            avg_pitch_hz REAL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bark_fingerprints (
            id TEXT PRIMARY KEY,
            timestamp TEXT NOT NULL,
            embedding BLOB,
            dog_id TEXT,
            match_confidence REAL,
            cluster_id TEXT,
            evidence_filename TEXT,
            detection_probability REAL NOT NULL DEFAULT 0,
            doa_degrees INTEGER,
            duration_ms REAL,
            pitch_hz REAL,
            spectral_centroid_hz REAL,
            mfcc_mean BLOB
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY DEFAULT 1,
            version INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (id, version) VALUES (1, 1)",
        [],
    )?;

    let current_version: i64 =
        conn.query_row("SELECT version FROM schema_version WHERE id = 1", [], |r| {
            r.get(0)
        })?;

    if current_version < SCHEMA_VERSION {
        add_column_if_missing(
            conn,
            "dog_profiles",
            "confirmed",
            "confirmed INTEGER NOT NULL DEFAULT 0",
        )?;
        add_column_if_missing(conn, "dog_profiles", "confirmed_at", "confirmed_at TEXT")?;
        add_column_if_missing(
            conn,
            "dog_profiles",
            "min_samples_for_auto_tag",
            "min_samples_for_auto_tag INTEGER NOT NULL DEFAULT 5",
        )?;

        add_column_if_missing(
            conn,
            "bark_fingerprints",
            "rejection_reason",
            "rejection_reason TEXT",
        )?;
        add_column_if_missing(conn, "bark_fingerprints", "confirmed", "confirmed INTEGER")?;
        add_column_if_missing(
            conn,
            "bark_fingerprints",
            "confirmed_at",
            "confirmed_at TEXT",
        )?;

        conn.execute(
            "UPDATE schema_version SET version = ?1 WHERE id = 1",
            params![SCHEMA_VERSION],
        )?;
        log::info!(
            "schema_migrated from_version={current_version} to_version={SCHEMA_VERSION}"
        );
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fingerprints_dog_id ON bark_fingerprints(dog_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fingerprints_cluster_id ON bark_fingerprints(cluster_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fingerprints_timestamp ON bark_fingerprints(timestamp)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fingerprints_untagged
            ON bark_fingerprints(dog_id) WHERE dog_id IS NULL",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fingerprints_rejected
            ON bark_fingerprints(rejection_reason) WHERE rejection_reason IS NOT NULL",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use woof_protocol::dog::EMBEDDING_DIM;

    fn temp_store() -> (FingerprintStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FingerprintStore::new(dir.path().join("fingerprints.db")).unwrap();
        (store, dir)
    }

    #[test]
    fn create_and_get_dog_round_trips() {
        let (store, _dir) = temp_store();
        let created = store.create_dog("Rex", "good boy").unwrap();
        let fetched = store.get_dog(&created.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Rex");
        assert_eq!(fetched.notes, "good boy");
        assert!(!fetched.confirmed);
    }

    #[test]
    fn delete_dog_nulls_out_fingerprint_dog_id() {
        let (store, _dir) = temp_store();
        let dog = store.create_dog("Rex", "").unwrap();

        let mut fp = BarkFingerprint::new(0.9);
        fp.dog_id = Some(dog.id.clone());
        store.save_fingerprint(&fp).unwrap();

        assert!(store.delete_dog(&dog.id).unwrap());

        let reloaded = store.get_fingerprint(&fp.id).unwrap().unwrap();
        assert_eq!(reloaded.dog_id, None);
    }

    #[test]
    fn find_matches_respects_threshold_and_auto_tag_gate() {
        let (store, _dir) = temp_store();
        let dog = store.create_dog("Rex", "").unwrap();

        let mut embedding = [0.0f32; EMBEDDING_DIM];
        embedding[0] = 1.0;
        store
            .update_dog_stats(&dog.id, &embedding, Utc::now())
            .unwrap();

        // Not confirmed yet, so only_auto_taggable=true excludes it.
        let matches = store.find_matches(&embedding, 0.5, 3, true).unwrap();
        assert!(matches.is_empty());

        let matches = store.find_matches(&embedding, 0.5, 3, false).unwrap();
        assert_eq!(matches.len(), 1);
        assert!((matches[0].confidence - 1.0).abs() < 1e-5);
    }

    #[test]
    fn merge_sums_total_barks_and_reassigns_fingerprints() {
        let (store, _dir) = temp_store();
        let source = store.create_dog("Source", "").unwrap();
        let target = store.create_dog("Target", "").unwrap();

        let mut embedding = [0.0f32; EMBEDDING_DIM];
        embedding[1] = 1.0;
        store
            .update_dog_stats(&source.id, &embedding, Utc::now())
            .unwrap();
        store
            .update_dog_stats(&target.id, &embedding, Utc::now())
            .unwrap();

        let mut fp = BarkFingerprint::new(0.9);
        fp.dog_id = Some(source.id.clone());
        store.save_fingerprint(&fp).unwrap();

        assert!(store.merge(&source.id, &target.id).unwrap());
        assert!(store.get_dog(&source.id).unwrap().is_none());

        let merged_target = store.get_dog(&target.id).unwrap().unwrap();
        assert_eq!(merged_target.total_barks, 2);

        let reloaded = store.get_fingerprint(&fp.id).unwrap().unwrap();
        assert_eq!(reloaded.dog_id, Some(target.id));
    }

    #[test]
    fn recalculate_dog_bark_counts_fixes_drift() {
        let (store, _dir) = temp_store();
        let dog = store.create_dog("Rex", "").unwrap();

        let mut fp = BarkFingerprint::new(0.9);
        fp.dog_id = Some(dog.id.clone());
        store.save_fingerprint(&fp).unwrap();

        // total_barks is still 0 from create_dog; fingerprints say 1.
        let updated = store.recalculate_dog_bark_counts().unwrap();
        assert_eq!(updated, 1);
        assert_eq!(store.get_dog(&dog.id).unwrap().unwrap().total_barks, 1);
    }
}
