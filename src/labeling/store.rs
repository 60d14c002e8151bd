//! SQLite-backed label store.
//!
//! Owns the connection behind a `std::sync::Mutex`; every method locks,
//! runs its statements and releases before returning, so nothing here is
//! ever held across an `.await`.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use uuid::Uuid;

use super::review::{ReviewQuery, ReviewSort};
use super::traits::LabelStore;
use super::types::{LabelCounts, LabelUpdate, ProgressUpdate};
use crate::db::{open_database, open_memory_database, DatabaseError};
use crate::models::{Dataset, DatasetStats, DatasetStatus, Item, ReviewStatus};

const DATASET_COLUMNS: &str = "id, name, instructions, item_count, status, error_message,
     created_at, completed_at, stats_total, stats_labeled, stats_auto_accepted,
     stats_needs_review, stats_low_confidence, stats_reviewed, stats_updated_at";

const ITEM_COLUMNS: &str = "id, dataset_id, ordinal, payload, label, confidence, reasoning,
     review_status, labeled_at, human_label, reviewed_at";

pub struct SqliteLabelStore {
    conn: Mutex<Connection>,
}

impl SqliteLabelStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open (and migrate) a file-backed store.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(open_database(path)?))
    }

    /// Open (and migrate) an in-memory store.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(open_memory_database()?))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    // ═══════════════════════════════════════════
    // Ingestion / review collaborators
    // ═══════════════════════════════════════════

    /// Create an empty dataset. Status is `configured` when instructions are given.
    pub fn create_dataset(
        &self,
        name: &str,
        instructions: Option<&str>,
    ) -> Result<Dataset, DatabaseError> {
        let instructions = instructions.map(str::trim).filter(|s| !s.is_empty());
        let status = if instructions.is_some() {
            DatasetStatus::Configured
        } else {
            DatasetStatus::Uploaded
        };
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        self.conn()?.execute(
            "INSERT INTO datasets (id, name, instructions, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, name, instructions, status.as_str(), to_db_time(&now)],
        )?;

        self.get_dataset(&id)?
            .ok_or_else(|| DatabaseError::not_found("dataset", &id))
    }

    /// Append records to a dataset in order. Returns the new item ids.
    pub fn insert_items(
        &self,
        dataset_id: &str,
        payloads: &[Value],
    ) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM datasets WHERE id = ?1)",
            params![dataset_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(DatabaseError::not_found("dataset", dataset_id));
        }

        let next_ordinal: i64 = tx.query_row(
            "SELECT COALESCE(MAX(ordinal) + 1, 0) FROM items WHERE dataset_id = ?1",
            params![dataset_id],
            |row| row.get(0),
        )?;

        let now = to_db_time(&Utc::now());
        let mut ids = Vec::with_capacity(payloads.len());
        for (offset, payload) in payloads.iter().enumerate() {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO items (id, dataset_id, ordinal, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    dataset_id,
                    next_ordinal + offset as i64,
                    serde_json::to_string(payload)?,
                    now,
                ],
            )?;
            ids.push(id);
        }

        tx.execute(
            "UPDATE datasets
             SET item_count = (SELECT COUNT(*) FROM items WHERE dataset_id = ?1)
             WHERE id = ?1",
            params![dataset_id],
        )?;
        tx.commit()?;

        Ok(ids)
    }

    /// Set or clear labeling instructions.
    ///
    /// Setting them moves an `uploaded` dataset to `configured`; other
    /// statuses are left alone.
    pub fn set_instructions(
        &self,
        dataset_id: &str,
        instructions: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let instructions = instructions.map(str::trim).filter(|s| !s.is_empty());
        let changed = self.conn()?.execute(
            "UPDATE datasets
             SET instructions = ?2,
                 status = CASE WHEN ?2 IS NOT NULL AND status = 'uploaded'
                               THEN 'configured' ELSE status END
             WHERE id = ?1",
            params![dataset_id, instructions],
        )?;
        if changed == 0 {
            return Err(DatabaseError::not_found("dataset", dataset_id));
        }
        Ok(())
    }

    /// Delete a dataset and (by cascade) its items.
    pub fn delete_dataset(&self, dataset_id: &str) -> Result<(), DatabaseError> {
        let changed = self
            .conn()?
            .execute("DELETE FROM datasets WHERE id = ?1", params![dataset_id])?;
        if changed == 0 {
            return Err(DatabaseError::not_found("dataset", dataset_id));
        }
        Ok(())
    }

    /// Record a human decision: accept the machine label (`None`) or replace it.
    pub fn record_review(
        &self,
        item_id: &str,
        human_label: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let changed = self.conn()?.execute(
            "UPDATE items
             SET human_label = COALESCE(?2, label),
                 review_status = 'reviewed',
                 reviewed_at = ?3
             WHERE id = ?1",
            params![item_id, human_label, to_db_time(&now)],
        )?;
        if changed == 0 {
            return Err(DatabaseError::not_found("item", item_id));
        }
        Ok(())
    }

    pub fn get_item(&self, item_id: &str) -> Result<Option<Item>, DatabaseError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                params![item_id],
                ItemRow::from_row,
            )
            .optional()?;
        row.map(item_from_row).transpose()
    }

    /// All items of a dataset in insertion order.
    pub fn list_items(&self, dataset_id: &str) -> Result<Vec<Item>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE dataset_id = ?1 ORDER BY ordinal ASC"
        ))?;
        let rows = stmt.query_map(params![dataset_id], ItemRow::from_row)?;
        collect_items(rows)
    }
}

impl LabelStore for SqliteLabelStore {
    fn get_dataset(&self, dataset_id: &str) -> Result<Option<Dataset>, DatabaseError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {DATASET_COLUMNS} FROM datasets WHERE id = ?1"),
                params![dataset_id],
                DatasetRow::from_row,
            )
            .optional()?;
        row.map(dataset_from_row).transpose()
    }

    fn mark_labeling(&self, dataset_id: &str) -> Result<(), DatabaseError> {
        let changed = self.conn()?.execute(
            "UPDATE datasets SET status = 'labeling', error_message = NULL WHERE id = ?1",
            params![dataset_id],
        )?;
        if changed == 0 {
            return Err(DatabaseError::not_found("dataset", dataset_id));
        }
        Ok(())
    }

    fn mark_error(&self, dataset_id: &str, message: &str) -> Result<(), DatabaseError> {
        let changed = self.conn()?.execute(
            "UPDATE datasets SET status = 'error', error_message = ?2 WHERE id = ?1",
            params![dataset_id, message],
        )?;
        if changed == 0 {
            return Err(DatabaseError::not_found("dataset", dataset_id));
        }
        Ok(())
    }

    fn load_unlabeled(&self, dataset_id: &str) -> Result<Vec<Item>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE dataset_id = ?1 AND label IS NULL
             ORDER BY ordinal ASC"
        ))?;
        let rows = stmt.query_map(params![dataset_id], ItemRow::from_row)?;
        collect_items(rows)
    }

    fn apply_labels(&self, updates: &[LabelUpdate]) -> Result<usize, DatabaseError> {
        if updates.is_empty() {
            return Ok(0);
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE items
                 SET label = ?2,
                     confidence = ?3,
                     reasoning = ?4,
                     labeled_at = ?5,
                     review_status = CASE WHEN review_status = 'reviewed'
                                          THEN 'reviewed' ELSE ?6 END
                 WHERE id = ?1",
            )?;
            for update in updates {
                written += stmt.execute(params![
                    update.item_id,
                    update.label,
                    update.confidence,
                    update.reasoning,
                    to_db_time(&update.labeled_at),
                    update.review_status.as_str(),
                ])?;
            }
        }
        tx.commit()?;

        Ok(written)
    }

    fn label_counts(&self, dataset_id: &str) -> Result<LabelCounts, DatabaseError> {
        let conn = self.conn()?;
        let counts = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN label IS NOT NULL THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN review_status = 'pending' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN review_status = 'auto_accepted' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN review_status = 'needs_review' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN review_status = 'low_confidence' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN review_status = 'reviewed' THEN 1 ELSE 0 END), 0)
             FROM items WHERE dataset_id = ?1",
            params![dataset_id],
            |row| {
                Ok(LabelCounts {
                    total: to_u64(row.get(0)?),
                    labeled: to_u64(row.get(1)?),
                    pending: to_u64(row.get(2)?),
                    auto_accepted: to_u64(row.get(3)?),
                    needs_review: to_u64(row.get(4)?),
                    low_confidence: to_u64(row.get(5)?),
                    reviewed: to_u64(row.get(6)?),
                })
            },
        )?;
        Ok(counts)
    }

    fn earliest_labeled_at(
        &self,
        dataset_id: &str,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let conn = self.conn()?;
        let earliest: Option<String> = conn.query_row(
            "SELECT MIN(labeled_at) FROM items WHERE dataset_id = ?1 AND label IS NOT NULL",
            params![dataset_id],
            |row| row.get(0),
        )?;
        earliest
            .map(|s| parse_db_time("labeled_at", &s))
            .transpose()
    }

    fn write_progress(
        &self,
        dataset_id: &str,
        update: &ProgressUpdate,
    ) -> Result<Dataset, DatabaseError> {
        let stats = &update.stats;
        let conn = self.conn()?;
        // `error` only yields to `completed`; a new run clears it via mark_labeling.
        let row = conn
            .query_row(
                &format!(
                    "UPDATE datasets
                     SET status = CASE
                             WHEN status = 'error' AND ?2 <> 'completed' THEN status
                             ELSE ?2
                         END,
                         stats_total = ?3,
                         stats_labeled = ?4,
                         stats_auto_accepted = ?5,
                         stats_needs_review = ?6,
                         stats_low_confidence = ?7,
                         stats_reviewed = ?8,
                         stats_updated_at = ?9,
                         completed_at = COALESCE(completed_at, ?10)
                     WHERE id = ?1
                     RETURNING {DATASET_COLUMNS}"
                ),
                params![
                    dataset_id,
                    update.status.as_str(),
                    stats.total as i64,
                    stats.labeled as i64,
                    stats.auto_accepted as i64,
                    stats.needs_review as i64,
                    stats.low_confidence as i64,
                    stats.reviewed as i64,
                    stats.updated_at.as_ref().map(to_db_time),
                    update.completed_at.as_ref().map(to_db_time),
                ],
                DatasetRow::from_row,
            )
            .optional()?;
        match row {
            Some(row) => dataset_from_row(row),
            None => Err(DatabaseError::not_found("dataset", dataset_id)),
        }
    }

    fn review_queue(
        &self,
        dataset_id: &str,
        query: &ReviewQuery,
    ) -> Result<(Vec<Item>, u64), DatabaseError> {
        const QUEUE_FILTER: &str = "dataset_id = ?1
             AND review_status IN ('needs_review', 'low_confidence')
             AND human_label IS NULL";

        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM items WHERE {QUEUE_FILTER}"),
            params![dataset_id],
            |row| row.get(0),
        )?;

        let (order_by, offset) = match query.sort {
            ReviewSort::Confidence => ("confidence ASC, ordinal ASC", query.offset()),
            ReviewSort::Recent => ("labeled_at DESC, ordinal ASC", query.offset()),
            ReviewSort::Random => ("RANDOM()", 0),
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE {QUEUE_FILTER}
             ORDER BY {order_by} LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(
            params![dataset_id, i64::from(query.limit), offset as i64],
            ItemRow::from_row,
        )?;
        let items = collect_items(rows)?;

        Ok((items, to_u64(total)))
    }

    fn label_distribution(&self, dataset_id: &str) -> Result<Vec<(String, u64)>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT label, COUNT(*) AS n FROM items
             WHERE dataset_id = ?1 AND label IS NOT NULL
             GROUP BY label
             ORDER BY n DESC, label ASC",
        )?;
        let rows = stmt.query_map(params![dataset_id], |row| {
            Ok((row.get::<_, String>(0)?, to_u64(row.get(1)?)))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn confidence_values(&self, dataset_id: &str) -> Result<Vec<f64>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT confidence FROM items
             WHERE dataset_id = ?1 AND label IS NOT NULL AND confidence IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![dataset_id], |row| row.get::<_, f64>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ═══════════════════════════════════════════
// Row mapping
// ═══════════════════════════════════════════

struct DatasetRow {
    id: String,
    name: String,
    instructions: Option<String>,
    item_count: i64,
    status: String,
    error_message: Option<String>,
    created_at: String,
    completed_at: Option<String>,
    stats_total: i64,
    stats_labeled: i64,
    stats_auto_accepted: i64,
    stats_needs_review: i64,
    stats_low_confidence: i64,
    stats_reviewed: i64,
    stats_updated_at: Option<String>,
}

impl DatasetRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            instructions: row.get(2)?,
            item_count: row.get(3)?,
            status: row.get(4)?,
            error_message: row.get(5)?,
            created_at: row.get(6)?,
            completed_at: row.get(7)?,
            stats_total: row.get(8)?,
            stats_labeled: row.get(9)?,
            stats_auto_accepted: row.get(10)?,
            stats_needs_review: row.get(11)?,
            stats_low_confidence: row.get(12)?,
            stats_reviewed: row.get(13)?,
            stats_updated_at: row.get(14)?,
        })
    }
}

fn dataset_from_row(row: DatasetRow) -> Result<Dataset, DatabaseError> {
    Ok(Dataset {
        status: DatasetStatus::from_str(&row.status)?,
        created_at: parse_db_time("created_at", &row.created_at)?,
        completed_at: row
            .completed_at
            .as_deref()
            .map(|s| parse_db_time("completed_at", s))
            .transpose()?,
        stats: DatasetStats {
            total: to_u64(row.stats_total),
            labeled: to_u64(row.stats_labeled),
            auto_accepted: to_u64(row.stats_auto_accepted),
            needs_review: to_u64(row.stats_needs_review),
            low_confidence: to_u64(row.stats_low_confidence),
            reviewed: to_u64(row.stats_reviewed),
            updated_at: row
                .stats_updated_at
                .as_deref()
                .map(|s| parse_db_time("stats_updated_at", s))
                .transpose()?,
        },
        id: row.id,
        name: row.name,
        instructions: row.instructions,
        item_count: to_u64(row.item_count),
        error_message: row.error_message,
    })
}

struct ItemRow {
    id: String,
    dataset_id: String,
    ordinal: i64,
    payload: String,
    label: Option<String>,
    confidence: Option<f64>,
    reasoning: Option<String>,
    review_status: String,
    labeled_at: Option<String>,
    human_label: Option<String>,
    reviewed_at: Option<String>,
}

impl ItemRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            dataset_id: row.get(1)?,
            ordinal: row.get(2)?,
            payload: row.get(3)?,
            label: row.get(4)?,
            confidence: row.get(5)?,
            reasoning: row.get(6)?,
            review_status: row.get(7)?,
            labeled_at: row.get(8)?,
            human_label: row.get(9)?,
            reviewed_at: row.get(10)?,
        })
    }
}

fn item_from_row(row: ItemRow) -> Result<Item, DatabaseError> {
    Ok(Item {
        payload: serde_json::from_str(&row.payload)?,
        review_status: ReviewStatus::from_str(&row.review_status)?,
        labeled_at: row
            .labeled_at
            .as_deref()
            .map(|s| parse_db_time("labeled_at", s))
            .transpose()?,
        reviewed_at: row
            .reviewed_at
            .as_deref()
            .map(|s| parse_db_time("reviewed_at", s))
            .transpose()?,
        id: row.id,
        dataset_id: row.dataset_id,
        ordinal: to_u64(row.ordinal),
        label: row.label,
        confidence: row.confidence,
        reasoning: row.reasoning,
        human_label: row.human_label,
    })
}

fn collect_items(
    rows: impl Iterator<Item = rusqlite::Result<ItemRow>>,
) -> Result<Vec<Item>, DatabaseError> {
    let mut items = Vec::new();
    for row in rows {
        items.push(item_from_row(row?)?);
    }
    Ok(items)
}

/// Fixed-width RFC 3339 so lexical order matches time order.
fn to_db_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_db_time(field: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Corrupt {
            field: field.to_string(),
            reason: format!("{value}: {e}"),
        })
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
