// 🗄️ Store - SQLite persistence for projects, properties and histories
//
// Reads (project, attached properties, their financial records) and writes
// back only the derived project fields. Every write of derived fields is
// logged to the event table.

use crate::entities::{
    FinancialKind, FinancialRecord, FinancialRollup, Project, ProjectStatus, Property, PropertyKind,
};
use crate::error::{StoreError, StoreResult};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Where a stored financial record came from.
///
/// Imported rows are keyed by file and row number, so importing the same
/// file twice is a no-op. Direct entries are always new records: entering
/// a value that was corrected away earlier makes it the newest again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSource {
    Entry,
    Import { file: String, row: usize },
}

impl RecordSource {
    fn key(&self) -> String {
        match self {
            RecordSource::Entry => format!("entry:{}", uuid::Uuid::new_v4()),
            RecordSource::Import { file, row } => format!("import:{}:{}", file, row),
        }
    }
}

/// A CSV row ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedRecord {
    pub property_id: i64,
    pub record: FinancialRecord,
    pub source: RecordSource,
}

/// Compute idempotency hash for duplicate detection
pub fn record_hash(property_id: i64, record: &FinancialRecord, source_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}|{}|{}",
        source_key,
        property_id,
        record.kind,
        record.fiscal_year,
        record.value.normalize(),
        record
            .effective_date
            .map(|d| d.to_string())
            .unwrap_or_default()
    ));
    format!("{:x}", hasher.finalize())
}

pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Projects (derived rollups stored as decimal text)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY,
            project_number TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            agency_id INTEGER NOT NULL,
            fiscal_year INTEGER NOT NULL,
            status TEXT NOT NULL,
            estimated TEXT NOT NULL DEFAULT '0',
            net_book TEXT NOT NULL DEFAULT '0',
            assessed TEXT NOT NULL DEFAULT '0',
            financial_date TEXT,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Properties (Parcel | Building)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS properties (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            pid TEXT,
            pin TEXT,
            parcel_id INTEGER
        )",
        [],
    )?;

    // ==========================================================================
    // Financial history (append-only, id = creation order)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS financial_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            property_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            fiscal_year INTEGER NOT NULL,
            value TEXT NOT NULL,
            effective_date TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Memberships (no FK: dangling links are reported by verify_memberships)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS project_properties (
            project_id INTEGER NOT NULL,
            property_id INTEGER NOT NULL,
            PRIMARY KEY (project_id, property_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_financial_property ON financial_records(property_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_project_properties_property
         ON project_properties(property_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// WRITES
// ============================================================================

pub fn insert_project(conn: &Connection, project: &Project) -> StoreResult<()> {
    let rollup = project.rollup();
    conn.execute(
        "INSERT INTO projects (
            id, project_number, name, agency_id, fiscal_year, status,
            estimated, net_book, assessed, financial_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            project.id,
            project.project_number,
            project.name,
            project.agency_id,
            project.fiscal_year(),
            project.status().as_str(),
            rollup.estimated.to_string(),
            rollup.net_book.to_string(),
            rollup.assessed.to_string(),
            project.financial_date().map(|d| d.to_rfc3339()),
        ],
    )?;

    debug!(project_id = project.id, number = %project.project_number, "Inserted project");
    Ok(())
}

/// Insert a property and its financial history.
pub fn insert_property(conn: &Connection, property: &Property) -> StoreResult<()> {
    let (pid, pin, parcel_id) = match &property.kind {
        PropertyKind::Parcel { pid, pin } => (pid.clone(), pin.clone(), None),
        PropertyKind::Building { parcel_id } => (None, None, *parcel_id),
    };

    conn.execute(
        "INSERT INTO properties (id, name, kind, pid, pin, parcel_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            property.id,
            property.name,
            property.kind.label(),
            pid,
            pin,
            parcel_id
        ],
    )?;

    insert_financial_records(conn, property.id, property.financials())?;
    Ok(())
}

/// Append records to a property's history. Returns how many were stored.
pub fn insert_financial_records(
    conn: &Connection,
    property_id: i64,
    records: &[FinancialRecord],
) -> StoreResult<usize> {
    let mut inserted = 0;
    for record in records {
        if store_record(conn, property_id, record, &RecordSource::Entry)? {
            inserted += 1;
        }
    }

    debug!(property_id, inserted, "Financial records stored");
    Ok(inserted)
}

/// `false` when the source already delivered this record.
fn store_record(
    conn: &Connection,
    property_id: i64,
    record: &FinancialRecord,
    source: &RecordSource,
) -> StoreResult<bool> {
    let hash = record_hash(property_id, record, &source.key());

    let result = conn.execute(
        "INSERT INTO financial_records (
            idempotency_hash, property_id, kind, fiscal_year, value, effective_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            hash,
            property_id,
            record.kind.as_str(),
            record.fiscal_year,
            record.value.to_string(),
            record.effective_date.map(|d| d.to_string()),
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            debug!(property_id, ?source, "Skipping already imported record");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Attach a property to a project (idempotent).
pub fn link_property(conn: &Connection, project_id: i64, property_id: i64) -> StoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO project_properties (project_id, property_id) VALUES (?1, ?2)",
        params![project_id, property_id],
    )?;
    Ok(())
}

/// Write back the derived fields (last writer wins) and log the change.
pub fn save_project_financials(conn: &Connection, project: &Project) -> StoreResult<()> {
    let rollup = project.rollup();
    let financial_date = project.financial_date().map(|d| d.to_rfc3339());

    let updated = conn.execute(
        "UPDATE projects
         SET estimated = ?1, net_book = ?2, assessed = ?3, financial_date = ?4,
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?5",
        params![
            rollup.estimated.to_string(),
            rollup.net_book.to_string(),
            rollup.assessed.to_string(),
            financial_date,
            project.id,
        ],
    )?;

    if updated == 0 {
        warn!(project_id = project.id, "Cannot save financials of unknown project");
        return Err(StoreError::NotFound {
            entity: "project".to_string(),
            id: project.id.to_string(),
        });
    }

    let event = Event::new(
        "project_financials_updated",
        "project",
        &project.id.to_string(),
        serde_json::json!({
            "fiscal_year": project.fiscal_year(),
            "estimated": rollup.estimated.to_string(),
            "net_book": rollup.net_book.to_string(),
            "assessed": rollup.assessed.to_string(),
            "financial_date": financial_date,
        }),
        "financial_aggregator",
    );
    insert_event(conn, &event)?;

    info!(project_id = project.id, "Project financials saved");
    Ok(())
}

// ============================================================================
// READS
// ============================================================================

fn corrupt(column: &str, message: impl ToString) -> StoreError {
    StoreError::CorruptColumn {
        column: column.to_string(),
        message: message.to_string(),
    }
}

fn parse_decimal(column: &str, raw: &str) -> StoreResult<Decimal> {
    Decimal::from_str(raw).map_err(|e| corrupt(column, e))
}

/// Load a project with its properties (in attach order) and their histories.
pub fn load_project(conn: &Connection, project_id: i64) -> StoreResult<Project> {
    type ProjectRow = (String, String, i64, i32, String, String, String, String, Option<String>);

    let row: Option<ProjectRow> = conn
        .query_row(
            "SELECT project_number, name, agency_id, fiscal_year, status,
                    estimated, net_book, assessed, financial_date
             FROM projects WHERE id = ?1",
            params![project_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            },
        )
        .optional()?;

    let (number, name, agency_id, fiscal_year, status, estimated, net_book, assessed, date) =
        row.ok_or_else(|| StoreError::NotFound {
            entity: "project".to_string(),
            id: project_id.to_string(),
        })?;

    let status = ProjectStatus::from_str(&status).map_err(|e| corrupt("projects.status", e))?;
    let rollup = FinancialRollup {
        estimated: parse_decimal("projects.estimated", &estimated)?,
        net_book: parse_decimal("projects.net_book", &net_book)?,
        assessed: parse_decimal("projects.assessed", &assessed)?,
    };
    let financial_date = date
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| corrupt("projects.financial_date", e))
        })
        .transpose()?;

    let mut stmt = conn.prepare(
        "SELECT property_id FROM project_properties WHERE project_id = ?1 ORDER BY rowid",
    )?;
    let property_ids = stmt
        .query_map(params![project_id], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let properties = property_ids
        .into_iter()
        .map(|id| load_property(conn, id))
        .collect::<StoreResult<Vec<_>>>()?;

    let head = Project::new(project_id, number, name, agency_id, fiscal_year);
    Ok(Project::restore(head, status, properties, rollup, financial_date))
}

pub fn load_property(conn: &Connection, property_id: i64) -> StoreResult<Property> {
    let row: Option<(String, String, Option<String>, Option<String>, Option<i64>)> = conn
        .query_row(
            "SELECT name, kind, pid, pin, parcel_id FROM properties WHERE id = ?1",
            params![property_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()?;

    let (name, kind, pid, pin, parcel_id) = row.ok_or_else(|| StoreError::NotFound {
        entity: "property".to_string(),
        id: property_id.to_string(),
    })?;

    let mut property = match kind.as_str() {
        "Parcel" => {
            let mut parcel = Property::new_parcel(property_id, name);
            parcel.kind = PropertyKind::Parcel { pid, pin };
            parcel
        }
        "Building" => Property::new_building(property_id, name, parcel_id),
        other => return Err(corrupt("properties.kind", format!("unknown kind '{}'", other))),
    };

    for record in get_financial_records(conn, property_id)? {
        property = property.with_financial(record);
    }
    Ok(property)
}

/// A property's history in creation order.
pub fn get_financial_records(
    conn: &Connection,
    property_id: i64,
) -> StoreResult<Vec<FinancialRecord>> {
    let mut stmt = conn.prepare(
        "SELECT kind, fiscal_year, value, effective_date
         FROM financial_records
         WHERE property_id = ?1
         ORDER BY id",
    )?;

    let rows = stmt
        .query_map(params![property_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(kind, fiscal_year, value, effective_date)| {
            let kind = FinancialKind::from_str(&kind)
                .map_err(|e| corrupt("financial_records.kind", e))?;
            let value = parse_decimal("financial_records.value", &value)?;
            let mut record = FinancialRecord::new(kind, fiscal_year, value);
            if let Some(raw) = effective_date {
                let date = NaiveDate::from_str(&raw)
                    .map_err(|e| corrupt("financial_records.effective_date", e))?;
                record = record.with_effective_date(date);
            }
            Ok(record)
        })
        .collect()
}

pub fn count_financial_records(conn: &Connection) -> StoreResult<i64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM financial_records", [], |row| row.get(0))?;
    Ok(count)
}

/// Every membership must point at an existing project.
/// Returns the number of memberships checked.
pub fn verify_memberships(conn: &Connection) -> StoreResult<usize> {
    let dangling: Option<(i64, i64)> = conn
        .query_row(
            "SELECT pp.property_id, pp.project_id
             FROM project_properties pp
             LEFT JOIN projects p ON p.id = pp.project_id
             WHERE p.id IS NULL
             ORDER BY pp.project_id, pp.property_id
             LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    if let Some((property_id, project_id)) = dangling {
        error!(property_id, project_id, "Property references a missing project");
        return Err(StoreError::DanglingProjectReference {
            property_id,
            project_id,
        });
    }

    let checked: i64 =
        conn.query_row("SELECT COUNT(*) FROM project_properties", [], |row| row.get(0))?;
    Ok(checked as usize)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> StoreResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> StoreResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                    })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// One row of `property_id,kind,fiscal_year,value,effective_date`.
#[derive(Debug, Deserialize)]
struct FinancialCsvRow {
    property_id: i64,
    kind: String,
    fiscal_year: i32,
    value: String,
    #[serde(default)]
    effective_date: Option<String>,
}

pub fn load_financials_csv(csv_path: &Path) -> StoreResult<Vec<ImportedRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path)?;
    let file = csv_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| csv_path.display().to_string());

    let mut records = Vec::new();

    for (index, result) in rdr.deserialize().enumerate() {
        let line = index + 1;
        let row: FinancialCsvRow =
            result.with_context(|| format!("Failed to deserialize row {}", line))?;

        let kind = FinancialKind::from_str(&row.kind)
            .with_context(|| format!("Row {}: bad kind", line))?;
        let value = Decimal::from_str(row.value.trim())
            .with_context(|| format!("Row {}: bad value '{}'", line, row.value))?;

        let mut record = FinancialRecord::new(kind, row.fiscal_year, value);
        if let Some(raw) = row.effective_date.filter(|d| !d.trim().is_empty()) {
            let date = NaiveDate::from_str(raw.trim())
                .with_context(|| format!("Row {}: bad effective date '{}'", line, raw))?;
            record = record.with_effective_date(date);
        }
        record
            .check()
            .with_context(|| format!("Row {}: rejected", line))?;

        records.push(ImportedRecord {
            property_id: row.property_id,
            record,
            source: RecordSource::Import {
                file: file.clone(),
                row: line,
            },
        });
    }

    Ok(records)
}

/// Store imported rows. Rows already imported are skipped; unknown
/// properties are an error.
pub fn import_financials(conn: &Connection, rows: &[ImportedRecord]) -> StoreResult<usize> {
    let mut inserted = 0;

    for row in rows {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM properties WHERE id = ?1",
                params![row.property_id],
                |r| r.get(0),
            )
            .optional()?;

        if exists.is_none() {
            warn!(property_id = row.property_id, "Financial record for unknown property");
            return Err(StoreError::NotFound {
                entity: "property".to_string(),
                id: row.property_id.to_string(),
            });
        }

        if store_record(conn, row.property_id, &row.record, &row.source)? {
            inserted += 1;
        }
    }

    info!(rows = rows.len(), inserted, "Financial import finished");
    Ok(inserted)
}
