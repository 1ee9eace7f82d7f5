//! Storage layer for consultation reports.
//!
//! A single `SQLite` table holds one row per accepted submission. Logo files
//! live on disk (see [`crate::media`]); rows only keep their relative path.

pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::record::{ConsultationReport, ReportDetails};

/// Storage engine for consultation reports.
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and the schema if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a new report and return it with its assigned id and timestamps.
    pub fn insert(
        &self,
        details: &ReportDetails,
        clinic_logo: Option<&str>,
    ) -> Result<ConsultationReport> {
        let now = Utc::now();
        let timestamp = now.to_rfc3339();

        self.conn.execute(
            r"
            INSERT INTO consultation_reports (
                clinic_name, clinic_logo, physician_name, physician_contact,
                patient_first_name, patient_last_name, patient_dob, patient_contact,
                chief_complaint, consultation_note, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            ",
            params![
                details.clinic_name,
                clinic_logo,
                details.physician_name,
                details.physician_contact,
                details.patient_first_name,
                details.patient_last_name,
                details.patient_dob.to_string(),
                details.patient_contact,
                details.chief_complaint,
                details.consultation_note,
                timestamp,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted consultation report with id {}", id);

        Ok(ConsultationReport {
            id,
            details: details.clone(),
            clinic_logo: clinic_logo.map(str::to_string),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a report by its id.
    pub fn get(&self, id: i64) -> Result<Option<ConsultationReport>> {
        let sql = format!(
            "SELECT {} FROM consultation_reports WHERE id = ?1",
            schema::REPORT_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, [id], RawRow::from_row)
            .optional()?;
        row.map(RawRow::into_report).transpose()
    }

    /// Get the most recent reports, newest first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<ConsultationReport>> {
        let sql = format!(
            "SELECT {} FROM consultation_reports ORDER BY created_at DESC, id DESC LIMIT ?1",
            schema::REPORT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map([limit_i64], RawRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawRow::into_report).collect()
    }

    /// Delete a report and return the removed row, if it existed.
    pub fn delete(&self, id: i64) -> Result<Option<ConsultationReport>> {
        let Some(report) = self.get(id)? else {
            return Ok(None);
        };
        self.conn
            .execute("DELETE FROM consultation_reports WHERE id = ?1", [id])?;
        info!("Deleted consultation report {}", id);
        Ok(Some(report))
    }

    /// Count stored reports.
    pub fn count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM consultation_reports", [], |row| {
                    row.get(0)
                })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in schema::SCHEMA_STATEMENTS {
        conn.execute_batch(statement)?;
    }
    Ok(())
}

/// Column values as stored, before parsing dates and timestamps.
struct RawRow {
    id: i64,
    clinic_name: String,
    clinic_logo: Option<String>,
    physician_name: String,
    physician_contact: String,
    patient_first_name: String,
    patient_last_name: String,
    patient_dob: String,
    patient_contact: String,
    chief_complaint: String,
    consultation_note: String,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            clinic_name: row.get(1)?,
            clinic_logo: row.get(2)?,
            physician_name: row.get(3)?,
            physician_contact: row.get(4)?,
            patient_first_name: row.get(5)?,
            patient_last_name: row.get(6)?,
            patient_dob: row.get(7)?,
            patient_contact: row.get(8)?,
            chief_complaint: row.get(9)?,
            consultation_note: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_report(self) -> Result<ConsultationReport> {
        let patient_dob = NaiveDate::parse_from_str(&self.patient_dob, "%Y-%m-%d").map_err(|err| {
            Error::CorruptRow {
                message: format!("patient_dob {:?} of report {}: {err}", self.patient_dob, self.id),
            }
        })?;

        Ok(ConsultationReport {
            id: self.id,
            details: ReportDetails {
                clinic_name: self.clinic_name,
                physician_name: self.physician_name,
                physician_contact: self.physician_contact,
                patient_first_name: self.patient_first_name,
                patient_last_name: self.patient_last_name,
                patient_dob,
                patient_contact: self.patient_contact,
                chief_complaint: self.chief_complaint,
                consultation_note: self.consultation_note,
            },
            clinic_logo: self.clinic_logo,
            created_at: parse_timestamp(self.id, "created_at", &self.created_at)?,
            updated_at: parse_timestamp(self.id, "updated_at", &self.updated_at)?,
        })
    }
}

fn parse_timestamp(id: i64, column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| Error::CorruptRow {
            message: format!("{column} {value:?} of report {id}: {err}"),
        })
}
