//! `SQLite` schema for consultation reports.

/// SQL statement to create the reports table.
pub const CREATE_REPORTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS consultation_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    clinic_name TEXT NOT NULL,
    clinic_logo TEXT,
    physician_name TEXT NOT NULL,
    physician_contact TEXT NOT NULL,
    patient_first_name TEXT NOT NULL,
    patient_last_name TEXT NOT NULL,
    patient_dob TEXT NOT NULL,
    patient_contact TEXT NOT NULL,
    chief_complaint TEXT NOT NULL,
    consultation_note TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// Index backing the newest-first listing.
pub const CREATE_CREATED_AT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_reports_created_at ON consultation_reports(created_at DESC)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[CREATE_REPORTS_TABLE, CREATE_CREATED_AT_INDEX];

/// Column list shared by every `SELECT`, in the order `RawRow::from_row` expects.
pub const REPORT_COLUMNS: &str = "id, clinic_name, clinic_logo, physician_name, \
    physician_contact, patient_first_name, patient_last_name, patient_dob, patient_contact, \
    chief_complaint, consultation_note, created_at, updated_at";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_table_has_a_column_per_field() {
        for field in crate::form::Field::ALL {
            assert!(
                CREATE_REPORTS_TABLE.contains(field.name()),
                "missing column {}",
                field.name()
            );
            assert!(REPORT_COLUMNS.contains(field.name()));
        }
    }
}
