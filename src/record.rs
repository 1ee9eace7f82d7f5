//! The consultation record persisted for every accepted submission.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Physician, patient and consultation data captured by the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDetails {
    /// Name printed in the page header.
    pub clinic_name: String,
    /// Attending physician.
    pub physician_name: String,
    /// E-mail address or phone number of the physician.
    pub physician_contact: String,
    /// Patient given name.
    pub patient_first_name: String,
    /// Patient family name.
    pub patient_last_name: String,
    /// Patient date of birth.
    pub patient_dob: NaiveDate,
    /// E-mail address or phone number of the patient.
    pub patient_contact: String,
    /// Free-text chief complaint.
    pub chief_complaint: String,
    /// Free-text consultation note.
    pub consultation_note: String,
}

impl ReportDetails {
    /// Returns `"<first> <last>"`.
    pub fn patient_full_name(&self) -> String {
        format!("{} {}", self.patient_first_name, self.patient_last_name)
    }

    /// Returns the download file name, `CR_<last>_<first>_<YYYYMMDD>.pdf`.
    ///
    /// Name characters other than ASCII letters, digits, `-` and `_` become `_`, so the
    /// result is a single path component and a valid quoted header value.
    pub fn pdf_filename(&self) -> String {
        format!(
            "CR_{}_{}_{}.pdf",
            filename_component(&self.patient_last_name),
            filename_component(&self.patient_first_name),
            self.patient_dob.format("%Y%m%d")
        )
    }

    /// Returns the patient's age in whole years on `date`.
    pub fn patient_age_on(&self, date: NaiveDate) -> i32 {
        age_on(self.patient_dob, date)
    }
}

/// Whole years elapsed between `dob` and `date`.
pub fn age_on(dob: NaiveDate, date: NaiveDate) -> i32 {
    let mut age = date.year() - dob.year();
    if (date.month(), date.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age
}

/// A stored consultation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationReport {
    /// Row id assigned by storage.
    pub id: i64,
    /// Submitted data.
    pub details: ReportDetails,
    /// Logo path relative to the media root, e.g. `logos/<uuid>_logo.png`.
    pub clinic_logo: Option<String>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl ConsultationReport {
    /// Returns `"<first> <last>"`.
    pub fn patient_full_name(&self) -> String {
        self.details.patient_full_name()
    }

    /// Returns the download file name for the rendered report.
    pub fn pdf_filename(&self) -> String {
        self.details.pdf_filename()
    }
}

impl fmt::Display for ConsultationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Report for {} - {}",
            self.patient_full_name(),
            self.created_at.date_naive()
        )
    }
}

fn filename_component(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn sample_details() -> ReportDetails {
    ReportDetails {
        clinic_name: "Harbour View Clinic".to_string(),
        physician_name: "Dr. Amara Okafor".to_string(),
        physician_contact: "a.okafor@harbourview.example".to_string(),
        patient_first_name: "Jonas".to_string(),
        patient_last_name: "Lindqvist".to_string(),
        patient_dob: NaiveDate::from_ymd_opt(1984, 3, 9).unwrap(),
        patient_contact: "+46701234567".to_string(),
        chief_complaint: "Persistent dry cough for three weeks.\nWorse at night.".to_string(),
        consultation_note: "Chest clear on auscultation.\n\nPlan: trial of inhaled steroid."
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn full_name_joins_first_and_last() {
        assert_eq!(sample_details().patient_full_name(), "Jonas Lindqvist");
    }

    #[test]
    fn pdf_filename_uses_compact_dob() {
        assert_eq!(
            sample_details().pdf_filename(),
            "CR_Lindqvist_Jonas_19840309.pdf"
        );
    }

    #[test]
    fn pdf_filename_cannot_escape_the_directory() {
        let mut details = sample_details();
        details.patient_last_name = "../O'Brien/etc".to_string();
        details.patient_first_name = "Zoë \"J\"".to_string();

        let filename = details.pdf_filename();
        assert_eq!(filename, "CR____O_Brien_etc_Zo___J__19840309.pdf");
        assert!(!filename.contains('/'));
        assert!(!filename.contains(".."));
        assert!(filename.is_ascii());
    }

    #[test]
    fn age_counts_only_completed_years() {
        let dob = NaiveDate::from_ymd_opt(1984, 3, 9).unwrap();
        let day_before = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        let birthday = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        assert_eq!(age_on(dob, day_before), 39);
        assert_eq!(age_on(dob, birthday), 40);
    }

    #[test]
    fn age_handles_leap_day_birthdays() {
        let dob = NaiveDate::from_ymd_opt(2000, 2, 29).unwrap();
        assert_eq!(age_on(dob, NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()), 22);
        assert_eq!(age_on(dob, NaiveDate::from_ymd_opt(2023, 3, 1).unwrap()), 23);
    }

    #[test]
    fn display_mentions_patient_and_creation_date() {
        let created = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap();
        let report = ConsultationReport {
            id: 1,
            details: sample_details(),
            clinic_logo: None,
            created_at: created,
            updated_at: created,
        };
        assert_eq!(report.to_string(), "Report for Jonas Lindqvist - 2026-10-16");
    }
}
