//! The submit → persist → render workflow shared by the HTTP server and the CLI.

use chrono::Utc;
use log::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::form::{self, ConsultationForm, Field, FormLimits};
use crate::media::MediaStore;
use crate::record::ConsultationReport;
use crate::report::{RenderContext, RenderedReport, ReportRenderer};
use crate::storage::Storage;

/// Owns storage, media and the renderer.
#[derive(Debug)]
pub struct ReportService {
    storage: Storage,
    media: MediaStore,
    renderer: ReportRenderer,
    limits: FormLimits,
}

impl ReportService {
    /// Assembles a service from its parts.
    pub fn new(
        storage: Storage,
        media: MediaStore,
        renderer: ReportRenderer,
        limits: FormLimits,
    ) -> Self {
        Self {
            storage,
            media,
            renderer,
            limits,
        }
    }

    /// Opens the database and media store named by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = Storage::open(config.database_path())?;
        let media = MediaStore::new(config.media_root());
        let renderer = ReportRenderer::new(media.clone())
            .with_fonts_dir(config.report.fonts_dir.clone())
            .with_bookmarks(config.report.bookmarks)
            .with_hyphenation(config.report.hyphenate);
        Ok(Self::new(storage, media, renderer, config.form_limits()))
    }

    /// Validation limits applied to submissions.
    pub fn limits(&self) -> &FormLimits {
        &self.limits
    }

    /// Validates, stores and renders a submission.
    ///
    /// Nothing is persisted when validation fails. A logo written before a failed insert is
    /// removed again.
    pub fn submit(
        &self,
        form: &ConsultationForm,
        context: &RenderContext,
    ) -> Result<(ConsultationReport, RenderedReport)> {
        let submission = form.validate_with(&self.limits)?;

        let logo_path = submission
            .logo
            .as_ref()
            .map(|logo| self.media.save_logo(logo))
            .transpose()?;

        let report = match self.storage.insert(&submission.details, logo_path.as_deref()) {
            Ok(report) => report,
            Err(err) => {
                if let Some(path) = &logo_path {
                    if let Err(cleanup) = self.media.delete(path) {
                        warn!("Failed to remove logo {path} after insert error: {cleanup}");
                    }
                }
                return Err(err);
            }
        };
        info!("Stored consultation report {} ({})", report.id, report);

        let rendered = self.renderer.render(&report, context)?;
        Ok((report, rendered))
    }

    /// Validates and renders a submission without storing anything.
    pub fn preview(
        &self,
        form: &ConsultationForm,
        context: &RenderContext,
    ) -> Result<RenderedReport> {
        let submission = form.validate_with(&self.limits)?;
        let now = Utc::now();
        let report = ConsultationReport {
            id: 0,
            details: submission.details,
            clinic_logo: None,
            created_at: now,
            updated_at: now,
        };
        let logo = submission.logo.as_ref().map(|logo| logo.bytes.as_slice());
        self.renderer.render_with_logo_bytes(&report, logo, context)
    }

    /// Renders a stored report.
    pub fn render(
        &self,
        report: &ConsultationReport,
        context: &RenderContext,
    ) -> Result<RenderedReport> {
        self.renderer.render(report, context)
    }

    /// Fetches a report, failing with [`Error::NotFound`] for unknown ids.
    pub fn get(&self, id: i64) -> Result<ConsultationReport> {
        self.storage.get(id)?.ok_or(Error::NotFound { id })
    }

    /// The most recent reports, newest first.
    pub fn list(&self, limit: usize) -> Result<Vec<ConsultationReport>> {
        self.storage.list_recent(limit)
    }

    /// Deletes a report together with its logo file.
    pub fn delete(&self, id: i64) -> Result<ConsultationReport> {
        let report = self.storage.delete(id)?.ok_or(Error::NotFound { id })?;
        if let Some(path) = &report.clinic_logo {
            self.media.delete(path)?;
        }
        Ok(report)
    }

    /// Validates one field by wire name; `None` for unknown names.
    pub fn validate_field(&self, name: &str, value: &str) -> Option<Vec<String>> {
        let field = Field::from_name(name)?;
        let errors = form::validate_field(field, value);
        debug!("Live validation of {field}: {} error(s)", errors.len());
        Some(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{sample_form, LogoUpload};
    use chrono::FixedOffset;
    use chrono::TimeZone;

    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
        0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0xf8,
        0xff, 0xff, 0x3f, 0x00, 0x05, 0xfe, 0x02, 0xfe, 0xa7, 0x35, 0x81, 0x84, 0x00, 0x00, 0x00,
        0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
    ];

    fn service(media_root: &std::path::Path) -> ReportService {
        let media = MediaStore::new(media_root);
        ReportService::new(
            Storage::open_in_memory().unwrap(),
            media.clone(),
            ReportRenderer::new(media),
            FormLimits::default(),
        )
    }

    fn context() -> RenderContext {
        let offset = FixedOffset::east_opt(3600).unwrap();
        RenderContext::at(
            offset.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap(),
            "127.0.0.1",
        )
    }

    #[test]
    fn invalid_submission_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let mut form = sample_form();
        form.patient_dob = "not a date".to_string();
        form.clinic_logo = Some(LogoUpload::new("logo.png", None, PNG_1X1.to_vec()));

        let err = service.submit(&form, &context()).unwrap_err();
        let errors = err.form_errors().expect("validation error");
        assert_eq!(errors.get(Field::PatientDob), ["Enter a valid date.".to_string()]);
        assert!(service.list(10).unwrap().is_empty());
        assert!(!dir.path().join("logos").exists());
    }

    #[test]
    fn failed_insert_removes_saved_logo() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("reports.db");
        let media = MediaStore::new(dir.path().join("media"));
        let service = ReportService::new(
            Storage::open(&db_path).unwrap(),
            media.clone(),
            ReportRenderer::new(media),
            FormLimits::default(),
        );
        rusqlite::Connection::open(&db_path)
            .unwrap()
            .execute_batch("DROP TABLE consultation_reports")
            .unwrap();

        let mut form = sample_form();
        form.clinic_logo = Some(LogoUpload::new("logo.png", None, PNG_1X1.to_vec()));
        let err = service.submit(&form, &context()).unwrap_err();

        assert!(matches!(err, Error::DatabaseQuery(_)), "{err:?}");
        let logos = dir.path().join("media/logos");
        let leftovers = std::fs::read_dir(&logos)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn get_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = service(dir.path()).get(404).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn delete_removes_record_and_logo() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let submission = sample_form().validate().unwrap();
        let logo = LogoUpload::new("logo.png", Some("image/png".to_string()), PNG_1X1.to_vec());
        let path = service.media.save_logo(&logo).unwrap();
        let report = service
            .storage
            .insert(&submission.details, Some(&path))
            .unwrap();
        assert!(dir.path().join(&path).is_file());

        let removed = service.delete(report.id).unwrap();
        assert_eq!(removed.id, report.id);
        assert!(!dir.path().join(&path).exists());
        assert!(service.delete(report.id).unwrap_err().is_not_found());
    }

    #[test]
    fn validate_field_by_wire_name() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        assert_eq!(service.validate_field("patient_first_name", "Ada"), Some(vec![]));
        assert_eq!(
            service.validate_field("physician_contact", "nobody"),
            Some(vec![
                "Please enter a valid email address or phone number.".to_string()
            ])
        );
        assert_eq!(service.validate_field("shoe_size", "42"), None);
    }
}
