use std::path::Path;

use consultation_report::form::LogoUpload;
use consultation_report::media::MediaStore;
use consultation_report::storage::Storage;
use consultation_report::{
    fonts, ConsultationForm, Field, FormLimits, RenderContext, ReportRenderer, ReportService,
};
use image::{DynamicImage, ImageOutputFormat, RgbImage};

fn service(root: &Path) -> ReportService {
    let storage = Storage::open(root.join("db/reports.db")).unwrap();
    let media = MediaStore::new(root.join("media"));
    ReportService::new(
        storage,
        media.clone(),
        ReportRenderer::new(media),
        FormLimits::default(),
    )
}

fn filled_form() -> ConsultationForm {
    ConsultationForm {
        clinic_name: "  Harbour View Clinic ".to_string(),
        physician_name: "Dr. Amara Okafor".to_string(),
        physician_contact: "a.okafor@harbourview.example".to_string(),
        patient_first_name: "Jonas".to_string(),
        patient_last_name: "Lindqvist".to_string(),
        patient_dob: "03/09/1984".to_string(),
        patient_contact: "(555) 123-4567".to_string(),
        chief_complaint: "Dry cough.\r\nWorse at night.".to_string(),
        consultation_note: "Chest clear.".to_string(),
        clinic_logo: None,
    }
}

fn png_logo() -> LogoUpload {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(64, 32))
        .write_to(&mut bytes, ImageOutputFormat::Png)
        .unwrap();
    LogoUpload::new("Clinic Logo.png", Some("image/png".to_string()), bytes)
}

#[test]
fn submit_stores_record_logo_and_renders() {
    if !fonts::default_fonts_available() {
        eprintln!("Skipping submit_stores_record_logo_and_renders: no usable font family.");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());
    let mut form = filled_form();
    form.clinic_logo = Some(png_logo());

    let (report, rendered) = service
        .submit(&form, &RenderContext::now("192.0.2.10"))
        .unwrap();

    assert_eq!(report.details.clinic_name, "Harbour View Clinic");
    assert_eq!(rendered.filename, "CR_Lindqvist_Jonas_19840309.pdf");
    assert!(rendered.bytes.starts_with(b"%PDF"));

    let logo = report.clinic_logo.as_deref().expect("stored logo path");
    assert!(logo.starts_with("logos/"));
    assert!(logo.ends_with("_Clinic_Logo.png"));
    assert!(dir.path().join("media").join(logo).is_file());

    let stored = service.get(report.id).unwrap();
    assert_eq!(stored, report);

    service.delete(report.id).unwrap();
    assert!(!dir.path().join("media").join(logo).exists());
    assert!(service.list(10).unwrap().is_empty());
}

#[test]
fn preview_renders_without_persisting() {
    if !fonts::default_fonts_available() {
        eprintln!("Skipping preview_renders_without_persisting: no usable font family.");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());
    let mut form = filled_form();
    form.clinic_logo = Some(png_logo());

    let rendered = service
        .preview(&form, &RenderContext::now("192.0.2.10"))
        .unwrap();
    assert!(rendered.bytes.starts_with(b"%PDF"));
    assert!(service.list(10).unwrap().is_empty());
    assert!(!dir.path().join("media/logos").exists());
}

#[test]
fn rejected_logo_reports_every_problem_field() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());
    let mut form = filled_form();
    form.patient_last_name = String::new();
    form.clinic_logo = Some(LogoUpload::new(
        "notes.txt",
        Some("text/plain".to_string()),
        b"hello".to_vec(),
    ));

    let err = service
        .submit(&form, &RenderContext::now("192.0.2.10"))
        .unwrap_err();
    let errors = err.form_errors().expect("validation failure");

    assert_eq!(
        errors.get(Field::PatientLastName),
        ["This field is required.".to_string()]
    );
    assert_eq!(
        errors.get(Field::ClinicLogo),
        ["Please upload a valid image file (JPEG, PNG, GIF, or WebP).".to_string()]
    );
    assert!(service.list(10).unwrap().is_empty());
}

#[test]
fn records_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let submission = filled_form().validate().unwrap();
    {
        let storage = Storage::open(dir.path().join("db/reports.db")).unwrap();
        storage.insert(&submission.details, None).unwrap();
        storage.insert(&submission.details, None).unwrap();
    }

    let service = service(dir.path());
    let reports = service.list(10).unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports[0].id > reports[1].id);
    assert_eq!(
        reports[0].to_string(),
        format!("Report for Jonas Lindqvist - {}", reports[0].created_at.date_naive())
    );
}
