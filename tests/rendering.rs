use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};
use consultation_report::fonts;
use consultation_report::media::MediaStore;
use consultation_report::report::{layout, RenderContext, RenderedReport, ReportRenderer};
use consultation_report::{ConsultationReport, ReportDetails};
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use sha2::{Digest, Sha256};

const SKIP_HINT: &str =
    "no usable font family. Set CONSULTATION_REPORT_FONTS_DIR or copy the Roboto files into assets/fonts.";

fn sample_report(clinic_logo: Option<&str>) -> ConsultationReport {
    let created = Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap();
    ConsultationReport {
        id: 1,
        details: ReportDetails {
            clinic_name: "Harbour View Clinic".to_string(),
            physician_name: "Dr. Amara Okafor".to_string(),
            physician_contact: "+44 20 7946 0958".to_string(),
            patient_first_name: "Jonas".to_string(),
            patient_last_name: "Lindqvist".to_string(),
            patient_dob: NaiveDate::from_ymd_opt(1984, 3, 9).unwrap(),
            patient_contact: "jonas@example.org".to_string(),
            chief_complaint: "Persistent dry cough for three weeks.\n\nWorse at night.".to_string(),
            consultation_note: "Chest clear on auscultation.\nPlan: trial of inhaled steroid."
                .to_string(),
        },
        clinic_logo: clinic_logo.map(str::to_string),
        created_at: created,
        updated_at: created,
    }
}

fn fixed_context() -> RenderContext {
    let offset = FixedOffset::east_opt(0).unwrap();
    RenderContext::at(
        offset.with_ymd_and_hms(2026, 10, 16, 14, 15, 0).unwrap(),
        "203.0.113.9",
    )
}

fn render_sample_pdf(media: &MediaStore, clinic_logo: Option<&str>) -> Option<RenderedReport> {
    if !fonts::default_fonts_available() {
        return None;
    }

    let rendered = ReportRenderer::new(media.clone())
        .render(&sample_report(clinic_logo), &fixed_context())
        .expect("render sample report");
    Some(rendered)
}

fn write_logo(media: &MediaStore) -> String {
    let mut image = RgbaImage::from_pixel(240, 80, Rgba([30, 64, 175, 255]));
    for x in 0..40 {
        image.put_pixel(x, 0, Rgba([0, 0, 0, 0]));
    }
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut bytes, ImageOutputFormat::Png)
        .unwrap();

    std::fs::create_dir_all(media.root().join("logos")).unwrap();
    std::fs::write(media.root().join("logos/brand.png"), bytes).unwrap();
    "logos/brand.png".to_string()
}

fn scrub_pdf(bytes: &[u8]) -> Vec<u8> {
    fn scrub_segment(data: &mut [u8], tag: &[u8], terminator: u8) {
        let mut index = 0;
        while index + tag.len() < data.len() {
            if data[index..].starts_with(tag) {
                let mut cursor = index + tag.len();
                while cursor < data.len() {
                    let byte = data[cursor];
                    if byte == terminator {
                        break;
                    }
                    if terminator == b')' {
                        data[cursor] = b'0';
                    } else if !matches!(byte, b'<' | b'>' | b' ' | b'\n' | b'\r' | b'\t') {
                        data[cursor] = b'0';
                    }
                    cursor += 1;
                }
                index = cursor;
            } else {
                index += 1;
            }
        }
    }

    fn scrub_xml(data: &mut [u8], start: &[u8], end: &[u8]) {
        let mut offset = 0;
        while offset + start.len() < data.len() {
            if let Some(start_pos) = data[offset..]
                .windows(start.len())
                .position(|window| window == start)
            {
                let start_index = offset + start_pos + start.len();
                if let Some(end_pos) = data[start_index..]
                    .windows(end.len())
                    .position(|window| window == end)
                {
                    for byte in &mut data[start_index..start_index + end_pos] {
                        if !matches!(*byte, b'<' | b'>' | b'/' | b' ' | b'\n' | b'\r' | b'\t') {
                            *byte = b'0';
                        }
                    }
                    offset = start_index + end_pos + end.len();
                } else {
                    break;
                }
            } else {
                break;
            }
        }
    }

    let mut normalized = bytes.to_vec();
    scrub_segment(&mut normalized, b"/CreationDate(", b')');
    scrub_segment(&mut normalized, b"/ModDate(", b')');
    scrub_segment(&mut normalized, b"/ID[", b']');
    scrub_segment(&mut normalized, b"/Producer(", b')');
    scrub_xml(&mut normalized, b"<xmp:CreateDate>", b"</xmp:CreateDate>");
    scrub_xml(&mut normalized, b"<xmp:ModifyDate>", b"</xmp:ModifyDate>");
    scrub_xml(
        &mut normalized,
        b"<xmp:MetadataDate>",
        b"</xmp:MetadataDate>",
    );
    scrub_xml(
        &mut normalized,
        b"<xmpMM:DocumentID>",
        b"</xmpMM:DocumentID>",
    );
    scrub_xml(
        &mut normalized,
        b"<xmpMM:InstanceID>",
        b"</xmpMM:InstanceID>",
    );
    scrub_xml(&mut normalized, b"<xmpMM:VersionID>", b"</xmpMM:VersionID>");
    normalized
}

fn normalized_hash(bytes: &[u8]) -> [u8; 32] {
    let normalized = scrub_pdf(bytes);
    let digest = Sha256::digest(&normalized);
    digest.into()
}

#[test]
fn renders_non_empty_output() {
    let dir = tempfile::tempdir().unwrap();
    let media = MediaStore::new(dir.path());
    let Some(rendered) = render_sample_pdf(&media, None) else {
        eprintln!("Skipping renders_non_empty_output: {SKIP_HINT}");
        return;
    };
    assert!(rendered.bytes.starts_with(b"%PDF"));
    assert_eq!(rendered.filename, "CR_Lindqvist_Jonas_19840309.pdf");
}

#[test]
fn consultation_note_starts_on_second_page() {
    let dir = tempfile::tempdir().unwrap();
    let media = MediaStore::new(dir.path());
    let Some(rendered) = render_sample_pdf(&media, None) else {
        eprintln!("Skipping consultation_note_starts_on_second_page: {SKIP_HINT}");
        return;
    };

    let sections = layout(&sample_report(None), &fixed_context());
    let page_of = |title: &str| {
        let index = sections
            .iter()
            .position(|section| section.title() == Some(title))
            .unwrap();
        rendered.section_pages[index]
    };
    assert_eq!(rendered.section_pages.len(), sections.len());
    assert_eq!(rendered.section_pages[0], Some(1));
    assert_eq!(page_of("Chief Complaint"), Some(1));
    assert_eq!(page_of("Consultation Note"), Some(2));
}

#[test]
fn renders_with_transparent_logo() {
    let dir = tempfile::tempdir().unwrap();
    let media = MediaStore::new(dir.path());
    let logo = write_logo(&media);

    let Some(without_logo) = render_sample_pdf(&media, None) else {
        eprintln!("Skipping renders_with_transparent_logo: {SKIP_HINT}");
        return;
    };
    let with_logo = render_sample_pdf(&media, Some(&logo)).unwrap();
    assert!(with_logo.bytes.len() > without_logo.bytes.len());
}

#[test]
fn missing_logo_file_still_renders() {
    let dir = tempfile::tempdir().unwrap();
    let media = MediaStore::new(dir.path());
    let Some(rendered) = render_sample_pdf(&media, Some("logos/gone.png")) else {
        eprintln!("Skipping missing_logo_file_still_renders: {SKIP_HINT}");
        return;
    };
    assert!(rendered.bytes.starts_with(b"%PDF"));
}

#[test]
fn rendering_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let media = MediaStore::new(dir.path());
    let Some(first) = render_sample_pdf(&media, None) else {
        eprintln!("Skipping rendering_is_deterministic: {SKIP_HINT}");
        return;
    };
    let second = render_sample_pdf(&media, None).unwrap();

    assert_eq!(first.bytes.len(), second.bytes.len(), "PDF sizes should match");
    assert_eq!(
        normalized_hash(&first.bytes),
        normalized_hash(&second.bytes),
        "PDF renders must be deterministic after metadata normalization"
    );
}
