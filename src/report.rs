//! The consultation report layout and its rendering to PDF.

use std::net::IpAddr;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, Local};
use genpdf::{Margins, PaperSize};
use log::{debug, info, warn};

use crate::builder::{DocumentBuilder, PdfBuilder};
use crate::elements::{
    mm_from_f64, Letterhead, LogoImage, PageFooter, BRAND_BLUE, NOTICE_GREY,
};
use crate::error::Result;
use crate::media::MediaStore;
use crate::model::{Block, HorizontalAlignment, RichParagraph, Section};
use crate::record::ConsultationReport;
use crate::richtext::Span;

/// Title printed at the top of the first page.
pub const REPORT_TITLE: &str = "CONSULTATION REPORT";

/// Closing notice lines.
pub const END_OF_REPORT: &str = "--- End of Consultation Report ---";
pub const SIGNATURE_NOTICE: &str =
    "This document was electronically generated and is valid without signature.";

/// Address shown when the client cannot be identified.
pub const UNKNOWN_ADDRESS: &str = "Unknown";

/// `October 16, 2026 at 02:15:00 PM +00:00`
pub const TIMESTAMP_FORMAT: &str = "%B %d, %Y at %I:%M:%S %p %:z";

/// `October 25, 2006`
pub const DATE_OF_BIRTH_FORMAT: &str = "%B %d, %Y";

const TITLE_FONT_SIZE: u8 = 26;
const BODY_FONT_SIZE: u8 = 11;
const LINE_SPACING: f64 = 1.25;
const PAGE_MARGIN_TOP_MM: f64 = 10.0;
const PAGE_MARGIN_SIDE_MM: f64 = 25.0;
const PAGE_MARGIN_BOTTOM_MM: f64 = 10.0;
const FOOTER_HEIGHT_MM: f64 = 14.0;
const INFO_INDENT_MM: f64 = 7.0;

/// Per-request data printed in the footer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderContext {
    /// Moment the report is generated; also the reference date for the patient's age.
    pub generated_at: DateTime<FixedOffset>,
    /// Address of the client that requested the report.
    pub client_address: String,
}

impl RenderContext {
    /// Context for a report generated now in the local time zone.
    pub fn now(client_address: impl Into<String>) -> Self {
        Self {
            generated_at: Local::now().fixed_offset(),
            client_address: client_address.into(),
        }
    }

    /// Context with an explicit timestamp.
    pub fn at(generated_at: DateTime<FixedOffset>, client_address: impl Into<String>) -> Self {
        Self {
            generated_at,
            client_address: client_address.into(),
        }
    }

    /// The generation timestamp as printed in the report.
    pub fn formatted_timestamp(&self) -> String {
        self.generated_at.format(TIMESTAMP_FORMAT).to_string()
    }

    /// The footer line.
    pub fn footer_stamp(&self) -> String {
        format!(
            "This report is generated on {} from {}",
            self.formatted_timestamp(),
            self.client_address
        )
    }
}

/// Picks the client address: first `X-Forwarded-For` entry, then the peer, then `Unknown`.
pub fn resolve_client_address(forwarded_for: Option<&str>, peer: Option<IpAddr>) -> String {
    forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}

/// The report body as a list of sections, in page order.
pub fn layout(report: &ConsultationReport, context: &RenderContext) -> Vec<Section> {
    let details = &report.details;
    let age = details.patient_age_on(context.generated_at.date_naive());

    let title = Section::untitled().with_blocks([
        Block::Paragraph(
            RichParagraph::new(vec![Span::new(REPORT_TITLE)
                .bold()
                .sized(TITLE_FONT_SIZE)
                .colored(BRAND_BLUE)])
            .with_alignment(HorizontalAlignment::Center),
        ),
        Block::Spacer(1.0),
    ]);

    let clinic = Section::new("Clinic Information")
        .with_identifier("clinic-information".to_string())
        .with_blocks([
            Block::labelled("Clinic Name", &details.clinic_name, INFO_INDENT_MM),
            Block::labelled(
                "Report Generated",
                context.formatted_timestamp(),
                INFO_INDENT_MM,
            ),
        ]);

    let physician = Section::new("Physician Information")
        .with_identifier("physician-information".to_string())
        .with_blocks([
            Block::labelled("Physician Name", &details.physician_name, INFO_INDENT_MM),
            Block::labelled(
                "Physician Contact",
                &details.physician_contact,
                INFO_INDENT_MM,
            ),
        ]);

    let patient = Section::new("Patient Information")
        .with_identifier("patient-information".to_string())
        .with_blocks([
            Block::labelled("Patient Name", details.patient_full_name(), INFO_INDENT_MM),
            Block::labelled(
                "Date of Birth",
                details.patient_dob.format(DATE_OF_BIRTH_FORMAT).to_string(),
                INFO_INDENT_MM,
            ),
            Block::labelled("Age", format!("{age} years"), INFO_INDENT_MM),
            Block::labelled("Patient Contact", &details.patient_contact, INFO_INDENT_MM),
        ]);

    let complaint = Section::new("Chief Complaint")
        .with_identifier("chief-complaint".to_string())
        .with_block(Block::boxed(details.chief_complaint.clone()));

    let note = Section::builder("Consultation Note")
        .identifier("consultation-note".to_string())
        .start_on_new_page(true)
        .push_block(Block::boxed(details.consultation_note.clone()))
        .build();

    let closing = Section::untitled().with_blocks([
        Block::Spacer(2.0),
        Block::Notice(vec![
            RichParagraph::new(vec![Span::new(END_OF_REPORT).bold().colored(NOTICE_GREY)])
                .with_alignment(HorizontalAlignment::Center),
            RichParagraph::new(vec![Span::new(SIGNATURE_NOTICE).italic().colored(NOTICE_GREY)])
                .with_alignment(HorizontalAlignment::Center),
        ]),
    ]);

    vec![title, clinic, physician, patient, complaint, note, closing]
}

/// A rendered report ready to be downloaded.
#[derive(Clone, Debug)]
pub struct RenderedReport {
    /// The PDF file contents.
    pub bytes: Vec<u8>,
    /// Suggested download name.
    pub filename: String,
    /// Start page of every section returned by [`layout`], in the same order.
    pub section_pages: Vec<Option<usize>>,
}

/// Renders stored reports, reading logos from the media store.
#[derive(Clone, Debug)]
pub struct ReportRenderer {
    media: MediaStore,
    fonts_dir: Option<PathBuf>,
    bookmarks: bool,
    hyphenate: bool,
}

impl ReportRenderer {
    /// Creates a renderer reading logos from `media`.
    pub fn new(media: MediaStore) -> Self {
        Self {
            media,
            fonts_dir: None,
            bookmarks: false,
            hyphenate: false,
        }
    }

    /// Searches `fonts_dir` for the report fonts before the default locations.
    pub fn with_fonts_dir(mut self, fonts_dir: Option<PathBuf>) -> Self {
        self.fonts_dir = fonts_dir;
        self
    }

    /// Adds a PDF outline when the `bookmarks` feature is enabled.
    pub fn with_bookmarks(mut self, bookmarks: bool) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    /// Hyphenates body text when the `hyphenation` feature is enabled.
    pub fn with_hyphenation(mut self, hyphenate: bool) -> Self {
        self.hyphenate = hyphenate;
        self
    }

    /// Renders `report` with the decorations described by `context`.
    ///
    /// The logo is read from the media store; a missing or broken file is logged and skipped.
    pub fn render(
        &self,
        report: &ConsultationReport,
        context: &RenderContext,
    ) -> Result<RenderedReport> {
        let logo = self.load_logo(report);
        self.render_with_logo(report, logo, context)
    }

    /// Renders `report` with logo bytes that are not (yet) in the media store.
    pub fn render_with_logo_bytes(
        &self,
        report: &ConsultationReport,
        logo: Option<&[u8]>,
        context: &RenderContext,
    ) -> Result<RenderedReport> {
        let logo = logo.and_then(|bytes| decode_logo(bytes, "upload", report.id));
        self.render_with_logo(report, logo, context)
    }

    fn render_with_logo(
        &self,
        report: &ConsultationReport,
        logo: Option<LogoImage>,
        context: &RenderContext,
    ) -> Result<RenderedReport> {
        let clinic_name = report.details.clinic_name.clone();
        let stamp = context.footer_stamp();

        let document = DocumentBuilder::new()
            .with_title(format!("Consultation Report - {}", report.patient_full_name()))
            .with_paper_size(PaperSize::A4)
            .with_margins(Margins::trbl(
                mm_from_f64(PAGE_MARGIN_TOP_MM),
                mm_from_f64(PAGE_MARGIN_SIDE_MM),
                mm_from_f64(PAGE_MARGIN_BOTTOM_MM),
                mm_from_f64(PAGE_MARGIN_SIDE_MM),
            ))
            .with_font_size(BODY_FONT_SIZE)
            .with_line_spacing(LINE_SPACING)
            .with_fonts_dir(self.fonts_dir.clone())
            .with_hyphenation(self.hyphenate)
            .with_header(move |_page| Letterhead::new(clinic_name.clone(), logo.clone()))
            .with_footer(mm_from_f64(FOOTER_HEIGHT_MM), move |page| {
                PageFooter::new(stamp.clone(), page)
            });

        let builder = PdfBuilder::new()
            .with_document(document)
            .add_sections(layout(report, context));

        #[cfg(feature = "bookmarks")]
        let builder = builder.with_bookmarks(self.bookmarks);
        #[cfg(not(feature = "bookmarks"))]
        if self.bookmarks {
            debug!("Bookmarks requested but the `bookmarks` feature is disabled");
        }

        let rendered = builder.render()?;
        let filename = report.pdf_filename();
        info!(
            "Rendered report {} as {} ({} bytes)",
            report.id,
            filename,
            rendered.bytes.len()
        );

        Ok(RenderedReport {
            bytes: rendered.bytes,
            filename,
            section_pages: rendered.section_pages,
        })
    }

    fn load_logo(&self, report: &ConsultationReport) -> Option<LogoImage> {
        let path = report.clinic_logo.as_deref()?;
        let bytes = match self.media.read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Clinic logo {path} of report {} unavailable: {err}", report.id);
                return None;
            }
        };
        decode_logo(&bytes, path, report.id)
    }
}

fn decode_logo(bytes: &[u8], source: &str, report_id: i64) -> Option<LogoImage> {
    match LogoImage::from_bytes(bytes) {
        Ok(logo) => {
            debug!("Loaded clinic logo {source} for report {report_id}");
            Some(logo)
        }
        Err(err) => {
            warn!("Clinic logo {source} of report {report_id} could not be decoded: {err}");
            None
        }
    }
}
