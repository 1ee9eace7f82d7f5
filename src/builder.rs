//! Document construction: page decorations, section layout and rendering to bytes.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use genpdf::elements::{Break, FramedElement, LinearLayout, PaddedElement, PageBreak, Paragraph};
use genpdf::error::{Error, ErrorKind};
use genpdf::style;
use genpdf::{self, Element, Margins, Mm, PageDecorator, Position, Size};
use log::debug;
use thiserror::Error as ThisError;

use crate::elements::{mm_from_f64, PageMarker, UnderlinedText, BRAND_BLUE};
use crate::fonts;
use crate::model::{Block, RichParagraph, Section};
use crate::richtext::{spans_to_styled_strings, Span};

#[cfg(feature = "bookmarks")]
use crate::bookmarks::{apply_section_bookmarks, BookmarkError};

const HEADING_FONT_SIZE: u8 = 16;
const HEADING_SPACE_BEFORE_MM: f64 = 6.0;
const HEADING_SPACE_AFTER_MM: f64 = 3.0;
const BOX_PADDING_MM: f64 = 3.0;
const BOX_SPACING_MM: f64 = 2.0;
const BOX_INDENT_MM: f64 = 7.0;

/// Errors raised while turning sections into a PDF.
#[derive(Debug, ThisError)]
pub enum PdfBuildError {
    /// No usable font family could be loaded.
    #[error("failed to load fonts: {0}")]
    Fonts(#[source] Error),
    /// `genpdf` failed while laying out or writing the document.
    #[error("failed to render document: {0}")]
    Render(#[source] Error),
    /// The outline could not be added to the rendered document.
    #[cfg(feature = "bookmarks")]
    #[error("failed to add bookmarks: {0}")]
    Bookmarks(#[from] BookmarkError),
}

/// Shared page counter plus the first page of every section.
///
/// The page decorator advances the counter; [`PageMarker`] elements read it while the body is
/// laid out. Page numbers are 1-based.
#[derive(Clone, Debug, Default)]
pub struct PageTracker {
    page: Rc<Cell<usize>>,
    section_pages: Rc<RefCell<Vec<Option<usize>>>>,
}

impl PageTracker {
    /// Creates a tracker for `sections` body sections.
    pub fn new(sections: usize) -> Self {
        Self {
            page: Rc::new(Cell::new(0)),
            section_pages: Rc::new(RefCell::new(vec![None; sections])),
        }
    }

    /// Moves to the next page and returns its number.
    pub fn advance(&self) -> usize {
        let page = self.page.get() + 1;
        self.page.set(page);
        page
    }

    /// Number of the page currently being laid out, `0` before the first page.
    pub fn current_page(&self) -> usize {
        self.page.get()
    }

    /// Records the current page as the start of `section` unless it is already known.
    pub fn mark_section(&self, section: usize) {
        let mut pages = self.section_pages.borrow_mut();
        if section >= pages.len() {
            pages.resize(section + 1, None);
        }
        if pages[section].is_none() {
            pages[section] = Some(self.page.get());
        }
    }

    /// Start page of each section, `None` for sections that never rendered.
    pub fn section_pages(&self) -> Vec<Option<usize>> {
        self.section_pages.borrow().clone()
    }
}

type DecorationFactory = dyn Fn(usize) -> Box<dyn Element>;

/// Builder for `genpdf::Document` instances with the report's page setup.
#[derive(Default)]
pub struct DocumentBuilder {
    title: Option<String>,
    paper_size: Option<Size>,
    margins: Option<Margins>,
    font_size: Option<u8>,
    line_spacing: Option<f64>,
    fonts_dir: Option<PathBuf>,
    header: Option<Box<DecorationFactory>>,
    footer: Option<FooterSpec>,
    hyphenate: bool,
}

impl DocumentBuilder {
    /// Creates a new builder instance with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the document title stored in the PDF metadata.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the paper size used for newly created documents.
    pub fn with_paper_size(mut self, paper_size: impl Into<Size>) -> Self {
        self.paper_size = Some(paper_size.into());
        self
    }

    /// Sets the margins applied through the page decorator.
    pub fn with_margins(mut self, margins: impl Into<Margins>) -> Self {
        self.margins = Some(margins.into());
        self
    }

    /// Sets the default body font size.
    pub fn with_font_size(mut self, font_size: u8) -> Self {
        self.font_size = Some(font_size);
        self
    }

    /// Sets the default line spacing factor.
    pub fn with_line_spacing(mut self, line_spacing: f64) -> Self {
        self.line_spacing = Some(line_spacing);
        self
    }

    /// Adds a directory to the font search path.
    pub fn with_fonts_dir(mut self, fonts_dir: Option<PathBuf>) -> Self {
        self.fonts_dir = fonts_dir;
        self
    }

    /// Configures a header callback that is invoked for every page.
    pub fn with_header<F, E>(mut self, header: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: Element + 'static,
    {
        self.header = Some(Box::new(move |page| {
            Box::new(header(page)) as Box<dyn Element>
        }));
        self
    }

    /// Configures a footer callback with a fixed height that is invoked for every page.
    pub fn with_footer<F, E>(mut self, height: impl Into<Mm>, footer: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: Element + 'static,
    {
        self.footer = Some(FooterSpec::new(height, footer));
        self
    }

    /// Enables English (US) hyphenation of body text.
    ///
    /// Without the `hyphenation` feature the setting is ignored.
    pub fn with_hyphenation(mut self, hyphenate: bool) -> Self {
        self.hyphenate = hyphenate;
        self
    }

    /// Builds the configured `genpdf::Document`, with the decorator counting pages on `tracker`.
    pub(crate) fn build(
        self,
        tracker: PageTracker,
    ) -> Result<genpdf::Document, PdfBuildError> {
        let font_family =
            fonts::load_font_family(self.fonts_dir.as_deref()).map_err(PdfBuildError::Fonts)?;
        let mut document = genpdf::Document::new(font_family);

        if let Some(title) = self.title {
            document.set_title(title);
        }
        if let Some(paper_size) = self.paper_size {
            document.set_paper_size(paper_size);
        }
        if let Some(font_size) = self.font_size {
            document.set_font_size(font_size);
        }
        if let Some(line_spacing) = self.line_spacing {
            document.set_line_spacing(line_spacing);
        }

        let decorator = ConfiguredPageDecorator {
            tracker,
            margins: self.margins,
            header: self.header,
            footer: self.footer,
        };
        document.set_page_decorator(decorator);

        if self.hyphenate {
            install_hyphenator(&mut document);
        }

        Ok(document)
    }
}

#[cfg(feature = "hyphenation")]
fn install_hyphenator(document: &mut genpdf::Document) {
    use hyphenation::{Language, Load, Standard};

    match Standard::from_embedded(Language::EnglishUS) {
        Ok(hyphenator) => document.set_hyphenator(hyphenator),
        Err(err) => log::warn!("Hyphenation dictionary unavailable: {err}"),
    }
}

#[cfg(not(feature = "hyphenation"))]
fn install_hyphenator(_document: &mut genpdf::Document) {
    debug!("Hyphenation requested but the `hyphenation` feature is disabled");
}

/// Definition of a footer rendered through the page decorator.
pub struct FooterSpec {
    height: Mm,
    factory: Box<DecorationFactory>,
}

impl FooterSpec {
    /// Creates a new footer specification.
    pub fn new<F, E>(height: impl Into<Mm>, factory: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: Element + 'static,
    {
        Self {
            height: height.into(),
            factory: Box::new(move |page| Box::new(factory(page)) as Box<dyn Element>),
        }
    }
}

struct ConfiguredPageDecorator {
    tracker: PageTracker,
    margins: Option<Margins>,
    header: Option<Box<DecorationFactory>>,
    footer: Option<FooterSpec>,
}

impl PageDecorator for ConfiguredPageDecorator {
    fn decorate_page<'a>(
        &mut self,
        context: &genpdf::Context,
        mut area: genpdf::render::Area<'a>,
        style: style::Style,
    ) -> Result<genpdf::render::Area<'a>, Error> {
        let page = self.tracker.advance();

        if let Some(margins) = self.margins {
            area.add_margins(margins);
        }

        if let Some(header) = &self.header {
            let mut element = header(page);
            let result = element.render(context, area.clone(), style)?;
            area.add_offset(Position::new(0, result.size.height));
        }

        if let Some(footer) = &self.footer {
            let available = area.size().height;
            if footer.height > available {
                return Err(Error::new(
                    "Footer height exceeds available space",
                    ErrorKind::InvalidData,
                ));
            }

            let mut footer_area = area.clone();
            footer_area.add_offset(Position::new(0, available - footer.height));
            let mut element = (footer.factory)(page);
            let result = element.render(context, footer_area, style)?;
            if result.has_more {
                return Err(Error::new(
                    "Footer element does not fit into the reserved space",
                    ErrorKind::PageSizeExceeded,
                ));
            }

            area.set_height(available - footer.height);
        }

        Ok(area)
    }
}

/// Output of [`PdfBuilder::render`].
#[derive(Clone, Debug)]
pub struct RenderedPdf {
    /// The PDF file contents.
    pub bytes: Vec<u8>,
    /// 1-based start page per section, in section order.
    pub section_pages: Vec<Option<usize>>,
}

/// Lays out [`Section`]s in a document produced by a [`DocumentBuilder`].
#[derive(Default)]
pub struct PdfBuilder {
    document: DocumentBuilder,
    sections: Vec<Section>,
    #[cfg(feature = "bookmarks")]
    bookmarks: bool,
}

impl PdfBuilder {
    /// Creates a builder using the default document settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the document settings.
    pub fn with_document(mut self, document: DocumentBuilder) -> Self {
        self.document = document;
        self
    }

    /// Appends a section.
    pub fn add_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    /// Appends several sections.
    pub fn add_sections<I>(mut self, sections: I) -> Self
    where
        I: IntoIterator<Item = Section>,
    {
        self.sections.extend(sections);
        self
    }

    /// Adds a PDF outline entry for every titled section.
    #[cfg(feature = "bookmarks")]
    pub fn with_bookmarks(mut self, bookmarks: bool) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    /// Renders all sections and returns the PDF bytes with the section start pages.
    pub fn render(self) -> Result<RenderedPdf, PdfBuildError> {
        let tracker = PageTracker::new(self.sections.len());
        let mut document = self.document.build(tracker.clone())?;

        for (index, section) in self.sections.iter().enumerate() {
            document.push(PageMarker::new(
                section_layout(section),
                tracker.clone(),
                index,
            ));
        }

        let mut bytes = Vec::new();
        document.render(&mut bytes).map_err(PdfBuildError::Render)?;
        let section_pages = tracker.section_pages();
        debug!(
            "Rendered {} sections over {} pages ({} bytes)",
            self.sections.len(),
            tracker.current_page(),
            bytes.len()
        );

        #[cfg(feature = "bookmarks")]
        let bytes = if self.bookmarks {
            apply_section_bookmarks(&bytes, &self.sections, &section_pages)?
        } else {
            bytes
        };

        Ok(RenderedPdf {
            bytes,
            section_pages,
        })
    }
}

fn section_layout(section: &Section) -> LinearLayout {
    let mut layout = LinearLayout::vertical();

    // A leading break must come before the heading so the heading lands on the new page.
    let mut blocks = section.blocks();
    while let Some((Block::PageBreak, rest)) = blocks.split_first() {
        layout.push(PageBreak::new());
        blocks = rest;
    }

    if let Some(title) = section.title() {
        let heading = Span::new(title)
            .bold()
            .underline()
            .sized(HEADING_FONT_SIZE)
            .colored(BRAND_BLUE);
        layout.push(PaddedElement::new(
            UnderlinedText::new(spans_to_styled_strings(&[heading])),
            Margins::trbl(
                mm_from_f64(HEADING_SPACE_BEFORE_MM),
                Mm::default(),
                mm_from_f64(HEADING_SPACE_AFTER_MM),
                Mm::default(),
            ),
        ));
    }

    for block in blocks {
        push_block(&mut layout, block);
    }

    layout
}

fn push_block(layout: &mut LinearLayout, block: &Block) {
    match block {
        Block::Paragraph(paragraph) => {
            let indent = paragraph.indent_mm();
            let element = rich_paragraph(paragraph);
            if indent > 0.0 {
                layout.push(PaddedElement::new(
                    element,
                    Margins::trbl(Mm::default(), Mm::default(), Mm::default(), mm_from_f64(indent)),
                ));
            } else {
                layout.push(element);
            }
        }
        Block::Boxed(text) => {
            let mut lines = LinearLayout::vertical();
            for line in text.lines() {
                if line.trim().is_empty() {
                    lines.push(Break::new(1.0));
                } else {
                    lines.push(Paragraph::new(line.to_string()));
                }
            }
            layout.push(framed(lines, BOX_INDENT_MM));
        }
        Block::Notice(paragraphs) => {
            let mut lines = LinearLayout::vertical();
            for paragraph in paragraphs {
                lines.push(rich_paragraph(paragraph));
            }
            layout.push(framed(lines, 0.0));
        }
        Block::Spacer(lines) => layout.push(Break::new(*lines)),
        Block::PageBreak => layout.push(PageBreak::new()),
    }
}

fn rich_paragraph(paragraph: &RichParagraph) -> Paragraph {
    let mut element = Paragraph::default();
    for span in spans_to_styled_strings(paragraph.spans()) {
        element.push(span.string);
    }
    element.set_alignment(paragraph.alignment().into());
    element
}

fn framed<E: Element + 'static>(
    content: E,
    indent_mm: f64,
) -> PaddedElement<FramedElement<PaddedElement<E>>> {
    let padding = mm_from_f64(BOX_PADDING_MM);
    let inner = PaddedElement::new(content, Margins::trbl(padding, padding, padding, padding));
    let spacing = mm_from_f64(BOX_SPACING_MM);
    PaddedElement::new(
        FramedElement::new(inner),
        Margins::trbl(spacing, Mm::default(), spacing, mm_from_f64(indent_mm)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_counts_pages_from_one() {
        let tracker = PageTracker::new(2);
        assert_eq!(tracker.current_page(), 0);
        assert_eq!(tracker.advance(), 1);
        assert_eq!(tracker.advance(), 2);
        assert_eq!(tracker.current_page(), 2);
    }

    #[test]
    fn tracker_keeps_first_mark_per_section() {
        let tracker = PageTracker::new(2);
        tracker.advance();
        tracker.mark_section(0);
        tracker.advance();
        tracker.mark_section(0);
        tracker.mark_section(1);

        assert_eq!(tracker.section_pages(), vec![Some(1), Some(2)]);
    }

    #[test]
    fn tracker_clones_share_state() {
        let tracker = PageTracker::new(1);
        let decorator_side = tracker.clone();
        decorator_side.advance();
        tracker.mark_section(0);
        assert_eq!(decorator_side.section_pages(), vec![Some(1)]);
    }

    #[test]
    fn tracker_grows_for_unknown_sections() {
        let tracker = PageTracker::new(0);
        tracker.advance();
        tracker.mark_section(2);
        assert_eq!(tracker.section_pages(), vec![None, None, Some(1)]);
    }

    #[test]
    fn builder_collects_sections() {
        let builder = PdfBuilder::new()
            .add_section(Section::new("Chief Complaint"))
            .add_sections([Section::new("Consultation Note"), Section::untitled()]);
        assert_eq!(builder.sections.len(), 3);
    }
}
