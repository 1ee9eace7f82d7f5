//! Data structures describing the logical content of the report body.
//!
//! The report layout is expressed as a list of [`Section`]s made of [`Block`]s.  The values
//! do not reference the rendering crate directly (apart from colours carried by the spans),
//! which keeps [`crate::report`] readable and lets tests inspect the layout without
//! rendering a PDF.  [`crate::builder::PdfBuilder`] maps the blocks onto `genpdf` elements.

use crate::richtext::Span;

/// Horizontal alignment of a paragraph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HorizontalAlignment {
    /// Left aligned content.
    #[default]
    Left,
    /// Center aligned content.
    Center,
    /// Right aligned content.
    Right,
}

impl From<HorizontalAlignment> for genpdf::Alignment {
    fn from(alignment: HorizontalAlignment) -> Self {
        match alignment {
            HorizontalAlignment::Left => genpdf::Alignment::Left,
            HorizontalAlignment::Center => genpdf::Alignment::Center,
            HorizontalAlignment::Right => genpdf::Alignment::Right,
        }
    }
}

/// Rich text paragraph carrying inline styling information and alignment metadata.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RichParagraph {
    spans: Vec<Span>,
    alignment: HorizontalAlignment,
    indent_mm: f64,
}

impl RichParagraph {
    /// Creates a paragraph from the provided spans using left alignment.
    pub fn new(spans: impl Into<Vec<Span>>) -> Self {
        Self {
            spans: spans.into(),
            ..Self::default()
        }
    }

    /// Returns the spans that make up the paragraph.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Returns the configured alignment.
    pub fn alignment(&self) -> HorizontalAlignment {
        self.alignment
    }

    /// Returns the left indent in millimetres.
    pub fn indent_mm(&self) -> f64 {
        self.indent_mm
    }

    /// Returns the concatenated text of all spans.
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(Span::text).collect()
    }

    /// Sets the alignment and returns the updated paragraph.
    pub fn with_alignment(mut self, alignment: HorizontalAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Sets the left indent and returns the updated paragraph.
    pub fn with_indent_mm(mut self, indent_mm: f64) -> Self {
        self.indent_mm = indent_mm;
        self
    }
}

/// Individual content blocks that make up sections.
#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    /// Styled paragraph content.
    Paragraph(RichParagraph),
    /// Free text shown line by line inside an indented frame.
    Boxed(String),
    /// Centred framed notice made of several paragraphs.
    Notice(Vec<RichParagraph>),
    /// Vertical whitespace measured in lines.
    Spacer(f64),
    /// Explicit page break request.
    PageBreak,
}

impl Block {
    /// Convenience helper for a `Label: value` line with a bold label.
    pub fn labelled(label: &str, value: impl Into<String>, indent_mm: f64) -> Self {
        Self::Paragraph(
            RichParagraph::new(vec![
                Span::new(format!("{label}: ")).bold(),
                Span::new(value),
            ])
            .with_indent_mm(indent_mm),
        )
    }

    /// Convenience helper for a boxed free-text block.
    pub fn boxed(text: impl Into<String>) -> Self {
        Self::Boxed(text.into())
    }
}

/// Logical representation of a document section.
///
/// A section without a title renders no heading; the report title block uses this.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Section {
    identifier: Option<String>,
    title: Option<String>,
    blocks: Vec<Block>,
}

impl Section {
    /// Creates a new section with the provided heading.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Creates a section without a heading.
    pub fn untitled() -> Self {
        Self::default()
    }

    /// Returns the section identifier used for bookmarks.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Returns the heading of the section.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Returns the blocks contained in the section.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Sets the identifier and returns the updated section.
    pub fn with_identifier(mut self, identifier: impl Into<Option<String>>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Appends a block and returns the updated section.
    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    /// Extends the section with additional blocks and returns the updated instance.
    pub fn with_blocks<I>(mut self, blocks: I) -> Self
    where
        I: IntoIterator<Item = Block>,
    {
        self.blocks.extend(blocks);
        self
    }

    /// Whether the section begins with a forced page break.
    pub fn starts_on_new_page(&self) -> bool {
        matches!(self.blocks.first(), Some(Block::PageBreak))
    }

    /// Creates a builder that can inject an initial page break.
    pub fn builder(title: impl Into<String>) -> SectionBuilder {
        SectionBuilder::new(title)
    }
}

/// Builder for [`Section`] values.
///
/// Callers can opt-in to inserting a page break at the beginning of the section via
/// [`SectionBuilder::start_on_new_page`].
#[derive(Clone, Debug, Default)]
pub struct SectionBuilder {
    identifier: Option<String>,
    title: String,
    blocks: Vec<Block>,
    start_on_new_page: bool,
}

impl SectionBuilder {
    /// Creates a builder for a section with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Marks the section to start on a new page.
    pub fn start_on_new_page(mut self, start_on_new_page: bool) -> Self {
        self.start_on_new_page = start_on_new_page;
        self
    }

    /// Sets the identifier for the section.
    pub fn identifier(mut self, identifier: impl Into<Option<String>>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Pushes an additional block into the section.
    pub fn push_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    /// Builds the final section, injecting a leading page break when requested.
    pub fn build(mut self) -> Section {
        if self.start_on_new_page {
            match self.blocks.first() {
                Some(Block::PageBreak) => {}
                _ => self.blocks.insert(0, Block::PageBreak),
            }
        }

        Section {
            identifier: self.identifier,
            title: Some(self.title),
            blocks: self.blocks,
        }
    }
}
