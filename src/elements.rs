//! Custom `genpdf` elements used by the consultation report.
//!
//! `genpdf` ships paragraphs, images, frames and layouts; the page decorations of the report
//! need a little more: a letterhead combining the clinic logo with the centred clinic name, a
//! footer carrying the generation stamp and page number, underlined section headings, and a
//! wrapper that records on which page a section actually started.

use image::{DynamicImage, GenericImageView, Rgb, RgbImage, Rgba};

use genpdf::elements::{Image, Paragraph};
use genpdf::error::{Context as _, Error};
use genpdf::style::{Color, Style, StyledString};
use genpdf::{render, Alignment, Element, Mm, Position, RenderResult, Scale, Size};

use crate::builder::PageTracker;
use crate::richtext::StyledSpan;

/// Brand blue used for the clinic name, title, headings and header rule.
pub const BRAND_BLUE: Color = Color::Rgb(0x1e, 0x40, 0xaf);
/// Colour of the footer rule.
pub const RULE_GREY: Color = Color::Rgb(0xcc, 0xcc, 0xcc);
/// Colour of the footer text.
pub const FOOTER_GREY: Color = Color::Rgb(0x66, 0x66, 0x66);
/// Colour of the closing notice.
pub const NOTICE_GREY: Color = Color::Rgb(0x6b, 0x72, 0x80);

/// Largest logo width in the letterhead.
pub const LOGO_MAX_WIDTH_MM: f64 = 42.0;
/// Largest logo height in the letterhead.
pub const LOGO_MAX_HEIGHT_MM: f64 = 21.0;

const DEFAULT_IMAGE_DPI: f64 = 300.0;
const MM_PER_INCH: f64 = 25.4;
const DEFAULT_UNDERLINE_OFFSET_MM: f64 = 0.6;
const LETTERHEAD_HEIGHT_MM: f64 = 30.0;
const LETTERHEAD_TITLE_OFFSET_MM: f64 = 7.0;
const LETTERHEAD_RULE_OFFSET_MM: f64 = 26.0;
const CLINIC_NAME_FONT_SIZE: u8 = 18;
const FOOTER_FONT_SIZE: u8 = 9;
const FOOTER_TEXT_OFFSET_MM: f64 = 2.5;

pub(crate) fn mm_from_f64(value: f64) -> Mm {
    Mm::from(printpdf::Mm(value))
}

/// Loads an image from in-memory bytes using the [`image`] crate with descriptive errors.
pub fn decode_image_from_bytes(bytes: impl AsRef<[u8]>) -> Result<DynamicImage, Error> {
    image::load_from_memory(bytes.as_ref()).context("Failed to decode image from provided bytes")
}

/// Converts the image into 8-bit RGB, compositing transparent pixels onto white.
///
/// The PDF backend cannot embed alpha channels.
pub fn flatten_onto_white(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => image,
        other if other.color().has_alpha() => {
            let rgba = other.to_rgba8();
            let (width, height) = rgba.dimensions();
            DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
                let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
                let alpha = u16::from(a);
                let blend = |channel: u8| -> u8 {
                    ((u16::from(channel) * alpha + 255 * (255 - alpha)) / 255) as u8
                };
                Rgb([blend(r), blend(g), blend(b)])
            }))
        }
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Physical size of `image` when embedded at `dpi`.
fn estimated_image_size(image: &DynamicImage, dpi: f64) -> (f64, f64) {
    let (px_width, px_height) = image.dimensions();
    (
        MM_PER_INCH * f64::from(px_width) / dpi,
        MM_PER_INCH * f64::from(px_height) / dpi,
    )
}

/// A decoded clinic logo scaled to fit the letterhead box.
#[derive(Clone, Debug)]
pub struct LogoImage {
    image: DynamicImage,
    scale: f64,
}

impl LogoImage {
    /// Decodes `bytes` and fits the result into the letterhead logo box.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self, Error> {
        let image = flatten_onto_white(decode_image_from_bytes(bytes)?);
        Ok(Self::fitted(image, LOGO_MAX_WIDTH_MM, LOGO_MAX_HEIGHT_MM))
    }

    /// Wraps `image`, scaled uniformly so it fits within `max_width_mm` × `max_height_mm`.
    pub fn fitted(image: DynamicImage, max_width_mm: f64, max_height_mm: f64) -> Self {
        let (width, height) = estimated_image_size(&image, DEFAULT_IMAGE_DPI);
        let scale = if width > f64::EPSILON && height > f64::EPSILON {
            (max_width_mm / width).min(max_height_mm / height)
        } else {
            1.0
        };
        Self { image, scale }
    }

    /// Rendered size in millimetres.
    pub fn rendered_size_mm(&self) -> (f64, f64) {
        let (width, height) = estimated_image_size(&self.image, DEFAULT_IMAGE_DPI);
        (width * self.scale, height * self.scale)
    }

    fn to_element(&self) -> Result<Image, Error> {
        let mut image = Image::from_dynamic_image(self.image.clone())?;
        image.set_alignment(Alignment::Left);
        image.set_scale(Scale::new(self.scale, self.scale));
        Ok(image)
    }
}

/// Page header: logo on the left, clinic name centred, brand rule underneath.
pub struct Letterhead {
    clinic_name: String,
    logo: Option<LogoImage>,
}

impl Letterhead {
    /// Creates a letterhead for `clinic_name` with an optional logo.
    pub fn new(clinic_name: impl Into<String>, logo: Option<LogoImage>) -> Self {
        Self {
            clinic_name: clinic_name.into(),
            logo,
        }
    }
}

impl Element for Letterhead {
    fn render(
        &mut self,
        context: &genpdf::Context,
        area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        let width = area.size().width;

        if let Some(logo) = &self.logo {
            logo.to_element()?.render(context, area.clone(), style)?;
        }

        let mut title_area = area.clone();
        title_area.add_offset(Position::new(0, mm_from_f64(LETTERHEAD_TITLE_OFFSET_MM)));
        let title_style = Style::new()
            .bold()
            .with_font_size(CLINIC_NAME_FONT_SIZE)
            .with_color(BRAND_BLUE);
        let mut title = Paragraph::new(StyledString::new(self.clinic_name.clone(), title_style));
        title.set_alignment(Alignment::Center);
        title.render(context, title_area, style)?;

        let rule = mm_from_f64(LETTERHEAD_RULE_OFFSET_MM);
        area.draw_line(
            vec![Position::new(0, rule), Position::new(width, rule)],
            Style::new().with_color(BRAND_BLUE),
        );

        let mut result = RenderResult::default();
        result.size = Size::new(width, mm_from_f64(LETTERHEAD_HEIGHT_MM));
        Ok(result)
    }
}

/// Page footer: grey rule, generation stamp and page number, all centred.
pub struct PageFooter {
    stamp: String,
    page: usize,
}

impl PageFooter {
    /// Creates the footer for `page`.
    pub fn new(stamp: impl Into<String>, page: usize) -> Self {
        Self {
            stamp: stamp.into(),
            page,
        }
    }
}

impl Element for PageFooter {
    fn render(
        &mut self,
        context: &genpdf::Context,
        area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        let width = area.size().width;
        area.draw_line(
            vec![Position::new(0, 0), Position::new(width, 0)],
            Style::new().with_color(RULE_GREY),
        );

        let text_style = Style::new()
            .with_font_size(FOOTER_FONT_SIZE)
            .with_color(FOOTER_GREY);
        let offset = mm_from_f64(FOOTER_TEXT_OFFSET_MM);
        let mut line_area = area.clone();
        line_area.add_offset(Position::new(0, offset));

        let mut result = RenderResult::default();
        result.size = Size::new(width, offset);

        for line in [self.stamp.clone(), format!("Page {}", self.page)] {
            let mut paragraph = Paragraph::new(StyledString::new(line, text_style));
            paragraph.set_alignment(Alignment::Center);
            let line_result = paragraph.render(context, line_area.clone(), style)?;
            line_area.add_offset(Position::new(0, line_result.size.height));
            result.size = result.size.stack_vertical(line_result.size);
            result.has_more |= line_result.has_more;
        }

        Ok(result)
    }
}

/// A single line of styled text with optional underlines, used for section headings.
pub struct UnderlinedText {
    spans: Vec<StyledSpan>,
    underline_offset: Mm,
}

impl UnderlinedText {
    /// Creates a new underlined text element from the provided spans.
    pub fn new(spans: Vec<StyledSpan>) -> Self {
        Self {
            spans,
            underline_offset: mm_from_f64(DEFAULT_UNDERLINE_OFFSET_MM),
        }
    }
}

impl Element for UnderlinedText {
    fn render(
        &mut self,
        context: &genpdf::Context,
        area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        let mut prepared: Vec<(StyledString, bool, Mm)> = Vec::with_capacity(self.spans.len());
        let mut total_width = Mm::default();
        let mut line_height = style.line_height(&context.font_cache);
        let mut glyph_height = Mm::default();

        for span in &self.spans {
            let mut string = span.string.clone();
            string.style = style.and(string.style);
            let width = string.width(&context.font_cache);
            total_width += width;
            line_height = line_height.max(string.style.line_height(&context.font_cache));
            glyph_height = glyph_height.max(
                string
                    .style
                    .font(&context.font_cache)
                    .glyph_height(string.style.font_size()),
            );
            prepared.push((string, span.underline, width));
        }

        let mut result = RenderResult::default();
        if line_height > area.size().height {
            result.has_more = true;
            return Ok(result);
        }

        match area.text_section(&context.font_cache, Position::new(0, 0), style) {
            Some(mut section) => {
                for (string, _, _) in &prepared {
                    section.print_str(&string.s, string.style)?;
                }
            }
            None => {
                result.has_more = true;
                return Ok(result);
            }
        }

        let baseline = glyph_height + self.underline_offset;
        let mut cursor = Mm::default();
        for (string, underline, width) in &prepared {
            if *underline {
                let mut line_style = Style::new();
                if let Some(color) = string.style.color().or(style.color()) {
                    line_style = line_style.with_color(color);
                }
                area.draw_line(
                    vec![
                        Position::new(cursor, baseline),
                        Position::new(cursor + *width, baseline),
                    ],
                    line_style,
                );
            }
            cursor += *width;
        }

        result.size = Size::new(total_width, line_height);
        Ok(result)
    }
}

/// Records the page on which the wrapped element first puts content.
///
/// Content that does not fit and is pushed to the next page is attributed to that page.
pub struct PageMarker<E: Element> {
    element: E,
    tracker: PageTracker,
    section: usize,
    marked: bool,
}

impl<E: Element> PageMarker<E> {
    /// Wraps `element`, reporting its start page for `section` to `tracker`.
    pub fn new(element: E, tracker: PageTracker, section: usize) -> Self {
        Self {
            element,
            tracker,
            section,
            marked: false,
        }
    }
}

impl<E: Element> Element for PageMarker<E> {
    fn render(
        &mut self,
        context: &genpdf::Context,
        area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        let result = self.element.render(context, area, style)?;
        if !self.marked && (result.size.height > Mm::default() || !result.has_more) {
            self.tracker.mark_section(self.section);
            self.marked = true;
        }
        Ok(result)
    }
}
