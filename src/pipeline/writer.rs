//! Report writing: ordered sections → PDF bytes.
//!
//! [`ReportWriter`] is the seam the assembler writes through. A writer hands
//! out one [`ReportDraft`] per report; sections are appended in order and
//! `finish` serialises the whole document into any `io::Write`. The draft
//! never touches the destination path, so publishing stays the assembler's
//! job.
//!
//! [`PdfReportWriter`] is the production implementation over `lopdf`:
//!
//! ```text
//!  ┌──────────── A4 (595 × 842 pt) ─────────────┐
//!  │            running header (page > 1)        │
//!  │ Section n: Technical Data                   │
//!  │ ┌──────────────────────┐                    │
//!  │ │ page image, 120 mm   │                    │
//!  │ │ wide, ≤ 80 mm tall   │                    │
//!  │ └──────────────────────┘                    │
//!  │ Source: plan.pdf, page 2                    │
//!  │ body text, wrapped …                        │
//!  │ … continues on further pages if needed      │
//!  └─────────────────────────────────────────────┘
//! ```
//!
//! Layout is computed by [`layout_section`] as plain data before any PDF
//! object is created, which keeps pagination testable without a PDF parser.

use crate::error::WriteError;
use crate::pipeline::sanitize::{sanitize_for_report, to_winansi_bytes, winansi_byte, PLACEHOLDER};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One unit's contribution to the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    /// e.g. `Section 3: Technical Data`.
    pub heading: String,
    /// Names the source of the page image.
    pub caption: String,
    /// Page image to embed.
    pub image_path: PathBuf,
    /// Sanitized body text.
    pub body: String,
}

/// Produces report drafts.
pub trait ReportWriter: Send + Sync {
    fn begin_report(&self, title: &str) -> Box<dyn ReportDraft>;
}

/// A report under construction.
pub trait ReportDraft: Send {
    /// Append a section after all previously added ones.
    fn add_section(&mut self, section: &ReportSection) -> Result<(), WriteError>;

    /// Serialise the report into `out`.
    fn finish(self: Box<Self>, out: &mut dyn Write) -> Result<(), WriteError>;
}

// ── Geometry (PDF points, origin bottom-left) ────────────────────────────────

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;

const fn mm(v: i64) -> i64 {
    v * 72 * 10 / 254
}

const MARGIN_X: i64 = mm(10);
const MARGIN_BOTTOM: i64 = mm(20);
const RUNNING_HEADER_Y: i64 = PAGE_HEIGHT - mm(12);
const HEADING_Y: i64 = PAGE_HEIGHT - mm(20);
const IMAGE_TOP: i64 = PAGE_HEIGHT - mm(25);
const IMAGE_BOX_WIDTH: i64 = mm(120);
const IMAGE_BOX_HEIGHT: i64 = mm(80);
const CAPTION_Y: i64 = PAGE_HEIGHT - mm(110);
const BODY_TOP: i64 = PAGE_HEIGHT - mm(117);
const CONTINUATION_BODY_TOP: i64 = PAGE_HEIGHT - mm(25);

const HEADER_SIZE: i64 = 12;
const HEADING_SIZE: i64 = 14;
const CAPTION_SIZE: i64 = 9;
const BODY_SIZE: i64 = 10;
const LINE_HEIGHT: i64 = 14;

/// Printable width between the side margins, in points.
pub const BODY_WIDTH: i64 = PAGE_WIDTH - 2 * MARGIN_X;

/// Typeface of a text mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
}

impl Face {
    fn resource_name(self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
        }
    }

    fn widths(self) -> &'static [u16; 256] {
        match self {
            Face::Regular => &HELVETICA_WIDTHS,
            Face::Bold => &HELVETICA_BOLD_WIDTHS,
        }
    }

    /// Advance width of `c` in thousandths of an em, as it will be encoded.
    fn advance(self, c: char) -> i64 {
        let code = winansi_byte(c).unwrap_or(PLACEHOLDER as u8);
        i64::from(self.widths()[usize::from(code)])
    }
}

/// Rendered width of `text` at `size` points, in thousandths of a point.
pub fn text_width(text: &str, face: Face, size: i64) -> i64 {
    text.chars().map(|c| face.advance(c)).sum::<i64>() * size
}

// Advance widths from the Adobe core-14 AFM files, indexed by WinAnsi code.
// Undefined codes are zero.

const HELVETICA_WIDTHS: [u16; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, 0,
    556, 0, 222, 556, 333, 1000, 556, 556, 333, 1000, 667, 333, 1000, 0, 611, 0,
    0, 222, 222, 333, 333, 350, 556, 1000, 333, 1000, 500, 333, 944, 0, 500, 667,
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500,
];

const HELVETICA_BOLD_WIDTHS: [u16; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, 0,
    556, 0, 278, 556, 500, 1000, 556, 556, 333, 1000, 667, 333, 1000, 0, 611, 0,
    0, 278, 278, 500, 500, 350, 556, 1000, 333, 1000, 556, 333, 944, 0, 500, 667,
    278, 333, 556, 556, 556, 556, 280, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    400, 584, 333, 333, 333, 611, 556, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    722, 722, 722, 722, 722, 722, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    556, 556, 556, 556, 556, 556, 889, 556, 556, 556, 556, 556, 278, 278, 278, 278,
    611, 611, 611, 611, 611, 611, 611, 584, 611, 611, 611, 611, 611, 556, 611, 556,
];

/// Something drawn on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mark {
    Text {
        x: i64,
        y: i64,
        face: Face,
        size: i64,
        text: String,
    },
    /// The section image, scaled into `width × height` with its lower-left
    /// corner at `(x, y)`.
    Image { x: i64, y: i64, width: i64, height: i64 },
}

/// Marks for one physical page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLayout {
    pub marks: Vec<Mark>,
}

impl PageLayout {
    /// All text on the page, one entry per mark.
    pub fn text_lines(&self) -> impl Iterator<Item = &str> {
        self.marks.iter().filter_map(|m| match m {
            Mark::Text { text, .. } => Some(text.as_str()),
            Mark::Image { .. } => None,
        })
    }
}

/// What is known about the section image when laying it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSlot {
    /// Pixel dimensions of a decodable image.
    Sized { width: u32, height: u32 },
    /// The image could not be decoded; a notice is printed instead.
    Unavailable(String),
}

/// Lay out one section.
///
/// `first_in_report` suppresses the running header on the report's first
/// page. Returns one [`PageLayout`] per physical page; the first page holds
/// heading, image and caption, any further page carries the running header
/// and body overflow only.
pub fn layout_section(
    section: &ReportSection,
    title: &str,
    image: &ImageSlot,
    first_in_report: bool,
) -> Vec<PageLayout> {
    let mut first = PageLayout::default();
    if !first_in_report {
        first.marks.push(running_header(title));
    }
    first.marks.push(Mark::Text {
        x: MARGIN_X,
        y: HEADING_Y,
        face: Face::Bold,
        size: HEADING_SIZE,
        text: sanitize_for_report(&section.heading),
    });

    match image {
        ImageSlot::Sized { width, height } => {
            let (w, h) = fit_image(*width, *height);
            first.marks.push(Mark::Image {
                x: MARGIN_X,
                y: IMAGE_TOP - h,
                width: w,
                height: h,
            });
        }
        ImageSlot::Unavailable(reason) => {
            first.marks.push(Mark::Text {
                x: MARGIN_X,
                y: IMAGE_TOP - LINE_HEIGHT,
                face: Face::Regular,
                size: BODY_SIZE,
                text: sanitize_for_report(&format!("[Image unavailable: {reason}]")),
            });
        }
    }

    first.marks.push(Mark::Text {
        x: MARGIN_X,
        y: CAPTION_Y,
        face: Face::Regular,
        size: CAPTION_SIZE,
        text: sanitize_for_report(&format!("Source: {}", section.caption)),
    });

    let mut pages = vec![first];
    let mut y = BODY_TOP;
    for line in wrap_text(&section.body, Face::Regular, BODY_SIZE, BODY_WIDTH) {
        if y < MARGIN_BOTTOM {
            let mut page = PageLayout::default();
            page.marks.push(running_header(title));
            pages.push(page);
            y = CONTINUATION_BODY_TOP;
        }
        if !line.is_empty() {
            if let Some(page) = pages.last_mut() {
                page.marks.push(Mark::Text {
                    x: MARGIN_X,
                    y,
                    face: Face::Regular,
                    size: BODY_SIZE,
                    text: line,
                });
            }
        }
        y -= LINE_HEIGHT;
    }
    pages
}

fn running_header(title: &str) -> Mark {
    let text = sanitize_for_report(title);
    let width = text_width(&text, Face::Bold, HEADER_SIZE) / 1000;
    Mark::Text {
        x: ((PAGE_WIDTH - width) / 2).max(MARGIN_X),
        y: RUNNING_HEADER_Y,
        face: Face::Bold,
        size: HEADER_SIZE,
        text,
    }
}

/// Scale `width × height` pixels to the presentation width, shrinking
/// further if that would exceed the box height. Aspect ratio is kept.
fn fit_image(width: u32, height: u32) -> (i64, i64) {
    let (w, h) = (i64::from(width.max(1)), i64::from(height.max(1)));
    let scaled_h = IMAGE_BOX_WIDTH * h / w;
    if scaled_h <= IMAGE_BOX_HEIGHT {
        (IMAGE_BOX_WIDTH, scaled_h.max(1))
    } else {
        ((IMAGE_BOX_HEIGHT * w / h).max(1), IMAGE_BOX_HEIGHT)
    }
}

/// Greedy word wrap to `max_width` points, measured with `face` at `size`.
///
/// Each input line is wrapped independently; blank lines are kept; leading
/// indentation is kept on the first wrapped line (at most half the width);
/// words wider than a line are split.
pub fn wrap_text(text: &str, face: Face, size: i64, max_width: i64) -> Vec<String> {
    let limit = max_width.max(1) * 1000;
    let space = face.advance(' ') * size;
    let mut out = Vec::new();

    for raw in text.split('\n') {
        let trimmed = raw.trim_start();
        if trimmed.is_empty() {
            out.push(String::new());
            continue;
        }
        let indent = (raw.len() - trimmed.len()).min((limit / 2 / space.max(1)) as usize);
        let mut current = " ".repeat(indent);
        let mut current_w = indent as i64 * space;
        let mut has_word = false;

        for word in trimmed.split_whitespace() {
            let mut word = word.to_string();
            loop {
                let sep = if has_word { space } else { 0 };
                let word_w = text_width(&word, face, size);
                if current_w + sep + word_w <= limit {
                    if has_word {
                        current.push(' ');
                    }
                    current.push_str(&word);
                    current_w += sep + word_w;
                    has_word = true;
                    break;
                }
                if has_word {
                    out.push(std::mem::take(&mut current));
                    current_w = 0;
                    has_word = false;
                    continue;
                }
                // Word alone exceeds the line: hard split, at least one char.
                let mut split = word.len();
                let mut w = current_w;
                for (i, c) in word.char_indices() {
                    let cw = face.advance(c) * size;
                    if i > 0 && w + cw > limit {
                        split = i;
                        break;
                    }
                    w += cw;
                }
                let rest = word.split_off(split);
                current.push_str(&word);
                out.push(std::mem::take(&mut current));
                current_w = 0;
                if rest.is_empty() {
                    break;
                }
                word = rest;
            }
        }
        if has_word {
            out.push(current);
        }
    }
    out
}

// ── lopdf implementation ─────────────────────────────────────────────────────

/// [`ReportWriter`] producing PDF 1.5 with the standard Helvetica fonts.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfReportWriter;

impl PdfReportWriter {
    pub fn new() -> Self {
        Self
    }
}

impl ReportWriter for PdfReportWriter {
    fn begin_report(&self, title: &str) -> Box<dyn ReportDraft> {
        Box::new(PdfDraft::new(title))
    }
}

struct PdfDraft {
    doc: Document,
    title: String,
    pages_id: ObjectId,
    regular_font: ObjectId,
    bold_font: ObjectId,
    page_ids: Vec<ObjectId>,
}

impl PdfDraft {
    fn new(title: &str) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular_font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold_font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        Self {
            doc,
            title: title.to_string(),
            pages_id,
            regular_font,
            bold_font,
            page_ids: Vec::new(),
        }
    }

    /// Decode the section image into an RGB XObject.
    fn embed_image(&mut self, section: &ReportSection) -> (ImageSlot, Option<ObjectId>) {
        let decoded = image::open(&section.image_path);
        match decoded {
            Ok(img) => {
                let rgb = img.to_rgb8();
                let (width, height) = rgb.dimensions();
                let mut stream = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => i64::from(width),
                        "Height" => i64::from(height),
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8_i64,
                    },
                    rgb.into_raw(),
                );
                if let Err(e) = stream.compress() {
                    warn!("Image '{}' left uncompressed: {}", section.image_path.display(), e);
                }
                let id = self.doc.add_object(stream);
                (ImageSlot::Sized { width, height }, Some(id))
            }
            Err(e) => {
                warn!(
                    "Image '{}' could not be embedded: {}",
                    section.image_path.display(),
                    e
                );
                (ImageSlot::Unavailable(e.to_string()), None)
            }
        }
    }

    fn add_page(&mut self, layout: &PageLayout, image: Option<ObjectId>) -> Result<(), WriteError> {
        let mut operations = Vec::new();
        let mut placed_image = None;

        for mark in &layout.marks {
            match mark {
                Mark::Text {
                    x,
                    y,
                    face,
                    size,
                    text,
                } => {
                    operations.push(Operation::new("BT", vec![]));
                    operations.push(Operation::new(
                        "Tf",
                        vec![face.resource_name().into(), (*size).into()],
                    ));
                    operations.push(Operation::new("Td", vec![(*x).into(), (*y).into()]));
                    operations.push(Operation::new(
                        "Tj",
                        vec![Object::string_literal(to_winansi_bytes(text))],
                    ));
                    operations.push(Operation::new("ET", vec![]));
                }
                Mark::Image {
                    x,
                    y,
                    width,
                    height,
                } => {
                    let Some(image_id) = image else {
                        continue;
                    };
                    placed_image = Some(image_id);
                    operations.push(Operation::new("q", vec![]));
                    operations.push(Operation::new(
                        "cm",
                        vec![
                            (*width).into(),
                            0_i64.into(),
                            0_i64.into(),
                            (*height).into(),
                            (*x).into(),
                            (*y).into(),
                        ],
                    ));
                    operations.push(Operation::new("Do", vec!["Im1".into()]));
                    operations.push(Operation::new("Q", vec![]));
                }
            }
        }

        let content = Content { operations }
            .encode()
            .map_err(|e| WriteError::Encode(e.to_string()))?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));

        let mut resources = dictionary! {
            "Font" => dictionary! {
                "F1" => self.regular_font,
                "F2" => self.bold_font,
            },
        };
        if let Some(image_id) = placed_image {
            resources.set("XObject", dictionary! { "Im1" => image_id });
        }

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.page_ids.push(page_id);
        Ok(())
    }
}

impl ReportDraft for PdfDraft {
    fn add_section(&mut self, section: &ReportSection) -> Result<(), WriteError> {
        let (slot, image_id) = self.embed_image(section);
        let first_in_report = self.page_ids.is_empty();
        let layouts = layout_section(section, &self.title, &slot, first_in_report);
        debug!("'{}' laid out on {} page(s)", section.heading, layouts.len());

        for layout in &layouts {
            self.add_page(layout, image_id)?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>, mut out: &mut dyn Write) -> Result<(), WriteError> {
        let kids: Vec<Object> = self.page_ids.iter().map(|id| (*id).into()).collect();
        let count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0_i64.into(), 0_i64.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let info_id = self.doc.add_object(dictionary! {
            "Title" => Object::string_literal(to_winansi_bytes(&sanitize_for_report(&self.title))),
            "Producer" => Object::string_literal(concat!("edgequake-pdf2report ", env!("CARGO_PKG_VERSION"))),
        });
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);

        self.doc.compress();
        self.doc
            .save_to(&mut out)
            .map_err(|e| WriteError::Encode(e.to_string()))?;
        out.flush()?;
        Ok(())
    }
}
