//! Markdown checklists laid out as a single-column PDF.
//!
//! Output is PDF 1.4 using the standard Helvetica faces, so no font data is
//! embedded. Text is encoded as WinAnsi; characters it cannot represent
//! become `?`.

use std::fmt::Write as _;

use comrak::nodes::{AstNode, NodeValue};
use comrak::{Arena, Options, parse_document};

// US letter, in points.
const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN: u32 = 54;
const INDENT: u32 = 18;
const BODY_SIZE: u32 = 11;

/// One logical line of the document before wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Line {
    pub text: String,
    pub size: u32,
    pub bold: bool,
    /// List nesting level.
    pub depth: u32,
}

impl Line {
    fn body(text: String, depth: u32) -> Self {
        Self {
            text,
            size: BODY_SIZE,
            bold: false,
            depth,
        }
    }
}

/// Flatten a markdown document into printable lines.
pub(super) fn lines_from_markdown(markdown: &str, options: &Options) -> Vec<Line> {
    let arena = Arena::new();
    let root = parse_document(&arena, markdown, options);

    let mut lines = Vec::new();
    for node in root.descendants() {
        let data = node.data();
        match &data.value {
            NodeValue::Heading(heading) => lines.push(Line {
                text: inline_text(node),
                size: heading_size(heading.level),
                bold: true,
                depth: 0,
            }),
            NodeValue::Paragraph => {
                let depth = list_depth(node);
                let text = format!("{}{}", item_marker(node), inline_text(node));
                lines.push(Line::body(text, depth));
            }
            NodeValue::CodeBlock(code) => {
                let depth = list_depth(node) + 1;
                lines.extend(code.literal.lines().map(|l| Line::body(l.to_owned(), depth)));
            }
            NodeValue::TableRow(_) => {
                let cells: Vec<String> = node.children().map(inline_text).collect();
                lines.push(Line::body(cells.join(" | "), 0));
            }
            NodeValue::ThematicBreak => lines.push(Line::body(String::new(), 0)),
            _ => {}
        }
    }
    lines
}

/// Lay `lines` out on as many pages as needed.
pub(super) fn render(title: &str, lines: &[Line]) -> Vec<u8> {
    let pages = paginate(lines);
    let page_count = u32::try_from(pages.len()).unwrap_or(u32::MAX);

    let mut objects: Vec<Vec<u8>> = Vec::with_capacity(5 + pages.len() * 2);
    let kids: Vec<String> = (0..page_count).map(|i| format!("{} 0 R", 6 + i * 2)).collect();

    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
    objects.push(
        format!("<< /Type /Pages /Kids [{}] /Count {page_count} >>", kids.join(" ")).into_bytes(),
    );
    objects.push(font_object("Helvetica"));
    objects.push(font_object("Helvetica-Bold"));
    objects.push(format!("<< /Title ({}) /Producer (ChecklistPro) >>", encode_text(title)).into_bytes());

    for (i, content) in (0..page_count).zip(&pages) {
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                7 + i * 2
            )
            .into_bytes(),
        );
        let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        stream.extend_from_slice(content.as_bytes());
        stream.extend_from_slice(b"\nendstream");
        objects.push(stream);
    }

    let mut out = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (number, body) in (1..).zip(&objects) {
        offsets.push(out.len());
        out.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_at = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = writeln!(xref, "{offset:010} 00000 n ");
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R /Info 5 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
        objects.len() + 1
    );
    out.extend_from_slice(xref.as_bytes());
    out
}

fn font_object(base: &str) -> Vec<u8> {
    format!("<< /Type /Font /Subtype /Type1 /BaseFont /{base} /Encoding /WinAnsiEncoding >>")
        .into_bytes()
}

/// Content streams, one per page. Always at least one page.
fn paginate(lines: &[Line]) -> Vec<String> {
    let top = PAGE_HEIGHT - MARGIN;
    let mut pages = Vec::new();
    let mut page = String::new();
    let mut y = top;

    for line in lines {
        let leading = line.size * 3 / 2;
        let gap = if line.bold { line.size / 2 } else { 0 };
        let x = MARGIN + line.depth * INDENT;
        let font = if line.bold { "F2" } else { "F1" };

        for (n, segment) in wrap(&line.text, max_chars(line)).into_iter().enumerate() {
            let needed = leading + if n == 0 { gap } else { 0 };
            if y < MARGIN + needed {
                pages.push(std::mem::take(&mut page));
                y = top;
            }
            y -= needed;
            if !segment.is_empty() {
                let _ = writeln!(
                    page,
                    "BT /{font} {} Tf {x} {y} Td ({}) Tj ET",
                    line.size,
                    encode_text(&segment)
                );
            }
        }
    }

    pages.push(page);
    pages
}

/// Characters that fit on one line, taking Helvetica's average glyph as
/// half the font size.
fn max_chars(line: &Line) -> usize {
    let width = PAGE_WIDTH.saturating_sub(2 * MARGIN + line.depth * INDENT);
    let chars = (width * 2 / line.size.max(1)).max(10);
    usize::try_from(chars).unwrap_or(usize::MAX)
}

fn wrap(text: &str, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > max {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    out.push(current);
    out
}

/// PDF string body for `text`, escaped and mapped to WinAnsi.
fn encode_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{2022}' => out.push_str("\\225"),
            '\u{a0}'..='\u{ff}' => {
                let _ = write!(out, "\\{:03o}", u32::from(c));
            }
            '\t' => out.push(' '),
            _ => out.push('?'),
        }
    }
    out
}

fn heading_size(level: u8) -> u32 {
    match level {
        1 => 20,
        2 => 16,
        3 => 13,
        _ => 12,
    }
}

fn inline_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    for n in node.descendants() {
        match &n.data().value {
            NodeValue::Text(t) => text.push_str(t),
            NodeValue::Code(code) => text.push_str(&code.literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => text.push(' '),
            _ => {}
        }
    }
    text
}

/// Checkbox or bullet for the first paragraph of a list item.
fn item_marker<'a>(node: &'a AstNode<'a>) -> &'static str {
    if node.previous_sibling().is_some() {
        return "";
    }
    let Some(parent) = node.parent() else {
        return "";
    };
    match &parent.data().value {
        NodeValue::TaskItem(task) if task.symbol.is_some() => "[x] ",
        NodeValue::TaskItem(_) => "[ ] ",
        NodeValue::Item(_) => "- ",
        _ => "",
    }
}

fn list_depth<'a>(node: &'a AstNode<'a>) -> u32 {
    let lists = node
        .ancestors()
        .filter(|n| matches!(n.data().value, NodeValue::List(_)))
        .count();
    u32::try_from(lists.saturating_sub(1)).unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn options() -> Options<'static> {
        let mut options = Options::default();
        options.extension.tasklist = true;
        options.extension.table = true;
        options
    }

    #[test]
    fn test_lines_follow_document_structure() {
        let markdown = "# Food Truck Launch\n\nBefore opening day.\n\n\
                        - [ ] Book commissary kitchen\n- [x] Order wrap\n  - Nested step\n";
        let lines = lines_from_markdown(markdown, &options());
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();

        assert_eq!(
            texts,
            vec![
                "Food Truck Launch",
                "Before opening day.",
                "[ ] Book commissary kitchen",
                "[x] Order wrap",
                "- Nested step",
            ]
        );
        assert!(lines[0].bold);
        assert_eq!(lines[0].size, 20);
        assert_eq!(lines[4].depth, 1);
    }

    #[test]
    fn test_render_produces_pdf_with_source_text() {
        let lines = lines_from_markdown("# Clinic Setup (v2)\n\n- [ ] Hire staff\n", &options());
        let pdf = render("Clinic Setup", &lines);
        let text = String::from_utf8_lossy(&pdf);

        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(text.trim_end().ends_with("%%EOF"));
        assert!(text.contains("(Clinic Setup \\(v2\\)) Tj"));
        assert!(text.contains("([ ] Hire staff) Tj"));
        assert!(text.contains("/Count 1"));
    }

    #[test]
    fn test_long_documents_span_pages() {
        let markdown: String = (0..120).map(|i| format!("- [ ] Task number {i}\n")).collect();
        let pdf = render("Long", &lines_from_markdown(&markdown, &options()));
        let text = String::from_utf8_lossy(&pdf);

        assert!(text.matches("/Type /Page ").count() > 1);
        assert!(text.contains("([ ] Task number 119) Tj"));
    }

    #[test]
    fn test_wrap_breaks_on_whitespace() {
        assert_eq!(wrap("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap("", 10), vec![""]);
    }

    #[test]
    fn test_text_is_escaped_for_winansi() {
        assert_eq!(encode_text("a(b)\\c"), "a\\(b\\)\\\\c");
        assert_eq!(encode_text("caf\u{e9} \u{2014} \u{1F600}"), "caf\\351 - ?");
    }
}
