//! Generated downloads for products whose stored file is missing.
//!
//! Tried in order: derive the requested format from the product's markdown
//! source (HTML, PDF or plain text), then fall back to a placeholder built
//! from product metadata.
//! Nothing here is cached; every download regenerates.

use std::fmt::Write as _;
use std::path::Path;

use comrak::{Options, markdown_to_html};

use crate::models::Product;

use super::{DownloadFile, DownloadSource, content_type_for, pdf, resolve_reference};

/// Formats that can be produced from a markdown source.
const MARKDOWN_FORMATS: &[&str] = &["markdown", "md"];

/// Build a download for `format` without its stored file.
pub(super) async fn generate(
    root: &Path,
    product: &Product,
    format: &str,
    filename: String,
) -> DownloadFile {
    if let Some(markdown) = read_markdown_source(root, product, format).await
        && let Some(file) = derive_from_markdown(&markdown, format, &product.name, &filename)
    {
        tracing::info!(product_id = %product.id, %format, "Generated download from markdown");
        return file;
    }

    tracing::info!(product_id = %product.id, %format, "Serving placeholder download");
    DownloadFile {
        filename,
        content_type: "text/plain; charset=utf-8",
        body: placeholder(product).into_bytes(),
        source: DownloadSource::Placeholder,
    }
}

/// Markdown source for a product: an explicit markdown format, or the
/// requested file's sibling with an `.md` extension.
async fn read_markdown_source(root: &Path, product: &Product, format: &str) -> Option<String> {
    let reference = MARKDOWN_FORMATS
        .iter()
        .find_map(|f| product.formats.get(*f).cloned())
        .or_else(|| {
            product.formats.get(format).map(|r| {
                Path::new(r)
                    .with_extension("md")
                    .to_string_lossy()
                    .into_owned()
            })
        })?;

    let path = resolve_reference(root, &reference).ok()?;
    match tokio::fs::read_to_string(&path).await {
        Ok(markdown) => Some(markdown),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "No markdown source");
            None
        }
    }
}

fn derive_from_markdown(
    markdown: &str,
    format: &str,
    title: &str,
    filename: &str,
) -> Option<DownloadFile> {
    let (content_type, body) = match format {
        "html" => ("text/html; charset=utf-8", markdown_to_html(markdown, &options()).into_bytes()),
        "pdf" => {
            let lines = pdf::lines_from_markdown(markdown, &options());
            ("application/pdf", pdf::render(title, &lines))
        }
        "txt" | "text" => ("text/plain; charset=utf-8", markdown.as_bytes().to_vec()),
        "markdown" | "md" => (content_type_for(filename), markdown.as_bytes().to_vec()),
        _ => return None,
    };

    Some(DownloadFile {
        filename: filename.to_owned(),
        content_type,
        body,
        source: DownloadSource::Generated,
    })
}

fn options() -> Options<'static> {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options
}

/// Sample checklist assembled from product metadata.
fn placeholder(product: &Product) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", product.name);
    let _ = writeln!(out, "Last Updated: {}\n", product.updated_at.format("%Y-%m-%d"));
    let _ = writeln!(out, "## Description\n{}\n", product.description);

    if !product.features.is_empty() {
        out.push_str("## Features Included\n");
        for feature in &product.features {
            let _ = writeln!(out, "- {feature}");
        }
        out.push('\n');
    }

    out.push_str(SAMPLE_CHECKLIST);
    out
}

const SAMPLE_CHECKLIST: &str = "\
## Main Checklist

### Phase 1: Planning and Research
- [ ] Define your concept and unique value proposition
- [ ] Research target market and competition
- [ ] Create business plan and financial projections
- [ ] Identify startup costs and funding sources

### Phase 2: Legal and Regulatory
- [ ] Choose business structure (LLC, Corporation, etc.)
- [ ] Register business name and obtain EIN
- [ ] Apply for necessary permits and licenses
- [ ] Set up business bank accounts
- [ ] Obtain required insurance policies

### Phase 3: Operations Setup
- [ ] Secure location or equipment
- [ ] Set up supplier relationships
- [ ] Develop standard operating procedures
- [ ] Create quality control systems
- [ ] Implement inventory management

### Phase 4: Marketing and Launch
- [ ] Develop brand identity and materials
- [ ] Create website and social media presence
- [ ] Plan grand opening or launch event
- [ ] Implement customer feedback system
- [ ] Begin operations and iterate based on feedback

---

This is a sample checklist. The full version includes:
- Detailed sub-checklists for each phase
- Templates and forms
- Resource links
- Common pitfalls to avoid
- Industry-specific guidance

## License
This checklist is licensed under CC BY 4.0. You are free to use, modify, and share it.
";

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_html_is_rendered_from_markdown() {
        let file = derive_from_markdown("# Title\n\n- [ ] item", "html", "List", "list.html").unwrap();
        let html = String::from_utf8(file.body).unwrap();
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("checkbox"));
        assert_eq!(file.source, DownloadSource::Generated);
    }

    #[test]
    fn test_pdf_is_rendered_from_markdown() {
        let file = derive_from_markdown(
            "# Real Truck Checklist\n\n- [ ] Book commissary kitchen\n",
            "pdf",
            "Food Truck Launch",
            "truck.pdf",
        )
        .unwrap();
        let body = String::from_utf8_lossy(&file.body);
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.source, DownloadSource::Generated);
        assert!(body.starts_with("%PDF-"));
        assert!(body.contains("(Real Truck Checklist) Tj"));
        assert!(body.contains("([ ] Book commissary kitchen) Tj"));
        assert!(body.contains("/Title (Food Truck Launch)"));
    }

    #[test]
    fn test_office_formats_are_not_derivable() {
        assert!(derive_from_markdown("# Title", "docx", "List", "list.docx").is_none());
        assert!(derive_from_markdown("# Title", "xlsx", "List", "list.xlsx").is_none());
    }
}
