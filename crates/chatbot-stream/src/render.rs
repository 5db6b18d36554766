//! Markdown to sanitized HTML conversion.
//!
//! Assistant output is Markdown. Every frame re-renders the whole
//! accumulated text, so rendering is a pure function of its input. The
//! result is inserted into a page as rich content, so raw HTML in the
//! source is escaped rather than passed through, and link targets with
//! script-capable schemes are dropped.

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag};

use crate::error::{Result, StreamError};

/// URL schemes allowed in link and image destinations.
const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Replacement for rejected destinations.
const NEUTRAL_URL: &str = "#";

/// Converts accumulated assistant text into display markup.
pub trait ContentRenderer: Send + Sync {
    /// Render the full accumulated text.
    ///
    /// Implementations must be idempotent and must not let unescaped
    /// script content through.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Render` if the text cannot be rendered.
    fn render(&self, accumulated: &str) -> Result<String>;
}

/// CommonMark renderer (with tables and strikethrough) producing safe HTML.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    options: Options,
    max_input_bytes: usize,
}

impl MarkdownRenderer {
    /// Create a renderer that accepts at most `max_input_bytes` of input.
    #[must_use]
    pub fn new(max_input_bytes: usize) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        Self {
            options,
            max_input_bytes,
        }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl ContentRenderer for MarkdownRenderer {
    fn render(&self, accumulated: &str) -> Result<String> {
        if accumulated.len() > self.max_input_bytes {
            return Err(StreamError::Render(format!(
                "response is {} bytes, limit is {}",
                accumulated.len(),
                self.max_input_bytes
            )));
        }

        let parser = Parser::new_ext(accumulated, self.options).map(sanitize_event);
        let mut html = String::with_capacity(accumulated.len() + accumulated.len() / 2);
        pulldown_cmark::html::push_html(&mut html, parser);
        Ok(html)
    }
}

/// Rewrite events that could carry active content.
fn sanitize_event(event: Event<'_>) -> Event<'_> {
    match event {
        // Text events are escaped by the HTML writer.
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: neutralize(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: neutralize(dest_url),
            title,
            id,
        }),
        other => other,
    }
}

fn neutralize(url: CowStr<'_>) -> CowStr<'_> {
    if is_safe_url(&url) {
        url
    } else {
        CowStr::Borrowed(NEUTRAL_URL)
    }
}

/// Whether `url` is relative or uses an allowed scheme.
///
/// Browsers ignore whitespace and control characters inside a scheme, so
/// they are stripped before comparing.
fn is_safe_url(url: &str) -> bool {
    let compact: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();

    match compact.find([':', '/', '?', '#']) {
        Some(i) if compact[i..].starts_with(':') => SAFE_SCHEMES.contains(&&compact[..i]),
        _ => true,
    }
}
