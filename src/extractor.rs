//! Main-content extraction for the reading overlay
//!
//! Two passes over an arbitrary HTML document:
//!
//! 1. A fixed, ordered list of "article container" selectors. The first
//!    element matched by each selector is accepted if it carries enough text.
//!    Order is priority.
//! 2. Otherwise the `div`/`section`/`p` with the most text, above a higher
//!    floor. Ties keep the earliest element in document order.
//!
//! The winner is re-serialized with page chrome, scripts, inline handlers,
//! inline styles and classes removed. If nothing qualifies, or too little
//! text survives sanitizing, a built-in placeholder document is returned so
//! the overlay is never empty.

use aho_corasick::AhoCorasick;
use anyhow::{anyhow, Result};
use scraper::{node::Element, ElementRef, Html, Node, Selector};
use tracing::{debug, warn};

use crate::config::ExtractorConfig;

/// Article container conventions, most specific first
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    ".post-content",
    ".entry-content",
    ".article-content",
    ".article-body",
    ".post-body",
    ".story-body",
    "#content",
    ".main-content",
    ".content",
    ".text",
];

const BLOCK_SELECTOR: &str = "div, section, p";

/// Elements dropped together with everything inside them
const DENIED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "object", "embed", "nav", "header",
    "footer", "aside", "form", "button", "input", "select", "textarea", "svg", "canvas",
];

/// Class/id tokens that must match exactly (too short for substring matching)
const DENIED_TOKENS: &[&str] = &["ad", "ads"];

/// Class/id fragments marking page chrome
const DENIED_FRAGMENTS: &[&str] = &[
    "advert",
    "sponsor",
    "sidebar",
    "comment",
    "social",
    "share",
    "related",
    "newsletter",
    "subscribe",
    "popup",
    "cookie",
    "promo",
    "banner",
    "breadcrumb",
];

/// Elements whose text is never rendered
const HIDDEN_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Shown when a page has nothing worth reading
pub const PLACEHOLDER_HTML: &str = r#"<h1>Welcome to the Galactic Reader</h1>
<p>We could not find an article on this page, so here is a short tour instead.</p>
<h2>Galaxy themes</h2>
<p>Switch between the Milky Way, Andromeda, the Orion Nebula, a Black Hole and the Aurora Borealis from the popup. Your choice applies instantly.</p>
<h2>Cosmic events</h2>
<p>Trigger a supernova, a meteor shower, a wormhole or a pulsar whenever the reading gets slow.</p>
<h2>Reading progress</h2>
<p>Scroll through an article and the reader marks each quarter you finish. A stopwatch keeps track of how long you have been reading.</p>
<h2>Remembered sites</h2>
<p>Leave the reader on and it opens again the next time you visit the same site.</p>"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionSource {
    /// Matched one of the container selectors
    Selector(&'static str),
    /// Largest text block; holds the tag name
    LargestBlock(String),
    Placeholder,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub html: String,
    /// Characters of text in `html` (0 for the placeholder)
    pub text_len: usize,
    pub source: ExtractionSource,
}

impl Extraction {
    fn placeholder() -> Self {
        Self {
            html: PLACEHOLDER_HTML.to_string(),
            text_len: 0,
            source: ExtractionSource::Placeholder,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.source == ExtractionSource::Placeholder
    }
}

pub struct ContentExtractor {
    selectors: Vec<(&'static str, Selector)>,
    block_selector: Selector,
    denied_fragments: AhoCorasick,
    config: ExtractorConfig,
}

impl ContentExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let mut selectors = Vec::with_capacity(CONTENT_SELECTORS.len());
        for &source in CONTENT_SELECTORS {
            match Selector::parse(source) {
                Ok(selector) => selectors.push((source, selector)),
                Err(e) => warn!("Invalid content selector '{}': {:?}", source, e),
            }
        }

        let block_selector = Selector::parse(BLOCK_SELECTOR)
            .map_err(|e| anyhow!("Invalid block selector '{}': {:?}", BLOCK_SELECTOR, e))?;

        let denied_fragments = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(DENIED_FRAGMENTS)?;

        Ok(Self {
            selectors,
            block_selector,
            denied_fragments,
            config,
        })
    }

    pub fn extract(&self, html: &str) -> Extraction {
        let document = Html::parse_document(html);

        let chosen = self
            .match_selectors(&document)
            .or_else(|| self.largest_block(&document));

        let Some((element, source)) = chosen else {
            debug!("No content candidate found, using placeholder");
            return Extraction::placeholder();
        };

        let mut markup = String::new();
        let mut text = String::new();
        self.write_children(element, &mut markup, &mut text);

        let text_len = collapsed_len(&text);
        if text_len < self.config.placeholder_min_chars {
            debug!(
                ?source,
                text_len, "Sanitized content too short, using placeholder"
            );
            return Extraction::placeholder();
        }

        debug!(?source, text_len, "Extracted main content");
        Extraction {
            html: markup,
            text_len,
            source,
        }
    }

    fn match_selectors<'a>(
        &self,
        document: &'a Html,
    ) -> Option<(ElementRef<'a>, ExtractionSource)> {
        for (source, selector) in &self.selectors {
            let Some(element) = document.select(selector).next() else {
                continue;
            };
            let len = rendered_text_len(element);
            if len > self.config.selector_min_chars {
                return Some((element, ExtractionSource::Selector(*source)));
            }
            debug!("Selector '{}' matched only {} chars", source, len);
        }
        None
    }

    fn largest_block<'a>(&self, document: &'a Html) -> Option<(ElementRef<'a>, ExtractionSource)> {
        let mut best = None;
        let mut best_len = self.config.density_min_chars;

        for element in document.select(&self.block_selector) {
            let len = rendered_text_len(element);
            // Strict: the first of equally long blocks wins
            if len > best_len {
                best_len = len;
                best = Some(element);
            }
        }

        best.map(|element| {
            let tag = element.value().name().to_string();
            (element, ExtractionSource::LargestBlock(tag))
        })
    }

    fn is_denied(&self, element: &Element) -> bool {
        if DENIED_TAGS.contains(&element.name()) {
            return true;
        }
        let id_denied = element
            .id()
            .is_some_and(|id| self.is_denied_token(id));
        id_denied || element.classes().any(|class| self.is_denied_token(class))
    }

    fn is_denied_token(&self, token: &str) -> bool {
        DENIED_TOKENS
            .iter()
            .any(|denied| token.eq_ignore_ascii_case(denied))
            || self.denied_fragments.is_match(token)
    }

    /// Serialize the children of `element`, collecting surviving text
    fn write_children(&self, element: ElementRef<'_>, out: &mut String, text: &mut String) {
        for child in element.children() {
            match child.value() {
                Node::Text(t) => {
                    escape_text(t, out);
                    text.push_str(t);
                }
                Node::Element(el) => {
                    if self.is_denied(el) {
                        continue;
                    }
                    let Some(child_ref) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let name = el.name();
                    out.push('<');
                    out.push_str(name);
                    for (attr, value) in el.attrs() {
                        if keep_attribute(attr, value) {
                            out.push(' ');
                            out.push_str(attr);
                            out.push_str("=\"");
                            escape_attr(value, out);
                            out.push('"');
                        }
                    }
                    out.push('>');
                    if VOID_ELEMENTS.contains(&name) {
                        continue;
                    }
                    self.write_children(child_ref, out, text);
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
                // Comments, doctypes and processing instructions are dropped
                _ => {}
            }
        }
    }
}

fn keep_attribute(name: &str, value: &str) -> bool {
    // The parser accepts quotes and other junk in attribute names
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '-'))
    {
        return false;
    }
    let name = name.to_ascii_lowercase();
    if name.starts_with("on") || name == "style" || name == "class" {
        return false;
    }
    if matches!(name.as_str(), "href" | "src" | "action" | "formaction") {
        return !is_script_url(value);
    }
    true
}

/// Scheme check as a browser sees it: tabs, newlines and other control
/// characters are stripped before the URL is parsed
fn is_script_url(value: &str) -> bool {
    let normalized: String = value
        .chars()
        .filter(|c| !c.is_ascii_control())
        .collect::<String>()
        .trim_start_matches(|c: char| c == ' ')
        .to_ascii_lowercase();
    normalized.starts_with("javascript:")
}

/// Length of the text a reader would see, whitespace collapsed
pub fn rendered_text_len(element: ElementRef<'_>) -> usize {
    let mut text = String::new();
    collect_text(element, &mut text);
    collapsed_len(&text)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(el) if HIDDEN_TEXT_TAGS.contains(&el.name()) => {}
            Node::Element(_) => {
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, out);
                }
            }
            _ => {}
        }
    }
}

fn collapsed_len(text: &str) -> usize {
    let mut len = 0;
    for (i, word) in text.split_whitespace().enumerate() {
        if i > 0 {
            len += 1;
        }
        len += word.chars().count();
    }
    len
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}
