//! Small helpers shared by the page parsers.

use scraper::{ElementRef, Node, Selector};

use crate::AzubiheftError;

/// Elements that start a new line when rendered.
const BLOCK_ELEMENTS: &[&str] = &["div", "p", "li", "tr"];

/// Parses a CSS selector, returning an [`AzubiheftError::Parse`] on failure.
pub fn selector(css: &str, step: &'static str) -> Result<Selector, AzubiheftError> {
    Selector::parse(css)
        .map_err(|e| AzubiheftError::parse(step, format!("invalid CSS selector '{css}': {e}")))
}

/// Concatenated text content of an element, trimmed.
pub fn trimmed_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}

/// Text content of the first descendant matching `selector`, trimmed.
pub fn child_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).next().map(trimmed_text)
}

/// Inner markup with HTML line breaks turned into `\n`. Everything else is
/// left untouched.
pub fn formatted_text(element: ElementRef<'_>) -> String {
    element
        .inner_html()
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("<br>", "\n")
}

/// Text content with all markup removed.
///
/// `<br>` and block element boundaries become line breaks. Whitespace inside
/// text collapses the way a browser renders it, each line is trimmed and the
/// result is trimmed as a whole.
pub fn plain_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();

    for node in element.descendants().skip(1) {
        match node.value() {
            Node::Text(text) => push_collapsed(&mut out, text),
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            Node::Element(el) if BLOCK_ELEMENTS.contains(&el.name()) => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }

    out.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

fn push_collapsed(out: &mut String, text: &str) {
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            push_space(out);
            pending_space = false;
        }
        out.push(ch);
    }
    if pending_space {
        push_space(out);
    }
}

fn push_space(out: &mut String) {
    if !out.is_empty() && !out.ends_with(['\n', ' ']) {
        out.push(' ');
    }
}
