//! ASP.NET state-preservation tokens.
//!
//! Every form post to the remote application must echo back the three
//! hidden fields the previous page rendered. A page may omit any of them;
//! missing values come back as empty strings and the server decides
//! whether that matters.

use scraper::Html;

use crate::html;

/// Form field name of the serialized view-state blob.
pub const VIEW_STATE: &str = "__VIEWSTATE";
/// Form field name of the view-state generator tag.
pub const VIEW_STATE_GENERATOR: &str = "__VIEWSTATEGENERATOR";
/// Form field name of the event-validation blob.
pub const EVENT_VALIDATION: &str = "__EVENTVALIDATION";

/// The hidden state fields of one rendered page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormTokens {
    /// `__VIEWSTATE` value.
    pub view_state: String,
    /// `__VIEWSTATEGENERATOR` value.
    pub view_state_generator: String,
    /// `__EVENTVALIDATION` value.
    pub event_validation: String,
}

impl FormTokens {
    /// Returns the tokens as form fields, in the order the site posts them.
    #[must_use]
    pub fn into_fields(self) -> Vec<(String, String)> {
        vec![
            (VIEW_STATE.to_owned(), self.view_state),
            (VIEW_STATE_GENERATOR.to_owned(), self.view_state_generator),
            (EVENT_VALIDATION.to_owned(), self.event_validation),
        ]
    }
}

/// Extracts the state tokens from an already parsed document.
#[must_use]
pub fn extract_tokens(document: &Html) -> FormTokens {
    FormTokens {
        view_state: value_by_id(document, VIEW_STATE),
        view_state_generator: value_by_id(document, VIEW_STATE_GENERATOR),
        event_validation: value_by_id(document, EVENT_VALIDATION),
    }
}

fn value_by_id(document: &Html, id: &str) -> String {
    let Ok(selector) = html::selector(&format!("#{id}"), "reading form tokens") else {
        return String::new();
    };
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("value"))
        .unwrap_or_default()
        .to_owned()
}
