//! Activity subjects (`SetupSchulfach.aspx`).
//!
//! The seven built-in subjects are fixed; custom subjects live as text
//! inputs on the subject setup page. The page has no partial update: adding
//! or deleting resubmits the whole custom list.

use std::sync::LazyLock;

use azubiheft_scraper_models::{BuiltinSubject, Subject};
use regex::Regex;
use scraper::Html;

use crate::session::ensure_success;
use crate::tokens::{self, FormTokens};
use crate::transport::FormRequest;
use crate::{AzubiheftError, Session, html};

/// Subject setup page.
pub(crate) const SUBJECTS_PATH: &str = "/Azubi/SetupSchulfach.aspx";

/// Element id prefix of the inputs holding custom subjects.
pub(crate) const SUBJECT_INPUT_PREFIX: &str = "ctl00_ContentPlaceHolder1_txt";

/// Save button field and the value the server dispatches on.
pub(crate) const SAVE_BUTTON: (&str, &str) = ("ctl00$ContentPlaceHolder1$cmd_Save", "Speichern");

/// Hidden field listing the subject ids to delete, comma-prefixed.
pub(crate) const DELETE_IDS_FIELD: &str = "ctl00$ContentPlaceHolder1$HiddenLöschIDs";

static SUBJECT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"txt(\d+)").unwrap_or_else(|_| unreachable!()));

/// Tokens and existing custom subject inputs of the setup page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectForm {
    /// State tokens to echo back.
    pub tokens: FormTokens,
    /// `(element id, value)` of every non-empty custom subject input.
    pub inputs: Vec<(String, String)>,
}

/// Extracts the numeric subject id from a custom subject input id
/// (`…txt<digits>`).
#[must_use]
pub fn subject_input_id(element_id: &str) -> Option<&str> {
    SUBJECT_ID_RE
        .captures(element_id)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Parses the custom subjects listed inside `#divSchulfach`.
///
/// Inputs without a `data-default` id or with an empty value are skipped.
///
/// # Errors
///
/// Returns [`AzubiheftError::Parse`] if the selectors cannot be built.
pub fn parse_custom_subjects(body: &str) -> Result<Vec<Subject>, AzubiheftError> {
    const STEP: &str = "parsing subjects page";

    let document = Html::parse_document(body);
    let container_sel = html::selector("#divSchulfach", STEP)?;
    let input_sel = html::selector("input", STEP)?;

    let Some(container) = document.select(&container_sel).next() else {
        return Ok(Vec::new());
    };

    Ok(container
        .select(&input_sel)
        .filter_map(|input| {
            let id = input.value().attr("data-default")?;
            let name = input.value().attr("value")?;
            (!name.is_empty()).then(|| Subject::new(id, name))
        })
        .collect())
}

/// Parses the tokens and current custom subject inputs for a resubmission.
///
/// # Errors
///
/// Returns [`AzubiheftError::Parse`] if the selectors cannot be built.
pub fn parse_subject_form(body: &str) -> Result<SubjectForm, AzubiheftError> {
    let document = Html::parse_document(body);
    let input_sel = html::selector(
        &format!("input[id^='{SUBJECT_INPUT_PREFIX}']"),
        "parsing subject form",
    )?;

    let inputs = document
        .select(&input_sel)
        .filter_map(|input| {
            let id = input.value().attr("id")?;
            let value = input.value().attr("value").unwrap_or_default();
            (!value.is_empty()).then(|| (id.to_owned(), value.to_owned()))
        })
        .collect();

    Ok(SubjectForm {
        tokens: tokens::extract_tokens(&document),
        inputs,
    })
}

/// Builds the save post that appends `name` as a new subject.
///
/// The server recognises new subjects by the `txt<timestamp>` field name.
#[must_use]
pub fn add_subject_request(form: SubjectForm, name: &str, timestamp: i64) -> FormRequest {
    FormRequest::new(SUBJECTS_PATH)
        .with_fields(form.tokens.into_fields())
        .with_field(SAVE_BUTTON.0, SAVE_BUTTON.1)
        .with_fields(form.inputs)
        .with_field(&format!("txt{timestamp}"), name)
}

/// Builds the save post that removes subject `id`.
///
/// Only inputs whose id carries a numeric suffix are carried forward; any
/// other input is dropped from the resubmission.
#[must_use]
pub fn delete_subject_request(form: SubjectForm, id: &str) -> FormRequest {
    let kept = form
        .inputs
        .into_iter()
        .filter(|(element_id, _)| subject_input_id(element_id).is_some_and(|n| n != id));

    FormRequest::new(SUBJECTS_PATH)
        .with_fields(form.tokens.into_fields())
        .with_field(DELETE_IDS_FIELD, format!(",{id}"))
        .with_field(SAVE_BUTTON.0, SAVE_BUTTON.1)
        .with_fields(kept)
}

impl Session {
    /// Returns the built-in subjects followed by the user's custom ones.
    ///
    /// If the setup page answers with a non-success status only the
    /// built-ins are returned.
    ///
    /// # Errors
    ///
    /// Returns [`AzubiheftError::Transport`] if the request fails.
    pub async fn subjects(&self) -> Result<Vec<Subject>, AzubiheftError> {
        let response = self.fetch(SUBJECTS_PATH, "fetching subjects page").await?;
        let mut subjects = BuiltinSubject::all();

        if !response.is_success() {
            log::warn!(
                "Subjects page answered with status {}, returning built-in subjects only",
                response.status
            );
            return Ok(subjects);
        }

        subjects.extend(parse_custom_subjects(&response.body)?);
        Ok(subjects)
    }

    /// Adds a custom subject named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AzubiheftError::Validation`] for an empty name and
    /// [`AzubiheftError::RemoteRequest`] if the page or the save post answers
    /// with a non-success status.
    pub async fn add_subject(&self, name: &str) -> Result<(), AzubiheftError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AzubiheftError::validation("subject name must not be empty"));
        }

        let form = self.subject_form().await?;
        let timestamp = chrono::Utc::now().timestamp();
        let request = add_subject_request(form, name, timestamp);

        let response = self.submit(&request, "adding subject").await?;
        ensure_success(response, "adding subject")?;

        log::info!("Added subject '{name}'");
        Ok(())
    }

    /// Deletes the custom subject with id `id`.
    ///
    /// # Errors
    ///
    /// Returns [`AzubiheftError::RemoteRequest`] if the page or the save post
    /// answers with a non-success status.
    pub async fn delete_subject(&self, id: &str) -> Result<(), AzubiheftError> {
        let form = self.subject_form().await?;
        let request = delete_subject_request(form, id);

        let response = self.submit(&request, "deleting subject").await?;
        ensure_success(response, "deleting subject")?;

        log::info!("Deleted subject {id}");
        Ok(())
    }

    async fn subject_form(&self) -> Result<SubjectForm, AzubiheftError> {
        let page = self
            .fetch_page(SUBJECTS_PATH, "fetching subjects page")
            .await?;
        parse_subject_form(&page.body)
    }
}

#[cfg(test)]
mod tests {
    use azubiheft_scraper_models::Credentials;

    use super::*;
    use crate::fake::FakeAzubiheft;

    const PAGE: &str = r#"
        <form>
          <input type="hidden" id="__VIEWSTATE" value="vs" />
          <input type="hidden" id="__VIEWSTATEGENERATOR" value="gen" />
          <input type="hidden" id="__EVENTVALIDATION" value="ev" />
          <div id="divSchulfach">
            <input type="text" id="ctl00_ContentPlaceHolder1_txt1700000001" data-default="1700000001" value="Datenbanken" />
            <input type="text" id="ctl00_ContentPlaceHolder1_txt1700000002" data-default="1700000002" value="Netzwerke" />
            <input type="text" id="ctl00_ContentPlaceHolder1_txtAlt" data-default="Alt" value="Altlast" />
            <input type="text" id="ctl00_ContentPlaceHolder1_txtNeu" value="" />
          </div>
        </form>"#;

    #[test]
    fn parses_custom_subjects_in_document_order() {
        let subjects = parse_custom_subjects(PAGE).unwrap();
        assert_eq!(
            subjects,
            vec![
                Subject::new("1700000001", "Datenbanken"),
                Subject::new("1700000002", "Netzwerke"),
                Subject::new("Alt", "Altlast"),
            ]
        );
    }

    #[test]
    fn page_without_container_has_no_custom_subjects() {
        assert!(parse_custom_subjects("<html></html>").unwrap().is_empty());
    }

    #[test]
    fn subject_input_id_needs_numeric_suffix() {
        assert_eq!(
            subject_input_id("ctl00_ContentPlaceHolder1_txt1700000001"),
            Some("1700000001")
        );
        assert_eq!(subject_input_id("ctl00_ContentPlaceHolder1_txtAlt"), None);
    }

    #[test]
    fn add_request_carries_existing_inputs_and_new_field() {
        let form = parse_subject_form(PAGE).unwrap();
        let request = add_subject_request(form, "Projektarbeit", 1_760_000_000);

        assert_eq!(request.field("__VIEWSTATE"), Some("vs"));
        assert_eq!(request.field(SAVE_BUTTON.0), Some("Speichern"));
        assert_eq!(
            request.field("ctl00_ContentPlaceHolder1_txt1700000002"),
            Some("Netzwerke")
        );
        assert_eq!(
            request.field("ctl00_ContentPlaceHolder1_txtAlt"),
            Some("Altlast")
        );
        assert_eq!(request.field("ctl00_ContentPlaceHolder1_txtNeu"), None);
        assert_eq!(request.field("txt1760000000"), Some("Projektarbeit"));
    }

    #[test]
    fn delete_request_omits_target_and_non_numeric_inputs() {
        let form = parse_subject_form(PAGE).unwrap();
        let request = delete_subject_request(form, "1700000001");

        assert_eq!(request.field(DELETE_IDS_FIELD), Some(",1700000001"));
        assert_eq!(request.field("ctl00_ContentPlaceHolder1_txt1700000001"), None);
        assert_eq!(
            request.field("ctl00_ContentPlaceHolder1_txt1700000002"),
            Some("Netzwerke")
        );
        assert_eq!(request.field("ctl00_ContentPlaceHolder1_txtAlt"), None);
    }

    #[tokio::test]
    async fn subjects_start_with_builtins() {
        let server = FakeAzubiheft::new()
            .with_user("azubi", "geheim")
            .with_subject("azubi", "1700000001", "Datenbanken");
        let (session, _) = server.session();
        session
            .login(&Credentials::new("azubi", "geheim"))
            .await
            .unwrap();

        let subjects = session.subjects().await.unwrap();
        assert_eq!(subjects.len(), 8);
        assert_eq!(subjects[..7], BuiltinSubject::all()[..]);
        assert_eq!(subjects[7], Subject::new("1700000001", "Datenbanken"));
    }

    #[tokio::test]
    async fn unreachable_subject_page_still_lists_builtins() {
        let server = FakeAzubiheft::new().with_user("azubi", "geheim");
        let (session, _) = server.session();

        // Not logged in: the page redirects instead of rendering.
        let subjects = session.subjects().await.unwrap();
        assert_eq!(subjects, BuiltinSubject::all());
    }

    #[tokio::test]
    async fn add_then_delete_subject() {
        let server = FakeAzubiheft::new().with_user("azubi", "geheim");
        let (session, _) = server.session();
        session
            .login(&Credentials::new("azubi", "geheim"))
            .await
            .unwrap();

        session.add_subject("Projektarbeit").await.unwrap();
        let subjects = session.subjects().await.unwrap();
        let added = subjects
            .iter()
            .find(|s| s.name == "Projektarbeit")
            .cloned()
            .unwrap();
        assert!(!added.is_builtin());

        session.delete_subject(&added.id).await.unwrap();
        let subjects = session.subjects().await.unwrap();
        assert!(subjects.iter().all(|s| s.name != "Projektarbeit"));
        assert_eq!(subjects[..7], BuiltinSubject::all()[..]);
    }

    #[tokio::test]
    async fn empty_subject_name_is_rejected_without_requests() {
        let server = FakeAzubiheft::new().with_user("azubi", "geheim");
        let (session, transport) = server.session();

        let err = session.add_subject("   ").await.unwrap_err();
        assert!(matches!(err, AzubiheftError::Validation { .. }));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn adding_subject_while_logged_out_is_remote_error() {
        let server = FakeAzubiheft::new().with_user("azubi", "geheim");
        let (session, _) = server.session();

        let err = session.add_subject("Projektarbeit").await.unwrap_err();
        assert!(matches!(err, AzubiheftError::RemoteRequest { status: 302, .. }));
    }
}
