//! In-memory stand-in for the remote application.
//!
//! [`FakeAzubiheft`] keeps accounts, subjects, week tiles and report entries
//! and renders just enough of each page for the parsers to work on. Every
//! [`Session`] it hands out gets its own [`FakeTransport`], which plays the
//! role of that session's cookie jar and records what was sent.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use azubiheft_scraper_models::{BuiltinSubject, Subject};
use chrono::{Datelike as _, NaiveDate};

use crate::reports::{AJAX_PATH, DATE_FORMAT, DAY_PATH};
use crate::session::{LOGIN_PATH, LOGOUT_PATH, PROBE_PATH};
use crate::subjects::{DELETE_IDS_FIELD, SAVE_BUTTON, SUBJECT_INPUT_PREFIX, SUBJECTS_PATH};
use crate::tokens::{EVENT_VALIDATION, VIEW_STATE, VIEW_STATE_GENERATOR};
use crate::transport::{FormRequest, RawResponse, Transport, TransportFailure};
use crate::weeks::OVERVIEW_PATH;
use crate::Session;

#[derive(Debug, Clone)]
struct FakeEntry {
    seq: u64,
    art_id: String,
    duration: String,
    lines: Vec<String>,
}

#[derive(Debug, Default)]
struct Account {
    password: String,
    subjects: Vec<Subject>,
    days: BTreeMap<NaiveDate, Vec<FakeEntry>>,
}

#[derive(Debug)]
struct FakeState {
    accounts: BTreeMap<String, Account>,
    weeks: Vec<(u32, i32, String)>,
    next_seq: u64,
}

/// Shared server state. Cloning yields another handle to the same server.
#[derive(Debug, Clone)]
pub struct FakeAzubiheft {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeAzubiheft {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAzubiheft {
    /// View-state value every rendered page carries and every post must echo.
    pub const VIEW_STATE: &'static str = "dDwtMTA4NzE2NjQ5Njs7Pg==";
    /// View-state generator value of every rendered page.
    pub const VIEW_STATE_GENERATOR: &'static str = "C2EE9ABB";
    /// Event-validation value of every rendered page.
    pub const EVENT_VALIDATION: &'static str = "/wEdAAVq3w==";

    /// Origin reported by the fake transports.
    pub const ORIGIN: &'static str = "https://fake.azubiheft.test";

    /// Creates a server without accounts or weeks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                accounts: BTreeMap::new(),
                weeks: Vec::new(),
                next_seq: 100,
            })),
        }
    }

    fn with_state(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner));
        self
    }

    /// Adds an account.
    #[must_use]
    pub fn with_user(self, username: &str, password: &str) -> Self {
        self.with_state(|state| {
            state.accounts.insert(
                username.to_owned(),
                Account {
                    password: password.to_owned(),
                    ..Account::default()
                },
            );
        })
    }

    /// Adds a custom subject to `username`'s account.
    #[must_use]
    pub fn with_subject(self, username: &str, id: &str, name: &str) -> Self {
        self.with_state(|state| {
            state
                .accounts
                .entry(username.to_owned())
                .or_default()
                .subjects
                .push(Subject::new(id, name));
        })
    }

    /// Lists the ISO week containing `date` on the overview page under
    /// report id `id`.
    #[must_use]
    pub fn with_week(self, date: NaiveDate, id: &str) -> Self {
        let iso = date.iso_week();
        self.with_week_tile(iso.week(), iso.year(), id)
    }

    /// Adds an overview tile for `week`/`year` with report id `id`.
    #[must_use]
    pub fn with_week_tile(self, week: u32, year: i32, id: &str) -> Self {
        self.with_state(|state| state.weeks.push((week, year, id.to_owned())))
    }

    /// Adds a report entry to `username`'s day `date`. Lines of `text` are
    /// separated by `\n`.
    #[must_use]
    pub fn with_entry(
        self,
        username: &str,
        date: NaiveDate,
        seq: u64,
        art_id: &str,
        duration: &str,
        text: &str,
    ) -> Self {
        self.with_state(|state| {
            state.next_seq = state.next_seq.max(seq + 1);
            state
                .accounts
                .entry(username.to_owned())
                .or_default()
                .days
                .entry(date)
                .or_default()
                .push(FakeEntry {
                    seq,
                    art_id: art_id.to_owned(),
                    duration: duration.to_owned(),
                    lines: text.split('\n').map(str::to_owned).collect(),
                });
        })
    }

    /// Opens a fresh, logged-out session against this server.
    #[must_use]
    pub fn session(&self) -> (Session, FakeTransport) {
        let transport = FakeTransport {
            server: self.clone(),
            conn: Arc::new(Mutex::new(Connection::default())),
        };
        (Session::with_transport(transport.clone()), transport)
    }

    /// Number of entries stored for `username` on `date`.
    #[must_use]
    pub fn entry_count(&self, username: &str, date: NaiveDate) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .accounts
            .get(username)
            .and_then(|account| account.days.get(&date))
            .map_or(0, Vec::len)
    }

    fn handle(&self, user: Option<&str>, method: Method<'_>) -> (RawResponse, Option<Login>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        match method {
            Method::Get(target) => {
                let (path, query) = split_target(target);
                let response = match (path, user) {
                    (LOGIN_PATH, _) => RawResponse::new(200, login_page()),
                    (LOGOUT_PATH, _) => return (redirect(), Some(Login::Out)),
                    (PROBE_PATH, Some(_)) => RawResponse::new(
                        200,
                        r#"<html><body><a id="Abmelden" href="Abmelden.aspx">Abmelden</a></body></html>"#,
                    ),
                    (SUBJECTS_PATH, Some(user)) => {
                        let account = state.accounts.entry(user.to_owned()).or_default();
                        RawResponse::new(200, subjects_page(&account.subjects))
                    }
                    (OVERVIEW_PATH, Some(_)) => RawResponse::new(200, overview_page(&state.weeks)),
                    (DAY_PATH, Some(user)) => match query_date(&query) {
                        Some(date) => {
                            let account = state.accounts.entry(user.to_owned()).or_default();
                            RawResponse::new(200, day_page(account, date))
                        }
                        None => RawResponse::new(400, "Datum fehlt"),
                    },
                    (PROBE_PATH | SUBJECTS_PATH | OVERVIEW_PATH | DAY_PATH, None) => redirect(),
                    _ => RawResponse::new(404, "Not Found"),
                };
                (response, None)
            }
            Method::Post(request) => match (request.path.as_str(), user) {
                (LOGIN_PATH, _) => login(&state, request),
                (SUBJECTS_PATH, Some(user)) => (save_subjects(&mut state, user, request), None),
                (AJAX_PATH, Some(user)) => (ajax(&mut state, user, request), None),
                (SUBJECTS_PATH | AJAX_PATH, None) => (redirect(), None),
                _ => (RawResponse::new(404, "Not Found"), None),
            },
        }
    }
}

enum Method<'a> {
    Get(&'a str),
    Post(&'a FormRequest),
}

enum Login {
    In(String),
    Out,
}

#[derive(Debug, Clone)]
enum RecordedRequest {
    Get,
    Post(FormRequest),
}

#[derive(Debug, Default)]
struct Connection {
    user: Option<String>,
    requests: Vec<RecordedRequest>,
    failing: Vec<String>,
    ajax_rejection: Option<(usize, RawResponse)>,
}

/// One session's connection to a [`FakeAzubiheft`].
#[derive(Debug, Clone)]
pub struct FakeTransport {
    server: FakeAzubiheft,
    conn: Arc<Mutex<Connection>>,
}

impl FakeTransport {
    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every form post sent so far, in order.
    #[must_use]
    pub fn posts(&self) -> Vec<FormRequest> {
        self.conn()
            .requests
            .iter()
            .filter_map(|r| match r {
                RecordedRequest::Post(post) => Some(post.clone()),
                RecordedRequest::Get => None,
            })
            .collect()
    }

    /// Number of requests sent so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.conn().requests.len()
    }

    /// Makes every later request whose path starts with `path` fail at the
    /// transport level.
    pub fn fail_path(&self, path: &str) {
        self.conn().failing.push(path.to_owned());
    }

    /// Answers every later AJAX post with `status` and `body`.
    pub fn reject_ajax(&self, status: u16, body: &str) {
        self.reject_ajax_after(0, status, body);
    }

    /// Lets `accepted` more AJAX posts through, then answers the rest with
    /// `status` and `body`.
    pub fn reject_ajax_after(&self, accepted: usize, status: u16, body: &str) {
        self.conn().ajax_rejection = Some((accepted, RawResponse::new(status, body)));
    }

    fn dispatch(
        &self,
        recorded: RecordedRequest,
        method: Method<'_>,
    ) -> Result<RawResponse, TransportFailure> {
        let path = match &method {
            Method::Get(target) => split_target(target).0,
            Method::Post(request) => request.path.as_str(),
        };

        let user = {
            let mut conn = self.conn();
            conn.requests.push(recorded);

            if conn.failing.iter().any(|prefix| path.starts_with(prefix.as_str())) {
                return Err(Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    format!("connection reset while requesting {path}"),
                )));
            }

            if path == AJAX_PATH {
                if let Some((accepted, response)) = conn.ajax_rejection.as_mut() {
                    if *accepted == 0 {
                        return Ok(response.clone());
                    }
                    *accepted -= 1;
                }
            }

            conn.user.clone()
        };

        let (response, login) = self.server.handle(user.as_deref(), method);
        match login {
            Some(Login::In(user)) => self.conn().user = Some(user),
            Some(Login::Out) => self.conn().user = None,
            None => {}
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn origin(&self) -> &str {
        FakeAzubiheft::ORIGIN
    }

    async fn get(&self, path: &str) -> Result<RawResponse, TransportFailure> {
        self.dispatch(RecordedRequest::Get, Method::Get(path))
    }

    async fn post_form(&self, request: &FormRequest) -> Result<RawResponse, TransportFailure> {
        self.dispatch(RecordedRequest::Post(request.clone()), Method::Post(request))
    }
}

fn split_target(target: &str) -> (&str, Vec<(String, String)>) {
    match target.split_once('?') {
        Some((path, query)) => (
            path,
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        ),
        None => (target, Vec::new()),
    }
}

fn query_date(query: &[(String, String)]) -> Option<NaiveDate> {
    query
        .iter()
        .find(|(k, _)| k == "Datum")
        .and_then(|(_, v)| NaiveDate::parse_from_str(v, DATE_FORMAT).ok())
}

const fn redirect() -> RawResponse {
    RawResponse {
        status: 302,
        body: String::new(),
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn token_inputs() -> String {
    [
        (VIEW_STATE, FakeAzubiheft::VIEW_STATE),
        (VIEW_STATE_GENERATOR, FakeAzubiheft::VIEW_STATE_GENERATOR),
        (EVENT_VALIDATION, FakeAzubiheft::EVENT_VALIDATION),
    ]
    .iter()
    .fold(String::new(), |mut out, (name, value)| {
        let _ = writeln!(
            out,
            r#"<input type="hidden" name="{name}" id="{name}" value="{value}" />"#
        );
        out
    })
}

fn login_page() -> String {
    format!(
        r#"<html><body><form method="post" action="./Login.aspx">{}
<input name="ctl00$ContentPlaceHolder1$txt_Benutzername" type="text" />
<input name="ctl00$ContentPlaceHolder1$txt_Passwort" type="password" />
<input type="submit" name="ctl00$ContentPlaceHolder1$cmd_Login" value="Anmelden" />
</form></body></html>"#,
        token_inputs()
    )
}

fn subjects_page(subjects: &[Subject]) -> String {
    let mut inputs = String::new();
    for subject in subjects {
        let _ = writeln!(
            inputs,
            r#"<input type="text" id="{SUBJECT_INPUT_PREFIX}{id}" data-default="{id}" value="{name}" />"#,
            id = escape(&subject.id),
            name = escape(&subject.name),
        );
    }
    format!(
        r#"<html><body><a id="Abmelden" href="Abmelden.aspx">Abmelden</a><form>{}
<div id="divSchulfach">{inputs}<input type="text" id="{SUBJECT_INPUT_PREFIX}Neu" value="" /></div>
</form></body></html>"#,
        token_inputs()
    )
}

fn overview_page(weeks: &[(u32, i32, String)]) -> String {
    let mut tiles = String::new();
    for (week, year, id) in weeks {
        let _ = writeln!(
            tiles,
            r#"<div class="mo NBox" onclick="location.href='Wochenansicht.aspx?T=1&amp;NachweisNr={id}'"><div class="KW"><div class="sKW">{week}</div><div>KW</div><div>{year}</div></div></div>"#
        );
    }
    format!(r#"<html><body><a id="Abmelden" href="Abmelden.aspx">Abmelden</a>{tiles}</body></html>"#)
}

fn subject_label(account: &Account, art_id: &str) -> String {
    BuiltinSubject::all()
        .into_iter()
        .chain(account.subjects.iter().cloned())
        .find(|s| s.id == art_id)
        .map_or_else(|| art_id.to_owned(), |s| s.name)
}

fn day_page(account: &Account, date: NaiveDate) -> String {
    let mut rows = String::new();
    for entry in account.days.get(&date).into_iter().flatten() {
        let _ = writeln!(
            rows,
            r#"<div class="d0 mo" data-seq="{seq}"><div class="row1 d3">Art: {label}</div><div class="row2 d4">{duration}</div><div class="row7 d5">{text}</div></div>"#,
            seq = entry.seq,
            label = escape(&subject_label(account, &entry.art_id)),
            duration = entry.duration,
            text = entry.lines.join("<br>"),
        );
    }
    format!(r#"<html><body><a id="Abmelden" href="Abmelden.aspx">Abmelden</a><div id="Tag">{rows}</div></body></html>"#)
}

fn has_valid_tokens(request: &FormRequest) -> bool {
    request.field(VIEW_STATE) == Some(FakeAzubiheft::VIEW_STATE)
        && request.field(VIEW_STATE_GENERATOR) == Some(FakeAzubiheft::VIEW_STATE_GENERATOR)
        && request.field(EVENT_VALIDATION) == Some(FakeAzubiheft::EVENT_VALIDATION)
}

fn login(state: &FakeState, request: &FormRequest) -> (RawResponse, Option<Login>) {
    let username = request
        .field("ctl00$ContentPlaceHolder1$txt_Benutzername")
        .unwrap_or_default();
    let password = request
        .field("ctl00$ContentPlaceHolder1$txt_Passwort")
        .unwrap_or_default();

    let accepted = has_valid_tokens(request)
        && request.field("ctl00$ContentPlaceHolder1$cmd_Login") == Some("Anmelden")
        && state
            .accounts
            .get(username)
            .is_some_and(|account| account.password == password);

    if accepted {
        (redirect(), Some(Login::In(username.to_owned())))
    } else {
        (RawResponse::new(200, login_page()), None)
    }
}

fn save_subjects(state: &mut FakeState, user: &str, request: &FormRequest) -> RawResponse {
    if !has_valid_tokens(request) || request.field(SAVE_BUTTON.0) != Some(SAVE_BUTTON.1) {
        return RawResponse::new(500, "Ungültiger Postback");
    }

    let deleted: Vec<&str> = request
        .field(DELETE_IDS_FIELD)
        .unwrap_or_default()
        .split(',')
        .filter(|id| !id.is_empty())
        .collect();

    let subjects: Vec<Subject> = request
        .fields
        .iter()
        .filter_map(|(key, value)| {
            let id = key.strip_prefix(SUBJECT_INPUT_PREFIX).or_else(|| {
                key.strip_prefix("txt")
                    .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            })?;
            (!value.is_empty() && !deleted.contains(&id)).then(|| Subject::new(id, value.as_str()))
        })
        .collect();

    let account = state.accounts.entry(user.to_owned()).or_default();
    account.subjects = subjects;
    RawResponse::new(200, subjects_page(&account.subjects))
}

fn ajax(state: &mut FakeState, user: &str, request: &FormRequest) -> RawResponse {
    if request.header("x-my-ajax-request") != Some("ajax") {
        return RawResponse::new(403, "Forbidden");
    }

    let Some(date) = request
        .query_value("Datum")
        .and_then(|v| NaiveDate::parse_from_str(v, DATE_FORMAT).ok())
    else {
        return RawResponse::new(400, "Datum fehlt");
    };

    let iso = date.iso_week();
    let expected = state
        .weeks
        .iter()
        .find(|(week, year, _)| *week == iso.week() && *year == iso.year())
        .map(|(_, _, id)| id.as_str());
    if expected.is_none() || request.query_value("BrNr") != expected {
        return RawResponse::new(500, "Falsche Nachweisnummer");
    }

    let seq = request.field("Seq").unwrap_or_default();
    let duration = request.field("Dauer").unwrap_or_default().to_owned();

    if seq == "0" {
        let content = url::form_urlencoded::parse(request.field("Inhalt").unwrap_or_default().as_bytes())
            .next()
            .map(|(key, _)| key.into_owned())
            .unwrap_or_default();
        let lines = content
            .strip_prefix("<div>")
            .and_then(|c| c.strip_suffix("</div>"))
            .unwrap_or(&content)
            .split("</div><div>")
            .map(str::to_owned)
            .collect();

        let entry = FakeEntry {
            seq: state.next_seq,
            art_id: request.field("Art_ID").unwrap_or_default().to_owned(),
            duration,
            lines,
        };
        state.next_seq += 1;
        state
            .accounts
            .entry(user.to_owned())
            .or_default()
            .days
            .entry(date)
            .or_default()
            .push(entry);
        return RawResponse::new(200, "OK");
    }

    let Some(target) = seq.strip_prefix('-').and_then(|n| n.parse::<u64>().ok()) else {
        return RawResponse::new(400, "Ungültige Seq");
    };

    let entries = state
        .accounts
        .entry(user.to_owned())
        .or_default()
        .days
        .entry(date)
        .or_default();
    match entries.iter().position(|e| e.seq == target) {
        Some(index) if entries[index].duration == duration => {
            entries.remove(index);
            RawResponse::new(200, "OK")
        }
        _ => RawResponse::new(400, "Eintrag nicht gefunden"),
    }
}
