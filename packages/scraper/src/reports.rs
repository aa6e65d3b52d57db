//! Report entries of a single day.
//!
//! Reading uses the day page (`Tagesbericht.aspx`). Writing and deleting go
//! through the AJAX endpoint the site's editor calls, which only accepts
//! requests that look like same-origin XHRs.

use azubiheft_scraper_models::{EMPTY_DURATION, ReportEntry, WeekId};
use chrono::NaiveDate;
use scraper::Html;

use crate::session::ensure_success;
use crate::transport::FormRequest;
use crate::{AzubiheftError, Session, html};

/// Single-day report page.
pub(crate) const DAY_PATH: &str = "/Azubi/Tagesbericht.aspx";
/// AJAX endpoint for creating and deleting entries.
pub(crate) const AJAX_PATH: &str = "/Azubi/XMLHttpRequest.ashx";
/// Date format used in query strings.
pub(crate) const DATE_FORMAT: &str = "%Y%m%d";

/// Prefixes the type cell carries in front of the subject name.
const TYPE_PREFIXES: &[&str] = &["Art: ", "Type: "];

/// Formats `date` the way the remote application expects it in URLs.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses the entries of a day page, skipping empty (`00:00`) slots.
///
/// With `include_formatting` the body is the raw inner markup with line
/// breaks turned into `\n`; otherwise all markup is stripped.
///
/// # Errors
///
/// Returns [`AzubiheftError::Parse`] if an entry has no `data-seq`
/// attribute or the selectors cannot be built.
pub fn parse_report_entries(
    body: &str,
    include_formatting: bool,
) -> Result<Vec<ReportEntry>, AzubiheftError> {
    const STEP: &str = "parsing report page";

    let document = Html::parse_document(body);
    let entry_sel = html::selector("div.d0.mo", STEP)?;
    let type_sel = html::selector("div.row1.d3", STEP)?;
    let duration_sel = html::selector("div.row2.d4", STEP)?;
    let text_sel = html::selector("div.row7.d5", STEP)?;

    let mut entries = Vec::new();

    for entry in document.select(&entry_sel) {
        let duration = html::child_text(entry, &duration_sel).unwrap_or_default();
        if duration == EMPTY_DURATION {
            continue;
        }

        let seq = entry
            .value()
            .attr("data-seq")
            .ok_or_else(|| AzubiheftError::parse(STEP, "report entry without data-seq"))?
            .to_owned();

        let entry_type = html::child_text(entry, &type_sel).unwrap_or_default();
        let entry_type = TYPE_PREFIXES
            .iter()
            .find_map(|prefix| entry_type.strip_prefix(prefix))
            .unwrap_or(&entry_type)
            .to_owned();

        let text = entry
            .select(&text_sel)
            .next()
            .map(|el| {
                if include_formatting {
                    html::formatted_text(el)
                } else {
                    html::plain_text(el)
                }
            })
            .unwrap_or_default();

        entries.push(ReportEntry {
            seq,
            entry_type,
            duration,
            text,
        });
    }

    Ok(entries)
}

/// Wraps every line in a `<div>` and percent-encodes the result, spaces as
/// `%20`. The endpoint takes `+` literally.
#[must_use]
pub fn encode_message(text: &str) -> String {
    let wrapped: String = text
        .split('\n')
        .map(|line| format!("<div>{}</div>", line.trim_end_matches('\r')))
        .collect();

    url::form_urlencoded::byte_serialize(wrapped.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Checks that `duration` looks like `H:MM` or `HH:MM` with minutes below 60
/// and returns its length in minutes.
///
/// # Errors
///
/// Returns [`AzubiheftError::Validation`] otherwise.
pub fn validate_duration(duration: &str) -> Result<u32, AzubiheftError> {
    let invalid = || AzubiheftError::validation(format!("invalid duration '{duration}', expected HH:MM"));

    let (hours, minutes) = duration.split_once(':').ok_or_else(invalid)?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    if !digits(hours) || hours.len() > 2 || minutes.len() != 2 || !digits(minutes) {
        return Err(invalid());
    }
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

/// Builds an AJAX post against the entry endpoint for `date`.
pub(crate) fn ajax_request(
    origin: &str,
    date: NaiveDate,
    week_id: &WeekId,
    fields: Vec<(String, String)>,
) -> FormRequest {
    FormRequest::new(AJAX_PATH)
        .with_query("Datum", format_date(date))
        .with_query("BrNr", week_id.as_str())
        .with_query("BrSt", "1")
        .with_query("BrVorh", "Yes")
        .with_query("T", chrono::Utc::now().timestamp().to_string())
        .with_fields(fields)
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_header("x-my-ajax-request", "ajax")
        .with_header("Origin", origin)
        .with_header("Referer", origin)
        .with_header("Sec-Fetch-Dest", "empty")
        .with_header("Sec-Fetch-Mode", "cors")
        .with_header("Sec-Fetch-Site", "same-origin")
        .with_header("Pragma", "no-cache")
        .with_header("Cache-Control", "no-cache")
}

pub(crate) fn entry_fields(seq: &str, subject_id: &str, duration: &str, content: &str) -> Vec<(String, String)> {
    [
        ("disablePaste", "0"),
        ("Seq", seq),
        ("Art_ID", subject_id),
        ("Abt_ID", "0"),
        ("Dauer", duration),
        ("Inhalt", content),
        ("jsVer", "12"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect()
}

impl Session {
    /// Returns the entries of `date` in page order.
    ///
    /// # Errors
    ///
    /// Returns [`AzubiheftError::RemoteRequest`] if the day page answers
    /// with a non-success status, [`AzubiheftError::Parse`] if an entry is
    /// malformed and [`AzubiheftError::Transport`] if the request fails.
    pub async fn report(
        &self,
        date: NaiveDate,
        include_formatting: bool,
    ) -> Result<Vec<ReportEntry>, AzubiheftError> {
        let path = format!("{DAY_PATH}?Datum={}", format_date(date));
        let page = self.fetch_page(&path, "fetching report page").await?;
        parse_report_entries(&page.body, include_formatting)
    }

    /// Writes one entry for `date`.
    ///
    /// A zero duration (`00:00`, `0:00`) is an empty slot and succeeds
    /// without contacting the server.
    ///
    /// # Errors
    ///
    /// Returns [`AzubiheftError::Validation`] for a malformed duration,
    /// [`AzubiheftError::NotFound`] if the week cannot be resolved and
    /// [`AzubiheftError::RemoteRequest`] (with the response body) if the
    /// endpoint rejects the entry.
    pub async fn write_report(
        &self,
        date: NaiveDate,
        text: &str,
        duration: &str,
        subject_id: u64,
    ) -> Result<(), AzubiheftError> {
        if validate_duration(duration)? == 0 {
            log::debug!("Skipping empty entry for {date}");
            return Ok(());
        }

        let week_id = self.report_week_id(date).await?;
        let fields = entry_fields(
            "0",
            &subject_id.to_string(),
            duration,
            &encode_message(text),
        );
        let request = ajax_request(self.transport().origin(), date, &week_id, fields);

        let response = self.submit(&request, "writing report entry").await?;
        ensure_success(response, "writing report entry")?;

        log::info!("Wrote {duration} entry for {date}");
        Ok(())
    }

    /// Deletes entry `entry_number` (1-based, page order) of `date`, or all
    /// entries when `None`. Returns how many entries were deleted.
    ///
    /// Entries are deleted one by one; a failure leaves earlier deletions
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns [`AzubiheftError::Validation`] if `entry_number` is out of
    /// range, [`AzubiheftError::Parse`] if an entry's sequence number is not
    /// numeric and [`AzubiheftError::RemoteRequest`] if the endpoint rejects
    /// a deletion.
    pub async fn delete_report(
        &self,
        date: NaiveDate,
        entry_number: Option<usize>,
    ) -> Result<usize, AzubiheftError> {
        let entries = self.report(date, false).await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let targets = match entry_number {
            None => entries,
            Some(n) if (1..=entries.len()).contains(&n) => vec![entries[n - 1].clone()],
            Some(n) => {
                return Err(AzubiheftError::validation(format!(
                    "invalid entry number {n}, {date} has {} entries",
                    entries.len()
                )));
            }
        };

        for entry in &targets {
            let seq: u64 = entry.seq.parse().map_err(|_| {
                AzubiheftError::parse(
                    "deleting report entry",
                    format!("sequence number '{}' is not numeric", entry.seq),
                )
            })?;

            let week_id = self.report_week_id(date).await?;
            let fields = entry_fields(&format!("-{seq}"), "0", &entry.duration, &entry.text);
            let request = ajax_request(self.transport().origin(), date, &week_id, fields);

            let response = self.submit(&request, "deleting report entry").await?;
            ensure_success(response, "deleting report entry")?;
            log::debug!("Deleted entry {seq} of {date}");
        }

        log::info!("Deleted {} entries of {date}", targets.len());
        Ok(targets.len())
    }
}

#[cfg(test)]
mod tests {
    use azubiheft_scraper_models::Credentials;

    use super::*;
    use crate::fake::FakeAzubiheft;

    const DAY: &str = r#"
        <div id="Tag">
          <div class="d0 mo" data-seq="3">
            <div class="row1 d3">Art: Schule</div>
            <div class="row2 d4"> 01:30 </div>
            <div class="row7 d5">SQL Joins<br>Normalformen</div>
          </div>
          <div class="d0 mo" data-seq="0">
            <div class="row1 d3">Art: </div>
            <div class="row2 d4">00:00</div>
            <div class="row7 d5"></div>
          </div>
          <div class="d0 mo" data-seq="4">
            <div class="row1 d3">Type: Betrieb</div>
            <div class="row2 d4">06:00</div>
            <div class="row7 d5"><div>Server <b>aufgesetzt</b></div></div>
          </div>
        </div>"#;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
    }

    async fn logged_in(server: &FakeAzubiheft) -> (Session, crate::fake::FakeTransport) {
        let (session, transport) = server.session();
        session
            .login(&Credentials::new("azubi", "geheim"))
            .await
            .unwrap();
        (session, transport)
    }

    fn server() -> FakeAzubiheft {
        FakeAzubiheft::new()
            .with_user("azubi", "geheim")
            .with_week(date(), "4711")
    }

    #[test]
    fn parses_plain_entries_and_skips_empty_slots() {
        let entries = parse_report_entries(DAY, false).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, "3");
        assert_eq!(entries[0].entry_type, "Schule");
        assert_eq!(entries[0].duration, "01:30");
        assert_eq!(entries[0].text, "SQL Joins\nNormalformen");
        assert_eq!(entries[1].entry_type, "Betrieb");
        assert_eq!(entries[1].text, "Server aufgesetzt");
    }

    #[test]
    fn formatted_entries_keep_markup() {
        let entries = parse_report_entries(DAY, true).unwrap();
        assert_eq!(entries[0].text, "SQL Joins\nNormalformen");
        assert_eq!(entries[1].text, "<div>Server <b>aufgesetzt</b></div>");
    }

    #[test]
    fn entry_without_seq_is_parse_error() {
        let body = r#"<div class="d0 mo"><div class="row2 d4">01:00</div></div>"#;
        let err = parse_report_entries(body, false).unwrap_err();
        assert!(matches!(err, AzubiheftError::Parse { .. }));
    }

    #[test]
    fn encodes_lines_as_divs_with_percent_spaces() {
        assert_eq!(
            encode_message("a b\nc+d"),
            "%3Cdiv%3Ea%20b%3C%2Fdiv%3E%3Cdiv%3Ec%2Bd%3C%2Fdiv%3E"
        );
    }

    #[test]
    fn validates_durations() {
        assert_eq!(validate_duration("01:30").unwrap(), 90);
        assert_eq!(validate_duration("8:00").unwrap(), 480);
        assert_eq!(validate_duration("12:45").unwrap(), 765);
        assert_eq!(validate_duration("0:00").unwrap(), 0);
        for bad in ["", "90", "1:5", "01:60", "123:00", "aa:bb", "-1:00"] {
            assert!(validate_duration(bad).is_err(), "{bad}");
        }
    }

    #[tokio::test]
    async fn empty_duration_write_sends_nothing() {
        let server = server();
        let (session, transport) = server.session();

        for duration in [EMPTY_DURATION, "0:00"] {
            session
                .write_report(date(), "nichts", duration, 1)
                .await
                .unwrap();
        }
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn short_zero_duration_stores_no_entry() {
        let server = server();
        let (session, transport) = logged_in(&server).await;

        session.write_report(date(), "leer", "0:00", 1).await.unwrap();

        assert!(transport.posts().iter().all(|p| p.path != AJAX_PATH));
        assert_eq!(server.entry_count("azubi", date()), 0);
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let server = server();
        let (session, _) = logged_in(&server).await;

        session
            .write_report(date(), "hello\nworld", "01:30", 2)
            .await
            .unwrap();

        let entries = session.report(date(), false).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "hello\nworld");
        assert_eq!(entries[0].duration, "01:30");
        assert_eq!(entries[0].entry_type, "Schule");
    }

    #[tokio::test]
    async fn write_sends_ajax_headers_and_fresh_week_id() {
        let server = server();
        let (session, transport) = logged_in(&server).await;

        session
            .write_report(date(), "Doku geschrieben", "02:00", 1)
            .await
            .unwrap();

        let post = transport.posts().pop().unwrap();
        assert_eq!(post.path, AJAX_PATH);
        assert_eq!(post.query_value("Datum"), Some("20261014"));
        assert_eq!(post.query_value("BrNr"), Some("4711"));
        assert_eq!(post.header("x-my-ajax-request"), Some("ajax"));
        assert_eq!(post.header("Sec-Fetch-Site"), Some("same-origin"));
        assert_eq!(post.field("Seq"), Some("0"));
        assert_eq!(post.field("Art_ID"), Some("1"));
        assert_eq!(
            post.field("Inhalt"),
            Some("%3Cdiv%3EDoku%20geschrieben%3C%2Fdiv%3E")
        );
    }

    #[tokio::test]
    async fn read_never_returns_empty_slots() {
        let server = server().with_entry("azubi", date(), 9, "2", "00:00", "leer");
        let (session, _) = logged_in(&server).await;

        assert!(session.report(date(), false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_for_unlisted_week_is_not_found() {
        let server = server();
        let (session, _) = logged_in(&server).await;
        let far = NaiveDate::from_ymd_opt(2035, 6, 1).unwrap();

        let err = session.write_report(far, "x", "01:00", 1).await.unwrap_err();
        assert!(matches!(err, AzubiheftError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rejected_write_carries_status_and_body() {
        let server = server();
        let (session, transport) = logged_in(&server).await;
        transport.reject_ajax(500, "Fehler beim Speichern");

        let err = session
            .write_report(date(), "x", "01:00", 1)
            .await
            .unwrap_err();
        match err {
            AzubiheftError::RemoteRequest { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "Fehler beim Speichern");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn delete_out_of_range_sends_no_deletion() {
        let server = server()
            .with_entry("azubi", date(), 1, "1", "02:00", "eins")
            .with_entry("azubi", date(), 2, "1", "03:00", "zwei");
        let (session, transport) = logged_in(&server).await;

        for n in [0, 3] {
            let err = session.delete_report(date(), Some(n)).await.unwrap_err();
            assert!(matches!(err, AzubiheftError::Validation { .. }));
        }
        assert!(transport.posts().iter().all(|p| p.path != AJAX_PATH));
        assert_eq!(session.report(date(), false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_single_entry_negates_seq_and_echoes_content() {
        let server = server()
            .with_entry("azubi", date(), 7, "1", "02:00", "eins")
            .with_entry("azubi", date(), 8, "2", "03:00", "zwei");
        let (session, transport) = logged_in(&server).await;

        assert_eq!(session.delete_report(date(), Some(2)).await.unwrap(), 1);

        let post = transport.posts().pop().unwrap();
        assert_eq!(post.field("Seq"), Some("-8"));
        assert_eq!(post.field("Dauer"), Some("03:00"));
        assert_eq!(post.field("Inhalt"), Some("zwei"));

        let remaining = session.report(date(), false).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].seq, "7");
    }

    #[tokio::test]
    async fn delete_all_entries() {
        let server = server()
            .with_entry("azubi", date(), 1, "1", "02:00", "eins")
            .with_entry("azubi", date(), 2, "2", "03:00", "zwei");
        let (session, _) = logged_in(&server).await;

        assert_eq!(session.delete_report(date(), None).await.unwrap(), 2);
        assert!(session.report(date(), false).await.unwrap().is_empty());
        assert_eq!(server.entry_count("azubi", date()), 0);
    }

    #[tokio::test]
    async fn delete_on_empty_day_succeeds() {
        let server = server();
        let (session, _) = logged_in(&server).await;

        assert_eq!(session.delete_report(date(), Some(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn partial_delete_failure_keeps_earlier_deletions() {
        let server = server()
            .with_entry("azubi", date(), 1, "1", "02:00", "eins")
            .with_entry("azubi", date(), 2, "2", "03:00", "zwei");
        let (session, transport) = logged_in(&server).await;
        transport.reject_ajax_after(1, 500, "Sperre");

        let err = session.delete_report(date(), None).await.unwrap_err();
        assert!(matches!(err, AzubiheftError::RemoteRequest { status: 500, .. }));
        assert_eq!(server.entry_count("azubi", date()), 1);

        let remaining = session.report(date(), false).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].seq, "2");
    }
}
