//! Form submission over HTTP.
//!
//! [`Transport`] is the seam between the page logic in [`crate::Session`]
//! and the network. It sends a GET or a form-encoded POST and hands back the
//! raw status and body without interpreting them. Cookies set by the server
//! stay inside the transport, which is how the login carries over to later
//! requests.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;

use crate::AzubiheftError;

/// Error type produced by a [`Transport`] implementation.
pub type TransportFailure = Box<dyn std::error::Error + Send + Sync>;

/// Status and body of a response, uninterpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body decoded as text.
    pub body: String,
}

impl RawResponse {
    /// Creates a response from a status code and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// A form-encoded POST as the browser would send it.
///
/// Query pairs, fields and headers keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormRequest {
    /// Absolute path on the remote host, e.g. `/Login.aspx`.
    pub path: String,
    /// Query string pairs.
    pub query: Vec<(String, String)>,
    /// Form fields, encoded as `application/x-www-form-urlencoded`.
    pub fields: Vec<(String, String)>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl FormRequest {
    /// Creates an empty POST to `path`.
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            ..Self::default()
        }
    }

    /// Appends a query string pair.
    #[must_use]
    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_owned(), value.into()));
        self
    }

    /// Appends a form field.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.push((key.to_owned(), value.into()));
        self
    }

    /// Appends several form fields.
    #[must_use]
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = (String, String)>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Appends a request header.
    #[must_use]
    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_owned(), value.into()));
        self
    }

    /// Returns the value of the first field named `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        lookup(&self.fields, name)
    }

    /// Returns the value of the first query pair named `name`.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<&str> {
        lookup(&self.query, name)
    }

    /// Returns the value of the first header named `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Sends requests to the remote application on behalf of one session.
///
/// Implementations own the session's cookie state and must never follow
/// redirects: a redirect is returned to the caller as a response like any
/// other.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Origin of the remote application without a trailing slash, used for
    /// the `Origin` and `Referer` headers of AJAX calls.
    fn origin(&self) -> &str;

    /// Sends a GET for `path` (which may include a query string).
    ///
    /// # Errors
    ///
    /// Returns a [`TransportFailure`] if the exchange fails before a
    /// response is read.
    async fn get(&self, path: &str) -> Result<RawResponse, TransportFailure>;

    /// Sends `request` as a form-encoded POST.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportFailure`] if the exchange fails before a
    /// response is read.
    async fn post_form(&self, request: &FormRequest) -> Result<RawResponse, TransportFailure>;
}

/// [`Transport`] backed by a [`reqwest::Client`] with a private cookie jar.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: reqwest::Url,
    origin: String,
}

impl HttpTransport {
    /// Builds a transport for the application at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AzubiheftError::Validation`] if `base_url` is not a valid
    /// URL and [`AzubiheftError::Transport`] if the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str) -> Result<Self, AzubiheftError> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|e| AzubiheftError::validation(format!("invalid base URL '{base_url}': {e}")))?;

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .user_agent(concat!("azubiheft-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AzubiheftError::transport("building HTTP client", Box::new(e)))?;

        Ok(Self {
            client,
            origin: base_url.trim_end_matches('/').to_owned(),
            base_url: parsed,
        })
    }

    fn url(&self, path: &str) -> Result<reqwest::Url, TransportFailure> {
        Ok(self.base_url.join(path)?)
    }

    /// Request headers replace the client's defaults, including the
    /// `Content-Type` set for the form body.
    fn headers(request: &FormRequest) -> Result<HeaderMap, TransportFailure> {
        let mut headers = HeaderMap::with_capacity(request.headers.len());
        for (key, value) in &request.headers {
            headers.insert(
                HeaderName::from_bytes(key.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }
        Ok(headers)
    }

    async fn read(response: reqwest::Response) -> Result<RawResponse, TransportFailure> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn origin(&self) -> &str {
        &self.origin
    }

    async fn get(&self, path: &str) -> Result<RawResponse, TransportFailure> {
        let url = self.url(path)?;
        log::debug!("GET {url}");
        let response = self.client.get(url).send().await?;
        Self::read(response).await
    }

    async fn post_form(&self, request: &FormRequest) -> Result<RawResponse, TransportFailure> {
        let url = self.url(&request.path)?;
        log::debug!("POST {url} ({} fields)", request.fields.len());

        let response = self
            .client
            .post(url)
            .query(&request.query)
            .form(&request.fields)
            .headers(Self::headers(request)?)
            .send()
            .await?;
        Self::read(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_2xx_only() {
        assert!(RawResponse::new(200, "").is_success());
        assert!(RawResponse::new(204, "").is_success());
        assert!(!RawResponse::new(302, "").is_success());
        assert!(!RawResponse::new(500, "").is_success());
    }

    #[test]
    fn form_request_lookups() {
        let request = FormRequest::new("/Azubi/XMLHttpRequest.ashx")
            .with_query("Datum", "20261016")
            .with_field("Seq", "0")
            .with_header("X-My-Ajax-Request", "ajax");
        assert_eq!(request.query_value("Datum"), Some("20261016"));
        assert_eq!(request.field("Seq"), Some("0"));
        assert_eq!(request.header("x-my-ajax-request"), Some("ajax"));
        assert_eq!(request.field("Dauer"), None);
    }

    #[test]
    fn http_transport_rejects_invalid_base_url() {
        let err = HttpTransport::new("not a url").unwrap_err();
        assert!(matches!(err, AzubiheftError::Validation { .. }));
    }

    #[test]
    fn http_transport_origin_has_no_trailing_slash() {
        let transport = HttpTransport::new("https://www.azubiheft.de/").unwrap();
        assert_eq!(transport.origin(), "https://www.azubiheft.de");
    }

    #[test]
    fn invalid_header_name_fails_before_sending() {
        let request = FormRequest::new("/").with_header("bad header", "x");
        assert!(HttpTransport::headers(&request).is_err());
    }

    // -- Wiremock tests: HTTP exchange --

    #[tokio::test]
    async fn session_cookie_carries_over_and_redirect_is_returned() {
        use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/Login.aspx"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "/Azubi/Default.aspx")
                    .insert_header("Set-Cookie", "ASP.NET_SessionId=abc; path=/; HttpOnly"),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(matchers::method("GET"))
            .and(matchers::path("/Azubi/Default.aspx"))
            .and(matchers::header("cookie", "ASP.NET_SessionId=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a id="Abmelden">"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();

        let login = FormRequest::new("/Login.aspx").with_field("txtUser", "azubi");
        let response = transport.post_form(&login).await.unwrap();
        assert_eq!(response.status, 302);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        let page = transport.get("/Azubi/Default.aspx").await.unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.body, r#"<a id="Abmelden">"#);
    }

    #[tokio::test]
    async fn ajax_post_reaches_the_wire_as_built() {
        use chrono::NaiveDate;
        use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

        use crate::models::WeekId;
        use crate::reports::{AJAX_PATH, ajax_request, encode_message, entry_fields};

        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path(AJAX_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        let request = ajax_request(
            transport.origin(),
            date,
            &WeekId::new("4711"),
            entry_fields("0", "1", "01:30", &encode_message("a b")),
        );

        let response = transport.post_form(&request).await.unwrap();
        assert_eq!(response, RawResponse::new(200, "OK"));

        let received = server.received_requests().await.unwrap();
        let sent = &received[0];

        let query: Vec<(String, String)> = sent.url.query_pairs().into_owned().collect();
        let names: Vec<&str> = query.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, ["Datum", "BrNr", "BrSt", "BrVorh", "T"]);
        assert_eq!(query[0].1, "20261014");
        assert_eq!(query[1].1, "4711");

        assert_eq!(
            String::from_utf8(sent.body.clone()).unwrap(),
            "disablePaste=0&Seq=0&Art_ID=1&Abt_ID=0&Dauer=01%3A30\
             &Inhalt=%253Cdiv%253Ea%2520b%253C%252Fdiv%253E&jsVer=12"
        );

        let header = |name: &str| {
            sent.headers
                .get(name)
                .map(|v| v.to_str().unwrap().to_owned())
        };
        assert_eq!(header("x-my-ajax-request").as_deref(), Some("ajax"));
        assert_eq!(header("origin"), Some(server.uri()));
        assert_eq!(header("referer"), Some(server.uri()));
        assert_eq!(header("sec-fetch-site").as_deref(), Some("same-origin"));
        assert_eq!(sent.headers.get_all("content-type").iter().count(), 1);
        assert_eq!(
            header("content-type").as_deref(),
            Some("application/x-www-form-urlencoded")
        );
    }
}
