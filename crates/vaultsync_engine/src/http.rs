//! HTTP source client.
//!
//! The network library is abstracted behind [`HttpClient`], so the engine
//! never depends on a particular HTTP stack. The binary plugs in a blocking
//! client; tests plug in scripted responses.

use crate::config::SourceConfig;
use crate::session::{Session, SessionCache};
use serde::Deserialize;
use std::fmt;
use std::io::{self, Read};
use std::time::Duration;
use thiserror::Error;
use vaultsync_core::{
    FetchError, FetchedObject, ObjectMeta, SourceClient, SourceId, SourceRecord, Timestamp,
};

const FULL_LISTING_PATH: &str = "/services/bagit_extension/audit";
const LISTING_SINCE_PATH: &str = "/services/bagit_extension/audit_by_date";
const ERROR_EXCERPT_BYTES: u64 = 512;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

/// A request handed to an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Read timeout for the whole response.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Creates a `GET` request.
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    /// Creates a `POST` request with a JSON body.
    pub fn post_json(url: impl Into<String>, body: Vec<u8>, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body),
            timeout,
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first value of a header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response returned by an [`HttpClient`].
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers, possibly repeated.
    pub headers: Vec<(String, String)>,
    /// Streaming body.
    pub body: Box<dyn Read + Send>,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Box<dyn Read + Send>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the first value of a header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value of a header, ignoring case.
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Reads the whole body as text.
    pub fn text(mut self) -> io::Result<String> {
        let mut text = String::new();
        self.body.read_to_string(&mut text)?;
        Ok(text)
    }

    fn excerpt(self) -> String {
        let mut buf = Vec::new();
        let _ = self.body.take(ERROR_EXCERPT_BYTES).read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).trim().to_string()
    }
}

/// A transport-level failure of an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpFault {
    /// The request exceeded its timeout.
    #[error("timed out: {0}")]
    Timeout(String),
    /// The connection failed.
    #[error("connection failed: {0}")]
    Connection(String),
    /// Any other client failure.
    #[error("{0}")]
    Other(String),
}

impl From<HttpFault> for FetchError {
    fn from(fault: HttpFault) -> Self {
        match fault {
            HttpFault::Timeout(m) => FetchError::Timeout(m),
            HttpFault::Connection(m) => FetchError::Connection(m),
            HttpFault::Other(m) => FetchError::Malformed(m),
        }
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response, whatever its status.
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpFault>;
}

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    objects: Vec<ListingEntry>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    pid: Option<String>,
    timestamp: Option<String>,
}

/// Source client for a repository exposing the bagit extension endpoints.
pub struct HttpSourceClient<C: HttpClient> {
    config: SourceConfig,
    client: C,
    sessions: SessionCache,
}

impl<C: HttpClient> HttpSourceClient<C> {
    /// Creates a client. No request is made until first use.
    pub fn new(config: SourceConfig, client: C) -> Self {
        let sessions = SessionCache::new(config.session_file.clone());
        Self {
            config,
            client,
            sessions,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Returns the underlying HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Logs in and caches the resulting session.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Authentication`] if the repository refuses the
    /// credentials or sets no cookie.
    pub fn login(&self) -> Result<Session, FetchError> {
        let body = serde_json::to_vec(&serde_json::json!({
            "username": self.config.username,
            "password": self.config.password,
        }))
        .map_err(|e| FetchError::Malformed(e.to_string()))?;
        let request = HttpRequest::post_json(
            self.config.url(&self.config.login_path),
            body,
            self.config.list_timeout,
        );
        let response = self.client.execute(request)?;
        if response.status != 200 {
            return Err(FetchError::Authentication(format!(
                "login returned status {}",
                response.status
            )));
        }

        let set_cookies = response.header_all("set-cookie");
        let cookie = set_cookies
            .iter()
            .filter_map(|v| v.split(';').next())
            .map(str::trim)
            .filter(|pair| pair.contains('='))
            .collect::<Vec<_>>()
            .join("; ");
        if cookie.is_empty() {
            return Err(FetchError::Authentication(
                "login response carried no session cookie".to_string(),
            ));
        }

        let lifetime = set_cookies
            .iter()
            .filter_map(|v| max_age(v))
            .min()
            .unwrap_or(self.config.session_lifetime);
        let expires_at = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|d| Timestamp::now().as_datetime().checked_add_signed(d))
            .map(Timestamp::from_datetime)
            .unwrap_or_else(Timestamp::now);

        let session = Session { cookie, expires_at };
        if let Err(e) = self.sessions.store(session.clone()) {
            tracing::warn!(path = %self.sessions.path().display(), error = %e, "could not cache session");
        }
        tracing::debug!(expires_at = %session.expires_at, "logged in to source repository");
        Ok(session)
    }

    fn session(&self) -> Result<Session, FetchError> {
        match self.sessions.get_valid(&Timestamp::now()) {
            Some(session) => Ok(session),
            None => self.login(),
        }
    }

    /// Sends an authenticated request, renewing the session once if the
    /// repository rejects it.
    fn send(&self, build: impl Fn(&Session) -> HttpRequest) -> Result<HttpResponse, FetchError> {
        let session = self.session()?;
        let response = self.client.execute(build(&session))?;
        if !matches!(response.status, 401 | 403) {
            return check_status(response);
        }

        tracing::warn!(status = response.status, "session rejected, logging in again");
        self.sessions.invalidate();
        let session = self.login()?;
        let response = self.client.execute(build(&session))?;
        if matches!(response.status, 401 | 403) {
            return Err(FetchError::Authentication(format!(
                "request refused with status {} after renewing the session",
                response.status
            )));
        }
        check_status(response)
    }
}

fn check_status(response: HttpResponse) -> Result<HttpResponse, FetchError> {
    if response.is_success() {
        Ok(response)
    } else {
        let status = response.status;
        Err(FetchError::from_status(status, response.excerpt()))
    }
}

fn max_age(set_cookie: &str) -> Option<Duration> {
    set_cookie.split(';').skip(1).find_map(|attr| {
        let (name, value) = attr.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            value.trim().parse::<u64>().ok().map(Duration::from_secs)
        } else {
            None
        }
    })
}

impl<C: HttpClient> SourceClient for HttpSourceClient<C> {
    fn connect(&self) -> Result<(), FetchError> {
        self.session().map(|_| ())
    }

    fn list_records(&self, since: Option<&Timestamp>) -> Result<Vec<SourceRecord>, FetchError> {
        let url = match since {
            Some(ts) => self.config.url(&format!(
                "{LISTING_SINCE_PATH}/{}",
                urlencoding::encode(&ts.to_rfc3339())
            )),
            None => self.config.url(FULL_LISTING_PATH),
        };
        let response = self.send(|session| {
            HttpRequest::get(url.clone(), self.config.list_timeout).with_header("Cookie", &session.cookie)
        })?;
        let text = response
            .text()
            .map_err(|e| FetchError::Connection(format!("reading listing: {e}")))?;
        let listing: Listing = serde_json::from_str(&text)
            .map_err(|e| FetchError::Malformed(format!("listing is not valid JSON: {e}")))?;

        let mut records = Vec::with_capacity(listing.objects.len());
        for entry in listing.objects {
            let (Some(pid), Some(raw_ts)) = (entry.pid, entry.timestamp) else {
                tracing::warn!("skipping listing entry without pid or timestamp");
                continue;
            };
            let id = match SourceId::new(pid.trim()) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(pid = %pid, error = %e, "skipping listing entry");
                    continue;
                }
            };
            let modified = match Timestamp::parse(&raw_ts) {
                Ok(ts) => ts,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "skipping listing entry");
                    continue;
                }
            };
            if since.is_some_and(|s| modified < *s) {
                continue;
            }
            records.push(SourceRecord::new(id, modified));
        }
        Ok(records)
    }

    fn fetch_object(&self, id: &SourceId, read_timeout: Duration) -> Result<FetchedObject, FetchError> {
        let url = self.config.url(&format!(
            "/islandora/object/{}/manage/bagit_extension",
            urlencoding::encode(id.as_str())
        ));
        let response = self.send(|session| {
            HttpRequest::get(url.clone(), read_timeout).with_header("Cookie", &session.cookie)
        })?;

        let header = |name: &str| {
            response
                .header(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| FetchError::MissingHeader(name.to_string()))
        };
        let modified = header(self.config.timestamp_header.as_str())?;
        let modified = Timestamp::parse(modified).map_err(|e| FetchError::Malformed(e.to_string()))?;
        let checksum = header(self.config.checksum_header.as_str())?.to_string();
        let content_length = match response.header("content-length") {
            Some(v) => Some(
                v.trim()
                    .parse::<u64>()
                    .map_err(|_| FetchError::Malformed(format!("bad content-length {v:?}")))?,
            ),
            None => None,
        };
        let content_type = response.header("content-type").map(str::to_string);

        Ok(FetchedObject {
            meta: ObjectMeta {
                modified,
                checksum,
                content_type,
                content_length,
            },
            body: response.body,
        })
    }
}
