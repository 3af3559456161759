//! Recorded traffic logs and their on-disk formats.
//!
//! Two formats are accepted on load:
//! - the wrapped archive format exported by browser devtools
//!   (`{"log": {"entries": [...]}}`, request bodies under `postData.text`)
//! - the simplified native format (`{"entries": [...]}`, request bodies under `body`)
//!
//! Saving always writes the native format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A recorded session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayLog {
    #[serde(default)]
    pub entries: Vec<ReplayEntry>,
}

/// One request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayEntry {
    pub request: RecordedRequest,
    pub response: RecordedResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
    pub content: RecordedContent,
}

impl RecordedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Response body as recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedContent {
    #[serde(default)]
    pub mime_type: String,
    /// Plain text, or base64 when `encoding` says so.
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

impl RecordedContent {
    pub fn is_base64(&self) -> bool {
        self.encoding.as_deref() == Some("base64")
    }
}

#[derive(Deserialize)]
struct WrappedArchive {
    log: WrappedLog,
}

#[derive(Deserialize)]
struct WrappedLog {
    #[serde(default)]
    entries: Vec<WrappedEntry>,
}

#[derive(Deserialize)]
struct WrappedEntry {
    request: WrappedRequest,
    response: RecordedResponse,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WrappedRequest {
    method: String,
    url: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    post_data: Option<PostData>,
}

#[derive(Deserialize)]
struct PostData {
    #[serde(default)]
    text: String,
}

impl From<WrappedEntry> for ReplayEntry {
    fn from(entry: WrappedEntry) -> Self {
        ReplayEntry {
            request: RecordedRequest {
                method: entry.request.method,
                url: entry.request.url,
                headers: entry.request.headers,
                body: entry.request.post_data.map(|p| p.text).unwrap_or_default(),
            },
            response: entry.response,
        }
    }
}

/// Parse a log from JSON, detecting its format.
pub fn parse_replay_log(raw: &str) -> Result<ReplayLog> {
    if let Ok(wrapped) = serde_json::from_str::<WrappedArchive>(raw) {
        if !wrapped.log.entries.is_empty() {
            return Ok(ReplayLog {
                entries: wrapped.log.entries.into_iter().map(Into::into).collect(),
            });
        }
    }
    serde_json::from_str(raw).context("invalid replay log JSON")
}

/// Read a log from disk, detecting its format.
pub fn load_replay_log(path: &Path) -> Result<ReplayLog> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read replay log: {}", path.display()))?;
    parse_replay_log(&raw).with_context(|| format!("in {}", path.display()))
}

/// Write a log in the native format with pretty formatting.
pub fn save_replay_log(path: &Path, log: &ReplayLog) -> Result<()> {
    let json = serde_json::to_string_pretty(log).context("failed to encode replay log")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write replay log: {}", path.display()))
}
