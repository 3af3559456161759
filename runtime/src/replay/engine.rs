//! Deterministic replay of recorded traffic.

use super::log::{ReplayEntry, ReplayLog};
use crate::transport::{OutgoingRequest, ResponseSource, ServedResponse, Transport};
use anyhow::Result;
use async_trait::async_trait;
use base64::Engine as _;
use std::collections::HashMap;
use std::sync::Arc;

/// Redirect hops followed inside the recording before giving up.
pub const MAX_REDIRECTS: usize = 10;

const NOT_FOUND_BODY: &str = r#"{"error": "no recording found for URL"}"#;

/// How a request URL was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Full URL, query included.
    Exact,
    /// `scheme://host/path`, query ignored.
    Coarse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    Matched {
        response: ServedResponse,
        match_kind: MatchKind,
        /// Recorded redirects followed to reach `response`.
        hops: usize,
    },
    Unmatched {
        url: String,
    },
}

/// Index sizes, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub entries: usize,
    pub exact_keys: usize,
    pub coarse_keys: usize,
}

/// Serves responses from a [`ReplayLog`]. Immutable once built; share it
/// across tests behind an `Arc`.
pub struct Replayer {
    entries: Vec<ReplayEntry>,
    exact: HashMap<String, usize>,
    coarse: HashMap<String, usize>,
    passthrough: Option<Arc<dyn Transport>>,
}

/// `scheme://host[:port]/path` with query and fragment stripped.
pub fn coarse_key(raw_url: &str) -> Option<String> {
    let parsed = url::Url::parse(raw_url).ok()?;
    let host = parsed.host_str().unwrap_or_default();
    let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
    Some(format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path()))
}

impl Replayer {
    pub fn new(log: ReplayLog) -> Self {
        let mut exact = HashMap::new();
        let mut coarse = HashMap::new();

        for (idx, entry) in log.entries.iter().enumerate() {
            // Later recordings of the same URL win the exact slot.
            exact.insert(entry.request.url.clone(), idx);
            if let Some(key) = coarse_key(&entry.request.url) {
                coarse.entry(key).or_insert(idx);
            }
        }

        Self {
            entries: log.entries,
            exact,
            coarse,
            passthrough: None,
        }
    }

    /// Send unmatched requests to `live` instead of answering 404.
    pub fn with_passthrough(mut self, live: Arc<dyn Transport>) -> Self {
        self.passthrough = Some(live);
        self
    }

    pub fn stats(&self) -> ReplayStats {
        ReplayStats {
            entries: self.entries.len(),
            exact_keys: self.exact.len(),
            coarse_keys: self.coarse.len(),
        }
    }

    fn lookup(&self, url: &str) -> Option<(usize, MatchKind)> {
        if let Some(&idx) = self.exact.get(url) {
            return Some((idx, MatchKind::Exact));
        }
        let key = coarse_key(url)?;
        self.coarse.get(&key).map(|&idx| (idx, MatchKind::Coarse))
    }

    /// Find the recorded response for `url`, following recorded redirects.
    pub fn resolve(&self, url: &str) -> ReplayOutcome {
        let Some((mut current, match_kind)) = self.lookup(url) else {
            tracing::debug!("replay: no match for {url}");
            return ReplayOutcome::Unmatched {
                url: url.to_string(),
            };
        };

        let mut hops = 0;
        while hops < MAX_REDIRECTS {
            let entry = &self.entries[current];
            if !entry.response.is_redirect() {
                break;
            }
            let Some(location) = entry.response.header("location").filter(|l| !l.is_empty())
            else {
                break;
            };

            let target = url::Url::parse(&entry.request.url)
                .and_then(|base| base.join(location))
                .map(|u| u.to_string())
                .unwrap_or_else(|_| location.to_string());

            match self.lookup(&target) {
                Some((next, _)) => {
                    tracing::debug!(
                        "replay: following {} -> {target}",
                        entry.response.status
                    );
                    current = next;
                    hops += 1;
                }
                None => {
                    tracing::debug!("replay: redirect target not recorded: {target}");
                    break;
                }
            }
        }

        let response = serve(&self.entries[current]);
        tracing::debug!("replay: matched {url} -> {}", response.status);
        ReplayOutcome::Matched {
            response,
            match_kind,
            hops,
        }
    }
}

fn serve(entry: &ReplayEntry) -> ServedResponse {
    let recorded = &entry.response;

    let body = if recorded.content.is_base64() {
        base64::engine::general_purpose::STANDARD
            .decode(recorded.content.text.as_bytes())
            .unwrap_or_else(|_| recorded.content.text.as_bytes().to_vec())
    } else {
        recorded.content.text.as_bytes().to_vec()
    };

    let mut headers: Vec<(String, String)> = recorded
        .headers
        .iter()
        .filter(|h| {
            !matches!(
                h.name.to_ascii_lowercase().as_str(),
                "content-encoding" | "content-length" | "location"
            )
        })
        .map(|h| (h.name.clone(), h.value.clone()))
        .collect();

    let has_content_type = headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
    if !has_content_type && !recorded.content.mime_type.is_empty() {
        headers.push(("Content-Type".to_string(), recorded.content.mime_type.clone()));
    }

    ServedResponse {
        status: recorded.status,
        headers,
        body,
        source: ResponseSource::Recording,
    }
}

fn not_found() -> ServedResponse {
    ServedResponse {
        status: 404,
        headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        body: NOT_FOUND_BODY.as_bytes().to_vec(),
        source: ResponseSource::Synthetic,
    }
}

#[async_trait]
impl Transport for Replayer {
    async fn round_trip(&self, request: &OutgoingRequest) -> Result<ServedResponse> {
        match self.resolve(&request.url) {
            ReplayOutcome::Matched { response, .. } => Ok(response),
            ReplayOutcome::Unmatched { url } => match &self.passthrough {
                Some(live) => {
                    tracing::debug!("replay: passing through {url}");
                    live.round_trip(request).await
                }
                None => Ok(not_found()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::log::{Header, RecordedContent, RecordedRequest, RecordedResponse};

    fn entry(url: &str, status: u16, headers: Vec<Header>, text: &str) -> ReplayEntry {
        ReplayEntry {
            request: RecordedRequest {
                method: "GET".to_string(),
                url: url.to_string(),
                headers: Vec::new(),
                body: String::new(),
            },
            response: RecordedResponse {
                status,
                headers,
                content: RecordedContent {
                    mime_type: "text/html".to_string(),
                    text: text.to_string(),
                    encoding: None,
                    size: None,
                },
            },
        }
    }

    fn redirect(url: &str, location: &str) -> ReplayEntry {
        entry(url, 302, vec![Header::new("Location", location)], "")
    }

    #[test]
    fn test_exact_then_coarse_matching() {
        let replayer = Replayer::new(ReplayLog {
            entries: vec![
                entry("https://bank.example/a?x=1", 200, vec![], "first"),
                entry("https://bank.example/a?x=2", 200, vec![], "second"),
            ],
        });

        match replayer.resolve("https://bank.example/a?x=2") {
            ReplayOutcome::Matched { response, match_kind, .. } => {
                assert_eq!(match_kind, MatchKind::Exact);
                assert_eq!(response.body_text(), "second");
            }
            other => panic!("unexpected {other:?}"),
        }

        // Coarse lookups keep the first recording.
        match replayer.resolve("https://bank.example/a?x=99&cache=1") {
            ReplayOutcome::Matched { response, match_kind, .. } => {
                assert_eq!(match_kind, MatchKind::Coarse);
                assert_eq!(response.body_text(), "first");
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(
            replayer.resolve("https://other.example/a"),
            ReplayOutcome::Unmatched {
                url: "https://other.example/a".to_string()
            }
        );
    }

    #[test]
    fn test_relative_redirect_chain_is_followed() {
        let replayer = Replayer::new(ReplayLog {
            entries: vec![
                redirect("https://bank.example/login", "/step1"),
                redirect("https://bank.example/step1", "step2?t=abc"),
                entry("https://bank.example/step2?t=abc", 200, vec![], "<h1>Dashboard</h1>"),
            ],
        });

        match replayer.resolve("https://bank.example/login") {
            ReplayOutcome::Matched { response, hops, .. } => {
                assert_eq!(hops, 2);
                assert_eq!(response.status, 200);
                assert_eq!(response.body_text(), "<h1>Dashboard</h1>");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unrecorded_redirect_target_stops_at_redirect() {
        let replayer = Replayer::new(ReplayLog {
            entries: vec![redirect("https://bank.example/login", "https://sso.example/auth")],
        });
        match replayer.resolve("https://bank.example/login") {
            ReplayOutcome::Matched { response, hops, .. } => {
                assert_eq!(hops, 0);
                assert_eq!(response.status, 302);
                assert_eq!(response.header("location"), None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_redirect_loop_is_bounded() {
        let replayer = Replayer::new(ReplayLog {
            entries: vec![
                redirect("https://bank.example/a", "/b"),
                redirect("https://bank.example/b", "/a"),
            ],
        });
        match replayer.resolve("https://bank.example/a") {
            ReplayOutcome::Matched { hops, .. } => assert_eq!(hops, MAX_REDIRECTS),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_served_headers_and_body() {
        let mut binary = entry(
            "https://bank.example/logo.png",
            200,
            vec![
                Header::new("Content-Encoding", "gzip"),
                Header::new("Content-Length", "999"),
                Header::new("Cache-Control", "no-cache"),
            ],
            "aGVsbG8=",
        );
        binary.response.content.encoding = Some("base64".to_string());
        binary.response.content.mime_type = "image/png".to_string();

        let mut broken = entry("https://bank.example/broken", 200, vec![], "not base64!");
        broken.response.content.encoding = Some("base64".to_string());

        let replayer = Replayer::new(ReplayLog {
            entries: vec![binary, broken],
        });

        let ReplayOutcome::Matched { response, .. } =
            replayer.resolve("https://bank.example/logo.png")
        else {
            panic!("expected a match");
        };
        assert_eq!(response.body, b"hello");
        assert_eq!(
            response.headers,
            vec![
                ("Cache-Control".to_string(), "no-cache".to_string()),
                ("Content-Type".to_string(), "image/png".to_string()),
            ]
        );

        let ReplayOutcome::Matched { response, .. } = replayer.resolve("https://bank.example/broken")
        else {
            panic!("expected a match");
        };
        assert_eq!(response.body_text(), "not base64!");
    }

    #[tokio::test]
    async fn test_unmatched_request_gets_structured_404() {
        let replayer = Replayer::new(ReplayLog::default());
        let response = replayer
            .round_trip(&OutgoingRequest::get("https://bank.example/missing"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.header("content-type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["error"], "no recording found for URL");
    }

    #[test]
    fn test_identical_inputs_serve_identical_bytes() {
        let replayer = Replayer::new(ReplayLog {
            entries: vec![entry("https://bank.example/a", 200, vec![], "<p>same</p>")],
        });
        assert_eq!(
            replayer.resolve("https://bank.example/a"),
            replayer.resolve("https://bank.example/a")
        );
    }

    #[test]
    fn test_coarse_key_strips_query_and_fragment() {
        assert_eq!(
            coarse_key("https://bank.example:8443/p/q?x=1#top").as_deref(),
            Some("https://bank.example:8443/p/q")
        );
        assert_eq!(coarse_key("not a url"), None);
    }
}
