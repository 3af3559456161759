//! Redaction of credentials and personal data before fixtures are committed.

use super::log::{Header, RecordedContent, RecordedRequest, RecordedResponse, ReplayEntry, ReplayLog};
use regex::Regex;
use std::sync::OnceLock;

pub const REDACTED: &str = "[REDACTED]";

/// Header names redacted regardless of pattern matching.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-auth-token",
    "x-api-key",
    "x-access-token",
    "x-session-id",
    "x-csrf-token",
    "x-xsrf-token",
    "proxy-authorization",
];

/// Name fragments that mark a key as sensitive (case-insensitive).
const SENSITIVE_KEY_PATTERN: &str = "password|passwd|clave|contrase|secret|token|session|sess_|\
                                     auth|jwt|bearer|api_?key|apikey|credential|access_key|private_key";

fn sensitive_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("(?i){SENSITIVE_KEY_PATTERN}")).expect("sensitive key regex is valid")
    })
}

fn json_string_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r#"(?i)("[^"]*(?:{SENSITIVE_KEY_PATTERN})[^"]*")\s*:\s*"[^"]*""#))
            .expect("json string field regex is valid")
    })
}

fn json_scalar_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r#"(?i)("[^"]*(?:{SENSITIVE_KEY_PATTERN})[^"]*")\s*:\s*([^"\s,}}\]\[{{][^",}}\]]*)"#
        ))
        .expect("json scalar field regex is valid")
    })
}

pub fn is_sensitive_key(key: &str) -> bool {
    sensitive_key_re().is_match(key)
}

/// Return a copy of `log` with sensitive values replaced by `[REDACTED]`.
pub fn sanitize_log(log: &ReplayLog) -> ReplayLog {
    ReplayLog {
        entries: log.entries.iter().map(sanitize_entry).collect(),
    }
}

fn sanitize_entry(entry: &ReplayEntry) -> ReplayEntry {
    let request = &entry.request;
    let response = &entry.response;
    ReplayEntry {
        request: RecordedRequest {
            method: request.method.clone(),
            url: sanitize_url(&request.url),
            headers: sanitize_headers(&request.headers),
            body: sanitize_body(&request.body, true),
        },
        response: RecordedResponse {
            status: response.status,
            headers: sanitize_headers(&response.headers),
            content: RecordedContent {
                text: if response.content.is_base64() {
                    response.content.text.clone()
                } else {
                    let form = response
                        .content
                        .mime_type
                        .starts_with("application/x-www-form-urlencoded");
                    sanitize_body(&response.content.text, form)
                },
                ..response.content.clone()
            },
        },
    }
}

fn sanitize_headers(headers: &[Header]) -> Vec<Header> {
    headers
        .iter()
        .map(|h| {
            let lower = h.name.to_ascii_lowercase();
            if SENSITIVE_HEADERS.contains(&lower.as_str()) || is_sensitive_key(&h.name) {
                Header::new(h.name.clone(), REDACTED)
            } else {
                h.clone()
            }
        })
        .collect()
}

/// Redact sensitive query values. URLs without sensitive keys are returned untouched.
pub fn sanitize_url(raw: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(raw) else {
        return raw.to_string();
    };
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.iter().any(|(k, _)| is_sensitive_key(k)) {
        return raw.to_string();
    }

    parsed.query_pairs_mut().clear().extend_pairs(pairs.iter().map(|(k, v)| {
        if is_sensitive_key(k) {
            (k.as_str(), REDACTED)
        } else {
            (k.as_str(), v.as_str())
        }
    }));
    parsed.to_string()
}

fn sanitize_body(body: &str, form_encoded: bool) -> String {
    let trimmed = body.trim_start();
    if trimmed.is_empty() {
        return body.to_string();
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return sanitize_json_body(body);
    }
    if form_encoded && body.contains('=') {
        return sanitize_form_body(body);
    }
    body.to_string()
}

fn sanitize_form_body(body: &str) -> String {
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(body.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.iter().any(|(k, _)| is_sensitive_key(k)) {
        return body.to_string();
    }
    let mut out = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in &pairs {
        if is_sensitive_key(k) {
            out.append_pair(k, REDACTED);
        } else {
            out.append_pair(k, v);
        }
    }
    out.finish()
}

fn sanitize_json_body(body: &str) -> String {
    let replacement = format!("$1: \"{REDACTED}\"");
    let pass = json_string_field_re().replace_all(body, replacement.as_str());
    json_scalar_field_re()
        .replace_all(&pass, replacement.as_str())
        .into_owned()
}

/// Number of values that differ between a log and its sanitized copy.
pub fn count_redactions(original: &ReplayLog, sanitized: &ReplayLog) -> usize {
    fn header_diff(a: &[Header], b: &[Header]) -> usize {
        a.iter().zip(b).filter(|(x, y)| x.value != y.value).count()
    }

    original
        .entries
        .iter()
        .zip(&sanitized.entries)
        .map(|(o, s)| {
            usize::from(o.request.url != s.request.url)
                + header_diff(&o.request.headers, &s.request.headers)
                + usize::from(o.request.body != s.request.body)
                + header_diff(&o.response.headers, &s.response.headers)
                + usize::from(o.response.content.text != s.response.content.text)
        })
        .sum()
}

/// One markup rewrite rule.
struct MarkupRule {
    description: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

fn markup_rules() -> &'static [MarkupRule] {
    static RULES: OnceLock<Vec<MarkupRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            MarkupRule {
                description: "account number",
                pattern: Regex::new(r"\b\d{4}-\d{4}-\d{2}-\d{8}\b")
                    .expect("account number regex is valid"),
                replacement: "XXXX-XXXX-XX-XXXXXXXX",
            },
            MarkupRule {
                description: "greeting name",
                pattern: Regex::new(
                    r"(?i)(Hola)\s+[A-ZÁÉÍÓÚÑ][a-záéíóúñ]+\s+[A-ZÁÉÍÓÚÑ][a-záéíóúñ]+",
                )
                .expect("greeting regex is valid"),
                replacement: "$1 NOMBRE APELLIDO",
            },
            MarkupRule {
                description: "token",
                pattern: Regex::new(r#"(?i)(token|csrf|session)["\s:=]+["']?[a-zA-Z0-9_-]{20,}["']?"#)
                    .expect("token regex is valid"),
                replacement: r#"$1="REDACTED""#,
            },
            MarkupRule {
                description: "cookie assignment",
                pattern: Regex::new(r#"(?i)document\.cookie\s*=\s*["'][^"']+["']"#)
                    .expect("cookie regex is valid"),
                replacement: r#"document.cookie="REDACTED""#,
            },
        ]
    })
}

/// Result of rewriting a markup fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupReport {
    pub markup: String,
    /// `(rule, matches)` for every rule that matched.
    pub matches: Vec<(&'static str, usize)>,
}

impl MarkupReport {
    pub fn changed(&self) -> bool {
        !self.matches.is_empty()
    }
}

/// Mask account numbers, customer names, tokens and cookies in captured markup.
pub fn sanitize_markup(html: &str) -> MarkupReport {
    let mut markup = html.to_string();
    let mut matches = Vec::new();
    for rule in markup_rules() {
        let count = rule.pattern.find_iter(&markup).count();
        if count > 0 {
            markup = rule
                .pattern
                .replace_all(&markup, rule.replacement)
                .into_owned();
            matches.push((rule.description, count));
        }
    }
    MarkupReport { markup, matches }
}
