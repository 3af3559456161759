//! Network transports that sit beneath the browser.
//!
//! Intercepted browser requests are handed to a [`Transport`], which returns
//! the response the page will see. Transports compose as middleware: the
//! login flow wraps either the live network or a replay fixture set in a
//! [`StatusCapture`] that records the status of the credential submission.

pub mod live;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A request leaving the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl OutgoingRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_form(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: vec![(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            )],
            body: Some(body.into()),
        }
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Recording,
    /// Synthesized because nothing matched.
    Synthetic,
}

/// A response handed back to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl ServedResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Something that can answer an intercepted request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, request: &OutgoingRequest) -> Result<ServedResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn round_trip(&self, request: &OutgoingRequest) -> Result<ServedResponse> {
        (**self).round_trip(request).await
    }
}

/// Records the status code of responses whose URL path contains a given
/// fragment (the credential submission endpoint). Other traffic, such as
/// analytics beacons firing after the submission, never overwrites it.
pub struct StatusCapture<T> {
    inner: T,
    path_fragment: String,
    status: AtomicU32,
}

impl<T: Transport> StatusCapture<T> {
    pub fn new(inner: T, path_fragment: impl Into<String>) -> Self {
        Self {
            inner,
            path_fragment: path_fragment.into(),
            status: AtomicU32::new(0),
        }
    }

    /// Forget any previously captured status.
    pub fn reset(&self) {
        self.status.store(0, Ordering::SeqCst);
    }

    /// Status of the most recent matching response, if any.
    pub fn captured(&self) -> Option<u16> {
        match self.status.load(Ordering::SeqCst) {
            0 => None,
            s => u16::try_from(s).ok(),
        }
    }

    fn matches(&self, raw_url: &str) -> bool {
        match url::Url::parse(raw_url) {
            Ok(u) => u.path().contains(&self.path_fragment),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for StatusCapture<T> {
    async fn round_trip(&self, request: &OutgoingRequest) -> Result<ServedResponse> {
        let response = self.inner.round_trip(request).await?;
        if self.matches(&request.url) {
            tracing::debug!(
                "captured submission status {} for {}",
                response.status,
                request.url
            );
            self.status.store(u32::from(response.status), Ordering::SeqCst);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u16);

    #[async_trait]
    impl Transport for Fixed {
        async fn round_trip(&self, _request: &OutgoingRequest) -> Result<ServedResponse> {
            Ok(ServedResponse {
                status: self.0,
                headers: vec![("Content-Type".to_string(), "text/html".to_string())],
                body: b"<html></html>".to_vec(),
                source: ResponseSource::Synthetic,
            })
        }
    }

    #[tokio::test]
    async fn test_status_capture_only_records_submission_endpoint() {
        let capture = StatusCapture::new(Fixed(403), "/DFAUTH85/slod_pe_web/DFServlet");
        assert_eq!(capture.captured(), None);

        capture
            .round_trip(&OutgoingRequest::post_form(
                "https://www.bbvanetcash.pe/DFAUTH85/slod_pe_web/DFServlet",
                "x=1",
            ))
            .await
            .unwrap();
        assert_eq!(capture.captured(), Some(403));

        capture.reset();
        assert_eq!(capture.captured(), None);
    }

    #[tokio::test]
    async fn test_status_capture_ignores_tracking_calls() {
        let capture = StatusCapture::new(Fixed(200), "/DFServlet");
        capture
            .round_trip(&OutgoingRequest::get("https://analytics.example.com/collect?v=1"))
            .await
            .unwrap();
        assert_eq!(capture.captured(), None);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = ServedResponse {
            status: 302,
            headers: vec![("Location".to_string(), "/home".to_string())],
            body: Vec::new(),
            source: ResponseSource::Recording,
        };
        assert_eq!(resp.header("location"), Some("/home"));
        assert_eq!(resp.header("content-type"), None);
    }
}
