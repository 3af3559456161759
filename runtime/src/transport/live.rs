//! Live network transport wrapping reqwest.
//!
//! Redirects are never followed here: the browser follows them itself so
//! every hop passes back through interception. No retries either, since a
//! retried submission would hide the status the login classifier needs.

use super::{OutgoingRequest, ResponseSource, ServedResponse, Transport};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

/// Sends intercepted requests to the real network.
#[derive(Clone)]
pub struct LiveTransport {
    client: reqwest::Client,
}

impl LiveTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for LiveTransport {
    async fn round_trip(&self, request: &OutgoingRequest) -> Result<ServedResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .with_context(|| format!("invalid HTTP method: {}", request.method))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            // reqwest computes these itself.
            if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("host") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let r = builder
            .send()
            .await
            .with_context(|| format!("{} {} failed", request.method, request.url))?;
        let status = r.status().as_u16();

        let headers: Vec<(String, String)> = r
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let body = r
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {}", request.url))?
            .to_vec();

        tracing::debug!("live {} {} -> {}", request.method, request.url, status);

        Ok(ServedResponse {
            status,
            headers,
            body,
            source: ResponseSource::Network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_redirects_are_returned_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/DFAUTH85/slod_pe_web/DFServlet"))
            .and(body_string("user=u1"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "/BBVANet/home.html"),
            )
            .mount(&server)
            .await;

        let transport = LiveTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .round_trip(&OutgoingRequest::post_form(
                format!("{}/DFAUTH85/slod_pe_web/DFServlet", server.uri()),
                "user=u1",
            ))
            .await
            .unwrap();

        assert_eq!(response.status, 302);
        assert_eq!(response.header("location"), Some("/BBVANet/home.html"));
        assert_eq!(response.source, ResponseSource::Network);
    }

    #[tokio::test]
    async fn test_error_statuses_pass_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let transport = LiveTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .round_trip(&OutgoingRequest::get(format!("{}/busy", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.body_text(), "maintenance");
    }
}
