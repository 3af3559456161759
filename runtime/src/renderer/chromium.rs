//! Chromium-based renderer using chromiumoxide.

use super::{NavigationResult, RenderContext, Renderer};
use crate::config::data_dir;
use crate::transport::{OutgoingRequest, Transport};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, FulfillRequestParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Interval between DOM stability probes.
const STABILITY_POLL: Duration = Duration::from_millis(100);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. BANK_SCRAPER_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("BANK_SCRAPER_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.bank-scraper/chromium/
    let local = data_dir().join("chromium");
    let candidates = if cfg!(target_os = "macos") {
        vec![
            local.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            local.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            local.join("chrome"),
        ]
    } else {
        vec![local.join("chrome-linux64/chrome"), local.join("chrome")]
    };
    if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
        return Some(found);
    }

    // 3. System PATH
    ["google-chrome", "chromium", "chromium-browser"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Browser,
    handler_task: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance.
    pub async fn new() -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Set BANK_SCRAPER_CHROMIUM_PATH or install Chrome.")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler error: {e}");
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            interceptor: None,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.handler_task.abort();
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    interceptor: Option<JoinHandle<()>>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumContext {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .context("JS execution failed")?
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(timeout, self.page.goto(url)).await;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                let final_url = self.get_url().await.unwrap_or_else(|_| url.to_string());
                Ok(NavigationResult {
                    final_url,
                    load_time_ms: start.elapsed().as_millis() as u64,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {}ms", timeout.as_millis()),
        }
    }

    async fn wait_stable(&self, quiet: Duration, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut last = String::new();
        let mut unchanged_since = Instant::now();

        loop {
            let probe: String = self
                .eval(
                    "document.readyState + ':' + document.getElementsByTagName('*').length \
                     + ':' + document.documentElement.outerHTML.length"
                        .to_string(),
                )
                .await?;

            if probe != last || !probe.starts_with("complete:") {
                last = probe;
                unchanged_since = Instant::now();
            } else if unchanged_since.elapsed() >= quiet {
                return Ok(());
            }

            if Instant::now() >= deadline {
                bail!("page did not settle within {}ms", timeout.as_millis());
            }
            tokio::time::sleep(STABILITY_POLL).await;
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        self.eval(script.to_string()).await
    }

    async fn get_html(&self) -> Result<String> {
        self.page.content().await.context("failed to get HTML")
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.focus(); el.value = {val}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
            sel = serde_json::to_string(selector)?,
            val = serde_json::to_string(value)?,
        );
        let found: bool = self.eval(script).await?;
        if !found {
            bail!("no element matches {selector}");
        }
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.click(); return true; }})()",
            sel = serde_json::to_string(selector)?,
        );
        let found: bool = self.eval(script).await?;
        if !found {
            bail!("no element matches {selector}");
        }
        Ok(())
    }

    async fn intercept(&mut self, transport: Arc<dyn Transport>) -> Result<()> {
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .context("failed to subscribe to paused requests")?;
        self.page
            .execute(EnableParams::default())
            .await
            .context("failed to enable request interception")?;

        let page = self.page.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                if let Err(e) = answer_paused(&page, transport.as_ref(), &event).await {
                    tracing::warn!("interception failed: {e:#}");
                }
            }
        });

        if let Some(previous) = self.interceptor.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if let Some(task) = &self.interceptor {
            task.abort();
        }
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}

/// Answer one paused request from the transport. The protocol types are
/// read and built through their JSON form so only wire field names matter.
async fn answer_paused(
    page: &Page,
    transport: &dyn Transport,
    event: &EventRequestPaused,
) -> Result<()> {
    let raw = serde_json::to_value(event).context("unreadable paused request")?;
    let request_id = raw["requestId"].clone();
    let request = outgoing_from_event(&raw["request"]);

    match transport.round_trip(&request).await {
        Ok(response) => {
            let headers: Vec<serde_json::Value> = response
                .headers
                .iter()
                .map(|(name, value)| serde_json::json!({ "name": name, "value": value }))
                .collect();
            let params: FulfillRequestParams = serde_json::from_value(serde_json::json!({
                "requestId": request_id,
                "responseCode": response.status,
                "responseHeaders": headers,
                "body": base64::engine::general_purpose::STANDARD.encode(&response.body),
            }))
            .context("failed to build fulfill params")?;
            page.execute(params).await.context("fulfill failed")?;
        }
        Err(e) => {
            tracing::warn!("{} {} failed: {e:#}", request.method, request.url);
            let params: FailRequestParams = serde_json::from_value(serde_json::json!({
                "requestId": request_id,
                "errorReason": "Failed",
            }))
            .context("failed to build fail params")?;
            page.execute(params).await.context("fail request failed")?;
        }
    }
    Ok(())
}

fn outgoing_from_event(request: &serde_json::Value) -> OutgoingRequest {
    let headers = request["headers"]
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                .collect()
        })
        .unwrap_or_default();
    OutgoingRequest {
        method: request["method"].as_str().unwrap_or("GET").to_string(),
        url: request["url"].as_str().unwrap_or_default().to_string(),
        headers,
        body: request["postData"].as_str().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ResponseSource, ServedResponse};

    #[test]
    fn test_outgoing_request_from_protocol_json() {
        let raw = serde_json::json!({
            "url": "https://www.bbvanetcash.pe/DFAUTH85/slod_pe_web/DFServlet",
            "method": "POST",
            "headers": { "Content-Type": "application/x-www-form-urlencoded" },
            "postData": "eai_user=u1"
        });
        let request = outgoing_from_event(&raw);
        assert_eq!(request.method, "POST");
        assert_eq!(request.body.as_deref(), Some("eai_user=u1"));
        assert_eq!(
            request.headers,
            vec![(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string()
            )]
        );
    }

    struct Canned;

    #[async_trait]
    impl Transport for Canned {
        async fn round_trip(&self, _request: &OutgoingRequest) -> Result<ServedResponse> {
            Ok(ServedResponse {
                status: 200,
                headers: vec![("Content-Type".to_string(), "text/html".to_string())],
                body: b"<html><body><h1>Intercepted</h1></body></html>".to_vec(),
                source: ResponseSource::Synthetic,
            })
        }
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_serves_intercepted_page() {
        let renderer = ChromiumRenderer::new()
            .await
            .expect("failed to create renderer");
        let mut ctx = renderer
            .new_context()
            .await
            .expect("failed to create context");

        ctx.intercept(Arc::new(Canned)).await.expect("intercept failed");
        ctx.navigate("https://portal.invalid/", Duration::from_secs(10))
            .await
            .expect("navigation failed");
        ctx.wait_stable(Duration::from_millis(200), Duration::from_secs(5))
            .await
            .expect("page did not settle");

        let result = ctx
            .execute_js("document.querySelector('h1').textContent")
            .await
            .expect("JS execution failed");
        assert_eq!(result.as_str().unwrap(), "Intercepted");

        ctx.close().await.expect("close failed");
        assert_eq!(renderer.active_contexts(), 0);
        renderer.shutdown().await.expect("shutdown failed");
    }
}
