//! In-memory page backed by a transport, for driving bank flows offline.
//!
//! Navigation issues a GET through the intercepting transport; clicking a
//! button submits its enclosing form as a url-encoded POST. Scripts are not
//! supported, so flattening always falls back to the served markup.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bank_scraper::renderer::{NavigationResult, RenderContext, Renderer};
use bank_scraper::transport::{OutgoingRequest, Transport};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Every request a page sent, in order.
#[derive(Default)]
pub struct RequestLog {
    requests: Mutex<Vec<OutgoingRequest>>,
}

impl RequestLog {
    pub fn all(&self) -> Vec<OutgoingRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(&self, request: OutgoingRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

pub struct ReplayRenderer {
    pub opened: AtomicUsize,
    pub active: Arc<AtomicUsize>,
    pub requests: Arc<RequestLog>,
    /// Artificial delay per navigation.
    pub latency: Duration,
}

impl ReplayRenderer {
    pub fn new() -> Self {
        Self {
            opened: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(RequestLog::default()),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl Renderer for ReplayRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ReplayPage {
            transport: None,
            url: "about:blank".to_string(),
            html: "<html><head></head><body></body></html>".to_string(),
            fields: HashMap::new(),
            active: self.active.clone(),
            requests: self.requests.clone(),
            latency: self.latency,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

pub struct ReplayPage {
    transport: Option<Arc<dyn Transport>>,
    url: String,
    html: String,
    /// Filled values keyed by input name.
    fields: HashMap<String, String>,
    active: Arc<AtomicUsize>,
    requests: Arc<RequestLog>,
    latency: Duration,
}

impl ReplayPage {
    async fn load(&mut self, request: OutgoingRequest) -> Result<()> {
        let transport = self
            .transport
            .clone()
            .ok_or_else(|| anyhow!("no transport installed"))?;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.requests.push(request.clone());
        let response = transport.round_trip(&request).await?;
        self.url = request.url;
        self.html = response.body_text();
        self.fields.clear();
        Ok(())
    }

    fn form_submission(&self, selector: &str) -> Result<OutgoingRequest> {
        let doc = Html::parse_document(&self.html);
        let sel = parse_selector(selector)?;
        let button = doc
            .select(&sel)
            .next()
            .with_context(|| format!("no element matches {selector}"))?;
        let form = button
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "form")
            .with_context(|| format!("{selector} is not inside a form"))?;

        let action = form.value().attr("action").unwrap_or("");
        let target = url::Url::parse(&self.url)
            .and_then(|base| base.join(action))
            .context("bad form action")?;

        let input_sel = parse_selector("input[name]")?;
        let mut body = url::form_urlencoded::Serializer::new(String::new());
        for input in form.select(&input_sel) {
            let Some(name) = input.value().attr("name") else {
                continue;
            };
            let value = self
                .fields
                .get(name)
                .map(String::as_str)
                .or_else(|| input.value().attr("value"))
                .unwrap_or("");
            body.append_pair(name, value);
        }
        Ok(OutgoingRequest::post_form(target.as_str(), body.finish()))
    }
}

#[async_trait]
impl RenderContext for ReplayPage {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<NavigationResult> {
        self.load(OutgoingRequest::get(url)).await?;
        Ok(NavigationResult {
            final_url: self.url.clone(),
            load_time_ms: 0,
        })
    }

    async fn wait_stable(&self, _quiet: Duration, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        bail!("scripts are not supported by the replay page")
    }

    async fn get_html(&self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        let doc = Html::parse_document(&self.html);
        let sel = parse_selector(selector)?;
        let input = doc
            .select(&sel)
            .next()
            .with_context(|| format!("no element matches {selector}"))?;
        let key = input
            .value()
            .attr("name")
            .or_else(|| input.value().attr("id"))
            .unwrap_or(selector)
            .to_string();
        self.fields.insert(key, value.to_string());
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let request = self.form_submission(selector)?;
        self.load(request).await
    }

    async fn intercept(&mut self, transport: Arc<dyn Transport>) -> Result<()> {
        self.transport = Some(transport);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css}: {e}"))
}
