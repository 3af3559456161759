//! Browser abstraction.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over the
//! browser engine (Chromium via chromiumoxide). Bank flows only ever talk to
//! these traits, so the same flow runs against a real browser or an
//! in-memory page backed by replay fixtures.

pub mod chromium;

use crate::transport::Transport;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create page contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new, isolated page context.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open contexts.
    fn active_contexts(&self) -> usize;
}

/// A single page, driven sequentially by one session.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationResult>;
    /// Wait until the document stops changing for `quiet`.
    async fn wait_stable(&self, quiet: Duration, timeout: Duration) -> Result<()>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the page HTML (light DOM only).
    async fn get_html(&self) -> Result<String>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Set the value of the first element matching `selector`.
    async fn fill(&mut self, selector: &str, value: &str) -> Result<()>;
    /// Click the first element matching `selector`.
    async fn click(&mut self, selector: &str) -> Result<()>;
    /// Route every request the page makes through `transport`.
    async fn intercept(&mut self, transport: Arc<dyn Transport>) -> Result<()>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}
