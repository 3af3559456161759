//! An authenticated portal session.

use crate::model::BankCode;
use crate::renderer::RenderContext;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Created on successful login. Owns the page it logged in on; dropping the
/// session without [`Session::close`] leaves the context to the renderer.
pub struct Session {
    pub id: String,
    pub bank: BankCode,
    pub expires_at: DateTime<Utc>,
    context: Option<Box<dyn RenderContext>>,
}

impl Session {
    pub fn new(bank: BankCode, lifetime: Duration, context: Box<dyn RenderContext>) -> Self {
        let lifetime =
            chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::days(1));
        Self {
            id: format!("{}-{}", bank.fixture_dir(), Uuid::new_v4()),
            bank,
            expires_at: Utc::now() + lifetime,
            context: Some(context),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// False once the page has been torn down.
    pub fn is_open(&self) -> bool {
        self.context.is_some()
    }

    pub fn context_mut(&mut self) -> Option<&mut Box<dyn RenderContext>> {
        self.context.as_mut()
    }

    /// Tear down the page, leaving the session unusable.
    pub async fn discard(&mut self) -> Result<()> {
        match self.context.take() {
            Some(ctx) => ctx.close().await,
            None => Ok(()),
        }
    }

    /// Log out by closing the page context.
    pub async fn close(mut self) -> Result<()> {
        tracing::info!("closing {} session {}", self.bank, self.id);
        self.discard().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("bank", &self.bank)
            .field("expires_at", &self.expires_at)
            .field("open", &self.is_open())
            .finish()
    }
}
