//! BBVA net cash (Peru) flow.

use super::{retry_with_backoff, session_error, BankScraper, RetryPolicy};
use crate::cancel::{guard_step, CancelSignal};
use crate::config::BankSettings;
use crate::error::{ErrorCause, ScraperError, ScraperResult};
use crate::extraction::{self, bbva as selectors};
use crate::flatten::{flatten_page, FlattenError, FlattenOptions, FlattenedDocument};
use crate::login::{classify_login, session_invalidated, LoginOutcome, Session};
use crate::model::{Balance, BankCode, Credentials, Transaction};
use crate::renderer::{RenderContext, Renderer};
use crate::transport::{StatusCapture, Transport};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const BASE_URL: &str = "https://www.bbvanetcash.pe";
pub const LOGIN_URL: &str = "https://www.bbvanetcash.pe/DFAUTH85/mult/KDPOSolicitarCredenciales_es.html";
/// Credential submission endpoint. Its status code drives classification.
pub const SUBMISSION_PATH: &str = "/DFAUTH85/slod_pe_web/DFServlet";
pub const ACCOUNTS_URL: &str = "https://www.bbvanetcash.pe/nextgenempresas/portal/cuentas.html";
pub const MOVEMENTS_URL: &str = "https://www.bbvanetcash.pe/nextgenempresas/portal/movimientos.html";

const BANK: BankCode = BankCode::Bbva;

pub struct BbvaScraper {
    renderer: Arc<dyn Renderer>,
    transport: Arc<dyn Transport>,
    settings: BankSettings,
    retry: RetryPolicy,
}

impl BbvaScraper {
    /// `transport` answers every request the page makes: the live network
    /// or a replay fixture set.
    pub fn new(
        renderer: Arc<dyn Renderer>,
        transport: Arc<dyn Transport>,
        settings: BankSettings,
    ) -> Self {
        Self {
            renderer,
            transport,
            settings,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    async fn login_once(
        &self,
        credentials: &Credentials,
        cancel: &CancelSignal,
    ) -> ScraperResult<LoginOutcome<Session>> {
        let mut ctx = self.renderer.new_context().await.map_err(|e| {
            ScraperError::new(
                BANK,
                "Login",
                ErrorCause::BankUnavailable,
                format!("failed to open page: {e:#}"),
            )
        })?;

        let outcome = match self.submit_login(ctx.as_mut(), credentials, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                close_quietly(ctx).await;
                return Err(e);
            }
        };

        match outcome.into_success() {
            Ok(()) => {
                let session = Session::new(BANK, self.settings.session_lifetime(), ctx);
                tracing::info!("logged in to {BANK}, session {}", session.id);
                Ok(LoginOutcome::Success(session))
            }
            Err(failure) => {
                tracing::info!("{BANK} login did not succeed: {failure:?}");
                close_quietly(ctx).await;
                Ok(failure)
            }
        }
    }

    async fn submit_login(
        &self,
        ctx: &mut dyn RenderContext,
        credentials: &Credentials,
        cancel: &CancelSignal,
    ) -> ScraperResult<LoginOutcome<()>> {
        const OP: &str = "Login";
        let script = self.settings.script_timeout();

        let capture = Arc::new(StatusCapture::new(self.transport.clone(), SUBMISSION_PATH));
        ctx.intercept(capture.clone()).await.map_err(|e| {
            ScraperError::new(
                BANK,
                OP,
                ErrorCause::BankUnavailable,
                format!("request interception: {e:#}"),
            )
        })?;

        step(
            cancel,
            self.settings.navigation_timeout(),
            OP,
            ErrorCause::BankUnavailable,
            "login page",
            ctx.navigate(LOGIN_URL, self.settings.navigation_timeout()),
        )
        .await?;
        self.wait_stable(ctx, OP, cancel).await?;

        for (selector, value, field) in [
            (selectors::COMPANY_INPUT, credentials.company_code.as_str(), "company input"),
            (selectors::USER_INPUT, credentials.user_code.as_str(), "user input"),
            (selectors::PASSWORD_INPUT, credentials.password.as_str(), "password input"),
        ] {
            step(cancel, script, OP, ErrorCause::Unknown, field, ctx.fill(selector, value)).await?;
        }

        capture.reset();
        step(
            cancel,
            self.settings.navigation_timeout(),
            OP,
            ErrorCause::BankUnavailable,
            "submit",
            ctx.click(selectors::LOGIN_BUTTON),
        )
        .await?;
        self.wait_stable(ctx, OP, cancel).await?;

        let doc = self.flatten(ctx, OP, cancel).await?;
        let status = capture.captured();
        tracing::debug!("{BANK} submission status {status:?}");
        Ok(classify_login(BANK, status, &doc.markup))
    }

    async fn wait_stable(
        &self,
        ctx: &dyn RenderContext,
        operation: &'static str,
        cancel: &CancelSignal,
    ) -> ScraperResult<()> {
        let limit = self.settings.stability_timeout();
        step(
            cancel,
            limit,
            operation,
            ErrorCause::Timeout,
            "wait for stable DOM",
            ctx.wait_stable(self.settings.stability_quiet(), limit),
        )
        .await
    }

    async fn flatten(
        &self,
        ctx: &dyn RenderContext,
        operation: &'static str,
        cancel: &CancelSignal,
    ) -> ScraperResult<FlattenedDocument> {
        let options = FlattenOptions::from_settings(&self.settings);
        flatten_page(ctx, &options, cancel).await.map_err(|e| {
            let cause = match &e {
                FlattenError::Cancelled => ErrorCause::Cancelled,
                FlattenError::Timeout(_) => ErrorCause::Timeout,
                FlattenError::Page(_) => ErrorCause::Unknown,
            };
            ScraperError::new(BANK, operation, cause, e.to_string())
        })
    }

    /// Load an authenticated page and return its flattened markup. A
    /// cancelled load tears the session down.
    async fn load_page(
        &self,
        session: &mut Session,
        url: &str,
        operation: &'static str,
        cancel: &CancelSignal,
    ) -> ScraperResult<String> {
        if let Some(e) = session_error(session, operation) {
            return Err(e);
        }
        let result = match session.context_mut() {
            Some(ctx) => self.load_in(ctx.as_mut(), url, operation, cancel).await,
            None => return Err(closed(operation)),
        };

        if matches!(&result, Err(e) if e.cause == ErrorCause::Cancelled) {
            if let Err(e) = session.discard().await {
                tracing::debug!("closing cancelled session page: {e:#}");
            }
        }
        result
    }

    async fn load_in(
        &self,
        ctx: &mut dyn RenderContext,
        url: &str,
        operation: &'static str,
        cancel: &CancelSignal,
    ) -> ScraperResult<String> {
        let nav = self.settings.navigation_timeout();
        step(
            cancel,
            nav,
            operation,
            ErrorCause::BankUnavailable,
            "navigate",
            ctx.navigate(url, nav),
        )
        .await?;
        self.wait_stable(ctx, operation, cancel).await?;
        let doc = self.flatten(ctx, operation, cancel).await?;

        let invalidated = session_invalidated(BANK, &doc.markup)
            .map_err(|e| e.into_scraper_error(BANK, operation))?;
        if invalidated {
            return Err(ScraperError::new(
                BANK,
                operation,
                ErrorCause::SessionExpired,
                "portal returned to the login form",
            ));
        }
        Ok(doc.markup)
    }
}

#[async_trait]
impl BankScraper for BbvaScraper {
    fn bank(&self) -> BankCode {
        BANK
    }

    async fn login(
        &self,
        credentials: &Credentials,
        cancel: &CancelSignal,
    ) -> ScraperResult<LoginOutcome<Session>> {
        tracing::info!("logging in to {BANK}");
        retry_with_backoff(&self.retry, cancel, move || self.login_once(credentials, cancel)).await
    }

    async fn fetch_balances(
        &self,
        session: &mut Session,
        cancel: &CancelSignal,
    ) -> ScraperResult<Vec<Balance>> {
        const OP: &str = "FetchBalances";
        let markup = self.load_page(session, ACCOUNTS_URL, OP, cancel).await?;
        let balances = extraction::parse_balances(BANK, &markup)
            .map_err(|e| e.into_scraper_error(BANK, OP))?;
        tracing::info!("fetched {} {BANK} balances", balances.len());
        Ok(balances)
    }

    async fn fetch_transactions(
        &self,
        session: &mut Session,
        account_id: &str,
        cancel: &CancelSignal,
    ) -> ScraperResult<Vec<Transaction>> {
        const OP: &str = "FetchTransactions";
        let url = url::Url::parse_with_params(MOVEMENTS_URL, &[("account", account_id)])
            .map_err(|e| ScraperError::new(BANK, OP, ErrorCause::Unknown, e.to_string()))?;
        let markup = self.load_page(session, url.as_str(), OP, cancel).await?;
        let transactions = extraction::parse_transactions(BANK, &markup)
            .map_err(|e| e.into_scraper_error(BANK, OP))?;
        tracing::info!("fetched {} {BANK} transactions", transactions.len());
        Ok(transactions)
    }
}

async fn step<T, F>(
    cancel: &CancelSignal,
    limit: Duration,
    operation: &'static str,
    failure: ErrorCause,
    name: &str,
    fut: F,
) -> ScraperResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    guard_step(cancel, limit, fut)
        .await
        .map_err(|e| e.into_scraper_error(BANK, operation, failure, name))
}

fn closed(operation: &'static str) -> ScraperError {
    ScraperError::new(BANK, operation, ErrorCause::SessionExpired, "session is closed")
}

async fn close_quietly(ctx: Box<dyn RenderContext>) {
    if let Err(e) = ctx.close().await {
        tracing::debug!("closing page: {e:#}");
    }
}
