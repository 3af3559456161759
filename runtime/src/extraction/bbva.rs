//! BBVA net cash (Peru) page parsers.
//!
//! The accounts page renders either a list of currency-grouped tables or a
//! grid of product cards, depending on the user's saved view. Both are
//! probed, list first.

use super::locale::{
    currency_from_code, currency_from_symbol, parse_bank_date, parse_spanish_amount,
};
use super::{selector, ParseError};
use crate::model::{Balance, Direction, Transaction};
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html};
use std::collections::BTreeMap;

// Accounts page, list view.
pub const ACCOUNT_TABLE: &str = "bbva-btge-accounts-solution-table.accountsTable";
pub const ACCOUNT_TABLE_CURRENCY_ATTR: &str = "list-group-currency";
pub const TABLE_ROW: &str = "tbody tr:not(.tb_column_header)";
pub const ACCOUNT_DESCRIPTION: &str = ".accountDescription";
pub const AVAILABLE_BALANCE: &str = ".availableBalance";
pub const ACCOUNTED_BALANCE: &str = ".accountedBalance";

// Accounts page, tile view.
pub const ACCOUNT_CARD: &str = "bbva-btge-card-product-select";

// Movements page.
pub const TRANSACTIONS_TABLE: &str = "bbva-btge-accounts-solution-table#moviments-table";
const NO_RESULTS_STATE: &str = "noresults";
const MOVEMENT_CELLS: usize = 7;

// Login and landing pages.
pub const COMPANY_INPUT: &str = "#empresa";
pub const USER_INPUT: &str = "#usuario";
pub const PASSWORD_INPUT: &str = "#clave_acceso_ux";
pub const LOGIN_BUTTON: &str = "button#aceptar, button#enviarSenda";
pub const LOGIN_ERROR_CODE: &str = "div.error-code.error-title";
pub const LOGIN_ERROR_SPAN: &str = "span#error-message";
pub const LOGIN_ERROR_MESSAGE: &str = "h1.title";
pub const DASHBOARD: &str = "table#kyop-boby-table";

/// A movements row as the portal prints it, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMovementRow {
    pub operation_date: NaiveDate,
    pub value_date: NaiveDate,
    pub operation_code: String,
    pub document_number: String,
    pub description: String,
    /// Signed cents: negative for charges.
    pub amount: i64,
    pub office: String,
}

impl RawMovementRow {
    /// Only strictly positive amounts are credits.
    pub fn direction(&self) -> Direction {
        if self.amount > 0 {
            Direction::Credit
        } else {
            Direction::Debit
        }
    }

    pub fn into_transaction(self) -> Transaction {
        let direction = self.direction();
        let mut extra = BTreeMap::new();
        extra.insert("operation_code".to_string(), self.operation_code.clone());
        extra.insert("office".to_string(), self.office);
        Transaction {
            id: self.document_number,
            reference: None,
            operation_date: self.operation_date,
            value_date: self.value_date,
            description: self.description,
            amount: self.amount.unsigned_abs(),
            direction,
            balance_after: None,
            bank_specific_code: Some(self.operation_code),
            extra,
        }
    }
}

/// Error block shown after a rejected login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginErrorBlock {
    /// Portal error code; empty when the page shows only a message.
    pub code: String,
    pub message: String,
}

pub fn parse_account_balances(markup: &str) -> Result<Vec<Balance>, ParseError> {
    parse_account_balances_at(markup, Utc::now())
}

/// Same as [`parse_account_balances`] with an explicit fetch timestamp.
pub fn parse_account_balances_at(
    markup: &str,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<Balance>, ParseError> {
    let doc = Html::parse_document(markup);

    let table_sel = selector(ACCOUNT_TABLE)?;
    let tables: Vec<ElementRef> = doc.select(&table_sel).collect();
    if !tables.is_empty() {
        return parse_list_view(&tables, fetched_at);
    }

    let card_sel = selector(ACCOUNT_CARD)?;
    let cards: Vec<ElementRef> = doc.select(&card_sel).collect();
    if !cards.is_empty() {
        return parse_tile_view(&cards, fetched_at);
    }

    Err(ParseError::NoAccountElements)
}

fn parse_list_view(
    tables: &[ElementRef],
    fetched_at: DateTime<Utc>,
) -> Result<Vec<Balance>, ParseError> {
    let row_sel = selector(TABLE_ROW)?;
    let desc_sel = selector(ACCOUNT_DESCRIPTION)?;
    let avail_sel = selector(AVAILABLE_BALANCE)?;
    let booked_sel = selector(ACCOUNTED_BALANCE)?;

    let mut balances = Vec::new();
    for (t, table) in tables.iter().enumerate() {
        let code = table
            .value()
            .attr(ACCOUNT_TABLE_CURRENCY_ATTR)
            .ok_or(ParseError::MissingCurrency { table: t })?;
        let currency = currency_from_code(code)?;

        for (r, row) in table.select(&row_sel).enumerate() {
            let account_id = first_attr(row, &desc_sel, "text").unwrap_or_default();
            let amounts = first_attr(row, &avail_sel, "amount")
                .ok_or(ParseError::MissingField("available balance amount"))
                .and_then(|s| parse_spanish_amount(&s))
                .and_then(|available| {
                    first_attr(row, &booked_sel, "amount")
                        .ok_or(ParseError::MissingField("accounted balance amount"))
                        .and_then(|s| parse_spanish_amount(&s))
                        .map(|booked| (available, booked))
                });
            let (available_amount, booked_amount) =
                amounts.map_err(|e| ParseError::AccountRow {
                    table: t,
                    row: r,
                    source: Box::new(e),
                })?;

            balances.push(Balance {
                account_id,
                currency,
                available_amount,
                booked_amount,
                fetched_at,
            });
        }
    }
    Ok(balances)
}

fn parse_tile_view(
    cards: &[ElementRef],
    fetched_at: DateTime<Utc>,
) -> Result<Vec<Balance>, ParseError> {
    let mut balances = Vec::new();
    for (i, card) in cards.iter().enumerate() {
        let el = card.value();
        // The "all accounts" overview card has no amount.
        let amount = match el.attr("product-amount") {
            Some(a) if !a.trim().is_empty() => a,
            _ => continue,
        };

        let parsed = currency_from_symbol(el.attr("product-amount-currency").unwrap_or(""))
            .and_then(|currency| parse_spanish_amount(amount).map(|cents| (currency, cents)));
        let (currency, available_amount) = parsed.map_err(|e| ParseError::Card {
            index: i,
            source: Box::new(e),
        })?;

        balances.push(Balance {
            account_id: el.attr("id").unwrap_or_default().to_string(),
            currency,
            available_amount,
            booked_amount: 0,
            fetched_at,
        });
    }
    Ok(balances)
}

/// Parse the movements table. The explicit no-results state yields an empty list.
pub fn parse_transactions(markup: &str) -> Result<Vec<Transaction>, ParseError> {
    Ok(parse_movement_rows(markup)?
        .into_iter()
        .map(RawMovementRow::into_transaction)
        .collect())
}

pub fn parse_movement_rows(markup: &str) -> Result<Vec<RawMovementRow>, ParseError> {
    let doc = Html::parse_document(markup);
    let table_sel = selector(TRANSACTIONS_TABLE)?;
    let table = doc
        .select(&table_sel)
        .next()
        .ok_or(ParseError::TableNotFound(TRANSACTIONS_TABLE))?;

    if table.value().attr("state") == Some(NO_RESULTS_STATE) {
        return Ok(Vec::new());
    }

    let row_sel = selector(TABLE_ROW)?;
    table
        .select(&row_sel)
        .enumerate()
        .map(|(index, row)| {
            parse_movement_row(row).map_err(|e| ParseError::Row {
                index,
                source: Box::new(e),
            })
        })
        .collect()
}

fn parse_movement_row(row: ElementRef) -> Result<RawMovementRow, ParseError> {
    let cells: Vec<String> = row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "td")
        .map(cell_value)
        .collect();
    if cells.len() < MOVEMENT_CELLS {
        return Err(ParseError::MissingCells {
            found: cells.len(),
            expected: MOVEMENT_CELLS,
        });
    }

    Ok(RawMovementRow {
        operation_date: parse_bank_date(&cells[0])?,
        value_date: parse_bank_date(&cells[1])?,
        operation_code: cells[2].clone(),
        document_number: cells[3].clone(),
        description: cells[4].clone(),
        amount: parse_spanish_amount(&cells[5])?,
        office: cells[6].clone(),
    })
}

/// Portal cells wrap their value in a custom element attribute; plain cells hold text.
fn cell_value(cell: ElementRef) -> String {
    let custom = cell
        .children()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name().contains('-'));
    if let Some(el) = custom {
        if let Some(v) = el.value().attr("text").or_else(|| el.value().attr("amount")) {
            return v.trim().to_string();
        }
    }
    cell.text().collect::<String>().trim().to_string()
}

/// Look for the login error block. Only a code or a message is required.
pub fn detect_login_error(markup: &str) -> Result<Option<LoginErrorBlock>, ParseError> {
    let doc = Html::parse_document(markup);
    let code = joined_text(&doc, LOGIN_ERROR_CODE)?;
    let mut message = joined_text(&doc, LOGIN_ERROR_SPAN)?;
    if message.is_empty() {
        message = joined_text(&doc, LOGIN_ERROR_MESSAGE)?;
    }

    if code.is_empty() && message.is_empty() {
        return Ok(None);
    }
    Ok(Some(LoginErrorBlock { code, message }))
}

/// Post-login landing page marker.
pub fn has_dashboard(markup: &str) -> Result<bool, ParseError> {
    contains(markup, DASHBOARD)
}

/// The login form is visible, which after login means the session is gone.
pub fn has_login_form(markup: &str) -> Result<bool, ParseError> {
    Ok(contains(markup, COMPANY_INPUT)? && contains(markup, PASSWORD_INPUT)?)
}

fn contains(markup: &str, css: &str) -> Result<bool, ParseError> {
    let sel = selector(css)?;
    Ok(Html::parse_document(markup).select(&sel).next().is_some())
}

fn joined_text(doc: &Html, css: &str) -> Result<String, ParseError> {
    let sel = selector(css)?;
    Ok(doc
        .select(&sel)
        .flat_map(|el| el.text())
        .collect::<String>()
        .trim()
        .to_string())
}

fn first_attr(scope: ElementRef, sel: &scraper::Selector, attr: &str) -> Option<String> {
    scope
        .select(sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
