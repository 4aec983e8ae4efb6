// src/adapter/cli.rs
// Interactive operator menu

use std::io::{BufRead, Write};
use std::sync::Arc;

use crate::application::dto::{normalize_symbol, OrderTicket};
use crate::application::usecase::{OrderPipeline, PlaceOptions};
use crate::domain::errors::{AppResult, OrderError, PipelineError, TrackerError};
use crate::domain::model::{AccountBalance, OrderRecord};

const OVERRIDE_WORD: &str = "OVERRIDE";

#[derive(Debug, Clone, Copy, PartialEq)]
enum TicketKind {
    Market,
    Limit,
    StopLimit,
}

/// Menu loop over any line-based input and output
pub struct OperatorMenu<R, W> {
    pipeline: Arc<OrderPipeline>,
    input: R,
    output: W,
    testnet: bool,
}

impl<R: BufRead, W: Write> OperatorMenu<R, W> {
    pub fn new(pipeline: Arc<OrderPipeline>, input: R, output: W, testnet: bool) -> Self {
        Self {
            pipeline,
            input,
            output,
            testnet,
        }
    }

    /// Run until the operator exits or input ends
    pub async fn run(&mut self) -> AppResult<()> {
        loop {
            self.print_menu()?;
            let Some(choice) = self.prompt("Select option: ")? else {
                break;
            };

            match choice.as_str() {
                "1" => self.place(TicketKind::Market).await?,
                "2" => self.place(TicketKind::Limit).await?,
                "3" => self.place(TicketKind::StopLimit).await?,
                "4" => self.status().await?,
                "5" => self.cancel().await?,
                "6" => self.balance().await?,
                "7" => self.price().await?,
                "8" => self.list_orders().await?,
                "0" | "q" | "exit" => break,
                other => writeln!(self.output, "Unknown option: {}", other)?,
            }
        }
        writeln!(self.output, "Goodbye!")?;
        log::info!("Operator session ended");
        Ok(())
    }

    fn print_menu(&mut self) -> AppResult<()> {
        let mode = if self.testnet { "TESTNET" } else { "LIVE" };
        writeln!(self.output)?;
        writeln!(self.output, "=== Futures Order Bot ({}) ===", mode)?;
        writeln!(self.output, "1. Place market order")?;
        writeln!(self.output, "2. Place limit order")?;
        writeln!(self.output, "3. Place stop-limit order")?;
        writeln!(self.output, "4. Order status")?;
        writeln!(self.output, "5. Cancel order")?;
        writeln!(self.output, "6. Account balance")?;
        writeln!(self.output, "7. Current price")?;
        writeln!(self.output, "8. Session orders")?;
        writeln!(self.output, "0. Exit")?;
        Ok(())
    }

    /// One trimmed line, or `None` at end of input
    fn prompt(&mut self, label: &str) -> AppResult<Option<String>> {
        write!(self.output, "{}", label)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    async fn place(&mut self, kind: TicketKind) -> AppResult<()> {
        let Some(symbol) = self.prompt("Symbol (e.g. BTCUSDT): ")? else {
            return Ok(());
        };
        let Some(side) = self.prompt("Side (BUY/SELL): ")? else {
            return Ok(());
        };
        let Some(quantity) = self.prompt("Quantity: ")? else {
            return Ok(());
        };

        let ticket = match kind {
            TicketKind::Market => OrderTicket::market(&symbol, &side, &quantity),
            TicketKind::Limit => {
                let Some(price) = self.prompt("Limit price: ")? else {
                    return Ok(());
                };
                OrderTicket::limit(&symbol, &side, &quantity, &price)
            }
            TicketKind::StopLimit => {
                let Some(stop_price) = self.prompt("Stop price: ")? else {
                    return Ok(());
                };
                let Some(price) = self.prompt("Limit price: ")? else {
                    return Ok(());
                };
                OrderTicket::stop_limit(&symbol, &side, &quantity, &stop_price, &price)
            }
        };

        if let Ok(normalized) = normalize_symbol(&symbol) {
            match self.pipeline.current_price(&normalized).await {
                Ok(price) => writeln!(self.output, "Current {} price: {}", normalized, price)?,
                Err(e) => writeln!(self.output, "Current price unavailable: {}", e)?,
            }
        }

        writeln!(
            self.output,
            "Order: {:?} {} {} {}{}{}",
            kind,
            side.trim().to_uppercase(),
            quantity,
            symbol.trim().to_uppercase(),
            ticket
                .stop_price
                .as_deref()
                .map(|s| format!(" stop {}", s))
                .unwrap_or_default(),
            ticket
                .price
                .as_deref()
                .map(|p| format!(" @ {}", p))
                .unwrap_or_default(),
        )?;
        if !self.confirm("Confirm order? (y/N): ")? {
            writeln!(self.output, "Order cancelled")?;
            return Ok(());
        }

        match self.pipeline.place_ticket(ticket.clone(), PlaceOptions::default()).await {
            Ok(record) => self.show_record("Order placed", &record)?,
            Err(e) if e.is_safety() => {
                self.show_error(&e)?;
                writeln!(self.output, "WARNING: this order exceeds the configured maximum order value.")?;
                let answer = self.prompt(&format!("Type {} to submit anyway: ", OVERRIDE_WORD))?;
                if answer.as_deref() == Some(OVERRIDE_WORD) {
                    log::warn!("Operator override of safety check for {}", e.symbol);
                    let options = PlaceOptions { bypass_safety: true };
                    match self.pipeline.place_ticket(ticket, options).await {
                        Ok(record) => self.show_record("Order placed", &record)?,
                        Err(e) => self.show_error(&e)?,
                    }
                } else {
                    writeln!(self.output, "Order not submitted")?;
                }
            }
            Err(e) => self.show_error(&e)?,
        }
        Ok(())
    }

    async fn status(&mut self) -> AppResult<()> {
        let Some(id) = self.prompt("Order id: ")? else {
            return Ok(());
        };

        match self.pipeline.status(&id).await {
            Ok(record) => self.show_record("Order status", &record)?,
            Err(PipelineError {
                kind: OrderError::Tracker(TrackerError::NotFound(_)),
                ..
            }) => {
                // Not from this session; ask the exchange directly
                let Some(symbol) = self.prompt("Not tracked this session. Symbol: ")? else {
                    return Ok(());
                };
                let symbol = match normalize_symbol(&symbol) {
                    Ok(symbol) => symbol,
                    Err(e) => {
                        writeln!(self.output, "Error: {}", e)?;
                        return Ok(());
                    }
                };
                match self.pipeline.query_exchange_order(&symbol, &id).await {
                    Ok(snapshot) => writeln!(
                        self.output,
                        "Order {} {}: {} ({}), executed {}/{}{}",
                        snapshot.order_id,
                        snapshot.symbol,
                        snapshot.status,
                        snapshot.raw_status,
                        snapshot.executed_quantity,
                        snapshot.orig_quantity,
                        snapshot
                            .average_price
                            .map(|p| format!(" @ {}", p))
                            .unwrap_or_default()
                    )?,
                    Err(e) => self.show_error(&e)?,
                }
            }
            Err(e) => self.show_error(&e)?,
        }
        Ok(())
    }

    async fn cancel(&mut self) -> AppResult<()> {
        let Some(id) = self.prompt("Order id to cancel: ")? else {
            return Ok(());
        };
        if !self.confirm(&format!("Cancel order {}? (y/N): ", id))? {
            return Ok(());
        }
        match self.pipeline.cancel(&id).await {
            Ok(record) => self.show_record("Order cancelled", &record)?,
            Err(e) => self.show_error(&e)?,
        }
        Ok(())
    }

    async fn balance(&mut self) -> AppResult<()> {
        match self.pipeline.account_balance().await {
            Ok(balance) => self.show_balance(&balance)?,
            Err(e) => self.show_error(&e)?,
        }
        Ok(())
    }

    async fn price(&mut self) -> AppResult<()> {
        let Some(symbol) = self.prompt("Symbol: ")? else {
            return Ok(());
        };
        let symbol = match normalize_symbol(&symbol) {
            Ok(symbol) => symbol,
            Err(e) => {
                writeln!(self.output, "Error: {}", e)?;
                return Ok(());
            }
        };
        match self.pipeline.current_price(&symbol).await {
            Ok(price) => writeln!(self.output, "{}: {}", symbol, price)?,
            Err(e) => self.show_error(&e)?,
        }
        Ok(())
    }

    async fn list_orders(&mut self) -> AppResult<()> {
        let orders = self.pipeline.orders().await;
        if orders.is_empty() {
            writeln!(self.output, "No orders this session")?;
            return Ok(());
        }
        for record in &orders {
            writeln!(self.output, "{}", render_record(record))?;
        }
        Ok(())
    }

    fn confirm(&mut self, label: &str) -> AppResult<bool> {
        let answer = self.prompt(label)?.unwrap_or_default();
        Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
    }

    fn show_record(&mut self, title: &str, record: &OrderRecord) -> AppResult<()> {
        writeln!(self.output, "{}: {}", title, render_record(record))?;
        Ok(())
    }

    fn show_balance(&mut self, balance: &AccountBalance) -> AppResult<()> {
        writeln!(self.output, "Wallet balance:    {} USDT", balance.total_wallet_balance)?;
        writeln!(self.output, "Unrealized PnL:    {} USDT", balance.total_unrealized_pnl)?;
        writeln!(self.output, "Margin balance:    {} USDT", balance.total_margin_balance)?;
        writeln!(self.output, "Available balance: {} USDT", balance.available_balance)?;
        Ok(())
    }

    fn show_error(&mut self, error: &PipelineError) -> AppResult<()> {
        match error.exchange_code() {
            Some(code) => writeln!(self.output, "Error: {} (exchange code {})", error, code)?,
            None => writeln!(self.output, "Error: {}", error)?,
        }
        Ok(())
    }
}

pub fn render_record(record: &OrderRecord) -> String {
    let mut line = format!(
        "{} [{}] {} {} {} {} - {}",
        record.client_request_id,
        record
            .exchange_order_id
            .as_deref()
            .unwrap_or("unacknowledged"),
        record.symbol,
        record.side,
        record.quantity,
        record.kind,
        record.status
    );
    if record.executed_quantity > rust_decimal::Decimal::ZERO {
        line.push_str(&format!(" (executed {})", record.executed_quantity));
    }
    if let Some(reason) = &record.failure {
        line.push_str(&format!(": {}", reason));
    }
    line
}
