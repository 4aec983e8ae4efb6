// src/application/usecase/order_tracker.rs
// In-memory lifecycle of the orders submitted this session

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::errors::{CancelError, TrackerError};
use crate::domain::model::{NormalizedOrder, OrderRecord, OrderSnapshot, OrderStatus};

/// Owns every `OrderRecord`; all status changes go through `transition`
/// so a record can never leave a terminal state.
#[derive(Debug, Default)]
pub struct OrderLifecycleTracker {
    records: HashMap<String, OrderRecord>,
    by_exchange_id: HashMap<String, String>,
    sequence: Vec<String>,
}

impl OrderLifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an order that is about to be dispatched
    pub fn open(&mut self, client_id: &str, order: &NormalizedOrder) -> OrderRecord {
        let now = Utc::now();
        let record = OrderRecord {
            client_request_id: client_id.to_string(),
            exchange_order_id: None,
            symbol: order.symbol.clone(),
            side: order.side,
            kind: order.kind,
            quantity: order.quantity,
            executed_quantity: Decimal::ZERO,
            status: OrderStatus::Pending,
            failure: None,
            submitted_at: now,
            last_updated_at: now,
        };
        if self.records.insert(client_id.to_string(), record.clone()).is_none() {
            self.sequence.push(client_id.to_string());
        }
        log::debug!("Tracking order {} ({} {})", client_id, order.side, order.symbol);
        record
    }

    /// Attach the exchange acknowledgment to a pending order
    pub fn record(&mut self, client_id: &str, ack: &OrderSnapshot) -> Result<OrderRecord, TrackerError> {
        let record = self
            .records
            .get_mut(client_id)
            .ok_or_else(|| TrackerError::NotFound(client_id.to_string()))?;

        // The acknowledgment always lands in SUBMITTED at least
        let status = match ack.status {
            OrderStatus::Pending => OrderStatus::Submitted,
            other => other,
        };
        transition(record, status)?;
        record.exchange_order_id = Some(ack.order_id.clone());
        record.executed_quantity = ack.executed_quantity;

        self.by_exchange_id
            .insert(ack.order_id.clone(), client_id.to_string());
        log::info!(
            "Order {} acknowledged as {} ({})",
            client_id,
            ack.order_id,
            record.status
        );
        Ok(record.clone())
    }

    /// Unrecoverable executor error
    pub fn fail(&mut self, client_id: &str, reason: &str) -> Result<OrderRecord, TrackerError> {
        self.close(client_id, OrderStatus::Failed, reason)
    }

    /// Permanent exchange rejection
    pub fn reject(&mut self, client_id: &str, reason: &str) -> Result<OrderRecord, TrackerError> {
        self.close(client_id, OrderStatus::Rejected, reason)
    }

    fn close(&mut self, client_id: &str, status: OrderStatus, reason: &str) -> Result<OrderRecord, TrackerError> {
        let record = self
            .records
            .get_mut(client_id)
            .ok_or_else(|| TrackerError::NotFound(client_id.to_string()))?;
        transition(record, status)?;
        record.failure = Some(reason.to_string());
        log::warn!("Order {} marked {}: {}", client_id, status, reason);
        Ok(record.clone())
    }

    /// Fold a fresh exchange snapshot into the record.
    /// Snapshots that would move the record backwards are refused.
    pub fn apply(&mut self, id: &str, snapshot: &OrderSnapshot) -> Result<OrderRecord, TrackerError> {
        let key = self.resolve(id)?;
        let record = self
            .records
            .get_mut(&key)
            .ok_or_else(|| TrackerError::NotFound(id.to_string()))?;

        if record.status != snapshot.status {
            transition(record, snapshot.status)?;
        } else {
            record.last_updated_at = Utc::now();
        }
        record.executed_quantity = record.executed_quantity.max(snapshot.executed_quantity);
        if record.exchange_order_id.is_none() {
            record.exchange_order_id = Some(snapshot.order_id.clone());
            self.by_exchange_id.insert(snapshot.order_id.clone(), key);
        }
        Ok(record.clone())
    }

    /// Record by client request id or exchange order id
    pub fn status(&self, id: &str) -> Result<OrderRecord, TrackerError> {
        let key = self.resolve(id)?;
        self.records
            .get(&key)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(id.to_string()))
    }

    /// The record, if it may still be cancelled
    pub fn check_cancellable(&self, id: &str) -> Result<OrderRecord, CancelError> {
        let record = self
            .status(id)
            .map_err(|_| CancelError::NotFound(id.to_string()))?;
        if !record.status.is_cancellable() {
            return Err(CancelError::AlreadyTerminal {
                id: id.to_string(),
                status: record.status,
            });
        }
        Ok(record)
    }

    /// Apply the exchange's answer to a cancel request
    pub fn cancel(&mut self, id: &str, snapshot: &OrderSnapshot) -> Result<OrderRecord, CancelError> {
        let current = self.check_cancellable(id)?;
        match self.apply(id, snapshot) {
            Ok(record) => Ok(record),
            Err(TrackerError::NotFound(_)) => Err(CancelError::NotFound(id.to_string())),
            Err(TrackerError::IllegalTransition { .. }) => Err(CancelError::AlreadyTerminal {
                id: id.to_string(),
                status: current.status,
            }),
        }
    }

    /// All records in submission order
    pub fn records(&self) -> Vec<OrderRecord> {
        self.sequence
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }

    fn resolve(&self, id: &str) -> Result<String, TrackerError> {
        if self.records.contains_key(id) {
            return Ok(id.to_string());
        }
        self.by_exchange_id
            .get(id)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(id.to_string()))
    }
}

fn transition(record: &mut OrderRecord, next: OrderStatus) -> Result<(), TrackerError> {
    if !record.status.can_transition_to(next) {
        return Err(TrackerError::IllegalTransition {
            id: record.client_request_id.clone(),
            from: record.status,
            to: next,
        });
    }
    record.status = next;
    record.last_updated_at = Utc::now();
    Ok(())
}
