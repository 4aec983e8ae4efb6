mod common;

use common::{harness, harness_with_limiter, timeout, Call};
use futures_bot::application::dto::OrderTicket;
use futures_bot::application::usecase::PlaceOptions;
use futures_bot::domain::errors::{
    CancelError, ExchangeError, ExecutorError, OrderError, PrecisionError, Stage, ValidationError,
};
use futures_bot::domain::model::{OrderKind, OrderRequest, OrderSide, OrderStatus};
use futures_bot::infrastructure::RateLimiter;
use rust_decimal_macros::dec;
use tokio::time::{Duration, Instant};

fn market_buy(quantity: rust_decimal::Decimal) -> OrderRequest {
    OrderRequest {
        symbol: "BTCUSDT".to_string(),
        side: OrderSide::Buy,
        kind: OrderKind::Market,
        quantity,
    }
}

fn limit_buy(quantity: rust_decimal::Decimal, price: rust_decimal::Decimal) -> OrderRequest {
    OrderRequest {
        kind: OrderKind::Limit { price },
        ..market_buy(quantity)
    }
}

#[tokio::test(start_paused = true)]
async fn timeout_twice_then_success() {
    let h = harness(None);
    h.exchange.script_place(Err(timeout()));
    h.exchange.script_place(Err(timeout()));

    let record = h
        .pipeline
        .place(market_buy(dec!(0.01)), PlaceOptions::default())
        .await
        .unwrap();

    assert_eq!(record.status, OrderStatus::Submitted);
    let places = h.exchange.place_calls();
    assert_eq!(places.len(), 3);
    // Same idempotency key on every attempt, checked before each resubmit
    assert!(places.iter().all(|c| matches!(
        c,
        Call::Place { client_order_id, .. } if *client_order_id == record.client_request_id
    )));
    assert_eq!(h.exchange.count(|c| matches!(c, Call::Lookup { .. })), 2);
}

#[tokio::test(start_paused = true)]
async fn accepted_order_is_not_resubmitted() {
    let h = harness(None);
    h.exchange.script_place(Err(timeout()));
    h.exchange.script_lookup(Ok(Some(OrderStatus::Submitted)));

    let record = h
        .pipeline
        .place(market_buy(dec!(0.01)), PlaceOptions::default())
        .await
        .unwrap();

    assert_eq!(record.status, OrderStatus::Submitted);
    assert!(record.exchange_order_id.is_some());
    assert_eq!(h.exchange.place_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_prior_state_is_ambiguous() {
    let h = harness(None);
    h.exchange.script_place(Err(ExchangeError::Server {
        status: 502,
        message: "Bad Gateway".into(),
    }));
    h.exchange
        .script_lookup(Err(ExchangeError::Unsupported("lookup".into())));

    let err = h
        .pipeline
        .place(market_buy(dec!(0.01)), PlaceOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Dispatch);
    assert!(matches!(
        err.kind,
        OrderError::Executor(ExecutorError::AmbiguousState { attempts: 1, .. })
    ));
    assert_eq!(h.exchange.place_calls().len(), 1);

    let orders = h.pipeline.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn permanent_rejection_stops_at_once() {
    let h = harness(None);
    h.exchange.script_place(Err(ExchangeError::InsufficientBalance {
        code: -2019,
        message: "Margin is insufficient.".into(),
    }));

    let err = h
        .pipeline
        .place(market_buy(dec!(0.01)), PlaceOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Dispatch);
    assert_eq!(err.exchange_code(), Some(-2019));
    assert!(err.to_string().contains("Margin is insufficient."));
    assert_eq!(h.exchange.place_calls().len(), 1);
    assert_eq!(h.exchange.count(|c| matches!(c, Call::Lookup { .. })), 0);
    assert_eq!(h.pipeline.orders().await[0].status, OrderStatus::Rejected);
}

#[tokio::test(start_paused = true)]
async fn throttled_placement_retries_without_lookup() {
    let h = harness(None);
    h.exchange.script_place(Err(ExchangeError::RateLimited {
        code: -1003,
        message: "Too many requests".into(),
    }));

    let record = h
        .pipeline
        .place(market_buy(dec!(0.01)), PlaceOptions::default())
        .await
        .unwrap();

    assert_eq!(record.status, OrderStatus::Submitted);
    assert_eq!(h.exchange.place_calls().len(), 2);
    assert_eq!(h.exchange.count(|c| matches!(c, Call::Lookup { .. })), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_mark_failed() {
    let h = harness(None);
    for _ in 0..3 {
        h.exchange.script_place(Err(timeout()));
    }

    let err = h
        .pipeline
        .place(market_buy(dec!(0.01)), PlaceOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err.kind,
        OrderError::Executor(ExecutorError::Transient { attempts: 3, .. })
    ));
    assert_eq!(h.exchange.place_calls().len(), 3);
    assert_eq!(h.pipeline.orders().await[0].status, OrderStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn order_over_ceiling_is_refused() {
    let h = harness(Some(dec!(100)));

    let err = h
        .pipeline
        .place(limit_buy(dec!(0.01), dec!(50000)), PlaceOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_safety());
    assert_eq!(err.stage, Stage::Safety);
    assert!(err.to_string().starts_with("[safety] BTCUSDT:"));
    assert!(h.exchange.place_calls().is_empty());
    assert!(h.pipeline.orders().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn operator_override_bypasses_ceiling() {
    let h = harness(Some(dec!(100)));

    let record = h
        .pipeline
        .place(
            limit_buy(dec!(0.01), dec!(50000)),
            PlaceOptions { bypass_safety: true },
        )
        .await
        .unwrap();

    assert_eq!(record.status, OrderStatus::Submitted);
    assert_eq!(h.exchange.place_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dust_quantity_fails_formatting() {
    let h = harness(None);

    let err = h
        .pipeline
        .place(market_buy(dec!(0.0001234)), PlaceOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Formatting);
    assert!(matches!(
        err.kind,
        OrderError::Precision(PrecisionError::ZeroQuantity { .. })
    ));
    assert!(h.exchange.place_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn quantity_is_floored_before_sending() {
    let h = harness(None);

    let record = h
        .pipeline
        .place(market_buy(dec!(0.0129)), PlaceOptions::default())
        .await
        .unwrap();

    assert_eq!(record.quantity, dec!(0.012));
    assert!(matches!(
        &h.exchange.place_calls()[0],
        Call::Place { quantity, .. } if *quantity == dec!(0.012)
    ));
}

#[tokio::test(start_paused = true)]
async fn unlisted_symbol_fails_validation() {
    let h = harness(None);
    let request = OrderRequest {
        symbol: "DOGEUSDT".to_string(),
        ..market_buy(dec!(100))
    };

    let err = h
        .pipeline
        .place(request, PlaceOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Validation);
    assert_eq!(
        err.kind,
        OrderError::Validation(ValidationError::UnknownSymbol("DOGEUSDT".into()))
    );
    assert_eq!(h.exchange.count(|c| matches!(c, Call::Price { .. })), 0);
}

#[tokio::test(start_paused = true)]
async fn buy_stop_below_market_is_rejected() {
    let h = harness(None);

    let err = h
        .pipeline
        .place_ticket(
            OrderTicket::stop_limit("btc", "buy", "0.01", "49000", "49010"),
            PlaceOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Validation);
    assert!(matches!(
        err.kind,
        OrderError::Validation(ValidationError::InvalidTrigger { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn bad_side_fails_at_input() {
    let h = harness(None);

    let err = h
        .pipeline
        .place_ticket(OrderTicket::market("btc", "long", "1"), PlaceOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Input);
    assert!(h.exchange.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn symbol_rules_are_cached() {
    let h = harness(None);
    for _ in 0..3 {
        h.pipeline
            .place(market_buy(dec!(0.01)), PlaceOptions::default())
            .await
            .unwrap();
    }
    assert_eq!(h.exchange.count(|c| matches!(c, Call::Rules { .. })), 1);
    assert_eq!(h.pipeline.orders().await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn cancel_on_filled_order_is_refused() {
    let h = harness(None);
    let record = h
        .pipeline
        .place(limit_buy(dec!(0.01), dec!(49000)), PlaceOptions::default())
        .await
        .unwrap();

    h.exchange.script_order_status(OrderStatus::Filled);
    let filled = h.pipeline.status(&record.client_request_id).await.unwrap();
    assert_eq!(filled.status, OrderStatus::Filled);

    let err = h.pipeline.cancel(&record.client_request_id).await.unwrap_err();
    assert_eq!(err.stage, Stage::Cancel);
    assert!(matches!(
        err.kind,
        OrderError::Cancel(CancelError::AlreadyTerminal {
            status: OrderStatus::Filled,
            ..
        })
    ));
    assert_eq!(h.exchange.count(|c| matches!(c, Call::Cancel { .. })), 0);

    // Terminal records are served from memory
    let again = h.pipeline.status(&record.client_request_id).await.unwrap();
    assert_eq!(again, filled);
    assert_eq!(h.exchange.count(|c| matches!(c, Call::GetOrder { .. })), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_open_order_by_exchange_id() {
    let h = harness(None);
    let record = h
        .pipeline
        .place(limit_buy(dec!(0.01), dec!(49000)), PlaceOptions::default())
        .await
        .unwrap();
    let exchange_id = record.exchange_order_id.clone().unwrap();

    let cancelled = h.pipeline.cancel(&exchange_id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Canceled);
    assert_eq!(cancelled.client_request_id, record.client_request_id);
}

#[tokio::test(start_paused = true)]
async fn cancel_retried_after_timeout_reads_order_back() {
    let h = harness(None);
    let record = h
        .pipeline
        .place(limit_buy(dec!(0.01), dec!(49000)), PlaceOptions::default())
        .await
        .unwrap();

    // The first cancel went through but its answer was lost
    h.exchange.script_cancel(Err(timeout()));
    h.exchange.script_cancel(Err(ExchangeError::OrderNotFound {
        code: -2011,
        message: "Unknown order sent.".into(),
    }));
    h.exchange.script_order_status(OrderStatus::Canceled);

    let cancelled = h.pipeline.cancel(&record.client_request_id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Canceled);
    assert_eq!(h.exchange.count(|c| matches!(c, Call::Cancel { .. })), 2);
    assert_eq!(h.exchange.count(|c| matches!(c, Call::GetOrder { .. })), 1);

    let orders = h.pipeline.orders().await;
    assert_eq!(orders[0].status, OrderStatus::Canceled);
}

#[tokio::test(start_paused = true)]
async fn cancel_racing_a_fill_records_the_fill() {
    let h = harness(None);
    let record = h
        .pipeline
        .place(limit_buy(dec!(0.01), dec!(49000)), PlaceOptions::default())
        .await
        .unwrap();

    h.exchange.script_cancel(Err(ExchangeError::Server {
        status: 503,
        message: "Service Unavailable".into(),
    }));
    h.exchange.script_cancel(Err(ExchangeError::OrderNotFound {
        code: -2011,
        message: "Unknown order sent.".into(),
    }));
    h.exchange.script_order_status(OrderStatus::Filled);

    let err = h.pipeline.cancel(&record.client_request_id).await.unwrap_err();
    assert_eq!(err.stage, Stage::Cancel);
    assert!(matches!(
        err.kind,
        OrderError::Cancel(CancelError::AlreadyTerminal {
            status: OrderStatus::Filled,
            ..
        })
    ));
    let orders = h.pipeline.orders().await;
    assert_eq!(orders[0].status, OrderStatus::Filled);
    assert_eq!(orders[0].executed_quantity, dec!(0.01));
}

#[tokio::test(start_paused = true)]
async fn unknown_order_on_first_cancel_is_reported() {
    let h = harness(None);
    let record = h
        .pipeline
        .place(limit_buy(dec!(0.01), dec!(49000)), PlaceOptions::default())
        .await
        .unwrap();

    h.exchange.script_cancel(Err(ExchangeError::OrderNotFound {
        code: -2011,
        message: "Unknown order sent.".into(),
    }));

    let err = h.pipeline.cancel(&record.client_request_id).await.unwrap_err();
    assert!(matches!(
        err.kind,
        OrderError::Cancel(CancelError::Exchange(ExecutorError::Final(ExchangeError::OrderNotFound {
            code: -2011,
            ..
        })))
    ));
    assert_eq!(h.exchange.count(|c| matches!(c, Call::GetOrder { .. })), 0);
    assert_eq!(h.pipeline.orders().await[0].status, OrderStatus::Submitted);
}

#[tokio::test(start_paused = true)]
async fn oversized_ticket_is_refused_without_panicking() {
    let h = harness(Some(dec!(1000)));
    let huge = "1000000000000000";

    for options in [PlaceOptions::default(), PlaceOptions { bypass_safety: true }] {
        let err = h
            .pipeline
            .place_ticket(OrderTicket::limit("btc", "buy", huge, huge), options)
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Formatting);
        assert!(matches!(
            err.kind,
            OrderError::Precision(PrecisionError::NotionalOverflow { .. })
        ));
    }

    // Leaves the decimal range once divided by the quantity step
    let err = h
        .pipeline
        .place_ticket(
            OrderTicket::market("btc", "buy", "1000000000000000000000000000"),
            PlaceOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Formatting);
    assert!(h.exchange.place_calls().is_empty());
    assert!(h.pipeline.orders().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_status_does_not_regress() {
    let h = harness(None);
    let record = h
        .pipeline
        .place(limit_buy(dec!(0.01), dec!(49000)), PlaceOptions::default())
        .await
        .unwrap();

    h.exchange.script_order_status(OrderStatus::PartiallyFilled);
    h.exchange.script_order_status(OrderStatus::Submitted);

    let partial = h.pipeline.status(&record.client_request_id).await.unwrap();
    assert_eq!(partial.status, OrderStatus::PartiallyFilled);
    let still = h.pipeline.status(&record.client_request_id).await.unwrap();
    assert_eq!(still.status, OrderStatus::PartiallyFilled);
}

#[tokio::test(start_paused = true)]
async fn every_call_takes_a_permit() {
    // rules, price and placement: the third call waits for the window
    let h = harness_with_limiter(None, RateLimiter::new(2, Duration::from_secs(1)));
    let start = Instant::now();

    h.pipeline
        .place(market_buy(dec!(0.01)), PlaceOptions::default())
        .await
        .unwrap();

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn audit_trail_follows_stages() {
    let h = harness(None);
    h.pipeline
        .place(market_buy(dec!(0.01)), PlaceOptions::default())
        .await
        .unwrap();

    let stages: Vec<Stage> = h.audit.entries().iter().map(|e| e.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::SymbolRules,
            Stage::MarketPrice,
            Stage::Validation,
            Stage::Formatting,
            Stage::Safety,
            Stage::Dispatch,
        ]
    );
    assert!(h.audit.entries().iter().all(|e| !e.is_error()));
}

#[tokio::test(start_paused = true)]
async fn connection_check_reads_balance() {
    let h = harness(None);
    let balance = h.pipeline.check_connection().await.unwrap();
    assert_eq!(balance.available_balance, dec!(1000));
    assert_eq!(h.exchange.calls(), vec![Call::Ping, Call::Balance]);
}
