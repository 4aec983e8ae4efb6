// src/infrastructure/exchange/mod.rs
// Binance USDⓈ-M futures repository implementation

use async_trait::async_trait;
use binance_spot_connector_rust::{
    http::{error::ClientError, request::RequestBuilder, Credentials, Method},
    hyper::{BinanceHttpClient, Error as BinanceError},
};
use hyper::client::HttpConnector;
use hyper_tls::HttpsConnector;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::application::dto::parser;
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::model::{AccountBalance, NormalizedOrder, OrderKind, OrderSnapshot, SymbolRules};
use crate::domain::repository::ExchangeRepository;
use crate::infrastructure::audit::redact;

const LIVE_URL: &str = "https://fapi.binance.com";
const TESTNET_URL: &str = "https://testnet.binancefuture.com";

pub struct BinanceFuturesRepository {
    client: BinanceHttpClient<HttpsConnector<HttpConnector>>,
    testnet: bool,
    timeout: Duration,
    recv_window: u64,
}

impl BinanceFuturesRepository {
    pub fn new(api_key: String, api_secret: String, testnet: bool) -> Self {
        let credentials = Credentials::from_hmac(api_key, api_secret);
        let base_url = if testnet { TESTNET_URL } else { LIVE_URL };
        Self {
            client: BinanceHttpClient::with_url(base_url).credentials(credentials),
            testnet,
            timeout: Duration::from_secs(10),
            recv_window: 5000,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window = recv_window_ms;
        self
    }

    /// Which endpoint this repository talks to; the menu banner shows it
    pub fn is_testnet(&self) -> bool {
        self.testnet
    }

    /// Send one request and return the raw body.
    /// `signed` requests carry recvWindow and are HMAC-signed by the connector.
    async fn send(
        &self,
        method: Method,
        path: &str,
        params: Vec<(&str, String)>,
        signed: bool,
    ) -> ExchangeResult<String> {
        let mut params = params;
        if signed {
            params.push(("recvWindow", self.recv_window.to_string()));
        }

        log::info!("API REQUEST - {}: {}", path, redact(&params_json(&params)));

        let mut request = RequestBuilder::new(method, path)
            .params(params.iter().map(|(k, v)| (*k, v.as_str())));
        if signed {
            request = request.sign();
        }

        let response = tokio::time::timeout(self.timeout, self.client.send(request))
            .await
            .map_err(|_| ExchangeError::Timeout(format!("{} timed out after {:?}", path, self.timeout)))?
            .map_err(classify)?;

        let body = tokio::time::timeout(self.timeout, response.into_body_str())
            .await
            .map_err(|_| ExchangeError::Timeout(format!("{} body read timed out", path)))?
            .map_err(classify)?;

        log::debug!("API RESPONSE - {}: {}", path, body);
        Ok(body)
    }

    fn order_params(order: &NormalizedOrder, client_order_id: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("quantity", order.quantity.normalize().to_string()),
            ("newClientOrderId", client_order_id.to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];

        match order.kind {
            OrderKind::Market => {
                params.push(("type", "MARKET".to_string()));
            }
            OrderKind::Limit { price } => {
                params.push(("type", "LIMIT".to_string()));
                params.push(("timeInForce", "GTC".to_string()));
                params.push(("price", price.normalize().to_string()));
            }
            OrderKind::StopLimit { price, stop_price } => {
                params.push(("type", "STOP".to_string()));
                params.push(("timeInForce", "GTC".to_string()));
                params.push(("price", price.normalize().to_string()));
                params.push(("stopPrice", stop_price.normalize().to_string()));
            }
        }
        params
    }
}

#[async_trait]
impl ExchangeRepository for BinanceFuturesRepository {
    async fn ping(&self) -> ExchangeResult<()> {
        self.send(Method::Get, "/fapi/v1/ping", Vec::new(), false).await?;
        // Credentials are only exercised by a signed call
        self.send(Method::Get, "/fapi/v2/account", Vec::new(), true).await?;
        log::info!("Successfully connected to Binance futures API (testnet: {})", self.testnet);
        Ok(())
    }

    async fn place_order(
        &self,
        order: &NormalizedOrder,
        client_order_id: &str,
    ) -> ExchangeResult<OrderSnapshot> {
        let params = Self::order_params(order, client_order_id);
        let body = self.send(Method::Post, "/fapi/v1/order", params, true).await?;
        let snapshot = parser::parse_order(&body)?;
        log::info!(
            "ORDER PLACED: {} {} {} {} -> {} ({})",
            snapshot.symbol,
            order.side,
            order.quantity,
            order.kind,
            snapshot.order_id,
            snapshot.raw_status
        );
        Ok(snapshot)
    }

    async fn get_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<OrderSnapshot> {
        let params = vec![("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let body = self.send(Method::Get, "/fapi/v1/order", params, true).await?;
        parser::parse_order(&body)
    }

    async fn find_order_by_client_id(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> ExchangeResult<Option<OrderSnapshot>> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("origClientOrderId", client_order_id.to_string()),
        ];
        match self.send(Method::Get, "/fapi/v1/order", params, true).await {
            Ok(body) => parser::parse_order(&body).map(Some),
            Err(ExchangeError::OrderNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<OrderSnapshot> {
        let params = vec![("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let body = self.send(Method::Delete, "/fapi/v1/order", params, true).await?;
        let snapshot = parser::parse_order(&body)?;
        log::info!("Order {} cancelled for {}: {}", order_id, symbol, snapshot.raw_status);
        Ok(snapshot)
    }

    async fn get_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        let params = vec![("symbol", symbol.to_string())];
        let ticker = self
            .send(Method::Get, "/fapi/v1/ticker/price", params.clone(), false)
            .await
            .and_then(|body| parser::parse_ticker_price(&body));

        match ticker {
            Ok(price) => Ok(price),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                log::warn!("Ticker unavailable for {} ({}), using mark price", symbol, e);
                let body = self.send(Method::Get, "/fapi/v1/premiumIndex", params, false).await?;
                parser::parse_mark_price(&body)
            }
        }
    }

    async fn get_symbol_rules(&self, symbol: &str) -> ExchangeResult<SymbolRules> {
        let body = self.send(Method::Get, "/fapi/v1/exchangeInfo", Vec::new(), false).await?;
        parser::parse_symbol_rules(&body, symbol)
    }

    async fn get_account_balance(&self) -> ExchangeResult<AccountBalance> {
        let body = self.send(Method::Get, "/fapi/v2/account", Vec::new(), true).await?;
        parser::parse_account_balance(&body)
    }
}

fn params_json(params: &[(&str, String)]) -> serde_json::Value {
    serde_json::Value::Object(
        params
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

/// Map connector errors onto the retry classification
fn classify(error: BinanceError) -> ExchangeError {
    match error {
        BinanceError::Client(ClientError::Structured(http)) => ExchangeError::from_api(
            http.status_code,
            i64::from(http.data.code),
            http.data.message,
        ),
        BinanceError::Client(ClientError::Raw(http)) => {
            match parser::parse_api_error(&http.data) {
                Some(body) => ExchangeError::from_api(http.status_code, body.code, body.msg),
                None => ExchangeError::from_api(http.status_code, 0, http.data),
            }
        }
        BinanceError::Server(http) => ExchangeError::Server {
            status: http.status_code,
            message: http.data,
        },
        BinanceError::Send(e) if e.is_connect() => ExchangeError::Connection(e.to_string()),
        BinanceError::Send(e) if e.is_timeout() => ExchangeError::Timeout(e.to_string()),
        BinanceError::Send(e) => ExchangeError::Network(e.to_string()),
        BinanceError::Parse(e) => ExchangeError::Decode(e.to_string()),
        BinanceError::InvalidApiSecret => ExchangeError::Authentication {
            code: 0,
            message: "invalid API secret format".to_string(),
        },
    }
}
