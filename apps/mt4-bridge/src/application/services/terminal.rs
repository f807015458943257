//! Terminal API
//!
//! Typed helpers over [`Mt4Connection::request`]. Each helper only shapes
//! arguments and decodes the reply; correlation, timeouts and link checks
//! stay in the connection.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::connection::Mt4Connection;
use crate::domain::events::{BridgeEvent, StreamKind, Topic};
use crate::domain::protocol::{OrderOperation, Payload, RequestArg, RequestCode};
use crate::domain::trading::{Candle, Order, OrderTicket, Rates, TradingAccount};
use crate::error::RequestError;

/// Trading operations of one terminal.
#[derive(Debug, Clone)]
pub struct Mt4Terminal {
    connection: Arc<Mt4Connection>,
}

impl Mt4Terminal {
    /// Wrap a connection.
    #[must_use]
    pub const fn new(connection: Arc<Mt4Connection>) -> Self {
        Self { connection }
    }

    /// Underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Arc<Mt4Connection> {
        &self.connection
    }

    /// Raw correlated request with caller-supplied arguments.
    ///
    /// # Errors
    ///
    /// See [`Mt4Connection::request`].
    pub async fn request(&self, args: Vec<RequestArg>) -> Result<Payload, RequestError> {
        self.connection.request(args).await
    }

    /// Round-trip without side effects.
    ///
    /// # Errors
    ///
    /// See [`Mt4Connection::request`].
    pub async fn ping(&self) -> Result<Payload, RequestError> {
        self.code(RequestCode::Ping).await
    }

    /// Current bid/ask of a symbol.
    ///
    /// # Errors
    ///
    /// Request errors, or `UnexpectedPayload` if the reply is not a rate.
    pub async fn rates(&self, symbol: &str) -> Result<Rates, RequestError> {
        let payload = self
            .request(vec![RequestCode::Rates.into(), symbol.into()])
            .await?;
        decode(payload)
    }

    /// Account summary.
    ///
    /// # Errors
    ///
    /// Request errors, or `UnexpectedPayload` if the reply is not an account.
    pub async fn account(&self) -> Result<TradingAccount, RequestError> {
        decode(self.code(RequestCode::Account).await?)
    }

    /// Open orders.
    ///
    /// # Errors
    ///
    /// Request errors, or `UnexpectedPayload` if the reply is not an order list.
    pub async fn orders(&self) -> Result<Vec<Order>, RequestError> {
        decode(self.code(RequestCode::Orders).await?)
    }

    /// Open a market buy.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` without sending anything if the volume is not
    /// positive, otherwise request errors.
    pub async fn buy(&self, ticket: &OrderTicket) -> Result<Payload, RequestError> {
        self.open(ticket, OrderOperation::Buy).await
    }

    /// Open a market sell.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` without sending anything if the volume is not
    /// positive, otherwise request errors.
    pub async fn sell(&self, ticket: &OrderTicket) -> Result<Payload, RequestError> {
        self.open(ticket, OrderOperation::Sell).await
    }

    /// Close a market order by ticket.
    ///
    /// # Errors
    ///
    /// See [`Mt4Connection::request`].
    pub async fn close(&self, order: i64) -> Result<Payload, RequestError> {
        self.request(vec![RequestCode::CloseMarketOrder.into(), order.into()])
            .await
    }

    /// Close every market order of a symbol.
    ///
    /// # Errors
    ///
    /// See [`Mt4Connection::request`].
    pub async fn close_all(&self, symbol: &str) -> Result<Payload, RequestError> {
        self.request(vec![RequestCode::CloseAllMarketOrders.into(), symbol.into()])
            .await
    }

    /// Recent bars of a symbol.
    ///
    /// # Errors
    ///
    /// Request errors, or `UnexpectedPayload` if the reply is not a bar list.
    pub async fn last_candles(&self, symbol: &str) -> Result<Vec<Candle>, RequestError> {
        let payload = self
            .request(vec![RequestCode::Chart.into(), symbol.into()])
            .await?;
        decode(payload)
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Start the account stream.
    ///
    /// # Errors
    ///
    /// See [`Mt4Connection::request`].
    pub async fn subscribe_account(&self) -> Result<Payload, RequestError> {
        self.code(RequestCode::SubscribeAccount).await
    }

    /// Start the orders stream.
    ///
    /// # Errors
    ///
    /// See [`Mt4Connection::request`].
    pub async fn subscribe_orders(&self) -> Result<Payload, RequestError> {
        self.code(RequestCode::SubscribeOrders).await
    }

    /// Start the prices stream for the given symbols.
    ///
    /// # Errors
    ///
    /// See [`Mt4Connection::request`].
    pub async fn subscribe_prices(&self, symbols: &[&str]) -> Result<Payload, RequestError> {
        self.request(vec![RequestCode::SubscribePrices.into(), symbols.join(",").into()])
            .await
    }

    /// Stop the account stream.
    ///
    /// # Errors
    ///
    /// See [`Mt4Connection::request`].
    pub async fn unsubscribe_account(&self) -> Result<Payload, RequestError> {
        self.code(RequestCode::UnsubscribeAccount).await
    }

    /// Stop the orders stream.
    ///
    /// # Errors
    ///
    /// See [`Mt4Connection::request`].
    pub async fn unsubscribe_orders(&self) -> Result<Payload, RequestError> {
        self.code(RequestCode::UnsubscribeOrders).await
    }

    /// Stop the prices stream for the given symbols.
    ///
    /// # Errors
    ///
    /// See [`Mt4Connection::request`].
    pub async fn unsubscribe_prices(&self, symbols: &[&str]) -> Result<Payload, RequestError> {
        self.request(vec![RequestCode::UnsubscribePrices.into(), symbols.join(",").into()])
            .await
    }

    // -------------------------------------------------------------------------
    // Stream Listeners
    // -------------------------------------------------------------------------

    /// Receive account snapshots.
    pub fn listen_account<F>(&self, callback: F)
    where
        F: Fn(TradingAccount) + Send + Sync + 'static,
    {
        self.listen(StreamKind::Account, callback);
    }

    /// Receive open order lists.
    pub fn listen_orders<F>(&self, callback: F)
    where
        F: Fn(Vec<Order>) + Send + Sync + 'static,
    {
        self.listen(StreamKind::Orders, callback);
    }

    /// Receive price updates.
    pub fn listen_prices<F>(&self, callback: F)
    where
        F: Fn(Vec<Rates>) + Send + Sync + 'static,
    {
        self.listen(StreamKind::Prices, callback);
    }

    fn listen<T, F>(&self, kind: StreamKind, callback: F)
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let stream = kind.clone();
        self.connection.on(Topic::Stream(kind), move |event| {
            let BridgeEvent::Stream { payload, .. } = event else {
                return;
            };

            match payload.clone().deserialize::<T>() {
                Ok(value) => callback(value),
                Err(e) => {
                    tracing::warn!(stream = stream.as_str(), error = %e, "Failed to decode stream payload");
                }
            }
        });
    }

    async fn code(&self, code: RequestCode) -> Result<Payload, RequestError> {
        self.request(vec![code.into()]).await
    }

    async fn open(
        &self,
        ticket: &OrderTicket,
        operation: OrderOperation,
    ) -> Result<Payload, RequestError> {
        if !ticket.has_valid_volume() {
            return Err(RequestError::InvalidArgument(format!(
                "volume must be greater than 0, got {}",
                ticket.volume
            )));
        }

        self.request(ticket.trade_open_args(operation)).await
    }
}

fn decode<T: DeserializeOwned>(payload: Payload) -> Result<T, RequestError> {
    payload
        .deserialize()
        .map_err(|e| RequestError::UnexpectedPayload(e.to_string()))
}
