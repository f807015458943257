//! Terminal Data Types
//!
//! Typed shapes of the JSON payloads the terminal sends back (account,
//! orders, rates, candles) and the ticket used to open market orders.
//!
//! Monetary fields use `Decimal`; the terminal emits plain JSON numbers,
//! which deserialize into `Decimal` directly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::protocol::{OrderOperation, RequestArg, RequestCode, VolumeUnit};

/// Comment sent when the caller does not supply one.
pub const DEFAULT_COMMENT: &str = "null";

// =============================================================================
// Payloads
// =============================================================================

/// Account summary (`ACCOUNT` reply and stream).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingAccount {
    /// Deposit currency.
    pub currency: String,
    /// Balance without floating profit.
    pub balance: Decimal,
    /// Floating profit.
    pub profit: Decimal,
    /// Balance plus floating profit.
    pub equity: Decimal,
    /// Used margin.
    pub margin: Decimal,
    /// Free margin.
    pub margin_free: Decimal,
    /// Margin level in percent.
    pub margin_level: Decimal,
    /// Margin call level.
    pub margin_call_level: Decimal,
    /// Stop-out level.
    pub margin_stop_out_level: Decimal,
    /// Account leverage.
    pub leverage: u32,
}

/// One open order (`ORDERS` reply and stream).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Ticket number.
    pub order: i64,
    /// Open time as formatted by the terminal.
    pub open_time: String,
    /// Order operation code (see [`OrderOperation`]).
    #[serde(rename = "type")]
    pub order_type: i64,
    /// Lots.
    pub volume: Decimal,
    /// Open price.
    pub price: Decimal,
    /// Stop loss.
    pub sl: Decimal,
    /// Take profit.
    pub tp: Decimal,
    /// Commission.
    pub commission: Decimal,
    /// Swap.
    pub swap: Decimal,
    /// Floating profit.
    pub profit: Decimal,
    /// Order comment.
    #[serde(default)]
    pub comment: String,
}

impl Order {
    /// Operation of this order, if the code is known.
    #[must_use]
    pub fn operation(&self) -> Option<OrderOperation> {
        OrderOperation::from_code(self.order_type)
    }
}

/// Bid/ask of one symbol (`RATES` reply, `PRICES` stream).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Symbol.
    pub symbol: String,
}

/// One OHLCV bar (`CHART` reply).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time as formatted by the terminal.
    pub time: String,
    /// Open.
    pub open: Decimal,
    /// Low.
    pub low: Decimal,
    /// High.
    pub high: Decimal,
    /// Close.
    pub close: Decimal,
    /// Tick volume.
    pub volume: Decimal,
}

// =============================================================================
// Order Ticket
// =============================================================================

/// Parameters of a market order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTicket {
    /// Symbol to trade.
    pub symbol: String,
    /// Lots; must be positive.
    pub volume: Decimal,
    /// Stop loss price (0 = none).
    pub stop_loss: Decimal,
    /// Take profit price (0 = none).
    pub take_profit: Decimal,
    /// Maximum slippage in points.
    pub slippage: u32,
    /// Order comment.
    pub comment: String,
    /// Expert magic number.
    pub magic_number: i64,
}

impl OrderTicket {
    /// Ticket without stops, comment or magic number.
    #[must_use]
    pub fn new(symbol: impl Into<String>, volume: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            volume,
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
            slippage: 0,
            comment: DEFAULT_COMMENT.to_string(),
            magic_number: 0,
        }
    }

    /// Set the stop loss.
    #[must_use]
    pub const fn with_stop_loss(mut self, price: Decimal) -> Self {
        self.stop_loss = price;
        self
    }

    /// Set the take profit.
    #[must_use]
    pub const fn with_take_profit(mut self, price: Decimal) -> Self {
        self.take_profit = price;
        self
    }

    /// Set the maximum slippage.
    #[must_use]
    pub const fn with_slippage(mut self, points: u32) -> Self {
        self.slippage = points;
        self
    }

    /// Set the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Set the magic number.
    #[must_use]
    pub const fn with_magic_number(mut self, magic: i64) -> Self {
        self.magic_number = magic;
        self
    }

    /// Whether the volume is acceptable.
    #[must_use]
    pub fn has_valid_volume(&self) -> bool {
        self.volume > Decimal::ZERO
    }

    /// `TRADE_OPEN` arguments for a market order.
    ///
    /// Order: code, symbol, operation, volume, price (0 = market), slippage,
    /// stop loss, take profit, comment, magic number, volume unit.
    #[must_use]
    pub fn trade_open_args(&self, operation: OrderOperation) -> Vec<RequestArg> {
        vec![
            RequestCode::TradeOpen.into(),
            self.symbol.as_str().into(),
            operation.into(),
            self.volume.into(),
            0_i64.into(),
            self.slippage.into(),
            self.stop_loss.into(),
            self.take_profit.into(),
            self.comment.as_str().into(),
            self.magic_number.into(),
            VolumeUnit::Contracts.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trade_open_args_layout() {
        let ticket = OrderTicket::new("EURUSD", Decimal::new(1, 1))
            .with_stop_loss(Decimal::new(10950, 4))
            .with_slippage(3)
            .with_magic_number(42);

        let args: Vec<String> = ticket
            .trade_open_args(OrderOperation::Sell)
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(
            args,
            vec!["11", "EURUSD", "1", "0.1", "0", "3", "1.0950", "0", "null", "42", "0"]
        );
    }

    #[test]
    fn volume_must_be_positive() {
        assert!(OrderTicket::new("EURUSD", Decimal::ONE).has_valid_volume());
        assert!(!OrderTicket::new("EURUSD", Decimal::ZERO).has_valid_volume());
        assert!(!OrderTicket::new("EURUSD", Decimal::NEGATIVE_ONE).has_valid_volume());
    }

    #[test]
    fn account_from_terminal_json() {
        let account: TradingAccount = serde_json::from_value(json!({
            "currency": "USD",
            "balance": 1000.5,
            "profit": -2.25,
            "equity": 998.25,
            "margin": 0,
            "margin_free": 998.25,
            "margin_level": 0,
            "margin_call_level": 50,
            "margin_stop_out_level": 20,
            "leverage": 100
        }))
        .unwrap();

        assert_eq!(account.currency, "USD");
        assert_eq!(account.balance, Decimal::new(10005, 1));
        assert_eq!(account.leverage, 100);
    }

    #[test]
    fn order_maps_type_field() {
        let order: Order = serde_json::from_value(json!({
            "order": 123,
            "open_time": "2024.01.02 10:00",
            "type": 0,
            "volume": 0.5,
            "price": 1.25,
            "sl": 0,
            "tp": 0,
            "commission": 0,
            "swap": 0,
            "profit": 1.5,
            "comment": "null"
        }))
        .unwrap();

        assert_eq!(order.order, 123);
        assert_eq!(order.operation(), Some(OrderOperation::Buy));
    }
}
