//! Terminal Request Codes
//!
//! Numeric identifiers understood by the expert advisor running inside the
//! MetaTrader 4 terminal. See <https://docs.mql4.com/constants/tradingconstants/orderproperties>
//! for the order operation values.

use super::RequestArg;

/// Operation selector sent as the first argument of every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum RequestCode {
    /// Liveness probe.
    Ping = 1,
    /// Open a market or pending order.
    TradeOpen = 11,
    /// Modify an open order.
    TradeModify = 12,
    /// Delete a pending order.
    TradeDelete = 13,
    /// Delete every pending order.
    DeleteAllPendingOrders = 21,
    /// Close one market order.
    CloseMarketOrder = 22,
    /// Close every market order for a symbol.
    CloseAllMarketOrders = 23,
    /// Current bid/ask for a symbol.
    Rates = 31,
    /// Trading account snapshot.
    Account = 41,
    /// Open orders.
    Orders = 51,
    /// Start the price stream.
    SubscribePrices = 61,
    /// Start the account stream.
    SubscribeAccount = 62,
    /// Start the orders stream.
    SubscribeOrders = 63,
    /// Stop the price stream.
    UnsubscribePrices = 64,
    /// Stop the account stream.
    UnsubscribeAccount = 65,
    /// Stop the orders stream.
    UnsubscribeOrders = 66,
    /// Recent candles for a symbol.
    Chart = 71,
}

impl RequestCode {
    /// Wire value of the code.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }
}

impl From<RequestCode> for RequestArg {
    fn from(code: RequestCode) -> Self {
        Self::Int(code.as_i64())
    }
}

/// MQL4 order operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum OrderOperation {
    /// Market buy.
    Buy = 0,
    /// Market sell.
    Sell = 1,
    /// Buy limit pending order.
    BuyLimit = 2,
    /// Sell limit pending order.
    SellLimit = 3,
    /// Buy stop pending order.
    BuyStop = 4,
    /// Sell stop pending order.
    SellStop = 5,
}

impl OrderOperation {
    /// Operation for a wire code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Buy),
            1 => Some(Self::Sell),
            2 => Some(Self::BuyLimit),
            3 => Some(Self::SellLimit),
            4 => Some(Self::BuyStop),
            5 => Some(Self::SellStop),
            _ => None,
        }
    }
}

impl From<OrderOperation> for RequestArg {
    fn from(op: OrderOperation) -> Self {
        Self::Int(op as i64)
    }
}

/// Unit the order volume is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i64)]
pub enum VolumeUnit {
    /// Lots.
    #[default]
    Contracts = 0,
    /// Account currency.
    Currency = 1,
}

impl From<VolumeUnit> for RequestArg {
    fn from(unit: VolumeUnit) -> Self {
        Self::Int(unit as i64)
    }
}

/// Status field of an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    /// `0`
    Ok,
    /// `1`
    Failed,
    /// Anything the terminal is not expected to send.
    Unknown(String),
}

impl ResponseStatus {
    /// Parse the raw status field.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "0" => Self::Ok,
            "1" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_codes_match_terminal_values() {
        assert_eq!(RequestCode::Ping.as_i64(), 1);
        assert_eq!(RequestCode::TradeOpen.as_i64(), 11);
        assert_eq!(RequestCode::CloseAllMarketOrders.as_i64(), 23);
        assert_eq!(RequestCode::Rates.as_i64(), 31);
        assert_eq!(RequestCode::UnsubscribeOrders.as_i64(), 66);
        assert_eq!(RequestCode::Chart.as_i64(), 71);
    }

    #[test]
    fn enums_convert_to_integer_args() {
        assert_eq!(RequestArg::from(OrderOperation::SellStop), RequestArg::Int(5));
        assert_eq!(RequestArg::from(VolumeUnit::default()), RequestArg::Int(0));
    }

    #[test]
    fn status_parsing() {
        assert_eq!(ResponseStatus::parse("0"), ResponseStatus::Ok);
        assert_eq!(ResponseStatus::parse("1"), ResponseStatus::Failed);
        assert_eq!(
            ResponseStatus::parse("x"),
            ResponseStatus::Unknown("x".to_string())
        );
    }
}
