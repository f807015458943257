//! Terminal API Integration Tests
//!
//! Checks the argument layout of each helper on the wire and the typed
//! decoding of replies and stream payloads.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use rust_decimal::Decimal;

use common::{Harness, settings, settle};
use mt4_bridge::{Mt4Connection, Mt4Terminal, OrderOperation, OrderTicket, RequestError};

async fn connected_terminal() -> (Mt4Terminal, Harness) {
    let harness = Harness::connected(settings()).await;
    (Mt4Terminal::new(Arc::clone(&harness.connection)), harness)
}

#[tokio::test(start_paused = true)]
async fn rates_are_requested_and_decoded() {
    let (terminal, harness) = connected_terminal().await;

    let task = tokio::spawn(async move { terminal.rates("EURUSD").await });
    assert_eq!(harness.wait_for_sent(1).await, vec!["key|1|31|EURUSD"]);

    harness
        .reply(r#"RESPONSE|1|0||{"bid":1.1,"ask":1.2,"symbol":"EURUSD"}"#)
        .await;

    let rates = task.await.unwrap().unwrap();
    assert_eq!(rates.symbol, "EURUSD");
    assert_eq!(rates.bid, Decimal::new(11, 1));
    assert_eq!(rates.ask, Decimal::new(12, 1));
}

#[tokio::test(start_paused = true)]
async fn account_reply_is_decoded() {
    let (terminal, harness) = connected_terminal().await;

    let task = tokio::spawn(async move { terminal.account().await });
    assert_eq!(harness.wait_for_sent(1).await, vec!["key|1|41"]);

    harness
        .reply(
            r#"RESPONSE|1|0||{"currency":"USD","balance":1000.5,"profit":-2.5,"equity":998,"margin":10,"margin_free":988,"margin_level":9980,"margin_call_level":100,"margin_stop_out_level":50,"leverage":100}"#,
        )
        .await;

    let account = task.await.unwrap().unwrap();
    assert_eq!(account.currency, "USD");
    assert_eq!(account.balance, Decimal::new(10005, 1));
    assert_eq!(account.profit, Decimal::new(-25, 1));
    assert_eq!(account.leverage, 100);
}

#[tokio::test(start_paused = true)]
async fn orders_reply_is_decoded() {
    let (terminal, harness) = connected_terminal().await;

    let task = tokio::spawn(async move { terminal.orders().await });
    assert_eq!(harness.wait_for_sent(1).await, vec!["key|1|51"]);

    harness
        .reply(
            r#"RESPONSE|1|0||[{"order":7,"open_time":"2024.01.02 10:00","type":1,"volume":0.1,"price":1.1,"sl":0,"tp":0,"commission":0,"swap":0,"profit":3.2}]"#,
        )
        .await;

    let orders = task.await.unwrap().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order, 7);
    assert_eq!(orders[0].operation(), Some(OrderOperation::Sell));
    assert_eq!(orders[0].comment, "");
}

#[tokio::test(start_paused = true)]
async fn unexpected_reply_shape_is_reported() {
    let (terminal, harness) = connected_terminal().await;

    let task = tokio::spawn(async move { terminal.rates("EURUSD").await });
    harness.wait_for_sent(1).await;
    harness.reply("RESPONSE|1|0|").await;

    assert!(matches!(
        task.await.unwrap(),
        Err(RequestError::UnexpectedPayload(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn buy_sends_the_trade_open_layout() {
    let (terminal, harness) = connected_terminal().await;

    let ticket = OrderTicket::new("EURUSD", Decimal::new(1, 1))
        .with_stop_loss(Decimal::new(10950, 4))
        .with_slippage(3)
        .with_magic_number(42);
    let _task = tokio::spawn(async move { terminal.buy(&ticket).await });

    assert_eq!(
        harness.wait_for_sent(1).await,
        vec!["key|1|11|EURUSD|0|0.1|0|3|1.0950|0|null|42|0"]
    );
}

#[tokio::test(start_paused = true)]
async fn sell_uses_the_sell_operation() {
    let (terminal, harness) = connected_terminal().await;

    let ticket = OrderTicket::new("GBPUSD", Decimal::ONE).with_comment("hedge");
    let _task = tokio::spawn(async move { terminal.sell(&ticket).await });

    let sent = harness.wait_for_sent(1).await;
    assert!(sent[0].starts_with("key|1|11|GBPUSD|1|1|"));
    assert!(sent[0].contains("|hedge|"));
}

#[tokio::test(start_paused = true)]
async fn zero_volume_never_reaches_the_wire() {
    let (terminal, harness) = connected_terminal().await;

    let ticket = OrderTicket::new("EURUSD", Decimal::ZERO);
    assert!(matches!(
        terminal.buy(&ticket).await,
        Err(RequestError::InvalidArgument(_))
    ));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(harness.request.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn close_helpers_send_ticket_and_symbol() {
    let (terminal, harness) = connected_terminal().await;

    let closer = terminal.clone();
    let _one = tokio::spawn(async move { closer.close(12_345).await });
    settle().await;
    let _all = tokio::spawn(async move { terminal.close_all("USDJPY").await });

    assert_eq!(
        harness.wait_for_sent(2).await,
        vec!["key|1|22|12345", "key|2|23|USDJPY"]
    );
}

#[tokio::test(start_paused = true)]
async fn price_subscription_joins_symbols() {
    let (terminal, harness) = connected_terminal().await;

    let subscriber = terminal.clone();
    let _sub = tokio::spawn(async move { subscriber.subscribe_prices(&["EURUSD", "GBPUSD"]).await });
    settle().await;
    let _unsub = tokio::spawn(async move { terminal.unsubscribe_prices(&["EURUSD"]).await });

    assert_eq!(
        harness.wait_for_sent(2).await,
        vec!["key|1|61|EURUSD,GBPUSD", "key|2|64|EURUSD"]
    );
}

#[tokio::test(start_paused = true)]
async fn candles_reply_is_decoded() {
    let (terminal, harness) = connected_terminal().await;

    let task = tokio::spawn(async move { terminal.last_candles("EURUSD").await });
    assert_eq!(harness.wait_for_sent(1).await, vec!["key|1|71|EURUSD"]);

    harness
        .reply(
            r#"RESPONSE|1|0||[{"time":"2024.01.02 10:00","open":1.1,"low":1.0,"high":1.2,"close":1.15,"volume":120}]"#,
        )
        .await;

    let candles = task.await.unwrap().unwrap();
    assert_eq!(candles.len(), 1);
    assert_eq!(candles[0].close, Decimal::new(115, 2));
}

#[tokio::test(start_paused = true)]
async fn stream_listeners_receive_typed_values() {
    let connection = Arc::new(Mt4Connection::new(settings()));
    let terminal = Mt4Terminal::new(Arc::clone(&connection));

    let balances = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&balances);
    terminal.listen_account(move |account| sink.lock().push(account.balance));

    let symbols = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&symbols);
    terminal.listen_prices(move |rates| {
        sink.lock()
            .extend(rates.into_iter().map(|rate| rate.symbol));
    });

    let harness = Harness::start_with(connection);
    harness.bring_up().await;

    harness
        .reply(
            r#"STREAM|ACCOUNT|0||{"currency":"USD","balance":250,"profit":0,"equity":250,"margin":0,"margin_free":250,"margin_level":0,"margin_call_level":100,"margin_stop_out_level":50,"leverage":500}"#,
        )
        .await;
    harness
        .reply(r#"STREAM|PRICES|0||[{"bid":1.1,"ask":1.2,"symbol":"EURUSD"},{"bid":1.3,"ask":1.4,"symbol":"GBPUSD"}]"#)
        .await;
    harness.reply(r#"STREAM|PRICES|0||"not a list""#).await;

    assert_eq!(*balances.lock(), vec![Decimal::from(250)]);
    assert_eq!(*symbols.lock(), vec!["EURUSD", "GBPUSD"]);
}
