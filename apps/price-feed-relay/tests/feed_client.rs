//! Feed Client Integration Tests
//!
//! Runs the trade stream client against a local WebSocket server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use price_feed_relay::domain::record::Word;
use price_feed_relay::infrastructure::binance::{FeedClient, FeedClientConfig};
use price_feed_relay::{
    FeedEvent, FeedState, InMemoryLedger, LedgerPort, PublishScheduler, RelayContext,
    SchedulerConfig, SchemaRegistrar, SystemClock, TrackedSymbols, decode, run_ingest,
};

const BTC_TRADE: &str = r#"{"stream":"btcusdt@trade","data":{"e":"trade","E":1700000000000,"s":"BTCUSDT","t":1,"p":"50000.5","q":"0.1","T":1700000000000}}"#;

fn symbols() -> Arc<TrackedSymbols> {
    Arc::new(TrackedSymbols::new(["BTC", "ETH"]).unwrap())
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("ws://{addr}/stream?streams=btcusdt@trade/ethusdt@trade"))
}

fn start_client(url: String, cancel: &CancellationToken) -> mpsc::Receiver<FeedEvent> {
    let config = FeedClientConfig {
        url,
        quote_asset: "USDT".to_string(),
        reconnect_delay: Duration::from_millis(50),
        idle_timeout: None,
    };
    let (tx, rx) = mpsc::channel(64);
    let client = Arc::new(FeedClient::new(config, symbols(), tx, cancel.clone()));
    tokio::spawn(client.run());
    rx
}

async fn next_event(rx: &mut mpsc::Receiver<FeedEvent>) -> FeedEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for feed event")
        .expect("feed event channel closed")
}

#[tokio::test]
async fn trade_frames_become_trade_events() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(r#"{"result":null,"id":1}"#.into()))
            .await
            .unwrap();
        ws.send(Message::Text(BTC_TRADE.into())).await.unwrap();
        // Hold the connection open until the client goes away.
        while ws.next().await.is_some() {}
    });

    let cancel = CancellationToken::new();
    let mut rx = start_client(url, &cancel);

    assert_eq!(next_event(&mut rx).await, FeedEvent::Connected);
    assert_eq!(
        next_event(&mut rx).await,
        FeedEvent::Dropped {
            reason: "missing_data".to_string()
        }
    );
    match next_event(&mut rx).await {
        FeedEvent::Trade(tick) => {
            assert_eq!(tick.symbol.as_str(), "BTC");
            assert_eq!(tick.price, 50_000.5);
            assert_eq!(tick.trade_time_ms, Some(1_700_000_000_000));
        }
        other => panic!("unexpected event {other:?}"),
    }

    cancel.cancel();
}

#[tokio::test]
async fn malformed_frames_raise_the_dropped_counter() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for _ in 0..3 {
            ws.send(Message::Text("{not json".into())).await.unwrap();
        }
        ws.send(Message::Text(BTC_TRADE.into())).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let ctx = RelayContext::new(TrackedSymbols::new(["BTC", "ETH"]).unwrap());
    let state = ctx.feed_state();
    let cancel = ctx.child_token();
    let rx = start_client(url, &cancel);
    tokio::spawn(run_ingest(rx, ctx.cache(), Arc::clone(&state), ctx.child_token()));

    tokio::time::timeout(Duration::from_secs(5), async {
        while state.trades_applied() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(state.messages_dropped(), 3);
    assert_eq!(state.last_trade_time_ms(), Some(1_700_000_000_000));
    assert_eq!(ctx.cache().get("BTC"), 50_000.5);

    ctx.shutdown();
}

#[tokio::test]
async fn ping_is_answered_with_matching_pong() {
    let (listener, url) = bind().await;
    let (pong_tx, pong_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Ping(b"heartbeat".to_vec().into()))
            .await
            .unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Pong(payload) = msg {
                let _ = pong_tx.send(payload.to_vec());
                break;
            }
        }
        while ws.next().await.is_some() {}
    });

    let cancel = CancellationToken::new();
    let mut rx = start_client(url, &cancel);
    assert_eq!(next_event(&mut rx).await, FeedEvent::Connected);

    let payload = tokio::time::timeout(Duration::from_secs(5), pong_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, b"heartbeat");

    cancel.cancel();
}

#[tokio::test]
async fn server_close_triggers_single_reconnect() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Close(None)).await.unwrap();
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(BTC_TRADE.into())).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let cancel = CancellationToken::new();
    let mut rx = start_client(url, &cancel);

    assert_eq!(next_event(&mut rx).await, FeedEvent::Connected);
    assert_eq!(next_event(&mut rx).await, FeedEvent::Disconnected);
    assert_eq!(
        next_event(&mut rx).await,
        FeedEvent::Reconnecting { attempt: 1 }
    );
    assert_eq!(next_event(&mut rx).await, FeedEvent::Connected);
    assert!(matches!(next_event(&mut rx).await, FeedEvent::Trade(_)));

    cancel.cancel();
}

#[tokio::test]
async fn streamed_trade_is_published_as_record() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(BTC_TRADE.into())).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let ctx = RelayContext::new(TrackedSymbols::new(["BTC", "ETH"]).unwrap());
    let state = Arc::new(FeedState::new());

    let config = FeedClientConfig {
        url,
        quote_asset: "USDT".to_string(),
        reconnect_delay: Duration::from_millis(50),
        idle_timeout: None,
    };
    let (tx, rx) = mpsc::channel(64);
    let client = Arc::new(FeedClient::new(config, ctx.symbols(), tx, ctx.child_token()));
    tokio::spawn(client.run());
    tokio::spawn(run_ingest(rx, ctx.cache(), Arc::clone(&state), ctx.child_token()));

    tokio::time::timeout(Duration::from_secs(5), async {
        while state.trades_applied() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(state.is_connected());

    let ledger = Arc::new(InMemoryLedger::new());
    let port: Arc<dyn LedgerPort> = Arc::clone(&ledger) as Arc<dyn LedgerPort>;
    let registrar = Arc::new(SchemaRegistrar::new(
        Arc::clone(&port),
        &ctx.schema(),
        "somnixPriceFeeds",
        Duration::from_secs(1),
    ));
    let scheduler = PublishScheduler::new(
        SchedulerConfig::default(),
        ctx.cache(),
        ctx.schema(),
        registrar,
        port,
        Arc::new(SystemClock),
    );

    assert!(scheduler.run_cycle().await.is_confirmed());
    let decoded = decode(&ctx.schema(), &ledger.records()[0].payload).unwrap();
    assert_eq!(
        decoded.get("BTC"),
        Some(Word::from(50_000_500_000_000_000_917_504_u128))
    );
    assert_eq!(decoded.get("ETH"), Some(Word::ZERO));

    ctx.shutdown();
}
