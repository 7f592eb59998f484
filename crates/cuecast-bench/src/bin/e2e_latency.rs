//! End-to-end play latency benchmark.
//!
//! Starts a server in-process, attaches one controller and N receivers over
//! real WebSockets, then measures the time from `play_sound` leaving the
//! controller to `play_command` arriving at every receiver.

use bytes::BytesMut;
use cuecast_protocol::{codec, ClientEvent, ServerEvent};
use cuecast_server::{build_app, AppState, Config};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WARMUP_ROUNDS: usize = 50;
const PAUSE_BETWEEN_ROUNDS: Duration = Duration::from_millis(2);

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args: Vec<String> = std::env::args().collect();
    let num_receivers: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);
    let rounds: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1_000);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║           cuecast End-to-End Play Latency Benchmark          ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("📊 {} receivers, {} rounds", num_receivers, rounds);

    let mut config = Config::default();
    config.metrics.enabled = false;
    let state = Arc::new(AppState::new(config));
    let code = state.registry().allocate();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/ws", listener.local_addr()?);
    let app = build_app(Arc::clone(&state));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("Server error: {}", e);
        }
    });

    // Controller
    let (mut controller, _) = connect_async(url.as_str()).await?;
    send(&mut controller, &ClientEvent::controller_join(code.as_str())).await?;
    recv(&mut controller).await?;

    // Receivers report arrival times on one channel
    let (arrival_tx, mut arrival_rx) = mpsc::unbounded_channel::<Instant>();
    let mut tasks = Vec::with_capacity(num_receivers);
    for _ in 0..num_receivers {
        let (mut ws, _) = connect_async(url.as_str()).await?;
        send(&mut ws, &ClientEvent::receiver_join(code.as_str())).await?;
        recv(&mut ws).await?;
        recv(&mut controller).await?;

        let (_sink, stream) = ws.split();
        let tx = arrival_tx.clone();
        tasks.push(tokio::spawn(listen_for_play(stream, tx)));
    }
    println!("✓ All {} receivers joined room {}", num_receivers, code);

    let play = ClientEvent::play_sound(code.as_str());
    let mut samples = Vec::with_capacity(rounds);

    for round in 0..WARMUP_ROUNDS + rounds {
        let start = Instant::now();
        send(&mut controller, &play).await?;

        let mut last = start;
        for _ in 0..num_receivers {
            let arrived = arrival_rx.recv().await.ok_or("receiver task ended")?;
            last = last.max(arrived);
        }
        if round >= WARMUP_ROUNDS {
            samples.push(last.duration_since(start));
        }
        tokio::time::sleep(PAUSE_BETWEEN_ROUNDS).await;
    }

    report(&mut samples, num_receivers);

    for task in tasks {
        task.abort();
    }
    Ok(())
}

/// Forward the arrival time of every play_command.
async fn listen_for_play(mut stream: SplitStream<WsStream>, tx: mpsc::UnboundedSender<Instant>) {
    let mut buf = BytesMut::with_capacity(4096);
    while let Some(Ok(Message::Binary(data))) = stream.next().await {
        let now = Instant::now();
        buf.extend_from_slice(&data);
        while let Ok(Some(event)) = codec::decode_from::<ServerEvent>(&mut buf) {
            if event == ServerEvent::PlayCommand && tx.send(now).is_err() {
                return;
            }
        }
    }
}

async fn send(ws: &mut WsStream, event: &ClientEvent) -> Result<(), BoxError> {
    ws.send(Message::Binary(codec::encode(event)?.to_vec()))
        .await?;
    Ok(())
}

async fn recv(ws: &mut WsStream) -> Result<ServerEvent, BoxError> {
    loop {
        match ws.next().await.ok_or("connection closed")?? {
            Message::Binary(data) => return Ok(codec::decode(&data)?),
            Message::Text(text) => return Ok(codec::decode_json(&text)?),
            _ => continue,
        }
    }
}

fn report(samples: &mut [Duration], num_receivers: usize) {
    if samples.is_empty() {
        println!("No samples");
        return;
    }
    samples.sort();

    let percentile = |p: f64| {
        let idx = ((samples.len() - 1) as f64 * p).round() as usize;
        samples[idx].as_secs_f64() * 1e6
    };
    let mean =
        samples.iter().map(Duration::as_secs_f64).sum::<f64>() / samples.len() as f64 * 1e6;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              RESULTS (play_sound → last receiver)            ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Receivers:            {:>10}                            ║", num_receivers);
    println!("║  Samples:              {:>10}                            ║", samples.len());
    println!("║  Mean:                 {:>10.1} µs                         ║", mean);
    println!("║  p50:                  {:>10.1} µs                         ║", percentile(0.50));
    println!("║  p99:                  {:>10.1} µs                         ║", percentile(0.99));
    println!("║  Max:                  {:>10.1} µs                         ║", percentile(1.0));
    println!("╚══════════════════════════════════════════════════════════════╝");
}
