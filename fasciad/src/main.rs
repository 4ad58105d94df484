//! Fascia daemon - producer-context state service
//!
//! Runs the producer loop against a panel backend (the built-in demo
//! synthesizer unless an emulator adapter is wired in) and serves snapshots
//! to UI clients over a localhost JSON-lines protocol:
//! - `GetState` (pull): reply once with the latest snapshot
//! - `Subscribe` (push): stream every accepted snapshot until the client
//!   disconnects
//! - `SetIntervalMs`: retune the producer cadence
//! - `Shutdown`: stop the producer and exit

use std::env;
use std::time::Duration;

use fascia::bridge::{self, SnapshotReceiver};
use fascia::producer::{ClockSource, DemoBackend, Producer, ProducerHandle, DEFAULT_INTERVAL};
use fascia::proto::{Request, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tracing::{error, info};

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9178";

#[derive(Debug, Clone)]
struct Config {
    listen_addr: String,
    interval: Duration,
    seed: u64,
    clock_source: ClockSource,
}

impl Config {
    fn from_env_and_args() -> Self {
        let mut listen_addr =
            env::var("FASCIA_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
        let mut interval_ms: u64 = env::var("FASCIA_TICK_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_INTERVAL.as_millis() as u64);
        let mut seed: u64 = 2026;
        let mut clock_source = ClockSource::Ticks;

        let mut args = env::args().skip(1);
        while let Some(a) = args.next() {
            match a.as_str() {
                "--addr" => {
                    if let Some(v) = args.next() {
                        listen_addr = v;
                    }
                }
                "--tick-ms" => {
                    if let Some(v) = args.next() {
                        interval_ms = v.parse().unwrap_or(interval_ms);
                    }
                }
                "--seed" => {
                    if let Some(v) = args.next() {
                        seed = v.parse().unwrap_or(seed);
                    }
                }
                "--wall-clock" => clock_source = ClockSource::WallClock,
                _ => {}
            }
        }

        Self {
            listen_addr,
            interval: Duration::from_millis(interval_ms.clamp(10, 60_000)),
            seed,
            clock_source,
        }
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &Response,
) -> Result<(), Box<dyn std::error::Error>> {
    writer
        .write_all(serde_json::to_string(response)?.as_bytes())
        .await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

async fn handle_client(
    stream: TcpStream,
    mut rx: SnapshotReceiver,
    producer: ProducerHandle,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let request: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let resp = Response::Error {
                    message: format!("Invalid request: {}", e),
                };
                write_response(&mut writer, &resp).await?;
                continue;
            }
        };

        match request {
            Request::GetState => {
                // Before the first tick this is the empty snapshot, so the
                // client needs no logic to filter the response.
                let snapshot = rx.latest().unwrap_or_default();
                write_response(&mut writer, &Response::State(snapshot)).await?;
            }
            Request::Subscribe => {
                // The connection becomes a one-way snapshot stream; no
                // further requests are read from it.
                while let Ok(snapshot) = rx.changed().await {
                    if write_response(&mut writer, &Response::State(snapshot))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                return Ok(());
            }
            Request::SetIntervalMs { ms } => {
                let clamped = ms.clamp(10, 60_000);
                producer.set_interval(Duration::from_millis(clamped));
                info!("tick interval set to {} ms", clamped);
                write_response(
                    &mut writer,
                    &Response::Success {
                        message: format!("Tick interval set to {} ms", clamped),
                    },
                )
                .await?;
            }
            Request::Shutdown => {
                producer.stop();
                info!("shutdown requested; producer stopped");
                write_response(
                    &mut writer,
                    &Response::Success {
                        message: "Shutting down".to_string(),
                    },
                )
                .await?;
                tokio::spawn(async {
                    // Give the response a moment to flush before exiting.
                    time::sleep(Duration::from_millis(50)).await;
                    std::process::exit(0);
                });
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env_and_args();
    info!(
        "tick interval {:?}, clock source {:?}, seed {}",
        config.interval, config.clock_source, config.seed
    );

    let (tx, rx) = bridge::channel();
    let backend = DemoBackend::with_clock_source(config.seed, config.clock_source);
    let (producer, handle) = Producer::new(backend, tx, config.interval);

    // Producer loop task: the only writer to the bridge.
    tokio::spawn(producer.run());

    // Stop the loop on Ctrl-C so it ends at an iteration boundary.
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c: stopping producer");
                handle.stop();
                std::process::exit(0);
            }
        });
    }

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("fasciad listening on {}", config.listen_addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("client connected: {}", addr);
        let rx = rx.clone();
        let handle = handle.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, rx, handle).await {
                error!("client handler error: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fascia::snapshot::{Clock, Snapshot};

    /// A handle whose producer is never run; tests drive the bridge by hand.
    fn idle_producer_handle() -> ProducerHandle {
        let (tx, _rx) = bridge::channel();
        let (_producer, handle) = Producer::new(DemoBackend::new(1), tx, DEFAULT_INTERVAL);
        handle
    }

    async fn serve_one(
        rx: SnapshotReceiver,
        handle: ProducerHandle,
    ) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = handle_client(stream, rx, handle).await;
        });
        addr
    }

    async fn send_line(
        writer: &mut tokio::net::tcp::OwnedWriteHalf,
        request: &Request,
    ) {
        writer
            .write_all(serde_json::to_string(request).unwrap().as_bytes())
            .await
            .unwrap();
        writer.write_all(b"\n").await.unwrap();
    }

    #[tokio::test]
    async fn get_state_returns_empty_then_latest() {
        let (tx, rx) = bridge::channel();
        let addr = serve_one(rx, idle_producer_handle()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        send_line(&mut writer, &Request::GetState).await;
        let line = lines.next_line().await.unwrap().unwrap();
        match serde_json::from_str::<Response>(&line).unwrap() {
            Response::State(snapshot) => assert_eq!(snapshot, Snapshot::default()),
            other => panic!("unexpected response: {other:?}"),
        }

        let pushed = Snapshot {
            clock: Clock::Ticks(65),
            stack: 3,
            ..Snapshot::default()
        };
        tx.send(pushed.clone()).unwrap();

        send_line(&mut writer, &Request::GetState).await;
        let line = lines.next_line().await.unwrap().unwrap();
        match serde_json::from_str::<Response>(&line).unwrap() {
            Response::State(snapshot) => assert_eq!(snapshot, pushed),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscribe_streams_each_accepted_snapshot() {
        let (tx, rx) = bridge::channel();
        let addr = serve_one(rx, idle_producer_handle()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        send_line(&mut writer, &Request::Subscribe).await;

        for stack in [1u8, 2, 3] {
            tx.send(Snapshot {
                stack,
                ..Snapshot::default()
            })
            .unwrap();
            let line = lines.next_line().await.unwrap().unwrap();
            match serde_json::from_str::<Response>(&line).unwrap() {
                Response::State(snapshot) => assert_eq!(snapshot.stack, stack),
                other => panic!("unexpected response: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn set_interval_retunes_the_producer() {
        let (_tx, rx) = bridge::channel();
        let handle = idle_producer_handle();
        let addr = serve_one(rx, handle.clone()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        send_line(&mut writer, &Request::SetIntervalMs { ms: 500 }).await;
        let line = lines.next_line().await.unwrap().unwrap();
        assert!(matches!(
            serde_json::from_str::<Response>(&line).unwrap(),
            Response::Success { .. }
        ));
        assert_eq!(handle.interval(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn invalid_requests_get_an_error_response() {
        let (_tx, rx) = bridge::channel();
        let addr = serve_one(rx, idle_producer_handle()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(b"{\"type\":\"Nonsense\"}\n").await.unwrap();
        let line = lines.next_line().await.unwrap().unwrap();
        assert!(matches!(
            serde_json::from_str::<Response>(&line).unwrap(),
            Response::Error { .. }
        ));
    }
}
