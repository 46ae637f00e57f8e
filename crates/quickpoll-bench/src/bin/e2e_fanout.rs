//! End-to-end fan-out benchmark for QuickPoll.
//!
//! Starts the server in-process on an ephemeral port, connects WebSocket
//! viewers to a set of polls and measures how many poll updates reach them while
//! votes are cast as fast as possible. Votes move to the next poll every
//! few hundred so voter lists stay short.

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use quickpoll_core::{Broadcaster, BroadcasterConfig, MemoryStore, PollService};
use quickpoll_protocol::{codec, Frame};
use quickpoll_server::{serve, AppState, Config};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;
const POLLS: usize = 1024;
const VOTES_PER_POLL: u64 = 256;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args: Vec<String> = std::env::args().collect();
    let num_viewers = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);

    println!("QuickPoll end-to-end fan-out benchmark");
    println!("  viewers: {}, warmup: {}s, measurement: {}s", num_viewers, WARMUP_SECS, BENCH_SECS);
    println!();

    let broadcaster = Broadcaster::with_config(BroadcasterConfig {
        max_subscriptions_per_connection: POLLS,
    });
    let service = PollService::new(Arc::new(MemoryStore::new()), Arc::new(broadcaster));
    let state = Arc::new(AppState::new(service, Config::default()));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/ws", listener.local_addr()?);
    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = serve(listener, server_state).await {
            eprintln!("Server error: {}", e);
        }
    });

    let choices = vec!["yes".to_string(), "no".to_string()];
    let poll_ids: Vec<u64> = {
        let mut ids = Vec::new();
        for _ in 0..POLLS {
            ids.push(state.service.create_poll("bench", &choices).await?.id);
        }
        ids
    };

    let update_count = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_viewers + 1));

    let mut handles = Vec::new();
    for viewer in 0..num_viewers {
        let count = Arc::clone(&update_count);
        let barrier = Arc::clone(&barrier);
        let url = url.clone();
        let polls = poll_ids.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = run_viewer(&url, &polls, count, barrier).await {
                eprintln!("Viewer {} error: {}", viewer, e);
            }
        }));
    }

    barrier.wait().await;
    println!("All {} viewers joined {} polls", num_viewers, poll_ids.len());

    let vote_count = Arc::new(AtomicU64::new(0));
    let voter = {
        let state = Arc::clone(&state);
        let votes = Arc::clone(&vote_count);
        let polls = poll_ids.clone();
        tokio::spawn(async move {
            let mut i = 0u64;
            loop {
                let poll_id = polls[((i / VOTES_PER_POLL) as usize) % polls.len()];
                if state.service.cast_vote(poll_id, (i % 2) as i64, "bench").await.is_err() {
                    break;
                }
                votes.fetch_add(1, Ordering::Relaxed);
                i += 1;
                tokio::task::yield_now().await;
            }
        })
    };

    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    update_count.store(0, Ordering::SeqCst);
    vote_count.store(0, Ordering::SeqCst);
    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed().as_secs_f64();
    let updates = update_count.load(Ordering::SeqCst);
    let votes = vote_count.load(Ordering::SeqCst);

    println!();
    println!("Results");
    println!("  duration:          {:>10.2}s", elapsed);
    println!("  votes:             {:>10} ({:.0}/s)", votes, votes as f64 / elapsed);
    println!("  updates delivered: {:>10} ({:.0}/s)", updates, updates as f64 / elapsed);
    println!(
        "  per viewer:        {:>10.0}/s",
        updates as f64 / elapsed / num_viewers as f64
    );

    voter.abort();
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

async fn run_viewer(
    url: &str,
    polls: &[u64],
    update_count: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), BoxError> {
    let (ws, _) = connect_async(url).await?;
    let (mut sender, mut receiver) = ws.split();

    // Connected frame
    receiver.next().await.ok_or("closed before connected")??;

    // Join every poll over MessagePack, one ack per join
    for (i, poll_id) in polls.iter().enumerate() {
        let join = codec::encode(&Frame::join(i as u64, *poll_id))?;
        sender.send(Message::Binary(join.to_vec())).await?;
        receiver.next().await.ok_or("closed before ack")??;
    }

    barrier.wait().await;

    let mut buf = BytesMut::with_capacity(65536);
    while let Some(message) = receiver.next().await {
        if let Message::Binary(data) = message? {
            buf.extend_from_slice(&data);
            while let Some(frame) = codec::decode_from_with_limit(&mut buf, usize::MAX)? {
                if matches!(frame, Frame::PollUpdate { .. }) {
                    update_count.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    Ok(())
}
