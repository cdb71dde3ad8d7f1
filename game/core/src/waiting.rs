//! Waiting Queue (C7): a strict FIFO of identified players parked until a
//! match slot opens, per spec §4.7. Each queued player gets its own
//! worker thread that owns the live connection — sending the "still
//! waiting" / Heartbeat cadence, accepting a Chat `quit` to leave
//! cleanly, and, when summoned, handing the connection off to the lobby
//! without ever releasing the presence reservation.

use crate::presence::{ConnId, PresenceRegistry};
use battleship_proto::PacketType;
use battleship_transport::{ReceiveOutcome, Transport};
use slog::Logger;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

pub struct WaitingPlayer {
    pub username: String,
    pub conn_id: ConnId,
    pub transport: Transport,
}

struct Slot {
    username: String,
    conn_id: ConnId,
    stop: Arc<AtomicBool>,
    handoff: Receiver<Transport>,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<Slot>,
}

/// FIFO of waiting players plus the condition variable that wakes the
/// lobby thread once two are present.
pub struct WaitingQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
}

impl WaitingQueue {
    pub fn new() -> Arc<WaitingQueue> {
        Arc::new(WaitingQueue { inner: Mutex::new(Inner::default()), ready: Condvar::new() })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    /// Parks a newly admitted player: spawns its keepalive worker and
    /// appends it to the back of the queue.
    pub fn enqueue(
        self: &Arc<Self>,
        username: String,
        transport: Transport,
        conn_id: ConnId,
        presence: Arc<PresenceRegistry>,
        connection_timeout: Duration,
        log: Logger,
    ) {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = sync_channel(1);

        let queue = self.clone();
        let worker_stop = stop.clone();
        let worker_username = username.clone();
        std::thread::spawn(move || {
            run_worker(worker_username, transport, conn_id, presence, worker_stop, tx, queue, connection_timeout, log);
        });

        let mut inner = self.inner.lock().unwrap();
        inner.queue.push_back(Slot { username, conn_id, stop, handoff: rx });
        if inner.queue.len() >= 2 {
            self.ready.notify_one();
        }
    }

    /// Blocks until at least two players are queued, pops the two
    /// earliest in strict FIFO order, and waits for each of their workers
    /// to actually hand its connection over.
    pub fn pop_pair(&self) -> (WaitingPlayer, WaitingPlayer) {
        let (a, b) = {
            let mut inner = self.inner.lock().unwrap();
            loop {
                if inner.queue.len() >= 2 {
                    let a = inner.queue.pop_front().unwrap();
                    let b = inner.queue.pop_front().unwrap();
                    break (a, b);
                }
                inner = self.ready.wait(inner).unwrap();
            }
        };

        a.stop.store(true, Ordering::SeqCst);
        b.stop.store(true, Ordering::SeqCst);

        let p1 = WaitingPlayer {
            username: a.username,
            conn_id: a.conn_id,
            transport: a.handoff.recv().expect("waiting worker dropped before handing off"),
        };
        let p2 = WaitingPlayer {
            username: b.username,
            conn_id: b.conn_id,
            transport: b.handoff.recv().expect("waiting worker dropped before handing off"),
        };
        (p1, p2)
    }

    /// Removes a still-queued entry by username (called by a worker that
    /// is leaving on its own, via `quit` or disconnect).
    fn remove(&self, username: &str) {
        self.inner.lock().unwrap().queue.retain(|slot| slot.username != username);
    }
}

const STILL_WAITING_CADENCE: Duration = Duration::from_secs(20);

#[allow(clippy::too_many_arguments)]
fn run_worker(
    username: String,
    mut transport: Transport,
    conn_id: ConnId,
    presence: Arc<PresenceRegistry>,
    stop: Arc<AtomicBool>,
    handoff: std::sync::mpsc::SyncSender<Transport>,
    queue: Arc<WaitingQueue>,
    poll_timeout: Duration,
    log: Logger,
) {
    let mut last_heartbeat = Instant::now();
    // Poll at a cadence short enough that a summoned player doesn't wait
    // long for the handoff, capped by the connection's inactivity bound.
    let poll = poll_timeout.min(Duration::from_secs(2));

    loop {
        if stop.load(Ordering::SeqCst) {
            let _ = handoff.send(transport);
            return;
        }

        match transport.receive(poll) {
            ReceiveOutcome::Valid(header, payload) => {
                let text = String::from_utf8_lossy(&payload).trim().to_string();
                // `quit` is a game decision, not chat, per the Open
                // Questions resolution: only `Move` carries decisions.
                if header.packet_type == PacketType::Move && text.eq_ignore_ascii_case("quit") {
                    slog::info!(log, "waiting player left"; "username" => username.as_str());
                    presence.release(&username, conn_id);
                    queue.remove(&username);
                    return;
                } else if header.packet_type == PacketType::Disconnect {
                    presence.release(&username, conn_id);
                    queue.remove(&username);
                    return;
                }
            }
            ReceiveOutcome::Timeout => {
                if last_heartbeat.elapsed() >= STILL_WAITING_CADENCE {
                    let _ = transport.send(PacketType::Chat, b"Still waiting for an opponent...", 1);
                    let _ = transport.send(PacketType::Heartbeat, b"", 1);
                    last_heartbeat = Instant::now();
                }
            }
            ReceiveOutcome::Closed => {
                presence.release(&username, conn_id);
                queue.remove(&username);
                return;
            }
            ReceiveOutcome::Corrupt => continue,
        }
    }
}
