//! Spectator Fanout (C8): the set of read-only observers of the current
//! match, per spec §4.8. Spectators get a cloned write handle to their
//! socket registered here for broadcasts, while a separate reader task
//! (spawned by the admission controller via `spawn_reader`) owns the
//! original handle to watch for Chat/quit/Move on the same connection —
//! the two directions of one `TcpStream` are independently safe to drive
//! from different threads, per `Transport::try_clone`.

use battleship_proto::PacketType;
use battleship_transport::{ReceiveOutcome, SendOutcome, Transport};
use slog::Logger;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Observer {
    label: String,
    transport: Transport,
}

/// Guarded by its own mutex, separate from the Presence Registry's, per
/// spec §5's "Shared-resource policy".
#[derive(Default)]
pub struct SpectatorFanout {
    observers: Mutex<Vec<Observer>>,
}

impl SpectatorFanout {
    pub fn new() -> SpectatorFanout {
        SpectatorFanout { observers: Mutex::new(Vec::new()) }
    }

    pub fn len(&self) -> usize {
        self.observers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a write handle for a joining spectator, having already
    /// sent it a welcome message and the current match summary. Returns
    /// the pseudonym ("Spectator@addr") the reader side should tag its
    /// relayed chat with.
    pub fn join(&self, transport: Transport, summary: &str, log: &Logger) -> String {
        let label = transport
            .peer_addr()
            .map(|addr| format!("Spectator@{addr}"))
            .unwrap_or_else(|| "Spectator@unknown".to_string());

        let mut transport = transport;
        let welcome = format!("Welcome, {label}. {summary}");
        let _ = transport.send(PacketType::Chat, welcome.as_bytes(), 1);

        slog::info!(log, "spectator joined"; "label" => label.as_str());
        self.observers.lock().unwrap().push(Observer { label: label.clone(), transport });
        label
    }

    /// Broadcasts a BoardUpdate payload to every observer, pruning any
    /// whose send fails.
    pub fn broadcast_board(&self, payload: &str) {
        self.prune_after(|obs| obs.transport.send(PacketType::BoardUpdate, payload.as_bytes(), 1) == SendOutcome::Sent);
    }

    pub fn broadcast_chat(&self, text: &str) {
        self.prune_after(|obs| obs.transport.send(PacketType::Chat, text.as_bytes(), 1) == SendOutcome::Sent);
    }

    /// Relays one spectator's Chat to the rest under their pseudonym.
    pub fn relay_chat(&self, from_label: &str, text: &str) {
        self.broadcast_chat(&format!("{from_label}: {text}"));
    }

    /// Periodic liveness probe (spec: "15-30s cadence"); same pruning
    /// discipline as a broadcast.
    pub fn heartbeat_sweep(&self) {
        self.prune_after(|obs| obs.transport.send(PacketType::Heartbeat, b"", 1) == SendOutcome::Sent);
    }

    fn prune_after(&self, mut send_ok: impl FnMut(&mut Observer) -> bool) {
        let mut observers = self.observers.lock().unwrap();
        observers.retain_mut(|obs| send_ok(obs));
    }
}

/// Drives one spectator's read side for the lifetime of the connection:
/// relays Chat, rejects Move with an explanatory Chat, and leaves cleanly
/// on `quit` or disconnect. Intended to be spawned on its own thread by
/// the admission controller right after `SpectatorFanout::join`.
pub fn spawn_reader(fanout: Arc<SpectatorFanout>, mut transport: Transport, label: String, read_timeout: Duration, log: Logger) {
    std::thread::spawn(move || loop {
        match transport.receive(read_timeout) {
            ReceiveOutcome::Valid(header, payload) => {
                let text = String::from_utf8_lossy(&payload).trim().to_string();
                match header.packet_type {
                    PacketType::Move if text.eq_ignore_ascii_case("quit") => {
                        slog::info!(log, "spectator left"; "label" => label.as_str());
                        return;
                    }
                    PacketType::Chat => fanout.relay_chat(&label, &text),
                    PacketType::Move => {
                        let _ = transport.send(
                            PacketType::Chat,
                            b"Spectators cannot fire; you are a read-only observer.",
                            1,
                        );
                    }
                    PacketType::Disconnect => return,
                    _ => {}
                }
            }
            ReceiveOutcome::Timeout => continue,
            ReceiveOutcome::Closed => return,
            ReceiveOutcome::Corrupt => continue,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use battleship_proto::Key;
    use slog::Drain;
    use std::net::{TcpListener, TcpStream};

    fn test_logger() -> Logger {
        Logger::root(slog::Discard.fuse(), slog::o!())
    }

    fn loopback_pair() -> (Transport, Transport) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (Transport::new(server, Key::zero(), test_logger()), Transport::new(client, Key::zero(), test_logger()))
    }

    #[test]
    fn join_sends_welcome_and_broadcast_reaches_the_observer() {
        let fanout = SpectatorFanout::new();
        let (server, mut client) = loopback_pair();
        let log = test_logger();

        let label = fanout.join(server, "alice vs bob is in progress.", &log);
        assert!(label.starts_with("Spectator@"));
        assert_eq!(fanout.len(), 1);

        match client.receive(Duration::from_secs(2)) {
            ReceiveOutcome::Valid(_, payload) => {
                assert!(String::from_utf8_lossy(&payload).contains("in progress"));
            }
            other => panic!("expected the welcome message, got {other:?}"),
        }

        fanout.broadcast_chat("a shot was fired");
        match client.receive(Duration::from_secs(2)) {
            ReceiveOutcome::Valid(header, payload) => {
                assert_eq!(header.packet_type, PacketType::Chat);
                assert_eq!(payload, b"a shot was fired");
            }
            other => panic!("expected a Chat broadcast, got {other:?}"),
        }
    }

    #[test]
    fn broadcast_prunes_observers_whose_send_fails() {
        let fanout = SpectatorFanout::new();
        let (server, client) = loopback_pair();
        let log = test_logger();

        fanout.join(server, "match in progress.", &log);
        drop(client);

        // The welcome send above still succeeded (buffered before the drop);
        // the first broadcast after the peer is gone is what observes the
        // failure and prunes the entry.
        for _ in 0..20 {
            fanout.broadcast_chat("ping");
            if fanout.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        assert!(fanout.is_empty(), "dead observer was not pruned after repeated broadcast failures");
    }

    #[test]
    fn reader_rejects_move_packets_with_an_explanatory_chat() {
        let (server, mut client) = loopback_pair();
        let fanout = Arc::new(SpectatorFanout::new());
        let log = test_logger();

        spawn_reader(fanout, server, "Spectator@test".to_string(), Duration::from_secs(2), log);

        client.send(PacketType::Move, b"B5", 1);
        match client.receive(Duration::from_secs(2)) {
            ReceiveOutcome::Valid(header, payload) => {
                assert_eq!(header.packet_type, PacketType::Chat);
                assert!(String::from_utf8_lossy(&payload).to_lowercase().contains("cannot fire"));
            }
            other => panic!("expected a rejection Chat, got {other:?}"),
        }
    }
}
