//! Session Engine (C4): drives one match end to end — setup, alternating
//! turns, mid-match disconnect/reconnect, and rematch negotiation — per
//! spec §4.4. Runs entirely on the thread the admission controller spawns
//! for a paired match; a disconnection does not unwind that thread, it
//! just blocks it on the Reconnect Coordinator's channel until the grace
//! window either delivers a new connection or expires.

use crate::ids::GameId;
use crate::presence::ConnId;
use crate::reconnect::{ReconnectCoordinator, ReturnOutcome};
use crate::render;
use crate::spectate::SpectatorFanout;
use battleship_board::{Board, Catalogue, Coordinate, FireOutcome, Orientation, ShipSpec, Snapshot};
use battleship_proto::PacketType;
use battleship_transport::{ReceiveOutcome, SendOutcome, Transport};
use rand::{thread_rng, Rng};
use slog::Logger;
use std::time::{Duration, Instant};

const BOARD_SIZE: u8 = battleship_board::coord::DEFAULT_SIZE;
const REMATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One seated player: identity, the connection used to reach them, and the
/// presence-registry identity that owns their `active` reservation.
pub struct Player {
    pub username: String,
    pub conn_id: ConnId,
    pub transport: Transport,
}

/// A fully-reconstructing snapshot of an in-flight match, per spec §3.
/// Handed to the Reconnect Coordinator on every disconnection; the engine
/// itself never actually loses its live `Board`s (same thread, parked in
/// place), so this value exists for C5's bookkeeping/interface contract
/// rather than as the engine's own resumption source.
pub struct GameSnapshot {
    pub board_p1: Snapshot,
    pub board_p2: Snapshot,
    pub next_turn: String,
}

pub struct MatchConfig {
    pub move_timeout: Duration,
    pub reconnect_timeout: Duration,
    pub catalogue: Catalogue,
}

pub enum PlayerFate {
    /// The player is still connected and should re-enter the waiting
    /// queue for a new match.
    Requeue(Player),
    /// The player is done with this server instance: quit, lost a
    /// forfeit, declined a rematch, or never returned from a disconnect.
    Left(Player),
}

pub struct MatchResult {
    pub p1: PlayerFate,
    pub p2: PlayerFate,
}

struct MatchRuntime {
    p1: Player,
    p2: Player,
    board_p1: Board,
    board_p2: Board,
}

impl MatchRuntime {
    fn player_mut(&mut self, is_p1: bool) -> &mut Player {
        if is_p1 { &mut self.p1 } else { &mut self.p2 }
    }

    fn board_mut(&mut self, is_p1: bool) -> &mut Board {
        if is_p1 { &mut self.board_p1 } else { &mut self.board_p2 }
    }

    fn board(&self, is_p1: bool) -> &Board {
        if is_p1 { &self.board_p1 } else { &self.board_p2 }
    }

    fn username(&self, is_p1: bool) -> &str {
        if is_p1 { &self.p1.username } else { &self.p2.username }
    }

    fn set_player(&mut self, is_p1: bool, player: Player) {
        if is_p1 { self.p1 = player } else { self.p2 = player }
    }
}

/// Runs the match (including any number of rematches the players agree
/// to) to its conclusion and reports what should happen to each player
/// next.
pub fn run_match(
    game_id: GameId,
    p1: Player,
    p2: Player,
    reconnect: &ReconnectCoordinator,
    spectators: &SpectatorFanout,
    config: &MatchConfig,
    log: &Logger,
) -> MatchResult {
    let mut rt = MatchRuntime {
        p1,
        p2,
        board_p1: Board::new(BOARD_SIZE),
        board_p2: Board::new(BOARD_SIZE),
    };

    loop {
        rt.board_p1 = Board::new(BOARD_SIZE);
        rt.board_p2 = Board::new(BOARD_SIZE);

        let p1_name = rt.p1.username.clone();
        let p2_name = rt.p2.username.clone();
        let _ = send_text(&mut rt.p1, PacketType::GameStart, &format!("Your match against {p2_name} is starting."), log);
        let _ = send_text(&mut rt.p2, PacketType::GameStart, &format!("Your match against {p1_name} is starting."), log);

        let end = play_one_match(&mut rt, &game_id, reconnect, spectators, config, log);

        match end {
            MatchEnd::BothGone => {
                let MatchRuntime { p1, p2, .. } = rt;
                return MatchResult { p1: PlayerFate::Left(p1), p2: PlayerFate::Left(p2) };
            }
            MatchEnd::Quit { quitter_is_p1 } => {
                let _ = send_text(
                    rt.player_mut(!quitter_is_p1),
                    PacketType::GameEnd,
                    "Your opponent quit the match. You win!",
                    log,
                );
                let MatchRuntime { p1, p2, .. } = rt;
                return if quitter_is_p1 {
                    MatchResult { p1: PlayerFate::Left(p1), p2: PlayerFate::Requeue(p2) }
                } else {
                    MatchResult { p1: PlayerFate::Requeue(p1), p2: PlayerFate::Left(p2) }
                };
            }
            MatchEnd::ForfeitExpired { winner_is_p1 } => {
                let _ = send_text(
                    rt.player_mut(winner_is_p1),
                    PacketType::GameEnd,
                    "Your opponent did not reconnect in time; you win by default.",
                    log,
                );
                let MatchRuntime { p1, p2, .. } = rt;
                return if winner_is_p1 {
                    MatchResult { p1: PlayerFate::Requeue(p1), p2: PlayerFate::Left(p2) }
                } else {
                    MatchResult { p1: PlayerFate::Left(p1), p2: PlayerFate::Requeue(p2) }
                };
            }
            MatchEnd::Sunk { winner_is_p1 } => {
                let _ = send_text(rt.player_mut(winner_is_p1), PacketType::GameEnd, "All enemy ships sunk. You win!", log);
                let _ = send_text(rt.player_mut(!winner_is_p1), PacketType::GameEnd, "All your ships have been sunk. You lose.", log);
                spectators.broadcast_chat(&format!("{} has won the match!", rt.username(winner_is_p1)));

                match negotiate_rematch(&mut rt, log) {
                    RematchDecision::Both => continue,
                    RematchDecision::OnlyP1 => {
                        let _ = send_text(rt.player_mut(false), PacketType::Chat, "Your opponent wants a rematch but you declined.", log);
                        let MatchRuntime { p1, p2, .. } = rt;
                        return MatchResult { p1: PlayerFate::Requeue(p1), p2: PlayerFate::Left(p2) };
                    }
                    RematchDecision::OnlyP2 => {
                        let _ = send_text(rt.player_mut(true), PacketType::Chat, "Your opponent wants a rematch but you declined.", log);
                        let MatchRuntime { p1, p2, .. } = rt;
                        return MatchResult { p1: PlayerFate::Left(p1), p2: PlayerFate::Requeue(p2) };
                    }
                    RematchDecision::Neither => {
                        if spectators.len() >= 2 {
                            spectators.broadcast_chat("Both players have left the table. Reconnect with a username to fill the open slots.");
                        }
                        let MatchRuntime { p1, p2, .. } = rt;
                        return MatchResult { p1: PlayerFate::Left(p1), p2: PlayerFate::Left(p2) };
                    }
                }
            }
        }
    }
}

enum Stage {
    SetupP1,
    SetupP2,
    Turns(bool),
}

enum MatchEnd {
    Sunk { winner_is_p1: bool },
    Quit { quitter_is_p1: bool },
    ForfeitExpired { winner_is_p1: bool },
    /// Both players vanished before either could be declared a winner;
    /// both presence entries stay parked until their own grace windows
    /// expire independently (spec §9, "ambiguous simultaneous disconnect"
    /// open question, resolved as: Completed with no winner).
    BothGone,
}

fn play_one_match(
    rt: &mut MatchRuntime,
    game_id: &GameId,
    reconnect: &ReconnectCoordinator,
    spectators: &SpectatorFanout,
    config: &MatchConfig,
    log: &Logger,
) -> MatchEnd {
    let mut stage = Stage::SetupP1;

    loop {
        let disconnected_is_p1 = match stage {
            Stage::SetupP1 => {
                if place_player(rt, true, config, log) {
                    stage = Stage::SetupP2;
                    None
                } else {
                    Some(true)
                }
            }
            Stage::SetupP2 => {
                if place_player(rt, false, config, log) {
                    stage = Stage::Turns(true);
                    None
                } else {
                    Some(false)
                }
            }
            Stage::Turns(next_is_p1) => match run_turns(rt, next_is_p1, spectators, config, log) {
                TurnLoopExit::Sunk { winner_is_p1 } => return MatchEnd::Sunk { winner_is_p1 },
                TurnLoopExit::Quit { quitter_is_p1 } => return MatchEnd::Quit { quitter_is_p1 },
                TurnLoopExit::Disconnected { disconnected_is_p1, next_turn_is_p1 } => {
                    stage = Stage::Turns(next_turn_is_p1);
                    Some(disconnected_is_p1)
                }
            },
        };

        let disconnected_is_p1 = match disconnected_is_p1 {
            Some(who) => who,
            None => continue,
        };

        let next_turn_username = match stage {
            Stage::Turns(next_is_p1) => rt.username(next_is_p1).to_string(),
            _ => rt.username(disconnected_is_p1).to_string(),
        };

        match handle_disconnect(rt, disconnected_is_p1, &next_turn_username, game_id, reconnect, config, log) {
            DisconnectResolution::Resumed => continue,
            DisconnectResolution::Forfeited { winner_is_p1 } => return MatchEnd::ForfeitExpired { winner_is_p1 },
            DisconnectResolution::BothGone => return MatchEnd::BothGone,
        }
    }
}

enum DisconnectResolution {
    Resumed,
    Forfeited { winner_is_p1: bool },
    BothGone,
}

fn handle_disconnect(
    rt: &mut MatchRuntime,
    disconnected_is_p1: bool,
    next_turn_username: &str,
    game_id: &GameId,
    reconnect: &ReconnectCoordinator,
    config: &MatchConfig,
    log: &Logger,
) -> DisconnectResolution {
    let disconnected_username = rt.username(disconnected_is_p1).to_string();
    let other_username = rt.username(!disconnected_is_p1).to_string();

    slog::info!(log, "player disconnected mid-match"; "username" => disconnected_username.as_str(), "game_id" => %game_id);

    let snapshot = GameSnapshot {
        board_p1: rt.board_p1.snapshot(),
        board_p2: rt.board_p2.snapshot(),
        next_turn: next_turn_username.to_string(),
    };

    let rx = reconnect.park(&disconnected_username, snapshot, game_id.clone(), &other_username);

    let notice = format!(
        "{disconnected_username} disconnected. Waiting up to {}s for a reconnection before you win by default.",
        config.reconnect_timeout.as_secs()
    );
    if !send_text(rt.player_mut(!disconnected_is_p1), PacketType::Chat, &notice, log) {
        // The other player is gone too: park them under the same scheme
        // and let both grace windows run out independently.
        let other_snapshot = GameSnapshot {
            board_p1: rt.board_p1.snapshot(),
            board_p2: rt.board_p2.snapshot(),
            next_turn: next_turn_username.to_string(),
        };
        let _ = reconnect.park(&other_username, other_snapshot, game_id.clone(), &disconnected_username);
        return DisconnectResolution::BothGone;
    }

    let deadline = Instant::now() + config.reconnect_timeout;
    match reconnect.wait_for_return(&rx, deadline) {
        ReturnOutcome::Resumed(new_transport) => {
            reconnect.claim(&disconnected_username, game_id);

            let conn_id = rt.player_mut(disconnected_is_p1).conn_id;
            rt.set_player(disconnected_is_p1, Player { username: disconnected_username.clone(), conn_id, transport: new_transport });

            let _ = send_text(rt.player_mut(disconnected_is_p1), PacketType::Reconnect, "Reconnected. Resuming your match.", log);
            let _ = send_text(
                rt.player_mut(!disconnected_is_p1),
                PacketType::Chat,
                &format!("{disconnected_username} has reconnected; the reconnection was successful."),
                log,
            );
            let _ = send_board_update(rt, disconnected_is_p1, &[], log);
            let _ = send_board_update(rt, !disconnected_is_p1, &[], log);

            DisconnectResolution::Resumed
        }
        ReturnOutcome::ExpiredForfeit => {
            reconnect.clean(&disconnected_username, game_id);
            DisconnectResolution::Forfeited { winner_is_p1: !disconnected_is_p1 }
        }
    }
}

enum RematchDecision {
    Both,
    OnlyP1,
    OnlyP2,
    Neither,
}

fn negotiate_rematch(rt: &mut MatchRuntime, log: &Logger) -> RematchDecision {
    let p1_yes = ask_rematch(rt, true, log);
    let p2_yes = ask_rematch(rt, false, log);
    match (p1_yes, p2_yes) {
        (true, true) => RematchDecision::Both,
        (true, false) => RematchDecision::OnlyP1,
        (false, true) => RematchDecision::OnlyP2,
        (false, false) => RematchDecision::Neither,
    }
}

fn ask_rematch(rt: &mut MatchRuntime, is_p1: bool, log: &Logger) -> bool {
    if !send_text(rt.player_mut(is_p1), PacketType::Chat, "Rematch? Reply Y or N.", log) {
        return false;
    }
    match read_line(rt.player_mut(is_p1), REMATCH_TIMEOUT, log) {
        Incoming::Text(text) => text.chars().next().map(|c| c.eq_ignore_ascii_case(&'Y')).unwrap_or(false),
        Incoming::Timeout | Incoming::Disconnected => false,
    }
}

enum TurnLoopExit {
    Sunk { winner_is_p1: bool },
    Quit { quitter_is_p1: bool },
    Disconnected { disconnected_is_p1: bool, next_turn_is_p1: bool },
}

fn run_turns(rt: &mut MatchRuntime, mut current_is_p1: bool, spectators: &SpectatorFanout, config: &MatchConfig, log: &Logger) -> TurnLoopExit {
    loop {
        if !send_text(rt.player_mut(current_is_p1), PacketType::Chat, "Your turn. Fire at a coordinate, e.g. B5.", log) {
            return TurnLoopExit::Disconnected { disconnected_is_p1: current_is_p1, next_turn_is_p1: current_is_p1 };
        }
        if !send_text(rt.player_mut(!current_is_p1), PacketType::Chat, "Waiting for your opponent's move...", log) {
            return TurnLoopExit::Disconnected { disconnected_is_p1: !current_is_p1, next_turn_is_p1: current_is_p1 };
        }
        if !send_board_update(rt, current_is_p1, &[], log) {
            return TurnLoopExit::Disconnected { disconnected_is_p1: current_is_p1, next_turn_is_p1: current_is_p1 };
        }

        broadcast_spectator_view(rt, spectators);

        let move_text = match read_line(rt.player_mut(current_is_p1), config.move_timeout, log) {
            Incoming::Text(text) => text,
            Incoming::Timeout | Incoming::Disconnected => {
                return TurnLoopExit::Disconnected { disconnected_is_p1: current_is_p1, next_turn_is_p1: current_is_p1 };
            }
        };

        if move_text.eq_ignore_ascii_case("quit") {
            return TurnLoopExit::Quit { quitter_is_p1: current_is_p1 };
        }

        let size = rt.board(!current_is_p1).size();
        let coord = match Coordinate::parse(&move_text, size) {
            Some(coord) => coord,
            None => {
                if !send_text(rt.player_mut(current_is_p1), PacketType::Error, "Could not parse that coordinate. Try again.", log) {
                    return TurnLoopExit::Disconnected { disconnected_is_p1: current_is_p1, next_turn_is_p1: current_is_p1 };
                }
                continue;
            }
        };

        match rt.board_mut(!current_is_p1).fire_at(coord) {
            FireOutcome::Invalid | FireOutcome::AlreadyShot => {
                if !send_text(
                    rt.player_mut(current_is_p1),
                    PacketType::Error,
                    "That cell was already fired on or is out of bounds. Your turn again.",
                    log,
                ) {
                    return TurnLoopExit::Disconnected { disconnected_is_p1: current_is_p1, next_turn_is_p1: current_is_p1 };
                }
                // No turn change on AlreadyShot/Invalid, per spec §8.
            }
            FireOutcome::Miss => {
                let summary = format!("{} fired at {} — miss.", rt.username(current_is_p1), coord);
                match broadcast_turn_result(rt, &summary, &[], log) {
                    Ok(()) => {
                        broadcast_spectator_view(rt, spectators);
                        spectators.broadcast_chat(&summary);
                        current_is_p1 = !current_is_p1;
                    }
                    Err(who_is_p1) => {
                        return TurnLoopExit::Disconnected { disconnected_is_p1: who_is_p1, next_turn_is_p1: !current_is_p1 };
                    }
                }
            }
            FireOutcome::Hit(sunk_name) => {
                let mut summary = format!("{} fired at {} — hit!", rt.username(current_is_p1), coord);
                let mut sunk_info = Vec::new();
                if let Some(name) = &sunk_name {
                    summary.push_str(&format!(" {name} is sunk!"));
                    if let Some(cells) = rt.board(!current_is_p1).ship_cells_for(name) {
                        sunk_info.push((name.clone(), cells));
                    }
                }

                let other_all_sunk = rt.board(!current_is_p1).all_sunk();
                if other_all_sunk {
                    let _ = broadcast_turn_result(rt, &summary, &sunk_info, log);
                    spectators.broadcast_chat(&summary);
                    return TurnLoopExit::Sunk { winner_is_p1: current_is_p1 };
                }

                match broadcast_turn_result(rt, &summary, &sunk_info, log) {
                    Ok(()) => {
                        broadcast_spectator_view(rt, spectators);
                        spectators.broadcast_chat(&summary);
                        current_is_p1 = !current_is_p1;
                    }
                    Err(who_is_p1) => {
                        return TurnLoopExit::Disconnected { disconnected_is_p1: who_is_p1, next_turn_is_p1: !current_is_p1 };
                    }
                }
            }
        }
    }
}

/// Resends an updated BoardUpdate (plus a Chat summary) to both players
/// after a resolved turn, per spec §4.4's "MUST resend ... after every
/// resolved turn". Returns which side failed, if either did.
fn broadcast_turn_result(rt: &mut MatchRuntime, summary: &str, sunk: &[(String, Vec<Coordinate>)], log: &Logger) -> Result<(), bool> {
    if !send_text(rt.player_mut(true), PacketType::Chat, summary, log) {
        return Err(true);
    }
    if !send_board_update(rt, true, sunk, log) {
        return Err(true);
    }
    if !send_text(rt.player_mut(false), PacketType::Chat, summary, log) {
        return Err(false);
    }
    if !send_board_update(rt, false, sunk, log) {
        return Err(false);
    }
    Ok(())
}

fn broadcast_spectator_view(rt: &MatchRuntime, spectators: &SpectatorFanout) {
    if spectators.is_empty() {
        return;
    }
    let payload = render::spectator_payload(
        &format!("{}'s Grid:", rt.username(true)),
        rt.board(true),
        &format!("{}'s Grid:", rt.username(false)),
        rt.board(false),
    );
    spectators.broadcast_board(&payload);
}

fn send_board_update(rt: &mut MatchRuntime, is_p1: bool, sunk: &[(String, Vec<Coordinate>)], log: &Logger) -> bool {
    let own_cells = rt.board(is_p1).ship_cells();
    let payload = render::board_update_payload(
        "Your Grid:",
        rt.board(is_p1),
        &own_cells,
        "Opponent's Grid:",
        rt.board(!is_p1),
        sunk,
    );
    send_text(rt.player_mut(is_p1), PacketType::BoardUpdate, &payload, log)
}

/// Setup phase for one player (spec §4.4): choose mode, place every ship
/// in catalogue order (manual or random), sending a BoardUpdate after
/// each successful placement. Returns `false` on disconnection.
fn place_player(rt: &mut MatchRuntime, is_p1: bool, config: &MatchConfig, log: &Logger) -> bool {
    if !send_text(rt.player_mut(is_p1), PacketType::Chat, "Choose placement mode: reply M for manual or R for random.", log) {
        return false;
    }

    let manual = match read_line(rt.player_mut(is_p1), config.move_timeout, log) {
        Incoming::Text(text) => text.chars().next().map(|c| c.eq_ignore_ascii_case(&'M')).unwrap_or(false),
        Incoming::Timeout => false,
        Incoming::Disconnected => return false,
    };

    if manual {
        let ships = config.catalogue.ships.clone();
        for spec in &ships {
            if !place_one_ship_manual(rt, is_p1, spec, config, log) {
                return false;
            }
            if !send_board_update(rt, is_p1, &[], log) {
                return false;
            }
        }
    } else {
        let mut rng = thread_rng();
        rt.board_mut(is_p1).place_random(&config.catalogue, &mut rng);
        if !send_board_update(rt, is_p1, &[], log) {
            return false;
        }
    }

    true
}

fn place_one_ship_manual(rt: &mut MatchRuntime, is_p1: bool, spec: &ShipSpec, config: &MatchConfig, log: &Logger) -> bool {
    let prompt = format!(
        "Place your {} (length {}). Reply with a coordinate and orientation, e.g. B3 H.",
        spec.name, spec.length
    );
    if !send_text(rt.player_mut(is_p1), PacketType::Chat, &prompt, log) {
        return false;
    }

    let mut timed_out_once = false;
    loop {
        match read_line(rt.player_mut(is_p1), config.move_timeout, log) {
            Incoming::Text(text) => {
                let size = rt.board(is_p1).size();
                match parse_placement(&text, size) {
                    Some((coord, orientation)) if rt.board(is_p1).can_place(coord.row, coord.col, spec.length, orientation) => {
                        rt.board_mut(is_p1).place(&spec.name, coord.row, coord.col, spec.length, orientation);
                        return true;
                    }
                    _ => {
                        if !send_text(
                            rt.player_mut(is_p1),
                            PacketType::Error,
                            "Invalid placement: bad format, out of bounds, or overlapping another ship. Try again.",
                            log,
                        ) {
                            return false;
                        }
                    }
                }
            }
            Incoming::Timeout => {
                if timed_out_once {
                    place_random_one(rt.board_mut(is_p1), spec);
                    return true;
                }
                timed_out_once = true;
                if !send_text(
                    rt.player_mut(is_p1),
                    PacketType::Error,
                    "No response in time; one more try before this ship is placed for you.",
                    log,
                ) {
                    return false;
                }
            }
            Incoming::Disconnected => return false,
        }
    }
}

fn place_random_one(board: &mut Board, spec: &ShipSpec) {
    let mut rng = thread_rng();
    loop {
        let orientation = if rng.gen_bool(0.5) { Orientation::Horizontal } else { Orientation::Vertical };
        let row = rng.gen_range(0..board.size());
        let col = rng.gen_range(0..board.size());
        if board.can_place(row, col, spec.length, orientation) {
            board.place(&spec.name, row, col, spec.length, orientation);
            return;
        }
    }
}

fn parse_placement(text: &str, size: u8) -> Option<(Coordinate, Orientation)> {
    let mut parts = text.split_whitespace();
    let coord = Coordinate::parse(parts.next()?, size)?;
    let orientation = Orientation::parse(parts.next()?)?;
    Some((coord, orientation))
}

enum Incoming {
    Text(String),
    Timeout,
    Disconnected,
}

/// Reads one game decision (placement mode, coordinate, rematch answer,
/// `quit`) within `timeout`. Only `Move` packets carry game decisions —
/// per the Open Questions resolution, single-character `Chat` leniency is
/// NOT preserved here, so a `Chat` arriving while we wait for a decision
/// is simply not a decision and gets skipped rather than accepted, with
/// the remaining budget of `timeout` shrinking as it goes. Corrupt
/// packets are dropped (and logged) the same way; repeated corruption on
/// the same read closes the connection.
fn read_line(transport: &mut Transport, timeout: Duration, log: &Logger) -> Incoming {
    let deadline = Instant::now() + timeout;
    let mut corrupt_strikes = 0;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Incoming::Timeout;
        }

        match transport.receive(remaining) {
            ReceiveOutcome::Valid(header, payload) => match header.packet_type {
                PacketType::Move => {
                    return Incoming::Text(String::from_utf8_lossy(&payload).trim().to_string());
                }
                PacketType::Disconnect => return Incoming::Disconnected,
                _ => continue,
            },
            ReceiveOutcome::Timeout => return Incoming::Timeout,
            ReceiveOutcome::Closed => return Incoming::Disconnected,
            ReceiveOutcome::Corrupt => {
                corrupt_strikes += 1;
                slog::debug!(log, "dropping corrupt packet"; "strikes" => corrupt_strikes);
                if corrupt_strikes >= 3 {
                    transport.shutdown();
                    return Incoming::Disconnected;
                }
            }
        }
    }
}

fn send_text(player: &mut Player, packet_type: PacketType, text: &str, log: &Logger) -> bool {
    match player.transport.send(packet_type, text.as_bytes(), 3) {
        SendOutcome::Sent => true,
        SendOutcome::Closed => {
            slog::debug!(log, "send failed, treating as disconnect"; "username" => player.username.as_str(), "type" => ?packet_type);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceRegistry;
    use battleship_proto::{Header, Key};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::thread;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard.fuse(), slog::o!())
    }

    fn loopback_pair(key: Key) -> (Transport, Transport) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (
            Transport::new(server, key.clone(), test_logger()),
            Transport::new(client, key, test_logger()),
        )
    }

    fn client_read_until(transport: &mut Transport, mut matches: impl FnMut(&Header, &str) -> bool) -> String {
        loop {
            match transport.receive(Duration::from_secs(5)) {
                ReceiveOutcome::Valid(header, payload) => {
                    let text = String::from_utf8_lossy(&payload).trim().to_string();
                    if matches(&header, &text) {
                        return text;
                    }
                }
                other => panic!("unexpected outcome while waiting for a packet: {other:?}"),
            }
        }
    }

    #[test]
    fn parse_placement_reads_coordinate_and_orientation() {
        assert!(parse_placement("B3 H", 10).is_some());
        assert!(parse_placement("B3", 10).is_none());
        assert!(parse_placement("Z9 H", 10).is_none());
        let (coord, orientation) = parse_placement("a1 v", 10).unwrap();
        assert_eq!(coord, Coordinate::new(0, 0));
        assert_eq!(orientation, Orientation::Vertical);
    }

    #[test]
    fn quit_mid_turn_forfeits_to_opponent() {
        let key = Key::new([5u8; Key::SIZE]);
        let (server_p1, mut client_p1) = loopback_pair(key.clone());
        let (server_p2, mut client_p2) = loopback_pair(key);

        let presence = Arc::new(PresenceRegistry::new(Duration::from_secs(5)));
        let reconnect = ReconnectCoordinator::new(presence);
        let spectators = SpectatorFanout::new();
        let config = MatchConfig {
            move_timeout: Duration::from_millis(200),
            reconnect_timeout: Duration::from_secs(1),
            catalogue: Catalogue::default(),
        };
        let game_id = GameId::new("alice", "bob", 0);

        let p1 = Player { username: "alice".into(), conn_id: 1, transport: server_p1 };
        let p2 = Player { username: "bob".into(), conn_id: 2, transport: server_p2 };

        let handle = thread::spawn(move || run_match(game_id, p1, p2, &reconnect, &spectators, &config, &test_logger()));

        // Both clients let their placement-mode prompt time out, falling
        // back to random placement. P1 (alice) then sees the turn prompt
        // and quits immediately.
        client_read_until(&mut client_p1, |_h, text| text.to_lowercase().contains("your turn"));
        client_p1.send(PacketType::Move, b"quit", 1);

        let end_p2 = client_read_until(&mut client_p2, |h, _| h.packet_type == PacketType::GameEnd);
        assert!(end_p2.to_lowercase().contains("win"));

        let result = handle.join().expect("session thread panicked");
        assert!(matches!(result.p1, PlayerFate::Left(_)));
        assert!(matches!(result.p2, PlayerFate::Requeue(_)));
    }

    #[test]
    fn grace_expiry_forfeit_declares_the_other_player_winner() {
        let key = Key::new([6u8; Key::SIZE]);
        let (server_p1, mut client_p1) = loopback_pair(key.clone());
        let (server_p2, mut client_p2) = loopback_pair(key);

        let presence = Arc::new(PresenceRegistry::new(Duration::from_millis(300)));
        let reconnect = ReconnectCoordinator::new(presence.clone());
        let spectators = SpectatorFanout::new();
        let config = MatchConfig {
            move_timeout: Duration::from_millis(200),
            reconnect_timeout: Duration::from_millis(300),
            catalogue: Catalogue::default(),
        };
        let game_id = GameId::new("alice", "bob", 0);

        let p1 = Player { username: "alice".into(), conn_id: 1, transport: server_p1 };
        let p2 = Player { username: "bob".into(), conn_id: 2, transport: server_p2 };

        let handle = thread::spawn(move || run_match(game_id, p1, p2, &reconnect, &spectators, &config, &test_logger()));

        // Both placement prompts time out into random placement; alice then
        // sees her turn prompt. Dropping her client surfaces Closed on the
        // engine's next read, raising into the disconnect/reconnect path.
        client_read_until(&mut client_p1, |_h, text| text.to_lowercase().contains("your turn"));
        drop(client_p1);

        client_read_until(&mut client_p2, |_h, text| text.to_lowercase().contains("disconnected"));
        let end_p2 = client_read_until(&mut client_p2, |h, _| h.packet_type == PacketType::GameEnd);
        assert!(end_p2.to_lowercase().contains("default"));

        let result = handle.join().expect("session thread panicked");
        assert!(matches!(result.p1, PlayerFate::Left(_)));
        assert!(matches!(result.p2, PlayerFate::Requeue(_)));

        assert!(presence.claim("alice", &GameId::new("alice", "bob", 0)).is_none());
    }

    #[test]
    fn mid_match_disconnect_then_reconnect_resumes_the_same_turn() {
        use crate::presence::ResumeOutcome;

        let key = Key::new([7u8; Key::SIZE]);
        let (server_p1, mut client_p1) = loopback_pair(key.clone());
        let (server_p2, mut client_p2) = loopback_pair(key.clone());

        let presence = Arc::new(PresenceRegistry::new(Duration::from_secs(5)));
        let reconnect = ReconnectCoordinator::new(presence.clone());
        let spectators = SpectatorFanout::new();
        let config = MatchConfig {
            move_timeout: Duration::from_millis(500),
            reconnect_timeout: Duration::from_secs(5),
            catalogue: Catalogue::default(),
        };
        let game_id = GameId::new("alice", "bob", 0);

        let p1 = Player { username: "alice".into(), conn_id: 1, transport: server_p1 };
        let p2 = Player { username: "bob".into(), conn_id: 2, transport: server_p2 };

        let handle = thread::spawn(move || run_match(game_id, p1, p2, &reconnect, &spectators, &config, &test_logger()));

        client_read_until(&mut client_p1, |_h, text| text.to_lowercase().contains("your turn"));
        drop(client_p1);

        client_read_until(&mut client_p2, |_h, text| text.to_lowercase().contains("disconnected"));

        // Simulate the admission controller handing a fresh connection back
        // to the parked session once "alice" reappears, per C9's contract.
        let (server_p1_new, mut client_p1_new) = loopback_pair(key);
        match presence.resume("alice", 99, server_p1_new) {
            ResumeOutcome::Delivered => {}
            ResumeOutcome::NoLongerEligible(_) => panic!("expected the parked snapshot still to be eligible"),
        }

        let reconnect_msg = client_read_until(&mut client_p1_new, |h, _| h.packet_type == PacketType::Reconnect);
        assert!(reconnect_msg.to_lowercase().contains("resuming"));

        let notice = client_read_until(&mut client_p2, |h, _| h.packet_type == PacketType::Chat);
        assert!(notice.to_lowercase().contains("reconnect"));

        // Resumed turn is still alice's; she can now fire normally.
        client_p1_new.send(PacketType::Move, b"B2", 1);
        let hit_or_miss = client_read_until(&mut client_p2, |h, _| h.packet_type == PacketType::Chat);
        assert!(hit_or_miss.to_lowercase().contains("fired at b2"));

        drop(client_p1_new);
        drop(client_p2);
        let _ = handle.join();
    }
}
