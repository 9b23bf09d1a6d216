//! The authoritative server loop: a two-state (Active/Paused) protocol
//! machine binding transport, codec and simulation together.
//!
//! Ordering within a tick is fixed: ingest messages, advance the simulation,
//! broadcast the snapshot. Every peer therefore observes a tick's input
//! effects in the same authoritative snapshot.

use crate::net::{NetError, ServerTransport};
use log::{debug, info, warn};
use shared::protocol::{Message, Role, PAUSE_REASON_DISCONNECT};
use shared::term::{poll_key, Screen};
use shared::{keys, CancelToken, Game, Session, RECONNECT_TIMEOUT};
use std::io;
use std::time::{Duration, Instant};

/// How a hosted match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// A score reached the win line.
    Finished { winner: u8 },
    /// The reconnect window expired; the remaining player wins.
    Forfeit { winner: u8 },
    /// Somebody pressed quit, locally or remotely.
    Quit,
    /// Ctrl-c.
    Cancelled,
}

/// Result of one polling pass while the match is paused.
#[derive(Debug, PartialEq, Eq)]
pub enum PausedTick {
    Forfeited { winner: u8 },
    Resumed { slot: usize },
    Waiting { remaining: Duration },
}

async fn broadcast(transport: &mut ServerTransport, msg: &Message) -> usize {
    match msg.encode() {
        Ok(frame) => transport.send_to_all(&frame).await,
        Err(err) => {
            warn!("could not encode {:?} for broadcast: {err}", msg.msg_type());
            0
        }
    }
}

async fn send_to(transport: &ServerTransport, idx: usize, msg: &Message) -> bool {
    match msg.encode() {
        Ok(frame) => transport
            .send(idx, &frame, Duration::from_millis(500))
            .await
            .is_ok(),
        Err(err) => {
            warn!("could not encode {:?}: {err}", msg.msg_type());
            false
        }
    }
}

/// Seats an already-greeted connection as a spectator: WELCOME with id 0,
/// then the GAME_START it missed.
async fn seat_spectator(
    transport: &mut ServerTransport,
    session: &mut Session,
    idx: usize,
    name: String,
) {
    transport.mark_spectator(idx, &name);
    let welcome = Message::Welcome {
        host_name: session.p1_name.clone(),
        opponent_name: session.p2_name.clone(),
        assigned_id: 0,
    };
    let start = Message::GameStart {
        game_type: session.game.kind() as u8,
        p1_name: session.p1_name.clone(),
        p2_name: session.p2_name.clone(),
    };
    if send_to(transport, idx, &welcome).await && send_to(transport, idx, &start).await {
        session.spectator_count += 1;
        info!("spectator {name} joined in slot {idx}");
    } else {
        transport.close(idx);
    }
}

/// Opportunistic accept during active play. Mid-match there is no vacant
/// player seat, so every well-behaved newcomer becomes a spectator.
async fn admit_pending_connection(transport: &mut ServerTransport, session: &mut Session) {
    match transport.accept(Duration::ZERO).await {
        Ok(Some(idx)) => match transport.recv(idx, Duration::from_secs(1)).await {
            Ok(Some(Message::Hello { name, role })) => {
                if role == Role::Player {
                    debug!("{name} asked to play mid-match; seating as spectator");
                }
                seat_spectator(transport, session, idx, name).await;
            }
            Ok(Some(other)) => {
                warn!("expected HELLO, got {:?}; closing", other.msg_type());
                transport.close(idx);
            }
            Ok(None) | Err(_) => transport.close(idx),
        },
        Ok(None) => {}
        Err(err) => warn!("accept failed: {err}"),
    }
}

/// One polling pass of the Paused state: forfeit once the reconnect window
/// is spent, otherwise look for a reconnecting player (who gets the vacant
/// player-2 seat back, by slot) or a late spectator. Simulation time never
/// advances here.
pub async fn poll_paused(
    transport: &mut ServerTransport,
    session: &mut Session,
    disconnected_at: Instant,
    winner_on_forfeit: u8,
) -> PausedTick {
    let elapsed = disconnected_at.elapsed();
    if elapsed >= RECONNECT_TIMEOUT {
        let winner_name = session.player_name(winner_on_forfeit).to_string();
        info!("reconnect window exhausted; {winner_name} wins by forfeit");
        broadcast(
            transport,
            &Message::GameOver {
                winner_id: winner_on_forfeit,
                winner_name,
            },
        )
        .await;
        return PausedTick::Forfeited {
            winner: winner_on_forfeit,
        };
    }

    match transport.accept(Duration::from_millis(100)).await {
        Ok(Some(idx)) => match transport.recv(idx, Duration::from_secs(3)).await {
            Ok(Some(Message::Hello {
                name,
                role: Role::Player,
            })) => {
                transport.mark_player(idx, &name, 2);
                let welcome = Message::Welcome {
                    host_name: session.p1_name.clone(),
                    opponent_name: session.p2_name.clone(),
                    assigned_id: 2,
                };
                let start = Message::GameStart {
                    game_type: session.game.kind() as u8,
                    p1_name: session.p1_name.clone(),
                    p2_name: session.p2_name.clone(),
                };
                if send_to(transport, idx, &welcome).await && send_to(transport, idx, &start).await
                {
                    broadcast(transport, &Message::Resume).await;
                    session.paused = false;
                    info!("{name} reconnected into slot {idx}");
                    return PausedTick::Resumed { slot: idx };
                }
                transport.close(idx);
            }
            Ok(Some(Message::Hello {
                name,
                role: Role::Spectator,
            })) => seat_spectator(transport, session, idx, name).await,
            Ok(Some(other)) => {
                warn!("expected HELLO, got {:?}; closing", other.msg_type());
                transport.close(idx);
            }
            Ok(None) | Err(_) => transport.close(idx),
        },
        Ok(None) => {}
        Err(err) => warn!("accept failed while paused: {err}"),
    }

    PausedTick::Waiting {
        remaining: RECONNECT_TIMEOUT - elapsed,
    }
}

/// Runs the authoritative loop until the match ends one way or another.
pub async fn run_server(
    session: &mut Session,
    transport: &mut ServerTransport,
    mut player_slot: Option<usize>,
    screen: &mut Screen,
    tick_rate: u32,
    cancel: &CancelToken,
) -> io::Result<SessionEnd> {
    let tick = shared::tick_interval(tick_rate);
    let mut last_tick = Instant::now();
    // Meaningful only while paused.
    let mut disconnected_at = Instant::now();

    loop {
        let iter_start = Instant::now();

        if cancel.is_cancelled() {
            broadcast(transport, &Message::Quit).await;
            return Ok(SessionEnd::Cancelled);
        }

        if session.paused {
            let winner_on_forfeit = if player_slot.is_some() { 2 } else { 1 };
            match poll_paused(transport, session, disconnected_at, winner_on_forfeit).await {
                PausedTick::Forfeited { winner } => {
                    let name = session.player_name(winner).to_string();
                    screen.game_over(&name, Some(winner == 1))?;
                    return Ok(SessionEnd::Forfeit { winner });
                }
                PausedTick::Resumed { slot } => player_slot = Some(slot),
                PausedTick::Waiting { remaining } => {
                    screen.pause_overlay(remaining.as_secs())?;
                }
            }
            continue;
        }

        admit_pending_connection(transport, session).await;

        // Remote player input; a broken read here pauses the match instead
        // of ending it.
        if let Some(idx) = player_slot {
            match transport.recv(idx, Duration::ZERO).await {
                Ok(Some(Message::Input { key })) => session.game.handle_input(2, key),
                Ok(Some(Message::Quit)) => {
                    info!("remote player quit");
                    return Ok(SessionEnd::Quit);
                }
                Ok(Some(other)) => debug!("ignoring {:?} mid-match", other.msg_type()),
                Ok(None) => {}
                Err(NetError::Broken) => {
                    warn!("player connection lost; pausing for reconnect");
                    transport.close(idx);
                    player_slot = None;
                    session.paused = true;
                    disconnected_at = Instant::now();
                    broadcast(
                        transport,
                        &Message::Pause {
                            reason: PAUSE_REASON_DISCONNECT,
                        },
                    )
                    .await;
                    continue;
                }
            }
        }

        // Host keyboard drives logical player 1.
        if let Some(key) = poll_key(Duration::ZERO)? {
            if keys::is_quit(key) {
                broadcast(transport, &Message::Quit).await;
                return Ok(SessionEnd::Quit);
            }
            session.game.handle_input(1, key);
        }

        if iter_start.duration_since(last_tick) >= tick {
            last_tick = iter_start;

            session.game.update();
            session.draw(screen.out())?;

            let snapshot = session.game.pack_state();
            broadcast(transport, &Message::State { snapshot }).await;

            if session.game.is_over() {
                let winner = session.game.winner().unwrap_or(1);
                let winner_name = session.player_name(winner).to_string();
                broadcast(
                    transport,
                    &Message::GameOver {
                        winner_id: winner,
                        winner_name: winner_name.clone(),
                    },
                )
                .await;
                screen.game_over(&winner_name, Some(winner == 1))?;
                return Ok(SessionEnd::Finished { winner });
            }
        }

        // Yield the rest of the tick budget without sleeping past the next
        // boundary.
        let remaining = tick.saturating_sub(iter_start.elapsed());
        if remaining > Duration::from_millis(1) {
            tokio::time::sleep(remaining / 2).await;
        }
    }
}
