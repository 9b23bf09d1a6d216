//! Follower loops: the remote player and the read-only spectator.
//!
//! Followers never advance simulation time. They drain whatever the server
//! sent since the last iteration, keep only the freshest snapshot for
//! rendering, and react to the control messages in between.

use crate::net::{Connection, NetError};
use log::{debug, info, warn};
use shared::protocol::Message;
use shared::term::{poll_key, Screen};
use shared::{keys, CancelToken, Game, Session, RECONNECT_TIMEOUT};
use std::io;
use std::time::Duration;

/// Terminal events a drain pass can surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowerEvent {
    GameOver { winner_id: u8, winner_name: String },
    Quit,
    ServerLost,
}

/// Outcome of one drain pass over the inbound queue.
#[derive(Debug, Default)]
pub struct Drain {
    /// A snapshot arrived; the last one applied is the freshest.
    pub got_state: bool,
    pub event: Option<FollowerEvent>,
}

/// How the follower session ended, for the caller's stats and farewells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEnd {
    GameOver { winner_id: u8, you_won: bool },
    Quit,
    ServerLost,
    Cancelled,
}

/// Drains every pending inbound message. The first receive waits up to
/// `first_wait`; once a snapshot has arrived the rest of the queue is
/// drained without blocking, so within one pass the newest snapshot wins.
pub async fn drain_messages(
    conn: &Connection,
    session: &mut Session,
    first_wait: Duration,
) -> Drain {
    let mut drain = Drain::default();
    loop {
        let wait = if drain.got_state {
            Duration::ZERO
        } else {
            first_wait
        };
        match conn.recv(wait).await {
            Ok(None) => break,
            Err(NetError::Broken) => {
                drain.event = Some(FollowerEvent::ServerLost);
                break;
            }
            Ok(Some(msg)) => match msg {
                Message::State { snapshot } => match session.game.unpack_state(&snapshot) {
                    Ok(()) => drain.got_state = true,
                    Err(err) => warn!("dropping bad snapshot: {err}"),
                },
                Message::GameOver {
                    winner_id,
                    winner_name,
                } => {
                    drain.event = Some(FollowerEvent::GameOver {
                        winner_id,
                        winner_name,
                    });
                    break;
                }
                Message::Pause { .. } => session.paused = true,
                Message::Resume => session.paused = false,
                Message::Quit => {
                    drain.event = Some(FollowerEvent::Quit);
                    break;
                }
                other => debug!("ignoring {:?} from the server", other.msg_type()),
            },
        }
    }
    drain
}

/// The playing follower: forwards keystrokes immediately, renders whatever
/// the server last said, and reports win or loss by comparing the winner id
/// to its own.
pub async fn run_client(
    session: &mut Session,
    conn: &Connection,
    screen: &mut Screen,
    cancel: &CancelToken,
) -> io::Result<ClientEnd> {
    loop {
        if cancel.is_cancelled() {
            let _ = conn.send(&Message::Quit, Duration::from_millis(500)).await;
            return Ok(ClientEnd::Cancelled);
        }

        // Input goes out immediately, paused or not; the server decides what
        // to do with it.
        if let Some(key) = poll_key(Duration::ZERO)? {
            if keys::is_quit(key) {
                let _ = conn.send(&Message::Quit, Duration::from_millis(500)).await;
                return Ok(ClientEnd::Quit);
            }
            let _ = conn
                .send(&Message::Input { key }, Duration::from_millis(100))
                .await;
        }

        let drain = drain_messages(conn, session, Duration::from_millis(10)).await;
        match drain.event {
            Some(FollowerEvent::GameOver {
                winner_id,
                winner_name,
            }) => {
                let you_won = winner_id == session.local_player_id;
                screen.game_over(&winner_name, Some(you_won))?;
                return Ok(ClientEnd::GameOver { winner_id, you_won });
            }
            Some(FollowerEvent::Quit) => {
                info!("server ended the session");
                return Ok(ClientEnd::Quit);
            }
            Some(FollowerEvent::ServerLost) => {
                screen.message("Connection to server lost.")?;
                screen.wait_any_key()?;
                return Ok(ClientEnd::ServerLost);
            }
            None => {}
        }

        if drain.got_state {
            session.draw(screen.out())?;
        }
        if session.paused {
            screen.pause_overlay(RECONNECT_TIMEOUT.as_secs())?;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

/// The read-only follower: never sends input, renders with spectator
/// framing, and has no id to compare the winner against.
pub async fn run_spectator(
    session: &mut Session,
    conn: &Connection,
    screen: &mut Screen,
    cancel: &CancelToken,
) -> io::Result<ClientEnd> {
    loop {
        if cancel.is_cancelled() {
            return Ok(ClientEnd::Cancelled);
        }

        if let Some(key) = poll_key(Duration::ZERO)? {
            if keys::is_quit(key) {
                return Ok(ClientEnd::Quit);
            }
        }

        let drain = drain_messages(conn, session, Duration::from_millis(30)).await;
        match drain.event {
            Some(FollowerEvent::GameOver {
                winner_id,
                winner_name,
            }) => {
                screen.game_over(&winner_name, None)?;
                return Ok(ClientEnd::GameOver {
                    winner_id,
                    you_won: false,
                });
            }
            Some(FollowerEvent::Quit) => return Ok(ClientEnd::Quit),
            Some(FollowerEvent::ServerLost) => {
                screen.message("Connection to server lost.")?;
                screen.wait_any_key()?;
                return Ok(ClientEnd::ServerLost);
            }
            None => {}
        }

        if drain.got_state {
            session.draw(screen.out())?;
        }
        if session.paused {
            screen.pause_overlay(RECONNECT_TIMEOUT.as_secs())?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{GameType, SessionMode};
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    fn follower_session() -> Session {
        Session::new(
            GameType::Pong,
            "Alice",
            "Bob",
            2,
            SessionMode::Client,
            24,
            80,
        )
    }

    async fn wired() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let conn = Connection::connect("127.0.0.1", port).await.unwrap();
        let (serverside, _) = listener.accept().await.unwrap();
        (conn, serverside)
    }

    /// A snapshot with a recognizable ball position.
    fn snapshot_with_ball_y(y: i16) -> Message {
        let mut words = [0i16; 11];
        words[0] = 40 * 100;
        words[1] = y * 100;
        words[4] = 100; // speed 1.0
        let mut bytes = Vec::new();
        for word in words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        Message::State { snapshot: bytes }
    }

    #[tokio::test]
    async fn newest_snapshot_wins_within_one_drain() {
        let (conn, mut serverside) = wired().await;
        let mut session = follower_session();

        serverside
            .write_all(&snapshot_with_ball_y(5).encode().unwrap())
            .await
            .unwrap();
        serverside
            .write_all(&snapshot_with_ball_y(12).encode().unwrap())
            .await
            .unwrap();

        let drain = drain_messages(&conn, &mut session, Duration::from_millis(200)).await;
        assert!(drain.got_state);
        assert!(drain.event.is_none());

        let state = session.game.pack_state();
        let ball_y = i16::from_le_bytes([state[2], state[3]]);
        assert_eq!(ball_y, 12 * 100);
    }

    #[tokio::test]
    async fn pause_and_resume_toggle_the_overlay_flag() {
        let (conn, mut serverside) = wired().await;
        let mut session = follower_session();

        serverside
            .write_all(&Message::Pause { reason: 0 }.encode().unwrap())
            .await
            .unwrap();
        let drain = drain_messages(&conn, &mut session, Duration::from_millis(200)).await;
        assert!(session.paused);
        assert!(drain.event.is_none());

        serverside
            .write_all(&Message::Resume.encode().unwrap())
            .await
            .unwrap();
        drain_messages(&conn, &mut session, Duration::from_millis(200)).await;
        assert!(!session.paused);
    }

    #[tokio::test]
    async fn game_over_ends_the_drain() {
        let (conn, mut serverside) = wired().await;
        let mut session = follower_session();

        serverside
            .write_all(
                &Message::GameOver {
                    winner_id: 2,
                    winner_name: "Bob".into(),
                }
                .encode()
                .unwrap(),
            )
            .await
            .unwrap();

        let drain = drain_messages(&conn, &mut session, Duration::from_millis(200)).await;
        assert_eq!(
            drain.event,
            Some(FollowerEvent::GameOver {
                winner_id: 2,
                winner_name: "Bob".into()
            })
        );
    }

    #[tokio::test]
    async fn dropped_server_reads_as_server_lost() {
        let (conn, serverside) = wired().await;
        let mut session = follower_session();
        drop(serverside);

        let drain = drain_messages(&conn, &mut session, Duration::from_millis(200)).await;
        assert_eq!(drain.event, Some(FollowerEvent::ServerLost));
    }

    #[tokio::test]
    async fn idle_wire_is_just_idle() {
        let (conn, _serverside) = wired().await;
        let mut session = follower_session();

        let drain = drain_messages(&conn, &mut session, Duration::from_millis(20)).await;
        assert!(!drain.got_state);
        assert!(drain.event.is_none());
    }
}
