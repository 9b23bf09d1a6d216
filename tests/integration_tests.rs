//! Integration tests for the netplay stack.
//!
//! These tests validate cross-crate interactions and real socket behavior:
//! codec framing on actual TCP streams, the connection handshake, broadcast
//! delivery and partial failure, and the ingest → tick → broadcast order the
//! session protocol guarantees.

use client::net::Connection;
use server::net::ServerTransport;
use shared::game::Game;
use shared::pong::{Pong, SNAPSHOT_LEN};
use shared::protocol::{Message, Role};
use shared::{keys, GameType, MAX_CLIENTS};
use std::time::Duration;

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;
    use shared::{Header, MSG_HEADER_SIZE};

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::Hello {
                name: "Alice".into(),
                role: Role::Player,
            },
            Message::Welcome {
                host_name: "Alice".into(),
                opponent_name: "Bob".into(),
                assigned_id: 2,
            },
            Message::GameStart {
                game_type: GameType::Pong as u8,
                p1_name: "Alice".into(),
                p2_name: "Bob".into(),
            },
            Message::Input { key: keys::KEY_UP },
            Message::State {
                snapshot: vec![0u8; SNAPSHOT_LEN],
            },
            Message::GameOver {
                winner_id: 1,
                winner_name: "Alice".into(),
            },
            Message::Pause { reason: 0 },
            Message::Resume,
            Message::Quit,
        ]
    }

    /// Every message kind survives a pack/unpack roundtrip.
    #[test]
    fn every_kind_roundtrips() {
        for msg in sample_messages() {
            let frame = msg.encode().unwrap();
            let header = Header::decode(&frame).unwrap();
            let decoded = Message::decode(header.kind, &frame[MSG_HEADER_SIZE..]).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    /// The declared payload length always equals the packed payload length.
    #[test]
    fn header_length_is_always_consistent() {
        for msg in sample_messages() {
            let frame = msg.encode().unwrap();
            let header = Header::decode(&frame).unwrap();
            assert_eq!(header.payload_len as usize, frame.len() - MSG_HEADER_SIZE);
        }
    }
}

/// TRANSPORT TESTS
mod transport_tests {
    use super::*;

    async fn server() -> (ServerTransport, u16) {
        let transport = ServerTransport::bind(0).await.expect("bind on port 0");
        let port = transport.local_port().unwrap();
        (transport, port)
    }

    async fn join(transport: &mut ServerTransport, port: u16) -> (Connection, usize) {
        let conn = Connection::connect("127.0.0.1", port).await.unwrap();
        let idx = transport
            .accept(Duration::from_millis(500))
            .await
            .unwrap()
            .expect("pending connection");
        (conn, idx)
    }

    /// The full join handshake: HELLO → WELCOME → GAME_START.
    #[tokio::test]
    async fn handshake_over_loopback() {
        let (mut transport, port) = server().await;
        let (conn, idx) = join(&mut transport, port).await;

        conn.send(
            &Message::Hello {
                name: "Bob".into(),
                role: Role::Player,
            },
            Duration::from_millis(500),
        )
        .await
        .unwrap();

        let hello = transport
            .recv(idx, Duration::from_millis(500))
            .await
            .unwrap()
            .expect("the hello frame");
        match hello {
            Message::Hello { name, role } => {
                assert_eq!(name, "Bob");
                assert_eq!(role, Role::Player);
                transport.mark_player(idx, &name, 2);
            }
            other => panic!("expected HELLO, got {other:?}"),
        }

        let welcome = Message::Welcome {
            host_name: "Alice".into(),
            opponent_name: "Bob".into(),
            assigned_id: 2,
        };
        transport
            .send(idx, &welcome.encode().unwrap(), Duration::from_millis(500))
            .await
            .unwrap();
        let start = Message::GameStart {
            game_type: GameType::Pong as u8,
            p1_name: "Alice".into(),
            p2_name: "Bob".into(),
        };
        assert_eq!(transport.send_to_all(&start.encode().unwrap()).await, 1);

        assert_eq!(
            conn.recv(Duration::from_millis(500)).await.unwrap(),
            Some(welcome)
        );
        assert_eq!(
            conn.recv(Duration::from_millis(500)).await.unwrap(),
            Some(start)
        );
    }

    /// A broadcast reaches every connected slot and reports the count.
    #[tokio::test]
    async fn broadcast_reaches_every_connected_slot() {
        let (mut transport, port) = server().await;
        let mut peers = Vec::new();
        for _ in 0..3 {
            let (conn, _) = join(&mut transport, port).await;
            peers.push(conn);
        }

        let frame = Message::Resume.encode().unwrap();
        assert_eq!(transport.send_to_all(&frame).await, 3);

        for peer in &peers {
            assert_eq!(
                peer.recv(Duration::from_millis(500)).await.unwrap(),
                Some(Message::Resume)
            );
        }
    }

    /// One dead peer out of three: the broadcast still reaches the other
    /// two, reports two deliveries, and the dead slot ends up disconnected.
    #[tokio::test]
    async fn broadcast_partial_failure_drops_only_the_dead_slot() {
        let (mut transport, port) = server().await;
        let (alive_a, _) = join(&mut transport, port).await;
        let (dying, dead_idx) = join(&mut transport, port).await;
        let (alive_b, _) = join(&mut transport, port).await;

        drop(dying);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The first write into a freshly closed socket may still land in the
        // kernel buffer; the RST makes a later one fail. Either way the
        // broadcast must settle at two deliveries with the dead slot closed.
        let frame = Message::Quit.encode().unwrap();
        let mut delivered = transport.send_to_all(&frame).await;
        for _ in 0..10 {
            if delivered == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            delivered = transport.send_to_all(&frame).await;
        }
        assert_eq!(delivered, 2);
        assert!(!transport.is_connected(dead_idx));

        assert_eq!(
            alive_a.recv(Duration::from_millis(500)).await.unwrap(),
            Some(Message::Quit)
        );
        assert_eq!(
            alive_b.recv(Duration::from_millis(500)).await.unwrap(),
            Some(Message::Quit)
        );
    }

    /// Spectator-only broadcasts skip the player slots.
    #[tokio::test]
    async fn spectator_broadcast_skips_players() {
        let (mut transport, port) = server().await;
        let (player, player_idx) = join(&mut transport, port).await;
        let (watcher, watcher_idx) = join(&mut transport, port).await;
        transport.mark_player(player_idx, "Bob", 2);
        transport.mark_spectator(watcher_idx, "Eve");

        let frame = Message::Pause { reason: 0 }.encode().unwrap();
        assert_eq!(transport.send_to_spectators(&frame).await, 1);

        assert_eq!(
            watcher.recv(Duration::from_millis(500)).await.unwrap(),
            Some(Message::Pause { reason: 0 })
        );
        assert!(player
            .recv(Duration::from_millis(100))
            .await
            .unwrap()
            .is_none());
    }

    /// The slot table never grows past its fixed capacity.
    #[tokio::test]
    async fn the_table_holds_ten_connections() {
        let (mut transport, port) = server().await;
        let mut peers = Vec::new();
        for _ in 0..MAX_CLIENTS {
            peers.push(join(&mut transport, port).await);
        }
        assert_eq!(transport.connected_count(), MAX_CLIENTS);

        let _eleventh = Connection::connect("127.0.0.1", port).await.unwrap();
        assert!(transport
            .accept(Duration::from_millis(500))
            .await
            .unwrap()
            .is_none());
        assert_eq!(transport.connected_count(), MAX_CLIENTS);
    }
}

/// SESSION PROTOCOL TESTS
mod session_tests {
    use super::*;

    /// Ingest precedes advancement precedes broadcast: a remote INPUT is
    /// reflected in the very next snapshot every peer receives.
    #[tokio::test]
    async fn remote_input_lands_in_the_next_snapshot() {
        let mut transport = ServerTransport::bind(0).await.unwrap();
        let port = transport.local_port().unwrap();

        let player = Connection::connect("127.0.0.1", port).await.unwrap();
        let player_idx = transport
            .accept(Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();
        let watcher = Connection::connect("127.0.0.1", port).await.unwrap();
        transport
            .accept(Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();

        let mut game = Pong::new();
        game.init(24, 80);
        let p2_before = game.paddle_center(2);

        player
            .send(&Message::Input { key: keys::KEY_UP }, Duration::from_millis(500))
            .await
            .unwrap();

        // One authoritative tick: ingest, advance, broadcast.
        match transport
            .recv(player_idx, Duration::from_millis(500))
            .await
            .unwrap()
        {
            Some(Message::Input { key }) => game.handle_input(2, key),
            other => panic!("expected INPUT, got {other:?}"),
        }
        game.update();
        let state = Message::State {
            snapshot: game.pack_state(),
        };
        assert_eq!(transport.send_to_all(&state.encode().unwrap()).await, 2);

        assert_eq!(game.paddle_center(2), p2_before - 1.0);

        // Both followers decode the same authoritative snapshot.
        for conn in [&player, &watcher] {
            let msg = conn
                .recv(Duration::from_millis(500))
                .await
                .unwrap()
                .expect("a state frame");
            match msg {
                Message::State { snapshot } => {
                    let mut follower = Pong::new();
                    follower.init(24, 80);
                    follower.unpack_state(&snapshot).unwrap();
                    assert_eq!(follower.paddle_center(2), p2_before - 1.0);
                }
                other => panic!("expected STATE, got {other:?}"),
            }
        }
    }

    /// A QUIT frame is just another message on the wire until the loop acts
    /// on it; the codec must keep it intact next to other traffic.
    #[tokio::test]
    async fn control_frames_interleave_with_snapshots() {
        let mut transport = ServerTransport::bind(0).await.unwrap();
        let port = transport.local_port().unwrap();

        let conn = Connection::connect("127.0.0.1", port).await.unwrap();
        transport
            .accept(Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();

        let mut game = Pong::new();
        game.init(24, 80);

        let state = Message::State {
            snapshot: game.pack_state(),
        };
        transport.send_to_all(&state.encode().unwrap()).await;
        transport
            .send_to_all(&Message::Pause { reason: 0 }.encode().unwrap())
            .await;
        transport.send_to_all(&Message::Quit.encode().unwrap()).await;

        assert!(matches!(
            conn.recv(Duration::from_millis(500)).await.unwrap(),
            Some(Message::State { .. })
        ));
        assert_eq!(
            conn.recv(Duration::from_millis(500)).await.unwrap(),
            Some(Message::Pause { reason: 0 })
        );
        assert_eq!(
            conn.recv(Duration::from_millis(500)).await.unwrap(),
            Some(Message::Quit)
        );
    }
}
