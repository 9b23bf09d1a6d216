use clap::Parser;
use log::{info, warn};
use server::net::ServerTransport;
use server::session::{run_server, SessionEnd};
use shared::protocol::{Message, Role};
use shared::stats::Stats;
use shared::term::{poll_key, Screen};
use shared::{keys, CancelToken, GameType, Session, SessionMode};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Host a terminal Pong match", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Display name shown to the opponent
    #[arg(short, long, default_value = "Host")]
    name: String,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = shared::TICK_RATE_HZ)]
    tick_rate: u32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let cancel = CancelToken::new();
    {
        // The handler's only job is to set the token; every loop checks it
        // at its polling points.
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let mut stats = Stats::open_default();

    let mut transport = ServerTransport::bind(args.port).await.map_err(|err| {
        format!(
            "failed to listen on port {}: {err} (is the port already in use?)",
            args.port
        )
    })?;

    let mut screen = Screen::new()?;
    screen.waiting(&args.name, args.port)?;

    // Wait for an opponent. Early spectators are greeted and parked; they
    // will pick up GAME_START from the broadcast below.
    let mut early_spectators = 0usize;
    let (player_slot, peer_name) = loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        if let Some(key) = poll_key(Duration::ZERO)? {
            if keys::is_quit(key) || key == keys::KEY_ESC {
                return Ok(());
            }
        }

        let Some(idx) = transport.accept(Duration::from_millis(200)).await? else {
            continue;
        };
        match transport.recv(idx, Duration::from_secs(5)).await {
            Ok(Some(Message::Hello {
                name,
                role: Role::Player,
            })) => break (idx, name),
            Ok(Some(Message::Hello {
                name,
                role: Role::Spectator,
            })) => {
                transport.mark_spectator(idx, &name);
                let welcome = Message::Welcome {
                    host_name: args.name.clone(),
                    opponent_name: String::new(),
                    assigned_id: 0,
                };
                if transport
                    .send(idx, &welcome.encode()?, Duration::from_millis(500))
                    .await
                    .is_err()
                {
                    transport.close(idx);
                } else {
                    early_spectators += 1;
                    info!("spectator {name} waiting for the match to start");
                }
            }
            Ok(Some(other)) => {
                warn!("expected HELLO, got {:?}; closing", other.msg_type());
                transport.close(idx);
            }
            Ok(None) => {
                warn!("connection sent no HELLO in time");
                transport.close(idx);
            }
            Err(_) => transport.close(idx),
        }
    };

    transport.mark_player(player_slot, &peer_name, 2);
    let welcome = Message::Welcome {
        host_name: args.name.clone(),
        opponent_name: peer_name.clone(),
        assigned_id: 2,
    };
    if transport
        .send(player_slot, &welcome.encode()?, Duration::from_secs(1))
        .await
        .is_err()
    {
        screen.message("Player vanished during the handshake.")?;
        screen.wait_any_key()?;
        return Ok(());
    }

    screen.player_joined(&args.name, &peer_name)?;

    let start = Message::GameStart {
        game_type: GameType::Pong as u8,
        p1_name: args.name.clone(),
        p2_name: peer_name.clone(),
    };
    transport.send_to_all(&start.encode()?).await;

    screen.countdown(&args.name, &peer_name)?;

    let (rows, cols) = screen.size()?;
    let mut session = Session::new(
        GameType::Pong,
        args.name.clone(),
        peer_name.clone(),
        1,
        SessionMode::Server,
        rows,
        cols,
    );
    session.spectator_count = early_spectators;

    let end = run_server(
        &mut session,
        &mut transport,
        Some(player_slot),
        &mut screen,
        args.tick_rate,
        &cancel,
    )
    .await?;

    // Forfeits and quits stay out of the record, same as abandoned games.
    if let SessionEnd::Finished { winner } = end {
        stats.record_game(GameType::Pong.stats_key(), winner == 1);
    }
    info!("session ended: {end:?}");

    Ok(())
}
