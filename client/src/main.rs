use clap::Parser;
use client::net::Connection;
use client::session::{run_client, run_spectator, ClientEnd};
use client::solo::run_solo;
use log::{info, warn};
use shared::protocol::{Message, Role};
use shared::stats::Stats;
use shared::term::Screen;
use shared::{CancelToken, GameType, Session, SessionMode};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Join or watch a terminal Pong match", long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1")]
    server: String,

    /// Server port
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Display name sent to the server
    #[arg(short, long, default_value = "Player")]
    name: String,

    /// Watch the match instead of playing
    #[arg(long)]
    spectate: bool,

    /// Play offline against the computer
    #[arg(long)]
    solo: bool,

    /// Print match statistics and exit
    #[arg(long)]
    stats: bool,

    /// Simulation ticks per second (solo mode)
    #[arg(short, long, default_value_t = shared::TICK_RATE_HZ)]
    tick_rate: u32,
}

fn print_stats(stats: &Stats) {
    if stats.is_empty() {
        println!("No games recorded yet.");
        return;
    }
    let (played, won, lost) = stats.summary(GameType::Pong.stats_key());
    println!("Pong");
    println!("  Played: {played}");
    println!("  Won:    {won}");
    println!("  Lost:   {lost}");
    if played > 0 {
        println!("  Win %:  {}%", won * 100 / played);
    }
}

/// Shows a farewell notice and waits for a key so the user can read it
/// before the alternate screen goes away.
fn farewell(screen: &mut Screen, text: &str) -> std::io::Result<()> {
    screen.message(text)?;
    screen.wait_any_key()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut stats = Stats::open_default();

    if args.stats {
        print_stats(&stats);
        return Ok(());
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    if args.solo {
        let mut screen = Screen::new()?;
        run_solo(&mut screen, &mut stats, args.tick_rate, &cancel).await?;
        return Ok(());
    }

    let role = if args.spectate {
        Role::Spectator
    } else {
        Role::Player
    };

    let conn = Connection::connect(&args.server, args.port)
        .await
        .map_err(|err| format!("failed to connect to {}:{}: {err}", args.server, args.port))?;
    info!("connected to {}:{}", args.server, args.port);

    let mut screen = Screen::new()?;
    screen.message("Connecting...")?;

    if conn
        .send(
            &Message::Hello {
                name: args.name.clone(),
                role,
            },
            Duration::from_secs(1),
        )
        .await
        .is_err()
    {
        farewell(&mut screen, "Could not greet the server.")?;
        return Ok(());
    }

    let assigned_id = match conn.recv(Duration::from_secs(5)).await {
        Ok(Some(Message::Welcome { assigned_id, .. })) => assigned_id,
        Ok(Some(other)) => {
            warn!("expected WELCOME, got {:?}", other.msg_type());
            farewell(&mut screen, "Unexpected response from server.")?;
            return Ok(());
        }
        Ok(None) => {
            farewell(&mut screen, "No response from server.")?;
            return Ok(());
        }
        Err(_) => {
            farewell(&mut screen, "Connection lost during the handshake.")?;
            return Ok(());
        }
    };

    screen.message("Waiting for the game to start...")?;

    // Spectators may join long before the second player does.
    let start_wait = if args.spectate {
        Duration::from_secs(30)
    } else {
        Duration::from_secs(10)
    };
    let (game_type, p1_name, p2_name) = match conn.recv(start_wait).await {
        Ok(Some(Message::GameStart {
            game_type,
            p1_name,
            p2_name,
        })) => (game_type, p1_name, p2_name),
        Ok(Some(other)) => {
            warn!("expected GAME_START, got {:?}", other.msg_type());
            farewell(&mut screen, "Unexpected message from server.")?;
            return Ok(());
        }
        Ok(None) => {
            farewell(&mut screen, "Timed out waiting for the game to start.")?;
            return Ok(());
        }
        Err(_) => {
            farewell(&mut screen, "Connection lost before the game started.")?;
            return Ok(());
        }
    };

    let Ok(kind) = GameType::try_from(game_type) else {
        warn!("server announced unknown game type {game_type}");
        farewell(&mut screen, "Server is running an unknown game.")?;
        return Ok(());
    };

    if !args.spectate {
        screen.countdown(&p1_name, &p2_name)?;
    }

    let (rows, cols) = screen.size()?;
    let (mode, local_id) = if args.spectate {
        (SessionMode::Spectator, 0)
    } else {
        (SessionMode::Client, assigned_id)
    };
    let mut session = Session::new(kind, p1_name, p2_name, local_id, mode, rows, cols);

    let end = if args.spectate {
        run_spectator(&mut session, &conn, &mut screen, &cancel).await?
    } else {
        run_client(&mut session, &conn, &mut screen, &cancel).await?
    };

    if !args.spectate {
        if let ClientEnd::GameOver { you_won, .. } = end {
            stats.record_game(kind.stats_key(), you_won);
        }
    }
    info!("session ended: {end:?}");

    Ok(())
}
