//! Offline practice match against a simple CPU paddle. Same simulation and
//! pacing as a hosted match, no networking.

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use shared::game::{Game, GameView};
use shared::pong::Pong;
use shared::stats::Stats;
use shared::term::{poll_key, Screen};
use shared::{keys, CancelToken, GameType};
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Nudges the CPU paddle one cell toward the ball.
fn cpu_step(game: &mut Pong) {
    let target = game.ball_y();
    let mid = game.paddle_center(2);
    if target < mid - 1.0 {
        game.handle_input(2, keys::KEY_UP);
    } else if target > mid + 1.0 {
        game.handle_input(2, keys::KEY_DOWN);
    }
}

pub async fn run_solo(
    screen: &mut Screen,
    stats: &mut Stats,
    tick_rate: u32,
    cancel: &CancelToken,
) -> io::Result<()> {
    let (rows, cols) = screen.size()?;
    let mut game = Pong::new();
    game.init(rows, cols);

    screen.countdown("You", "CPU")?;

    let tick = shared::tick_interval(tick_rate);
    let mut last_tick = Instant::now();
    let mut ai_tick: u64 = 0;

    loop {
        let iter_start = Instant::now();

        if cancel.is_cancelled() {
            return Ok(());
        }

        if let Some(key) = poll_key(Duration::ZERO)? {
            if keys::is_quit(key) {
                return Ok(());
            }
            game.handle_input(1, key);
        }

        if iter_start.duration_since(last_tick) >= tick {
            last_tick = iter_start;

            // The CPU reacts every third tick, which keeps it beatable.
            if ai_tick % 3 == 0 {
                cpu_step(&mut game);
            }
            ai_tick += 1;

            game.update();

            let view = GameView {
                p1_name: "You",
                p2_name: "CPU",
                is_spectator: false,
                spectator_count: 0,
            };
            let out = screen.out();
            queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
            game.render(out, &view)?;
            screen.out().flush()?;

            if game.is_over() {
                let winner = game.winner().unwrap_or(1);
                stats.record_game(GameType::Pong.stats_key(), winner == 1);
                let name = if winner == 1 { "You" } else { "CPU" };
                screen.game_over(name, Some(winner == 1))?;
                return Ok(());
            }
        }

        let remaining = tick.saturating_sub(iter_start.elapsed());
        if remaining > Duration::from_millis(1) {
            tokio::time::sleep(remaining / 2).await;
        }
    }
}
