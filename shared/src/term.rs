//! Terminal lifecycle and the small full-screen notices every loop shares.
//!
//! [`Screen`] is an RAII guard: raw mode plus the alternate screen are
//! entered on construction and restored on drop, so an early `?` return
//! never leaves the shell unusable.

use crate::keys;
use crossterm::cursor::{self, MoveTo};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::{Attribute, Color, Print, Stylize};
use crossterm::terminal::{
    self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use crossterm::{execute, queue};
use std::io::{self, Stdout, Write};
use std::time::Duration;

pub struct Screen {
    out: Stdout,
}

impl Screen {
    pub fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut out = io::stdout();
        if let Err(err) = execute!(out, EnterAlternateScreen, cursor::Hide) {
            let _ = disable_raw_mode();
            return Err(err);
        }
        Ok(Screen { out })
    }

    /// `(rows, cols)` of the terminal.
    pub fn size(&self) -> io::Result<(u16, u16)> {
        let (cols, rows) = terminal::size()?;
        Ok((rows, cols))
    }

    pub fn out(&mut self) -> &mut Stdout {
        &mut self.out
    }

    fn centered(&mut self, row: u16, text: &str, color: Color, bold: bool) -> io::Result<()> {
        let (cols, _) = terminal::size()?;
        let col = (cols.saturating_sub(text.len() as u16)) / 2;
        let mut styled = text.with(color);
        if bold {
            styled = styled.attribute(Attribute::Bold);
        }
        queue!(self.out, MoveTo(col, row), Print(styled))
    }

    /// Clears everything and shows one centered line.
    pub fn message(&mut self, text: &str) -> io::Result<()> {
        let (rows, _) = self.size()?;
        queue!(self.out, Clear(ClearType::All))?;
        self.centered(rows / 2, text, Color::Blue, true)?;
        self.out.flush()
    }

    /// Host-side screen shown while the listener waits for an opponent.
    pub fn waiting(&mut self, player_name: &str, port: u16) -> io::Result<()> {
        let (rows, _) = self.size()?;
        let base = (rows / 2).saturating_sub(3);
        queue!(self.out, Clear(ClearType::All))?;
        self.centered(base, "Waiting for another player...", Color::Cyan, true)?;
        self.centered(base + 2, &format!("You: {player_name}"), Color::Green, true)?;
        self.centered(base + 4, &format!("Listening on port {port}"), Color::Blue, false)?;
        self.centered(
            base + 6,
            "Other players connect with this address (press q to cancel)",
            Color::DarkGrey,
            false,
        )?;
        self.out.flush()
    }

    /// Brief "both players present" interstitial.
    pub fn player_joined(&mut self, p1_name: &str, p2_name: &str) -> io::Result<()> {
        let (rows, _) = self.size()?;
        let base = (rows / 2).saturating_sub(2);
        queue!(self.out, Clear(ClearType::All))?;
        self.centered(base, "Player connected!", Color::Cyan, true)?;
        self.centered(base + 2, &format!("Player 1: {p1_name}"), Color::Green, true)?;
        self.centered(base + 3, &format!("Player 2: {p2_name}"), Color::Red, true)?;
        self.out.flush()?;
        std::thread::sleep(Duration::from_millis(1500));
        Ok(())
    }

    /// 3-2-1-GO, blocking; runs before the session loop starts.
    pub fn countdown(&mut self, p1_name: &str, p2_name: &str) -> io::Result<()> {
        let (rows, _) = self.size()?;
        for i in (1..=3u8).rev() {
            queue!(
                self.out,
                Clear(ClearType::All),
                MoveTo(2, 1),
                Print(p1_name.with(Color::Green).attribute(Attribute::Bold)),
                Print(" vs ".with(Color::Blue)),
                Print(p2_name.with(Color::Red).attribute(Attribute::Bold))
            )?;
            self.centered(rows / 2, &i.to_string(), Color::Cyan, true)?;
            self.out.flush()?;
            std::thread::sleep(Duration::from_secs(1));
        }
        queue!(self.out, Clear(ClearType::All))?;
        self.centered(rows / 2, "GO!", Color::Cyan, true)?;
        self.out.flush()?;
        std::thread::sleep(Duration::from_millis(500));
        Ok(())
    }

    /// Boxed overlay drawn on top of the last frame while the match is paused.
    pub fn pause_overlay(&mut self, seconds_left: u64) -> io::Result<()> {
        let (rows, cols) = self.size()?;
        let bw: u16 = 40;
        let bh: u16 = 5;
        let bx = cols.saturating_sub(bw) / 2;
        let by = rows.saturating_sub(bh) / 2;

        for row in 0..bh {
            let line: String = if row == 0 {
                format!("\u{250C}{}\u{2510}", "\u{2500}".repeat(bw as usize - 2))
            } else if row == bh - 1 {
                format!("\u{2514}{}\u{2518}", "\u{2500}".repeat(bw as usize - 2))
            } else {
                format!("\u{2502}{}\u{2502}", " ".repeat(bw as usize - 2))
            };
            queue!(
                self.out,
                MoveTo(bx, by + row),
                Print(line.with(Color::Red))
            )?;
        }

        let msg = "Player disconnected!";
        queue!(
            self.out,
            MoveTo(bx + (bw - msg.len() as u16) / 2, by + 1),
            Print(msg.with(Color::Red).attribute(Attribute::Bold))
        )?;
        let timer = format!("Waiting {seconds_left}s for reconnect...");
        queue!(
            self.out,
            MoveTo(bx + (bw - timer.len() as u16) / 2, by + 3),
            Print(timer.with(Color::Blue))
        )?;
        self.out.flush()
    }

    /// Final banner. `you_won` is `None` for spectators, who have no side.
    pub fn game_over(&mut self, winner_name: &str, you_won: Option<bool>) -> io::Result<()> {
        let (rows, _) = self.size()?;
        let base = (rows / 2).saturating_sub(3);
        queue!(self.out, Clear(ClearType::All))?;
        match you_won {
            Some(true) => self.centered(base, "YOU WIN!", Color::Green, true)?,
            Some(false) => self.centered(base, "YOU LOSE!", Color::Red, true)?,
            None => self.centered(base, "MATCH OVER", Color::Cyan, true)?,
        }
        self.centered(base + 2, &format!("Winner: {winner_name}"), Color::Blue, true)?;
        self.centered(base + 5, "Press any key to continue...", Color::DarkGrey, false)?;
        self.out.write_all(b"\x07")?;
        self.out.flush()?;
        self.wait_any_key()
    }

    /// Blocks until any key arrives.
    pub fn wait_any_key(&mut self) -> io::Result<()> {
        loop {
            if let Event::Key(key) = event::read()? {
                if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
                    return Ok(());
                }
            }
        }
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = execute!(self.out, cursor::Show, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

/// Polls the keyboard for up to `timeout`, returning the wire code of one
/// pressed key if any. Non-key events are swallowed.
pub fn poll_key(timeout: Duration) -> io::Result<Option<i32>> {
    if event::poll(timeout)? {
        if let Event::Key(key) = event::read()? {
            if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
                if key.modifiers.contains(KeyModifiers::CONTROL)
                    && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C'))
                {
                    return Ok(Some(keys::KEY_CTRL_C));
                }
                return Ok(keys::encode_key(key.code));
            }
        }
    }
    Ok(None)
}
