//! The bundled Pong simulation: physics, scoring and terminal rendering.
//!
//! The server owns the floating-point state; the wire snapshot is a rounded
//! fixed-point projection of it (1/100 unit), good enough for remote render
//! and deliberately never widened.

use crate::game::{Game, GameType, GameView};
use crate::keys::{self, KEY_DOWN, KEY_UP};
use crate::protocol::{MsgType, ProtocolError};
use crossterm::cursor::MoveTo;
use crossterm::style::{Attribute, Color, Print, Stylize};
use crossterm::queue;
use rand::Rng;
use std::io::{self, Write};

pub const WIN_SCORE: i16 = 5;
pub const PADDLE_LEN: i32 = 5;
pub const HEADER_ROWS: i32 = 3;
pub const BALL_SPEED_INIT: f32 = 1.0;
pub const BALL_SPEED_INC: f32 = 0.05;
pub const BALL_MAX_SPEED: f32 = 2.5;

const SNAPSHOT_WORDS: usize = 11;
/// Wire snapshot size: 11 little-endian i16 words.
pub const SNAPSHOT_LEN: usize = SNAPSHOT_WORDS * 2;

const CH_BALL: char = '\u{25CF}';
const CH_PADDLE: char = '\u{2588}';
const CH_HLINE: char = '\u{2500}';
const CH_VLINE: char = '\u{2502}';
const CH_TL: char = '\u{250C}';
const CH_TR: char = '\u{2510}';
const CH_BL: char = '\u{2514}';
const CH_BR: char = '\u{2518}';
const CH_CENTER: char = '\u{254E}';
const CH_T_RIGHT: char = '\u{251C}';
const CH_T_LEFT: char = '\u{2524}';

#[derive(Debug, Clone, Copy, Default)]
struct Ball {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    prev_x: f32,
    prev_y: f32,
    speed: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Paddle {
    x: i32,
    y: i32,
    len: i32,
}

#[derive(Default)]
pub struct Pong {
    ball: Ball,
    p1: Paddle,
    p2: Paddle,
    score1: i16,
    score2: i16,
    rows: i32,
    cols: i32,
    field_top: i32,
    field_bottom: i32,
    scored: bool,
}

impl Pong {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scores(&self) -> (i16, i16) {
        (self.score1, self.score2)
    }

    pub fn ball_y(&self) -> f32 {
        self.ball.y
    }

    /// Vertical center of a paddle, used by the solo-mode CPU.
    pub fn paddle_center(&self, player_id: u8) -> f32 {
        let paddle = if player_id == 2 { &self.p2 } else { &self.p1 };
        paddle.y as f32 + paddle.len as f32 / 2.0
    }

    fn reset_ball(&mut self) {
        let field_h = self.field_bottom - self.field_top;
        let mid_y = self.field_top + field_h / 2;

        self.ball.x = (self.cols / 2) as f32;
        self.ball.y = mid_y as f32;
        self.ball.speed = BALL_SPEED_INIT;

        // Serve direction alternates with the total number of points.
        self.ball.vx = if (self.score1 + self.score2) % 2 == 0 {
            1.0
        } else {
            -1.0
        };
        self.ball.vy = rand::thread_rng().gen_range(0..100) as f32 / 100.0 - 0.5;
    }
}

impl Game for Pong {
    fn kind(&self) -> GameType {
        GameType::Pong
    }

    fn init(&mut self, rows: u16, cols: u16) {
        *self = Pong::default();

        self.rows = i32::from(rows);
        self.cols = i32::from(cols);
        self.field_top = HEADER_ROWS;
        self.field_bottom = self.rows - 1;

        let field_h = self.field_bottom - self.field_top;
        let mid_y = self.field_top + field_h / 2;

        self.ball.x = (self.cols / 2) as f32;
        self.ball.y = mid_y as f32;
        self.ball.vx = 1.0;
        self.ball.vy = 0.5;
        self.ball.speed = BALL_SPEED_INIT;
        self.ball.prev_x = self.ball.x;
        self.ball.prev_y = self.ball.y;

        self.p1 = Paddle {
            x: 2,
            y: mid_y - PADDLE_LEN / 2,
            len: PADDLE_LEN,
        };
        self.p2 = Paddle {
            x: self.cols - 3,
            y: mid_y - PADDLE_LEN / 2,
            len: PADDLE_LEN,
        };
    }

    fn handle_input(&mut self, player_id: u8, key: i32) {
        let (top, bottom) = (self.field_top, self.field_bottom);
        let paddle = if player_id == 2 {
            &mut self.p2
        } else {
            &mut self.p1
        };

        if key == KEY_UP || keys::is_char(key, 'w') {
            if paddle.y > top + 1 {
                paddle.y -= 1;
            }
        } else if key == KEY_DOWN || keys::is_char(key, 's') {
            if paddle.y + paddle.len < bottom - 1 {
                paddle.y += 1;
            }
        }
    }

    fn update(&mut self) {
        self.ball.prev_x = self.ball.x;
        self.ball.prev_y = self.ball.y;
        self.scored = false;

        let mut nx = self.ball.x + self.ball.vx * self.ball.speed;
        let mut ny = self.ball.y + self.ball.vy * self.ball.speed;

        // Top/bottom wall bounce
        if (ny as i32) <= self.field_top {
            ny = (self.field_top + 1) as f32;
            self.ball.vy = -self.ball.vy;
        }
        if (ny as i32) >= self.field_bottom - 1 {
            ny = (self.field_bottom - 2) as f32;
            self.ball.vy = -self.ball.vy;
        }

        let bx = nx.round() as i32;
        let by = ny.round() as i32;

        // Left paddle collision
        if bx <= self.p1.x + 1 && self.ball.vx < 0.0 {
            if by >= self.p1.y && by < self.p1.y + self.p1.len {
                nx = (self.p1.x + 2) as f32;
                self.ball.vx = -self.ball.vx;
                // Angle based on where the ball strikes the paddle
                let offset = (by - self.p1.y) as f32 / self.p1.len as f32 - 0.5;
                self.ball.vy = offset * 2.0;
                self.ball.speed = (self.ball.speed + BALL_SPEED_INC).min(BALL_MAX_SPEED);
            }
        }

        // Right paddle collision
        if bx >= self.p2.x - 1 && self.ball.vx > 0.0 {
            if by >= self.p2.y && by < self.p2.y + self.p2.len {
                nx = (self.p2.x - 2) as f32;
                self.ball.vx = -self.ball.vx;
                let offset = (by - self.p2.y) as f32 / self.p2.len as f32 - 0.5;
                self.ball.vy = offset * 2.0;
                self.ball.speed = (self.ball.speed + BALL_SPEED_INC).min(BALL_MAX_SPEED);
            }
        }

        // Scoring
        if bx <= 0 {
            self.score2 += 1;
            self.scored = true;
            self.reset_ball();
            return;
        }
        if bx >= self.cols - 1 {
            self.score1 += 1;
            self.scored = true;
            self.reset_ball();
            return;
        }

        self.ball.x = nx;
        self.ball.y = ny;
    }

    fn render(&self, mut out: &mut dyn Write, view: &GameView<'_>) -> io::Result<()> {
        // crossterm 0.28's `queue!` calls `.by_ref()`, which needs a `Sized`
        // writer; reborrow through one more `&mut` so the macro sees a sized
        // `&mut (&mut dyn Write)` that still coerces back to `&mut dyn Write`.
        let out = &mut out;
        let w = self.cols;
        let top = self.field_top - 1;
        let bottom = self.field_bottom;

        // Top border with the title inset
        let mut line = String::with_capacity(w as usize);
        line.push(CH_TL);
        for _ in 1..w - 1 {
            line.push(CH_HLINE);
        }
        line.push(CH_TR);
        queue!(out, MoveTo(0, top as u16), Print(line.with(Color::Blue)))?;
        let title = " PONG ";
        queue!(
            out,
            MoveTo(((w - title.len() as i32) / 2).max(0) as u16, top as u16),
            Print(title.with(Color::Cyan).attribute(Attribute::Bold))
        )?;

        // Separator below the header row
        let mut line = String::with_capacity(w as usize);
        line.push(CH_T_RIGHT);
        for _ in 1..w - 1 {
            line.push(CH_HLINE);
        }
        line.push(CH_T_LEFT);
        queue!(
            out,
            MoveTo(0, self.field_top as u16),
            Print(line.with(Color::Blue))
        )?;

        // Side borders and the dim center line
        for y in self.field_top + 1..bottom {
            queue!(
                out,
                MoveTo(0, y as u16),
                Print(CH_VLINE.with(Color::Blue)),
                MoveTo((w - 1) as u16, y as u16),
                Print(CH_VLINE.with(Color::Blue)),
                MoveTo((w / 2) as u16, y as u16),
                Print(CH_CENTER.with(Color::DarkGrey))
            )?;
        }

        // Bottom border
        let mut line = String::with_capacity(w as usize);
        line.push(CH_BL);
        for _ in 1..w - 1 {
            line.push(CH_HLINE);
        }
        line.push(CH_BR);
        queue!(
            out,
            MoveTo(0, bottom as u16),
            Print(line.with(Color::Blue))
        )?;

        // Scores over the separator row
        let left = format!("{}: {}", view.p1_name, self.score1);
        queue!(
            out,
            MoveTo(2, self.field_top as u16),
            Print(left.with(Color::Green).attribute(Attribute::Bold))
        )?;
        let right = format!("{} :{}", self.score2, view.p2_name);
        let rx = (w - 2 - right.len() as i32).max(0);
        queue!(
            out,
            MoveTo(rx as u16, self.field_top as u16),
            Print(right.with(Color::Red).attribute(Attribute::Bold))
        )?;

        // Ball trail (dim previous position)
        let px = self.ball.prev_x.round() as i32;
        let py = self.ball.prev_y.round() as i32;
        if px > 0 && px < w - 1 && py > self.field_top && py < bottom {
            queue!(
                out,
                MoveTo(px as u16, py as u16),
                Print(CH_BALL.with(Color::DarkGrey))
            )?;
        }

        // Ball
        let bx = self.ball.x.round() as i32;
        let by = self.ball.y.round() as i32;
        if bx > 0 && bx < w - 1 && by > self.field_top && by < bottom {
            queue!(
                out,
                MoveTo(bx as u16, by as u16),
                Print(CH_BALL.with(Color::Yellow).attribute(Attribute::Bold))
            )?;
        }

        // Paddles
        for i in 0..self.p1.len {
            queue!(
                out,
                MoveTo(self.p1.x as u16, (self.p1.y + i) as u16),
                Print(CH_PADDLE.with(Color::Green))
            )?;
        }
        for i in 0..self.p2.len {
            queue!(
                out,
                MoveTo(self.p2.x as u16, (self.p2.y + i) as u16),
                Print(CH_PADDLE.with(Color::Red))
            )?;
        }

        if view.is_spectator {
            queue!(
                out,
                MoveTo(((w - 16) / 2).max(0) as u16, bottom as u16),
                Print(" [SPECTATING] ".with(Color::DarkGrey))
            )?;
        }
        if view.spectator_count > 0 {
            let label = format!(" {} watching ", view.spectator_count);
            queue!(
                out,
                MoveTo((w - 18).max(0) as u16, bottom as u16),
                Print(label.with(Color::DarkGrey))
            )?;
        }

        // Terminal bell on score
        if self.scored {
            out.write_all(b"\x07")?;
        }

        Ok(())
    }

    fn pack_state(&self) -> Vec<u8> {
        let words: [i16; SNAPSHOT_WORDS] = [
            (self.ball.x * 100.0) as i16,
            (self.ball.y * 100.0) as i16,
            (self.ball.vx * 100.0) as i16,
            (self.ball.vy * 100.0) as i16,
            (self.ball.speed * 100.0) as i16,
            self.p1.y as i16,
            self.p2.y as i16,
            self.score1,
            self.score2,
            (self.ball.prev_x * 100.0) as i16,
            (self.ball.prev_y * 100.0) as i16,
        ];

        let mut buf = Vec::with_capacity(SNAPSHOT_LEN);
        for word in words {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        buf
    }

    fn unpack_state(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        if bytes.len() < SNAPSHOT_LEN {
            return Err(ProtocolError::ShortPayload {
                kind: MsgType::State,
                len: bytes.len(),
            });
        }

        let mut words = [0i16; SNAPSHOT_WORDS];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(2)) {
            *word = i16::from_le_bytes([chunk[0], chunk[1]]);
        }

        self.ball.x = f32::from(words[0]) / 100.0;
        self.ball.y = f32::from(words[1]) / 100.0;
        self.ball.vx = f32::from(words[2]) / 100.0;
        self.ball.vy = f32::from(words[3]) / 100.0;
        self.ball.speed = f32::from(words[4]) / 100.0;
        self.p1.y = i32::from(words[5]);
        self.p2.y = i32::from(words[6]);
        self.score1 = words[7];
        self.score2 = words[8];
        self.ball.prev_x = f32::from(words[9]) / 100.0;
        self.ball.prev_y = f32::from(words[10]) / 100.0;
        Ok(())
    }

    fn is_over(&self) -> bool {
        self.score1 >= WIN_SCORE || self.score2 >= WIN_SCORE
    }

    fn winner(&self) -> Option<u8> {
        if self.score1 >= WIN_SCORE {
            Some(1)
        } else if self.score2 >= WIN_SCORE {
            Some(2)
        } else {
            None
        }
    }
}
