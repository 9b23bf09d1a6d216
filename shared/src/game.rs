//! The pluggable game simulation interface and the registry that maps wire
//! tags to implementations.
//!
//! The session loops stay game-agnostic: they push decoded inputs in, tick
//! the simulation, and shuttle opaque state snapshots over the wire. Adding a
//! game means implementing [`Game`] and extending [`new_game`].

use crate::protocol::ProtocolError;
use std::io::{self, Write};

use crossterm::terminal::{Clear, ClearType};
use crossterm::{cursor, queue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GameType {
    Pong = 0,
}

impl TryFrom<u8> for GameType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(GameType::Pong),
            other => Err(other),
        }
    }
}

impl GameType {
    pub fn title(self) -> &'static str {
        match self {
            GameType::Pong => "Pong",
        }
    }

    /// Stats-file key prefix for this game.
    pub fn stats_key(self) -> &'static str {
        match self {
            GameType::Pong => "pong",
        }
    }
}

/// Per-frame context handed to [`Game::render`].
pub struct GameView<'a> {
    pub p1_name: &'a str,
    pub p2_name: &'a str,
    pub is_spectator: bool,
    pub spectator_count: usize,
}

/// Capability set every playable game implements.
pub trait Game {
    fn kind(&self) -> GameType;

    /// Sizes the playfield to the terminal. Called once before the first tick
    /// and before the first snapshot is applied.
    fn init(&mut self, rows: u16, cols: u16);

    /// Applies one key press for the given logical player (1 or 2).
    fn handle_input(&mut self, player_id: u8, key: i32);

    /// Advances the simulation by one fixed tick.
    fn update(&mut self);

    fn render(&self, out: &mut dyn Write, view: &GameView<'_>) -> io::Result<()>;

    /// Packs the rounded wire snapshot of the current state.
    fn pack_state(&self) -> Vec<u8>;

    /// Applies a wire snapshot received from the authoritative side.
    fn unpack_state(&mut self, bytes: &[u8]) -> Result<(), ProtocolError>;

    fn is_over(&self) -> bool;

    /// `None` while the match is undecided, otherwise the winning player id.
    fn winner(&self) -> Option<u8>;
}

/// Instantiates the game registered for a wire tag.
pub fn new_game(kind: GameType) -> Box<dyn Game> {
    match kind {
        GameType::Pong => Box::new(crate::pong::Pong::new()),
    }
}

/// Which loop drives this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Authoritative simulation, host-side player.
    Server,
    /// Follower that sends inputs and applies snapshots.
    Client,
    /// Read-only follower.
    Spectator,
}

/// One running match: a simulation bound to the two player names and the
/// local role. Owned exclusively by the loop that runs it.
pub struct Session {
    pub game: Box<dyn Game>,
    pub p1_name: String,
    pub p2_name: String,
    pub local_player_id: u8,
    pub mode: SessionMode,
    pub paused: bool,
    pub spectator_count: usize,
}

impl Session {
    pub fn new(
        kind: GameType,
        p1_name: impl Into<String>,
        p2_name: impl Into<String>,
        local_player_id: u8,
        mode: SessionMode,
        rows: u16,
        cols: u16,
    ) -> Self {
        let mut game = new_game(kind);
        game.init(rows, cols);
        Session {
            game,
            p1_name: p1_name.into(),
            p2_name: p2_name.into(),
            local_player_id,
            mode,
            paused: false,
            spectator_count: 0,
        }
    }

    pub fn is_spectator(&self) -> bool {
        self.mode == SessionMode::Spectator
    }

    /// Name of the given player id, defaulting to player 1 for anything odd.
    pub fn player_name(&self, id: u8) -> &str {
        if id == 2 {
            &self.p2_name
        } else {
            &self.p1_name
        }
    }

    /// Clears the terminal and draws the current frame.
    pub fn draw(&self, mut out: &mut dyn Write) -> io::Result<()> {
        // crossterm 0.28's `queue!`/`execute!` call `.by_ref()`, which needs a
        // `Sized` writer. Reborrow through one more `&mut` so the macro sees a
        // sized `&mut (&mut dyn Write)`; it still coerces back to `&mut dyn Write`.
        let out = &mut out;
        queue!(out, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
        let view = GameView {
            p1_name: &self.p1_name,
            p2_name: &self.p2_name,
            is_spectator: self.is_spectator(),
            spectator_count: self.spectator_count,
        };
        self.game.render(out, &view)?;
        out.flush()
    }
}
