//! # Match Server Library
//!
//! Hosting side of terminal Pong. The server owns the authoritative
//! simulation: it seats connections in a fixed slot table, ingests remote
//! input, advances the game at a fixed tick rate and broadcasts rounded
//! state snapshots that clients and spectators render.
//!
//! Everything runs on one thread. Socket readiness and keyboard polling are
//! the only suspension points, all bounded by explicit timeouts, so a single
//! cooperative loop owns the simulation and the connection table outright;
//! there is no locking anywhere.
//!
//! ## Module Organization
//!
//! - [`net`]: TCP listener, connection slots, framed send/recv, broadcast.
//! - [`session`]: the Active/Paused server loop, reconnect handling and
//!   forfeiture.

pub mod net;
pub mod session;
