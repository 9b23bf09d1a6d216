//! Server-side TCP transport: the listener, the fixed table of connection
//! slots, framed send/recv with bounded waits, and broadcast.
//!
//! Slot indices are the stable identity of a connection: a slot is assigned
//! on accept, never moves, and is reused by a reconnecting player. All socket
//! operations are non-blocking at the OS level; the "blocking" helpers here
//! loop over readiness waits bounded by caller-supplied timeouts, so nothing
//! can hang forever.

use log::{debug, info, warn};
use shared::protocol::{Header, Message, Role};
use shared::{MAX_CLIENTS, MAX_MSG_PAYLOAD, MSG_HEADER_SIZE};
use socket2::SockRef;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Readiness window granted to the rest of a partially-read frame.
const CHUNK_RETRY: Duration = Duration::from_millis(50);
/// Send timeout used when the caller passes zero, and for broadcasts.
const DEFAULT_SEND_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetError {
    /// The peer reset, closed, or stalled past its timeout mid-frame.
    #[error("connection broken")]
    Broken,
}

/// Writes one frame, looping over would-block until everything is flushed or
/// the timeout elapses on a stalled socket.
pub(crate) async fn send_frame(
    stream: &TcpStream,
    bytes: &[u8],
    wait: Duration,
) -> Result<(), NetError> {
    let wait = if wait.is_zero() { DEFAULT_SEND_WAIT } else { wait };
    let mut sent = 0;
    while sent < bytes.len() {
        match stream.try_write(&bytes[sent..]) {
            Ok(0) => return Err(NetError::Broken),
            Ok(n) => sent += n,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                match timeout(wait, stream.writable()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) | Err(_) => return Err(NetError::Broken),
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(_) => return Err(NetError::Broken),
        }
    }
    Ok(())
}

/// Reads exactly one framed message: the 3-byte header, then the declared
/// payload. `Ok(None)` means "no data yet" and is distinct from a broken
/// connection so callers can keep polling an idle peer.
pub(crate) async fn recv_frame(
    stream: &TcpStream,
    wait: Duration,
) -> Result<Option<(Header, Vec<u8>)>, NetError> {
    if !wait.is_zero() {
        match timeout(wait, stream.readable()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(NetError::Broken),
            Err(_) => return Ok(None),
        }
    }

    let mut header = [0u8; MSG_HEADER_SIZE];
    let mut have = 0usize;
    while have < MSG_HEADER_SIZE {
        match stream.try_read(&mut header[have..]) {
            Ok(0) => return Err(NetError::Broken),
            Ok(n) => have += n,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                if have == 0 {
                    return Ok(None);
                }
                match timeout(CHUNK_RETRY, stream.readable()).await {
                    Ok(Ok(())) => {}
                    _ => return Err(NetError::Broken),
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(_) => return Err(NetError::Broken),
        }
    }

    let header = Header::decode(&header).map_err(|_| NetError::Broken)?;
    if header.payload_len as usize > MAX_MSG_PAYLOAD {
        warn!(
            "peer announced a {} byte payload, over the {} byte limit",
            header.payload_len, MAX_MSG_PAYLOAD
        );
        return Err(NetError::Broken);
    }

    let mut payload = vec![0u8; header.payload_len as usize];
    let mut have = 0usize;
    while have < payload.len() {
        match stream.try_read(&mut payload[have..]) {
            Ok(0) => return Err(NetError::Broken),
            Ok(n) => have += n,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                match timeout(CHUNK_RETRY, stream.readable()).await {
                    Ok(Ok(())) => {}
                    _ => return Err(NetError::Broken),
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(_) => return Err(NetError::Broken),
        }
    }

    Ok(Some((header, payload)))
}

/// A bad frame is dropped locally; the connection is not killed for it.
pub(crate) fn decode_frame(header: Header, payload: &[u8]) -> Option<Message> {
    match Message::decode(header.kind, payload) {
        Ok(msg) => Some(msg),
        Err(err) => {
            warn!("dropping undecodable frame: {err}");
            None
        }
    }
}

pub(crate) fn apply_socket_options(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;
    if let Err(err) = SockRef::from(stream).set_keepalive(true) {
        warn!("could not enable keepalive: {err}");
    }
    Ok(())
}

/// One seat in the connection table.
pub struct ClientSlot {
    stream: Option<TcpStream>,
    pub role: Role,
    pub player_id: u8,
    pub name: String,
}

impl ClientSlot {
    fn vacant() -> Self {
        ClientSlot {
            stream: None,
            role: Role::Spectator,
            player_id: 0,
            name: String::new(),
        }
    }
}

pub struct ServerTransport {
    listener: TcpListener,
    slots: Vec<ClientSlot>,
}

impl ServerTransport {
    /// Binds the listener on all interfaces. A taken port surfaces here as a
    /// fatal error for the session attempt.
    pub async fn bind(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!("listening on {}", listener.local_addr()?);
        Ok(ServerTransport {
            listener,
            slots: (0..MAX_CLIENTS).map(|_| ClientSlot::vacant()).collect(),
        })
    }

    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Waits up to `wait` for a pending connection and seats it in the first
    /// free slot. `Ok(None)` covers both "nobody knocked" and "no free slot"
    /// (in which case the socket is closed); neither is an error.
    pub async fn accept(&mut self, wait: Duration) -> io::Result<Option<usize>> {
        let (stream, peer) = match timeout(wait, self.listener.accept()).await {
            Err(_) => return Ok(None),
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => return Err(err),
        };
        apply_socket_options(&stream)?;

        match self.slots.iter().position(|slot| slot.stream.is_none()) {
            Some(idx) => {
                self.slots[idx] = ClientSlot {
                    stream: Some(stream),
                    ..ClientSlot::vacant()
                };
                debug!("accepted {peer} into slot {idx}");
                Ok(Some(idx))
            }
            None => {
                warn!("rejecting {peer}: all {MAX_CLIENTS} connection slots in use");
                Ok(None)
            }
        }
    }

    pub fn close(&mut self, idx: usize) {
        if let Some(slot) = self.slots.get_mut(idx) {
            if slot.stream.take().is_some() {
                info!("closed slot {idx} ({})", slot.name);
            }
            *slot = ClientSlot::vacant();
        }
    }

    pub fn is_connected(&self, idx: usize) -> bool {
        self.slots.get(idx).is_some_and(|slot| slot.stream.is_some())
    }

    pub fn connected_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.stream.is_some()).count()
    }

    pub fn mark_player(&mut self, idx: usize, name: &str, player_id: u8) {
        if let Some(slot) = self.slots.get_mut(idx) {
            slot.role = Role::Player;
            slot.player_id = player_id;
            slot.name = name.to_string();
        }
    }

    pub fn mark_spectator(&mut self, idx: usize, name: &str) {
        if let Some(slot) = self.slots.get_mut(idx) {
            slot.role = Role::Spectator;
            slot.player_id = 0;
            slot.name = name.to_string();
        }
    }

    pub async fn send(&self, idx: usize, bytes: &[u8], wait: Duration) -> Result<(), NetError> {
        match self.slots.get(idx).and_then(|slot| slot.stream.as_ref()) {
            Some(stream) => send_frame(stream, bytes, wait).await,
            None => Err(NetError::Broken),
        }
    }

    /// Receives one decoded message from a slot. Undecodable frames are
    /// dropped and read as "no data".
    pub async fn recv(&self, idx: usize, wait: Duration) -> Result<Option<Message>, NetError> {
        let Some(stream) = self.slots.get(idx).and_then(|slot| slot.stream.as_ref()) else {
            return Err(NetError::Broken);
        };
        match recv_frame(stream, wait).await? {
            Some((header, payload)) => Ok(decode_frame(header, &payload)),
            None => Ok(None),
        }
    }

    /// Delivers to every connected slot, closing the ones whose send fails,
    /// and reports how many deliveries succeeded. Partial failure is not
    /// fatal to the broadcast as a whole.
    pub async fn send_to_all(&mut self, bytes: &[u8]) -> usize {
        self.broadcast(bytes, |_| true).await
    }

    pub async fn send_to_spectators(&mut self, bytes: &[u8]) -> usize {
        self.broadcast(bytes, |slot| slot.role == Role::Spectator).await
    }

    async fn broadcast(&mut self, bytes: &[u8], include: impl Fn(&ClientSlot) -> bool) -> usize {
        let mut delivered = 0;
        for idx in 0..self.slots.len() {
            if self.slots[idx].stream.is_none() || !include(&self.slots[idx]) {
                continue;
            }
            match self.send(idx, bytes, DEFAULT_SEND_WAIT).await {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!("dropping slot {idx} after failed send");
                    self.close(idx);
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn transport() -> ServerTransport {
        ServerTransport::bind(0).await.expect("bind on port 0")
    }

    #[tokio::test]
    async fn bind_fails_when_port_taken() {
        let first = transport().await;
        let port = first.local_port().unwrap();
        assert!(ServerTransport::bind(port).await.is_err());
    }

    #[tokio::test]
    async fn accept_times_out_without_a_connection() {
        let mut transport = transport().await;
        let accepted = transport.accept(Duration::from_millis(20)).await.unwrap();
        assert!(accepted.is_none());
        assert_eq!(transport.connected_count(), 0);
    }

    #[tokio::test]
    async fn framed_message_roundtrip_over_loopback() {
        let mut transport = transport().await;
        let port = transport.local_port().unwrap();

        let mut peer = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let idx = transport
            .accept(Duration::from_millis(500))
            .await
            .unwrap()
            .expect("pending connection");

        // Nothing sent yet: idle, not broken.
        let got = transport.recv(idx, Duration::from_millis(20)).await.unwrap();
        assert!(got.is_none());

        let hello = Message::Hello {
            name: "Alice".into(),
            role: Role::Player,
        };
        peer.write_all(&hello.encode().unwrap()).await.unwrap();

        let got = transport
            .recv(idx, Duration::from_millis(500))
            .await
            .unwrap()
            .expect("a full frame");
        assert_eq!(got, hello);
    }

    #[tokio::test]
    async fn split_frame_is_reassembled() {
        let mut transport = transport().await;
        let port = transport.local_port().unwrap();

        let mut peer = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let idx = transport
            .accept(Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();

        let frame = Message::Input { key: 42 }.encode().unwrap();
        let (head, tail) = frame.split_at(2);
        peer.write_all(head).await.unwrap();
        peer.flush().await.unwrap();

        let reader = async {
            transport.recv(idx, Duration::from_millis(500)).await
        };
        let writer = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            peer.write_all(tail).await.unwrap();
        };
        let (got, ()) = tokio::join!(reader, writer);
        assert_eq!(got.unwrap(), Some(Message::Input { key: 42 }));
    }

    #[tokio::test]
    async fn closed_peer_reads_as_broken() {
        let mut transport = transport().await;
        let port = transport.local_port().unwrap();

        let peer = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let idx = transport
            .accept(Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();
        drop(peer);

        let got = transport.recv(idx, Duration::from_millis(500)).await;
        assert_eq!(got, Err(NetError::Broken));
    }

    #[tokio::test]
    async fn slots_fill_up_and_reject_the_eleventh() {
        let mut transport = transport().await;
        let port = transport.local_port().unwrap();

        let mut peers = Vec::new();
        for i in 0..MAX_CLIENTS {
            peers.push(TcpStream::connect(("127.0.0.1", port)).await.unwrap());
            let idx = transport
                .accept(Duration::from_millis(500))
                .await
                .unwrap()
                .expect("free slot");
            assert_eq!(idx, i);
        }
        assert_eq!(transport.connected_count(), MAX_CLIENTS);

        let _extra = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let rejected = transport.accept(Duration::from_millis(500)).await.unwrap();
        assert!(rejected.is_none());
        assert_eq!(transport.connected_count(), MAX_CLIENTS);

        // Closing a slot frees that index for reuse.
        transport.close(3);
        let _late = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let idx = transport
            .accept(Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(idx, 3);
    }

    #[tokio::test]
    async fn undecodable_frame_is_dropped_not_fatal() {
        let mut transport = transport().await;
        let port = transport.local_port().unwrap();

        let mut peer = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let idx = transport
            .accept(Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();

        // Unknown type 200 with a 1-byte payload, then a valid frame.
        peer.write_all(&[200, 1, 0, 7]).await.unwrap();
        peer.write_all(&Message::Resume.encode().unwrap())
            .await
            .unwrap();

        let first = transport.recv(idx, Duration::from_millis(500)).await.unwrap();
        assert!(first.is_none());
        let second = transport.recv(idx, Duration::from_millis(500)).await.unwrap();
        assert_eq!(second, Some(Message::Resume));
        assert!(transport.is_connected(idx));
    }
}
