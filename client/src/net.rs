//! Client-side TCP connection with the same framed, bounded-wait semantics
//! as the server transport: "no data yet" is an answer, not an error.

use log::warn;
use shared::protocol::{Header, Message};
use shared::{MAX_MSG_PAYLOAD, MSG_HEADER_SIZE};
use socket2::SockRef;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Readiness window granted to the rest of a partially-read frame.
const CHUNK_RETRY: Duration = Duration::from_millis(50);
const DEFAULT_SEND_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetError {
    /// The server reset, closed, or stalled past its timeout mid-frame.
    #[error("connection broken")]
    Broken,
}

pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    pub async fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;
        if let Err(err) = SockRef::from(&stream).set_keepalive(true) {
            warn!("could not enable keepalive: {err}");
        }
        Ok(Connection { stream })
    }

    pub async fn send(&self, msg: &Message, wait: Duration) -> Result<(), NetError> {
        let frame = match msg.encode() {
            Ok(frame) => frame,
            Err(err) => {
                warn!("could not encode {:?}: {err}", msg.msg_type());
                return Ok(());
            }
        };
        let wait = if wait.is_zero() { DEFAULT_SEND_WAIT } else { wait };

        let mut sent = 0;
        while sent < frame.len() {
            match self.stream.try_write(&frame[sent..]) {
                Ok(0) => return Err(NetError::Broken),
                Ok(n) => sent += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    match timeout(wait, self.stream.writable()).await {
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

    /// Receives one decoded message. `Ok(None)` means the wire was idle for
    /// the whole wait, or that a malformed frame was dropped; the connection
    /// survives both.
    pub async fn recv(&self, wait: Duration) -> Result<Option<Message>, NetError> {
        if !wait.is_zero() {
            match timeout(wait, self.stream.readable()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(NetError::Broken),
                Err(_) => return Ok(None),
            }
        }

        let mut header = [0u8; MSG_HEADER_SIZE];
        let mut have = 0usize;
        while have < MSG_HEADER_SIZE {
            match self.stream.try_read(&mut header[have..]) {
                Ok(0) => return Err(NetError::Broken),
                Ok(n) => have += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if have == 0 {
                        return Ok(None);
                    }
                    match timeout(CHUNK_RETRY, self.stream.readable()).await {
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
                "server announced a {} byte payload, over the {} byte limit",
                header.payload_len, MAX_MSG_PAYLOAD
            );
            return Err(NetError::Broken);
        }

        let mut payload = vec![0u8; header.payload_len as usize];
        let mut have = 0usize;
        while have < payload.len() {
            match self.stream.try_read(&mut payload[have..]) {
                Ok(0) => return Err(NetError::Broken),
                Ok(n) => have += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    match timeout(CHUNK_RETRY, self.stream.readable()).await {
                        Ok(Ok(())) => {}
                        _ => return Err(NetError::Broken),
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => return Err(NetError::Broken),
            }
        }

        match Message::decode(header.kind, &payload) {
            Ok(msg) => Ok(Some(msg)),
            Err(err) => {
                // One bad frame is dropped, not a reason to hang up.
                warn!("dropping undecodable frame: {err}");
                Ok(None)
            }
        }
    }
}
