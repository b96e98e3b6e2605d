//! Coordinating process
//!
//! Assigns peer ids and the host flag, relays events to every peer as they
//! arrive, broadcasts a snapshot of all peer states at a fixed rate, and
//! announces host migration when the host disconnects.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, mpsc};
use tokio::time::{MissedTickBehavior, interval};

use super::NetError;
use super::peers::PeerTable;
use super::protocol::{
    ClientMessage, EventEnvelope, NetEvent, PeerId, ServerMessage, Snapshot, Welcome, decode_line,
    encode_line,
};

/// Longest line a peer may send; anything longer is discarded
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Peer table plus each connection's outbound queue
#[derive(Default)]
struct Hub {
    peers: PeerTable,
    outbound: BTreeMap<PeerId, mpsc::UnboundedSender<String>>,
}

impl Hub {
    /// Queue a line for every connected peer
    fn broadcast(&self, line: &str) {
        for (id, tx) in &self.outbound {
            if tx.send(line.to_string()).is_err() {
                log::debug!("Broadcast to {}: connection already closed", id);
            }
        }
    }
}

type SharedHub = Arc<RwLock<Hub>>;

pub struct Server {
    listener: TcpListener,
    hub: SharedHub,
    snapshot_hz: u32,
}

impl Server {
    pub async fn bind(addr: &str, snapshot_hz: u32) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("Coordinator listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            hub: Arc::new(RwLock::new(Hub::default())),
            snapshot_hz: snapshot_hz.max(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever
    pub async fn run(self) -> Result<(), NetError> {
        start_snapshot_loop(self.hub.clone(), self.snapshot_hz);
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let hub = self.hub.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, addr, hub).await;
                    });
                }
                Err(e) => log::warn!("Accept failed: {}", e),
            }
        }
    }
}

/// Broadcast `{"players": ...}` to every peer at `hz`
fn start_snapshot_loop(hub: SharedHub, hz: u32) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs_f64(1.0 / hz as f64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::info!("Snapshot broadcast at {} Hz", hz);

        loop {
            ticker.tick().await;
            let hub = hub.read().await;
            if hub.outbound.is_empty() {
                continue;
            }
            let message = ServerMessage::Snapshot(Snapshot {
                players: hub.peers.snapshot(),
            });
            match encode_line(&message) {
                Ok(line) => hub.broadcast(&line),
                Err(e) => log::warn!("Failed to encode snapshot: {}", e),
            }
        }
    });
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, hub: SharedHub) {
    let (reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Welcome is queued before the peer can receive any broadcast
    let (id, is_host) = {
        let mut hub = hub.write().await;
        let (id, is_host) = hub.peers.add();
        match encode_line(&ServerMessage::Welcome(Welcome::new(id.clone(), is_host))) {
            Ok(line) => {
                let _ = tx.send(line);
            }
            Err(e) => log::warn!("Failed to encode welcome for {}: {}", id, e),
        }
        hub.outbound.insert(id.clone(), tx);
        (id, is_host)
    };
    log::info!("Peer {} connected from {} (host: {})", id, addr, is_host);

    let writer_id = id.clone();
    let writer_task = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                log::warn!("Write to {} failed: {}", writer_id, e);
                break;
            }
        }
    });

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        match read_line_capped(&mut reader, &mut buf).await {
            Ok(LineRead::Line(line)) => handle_line(&id, &line, &hub).await,
            Ok(LineRead::Oversized) => {
                log::debug!("Dropped line over {} bytes from {}", MAX_LINE_BYTES, id);
            }
            Ok(LineRead::NotUtf8) => log::debug!("Malformed line from {}: not UTF-8", id),
            Ok(LineRead::Eof) => break,
            Err(e) => {
                log::warn!("Read from {} failed: {}", id, e);
                break;
            }
        }
    }

    let migrated = {
        let mut hub = hub.write().await;
        hub.outbound.remove(&id);
        let migrated = hub.peers.remove(&id);
        if let Some(new_host) = &migrated {
            let notice = ServerMessage::Event(EventEnvelope::from_server(NetEvent::HostMigration {
                new_host: new_host.clone(),
            }));
            match encode_line(&notice) {
                Ok(line) => hub.broadcast(&line),
                Err(e) => log::warn!("Failed to encode host migration: {}", e),
            }
        }
        migrated
    };
    writer_task.abort();
    log::info!(
        "Peer {} disconnected{}",
        id,
        migrated.map(|h| format!(", {} is now host", h)).unwrap_or_default()
    );
}

#[derive(Debug, PartialEq)]
enum LineRead {
    Line(String),
    Oversized,
    NotUtf8,
    Eof,
}

/// Read one newline-terminated line of at most `MAX_LINE_BYTES`
///
/// The rest of an oversized line is consumed and thrown away.
async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = MAX_LINE_BYTES as u64 + 1;
    if (&mut *reader).take(limit).read_until(b'\n', buf).await? == 0 {
        return Ok(LineRead::Eof);
    }

    if buf.last() != Some(&b'\n') && buf.len() > MAX_LINE_BYTES {
        loop {
            let chunk = reader.fill_buf().await?;
            if chunk.is_empty() {
                return Ok(LineRead::Eof);
            }
            match chunk.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    reader.consume(end + 1);
                    return Ok(LineRead::Oversized);
                }
                None => {
                    let len = chunk.len();
                    reader.consume(len);
                }
            }
        }
    }

    Ok(match String::from_utf8(std::mem::take(buf)) {
        Ok(line) => LineRead::Line(line),
        Err(_) => LineRead::NotUtf8,
    })
}

async fn handle_line(id: &str, line: &str, hub: &SharedHub) {
    match decode_line::<ClientMessage>(line) {
        Ok(ClientMessage::State(state)) => {
            hub.write().await.peers.update_state(id, state);
        }
        Ok(ClientMessage::Event(mut env)) => {
            if matches!(env.event, NetEvent::HostMigration { .. }) {
                log::debug!("Ignoring host_migration from peer {}", id);
                return;
            }
            env.sender = Some(id.to_string());
            match encode_line(&ServerMessage::Event(env)) {
                Ok(line) => hub.read().await.broadcast(&line),
                Err(e) => log::warn!("Failed to encode relay from {}: {}", id, e),
            }
        }
        Err(e) => log::debug!("Malformed line from {}: {}", id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::PeerState;
    use glam::Vec2;
    use tokio::io::Lines;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::time::timeout;

    struct RawPeer {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl RawPeer {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (r, w) = stream.into_split();
            Self {
                lines: BufReader::new(r).lines(),
                writer: w,
            }
        }

        async fn next(&mut self) -> ServerMessage {
            let line = timeout(Duration::from_secs(5), self.lines.next_line())
                .await
                .expect("timed out")
                .unwrap()
                .expect("connection closed");
            decode_line(&line).unwrap()
        }

        /// Skip snapshots until a non-snapshot arrives
        async fn next_non_snapshot(&mut self) -> ServerMessage {
            loop {
                match self.next().await {
                    ServerMessage::Snapshot(_) => continue,
                    other => return other,
                }
            }
        }

        async fn send(&mut self, message: &ClientMessage) {
            let line = encode_line(message).unwrap();
            self.writer.write_all(line.as_bytes()).await.unwrap();
        }
    }

    async fn start() -> SocketAddr {
        let server = Server::bind("127.0.0.1:0", 30).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    fn welcome(msg: ServerMessage) -> Welcome {
        match msg {
            ServerMessage::Welcome(w) => w,
            other => panic!("expected welcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_line_capped_skips_bad_lines() {
        let mut input = Vec::new();
        input.extend_from_slice(b"{\"a\":1}\n");
        input.extend(std::iter::repeat_n(b'x', MAX_LINE_BYTES * 2));
        input.push(b'\n');
        input.extend_from_slice(&[0xff, 0xfe, b'\n']);
        input.extend_from_slice(b"tail");
        let mut reader = BufReader::new(input.as_slice());
        let mut buf = Vec::new();

        let mut reads = Vec::new();
        loop {
            let read = read_line_capped(&mut reader, &mut buf).await.unwrap();
            let done = read == LineRead::Eof;
            reads.push(read);
            if done {
                break;
            }
        }
        assert_eq!(
            reads,
            vec![
                LineRead::Line("{\"a\":1}\n".to_string()),
                LineRead::Oversized,
                LineRead::NotUtf8,
                LineRead::Line("tail".to_string()),
                LineRead::Eof,
            ]
        );
    }

    #[tokio::test]
    async fn test_bad_lines_keep_peer_connected() {
        let addr = start().await;
        let mut a = RawPeer::connect(addr).await;
        welcome(a.next().await);

        a.writer.write_all(&[0xff, 0xfe, b'\n']).await.unwrap();
        let long = vec![b'x'; MAX_LINE_BYTES + 10];
        a.writer.write_all(&long).await.unwrap();
        a.writer.write_all(b"\n").await.unwrap();
        a.send(&ClientMessage::Event(EventEnvelope {
            sender: None,
            event: NetEvent::KillEnemy {
                uid: "001-7".to_string(),
            },
        }))
        .await;

        match a.next_non_snapshot().await {
            ServerMessage::Event(env) => assert_eq!(env.sender.as_deref(), Some("001")),
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handshake_assigns_ids_and_host() {
        let addr = start().await;
        let mut a = RawPeer::connect(addr).await;
        let wa = welcome(a.next().await);
        assert_eq!((wa.message.as_str(), wa.id.as_str(), wa.is_host), ("Welcome", "001", true));

        let mut b = RawPeer::connect(addr).await;
        let wb = welcome(b.next().await);
        assert_eq!((wb.id.as_str(), wb.is_host), ("002", false));
    }

    #[tokio::test]
    async fn test_events_relay_with_sender_and_snapshots_carry_state() {
        let addr = start().await;
        let mut a = RawPeer::connect(addr).await;
        welcome(a.next().await);
        let mut b = RawPeer::connect(addr).await;
        welcome(b.next_non_snapshot().await);

        a.send(&ClientMessage::State(PeerState {
            pos: Vec2::new(12.0, 34.0),
            status: "walk".to_string(),
            char_type: "female".to_string(),
        }))
        .await;
        a.send(&ClientMessage::Event(EventEnvelope {
            sender: None,
            event: NetEvent::KillEnemy {
                uid: "001-1".to_string(),
            },
        }))
        .await;

        match b.next_non_snapshot().await {
            ServerMessage::Event(env) => {
                assert_eq!(env.sender.as_deref(), Some("001"));
                assert_eq!(env.event.name(), "kill_enemy");
            }
            other => panic!("expected event, got {:?}", other),
        }

        loop {
            if let ServerMessage::Snapshot(s) = b.next().await {
                if let Some(st) = s.players.get("001") {
                    assert_eq!(st.pos, Vec2::new(12.0, 34.0));
                    assert_eq!(st.char_type, "female");
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_host_disconnect_migrates() {
        let addr = start().await;
        let mut a = RawPeer::connect(addr).await;
        welcome(a.next().await);
        let mut b = RawPeer::connect(addr).await;
        welcome(b.next_non_snapshot().await);
        let mut c = RawPeer::connect(addr).await;
        welcome(c.next_non_snapshot().await);

        drop(a);

        for peer in [&mut b, &mut c] {
            match peer.next_non_snapshot().await {
                ServerMessage::Event(env) => {
                    assert_eq!(env.sender, None);
                    assert_eq!(
                        env.event,
                        NetEvent::HostMigration {
                            new_host: "002".to_string()
                        }
                    );
                }
                other => panic!("expected migration, got {:?}", other),
            }
        }
    }
}
