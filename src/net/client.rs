//! Participant side of the link
//!
//! Network I/O runs on background tasks. The listener writes into a
//! mutex-guarded inbox that the frame driver drains once per frame; sends go
//! through an unbounded channel to a writer task, so neither side of the
//! simulation ever waits on the socket.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::NetError;
use super::protocol::{
    ClientMessage, EventEnvelope, NetEvent, PeerId, PeerState, ServerMessage, WELCOME,
    decode_line, encode_line,
};

/// Inbound state accumulated between frames
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Inbox {
    /// Latest snapshot of the other peers (self removed)
    pub snapshot: Option<BTreeMap<PeerId, PeerState>>,
    /// Events from other peers in arrival order
    pub events: Vec<EventEnvelope>,
}

/// Flags shared between the link and its tasks
#[derive(Debug)]
struct LinkState {
    id: PeerId,
    connected: AtomicBool,
    is_host: AtomicBool,
    inbox: Mutex<Inbox>,
}

impl LinkState {
    fn inbox(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn disconnect(&self, reason: &str) {
        if self.connected.swap(false, Ordering::SeqCst) {
            log::warn!("Disconnected from coordinator: {}", reason);
        }
    }
}

pub struct NetClient {
    link: Arc<LinkState>,
    outbound: mpsc::UnboundedSender<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl NetClient {
    /// Connect and complete the Welcome handshake
    pub async fn connect(addr: &str) -> Result<Self, NetError> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(NetError::Handshake("connection closed before welcome".to_string()));
        }
        let welcome = match decode_line::<ServerMessage>(&line)? {
            ServerMessage::Welcome(w) if w.message == WELCOME => w,
            other => {
                return Err(NetError::Handshake(format!("unexpected first message: {:?}", other)));
            }
        };
        log::info!(
            "Connected to {} as peer {} (host: {})",
            addr,
            welcome.id,
            welcome.is_host
        );

        let link = Arc::new(LinkState {
            id: welcome.id,
            connected: AtomicBool::new(true),
            is_host: AtomicBool::new(welcome.is_host),
            inbox: Mutex::new(Inbox::default()),
        });
        let (outbound, rx) = mpsc::unbounded_channel();
        let tasks = vec![
            tokio::spawn(listen(reader, link.clone())),
            tokio::spawn(write_lines(writer, rx, link.clone())),
        ];

        Ok(Self {
            link,
            outbound,
            tasks,
        })
    }

    pub fn id(&self) -> &str {
        &self.link.id
    }

    pub fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }

    pub fn is_host(&self) -> bool {
        self.link.is_host.load(Ordering::SeqCst)
    }

    /// Take everything received since the last drain
    pub fn drain(&self) -> Inbox {
        std::mem::take(&mut *self.link.inbox())
    }

    pub fn send_state(&self, state: PeerState) {
        self.send(&ClientMessage::State(state));
    }

    pub fn send_event(&self, event: NetEvent) {
        let env = EventEnvelope::from_peer(self.link.id.clone(), event);
        self.send(&ClientMessage::Event(env));
    }

    /// Best effort; dropped while disconnected
    fn send(&self, message: &ClientMessage) {
        if !self.is_connected() {
            return;
        }
        match encode_line(message) {
            Ok(line) => {
                if self.outbound.send(line).is_err() {
                    self.link.disconnect("writer stopped");
                }
            }
            Err(e) => log::warn!("Failed to encode outbound message: {}", e),
        }
    }
}

impl Drop for NetClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn listen(reader: BufReader<OwnedReadHalf>, link: Arc<LinkState>) {
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => receive(&line, &link),
            Ok(None) => {
                link.disconnect("connection closed");
                return;
            }
            Err(e) => {
                link.disconnect(&e.to_string());
                return;
            }
        }
    }
}

fn receive(line: &str, link: &LinkState) {
    let message = match decode_line::<ServerMessage>(line) {
        Ok(m) => m,
        Err(e) => {
            log::debug!("Ignoring malformed line: {}", e);
            return;
        }
    };
    match message {
        ServerMessage::Snapshot(mut snapshot) => {
            snapshot.players.remove(&link.id);
            link.inbox().snapshot = Some(snapshot.players);
        }
        ServerMessage::Event(env) => {
            if env.sender.as_deref() == Some(link.id.as_str()) {
                return;
            }
            if let NetEvent::HostMigration { new_host } = &env.event {
                let me = *new_host == link.id;
                link.is_host.store(me, Ordering::SeqCst);
                log::info!(
                    "Host migrated to {}{}",
                    new_host,
                    if me { " (this peer)" } else { "" }
                );
                return;
            }
            link.inbox().events.push(env);
        }
        ServerMessage::Welcome(_) => log::debug!("Ignoring repeated welcome"),
    }
}

async fn write_lines(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<String>,
    link: Arc<LinkState>,
) {
    while let Some(line) = rx.recv().await {
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            link.disconnect(&e.to_string());
            return;
        }
    }
}
