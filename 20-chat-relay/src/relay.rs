use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};

use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::{
    error::{RelayError, RelayResult},
    protocol::{self, read_line, write_line},
    registry::{ConnectionId, Peer, Registry},
};

pub const DEFAULT_PORT: u16 = 9001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address the listener binds to.
    pub listen: SocketAddr,
    /// Longest accepted line, in bytes, excluding the line ending.
    pub max_line_bytes: usize,
    /// Lines queued per connection before fan-out starts dropping them.
    pub outbox_capacity: usize,
    /// Rejected names tolerated before a session is closed. `None` retries forever.
    pub max_name_attempts: Option<NonZeroU32>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_line_bytes: 4096,
            outbox_capacity: 128,
            max_name_attempts: None,
        }
    }
}

/// Accepts chat connections and relays lines between them.
pub struct Relay {
    listener: TcpListener,
    shared: Arc<Shared>,
}

struct Shared {
    registry: Arc<Registry>,
    config: RelayConfig,
}

impl Relay {
    pub async fn bind(config: RelayConfig) -> RelayResult<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| RelayError::Bind {
                addr: config.listen,
                source,
            })?;
        Ok(Self::new(listener, config))
    }

    pub fn new(listener: TcpListener, config: RelayConfig) -> Self {
        Self {
            listener,
            shared: Arc::new(Shared {
                registry: Arc::new(Registry::new()),
                config,
            }),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.shared.registry)
    }

    /// Runs the accept loop. Only returns if the listener fails, since no
    /// further sessions can be created after that.
    pub async fn run(self) -> RelayResult<()> {
        let Relay { listener, shared } = self;

        loop {
            let (stream, peer) = listener.accept().await.map_err(RelayError::Accept)?;
            spawn_session(stream, peer, &shared);
        }
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, shared: &Arc<Shared>) {
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        info!(peer = %peer, "new client connected");
        if let Err(err) = handle_connection(stream, peer, shared).await {
            warn!(peer = %peer, error = %err, "client connection closed with error");
        }
    });
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared>,
) -> RelayResult<()> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let (outbox_tx, outbox_rx) = mpsc::channel(shared.config.outbox_capacity.max(1));
    let writer_task = tokio::spawn(drain_outbox(writer, outbox_rx));

    let result = {
        let mut session = Session::open(&shared, outbox_tx, peer);
        session.run(&mut reader).await
    };
    drop(reader);

    if let Err(err) = writer_task.await {
        warn!(peer = %peer, error = %err, "connection writer task failed");
    }

    result
}

/// Writes queued lines to the socket until every sender is gone or a write
/// fails, then shuts the write half down.
async fn drain_outbox<W>(mut writer: W, mut outbox: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbox.recv().await {
        if let Err(err) = write_line(&mut writer, &line).await {
            debug!(error = %err, "failed to deliver line to client");
            break;
        }
    }
    outbox.close();

    if let Err(err) = writer.shutdown().await {
        debug!(error = %err, "failed to shut down client writer");
    }
}

/// Sends `line` to every live connection except `from`.
///
/// A failed delivery to one peer does not affect the rest.
pub(crate) fn broadcast(registry: &Registry, from: ConnectionId, line: &str) -> usize {
    registry
        .snapshot_except(from)
        .iter()
        .filter(|peer| peer.deliver(line))
        .count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connecting,
    NegotiatingName,
    Active,
    Closed,
}

/// One accepted connection. Dropping it runs the close sequence.
struct Session<'a> {
    id: ConnectionId,
    peer: SocketAddr,
    shared: &'a Shared,
    outbox: Option<mpsc::Sender<String>>,
    name: Option<String>,
    state: SessionState,
}

impl<'a> Session<'a> {
    fn open(shared: &'a Shared, outbox: mpsc::Sender<String>, peer: SocketAddr) -> Self {
        let id = shared.registry.next_id();
        let mut session = Self {
            id,
            peer,
            shared,
            outbox: Some(outbox.clone()),
            name: None,
            state: SessionState::Connecting,
        };

        shared.registry.register(Peer::new(id, outbox));
        session.transition(SessionState::NegotiatingName);
        session
    }

    async fn run<R>(&mut self, reader: &mut R) -> RelayResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let Some(name) = self.negotiate_name(reader).await? else {
            debug!(peer = %self.peer, "client left before choosing a name");
            return Ok(());
        };

        self.transition(SessionState::Active);
        self.send(&protocol::welcome(&name)).await?;
        info!(peer = %self.peer, %name, "client joined");
        broadcast(&self.shared.registry, self.id, &protocol::joined(&name));

        self.relay_lines(reader, &name).await
    }

    async fn negotiate_name<R>(&mut self, reader: &mut R) -> RelayResult<Option<String>>
    where
        R: AsyncBufRead + Unpin,
    {
        let limit = self.shared.config.max_line_bytes;
        self.send(protocol::NAME_PROMPT).await?;

        let mut attempts = 0u32;
        loop {
            let Some(line) = read_line(reader, limit).await? else {
                return Ok(None);
            };
            attempts = attempts.saturating_add(1);

            let name = line.trim();
            if self.shared.registry.claim(name) {
                self.name = Some(name.to_string());
                return Ok(Some(name.to_string()));
            }
            debug!(peer = %self.peer, name, attempts, "name rejected");

            if let Some(max) = self.shared.config.max_name_attempts {
                if attempts >= max.get() {
                    return Err(RelayError::NameAttemptsExhausted { attempts });
                }
            }
            self.send(protocol::NAME_REJECTED).await?;
        }
    }

    async fn relay_lines<R>(&self, reader: &mut R, name: &str) -> RelayResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let limit = self.shared.config.max_line_bytes;
        while let Some(line) = read_line(reader, limit).await? {
            if protocol::is_exit(&line) {
                debug!(peer = %self.peer, %name, "client said bye");
                break;
            }
            broadcast(&self.shared.registry, self.id, &protocol::chat(name, &line));
        }
        Ok(())
    }

    async fn send(&self, line: &str) -> RelayResult<()> {
        let outbox = self.outbox.as_ref().ok_or_else(writer_closed)?;
        outbox
            .send(line.to_string())
            .await
            .map_err(|_| RelayError::Io(writer_closed()))
    }

    fn transition(&mut self, next: SessionState) {
        debug!(id = self.id, from = ?self.state, to = ?next, "session state change");
        self.state = next;
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.transition(SessionState::Closed);
        let shared = self.shared;
        let registry = &shared.registry;

        if let Some(name) = &self.name {
            registry.release(name);
        }
        registry.unregister(self.id);
        // The writer task finishes once the last sender is gone.
        self.outbox.take();

        if let Some(name) = self.name.take() {
            info!(peer = %self.peer, %name, "client left");
            broadcast(registry, self.id, &protocol::left(&name));
        }
    }
}

fn writer_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "connection writer closed")
}
