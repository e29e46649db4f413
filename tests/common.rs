// tests/common.rs
#![allow(dead_code)]

use rzmq_xsub::runtime::{mailbox, pipe, MailboxReceiver, MailboxSender, PipeReader, PipeWriter};
use rzmq_xsub::{Blob, IEngine, Msg, SessionRegistry, XSubSocket, ZmqError};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use tokio::time::timeout;

static PIPE_ID_COUNTER: AtomicUsize = AtomicUsize::new(1);

// Use std::sync::Once for one-time initialization
static TRACING_INIT: Once = Once::new();

/// Initializes tracing for tests. Overridable with RUST_LOG.
pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    let default_filter = "rzmq_xsub=trace,info";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

pub fn next_pipe_id() -> usize {
  PIPE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Publisher side of one connection to an XSUB socket.
pub struct Peer {
  pub read_id: usize,
  /// Publishes messages towards the socket.
  pub tx: PipeWriter,
  /// Receives subscription traffic from the socket.
  pub rx: PipeReader,
}

impl Peer {
  pub fn publish(&mut self, frames: &[&[u8]]) {
    for (i, data) in frames.iter().enumerate() {
      let msg = Msg::from_vec(data.to_vec()).with_more(i + 1 < frames.len());
      self.tx.write(msg).expect("publish write");
    }
    self.tx.flush();
  }

  /// Every control frame the socket has published so far.
  pub fn control_frames(&mut self) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    while let Ok(Some(msg)) = self.rx.read() {
      frames.push(msg.data().to_vec());
    }
    frames
  }
}

/// Connects a fresh peer to `socket`, optionally bounding the subscription pipe.
pub fn connect_peer_with_hwm(socket: &mut XSubSocket, sub_hwm: Option<usize>) -> Peer {
  let read_id = next_pipe_id();
  let write_id = next_pipe_id();
  let (pub_tx, sub_rx) = pipe(read_id, None);
  let (sub_tx, pub_rx) = pipe(write_id, sub_hwm);
  socket.attach_pipe(sub_rx, sub_tx).expect("attach_pipe");
  Peer {
    read_id,
    tx: pub_tx,
    rx: pub_rx,
  }
}

pub fn connect_peer(socket: &mut XSubSocket) -> Peer {
  connect_peer_with_hwm(socket, None)
}

// Helper for recv with timeout
pub async fn recv_timeout(socket: &mut XSubSocket, duration: Duration) -> Result<Msg, ZmqError> {
  match timeout(duration, socket.recv()).await {
    Ok(result) => result,
    Err(_) => Err(ZmqError::Timeout),
  }
}

pub async fn recv_command_timeout(
  rx: &MailboxReceiver,
  duration: Duration,
) -> Option<rzmq_xsub::Command> {
  match timeout(duration, rx.recv()).await {
    Ok(Ok(cmd)) => Some(cmd),
    _ => None,
  }
}

// --- Engine double ---

#[derive(Debug, Default)]
pub struct EngineLog {
  pub written: Vec<Msg>,
  pub owner: Option<MailboxSender>,
  pub plugged: usize,
  pub unplugged: usize,
  pub terminated: bool,
}

#[derive(Debug)]
pub struct MockEngine {
  handle: usize,
  log: Arc<Mutex<EngineLog>>,
}

impl MockEngine {
  pub fn boxed(handle: usize) -> (Box<dyn IEngine>, Arc<Mutex<EngineLog>>) {
    let log = Arc::new(Mutex::new(EngineLog::default()));
    (
      Box::new(MockEngine {
        handle,
        log: log.clone(),
      }),
      log,
    )
  }
}

impl IEngine for MockEngine {
  fn handle(&self) -> usize {
    self.handle
  }

  fn plug(&mut self, owner: MailboxSender) {
    let mut log = self.log.lock();
    log.plugged += 1;
    log.owner = Some(owner);
  }

  fn unplug(&mut self) {
    let mut log = self.log.lock();
    log.unplugged += 1;
    log.owner = None;
  }

  fn write(&mut self, msg: Msg) -> bool {
    self.log.lock().written.push(msg);
    true
  }

  fn flush(&mut self) {}

  fn terminate(self: Box<Self>) {
    self.log.lock().terminated = true;
  }
}

/// Session registry whose sessions are plain mailboxes kept by the test.
pub fn test_registry(
  first_handle: usize,
) -> (Arc<SessionRegistry>, Arc<Mutex<Vec<(usize, MailboxReceiver)>>>) {
  let sessions = Arc::new(Mutex::new(Vec::new()));
  let keep = sessions.clone();
  let registry = SessionRegistry::new(first_handle, move |handle, _identity: &Blob| {
    let (tx, rx) = mailbox();
    keep.lock().push((handle, rx));
    Ok(tx)
  });
  (Arc::new(registry), sessions)
}
