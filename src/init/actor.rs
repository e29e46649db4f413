// src/init/actor.rs

use crate::engine::IEngine;
use crate::init::{HandshakeInitiator, InitiatorConfig};
use crate::runtime::{mailbox, Command, MailboxReceiver, MailboxSender};
use crate::session::{ISessionResolver, SessionHandle};

use std::sync::Arc;
use tokio::task::JoinHandle;

/// Spawns an initiator for a new connection on its own task.
///
/// Returns the initiator's mailbox, which accepts `Plug`, `Unplug` and
/// `Stop` from the owner and engine events from the engine once plugged.
/// The task ends after the initiator reports `InitFinished` to `owner`.
pub fn spawn_initiator(
  handle: usize,
  config: InitiatorConfig,
  owner: MailboxSender,
  engine: Box<dyn IEngine>,
  session: Option<SessionHandle>,
  resolver: Arc<dyn ISessionResolver>,
) -> (MailboxSender, JoinHandle<()>) {
  let (tx, rx) = mailbox();
  let initiator = HandshakeInitiator::new(handle, config, owner, tx.clone(), engine, session, resolver);
  let task_handle = tokio::spawn(run_loop(initiator, rx));
  (tx, task_handle)
}

async fn run_loop(mut initiator: HandshakeInitiator, mailbox: MailboxReceiver) {
  let handle = initiator.handle();
  tracing::debug!(handle, "Initiator actor started");

  while !initiator.is_done() {
    let command = match mailbox.recv().await {
      Ok(cmd) => cmd,
      Err(_) => {
        tracing::debug!(handle, "Initiator mailbox closed, aborting.");
        initiator.unplug().await;
        break;
      }
    };
    tracing::trace!(handle, command = command.variant_name(), "Initiator received command");

    match command {
      Command::Plug => initiator.plug(),
      Command::Unplug | Command::Stop => initiator.unplug().await,
      Command::EngineFrame { msg } => {
        if let Err(e) = initiator.read_property(msg) {
          initiator.fail(e).await;
        }
      }
      Command::EngineWritable => {}
      Command::EngineDetached => initiator.detach().await,
      other => {
        tracing::warn!(handle, command = other.variant_name(), "Initiator ignoring unexpected command");
      }
    }

    initiator.flush().await;
  }

  mailbox.close();
  tracing::debug!(handle, state = ?initiator.state(), "Initiator actor finished");
}
