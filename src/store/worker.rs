use tokio::sync::{mpsc, oneshot};

use crate::repository::{Document, RepositoryError, RepositoryHandle};

pub(crate) type Ack = oneshot::Sender<Result<(), RepositoryError>>;

#[derive(Debug)]
pub(crate) enum PersistCommand {
    /// Upsert a full index snapshot; `ack` receives the outcome when the caller waits.
    Save { document: Document, ack: Option<Ack> },
    /// Answers once every command queued before it has been handled.
    Flush(oneshot::Sender<()>),
}

/// Applies index snapshots to the repository, one at a time, in the order
/// they were queued.
pub(crate) struct PersistenceWorker {
    repository: RepositoryHandle,
    cmd_rx: mpsc::UnboundedReceiver<PersistCommand>,
}

impl PersistenceWorker {
    pub(crate) fn new(repository: RepositoryHandle, cmd_rx: mpsc::UnboundedReceiver<PersistCommand>) -> Self {
        Self { repository, cmd_rx }
    }

    /// Runs until every sender is dropped.
    pub(crate) async fn run(mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            self.handle_command(cmd).await;
        }
        log::debug!("persistence worker stopped");
    }

    async fn handle_command(&mut self, cmd: PersistCommand) {
        match cmd {
            PersistCommand::Save { document, ack } => {
                let id = document.id.clone();
                let bytes = document.payload.len();
                let result = self.repository.upsert(document).await;

                match &result {
                    Ok(()) => log::debug!("persisted cookie index {id} ({bytes} bytes)"),
                    Err(e) if ack.is_some() => log::warn!("persisting cookie index {id} failed: {e}"),
                    // Nobody is waiting for this one.
                    Err(e) => log::error!("persisting cookie index {id} failed, write is lost: {e}"),
                }

                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
            }
            PersistCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
