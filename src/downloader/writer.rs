//! Checkpoint writer task
//!
//! The progress store is owned by one blocking task. Detail units and the
//! page loop submit mutations over a channel and wait for the store's
//! acknowledgement, so every write is serialized and durable before the
//! caller moves on.

use crate::resume::{ProgressStore, ResumeError};
use crate::Cursor;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

const COMMAND_BUFFER: usize = 64;

type Ack = oneshot::Sender<Result<(), ResumeError>>;

enum Command {
    RecordCompleted { id: String, ack: Ack },
    RecordFailed { id: String, ack: Ack },
    AdvanceCursor { cursor: Cursor, ack: Ack },
}

/// Sending side of the writer; cheap to clone
#[derive(Clone)]
pub struct CheckpointHandle {
    tx: mpsc::Sender<Command>,
}

impl CheckpointHandle {
    /// Record `id` as completed and wait until it is durable
    pub async fn record_completed(&self, id: &str) -> Result<(), ResumeError> {
        self.submit(|ack| Command::RecordCompleted {
            id: id.to_string(),
            ack,
        })
        .await
    }

    /// Record that `id` gave up and wait until it is durable
    pub async fn record_failed(&self, id: &str) -> Result<(), ResumeError> {
        self.submit(|ack| Command::RecordFailed {
            id: id.to_string(),
            ack,
        })
        .await
    }

    /// Persist the cursor of the next page and wait until it is durable
    pub async fn advance_cursor(&self, cursor: &Cursor) -> Result<(), ResumeError> {
        self.submit(|ack| Command::AdvanceCursor {
            cursor: cursor.clone(),
            ack,
        })
        .await
    }

    async fn submit(&self, command: impl FnOnce(Ack) -> Command) -> Result<(), ResumeError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(command(ack))
            .await
            .map_err(|_| writer_stopped())?;
        done.await.map_err(|_| writer_stopped())?
    }
}

fn writer_stopped() -> ResumeError {
    ResumeError::IoError("checkpoint writer stopped".to_string())
}

/// Owner of the progress store for the duration of a job
pub struct CheckpointWriter {
    handle: CheckpointHandle,
    task: JoinHandle<Box<dyn ProgressStore>>,
}

impl CheckpointWriter {
    /// Move `store` into a dedicated blocking task
    pub fn spawn(mut store: Box<dyn ProgressStore>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Command>(COMMAND_BUFFER);
        let task = tokio::task::spawn_blocking(move || {
            while let Some(command) = rx.blocking_recv() {
                let (result, ack) = match command {
                    Command::RecordCompleted { id, ack } => {
                        debug!(call_id = %id, "Recording completed call");
                        (store.record_completed(&id), ack)
                    }
                    Command::RecordFailed { id, ack } => {
                        debug!(call_id = %id, "Recording failed call");
                        (store.record_failed(&id), ack)
                    }
                    Command::AdvanceCursor { cursor, ack } => {
                        debug!(cursor = %cursor, "Advancing cursor");
                        (store.advance_cursor(&cursor), ack)
                    }
                };
                if let Err(e) = &result {
                    error!(error = %e, "Checkpoint write failed");
                }
                let _ = ack.send(result);
            }
            store
        });
        Self {
            handle: CheckpointHandle { tx },
            task,
        }
    }

    /// New sender for this writer
    pub fn handle(&self) -> CheckpointHandle {
        self.handle.clone()
    }

    /// Close the channel and wait for every queued write.
    ///
    /// Returns once all other handles are dropped too; the store comes back
    /// to the caller.
    pub async fn close(self) -> Result<Box<dyn ProgressStore>, tokio::task::JoinError> {
        drop(self.handle);
        self.task.await
    }
}
