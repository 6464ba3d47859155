//! Group-commit writer task for a journaled `MemoryStore`.
//!
//! The task owns the journal and the apply step. Commits queue on a channel;
//! the task drains whatever is waiting, writes it with one fsync, applies it
//! to the tables in journal order, then answers every sender. Compaction
//! snapshots the tables here, writes the staging file elsewhere, and comes
//! back to swap it in.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::model::Event;
use crate::wal::Journal;

use super::StoreError;
use super::memory::Tables;

const QUEUE_DEPTH: usize = 4096;

enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    /// Snapshot the tables and start collecting the tail.
    BeginCompaction {
        response: oneshot::Sender<(Vec<Event>, PathBuf)>,
    },
    /// Swap the staged file in (`swap`) or abandon it.
    EndCompaction {
        swap: bool,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = Vec<(Event, oneshot::Sender<io::Result<()>>)>;

struct WriterState {
    journal: Journal,
    tables: Arc<Tables>,
    /// Events committed since the running compaction took its snapshot.
    tail: Option<Vec<Event>>,
}

impl WriterState {
    fn commit(&mut self, batch: &mut Pending) {
        metrics::histogram!(crate::observability::JOURNAL_COMMIT_BATCH_SIZE)
            .record(batch.len() as f64);
        let started = Instant::now();
        let result = self.journal.append_batch(batch.iter().map(|(event, _)| event));
        metrics::histogram!(crate::observability::JOURNAL_COMMIT_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        for (event, response) in batch.drain(..) {
            let answer = match &result {
                Ok(()) => {
                    if let Some(tail) = &mut self.tail {
                        tail.push(event.clone());
                    }
                    self.tables.apply(event);
                    Ok(())
                }
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = response.send(answer);
        }
    }

    fn handle(&mut self, command: JournalCommand) {
        match command {
            JournalCommand::Append { event, response } => {
                self.commit(&mut vec![(event, response)]);
            }
            JournalCommand::BeginCompaction { response } => {
                self.tail = Some(Vec::new());
                let _ = response.send((self.tables.snapshot(), self.journal.path().to_path_buf()));
            }
            JournalCommand::EndCompaction { swap, response } => {
                let tail = self.tail.take().unwrap_or_default();
                let result = if swap {
                    self.journal.swap_compact_file(&tail)
                } else {
                    Ok(())
                };
                let _ = response.send(result);
            }
            JournalCommand::AppendsSinceCompact { response } => {
                let _ = response.send(self.journal.appends_since_compact());
            }
        }
    }
}

async fn writer_loop(mut state: WriterState, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(command) = rx.recv().await {
        let mut batch = match command {
            JournalCommand::Append { event, response } => vec![(event, response)],
            other => {
                state.handle(other);
                continue;
            }
        };
        let mut next = None;
        while let Ok(command) = rx.try_recv() {
            match command {
                JournalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    next = Some(other);
                    break;
                }
            }
        }
        state.commit(&mut batch);
        if let Some(command) = next {
            state.handle(command);
        }
    }
}

/// Handle to the writer task. Dropping it stops the task once the queue drains.
pub(super) struct JournalWriter {
    tx: mpsc::Sender<JournalCommand>,
}

impl JournalWriter {
    /// Must be called within a Tokio runtime.
    pub(super) fn spawn(journal: Journal, tables: Arc<Tables>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let state = WriterState {
            journal,
            tables,
            tail: None,
        };
        tokio::spawn(writer_loop(state, rx));
        Self { tx }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> JournalCommand,
    ) -> Result<T, StoreError> {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(command(response))
            .await
            .map_err(|_| StoreError::Unavailable("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("journal writer dropped response".into()))
    }

    /// Durable and applied once this returns `Ok`.
    pub(super) async fn commit(&self, event: Event) -> Result<(), StoreError> {
        self.request(|response| JournalCommand::Append { event, response })
            .await?
            .map_err(StoreError::from)
    }

    pub(super) async fn appends_since_compact(&self) -> u64 {
        self.request(|response| JournalCommand::AppendsSinceCompact { response })
            .await
            .unwrap_or(0)
    }

    /// Snapshot the tables, stage it outside the writer task, then swap it in
    /// together with whatever was committed meanwhile. Callers serialize
    /// compactions. Returns the number of snapshot events.
    pub(super) async fn compact(&self) -> Result<usize, StoreError> {
        let (events, path) = self
            .request(|response| JournalCommand::BeginCompaction { response })
            .await?;
        let count = events.len();
        let staged = tokio::task::spawn_blocking(move || Journal::write_compact_file(&path, &events))
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e)));
        if let Err(e) = staged {
            warn!(error = %e, "journal compaction staging failed");
            self.request(|response| JournalCommand::EndCompaction { swap: false, response })
                .await??;
            return Err(e.into());
        }
        self.request(|response| JournalCommand::EndCompaction { swap: true, response })
            .await??;
        Ok(count)
    }
}
