//! Background writer for derived triples.
//!
//! Rule execution stages triples into a bounded queue; a dedicated thread
//! collects them and hands them to the [`TripleSink`] in fixed-size batches.
//! Staging blocks when the queue is full. A batch is also written when the queue
//! has been idle for the flush interval, on [`BatchWriter::flush`] and on
//! shutdown. A failed background write is reported by the next flush.
//!
//! Visibility: a full or idle batch reaches the sink as soon as the thread
//! writes it, which may be before the producer calls `flush`. Readers never see
//! part of a triple, but they can see a batch that no flush has acknowledged
//! yet. A returned `flush` guarantees everything staged before it is visible.
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::access::TripleSink;
use crate::config::WriterConfig;
use crate::construct::Triple;
use crate::error::{ChainError, Result};

enum Command {
    Stage(Triple),
    /// Write everything buffered and reply with the number of new triples
    /// written since the last flush.
    Flush(SyncSender<Result<usize>>),
    Shutdown(SyncSender<Result<usize>>),
}

pub struct BatchWriter {
    sender: Option<SyncSender<Command>>,
    worker: Option<JoinHandle<()>>,
    staged: u64,
}

impl BatchWriter {
    /// Starts the writer thread.
    pub fn start(sink: Arc<dyn TripleSink>, config: &WriterConfig) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel(config.queue_capacity.max(1));
        let batch_size = config.batch_size.max(1);
        let interval = Duration::from_millis(config.flush_interval_ms.max(1));
        let worker = std::thread::Builder::new()
            .name("chainstore-writer".to_owned())
            .spawn(move || Worker::new(sink, batch_size).run(receiver, interval))
            .map_err(|e| ChainError::Write(format!("cannot start writer thread: {}", e)))?;
        Ok(Self { sender: Some(sender), worker: Some(worker), staged: 0 })
    }

    /// Queues a triple, blocking while the queue is full.
    pub fn stage(&mut self, triple: Triple) -> Result<()> {
        let sender = self.sender.as_ref().ok_or_else(|| ChainError::Write("writer is shut down".to_owned()))?;
        sender
            .send(Command::Stage(triple))
            .map_err(|_| ChainError::Write("writer thread has stopped".to_owned()))?;
        self.staged += 1;
        Ok(())
    }

    /// Blocks until everything staged so far is written.
    pub fn flush(&mut self) -> Result<usize> {
        let sender = self.sender.as_ref().ok_or_else(|| ChainError::Write("writer is shut down".to_owned()))?;
        let (ack, done) = mpsc::sync_channel(1);
        sender
            .send(Command::Flush(ack))
            .map_err(|_| ChainError::Write("writer thread has stopped".to_owned()))?;
        done.recv().map_err(|_| ChainError::Write("writer thread has stopped".to_owned()))?
    }

    /// Writes what is left and stops the thread. Calling it again does nothing.
    pub fn shutdown(&mut self) -> Result<usize> {
        let Some(sender) = self.sender.take() else {
            return Ok(0);
        };
        let (ack, done) = mpsc::sync_channel(1);
        let outcome = match sender.send(Command::Shutdown(ack)) {
            Ok(()) => done.recv().unwrap_or_else(|_| Err(ChainError::Write("writer thread has stopped".to_owned()))),
            Err(_) => Err(ChainError::Write("writer thread has stopped".to_owned())),
        };
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| ChainError::Write("writer thread panicked".to_owned()))?;
        }
        debug!(staged = self.staged, "batch writer shut down");
        outcome
    }

    /// Triples staged over the writer's lifetime.
    pub fn staged(&self) -> u64 {
        self.staged
    }

    pub fn is_running(&self) -> bool {
        self.sender.is_some()
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "batch writer dropped with a failed write");
        }
    }
}

struct Worker {
    sink: Arc<dyn TripleSink>,
    batch_size: usize,
    buffer: Vec<Triple>,
    written: usize,
    failure: Option<ChainError>,
}

impl Worker {
    fn new(sink: Arc<dyn TripleSink>, batch_size: usize) -> Self {
        Self { sink, batch_size, buffer: Vec::with_capacity(batch_size), written: 0, failure: None }
    }

    fn run(mut self, receiver: Receiver<Command>, interval: Duration) {
        loop {
            match receiver.recv_timeout(interval) {
                Ok(Command::Stage(triple)) => {
                    self.buffer.push(triple);
                    if self.buffer.len() >= self.batch_size {
                        self.write();
                    }
                }
                Ok(Command::Flush(ack)) => {
                    let _ = ack.send(self.settle());
                }
                Ok(Command::Shutdown(ack)) => {
                    let _ = ack.send(self.settle());
                    return;
                }
                Err(RecvTimeoutError::Timeout) => self.write(),
                Err(RecvTimeoutError::Disconnected) => {
                    if let Err(e) = self.settle() {
                        warn!(error = %e, "pending triples lost when the writer was abandoned");
                    }
                    return;
                }
            }
        }
    }

    fn write(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        match self.sink.insert_batch(&self.buffer) {
            Ok(inserted) => {
                debug!(batch = self.buffer.len(), inserted, "batch written");
                self.written += inserted;
            }
            Err(e) => {
                warn!(error = %e, batch = self.buffer.len(), "batch write failed");
                self.failure.get_or_insert(e);
            }
        }
        self.buffer.clear();
    }

    fn settle(&mut self) -> Result<usize> {
        self.write();
        let written = std::mem::take(&mut self.written);
        match self.failure.take() {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }
}
