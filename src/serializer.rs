//! Single-consumer, many-producer write serializer.
//!
//! Any number of producers submit [`Command`]s; one dedicated consumer drains
//! them in arrival order and feeds the [`crate::vma::Encoder`], guaranteeing
//! the encoder only ever observes strictly serial calls even though
//! producers run concurrently.

use std::io::Write;
use std::sync::mpsc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::vma::{Encoder, EncoderError};

pub enum Command {
    Write { stream_id: u8, offset: u64, bytes: Bytes },
    Stop,
}

/// A cloneable producer-side submission handle. Each producer writes to its
/// own stream id, so interleaving across producers is immaterial to the
/// archive's correctness; only per-producer FIFO order matters.
#[derive(Clone)]
pub struct ProducerHandle {
    tx: mpsc::Sender<Command>,
}

impl ProducerHandle {
    /// Submits a write command. Never blocks: the queue is bounded only by
    /// memory. Returns `false` if the consumer has already shut down.
    pub fn submit_write(&self, stream_id: u8, offset: u64, bytes: Bytes) -> bool {
        self.tx
            .send(Command::Write {
                stream_id,
                offset,
                bytes,
            })
            .is_ok()
    }

    pub fn submit_stop(&self) -> bool {
        self.tx.send(Command::Stop).is_ok()
    }
}

/// Owns the consumer side: spawns a blocking task that drains commands and
/// drives the encoder until a [`Command::Stop`] closes it out.
pub struct Serializer {
    tx: mpsc::Sender<Command>,
}

impl Serializer {
    /// Spawns the consumer on the tokio blocking pool, taking ownership of
    /// `encoder`. Returns the serializer (for minting producer handles) and
    /// a join handle that resolves once the encoder has closed.
    pub fn spawn<W>(mut encoder: Encoder<W>) -> (Self, JoinHandle<Result<(), EncoderError>>)
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Command>();

        let handle = tokio::task::spawn_blocking(move || {
            while let Ok(cmd) = rx.recv() {
                match cmd {
                    Command::Write {
                        stream_id,
                        offset,
                        bytes,
                    } => {
                        encoder.write(stream_id, offset, bytes)?;
                    }
                    Command::Stop => {
                        debug!("serializer consumer received Stop");
                        break;
                    }
                }
            }
            encoder.close()
        });

        (Self { tx }, handle)
    }

    pub fn producer(&self) -> ProducerHandle {
        ProducerHandle {
            tx: self.tx.clone(),
        }
    }
}
