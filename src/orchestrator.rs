//! Ingestion orchestrator: binds the two listening endpoints, attaches
//! producers to the serializer, signals readiness, and drives shutdown.

use std::fs::File;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::UnixListener;
use tracing::info;

use crate::nbd::{ExportHandler, Server};
use crate::serializer::{ProducerHandle, Serializer};
use crate::vma::Encoder;

/// One declared drive to back up.
#[derive(Debug, Clone)]
pub struct DriveSpec {
    pub name: String,
    pub size: u64,
}

/// Everything the orchestrator needs to start a backup run.
pub struct Config {
    pub output_path: std::path::PathBuf,
    pub vmstate_endpoint: std::path::PathBuf,
    pub block_endpoint: std::path::PathBuf,
    pub drives: Vec<DriveSpec>,
}

/// Chunk size for draining the vmstate migration socket.
const VMSTATE_CHUNK: usize = 256 * 1024;

struct DriveHandler {
    stream_id: u8,
    size: u64,
    producer: ProducerHandle,
}

impl ExportHandler for DriveHandler {
    fn write(&self, offset: u64, data: Bytes) {
        self.producer.submit_write(self.stream_id, offset, data);
    }

    fn size(&self) -> u64 {
        self.size
    }
}

fn bind_unix(path: &Path) -> Result<UnixListener> {
    // The listener's endpoint path must be unlinked before bind to reclaim
    // stale files from a prior run.
    let _ = std::fs::remove_file(path);
    UnixListener::bind(path)
        .with_context(|| format!("binding unix socket at {}", path.display()))
}

/// Runs one full backup: binds both endpoints, signals readiness on
/// `ready_out`, drains the vmstate phase to completion, then serves the NBD
/// block phase until every drive connection terminates, then closes the
/// archive.
pub async fn run(config: Config, mut ready_out: impl std::io::Write) -> Result<()> {
    let file = File::create(&config.output_path)
        .with_context(|| format!("creating archive file at {}", config.output_path.display()))?;

    let mut encoder = Encoder::new(file);
    let vmstate_id = encoder
        .declare_stream(b"vmstate", 0)
        .context("declaring vmstate stream")?;

    let mut drive_ids = Vec::with_capacity(config.drives.len());
    for drive in &config.drives {
        let id = encoder
            .declare_stream(drive.name.as_bytes(), drive.size)
            .with_context(|| format!("declaring stream for drive {:?}", drive.name))?;
        drive_ids.push(id);
    }

    let vmstate_listener = bind_unix(&config.vmstate_endpoint)?;
    let block_listener = bind_unix(&config.block_endpoint)?;

    let (serializer, closed) = Serializer::spawn(encoder);

    ready_out.write_all(b"Ready\n")?;
    ready_out.flush()?;
    info!("vma-writer ready, listening on both endpoints");

    run_vmstate_phase(vmstate_listener, serializer.producer(), vmstate_id).await?;
    info!("vmstate migration complete, starting block-backup phase");

    run_block_phase(block_listener, &serializer, &config.drives, &drive_ids).await?;
    info!("all drive connections terminated");

    serializer.producer().submit_stop();
    closed
        .await
        .context("serializer consumer task panicked")?
        .context("encoder failed to close archive")?;

    Ok(())
}

async fn run_vmstate_phase(
    listener: UnixListener,
    producer: ProducerHandle,
    vmstate_id: u8,
) -> Result<()> {
    let (mut conn, _) = listener
        .accept()
        .await
        .context("accepting vmstate migration connection")?;

    let mut offset = 0u64;
    let mut buf = vec![0u8; VMSTATE_CHUNK];
    loop {
        let n = conn
            .read(&mut buf)
            .await
            .context("reading vmstate migration stream")?;
        if n == 0 {
            break;
        }
        producer.submit_write(vmstate_id, offset, Bytes::copy_from_slice(&buf[..n]));
        offset += n as u64;
    }
    Ok(())
}

async fn run_block_phase(
    listener: UnixListener,
    serializer: &Serializer,
    drives: &[DriveSpec],
    drive_ids: &[u8],
) -> Result<()> {
    let mut server = Server::new(listener);
    for (drive, &stream_id) in drives.iter().zip(drive_ids) {
        let handler = Arc::new(DriveHandler {
            stream_id,
            size: drive.size,
            producer: serializer.producer(),
        });
        server.add_export(drive.name.clone(), handler);
    }

    server.run().await.context("running nbd block-backup server")
}

impl From<crate::cli::DriveSpec> for DriveSpec {
    fn from(spec: crate::cli::DriveSpec) -> Self {
        DriveSpec {
            name: spec.name,
            size: spec.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn vmstate_only_run_produces_valid_archive() {
        let dir = tempfile::tempdir().unwrap();
        let output_path = dir.path().join("archive.vma");
        let vmstate_endpoint = dir.path().join("migrate.sock");
        let block_endpoint = dir.path().join("nbd.sock");

        let config = Config {
            output_path: output_path.clone(),
            vmstate_endpoint: vmstate_endpoint.clone(),
            block_endpoint: block_endpoint.clone(),
            drives: Vec::new(),
        };

        let mut ready_out = Vec::new();
        let run_task = tokio::spawn(async move { run(config, &mut ready_out).await.map(|_| ready_out) });

        // Give the orchestrator a moment to bind both listening sockets.
        for _ in 0..100 {
            if vmstate_endpoint.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let mut client = UnixStream::connect(&vmstate_endpoint).await.unwrap();
        client.write_all(&[0xAB; 10_000]).await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        let ready_out = run_task.await.unwrap().unwrap();
        assert_eq!(ready_out, b"Ready\n");

        let archive = std::fs::read(&output_path).unwrap();
        let header_size = u32::from_be_bytes(archive[56..60].try_into().unwrap()) as usize;
        assert!(archive.len() > header_size, "expected at least one extent for vmstate residue");
    }
}
