use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, warn};

use super::error::ProtocolError;
use super::proto::{self, ExportNameOption, Request};

/// A capability interface for a single NBD export target.
///
/// `write` is fire-and-forget: it only ever enqueues work (see
/// [`crate::serializer::Serializer`]), so it cannot itself fail; any
/// downstream failure surfaces later, when the archive is closed.
pub trait ExportHandler: Send + Sync {
    fn write(&self, offset: u64, data: Bytes);
    fn size(&self) -> u64;
}

/// Server-side state machine for the framed block protocol.
///
/// Accepts exactly as many connections as it has registered exports, one per
/// export, each served on its own task.
pub struct Server {
    listener: UnixListener,
    exports: HashMap<String, Arc<dyn ExportHandler>>,
}

impl Server {
    pub fn new(listener: UnixListener) -> Self {
        Self {
            listener,
            exports: HashMap::new(),
        }
    }

    pub fn add_export(&mut self, name: String, handler: Arc<dyn ExportHandler>) {
        self.exports.insert(name, handler);
    }

    /// Accepts one connection per registered export and serves each on its
    /// own task. Returns only once every worker has finished.
    pub async fn run(self) -> std::io::Result<()> {
        let expected = self.exports.len();
        let mut workers = Vec::with_capacity(expected);

        for _ in 0..expected {
            let (socket, _) = self.listener.accept().await?;
            let exports = self.exports.clone();
            workers.push(tokio::spawn(async move {
                if let Err(e) = serve_connection(socket, &exports).await {
                    error!(error = %e, "nbd connection terminated");
                }
            }));
        }

        for worker in workers {
            let _ = worker.await;
        }
        Ok(())
    }
}

async fn negotiate<'a>(
    socket: &mut UnixStream,
    exports: &'a HashMap<String, Arc<dyn ExportHandler>>,
) -> Result<Option<&'a Arc<dyn ExportHandler>>, ProtocolError> {
    socket.write_all(&proto::negotiation_part1()).await?;

    let mut raw = [0u8; ExportNameOption::WIRE_SIZE];
    socket.read_exact(&mut raw).await?;
    let option = ExportNameOption::parse(&raw);

    if option.magic != proto::OPTS_MAGIC {
        return Err(ProtocolError::BadNegotiationMagic {
            magic: option.magic,
        });
    }
    if option.opt != proto::OPT_EXPORT_NAME {
        return Err(ProtocolError::UnsupportedOption { opt: option.opt });
    }

    let mut name_buf = vec![0u8; option.name_length as usize];
    socket.read_exact(&mut name_buf).await?;
    let name = String::from_utf8_lossy(&name_buf).into_owned();

    match exports.get(&name) {
        Some(handler) => {
            socket
                .write_all(&proto::negotiation_part2(handler.size()))
                .await?;
            Ok(Some(handler))
        }
        None => {
            warn!(export = %name, "nbd client requested unknown export");
            Ok(None)
        }
    }
}

async fn serve_connection(
    mut socket: UnixStream,
    exports: &HashMap<String, Arc<dyn ExportHandler>>,
) -> Result<(), ProtocolError> {
    let handler = match negotiate(&mut socket, exports).await? {
        Some(h) => h.clone(),
        None => return Ok(()),
    };

    loop {
        // A clean disconnect between requests (zero bytes read) is the only
        // graceful shutdown this loop recognizes; any other short read,
        // including one that reads part of a frame and then hits EOF, is a
        // fatal per-connection error per the spec's failure model.
        let mut first = [0u8; 1];
        let n = socket.read(&mut first).await?;
        if n == 0 {
            debug!("nbd client disconnected without sending DISCONNECT");
            return Ok(());
        }

        let mut raw = [0u8; Request::WIRE_SIZE];
        raw[0] = first[0];
        socket.read_exact(&mut raw[1..]).await?;
        let req = Request::parse(&raw);

        if req.magic != proto::REQUEST_MAGIC {
            return Err(ProtocolError::BadRequestMagic { magic: req.magic });
        }

        match req.kind {
            proto::CMD_WRITE => {
                // Reply before invoking the handler: internal handler errors
                // must never propagate to the client.
                socket.write_all(&proto::reply(0, req.handle)).await?;

                let mut payload = BytesMut::zeroed(req.length as usize);
                socket.read_exact(&mut payload).await?;
                handler.write(req.offset, payload.freeze());
            }
            proto::CMD_DISCONNECT => {
                return Ok(());
            }
            other => {
                warn!(kind = other, "unrecognized nbd command type, closing connection");
                return Err(ProtocolError::UnrecognizedCommand { kind: other });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;
    use tokio::net::UnixStream as ClientStream;

    struct RecordingHandler {
        size: u64,
        writes: Mutex<Vec<(u64, Vec<u8>)>>,
    }

    impl ExportHandler for RecordingHandler {
        fn write(&self, offset: u64, data: Bytes) {
            self.writes.lock().unwrap().push((offset, data.to_vec()));
        }

        fn size(&self) -> u64 {
            self.size
        }
    }

    #[tokio::test]
    async fn unknown_export_closes_without_reply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nbd.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let mut server = Server::new(listener);
        let handler = Arc::new(RecordingHandler {
            size: 0,
            writes: Mutex::new(Vec::new()),
        });
        server.add_export("A".to_string(), handler.clone());

        let server_task = tokio::spawn(server.run());

        let mut client = ClientStream::connect(&path).await.unwrap();
        let mut neg1 = [0u8; 18];
        client.read_exact(&mut neg1).await.unwrap();

        let name = b"B";
        let mut req = Vec::new();
        req.extend_from_slice(&[0u8; 4]);
        req.extend_from_slice(&proto::OPTS_MAGIC.to_be_bytes());
        req.extend_from_slice(&proto::OPT_EXPORT_NAME.to_be_bytes());
        req.extend_from_slice(&(name.len() as u32).to_be_bytes());
        req.extend_from_slice(name);
        client.write_all(&req).await.unwrap();

        // Server closes silently: no negotiation-part-2 bytes, and a read
        // returns EOF.
        let mut probe = [0u8; 1];
        let n = client.read(&mut probe).await.unwrap();
        assert_eq!(n, 0);

        assert!(handler.writes.lock().unwrap().is_empty());
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn write_then_disconnect_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nbd.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let mut server = Server::new(listener);
        let handler = Arc::new(RecordingHandler {
            size: 4096,
            writes: Mutex::new(Vec::new()),
        });
        server.add_export("drive0".to_string(), handler.clone());

        let server_task = tokio::spawn(server.run());

        let mut client = ClientStream::connect(&path).await.unwrap();
        let mut neg1 = [0u8; 18];
        client.read_exact(&mut neg1).await.unwrap();

        let name = b"drive0";
        let mut req = Vec::new();
        req.extend_from_slice(&[0u8; 4]);
        req.extend_from_slice(&proto::OPTS_MAGIC.to_be_bytes());
        req.extend_from_slice(&proto::OPT_EXPORT_NAME.to_be_bytes());
        req.extend_from_slice(&(name.len() as u32).to_be_bytes());
        req.extend_from_slice(name);
        client.write_all(&req).await.unwrap();

        let mut neg2 = [0u8; 134];
        client.read_exact(&mut neg2).await.unwrap();
        assert_eq!(u64::from_be_bytes(neg2[0..8].try_into().unwrap()), 4096);

        let payload = vec![0xEFu8; 128];
        let mut write_req = Vec::new();
        write_req.extend_from_slice(&proto::REQUEST_MAGIC.to_be_bytes());
        write_req.extend_from_slice(&proto::CMD_WRITE.to_be_bytes());
        write_req.extend_from_slice(&1u64.to_be_bytes());
        write_req.extend_from_slice(&512u64.to_be_bytes());
        write_req.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        client.write_all(&write_req).await.unwrap();
        client.write_all(&payload).await.unwrap();

        let mut reply = [0u8; 16];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(
            u32::from_be_bytes(reply[0..4].try_into().unwrap()),
            proto::REPLY_MAGIC
        );

        let mut disc = Vec::new();
        disc.extend_from_slice(&proto::REQUEST_MAGIC.to_be_bytes());
        disc.extend_from_slice(&proto::CMD_DISCONNECT.to_be_bytes());
        disc.extend_from_slice(&2u64.to_be_bytes());
        disc.extend_from_slice(&0u64.to_be_bytes());
        disc.extend_from_slice(&0u32.to_be_bytes());
        client.write_all(&disc).await.unwrap();

        server_task.await.unwrap();

        let writes = handler.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, 512);
        assert_eq!(writes[0].1, payload);
    }
}
