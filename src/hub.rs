use std::{
    collections::HashMap,
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, RwLock,
    },
    thread::{self, JoinHandle},
};

use chrono::{DateTime, Utc};

use crate::{encoder, error::SendError, protocol::Packet};

/// Snapshot of one identified client, as returned by [`Hub::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub imei: String,
    pub addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// One identified connection. The reading side lives on the session thread;
/// this handle carries everything the hub needs to write to or tear down
/// the connection from elsewhere.
pub(crate) struct Session {
    pub(crate) imei: String,
    addr: SocketAddr,
    connected_at: DateTime<Utc>,
    writer: Mutex<TcpStream>,
    // second handle so eviction can sever the socket without the write lock
    ctrl: TcpStream,
    finished: AtomicBool,
}

impl Session {
    pub(crate) fn new(imei: String, addr: SocketAddr, writer: TcpStream, ctrl: TcpStream) -> Self {
        Self {
            imei,
            addr,
            connected_at: Utc::now(),
            writer: Mutex::new(writer),
            ctrl,
            finished: AtomicBool::new(false),
        }
    }

    fn writer(&self) -> MutexGuard<'_, TcpStream> {
        match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Serialises every outbound write, so telemetry acknowledgements and
    /// hub-pushed command frames never interleave on the wire.
    pub(crate) fn write_bytes(&self, bytes: &[u8]) -> Result<(), SendError> {
        let mut writer = self.writer();
        writer.write_all(bytes).map_err(io_to_send)?;
        writer.flush().map_err(io_to_send)
    }

    pub(crate) fn write_packet(&self, packet: &Packet<'_>) -> Result<(), SendError> {
        let frame = encoder::encode_packet_tcp(packet)?;
        self.write_bytes(&frame)
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.ctrl.shutdown(Shutdown::Both);
    }

    /// True exactly once, for whichever side tears the session down first;
    /// that side owns the disconnect event.
    pub(crate) fn finish(&self) -> bool {
        !self.finished.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn info(&self) -> ClientInfo {
        ClientInfo {
            imei: self.imei.clone(),
            addr: self.addr,
            connected_at: self.connected_at,
        }
    }
}

fn io_to_send(error: io::Error) -> SendError {
    match error.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => SendError::Timeout,
        _ => SendError::Write(error),
    }
}

// One accepted connection's read thread, plus a handle to sever its socket
// so the join in [`Hub::shutdown`] cannot block on a device that stays
// quiet.
struct ReadTask {
    conn: TcpStream,
    thread: JoinHandle<()>,
}

/// Registry of identified sessions, keyed by IMEI.
///
/// One hub exists per [`TcpServer`](crate::TcpServer); it is the only
/// shared mutable state in the crate. Registration and removal take the
/// writer path, lookups and snapshots the reader path, and every operation
/// is safe under concurrent callers.
pub struct Hub {
    clients: RwLock<HashMap<String, Arc<Session>>>,
    readers: Mutex<Vec<ReadTask>>,
}

impl Hub {
    pub(crate) fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            readers: Mutex::new(Vec::new()),
        }
    }

    /// Spawns one accepted connection's read thread and tracks it,
    /// atomically with respect to [`shutdown`](Self::shutdown): a
    /// connection whose thread is running is always severed and joined.
    /// Entries whose thread already returned are pruned on the way in.
    pub(crate) fn spawn_tracked(&self, conn: TcpStream, read: impl FnOnce() + Send + 'static) {
        let mut readers = match self.readers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        readers.retain(|task| !task.thread.is_finished());
        let thread = thread::spawn(read);
        readers.push(ReadTask { conn, thread });
    }

    /// Installs `session` as the owner of its IMEI, returning the evicted
    /// predecessor if that IMEI was already connected.
    pub(crate) fn register(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let mut clients = match self.clients.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        clients.insert(session.imei.clone(), session)
    }

    /// Removes `session` only while it still owns its IMEI slot; a session
    /// that was already evicted leaves the newer entry untouched.
    pub(crate) fn unregister(&self, session: &Arc<Session>) {
        let mut clients = match self.clients.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if clients
            .get(&session.imei)
            .map_or(false, |current| Arc::ptr_eq(current, session))
        {
            clients.remove(&session.imei);
        }
    }

    fn lookup(&self, imei: &str) -> Option<Arc<Session>> {
        let clients = match self.clients.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        clients.get(imei).cloned()
    }

    /// Encodes `packet` as a TCP frame and writes it to the session
    /// identified by `imei`.
    pub fn send(&self, imei: &str, packet: &Packet<'_>) -> Result<(), SendError> {
        let session = self
            .lookup(imei)
            .ok_or_else(|| SendError::NoSuchDevice(imei.to_owned()))?;
        session.write_packet(packet)
    }

    /// Closes every connection and waits for each read thread to return.
    ///
    /// By the time this returns, every session has unregistered itself and
    /// published its disconnect event, and connections still in the
    /// handshake are gone too. Must not be called from a
    /// [`Handler`](crate::Handler) callback: that would join the calling
    /// thread.
    pub fn shutdown(&self) {
        let tasks = {
            let mut readers = match self.readers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *readers)
        };
        for task in &tasks {
            let _ = task.conn.shutdown(Shutdown::Both);
        }
        for task in tasks {
            let _ = task.thread.join();
        }
    }

    /// Snapshot of every identified client. The entries are plain values;
    /// a session may disconnect the moment this returns.
    pub fn list(&self) -> Vec<ClientInfo> {
        let clients = match self.clients.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        clients.values().map(|session| session.info()).collect()
    }
}
