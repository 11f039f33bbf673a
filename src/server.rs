use std::{
    io,
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket},
    sync::Arc,
    time::Duration,
};

use crate::{
    encoder,
    error::StreamError,
    hub::{Hub, Session},
    parser,
    protocol::Packet,
    stream::TeltonikaStream,
    DecodeConfig, IoElementAlloc, DEFAULT_MAX_FRAME_SIZE,
};

/// Callbacks invoked synchronously on a session's read thread.
///
/// Keep them fast: a session reads its next frame only after the callback
/// returns, and a device whose acknowledgement is late will drop the
/// connection and resend.
pub trait Handler: Send + Sync {
    /// An IMEI completed the handshake and was accepted.
    fn on_connect(&self, _imei: &str) {}

    /// A frame or datagram decoded. The packet may borrow from the session
    /// read buffer and is only valid for the duration of the call.
    fn on_packet(&self, _imei: &str, _packet: &Packet<'_>) {}

    /// The session ended: read/write error, decode error, deadline, or
    /// eviction by a newer connection with the same IMEI.
    fn on_disconnect(&self, _imei: &str) {}
}

/// Session tuning for [`TcpServer`] and [`UdpServer`].
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Per-read deadline on identified sessions. Devices report every few
    /// minutes; the default allows ten of silence.
    pub read_timeout: Duration,
    /// Per-write deadline for acknowledgements and pushed commands.
    pub write_timeout: Duration,
    /// Upper bound for one frame; anything larger closes the session.
    pub max_frame_size: usize,
    /// Where decoded element values live. `OnReadBuffer` is safe here
    /// because packets are only handed out for the duration of
    /// [`Handler::on_packet`].
    pub io_alloc: IoElementAlloc,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(600),
            write_timeout: Duration::from_secs(30),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            io_alloc: IoElementAlloc::OnHeap,
        }
    }
}

impl ServerConfig {
    fn decode_config(&self) -> DecodeConfig {
        DecodeConfig {
            io_alloc: self.io_alloc,
        }
    }
}

/// Accepts device connections and runs one session per connection.
pub struct TcpServer {
    listener: TcpListener,
    config: ServerConfig,
    handler: Arc<dyn Handler>,
    hub: Arc<Hub>,
}

impl TcpServer {
    /// Binds the listening socket; [`run`](Self::run) starts accepting.
    pub fn bind(
        addr: impl ToSocketAddrs,
        config: ServerConfig,
        handler: Arc<dyn Handler>,
    ) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
            config,
            handler,
            hub: Arc::new(Hub::new()),
        })
    }

    /// The registry used to push commands and list connected clients.
    pub fn hub(&self) -> Arc<Hub> {
        Arc::clone(&self.hub)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the listener itself fails; individual
    /// session errors only close that session.
    pub fn run(&self) -> io::Result<()> {
        log::info!("listening on {}", self.listener.local_addr()?);
        loop {
            let (conn, peer) = self.listener.accept()?;
            // tracked by the hub so shutdown can sever the socket and join
            // the read thread
            let tracked = match conn.try_clone() {
                Ok(tracked) => tracked,
                Err(error) => {
                    log::warn!("{peer}: could not clone connection handle: {error}");
                    continue;
                }
            };
            let config = self.config;
            let hub = Arc::clone(&self.hub);
            let handler = Arc::clone(&self.handler);
            self.hub.spawn_tracked(tracked, move || {
                handle_connection(conn, peer, config, hub, handler)
            });
        }
    }
}

fn handle_connection(
    conn: TcpStream,
    peer: SocketAddr,
    config: ServerConfig,
    hub: Arc<Hub>,
    handler: Arc<dyn Handler>,
) {
    if conn.set_read_timeout(Some(config.read_timeout)).is_err()
        || conn.set_write_timeout(Some(config.write_timeout)).is_err()
    {
        log::warn!("{peer}: could not apply socket deadlines");
        return;
    }
    let (writer, ctrl) = match (conn.try_clone(), conn.try_clone()) {
        (Ok(writer), Ok(ctrl)) => (writer, ctrl),
        _ => {
            log::warn!("{peer}: could not clone connection handles");
            return;
        }
    };
    let mut stream = TeltonikaStream::with_config(conn, config.decode_config());

    let imei = match stream.read_imei() {
        Ok(imei) if is_valid_imei(&imei) => imei,
        Ok(imei) => {
            log::debug!("{peer}: rejected imei {imei:?}");
            let _ = stream.write_imei_denial();
            return;
        }
        Err(error) => {
            if matches!(error, StreamError::Decode(_)) {
                let _ = stream.write_imei_denial();
            }
            log::debug!("{peer}: handshake failed: {error}");
            return;
        }
    };

    let session = Arc::new(Session::new(imei.clone(), peer, writer, ctrl));
    // the accept byte goes through the session writer so a hub send cannot
    // interleave with it
    if session.write_bytes(&[0x01]).is_err() {
        log::debug!("{peer}: handshake reply failed");
        return;
    }
    if let Some(evicted) = hub.register(Arc::clone(&session)) {
        evicted.shutdown();
        if evicted.finish() {
            handler.on_disconnect(&evicted.imei);
        }
    }
    handler.on_connect(&imei);
    log::info!("{imei} connected from {peer}");

    let mut buf = vec![0u8; config.max_frame_size];
    loop {
        match stream.read_frame_buf(&mut buf) {
            Ok((_, packet)) => {
                handler.on_packet(&imei, &packet);
                let ack = encoder::encode_tcp_ack(packet.records.len() as u32);
                if let Err(error) = session.write_bytes(&ack) {
                    log::debug!("{imei}: acknowledgement failed: {error}");
                    break;
                }
            }
            Err(error) => {
                if error.is_timeout() {
                    log::debug!("{imei}: read deadline elapsed");
                } else {
                    log::debug!("{imei}: closing: {error}");
                }
                break;
            }
        }
    }

    hub.unregister(&session);
    session.shutdown();
    if session.finish() {
        handler.on_disconnect(&imei);
    }
    log::info!("{imei} disconnected");
}

fn is_valid_imei(imei: &str) -> bool {
    imei.len() == 15 && imei.bytes().all(|b| b.is_ascii_digit())
}

/// Serves devices configured for the UDP channel: stateless, one
/// acknowledgement per datagram, no handshake and no hub entries.
pub struct UdpServer {
    socket: UdpSocket,
    config: ServerConfig,
    handler: Arc<dyn Handler>,
}

impl UdpServer {
    pub fn bind(
        addr: impl ToSocketAddrs,
        config: ServerConfig,
        handler: Arc<dyn Handler>,
    ) -> io::Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind(addr)?,
            config,
            handler,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive loop. Runs until the socket itself fails; undecodable
    /// datagrams are logged and dropped.
    pub fn run(&self) -> io::Result<()> {
        log::info!("listening on {}/udp", self.socket.local_addr()?);
        let mut buf = vec![0u8; usize::from(u16::MAX)];
        loop {
            let (received, peer) = self.socket.recv_from(&mut buf)?;
            match parser::decode_udp(&buf[..received], self.config.decode_config()) {
                Ok((_, datagram)) => {
                    self.handler.on_packet(&datagram.imei, &datagram.packet);
                    let ack = encoder::encode_udp_ack(
                        datagram.packet_id,
                        datagram.avl_packet_id,
                        datagram.packet.records.len() as u8,
                    );
                    if let Err(error) = self.socket.send_to(&ack, peer) {
                        log::debug!("{peer}: datagram acknowledgement failed: {error}");
                    }
                }
                Err(error) => log::debug!("{peer}: undecodable datagram: {error}"),
            }
        }
    }
}
