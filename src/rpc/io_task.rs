//! Async socket tasks: the backend link and the remote command listener.
//!
//! Both run as futures on an `edge-executor` [`LocalExecutor`] owned by the
//! event loop. The loop advances them with `try_tick()` once per iteration,
//! so no socket call ever blocks a tick. `async-io-mini` supplies the
//! non-blocking sockets and the timers.
//!
//! ```text
//!  ┌──────────── event loop (one thread) ───────────────────────┐
//!  │  tick handlers ── try_send/try_receive ──┐                 │
//!  │                                          ▼                 │
//!  │  LocalExecutor::try_tick ──▶ ┌───────────────────────────┐ │
//!  │                              │ backend_link   (TCP out)  │ │
//!  │                              │ command_server (TCP in)   │ │
//!  │                              └───────────────────────────┘ │
//!  └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The tasks only run while [`BackendChannels::link_up`] is set. When the
//! session drops the link they close their sockets; when it comes back the
//! backend socket reconnects and the listener rebinds by itself.

use core::time::Duration;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};

use async_io_mini::{Async, Timer};
use edge_executor::LocalExecutor;
use futures_lite::future;
use heapless::Vec;
use log::{debug, info, warn};

use super::channels::{BackendChannels, CHUNK_SIZE, Chunk, InboundCommand, MAX_COMMAND_LINE};

/// Link-state poll interval while idle.
const IDLE_POLL: Duration = Duration::from_millis(200);
/// Pause before reconnecting a failed backend socket.
const RECONNECT_PAUSE: Duration = Duration::from_secs(2);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// How long a command connection waits for its acknowledgement.
const ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Executor slots: two long-running tasks.
pub type IoExecutor<'a> = LocalExecutor<'a, 4>;

// ── Line splitting for the command channel ───────────────────

/// Accumulates bytes and yields newline-terminated lines.
pub struct LineBuffer {
    buf: Vec<u8, MAX_COMMAND_LINE>,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            overflowed: false,
        }
    }

    /// Feed one byte. Returns a completed line (without `\r\n`). Lines
    /// longer than the buffer are dropped whole.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8, MAX_COMMAND_LINE>> {
        if byte == b'\n' {
            let overflowed = core::mem::replace(&mut self.overflowed, false);
            let mut line = core::mem::take(&mut self.buf);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return (!overflowed && !line.is_empty()).then_some(line);
        }
        if self.buf.push(byte).is_err() {
            self.overflowed = true;
            self.buf.clear();
        }
        None
    }

    /// Whatever is left when the peer closes without a final newline.
    pub fn finish(&mut self) -> Option<Vec<u8, MAX_COMMAND_LINE>> {
        let overflowed = core::mem::replace(&mut self.overflowed, false);
        let line = core::mem::take(&mut self.buf);
        (!overflowed && !line.is_empty()).then_some(line)
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Helpers ──────────────────────────────────────────────────

async fn wait_for_link(ch: &BackendChannels) {
    while !ch.link_up() {
        Timer::after(IDLE_POLL).await;
    }
}

async fn wait_for_link_loss(ch: &BackendChannels) {
    while ch.link_up() {
        Timer::after(IDLE_POLL).await;
    }
}

async fn until_link_loss(ch: &BackendChannels) -> std::io::Result<()> {
    wait_for_link_loss(ch).await;
    Ok(())
}

async fn timeout<T>(dur: Duration) -> std::io::Result<T> {
    Timer::after(dur).await;
    Err(std::io::ErrorKind::TimedOut.into())
}

// ── Backend link ─────────────────────────────────────────────

async fn pump_inbound(ch: &BackendChannels, stream: &Async<TcpStream>) -> std::io::Result<()> {
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = stream.read_with(|mut s| s.read(&mut buf)).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        forward_inbound(ch, &buf[..n]).await;
    }
}

/// Hand received bytes to the event loop, waiting while the channel is
/// full. The stream is length-framed, so no chunk may be skipped.
async fn forward_inbound(ch: &BackendChannels, data: &[u8]) {
    for piece in data.chunks(CHUNK_SIZE) {
        if let Ok(chunk) = Chunk::from_slice(piece) {
            ch.inbound.send(chunk).await;
        }
    }
}

async fn pump_outbound(ch: &BackendChannels, stream: &Async<TcpStream>) -> std::io::Result<()> {
    loop {
        let frame = ch.outbound.receive().await;
        let mut sent = 0;
        while sent < frame.len() {
            let n = stream.write_with(|mut s| s.write(&frame[sent..])).await?;
            if n == 0 {
                return Err(std::io::ErrorKind::WriteZero.into());
            }
            sent += n;
        }
    }
}

async fn backend_link(ch: &BackendChannels, addr: SocketAddr) {
    loop {
        wait_for_link(ch).await;
        debug!("IO: connecting to backend {}", addr);
        let connected = future::or(Async::<TcpStream>::connect(addr), timeout(CONNECT_TIMEOUT)).await;
        let stream = match connected {
            Ok(s) => s,
            Err(e) => {
                warn!("IO: backend {} unreachable: {}", addr, e);
                Timer::after(RECONNECT_PAUSE).await;
                continue;
            }
        };
        info!("IO: backend {} connected", addr);
        ch.set_backend_open(true);

        let io = future::or(pump_inbound(ch, &stream), pump_outbound(ch, &stream));
        let result = future::or(io, until_link_loss(ch)).await;

        ch.set_backend_open(false);
        match result {
            Ok(()) => info!("IO: backend socket closed, link down"),
            Err(e) => {
                warn!("IO: backend socket error: {}", e);
                Timer::after(RECONNECT_PAUSE).await;
            }
        }
    }
}

// ── Remote command listener ──────────────────────────────────

async fn await_ack(ch: &BackendChannels, conn: u32) -> Option<heapless::String<64>> {
    let wait = async {
        loop {
            let ack = ch.acks.receive().await;
            if ack.conn == conn {
                return Some(ack.text);
            }
            debug!("CMD[{}]: dropping late ack for {}", conn, ack.conn);
        }
    };
    future::or(wait, async {
        Timer::after(ACK_TIMEOUT).await;
        None
    })
    .await
}

async fn forward_line(
    ch: &BackendChannels,
    stream: &Async<TcpStream>,
    conn: u32,
    line: Vec<u8, MAX_COMMAND_LINE>,
) -> std::io::Result<()> {
    if ch.commands.try_send(InboundCommand { conn, line }).is_err() {
        warn!("CMD[{}]: command channel full, dropping line", conn);
        return Ok(());
    }
    let Some(ack) = await_ack(ch, conn).await else {
        warn!("CMD[{}]: no acknowledgement", conn);
        return Ok(());
    };
    let mut out = std::vec::Vec::with_capacity(ack.len() + 1);
    out.extend_from_slice(ack.as_bytes());
    out.push(b'\n');
    let mut sent = 0;
    while sent < out.len() {
        let n = stream.write_with(|mut s| s.write(&out[sent..])).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::WriteZero.into());
        }
        sent += n;
    }
    Ok(())
}

async fn serve_connection(ch: &BackendChannels, stream: Async<TcpStream>, conn: u32) {
    let mut lines = LineBuffer::new();
    let mut buf = [0u8; 128];
    loop {
        let n = match stream.read_with(|mut s| s.read(&mut buf)).await {
            Ok(n) => n,
            Err(e) => {
                debug!("CMD[{}]: read error: {}", conn, e);
                return;
            }
        };
        if n == 0 {
            if let Some(line) = lines.finish() {
                let _ = forward_line(ch, &stream, conn, line).await;
            }
            return;
        }
        for &b in &buf[..n] {
            if let Some(line) = lines.push(b) {
                if let Err(e) = forward_line(ch, &stream, conn, line).await {
                    debug!("CMD[{}]: write error: {}", conn, e);
                    return;
                }
            }
        }
    }
}

async fn accept_loop(
    ch: &BackendChannels,
    listener: &Async<TcpListener>,
    next_conn: &mut u32,
) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let conn = *next_conn;
        *next_conn = next_conn.wrapping_add(1);
        debug!("CMD[{}]: connection from {}", conn, peer);
        // One sender at a time; commands are short-lived.
        serve_connection(ch, stream, conn).await;
    }
}

async fn command_server(ch: &BackendChannels, port: u16) {
    let mut next_conn: u32 = 1;
    loop {
        while !(ch.link_up() && ch.listening()) {
            Timer::after(IDLE_POLL).await;
        }
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        let listener = match Async::<TcpListener>::bind(addr) {
            Ok(l) => l,
            Err(e) => {
                warn!("CMD: bind :{} failed: {}", port, e);
                Timer::after(RECONNECT_PAUSE).await;
                continue;
            }
        };
        info!("CMD: listening on :{}", port);

        let serve = accept_loop(ch, &listener, &mut next_conn);
        let result = future::or(serve, until_link_loss(ch)).await;
        if let Err(e) = result {
            warn!("CMD: listener error: {}", e);
            Timer::after(RECONNECT_PAUSE).await;
        } else {
            info!("CMD: listener closed, link down");
        }
    }
}

// ── Spawn ────────────────────────────────────────────────────

/// Spawn both socket tasks on `executor`. They live as long as the
/// executor does.
pub fn spawn(
    executor: &IoExecutor<'static>,
    channels: &'static BackendChannels,
    backend: SocketAddr,
    command_port: u16,
) {
    executor.spawn(backend_link(channels, backend)).detach();
    executor.spawn(command_server(channels, command_port)).detach();
    info!(
        "IO tasks started (backend {}, commands on :{})",
        backend, command_port
    );
}

/// Advance the socket tasks as far as they can go without blocking.
pub fn run_ready(executor: &IoExecutor<'_>, budget: usize) {
    for _ in 0..budget {
        if !executor.try_tick() {
            break;
        }
    }
}
