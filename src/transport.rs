// 🔌 Transport - "send line" / "newest complete line, if any"
//
// Sends are fire-and-forget: there is no acknowledgment and no retry, the
// next full-state frame repairs anything that was lost. Polling never blocks.

use crate::protocol::{encode, Frame, LineBuffer, MAX_LINE_BYTES};
use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

pub trait LineTransport {
    /// Write one line; `line` must already end with '\n'
    fn send_line(&mut self, line: &str) -> io::Result<()>;

    /// Newest complete inbound line, without blocking
    fn poll_line(&mut self) -> io::Result<Option<String>>;

    fn send_frame(&mut self, frame: &Frame) -> io::Result<()> {
        let line = encode(frame);
        tracing::debug!(frame = line.trim_end(), "send");
        self.send_line(&line)
    }

    /// True once after the link (re)connects, so the caller can resend full state
    fn take_reconnected(&mut self) -> bool {
        false
    }
}

// ============================================================================
// TCP
// ============================================================================

const READ_CHUNK: usize = 512;
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const RETRY_EVERY: Duration = Duration::from_secs(2);

/// Unsent bytes above this mean the peer stopped reading; new frames are dropped
const MAX_OUTBOX_BYTES: usize = 4 * MAX_LINE_BYTES;

type PendingConnect = Receiver<io::Result<TcpStream>>;

/// Client side of the node link over TCP, reconnecting on demand.
///
/// Connecting happens on a short-lived helper thread so neither `send_line`
/// nor `poll_line` ever waits on the network. Writes go through an outbox
/// that is flushed without blocking.
pub struct TcpLineTransport {
    addr: SocketAddr,
    stream: Option<TcpStream>,
    connecting: Option<PendingConnect>,
    buffer: LineBuffer,
    outbox: Vec<u8>,
    last_attempt: Option<Instant>,
    reconnected: bool,
}

impl TcpLineTransport {
    pub fn new(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address resolved"))?;

        Ok(TcpLineTransport {
            addr,
            stream: None,
            connecting: None,
            buffer: LineBuffer::new(),
            outbox: Vec::new(),
            last_attempt: None,
            reconnected: false,
        })
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        let addr = stream.peer_addr()?;
        stream.set_nonblocking(true)?;
        Ok(TcpLineTransport {
            addr,
            stream: Some(stream),
            connecting: None,
            buffer: LineBuffer::new(),
            outbox: Vec::new(),
            last_attempt: None,
            reconnected: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Advance the connection state without waiting
    fn drive_connect(&mut self) {
        if self.stream.is_some() {
            return;
        }

        if let Some(pending) = &self.connecting {
            match pending.try_recv() {
                Ok(Ok(stream)) => {
                    self.connecting = None;
                    if let Err(error) = self.adopt(stream) {
                        tracing::warn!(addr = %self.addr, %error, "link setup failed");
                    }
                }
                Ok(Err(error)) => {
                    self.connecting = None;
                    tracing::debug!(addr = %self.addr, %error, "connect failed");
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.connecting = None,
            }
            return;
        }

        let now = Instant::now();
        if let Some(last) = self.last_attempt {
            if now.duration_since(last) < RETRY_EVERY {
                return;
            }
        }
        self.last_attempt = Some(now);

        let (tx, rx) = mpsc::channel();
        let addr = self.addr;
        thread::spawn(move || {
            let _ = tx.send(TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT));
        });
        self.connecting = Some(rx);
    }

    fn adopt(&mut self, stream: TcpStream) -> io::Result<()> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        tracing::info!(addr = %self.addr, "link connected");
        // Frames queued for the previous connection are stale
        self.outbox.clear();
        self.stream = Some(stream);
        self.reconnected = true;
        Ok(())
    }

    fn drop_stream(&mut self, reason: &io::Error) {
        if self.stream.take().is_some() {
            tracing::warn!(addr = %self.addr, error = %reason, "link lost");
        }
        self.outbox.clear();
    }

    /// Write as much of the outbox as the socket takes right now
    fn flush(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link down"));
        };

        let mut written = 0;
        let mut failure = None;
        while written < self.outbox.len() {
            match stream.write(&self.outbox[written..]) {
                Ok(0) => {
                    failure = Some(io::Error::new(io::ErrorKind::WriteZero, "peer closed"));
                    break;
                }
                Ok(count) => written += count,
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }
        self.outbox.drain(..written);

        match failure {
            Some(error) => {
                self.drop_stream(&error);
                Err(error)
            }
            None => Ok(()),
        }
    }
}

impl LineTransport for TcpLineTransport {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.drive_connect();
        if self.stream.is_none() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link down"));
        }
        if self.outbox.len() > MAX_OUTBOX_BYTES {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "link congested"));
        }

        self.outbox.extend_from_slice(line.as_bytes());
        self.flush()
    }

    fn poll_line(&mut self) -> io::Result<Option<String>> {
        self.drive_connect();
        if self.stream.is_none() {
            return Ok(None);
        }
        if !self.outbox.is_empty() {
            self.flush()?;
        }

        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        let mut chunk = [0u8; READ_CHUNK];
        let mut received = Vec::new();
        let mut failure = None;

        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    failure = Some(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed"));
                    break;
                }
                Ok(read) => received.extend_from_slice(&chunk[..read]),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        if !received.is_empty() {
            self.buffer.push(&received);
        }

        if let Some(error) = failure {
            self.drop_stream(&error);
            // A line that arrived before the close is still the newest truth
            if let Some(line) = self.buffer.take_latest() {
                return Ok(Some(line));
            }
            return Err(error);
        }

        Ok(self.buffer.take_latest())
    }

    fn take_reconnected(&mut self) -> bool {
        self.drive_connect();
        std::mem::take(&mut self.reconnected)
    }
}

// ============================================================================
// IN-MEMORY LINK
// ============================================================================

type Pipe = Rc<RefCell<Vec<u8>>>;

/// One end of an in-process link; bytes written on one end are read on the other
pub struct MemoryLink {
    outbound: Pipe,
    inbound: Pipe,
    buffer: LineBuffer,
}

impl MemoryLink {
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let a_to_b: Pipe = Rc::default();
        let b_to_a: Pipe = Rc::default();

        let a = MemoryLink {
            outbound: a_to_b.clone(),
            inbound: b_to_a.clone(),
            buffer: LineBuffer::new(),
        };
        let b = MemoryLink {
            outbound: b_to_a,
            inbound: a_to_b,
            buffer: LineBuffer::new(),
        };
        (a, b)
    }

    /// Write raw bytes to the peer, e.g. half a frame
    pub fn send_raw(&self, bytes: &[u8]) {
        self.outbound.borrow_mut().extend_from_slice(bytes);
    }
}

impl LineTransport for MemoryLink {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.send_raw(line.as_bytes());
        Ok(())
    }

    fn poll_line(&mut self) -> io::Result<Option<String>> {
        let bytes: Vec<u8> = self.inbound.borrow_mut().drain(..).collect();
        if !bytes.is_empty() {
            self.buffer.push(&bytes);
        }
        Ok(self.buffer.take_latest())
    }
}
