//! Non-blocking operator command sources.
//!
//! The control loop polls once per cycle and gets at most one byte. Polling
//! never waits: when nothing is queued the answer is `None` immediately.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};

pub const DEFAULT_COMMAND_ADDR: &str = "127.0.0.1:10000";

/// Largest datagram read in one piece; longer ones are truncated by the OS.
const RECV_BUFFER: usize = 512;

pub trait CommandChannel {
    /// Next command byte, if one is available right now.
    fn poll(&mut self) -> Option<u8>;
}

impl<C: CommandChannel + ?Sized> CommandChannel for Box<C> {
    fn poll(&mut self) -> Option<u8> {
        (**self).poll()
    }
}

/// Connectionless command socket, normally bound to localhost.
///
/// Every byte of every datagram is a separate command. Bytes beyond the first
/// are held back for later polls.
pub struct UdpCommandChannel {
    socket: UdpSocket,
    pending: VecDeque<u8>,
}

impl UdpCommandChannel {
    pub fn bind(addr: &str) -> Result<Self> {
        let socket =
            UdpSocket::bind(addr).with_context(|| format!("bind command socket on {}", addr))?;
        socket
            .set_nonblocking(true)
            .context("set command socket non-blocking")?;
        log::info!("command channel listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            pending: VecDeque::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn receive(&mut self) {
        let mut buf = [0u8; RECV_BUFFER];
        match self.socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                log::trace!("command datagram of {} bytes from {}", len, from);
                if len == RECV_BUFFER {
                    log::warn!(
                        "command datagram from {} filled the {} byte buffer; excess bytes were dropped",
                        from,
                        RECV_BUFFER
                    );
                }
                self.pending.extend(&buf[..len]);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => log::debug!("command socket read failed: {}", e),
        }
    }
}

impl CommandChannel for UdpCommandChannel {
    fn poll(&mut self) -> Option<u8> {
        if self.pending.is_empty() {
            self.receive();
        }
        let byte = self.pending.pop_front()?;
        if !byte.is_ascii() {
            log::debug!("dropping undecodable command byte {:#04x}", byte);
            return None;
        }
        Some(byte)
    }
}

/// Scripted channel: each poll pops one entry, `None` entries model idle cycles.
#[derive(Clone, Debug, Default)]
pub struct QueueChannel {
    script: VecDeque<Option<u8>>,
}

impl QueueChannel {
    pub fn from_script(script: impl IntoIterator<Item = Option<u8>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}

impl CommandChannel for QueueChannel {
    fn poll(&mut self) -> Option<u8> {
        self.script.pop_front().flatten()
    }
}
