//! The RSP client: talks the same wire protocol upstream to a server
//! stub, enforcing the single-outstanding-request discipline and
//! delivering unsolicited stop packets to a caller-supplied callback.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use thiserror::Error;

use crate::server::{parse_q_supported, QSupportedValue};
use crate::target::BreakpointKind;
use crate::wire::{self, ReceivedPacket, WireError};

const POLL_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("stub replied with error E{0:02x}")]
    ErrorPacket(u8),
    #[error("stub does not support this request")]
    Unsupported,
    #[error("stub reply did not match the expected form: {0:?}")]
    Unrecognized(Vec<u8>),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Reason the client's interrupt callback is invoked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stop {
    pub signal: u8,
}

/// An RSP client bound to one TCP connection for the life of a debug
/// session.
pub struct RspClient<F: FnMut(Stop)> {
    conn: TcpStream,
    no_ack_mode: bool,
    buf: Vec<u8>,
    pushback: Option<ReceivedPacket>,
    pub stub_supported: HashMap<String, QSupportedValue>,
    on_interrupt: F,
}

impl<F: FnMut(Stop)> RspClient<F> {
    /// Connect to `addr` and run the `qSupported` / `vMustReplyEmpty`
    /// / `QStartNoAckMode` handshake described in the spec.
    pub fn connect(addr: &str, on_interrupt: F) -> ClientResult<Self> {
        let conn = TcpStream::connect(addr)?;
        conn.set_read_timeout(Some(POLL_TIMEOUT))?;
        let mut client = RspClient {
            conn,
            no_ack_mode: false,
            buf: Vec::new(),
            pushback: None,
            stub_supported: HashMap::new(),
            on_interrupt,
        };
        client.handshake()?;
        Ok(client)
    }

    fn handshake(&mut self) -> ClientResult<()> {
        self.send_packet(b"qSupported:multiprocess+;swbreak+;hwbreak+")?;
        self.send_ack_if_needed()?;
        let reply = self.receive_packet_with_retries()?;
        for (name, value) in parse_q_supported(&reply) {
            self.stub_supported.insert(name, value);
        }

        self.send_packet(b"vMustReplyEmpty")?;
        self.send_ack_if_needed()?;
        let reply = self.receive_packet_with_retries()?;
        if !reply.is_empty() {
            return Err(ClientError::Unrecognized(reply));
        }

        self.send_packet(b"QStartNoAckMode")?;
        self.send_ack_if_needed()?;
        let reply = self.receive_packet_with_retries()?;
        if reply != b"OK" {
            return Err(ClientError::Unrecognized(reply));
        }
        self.no_ack_mode = true;
        Ok(())
    }

    fn send_ack_if_needed(&mut self) -> ClientResult<()> {
        // The handshake's three requests are themselves always acked,
        // even once no-ack mode is about to take effect.
        if !self.no_ack_mode {
            let (consumed, ack) = self.read_one(true)?;
            self.buf.drain(..consumed);
            if ack != ReceivedPacket::Ack {
                return Err(ClientError::Unrecognized(Vec::new()));
            }
        }
        Ok(())
    }

    fn send_packet(&mut self, payload: &[u8]) -> ClientResult<()> {
        self.conn.write_all(&wire::encode(payload))?;
        Ok(())
    }

    fn read_one(&mut self, blocking: bool) -> ClientResult<(usize, ReceivedPacket)> {
        loop {
            if let Some((consumed, pkt)) = wire::parse_one_frame(&self.buf)? {
                return Ok((consumed, pkt));
            }
            let mut chunk = [0u8; 1024];
            match self.conn.read(&mut chunk) {
                Ok(0) => return Err(ClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                ))),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                    if !blocking {
                        return Err(ClientError::Io(e));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Receive one reply packet, dispatching any unsolicited `S<hex>`
    /// stop packets to the interrupt callback before retrying.
    fn receive_packet_with_retries(&mut self) -> ClientResult<Vec<u8>> {
        if let Some(ReceivedPacket::Packet(p)) = self.pushback.take() {
            if let Some(stop) = parse_unsolicited_stop(&p) {
                (self.on_interrupt)(stop);
            } else {
                return Ok(p);
            }
        }
        loop {
            let (consumed, pkt) = self.read_one(true)?;
            self.buf.drain(..consumed);
            match pkt {
                ReceivedPacket::Packet(p) => {
                    if let Some(stop) = parse_unsolicited_stop(&p) {
                        (self.on_interrupt)(stop);
                        continue;
                    }
                    return Ok(p);
                }
                ReceivedPacket::Ack | ReceivedPacket::Nack => continue,
            }
        }
    }

    /// Push an already-read packet back for the next
    /// `receive_packet_with_retries` to see. Used by `poll_interrupts`.
    fn receive_pkt_undo(&mut self, pkt: ReceivedPacket) {
        assert!(self.pushback.is_none());
        self.pushback = Some(pkt);
    }

    /// Non-blocking drain for unsolicited stop notifications; leaves
    /// any ordinary reply pushed back for the next real request.
    pub fn poll_interrupts(&mut self) -> ClientResult<()> {
        match self.read_one(false) {
            Ok((consumed, pkt)) => {
                self.buf.drain(..consumed);
                if let ReceivedPacket::Packet(ref p) = pkt {
                    if let Some(stop) = parse_unsolicited_stop(p) {
                        (self.on_interrupt)(stop);
                        return Ok(());
                    }
                }
                self.receive_pkt_undo(pkt);
                Ok(())
            }
            Err(ClientError::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn expect_ok(&mut self) -> ClientResult<()> {
        let reply = self.receive_packet_with_retries()?;
        match reply.as_slice() {
            b"OK" => Ok(()),
            _ => {
                if let Some(code) = parse_error_reply(&reply) {
                    Err(ClientError::ErrorPacket(code))
                } else if reply.is_empty() {
                    Err(ClientError::Unsupported)
                } else {
                    Err(ClientError::Unrecognized(reply))
                }
            }
        }
    }

    pub fn send_continue(&mut self) -> ClientResult<()> {
        self.send_packet(b"c")?;
        self.expect_ok()
    }

    pub fn send_step(&mut self) -> ClientResult<()> {
        self.send_packet(b"s")?;
        self.expect_ok()
    }

    pub fn send_interrupt(&mut self) -> ClientResult<()> {
        self.send_packet(b"vCtrlC")?;
        self.expect_ok()
    }

    pub fn break_insert(&mut self, addr: u64) -> ClientResult<()> {
        self.send_packet(format!("Z{},{:x},0", BreakpointKind::Hardware as u8, addr).as_bytes())?;
        self.expect_ok()
    }

    pub fn break_delete(&mut self, addr: u64) -> ClientResult<()> {
        self.send_packet(format!("z{},{:x},0", BreakpointKind::Hardware as u8, addr).as_bytes())?;
        self.expect_ok()
    }

    pub fn read_register(&mut self, index: u64) -> ClientResult<u64> {
        self.send_packet(format!("p{:x}", index).as_bytes())?;
        let reply = self.receive_packet_with_retries()?;
        let bytes = wire::decode_hex(&reply).ok_or_else(|| ClientError::Unrecognized(reply.clone()))?;
        let mut padded = [0u8; 8];
        padded[..bytes.len().min(8)].copy_from_slice(&bytes[..bytes.len().min(8)]);
        Ok(u64::from_le_bytes(padded))
    }

    /// `qRegisterInfo<i>`; `Ok(None)` once the index runs past the
    /// target's last register (an `E`-prefixed or empty reply).
    pub fn register_info(&mut self, index: u64) -> ClientResult<Option<RegisterDescriptor>> {
        self.send_packet(format!("qRegisterInfo{:x}", index).as_bytes())?;
        let reply = self.receive_packet_with_retries()?;
        if reply.is_empty() || reply.starts_with(b"E") {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&reply);
        Ok(Some(RegisterDescriptor::parse(&text)))
    }
}

/// The parsed form of a `qRegisterInfo` descriptor string.
#[derive(Debug, Clone)]
pub struct RegisterDescriptor {
    pub name: String,
    pub bitsize: u32,
    pub generic: Option<String>,
}

impl RegisterDescriptor {
    fn parse(text: &str) -> Self {
        let mut name = String::new();
        let mut bitsize = 0;
        let mut generic = None;
        for field in text.split(';') {
            if let Some((key, value)) = field.split_once(':') {
                match key {
                    "name" => name = value.to_string(),
                    "bitsize" => bitsize = value.parse().unwrap_or(0),
                    "generic" => generic = Some(value.to_string()),
                    _ => {}
                }
            }
        }
        RegisterDescriptor { name, bitsize, generic }
    }
}

fn parse_unsolicited_stop(p: &[u8]) -> Option<Stop> {
    let rest = p.strip_prefix(b"S")?;
    let code = wire::decode_hex(rest)?;
    Some(Stop { signal: *code.first()? })
}

fn parse_error_reply(p: &[u8]) -> Option<u8> {
    let rest = p.strip_prefix(b"E")?;
    wire::decode_hex(rest)?.first().copied()
}
