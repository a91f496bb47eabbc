//! The RSP server stub: accepts one client, decodes frames, dispatches
//! them against a [`Target`], and couples the per-cycle stepping loop
//! to stop-reply delivery.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::target::{signal, BreakpointKind, StepOutcome, Target};
use crate::wire::{self, ReceivedPacket, WireError};

const POLL_TIMEOUT: Duration = Duration::from_millis(1);
const READ_CHUNK: usize = 1024;

/// Errors that end an in-progress session. A bad checksum is fatal,
/// per the spec's error-handling design: the server aborts rather than
/// guessing at a retransmit.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Owns the listener and per-session state for the RSP server stub.
pub struct RspServer<T: Target> {
    listener: TcpListener,
    target: T,
    no_ack_mode: bool,
    execution_stopped: bool,
}

impl<T: Target> RspServer<T> {
    /// Bind to `addr` (use `"127.0.0.1:0"` for an ephemeral port) and
    /// wrap `target` for dispatch.
    pub fn bind(addr: &str, target: T) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(RspServer {
            listener,
            target,
            no_ack_mode: false,
            execution_stopped: true,
        })
    }

    /// The bound local address, useful when `addr` was `"...: 0"`.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept exactly one client and run the session to completion.
    /// Returns when the client disconnects or a wire-level error
    /// forces the session down.
    pub fn accept_and_run(&mut self) -> Result<(), ServerError> {
        let (mut conn, addr) = self.listener.accept()?;
        debug!(%addr, "client connected");
        conn.set_read_timeout(Some(POLL_TIMEOUT))?;

        let mut buf = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match conn.read(&mut chunk) {
                Ok(0) => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }

            loop {
                match wire::parse_one_frame(&buf) {
                    Ok(Some((consumed, packet))) => {
                        buf.drain(..consumed);
                        if let ReceivedPacket::Packet(payload) = packet {
                            self.handle_packet(&mut conn, &payload)?;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "bad checksum, aborting session");
                        return Err(e.into());
                    }
                }
            }

            if !self.execution_stopped {
                self.step_once(&mut conn)?;
            }
        }
    }

    fn step_once(&mut self, conn: &mut TcpStream) -> Result<(), ServerError> {
        match self.target.run_current_instr() {
            StepOutcome::Breakpoint(addr) => {
                trace!(addr, "breakpoint hit");
                self.execution_stopped = true;
                self.send_reply(conn, &stop_reply(signal::TRAP))?;
            }
            StepOutcome::CycleBudgetExhausted => {
                trace!("cycle budget exhausted");
                self.execution_stopped = true;
                self.send_reply(conn, &stop_reply(signal::TRAP))?;
            }
            StepOutcome::Retired => {}
        }
        Ok(())
    }

    fn send_reply(&self, conn: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
        conn.write_all(&wire::encode(payload))
    }

    fn handle_packet(&mut self, conn: &mut TcpStream, packet: &[u8]) -> Result<(), ServerError> {
        if !self.no_ack_mode {
            trace!("-> +");
            conn.write_all(b"+")?;
        }

        if packet == b"vCtrlC" {
            self.execution_stopped = true;
            self.send_reply(conn, b"OK")?;
            self.send_reply(conn, &stop_reply(signal::INT))?;
            return Ok(());
        }

        let reply = self.dispatch(packet);
        if let Some(reply) = reply {
            self.send_reply(conn, &reply)?;
        }
        Ok(())
    }

    /// Compute the reply for one already-ack'd packet. `None` is
    /// never produced today but keeps room for future one-way
    /// notifications.
    fn dispatch(&mut self, packet: &[u8]) -> Option<Vec<u8>> {
        let s = packet;
        let reply = if s == b"?" {
            stop_reply(self.target.halt_reason())
        } else if s == b"g" {
            hex(&self.target.read_all_registers())
        } else if let Some(rest) = strip(s, b"G") {
            match wire::decode_hex(rest) {
                Some(data) => match self.target.write_all_registers(&data) {
                    Ok(()) => b"OK".to_vec(),
                    Err(_) => error_reply(1),
                },
                None => error_reply(0),
            }
        } else if let Some(rest) = strip(s, b"m") {
            let _ = rest;
            // Memory reads are not modeled by this bridge's target
            // interface; report unsupported.
            Vec::new()
        } else if s.starts_with(b"M") {
            if let Some((addr_len, data)) = parse_write_memory(s) {
                let (_, len) = addr_len;
                if len as usize != data.len() {
                    error_reply(0)
                } else {
                    // No memory model; accept and discard.
                    b"OK".to_vec()
                }
            } else {
                Vec::new()
            }
        } else if let Some(rest) = strip(s, b"s") {
            let addr = parse_optional_addr(rest);
            self.target.step(addr);
            self.execution_stopped = false;
            b"OK".to_vec()
        } else if let Some(rest) = strip(s, b"c") {
            let addr = parse_optional_addr(rest);
            self.target.cont(addr);
            self.execution_stopped = false;
            b"OK".to_vec()
        } else if let Some(rest) = strip(s, b"qSupported:") {
            let _features = parse_q_supported(rest);
            b"QStartNoAckMode+;swbreak+;hwbreak+".to_vec()
        } else if s == b"QStartNoAckMode" {
            self.no_ack_mode = true;
            b"OK".to_vec()
        } else if s == b"qTStatus" {
            b"T0;tnotrun:0;tframes:0;tcreated:0;tfree:50*!;tsize:50*!;circular:0;disconn:0;starttime:0;stoptime:0;username:;notes::".to_vec()
        } else if s == b"qfThreadInfo" {
            b"m0".to_vec()
        } else if s == b"qsThreadInfo" {
            b"l".to_vec()
        } else if s == b"qTfV" {
            b"1:0:1:74726163655f74696d657374616d70".to_vec()
        } else if s == b"qTsV" {
            b"l".to_vec()
        } else if s == b"qC" {
            b"QC0".to_vec()
        } else if let Some(rest) = strip(s, b"H") {
            if !rest.is_empty() {
                b"OK".to_vec()
            } else {
                Vec::new()
            }
        } else if s.len() >= 2 && (s[0] == b'z' || s[0] == b'Z') {
            self.dispatch_breakpoint(s)
        } else if s == b"qHostInfo" {
            self.target.host_info().into_bytes()
        } else if s == b"qProcessInfo" {
            b"pid:1;endian:little;".to_vec()
        } else if let Some(rest) = strip(s, b"qRegisterInfo") {
            match wire::decode_hex_number(rest) {
                Some(idx) => match self.target.register_info(idx as usize) {
                    Some(info) => info.to_descriptor().into_bytes(),
                    None => error_reply(1),
                },
                None => error_reply(1),
            }
        } else if let Some(rest) = strip(s, b"qMemoryRegionInfo:") {
            match wire::decode_hex_number(rest) {
                Some(addr) => self.target.memory_region_info(addr).into_bytes(),
                None => error_reply(1),
            }
        } else if let Some(rest) = strip(s, b"p") {
            match wire::decode_hex_number(rest) {
                Some(idx) => match self.target.read_register(idx as usize) {
                    Ok(bytes) => hex(&bytes),
                    Err(_) => error_reply(1),
                },
                None => error_reply(1),
            }
        } else if s == b"vMustReplyEmpty" {
            trace!("vMustReplyEmpty");
            Vec::new()
        } else {
            trace!(packet = %String::from_utf8_lossy(s), "unsupported packet");
            Vec::new()
        };
        Some(reply)
    }

    fn dispatch_breakpoint(&mut self, s: &[u8]) -> Vec<u8> {
        // [zZ]<type>,<addr>,<kind>
        let op = s[0];
        let rest = &s[1..];
        let parts: Vec<&[u8]> = rest.splitn(3, |b| *b == b',').collect();
        if parts.len() != 3 {
            return Vec::new();
        }
        let (Some(kind_digit), Some(addr), Some(len)) = (
            parts[0].first().copied(),
            wire::decode_hex_number(parts[1]),
            wire::decode_hex_number(parts[2]),
        ) else {
            return Vec::new();
        };
        let Some(kind) = BreakpointKind::from_digit(kind_digit - b'0') else {
            return Vec::new();
        };
        if op == b'Z' {
            self.target.add_breakpoint(kind, addr, len as u8);
            b"OK".to_vec()
        } else {
            match self.target.remove_breakpoint(kind, addr) {
                Ok(()) => b"OK".to_vec(),
                Err(_) => error_reply(1),
            }
        }
    }
}

fn stop_reply(sig: u8) -> Vec<u8> {
    format!("S{:02x}", sig).into_bytes()
}

fn error_reply(code: u8) -> Vec<u8> {
    format!("E{:02x}", code).into_bytes()
}

fn hex(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| format!("{:02x}", b)).collect::<String>().into_bytes()
}

fn strip<'a>(s: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    s.strip_prefix(prefix)
}

fn parse_optional_addr(rest: &[u8]) -> Option<u64> {
    if rest.is_empty() {
        None
    } else {
        wire::decode_hex_number(rest)
    }
}

/// Parse `feature±` / `feature=value` pairs from a `qSupported:` tail.
/// A trailing `+` means supported, `-` means unsupported, and `=value`
/// is taken verbatim — never conflating the `+`/`-` branches the way
/// the system this bridge is modeled on did.
pub fn parse_q_supported(tail: &[u8]) -> Vec<(String, QSupportedValue)> {
    let text = String::from_utf8_lossy(tail);
    text.split(';')
        .filter(|s| !s.is_empty())
        .map(|feature| {
            if let Some(name) = feature.strip_suffix('+') {
                (name.to_string(), QSupportedValue::Bool(true))
            } else if let Some(name) = feature.strip_suffix('-') {
                (name.to_string(), QSupportedValue::Bool(false))
            } else if let Some((name, value)) = feature.split_once('=') {
                (name.to_string(), QSupportedValue::Value(value.to_string()))
            } else {
                (feature.to_string(), QSupportedValue::Bool(false))
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QSupportedValue {
    Bool(bool),
    Value(String),
}

fn parse_write_memory(s: &[u8]) -> Option<((u64, u64), Vec<u8>)> {
    // M<addr>,<len>:<data>
    let rest = strip(s, b"M")?;
    let colon = rest.iter().position(|b| *b == b':')?;
    let header = &rest[..colon];
    let data_hex = &rest[colon + 1..];
    let comma = header.iter().position(|b| *b == b',')?;
    let addr = wire::decode_hex_number(&header[..comma])?;
    let len = wire::decode_hex_number(&header[comma + 1..])?;
    let data = wire::decode_hex(data_hex)?;
    Some(((addr, len), data))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn q_supported_parses_plus_minus_and_value() {
        let parsed = parse_q_supported(b"multiprocess+;swbreak-;foo=bar");
        assert_eq!(
            parsed,
            vec![
                ("multiprocess".to_string(), QSupportedValue::Bool(true)),
                ("swbreak".to_string(), QSupportedValue::Bool(false)),
                ("foo".to_string(), QSupportedValue::Value("bar".to_string())),
            ]
        );
    }

    #[test]
    fn write_memory_header_parses() {
        let ((addr, len), data) = parse_write_memory(b"M38,2:aabb").unwrap();
        assert_eq!(addr, 0x38);
        assert_eq!(len, 2);
        assert_eq!(data, vec![0xaa, 0xbb]);
    }
}
