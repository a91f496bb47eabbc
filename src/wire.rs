//! Wire-level codec for the GDB Remote Serial Protocol and for the
//! GDB/MI textual protocol.
//!
//! Everything here is pure: no sockets, no state. Framing, escaping,
//! checksumming and the two small parsers (`parse_one_frame`,
//! `parse_mi_command`) all live in this module because they are shared
//! by both the server stub and the client.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{map, opt, recognize},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};
use thiserror::Error;

/// Errors detected while decoding bytes off the wire. Fatal for the
/// connection that produced them (see the server run loop).
#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid hex digit in packet")]
    InvalidHex,
    #[error("checksum mismatch: header said {header:02x}, computed {computed:02x}")]
    BadChecksum { header: u8, computed: u8 },
    #[error("packet frame was truncated")]
    Truncated,
}

/// What `read_packet`-style loops got out of the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedPacket {
    /// A `+` acknowledgement.
    Ack,
    /// A `-` negative acknowledgement.
    Nack,
    /// A normal `$...#cc` packet, already checksum-verified and
    /// unescaped.
    Packet(Vec<u8>),
}

fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Frame `payload` as `$payload#cc`. The caller is responsible for
/// escaping `payload` first if it contains any of `# $ } *` — most RSP
/// commands are pure hex/ASCII and never need it.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(b'$');
    out.extend_from_slice(payload);
    out.push(b'#');
    out.extend_from_slice(format!("{:02x}", checksum(payload)).as_bytes());
    out
}

fn decode_hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Decode a sequence of hex digit pairs into bytes.
pub fn decode_hex(seq: &[u8]) -> Option<Vec<u8>> {
    if !seq.len().is_multiple_of(2) {
        return None;
    }
    seq.chunks(2)
        .map(|pair| Some(decode_hex_digit(pair[0])? << 4 | decode_hex_digit(pair[1])?))
        .collect()
}

/// Decode a big-endian hex string into a number.
pub fn decode_hex_number(seq: &[u8]) -> Option<u64> {
    let mut result: u64 = 0;
    for b in seq {
        result = result.wrapping_mul(16).wrapping_add(decode_hex_digit(*b)? as u64);
    }
    Some(result)
}

/// Try to pull one frame, ack, or nack off the front of `buf`.
/// Returns `(consumed_bytes, packet)`. Leaves `buf` untouched on a
/// partial frame (returns `Ok(None)`).
pub fn parse_one_frame(buf: &[u8]) -> Result<Option<(usize, ReceivedPacket)>, WireError> {
    if buf.is_empty() {
        return Ok(None);
    }
    match buf[0] {
        b'+' => return Ok(Some((1, ReceivedPacket::Ack))),
        b'-' => return Ok(Some((1, ReceivedPacket::Nack))),
        b'$' => {}
        _ => return Ok(None),
    }

    let Some(hash_pos) = buf.iter().position(|b| *b == b'#') else {
        return Ok(None);
    };
    if buf.len() < hash_pos + 3 {
        return Ok(None);
    }

    let payload = &buf[1..hash_pos];
    let header = decode_hex(&buf[hash_pos + 1..hash_pos + 3]).ok_or(WireError::InvalidHex)?[0];
    let computed = checksum(payload);
    if header != computed {
        return Err(WireError::BadChecksum { header, computed });
    }
    Ok(Some((hash_pos + 3, ReceivedPacket::Packet(payload.to_vec()))))
}

/// Escape the four reserved bytes `# $ } *` as `}` followed by the
/// original byte XOR 0x20.
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        match b {
            b'#' | b'$' | b'}' | b'*' => {
                out.push(b'}');
                out.push(b ^ 0x20);
            }
            _ => out.push(b),
        }
    }
    out
}

/// Reverse of [`escape`].
pub fn unescape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter().copied();
    while let Some(b) = iter.next() {
        if b == b'}' {
            if let Some(next) = iter.next() {
                out.push(next ^ 0x20);
            }
        } else {
            out.push(b);
        }
    }
    out
}

/// Escape one character the way GDB's `ui_file::printchar` does,
/// appending to `out`. `quoter`, when set, is also backslash-escaped
/// (used for the surrounding `"`).
fn mi_escape_char(out: &mut String, c: u8, quoter: Option<u8>) {
    let needs_escape = c < 0x20 || (0x7F..0xA0).contains(&c);
    if needs_escape {
        out.push('\\');
        match c {
            b'\n' => out.push('n'),
            0x08 => out.push('b'),
            b'\t' => out.push('t'),
            0x0C => out.push('f'),
            b'\r' => out.push('r'),
            0x1B => out.push('e'),
            0x07 => out.push('a'),
            _ => {
                out.push((b'0' + ((c >> 6) & 0x7)) as char);
                out.push((b'0' + ((c >> 3) & 0x7)) as char);
                out.push((b'0' + (c & 0x7)) as char);
            }
        }
    } else {
        if let Some(q) = quoter {
            if c == b'\\' || c == q {
                out.push('\\');
            }
        }
        out.push(c as char);
    }
}

/// Render `text` as a double-quoted MI string, escaping control
/// characters as GDB does (`\n \b \t \f \r \e \a`, otherwise three
/// octal digits).
pub fn mi_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for &b in text.as_bytes() {
        mi_escape_char(&mut out, b, Some(b'"'));
    }
    out.push('"');
    out
}

/// A parsed GDB/MI command line: `[token][-]name[,params] args...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiCommand {
    pub token: Option<u64>,
    pub name: String,
    pub params: Vec<String>,
    pub args: Vec<String>,
}

impl fmt::Display for MiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(t) = self.token {
            write!(f, "{}", t)?;
        }
        write!(f, "-{}", self.name)?;
        for p in &self.params {
            write!(f, ",{}", p)?;
        }
        for a in &self.args {
            write!(f, " {}", a)?;
        }
        Ok(())
    }
}

fn mi_token(input: &[u8]) -> IResult<&[u8], Option<u64>> {
    map(
        opt(take_while1(|c: u8| c.is_ascii_digit())),
        |digits: Option<&[u8]>| digits.map(|d| std::str::from_utf8(d).unwrap().parse().unwrap()),
    )(input)
}

fn mi_ident(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|c: u8| {
        c.is_ascii_alphanumeric() || b"/_-*.:".contains(&c)
    })(input)
}

fn mi_quoted(input: &[u8]) -> IResult<&[u8], &[u8]> {
    recognize(delimited(
        char('"'),
        many0(alt((
            recognize(preceded(char('\\'), nom::bytes::complete::take(1usize))),
            nom::bytes::complete::is_not("\"\\"),
        ))),
        char('"'),
    ))(input)
}

fn mi_token_item(input: &[u8]) -> IResult<&[u8], &[u8]> {
    alt((mi_quoted, mi_ident))(input)
}

/// Parse one GDB/MI command line. Returns `None` for lines that don't
/// match `[token][-]name( (ident|"..."))*`.
pub fn parse_mi_command(line: &str) -> Option<MiCommand> {
    let line = line.trim_end_matches(['\r', '\n']);
    let bytes = line.as_bytes();

    let (rest, token) = mi_token(bytes).ok()?;
    let rest = rest.strip_prefix(b"-").unwrap_or(rest);
    let (rest, items) = nom::multi::separated_list1(char(' '), mi_token_item)(rest).ok()?;
    if !rest.is_empty() {
        return None;
    }
    let mut items = items.into_iter();
    let head = std::str::from_utf8(items.next()?).ok()?;
    let mut parts = head.split(',');
    let name = parts.next()?.to_string();
    let params = parts.map(|s| s.to_string()).collect();
    let args = items
        .map(|b| std::str::from_utf8(b).unwrap().to_string())
        .collect();

    Some(MiCommand { token, name, params, args })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let framed = encode(b"qTfP");
        assert_eq!(framed, b"$qTfP#7b");
        let (consumed, pkt) = parse_one_frame(&framed).unwrap().unwrap();
        assert_eq!(consumed, framed.len());
        assert_eq!(pkt, ReceivedPacket::Packet(b"qTfP".to_vec()));
    }

    #[test]
    fn escape_unescape_round_trip() {
        let data = b"a#b$c}d*e";
        let escaped = escape(data);
        assert_eq!(unescape(&escaped), data);
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let mut framed = encode(b"OK");
        let len = framed.len();
        framed[len - 1] = b'0';
        framed[len - 2] = b'0';
        assert!(matches!(
            parse_one_frame(&framed),
            Err(WireError::BadChecksum { .. })
        ));
    }

    #[test]
    fn partial_frame_is_not_consumed() {
        let framed = encode(b"OK");
        assert_eq!(parse_one_frame(&framed[..2]).unwrap(), None);
    }

    #[test]
    fn ack_and_nack() {
        assert_eq!(
            parse_one_frame(b"+").unwrap(),
            Some((1, ReceivedPacket::Ack))
        );
        assert_eq!(
            parse_one_frame(b"-").unwrap(),
            Some((1, ReceivedPacket::Nack))
        );
    }

    #[test]
    fn mi_escape_basic() {
        assert_eq!(mi_escape("hi"), "\"hi\"");
        assert_eq!(mi_escape("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn mi_escape_control_chars() {
        assert_eq!(mi_escape("x\ny"), "\"x\\ny\"");
        assert_eq!(mi_escape("x\u{1}y"), "\"x\\001y\"");
    }

    #[test]
    fn parse_mi_command_basic() {
        let cmd = parse_mi_command("5-break-insert -f main\r\n").unwrap();
        assert_eq!(cmd.token, Some(5));
        assert_eq!(cmd.name, "break-insert");
        assert_eq!(cmd.args, vec!["-f", "main"]);
    }

    #[test]
    fn parse_mi_command_quoted() {
        let cmd = parse_mi_command("7-var-create - * \"x\"\n").unwrap();
        assert_eq!(cmd.name, "var-create");
        assert_eq!(cmd.args, vec!["-", "*", "\"x\""]);
    }

    #[test]
    fn parse_mi_command_rejects_garbage() {
        assert!(parse_mi_command("\n").is_none());
    }
}
