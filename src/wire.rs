//! Wire frames for the projector's RS232-over-TCP control protocol.
//!
//! The device speaks a line-oriented ASCII grammar. A request is a single
//! frame of the form:
//!
//! ```text
//! <CR> '*' <key> '=' <arg> '#' <CR>
//! ```
//!
//! where `<arg>` is `?` for a query, a value token for a set (`on`, `7`,
//! `cine`, ...), or `+`/`-` for a stepped adjustment. Examples:
//!
//! ```text
//! \r*pow=?#\r          query power
//! \r*pow=on#\r         power on
//! \r*vol=7#\r          set volume to 7
//! \r*bri=+#\r          step brightness up
//! ```
//!
//! The device answers each request with one CR-terminated line:
//!
//! ```text
//! *POW=ON#             query answer / set acknowledgement
//! *Block item#         command cannot be honored in the current state
//! *Unsupported item#   command not implemented by this model
//! *Illegal format#     request did not parse
//! ```
//!
//! Keys are matched case-insensitively; many firmwares upcase their echoes.
//! Some bridges emit bare CRs between frames, so the decoder skips blank
//! segments. This module owns only the grammar; which keys exist and what
//! their values mean lives in [`crate::commands`].

use std::fmt;
use std::io;
use std::str;

use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// A single request frame, ready to be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    key: &'static str,
    arg: String,
}

impl Request {
    /// A query request (`*key=?#`).
    pub fn query(key: &'static str) -> Request {
        Request {
            key,
            arg: String::from("?"),
        }
    }

    /// A set request (`*key=arg#`).
    pub fn set(key: &'static str, arg: impl Into<String>) -> Request {
        Request {
            key,
            arg: arg.into(),
        }
    }

    /// The key this request addresses.
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// The complete frame, including the leading and trailing CR.
    pub fn frame(&self) -> String {
        format!("\r*{}={}#\r", self.key, self.arg)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*{}={}#", self.key, self.arg)
    }
}

/// A reply line that did not match the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed reply line: {0:?}")]
pub struct ReplyParseError(pub String);

/// One decoded reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `*KEY=VALUE#` — a query answer or a set acknowledgement.
    Value { key: String, value: String },
    /// `*Block item#` — the device cannot honor the command right now.
    Blocked,
    /// `*Unsupported item#` — the device does not implement the command.
    Unsupported,
    /// `*Illegal format#` — the device could not parse the request.
    IllegalFormat,
}

impl Reply {
    /// Parses one reply line (line terminator already stripped).
    pub fn parse(line: &str) -> Result<Reply, ReplyParseError> {
        let body = line
            .strip_prefix('*')
            .and_then(|rest| rest.strip_suffix('#'))
            .ok_or_else(|| ReplyParseError(line.to_string()))?;

        if body.eq_ignore_ascii_case("block item") {
            return Ok(Reply::Blocked);
        }
        if body.eq_ignore_ascii_case("unsupported item") {
            return Ok(Reply::Unsupported);
        }
        if body.eq_ignore_ascii_case("illegal format") {
            return Ok(Reply::IllegalFormat);
        }

        let (key, value) = body
            .split_once('=')
            .ok_or_else(|| ReplyParseError(line.to_string()))?;

        Ok(Reply::Value {
            key: key.to_ascii_lowercase(),
            value: value.to_string(),
        })
    }

    /// The value carried for `key`, if this is a matching value reply.
    pub fn value_for(&self, key: &str) -> Option<&str> {
        match self {
            Reply::Value { key: k, value } if k.eq_ignore_ascii_case(key) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Value { key, value } => write!(f, "{key}={value}"),
            Reply::Blocked => write!(f, "Block item"),
            Reply::Unsupported => write!(f, "Unsupported item"),
            Reply::IllegalFormat => write!(f, "Illegal format"),
        }
    }
}

/// Codec turning the raw byte stream into reply lines and request frames
/// into bytes. Reply semantics are left to the caller; the codec yields the
/// raw line text.
#[derive(Debug, Default)]
pub struct WireCodec;

impl Decoder for WireCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        while let Some(pos) = src.iter().position(|b| *b == b'\r' || *b == b'\n') {
            let segment = src.split_to(pos + 1);
            let line = &segment[..pos];
            if line.is_empty() {
                continue;
            }
            let text = str::from_utf8(line).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "reply line is not valid ASCII")
            })?;
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            return Ok(Some(text.to_string()));
        }
        Ok(None)
    }
}

impl Encoder<Request> for WireCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.extend_from_slice(item.frame().as_bytes());
        Ok(())
    }
}

// =================================================================
// Tests
