//! ClientHello decoding, limited to the `server_name` extension.
//!
//! The walk skips every ClientHello field it does not need and reads the
//! first entry of the first `server_name` extension. Input is untrusted;
//! every read goes through [`Reader::take`], which fails instead of running
//! past the end of its buffer.

use byteorder::{ByteOrder, NetworkEndian};
use thiserror::Error;
use tracing::debug;

use crate::feedback::DecodeFeedback;
use crate::record::RecordHeader;

const CLIENT_HELLO: u8 = 0x01;
const EXT_SERVER_NAME: u16 = 0x0000;
const NAME_TYPE_HOST_NAME: u8 = 0x00;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeKind {
  #[default]
  Unknown,
  ClientHello,
  /// Never produced by [`HandshakeRecord::decode`].
  ServerHello,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedHandshake {
  #[error("{field} truncated at offset {offset}: need {needed} bytes, {available} left")]
  Truncated {
    field: &'static str,
    offset: usize,
    needed: usize,
    available: usize,
  },
}

/// What a handshake body says about the server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SniOutcome {
  /// Not a ClientHello.
  NotApplicable,
  /// A ClientHello without a usable `host_name` entry.
  NoSni,
  Sni(String),
  /// A ClientHello that ended before one of its fields.
  Malformed(MalformedHandshake),
}

impl SniOutcome {
  pub fn server_name(&self) -> Option<&str> {
    match self {
      SniOutcome::Sni(name) => Some(name),
      _ => None,
    }
  }

  pub fn is_client_hello(&self) -> bool {
    !matches!(self, SniOutcome::NotApplicable)
  }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientHelloInfo {
  pub kind: HandshakeKind,
  /// Empty unless `kind` is `ClientHello` and a `host_name` was found.
  pub server_name: String,
}

impl From<SniOutcome> for ClientHelloInfo {
  fn from(outcome: SniOutcome) -> Self {
    match outcome {
      SniOutcome::NotApplicable => Self::default(),
      SniOutcome::Sni(server_name) => Self {
        kind: HandshakeKind::ClientHello,
        server_name,
      },
      SniOutcome::NoSni | SniOutcome::Malformed(_) => Self {
        kind: HandshakeKind::ClientHello,
        server_name: String::new(),
      },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRecord {
  pub header: RecordHeader,
  pub hello: ClientHelloInfo,
}

impl HandshakeRecord {
  /// Decode the body of a handshake record.
  ///
  /// Never fails: input cut short anywhere yields a ClientHello without a
  /// server name, and is reported through `feedback`.
  pub fn decode(
    header: RecordHeader,
    body: &[u8],
    feedback: &mut dyn DecodeFeedback,
  ) -> Self {
    let outcome = classify(body);
    if let SniOutcome::Malformed(e) = &outcome {
      debug!(error = %e, "malformed ClientHello");
      feedback.set_truncated();
    }
    Self {
      header,
      hello: outcome.into(),
    }
  }

  pub fn server_name(&self) -> Option<&str> {
    if self.hello.server_name.is_empty() {
      None
    } else {
      Some(&self.hello.server_name)
    }
  }
}

/// Look for the server name in a handshake body (the bytes after the
/// record header).
///
/// Only the first entry of the `server_name` list is considered: if it is
/// not a `host_name`, the hello counts as having no SNI even when later
/// entries or extensions would have one.
pub fn classify(body: &[u8]) -> SniOutcome {
  if body.first() != Some(&CLIENT_HELLO) {
    return SniOutcome::NotApplicable;
  }
  match find_server_name(body) {
    Ok(Some(name)) => SniOutcome::Sni(name),
    Ok(None) => SniOutcome::NoSni,
    Err(e) => SniOutcome::Malformed(e),
  }
}

fn find_server_name(body: &[u8]) -> Result<Option<String>, MalformedHandshake> {
  let mut r = Reader::new(body);
  r.skip(1, "handshake type")?;
  r.skip(3, "handshake length")?;
  r.skip(2, "client version")?;
  r.skip(32, "random")?;
  let n = r.read_u8("session id length")?;
  r.skip(n as usize, "session id")?;
  let n = r.read_u16("cipher suites length")?;
  r.skip(n as usize, "cipher suites")?;
  let n = r.read_u8("compression methods length")?;
  r.skip(n as usize, "compression methods")?;

  // hellos from before RFC 3546 end here
  if r.is_empty() {
    return Ok(None);
  }
  // the extensions block runs to the end of the body anyway
  r.skip(2, "extensions length")?;

  while !r.is_empty() {
    let ext_type = r.read_u16("extension type")?;
    let mut data = r.read_u16_prefixed("extension data")?;
    if ext_type != EXT_SERVER_NAME {
      continue;
    }

    data.skip(2, "server name list length")?;
    let name_type = data.read_u8("server name type")?;
    if name_type != NAME_TYPE_HOST_NAME {
      debug!(name_type, "server name is not a host_name");
      return Ok(None);
    }
    let name = data.read_u16_prefixed("host name")?.rest();
    // an empty host_name does not end the scan
    if !name.is_empty() {
      return Ok(Some(String::from_utf8_lossy(name).into_owned()));
    }
  }

  Ok(None)
}

struct Reader<'a> {
  data: &'a [u8],
  pos: usize,
  /// Offset of `data` inside the handshake body, for error reports.
  base: usize,
}

impl<'a> Reader<'a> {
  fn new(data: &'a [u8]) -> Self {
    Self { data, pos: 0, base: 0 }
  }

  fn is_empty(&self) -> bool {
    self.pos >= self.data.len()
  }

  fn rest(&self) -> &'a [u8] {
    self.data.get(self.pos..).unwrap_or_default()
  }

  fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], MalformedHandshake> {
    let Some(bytes) = self.data.get(self.pos..self.pos + n) else {
      return Err(MalformedHandshake::Truncated {
        field,
        offset: self.base + self.pos,
        needed: n,
        available: self.rest().len(),
      });
    };
    self.pos += n;
    Ok(bytes)
  }

  fn skip(&mut self, n: usize, field: &'static str) -> Result<(), MalformedHandshake> {
    self.take(n, field).map(|_| ())
  }

  fn read_u8(&mut self, field: &'static str) -> Result<u8, MalformedHandshake> {
    Ok(self.take(1, field)?[0])
  }

  fn read_u16(&mut self, field: &'static str) -> Result<u16, MalformedHandshake> {
    Ok(NetworkEndian::read_u16(self.take(2, field)?))
  }

  /// Read a 2-byte length and return a reader over that many bytes.
  fn read_u16_prefixed(&mut self, field: &'static str) -> Result<Reader<'a>, MalformedHandshake> {
    let len = self.read_u16(field)? as usize;
    let base = self.base + self.pos;
    let data = self.take(len, field)?;
    Ok(Reader { data, pos: 0, base })
  }
}
