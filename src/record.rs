use std::fmt;

use byteorder::{ByteOrder, NetworkEndian};
use thiserror::Error;

use crate::feedback::DecodeFeedback;
use crate::handshake::HandshakeRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
  ChangeCipherSpec,
  Alert,
  Handshake,
  ApplicationData,
  Heartbeat, // RFC 6520
  Unknown(u8),
}

impl From<u8> for ContentType {
  fn from(value: u8) -> Self {
    match value {
      20 => ContentType::ChangeCipherSpec,
      21 => ContentType::Alert,
      22 => ContentType::Handshake,
      23 => ContentType::ApplicationData,
      24 => ContentType::Heartbeat,
      n => ContentType::Unknown(n),
    }
  }
}

impl From<ContentType> for u8 {
  fn from(value: ContentType) -> Self {
    match value {
      ContentType::ChangeCipherSpec => 20,
      ContentType::Alert => 21,
      ContentType::Handshake => 22,
      ContentType::ApplicationData => 23,
      ContentType::Heartbeat => 24,
      ContentType::Unknown(n) => n,
    }
  }
}

/// Record layer version, kept as it appeared on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolVersion(pub u16);

impl fmt::Display for ProtocolVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.0 {
      0x0300 => f.write_str("SSL 3.0"),
      0x0301 => f.write_str("TLS 1.0"),
      0x0302 => f.write_str("TLS 1.1"),
      // TLS 1.3 keeps 1.2 on the record layer
      0x0303 => f.write_str("TLS 1.2"),
      v => write!(f, "{:#06x}", v),
    }
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
  #[error("need {0} more bytes")]
  NeedMoreData(usize),
  #[error("fragment length {0} exceeds the protocol limit")]
  FragmentTooLong(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
  pub content_type: ContentType,
  pub version: ProtocolVersion,
  pub length: u16,
}

impl RecordHeader {
  pub const SIZE: usize = 5;
  /// 2^14 plus the expansion allowed for protected records.
  pub const MAX_FRAGMENT_LEN: u16 = (1 << 14) + 2048;

  pub fn decode(data: &[u8]) -> Result<Self, RecordError> {
    if data.len() < Self::SIZE {
      return Err(RecordError::NeedMoreData(Self::SIZE - data.len()));
    }
    let length = NetworkEndian::read_u16(&data[3..5]);
    if length > Self::MAX_FRAGMENT_LEN {
      return Err(RecordError::FragmentTooLong(length));
    }
    Ok(Self {
      content_type: data[0].into(),
      version: ProtocolVersion(NetworkEndian::read_u16(&data[1..3])),
      length,
    })
  }

  /// Size of the whole record on the wire.
  pub fn encoded_len(&self) -> usize {
    Self::SIZE + self.length as usize
  }
}

pub struct Record<'a> {
  pub header: RecordHeader,
  pub fragment: &'a [u8],
}

impl<'a> Record<'a> {
  /// Parse one complete record from the start of `data`. Trailing bytes
  /// belong to the following records and are left alone.
  pub fn parse(data: &'a [u8]) -> Result<Self, RecordError> {
    let header = RecordHeader::decode(data)?;
    let end = header.encoded_len();
    if data.len() < end {
      return Err(RecordError::NeedMoreData(end - data.len()));
    }
    Ok(Self {
      header,
      fragment: &data[RecordHeader::SIZE..end],
    })
  }

  pub fn decode_handshake(
    &self,
    feedback: &mut dyn DecodeFeedback,
  ) -> Option<HandshakeRecord> {
    if self.header.content_type != ContentType::Handshake {
      return None;
    }
    Some(HandshakeRecord::decode(self.header, self.fragment, feedback))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::feedback::NilDecodeFeedback;
  use crate::handshake::HandshakeKind;

  #[test]
  fn header() {
    let h = RecordHeader::decode(&[0x16, 0x03, 0x01, 0x00, 0x65]).unwrap();
    assert_eq!(h.content_type, ContentType::Handshake);
    assert_eq!(h.version, ProtocolVersion(0x0301));
    assert_eq!(h.version.to_string(), "TLS 1.0");
    assert_eq!(h.length, 101);
    assert_eq!(h.encoded_len(), 106);
  }

  #[test]
  fn short_header() {
    assert_eq!(
      RecordHeader::decode(&[0x16, 0x03]),
      Err(RecordError::NeedMoreData(3)),
    );
  }

  #[test]
  fn oversized_fragment() {
    assert_eq!(
      RecordHeader::decode(&[0x16, 0x03, 0x03, 0xff, 0xff]),
      Err(RecordError::FragmentTooLong(0xffff)),
    );
  }

  #[test]
  fn unknown_content_type_round_trips() {
    let h = RecordHeader::decode(&[0x42, 0x7f, 0x00, 0x00, 0x00]).unwrap();
    assert_eq!(h.content_type, ContentType::Unknown(0x42));
    assert_eq!(u8::from(h.content_type), 0x42);
    assert_eq!(h.version.to_string(), "0x7f00");
  }

  #[test]
  fn incomplete_fragment() {
    let data = [0x16, 0x03, 0x01, 0x00, 0x04, 0x01, 0x00];
    assert!(matches!(Record::parse(&data), Err(RecordError::NeedMoreData(2))));
  }

  #[test]
  fn trailing_bytes_are_not_part_of_the_record() {
    let data = [0x17, 0x03, 0x03, 0x00, 0x02, 0xaa, 0xbb, 0x16, 0x03];
    let record = Record::parse(&data).unwrap();
    assert_eq!(record.fragment, &[0xaa, 0xbb]);
    assert!(record.decode_handshake(&mut NilDecodeFeedback).is_none());
  }

  #[test]
  fn handshake_dispatch() {
    // ServerHello type byte: decoded, but not classified
    let data = [0x16, 0x03, 0x03, 0x00, 0x01, 0x02];
    let record = Record::parse(&data).unwrap();
    let hs = record.decode_handshake(&mut NilDecodeFeedback).unwrap();
    assert_eq!(hs.header, record.header);
    assert_eq!(hs.hello.kind, HandshakeKind::Unknown);
  }
}
