//! Passive extraction of the TLS Server Name Indication from ClientHello
//! messages.
//!
//! [`handshake`] holds the decoder; [`record`], [`packet`] and [`flow`]
//! get captured traffic into the shape it expects.

pub mod feedback;
pub mod flow;
pub mod handshake;
pub mod packet;
pub mod record;

pub use feedback::{DecodeFeedback, NilDecodeFeedback, TruncationFlag};
pub use handshake::{
  classify, ClientHelloInfo, HandshakeKind, HandshakeRecord, MalformedHandshake, SniOutcome,
};
pub use record::{ContentType, ProtocolVersion, Record, RecordError, RecordHeader};
