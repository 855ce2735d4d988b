use std::collections::HashMap;

use crate::feedback::DecodeFeedback;
use crate::handshake::{classify, SniOutcome};
use crate::record::{ContentType, Record, RecordError, RecordHeader};

/// Client bytes kept while waiting for the first record to complete.
pub const MAX_PENDING: usize = RecordHeader::SIZE + RecordHeader::MAX_FRAGMENT_LEN as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
  Pending,
  Tls(SniOutcome),
  NotTls,
}

pub struct Flow {
  pending: Vec<u8>,
  class: Classification,
  sent: usize,
  received: usize,
  last: bool,
}

impl Default for Flow {
  fn default() -> Self {
    Self::new()
  }
}

impl Flow {
  pub fn new() -> Self {
    Self {
      pending: Vec::new(),
      class: Classification::Pending,
      sent: 0,
      received: 0,
      last: false,
    }
  }

  /// Account for one segment. Returns `true` when this segment finished
  /// the classification of the flow.
  pub fn incr(
    &mut self,
    data: &[u8],
    is_sent: bool,
    last: bool,
    feedback: &mut dyn DecodeFeedback,
  ) -> bool {
    self.last = self.last || last;
    if !is_sent {
      self.received += data.len();
      return false;
    }
    self.sent += data.len();
    if self.class != Classification::Pending || data.is_empty() {
      return false;
    }

    self.pending.extend_from_slice(data);
    self.class = match Record::parse(&self.pending) {
      Ok(record) if record.header.content_type == ContentType::Handshake => {
        let outcome = classify(record.fragment);
        if matches!(outcome, SniOutcome::Malformed(_)) {
          feedback.set_truncated();
        }
        Classification::Tls(outcome)
      }
      Ok(_) => Classification::NotTls,
      Err(RecordError::NeedMoreData(_)) => {
        match RecordHeader::decode(&self.pending) {
          Ok(header) if header.content_type != ContentType::Handshake => Classification::NotTls,
          _ if self.pending.len() >= MAX_PENDING => Classification::NotTls,
          _ => Classification::Pending,
        }
      }
      Err(RecordError::FragmentTooLong(_)) => Classification::NotTls,
    };

    if self.class == Classification::Pending {
      false
    } else {
      self.pending = Vec::new();
      true
    }
  }

  pub fn classification(&self) -> &Classification {
    &self.class
  }

  pub fn server_name(&self) -> Option<&str> {
    match &self.class {
      Classification::Tls(outcome) => outcome.server_name(),
      _ => None,
    }
  }

  pub fn sent(&self) -> usize {
    self.sent
  }

  pub fn received(&self) -> usize {
    self.received
  }

  /// FIN or RST seen in either direction.
  pub fn is_last(&self) -> bool {
    self.last
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostStat {
  pub connections: usize,
  pub sent: usize,
  pub received: usize,
}

/// Per-hostname totals of finished flows. Flows without a server name are
/// counted under the empty string.
#[derive(Debug, Default)]
pub struct Summary {
  hosts: HashMap<String, HostStat>,
}

impl Summary {
  pub fn add(&mut self, flow: &Flow) {
    if !matches!(flow.classification(), Classification::Tls(_)) {
      return;
    }
    let name = flow.server_name().unwrap_or_default();
    let stat = self.hosts.entry(String::from(name)).or_default();
    stat.connections += 1;
    stat.sent += flow.sent();
    stat.received += flow.received();
  }

  /// Hosts ordered by bytes received, largest first.
  pub fn sorted(&self) -> Vec<(&str, HostStat)> {
    let mut v: Vec<_> = self.hosts.iter()
      .map(|(k, v)| (k.as_str(), *v))
      .collect();
    v.sort_by(|a, b| b.1.received.cmp(&a.1.received).then(a.0.cmp(b.0)));
    v
  }

  pub fn is_empty(&self) -> bool {
    self.hosts.is_empty()
  }
}
