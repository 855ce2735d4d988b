/// Sink through which decoders report problems with their input without
/// failing the decode itself.
pub trait DecodeFeedback {
  /// The input ended before a field it announced.
  fn set_truncated(&mut self);
}

/// Drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NilDecodeFeedback;

impl DecodeFeedback for NilDecodeFeedback {
  fn set_truncated(&mut self) { }
}

/// Remembers whether truncation was reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct TruncationFlag {
  truncated: bool,
}

impl TruncationFlag {
  pub fn is_truncated(&self) -> bool {
    self.truncated
  }
}

impl DecodeFeedback for TruncationFlag {
  fn set_truncated(&mut self) {
    self.truncated = true;
  }
}
