//! Error types for `academy-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("unknown {kind} value: {value:?}")]
  UnknownVariant { kind: &'static str, value: String },

  #[error("unrecognised timestamp: {0}")]
  InvalidTimestamp(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Parse a stored string form into one of the `strum`-derived enums.
pub fn parse_variant<T: std::str::FromStr>(
  kind: &'static str,
  value: &str,
) -> Result<T> {
  value.parse().map_err(|_| Error::UnknownVariant {
    kind,
    value: value.to_owned(),
  })
}
