//! Content checksums.
//!
//! A [`Checksum`] is the lowercase hex SHA-256 of a canonical tabular file.
//! It doubles as the file name of every stored artifact, so parsing rejects
//! anything that is not exactly 64 hex digits.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
  /// Hash `bytes` with SHA-256.
  pub fn of(bytes: &[u8]) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Self::from_digest(hasher)
  }

  /// Finish an incremental hasher.
  pub fn from_digest(hasher: Sha256) -> Self {
    Self(hex::encode(hasher.finalize()))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Checksum {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for Checksum {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let valid = s.len() == 64
      && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if valid {
      Ok(Self(s.to_owned()))
    } else {
      Err(Error::InvalidRequest(format!("malformed checksum {s:?}")))
    }
  }
}

impl<'de> Deserialize<'de> for Checksum {
  fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(d)?;
    raw.parse().map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn known_digest() {
    assert_eq!(
      Checksum::of(b"abc").as_str(),
      "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
  }

  #[test]
  fn parse_rejects_path_like_input() {
    assert!("../../etc/passwd".parse::<Checksum>().is_err());
    assert!("ABC".parse::<Checksum>().is_err());
    let upper = "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";
    assert!(upper.parse::<Checksum>().is_err());
  }

  #[test]
  fn deserialize_validates() {
    let ok: Checksum = serde_json::from_str(
      "\"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad\"",
    )
    .unwrap();
    assert_eq!(ok, Checksum::of(b"abc"));
    assert!(serde_json::from_str::<Checksum>("\"nope\"").is_err());
  }
}
