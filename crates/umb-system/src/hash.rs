use serde::Serialize;
use sha2::{Digest, Sha256};
use umb_core::errors::{ErrorInfo, UmbError};

/// SHA-256 of the JSON encoding of `value`, as lower-case hex.
///
/// Maps are expected to be `BTreeMap`s so the encoding is key-ordered.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, UmbError> {
    let mut hasher = Sha256::new();
    serde_json::to_writer(&mut HashWriter(&mut hasher), value)
        .map_err(|err| UmbError::Serde(ErrorInfo::new("hash-serialize", err.to_string())))?;
    Ok(format!("{:x}", hasher.finalize()))
}

struct HashWriter<'a>(&'a mut Sha256);

impl std::io::Write for HashWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
