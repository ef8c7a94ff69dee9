pub mod digest;

pub use digest::Blake3Digester;

use std::fmt;
use std::io::{self, Read};

pub const DIGEST_LENGTH: usize = 32;

/// Fixed-length content fingerprint. Equality of digests is the only
/// criterion for "same file".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentDigest(pub [u8; DIGEST_LENGTH]);

impl ContentDigest {
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub trait ContentDigester: Send + Sync {
    fn digest(&self, bytes: &[u8]) -> ContentDigest;

    /// Streaming form used for whole files so videos never have to be held
    /// in memory at once.
    fn digest_reader(&self, reader: &mut dyn Read) -> io::Result<ContentDigest> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(self.digest(&bytes))
    }
}
