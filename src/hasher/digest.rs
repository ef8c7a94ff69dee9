use super::{ContentDigest, ContentDigester};
use std::io::{self, Read};

/// BLAKE3 content digests.
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Digester;

impl ContentDigester for Blake3Digester {
    fn digest(&self, bytes: &[u8]) -> ContentDigest {
        ContentDigest(*blake3::hash(bytes).as_bytes())
    }

    fn digest_reader(&self, reader: &mut dyn Read) -> io::Result<ContentDigest> {
        let mut hasher = blake3::Hasher::new();
        io::copy(reader, &mut hasher)?;
        Ok(ContentDigest(*hasher.finalize().as_bytes()))
    }
}
