use std::io::{self, Read};

use crate::{Hasher, Result, VerifyError};

/// Streaming reader that hashes data as it passes through.
pub struct VerifiedReader<R, H> {
    reader:     R,
    hasher:     H,
    bytes_read: u64,
}

impl<R, H> VerifiedReader<R, H> {
    pub fn new(reader: R, hasher: H) -> Self {
        Self {
            reader,
            hasher,
            bytes_read: 0,
        }
    }

    /// Number of bytes that have passed through the reader so far.
    pub fn bytes_read(&self) -> u64 { self.bytes_read }
}

impl<R: Read, H: Hasher> Read for VerifiedReader<R, H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
            self.bytes_read += n as u64;
        }
        Ok(n)
    }
}

impl<R, H: Hasher> VerifiedReader<R, H> {
    /// Consume the reader and return the digest together with the byte count.
    pub fn into_digest(self) -> (Vec<u8>, u64) { (self.hasher.finalize(), self.bytes_read) }

    /// Finalize verification against an expected digest.
    /// Returns the number of bytes read on success.
    pub fn finish(self, expected: &[u8]) -> Result<u64> {
        let (actual, bytes_read) = self.into_digest();
        if actual == expected {
            Ok(bytes_read)
        } else {
            Err(VerifyError::Mismatch {
                expected: expected.to_vec(),
                actual,
            })
        }
    }
}

#[cfg(all(test, feature = "sha256"))]
mod tests {
    use super::*;
    use crate::Sha256Hasher;
    use std::io::Cursor;

    #[test]
    fn test_verified_reader_success() {
        let data = b"test data for verification";
        let expected = Sha256Hasher::digest(data);

        let mut verified = VerifiedReader::new(Cursor::new(data), Sha256Hasher::new());
        let mut sink = Vec::new();
        io::copy(&mut verified, &mut sink).unwrap();

        assert_eq!(sink, data);
        assert_eq!(verified.finish(&expected).unwrap(), data.len() as u64);
    }

    #[test]
    fn test_verified_reader_hash_mismatch() {
        let mut verified = VerifiedReader::new(Cursor::new(b"test data"), Sha256Hasher::new());
        let mut sink = Vec::new();
        verified.read_to_end(&mut sink).unwrap();

        let result = verified.finish(&[0; 32]);
        match result {
            Err(VerifyError::Mismatch { expected, actual }) => {
                assert_eq!(expected, vec![0; 32]);
                assert_ne!(actual, vec![0; 32]);
            }
            other => panic!("expected Mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_bytes_read_tracks_partial_reads() {
        let mut verified = VerifiedReader::new(Cursor::new(vec![7u8; 100]), Sha256Hasher::new());
        let mut buf = [0u8; 40];
        verified.read_exact(&mut buf).unwrap();
        assert_eq!(verified.bytes_read(), 40);
    }
}
