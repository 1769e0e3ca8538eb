//! SHA-256 content verification.
//!
//! Blobs are hashed while they stream to disk, so verification costs no
//! second pass over the archive.

use std::io::{self, Read, Write};

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::Digest;
use sha2::{Digest as _, Sha256};

/// Writer adapter that hashes and counts everything written through it.
#[derive(Debug)]
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Returns the number of bytes written so far.
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Flushes the inner writer and returns it with the digest of all bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn finish(mut self) -> io::Result<(W, Digest)> {
        self.inner.flush()?;
        let hex = format!("{:x}", self.hasher.finalize());
        let digest = Digest::sha256(&hex)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        Ok((self.inner, digest))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Checks that `actual` matches `expected`.
///
/// # Errors
///
/// Returns `BurrowError::HashMismatch` if the digests differ, or
/// `BurrowError::Config` if `expected` uses an algorithm other than SHA-256.
pub fn validate_digest(resource: &str, expected: &Digest, actual: &Digest) -> Result<()> {
    if !expected.is_sha256() {
        return Err(BurrowError::Config {
            message: format!(
                "cannot verify {resource}: unsupported digest algorithm {}",
                expected.algorithm()
            ),
        });
    }
    if expected != actual {
        return Err(BurrowError::HashMismatch {
            resource: resource.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Reads `reader` to the end and returns its SHA-256 digest.
///
/// # Errors
///
/// Returns the underlying read error.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<Digest> {
    let mut writer = HashingWriter::new(io::sink());
    let _ = io::copy(&mut reader, &mut writer)?;
    writer.finish().map(|(_, digest)| digest)
}
