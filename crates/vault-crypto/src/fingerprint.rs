//! Short content fingerprints for store files.
//!
//! A fingerprint is the first 8 bytes of the SHA-1 digest of a file's full
//! contents, encoded as URL-safe base64 without padding. The result is 11
//! characters drawn from `[A-Za-z0-9_-]`, so it is safe to embed in a file
//! name on every platform.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha1::{Digest as _, Sha1};

/// Number of digest bytes kept in a fingerprint.
const FINGERPRINT_BYTES: usize = 8;

/// Length of an encoded fingerprint in characters.
pub const FINGERPRINT_LEN: usize = 11;

/// Stream everything from `reader` through SHA-1 and encode the truncated digest.
pub fn fingerprint_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha1::new();
    io::copy(reader, &mut hasher)?;
    let sum = hasher.finalize();
    Ok(URL_SAFE_NO_PAD.encode(&sum[..FINGERPRINT_BYTES]))
}

/// Fingerprint the file at `path`.
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    fingerprint_reader(&mut reader)
}
