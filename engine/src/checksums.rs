//! Digest algorithms and digest values.
//!
//! This module provides:
//! - The supported cryptographic algorithms (MD5, SHA-1, SHA-256, SHA-512, BLAKE3)
//! - An incremental accumulator trait over those algorithms
//! - `DigestValue`, the raw digest bytes tagged with their algorithm

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5 (broken, kept for interoperability with old manifests)
    Md5,
    /// SHA-1 (160-bit)
    Sha1,
    /// SHA-256 (256-bit)
    #[default]
    Sha256,
    /// SHA-512 (512-bit)
    Sha512,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl ChecksumAlgorithm {
    /// All algorithms, in the order they are listed to users.
    pub const ALL: [ChecksumAlgorithm; 5] = [
        Self::Md5,
        Self::Sha1,
        Self::Sha256,
        Self::Sha512,
        Self::Blake3,
    ];

    /// Length in bytes of a finalized digest.
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha512 => 64,
            Self::Blake3 => 32,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha1 => write!(f, "sha1"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Sha512 => write!(f, "sha512"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

/// Returned when an algorithm name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown digest algorithm '{0}' (expected md5, sha1, sha256, sha512 or blake3)")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for ChecksumAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            "blake3" => Ok(Self::Blake3),
            _ => Err(UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Errors from decoding a textual digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestParseError {
    #[error("digest is not valid hexadecimal: {0}")]
    InvalidHex(String),

    #[error("{algorithm} digest must be {expected} bytes, got {actual}")]
    WrongLength {
        algorithm: ChecksumAlgorithm,
        expected: usize,
        actual: usize,
    },
}

/// A finalized digest.
///
/// Two values are equal only when both the algorithm and the raw bytes match;
/// the hex text is derived on demand and never compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DigestValue {
    algorithm: ChecksumAlgorithm,
    bytes: Vec<u8>,
}

impl DigestValue {
    /// Create a new digest value from raw bytes
    pub fn new(algorithm: ChecksumAlgorithm, bytes: Vec<u8>) -> Self {
        DigestValue { algorithm, bytes }
    }

    /// Decode a hex digest. Upper and lower case are both accepted.
    pub fn from_hex(algorithm: ChecksumAlgorithm, text: &str) -> Result<Self, DigestParseError> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| DigestParseError::InvalidHex(e.to_string()))?;
        if bytes.len() != algorithm.digest_len() {
            return Err(DigestParseError::WrongLength {
                algorithm,
                expected: algorithm.digest_len(),
                actual: bytes.len(),
            });
        }
        Ok(DigestValue { algorithm, bytes })
    }

    /// Get the algorithm
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Get the raw digest bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Display for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for DigestValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// An incremental digest accumulator.
///
/// Chunks must be fed in file order; the result depends on byte order but not
/// on how the bytes were split into chunks.
pub trait ChecksumHasher: Send {
    /// Update the hasher with new data
    fn update(&mut self, data: &[u8]);

    /// Finalize and return the digest value
    fn finalize(self: Box<Self>) -> DigestValue;
}

/// MD5 hasher (backed by md5 crate)
struct Md5Hasher {
    context: md5::Context,
}

impl ChecksumHasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn finalize(self: Box<Self>) -> DigestValue {
        let digest = self.context.compute();
        DigestValue::new(ChecksumAlgorithm::Md5, digest.0.to_vec())
    }
}

/// Any RustCrypto digest (SHA-1, SHA-2 family)
struct RustCryptoHasher<D> {
    algorithm: ChecksumAlgorithm,
    hasher: D,
}

impl<D> ChecksumHasher for RustCryptoHasher<D>
where
    D: sha2::Digest + Send,
{
    fn update(&mut self, data: &[u8]) {
        sha2::Digest::update(&mut self.hasher, data);
    }

    fn finalize(self: Box<Self>) -> DigestValue {
        let algorithm = self.algorithm;
        let digest = sha2::Digest::finalize(self.hasher);
        DigestValue::new(algorithm, digest.to_vec())
    }
}

/// BLAKE3 hasher (backed by blake3 crate)
struct Blake3Hasher {
    hasher: blake3::Hasher,
}

impl ChecksumHasher for Blake3Hasher {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> DigestValue {
        let digest = self.hasher.finalize();
        DigestValue::new(ChecksumAlgorithm::Blake3, digest.as_bytes().to_vec())
    }
}

/// Create a new hasher for the given algorithm
pub fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Md5 => Box::new(Md5Hasher {
            context: md5::Context::new(),
        }),
        ChecksumAlgorithm::Sha1 => Box::new(RustCryptoHasher {
            algorithm,
            hasher: <sha1::Sha1 as sha2::Digest>::new(),
        }),
        ChecksumAlgorithm::Sha256 => Box::new(RustCryptoHasher {
            algorithm,
            hasher: <sha2::Sha256 as sha2::Digest>::new(),
        }),
        ChecksumAlgorithm::Sha512 => Box::new(RustCryptoHasher {
            algorithm,
            hasher: <sha2::Sha512 as sha2::Digest>::new(),
        }),
        ChecksumAlgorithm::Blake3 => Box::new(Blake3Hasher {
            hasher: blake3::Hasher::new(),
        }),
    }
}

/// Digest an in-memory buffer in one call.
pub fn digest_bytes(algorithm: ChecksumAlgorithm, data: &[u8]) -> DigestValue {
    let mut hasher = create_hasher(algorithm);
    hasher.update(data);
    hasher.finalize()
}
