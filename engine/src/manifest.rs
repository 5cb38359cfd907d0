//! Digest manifest files.
//!
//! A manifest is UTF-8 text with one record per line:
//!
//! ```text
//! ; sumcheck manifest
//! ; algorithm: sha256
//! ; generated: 2026-10-19T10:00:00+00:00
//!
//! 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824 docs/hello.txt
//! ```
//!
//! - Lines starting with `;` are comments and blank lines are ignored.
//! - `; algorithm: <name>` must come before the first record; without it the
//!   caller's default algorithm applies.
//! - A record is the hex digest, one space, then the path to end of line.
//!   Paths may contain spaces but not line breaks.
//! - Records are written sorted by path. Hex is written in lowercase and read
//!   in either case.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::checksums::{ChecksumAlgorithm, DigestValue, UnknownAlgorithm};
use crate::error::ManifestError;
use crate::model::{DigestRecord, ExpectedDigestIndex};

const TITLE: &str = "; sumcheck manifest";
const ALGORITHM_PREFIX: &str = "; algorithm:";

/// An in-memory manifest: path -> digest for a single algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    algorithm: ChecksumAlgorithm,
    entries: BTreeMap<String, DigestValue>,
}

impl Manifest {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Manifest {
            algorithm,
            entries: BTreeMap::new(),
        }
    }

    /// Build a manifest from the records of a GENERATE run.
    pub fn from_records(
        algorithm: ChecksumAlgorithm,
        records: &[DigestRecord],
    ) -> Result<Self, ManifestError> {
        let mut manifest = Manifest::new(algorithm);
        for record in records {
            manifest.insert(record.file.key.clone(), record.digest.clone())?;
        }
        Ok(manifest)
    }

    /// Add one entry. The key must be storable on a single line and unique.
    pub fn insert(&mut self, key: String, digest: DigestValue) -> Result<(), ManifestError> {
        if key.is_empty() || key.contains(|c: char| c == '\n' || c == '\r') {
            return Err(ManifestError::UnrepresentablePath { key });
        }
        if digest.algorithm() != self.algorithm {
            return Err(ManifestError::MixedAlgorithms {
                key,
                expected: self.algorithm,
                found: digest.algorithm(),
            });
        }
        if self.entries.contains_key(&key) {
            return Err(ManifestError::DuplicateEntry { key });
        }
        self.entries.insert(key, digest);
        Ok(())
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn get(&self, key: &str) -> Option<&DigestValue> {
        self.entries.get(key)
    }

    /// Entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &DigestValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the manifest text with a generation timestamp in the header.
    pub fn render(&self, generated_at: DateTime<Utc>) -> String {
        let mut out = String::new();
        out.push_str(TITLE);
        out.push('\n');
        out.push_str(&format!("{} {}\n", ALGORITHM_PREFIX, self.algorithm));
        out.push_str(&format!(
            "; generated: {}\n",
            generated_at.to_rfc3339_opts(SecondsFormat::Secs, false)
        ));
        out.push('\n');

        for (key, digest) in &self.entries {
            out.push_str(&format!("{} {}\n", digest.to_hex(), key));
        }
        out
    }

    /// Parse manifest text. `default_algorithm` applies when the text has no
    /// algorithm header.
    pub fn parse(text: &str, default_algorithm: ChecksumAlgorithm) -> Result<Self, ManifestError> {
        let mut manifest = Manifest::new(default_algorithm);

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = line.strip_prefix('\u{feff}').unwrap_or(line);

            if line.trim().is_empty() {
                continue;
            }

            if let Some(comment) = line.strip_prefix(';') {
                let comment = comment.trim();
                if let Some(name) = comment.strip_prefix("algorithm:") {
                    if !manifest.is_empty() {
                        return Err(ManifestError::Syntax {
                            line: line_no,
                            reason: "algorithm header must precede all entries".to_string(),
                        });
                    }
                    manifest.algorithm = name.parse().map_err(|e: UnknownAlgorithm| {
                        ManifestError::Syntax {
                            line: line_no,
                            reason: e.to_string(),
                        }
                    })?;
                }
                continue;
            }

            let (hex, key) = line.split_once(' ').ok_or_else(|| ManifestError::Syntax {
                line: line_no,
                reason: "expected '<digest> <path>'".to_string(),
            })?;
            if key.is_empty() {
                return Err(ManifestError::Syntax {
                    line: line_no,
                    reason: "missing path after digest".to_string(),
                });
            }

            let digest = DigestValue::from_hex(manifest.algorithm, hex)
                .map_err(|source| ManifestError::Digest {
                    line: line_no,
                    source,
                })?;

            if manifest.entries.contains_key(key) {
                return Err(ManifestError::DuplicateKey {
                    line: line_no,
                    key: key.to_string(),
                });
            }
            manifest.entries.insert(key.to_string(), digest);
        }

        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path, default_algorithm: ChecksumAlgorithm) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let manifest = Self::parse(&text, default_algorithm)?;
        tracing::debug!(
            path = %path.display(),
            entries = manifest.len(),
            algorithm = %manifest.algorithm,
            "manifest loaded"
        );
        Ok(manifest)
    }

    /// Write the manifest to `path`.
    ///
    /// The text is written to a hidden sibling and renamed into place.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let write_err = |e: std::io::Error| ManifestError::Write {
            path: path.to_path_buf(),
            source: e,
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "manifest".to_string());
        let staging = path.with_file_name(format!(".{}.tmp", file_name));

        fs::write(&staging, self.render(Utc::now())).map_err(write_err)?;
        if let Err(e) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(write_err(e));
        }

        tracing::debug!(path = %path.display(), entries = self.len(), "manifest saved");
        Ok(())
    }

    /// Convert into the expected-digest index used by VERIFY runs.
    pub fn into_index(self) -> ExpectedDigestIndex {
        let mut index = ExpectedDigestIndex::new(self.algorithm);
        for (key, digest) in self.entries {
            // Every entry was checked against `self.algorithm` on the way in.
            let _ = index.insert(key, digest);
        }
        index
    }
}
