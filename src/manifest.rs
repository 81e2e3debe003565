//! Package manifest data model.
//!
//! A package is described by a JSON manifest listing independently addressable
//! file segments ("parts"). Field names on the wire are PascalCase, matching the
//! manifests the packaging pipeline emits. The engine consumes only each part's
//! index, URL, and size; hash, encryption, and version fields ride along
//! untouched for future use.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One downloadable segment of a package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SegmentDescriptor {
    /// Identifier of the owning package.
    pub package_id: String,
    /// Identifier of this part within the package.
    pub part_id: String,
    /// Segment index; identity within a manifest.
    pub index: u32,
    /// Human-readable part name.
    pub name: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Source URL the segment is fetched from.
    pub url: String,
    /// Content hash (unused by the engine).
    pub hash: String,
    /// Hash algorithm name (unused by the engine).
    pub hash_algorithm: String,
    /// Whether the payload is encrypted (unused by the engine).
    pub encrypted: bool,
    /// Part version string (unused by the engine).
    pub version: String,
}

/// A package manifest: header fields plus the ordered part list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PackageManifest {
    /// Package identifier.
    pub package_id: String,
    /// Name shown to users.
    pub display_name: String,
    /// Internal package name.
    pub name: String,
    /// Total package size in bytes.
    pub size: u64,
    /// URL of the package index this manifest came from.
    pub index_url: String,
    /// Package-level content hash (unused by the engine).
    pub hash: String,
    /// Hash algorithm name (unused by the engine).
    pub hash_algorithm: String,
    /// Whether the package is encrypted (unused by the engine).
    pub encrypted: bool,
    /// Package version string.
    pub version: String,
    /// Declared part count.
    pub num_parts: usize,
    /// Ordered part descriptors.
    pub parts: Vec<SegmentDescriptor>,
}

impl PackageManifest {
    /// Parses and validates a manifest from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] if the document does not parse or
    /// fails [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidManifest(format!("JSON parse failed: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks that the manifest can drive a download: a non-empty part list,
    /// unique part indexes, and a derivable file name for every part URL.
    ///
    /// Runs before any transfer starts; a manifest that fails here never
    /// touches the network.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.parts.is_empty() {
            return Err(Error::InvalidManifest("missing part list".to_string()));
        }
        let mut seen = HashSet::new();
        for part in &self.parts {
            if !seen.insert(part.index) {
                return Err(Error::InvalidManifest(format!(
                    "duplicate part index {}",
                    part.index
                )));
            }
            if segment_file_name(&part.url).is_none() {
                return Err(Error::InvalidManifest(format!(
                    "part {} has no usable file name in url {:?}",
                    part.index, part.url
                )));
            }
        }
        Ok(())
    }

    /// Sum of the declared part sizes.
    #[must_use]
    pub fn parts_total_size(&self) -> u64 {
        self.parts.iter().map(|p| p.size).sum()
    }

    /// Total bytes the statistics account against: the declared package size,
    /// falling back to the part-size sum when the header omits it.
    #[must_use]
    pub fn accounted_size(&self) -> u64 {
        if self.size > 0 {
            self.size
        } else {
            self.parts_total_size()
        }
    }
}

/// Derives the local file name for a segment URL: the final path component,
/// with any query string or fragment stripped.
///
/// Returns `None` when the URL has no non-empty final component (e.g. it ends
/// in `/`).
#[must_use]
pub fn segment_file_name(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    // Strip the scheme and authority so a host-only URL yields no name
    let after_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
    let (_, file_part) = after_scheme.split_once('/')?;
    let name = file_part.rsplit('/').next().unwrap_or(file_part);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST_JSON: &str = r#"{
        "PackageId": "pkg-0042",
        "DisplayName": "Advanced Tools",
        "Name": "advanced-tools",
        "Size": 6000,
        "IndexUrl": "https://cdn.example.com/packages/pkg-0042/index.json",
        "Hash": "d41d8cd9",
        "HashAlgorithm": "MD5",
        "Encrypted": false,
        "Version": "1.4.0",
        "NumParts": 3,
        "Parts": [
            {
                "PackageId": "pkg-0042",
                "PartId": "part-1",
                "Index": 0,
                "Name": "tools.part0",
                "Size": 1000,
                "Url": "https://cdn.example.com/packages/pkg-0042/tools.part0.bin",
                "Hash": "aa",
                "HashAlgorithm": "MD5",
                "Encrypted": false,
                "Version": "1.4.0"
            },
            {
                "Index": 1,
                "Size": 2000,
                "Url": "https://cdn.example.com/packages/pkg-0042/tools.part1.bin"
            },
            {
                "Index": 2,
                "Size": 3000,
                "Url": "https://cdn.example.com/packages/pkg-0042/tools.part2.bin?sig=abc123"
            }
        ]
    }"#;

    #[test]
    fn parses_pascal_case_manifest() {
        let manifest = PackageManifest::from_json(MANIFEST_JSON).unwrap();
        assert_eq!(manifest.package_id, "pkg-0042");
        assert_eq!(manifest.display_name, "Advanced Tools");
        assert_eq!(manifest.size, 6000);
        assert_eq!(manifest.num_parts, 3);
        assert_eq!(manifest.parts.len(), 3);
        assert_eq!(manifest.parts[1].index, 1);
        assert_eq!(manifest.parts[1].size, 2000);
    }

    #[test]
    fn absent_fields_default() {
        let manifest = PackageManifest::from_json(MANIFEST_JSON).unwrap();
        let bare = &manifest.parts[1];
        assert_eq!(bare.hash, "");
        assert!(!bare.encrypted);
    }

    #[test]
    fn parts_total_and_accounted_size() {
        let manifest = PackageManifest::from_json(MANIFEST_JSON).unwrap();
        assert_eq!(manifest.parts_total_size(), 6000);
        assert_eq!(manifest.accounted_size(), 6000);

        let mut headerless = manifest;
        headerless.size = 0;
        assert_eq!(headerless.accounted_size(), 6000);
    }

    #[test]
    fn rejects_missing_parts() {
        let err = PackageManifest::from_json(r#"{"PackageId": "p", "Size": 10}"#).unwrap_err();
        assert!(err.to_string().contains("missing part list"));
    }

    #[test]
    fn rejects_duplicate_indexes() {
        let manifest = PackageManifest {
            parts: vec![
                SegmentDescriptor {
                    index: 7,
                    url: "https://x/a.bin".to_string(),
                    ..SegmentDescriptor::default()
                },
                SegmentDescriptor {
                    index: 7,
                    url: "https://x/b.bin".to_string(),
                    ..SegmentDescriptor::default()
                },
            ],
            ..PackageManifest::default()
        };
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate part index 7"));
    }

    #[test]
    fn rejects_unusable_urls() {
        let manifest = PackageManifest {
            parts: vec![SegmentDescriptor {
                index: 0,
                url: "https://cdn.example.com/files/".to_string(),
                ..SegmentDescriptor::default()
            }],
            ..PackageManifest::default()
        };
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(PackageManifest::from_json("{not json").is_err());
    }

    #[test]
    fn file_name_from_url() {
        assert_eq!(
            segment_file_name("https://cdn.example.com/pkg/tools.part0.bin"),
            Some("tools.part0.bin".to_string())
        );
        assert_eq!(
            segment_file_name("https://cdn.example.com/pkg/a.bin?sig=x&y=1"),
            Some("a.bin".to_string())
        );
        assert_eq!(
            segment_file_name("https://cdn.example.com/pkg/a.bin#frag"),
            Some("a.bin".to_string())
        );
        assert_eq!(segment_file_name("https://cdn.example.com/pkg/"), None);
        assert_eq!(segment_file_name("https://cdn.example.com"), None);
        assert_eq!(segment_file_name(""), None);
    }
}
