//! Content-addressed artifact bookkeeping
//!
//! An [`Artifact`] pairs a generated [`SourceModule`] with the binary units compiled
//! from it. The [`ArtifactStore`] keys artifacts by module name with set semantics
//! and keeps an index from unit name to its declaring module, so the loader can
//! resolve any unit by name.
//!
//! The store is the only compiled state that survives a [`Snapshot`] round trip.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    Lexer,
    Parser,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Lexer => write!(f, "lexer"),
            ModuleKind::Parser => write!(f, "parser"),
        }
    }
}

/// A generated module, as produced by a source generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceModule {
    pub name: String,
    pub kind: ModuleKind,
    /// Name of the grammar the module was generated from
    pub grammar: String,
    pub text: String,
}

/// One compiled unit. The digest is the SHA-256 of the bytes, hex encoded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryUnit {
    pub name: String,
    pub bytes: Vec<u8>,
    pub digest: String,
}

impl fmt::Debug for BinaryUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryUnit")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .field("digest", &self.digest)
            .finish()
    }
}

impl BinaryUnit {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let digest = hex::encode(Sha256::digest(&bytes));
        BinaryUnit {
            name: name.into(),
            bytes,
            digest,
        }
    }

    /// Whether the bytes still match the recorded digest.
    pub fn verify(&self) -> bool {
        hex::encode(Sha256::digest(&self.bytes)) == self.digest
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub module: SourceModule,
    pub units: Vec<BinaryUnit>,
}

impl Artifact {
    pub fn name(&self) -> &str {
        &self.module.name
    }

    pub fn unit(&self, name: &str) -> Option<&BinaryUnit> {
        self.units.iter().find(|u| u.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An artifact with this module name is already present
    DuplicateArtifact(String),
    /// A unit with this name is already declared by another module
    DuplicateUnit { unit: String, module: String },
    /// A unit's bytes do not match its digest
    DigestMismatch(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DuplicateArtifact(name) => write!(f, "artifact '{}' already stored", name),
            StoreError::DuplicateUnit { unit, module } => {
                write!(f, "unit '{}' is already declared by module '{}'", unit, module)
            }
            StoreError::DigestMismatch(name) => write!(f, "unit '{}' failed digest check", name),
        }
    }
}

impl std::error::Error for StoreError {}

/// Artifacts keyed by module name, plus a unit-name index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactStore {
    artifacts: BTreeMap<String, Artifact>,
    units: BTreeMap<String, String>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact. Refused if its name, or any of its unit names, is taken.
    pub fn insert(&mut self, artifact: Artifact) -> Result<(), StoreError> {
        if self.artifacts.contains_key(artifact.name()) {
            return Err(StoreError::DuplicateArtifact(artifact.name().to_string()));
        }
        for unit in &artifact.units {
            if let Some(module) = self.units.get(&unit.name) {
                return Err(StoreError::DuplicateUnit {
                    unit: unit.name.clone(),
                    module: module.clone(),
                });
            }
        }
        for unit in &artifact.units {
            self.units
                .insert(unit.name.clone(), artifact.name().to_string());
        }
        self.artifacts
            .insert(artifact.name().to_string(), artifact);
        Ok(())
    }

    /// Bulk import, checking every digest.
    pub fn from_artifacts(
        artifacts: impl IntoIterator<Item = Artifact>,
    ) -> Result<Self, StoreError> {
        let mut store = ArtifactStore::new();
        for artifact in artifacts {
            if let Some(unit) = artifact.units.iter().find(|u| !u.verify()) {
                return Err(StoreError::DigestMismatch(unit.name.clone()));
            }
            store.insert(artifact)?;
        }
        Ok(store)
    }

    /// Bulk export, ordered by module name.
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn get(&self, module: &str) -> Option<&Artifact> {
        self.artifacts.get(module)
    }

    pub fn contains(&self, module: &str) -> bool {
        self.artifacts.contains_key(module)
    }

    /// Find a unit by name, whichever module declared it.
    pub fn unit(&self, name: &str) -> Option<&BinaryUnit> {
        let module = self.units.get(name)?;
        self.artifacts.get(module)?.unit(name)
    }

    /// Name of the module that declared `unit`.
    pub fn declaring_module(&self, unit: &str) -> Option<&str> {
        self.units.get(unit).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Digest over every unit digest, in unit-name order. Two stores with the
    /// same compiled content have the same digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for name in self.units.keys() {
            if let Some(unit) = self.unit(name) {
                hasher.update(unit.name.as_bytes());
                hasher.update(unit.digest.as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

/// Unit names of the lexer and parser that a parse starts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoints {
    pub lexer: String,
    pub parser: String,
}

pub const SNAPSHOT_MAGIC: [u8; 4] = *b"KILN";
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Flat serialized form of a compiled parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub magic: [u8; 4],
    pub format_version: u32,
    pub entry_points: EntryPoints,
    pub artifacts: Vec<Artifact>,
}

impl Snapshot {
    pub fn new(entry_points: EntryPoints, store: &ArtifactStore) -> Self {
        Snapshot {
            magic: SNAPSHOT_MAGIC,
            format_version: SNAPSHOT_FORMAT_VERSION,
            entry_points,
            artifacts: store.artifacts().cloned().collect(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, String> {
        bincode::serialize(self).map_err(|e| e.to_string())
    }

    /// Decode and check the header. The artifacts themselves are checked when
    /// imported into a store.
    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        if bytes.is_empty() {
            return Err("snapshot is empty".to_string());
        }
        let snapshot: Snapshot = bincode::deserialize(bytes).map_err(|e| e.to_string())?;
        if snapshot.magic != SNAPSHOT_MAGIC {
            return Err("not a grammar-kiln snapshot".to_string());
        }
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(format!(
                "unsupported snapshot format version {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            ));
        }
        Ok(snapshot)
    }

    /// Import the artifacts into a fresh store.
    pub fn into_parts(self) -> Result<(EntryPoints, ArtifactStore), StoreError> {
        let store = ArtifactStore::from_artifacts(self.artifacts)?;
        Ok((self.entry_points, store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(module: &str, units: &[&str]) -> Artifact {
        Artifact {
            module: SourceModule {
                name: module.into(),
                kind: ModuleKind::Parser,
                grammar: "G".into(),
                text: "{}".into(),
            },
            units: units
                .iter()
                .map(|u| BinaryUnit::new(*u, u.as_bytes().to_vec()))
                .collect(),
        }
    }

    #[test]
    fn test_digest_is_sha256_hex() {
        let unit = BinaryUnit::new("u", b"abc".to_vec());
        assert_eq!(
            unit.digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(unit.verify());
    }

    #[test]
    fn test_set_semantics() {
        let mut store = ArtifactStore::new();
        store.insert(artifact("P", &["P", "P$AContext"])).expect("first insert");
        assert_eq!(
            store.insert(artifact("P", &["Other"])),
            Err(StoreError::DuplicateArtifact("P".into()))
        );
        assert!(matches!(
            store.insert(artifact("Q", &["P$AContext"])),
            Err(StoreError::DuplicateUnit { .. })
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(store.declaring_module("P$AContext"), Some("P"));
        assert!(store.unit("Other").is_none());
    }

    #[test]
    fn test_tampered_units_are_rejected_on_import() {
        let mut tampered = artifact("L", &["L"]);
        tampered.units[0].bytes.push(0);
        assert_eq!(
            ArtifactStore::from_artifacts(vec![tampered]),
            Err(StoreError::DigestMismatch("L".into()))
        );
    }

    #[test]
    fn test_snapshot_round_trip_preserves_store() {
        let mut store = ArtifactStore::new();
        store.insert(artifact("L", &["L"])).expect("insert");
        store.insert(artifact("P", &["P", "P$XContext"])).expect("insert");
        let entry = EntryPoints {
            lexer: "L".into(),
            parser: "P".into(),
        };

        let bytes = Snapshot::new(entry.clone(), &store).encode().expect("encodes");
        let (restored_entry, restored) = Snapshot::decode(&bytes)
            .expect("decodes")
            .into_parts()
            .expect("imports");
        assert_eq!(restored_entry, entry);
        assert_eq!(restored, store);
        assert_eq!(restored.digest(), store.digest());
    }

    #[test]
    fn test_snapshot_header_checks() {
        assert!(Snapshot::decode(&[]).is_err());
        assert!(Snapshot::decode(b"garbage").is_err());

        let mut snapshot = Snapshot::new(
            EntryPoints {
                lexer: "L".into(),
                parser: "P".into(),
            },
            &ArtifactStore::new(),
        );
        snapshot.format_version = 99;
        let bytes = snapshot.encode().expect("encodes");
        let err = Snapshot::decode(&bytes).expect_err("wrong version");
        assert!(err.contains("99"));
    }
}
