//! Workspace value object and its persisted metadata

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use speckeep_crypto::{ALGORITHM, KDF_NAME, NONCE_SIZE};

use crate::layout::{WorkspaceDir, METADATA_FILE};

/// One project's encrypted storage area.
///
/// Only [`crate::WorkspaceManager`] builds one, from validated metadata and
/// a canonical workspace path; all seven subdirectories exist at that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub(crate) project_path: PathBuf,
    pub(crate) workspace_path: PathBuf,
    pub(crate) salt: Vec<u8>,
    pub(crate) created_at: DateTime<Utc>,
}

impl Workspace {
    /// Canonical path of the source project
    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Canonical path of the workspace root
    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }

    /// Random per-workspace KDF salt
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// When the workspace was first created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.workspace_path.join(METADATA_FILE)
    }

    pub fn subdir(&self, dir: WorkspaceDir) -> PathBuf {
        self.workspace_path.join(dir.as_str())
    }

    pub(crate) fn from_metadata(
        metadata: &WorkspaceMetadata,
        workspace_path: PathBuf,
    ) -> Result<Self, String> {
        metadata.validate()?;
        Ok(Self {
            project_path: PathBuf::from(&metadata.project_path),
            workspace_path,
            salt: metadata.salt_bytes()?,
            created_at: metadata.created_at,
        })
    }
}

/// Encryption parameters recorded alongside the salt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionDescriptor {
    pub algorithm: String,
    pub kdf: String,
    pub nonce_length: usize,
    pub salt_length: usize,
}

impl EncryptionDescriptor {
    pub fn current(salt_length: usize) -> Self {
        Self {
            algorithm: ALGORITHM.to_string(),
            kdf: KDF_NAME.to_string(),
            nonce_length: NONCE_SIZE,
            salt_length,
        }
    }
}

/// On-disk shape of `workspace.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMetadata {
    pub project_path: String,
    /// base64 (standard alphabet, padded)
    pub salt: String,
    pub created_at: DateTime<Utc>,
    pub encryption: EncryptionDescriptor,
}

impl WorkspaceMetadata {
    pub fn new(project_path: &Path, salt: &[u8]) -> Self {
        Self {
            project_path: project_path.to_string_lossy().into_owned(),
            salt: STANDARD.encode(salt),
            created_at: Utc::now(),
            encryption: EncryptionDescriptor::current(salt.len()),
        }
    }

    pub fn salt_bytes(&self) -> Result<Vec<u8>, String> {
        STANDARD
            .decode(&self.salt)
            .map_err(|e| format!("salt is not valid base64: {}", e))
    }

    /// Reject workspaces written with parameters this build cannot open
    pub fn validate(&self) -> Result<(), String> {
        if self.encryption.algorithm != ALGORITHM {
            return Err(format!("unsupported algorithm {}", self.encryption.algorithm));
        }
        if self.encryption.kdf != KDF_NAME {
            return Err(format!("unsupported kdf {}", self.encryption.kdf));
        }
        if self.encryption.nonce_length != NONCE_SIZE {
            return Err(format!("unsupported nonce length {}", self.encryption.nonce_length));
        }
        let salt = self.salt_bytes()?;
        if salt.is_empty() || salt.len() != self.encryption.salt_length {
            return Err(format!(
                "salt length {} does not match declared {}",
                salt.len(),
                self.encryption.salt_length
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_json_shape() {
        let metadata = WorkspaceMetadata::new(Path::new("/tmp/demo"), &[7u8; 16]);
        let value = serde_json::to_value(&metadata).unwrap();

        assert_eq!(value["projectPath"], "/tmp/demo");
        assert_eq!(value["salt"], STANDARD.encode([7u8; 16]));
        assert!(value["createdAt"].as_str().unwrap().contains('T'));
        assert_eq!(value["encryption"]["algorithm"], "AES-256-GCM");
        assert_eq!(value["encryption"]["kdf"], "scrypt");
        assert_eq!(value["encryption"]["nonceLength"], 12);
        assert_eq!(value["encryption"]["saltLength"], 16);
    }

    #[test]
    fn test_reads_offset_timestamps() {
        let json = r#"{
            "projectPath": "/tmp/demo",
            "salt": "AAECAwQFBgcICQoLDA0ODw==",
            "createdAt": "2024-05-01T12:30:00.123456+00:00",
            "encryption": {"algorithm": "AES-256-GCM", "kdf": "scrypt", "nonceLength": 12, "saltLength": 16}
        }"#;
        let metadata: WorkspaceMetadata = serde_json::from_str(json).unwrap();
        let workspace = Workspace::from_metadata(&metadata, PathBuf::from("/ws")).unwrap();
        assert_eq!(workspace.salt, (0u8..16).collect::<Vec<_>>());
        assert_eq!(workspace.project_path, PathBuf::from("/tmp/demo"));
    }

    #[test]
    fn test_validate_rejects_foreign_algorithm() {
        let mut metadata = WorkspaceMetadata::new(Path::new("/tmp/demo"), &[1u8; 16]);
        metadata.encryption.algorithm = "ChaCha20-Poly1305".to_string();
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_salt_length_mismatch() {
        let mut metadata = WorkspaceMetadata::new(Path::new("/tmp/demo"), &[1u8; 16]);
        metadata.encryption.salt_length = 32;
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn test_subdir_paths() {
        let metadata = WorkspaceMetadata::new(Path::new("/tmp/demo"), &[1u8; 16]);
        let workspace = Workspace::from_metadata(&metadata, PathBuf::from("/ws")).unwrap();
        assert_eq!(workspace.subdir(WorkspaceDir::Tasks), PathBuf::from("/ws/tasks"));
        assert_eq!(workspace.metadata_path(), PathBuf::from("/ws/workspace.json"));
        assert_eq!(workspace.workspace_path(), Path::new("/ws"));
        assert_eq!(workspace.project_path(), Path::new("/tmp/demo"));
        assert_eq!(workspace.salt(), &[1u8; 16]);
        assert_eq!(workspace.created_at(), metadata.created_at);
    }
}
