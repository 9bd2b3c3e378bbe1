//! Encrypted per-host keystore files
//!
//! File layout: magic `NSKS`, a version byte, a 16-byte Argon2id salt, a
//! 12-byte AES-GCM nonce, then the ciphertext of a JSON document listing
//! the stored certificates.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm,
};
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use rustls::pki_types::CertificateDer;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use netsec_common::sha256_fingerprint;

use crate::error::{Result, TrustError};

const MAGIC: &[u8; 4] = b"NSKS";
const VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + 1 + SALT_LEN + NONCE_LEN;

/// File extension of keystore files
pub const KEYSTORE_EXTENSION: &str = "keystore";

#[derive(Serialize, Deserialize)]
struct KeystoreDocument {
    entries: Vec<KeystoreEntry>,
}

#[derive(Serialize, Deserialize)]
struct KeystoreEntry {
    alias: String,
    der: String,
}

/// Password-protected keystore file for one host
#[derive(Clone)]
pub struct KeystoreFile {
    path: PathBuf,
    password: Arc<Zeroizing<String>>,
}

impl std::fmt::Debug for KeystoreFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreFile")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl KeystoreFile {
    /// Keystore for `host` inside `working_dir`
    pub fn for_host(
        working_dir: impl AsRef<Path>,
        host: &str,
        password: Arc<Zeroizing<String>>,
    ) -> Self {
        let file_name = format!(
            "{}.{KEYSTORE_EXTENSION}",
            host.replace(['/', '\\', ':'], "_")
        );
        Self {
            path: working_dir.as_ref().join(file_name),
            password,
        }
    }

    /// Location of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file exists on disk
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the stored certificates; a missing file is an empty keystore
    pub fn load(&self) -> Result<Vec<CertificateDer<'static>>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.failure(format!("read failed: {e}"))),
        };

        let plaintext = self.decrypt(&data)?;
        let document: KeystoreDocument = serde_json::from_slice(&plaintext)
            .map_err(|e| self.failure(format!("malformed keystore contents: {e}")))?;

        document
            .entries
            .into_iter()
            .map(|entry| {
                STANDARD
                    .decode(entry.der.as_bytes())
                    .map(CertificateDer::from)
                    .map_err(|e| self.failure(format!("invalid entry {}: {e}", entry.alias)))
            })
            .collect()
    }

    /// Replace the file contents with `certs`
    ///
    /// Writes a sibling temporary file and renames it over the keystore.
    pub fn save(&self, certs: &[CertificateDer<'static>]) -> Result<()> {
        let document = KeystoreDocument {
            entries: certs
                .iter()
                .map(|cert| KeystoreEntry {
                    alias: sha256_fingerprint(cert.as_ref()),
                    der: STANDARD.encode(cert.as_ref()),
                })
                .collect(),
        };
        let plaintext = Zeroizing::new(
            serde_json::to_vec(&document)
                .map_err(|e| self.failure(format!("serialization failed: {e}")))?,
        );
        let data = self.encrypt(&plaintext)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| self.failure(format!("cannot create directory: {e}")))?;
        }

        let tmp = self.path.with_extension(format!("{KEYSTORE_EXTENSION}.tmp"));
        fs::write(&tmp, &data).map_err(|e| self.failure(format!("write failed: {e}")))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            self.failure(format!("rename failed: {e}"))
        })?;

        tracing::debug!("Saved {} certificates to {:?}", certs.len(), self.path);
        Ok(())
    }

    /// Remove the file; a missing file is not an error
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.failure(format!("delete failed: {e}"))),
        }
    }

    fn derive_key(&self, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        let mut key = Zeroizing::new([0u8; 32]);
        Argon2::default()
            .hash_password_into(self.password.as_bytes(), salt, &mut key[..])
            .map_err(|e| self.failure(format!("key derivation failed: {e}")))?;
        Ok(key)
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut salt);
        rand::rng().fill_bytes(&mut nonce);

        let key = self.derive_key(&salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| self.failure(format!("invalid keystore key: {e}")))?;
        let ciphertext = cipher
            .encrypt(GenericArray::from_slice(&nonce), plaintext)
            .map_err(|_| self.failure("keystore encryption failed"))?;

        let mut data = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        data.extend_from_slice(MAGIC);
        data.push(VERSION);
        data.extend_from_slice(&salt);
        data.extend_from_slice(&nonce);
        data.extend_from_slice(&ciphertext);
        Ok(data)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        // Header plus at least the 16-byte GCM tag
        if data.len() < HEADER_LEN + 16 || !data.starts_with(MAGIC) {
            return Err(self.failure("not a keystore file"));
        }
        if data[MAGIC.len()] != VERSION {
            return Err(self.failure(format!(
                "unsupported keystore version {}",
                data[MAGIC.len()]
            )));
        }

        let salt_start = MAGIC.len() + 1;
        let nonce_start = salt_start + SALT_LEN;
        let salt = &data[salt_start..nonce_start];
        let nonce = &data[nonce_start..HEADER_LEN];
        let ciphertext = &data[HEADER_LEN..];

        let key = self.derive_key(salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| self.failure(format!("invalid keystore key: {e}")))?;
        cipher
            .decrypt(GenericArray::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| self.failure("decryption failed (wrong password or corrupt file)"))
    }

    fn failure(&self, reason: impl Into<String>) -> TrustError {
        TrustError::storage(&self.path, reason)
    }
}
