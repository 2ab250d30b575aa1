//! [`SessionKeys`]: the two process-lifetime session secrets.

use thiserror::Error;

use crate::crypto::{fill_random, CipherError, KEY_LEN};

/// Errors produced while creating session keys.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The OS random source could not supply key material.
    #[error("failed to generate session key: {0}")]
    Random(#[from] CipherError),
}

/// Authentication (HMAC) and encryption (AEAD) keys, each [`KEY_LEN`] bytes.
///
/// Generated once at startup and held only in memory. When this type is
/// dropped the key material is overwritten with zeroes.
pub struct SessionKeys {
    auth: Box<[u8; KEY_LEN]>,
    enc: Box<[u8; KEY_LEN]>,
}

impl SessionKeys {
    /// Draw both keys from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Random`] if the random source is unavailable.
    pub fn generate() -> Result<Self, KeyError> {
        let mut auth = Box::new([0u8; KEY_LEN]);
        let mut enc = Box::new([0u8; KEY_LEN]);
        fill_random(&mut auth[..])?;
        fill_random(&mut enc[..])?;
        Ok(Self { auth, enc })
    }

    /// Build keys from fixed bytes. Deterministic; intended for tests.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn from_bytes(auth: [u8; KEY_LEN], enc: [u8; KEY_LEN]) -> Self {
        Self {
            auth: Box::new(auth),
            enc: Box::new(enc),
        }
    }

    pub(crate) fn auth(&self) -> &[u8] {
        &self.auth[..]
    }

    pub(crate) fn enc(&self) -> &[u8] {
        &self.enc[..]
    }
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.auth.iter_mut().for_each(|b| *b = 0);
        self.enc.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("SessionKeys([REDACTED])")
    }
}
