//! AES-256-GCM-SIV sealing primitives and OS randomness.
//!
//! This module is intentionally free of HTTP dependencies. It provides the
//! low-level seal/open operations used by the session layer.
//!
//! # Sealed blob format
//!
//! ```text
//! <nonce (12 bytes)><ciphertext + tag>
//! ```

pub mod cipher;

pub use cipher::{fill_random, CipherError, KEY_LEN};
