//! berth-envelope — the encrypted, versioned container for in-flight
//! workflow continuation state.
//!
//! Continuations ride an at-least-once queue between scheduler ticks and
//! carry a live tenant credential, so they are encrypted at rest in the
//! queue. The envelope is AES-256-CBC keyed by PBKDF2-HMAC-SHA256 over a
//! passphrase+salt pair loaded once at process start; every encryption
//! draws a fresh random IV. A protocol version tag travels outside the
//! ciphertext and is checked before any cipher work, so a message left in
//! flight across a protocol upgrade is rejected instead of silently
//! misdecrypted.

pub mod codec;
pub mod envelope;
pub mod error;

pub use codec::{PROTOCOL_VERSION, SealedMessage, open, seal};
pub use envelope::{Envelope, Sealed};
pub use error::{EnvelopeError, EnvelopeResult};
