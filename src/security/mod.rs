//! Secret-handling primitives shared by the key, recovery and session code.

pub mod secret;

pub use secret::{SecretString, SecretVec};
