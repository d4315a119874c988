//! Aliases for secret buffers that must be zeroized on drop.
use zeroize::Zeroizing;

/// Secret byte buffer, zeroed when dropped.
pub type SecretVec = Zeroizing<Vec<u8>>;

/// Secret string (mnemonic phrases, hex private keys), zeroed when dropped.
pub type SecretString = Zeroizing<String>;
