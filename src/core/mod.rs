pub mod abi;
pub mod config;
pub mod domain;
pub mod errors;
pub mod key_manager;
pub mod logging;
pub mod wallet_manager;

pub use config::WalletConfig;
pub use errors::WalletError;
pub use wallet_manager::WalletManager;
