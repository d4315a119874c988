//! Caching adapters over the fee and price feeds.
//!
//! Neither oracle ever fails its caller: feed errors degrade to fallback
//! values and are only logged.

pub mod gas;
pub mod price;

pub use gas::{GasOracle, GasSource, GasSpeed, GasTiers};
pub use price::PriceOracle;
