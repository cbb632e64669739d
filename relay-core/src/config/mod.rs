pub mod config;

#[cfg(test)]
mod tests;

pub use config::{BackendKind, ConfigError, ProviderConfig, RelayConfig};
