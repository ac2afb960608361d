//! Local cosmos-sdk test networks in docker: validator sets, consumer chains and the
//! relayers between them, bootstrapped from a single config file.
pub mod chain;
pub mod commands;
pub mod compose;
pub mod config;
pub mod error;
pub mod liveness;
pub mod mutex;
pub mod node;
pub mod overrides;
pub mod relayer;
pub mod runtime;
pub mod testnet;

pub use error::TestnetError;
pub use testnet::Testnet;
