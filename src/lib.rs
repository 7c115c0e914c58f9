pub mod backend;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod provider;
pub mod rpc;
pub mod session;
pub mod state;

pub use error::ReclaimError;
pub use session::{AccountSummary, SharedSession, WalletSession};
