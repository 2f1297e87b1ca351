//! Proof Wallet command-line front end
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`console`]: the screen/key interface the ceremony runs on
//! - [`session`]: the ceremony controller
//! - [`hardening`]: core dump prevention

pub mod config;
pub mod console;
pub mod hardening;
pub mod session;

pub use config::ProofConfig;
pub use console::{Console, Key, Screen, TerminalConsole};
pub use session::Session;
