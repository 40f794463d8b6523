//! # sigil-store — at-rest wallet state and authentication.
//!
//! - [`error`] — `StoreError` enum
//! - [`wallet`] — wallet metadata model and name rules
//! - [`vault`] — encrypted wallet files under `<home>/wallets`
//! - [`session`] — keyring-backed short-lived sessions
//! - [`agent`] — scoped non-interactive credentials and the policy engine
//! - [`auth`] — the token → xpub → session → password cascade
//! - [`backup`] — encrypted export bundles

pub mod agent;
pub mod auth;
pub mod backup;
pub mod error;
pub mod session;
pub mod vault;
pub mod wallet;

pub use auth::{AuthContext, AuthMode, AuthOrchestrator};
pub use error::StoreError;
pub use vault::WalletVault;
pub use wallet::Wallet;
