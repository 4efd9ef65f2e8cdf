//! IoT platform authentication
//!
//! - `store`: Process-wide credential holder with replace-by-value semantics
//! - `oauth`: Token acquisition against the identity endpoint
//! - `refresher`: Background refresh loop

pub mod oauth;
pub mod refresher;
pub mod store;

pub use oauth::OAuthClient;
pub use refresher::TokenRefresher;
pub use store::TokenStore;
