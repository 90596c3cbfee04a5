//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on domain ports and remain testable without I/O.

use std::sync::Arc;

use url::Url;

use crate::domain::ports::UserAccountService;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub user_accounts: Arc<dyn UserAccountService>,
    /// Externally visible origin used to build absolute pagination links.
    pub public_base_url: Url,
}

impl HttpState {
    /// Bundle the account port with the public origin of this service.
    pub fn new(user_accounts: Arc<dyn UserAccountService>, public_base_url: Url) -> Self {
        Self {
            user_accounts,
            public_base_url,
        }
    }
}
