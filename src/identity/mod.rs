//! Identity resolution across third-party providers.
//!
//! A user can link several providers (YouTube, SoundCloud). Each provider's
//! credential set is stored flat on the user record under
//! `<provider>_client_id`, `<provider>_access_token`, `<provider>_refresh_token`
//! and `<provider>_refresh_token_expiry`.
//!
//! ## Usage
//!
//! ```ignore
//! let resolver = IdentityResolver::new(store);
//! let user = resolver
//!     .resolve_or_create(
//!         ProviderCredential::new(Provider::Youtube, "UC123", access_token),
//!         ProfileHints::new().with_name("Ann").with_avatar("a.png"),
//!     )
//!     .await?;
//! let token = issuer.issue_for(&user)?;
//! ```

mod integration_tests;
mod model;
mod resolver;
mod store;

pub use model::{NewUser, ProfileHints, ProviderCredential, User, UserLookup, UserPatch};
pub use resolver::{IdentityResolver, MAX_CREATE_ATTEMPTS};
pub use store::{IdentityStore, MemoryIdentityStore, StoreError, StoreFuture};
