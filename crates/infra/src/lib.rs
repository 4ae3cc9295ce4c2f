//! Infrastructure layer: identity persistence and bootstrap data.

pub mod seed;
pub mod store;

pub use seed::{SUPERADMIN_USERNAME, seed_superadmin};
pub use store::{
    IdentityStore, InMemoryIdentityStore, NewUser, StoreError, UserFilter, UserUpdate,
};
#[cfg(feature = "postgres")]
pub use store::PostgresIdentityStore;
