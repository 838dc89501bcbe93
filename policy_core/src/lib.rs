//! Thread-safe policy management for an access-control engine.
//!
//! Rules live in named sections of a [`PolicyStore`]. A [`PolicyManager`]
//! guards the store and the role graphs derived from its grouping sections
//! behind a single writer-preferring [`FairRwLock`], so grouping changes and
//! role lookups are always observed together.

pub mod asynchronous;
pub mod config;
pub mod error;
pub mod function;
pub mod lock;
pub mod manager;
pub mod role;
pub mod rule;
pub mod store;

pub use asynchronous::AsyncPolicyManager;
pub use config::{EnforcerConfig, SeedRule};
pub use error::{PolicyError, Result};
pub use function::{FunctionMap, MatchFunction};
pub use lock::{FairReadGuard, FairRwLock, FairWriteGuard};
pub use manager::{PolicyManager, PolicyState};
pub use role::{DefaultRoleManager, RoleLinks, RoleManager};
pub use rule::{Family, Rule, DEFAULT_GROUPING_TYPE, DEFAULT_POLICY_TYPE};
pub use store::{PolicyStore, Section};
