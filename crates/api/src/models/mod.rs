//! Domain models.
//!
//! These are validated domain types. Database row shapes live next to the
//! repositories in [`crate::db`] and convert into these.

pub mod product;
pub mod store;
pub mod task;
pub mod user;

pub use product::{CannabisProfile, NewProduct, Product, ProductFilter, ProductUpdate, SyncedFields};
pub use store::{NewStore, Store, StoreFilter};
pub use task::{NewTask, Task, TaskError, TaskFilter, TaskSummary, TaskUpdate};
pub use user::{NewUser, User, UserFilter, UserUpdate};

/// Largest page a listing endpoint returns.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Clamp a requested page size into `1..=MAX_PAGE_SIZE`.
#[must_use]
pub fn clamp_limit(limit: Option<i64>, default: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 50), 50);
        assert_eq!(clamp_limit(Some(0), 50), 1);
        assert_eq!(clamp_limit(Some(1000), 50), MAX_PAGE_SIZE);
    }
}
