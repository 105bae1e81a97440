//! Connected Shopify stores.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;

use amts_core::{ShopDomain, StoreId, StoreStatus, UserId};

/// A merchant's Shopify store (domain type).
///
/// The access token is never serialized; `SecretString` keeps it out of
/// `Debug` output as well.
#[derive(Debug, Clone, Serialize)]
pub struct Store {
    pub id: StoreId,
    pub user_id: UserId,
    pub name: String,
    pub shop_domain: ShopDomain,
    #[serde(skip_serializing)]
    pub access_token: Option<SecretString>,
    pub status: StoreStatus,
    pub industry: String,
    pub brand_colors: Option<serde_json::Value>,
    pub logo_url: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
    pub products_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    /// Whether API calls can be made on the merchant's behalf.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == StoreStatus::Connected && self.access_token.is_some()
    }
}

/// Input for recording a freshly installed store.
#[derive(Debug, Clone)]
pub struct NewStore {
    pub user_id: UserId,
    pub name: String,
    pub shop_domain: ShopDomain,
    pub access_token: SecretString,
    /// Catalog size reported by the shop at install time.
    pub products_count: i32,
}

impl NewStore {
    /// Materialize a connected store with a fresh id and timestamps.
    #[must_use]
    pub fn into_store(self, now: DateTime<Utc>) -> Store {
        Store {
            id: StoreId::generate(),
            user_id: self.user_id,
            name: self.name,
            shop_domain: self.shop_domain,
            access_token: Some(self.access_token),
            status: StoreStatus::Connected,
            industry: "cannabis".to_string(),
            brand_colors: None,
            logo_url: None,
            last_synced: None,
            products_count: self.products_count,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filters for store listings.
#[derive(Debug, Clone)]
pub struct StoreFilter {
    pub user_id: Option<UserId>,
    pub status: Option<StoreStatus>,
    /// Only stores created at or after this instant.
    pub created_since: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for StoreFilter {
    fn default() -> Self {
        Self {
            user_id: None,
            status: None,
            created_since: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl StoreFilter {
    /// Whether `store` passes every set filter.
    #[must_use]
    pub fn matches(&self, store: &Store) -> bool {
        self.user_id.is_none_or(|u| store.user_id == u)
            && self.status.is_none_or(|s| store.status == s)
            && self.created_since.is_none_or(|since| store.created_at >= since)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn store() -> Store {
        NewStore {
            user_id: UserId::generate(),
            name: "Green Leaf".to_string(),
            shop_domain: ShopDomain::parse("green-leaf").unwrap(),
            access_token: SecretString::from("shpat_0123456789"),
            products_count: 0,
        }
        .into_store(Utc::now())
    }

    #[test]
    fn test_new_store_is_connected() {
        let s = store();
        assert!(s.is_connected());
        assert_eq!(s.products_count, 0);
        assert_eq!(s.industry, "cannabis");
    }

    #[test]
    fn test_token_never_leaks() {
        let s = store();
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("shpat_0123456789"));
        assert!(!json.contains("access_token"));
        assert!(json.contains("green-leaf.myshopify.com"));

        let debug = format!("{s:?}");
        assert!(!debug.contains("shpat_0123456789"));
    }

    #[test]
    fn test_disconnected_store_is_not_connected() {
        let mut s = store();
        s.status = StoreStatus::Disconnected;
        assert!(!s.is_connected());

        s.status = StoreStatus::Connected;
        s.access_token = None;
        assert!(!s.is_connected());
    }
}
