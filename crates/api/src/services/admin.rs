//! Cross-tenant views for staff.
//!
//! Every method takes the acting user and checks the role itself, so the
//! service is safe to call from any surface. Tier and role changes need
//! `super_admin`; everything else needs `admin` or above.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use amts_core::{Email, StoreId, StoreStatus, SubscriptionTier, TaskStatus, UserId, UserRole};

use super::auth::{AuthService, Registration, require_staff, require_super_admin};
use super::{ServiceError, stores_of};
use crate::db::{ProductRepository, StoreRepository, TaskRepository, UserRepository};
use crate::models::{
    Product, ProductFilter, Store, StoreFilter, User, UserFilter, UserUpdate, clamp_limit,
};

/// Products shown on the store detail page.
const STORE_DETAIL_PRODUCTS: i64 = 10;

/// Platform-wide counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_clients: i64,
    pub active_clients: i64,
    pub inactive_clients: i64,
    pub total_stores: i64,
    pub connected_stores: i64,
    pub total_products: i64,
    pub total_tasks: i64,
    pub pending_tasks: i64,
    pub clients_by_tier: BTreeMap<SubscriptionTier, i64>,
    /// Accounts created since midnight UTC.
    pub recent_signups: i64,
}

/// Query parameters for the client list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientQuery {
    pub search: Option<String>,
    pub subscription_tier: Option<SubscriptionTier>,
    pub is_active: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A client row with usage counts.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSummary {
    #[serde(flatten)]
    pub user: User,
    pub stores_count: i64,
    pub products_count: i64,
}

/// A client with their stores and work counts.
#[derive(Debug, Clone, Serialize)]
pub struct ClientDetail {
    #[serde(flatten)]
    pub user: User,
    pub stores: Vec<Store>,
    pub products_count: i64,
    pub tasks_count: i64,
    pub pending_tasks: i64,
}

/// A client account created by staff.
#[derive(Debug, Clone, Deserialize)]
pub struct NewClient {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub subscription_tier: SubscriptionTier,
}

/// Staff edit of a client. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientUpdate {
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub industry: Option<String>,
    pub subscription_tier: Option<SubscriptionTier>,
    pub is_active: Option<bool>,
    pub role: Option<UserRole>,
}

/// Query parameters for the cross-tenant store list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreQuery {
    pub client_id: Option<UserId>,
    pub status: Option<StoreStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A store with its owner's contact details.
#[derive(Debug, Clone, Serialize)]
pub struct StoreWithOwner {
    #[serde(flatten)]
    pub store: Store,
    pub client_email: Option<Email>,
    pub client_name: Option<String>,
}

/// A store with its owner and a product preview.
#[derive(Debug, Clone, Serialize)]
pub struct StoreDetail {
    #[serde(flatten)]
    pub store: Store,
    pub client: Option<User>,
    pub products: Vec<Product>,
    pub products_count: i64,
    pub tasks_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    UserCreated,
    StoreConnected,
}

/// One entry of the activity feed.
#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub description: String,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<StoreId>,
    pub timestamp: DateTime<Utc>,
}

/// An access token that acts as a client.
#[derive(Debug, Clone, Serialize)]
pub struct Masquerade {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
    pub masquerading: bool,
    pub admin_id: UserId,
    pub admin_email: Email,
}

/// Admin portal operations.
#[derive(Clone)]
pub struct AdminService {
    auth: AuthService,
    users: Arc<dyn UserRepository>,
    stores: Arc<dyn StoreRepository>,
    products: Arc<dyn ProductRepository>,
    tasks: Arc<dyn TaskRepository>,
}

impl AdminService {
    /// Create an admin service.
    #[must_use]
    pub fn new(
        auth: AuthService,
        users: Arc<dyn UserRepository>,
        stores: Arc<dyn StoreRepository>,
        products: Arc<dyn ProductRepository>,
        tasks: Arc<dyn TaskRepository>,
    ) -> Self {
        Self {
            auth,
            users,
            stores,
            products,
            tasks,
        }
    }

    // =========================================================================
    // Dashboard
    // =========================================================================

    /// Platform-wide counters.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Auth` for non-staff and
    /// `ServiceError::Repository` on database failure.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn dashboard(&self, actor: &User) -> Result<DashboardStats, ServiceError> {
        require_staff(actor)?;

        let total_clients = self.users.count(&UserFilter::default()).await?;
        let active_clients = self
            .users
            .count(&UserFilter {
                is_active: Some(true),
                ..UserFilter::default()
            })
            .await?;

        let mut clients_by_tier = BTreeMap::new();
        for &tier in SubscriptionTier::ALL {
            let n = self
                .users
                .count(&UserFilter {
                    subscription_tier: Some(tier),
                    ..UserFilter::default()
                })
                .await?;
            clients_by_tier.insert(tier, n);
        }

        let midnight = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let recent_signups = self
            .users
            .count(&UserFilter {
                created_since: Some(midnight),
                ..UserFilter::default()
            })
            .await?;

        let total_stores = self.stores.count(&StoreFilter::default()).await?;
        let connected_stores = self
            .stores
            .count(&StoreFilter {
                status: Some(StoreStatus::Connected),
                ..StoreFilter::default()
            })
            .await?;

        let total_products = self.products.count(&ProductFilter::default()).await?;
        let tasks = self.tasks.summary(None).await?;
        let pending_tasks = tasks
            .by_status
            .get(&TaskStatus::Pending)
            .copied()
            .unwrap_or(0);

        Ok(DashboardStats {
            total_clients,
            active_clients,
            inactive_clients: total_clients - active_clients,
            total_stores,
            connected_stores,
            total_products,
            total_tasks: tasks.total,
            pending_tasks,
            clients_by_tier,
            recent_signups,
        })
    }

    // =========================================================================
    // Clients
    // =========================================================================

    /// Search clients, newest first, with store and product counts.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Auth` for non-staff.
    #[instrument(skip(self, actor, query), fields(actor = %actor.id))]
    pub async fn list_clients(
        &self,
        actor: &User,
        query: ClientQuery,
    ) -> Result<Vec<ClientSummary>, ServiceError> {
        require_staff(actor)?;

        let filter = UserFilter {
            search: query.search.filter(|s| !s.trim().is_empty()),
            subscription_tier: query.subscription_tier,
            is_active: query.is_active,
            limit: clamp_limit(query.limit, 50),
            offset: query.offset.unwrap_or(0).max(0),
            ..UserFilter::default()
        };

        let users = self.users.list(&filter).await?;
        let mut clients = Vec::with_capacity(users.len());
        for user in users {
            let stores = stores_of(self.stores.as_ref(), user.id).await?;
            let store_ids: Vec<StoreId> = stores.iter().map(|s| s.id).collect();
            clients.push(ClientSummary {
                stores_count: i64::try_from(stores.len()).unwrap_or(i64::MAX),
                products_count: self.products_in(&store_ids).await?,
                user,
            });
        }
        Ok(clients)
    }

    /// One client with stores and work counts.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown client.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn get_client(&self, actor: &User, id: UserId) -> Result<ClientDetail, ServiceError> {
        require_staff(actor)?;

        let user = self.client(id).await?;
        let stores = stores_of(self.stores.as_ref(), id).await?;
        let store_ids: Vec<StoreId> = stores.iter().map(|s| s.id).collect();

        let (tasks_count, pending_tasks) = if store_ids.is_empty() {
            (0, 0)
        } else {
            let summary = self.tasks.summary(Some(&store_ids)).await?;
            let pending = summary
                .by_status
                .get(&TaskStatus::Pending)
                .copied()
                .unwrap_or(0);
            (summary.total, pending)
        };

        Ok(ClientDetail {
            products_count: self.products_in(&store_ids).await?,
            user,
            stores,
            tasks_count,
            pending_tasks,
        })
    }

    /// Create a client account.
    ///
    /// Setting a tier other than `free` needs `super_admin`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Auth` wrapping the signup validation errors,
    /// `DuplicateEmail`, or `Forbidden`.
    #[instrument(skip(self, actor, client), fields(actor = %actor.id))]
    pub async fn create_client(&self, actor: &User, client: NewClient) -> Result<User, ServiceError> {
        require_staff(actor)?;
        if client.subscription_tier != SubscriptionTier::Free {
            require_super_admin(actor)?;
        }

        let registration = Registration {
            email: client.email,
            password: client.password,
            full_name: client.full_name,
            company_name: client.company_name,
            industry: client.industry,
        };
        let user = self
            .auth
            .create_user(registration, UserRole::User, client.subscription_tier)
            .await?;
        tracing::info!(client_id = %user.id, "Client created by staff");
        Ok(user)
    }

    /// Edit a client.
    ///
    /// Role and tier changes need `super_admin`. Deactivating an account
    /// also ends its refresh session.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound`, `ServiceError::Auth` (`Forbidden`)
    /// or `ServiceError::Validation` when staff deactivate themselves.
    #[instrument(skip(self, actor, update), fields(actor = %actor.id))]
    pub async fn update_client(
        &self,
        actor: &User,
        id: UserId,
        update: ClientUpdate,
    ) -> Result<User, ServiceError> {
        require_staff(actor)?;
        if update.role.is_some() || update.subscription_tier.is_some() {
            require_super_admin(actor)?;
        }
        if update.is_active == Some(false) && id == actor.id {
            return Err(ServiceError::Validation(
                "you cannot deactivate your own account".to_string(),
            ));
        }

        let changes = UserUpdate {
            full_name: update.full_name,
            company_name: update.company_name,
            industry: update.industry,
            role: update.role,
            subscription_tier: update.subscription_tier,
            is_active: update.is_active,
            ..UserUpdate::default()
        };
        let user = self
            .users
            .update(id, &changes)
            .await
            .map_err(ServiceError::missing("client"))?;

        if !user.is_active {
            self.auth.logout(user.id).await?;
        }
        Ok(user)
    }

    /// Soft-delete a client.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update_client`].
    pub async fn deactivate_client(&self, actor: &User, id: UserId) -> Result<User, ServiceError> {
        let update = ClientUpdate {
            is_active: Some(false),
            ..ClientUpdate::default()
        };
        let user = self.update_client(actor, id, update).await?;
        tracing::info!(client_id = %id, actor = %actor.id, "Client deactivated");
        Ok(user)
    }

    /// Change a client's subscription tier.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Auth` (`Forbidden`) unless the actor is a
    /// super admin, and `ServiceError::NotFound` for an unknown client.
    pub async fn set_subscription(
        &self,
        actor: &User,
        id: UserId,
        tier: SubscriptionTier,
    ) -> Result<User, ServiceError> {
        require_super_admin(actor)?;
        let update = ClientUpdate {
            subscription_tier: Some(tier),
            ..ClientUpdate::default()
        };
        let user = self.update_client(actor, id, update).await?;
        tracing::info!(client_id = %id, %tier, "Subscription changed");
        Ok(user)
    }

    /// Issue an access token that acts as a client.
    ///
    /// The client's own refresh session is untouched. Only a super admin can
    /// act as another staff account.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound`, `ServiceError::Validation` for an
    /// inactive client, or `ServiceError::Auth` (`Forbidden`).
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn masquerade(&self, actor: &User, id: UserId) -> Result<Masquerade, ServiceError> {
        require_staff(actor)?;
        let user = self.client(id).await?;
        if user.role.is_staff() {
            require_super_admin(actor)?;
        }
        if !user.is_active {
            return Err(ServiceError::Validation("client is inactive".to_string()));
        }

        let access_token = self.auth.issue_access_token(user.id)?;
        tracing::warn!(client_id = %user.id, actor = %actor.id, "Staff masquerade token issued");

        Ok(Masquerade {
            access_token,
            token_type: "bearer",
            expires_in: self.auth.access_ttl_secs(),
            user,
            masquerading: true,
            admin_id: actor.id,
            admin_email: actor.email.clone(),
        })
    }

    // =========================================================================
    // Stores
    // =========================================================================

    /// Every store, newest first, with owner contact details.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Auth` for non-staff.
    #[instrument(skip(self, actor, query), fields(actor = %actor.id))]
    pub async fn list_stores(
        &self,
        actor: &User,
        query: StoreQuery,
    ) -> Result<Vec<StoreWithOwner>, ServiceError> {
        require_staff(actor)?;

        let filter = StoreFilter {
            user_id: query.client_id,
            status: query.status,
            limit: clamp_limit(query.limit, 50),
            offset: query.offset.unwrap_or(0).max(0),
            ..StoreFilter::default()
        };

        let stores = self.stores.list(&filter).await?;
        let mut rows = Vec::with_capacity(stores.len());
        for store in stores {
            let owner = self.users.get(store.user_id).await?;
            rows.push(StoreWithOwner {
                client_email: owner.as_ref().map(|u| u.email.clone()),
                client_name: owner.and_then(|u| u.full_name),
                store,
            });
        }
        Ok(rows)
    }

    /// One store with its owner and first products.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown store.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn get_store(&self, actor: &User, id: StoreId) -> Result<StoreDetail, ServiceError> {
        require_staff(actor)?;

        let store = self
            .stores
            .get(id)
            .await?
            .ok_or(ServiceError::NotFound("store"))?;
        let client = self.users.get(store.user_id).await?;

        let filter = ProductFilter {
            store_ids: Some(vec![id]),
            limit: STORE_DETAIL_PRODUCTS,
            ..ProductFilter::default()
        };
        let products = self.products.list(&filter).await?;
        let products_count = self.products.count(&filter).await?;
        let tasks_count = self.tasks.summary(Some(std::slice::from_ref(&id))).await?.total;

        Ok(StoreDetail {
            store,
            client,
            products,
            products_count,
            tasks_count,
        })
    }

    // =========================================================================
    // Activity
    // =========================================================================

    /// Recent signups and store connections, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Auth` for non-staff.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn activity(
        &self,
        actor: &User,
        client_id: Option<UserId>,
        limit: Option<i64>,
    ) -> Result<Vec<Activity>, ServiceError> {
        require_staff(actor)?;
        let limit = clamp_limit(limit, 50);

        let users = match client_id {
            Some(id) => self.users.get(id).await?.into_iter().collect(),
            None => {
                self.users
                    .list(&UserFilter {
                        limit,
                        ..UserFilter::default()
                    })
                    .await?
            }
        };
        let stores = self
            .stores
            .list(&StoreFilter {
                user_id: client_id,
                limit,
                ..StoreFilter::default()
            })
            .await?;

        let mut feed: Vec<Activity> = users
            .into_iter()
            .map(|u| Activity {
                kind: ActivityKind::UserCreated,
                description: format!("User {} was created", u.email),
                user_id: u.id,
                store_id: None,
                timestamp: u.created_at,
            })
            .chain(stores.into_iter().map(|s| Activity {
                kind: ActivityKind::StoreConnected,
                description: format!("Store {} was connected", s.shop_domain),
                user_id: s.user_id,
                store_id: Some(s.id),
                timestamp: s.created_at,
            }))
            .collect();

        feed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        feed.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(feed)
    }

    async fn client(&self, id: UserId) -> Result<User, ServiceError> {
        self.users
            .get(id)
            .await?
            .ok_or(ServiceError::NotFound("client"))
    }

    async fn products_in(&self, store_ids: &[StoreId]) -> Result<i64, ServiceError> {
        if store_ids.is_empty() {
            return Ok(0);
        }
        let filter = ProductFilter {
            store_ids: Some(store_ids.to_vec()),
            ..ProductFilter::default()
        };
        Ok(self.products.count(&filter).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use jsonwebtoken::Algorithm;
    use secrecy::SecretString;

    use super::*;
    use crate::config::JwtConfig;
    use crate::db::Repositories;
    use crate::models::{NewProduct, NewStore};
    use crate::services::AuthError;
    use crate::services::auth::TokenType;

    struct Harness {
        admin: AdminService,
        auth: AuthService,
        repos: Repositories,
        staff: User,
        boss: User,
        client: User,
    }

    async fn harness() -> Harness {
        let repos = Repositories::in_memory();
        let jwt = JwtConfig {
            secret: SecretString::from("k3J9x!mQ2@vL8#pR5$tW1^zB6&nC4*hD"),
            algorithm: Algorithm::HS256,
            access_ttl: chrono::Duration::minutes(30),
            refresh_ttl: chrono::Duration::days(7),
        };
        let auth = AuthService::new(repos.users.clone(), repos.refresh_tokens.clone(), &jwt);
        let admin = AdminService::new(
            auth.clone(),
            repos.users.clone(),
            repos.stores.clone(),
            repos.products.clone(),
            repos.tasks.clone(),
        );

        let account = |email: &str| Registration {
            email: email.to_string(),
            password: "correct horse battery".to_string(),
            full_name: Some("Test Account".to_string()),
            company_name: None,
            industry: None,
        };
        let staff = auth
            .create_user(account("ops@amts.dev"), UserRole::Admin, SubscriptionTier::Enterprise)
            .await
            .unwrap();
        let boss = auth
            .create_user(account("root@amts.dev"), UserRole::SuperAdmin, SubscriptionTier::Enterprise)
            .await
            .unwrap();
        let client = auth.register(account("buds@greenleaf.co")).await.unwrap();

        Harness {
            admin,
            auth,
            repos,
            staff,
            boss,
            client,
        }
    }

    async fn connect(h: &Harness, owner: UserId, shop: &str) -> Store {
        h.repos
            .stores
            .insert_or_reconnect(NewStore {
                user_id: owner,
                name: shop.to_string(),
                shop_domain: shop.parse().unwrap(),
                access_token: SecretString::from("shpat_test"),
                products_count: 0,
            })
            .await
            .unwrap()
    }

    async fn add_product(h: &Harness, store: StoreId, title: &str) {
        let new: NewProduct = serde_json::from_value(serde_json::json!({
            "store_id": store,
            "title": title,
        }))
        .unwrap();
        h.repos.products.create(new).await.unwrap();
    }

    fn is_forbidden(err: &ServiceError) -> bool {
        matches!(err, ServiceError::Auth(AuthError::Forbidden))
    }

    #[tokio::test]
    async fn test_non_staff_is_forbidden() {
        let h = harness().await;
        let err = h.admin.dashboard(&h.client).await.unwrap_err();
        assert!(is_forbidden(&err));
        let err = h
            .admin
            .list_clients(&h.client, ClientQuery::default())
            .await
            .unwrap_err();
        assert!(is_forbidden(&err));
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let h = harness().await;
        let store = connect(&h, h.client.id, "green-leaf").await;
        add_product(&h, store.id, "Gelato").await;
        h.admin
            .deactivate_client(&h.staff, h.client.id)
            .await
            .unwrap();

        let stats = h.admin.dashboard(&h.staff).await.unwrap();
        assert_eq!(stats.total_clients, 3);
        assert_eq!(stats.active_clients, 2);
        assert_eq!(stats.inactive_clients, 1);
        assert_eq!(stats.total_stores, 1);
        assert_eq!(stats.connected_stores, 1);
        assert_eq!(stats.total_products, 1);
        assert_eq!(stats.clients_by_tier[&SubscriptionTier::Enterprise], 2);
        assert_eq!(stats.clients_by_tier[&SubscriptionTier::Free], 1);
        assert_eq!(stats.recent_signups, 3);
    }

    #[tokio::test]
    async fn test_client_list_and_detail_counts() {
        let h = harness().await;
        let store = connect(&h, h.client.id, "green-leaf").await;
        add_product(&h, store.id, "Gelato").await;
        add_product(&h, store.id, "Runtz").await;

        let found = h
            .admin
            .list_clients(
                &h.staff,
                ClientQuery {
                    search: Some("GREENLEAF".to_string()),
                    ..ClientQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        let row = found.first().unwrap();
        assert_eq!(row.stores_count, 1);
        assert_eq!(row.products_count, 2);

        let detail = h.admin.get_client(&h.staff, h.client.id).await.unwrap();
        assert_eq!(detail.stores.len(), 1);
        assert_eq!(detail.products_count, 2);
        assert_eq!(detail.tasks_count, 0);

        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["email"], "buds@greenleaf.co");
        assert!(value["stores"][0].get("access_token").is_none());
    }

    #[tokio::test]
    async fn test_tier_change_needs_super_admin() {
        let h = harness().await;
        let err = h
            .admin
            .set_subscription(&h.staff, h.client.id, SubscriptionTier::Professional)
            .await
            .unwrap_err();
        assert!(is_forbidden(&err));

        let err = h
            .admin
            .update_client(
                &h.staff,
                h.client.id,
                ClientUpdate {
                    role: Some(UserRole::Admin),
                    ..ClientUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(is_forbidden(&err));

        let user = h
            .admin
            .set_subscription(&h.boss, h.client.id, SubscriptionTier::Professional)
            .await
            .unwrap();
        assert_eq!(user.subscription_tier, SubscriptionTier::Professional);
    }

    #[tokio::test]
    async fn test_deactivate_ends_refresh_session() {
        let h = harness().await;
        let pair = h.auth.issue_tokens(h.client.id).await.unwrap();

        let user = h
            .admin
            .deactivate_client(&h.staff, h.client.id)
            .await
            .unwrap();
        assert!(!user.is_active);
        assert!(h.auth.refresh(&pair.refresh_token).await.is_err());

        let err = h
            .admin
            .deactivate_client(&h.staff, h.staff.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_client_with_paid_tier_needs_super_admin() {
        let h = harness().await;
        let new = |tier| NewClient {
            email: "new@dispensary.co".to_string(),
            password: "correct horse battery".to_string(),
            full_name: None,
            company_name: Some("Dispensary".to_string()),
            industry: None,
            subscription_tier: tier,
        };

        let err = h
            .admin
            .create_client(&h.staff, new(SubscriptionTier::Starter))
            .await
            .unwrap_err();
        assert!(is_forbidden(&err));

        let user = h
            .admin
            .create_client(&h.staff, new(SubscriptionTier::Free))
            .await
            .unwrap();
        assert_eq!(user.role, UserRole::User);

        let err = h
            .admin
            .create_client(&h.boss, new(SubscriptionTier::Starter))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Auth(AuthError::DuplicateEmail)));
    }

    #[tokio::test]
    async fn test_masquerade_issues_client_access_token() {
        let h = harness().await;
        let pair = h.auth.issue_tokens(h.client.id).await.unwrap();

        let session = h.admin.masquerade(&h.staff, h.client.id).await.unwrap();
        assert!(session.masquerading);
        assert_eq!(session.admin_id, h.staff.id);

        let (claims, user) = h
            .auth
            .verify(&session.access_token, TokenType::Access)
            .await
            .unwrap();
        assert_eq!(claims.sub, h.client.id);
        assert_eq!(user.id, h.client.id);

        assert!(h.auth.refresh(&pair.refresh_token).await.is_ok());

        let err = h.admin.masquerade(&h.staff, h.boss.id).await.unwrap_err();
        assert!(is_forbidden(&err));
    }

    #[tokio::test]
    async fn test_store_views_include_owner() {
        let h = harness().await;
        let store = connect(&h, h.client.id, "green-leaf").await;
        for i in 0..12 {
            add_product(&h, store.id, &format!("Pre-roll {i}")).await;
        }

        let rows = h
            .admin
            .list_stores(&h.staff, StoreQuery::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.first().unwrap().client_email, Some(h.client.email.clone()));

        let detail = h.admin.get_store(&h.staff, store.id).await.unwrap();
        assert_eq!(detail.products.len(), 10);
        assert_eq!(detail.products_count, 12);
        assert_eq!(detail.client.unwrap().id, h.client.id);

        let err = h
            .admin
            .get_store(&h.staff, StoreId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("store")));
    }

    #[tokio::test]
    async fn test_activity_feed_newest_first() {
        let h = harness().await;
        connect(&h, h.client.id, "green-leaf").await;

        let feed = h.admin.activity(&h.staff, None, None).await.unwrap();
        assert_eq!(feed.len(), 4);
        assert!(feed.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert_eq!(feed.first().unwrap().kind, ActivityKind::StoreConnected);

        let mine = h
            .admin
            .activity(&h.staff, Some(h.client.id), Some(1))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert!(mine.iter().all(|a| a.user_id == h.client.id));
    }
}
