//! In-memory implementation of every repository.
//!
//! Mirrors the `PostgreSQL` semantics (unique keys, cascades, conditional
//! task saves) closely enough for tests and local development. Every
//! operation takes the table lock once, so each one is atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::RwLock;
use uuid::Uuid;

use amts_core::{
    Email, ProductId, ShopDomain, StoreId, StoreStatus, TaskId, TaskStatus, UserId,
};

use super::{
    OAuthStateRepository, PendingInstall, ProductRepository, RefreshTokenRepository,
    RepositoryError, StoreRepository, TaskRepository, UserRepository,
};
use crate::models::{
    NewProduct, NewStore, NewTask, NewUser, Product, ProductFilter, ProductUpdate, Store,
    StoreFilter, SyncedFields, Task, TaskFilter, TaskSummary, User, UserFilter, UserUpdate,
};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    refresh_tokens: HashMap<UserId, Uuid>,
    oauth_states: HashMap<String, PendingInstall>,
    stores: HashMap<StoreId, Store>,
    products: HashMap<ProductId, Product>,
    tasks: HashMap<TaskId, Task>,
}

/// Process-local storage implementing all repository traits.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

fn page<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(0);
    items.into_iter().skip(offset).take(limit).collect()
}

fn count_of(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict(
                "email already registered".to_string(),
            ));
        }
        let user = user.into_user(Utc::now());
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| &u.email == email).cloned())
    }

    async fn update(&self, id: UserId, update: &UserUpdate) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        update.apply(user, Utc::now());
        Ok(user.clone())
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(users, filter.limit, filter.offset))
    }

    async fn count(&self, filter: &UserFilter) -> Result<i64, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(count_of(
            tables.users.values().filter(|u| filter.matches(u)).count(),
        ))
    }
}

// =============================================================================
// Refresh tokens
// =============================================================================

#[async_trait]
impl RefreshTokenRepository for MemoryStore {
    async fn store_latest(&self, user_id: UserId, token_id: Uuid) -> Result<(), RepositoryError> {
        self.tables
            .write()
            .await
            .refresh_tokens
            .insert(user_id, token_id);
        Ok(())
    }

    async fn current(&self, user_id: UserId) -> Result<Option<Uuid>, RepositoryError> {
        Ok(self.tables.read().await.refresh_tokens.get(&user_id).copied())
    }

    async fn rotate(
        &self,
        user_id: UserId,
        expected: Uuid,
        next: Uuid,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.refresh_tokens.get_mut(&user_id) {
            Some(current) if *current == expected => {
                *current = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke(&self, user_id: UserId) -> Result<(), RepositoryError> {
        self.tables.write().await.refresh_tokens.remove(&user_id);
        Ok(())
    }
}

// =============================================================================
// OAuth states
// =============================================================================

#[async_trait]
impl OAuthStateRepository for MemoryStore {
    async fn insert(&self, pending: &PendingInstall) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.oauth_states.contains_key(&pending.state) {
            return Err(RepositoryError::Conflict(
                "state token collision".to_string(),
            ));
        }
        tables
            .oauth_states
            .insert(pending.state.clone(), pending.clone());
        Ok(())
    }

    async fn consume(&self, state: &str) -> Result<Option<PendingInstall>, RepositoryError> {
        Ok(self.tables.write().await.oauth_states.remove(state))
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.write().await;
        let before = tables.oauth_states.len();
        tables.oauth_states.retain(|_, p| p.issued_at >= cutoff);
        Ok(u64::try_from(before - tables.oauth_states.len()).unwrap_or(u64::MAX))
    }
}

// =============================================================================
// Stores
// =============================================================================

#[async_trait]
impl StoreRepository for MemoryStore {
    async fn insert_or_reconnect(&self, store: NewStore) -> Result<Store, RepositoryError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        if let Some(existing) = tables
            .stores
            .values_mut()
            .find(|s| s.shop_domain == store.shop_domain)
        {
            existing.access_token = Some(store.access_token);
            existing.status = StoreStatus::Connected;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let store = store.into_store(now);
        tables.stores.insert(store.id, store.clone());
        Ok(store)
    }

    async fn reconnect(
        &self,
        domain: &ShopDomain,
        access_token: &SecretString,
    ) -> Result<Option<Store>, RepositoryError> {
        let mut tables = self.tables.write().await;
        let Some(store) = tables
            .stores
            .values_mut()
            .find(|s| &s.shop_domain == domain)
        else {
            return Ok(None);
        };
        store.access_token = Some(access_token.clone());
        store.status = StoreStatus::Connected;
        store.updated_at = Utc::now();
        Ok(Some(store.clone()))
    }

    async fn get(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        Ok(self.tables.read().await.stores.get(&id).cloned())
    }

    async fn find_by_domain(&self, domain: &ShopDomain) -> Result<Option<Store>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .stores
            .values()
            .find(|s| &s.shop_domain == domain)
            .cloned())
    }

    async fn list(&self, filter: &StoreFilter) -> Result<Vec<Store>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut stores: Vec<Store> = tables
            .stores
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        stores.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(stores, filter.limit, filter.offset))
    }

    async fn count(&self, filter: &StoreFilter) -> Result<i64, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(count_of(
            tables.stores.values().filter(|s| filter.matches(s)).count(),
        ))
    }

    async fn set_status(&self, id: StoreId, status: StoreStatus) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let store = tables.stores.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        store.status = status;
        store.updated_at = Utc::now();
        Ok(())
    }

    async fn record_sync(
        &self,
        id: StoreId,
        synced_at: DateTime<Utc>,
        products_count: i32,
    ) -> Result<Store, RepositoryError> {
        let mut tables = self.tables.write().await;
        let store = tables.stores.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        store.last_synced = Some(synced_at);
        store.products_count = products_count;
        store.updated_at = Utc::now();
        Ok(store.clone())
    }

    async fn delete(&self, id: StoreId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.stores.remove(&id).is_none() {
            return Ok(false);
        }
        tables.products.retain(|_, p| p.store_id != id);
        tables.tasks.retain(|_, t| t.store_id != id);
        Ok(true)
    }
}

// =============================================================================
// Products
// =============================================================================

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let product = product.into_product(Utc::now());
        self.tables
            .write()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(product)
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn find_by_remote_id(
        &self,
        store_id: StoreId,
        shopify_product_id: i64,
    ) -> Result<Option<Product>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .values()
            .find(|p| p.store_id == store_id && p.shopify_product_id == Some(shopify_product_id))
            .cloned())
    }

    async fn update(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let mut tables = self.tables.write().await;
        let product = tables
            .products
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        update.clone().apply(product, Utc::now());
        Ok(product.clone())
    }

    async fn upsert_synced(&self, fields: SyncedFields) -> Result<Product, RepositoryError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        if let Some(existing) = tables.products.values_mut().find(|p| {
            p.store_id == fields.store_id && p.shopify_product_id == Some(fields.shopify_product_id)
        }) {
            fields.apply(existing, now);
            return Ok(existing.clone());
        }

        let product = fields.into_product(now);
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn mark_exported(
        &self,
        id: ProductId,
        shopify_product_id: i64,
    ) -> Result<Product, RepositoryError> {
        let mut tables = self.tables.write().await;
        let store_id = tables
            .products
            .get(&id)
            .ok_or(RepositoryError::NotFound)?
            .store_id;
        let taken = tables.products.values().any(|p| {
            p.id != id && p.store_id == store_id && p.shopify_product_id == Some(shopify_product_id)
        });
        if taken {
            return Err(RepositoryError::Conflict(
                "remote product already mirrored".to_string(),
            ));
        }

        let product = tables
            .products
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        product.shopify_product_id = Some(shopify_product_id);
        product.synced_to_shopify = true;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.products.remove(&id).is_none() {
            return Ok(false);
        }
        for task in tables.tasks.values_mut() {
            if task.product_id == Some(id) {
                task.product_id = None;
            }
        }
        Ok(true)
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut products: Vec<Product> = tables
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(products, filter.limit, filter.offset))
    }

    async fn count(&self, filter: &ProductFilter) -> Result<i64, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(count_of(
            tables.products.values().filter(|p| filter.matches(p)).count(),
        ))
    }
}

// =============================================================================
// Tasks
// =============================================================================

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn create(&self, task: NewTask) -> Result<Task, RepositoryError> {
        let task = task.into_task(Utc::now());
        self.tables.write().await.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, RepositoryError> {
        Ok(self.tables.read().await.tasks.get(&id).cloned())
    }

    async fn save(&self, task: &Task, previous: TaskStatus) -> Result<Task, RepositoryError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .tasks
            .get_mut(&task.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.status != previous {
            return Err(RepositoryError::Conflict(
                "task status changed concurrently".to_string(),
            ));
        }

        let started_at = stored.started_at.or(task.started_at);
        let completed_at = stored.completed_at.or(task.completed_at);
        *stored = Task {
            started_at,
            completed_at,
            ..task.clone()
        };
        Ok(stored.clone())
    }

    async fn delete(&self, id: TaskId) -> Result<bool, RepositoryError> {
        Ok(self.tables.write().await.tasks.remove(&id).is_some())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<Task> = tables
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(page(tasks, filter.limit, filter.offset))
    }

    async fn summary(&self, store_ids: Option<&[StoreId]>) -> Result<TaskSummary, RepositoryError> {
        let tables = self.tables.read().await;
        let mut summary = TaskSummary::default();
        for task in tables
            .tasks
            .values()
            .filter(|t| store_ids.is_none_or(|ids| ids.contains(&t.store_id)))
        {
            summary.add(task.status, task.priority, task.task_type, 1);
        }
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use amts_core::{ProductStatus, SubscriptionTier, TaskPriority, TaskType, UserRole};
    use secrecy::ExposeSecret;

    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: Email::parse(email).unwrap(),
            password_hash: "hash".to_string(),
            full_name: None,
            company_name: None,
            industry: "cannabis".to_string(),
            role: UserRole::User,
            subscription_tier: SubscriptionTier::Free,
        }
    }

    fn new_store(user_id: UserId, token: &str) -> NewStore {
        NewStore {
            user_id,
            name: "Green Leaf".to_string(),
            shop_domain: ShopDomain::parse("green-leaf").unwrap(),
            access_token: SecretString::from(token),
            products_count: 0,
        }
    }

    fn synced(store_id: StoreId, remote_id: i64, title: &str) -> SyncedFields {
        SyncedFields {
            store_id,
            shopify_product_id: remote_id,
            title: title.to_string(),
            description: None,
            price: None,
            compare_at_price: None,
            sku: None,
            barcode: None,
            inventory_quantity: 0,
            tags: vec![],
            images: vec![],
            product_type: None,
            vendor: None,
            status: ProductStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts_case_insensitively() {
        let repo = MemoryStore::default();
        UserRepository::create(&repo, new_user("grower@greenleaf.co"))
            .await
            .unwrap();

        let err = UserRepository::create(&repo, new_user("Grower@GreenLeaf.CO"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_oauth_state_consumed_once() {
        let repo = MemoryStore::default();
        let pending = PendingInstall {
            state: "abc".to_string(),
            user_id: UserId::generate(),
            shop_domain: ShopDomain::parse("green-leaf").unwrap(),
            issued_at: Utc::now(),
        };
        OAuthStateRepository::insert(&repo, &pending).await.unwrap();

        assert_eq!(repo.consume("abc").await.unwrap(), Some(pending));
        assert_eq!(repo.consume("abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_store_identity() {
        let repo = MemoryStore::default();
        let owner = UserId::generate();
        let first = repo.insert_or_reconnect(new_store(owner, "tok-1")).await.unwrap();
        repo.record_sync(first.id, Utc::now(), 12).await.unwrap();

        let second = repo
            .insert_or_reconnect(new_store(UserId::generate(), "tok-2"))
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.user_id, owner);
        assert_eq!(second.products_count, 12);
        assert_eq!(
            second.access_token.unwrap().expose_secret(),
            "tok-2"
        );
        assert_eq!(StoreRepository::count(&repo, &StoreFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_synced_is_keyed_by_remote_id() {
        let repo = MemoryStore::default();
        let store_id = StoreId::generate();
        let first = repo.upsert_synced(synced(store_id, 501, "Blue Dream")).await.unwrap();
        let second = repo
            .upsert_synced(synced(store_id, 501, "Blue Dream 3.5g"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "Blue Dream 3.5g");
        let count = ProductRepository::count(&repo, &ProductFilter::default())
            .await
            .unwrap();
        assert_eq!(count, 1);

        // Same remote id in a different store is a different product.
        repo.upsert_synced(synced(StoreId::generate(), 501, "Other"))
            .await
            .unwrap();
        let count = ProductRepository::count(&repo, &ProductFilter::default())
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_task_save_detects_concurrent_status_change() {
        let repo = MemoryStore::default();
        let task = TaskRepository::create(
            &repo,
            NewTask {
                store_id: StoreId::generate(),
                product_id: None,
                task_type: TaskType::Custom,
                priority: TaskPriority::Low,
                title: "Check lab results".to_string(),
                description: None,
                metadata: serde_json::json!({}),
            },
        )
        .await
        .unwrap();

        let mut a = task.clone();
        a.transition(TaskStatus::InProgress, Utc::now()).unwrap();
        repo.save(&a, TaskStatus::Pending).await.unwrap();

        let mut b = task;
        b.transition(TaskStatus::Failed, Utc::now()).unwrap();
        let err = repo.save(&b, TaskStatus::Pending).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_tasks_sorted_by_priority_then_newest() {
        let repo = MemoryStore::default();
        let store_id = StoreId::generate();
        for (priority, title) in [
            (TaskPriority::Low, "low"),
            (TaskPriority::Urgent, "urgent"),
            (TaskPriority::Medium, "medium"),
        ] {
            TaskRepository::create(
                &repo,
                NewTask {
                    store_id,
                    product_id: None,
                    task_type: TaskType::Custom,
                    priority,
                    title: title.to_string(),
                    description: None,
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap();
        }

        let titles: Vec<String> = TaskRepository::list(&repo, &TaskFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["urgent", "medium", "low"]);
    }

    #[tokio::test]
    async fn test_deleting_store_cascades() {
        let repo = MemoryStore::default();
        let store = repo
            .insert_or_reconnect(new_store(UserId::generate(), "tok"))
            .await
            .unwrap();
        repo.upsert_synced(synced(store.id, 1, "Gummies")).await.unwrap();

        assert!(StoreRepository::delete(&repo, store.id).await.unwrap());
        let count = ProductRepository::count(&repo, &ProductFilter::default())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(!StoreRepository::delete(&repo, store.id).await.unwrap());
    }
}
