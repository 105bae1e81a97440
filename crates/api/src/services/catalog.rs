//! Local product catalog.
//!
//! Every operation is scoped to the caller's stores: a product is reachable
//! only through a store its caller owns.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use amts_core::{ProductId, ProductStatus, StoreId, UserId};

use super::{ServiceError, owned_product, owned_store, store_ids_of};
use crate::db::{ProductRepository, StoreRepository};
use crate::models::{NewProduct, Product, ProductFilter, ProductUpdate, clamp_limit};

/// Query parameters for a product listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    pub store_id: Option<StoreId>,
    pub status: Option<ProductStatus>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A row a bulk import could not create.
#[derive(Debug, Clone, Serialize)]
pub struct ImportError {
    pub index: usize,
    pub error: String,
}

/// Result of a bulk import.
#[derive(Debug, Clone, Serialize)]
pub struct BulkImport {
    pub created: usize,
    pub errors: Vec<ImportError>,
    pub products: Vec<Product>,
}

/// Product CRUD for merchants.
#[derive(Clone)]
pub struct CatalogService {
    stores: Arc<dyn StoreRepository>,
    products: Arc<dyn ProductRepository>,
}

impl CatalogService {
    /// Create a catalog service.
    #[must_use]
    pub fn new(stores: Arc<dyn StoreRepository>, products: Arc<dyn ProductRepository>) -> Self {
        Self { stores, products }
    }

    /// List the caller's products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` when filtering by a store the caller
    /// does not own, `ServiceError::NotFound` for an unknown store.
    #[instrument(skip(self, query))]
    pub async fn list(
        &self,
        caller: UserId,
        query: ProductQuery,
    ) -> Result<Vec<Product>, ServiceError> {
        let store_ids = match query.store_id {
            Some(store_id) => {
                owned_store(self.stores.as_ref(), store_id, caller).await?;
                vec![store_id]
            }
            None => store_ids_of(self.stores.as_ref(), caller).await?,
        };
        if store_ids.is_empty() {
            return Ok(Vec::new());
        }

        let filter = ProductFilter {
            store_ids: Some(store_ids),
            status: query.status,
            search: query.search.filter(|s| !s.trim().is_empty()),
            ai_generated: None,
            limit: clamp_limit(query.limit, 50),
            offset: query.offset.unwrap_or(0).max(0),
        };
        Ok(self.products.list(&filter).await?)
    }

    /// Get one of the caller's products.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` or `ServiceError::Forbidden`.
    pub async fn get(&self, id: ProductId, caller: UserId) -> Result<Product, ServiceError> {
        owned_product(self.stores.as_ref(), self.products.as_ref(), id, caller).await
    }

    /// Create a product in one of the caller's stores.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for an empty title and the store
    /// ownership errors of [`super::owned_store`].
    #[instrument(skip(self, product), fields(store_id = %product.store_id))]
    pub async fn create(
        &self,
        caller: UserId,
        product: NewProduct,
    ) -> Result<Product, ServiceError> {
        validate_title(&product.title)?;
        owned_store(self.stores.as_ref(), product.store_id, caller).await?;
        let product = self.products.create(product).await?;
        tracing::info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for an empty title,
    /// `ServiceError::NotFound` or `ServiceError::Forbidden`.
    #[instrument(skip(self, update))]
    pub async fn update(
        &self,
        id: ProductId,
        caller: UserId,
        update: ProductUpdate,
    ) -> Result<Product, ServiceError> {
        if let Some(title) = &update.title {
            validate_title(title)?;
        }
        self.get(id, caller).await?;
        self.products
            .update(id, &update)
            .await
            .map_err(ServiceError::missing("product"))
    }

    /// Delete one of the caller's products.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` or `ServiceError::Forbidden`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ProductId, caller: UserId) -> Result<(), ServiceError> {
        self.get(id, caller).await?;
        if !self.products.delete(id).await? {
            return Err(ServiceError::NotFound("product"));
        }
        Ok(())
    }

    /// Create many products, one at a time.
    ///
    /// Each row is validated and inserted on its own; a failing row is
    /// reported with its index and the rest continue.
    ///
    /// # Errors
    ///
    /// Currently infallible at the run level; per-row failures are returned
    /// in the result.
    #[instrument(skip(self, rows), fields(count = rows.len()))]
    pub async fn bulk_import(
        &self,
        caller: UserId,
        rows: Vec<NewProduct>,
    ) -> Result<BulkImport, ServiceError> {
        let mut products = Vec::new();
        let mut errors = Vec::new();

        for (index, row) in rows.into_iter().enumerate() {
            match self.create(caller, row).await {
                Ok(product) => products.push(product),
                Err(e) => errors.push(ImportError {
                    index,
                    error: e.to_string(),
                }),
            }
        }

        tracing::info!(created = products.len(), failed = errors.len(), "Bulk import finished");
        Ok(BulkImport {
            created: products.len(),
            errors,
            products,
        })
    }
}

fn validate_title(title: &str) -> Result<(), ServiceError> {
    if title.trim().is_empty() {
        return Err(ServiceError::Validation("title must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::db::Repositories;
    use crate::models::{NewStore, Store};

    struct Harness {
        catalog: CatalogService,
        repos: Repositories,
        owner: UserId,
        store: Store,
    }

    async fn connect(repos: &Repositories, owner: UserId, shop: &str) -> Store {
        repos
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

    async fn harness() -> Harness {
        let repos = Repositories::in_memory();
        let owner = UserId::generate();
        let store = connect(&repos, owner, "green-leaf").await;
        Harness {
            catalog: CatalogService::new(repos.stores.clone(), repos.products.clone()),
            repos,
            owner,
            store,
        }
    }

    fn new_product(store_id: StoreId, title: &str) -> NewProduct {
        serde_json::from_value(serde_json::json!({
            "store_id": store_id,
            "title": title,
            "price": "35.00",
            "strain_type": "sativa"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_defaults_to_draft() {
        let h = harness().await;
        let p = h
            .catalog
            .create(h.owner, new_product(h.store.id, "Sour Diesel"))
            .await
            .unwrap();
        assert_eq!(p.status, ProductStatus::Draft);
        assert!(!p.synced_to_shopify);
    }

    #[tokio::test]
    async fn test_create_in_foreign_store_is_forbidden() {
        let h = harness().await;
        let err = h
            .catalog
            .create(UserId::generate(), new_product(h.store.id, "Sour Diesel"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
    }

    #[tokio::test]
    async fn test_list_is_scoped_and_searchable() {
        let h = harness().await;
        let other_owner = UserId::generate();
        let other = connect(&h.repos, other_owner, "other-shop").await;

        h.catalog
            .create(h.owner, new_product(h.store.id, "Sour Diesel"))
            .await
            .unwrap();
        h.catalog
            .create(h.owner, new_product(h.store.id, "Blue Dream"))
            .await
            .unwrap();
        h.catalog
            .create(other_owner, new_product(other.id, "Sour Tangie"))
            .await
            .unwrap();

        let mine = h.catalog.list(h.owner, ProductQuery::default()).await.unwrap();
        assert_eq!(mine.len(), 2);

        let sour = h
            .catalog
            .list(
                h.owner,
                ProductQuery {
                    search: Some("SOUR".to_string()),
                    ..ProductQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(sour.len(), 1);
        assert_eq!(sour.first().unwrap().title, "Sour Diesel");

        let err = h
            .catalog
            .list(
                h.owner,
                ProductQuery {
                    store_id: Some(other.id),
                    ..ProductQuery::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
    }

    #[tokio::test]
    async fn test_list_without_stores_is_empty() {
        let h = harness().await;
        let none = h
            .catalog
            .list(UserId::generate(), ProductQuery::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let h = harness().await;
        let p = h
            .catalog
            .create(h.owner, new_product(h.store.id, "Sour Diesel"))
            .await
            .unwrap();

        let updated = h
            .catalog
            .update(
                p.id,
                h.owner,
                ProductUpdate {
                    status: Some(ProductStatus::Active),
                    ..ProductUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, ProductStatus::Active);
        assert_eq!(updated.title, "Sour Diesel");

        let err = h
            .catalog
            .update(
                p.id,
                h.owner,
                ProductUpdate {
                    title: Some(String::new()),
                    ..ProductUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        h.catalog.delete(p.id, h.owner).await.unwrap();
        let err = h.catalog.get(p.id, h.owner).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("product")));
    }

    #[tokio::test]
    async fn test_bulk_import_reports_row_errors() {
        let h = harness().await;
        let rows = vec![
            new_product(h.store.id, "Sour Diesel"),
            new_product(h.store.id, "   "),
            new_product(StoreId::generate(), "Orphan"),
            new_product(h.store.id, "Blue Dream"),
        ];

        let result = h.catalog.bulk_import(h.owner, rows).await.unwrap();
        assert_eq!(result.created, 2);
        let failed: Vec<usize> = result.errors.iter().map(|e| e.index).collect();
        assert_eq!(failed, vec![1, 2]);
        assert_eq!(result.errors.get(1).unwrap().error, "store not found");
    }
}
