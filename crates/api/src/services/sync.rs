//! Catalog synchronization between Shopify and the local product registry.
//!
//! An import pages through the remote catalog and upserts each product keyed by
//! `(store_id, shopify_product_id)`. A product that fails to map or save is
//! reported and skipped; a page that fails to load aborts the run, keeping
//! whatever earlier pages already wrote.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use amts_core::{ProductId, ProductStatus, StoreId, UserId};

use super::{ServiceError, StoreConnectionManager};
use crate::db::{ProductRepository, StoreRepository};
use crate::models::{Product, SyncedFields};
use crate::shopify::{RemoteImage, RemoteProduct, RemoteVariant};

/// Products requested per page.
pub const PAGE_SIZE: u32 = 250;
/// Pages fetched per run at most.
pub const MAX_PAGES: u32 = 20;

/// Outcome of a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    pub errors: Vec<SyncItemError>,
    pub last_synced: DateTime<Utc>,
}

/// A remote product that could not be imported.
#[derive(Debug, Clone, Serialize)]
pub struct SyncItemError {
    pub product_id: Option<i64>,
    pub error: String,
}

/// Outcome of a product export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub success: bool,
    pub shopify_product_id: i64,
}

/// Runs imports and exports for connected stores.
#[derive(Clone)]
pub struct SyncOrchestrator {
    connections: StoreConnectionManager,
    stores: Arc<dyn StoreRepository>,
    products: Arc<dyn ProductRepository>,
    page_size: u32,
    max_pages: u32,
}

impl SyncOrchestrator {
    /// Create an orchestrator with the default paging.
    #[must_use]
    pub fn new(
        connections: StoreConnectionManager,
        stores: Arc<dyn StoreRepository>,
        products: Arc<dyn ProductRepository>,
    ) -> Self {
        Self {
            connections,
            stores,
            products,
            page_size: PAGE_SIZE,
            max_pages: MAX_PAGES,
        }
    }

    /// Override page size and page cap.
    #[must_use]
    pub fn with_paging(mut self, page_size: u32, max_pages: u32) -> Self {
        self.page_size = page_size;
        self.max_pages = max_pages;
        self
    }

    /// Import a store's remote catalog.
    ///
    /// # Errors
    ///
    /// - `ServiceError::NotFound` / `ServiceError::Forbidden` for a store the
    ///   caller cannot see.
    /// - `ServiceError::NotConnected` without a usable token.
    /// - `ServiceError::SyncFailed` if a page cannot be fetched.
    #[tracing::instrument(skip(self))]
    pub async fn sync_store(
        &self,
        store_id: StoreId,
        caller: UserId,
    ) -> Result<SyncReport, ServiceError> {
        let store = self.connections.owned_store(store_id, caller).await?;
        let client = self.connections.client_for(&store).await?;

        let mut synced = 0usize;
        let mut errors = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 0..self.max_pages {
            let batch = client
                .list_products(self.page_size, cursor.as_deref())
                .await
                .map_err(|e| {
                    tracing::error!(store_id = %store.id, page, error = %e, "Product page fetch failed");
                    ServiceError::SyncFailed(e.to_string())
                })?;

            for remote in &batch.products {
                match self.import_one(store.id, remote).await {
                    Ok(_) => synced += 1,
                    Err(error) => {
                        tracing::warn!(store_id = %store.id, remote_id = ?remote.id, %error, "Skipping product");
                        errors.push(SyncItemError {
                            product_id: remote.id,
                            error,
                        });
                    }
                }
            }

            cursor = batch.next_page_info;
            if cursor.is_none() {
                break;
            }
            if page + 1 == self.max_pages {
                tracing::warn!(store_id = %store.id, max_pages = self.max_pages, "Page cap reached, catalog truncated");
            }
        }

        let last_synced = Utc::now();
        self.stores
            .record_sync(
                store.id,
                last_synced,
                i32::try_from(synced).unwrap_or(i32::MAX),
            )
            .await?;

        tracing::info!(store_id = %store.id, synced, failed = errors.len(), "Catalog synced");
        Ok(SyncReport {
            synced,
            errors,
            last_synced,
        })
    }

    async fn import_one(&self, store_id: StoreId, remote: &RemoteProduct) -> Result<Product, String> {
        let fields = map_remote_product(store_id, remote)?;
        self.products
            .upsert_synced(fields)
            .await
            .map_err(|e| e.to_string())
    }

    /// Push a local product to Shopify, creating or updating it.
    ///
    /// # Errors
    ///
    /// - `ServiceError::NotFound` / `ServiceError::Forbidden` as for
    ///   [`Self::sync_store`], and `NotFound` if the product belongs to
    ///   another store.
    /// - `ServiceError::ExportFailed` if Shopify rejects the write.
    #[tracing::instrument(skip(self))]
    pub async fn export_product(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        caller: UserId,
    ) -> Result<ExportResult, ServiceError> {
        let store = self.connections.owned_store(store_id, caller).await?;
        let product = self
            .products
            .get(product_id)
            .await?
            .filter(|p| p.store_id == store.id)
            .ok_or(ServiceError::NotFound("product"))?;
        let client = self.connections.client_for(&store).await?;

        let payload = to_remote_product(&product);
        let written = match product.shopify_product_id {
            Some(id) => client.update_product(id, &payload).await,
            None => client.create_product(&payload).await,
        }
        .map_err(|e| {
            tracing::error!(product_id = %product.id, error = %e, "Product export failed");
            ServiceError::ExportFailed(e.to_string())
        })?;

        let remote_id = written
            .id
            .or(product.shopify_product_id)
            .ok_or_else(|| ServiceError::ExportFailed("Shopify returned no product id".into()))?;
        self.products
            .mark_exported(product.id, remote_id)
            .await
            .map_err(ServiceError::missing("product"))?;

        Ok(ExportResult {
            success: true,
            shopify_product_id: remote_id,
        })
    }
}

fn parse_price(raw: Option<&str>, field: &str) -> Result<Option<Decimal>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Decimal::from_str(s)
            .map(Some)
            .map_err(|_| format!("invalid {field} '{s}'")),
    }
}

/// Map a remote product onto the fields a sync owns.
///
/// Pricing, SKU, barcode and stock come from the first variant only.
///
/// # Errors
///
/// Returns a message when the product has no id or an unparseable price.
pub fn map_remote_product(store_id: StoreId, remote: &RemoteProduct) -> Result<SyncedFields, String> {
    let shopify_product_id = remote.id.ok_or("product has no id")?;
    let variant = remote.first_variant();

    Ok(SyncedFields {
        store_id,
        shopify_product_id,
        title: remote.title.clone(),
        description: remote.body_html.clone(),
        price: parse_price(variant.and_then(|v| v.price.as_deref()), "price")?,
        compare_at_price: parse_price(
            variant.and_then(|v| v.compare_at_price.as_deref()),
            "compare_at_price",
        )?,
        sku: variant.and_then(|v| v.sku.clone()),
        barcode: variant.and_then(|v| v.barcode.clone()),
        inventory_quantity: variant.and_then(|v| v.inventory_quantity).unwrap_or(0),
        tags: remote.tag_list(),
        images: remote.images.iter().map(|i| i.src.clone()).collect(),
        product_type: remote.product_type.clone(),
        vendor: remote.vendor.clone(),
        status: ProductStatus::from_remote(remote.status.as_deref()),
    })
}

/// Shape a local product for Shopify: one variant, comma-joined tags.
#[must_use]
pub fn to_remote_product(product: &Product) -> RemoteProduct {
    RemoteProduct {
        id: None,
        title: product.title.clone(),
        body_html: product.description.clone(),
        vendor: product.vendor.clone(),
        product_type: product.product_type.clone(),
        tags: product.tags.join(", "),
        status: Some(product.status.as_str().to_string()),
        variants: vec![RemoteVariant {
            id: None,
            price: product.price.map(|p| p.to_string()),
            compare_at_price: product.compare_at_price.map(|p| p.to_string()),
            sku: product.sku.clone(),
            barcode: product.barcode.clone(),
            inventory_quantity: Some(product.inventory_quantity),
        }],
        images: product
            .images
            .iter()
            .map(|src| RemoteImage {
                id: None,
                src: src.clone(),
            })
            .collect(),
    }
}
