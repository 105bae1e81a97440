//! Product repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use amts_core::{ProductId, ProductStatus, StoreId, StrainType};

use super::RepositoryError;
use crate::models::{
    CannabisProfile, NewProduct, Product, ProductFilter, ProductUpdate, SyncedFields,
};

/// Storage for catalog products.
///
/// `(store_id, shopify_product_id)` is unique when the remote id is set.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Insert a hand-made product.
    async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError>;

    /// Get a product by id.
    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Get the product mirroring a remote product.
    async fn find_by_remote_id(
        &self,
        store_id: StoreId,
        shopify_product_id: i64,
    ) -> Result<Option<Product>, RepositoryError>;

    /// Apply a partial update. Fails with `NotFound` for an unknown id.
    async fn update(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, RepositoryError>;

    /// Insert or refresh the product mirroring a remote product.
    ///
    /// An existing record keeps its id, `created_at`, cannabis attributes,
    /// SEO fields and AI flag.
    async fn upsert_synced(&self, fields: SyncedFields) -> Result<Product, RepositoryError>;

    /// Record the remote id after an export and flag the product synced.
    async fn mark_exported(
        &self,
        id: ProductId,
        shopify_product_id: i64,
    ) -> Result<Product, RepositoryError>;

    /// Remove a product. Returns `false` if it did not exist.
    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError>;

    /// List products matching `filter`, newest first.
    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError>;

    /// Count products matching `filter`, ignoring paging.
    async fn count(&self, filter: &ProductFilter) -> Result<i64, RepositoryError>;
}

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    store_id: Uuid,
    shopify_product_id: Option<i64>,
    title: String,
    description: Option<String>,
    price: Option<Decimal>,
    compare_at_price: Option<Decimal>,
    sku: Option<String>,
    barcode: Option<String>,
    inventory_quantity: i32,
    tags: Vec<String>,
    images: Vec<String>,
    product_type: Option<String>,
    vendor: Option<String>,
    status: ProductStatus,
    strain_type: Option<StrainType>,
    thc_percentage: Option<f64>,
    cbd_percentage: Option<f64>,
    terpenes: Vec<String>,
    effects: Vec<String>,
    flavors: Vec<String>,
    grow_method: Option<String>,
    lineage: Option<String>,
    lab_tested: bool,
    lab_results_url: Option<String>,
    seo_title: Option<String>,
    seo_description: Option<String>,
    ai_generated: bool,
    synced_to_shopify: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::from_uuid(row.id),
            store_id: StoreId::from_uuid(row.store_id),
            shopify_product_id: row.shopify_product_id,
            title: row.title,
            description: row.description,
            price: row.price,
            compare_at_price: row.compare_at_price,
            sku: row.sku,
            barcode: row.barcode,
            inventory_quantity: row.inventory_quantity,
            tags: row.tags,
            images: row.images,
            product_type: row.product_type,
            vendor: row.vendor,
            status: row.status,
            cannabis: CannabisProfile {
                strain_type: row.strain_type,
                thc_percentage: row.thc_percentage,
                cbd_percentage: row.cbd_percentage,
                terpenes: row.terpenes,
                effects: row.effects,
                flavors: row.flavors,
                grow_method: row.grow_method,
                lineage: row.lineage,
                lab_tested: row.lab_tested,
                lab_results_url: row.lab_results_url,
            },
            seo_title: row.seo_title,
            seo_description: row.seo_description,
            ai_generated: row.ai_generated,
            synced_to_shopify: row.synced_to_shopify,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const PRODUCT_COLUMNS: &str = "id, store_id, shopify_product_id, title, description, price, \
     compare_at_price, sku, barcode, inventory_quantity, tags, images, product_type, vendor, \
     status, strain_type, thc_percentage, cbd_percentage, terpenes, effects, flavors, \
     grow_method, lineage, lab_tested, lab_results_url, seo_title, seo_description, \
     ai_generated, synced_to_shopify, created_at, updated_at";

const PRODUCT_FILTER: &str = "($1::uuid[] IS NULL OR store_id = ANY($1)) \
     AND ($2::product_status IS NULL OR status = $2) \
     AND ($3::text IS NULL OR title ILIKE '%' || $3 || '%') \
     AND ($4::boolean IS NULL OR ai_generated = $4)";

fn store_uuids(filter: &ProductFilter) -> Option<Vec<Uuid>> {
    filter
        .store_ids
        .as_ref()
        .map(|ids| ids.iter().map(StoreId::as_uuid).collect())
}

// =============================================================================
// PostgreSQL Repository
// =============================================================================

/// `PostgreSQL`-backed [`ProductRepository`].
pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, product: &Product) -> Result<Product, RepositoryError> {
        let sql = format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                     $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31) \
             RETURNING {PRODUCT_COLUMNS}"
        );

        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(product.id)
            .bind(product.store_id)
            .bind(product.shopify_product_id)
            .bind(&product.title)
            .bind(&product.description)
            .bind(product.price)
            .bind(product.compare_at_price)
            .bind(&product.sku)
            .bind(&product.barcode)
            .bind(product.inventory_quantity)
            .bind(&product.tags)
            .bind(&product.images)
            .bind(&product.product_type)
            .bind(&product.vendor)
            .bind(product.status)
            .bind(product.cannabis.strain_type)
            .bind(product.cannabis.thc_percentage)
            .bind(product.cannabis.cbd_percentage)
            .bind(&product.cannabis.terpenes)
            .bind(&product.cannabis.effects)
            .bind(&product.cannabis.flavors)
            .bind(&product.cannabis.grow_method)
            .bind(&product.cannabis.lineage)
            .bind(product.cannabis.lab_tested)
            .bind(&product.cannabis.lab_results_url)
            .bind(&product.seo_title)
            .bind(&product.seo_description)
            .bind(product.ai_generated)
            .bind(product.synced_to_shopify)
            .bind(product.created_at)
            .bind(product.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "remote product already mirrored"))?;

        Ok(row.into())
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        self.insert(&product.into_product(Utc::now())).await
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn find_by_remote_id(
        &self,
        store_id: StoreId,
        shopify_product_id: i64,
    ) -> Result<Option<Product>, RepositoryError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE store_id = $1 AND shopify_product_id = $2"
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(store_id)
            .bind(shopify_product_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn update(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let sql = format!(
            "UPDATE products SET \
                title = COALESCE($2, title), \
                description = COALESCE($3, description), \
                price = COALESCE($4, price), \
                compare_at_price = COALESCE($5, compare_at_price), \
                sku = COALESCE($6, sku), \
                barcode = COALESCE($7, barcode), \
                inventory_quantity = COALESCE($8, inventory_quantity), \
                tags = COALESCE($9, tags), \
                images = COALESCE($10, images), \
                product_type = COALESCE($11, product_type), \
                vendor = COALESCE($12, vendor), \
                status = COALESCE($13, status), \
                strain_type = COALESCE($14, strain_type), \
                thc_percentage = COALESCE($15, thc_percentage), \
                cbd_percentage = COALESCE($16, cbd_percentage), \
                terpenes = COALESCE($17, terpenes), \
                effects = COALESCE($18, effects), \
                flavors = COALESCE($19, flavors), \
                grow_method = COALESCE($20, grow_method), \
                lineage = COALESCE($21, lineage), \
                lab_tested = COALESCE($22, lab_tested), \
                lab_results_url = COALESCE($23, lab_results_url), \
                seo_title = COALESCE($24, seo_title), \
                seo_description = COALESCE($25, seo_description), \
                ai_generated = COALESCE($26, ai_generated), \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {PRODUCT_COLUMNS}"
        );

        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .bind(&update.title)
            .bind(&update.description)
            .bind(update.price)
            .bind(update.compare_at_price)
            .bind(&update.sku)
            .bind(&update.barcode)
            .bind(update.inventory_quantity)
            .bind(&update.tags)
            .bind(&update.images)
            .bind(&update.product_type)
            .bind(&update.vendor)
            .bind(update.status)
            .bind(update.strain_type)
            .bind(update.thc_percentage)
            .bind(update.cbd_percentage)
            .bind(&update.terpenes)
            .bind(&update.effects)
            .bind(&update.flavors)
            .bind(&update.grow_method)
            .bind(&update.lineage)
            .bind(update.lab_tested)
            .bind(&update.lab_results_url)
            .bind(&update.seo_title)
            .bind(&update.seo_description)
            .bind(update.ai_generated)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    async fn upsert_synced(&self, fields: SyncedFields) -> Result<Product, RepositoryError> {
        let product = fields.into_product(Utc::now());
        let sql = format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                     $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31) \
             ON CONFLICT (store_id, shopify_product_id) WHERE shopify_product_id IS NOT NULL \
             DO UPDATE SET \
                title = EXCLUDED.title, \
                description = EXCLUDED.description, \
                price = EXCLUDED.price, \
                compare_at_price = EXCLUDED.compare_at_price, \
                sku = EXCLUDED.sku, \
                barcode = EXCLUDED.barcode, \
                inventory_quantity = EXCLUDED.inventory_quantity, \
                tags = EXCLUDED.tags, \
                images = EXCLUDED.images, \
                product_type = EXCLUDED.product_type, \
                vendor = EXCLUDED.vendor, \
                status = EXCLUDED.status, \
                synced_to_shopify = TRUE, \
                updated_at = EXCLUDED.updated_at \
             RETURNING {PRODUCT_COLUMNS}"
        );

        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(product.id)
            .bind(product.store_id)
            .bind(product.shopify_product_id)
            .bind(&product.title)
            .bind(&product.description)
            .bind(product.price)
            .bind(product.compare_at_price)
            .bind(&product.sku)
            .bind(&product.barcode)
            .bind(product.inventory_quantity)
            .bind(&product.tags)
            .bind(&product.images)
            .bind(&product.product_type)
            .bind(&product.vendor)
            .bind(product.status)
            .bind(product.cannabis.strain_type)
            .bind(product.cannabis.thc_percentage)
            .bind(product.cannabis.cbd_percentage)
            .bind(&product.cannabis.terpenes)
            .bind(&product.cannabis.effects)
            .bind(&product.cannabis.flavors)
            .bind(&product.cannabis.grow_method)
            .bind(&product.cannabis.lineage)
            .bind(product.cannabis.lab_tested)
            .bind(&product.cannabis.lab_results_url)
            .bind(&product.seo_title)
            .bind(&product.seo_description)
            .bind(product.ai_generated)
            .bind(product.synced_to_shopify)
            .bind(product.created_at)
            .bind(product.updated_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn mark_exported(
        &self,
        id: ProductId,
        shopify_product_id: i64,
    ) -> Result<Product, RepositoryError> {
        let sql = format!(
            "UPDATE products \
             SET shopify_product_id = $2, synced_to_shopify = TRUE, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {PRODUCT_COLUMNS}"
        );

        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .bind(shopify_product_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "remote product already mirrored"))?
            .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE {PRODUCT_FILTER} \
             ORDER BY created_at DESC LIMIT $5 OFFSET $6"
        );

        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(store_uuids(filter))
            .bind(filter.status)
            .bind(&filter.search)
            .bind(filter.ai_generated)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self, filter: &ProductFilter) -> Result<i64, RepositoryError> {
        let sql = format!("SELECT COUNT(*) FROM products WHERE {PRODUCT_FILTER}");
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(store_uuids(filter))
            .bind(filter.status)
            .bind(&filter.search)
            .bind(filter.ai_generated)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
