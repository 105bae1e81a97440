//! Catalog products with cannabis attributes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use amts_core::{ProductId, ProductStatus, StoreId, StrainType};

/// Cannabis-specific attributes of a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CannabisProfile {
    pub strain_type: Option<StrainType>,
    pub thc_percentage: Option<f64>,
    pub cbd_percentage: Option<f64>,
    pub terpenes: Vec<String>,
    pub effects: Vec<String>,
    pub flavors: Vec<String>,
    pub grow_method: Option<String>,
    pub lineage: Option<String>,
    pub lab_tested: bool,
    pub lab_results_url: Option<String>,
}

/// A catalog product (domain type).
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    pub shopify_product_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub inventory_quantity: i32,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub product_type: Option<String>,
    pub vendor: Option<String>,
    pub status: ProductStatus,
    #[serde(flatten)]
    pub cannabis: CannabisProfile,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub ai_generated: bool,
    pub synced_to_shopify: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a product by hand or by bulk import.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub store_id: StoreId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub inventory_quantity: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(flatten, default)]
    pub cannabis: CannabisProfile,
    #[serde(default)]
    pub seo_title: Option<String>,
    #[serde(default)]
    pub seo_description: Option<String>,
}

impl NewProduct {
    /// Materialize the record with a fresh id and timestamps.
    #[must_use]
    pub fn into_product(self, now: DateTime<Utc>) -> Product {
        Product {
            id: ProductId::generate(),
            store_id: self.store_id,
            shopify_product_id: None,
            title: self.title,
            description: self.description,
            price: self.price,
            compare_at_price: self.compare_at_price,
            sku: self.sku,
            barcode: self.barcode,
            inventory_quantity: self.inventory_quantity,
            tags: self.tags,
            images: self.images,
            product_type: self.product_type,
            vendor: self.vendor,
            status: self.status,
            cannabis: self.cannabis,
            seo_title: self.seo_title,
            seo_description: self.seo_description,
            ai_generated: false,
            synced_to_shopify: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a product. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub inventory_quantity: Option<i32>,
    pub tags: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
    pub product_type: Option<String>,
    pub vendor: Option<String>,
    pub status: Option<ProductStatus>,
    pub strain_type: Option<StrainType>,
    pub thc_percentage: Option<f64>,
    pub cbd_percentage: Option<f64>,
    pub terpenes: Option<Vec<String>>,
    pub effects: Option<Vec<String>>,
    pub flavors: Option<Vec<String>>,
    pub grow_method: Option<String>,
    pub lineage: Option<String>,
    pub lab_tested: Option<bool>,
    pub lab_results_url: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub ai_generated: Option<bool>,
}

macro_rules! apply_fields {
    ($src:expr, $dst:expr, wrap: [$($w:ident),*], plain: [$($p:ident),*]) => {
        $(if let Some(v) = $src.$w { $dst.$w = Some(v); })*
        $(if let Some(v) = $src.$p { $dst.$p = v; })*
    };
}

impl ProductUpdate {
    /// Apply the set fields to `product`.
    pub fn apply(self, product: &mut Product, now: DateTime<Utc>) {
        apply_fields!(self, product,
            wrap: [description, price, compare_at_price, sku, barcode, product_type, vendor,
                   seo_title, seo_description],
            plain: [title, inventory_quantity, tags, images, status, ai_generated]);
        apply_fields!(self, product.cannabis,
            wrap: [strain_type, thc_percentage, cbd_percentage, grow_method, lineage,
                   lab_results_url],
            plain: [terpenes, effects, flavors, lab_tested]);
        product.updated_at = now;
    }
}

/// Remote-sourced fields written by a catalog sync.
///
/// Anything not listed here (cannabis attributes, SEO, the AI flag) belongs
/// to the merchant and survives a sync untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedFields {
    pub store_id: StoreId,
    pub shopify_product_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub inventory_quantity: i32,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub product_type: Option<String>,
    pub vendor: Option<String>,
    pub status: ProductStatus,
}

impl SyncedFields {
    /// Overwrite the remote-sourced fields of an existing product.
    pub fn apply(&self, product: &mut Product, now: DateTime<Utc>) {
        product.shopify_product_id = Some(self.shopify_product_id);
        product.title.clone_from(&self.title);
        product.description.clone_from(&self.description);
        product.price = self.price;
        product.compare_at_price = self.compare_at_price;
        product.sku.clone_from(&self.sku);
        product.barcode.clone_from(&self.barcode);
        product.inventory_quantity = self.inventory_quantity;
        product.tags.clone_from(&self.tags);
        product.images.clone_from(&self.images);
        product.product_type.clone_from(&self.product_type);
        product.vendor.clone_from(&self.vendor);
        product.status = self.status;
        product.synced_to_shopify = true;
        product.updated_at = now;
    }

    /// A new product built entirely from remote data.
    #[must_use]
    pub fn into_product(self, now: DateTime<Utc>) -> Product {
        Product {
            id: ProductId::generate(),
            store_id: self.store_id,
            shopify_product_id: Some(self.shopify_product_id),
            title: self.title,
            description: self.description,
            price: self.price,
            compare_at_price: self.compare_at_price,
            sku: self.sku,
            barcode: self.barcode,
            inventory_quantity: self.inventory_quantity,
            tags: self.tags,
            images: self.images,
            product_type: self.product_type,
            vendor: self.vendor,
            status: self.status,
            cannabis: CannabisProfile::default(),
            seo_title: None,
            seo_description: None,
            ai_generated: false,
            synced_to_shopify: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filters for product listings.
#[derive(Debug, Clone)]
pub struct ProductFilter {
    /// Restrict to these stores. `None` means every store.
    pub store_ids: Option<Vec<StoreId>>,
    pub status: Option<ProductStatus>,
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
    pub ai_generated: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            store_ids: None,
            status: None,
            search: None,
            ai_generated: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl ProductFilter {
    /// Whether `product` passes every set filter.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        self.store_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&product.store_id))
            && self.status.is_none_or(|s| product.status == s)
            && self.ai_generated.is_none_or(|flag| product.ai_generated == flag)
            && self.search.as_deref().is_none_or(|needle| {
                product
                    .title
                    .to_lowercase()
                    .contains(&needle.to_lowercase())
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product() -> Product {
        let new: NewProduct = serde_json::from_value(serde_json::json!({
            "store_id": StoreId::generate(),
            "title": "Blue Dream 3.5g",
            "price": "35.00",
            "strain_type": "hybrid",
            "thc_percentage": 21.5,
            "effects": ["relaxed", "creative"]
        }))
        .unwrap();
        new.into_product(Utc::now())
    }

    #[test]
    fn test_new_product_defaults() {
        let p = product();
        assert_eq!(p.status, ProductStatus::Draft);
        assert_eq!(p.price, Some(Decimal::new(3500, 2)));
        assert_eq!(p.cannabis.strain_type, Some(StrainType::Hybrid));
        assert_eq!(p.cannabis.effects, vec!["relaxed", "creative"]);
        assert!(!p.synced_to_shopify);
        assert!(!p.ai_generated);
    }

    #[test]
    fn test_serialize_flattens_cannabis_profile() {
        let value = serde_json::to_value(product()).unwrap();
        assert_eq!(value["strain_type"], "hybrid");
        assert_eq!(value["title"], "Blue Dream 3.5g");
        assert!(value.get("cannabis").is_none());
    }

    #[test]
    fn test_update_applies_only_set_fields() {
        let mut p = product();
        let update: ProductUpdate = serde_json::from_value(serde_json::json!({
            "status": "active",
            "lab_tested": true,
            "seo_title": "Blue Dream | Green Leaf"
        }))
        .unwrap();
        update.apply(&mut p, Utc::now());

        assert_eq!(p.status, ProductStatus::Active);
        assert!(p.cannabis.lab_tested);
        assert_eq!(p.seo_title.as_deref(), Some("Blue Dream | Green Leaf"));
        assert_eq!(p.title, "Blue Dream 3.5g");
        assert_eq!(p.cannabis.thc_percentage, Some(21.5));
    }

    #[test]
    fn test_synced_fields_preserve_merchant_data() {
        let mut p = product();
        p.seo_description = Some("Hand-written".to_string());
        p.ai_generated = true;
        let id = p.id;
        let created_at = p.created_at;

        SyncedFields {
            store_id: p.store_id,
            shopify_product_id: 501,
            title: "Blue Dream 7g".to_string(),
            description: None,
            price: Some(Decimal::new(6000, 2)),
            compare_at_price: None,
            sku: Some("BD7".to_string()),
            barcode: None,
            inventory_quantity: 4,
            tags: vec!["indica".to_string()],
            images: vec![],
            product_type: None,
            vendor: None,
            status: ProductStatus::Active,
        }
        .apply(&mut p, Utc::now());

        assert_eq!(p.id, id);
        assert_eq!(p.created_at, created_at);
        assert_eq!(p.title, "Blue Dream 7g");
        assert_eq!(p.shopify_product_id, Some(501));
        assert!(p.synced_to_shopify);
        assert!(p.ai_generated);
        assert_eq!(p.seo_description.as_deref(), Some("Hand-written"));
        assert_eq!(p.cannabis.strain_type, Some(StrainType::Hybrid));
    }

    #[test]
    fn test_filter_search_and_scope() {
        let p = product();
        let filter = ProductFilter {
            store_ids: Some(vec![p.store_id]),
            search: Some("blue".to_string()),
            ..ProductFilter::default()
        };
        assert!(filter.matches(&p));

        let filter = ProductFilter {
            store_ids: Some(vec![StoreId::generate()]),
            ..ProductFilter::default()
        };
        assert!(!filter.matches(&p));
    }
}
