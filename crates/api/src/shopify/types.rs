//! Shopify Admin REST resource shapes.
//!
//! Only the fields the platform reads or writes are modeled; unknown fields
//! are ignored on deserialization.

use serde::{Deserialize, Serialize};

/// Shop metadata from `GET /shop.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shop {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub myshopify_domain: Option<String>,
    #[serde(default)]
    pub plan_name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub products_count: Option<i32>,
}

/// A product as Shopify represents it.
///
/// Used both for reads and for create/update payloads. `tags` is a single
/// comma-separated string on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteProduct {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, deserialize_with = "nullable_string")]
    pub tags: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub variants: Vec<RemoteVariant>,
    #[serde(default)]
    pub images: Vec<RemoteImage>,
}

/// A product variant. Prices are decimal strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteVariant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_quantity: Option<i32>,
}

/// A product image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub src: String,
}

/// One page of products plus the cursor for the next page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProductPage {
    pub products: Vec<RemoteProduct>,
    pub next_page_info: Option<String>,
}

/// An online store theme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// A theme asset. `value` is only present when a single asset is fetched or
/// written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeAsset {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A metafield attached to a Shopify resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metafield {
    #[serde(default)]
    pub id: Option<i64>,
    pub namespace: String,
    pub key: String,
    pub value: serde_json::Value,
    #[serde(rename = "type", default)]
    pub value_type: Option<String>,
}

/// Input for creating a metafield.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMetafield {
    pub namespace: String,
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: String,
}

/// Resources that can own metafields through the REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetafieldOwner {
    Product,
    Collection,
    Customer,
    Page,
}

impl MetafieldOwner {
    /// Path segment used in `/{resource}/{id}/metafields.json`.
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Product => "products",
            Self::Collection => "collections",
            Self::Customer => "customers",
            Self::Page => "pages",
        }
    }
}

impl RemoteProduct {
    /// Tags split on commas, trimmed, with empty entries dropped.
    #[must_use]
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// The first variant, which carries the product's pricing.
    #[must_use]
    pub fn first_variant(&self) -> Option<&RemoteVariant> {
        self.variants.first()
    }
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_list_splits_and_trims() {
        let product = RemoteProduct {
            tags: "indica, relaxing,,  evening ".to_string(),
            ..RemoteProduct::default()
        };
        assert_eq!(product.tag_list(), vec!["indica", "relaxing", "evening"]);
    }

    #[test]
    fn test_tag_list_empty() {
        assert!(RemoteProduct::default().tag_list().is_empty());
    }

    #[test]
    fn test_deserialize_rest_product() {
        let json = r#"{
            "id": 501,
            "title": "Blue Dream 3.5g",
            "body_html": null,
            "tags": null,
            "status": "active",
            "variants": [{"id": 9, "price": "35.00", "sku": "BD35", "inventory_quantity": 12}],
            "images": [{"id": 1, "src": "https://cdn.example.com/bd.png"}],
            "admin_graphql_api_id": "gid://shopify/Product/501"
        }"#;
        let product: RemoteProduct = serde_json::from_str(json).unwrap();
        assert_eq!(product.id, Some(501));
        assert_eq!(product.tags, "");
        assert_eq!(product.first_variant().unwrap().price.as_deref(), Some("35.00"));
        assert_eq!(product.images.first().unwrap().src, "https://cdn.example.com/bd.png");
    }

    #[test]
    fn test_serialize_omits_absent_fields() {
        let product = RemoteProduct {
            title: "Pre-roll".to_string(),
            ..RemoteProduct::default()
        };
        let value = serde_json::to_value(&product).unwrap();
        assert!(value.get("id").is_none());
        assert!(value.get("status").is_none());
        assert_eq!(value["title"], "Pre-roll");
    }

    #[test]
    fn test_metafield_owner_segments() {
        assert_eq!(MetafieldOwner::Product.path_segment(), "products");
        assert_eq!(MetafieldOwner::Page.path_segment(), "pages");
    }
}
