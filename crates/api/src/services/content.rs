//! AI product copy.
//!
//! Descriptions and SEO metadata come from `OpenAI` when a key is
//! configured. Without one, a deterministic strain-based description is
//! returned so the dashboard stays usable in development.

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use amts_core::{ProductId, StrainType, SubscriptionTier, UserId};

use super::{ServiceError, owned_product, store_ids_of};
use crate::db::{ProductRepository, StoreRepository};
use crate::models::{Product, ProductFilter, ProductUpdate, User};
use crate::openai::{ChatMessage, CompletionParams, OpenAiClient, TextStream};

const COPYWRITER_ROLE: &str =
    "You are an expert cannabis copywriter who writes compelling, compliant product descriptions.";

const DESCRIPTION_PARAMS: CompletionParams = CompletionParams {
    temperature: 0.7,
    max_tokens: 500,
};

const SEO_PARAMS: CompletionParams = CompletionParams {
    temperature: 0.5,
    max_tokens: 200,
};

/// Longest meta title search engines display.
pub const META_TITLE_MAX: usize = 60;
/// Longest meta description search engines display.
pub const META_DESCRIPTION_MAX: usize = 160;

/// Voice of the generated copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Professional,
    Casual,
    Luxury,
    Playful,
    Educational,
}

impl Tone {
    const fn guide(self) -> &'static str {
        match self {
            Self::Professional => "professional and informative",
            Self::Casual => "casual and approachable",
            Self::Luxury => "sophisticated and premium",
            Self::Playful => "playful and energetic",
            Self::Educational => "educational and detailed",
        }
    }
}

/// Target length of the generated copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Length {
    Short,
    #[default]
    Medium,
    Long,
}

impl Length {
    const fn guide(self) -> &'static str {
        match self {
            Self::Short => "2-3 sentences",
            Self::Medium => "1-2 paragraphs",
            Self::Long => "3-4 paragraphs with detailed information",
        }
    }
}

/// What to write about and how.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DescriptionRequest {
    pub product_name: String,
    pub product_type: Option<String>,
    pub brand: Option<String>,
    pub strain_type: Option<StrainType>,
    pub thc_percentage: Option<f64>,
    pub cbd_percentage: Option<f64>,
    pub terpenes: Vec<String>,
    pub effects: Vec<String>,
    pub flavors: Vec<String>,
    pub tone: Tone,
    pub length: Length,
}

impl DescriptionRequest {
    /// Describe a stored product.
    #[must_use]
    pub fn for_product(product: &Product, tone: Tone, length: Length) -> Self {
        Self {
            product_name: product.title.clone(),
            product_type: product.product_type.clone(),
            brand: product.vendor.clone(),
            strain_type: product.cannabis.strain_type,
            thc_percentage: product.cannabis.thc_percentage,
            cbd_percentage: product.cannabis.cbd_percentage,
            terpenes: product.cannabis.terpenes.clone(),
            effects: product.cannabis.effects.clone(),
            flavors: product.cannabis.flavors.clone(),
            tone,
            length,
        }
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.product_name.trim().is_empty() {
            return Err(ServiceError::Validation(
                "product_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The "Product Information" block of the prompt.
    fn context(&self) -> String {
        let mut lines = vec![format!("Product: {}", self.product_name)];
        if let Some(v) = &self.product_type {
            lines.push(format!("Type: {v}"));
        }
        if let Some(v) = &self.brand {
            lines.push(format!("Brand: {v}"));
        }
        if let Some(v) = self.strain_type {
            lines.push(format!("Strain Type: {v}"));
        }
        if let Some(v) = self.thc_percentage.filter(|p| *p > 0.0) {
            lines.push(format!("THC: {v}%"));
        }
        if let Some(v) = self.cbd_percentage.filter(|p| *p > 0.0) {
            lines.push(format!("CBD: {v}%"));
        }
        for (label, values) in [
            ("Terpenes", &self.terpenes),
            ("Effects", &self.effects),
            ("Flavors", &self.flavors),
        ] {
            if !values.is_empty() {
                lines.push(format!("{label}: {}", values.join(", ")));
            }
        }
        lines.join("\n")
    }

    fn prompt(&self) -> String {
        format!(
            "Write a compelling product description for a cannabis product.\n\n\
             Product Information:\n{context}\n\n\
             Guidelines:\n\
             - Tone: {tone}\n\
             - Length: {length}\n\
             - Focus on what makes this product distinctive\n\
             - Include aroma and flavor details where they apply\n\
             - Describe the experience and occasions it suits\n\
             - Follow cannabis marketing rules: no health or medical claims\n\
             - Never say the product cures, treats or prevents anything\n\n\
             Return only the description text.",
            context = self.context(),
            tone = self.tone.guide(),
            length = self.length.guide(),
        )
    }

    fn messages(&self) -> [ChatMessage; 2] {
        [
            ChatMessage::system(COPYWRITER_ROLE),
            ChatMessage::user(self.prompt()),
        ]
    }
}

/// Search-engine metadata for a product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeoContent {
    pub meta_title: String,
    pub meta_description: String,
}

/// One product's outcome in a bulk run.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDescription {
    pub product_id: ProductId,
    pub title: String,
    pub description: String,
}

/// A product a bulk run could not describe.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationError {
    pub product_id: ProductId,
    pub error: String,
}

/// Result of a bulk generation run.
#[derive(Debug, Clone, Serialize)]
pub struct BulkGeneration {
    pub generated: usize,
    pub errors: Vec<GenerationError>,
    pub results: Vec<GeneratedDescription>,
}

/// Consumption of one allowance. `limit: None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageMeter {
    pub used: i64,
    pub limit: Option<u32>,
    pub remaining: Option<i64>,
}

impl UsageMeter {
    fn new(used: i64, limit: Option<u32>) -> Self {
        Self {
            used,
            limit,
            remaining: limit.map(|l| (i64::from(l) - used).max(0)),
        }
    }
}

/// A user's consumption against their tier's allowances.
#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub user_id: UserId,
    pub tier: SubscriptionTier,
    pub ai_generations: UsageMeter,
    pub products: UsageMeter,
    pub stores: UsageMeter,
}

/// Writes product copy and tracks AI usage.
#[derive(Clone)]
pub struct ContentService {
    client: Option<OpenAiClient>,
    stores: Arc<dyn StoreRepository>,
    products: Arc<dyn ProductRepository>,
}

impl ContentService {
    /// Create a content service. `client: None` selects offline generation.
    #[must_use]
    pub fn new(
        client: Option<OpenAiClient>,
        stores: Arc<dyn StoreRepository>,
        products: Arc<dyn ProductRepository>,
    ) -> Self {
        Self {
            client,
            stores,
            products,
        }
    }

    /// Whether copy comes from the offline generator.
    #[must_use]
    pub const fn is_offline(&self) -> bool {
        self.client.is_none()
    }

    /// Write a product description.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for an empty product name and
    /// `ServiceError::Content` if the completion fails.
    #[instrument(skip(self, request), fields(product = %request.product_name))]
    pub async fn describe(&self, request: &DescriptionRequest) -> Result<String, ServiceError> {
        request.validate()?;
        match &self.client {
            Some(client) => Ok(client.chat(&request.messages(), DESCRIPTION_PARAMS).await?),
            None => Ok(offline_description(
                &request.product_name,
                request.strain_type,
            )),
        }
    }

    /// Write a product description as a stream of text fragments.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for an empty product name and
    /// `ServiceError::Content` if the completion cannot be started.
    #[instrument(skip(self, request), fields(product = %request.product_name))]
    pub async fn describe_stream(
        &self,
        request: &DescriptionRequest,
    ) -> Result<TextStream, ServiceError> {
        request.validate()?;
        match &self.client {
            Some(client) => Ok(client
                .chat_stream(&request.messages(), DESCRIPTION_PARAMS)
                .await?),
            None => {
                let text = offline_description(&request.product_name, request.strain_type);
                let words: Vec<_> = text
                    .split_whitespace()
                    .map(|word| Ok(format!("{word} ")))
                    .collect();
                Ok(futures::stream::iter(words).boxed())
            }
        }
    }

    /// Write a meta title and description.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for an empty product name and
    /// `ServiceError::Content` if the completion fails.
    #[instrument(skip(self, description))]
    pub async fn seo(
        &self,
        product_name: &str,
        description: &str,
    ) -> Result<SeoContent, ServiceError> {
        if product_name.trim().is_empty() {
            return Err(ServiceError::Validation(
                "product_name must not be empty".to_string(),
            ));
        }

        let Some(client) = &self.client else {
            return Ok(SeoContent {
                meta_title: truncate_chars(&format!("{product_name} | Premium Cannabis"), META_TITLE_MAX),
                meta_description: truncate_chars(
                    &format!("Shop {product_name}: premium cannabis, lab tested, delivered fast."),
                    META_DESCRIPTION_MAX,
                ),
            });
        };

        let prompt = format!(
            "Write SEO metadata for this cannabis product.\n\n\
             Product: {product_name}\n\
             Description: {description}\n\n\
             Provide a meta title of 50-60 characters and a meta description of \
             150-160 characters, formatted exactly as:\n\
             META_TITLE: <title>\n\
             META_DESCRIPTION: <description>"
        );
        let reply = client
            .chat(&[ChatMessage::user(prompt)], SEO_PARAMS)
            .await?;
        Ok(parse_seo(&reply))
    }

    /// Write and store a description for one of the caller's products.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` or `ServiceError::Forbidden` for a
    /// product the caller cannot reach, and `ServiceError::Content` if the
    /// completion fails.
    #[instrument(skip(self))]
    pub async fn describe_product(
        &self,
        product_id: ProductId,
        caller: UserId,
        tone: Tone,
        length: Length,
    ) -> Result<Product, ServiceError> {
        let product =
            owned_product(self.stores.as_ref(), self.products.as_ref(), product_id, caller).await?;
        self.write_description(&product, tone, length).await
    }

    /// Describe several products, one at a time.
    ///
    /// A product that is missing, not the caller's, or fails to generate is
    /// reported in `errors` and does not stop the run.
    ///
    /// # Errors
    ///
    /// Currently infallible at the run level; per-product failures are
    /// returned in the result.
    #[instrument(skip(self, product_ids), fields(count = product_ids.len()))]
    pub async fn bulk_generate(
        &self,
        caller: UserId,
        product_ids: &[ProductId],
        tone: Tone,
        length: Length,
    ) -> Result<BulkGeneration, ServiceError> {
        let mut results = Vec::new();
        let mut errors = Vec::new();

        for &product_id in product_ids {
            let outcome = match owned_product(
                self.stores.as_ref(),
                self.products.as_ref(),
                product_id,
                caller,
            )
            .await
            {
                Ok(product) => self.write_description(&product, tone, length).await,
                Err(ServiceError::Forbidden) => Err(ServiceError::NotFound("product")),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(product) => results.push(GeneratedDescription {
                    product_id,
                    title: product.title,
                    description: product.description.unwrap_or_default(),
                }),
                Err(e) => {
                    tracing::warn!(%product_id, error = %e, "Description generation failed");
                    errors.push(GenerationError {
                        product_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(BulkGeneration {
            generated: results.len(),
            errors,
            results,
        })
    }

    /// A user's consumption against their tier limits.
    ///
    /// AI generations are counted as the products currently flagged as
    /// AI-written across the user's stores.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the database operation fails.
    pub async fn usage(&self, user: &User) -> Result<Usage, ServiceError> {
        let store_ids = store_ids_of(self.stores.as_ref(), user.id).await?;
        let stores_used = i64::try_from(store_ids.len()).unwrap_or(i64::MAX);

        let (products_used, generations_used) = if store_ids.is_empty() {
            (0, 0)
        } else {
            let all = ProductFilter {
                store_ids: Some(store_ids),
                ..ProductFilter::default()
            };
            let generated = ProductFilter {
                ai_generated: Some(true),
                ..all.clone()
            };
            (
                self.products.count(&all).await?,
                self.products.count(&generated).await?,
            )
        };

        let limits = user.subscription_tier.limits();
        Ok(Usage {
            user_id: user.id,
            tier: user.subscription_tier,
            ai_generations: UsageMeter::new(generations_used, limits.ai_generations),
            products: UsageMeter::new(products_used, limits.products),
            stores: UsageMeter::new(stores_used, limits.stores),
        })
    }

    async fn write_description(
        &self,
        product: &Product,
        tone: Tone,
        length: Length,
    ) -> Result<Product, ServiceError> {
        let request = DescriptionRequest::for_product(product, tone, length);
        let description = self.describe(&request).await?;
        let update = ProductUpdate {
            description: Some(description),
            ai_generated: Some(true),
            ..ProductUpdate::default()
        };
        self.products
            .update(product.id, &update)
            .await
            .map_err(ServiceError::missing("product"))
    }
}

/// Deterministic copy used when no API key is configured.
#[must_use]
pub fn offline_description(product_name: &str, strain_type: Option<StrainType>) -> String {
    let body = match strain_type.unwrap_or(StrainType::Hybrid) {
        StrainType::Indica => {
            "A deeply relaxing indica with earthy undertones and a smooth finish. \
             It settles in slowly and suits quiet evenings at home."
        }
        StrainType::Sativa => {
            "A bright, uplifting sativa with citrus notes and an energetic onset. \
             It suits daytime plans, creative projects and good company."
        }
        StrainType::Hybrid => {
            "A balanced hybrid that pairs the lift of a sativa with the easy body \
             feel of an indica, layered over a rich and complex flavor profile."
        }
        StrainType::Cbd => {
            "A CBD-forward cultivar with a gentle, clear-headed character and very \
             little intoxication, made for easygoing moments any time of day."
        }
    };

    format!(
        "{product_name}\n\n{body}\n\nCarefully cultivated and lab tested for purity and potency."
    )
}

/// Pull the `META_TITLE:`/`META_DESCRIPTION:` lines out of a completion.
///
/// Missing lines come back empty; values are cut to display length.
#[must_use]
pub fn parse_seo(reply: &str) -> SeoContent {
    let mut meta_title = String::new();
    let mut meta_description = String::new();

    for line in reply.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("META_TITLE:") {
            meta_title = truncate_chars(rest.trim(), META_TITLE_MAX);
        } else if let Some(rest) = line.strip_prefix("META_DESCRIPTION:") {
            meta_description = truncate_chars(rest.trim(), META_DESCRIPTION_MAX);
        }
    }

    SeoContent {
        meta_title,
        meta_description,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
