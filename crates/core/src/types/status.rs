//! Role, tier and lifecycle enums shared by the API and CLI.
//!
//! All enums serialize as `snake_case` strings and, with the `postgres`
//! feature, map onto the matching Postgres enum types created by the
//! initial migration.

use serde::{Deserialize, Serialize};

/// Implements `as_str`, `Display` and `FromStr` from a variant/string table.
macro_rules! impl_str_conversions {
    ($name:ident, $label:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The wire/database representation.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("invalid ", $label, ": {}"), s)),
                }
            }
        }
    };
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// A merchant using the platform for their own stores.
    #[default]
    User,
    /// Staff with read/write access to every tenant.
    Admin,
    /// Staff who can additionally change subscription tiers.
    SuperAdmin,
}

impl_str_conversions!(UserRole, "user role", {
    User => "user",
    Admin => "admin",
    SuperAdmin => "super_admin",
});

impl UserRole {
    /// Whether this role may use the admin portal.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

/// Subscription tier of a merchant account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "subscription_tier", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Starter,
    Professional,
    Enterprise,
}

impl_str_conversions!(SubscriptionTier, "subscription tier", {
    Free => "free",
    Starter => "starter",
    Professional => "professional",
    Enterprise => "enterprise",
});

/// Monthly usage allowances for a tier. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierLimits {
    pub ai_generations: Option<u32>,
    pub products: Option<u32>,
    pub stores: Option<u32>,
}

impl SubscriptionTier {
    /// Usage allowances for this tier.
    #[must_use]
    pub const fn limits(self) -> TierLimits {
        match self {
            Self::Free => TierLimits {
                ai_generations: Some(10),
                products: Some(50),
                stores: Some(1),
            },
            Self::Starter => TierLimits {
                ai_generations: Some(100),
                products: Some(500),
                stores: Some(2),
            },
            Self::Professional => TierLimits {
                ai_generations: Some(500),
                products: Some(2500),
                stores: Some(5),
            },
            Self::Enterprise => TierLimits {
                ai_generations: None,
                products: None,
                stores: None,
            },
        }
    }
}

/// Connection status of a Shopify store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "store_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
    #[default]
    Pending,
    Connected,
    Disconnected,
    Error,
}

impl_str_conversions!(StoreStatus, "store status", {
    Pending => "pending",
    Connected => "connected",
    Disconnected => "disconnected",
    Error => "error",
});

/// Lifecycle status of a catalog product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "product_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

impl_str_conversions!(ProductStatus, "product status", {
    Draft => "draft",
    Active => "active",
    Archived => "archived",
});

impl ProductStatus {
    /// Map a Shopify product status. Only an exact `active` is active.
    #[must_use]
    pub fn from_remote(status: Option<&str>) -> Self {
        match status {
            Some("active") => Self::Active,
            _ => Self::Draft,
        }
    }
}

/// Cannabis strain classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "strain_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum StrainType {
    Indica,
    Sativa,
    Hybrid,
    Cbd,
}

impl_str_conversions!(StrainType, "strain type", {
    Indica => "indica",
    Sativa => "sativa",
    Hybrid => "hybrid",
    Cbd => "cbd",
});

/// Kind of work a task tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "task_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    ContentGeneration,
    ProductSync,
    ThemeUpdate,
    ImageOptimization,
    SeoOptimization,
    BulkImport,
    Custom,
}

impl_str_conversions!(TaskType, "task type", {
    ContentGeneration => "content_generation",
    ProductSync => "product_sync",
    ThemeUpdate => "theme_update",
    ImageOptimization => "image_optimization",
    SeoOptimization => "seo_optimization",
    BulkImport => "bulk_import",
    Custom => "custom",
});

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "task_priority", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl_str_conversions!(TaskPriority, "task priority", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

impl TaskPriority {
    /// Sort rank, most urgent first.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

/// Task status.
///
/// Transitions only move forward:
///
/// ```text
/// pending ──> in_progress ──> completed
///    │             └────────> failed
///    ├──────────────────────> completed
///    └──────────────────────> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "task_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl_str_conversions!(TaskStatus, "task status", {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Failed => "failed",
});

impl TaskStatus {
    /// Whether moving from `self` to `next` is allowed. Staying put is a no-op
    /// and always allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, _)
                | (Self::InProgress, Self::InProgress | Self::Completed | Self::Failed)
                | (Self::Completed, Self::Completed)
                | (Self::Failed, Self::Failed)
        )
    }

    /// Whether the task has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}
