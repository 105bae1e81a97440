//! Shopify shop domain type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`ShopDomain`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShopDomainError {
    /// The input is empty after trimming.
    #[error("shop cannot be empty")]
    Empty,
    /// The input contains characters that cannot appear in a shop hostname.
    #[error("shop contains invalid character '{0}'")]
    InvalidCharacter(char),
    /// The input has an empty label (leading, trailing or doubled dot).
    #[error("shop has an empty domain label")]
    EmptyLabel,
}

/// A fully-qualified Shopify shop domain such as `green-leaf.myshopify.com`.
///
/// Merchants type their shop in many shapes: `green-leaf`,
/// `Green-Leaf.myshopify.com`, or a pasted admin URL. Parsing normalizes all
/// of them to the lowercase hostname, appending [`ShopDomain::SUFFIX`] when
/// the input has no dot.
///
/// ```
/// use amts_core::ShopDomain;
///
/// let shop = ShopDomain::parse("Green-Leaf").unwrap();
/// assert_eq!(shop.as_str(), "green-leaf.myshopify.com");
///
/// let shop = ShopDomain::parse("https://green-leaf.myshopify.com/admin").unwrap();
/// assert_eq!(shop.as_str(), "green-leaf.myshopify.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShopDomain(String);

impl ShopDomain {
    /// Platform suffix appended to bare shop names.
    pub const SUFFIX: &'static str = ".myshopify.com";

    /// Parse and normalize a shop identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or contains characters other
    /// than ASCII letters, digits, `-` and `.`.
    pub fn parse(input: &str) -> Result<Self, ShopDomainError> {
        let trimmed = input.trim();
        let without_scheme = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let host = without_scheme
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        if host.is_empty() {
            return Err(ShopDomainError::Empty);
        }

        if let Some(bad) = host
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '.'))
        {
            return Err(ShopDomainError::InvalidCharacter(bad));
        }

        if host.split('.').any(str::is_empty) {
            return Err(ShopDomainError::EmptyLabel);
        }

        if host.contains('.') {
            Ok(Self(host))
        } else {
            Ok(Self(format!("{host}{}", Self::SUFFIX)))
        }
    }

    /// Returns the domain as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The shop handle without the platform suffix.
    #[must_use]
    pub fn handle(&self) -> &str {
        self.0.strip_suffix(Self::SUFFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for ShopDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ShopDomain {
    type Err = ShopDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ShopDomain {
    type Error = ShopDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShopDomain> for String {
    fn from(shop: ShopDomain) -> Self {
        shop.0
    }
}

impl AsRef<str> for ShopDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
