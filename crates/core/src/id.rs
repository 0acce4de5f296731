//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Longest product code accepted by [`ProductCode::parse`].
pub const MAX_PRODUCT_CODE_LEN: usize = 64;

/// Natural key of a stock ledger (e.g. `"SKU-1001"`).
///
/// Surrounding whitespace is trimmed on construction; the code is otherwise kept
/// verbatim (case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductCode(String);

impl ProductCode {
    pub fn parse(raw: impl AsRef<str>) -> DomainResult<Self> {
        let code = raw.as_ref().trim();
        if code.is_empty() {
            return Err(DomainError::invalid_product_code("product code cannot be empty"));
        }
        if code.chars().count() > MAX_PRODUCT_CODE_LEN {
            return Err(DomainError::invalid_product_code(format!(
                "product code longer than {MAX_PRODUCT_CODE_LEN} characters"
            )));
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix-or-exact match used by code search.
    pub fn matches(&self, query: &str) -> bool {
        self.0.starts_with(query)
    }
}

impl core::fmt::Display for ProductCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProductCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProductCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ProductCode> for String {
    fn from(value: ProductCode) -> Self {
        value.0
    }
}

/// Identifier of a stored stock transaction (audit record).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered), so ids sort roughly by creation time.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for TransactionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for TransactionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| DomainError::invalid_id(format!("TransactionId: {e}")))?;
        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_code_is_trimmed() {
        let code = ProductCode::parse("  SKU1 ").unwrap();
        assert_eq!(code.as_str(), "SKU1");
    }

    #[test]
    fn product_code_rejects_blank_and_oversized() {
        assert!(matches!(
            ProductCode::parse("   "),
            Err(DomainError::InvalidProductCode(_))
        ));
        let long = "X".repeat(MAX_PRODUCT_CODE_LEN + 1);
        assert!(matches!(
            ProductCode::parse(long),
            Err(DomainError::InvalidProductCode(_))
        ));
    }

    #[test]
    fn product_code_deserialization_validates() {
        let ok: ProductCode = serde_json::from_str("\"SKU-9\"").unwrap();
        assert_eq!(ok.as_str(), "SKU-9");
        assert!(serde_json::from_str::<ProductCode>("\"\"").is_err());
    }

    #[test]
    fn code_search_matches_prefix_and_exact() {
        let code = ProductCode::parse("SKU-100").unwrap();
        assert!(code.matches("SKU-100"));
        assert!(code.matches("SKU-1"));
        assert!(!code.matches("SKU-2"));
    }

    #[test]
    fn transaction_id_round_trips_through_display() {
        let id = TransactionId::new();
        let parsed: TransactionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
