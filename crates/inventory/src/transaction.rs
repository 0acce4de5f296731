use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{ProductCode, TransactionId};

/// Kind of audit record.
///
/// `Adjustment` and `Return` are part of the stored vocabulary but no operation
/// emits them yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// New stock arrival.
    Incoming,
    /// Stock held for an order.
    Reserve,
    /// Hold returned to available stock (order cancelled).
    Release,
    /// Reserved stock physically leaving (reduces current).
    Dispatch,
    Adjustment,
    Return,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Incoming => "INCOMING",
            TransactionType::Reserve => "RESERVE",
            TransactionType::Release => "RELEASE",
            TransactionType::Dispatch => "DISPATCH",
            TransactionType::Adjustment => "ADJUSTMENT",
            TransactionType::Return => "RETURN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INCOMING" => Some(TransactionType::Incoming),
            "RESERVE" => Some(TransactionType::Reserve),
            "RELEASE" => Some(TransactionType::Release),
            "DISPATCH" => Some(TransactionType::Dispatch),
            "ADJUSTMENT" => Some(TransactionType::Adjustment),
            "RETURN" => Some(TransactionType::Return),
            _ => None,
        }
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An audit record ready to be appended (not yet assigned an id or sequence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub product_code: ProductCode,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    /// `currentStock` for INCOMING/DISPATCH, `reservedStock` for RESERVE/RELEASE.
    pub balance_after: Decimal,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
    pub transaction_date: DateTime<Utc>,
}

impl NewTransaction {
    /// Attach store-assigned identity. Only stores call this.
    pub fn into_stored(self, id: TransactionId, sequence: u64) -> StockTransaction {
        StockTransaction {
            id,
            sequence,
            product_code: self.product_code,
            transaction_type: self.transaction_type,
            quantity: self.quantity,
            balance_after: self.balance_after,
            reference_number: self.reference_number,
            notes: self.notes,
            performed_by: self.performed_by,
            transaction_date: self.transaction_date,
        }
    }
}

/// A persisted, immutable audit record.
///
/// `sequence` is assigned by the log in insertion order and breaks ties between
/// records that share a `transaction_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTransaction {
    pub id: TransactionId,
    pub sequence: u64,
    pub product_code: ProductCode,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub balance_after: Decimal,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
    pub transaction_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_type_names_are_stable() {
        for t in [
            TransactionType::Incoming,
            TransactionType::Reserve,
            TransactionType::Release,
            TransactionType::Dispatch,
            TransactionType::Adjustment,
            TransactionType::Return,
        ] {
            assert_eq!(TransactionType::parse(t.as_str()), Some(t));
            assert_eq!(
                serde_json::to_value(t).unwrap(),
                serde_json::Value::String(t.as_str().to_string())
            );
        }
        assert_eq!(TransactionType::parse("incoming"), None);
    }

    #[test]
    fn stored_record_serializes_type_field() {
        let record = NewTransaction {
            product_code: ProductCode::parse("SKU1").unwrap(),
            transaction_type: TransactionType::Reserve,
            quantity: Decimal::from(3),
            balance_after: Decimal::from(3),
            reference_number: None,
            notes: Some("Stock reserved".to_string()),
            performed_by: None,
            transaction_date: Utc::now(),
        }
        .into_stored(TransactionId::new(), 1);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "RESERVE");
        assert_eq!(json["productCode"], "SKU1");
        assert_eq!(json["balanceAfter"], "3");
    }
}
