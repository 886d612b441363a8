//! Request and response types shared by the JSON-RPC and REST frontends.
//!
//! Kind fields stay `String` here: the `"auto"` label is legal on the wire
//! for consume requests and is resolved by the use-case layer, not by serde.

use serde::{Deserialize, Serialize};

use crate::currency::{ConsumptionDetail, EntryType, Kind, Metadata, PaymentState, TransactionEntry};

fn default_history_limit() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantParams {
    pub user_id: String,
    pub kind: String,
    pub amount: u64,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantResult {
    pub transaction_id: String,
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeParams {
    pub user_id: String,
    /// "paid", "free" or "auto" (free first, remainder from paid).
    pub kind: String,
    pub amount: u64,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeResult {
    pub transaction_id: String,
    pub total_consumed: u64,
    /// Remaining balance of the consumed kind; single-kind consumes only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<u64>,
    /// Per-kind breakdown; priority ("auto") consumes only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ConsumptionDetail>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPaymentParams {
    pub payment_request_id: String,
    pub user_id: String,
    pub amount: u64,
    /// Opaque currency label, echoed back untouched.
    pub currency: String,
    #[serde(default)]
    pub method_data: Metadata,
    #[serde(default)]
    pub details: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPaymentResult {
    pub payment_request_id: String,
    pub transaction_id: String,
    pub state: PaymentState,
    pub total_consumed: u64,
    pub details: Vec<ConsumptionDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemParams {
    pub code: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemResult {
    pub transaction_id: String,
    pub redemption_id: String,
    pub kind: Kind,
    pub amount: u64,
    pub balance: u64,
}

fn default_enabled() -> bool {
    true
}

/// Admin surface: seed a redeemable code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCodeParams {
    pub code: String,
    #[serde(default)]
    pub code_type: String,
    pub kind: Kind,
    pub amount: u64,
    pub max_uses: u64,
    pub valid_from: u64,
    pub valid_until: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBalanceParams {
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BalanceResult {
    pub paid: u64,
    pub free: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryParams {
    pub user_id: String,
    #[serde(default = "default_history_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<EntryType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResult {
    pub entries: Vec<TransactionEntry>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_params_defaults() {
        let params: HistoryParams = serde_json::from_str(r#"{"user_id":"u1"}"#).unwrap();
        assert_eq!(params.limit, 20);
        assert_eq!(params.offset, 0);
        assert!(params.kind.is_none());
        assert!(params.entry_type.is_none());
    }

    #[test]
    fn consume_result_omits_unset_sides() {
        let result = ConsumeResult {
            transaction_id: "txn_1".to_string(),
            total_consumed: 10,
            balance: Some(90),
            details: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"balance\":90"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn history_type_filter_uses_wire_name() {
        let params: HistoryParams =
            serde_json::from_str(r#"{"user_id":"u1","type":"grant","kind":"paid"}"#).unwrap();
        assert_eq!(params.entry_type, Some(EntryType::Grant));
        assert_eq!(params.kind, Some(Kind::Paid));
    }

    #[test]
    fn negative_amount_is_rejected_by_decoding() {
        let err = serde_json::from_str::<GrantParams>(
            r#"{"user_id":"u1","kind":"paid","amount":-5}"#,
        );
        assert!(err.is_err());
    }
}
