use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A reported token approval and its processing state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalRecord {
    pub address: String,
    pub transaction_hash: String,
    /// Client-reported amount. Display only, never used to size a transfer.
    pub approved_amount: String,
    pub reported_at: DateTime<Utc>,
    pub processed: bool,
}

/// Body of `POST /telegram-notify`, sent by the approval frontend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalReport {
    pub user_address: String,
    pub transaction_hash: String,
    #[serde(default)]
    pub approved_amount: ReportedAmount,
    #[serde(default)]
    pub timestamp: Option<ReportedTimestamp>,
}

/// Frontends send the amount either as a JSON number or as a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReportedAmount {
    Text(String),
    Number(serde_json::Number),
}

impl Default for ReportedAmount {
    fn default() -> Self {
        ReportedAmount::Text(String::new())
    }
}

impl std::fmt::Display for ReportedAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportedAmount::Text(s) => f.write_str(s.trim()),
            ReportedAmount::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Epoch milliseconds (`Date.now()`) or an RFC 3339 string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReportedTimestamp {
    Millis(i64),
    Text(String),
}

impl ReportedTimestamp {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            ReportedTimestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            ReportedTimestamp::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl ApprovalReport {
    /// Report time as sent by the client, or `received_at` when missing/unparseable.
    pub fn reported_at(&self, received_at: DateTime<Utc>) -> DateTime<Utc> {
        self.timestamp
            .as_ref()
            .and_then(ReportedTimestamp::to_datetime)
            .unwrap_or(received_at)
    }
}

/// Live on-chain state for an address.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusResult {
    pub allowance: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    pub amount: Decimal,
    pub base_units: u128,
    pub transaction_id: String,
}

/// Terminal result of a transfer attempt that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Transferred(TransferReceipt),
    /// Zero allowance or zero balance. The ledger is left untouched.
    NothingToTransfer { allowance: Decimal, balance: Decimal },
}
