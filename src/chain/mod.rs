pub mod abi;
pub mod tron;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("node request failed: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("node returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("node rejected call: {0}")]
    Rejected(String),

    #[error("malformed node response: {0}")]
    Malformed(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("amount {0} cannot be expressed in base units")]
    AmountOverflow(String),
}

/// Operations against the token contract.
///
/// Amounts are raw base units. The spender for `allowance_of` and the sender
/// of `transfer_from` are both the operator's permission account, which the
/// implementation is configured with.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Allowance granted by `owner` to the permission account.
    async fn allowance_of(&self, owner: &str) -> Result<u128, ChainError>;

    async fn balance_of(&self, owner: &str) -> Result<u128, ChainError>;

    /// Delegated transfer of `amount` from `from` to `to`, spending at most
    /// `fee_limit` on network fees. Returns the transaction id.
    async fn transfer_from(
        &self,
        from: &str,
        to: &str,
        amount: u128,
        fee_limit: u64,
    ) -> Result<String, ChainError>;
}
