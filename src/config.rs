use anyhow::Context;
use zeroize::Zeroizing;

use crate::models::amount::MAX_DECIMALS;

pub struct Config {
    pub port: u16,
    pub tron_api_url: String,
    pub tron_api_key: Option<String>,
    /// Hex key of the permission (spender) account. Wiped on drop.
    pub permission_private_key: Zeroizing<String>,
    pub permission_address: String,
    /// Recipient of every transfer.
    pub payment_address: String,
    pub token_contract_address: String,
    pub telegram_bot_token: Zeroizing<String>,
    pub telegram_api_url: String,
    /// Chat receiving approval notifications.
    pub telegram_chat_id: String,
    /// Chats allowed to issue commands. Defaults to `telegram_chat_id`.
    pub operator_chats: Vec<String>,
    /// Upper bound on network fees per transfer, in sun.
    /// Set via TRANSFER_FEE_LIMIT env var. Default: 100 TRX.
    pub fee_limit: u64,
    pub token_decimals: u32,
    pub token_symbol: String,
    /// Comma-separated list of origins allowed to call the report endpoint.
    /// Empty = any origin.
    pub cors_origins: Vec<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("tron_api_url", &self.tron_api_url)
            .field("permission_address", &self.permission_address)
            .field("payment_address", &self.payment_address)
            .field("token_contract_address", &self.token_contract_address)
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("operator_chats", &self.operator_chats)
            .field("fee_limit", &self.fee_limit)
            .field("token_decimals", &self.token_decimals)
            .field("token_symbol", &self.token_symbol)
            .finish_non_exhaustive()
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    let value = std::env::var(name).with_context(|| format!("{} must be set", name))?;
    let value = value.trim().to_string();
    if value.is_empty() {
        anyhow::bail!("{} must not be empty", name);
    }
    Ok(value)
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let telegram_chat_id = required("TELEGRAM_CHAT_ID")?;
    let operator_chats = optional("TELEGRAM_OPERATOR_CHATS")
        .map(|v| parse_list(&v))
        .filter(|chats| !chats.is_empty())
        .unwrap_or_else(|| vec![telegram_chat_id.clone()]);

    let token_decimals = optional("TOKEN_DECIMALS")
        .map(|v| v.parse::<u32>().context("TOKEN_DECIMALS must be an integer"))
        .transpose()?
        .unwrap_or(6);
    if token_decimals > MAX_DECIMALS {
        anyhow::bail!("TOKEN_DECIMALS must be at most {}", MAX_DECIMALS);
    }

    Ok(Config {
        port: optional("PORT")
            .map(|v| v.parse::<u16>().context("PORT must be a port number"))
            .transpose()?
            .unwrap_or(3000),
        tron_api_url: optional("TRON_API_URL").unwrap_or_else(|| "https://api.trongrid.io".into()),
        tron_api_key: optional("TRON_API_KEY"),
        permission_private_key: Zeroizing::new(required("PERMISSION_PRIVATE_KEY")?),
        permission_address: required("PERMISSION_ADDRESS")?,
        payment_address: required("PAYMENT_ADDRESS")?,
        token_contract_address: required("USDT_CONTRACT_ADDRESS")?,
        telegram_bot_token: Zeroizing::new(required("TELEGRAM_BOT_TOKEN")?),
        telegram_api_url: optional("TELEGRAM_API_URL")
            .unwrap_or_else(|| "https://api.telegram.org".into()),
        telegram_chat_id,
        operator_chats,
        fee_limit: optional("TRANSFER_FEE_LIMIT")
            .map(|v| v.parse::<u64>().context("TRANSFER_FEE_LIMIT must be an integer"))
            .transpose()?
            .unwrap_or(100_000_000),
        token_decimals,
        token_symbol: optional("TOKEN_SYMBOL").unwrap_or_else(|| "USDT".into()),
        cors_origins: optional("CORS_ORIGINS")
            .map(|v| parse_list(&v))
            .unwrap_or_default(),
    })
}
