//! TRC-20 gateway over the TRON full-node HTTP API (TronGrid compatible).
//!
//! Reads go through `triggerconstantcontract`. Transfers are built with
//! `triggersmartcontract`, signed locally with the permission account's key
//! and submitted with `broadcasttransaction`.

use std::time::Duration;

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::abi::{decode_uint_word, encode_address_word, encode_uint_word, to_base58};
use super::{ChainError, ChainGateway};

/// Broadcast of an already-known transaction. The original submission went through.
const DUP_TRANSACTION: &str = "DUP_TRANSACTION_ERROR";

pub struct TronGateway {
    client: ClientWithMiddleware,
    api_url: String,
    api_key: Option<String>,
    contract: String,
    operator: String,
    signer: SigningKey,
}

#[derive(Serialize)]
struct TriggerRequest<'a> {
    owner_address: &'a str,
    contract_address: &'a str,
    function_selector: &'a str,
    parameter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fee_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    call_value: Option<u64>,
    visible: bool,
}

#[derive(Deserialize, Default)]
struct CallResult {
    #[serde(default)]
    result: bool,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct TriggerResponse {
    #[serde(default)]
    result: CallResult,
    #[serde(default)]
    constant_result: Vec<String>,
    transaction: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct BroadcastResponse {
    #[serde(default)]
    result: bool,
    code: Option<String>,
    message: Option<String>,
}

impl TronGateway {
    pub fn new(
        api_url: &str,
        api_key: Option<String>,
        contract: &str,
        operator: &str,
        private_key_hex: &str,
    ) -> Result<Self, ChainError> {
        let key_bytes = Zeroizing::new(
            hex::decode(private_key_hex.trim().trim_start_matches("0x"))
                .map_err(|e| ChainError::Signing(format!("private key is not hex: {}", e)))?,
        );
        let signer = SigningKey::from_slice(&key_bytes)
            .map_err(|e| ChainError::Signing(format!("invalid private key: {}", e)))?;

        let contract = to_base58(contract)?;
        let operator = to_base58(operator)?;

        let reqwest_client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        // Building and broadcasting the same signed transaction twice is harmless,
        // so transient failures are retried for every call.
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
        let client = ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            contract,
            operator,
            signer,
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ChainError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.api_url, path);
        let mut req = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            req = req.header("TRON-PRO-API-KEY", key.as_str());
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChainError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<R>().await?)
    }

    async fn call_constant(&self, selector: &str, parameter: String) -> Result<u128, ChainError> {
        let req = TriggerRequest {
            owner_address: &self.operator,
            contract_address: &self.contract,
            function_selector: selector,
            parameter,
            fee_limit: None,
            call_value: None,
            visible: true,
        };
        let resp: TriggerResponse = self.post("/wallet/triggerconstantcontract", &req).await?;
        if !resp.result.result {
            return Err(ChainError::Rejected(describe(
                resp.result.code.as_deref(),
                resp.result.message.as_deref(),
            )));
        }

        let word = resp
            .constant_result
            .first()
            .ok_or_else(|| ChainError::Malformed(format!("{} returned no value", selector)))?;
        decode_uint_word(word)
    }

    /// Sign a node-built transaction. The digest is recomputed from
    /// `raw_data_hex` so the node cannot have us sign something else.
    fn sign(&self, tx_id: &str, raw_data_hex: &str) -> Result<String, ChainError> {
        let raw = hex::decode(raw_data_hex)
            .map_err(|e| ChainError::Malformed(format!("raw_data_hex: {}", e)))?;
        let digest = Sha256::digest(&raw);
        let expected = hex::decode(tx_id)
            .map_err(|e| ChainError::Malformed(format!("txID: {}", e)))?;
        if digest.as_slice() != expected.as_slice() {
            return Err(ChainError::Malformed(
                "txID does not match raw_data_hex".to_string(),
            ));
        }

        let (signature, recovery_id) = self
            .signer
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        Ok(hex::encode(bytes))
    }
}

#[async_trait]
impl ChainGateway for TronGateway {
    async fn allowance_of(&self, owner: &str) -> Result<u128, ChainError> {
        let parameter = format!(
            "{}{}",
            encode_address_word(owner)?,
            encode_address_word(&self.operator)?
        );
        self.call_constant("allowance(address,address)", parameter).await
    }

    async fn balance_of(&self, owner: &str) -> Result<u128, ChainError> {
        let parameter = encode_address_word(owner)?;
        self.call_constant("balanceOf(address)", parameter).await
    }

    async fn transfer_from(
        &self,
        from: &str,
        to: &str,
        amount: u128,
        fee_limit: u64,
    ) -> Result<String, ChainError> {
        let parameter = format!(
            "{}{}{}",
            encode_address_word(from)?,
            encode_address_word(to)?,
            encode_uint_word(amount)
        );
        let req = TriggerRequest {
            owner_address: &self.operator,
            contract_address: &self.contract,
            function_selector: "transferFrom(address,address,uint256)",
            parameter,
            fee_limit: Some(fee_limit),
            call_value: Some(0),
            visible: true,
        };

        let resp: TriggerResponse = self.post("/wallet/triggersmartcontract", &req).await?;
        if !resp.result.result {
            return Err(ChainError::Rejected(describe(
                resp.result.code.as_deref(),
                resp.result.message.as_deref(),
            )));
        }

        let mut tx = resp
            .transaction
            .ok_or_else(|| ChainError::Malformed("missing transaction".to_string()))?;
        let tx_id = tx
            .get("txID")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChainError::Malformed("missing txID".to_string()))?
            .to_string();
        let raw_data_hex = tx
            .get("raw_data_hex")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChainError::Malformed("missing raw_data_hex".to_string()))?;

        let signature = self.sign(&tx_id, raw_data_hex)?;
        match tx.as_object_mut() {
            Some(obj) => {
                obj.insert("signature".to_string(), serde_json::json!([signature]));
            }
            None => return Err(ChainError::Malformed("transaction is not an object".to_string())),
        }

        let resp: BroadcastResponse = self.post("/wallet/broadcasttransaction", &tx).await?;
        if resp.result || resp.code.as_deref() == Some(DUP_TRANSACTION) {
            tracing::info!(tx_id = %tx_id, from, to, amount = %amount, "transferFrom broadcast");
            return Ok(tx_id);
        }

        Err(ChainError::Rejected(describe(
            resp.code.as_deref(),
            resp.message.as_deref(),
        )))
    }
}

/// Node error messages are usually hex-encoded UTF-8.
fn describe(code: Option<&str>, message: Option<&str>) -> String {
    let message = message
        .map(|m| {
            hex::decode(m)
                .ok()
                .and_then(|b| String::from_utf8(b).ok())
                .unwrap_or_else(|| m.to_string())
        })
        .unwrap_or_default();
    match (code, message.is_empty()) {
        (Some(code), false) => format!("{}: {}", code, message),
        (Some(code), true) => code.to_string(),
        (None, false) => message,
        (None, true) => "unknown error".to_string(),
    }
}
