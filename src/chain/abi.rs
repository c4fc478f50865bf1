//! Minimal ABI encoding for TRC-20 calls.
//!
//! Every argument is a 32-byte word, hex encoded without a `0x` prefix, which is
//! the form the node's `parameter` field expects.

use super::ChainError;

/// Version byte of mainnet TRON addresses.
pub const TRON_ADDRESS_PREFIX: u8 = 0x41;

/// Decode a TRON address into its 20-byte account id.
///
/// Accepts base58check (`T...`) or hex with the `41` prefix (optionally `0x`).
pub fn decode_address(address: &str) -> Result<[u8; 20], ChainError> {
    let address = address.trim();
    let invalid = || ChainError::InvalidAddress(address.to_string());

    let bytes = if address.starts_with('T') {
        bs58::decode(address)
            .with_check(None)
            .into_vec()
            .map_err(|_| invalid())?
    } else {
        let hex_part = address.strip_prefix("0x").unwrap_or(address);
        hex::decode(hex_part).map_err(|_| invalid())?
    };

    match bytes.split_first() {
        Some((&TRON_ADDRESS_PREFIX, rest)) if rest.len() == 20 => {
            let mut id = [0u8; 20];
            id.copy_from_slice(rest);
            Ok(id)
        }
        _ => Err(invalid()),
    }
}

/// Canonical base58check form, as expected by the node with `visible: true`.
pub fn to_base58(address: &str) -> Result<String, ChainError> {
    let id = decode_address(address)?;
    let mut bytes = Vec::with_capacity(21);
    bytes.push(TRON_ADDRESS_PREFIX);
    bytes.extend_from_slice(&id);
    Ok(bs58::encode(bytes).with_check().into_string())
}

pub fn encode_address_word(address: &str) -> Result<String, ChainError> {
    let id = decode_address(address)?;
    Ok(format!("{:0>64}", hex::encode(id)))
}

pub fn encode_uint_word(value: u128) -> String {
    format!("{:064x}", value)
}

/// Decode a `uint256` return word. Values wider than 128 bits saturate.
pub fn decode_uint_word(word: &str) -> Result<u128, ChainError> {
    let word = word.trim().trim_start_matches("0x");
    if !word.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ChainError::Malformed(format!("not a hex word: '{}'", word)));
    }

    let significant = word.trim_start_matches('0');
    if significant.is_empty() {
        return Ok(0);
    }
    if significant.len() > 32 {
        return Ok(u128::MAX);
    }
    u128::from_str_radix(significant, 16)
        .map_err(|e| ChainError::Malformed(format!("bad uint word: {}", e)))
}
