use anyhow::Result;
use ethers::{
    abi::{ParamType, Token},
    signers::LocalWallet,
    utils::hex,
};

/// Selector of the solidity `Error(string)` revert payload.
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

pub fn parse_private_key(sk: &str) -> Result<LocalWallet> {
    let bytes = hex::decode(sk.trim().strip_prefix("0x").unwrap_or(sk.trim()))?;
    Ok(LocalWallet::from_bytes(&bytes)?)
}

pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(&ERROR_SELECTOR)?;
    match ethers::abi::decode(&[ParamType::String], payload).ok()?.pop()? {
        Token::String(reason) => Some(reason),
        _ => None,
    }
}

/// Renders constructor arguments as `[a,b]`, with integers in decimal.
pub fn format_tokens(tokens: &[Token]) -> String {
    let items: Vec<String> = tokens
        .iter()
        .map(|token| match token {
            Token::Uint(value) => value.to_string(),
            Token::Address(address) => format!("{:?}", address),
            other => other.to_string(),
        })
        .collect();
    format!("[{}]", items.join(","))
}
