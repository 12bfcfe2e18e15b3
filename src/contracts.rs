//! Minimal ABIs for the contracts the engine talks to: ERC-20, ERC-721 and the
//! disperse contract. Calldata is built from hand-written `Function`
//! definitions and return data decoded against their outputs.

use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use ethers::types::{Address, Bytes, U256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AbiError {
    #[error("failed to encode {function}: {source}")]
    Encode {
        function: &'static str,
        source: ethers::abi::Error,
    },
    #[error("failed to decode {function} output: {reason}")]
    Decode { function: &'static str, reason: String },
}

#[allow(deprecated)]
fn function(
    name: &str,
    inputs: &[(&str, ParamType)],
    outputs: &[ParamType],
    state_mutability: StateMutability,
) -> Function {
    Function {
        name: name.to_string(),
        inputs: inputs
            .iter()
            .map(|(name, kind)| Param {
                name: name.to_string(),
                kind: kind.clone(),
                internal_type: None,
            })
            .collect(),
        outputs: outputs
            .iter()
            .map(|kind| Param {
                name: String::new(),
                kind: kind.clone(),
                internal_type: None,
            })
            .collect(),
        constant: None,
        state_mutability,
    }
}

fn address_array() -> ParamType {
    ParamType::Array(Box::new(ParamType::Address))
}

fn uint_array() -> ParamType {
    ParamType::Array(Box::new(ParamType::Uint(256)))
}

// ==================== ERC-20 / ERC-721 ====================

/// `balanceOf(address)`; the same selector serves ERC-20 and ERC-721
pub fn balance_of() -> Function {
    function("balanceOf", &[("owner", ParamType::Address)], &[ParamType::Uint(256)], StateMutability::View)
}

pub fn decimals() -> Function {
    function("decimals", &[], &[ParamType::Uint(8)], StateMutability::View)
}

pub fn symbol() -> Function {
    function("symbol", &[], &[ParamType::String], StateMutability::View)
}

pub fn allowance() -> Function {
    function(
        "allowance",
        &[("owner", ParamType::Address), ("spender", ParamType::Address)],
        &[ParamType::Uint(256)],
        StateMutability::View,
    )
}

pub fn approve() -> Function {
    function(
        "approve",
        &[("spender", ParamType::Address), ("amount", ParamType::Uint(256))],
        &[ParamType::Bool],
        StateMutability::NonPayable,
    )
}

pub fn owner_of() -> Function {
    function("ownerOf", &[("tokenId", ParamType::Uint(256))], &[ParamType::Address], StateMutability::View)
}

pub fn is_approved_for_all() -> Function {
    function(
        "isApprovedForAll",
        &[("owner", ParamType::Address), ("operator", ParamType::Address)],
        &[ParamType::Bool],
        StateMutability::View,
    )
}

pub fn set_approval_for_all() -> Function {
    function(
        "setApprovalForAll",
        &[("operator", ParamType::Address), ("approved", ParamType::Bool)],
        &[],
        StateMutability::NonPayable,
    )
}

// ==================== Disperse ====================

/// `disperseEther(address[] recipients, uint256[] values) payable`
pub fn disperse_ether() -> Function {
    function(
        "disperseEther",
        &[("recipients", address_array()), ("values", uint_array())],
        &[],
        StateMutability::Payable,
    )
}

/// `disperseToken(address token, address[] recipients, uint256[] values)`
pub fn disperse_token() -> Function {
    function(
        "disperseToken",
        &[("token", ParamType::Address), ("recipients", address_array()), ("values", uint_array())],
        &[],
        StateMutability::NonPayable,
    )
}

/// `disperseNFT(address token, address[] recipients, uint256[] tokenIds)`
pub fn disperse_nft() -> Function {
    function(
        "disperseNFT",
        &[("token", ParamType::Address), ("recipients", address_array()), ("tokenIds", uint_array())],
        &[],
        StateMutability::NonPayable,
    )
}

// ==================== encoding ====================

fn encode(func: Function, static_name: &'static str, args: &[Token]) -> Result<Bytes, AbiError> {
    func.encode_input(args)
        .map(Bytes::from)
        .map_err(|source| AbiError::Encode {
            function: static_name,
            source,
        })
}

fn addresses(list: &[Address]) -> Token {
    Token::Array(list.iter().map(|a| Token::Address(*a)).collect())
}

fn uints(list: &[U256]) -> Token {
    Token::Array(list.iter().map(|v| Token::Uint(*v)).collect())
}

pub fn encode_balance_of(owner: Address) -> Result<Bytes, AbiError> {
    encode(balance_of(), "balanceOf", &[Token::Address(owner)])
}

pub fn encode_decimals() -> Result<Bytes, AbiError> {
    encode(decimals(), "decimals", &[])
}

pub fn encode_symbol() -> Result<Bytes, AbiError> {
    encode(symbol(), "symbol", &[])
}

pub fn encode_allowance(owner: Address, spender: Address) -> Result<Bytes, AbiError> {
    encode(allowance(), "allowance", &[Token::Address(owner), Token::Address(spender)])
}

pub fn encode_approve(spender: Address, amount: U256) -> Result<Bytes, AbiError> {
    encode(approve(), "approve", &[Token::Address(spender), Token::Uint(amount)])
}

pub fn encode_owner_of(token_id: U256) -> Result<Bytes, AbiError> {
    encode(owner_of(), "ownerOf", &[Token::Uint(token_id)])
}

pub fn encode_is_approved_for_all(owner: Address, operator: Address) -> Result<Bytes, AbiError> {
    encode(
        is_approved_for_all(),
        "isApprovedForAll",
        &[Token::Address(owner), Token::Address(operator)],
    )
}

pub fn encode_set_approval_for_all(operator: Address, approved: bool) -> Result<Bytes, AbiError> {
    encode(
        set_approval_for_all(),
        "setApprovalForAll",
        &[Token::Address(operator), Token::Bool(approved)],
    )
}

pub fn encode_disperse_ether(recipients: &[Address], values: &[U256]) -> Result<Bytes, AbiError> {
    encode(disperse_ether(), "disperseEther", &[addresses(recipients), uints(values)])
}

pub fn encode_disperse_token(token: Address, recipients: &[Address], values: &[U256]) -> Result<Bytes, AbiError> {
    encode(
        disperse_token(),
        "disperseToken",
        &[Token::Address(token), addresses(recipients), uints(values)],
    )
}

pub fn encode_disperse_nft(token: Address, recipients: &[Address], token_ids: &[U256]) -> Result<Bytes, AbiError> {
    encode(
        disperse_nft(),
        "disperseNFT",
        &[Token::Address(token), addresses(recipients), uints(token_ids)],
    )
}

// ==================== decoding ====================

fn decode_single(func: Function, static_name: &'static str, data: &[u8]) -> Result<Token, AbiError> {
    let mut tokens = func.decode_output(data).map_err(|e| AbiError::Decode {
        function: static_name,
        reason: e.to_string(),
    })?;
    tokens.pop().ok_or(AbiError::Decode {
        function: static_name,
        reason: "empty return data".to_string(),
    })
}

pub fn decode_uint(static_name: &'static str, data: &[u8]) -> Result<U256, AbiError> {
    let func = function(static_name, &[], &[ParamType::Uint(256)], StateMutability::View);
    match decode_single(func, static_name, data)? {
        Token::Uint(v) => Ok(v),
        other => Err(AbiError::Decode {
            function: static_name,
            reason: format!("expected uint, got {:?}", other),
        }),
    }
}

pub fn decode_decimals(data: &[u8]) -> Result<u8, AbiError> {
    let value = decode_uint("decimals", data)?;
    if value > U256::from(u8::MAX) {
        return Err(AbiError::Decode {
            function: "decimals",
            reason: format!("{} does not fit in uint8", value),
        });
    }
    Ok(value.as_u32() as u8)
}

pub fn decode_address(static_name: &'static str, data: &[u8]) -> Result<Address, AbiError> {
    match decode_single(owner_of(), static_name, data)? {
        Token::Address(a) => Ok(a),
        other => Err(AbiError::Decode {
            function: static_name,
            reason: format!("expected address, got {:?}", other),
        }),
    }
}

pub fn decode_bool(static_name: &'static str, data: &[u8]) -> Result<bool, AbiError> {
    match decode_single(is_approved_for_all(), static_name, data)? {
        Token::Bool(b) => Ok(b),
        other => Err(AbiError::Decode {
            function: static_name,
            reason: format!("expected bool, got {:?}", other),
        }),
    }
}

/// Decode `symbol()`; older tokens return `bytes32` instead of `string`
pub fn decode_symbol(data: &[u8]) -> Result<String, AbiError> {
    if let Ok(Token::String(s)) = decode_single(symbol(), "symbol", data) {
        return Ok(s);
    }
    if data.len() == 32 {
        let end = data.iter().position(|b| *b == 0).unwrap_or(32);
        if let Ok(s) = std::str::from_utf8(&data[..end]) {
            if !s.is_empty() {
                return Ok(s.to_string());
            }
        }
    }
    Err(AbiError::Decode {
        function: "symbol",
        reason: "neither string nor bytes32".to_string(),
    })
}

/// 4-byte selector of some calldata, for logs
pub fn selector_hex(data: &[u8]) -> String {
    hex::encode(&data[..data.len().min(4)])
}
