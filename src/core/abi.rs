//! Minimal ABI encoding for the token calls the core issues.
//!
//! Only static argument types are needed except for the trailing `bytes`
//! of the multi-token safe transfer, which is always encoded empty.

use ethers::types::{Address, U256};
use sha3::{Digest, Keccak256};

use crate::core::errors::WalletError;

pub const ERC20_TRANSFER: &str = "transfer(address,uint256)";
pub const ERC20_BALANCE_OF: &str = "balanceOf(address)";
pub const ERC721_SAFE_TRANSFER: &str = "safeTransferFrom(address,address,uint256)";
pub const ERC721_TOKEN_OF_OWNER_BY_INDEX: &str = "tokenOfOwnerByIndex(address,uint256)";
pub const ERC1155_SAFE_TRANSFER: &str = "safeTransferFrom(address,address,uint256,uint256,bytes)";

/// First 4 bytes of keccak256 over a signature, e.g. "transfer(address,uint256)".
pub fn selector_from_signature(signature: &str) -> [u8; 4] {
    let out = Keccak256::digest(signature.as_bytes());
    [out[0], out[1], out[2], out[3]]
}

/// Left-padded 32-byte word holding an address.
pub fn abi_word_address(addr: &Address) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(addr.as_bytes());
    out
}

/// Big-endian 32-byte word holding an unsigned integer.
pub fn abi_word_uint256(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

/// Selector followed by the words, contiguous.
pub fn abi_pack(selector: [u8; 4], words: &[[u8; 32]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 32 * words.len());
    out.extend_from_slice(&selector);
    for w in words {
        out.extend_from_slice(w);
    }
    out
}

/// Read a single `uint256` return value.
pub fn decode_uint256(data: &[u8]) -> Result<U256, WalletError> {
    if data.len() < 32 {
        return Err(WalletError::SerializationError(format!(
            "expected a 32-byte word, got {} bytes",
            data.len()
        )));
    }
    Ok(U256::from_big_endian(&data[..32]))
}

pub fn encode_erc20_transfer(to: &Address, amount: U256) -> Vec<u8> {
    abi_pack(
        selector_from_signature(ERC20_TRANSFER),
        &[abi_word_address(to), abi_word_uint256(amount)],
    )
}

pub fn encode_balance_of(owner: &Address) -> Vec<u8> {
    abi_pack(selector_from_signature(ERC20_BALANCE_OF), &[abi_word_address(owner)])
}

pub fn encode_erc721_safe_transfer(from: &Address, to: &Address, token_id: U256) -> Vec<u8> {
    abi_pack(
        selector_from_signature(ERC721_SAFE_TRANSFER),
        &[abi_word_address(from), abi_word_address(to), abi_word_uint256(token_id)],
    )
}

pub fn encode_token_of_owner_by_index(owner: &Address, index: u64) -> Vec<u8> {
    abi_pack(
        selector_from_signature(ERC721_TOKEN_OF_OWNER_BY_INDEX),
        &[abi_word_address(owner), abi_word_uint256(U256::from(index))],
    )
}

/// `safeTransferFrom(from, to, id, amount, "")`.
pub fn encode_erc1155_safe_transfer(
    from: &Address,
    to: &Address,
    token_id: U256,
    amount: U256,
) -> Vec<u8> {
    // the dynamic `bytes` argument lives after the five head words
    let data_offset = U256::from(5 * 32);
    abi_pack(
        selector_from_signature(ERC1155_SAFE_TRANSFER),
        &[
            abi_word_address(from),
            abi_word_address(to),
            abi_word_uint256(token_id),
            abi_word_uint256(amount),
            abi_word_uint256(data_offset),
            abi_word_uint256(U256::zero()),
        ],
    )
}
