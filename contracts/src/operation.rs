//! # Pre-Signed Operations
//!
//! A signer authorizes a token operation off-line by signing its hash; a
//! relayer later submits the signature and is reimbursed `gas_price` tokens
//! by the signer. This module defines what gets signed and how it is
//! hashed, plus the decoder for operations arriving as raw call data.
//!
//! ## Hash layout
//!
//! ```text
//! operation: 0x01 || token(20) || selector(4) || target(20) || value(32)
//!                 || extra_data(*) || gas_price(32) || nonce(32)
//! revoke:    0x02 || token(20) || target_hash(32) || gas_price(32)
//! ```
//!
//! The leading domain byte keeps the two preimage families apart, and the
//! token address keeps a signature for one token from being replayed on
//! another.
//!
//! ## Call data
//!
//! The ERC-20 functions and their pre-signed entry points are declared
//! with [`sol!`]; selectors and argument encoding come from the generated
//! [`SolCall`] impls.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_protocol::config::{OPERATION_HASH_DOMAIN, REVOKE_HASH_DOMAIN};
use tally_protocol::crypto::recover_signer;

use crate::error::{LedgerError, LedgerResult};

/// A function selector.
pub type Selector = [u8; 4];

sol! {
    function transfer(address to, uint256 value);
    function approve(address spender, uint256 value);
    function increaseApproval(address spender, uint256 value);
    function decreaseApproval(address spender, uint256 value);
    function approveAndCall(address spender, uint256 value, bytes data);

    function transferPreSigned(bytes signature, address to, uint256 value, uint256 gas_price, uint256 nonce);
    function approvePreSigned(bytes signature, address spender, uint256 value, uint256 gas_price, uint256 nonce);
    function increaseApprovalPreSigned(bytes signature, address spender, uint256 value, uint256 gas_price, uint256 nonce);
    function decreaseApprovalPreSigned(bytes signature, address spender, uint256 value, uint256 gas_price, uint256 nonce);
    function approveAndCallPreSigned(bytes signature, address spender, uint256 value, bytes data, uint256 gas_price, uint256 nonce);
    function revokeHashPreSigned(bytes signature, bytes32 target_hash, uint256 gas_price);
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

pub const TRANSFER: Selector = transferCall::SELECTOR;
pub const APPROVE: Selector = approveCall::SELECTOR;
pub const INCREASE_APPROVAL: Selector = increaseApprovalCall::SELECTOR;
pub const DECREASE_APPROVAL: Selector = decreaseApprovalCall::SELECTOR;
pub const APPROVE_AND_CALL: Selector = approveAndCallCall::SELECTOR;

/// Raw pre-signed entry points.
pub const TRANSFER_PRE_SIGNED: Selector = transferPreSignedCall::SELECTOR;
pub const APPROVE_PRE_SIGNED: Selector = approvePreSignedCall::SELECTOR;
pub const INCREASE_APPROVAL_PRE_SIGNED: Selector = increaseApprovalPreSignedCall::SELECTOR;
pub const DECREASE_APPROVAL_PRE_SIGNED: Selector = decreaseApprovalPreSignedCall::SELECTOR;
pub const APPROVE_AND_CALL_PRE_SIGNED: Selector = approveAndCallPreSignedCall::SELECTOR;
pub const REVOKE_HASH_PRE_SIGNED: Selector = revokeHashPreSignedCall::SELECTOR;

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A token operation a signer can authorize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Transfer { to: Address, value: U256 },
    Approve { spender: Address, value: U256 },
    IncreaseApproval { spender: Address, value: U256 },
    DecreaseApproval { spender: Address, value: U256 },
    ApproveAndCall { spender: Address, value: U256, data: Vec<u8> },
}

impl Operation {
    /// The selector bound into this operation's hash.
    pub fn selector(&self) -> Selector {
        match self {
            Operation::Transfer { .. } => TRANSFER,
            Operation::Approve { .. } => APPROVE,
            Operation::IncreaseApproval { .. } => INCREASE_APPROVAL,
            Operation::DecreaseApproval { .. } => DECREASE_APPROVAL,
            Operation::ApproveAndCall { .. } => APPROVE_AND_CALL,
        }
    }

    /// Recipient or spender.
    pub fn target(&self) -> Address {
        match self {
            Operation::Transfer { to, .. } => *to,
            Operation::Approve { spender, .. }
            | Operation::IncreaseApproval { spender, .. }
            | Operation::DecreaseApproval { spender, .. }
            | Operation::ApproveAndCall { spender, .. } => *spender,
        }
    }

    pub fn value(&self) -> U256 {
        match self {
            Operation::Transfer { value, .. }
            | Operation::Approve { value, .. }
            | Operation::IncreaseApproval { value, .. }
            | Operation::DecreaseApproval { value, .. }
            | Operation::ApproveAndCall { value, .. } => *value,
        }
    }

    /// Extra call data. Empty for everything but `ApproveAndCall`.
    pub fn extra_data(&self) -> &[u8] {
        match self {
            Operation::ApproveAndCall { data, .. } => data,
            _ => &[],
        }
    }

    /// Build the variant named by `selector`. Only `ApproveAndCall` may
    /// carry extra data.
    pub fn from_parts(
        selector: Selector,
        target: Address,
        value: U256,
        data: Vec<u8>,
    ) -> LedgerResult<Self> {
        if selector != APPROVE_AND_CALL && !data.is_empty() {
            return Err(LedgerError::InvalidArgument(format!(
                "selector 0x{} takes no extra data",
                hex_selector(&selector)
            )));
        }
        let op = match selector {
            TRANSFER => Operation::Transfer { to: target, value },
            APPROVE => Operation::Approve { spender: target, value },
            INCREASE_APPROVAL => Operation::IncreaseApproval { spender: target, value },
            DECREASE_APPROVAL => Operation::DecreaseApproval { spender: target, value },
            APPROVE_AND_CALL => Operation::ApproveAndCall {
                spender: target,
                value,
                data,
            },
            other => {
                return Err(LedgerError::InvalidArgument(format!(
                    "unknown selector 0x{}",
                    hex_selector(&other)
                )))
            }
        };
        Ok(op)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Transfer { .. } => "transfer",
            Operation::Approve { .. } => "approve",
            Operation::IncreaseApproval { .. } => "increaseApproval",
            Operation::DecreaseApproval { .. } => "decreaseApproval",
            Operation::ApproveAndCall { .. } => "approveAndCall",
        }
    }
}

fn hex_selector(selector: &Selector) -> String {
    alloy_primitives::hex::encode(selector)
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Hash a signer must sign to authorize an operation on `token`.
pub fn pre_signed_hash(
    token: Address,
    selector: Selector,
    target: Address,
    value: U256,
    extra_data: &[u8],
    gas_price: U256,
    nonce: u64,
) -> B256 {
    let mut preimage = Vec::with_capacity(1 + 20 + 4 + 20 + 32 + extra_data.len() + 64);
    preimage.push(OPERATION_HASH_DOMAIN);
    preimage.extend_from_slice(token.as_slice());
    preimage.extend_from_slice(&selector);
    preimage.extend_from_slice(target.as_slice());
    preimage.extend_from_slice(&value.to_be_bytes::<32>());
    preimage.extend_from_slice(extra_data);
    preimage.extend_from_slice(&gas_price.to_be_bytes::<32>());
    preimage.extend_from_slice(&U256::from(nonce).to_be_bytes::<32>());
    keccak256(&preimage)
}

/// Hash a signer must sign to revoke `target_hash` on `token` through a
/// relayer.
pub fn revoke_hash(token: Address, target_hash: B256, gas_price: U256) -> B256 {
    let mut preimage = Vec::with_capacity(1 + 20 + 32 + 32);
    preimage.push(REVOKE_HASH_DOMAIN);
    preimage.extend_from_slice(token.as_slice());
    preimage.extend_from_slice(target_hash.as_slice());
    preimage.extend_from_slice(&gas_price.to_be_bytes::<32>());
    keccak256(&preimage)
}

// ---------------------------------------------------------------------------
// Signed envelopes
// ---------------------------------------------------------------------------

/// Who claims to have signed, with what, and on which terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// Claimed signer; must equal the address recovered from `signature`.
    pub signer: Address,
    /// `r || s || v`, 65 bytes.
    pub signature: Vec<u8>,
    /// Tokens the signer pays the relayer.
    pub gas_price: U256,
    /// Must equal the signer's current nonce.
    pub nonce: u64,
}

/// An operation together with the authorization to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOperation {
    pub operation: Operation,
    pub auth: Authorization,
}

impl SignedOperation {
    pub fn hash(&self, token: Address) -> B256 {
        pre_signed_hash(
            token,
            self.operation.selector(),
            self.operation.target(),
            self.operation.value(),
            self.operation.extra_data(),
            self.auth.gas_price,
            self.auth.nonce,
        )
    }

    /// Recover the signer and check it against the claim. Returns the hash.
    pub fn authenticate(&self, token: Address) -> LedgerResult<B256> {
        let hash = self.hash(token);
        let recovered = recover_signer(&hash, &self.auth.signature)?;
        if recovered != self.auth.signer {
            return Err(LedgerError::AuthenticationFailure(format!(
                "signature recovers to {recovered}, not {}",
                self.auth.signer
            )));
        }
        Ok(hash)
    }
}

/// Relayed revocation of a previously issued operation hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeRequest {
    pub signer: Address,
    pub signature: Vec<u8>,
    pub target_hash: B256,
    pub gas_price: U256,
}

impl RevokeRequest {
    pub fn hash(&self, token: Address) -> B256 {
        revoke_hash(token, self.target_hash, self.gas_price)
    }

    pub fn authenticate(&self, token: Address) -> LedgerResult<B256> {
        let hash = self.hash(token);
        let recovered = recover_signer(&hash, &self.signature)?;
        if recovered != self.signer {
            return Err(LedgerError::AuthenticationFailure(format!(
                "revocation signed by {recovered}, not {}",
                self.signer
            )));
        }
        Ok(hash)
    }
}

// ---------------------------------------------------------------------------
// Raw dispatch
// ---------------------------------------------------------------------------

/// A pre-signed call decoded from raw call data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreSignedCall {
    Operation(SignedOperation),
    Revoke(RevokeRequest),
}

/// Which entry point a raw selector names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryPoint {
    Transfer,
    Approve,
    IncreaseApproval,
    DecreaseApproval,
    ApproveAndCall,
    Revoke,
}

const ENTRY_POINTS: [(Selector, EntryPoint); 6] = [
    (TRANSFER_PRE_SIGNED, EntryPoint::Transfer),
    (APPROVE_PRE_SIGNED, EntryPoint::Approve),
    (INCREASE_APPROVAL_PRE_SIGNED, EntryPoint::IncreaseApproval),
    (DECREASE_APPROVAL_PRE_SIGNED, EntryPoint::DecreaseApproval),
    (APPROVE_AND_CALL_PRE_SIGNED, EntryPoint::ApproveAndCall),
    (REVOKE_HASH_PRE_SIGNED, EntryPoint::Revoke),
];

fn entry_point(sel: Selector) -> Option<EntryPoint> {
    ENTRY_POINTS
        .iter()
        .find(|(entry_selector, _)| *entry_selector == sel)
        .map(|(_, entry)| *entry)
}

/// Whether `sel` names one of the raw pre-signed entry points.
pub fn is_pre_signed_entry(sel: Selector) -> bool {
    entry_point(sel).is_some()
}

fn decode_args<C: SolCall>(body: &[u8]) -> LedgerResult<C> {
    C::abi_decode_raw(body).map_err(|e| {
        LedgerError::InvalidArgument(format!("malformed {} call data: {e}", C::SIGNATURE))
    })
}

fn nonce_from_word(nonce: U256) -> LedgerResult<u64> {
    u64::try_from(nonce)
        .map_err(|_| LedgerError::InvalidArgument(format!("nonce {nonce} does not fit in 64 bits")))
}

/// Decode raw call data into a pre-signed call attributed to `signer`.
///
/// `aliases` maps externally-known selectors onto the canonical entry
/// points before lookup.
pub fn decode_pre_signed_call(
    data: &[u8],
    signer: Address,
    aliases: &BTreeMap<Selector, Selector>,
) -> LedgerResult<PreSignedCall> {
    let Some((raw_selector, body)) = data.split_first_chunk::<4>() else {
        return Err(LedgerError::InvalidArgument(format!(
            "call data too short for a selector: {} bytes",
            data.len()
        )));
    };
    let resolved = aliases.get(raw_selector).copied().unwrap_or(*raw_selector);
    let entry = entry_point(resolved).ok_or_else(|| {
        LedgerError::InvalidArgument(format!(
            "unknown pre-signed selector 0x{}",
            hex_selector(raw_selector)
        ))
    })?;

    let (operation, signature, gas_price, nonce) = match entry {
        EntryPoint::Revoke => {
            let call: revokeHashPreSignedCall = decode_args(body)?;
            return Ok(PreSignedCall::Revoke(RevokeRequest {
                signer,
                signature: call.signature.to_vec(),
                target_hash: call.target_hash,
                gas_price: call.gas_price,
            }));
        }
        EntryPoint::Transfer => {
            let call: transferPreSignedCall = decode_args(body)?;
            let op = Operation::Transfer {
                to: call.to,
                value: call.value,
            };
            (op, call.signature, call.gas_price, call.nonce)
        }
        EntryPoint::Approve => {
            let call: approvePreSignedCall = decode_args(body)?;
            let op = Operation::Approve {
                spender: call.spender,
                value: call.value,
            };
            (op, call.signature, call.gas_price, call.nonce)
        }
        EntryPoint::IncreaseApproval => {
            let call: increaseApprovalPreSignedCall = decode_args(body)?;
            let op = Operation::IncreaseApproval {
                spender: call.spender,
                value: call.value,
            };
            (op, call.signature, call.gas_price, call.nonce)
        }
        EntryPoint::DecreaseApproval => {
            let call: decreaseApprovalPreSignedCall = decode_args(body)?;
            let op = Operation::DecreaseApproval {
                spender: call.spender,
                value: call.value,
            };
            (op, call.signature, call.gas_price, call.nonce)
        }
        EntryPoint::ApproveAndCall => {
            let call: approveAndCallPreSignedCall = decode_args(body)?;
            let op = Operation::ApproveAndCall {
                spender: call.spender,
                value: call.value,
                data: call.data.to_vec(),
            };
            (op, call.signature, call.gas_price, call.nonce)
        }
    };

    Ok(PreSignedCall::Operation(SignedOperation {
        operation,
        auth: Authorization {
            signer,
            signature: signature.to_vec(),
            gas_price,
            nonce: nonce_from_word(nonce)?,
        },
    }))
}

/// Encode a signed operation as raw call data for its pre-signed entry
/// point. The claimed signer is not part of the encoding.
pub fn encode_pre_signed_call(signed: &SignedOperation) -> Vec<u8> {
    let auth = &signed.auth;
    let signature = Bytes::from(auth.signature.clone());
    let gas_price = auth.gas_price;
    let nonce = U256::from(auth.nonce);

    match &signed.operation {
        Operation::Transfer { to, value } => transferPreSignedCall {
            signature,
            to: *to,
            value: *value,
            gas_price,
            nonce,
        }
        .abi_encode(),
        Operation::Approve { spender, value } => approvePreSignedCall {
            signature,
            spender: *spender,
            value: *value,
            gas_price,
            nonce,
        }
        .abi_encode(),
        Operation::IncreaseApproval { spender, value } => increaseApprovalPreSignedCall {
            signature,
            spender: *spender,
            value: *value,
            gas_price,
            nonce,
        }
        .abi_encode(),
        Operation::DecreaseApproval { spender, value } => decreaseApprovalPreSignedCall {
            signature,
            spender: *spender,
            value: *value,
            gas_price,
            nonce,
        }
        .abi_encode(),
        Operation::ApproveAndCall {
            spender,
            value,
            data,
        } => approveAndCallPreSignedCall {
            signature,
            spender: *spender,
            value: *value,
            data: Bytes::from(data.clone()),
            gas_price,
            nonce,
        }
        .abi_encode(),
    }
}

/// Encode a revocation as raw call data.
pub fn encode_revoke_call(request: &RevokeRequest) -> Vec<u8> {
    revokeHashPreSignedCall {
        signature: Bytes::from(request.signature.clone()),
        target_hash: request.target_hash,
        gas_price: request.gas_price,
    }
    .abi_encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_protocol::crypto::Keypair;

    fn token() -> Address {
        Address::repeat_byte(0x70)
    }

    fn signed_transfer(kp: &Keypair, value: u64, nonce: u64) -> SignedOperation {
        let operation = Operation::Transfer {
            to: Address::repeat_byte(0x22),
            value: U256::from(value),
        };
        let gas_price = U256::from(1u64);
        let hash = pre_signed_hash(
            token(),
            operation.selector(),
            operation.target(),
            operation.value(),
            &[],
            gas_price,
            nonce,
        );
        SignedOperation {
            operation,
            auth: Authorization {
                signer: kp.address(),
                signature: kp.sign_hash(&hash).unwrap().to_vec(),
                gas_price,
                nonce,
            },
        }
    }

    #[test]
    fn selectors_match_the_erc20_abi() {
        assert_eq!(TRANSFER, [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(APPROVE, [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(INCREASE_APPROVAL, [0xd7, 0x3d, 0xd6, 0x23]);
        assert_eq!(DECREASE_APPROVAL, [0x66, 0x18, 0x84, 0x63]);
        assert_eq!(APPROVE_AND_CALL, [0xca, 0xe9, 0xca, 0x51]);
        assert_eq!(
            approveAndCallPreSignedCall::SIGNATURE,
            "approveAndCallPreSigned(bytes,address,uint256,bytes,uint256,uint256)"
        );
        assert_eq!(
            REVOKE_HASH_PRE_SIGNED,
            keccak256("revokeHashPreSigned(bytes,bytes32,uint256)")[..4]
        );
    }

    #[test]
    fn every_field_changes_the_hash() {
        let one = U256::from(1u64);
        let other = Address::repeat_byte(1);
        let hash = |token, sel, to, value, data: &[u8], gas, nonce| {
            pre_signed_hash(token, sel, to, value, data, gas, nonce)
        };

        let base = hash(token(), TRANSFER, Address::ZERO, one, &[], U256::ZERO, 0);
        let variants = [
            hash(other, TRANSFER, Address::ZERO, one, &[], U256::ZERO, 0),
            hash(token(), APPROVE, Address::ZERO, one, &[], U256::ZERO, 0),
            hash(token(), TRANSFER, other, one, &[], U256::ZERO, 0),
            hash(token(), TRANSFER, Address::ZERO, U256::from(2u64), &[], U256::ZERO, 0),
            hash(token(), TRANSFER, Address::ZERO, one, &[0x11], U256::ZERO, 0),
            hash(token(), TRANSFER, Address::ZERO, one, &[], one, 0),
            hash(token(), TRANSFER, Address::ZERO, one, &[], U256::ZERO, 1),
        ];
        for variant in variants {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn revoke_hash_is_domain_separated() {
        let target = B256::repeat_byte(0x99);
        let revoke = revoke_hash(token(), target, U256::ZERO);
        assert_ne!(revoke, revoke_hash(Address::repeat_byte(1), target, U256::ZERO));
        assert_ne!(revoke, revoke_hash(token(), target, U256::from(1u64)));
        // Same bytes fed as an operation never collide with a revocation.
        let op = pre_signed_hash(
            token(),
            [0; 4],
            Address::ZERO,
            U256::ZERO,
            target.as_slice(),
            U256::ZERO,
            0,
        );
        assert_ne!(revoke, op);
    }

    #[test]
    fn authenticate_accepts_the_real_signer() {
        let kp = Keypair::generate();
        let signed = signed_transfer(&kp, 5, 0);
        assert_eq!(signed.authenticate(token()).unwrap(), signed.hash(token()));
    }

    #[test]
    fn authenticate_rejects_tampering() {
        let kp = Keypair::generate();
        let mut signed = signed_transfer(&kp, 5, 0);
        signed.operation = Operation::Transfer {
            to: Address::repeat_byte(0x22),
            value: U256::from(6u64),
        };
        assert!(matches!(
            signed.authenticate(token()),
            Err(LedgerError::AuthenticationFailure(_))
        ));
    }

    #[test]
    fn authenticate_rejects_another_token() {
        let kp = Keypair::generate();
        let signed = signed_transfer(&kp, 5, 0);
        assert!(signed.authenticate(Address::repeat_byte(0x71)).is_err());
    }

    #[test]
    fn from_parts_rejects_data_on_plain_operations() {
        let result = Operation::from_parts(TRANSFER, Address::ZERO, U256::ZERO, vec![0x11]);
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
        let op =
            Operation::from_parts(APPROVE_AND_CALL, Address::ZERO, U256::ZERO, vec![0x11]).unwrap();
        assert_eq!(op.extra_data(), &[0x11]);
    }

    #[test]
    fn from_parts_rejects_unknown_selectors() {
        let result = Operation::from_parts([1, 2, 3, 4], Address::ZERO, U256::ZERO, vec![]);
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
    }

    #[test]
    fn raw_dispatch_decodes_an_encoded_call() {
        let kp = Keypair::generate();
        let signed = signed_transfer(&kp, 9, 3);
        let raw = encode_pre_signed_call(&signed);
        let decoded = decode_pre_signed_call(&raw, kp.address(), &BTreeMap::new()).unwrap();
        assert_eq!(decoded, PreSignedCall::Operation(signed));
    }

    #[test]
    fn raw_dispatch_rejects_plain_erc20_selectors() {
        let raw = transferCall {
            to: Address::ZERO,
            value: U256::from(1u64),
        }
        .abi_encode();
        let result = decode_pre_signed_call(&raw, Address::ZERO, &BTreeMap::new());
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
    }

    #[test]
    fn raw_dispatch_honours_aliases() {
        let kp = Keypair::generate();
        let signed = signed_transfer(&kp, 1, 0);
        let mut raw = encode_pre_signed_call(&signed);
        raw[..4].copy_from_slice(&[0xfe, 0xed, 0xfa, 0xce]);

        let mut aliases = BTreeMap::new();
        assert!(decode_pre_signed_call(&raw, kp.address(), &aliases).is_err());
        aliases.insert([0xfe, 0xed, 0xfa, 0xce], TRANSFER_PRE_SIGNED);
        assert!(decode_pre_signed_call(&raw, kp.address(), &aliases).is_ok());
    }

    #[test]
    fn raw_dispatch_rejects_truncated_data() {
        let kp = Keypair::generate();
        let raw = encode_pre_signed_call(&signed_transfer(&kp, 1, 0));
        let result = decode_pre_signed_call(&raw[..40], kp.address(), &BTreeMap::new());
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
        let result = decode_pre_signed_call(&raw[..3], kp.address(), &BTreeMap::new());
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
    }

    #[test]
    fn raw_dispatch_rejects_oversized_nonces() {
        let raw = transferPreSignedCall {
            signature: Bytes::from(vec![0u8; 65]),
            to: Address::repeat_byte(0x22),
            value: U256::from(1u64),
            gas_price: U256::ZERO,
            nonce: U256::from(u64::MAX) + U256::from(1u64),
        }
        .abi_encode();
        let result = decode_pre_signed_call(&raw, Address::ZERO, &BTreeMap::new());
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
    }

    #[test]
    fn revocations_decode_through_the_same_entry_table() {
        let request = RevokeRequest {
            signer: Address::repeat_byte(0x33),
            signature: vec![7u8; 65],
            target_hash: B256::repeat_byte(0x44),
            gas_price: U256::from(2u64),
        };
        let raw = encode_revoke_call(&request);
        assert_eq!(raw[..4], REVOKE_HASH_PRE_SIGNED);
        let decoded = decode_pre_signed_call(&raw, request.signer, &BTreeMap::new()).unwrap();
        assert_eq!(decoded, PreSignedCall::Revoke(request));
    }
}
