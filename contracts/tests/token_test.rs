//! Integration tests for the pre-signed token.
//!
//! Every test signs with a real secp256k1 key and submits through a
//! relayer, the way a wallet and a relaying service would.

use alloy_primitives::{Address, B256, U256};
use tally_contracts::operation::{
    encode_pre_signed_call, encode_revoke_call, Operation, APPROVE_AND_CALL, TRANSFER,
};
use tally_contracts::{
    ApprovalReceiver, Authorization, LedgerError, LedgerResult, MetaTxToken, RevokeRequest,
    SignedOperation, TokenEvent, TokenMetadata,
};
use tally_protocol::crypto::Keypair;

const SUPPLY: u64 = 1_000_000;

fn token_at(address: Address, owner: Address) -> MetaTxToken {
    MetaTxToken::new(
        address,
        owner,
        TokenMetadata {
            name: "Tally Coin".into(),
            symbol: "COIN".into(),
            decimals: 18,
        },
        U256::from(SUPPLY),
    )
}

fn relayer() -> Address {
    Address::repeat_byte(0xCC)
}

fn bob() -> Address {
    Address::repeat_byte(0xB0)
}

/// Sign `operation` on `token` and wrap it with its authorization.
fn sign(
    kp: &Keypair,
    token: &MetaTxToken,
    operation: Operation,
    gas_price: u64,
    nonce: u64,
) -> SignedOperation {
    let hash = token
        .get_pre_signed_hash(
            operation.selector(),
            operation.target(),
            operation.value(),
            operation.extra_data(),
            U256::from(gas_price),
            nonce,
        )
        .unwrap();
    let signature = kp.sign_hash(&hash).unwrap();
    SignedOperation {
        operation,
        auth: Authorization {
            signer: kp.address(),
            signature: signature.to_vec(),
            gas_price: U256::from(gas_price),
            nonce,
        },
    }
}

fn transfer(to: Address, value: u64) -> Operation {
    Operation::Transfer {
        to,
        value: U256::from(value),
    }
}

// ---------------------------------------------------------------------------
// Relayed transfers
// ---------------------------------------------------------------------------

#[test]
fn relayer_submits_signed_transfer() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let signed = sign(&kp, &token, transfer(bob(), 300), 7, 0);

    let hash = token
        .transfer_pre_signed(relayer(), signed.auth.clone(), bob(), U256::from(300u64))
        .unwrap();

    assert_eq!(token.balance_of(&bob()), U256::from(300u64));
    assert_eq!(token.balance_of(&kp.address()), U256::from(SUPPLY - 307));
    assert_eq!(token.balance_of(&relayer()), U256::from(7u64));
    assert_eq!(token.nonce_of(&kp.address()), 1);
    assert!(token.is_redeemed(&kp.address(), &hash));
    assert_eq!(token.circulating(), token.total_supply());
    assert!(token.events().contains(&TokenEvent::HashRedeemed {
        signer: kp.address(),
        hash,
    }));

    let replay = token.redeem(relayer(), &signed, None);
    assert!(matches!(replay, Err(LedgerError::ReplayRejected(_))));
    assert_eq!(token.balance_of(&bob()), U256::from(300u64));
}

#[test]
fn zero_gas_price_skips_reimbursement() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let signed = sign(&kp, &token, transfer(bob(), 10), 0, 0);
    token.redeem(relayer(), &signed, None).unwrap();
    assert_eq!(token.balance_of(&relayer()), U256::ZERO);
}

#[test]
fn recover_pre_signed_round_trip() {
    let kp = Keypair::generate();
    let token = token_at(Address::repeat_byte(0x70), kp.address());
    let signed = sign(&kp, &token, transfer(bob(), 5), 1, 0);
    let recovered = token
        .recover_pre_signed(
            &signed.auth.signature,
            TRANSFER,
            bob(),
            U256::from(5u64),
            &[],
            U256::from(1u64),
            0,
        )
        .unwrap();
    assert_eq!(recovered, kp.address());
}

#[test]
fn any_altered_field_fails_authentication() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let signed = sign(&kp, &token, transfer(bob(), 100), 2, 0);

    let mut altered = Vec::new();
    let mut s = signed.clone();
    s.operation = transfer(bob(), 101);
    altered.push(s);
    let mut s = signed.clone();
    s.operation = transfer(relayer(), 100);
    altered.push(s);
    let mut s = signed.clone();
    s.operation = Operation::Approve {
        spender: bob(),
        value: U256::from(100u64),
    };
    altered.push(s);
    let mut s = signed.clone();
    s.auth.gas_price = U256::from(3u64);
    altered.push(s);

    for attempt in &altered {
        let result = token.redeem(relayer(), attempt, None);
        assert!(
            matches!(result, Err(LedgerError::AuthenticationFailure(_))),
            "{attempt:?} was accepted"
        );
    }
    assert_eq!(token.nonce_of(&kp.address()), 0);

    // The untouched original still goes through.
    token.redeem(relayer(), &signed, None).unwrap();
}

#[test]
fn wrong_claimed_signer_is_rejected() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let mut signed = sign(&kp, &token, transfer(bob(), 1), 0, 0);
    signed.auth.signer = bob();
    assert!(matches!(
        token.redeem(relayer(), &signed, None),
        Err(LedgerError::AuthenticationFailure(_))
    ));
}

#[test]
fn signature_for_another_token_is_rejected() {
    let kp = Keypair::generate();
    let coin = token_at(Address::repeat_byte(0x70), kp.address());
    let mut cash = token_at(Address::repeat_byte(0x71), kp.address());
    let signed = sign(&kp, &coin, transfer(bob(), 1), 0, 0);
    assert!(matches!(
        cash.redeem(relayer(), &signed, None),
        Err(LedgerError::AuthenticationFailure(_))
    ));
}

#[test]
fn nonce_must_be_current() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let ahead = sign(&kp, &token, transfer(bob(), 1), 0, 1);
    assert!(matches!(
        token.redeem(relayer(), &ahead, None),
        Err(LedgerError::ReplayRejected(_))
    ));

    let first = sign(&kp, &token, transfer(bob(), 1), 0, 0);
    token.redeem(relayer(), &first, None).unwrap();
    token.redeem(relayer(), &ahead, None).unwrap();
    assert_eq!(token.nonce_of(&kp.address()), 2);

    // Nonce 1 is spent, whatever operation tries to use it.
    let approve = Operation::Approve {
        spender: bob(),
        value: U256::from(1u64),
    };
    let stale = sign(&kp, &token, approve, 0, 1);
    assert!(matches!(
        token.redeem(relayer(), &stale, None),
        Err(LedgerError::ReplayRejected(_))
    ));
}

#[test]
fn failed_effect_keeps_nonce_and_hash_unspent() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let too_much = sign(&kp, &token, transfer(bob(), SUPPLY + 1), 0, 0);
    let hash = too_much.hash(token.address());

    assert!(matches!(
        token.redeem(relayer(), &too_much, None),
        Err(LedgerError::InsufficientFunds { .. })
    ));
    assert_eq!(token.nonce_of(&kp.address()), 0);
    assert!(!token.is_redeemed(&kp.address(), &hash));
}

#[test]
fn reimbursement_counts_against_balance() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let signed = sign(&kp, &token, transfer(bob(), SUPPLY), 1, 0);
    assert!(matches!(
        token.redeem(relayer(), &signed, None),
        Err(LedgerError::InsufficientFunds { .. })
    ));
    assert_eq!(token.balance_of(&kp.address()), U256::from(SUPPLY));
}

// ---------------------------------------------------------------------------
// Approvals
// ---------------------------------------------------------------------------

#[test]
fn pre_signed_approval_family() {
    let kp = Keypair::generate();
    let me = kp.address();
    let mut token = token_at(Address::repeat_byte(0x70), me);

    let s = sign(&kp, &token, Operation::Approve { spender: bob(), value: U256::from(50u64) }, 1, 0);
    token.approve_pre_signed(relayer(), s.auth, bob(), U256::from(50u64)).unwrap();
    assert_eq!(token.allowance(&me, &bob()), U256::from(50u64));

    let op = Operation::IncreaseApproval {
        spender: bob(),
        value: U256::from(25u64),
    };
    let s = sign(&kp, &token, op, 1, 1);
    token
        .increase_approval_pre_signed(relayer(), s.auth, bob(), U256::from(25u64))
        .unwrap();
    assert_eq!(token.allowance(&me, &bob()), U256::from(75u64));

    let op = Operation::DecreaseApproval {
        spender: bob(),
        value: U256::from(500u64),
    };
    let s = sign(&kp, &token, op, 1, 2);
    token
        .decrease_approval_pre_signed(relayer(), s.auth, bob(), U256::from(500u64))
        .unwrap();
    assert_eq!(token.allowance(&me, &bob()), U256::ZERO);
    assert_eq!(token.balance_of(&relayer()), U256::from(3u64));
    assert_eq!(token.nonce_of(&me), 3);
}

#[test]
fn approval_cannot_exceed_balance() {
    let owner = Address::repeat_byte(0x01);
    let mut token = token_at(Address::repeat_byte(0x70), owner);
    assert!(matches!(
        token.approve(owner, bob(), U256::from(SUPPLY + 1)),
        Err(LedgerError::InsufficientFunds { .. })
    ));
    token.approve(owner, bob(), U256::from(SUPPLY)).unwrap();
    assert!(token.increase_approval(owner, bob(), U256::from(1u64)).is_err());
    assert!(matches!(
        token.approve(owner, Address::ZERO, U256::from(1u64)),
        Err(LedgerError::InvalidArgument(_))
    ));
}

// ---------------------------------------------------------------------------
// Revocation
// ---------------------------------------------------------------------------

#[test]
fn direct_revocation_blocks_the_hash_without_spending_a_nonce() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let signed = sign(&kp, &token, transfer(bob(), 10), 0, 0);
    let hash = signed.hash(token.address());

    token.revoke_hash(kp.address(), hash).unwrap();
    assert_eq!(token.nonce_of(&kp.address()), 0);
    assert!(matches!(
        token.redeem(relayer(), &signed, None),
        Err(LedgerError::ReplayRejected(_))
    ));

    // Nonce 0 is still usable for a different operation.
    let other = sign(&kp, &token, transfer(bob(), 11), 0, 0);
    token.redeem(relayer(), &other, None).unwrap();
}

#[test]
fn relayed_revocation() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let signed = sign(&kp, &token, transfer(bob(), 10), 0, 0);
    let target = signed.hash(token.address());

    let gas = U256::from(4u64);
    let revoke_hash = token.get_revoke_hash(target, gas);
    assert_ne!(revoke_hash, target);
    let request = RevokeRequest {
        signer: kp.address(),
        signature: kp.sign_hash(&revoke_hash).unwrap().to_vec(),
        target_hash: target,
        gas_price: gas,
    };

    let redeemed = token.revoke_hash_pre_signed(relayer(), &request).unwrap();
    assert_eq!(redeemed, revoke_hash);
    assert!(token.is_redeemed(&kp.address(), &target));
    assert_eq!(token.nonce_of(&kp.address()), 1);
    assert_eq!(token.balance_of(&relayer()), gas);

    assert!(matches!(
        token.redeem(relayer(), &signed, None),
        Err(LedgerError::ReplayRejected(_))
    ));
    assert!(matches!(
        token.revoke_hash_pre_signed(relayer(), &request),
        Err(LedgerError::ReplayRejected(_))
    ));
}

#[test]
fn revocation_signed_by_someone_else_is_rejected() {
    let kp = Keypair::generate();
    let mallory = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let target = B256::repeat_byte(0x42);
    let hash = token.get_revoke_hash(target, U256::ZERO);
    let request = RevokeRequest {
        signer: kp.address(),
        signature: mallory.sign_hash(&hash).unwrap().to_vec(),
        target_hash: target,
        gas_price: U256::ZERO,
    };
    assert!(matches!(
        token.revoke_hash_pre_signed(relayer(), &request),
        Err(LedgerError::AuthenticationFailure(_))
    ));
    assert!(!token.is_redeemed(&kp.address(), &target));
}

// ---------------------------------------------------------------------------
// Raw dispatch
// ---------------------------------------------------------------------------

#[test]
fn dispatch_executes_encoded_calls() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let signed = sign(&kp, &token, transfer(bob(), 9), 1, 0);
    let raw = encode_pre_signed_call(&signed);

    token.dispatch(relayer(), kp.address(), &raw, None).unwrap();
    assert_eq!(token.balance_of(&bob()), U256::from(9u64));

    let next = sign(&kp, &token, transfer(bob(), 1), 0, 1);
    let target = next.hash(token.address());
    let hash = token.get_revoke_hash(target, U256::ZERO);
    let request = RevokeRequest {
        signer: kp.address(),
        signature: kp.sign_hash(&hash).unwrap().to_vec(),
        target_hash: target,
        gas_price: U256::ZERO,
    };
    token
        .dispatch(relayer(), kp.address(), &encode_revoke_call(&request), None)
        .unwrap();
    assert!(token.is_redeemed(&kp.address(), &target));
}

#[test]
fn dispatch_rejects_truncated_or_unknown_calls() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let signed = sign(&kp, &token, transfer(bob(), 9), 1, 0);
    let raw = encode_pre_signed_call(&signed);

    assert!(matches!(
        token.dispatch(relayer(), kp.address(), &raw[..100], None),
        Err(LedgerError::InvalidArgument(_))
    ));
    let mut unknown = raw.clone();
    unknown[..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    assert!(matches!(
        token.dispatch(relayer(), kp.address(), &unknown, None),
        Err(LedgerError::InvalidArgument(_))
    ));
    assert_eq!(token.nonce_of(&kp.address()), 0);
}

#[test]
fn standard_alias_routes_to_entry_point() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let signed = sign(&kp, &token, transfer(bob(), 9), 0, 0);
    let mut raw = encode_pre_signed_call(&signed);
    let entry: [u8; 4] = raw[..4].try_into().unwrap();

    let alias = [0x12, 0x34, 0x56, 0x78];
    token.update_standard(kp.address(), alias, entry).unwrap();
    raw[..4].copy_from_slice(&alias);
    token.dispatch(relayer(), kp.address(), &raw, None).unwrap();
    assert_eq!(token.balance_of(&bob()), U256::from(9u64));
}

// ---------------------------------------------------------------------------
// approveAndCall
// ---------------------------------------------------------------------------

/// Pulls the whole approved amount into itself.
struct Puller {
    address: Address,
}

impl ApprovalReceiver for Puller {
    fn receiver_address(&self) -> Address {
        self.address
    }

    fn receive_approval(
        &mut self,
        token: &mut MetaTxToken,
        from: Address,
        value: U256,
        _data: &[u8],
    ) -> LedgerResult<()> {
        token.transfer_from(self.address, from, self.address, value)
    }
}

/// Tries to replay the operation that called it.
struct Replayer {
    address: Address,
    replay: Option<SignedOperation>,
}

impl ApprovalReceiver for Replayer {
    fn receiver_address(&self) -> Address {
        self.address
    }

    fn receive_approval(
        &mut self,
        token: &mut MetaTxToken,
        from: Address,
        value: U256,
        _data: &[u8],
    ) -> LedgerResult<()> {
        token.transfer_from(self.address, from, self.address, value)?;
        match self.replay.take() {
            Some(signed) => {
                let mut inner = Replayer {
                    address: self.address,
                    replay: None,
                };
                token
                    .redeem(self.address, &signed, Some(&mut inner as &mut dyn ApprovalReceiver))
                    .map(|_| ())
            }
            None => Ok(()),
        }
    }
}

fn approve_and_call(receiver: Address, value: u64, data: &[u8]) -> Operation {
    Operation::ApproveAndCall {
        spender: receiver,
        value: U256::from(value),
        data: data.to_vec(),
    }
}

#[test]
fn approve_and_call_receiver_pulls_funds() {
    let owner = Address::repeat_byte(0x01);
    let mut token = token_at(Address::repeat_byte(0x70), owner);
    let mut puller = Puller {
        address: Address::repeat_byte(0x99),
    };
    token
        .approve_and_call(owner, &mut puller, U256::from(40u64), b"hello")
        .unwrap();
    assert_eq!(token.balance_of(&puller.address), U256::from(40u64));
    assert_eq!(token.allowance(&owner, &puller.address), U256::ZERO);
}

#[test]
fn pre_signed_approve_and_call() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let mut puller = Puller {
        address: Address::repeat_byte(0x99),
    };
    let signed = sign(&kp, &token, approve_and_call(puller.address, 40, b"x"), 2, 0);
    assert_eq!(signed.operation.selector(), APPROVE_AND_CALL);

    token
        .approve_and_call_pre_signed(relayer(), signed.auth, &mut puller, U256::from(40u64), b"x".to_vec())
        .unwrap();
    assert_eq!(token.balance_of(&puller.address), U256::from(40u64));
    assert_eq!(token.balance_of(&relayer()), U256::from(2u64));
    assert_eq!(token.nonce_of(&kp.address()), 1);
}

#[test]
fn approve_and_call_receiver_must_match_signed_spender() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let signed = sign(&kp, &token, approve_and_call(Address::repeat_byte(0x99), 40, b""), 0, 0);
    let mut impostor = Puller {
        address: Address::repeat_byte(0x98),
    };
    assert!(token
        .redeem(relayer(), &signed, Some(&mut impostor as &mut dyn ApprovalReceiver))
        .is_err());
    assert!(token.redeem(relayer(), &signed, None).is_err());
    assert_eq!(token.nonce_of(&kp.address()), 0);
}

#[test]
fn reentrant_replay_rolls_back_everything() {
    let kp = Keypair::generate();
    let mut token = token_at(Address::repeat_byte(0x70), kp.address());
    let receiver = Address::repeat_byte(0x99);
    let signed = sign(&kp, &token, approve_and_call(receiver, 40, b""), 1, 0);
    let before = token.clone();

    let mut replayer = Replayer {
        address: receiver,
        replay: Some(signed.clone()),
    };
    let result = token.redeem(
        relayer(),
        &signed,
        Some(&mut replayer as &mut dyn ApprovalReceiver),
    );
    assert!(matches!(result, Err(LedgerError::ReplayRejected(_))));
    assert_eq!(token, before);
}

#[test]
fn token_as_receiver_runs_nested_pre_signed_call() {
    let kp = Keypair::generate();
    let user = kp.address();
    let mut coin = token_at(Address::repeat_byte(0x70), user);
    let mut cash = token_at(Address::repeat_byte(0x71), user);

    // Signed on CASH, delivered through an approval on COIN.
    let inner = sign(&kp, &cash, transfer(bob(), 25), 3, 0);
    let data = encode_pre_signed_call(&inner);
    coin.approve_and_call(user, &mut cash, U256::from(1u64), &data).unwrap();

    assert_eq!(cash.balance_of(&bob()), U256::from(25u64));
    assert_eq!(cash.nonce_of(&user), 1);
    // Gas was reimbursed to the approving account itself.
    assert_eq!(cash.balance_of(&user), U256::from(SUPPLY - 25));
    assert_eq!(coin.allowance(&user, &cash.address()), U256::from(1u64));
}
