//! # Meta-Transaction Token
//!
//! A fixed-supply fungible token whose holders can authorize operations
//! off-line. A relayer submits the signed operation, pays for submission,
//! and is reimbursed in this token by the signer.
//!
//! ## Direct vs. pre-signed
//!
//! Every direct operation (`transfer`, `approve`, ...) takes the caller as
//! an explicit argument. Its pre-signed twin takes a [`SignedOperation`]
//! instead and runs the same ledger effect on behalf of the recovered
//! signer, after:
//!
//! 1. recovering the signer and matching it against the claimed signer;
//! 2. rejecting an already-redeemed hash or a nonce other than the current one;
//! 3. consuming the nonce and marking the hash redeemed.
//!
//! The effect is applied next, then the relayer is reimbursed. For
//! `approveAndCall` the receiver hook runs last.
//!
//! ## Atomicity
//!
//! Every public mutator runs inside [`MetaTxToken::transact`]: the token is
//! snapshotted first and restored if anything fails, including a receiver
//! hook that errors after the approval was written.
//!
//! ## Events
//!
//! The event log is not part of the token's persisted state and is left out
//! of the rollback snapshot. A failed transition truncates it back to where
//! it was. Callers drain it with [`MetaTxToken::take_events`].

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_protocol::crypto::recover_signer;

use crate::access::Ownership;
use crate::error::{LedgerError, LedgerResult};
use crate::nonce::NonceRegistry;
use crate::operation::{
    self, decode_pre_signed_call, pre_signed_hash, revoke_hash, Authorization, Operation,
    PreSignedCall, RevokeRequest, Selector, SignedOperation,
};
use crate::receiver::ApprovalReceiver;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Log entries emitted by token transitions, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenEvent {
    Transfer {
        from: Address,
        to: Address,
        value: U256,
    },
    Approval {
        owner: Address,
        spender: Address,
        value: U256,
    },
    HashRedeemed {
        signer: Address,
        hash: B256,
    },
}

/// The token ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTxToken {
    address: Address,
    metadata: TokenMetadata,
    roles: Ownership,
    total_supply: U256,
    balances: BTreeMap<Address, U256>,
    /// `owner -> (spender -> remaining)`.
    allowances: BTreeMap<Address, BTreeMap<Address, U256>>,
    nonces: NonceRegistry,
    /// External selector -> pre-signed entry point, for raw dispatch.
    standards: BTreeMap<Selector, Selector>,
    #[serde(skip)]
    events: Vec<TokenEvent>,
}

impl MetaTxToken {
    /// Deploy a token at `address` with the whole supply held by `owner`.
    pub fn new(address: Address, owner: Address, metadata: TokenMetadata, total_supply: U256) -> Self {
        let mut balances = BTreeMap::new();
        balances.insert(owner, total_supply);
        let events = vec![TokenEvent::Transfer {
            from: Address::ZERO,
            to: owner,
            value: total_supply,
        }];

        Self {
            address,
            metadata,
            roles: Ownership::new(owner),
            total_supply,
            balances,
            allowances: BTreeMap::new(),
            nonces: NonceRegistry::new(),
            standards: BTreeMap::new(),
            events,
        }
    }

    // -- Views --------------------------------------------------------------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }

    pub fn owner(&self) -> Address {
        self.roles.owner()
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn balance_of(&self, who: &Address) -> U256 {
        self.balances.get(who).copied().unwrap_or(U256::ZERO)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> U256 {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// The nonce the signer's next pre-signed operation must carry.
    pub fn nonce_of(&self, signer: &Address) -> u64 {
        self.nonces.current(signer)
    }

    pub fn is_redeemed(&self, signer: &Address, hash: &B256) -> bool {
        self.nonces.is_redeemed(signer, hash)
    }

    /// Sum of all balances. Equal to the total supply at all times.
    pub fn circulating(&self) -> U256 {
        self.balances.values().fold(U256::ZERO, |acc, v| acc.saturating_add(*v))
    }

    pub fn events(&self) -> &[TokenEvent] {
        &self.events
    }

    /// Drain the event log.
    pub fn take_events(&mut self) -> Vec<TokenEvent> {
        std::mem::take(&mut self.events)
    }

    // -- Hash helpers -------------------------------------------------------

    /// Hash to sign for an operation on this token. Rejects unknown
    /// selectors and extra data on operations that take none.
    pub fn get_pre_signed_hash(
        &self,
        selector: Selector,
        to: Address,
        value: U256,
        extra_data: &[u8],
        gas_price: U256,
        nonce: u64,
    ) -> LedgerResult<B256> {
        Operation::from_parts(selector, to, value, extra_data.to_vec())?;
        Ok(pre_signed_hash(self.address, selector, to, value, extra_data, gas_price, nonce))
    }

    /// Hash to sign for a relayed revocation of `target_hash`.
    pub fn get_revoke_hash(&self, target_hash: B256, gas_price: U256) -> B256 {
        revoke_hash(self.address, target_hash, gas_price)
    }

    /// Recover who signed the given operation terms.
    #[allow(clippy::too_many_arguments)]
    pub fn recover_pre_signed(
        &self,
        signature: &[u8],
        selector: Selector,
        to: Address,
        value: U256,
        extra_data: &[u8],
        gas_price: U256,
        nonce: u64,
    ) -> LedgerResult<Address> {
        let hash = self.get_pre_signed_hash(selector, to, value, extra_data, gas_price, nonce)?;
        Ok(recover_signer(&hash, signature)?)
    }

    // -- Transaction wrapper ------------------------------------------------

    /// Run `f` against this token; restore the prior state if it fails.
    pub fn transact<T>(&mut self, f: impl FnOnce(&mut Self) -> LedgerResult<T>) -> LedgerResult<T> {
        let logged = self.events.len();
        let events = std::mem::take(&mut self.events);
        let checkpoint = self.clone();
        self.events = events;

        let result = f(self);
        if result.is_err() {
            let mut events = std::mem::take(&mut self.events);
            events.truncate(logged);
            *self = checkpoint;
            self.events = events;
        }
        result
    }

    // -- Ledger primitives --------------------------------------------------

    fn move_balance(&mut self, from: Address, to: Address, value: U256) -> LedgerResult<()> {
        if to == Address::ZERO {
            return Err(LedgerError::InvalidArgument("transfer to the zero address".into()));
        }
        let available = self.balance_of(&from);
        let remaining = available
            .checked_sub(value)
            .ok_or_else(|| LedgerError::insufficient(available, value))?;

        if from != to {
            let credited = self
                .balance_of(&to)
                .checked_add(value)
                .ok_or_else(|| LedgerError::overflow("transfer"))?;
            self.balances.insert(from, remaining);
            self.balances.insert(to, credited);
        }

        self.events.push(TokenEvent::Transfer { from, to, value });
        Ok(())
    }

    fn set_allowance(&mut self, owner: Address, spender: Address, value: U256) {
        self.allowances.entry(owner).or_default().insert(spender, value);
        self.events.push(TokenEvent::Approval {
            owner,
            spender,
            value,
        });
    }

    fn checked_approval(&self, owner: &Address, spender: &Address, value: U256) -> LedgerResult<()> {
        if *spender == Address::ZERO {
            return Err(LedgerError::InvalidArgument("approval for the zero address".into()));
        }
        let balance = self.balance_of(owner);
        if value > balance {
            return Err(LedgerError::insufficient(balance, value));
        }
        Ok(())
    }

    fn apply_operation(&mut self, signer: Address, op: &Operation) -> LedgerResult<()> {
        match op {
            Operation::Transfer { to, value } => self.move_balance(signer, *to, *value),
            Operation::Approve { spender, value }
            | Operation::ApproveAndCall { spender, value, .. } => {
                self.checked_approval(&signer, spender, *value)?;
                self.set_allowance(signer, *spender, *value);
                Ok(())
            }
            Operation::IncreaseApproval { spender, value } => {
                let raised = self
                    .allowance(&signer, spender)
                    .checked_add(*value)
                    .ok_or_else(|| LedgerError::overflow("increaseApproval"))?;
                self.checked_approval(&signer, spender, raised)?;
                self.set_allowance(signer, *spender, raised);
                Ok(())
            }
            Operation::DecreaseApproval { spender, value } => {
                if *spender == Address::ZERO {
                    return Err(LedgerError::InvalidArgument("approval for the zero address".into()));
                }
                let lowered = self.allowance(&signer, spender).saturating_sub(*value);
                self.set_allowance(signer, *spender, lowered);
                Ok(())
            }
        }
    }

    fn reimburse(&mut self, signer: Address, relayer: Address, gas_price: U256) -> LedgerResult<()> {
        if gas_price.is_zero() {
            return Ok(());
        }
        self.move_balance(signer, relayer, gas_price)
    }

    // -- Direct operations --------------------------------------------------

    pub fn transfer(&mut self, caller: Address, to: Address, value: U256) -> LedgerResult<()> {
        self.transact(|token| token.apply_operation(caller, &Operation::Transfer { to, value }))?;
        tracing::debug!(token = %self.metadata.symbol, from = %caller, %to, %value, "transfer");
        Ok(())
    }

    /// Move `value` from `from` to `to` using the caller's allowance.
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        value: U256,
    ) -> LedgerResult<()> {
        self.transact(|token| {
            let allowed = token.allowance(&from, &caller);
            let remaining = allowed
                .checked_sub(value)
                .ok_or_else(|| LedgerError::insufficient(allowed, value))?;
            token.move_balance(from, to, value)?;
            token.allowances.entry(from).or_default().insert(caller, remaining);
            Ok(())
        })?;
        tracing::debug!(
            token = %self.metadata.symbol,
            spender = %caller,
            %from,
            %to,
            %value,
            "transferFrom"
        );
        Ok(())
    }

    /// Set the allowance outright. It may not exceed the caller's balance.
    pub fn approve(&mut self, caller: Address, spender: Address, value: U256) -> LedgerResult<()> {
        self.transact(|token| token.apply_operation(caller, &Operation::Approve { spender, value }))
    }

    pub fn increase_approval(
        &mut self,
        caller: Address,
        spender: Address,
        added: U256,
    ) -> LedgerResult<()> {
        self.transact(|token| {
            token.apply_operation(
                caller,
                &Operation::IncreaseApproval {
                    spender,
                    value: added,
                },
            )
        })
    }

    /// Lower the allowance, flooring at zero.
    pub fn decrease_approval(
        &mut self,
        caller: Address,
        spender: Address,
        subtracted: U256,
    ) -> LedgerResult<()> {
        self.transact(|token| {
            token.apply_operation(
                caller,
                &Operation::DecreaseApproval {
                    spender,
                    value: subtracted,
                },
            )
        })
    }

    /// Approve `receiver` and invoke its hook in one transition.
    pub fn approve_and_call(
        &mut self,
        caller: Address,
        receiver: &mut dyn ApprovalReceiver,
        value: U256,
        data: &[u8],
    ) -> LedgerResult<()> {
        let spender = receiver.receiver_address();
        self.transact(|token| {
            token.apply_operation(
                caller,
                &Operation::Approve { spender, value },
            )?;
            receiver.receive_approval(token, caller, value, data)
        })?;
        tracing::debug!(token = %self.metadata.symbol, owner = %caller, %spender, %value, "approveAndCall");
        Ok(())
    }

    // -- Pre-signed operations ----------------------------------------------

    /// Redeem a signed operation on behalf of its signer. Returns the
    /// redeemed hash.
    ///
    /// `receiver` is required for `ApproveAndCall` and must sit at the
    /// signed spender address; it is ignored otherwise.
    pub fn redeem(
        &mut self,
        relayer: Address,
        signed: &SignedOperation,
        receiver: Option<&mut dyn ApprovalReceiver>,
    ) -> LedgerResult<B256> {
        let hash = self.transact(move |token| {
            let hash = signed.authenticate(token.address)?;
            let signer = signed.auth.signer;

            token.nonces.ensure_fresh(&signer, &hash)?;
            token.nonces.consume(&signer, signed.auth.nonce)?;
            token.nonces.mark_redeemed(&signer, hash)?;

            token.apply_operation(signer, &signed.operation)?;
            token.reimburse(signer, relayer, signed.auth.gas_price)?;
            token.events.push(TokenEvent::HashRedeemed { signer, hash });

            if let Operation::ApproveAndCall {
                spender,
                value,
                data,
            } = &signed.operation
            {
                let receiver = receiver.ok_or_else(|| {
                    LedgerError::InvalidArgument(format!("no approval receiver at {spender}"))
                })?;
                if receiver.receiver_address() != *spender {
                    return Err(LedgerError::InvalidArgument(format!(
                        "receiver {} does not match signed spender {spender}",
                        receiver.receiver_address()
                    )));
                }
                receiver.receive_approval(token, signer, *value, data)?;
            }
            Ok(hash)
        })?;

        tracing::info!(
            token = %self.metadata.symbol,
            op = signed.operation.name(),
            signer = %signed.auth.signer,
            %relayer,
            gas_price = %signed.auth.gas_price,
            %hash,
            "pre-signed operation redeemed"
        );
        Ok(hash)
    }

    pub fn transfer_pre_signed(
        &mut self,
        relayer: Address,
        auth: Authorization,
        to: Address,
        value: U256,
    ) -> LedgerResult<B256> {
        let signed = SignedOperation {
            operation: Operation::Transfer { to, value },
            auth,
        };
        self.redeem(relayer, &signed, None)
    }

    pub fn approve_pre_signed(
        &mut self,
        relayer: Address,
        auth: Authorization,
        spender: Address,
        value: U256,
    ) -> LedgerResult<B256> {
        let signed = SignedOperation {
            operation: Operation::Approve { spender, value },
            auth,
        };
        self.redeem(relayer, &signed, None)
    }

    pub fn increase_approval_pre_signed(
        &mut self,
        relayer: Address,
        auth: Authorization,
        spender: Address,
        added: U256,
    ) -> LedgerResult<B256> {
        let signed = SignedOperation {
            operation: Operation::IncreaseApproval {
                spender,
                value: added,
            },
            auth,
        };
        self.redeem(relayer, &signed, None)
    }

    pub fn decrease_approval_pre_signed(
        &mut self,
        relayer: Address,
        auth: Authorization,
        spender: Address,
        subtracted: U256,
    ) -> LedgerResult<B256> {
        let signed = SignedOperation {
            operation: Operation::DecreaseApproval {
                spender,
                value: subtracted,
            },
            auth,
        };
        self.redeem(relayer, &signed, None)
    }

    /// Pre-signed approve of `receiver` followed by its hook.
    pub fn approve_and_call_pre_signed(
        &mut self,
        relayer: Address,
        auth: Authorization,
        receiver: &mut dyn ApprovalReceiver,
        value: U256,
        data: Vec<u8>,
    ) -> LedgerResult<B256> {
        let signed = SignedOperation {
            operation: Operation::ApproveAndCall {
                spender: receiver.receiver_address(),
                value,
                data,
            },
            auth,
        };
        self.redeem(relayer, &signed, Some(receiver))
    }

    // -- Revocation ---------------------------------------------------------

    /// Mark `hash` as redeemed for the caller so it can never be executed.
    /// Does not touch the caller's nonce.
    pub fn revoke_hash(&mut self, caller: Address, hash: B256) -> LedgerResult<()> {
        self.transact(|token| {
            token.nonces.mark_redeemed(&caller, hash)?;
            token.events.push(TokenEvent::HashRedeemed {
                signer: caller,
                hash,
            });
            Ok(())
        })?;
        tracing::info!(token = %self.metadata.symbol, signer = %caller, %hash, "hash revoked");
        Ok(())
    }

    /// Relayed revocation. Consumes the revoke hash and the target hash,
    /// advances the signer's nonce and reimburses the relayer.
    pub fn revoke_hash_pre_signed(
        &mut self,
        relayer: Address,
        request: &RevokeRequest,
    ) -> LedgerResult<B256> {
        let revoke = self.transact(|token| {
            let revoke = request.authenticate(token.address)?;
            let signer = request.signer;

            token.nonces.mark_redeemed(&signer, revoke)?;
            token.nonces.mark_redeemed(&signer, request.target_hash)?;
            token.nonces.advance(&signer);
            token.reimburse(signer, relayer, request.gas_price)?;
            token.events.push(TokenEvent::HashRedeemed {
                signer,
                hash: request.target_hash,
            });
            Ok(revoke)
        })?;
        tracing::info!(
            token = %self.metadata.symbol,
            signer = %request.signer,
            target = %request.target_hash,
            %relayer,
            "hash revoked by relayer"
        );
        Ok(revoke)
    }

    // -- Raw dispatch -------------------------------------------------------

    /// Decode and execute raw pre-signed call data attributed to `signer`.
    pub fn dispatch(
        &mut self,
        relayer: Address,
        signer: Address,
        call_data: &[u8],
        receiver: Option<&mut dyn ApprovalReceiver>,
    ) -> LedgerResult<B256> {
        match decode_pre_signed_call(call_data, signer, &self.standards)? {
            PreSignedCall::Operation(signed) => self.redeem(relayer, &signed, receiver),
            PreSignedCall::Revoke(request) => self.revoke_hash_pre_signed(relayer, &request),
        }
    }

    /// Map an external selector onto one of this token's pre-signed entry
    /// points. Owner only.
    pub fn update_standard(
        &mut self,
        caller: Address,
        standard: Selector,
        entry: Selector,
    ) -> LedgerResult<()> {
        self.roles.only_owner(&caller)?;
        if !operation::is_pre_signed_entry(entry) {
            return Err(LedgerError::InvalidArgument(
                "alias target is not a pre-signed entry point".into(),
            ));
        }
        self.standards.insert(standard, entry);
        Ok(())
    }

    // -- Administration -----------------------------------------------------

    /// Send tokens stuck at the token's own address to the owner. Owner only.
    pub fn recover_stray(&mut self, caller: Address) -> LedgerResult<U256> {
        self.roles.only_owner(&caller)?;
        let amount = self.balance_of(&self.address);
        let (from, owner) = (self.address, self.roles.owner());
        self.transact(|token| token.move_balance(from, owner, amount))?;
        tracing::info!(token = %self.metadata.symbol, %amount, "stray tokens recovered");
        Ok(amount)
    }
}

/// A token accepts approvals from other tokens: `data` is raw pre-signed
/// call data for *this* token, signed by the approving account, which is
/// also reimbursed for it.
impl ApprovalReceiver for MetaTxToken {
    fn receiver_address(&self) -> Address {
        self.address
    }

    fn receive_approval(
        &mut self,
        token: &mut MetaTxToken,
        from: Address,
        value: U256,
        data: &[u8],
    ) -> LedgerResult<()> {
        tracing::debug!(
            token = %self.metadata.symbol,
            via = %token.address(),
            %from,
            %value,
            "nested pre-signed call"
        );
        self.dispatch(from, from, data, None).map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
