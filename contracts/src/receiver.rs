//! # Approval Receivers
//!
//! `approveAndCall` grants an allowance and then hands control to the
//! spender in the same transition. The spender is a typed receiver rather
//! than an arbitrary address, so a plain wallet can never be "called" and a
//! receiver can never act as anyone but itself.

use alloy_primitives::{Address, U256};

use crate::error::LedgerResult;
use crate::token::MetaTxToken;

/// A contract that reacts to being granted an allowance.
pub trait ApprovalReceiver {
    /// Address the allowance is granted to.
    fn receiver_address(&self) -> Address;

    /// Called after the allowance is in place. `token` is the approving
    /// token; `from` is the account that granted `value`.
    ///
    /// Returning an error rolls back the approval and everything else the
    /// enclosing transition did.
    fn receive_approval(
        &mut self,
        token: &mut MetaTxToken,
        from: Address,
        value: U256,
        data: &[u8],
    ) -> LedgerResult<()>;
}
