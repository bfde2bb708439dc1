//! # Bank
//!
//! Custody for the two native tokens. The bank's balances are simply its
//! address's balances in the COIN and CASH ledgers; only the linked
//! investment engine can move them out.
//!
//! Anything else that lands here by mistake (another token, native coin)
//! can be swept to the owner. The two custody tokens never can.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::access::Ownership;
use crate::error::{LedgerError, LedgerResult};
use crate::token::MetaTxToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    address: Address,
    roles: Ownership,
    coin_token: Address,
    cash_token: Address,
    investment: Address,
    /// Native coin held by the bank.
    native_balance: U256,
}

impl Bank {
    pub fn new(
        address: Address,
        owner: Address,
        coin_token: Address,
        cash_token: Address,
        investment: Address,
    ) -> Self {
        Self {
            address,
            roles: Ownership::new(owner),
            coin_token,
            cash_token,
            investment,
            native_balance: U256::ZERO,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.roles.owner()
    }

    pub fn investment(&self) -> Address {
        self.investment
    }

    pub fn native_balance(&self) -> U256 {
        self.native_balance
    }

    fn is_custody_token(&self, token: &Address) -> bool {
        *token == self.coin_token || *token == self.cash_token
    }

    /// Pay `amount` of a custody token to `to`. Investment only.
    pub fn transfer(
        &self,
        caller: &Address,
        token: &mut MetaTxToken,
        to: Address,
        amount: U256,
    ) -> LedgerResult<()> {
        if *caller != self.investment {
            return Err(LedgerError::Unauthorized(format!(
                "{caller} is not the linked investment contract"
            )));
        }
        if !self.is_custody_token(&token.address()) {
            return Err(LedgerError::InvalidArgument(format!(
                "bank does not custody token {}",
                token.address()
            )));
        }
        token.transfer(self.address, to, amount)?;
        tracing::debug!(bank = %self.address, token = %token.symbol(), %to, %amount, "bank payout");
        Ok(())
    }

    pub fn change_investment(&mut self, caller: &Address, investment: Address) -> LedgerResult<()> {
        self.roles.only_owner(caller)?;
        self.investment = investment;
        tracing::info!(bank = %self.address, %investment, "bank investment link changed");
        Ok(())
    }

    /// Credit native coin sent to the bank.
    pub fn receive_native(&mut self, amount: U256) -> LedgerResult<()> {
        self.native_balance = self
            .native_balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::overflow("native balance"))?;
        Ok(())
    }

    /// Sweep the bank's whole balance of a non-custody token to the owner.
    pub fn token_escape(&self, caller: &Address, token: &mut MetaTxToken) -> LedgerResult<U256> {
        self.roles.only_owner(caller)?;
        if self.is_custody_token(&token.address()) {
            return Err(LedgerError::InvalidArgument(format!(
                "{} is a custody token and cannot be escaped",
                token.symbol()
            )));
        }
        let amount = token.balance_of(&self.address);
        token.transfer(self.address, self.roles.owner(), amount)?;
        tracing::info!(bank = %self.address, token = %token.symbol(), %amount, "token escaped");
        Ok(amount)
    }

    /// Sweep all native coin. Returns the amount handed to the owner.
    pub fn escape_native(&mut self, caller: &Address) -> LedgerResult<U256> {
        self.roles.only_owner(caller)?;
        let amount = std::mem::replace(&mut self.native_balance, U256::ZERO);
        tracing::info!(bank = %self.address, %amount, "native coin escaped");
        Ok(amount)
    }
}
