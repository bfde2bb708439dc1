//! # Holdings Store
//!
//! Per-user, per-asset position sizes. Only the linked investment engine
//! can change them; anyone can read them.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_protocol::config::MAX_HOLDINGS_PAGE;

use crate::access::Ownership;
use crate::assets::{AssetId, TradeSide};
use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingsStore {
    address: Address,
    roles: Ownership,
    investment: Address,
    holdings: BTreeMap<Address, BTreeMap<AssetId, U256>>,
}

impl HoldingsStore {
    pub fn new(address: Address, owner: Address, investment: Address) -> Self {
        Self {
            address,
            roles: Ownership::new(owner),
            investment,
            holdings: BTreeMap::new(),
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

    pub fn holding(&self, user: &Address, id: AssetId) -> U256 {
        self.holdings
            .get(user)
            .and_then(|positions| positions.get(&id))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Holdings for ids `start..=end`, at most [`MAX_HOLDINGS_PAGE`] of them.
    pub fn return_holdings(&self, user: &Address, start: AssetId, end: AssetId) -> LedgerResult<Vec<U256>> {
        let span = end.checked_sub(start).ok_or_else(|| {
            LedgerError::InvalidArgument(format!("holdings range end {end} precedes start {start}"))
        })?;
        if span >= MAX_HOLDINGS_PAGE {
            return Err(LedgerError::InvalidArgument(format!(
                "holdings range {start}..={end} exceeds {MAX_HOLDINGS_PAGE} ids"
            )));
        }
        Ok((start..=end).map(|id| self.holding(user, id)).collect())
    }

    /// Check that `modify_holdings` would succeed without applying it.
    pub fn check_modification(
        &self,
        user: &Address,
        ids: &[AssetId],
        amounts: &[U256],
        side: TradeSide,
    ) -> LedgerResult<()> {
        if ids.len() != amounts.len() {
            return Err(LedgerError::InvalidArgument(format!(
                "{} asset ids but {} amounts",
                ids.len(),
                amounts.len()
            )));
        }
        for (id, amount) in ids.iter().zip(amounts) {
            let held = self.holding(user, *id);
            match side {
                TradeSide::Buy => {
                    held.checked_add(*amount)
                        .ok_or_else(|| LedgerError::overflow("holdings"))?;
                }
                TradeSide::Sell => {
                    if held < *amount {
                        return Err(LedgerError::insufficient(held, *amount));
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply a trade's position changes. Investment only; all-or-nothing.
    pub fn modify_holdings(
        &mut self,
        caller: &Address,
        user: Address,
        ids: &[AssetId],
        amounts: &[U256],
        side: TradeSide,
    ) -> LedgerResult<()> {
        if *caller != self.investment {
            return Err(LedgerError::Unauthorized(format!(
                "{caller} is not the linked investment contract"
            )));
        }
        self.check_modification(&user, ids, amounts, side)?;

        let positions = self.holdings.entry(user).or_default();
        for (id, amount) in ids.iter().zip(amounts) {
            let entry = positions.entry(*id).or_insert(U256::ZERO);
            *entry = match side {
                TradeSide::Buy => entry.saturating_add(*amount),
                TradeSide::Sell => entry.saturating_sub(*amount),
            };
        }
        tracing::debug!(%user, %side, assets = ids.len(), "holdings modified");
        Ok(())
    }

    pub fn change_investment(&mut self, caller: &Address, investment: Address) -> LedgerResult<()> {
        self.roles.only_owner(caller)?;
        self.investment = investment;
        tracing::info!(holdings = %self.address, %investment, "holdings investment link changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::repeat_byte(0x01)
    }

    fn investment() -> Address {
        Address::repeat_byte(0x10)
    }

    fn user() -> Address {
        Address::repeat_byte(0x20)
    }

    fn store() -> HoldingsStore {
        HoldingsStore::new(Address::repeat_byte(0x30), owner(), investment())
    }

    fn amounts(values: &[u64]) -> Vec<U256> {
        values.iter().map(|v| U256::from(*v)).collect()
    }

    #[test]
    fn buy_then_sell() {
        let mut h = store();
        h.modify_holdings(&investment(), user(), &[4, 7], &amounts(&[10, 20]), TradeSide::Buy)
            .unwrap();
        assert_eq!(h.holding(&user(), 4), U256::from(10u64));
        assert_eq!(h.holding(&user(), 7), U256::from(20u64));

        h.modify_holdings(&investment(), user(), &[7], &amounts(&[5]), TradeSide::Sell)
            .unwrap();
        assert_eq!(h.holding(&user(), 7), U256::from(15u64));
    }

    #[test]
    fn only_investment_may_modify() {
        let mut h = store();
        let result = h.modify_holdings(&owner(), user(), &[4], &amounts(&[1]), TradeSide::Buy);
        assert!(matches!(result, Err(LedgerError::Unauthorized(_))));
    }

    #[test]
    fn oversell_changes_nothing() {
        let mut h = store();
        h.modify_holdings(&investment(), user(), &[4, 6], &amounts(&[5, 5]), TradeSide::Buy)
            .unwrap();
        let result =
            h.modify_holdings(&investment(), user(), &[4, 6], &amounts(&[1, 6]), TradeSide::Sell);
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(h.holding(&user(), 4), U256::from(5u64));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let mut h = store();
        let result = h.modify_holdings(&investment(), user(), &[4, 6], &amounts(&[1]), TradeSide::Buy);
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
    }

    #[test]
    fn return_holdings_is_inclusive() {
        let mut h = store();
        h.modify_holdings(&investment(), user(), &[0, 2], &amounts(&[1, 3]), TradeSide::Buy)
            .unwrap();
        assert_eq!(h.return_holdings(&user(), 0, 2).unwrap(), amounts(&[1, 0, 3]));
        assert_eq!(h.return_holdings(&user(), 2, 2).unwrap(), amounts(&[3]));
        assert!(matches!(
            h.return_holdings(&user(), 3, 2),
            Err(LedgerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn return_holdings_is_capped() {
        let mut h = store();
        h.modify_holdings(&investment(), user(), &[7], &amounts(&[5]), TradeSide::Buy)
            .unwrap();

        let last = MAX_HOLDINGS_PAGE - 1;
        let page = h.return_holdings(&user(), 0, last).unwrap();
        assert_eq!(page.len() as u64, MAX_HOLDINGS_PAGE);
        assert_eq!(page[7], U256::from(5u64));

        assert!(matches!(
            h.return_holdings(&user(), 0, MAX_HOLDINGS_PAGE),
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            h.return_holdings(&user(), 0, AssetId::MAX),
            Err(LedgerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn change_investment_is_owner_only() {
        let mut h = store();
        let next = Address::repeat_byte(0x11);
        assert!(h.change_investment(&user(), next).is_err());
        h.change_investment(&owner(), next).unwrap();
        assert_eq!(h.investment(), next);
        assert!(h
            .modify_holdings(&investment(), user(), &[4], &amounts(&[1]), TradeSide::Buy)
            .is_err());
    }
}
