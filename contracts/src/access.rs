//! # Ownership & Admin Roles
//!
//! Every contract has exactly one root owner. The investment engine also
//! keeps an admin allow-list; the owner is always an admin and can never be
//! removed from that list.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{LedgerError, LedgerResult};

/// Owner plus admin allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    owner: Address,
    admins: BTreeSet<Address>,
}

impl Ownership {
    pub fn new(owner: Address) -> Self {
        let mut admins = BTreeSet::new();
        admins.insert(owner);
        Self { owner, admins }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_admin(&self, who: &Address) -> bool {
        *who == self.owner || self.admins.contains(who)
    }

    pub fn only_owner(&self, caller: &Address) -> LedgerResult<()> {
        if *caller == self.owner {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized(format!(
                "{caller} is not the owner"
            )))
        }
    }

    pub fn only_admin(&self, caller: &Address) -> LedgerResult<()> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized(format!("{caller} is not an admin")))
        }
    }

    /// Grant or revoke admin rights. Owner only.
    pub fn alter_admin(&mut self, caller: &Address, who: Address, enabled: bool) -> LedgerResult<()> {
        self.only_owner(caller)?;
        if who == Address::ZERO {
            return Err(LedgerError::InvalidArgument("admin cannot be the zero address".into()));
        }
        if who == self.owner && !enabled {
            return Err(LedgerError::InvalidArgument("root owner cannot be removed".into()));
        }
        if enabled {
            self.admins.insert(who);
        } else {
            self.admins.remove(&who);
        }
        Ok(())
    }

    /// Hand the root role to `new_owner`. The old owner keeps admin rights
    /// until explicitly revoked.
    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> LedgerResult<()> {
        self.only_owner(caller)?;
        if new_owner == Address::ZERO {
            return Err(LedgerError::InvalidArgument("owner cannot be the zero address".into()));
        }
        self.owner = new_owner;
        self.admins.insert(new_owner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::repeat_byte(0x01)
    }

    #[test]
    fn owner_is_admin() {
        let roles = Ownership::new(owner());
        assert!(roles.is_admin(&owner()));
        assert!(roles.only_owner(&owner()).is_ok());
        assert!(roles.only_admin(&owner()).is_ok());
    }

    #[test]
    fn stranger_is_rejected() {
        let roles = Ownership::new(owner());
        let stranger = Address::repeat_byte(0x02);
        assert!(matches!(roles.only_owner(&stranger), Err(LedgerError::Unauthorized(_))));
        assert!(matches!(roles.only_admin(&stranger), Err(LedgerError::Unauthorized(_))));
    }

    #[test]
    fn admins_can_be_added_and_removed() {
        let mut roles = Ownership::new(owner());
        let admin = Address::repeat_byte(0x03);

        roles.alter_admin(&owner(), admin, true).unwrap();
        assert!(roles.is_admin(&admin));
        assert!(roles.only_owner(&admin).is_err());

        roles.alter_admin(&owner(), admin, false).unwrap();
        assert!(!roles.is_admin(&admin));
    }

    #[test]
    fn root_owner_cannot_be_removed() {
        let mut roles = Ownership::new(owner());
        let result = roles.alter_admin(&owner(), owner(), false);
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
        assert!(roles.is_admin(&owner()));
    }

    #[test]
    fn admins_cannot_appoint_admins() {
        let mut roles = Ownership::new(owner());
        let admin = Address::repeat_byte(0x03);
        roles.alter_admin(&owner(), admin, true).unwrap();
        let result = roles.alter_admin(&admin, Address::repeat_byte(0x04), true);
        assert!(matches!(result, Err(LedgerError::Unauthorized(_))));
    }

    #[test]
    fn ownership_transfer() {
        let mut roles = Ownership::new(owner());
        let next = Address::repeat_byte(0x05);
        roles.transfer_ownership(&owner(), next).unwrap();
        assert_eq!(roles.owner(), next);
        assert!(roles.only_owner(&owner()).is_err());
        assert!(roles.transfer_ownership(&next, Address::ZERO).is_err());
    }
}
