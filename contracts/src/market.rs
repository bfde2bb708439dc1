//! # Market
//!
//! The store object that owns one complete deployment: the COIN and CASH
//! tokens, the bank, the holdings store, the investment engine and the
//! queued oracle. Every cross-contract transition goes through here so the
//! engine always settles against the contracts it is linked to.
//!
//! ## Deployment
//!
//! Contract addresses are derived from the owner, one index per role
//! (see [`ContractRole`]), so a configuration always deploys to the same
//! addresses. Both tokens mint their full supply to the owner.
//!
//! ## Persistence
//!
//! [`Market::save`] writes every component under its own address plus a
//! JSON manifest in one atomic snapshot. [`Market::load`] reads them back and
//! refuses a snapshot whose recomputed state root differs from the one in
//! the manifest.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use tally_protocol::config::{
    cents_to_price_units, CASH_SYMBOL, COIN_SYMBOL, DEFAULT_CASH_URL, DEFAULT_COIN_URL,
    DEFAULT_FEE_BPS, DEFAULT_FLAT_FEE_CENTS, DEFAULT_ORACLE_GAS_PRICE,
    DEFAULT_TOTAL_SUPPLY_TOKENS, PRICE_SCALE, STORAGE_FORMAT_VERSION, TOKEN_DECIMALS,
};
use tally_protocol::crypto::contract_address;
use tally_protocol::storage::{encode, DbError, LedgerDb};
use thiserror::Error;

use crate::assets::{AssetId, PaymentToken};
use crate::bank::Bank;
use crate::error::{LedgerError, LedgerResult};
use crate::holdings::HoldingsStore;
use crate::investment::{
    Custody, FeeSchedule, Investment, LinkedContracts, Settlement, TradeDesk, TradeIntent,
    TradeStatus,
};
use crate::operation::{Authorization, APPROVE_AND_CALL};
use crate::oracle::{PriceOracle, QueuedOracle};
use crate::receiver::ApprovalReceiver;
use crate::token::{MetaTxToken, TokenEvent, TokenMetadata};

/// Metadata key of the deployment manifest.
pub const MANIFEST_KEY: &str = "manifest";

#[derive(Debug, Error)]
pub enum MarketError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("storage: {0}")]
    Storage(#[from] DbError),

    #[error("config: {0}")]
    Config(String),

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

pub type MarketResult<T> = Result<T, MarketError>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Everything needed to deploy a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub owner: Address,
    /// Receives trading fees. Defaults to the owner.
    pub fee_wallet: Option<Address>,
    pub coin_name: String,
    pub cash_name: String,
    /// Whole tokens minted for each of COIN and CASH.
    pub supply_tokens: u64,
    pub fee_bps: u32,
    pub flat_fee_cents: u64,
    pub gas_price_wei: u64,
    pub coin_url: String,
    pub cash_url: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            owner: Address::ZERO,
            fee_wallet: None,
            coin_name: "Tally Coin".to_string(),
            cash_name: "Tally Cash".to_string(),
            supply_tokens: DEFAULT_TOTAL_SUPPLY_TOKENS,
            fee_bps: DEFAULT_FEE_BPS,
            flat_fee_cents: DEFAULT_FLAT_FEE_CENTS,
            gas_price_wei: DEFAULT_ORACLE_GAS_PRICE,
            coin_url: DEFAULT_COIN_URL.to_string(),
            cash_url: DEFAULT_CASH_URL.to_string(),
        }
    }
}

impl MarketConfig {
    pub fn from_json(text: &str) -> MarketResult<Self> {
        serde_json::from_str(text).map_err(|e| MarketError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> MarketResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| MarketError::Config(e.to_string()))
    }

    fn total_supply(&self) -> MarketResult<U256> {
        U256::from(self.supply_tokens)
            .checked_mul(U256::from(PRICE_SCALE))
            .ok_or_else(|| MarketError::Config("supply overflows".into()))
    }
}

/// Deployment index of each contract, fed to [`contract_address`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractRole {
    Coin = 0,
    Cash = 1,
    Bank = 2,
    Holdings = 3,
    Investment = 4,
    Oracle = 5,
}

impl ContractRole {
    pub fn address(self, owner: &Address) -> Address {
        contract_address(owner, self as u64)
    }
}

/// Which address plays which role in a saved deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u16,
    pub owner: Address,
    pub coin: Address,
    pub cash: Address,
    pub bank: Address,
    pub holdings: Address,
    pub investment: Address,
    pub oracle: Address,
    /// Hex-encoded state root at save time.
    pub state_root: String,
}

/// Outcome of [`Market::relay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReceipt {
    /// Redeemed or revoked hash.
    pub hash: B256,
    /// Trade requested through `approveAndCall`, if any.
    pub query_id: Option<B256>,
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    owner: Address,
    coin: MetaTxToken,
    cash: MetaTxToken,
    bank: Bank,
    holdings: HoldingsStore,
    investment: Investment,
    oracle: QueuedOracle,
}

impl Market {
    pub fn deploy(config: &MarketConfig) -> MarketResult<Self> {
        let owner = config.owner;
        if owner == Address::ZERO {
            return Err(MarketError::Config("owner must be set".into()));
        }
        let supply = config.total_supply()?;
        let linked = LinkedContracts {
            coin_token: ContractRole::Coin.address(&owner),
            cash_token: ContractRole::Cash.address(&owner),
            bank: ContractRole::Bank.address(&owner),
            holdings: ContractRole::Holdings.address(&owner),
            oracle: ContractRole::Oracle.address(&owner),
        };
        let engine = ContractRole::Investment.address(&owner);

        let token = |address, name: &str, symbol: &str| {
            MetaTxToken::new(
                address,
                owner,
                TokenMetadata {
                    name: name.to_string(),
                    symbol: symbol.to_string(),
                    decimals: TOKEN_DECIMALS,
                },
                supply,
            )
        };

        let mut investment = Investment::new(
            engine,
            owner,
            linked,
            config.fee_wallet.unwrap_or(owner),
        );
        investment.set_fees(
            &owner,
            FeeSchedule {
                fee_bps: config.fee_bps,
                flat_fee_usd: U256::from(cents_to_price_units(config.flat_fee_cents)),
            },
        )?;
        investment.change_gas(&owner, U256::from(config.gas_price_wei))?;
        investment.change_urls(&owner, config.coin_url.clone(), config.cash_url.clone())?;

        let market = Self {
            owner,
            coin: token(linked.coin_token, &config.coin_name, COIN_SYMBOL),
            cash: token(linked.cash_token, &config.cash_name, CASH_SYMBOL),
            bank: Bank::new(linked.bank, owner, linked.coin_token, linked.cash_token, engine),
            holdings: HoldingsStore::new(linked.holdings, owner, engine),
            investment,
            oracle: QueuedOracle::new(linked.oracle),
        };
        tracing::info!(
            %owner,
            coin = %linked.coin_token,
            cash = %linked.cash_token,
            engine = %engine,
            "market deployed"
        );
        Ok(market)
    }

    // -- Accessors ----------------------------------------------------------

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn coin(&self) -> &MetaTxToken {
        &self.coin
    }

    pub fn cash(&self) -> &MetaTxToken {
        &self.cash
    }

    pub fn coin_mut(&mut self) -> &mut MetaTxToken {
        &mut self.coin
    }

    pub fn cash_mut(&mut self) -> &mut MetaTxToken {
        &mut self.cash
    }

    pub fn token(&self, payment: PaymentToken) -> &MetaTxToken {
        match payment {
            PaymentToken::Coin => &self.coin,
            PaymentToken::Cash => &self.cash,
        }
    }

    pub fn token_mut(&mut self, payment: PaymentToken) -> &mut MetaTxToken {
        match payment {
            PaymentToken::Coin => &mut self.coin,
            PaymentToken::Cash => &mut self.cash,
        }
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut Bank {
        &mut self.bank
    }

    pub fn holdings(&self) -> &HoldingsStore {
        &self.holdings
    }

    pub fn holdings_mut(&mut self) -> &mut HoldingsStore {
        &mut self.holdings
    }

    pub fn investment(&self) -> &Investment {
        &self.investment
    }

    pub fn investment_mut(&mut self) -> &mut Investment {
        &mut self.investment
    }

    pub fn oracle(&self) -> &QueuedOracle {
        &self.oracle
    }

    /// Drain both tokens' event logs, tagged with the emitting token.
    /// Events are not persisted; a loaded market starts with empty logs.
    pub fn take_events(&mut self) -> Vec<(Address, TokenEvent)> {
        let mut drained = Vec::new();
        for token in [&mut self.coin, &mut self.cash] {
            let address = token.address();
            drained.extend(token.take_events().into_iter().map(|event| (address, event)));
        }
        drained
    }

    // -- Trading ------------------------------------------------------------

    pub fn buy(
        &mut self,
        caller: Address,
        beneficiary: Address,
        asset_ids: Vec<AssetId>,
        amounts: Vec<U256>,
        payment: PaymentToken,
    ) -> LedgerResult<B256> {
        self.investment
            .buy(caller, beneficiary, asset_ids, amounts, payment, &mut self.oracle)
    }

    pub fn sell(
        &mut self,
        caller: Address,
        beneficiary: Address,
        asset_ids: Vec<AssetId>,
        amounts: Vec<U256>,
        payment: PaymentToken,
    ) -> LedgerResult<B256> {
        self.investment
            .sell(caller, beneficiary, asset_ids, amounts, payment, &mut self.oracle)
    }

    /// Deliver the oracle's answer for `query_id`.
    pub fn resolve(
        &mut self,
        caller: Address,
        query_id: B256,
        payload: &str,
        proof: &[u8],
    ) -> LedgerResult<Settlement> {
        let mut custody = Custody {
            coin: &mut self.coin,
            cash: &mut self.cash,
            bank: &self.bank,
            holdings: &mut self.holdings,
        };
        let outcome = self
            .investment
            .resolve(caller, query_id, payload, proof, &mut custody);
        if !matches!(
            self.investment.trade_status(&query_id),
            Some(TradeStatus::Pending) | None
        ) {
            self.oracle.complete(&query_id);
        }
        outcome
    }

    /// Approve the engine in `token` and request `intent` in one step.
    pub fn approve_and_trade(
        &mut self,
        caller: Address,
        token: PaymentToken,
        value: U256,
        intent: &TradeIntent,
    ) -> LedgerResult<B256> {
        let data = intent.encode()?;
        let ledger = match token {
            PaymentToken::Coin => &mut self.coin,
            PaymentToken::Cash => &mut self.cash,
        };
        let mut desk = TradeDesk::new(&mut self.investment, &mut self.oracle);
        ledger.approve_and_call(caller, &mut desk, value, &data)?;
        desk.last_query
            .ok_or_else(|| LedgerError::InvalidArgument("approval did not request a trade".into()))
    }

    /// Relayed variant of [`Market::approve_and_trade`]: the signer never
    /// submits anything and pays the relayer in `token`.
    pub fn approve_and_trade_pre_signed(
        &mut self,
        relayer: Address,
        auth: Authorization,
        token: PaymentToken,
        value: U256,
        intent: &TradeIntent,
    ) -> LedgerResult<B256> {
        let data = intent.encode()?;
        let ledger = match token {
            PaymentToken::Coin => &mut self.coin,
            PaymentToken::Cash => &mut self.cash,
        };
        let mut desk = TradeDesk::new(&mut self.investment, &mut self.oracle);
        ledger.approve_and_call_pre_signed(relayer, auth, &mut desk, value, data)?;
        desk.last_query
            .ok_or_else(|| LedgerError::InvalidArgument("approval did not request a trade".into()))
    }

    /// Pre-signed hash a user signs to approve-and-trade through
    /// [`Market::approve_and_trade_pre_signed`].
    pub fn approve_and_trade_hash(
        &self,
        token: PaymentToken,
        value: U256,
        intent: &TradeIntent,
        gas_price: U256,
        nonce: u64,
    ) -> LedgerResult<B256> {
        let data = intent.encode()?;
        self.token(token).get_pre_signed_hash(
            APPROVE_AND_CALL,
            self.investment.address(),
            value,
            &data,
            gas_price,
            nonce,
        )
    }

    /// Submit raw pre-signed call data to `token` as `relayer`.
    ///
    /// The engine stands in as the approval receiver, so an
    /// `approveAndCallPreSigned` naming the engine as spender requests a
    /// trade in the same step. Any other spender is rejected.
    pub fn relay(
        &mut self,
        relayer: Address,
        signer: Address,
        token: PaymentToken,
        call_data: &[u8],
    ) -> LedgerResult<RelayReceipt> {
        let ledger = match token {
            PaymentToken::Coin => &mut self.coin,
            PaymentToken::Cash => &mut self.cash,
        };
        let mut desk = TradeDesk::new(&mut self.investment, &mut self.oracle);
        let hash = ledger.dispatch(relayer, signer, call_data, Some(&mut desk as &mut dyn ApprovalReceiver))?;
        Ok(RelayReceipt {
            hash,
            query_id: desk.last_query,
        })
    }

    // -- State --------------------------------------------------------------

    fn components(&self) -> MarketResult<Vec<(Address, Vec<u8>)>> {
        Ok(vec![
            (self.coin.address(), encode(&self.coin)?),
            (self.cash.address(), encode(&self.cash)?),
            (self.bank.address(), encode(&self.bank)?),
            (self.holdings.address(), encode(&self.holdings)?),
            (self.investment.address(), encode(&self.investment)?),
            (self.oracle.oracle_address(), encode(&self.oracle)?),
        ])
    }

    /// blake3 over every component's encoding, in deployment order.
    pub fn state_root(&self) -> MarketResult<[u8; 32]> {
        Ok(Self::root_of(&self.components()?))
    }

    fn root_of(components: &[(Address, Vec<u8>)]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        for (address, bytes) in components {
            hasher.update(address.as_slice());
            hasher.update(bytes);
        }
        *hasher.finalize().as_bytes()
    }

    pub fn manifest(&self) -> MarketResult<Manifest> {
        Ok(self.manifest_for(&self.state_root()?))
    }

    fn manifest_for(&self, root: &[u8; 32]) -> Manifest {
        Manifest {
            format_version: STORAGE_FORMAT_VERSION,
            owner: self.owner,
            coin: self.coin.address(),
            cash: self.cash.address(),
            bank: self.bank.address(),
            holdings: self.holdings.address(),
            investment: self.investment.address(),
            oracle: self.oracle.oracle_address(),
            state_root: hex_root(root),
        }
    }

    pub fn save(&self, db: &LedgerDb) -> MarketResult<()> {
        let components = self.components()?;
        let manifest = self.manifest_for(&Self::root_of(&components));
        let manifest_json =
            serde_json::to_vec(&manifest).map_err(|e| MarketError::Config(e.to_string()))?;
        db.put_snapshot(&components, MANIFEST_KEY, &manifest_json)?;
        tracing::info!(root = %manifest.state_root, "market saved");
        Ok(())
    }

    pub fn load(db: &LedgerDb) -> MarketResult<Self> {
        let raw = db
            .get_metadata(MANIFEST_KEY)?
            .ok_or_else(|| MarketError::Storage(DbError::NotFound(MANIFEST_KEY.into())))?;
        let manifest: Manifest = serde_json::from_slice(&raw)
            .map_err(|e| MarketError::Corrupt(format!("manifest: {e}")))?;
        if manifest.format_version != STORAGE_FORMAT_VERSION {
            return Err(MarketError::Corrupt(format!(
                "storage format {} is not supported",
                manifest.format_version
            )));
        }

        let market = Self {
            owner: manifest.owner,
            coin: db.require_contract(&manifest.coin)?,
            cash: db.require_contract(&manifest.cash)?,
            bank: db.require_contract(&manifest.bank)?,
            holdings: db.require_contract(&manifest.holdings)?,
            investment: db.require_contract(&manifest.investment)?,
            oracle: db.require_contract(&manifest.oracle)?,
        };
        let root = hex_root(&market.state_root()?);
        if root != manifest.state_root {
            return Err(MarketError::Corrupt(format!(
                "state root {root} does not match manifest {}",
                manifest.state_root
            )));
        }
        tracing::info!(%root, "market loaded");
        Ok(market)
    }
}

fn hex_root(root: &[u8; 32]) -> String {
    B256::from(*root).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MarketConfig {
        MarketConfig {
            owner: Address::repeat_byte(0x01),
            ..MarketConfig::default()
        }
    }

    #[test]
    fn deploy_links_everything() {
        let market = Market::deploy(&config()).unwrap();
        let owner = market.owner();
        let supply = U256::from(DEFAULT_TOTAL_SUPPLY_TOKENS) * U256::from(PRICE_SCALE);
        assert_eq!(market.coin().balance_of(&owner), supply);
        assert_eq!(market.cash().symbol(), "CASH");
        assert_eq!(market.bank().investment(), market.investment().address());
        assert_eq!(market.holdings().investment(), market.investment().address());
        assert_eq!(market.investment().contracts().oracle, market.oracle().oracle_address());
        assert_eq!(market.investment().fee_wallet(), owner);
    }

    #[test]
    fn deploy_is_deterministic() {
        let a = Market::deploy(&config()).unwrap();
        let b = Market::deploy(&config()).unwrap();
        assert_eq!(a.state_root().unwrap(), b.state_root().unwrap());
        assert_eq!(a.coin().address(), ContractRole::Coin.address(&a.owner()));
    }

    #[test]
    fn deploy_requires_an_owner() {
        assert!(matches!(
            Market::deploy(&MarketConfig::default()),
            Err(MarketError::Config(_))
        ));
    }

    #[test]
    fn deploy_rejects_excessive_fee() {
        let cfg = MarketConfig {
            fee_bps: 5_000,
            ..config()
        };
        assert!(matches!(Market::deploy(&cfg), Err(MarketError::Ledger(_))));
    }

    #[test]
    fn config_json_fills_defaults() {
        let cfg = MarketConfig::from_json(
            r#"{"owner":"0x0101010101010101010101010101010101010101","fee_bps":25}"#,
        )
        .unwrap();
        assert_eq!(cfg.owner, Address::repeat_byte(0x01));
        assert_eq!(cfg.fee_bps, 25);
        assert_eq!(cfg.supply_tokens, DEFAULT_TOTAL_SUPPLY_TOKENS);
        let again = MarketConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(again, cfg);
    }
}
