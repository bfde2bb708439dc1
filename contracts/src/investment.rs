//! # Investment Engine
//!
//! Turns buy/sell intents into holdings and token movements once an
//! external oracle has priced them.
//!
//! ## Trade lifecycle
//!
//! ```text
//! buy/sell ──► Requested ──► oracle.request(url) ──► PriceQueried (pending)
//!                                                        │
//!                         resolve(query_id, payload) ◄───┘
//!                                   │
//!                    ┌──────────────┴──────────────┐
//!                  Filled                        Failed
//! ```
//!
//! Nothing is escrowed at request time. Allowances, balances and holdings
//! are all checked when the callback arrives, so a trade can fail late. A
//! query id resolves exactly once: a failed settlement is terminal and the
//! user has to submit a new request.
//!
//! ## Money flow
//!
//! | trade              | user pays                      | user receives               |
//! |--------------------|--------------------------------|-----------------------------|
//! | buy                | `value` payment tokens         | holdings `+= amounts`       |
//! | sell               | holdings `-= amounts`          | `value - fee` from the bank |
//! | native buy         | `value` payment tokens         | `amount` counter tokens     |
//! | native sell        | `amount` counter tokens        | `value - fee` from the bank |
//!
//! On the paying side `value - fee` goes to the bank and `fee` to the fee
//! wallet. Buyer payments are pulled with `transferFrom`, so the user must
//! have approved the engine beforehand (or approve-and-call into it).

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tally_protocol::config::{
    cents_to_price_units, BPS_DENOMINATOR, DEFAULT_CASH_URL, DEFAULT_COIN_URL,
    DEFAULT_FEE_BPS, DEFAULT_FLAT_FEE_CENTS, DEFAULT_ORACLE_GAS_PRICE, MAX_FEE_BPS, PRICE_SCALE,
};

use crate::access::Ownership;
use crate::assets::{AssetId, AssetRegistry, PaymentToken, TradeSide};
use crate::bank::Bank;
use crate::error::{LedgerError, LedgerResult};
use crate::holdings::HoldingsStore;
use crate::oracle::{calculate_value, craft_url, decode_prices, PriceOracle};
use crate::receiver::ApprovalReceiver;
use crate::token::MetaTxToken;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Addresses of every contract the engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedContracts {
    pub coin_token: Address,
    pub cash_token: Address,
    pub bank: Address,
    pub holdings: Address,
    pub oracle: Address,
}

impl LinkedContracts {
    fn payment_token(&self, payment: PaymentToken) -> Address {
        match payment {
            PaymentToken::Coin => self.coin_token,
            PaymentToken::Cash => self.cash_token,
        }
    }

    fn is_native_token(&self, token: &Address) -> bool {
        *token == self.coin_token || *token == self.cash_token
    }
}

/// Trading fee: a percentage of the trade value plus a flat USD amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Percentage part, in basis points.
    pub fee_bps: u32,
    /// Flat part in USD, 18-decimal fixed point.
    pub flat_fee_usd: U256,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            fee_bps: DEFAULT_FEE_BPS,
            flat_fee_usd: U256::from(cents_to_price_units(DEFAULT_FLAT_FEE_CENTS)),
        }
    }
}

impl FeeSchedule {
    /// Fee in payment tokens for a trade worth `value` payment tokens,
    /// capped at `value`.
    pub fn fee_for(&self, value: U256, self_price: U256) -> LedgerResult<U256> {
        if self_price.is_zero() {
            return Err(LedgerError::MalformedPayload("payment token price is zero".into()));
        }
        let percentage = value
            .checked_mul(U256::from(self.fee_bps))
            .ok_or_else(|| LedgerError::overflow("fee"))?
            / U256::from(BPS_DENOMINATOR);
        let flat = self
            .flat_fee_usd
            .checked_mul(U256::from(PRICE_SCALE))
            .ok_or_else(|| LedgerError::overflow("flat fee"))?
            / self_price;
        Ok(percentage.saturating_add(flat).min(value))
    }
}

/// A trade waiting for its price callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTrade {
    pub query_id: B256,
    pub user: Address,
    pub asset_ids: Vec<AssetId>,
    pub amounts: Vec<U256>,
    pub side: TradeSide,
    pub payment: PaymentToken,
    pub requested_at: DateTime<Utc>,
}

/// Where a query id is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Pending,
    Filled,
    /// Settlement was rejected; the reason is kept for inspection.
    Failed(String),
}

/// What a successful resolution did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub query_id: B256,
    pub user: Address,
    pub side: TradeSide,
    pub payment: PaymentToken,
    pub asset_ids: Vec<AssetId>,
    pub amounts: Vec<U256>,
    /// `[self_price, price(asset_ids[0]), ...]`.
    pub prices: Vec<U256>,
    /// Trade value in payment tokens.
    pub value: U256,
    pub fee: U256,
    /// The fee was waived against a free-trade credit.
    pub free_trade: bool,
    /// COIN/CASH swap that bypassed the holdings store.
    pub native_exchange: bool,
}

/// A trade request carried as `approveAndCall` data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub side: TradeSide,
    pub payment: PaymentToken,
    pub asset_ids: Vec<AssetId>,
    pub amounts: Vec<U256>,
}

impl TradeIntent {
    pub fn encode(&self) -> LedgerResult<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| LedgerError::InvalidArgument(format!("unencodable trade intent: {e}")))
    }

    pub fn decode(data: &[u8]) -> LedgerResult<Self> {
        bincode::deserialize(data)
            .map_err(|e| LedgerError::InvalidArgument(format!("malformed trade intent: {e}")))
    }
}

/// Mutable view of the contracts a settlement moves value through.
pub struct Custody<'a> {
    pub coin: &'a mut MetaTxToken,
    pub cash: &'a mut MetaTxToken,
    pub bank: &'a Bank,
    pub holdings: &'a mut HoldingsStore,
}

struct CustodySnapshot {
    coin: MetaTxToken,
    cash: MetaTxToken,
    holdings: HoldingsStore,
}

impl Custody<'_> {
    fn checkpoint(&self) -> CustodySnapshot {
        CustodySnapshot {
            coin: self.coin.clone(),
            cash: self.cash.clone(),
            holdings: self.holdings.clone(),
        }
    }

    fn restore(&mut self, snapshot: CustodySnapshot) {
        *self.coin = snapshot.coin;
        *self.cash = snapshot.cash;
        *self.holdings = snapshot.holdings;
    }

    /// `(payment token, counter token)`.
    fn split(&mut self, payment: PaymentToken) -> (&mut MetaTxToken, &mut MetaTxToken) {
        match payment {
            PaymentToken::Coin => (&mut *self.coin, &mut *self.cash),
            PaymentToken::Cash => (&mut *self.cash, &mut *self.coin),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investment {
    address: Address,
    roles: Ownership,
    contracts: LinkedContracts,
    fee_wallet: Address,
    paused: bool,
    /// Gas price offered to the oracle for each query.
    gas_price: U256,
    coin_url: String,
    cash_url: String,
    assets: AssetRegistry,
    fees: FeeSchedule,
    free_trades: BTreeMap<Address, u64>,
    pending: BTreeMap<B256, PendingTrade>,
    settled: BTreeMap<B256, TradeStatus>,
    native_balance: U256,
}

impl Investment {
    pub fn new(
        address: Address,
        owner: Address,
        contracts: LinkedContracts,
        fee_wallet: Address,
    ) -> Self {
        Self {
            address,
            roles: Ownership::new(owner),
            contracts,
            fee_wallet,
            paused: false,
            gas_price: U256::from(DEFAULT_ORACLE_GAS_PRICE),
            coin_url: DEFAULT_COIN_URL.to_string(),
            cash_url: DEFAULT_CASH_URL.to_string(),
            assets: AssetRegistry::default(),
            fees: FeeSchedule::default(),
            free_trades: BTreeMap::new(),
            pending: BTreeMap::new(),
            settled: BTreeMap::new(),
            native_balance: U256::ZERO,
        }
    }

    // -- Views --------------------------------------------------------------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.roles.owner()
    }

    pub fn is_admin(&self, who: &Address) -> bool {
        self.roles.is_admin(who)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn contracts(&self) -> &LinkedContracts {
        &self.contracts
    }

    pub fn fee_wallet(&self) -> Address {
        self.fee_wallet
    }

    pub fn gas_price(&self) -> U256 {
        self.gas_price
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    pub fn free_trades(&self, user: &Address) -> u64 {
        self.free_trades.get(user).copied().unwrap_or(0)
    }

    pub fn native_balance(&self) -> U256 {
        self.native_balance
    }

    pub fn pending_trade(&self, query_id: &B256) -> Option<&PendingTrade> {
        self.pending.get(query_id)
    }

    pub fn pending_trades(&self) -> impl Iterator<Item = &PendingTrade> {
        self.pending.values()
    }

    pub fn trade_status(&self, query_id: &B256) -> Option<TradeStatus> {
        if self.pending.contains_key(query_id) {
            return Some(TradeStatus::Pending);
        }
        self.settled.get(query_id).cloned()
    }

    /// Oracle URL for a trade in `ids` paid with `payment`.
    pub fn craft_url(&self, ids: &[AssetId], payment: PaymentToken) -> LedgerResult<String> {
        let base = match payment {
            PaymentToken::Coin => &self.coin_url,
            PaymentToken::Cash => &self.cash_url,
        };
        craft_url(base, &self.assets, ids)
    }

    // -- Requests -----------------------------------------------------------

    /// Request a buy of `amounts` of `asset_ids` for `beneficiary`.
    pub fn buy(
        &mut self,
        caller: Address,
        beneficiary: Address,
        asset_ids: Vec<AssetId>,
        amounts: Vec<U256>,
        payment: PaymentToken,
        oracle: &mut dyn PriceOracle,
    ) -> LedgerResult<B256> {
        self.request(caller, beneficiary, asset_ids, amounts, TradeSide::Buy, payment, oracle)
    }

    pub fn sell(
        &mut self,
        caller: Address,
        beneficiary: Address,
        asset_ids: Vec<AssetId>,
        amounts: Vec<U256>,
        payment: PaymentToken,
        oracle: &mut dyn PriceOracle,
    ) -> LedgerResult<B256> {
        self.request(caller, beneficiary, asset_ids, amounts, TradeSide::Sell, payment, oracle)
    }

    #[allow(clippy::too_many_arguments)]
    fn request(
        &mut self,
        caller: Address,
        beneficiary: Address,
        asset_ids: Vec<AssetId>,
        amounts: Vec<U256>,
        side: TradeSide,
        payment: PaymentToken,
        oracle: &mut dyn PriceOracle,
    ) -> LedgerResult<B256> {
        if self.paused {
            return Err(LedgerError::Paused);
        }
        if caller != beneficiary && !self.contracts.is_native_token(&caller) {
            return Err(LedgerError::Unauthorized(format!(
                "{caller} cannot trade for {beneficiary}"
            )));
        }
        if beneficiary == Address::ZERO {
            return Err(LedgerError::InvalidArgument("trade for the zero address".into()));
        }
        if asset_ids.is_empty() || asset_ids.len() != amounts.len() {
            return Err(LedgerError::InvalidArgument(format!(
                "{} asset ids but {} amounts",
                asset_ids.len(),
                amounts.len()
            )));
        }
        let distinct: BTreeSet<_> = asset_ids.iter().collect();
        if distinct.len() != asset_ids.len() {
            return Err(LedgerError::InvalidArgument("duplicate asset id in trade".into()));
        }
        if oracle.oracle_address() != self.contracts.oracle {
            return Err(LedgerError::InvalidArgument(format!(
                "oracle {} is not the linked oracle",
                oracle.oracle_address()
            )));
        }

        let url = self.craft_url(&asset_ids, payment)?;
        let query_id = oracle.request(&url, self.gas_price)?;
        if self.pending.contains_key(&query_id) || self.settled.contains_key(&query_id) {
            oracle.cancel(&query_id);
            tracing::warn!(%query_id, "oracle reused a query id; request withdrawn");
            return Err(LedgerError::ReplayRejected(format!("query id {query_id} reused")));
        }

        tracing::info!(
            %query_id,
            user = %beneficiary,
            %side,
            %payment,
            assets = ?asset_ids,
            "trade requested"
        );
        self.pending.insert(
            query_id,
            PendingTrade {
                query_id,
                user: beneficiary,
                asset_ids,
                amounts,
                side,
                payment,
                requested_at: Utc::now(),
            },
        );
        Ok(query_id)
    }

    // -- Resolution ---------------------------------------------------------

    /// Oracle callback. Settles the pending trade for `query_id` against
    /// `payload`.
    ///
    /// Errors before the trade is looked up (wrong caller, unknown or
    /// already-resolved id, mismatched custody) leave everything untouched.
    /// Once looked up, the trade is consumed either way: on failure custody
    /// is rolled back, the query is recorded as failed and the error is
    /// returned.
    pub fn resolve(
        &mut self,
        caller: Address,
        query_id: B256,
        payload: &str,
        proof: &[u8],
        custody: &mut Custody<'_>,
    ) -> LedgerResult<Settlement> {
        if caller != self.contracts.oracle {
            return Err(LedgerError::Unauthorized(format!("{caller} is not the linked oracle")));
        }
        if self.settled.contains_key(&query_id) {
            return Err(LedgerError::ReplayRejected(format!("query {query_id} already resolved")));
        }
        self.check_custody(custody)?;
        let trade = self
            .pending
            .remove(&query_id)
            .ok_or_else(|| LedgerError::InvalidArgument(format!("unknown query id {query_id}")))?;

        tracing::debug!(%query_id, proof_len = proof.len(), "price callback received");

        let outcome = self.plan(&trade, payload).and_then(|settlement| {
            let checkpoint = custody.checkpoint();
            match self.apply(&settlement, custody) {
                Ok(()) => Ok(settlement),
                Err(err) => {
                    custody.restore(checkpoint);
                    Err(err)
                }
            }
        });

        match outcome {
            Ok(settlement) => {
                if settlement.free_trade {
                    if let Some(credit) = self.free_trades.get_mut(&settlement.user) {
                        *credit = credit.saturating_sub(1);
                    }
                }
                self.settled.insert(query_id, TradeStatus::Filled);
                tracing::info!(
                    %query_id,
                    user = %settlement.user,
                    side = %settlement.side,
                    value = %settlement.value,
                    fee = %settlement.fee,
                    free_trade = settlement.free_trade,
                    native = settlement.native_exchange,
                    "trade filled"
                );
                Ok(settlement)
            }
            Err(err) => {
                tracing::warn!(%query_id, user = %trade.user, error = %err, "trade failed");
                self.settled.insert(query_id, TradeStatus::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    fn check_custody(&self, custody: &Custody<'_>) -> LedgerResult<()> {
        let linked = &self.contracts;
        let matches = custody.coin.address() == linked.coin_token
            && custody.cash.address() == linked.cash_token
            && custody.bank.address() == linked.bank
            && custody.holdings.address() == linked.holdings;
        if matches {
            Ok(())
        } else {
            Err(LedgerError::InvalidArgument(
                "custody contracts do not match the linked contracts".into(),
            ))
        }
    }

    /// Price the trade and work out its fee.
    fn plan(&self, trade: &PendingTrade, payload: &str) -> LedgerResult<Settlement> {
        let prices = decode_prices(&self.assets, &trade.asset_ids, trade.payment, payload)?;
        let value = calculate_value(&trade.amounts, &prices)?;

        let free_trade = self.free_trades(&trade.user) > 0;
        let fee = if free_trade {
            U256::ZERO
        } else {
            self.fees.fee_for(value, prices[0])?
        };
        let native_exchange = trade.asset_ids.as_slice() == [trade.payment.counter_asset()];

        Ok(Settlement {
            query_id: trade.query_id,
            user: trade.user,
            side: trade.side,
            payment: trade.payment,
            asset_ids: trade.asset_ids.clone(),
            amounts: trade.amounts.clone(),
            prices,
            value,
            fee,
            free_trade,
            native_exchange,
        })
    }

    fn apply(&self, s: &Settlement, custody: &mut Custody<'_>) -> LedgerResult<()> {
        let bank = custody.bank;
        let bank_address = bank.address();
        let proceeds = s.value - s.fee;

        match (s.side, s.native_exchange) {
            (TradeSide::Buy, false) => {
                let (pay, _) = custody.split(s.payment);
                self.collect(pay, s.user, bank_address, proceeds, s.fee)?;
                custody
                    .holdings
                    .modify_holdings(&self.address, s.user, &s.asset_ids, &s.amounts, TradeSide::Buy)?;
            }
            (TradeSide::Sell, false) => {
                custody
                    .holdings
                    .modify_holdings(&self.address, s.user, &s.asset_ids, &s.amounts, TradeSide::Sell)?;
                let (pay, _) = custody.split(s.payment);
                self.pay_out(bank, pay, s.user, proceeds, s.fee)?;
            }
            (TradeSide::Buy, true) => {
                let (pay, counter) = custody.split(s.payment);
                self.collect(pay, s.user, bank_address, proceeds, s.fee)?;
                bank.transfer(&self.address, counter, s.user, s.amounts[0])?;
            }
            (TradeSide::Sell, true) => {
                let (pay, counter) = custody.split(s.payment);
                counter.transfer_from(self.address, s.user, bank_address, s.amounts[0])?;
                self.pay_out(bank, pay, s.user, proceeds, s.fee)?;
            }
        }
        Ok(())
    }

    /// Pull a buyer's payment: `proceeds` to the bank, `fee` to the wallet.
    fn collect(
        &self,
        token: &mut MetaTxToken,
        user: Address,
        bank: Address,
        proceeds: U256,
        fee: U256,
    ) -> LedgerResult<()> {
        let due = proceeds + fee;
        let allowed = token.allowance(&user, &self.address);
        if allowed < due {
            return Err(LedgerError::insufficient(allowed, due));
        }
        token.transfer_from(self.address, user, bank, proceeds)?;
        if !fee.is_zero() {
            token.transfer_from(self.address, user, self.fee_wallet, fee)?;
        }
        Ok(())
    }

    /// Pay a seller from the bank: `proceeds` to the user, `fee` to the wallet.
    fn pay_out(
        &self,
        bank: &Bank,
        token: &mut MetaTxToken,
        user: Address,
        proceeds: U256,
        fee: U256,
    ) -> LedgerResult<()> {
        bank.transfer(&self.address, token, user, proceeds)?;
        if !fee.is_zero() {
            bank.transfer(&self.address, token, self.fee_wallet, fee)?;
        }
        Ok(())
    }

    // -- Administration -----------------------------------------------------

    pub fn alter_pause(&mut self, caller: &Address, paused: bool) -> LedgerResult<()> {
        self.roles.only_admin(caller)?;
        self.paused = paused;
        tracing::info!(engine = %self.address, paused, "trading pause toggled");
        Ok(())
    }

    pub fn alter_admin(&mut self, caller: &Address, who: Address, enabled: bool) -> LedgerResult<()> {
        self.roles.alter_admin(caller, who, enabled)?;
        tracing::info!(engine = %self.address, %who, enabled, "admin list changed");
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> LedgerResult<()> {
        self.roles.transfer_ownership(caller, new_owner)
    }

    /// Register a new asset pair. Returns the regular id.
    pub fn add_asset(&mut self, caller: &Address, symbol: &str, with_inverse: bool) -> LedgerResult<AssetId> {
        self.roles.only_admin(caller)?;
        let id = self.assets.add_asset(symbol, with_inverse)?;
        tracing::info!(engine = %self.address, id, symbol, with_inverse, "asset added");
        Ok(id)
    }

    pub fn edit_asset(&mut self, caller: &Address, id: AssetId, symbol: &str) -> LedgerResult<()> {
        self.roles.only_admin(caller)?;
        self.assets.edit_asset(id, symbol)?;
        tracing::info!(engine = %self.address, id, symbol, "asset edited");
        Ok(())
    }

    pub fn change_contracts(&mut self, caller: &Address, contracts: LinkedContracts) -> LedgerResult<()> {
        self.roles.only_owner(caller)?;
        self.contracts = contracts;
        tracing::info!(engine = %self.address, ?contracts, "linked contracts changed");
        Ok(())
    }

    pub fn change_urls(&mut self, caller: &Address, coin_url: String, cash_url: String) -> LedgerResult<()> {
        self.roles.only_owner(caller)?;
        tracing::info!(engine = %self.address, %coin_url, %cash_url, "oracle urls changed");
        self.coin_url = coin_url;
        self.cash_url = cash_url;
        Ok(())
    }

    pub fn change_gas(&mut self, caller: &Address, gas_price: U256) -> LedgerResult<()> {
        self.roles.only_admin(caller)?;
        self.gas_price = gas_price;
        tracing::info!(engine = %self.address, %gas_price, "oracle gas price changed");
        Ok(())
    }

    pub fn transfer_fee_wallet(&mut self, caller: &Address, wallet: Address) -> LedgerResult<()> {
        self.roles.only_owner(caller)?;
        if wallet == Address::ZERO {
            return Err(LedgerError::InvalidArgument("fee wallet cannot be the zero address".into()));
        }
        self.fee_wallet = wallet;
        tracing::info!(engine = %self.address, %wallet, "fee wallet changed");
        Ok(())
    }

    pub fn set_fees(&mut self, caller: &Address, fees: FeeSchedule) -> LedgerResult<()> {
        self.roles.only_owner(caller)?;
        if fees.fee_bps > MAX_FEE_BPS {
            return Err(LedgerError::InvalidArgument(format!(
                "fee of {} bps exceeds the {MAX_FEE_BPS} bps cap",
                fees.fee_bps
            )));
        }
        self.fees = fees;
        tracing::info!(engine = %self.address, fee_bps = fees.fee_bps, flat_fee = %fees.flat_fee_usd, "fees changed");
        Ok(())
    }

    /// Grant `counts[i]` fee-free trades to `users[i]`.
    pub fn add_trades(&mut self, caller: &Address, users: &[Address], counts: &[u64]) -> LedgerResult<()> {
        self.roles.only_admin(caller)?;
        if users.len() != counts.len() {
            return Err(LedgerError::InvalidArgument(format!(
                "{} users but {} counts",
                users.len(),
                counts.len()
            )));
        }
        let mut granted = self.free_trades.clone();
        for (user, count) in users.iter().zip(counts) {
            let credit = granted.entry(*user).or_insert(0);
            *credit = credit
                .checked_add(*count)
                .ok_or_else(|| LedgerError::overflow("free trades"))?;
        }
        self.free_trades = granted;
        tracing::info!(engine = %self.address, users = users.len(), "free trades granted");
        Ok(())
    }

    /// Credit native coin sent by an admin (oracle fee float).
    pub fn receive_native(&mut self, caller: &Address, amount: U256) -> LedgerResult<()> {
        self.roles.only_admin(caller)?;
        self.native_balance = self
            .native_balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::overflow("native balance"))?;
        Ok(())
    }

    /// Sweep the engine's balance of a foreign token to the owner.
    pub fn token_escape(&self, caller: &Address, token: &mut MetaTxToken) -> LedgerResult<U256> {
        self.roles.only_owner(caller)?;
        if self.contracts.is_native_token(&token.address()) {
            return Err(LedgerError::InvalidArgument(format!(
                "{} is a native token and cannot be escaped",
                token.symbol()
            )));
        }
        let amount = token.balance_of(&self.address);
        token.transfer(self.address, self.roles.owner(), amount)?;
        tracing::info!(engine = %self.address, token = %token.symbol(), %amount, "token escaped");
        Ok(amount)
    }

    pub fn escape_native(&mut self, caller: &Address) -> LedgerResult<U256> {
        self.roles.only_owner(caller)?;
        let amount = std::mem::replace(&mut self.native_balance, U256::ZERO);
        tracing::info!(engine = %self.address, %amount, "native coin escaped");
        Ok(amount)
    }
}

// ---------------------------------------------------------------------------
// Approve-and-call entry
// ---------------------------------------------------------------------------

/// The engine as an approval receiver: a native token approves it and
/// passes an encoded [`TradeIntent`], and the trade is requested for the
/// approving account in the same transition.
pub struct TradeDesk<'a> {
    pub investment: &'a mut Investment,
    pub oracle: &'a mut dyn PriceOracle,
    /// Query id of the last trade requested through this desk.
    pub last_query: Option<B256>,
}

impl<'a> TradeDesk<'a> {
    pub fn new(investment: &'a mut Investment, oracle: &'a mut dyn PriceOracle) -> Self {
        Self {
            investment,
            oracle,
            last_query: None,
        }
    }
}

impl ApprovalReceiver for TradeDesk<'_> {
    fn receiver_address(&self) -> Address {
        self.investment.address()
    }

    fn receive_approval(
        &mut self,
        token: &mut MetaTxToken,
        from: Address,
        value: U256,
        data: &[u8],
    ) -> LedgerResult<()> {
        let caller = token.address();
        if !self.investment.contracts.is_native_token(&caller) {
            return Err(LedgerError::Unauthorized(format!(
                "{caller} is not a linked native token"
            )));
        }
        let intent = TradeIntent::decode(data)?;
        if intent.side == TradeSide::Buy
            && self.investment.contracts.payment_token(intent.payment) != caller
        {
            return Err(LedgerError::InvalidArgument(format!(
                "buy paid in {} must be approved in that token",
                intent.payment
            )));
        }
        tracing::debug!(token = %token.symbol(), %from, %value, side = %intent.side, "trade via approval");
        let query_id = self.investment.request(
            caller,
            from,
            intent.asset_ids,
            intent.amounts,
            intent.side,
            intent.payment,
            &mut *self.oracle,
        )?;
        self.last_query = Some(query_id);
        Ok(())
    }
}
