//! # Subcommand Handlers
//!
//! Each handler opens the market stored in a data directory, does one
//! thing, and returns a JSON report for `main` to print. Handlers that
//! change the market log the token events it emitted and save it before
//! returning.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use tally_contracts::market::MANIFEST_KEY;
use tally_contracts::{Market, MarketConfig, PaymentToken, PriceOracle, TradeIntent, TradeSide};
use tally_protocol::crypto::Keypair;
use tally_protocol::storage::LedgerDb;

use crate::cli::{
    BalanceArgs, DataDirArgs, HoldingsArgs, InitArgs, QuoteArgs, RelayArgs, ResolveArgs, TradeArgs,
};

/// File the generated owner key is written to by `init`.
pub const OWNER_KEY_FILE: &str = "owner.key";

fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("db")
}

fn open_db(data_dir: &Path) -> Result<LedgerDb> {
    let path = db_path(data_dir);
    LedgerDb::open(&path).with_context(|| format!("failed to open database at {}", path.display()))
}

fn open_market(data: &DataDirArgs) -> Result<(LedgerDb, Market)> {
    let db = open_db(&data.data_dir)?;
    let market = Market::load(&db).with_context(|| {
        format!(
            "no usable market in {} (run `tally-node init` first)",
            data.data_dir.display()
        )
    })?;
    Ok((db, market))
}

/// Drains the token event logs into the log and saves the market.
fn persist(db: &LedgerDb, market: &mut Market) -> Result<()> {
    for (token, event) in market.take_events() {
        tracing::info!(%token, ?event, "token event");
    }
    market.save(db).context("failed to persist market")
}

fn load_key(path: &Path) -> Result<Keypair> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    Keypair::from_secret_hex(text.trim())
        .with_context(|| format!("{} does not hold a secret key", path.display()))
}

/// Deploys a market, generating an owner key when none is configured.
pub fn init(args: &InitArgs) -> Result<Value> {
    let data_dir = &args.data.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            MarketConfig::from_json(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => MarketConfig::default(),
    };
    if let Some(owner) = args.owner {
        config.owner = owner;
    }

    let mut key_path = None;
    if config.owner.is_zero() {
        let keypair = Keypair::generate();
        let path = data_dir.join(OWNER_KEY_FILE);
        std::fs::write(&path, hex::encode(keypair.secret_bytes()))
            .with_context(|| format!("failed to write owner key to {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!(owner = %keypair.address(), key_path = %path.display(), "owner keypair generated");
        config.owner = keypair.address();
        key_path = Some(path);
    }

    let db = open_db(data_dir)?;
    if db.get_metadata(MANIFEST_KEY)?.is_some() && !args.force {
        bail!(
            "{} already holds a market; pass --force to replace it",
            data_dir.display()
        );
    }

    let mut market = Market::deploy(&config).context("deployment failed")?;
    persist(&db, &mut market)?;
    let manifest = market.manifest()?;
    tracing::info!(owner = %manifest.owner, root = %manifest.state_root, "market initialized");

    Ok(json!({
        "manifest": manifest,
        "owner_key": key_path.map(|p| p.display().to_string()),
    }))
}

/// Deployment manifest plus the engine's mutable settings.
pub fn status(data: &DataDirArgs) -> Result<Value> {
    let (_, market) = open_market(data)?;
    let engine = market.investment();
    Ok(json!({
        "manifest": market.manifest()?,
        "paused": engine.is_paused(),
        "fee_wallet": engine.fee_wallet(),
        "fees": engine.fees(),
        "oracle_gas_price": engine.gas_price(),
        "pending_trades": engine.pending_trades().count(),
        "bank_native_balance": market.bank().native_balance(),
    }))
}

pub fn balance(args: &BalanceArgs) -> Result<Value> {
    let (_, market) = open_market(&args.data)?;
    let report = |token: &tally_contracts::MetaTxToken| {
        json!({
            "symbol": token.symbol(),
            "balance": token.balance_of(&args.account),
            "nonce": token.nonce_of(&args.account),
            "engine_allowance": token.allowance(&args.account, &market.investment().address()),
        })
    };
    Ok(json!({
        "account": args.account,
        "coin": report(market.coin()),
        "cash": report(market.cash()),
        "free_trades": market.investment().free_trades(&args.account),
    }))
}

pub fn holdings(args: &HoldingsArgs) -> Result<Value> {
    let (_, market) = open_market(&args.data)?;
    let amounts = market
        .holdings()
        .return_holdings(&args.account, args.start, args.end)?;
    let entries: Vec<Value> = (args.start..)
        .zip(amounts)
        .map(|(id, amount)| json!({ "asset_id": id, "amount": amount }))
        .collect();
    Ok(json!({ "account": args.account, "holdings": entries }))
}

pub fn quote(args: &QuoteArgs) -> Result<Value> {
    let (_, market) = open_market(&args.data)?;
    let url = market
        .investment()
        .craft_url(&args.ids, args.payment.into())?;
    Ok(json!({ "url": url }))
}

pub fn pending(data: &DataDirArgs) -> Result<Value> {
    let (_, market) = open_market(data)?;
    let trades: Vec<_> = market.investment().pending_trades().collect();
    Ok(json!({ "pending": trades }))
}

/// Requests a trade for the holder of the key file.
///
/// With `--approve` the engine allowance and the request happen in one
/// `approveAndCall`; otherwise an allowance must already be in place by the
/// time the trade settles.
pub fn trade(args: &TradeArgs) -> Result<Value> {
    let (db, mut market) = open_market(&args.data)?;
    let key_path = args
        .key_file
        .clone()
        .unwrap_or_else(|| args.data.data_dir.join(OWNER_KEY_FILE));
    let trader = load_key(&key_path)?.address();
    let payment: PaymentToken = args.payment.into();
    let side: TradeSide = args.side.into();
    let ids = args.ids.clone();
    let amounts = args.amounts.clone();

    let query_id = match (args.approve, side) {
        (Some(value), _) => {
            let intent = TradeIntent {
                side,
                payment,
                asset_ids: ids,
                amounts,
            };
            market.approve_and_trade(trader, payment, value, &intent)?
        }
        (None, TradeSide::Buy) => market.buy(trader, trader, ids, amounts, payment)?,
        (None, TradeSide::Sell) => market.sell(trader, trader, ids, amounts, payment)?,
    };
    persist(&db, &mut market)?;

    let url = market
        .oracle()
        .requests()
        .iter()
        .find(|request| request.query_id == query_id)
        .map(|request| request.url.clone());
    Ok(json!({ "trader": trader, "side": side.to_string(), "query_id": query_id, "url": url }))
}

/// Submits raw pre-signed call data to one of the tokens.
pub fn relay(args: &RelayArgs) -> Result<Value> {
    let (db, mut market) = open_market(&args.data)?;
    let call_data =
        hex::decode(args.call_data.trim_start_matches("0x")).context("call data is not hex")?;
    let token: PaymentToken = args.token.into();

    let receipt = market
        .relay(args.relayer, args.signer, token, &call_data)
        .with_context(|| format!("{token} rejected the call"))?;
    persist(&db, &mut market)?;

    let ledger = market.token(token);
    Ok(json!({
        "receipt": receipt,
        "signer_nonce": ledger.nonce_of(&args.signer),
        "relayer_balance": ledger.balance_of(&args.relayer),
    }))
}

/// Feeds a price payload as the linked oracle.
///
/// A failed settlement is saved before the error is returned; the query is
/// closed either way.
pub fn resolve(args: &ResolveArgs) -> Result<Value> {
    let (db, mut market) = open_market(&args.data)?;
    let proof = hex::decode(args.proof.trim_start_matches("0x")).context("proof is not hex")?;
    let oracle = market.oracle().oracle_address();

    let outcome = market.resolve(oracle, args.query, &args.payload, &proof);
    persist(&db, &mut market)?;

    let settlement = outcome.with_context(|| format!("query {} did not settle", args.query))?;
    Ok(json!({ "settlement": settlement, "status": market.investment().trade_status(&args.query) }))
}
