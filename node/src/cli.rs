//! # CLI Interface
//!
//! Defines the command-line argument structure for `tally-node` using
//! `clap` derive. Every subcommand other than `version` works against a
//! market persisted in a sled data directory.

use alloy_primitives::{Address, B256, U256};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use tally_contracts::{PaymentToken, TradeSide};

/// Operator tool for a persisted tally market.
///
/// Deploys a market into a data directory, inspects token balances and
/// holdings, crafts price-feed URLs, requests trades, relays pre-signed
/// token calls and feeds oracle callbacks back into the investment engine.
#[derive(Parser, Debug)]
#[command(
    name = "tally-node",
    about = "Operator CLI for a tally market",
    version,
    propagate_version = true
)]
pub struct TallyNodeCli {
    /// Log output format.
    #[arg(long, global = true, value_enum, env = "TALLY_LOG_FORMAT", default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the tally node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy a fresh market into the data directory.
    Init(InitArgs),
    /// Print the deployment manifest and engine settings.
    Status(DataDirArgs),
    /// Show an account's COIN and CASH balances and nonces.
    Balance(BalanceArgs),
    /// Show an account's holdings over a range of asset ids.
    Holdings(HoldingsArgs),
    /// Print the price-feed URL the engine would request for a trade.
    Quote(QuoteArgs),
    /// List trades waiting for a price callback.
    Pending(DataDirArgs),
    /// Request a buy or sell as the holder of a key file.
    Trade(TradeArgs),
    /// Submit raw pre-signed call data to a token as a relayer.
    Relay(RelayArgs),
    /// Deliver a price payload for a pending query.
    Resolve(ResolveArgs),
    /// Print version information and exit.
    Version,
}

/// Shared data directory flag.
#[derive(Args, Debug, Clone)]
pub struct DataDirArgs {
    /// Directory holding the sled database.
    #[arg(long, short = 'd', env = "TALLY_DATA_DIR", default_value = ".tally")]
    pub data_dir: PathBuf,
}

/// Arguments for the `init` subcommand.
#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub data: DataDirArgs,

    /// Market configuration file (JSON). Defaults apply when omitted.
    #[arg(long, short = 'c', env = "TALLY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Owner address. Overrides the configuration file.
    #[arg(long, env = "TALLY_OWNER")]
    pub owner: Option<Address>,

    /// Replace an existing deployment.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `balance` subcommand.
#[derive(Args, Debug)]
pub struct BalanceArgs {
    #[command(flatten)]
    pub data: DataDirArgs,

    /// Account to inspect.
    pub account: Address,
}

/// Arguments for the `holdings` subcommand.
#[derive(Args, Debug)]
pub struct HoldingsArgs {
    #[command(flatten)]
    pub data: DataDirArgs,

    /// Account to inspect.
    pub account: Address,

    /// First asset id of the range.
    #[arg(long, default_value_t = 0)]
    pub start: u64,

    /// Last asset id of the range, inclusive.
    #[arg(long, default_value_t = 9)]
    pub end: u64,
}

/// Arguments for the `quote` subcommand.
#[derive(Args, Debug)]
pub struct QuoteArgs {
    #[command(flatten)]
    pub data: DataDirArgs,

    /// Comma-separated asset ids.
    #[arg(long, value_delimiter = ',', required = true)]
    pub ids: Vec<u64>,

    /// Token the trade is paid in.
    #[arg(long, value_enum, default_value_t = PaymentArg::Coin)]
    pub payment: PaymentArg,
}

/// Arguments for the `trade` subcommand.
#[derive(Args, Debug)]
pub struct TradeArgs {
    #[command(flatten)]
    pub data: DataDirArgs,

    /// Buy or sell.
    #[arg(value_enum)]
    pub side: SideArg,

    /// Comma-separated asset ids.
    #[arg(long, value_delimiter = ',', required = true)]
    pub ids: Vec<u64>,

    /// Comma-separated amounts in base units, one per asset id.
    #[arg(long, value_delimiter = ',', required = true)]
    pub amounts: Vec<U256>,

    /// Token the trade is paid in.
    #[arg(long, value_enum, default_value_t = PaymentArg::Coin)]
    pub payment: PaymentArg,

    /// Hex secret key of the trader. Defaults to the owner key written by
    /// `init`.
    #[arg(long, env = "TALLY_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Approve the engine for this many base units of the payment token
    /// and request the trade in the same step.
    #[arg(long)]
    pub approve: Option<U256>,
}

/// Arguments for the `relay` subcommand.
#[derive(Args, Debug)]
pub struct RelayArgs {
    #[command(flatten)]
    pub data: DataDirArgs,

    /// Token the call is addressed to.
    #[arg(long, value_enum)]
    pub token: PaymentArg,

    /// Account submitting the call; receives the gas reimbursement.
    #[arg(long)]
    pub relayer: Address,

    /// Account claimed to have signed the call.
    #[arg(long)]
    pub signer: Address,

    /// Hex-encoded call data, selector first.
    #[arg(long)]
    pub call_data: String,
}

/// Arguments for the `resolve` subcommand.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub data: DataDirArgs,

    /// Query id returned when the trade was requested.
    #[arg(long)]
    pub query: B256,

    /// Price payload as returned by the feed.
    #[arg(long)]
    pub payload: String,

    /// Hex-encoded oracle proof.
    #[arg(long, default_value = "")]
    pub proof: String,
}

/// Payment token as accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentArg {
    Coin,
    Cash,
}

impl From<PaymentArg> for PaymentToken {
    fn from(arg: PaymentArg) -> Self {
        match arg {
            PaymentArg::Coin => PaymentToken::Coin,
            PaymentArg::Cash => PaymentToken::Cash,
        }
    }
}

/// Trade direction as accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideArg {
    Buy,
    Sell,
}

impl From<SideArg> for TradeSide {
    fn from(arg: SideArg) -> Self {
        match arg {
            SideArg::Buy => TradeSide::Buy,
            SideArg::Sell => TradeSide::Sell,
        }
    }
}

/// Log format as accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Json,
}
