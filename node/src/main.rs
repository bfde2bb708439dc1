// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # tally Node
//!
//! Entry point for the `tally-node` binary. Parses CLI arguments,
//! initializes logging, and runs one subcommand against the market stored
//! in the data directory.
//!
//! - `init`     deploy a market and persist it
//! - `status`   print the deployment manifest and engine settings
//! - `balance`  token balances, nonces and engine allowance of an account
//! - `holdings` an account's positions over a range of asset ids
//! - `quote`    the price-feed URL for a prospective trade
//! - `pending`  trades waiting for a price callback
//! - `trade`    request a buy or sell as a key holder
//! - `relay`    submit raw pre-signed call data to a token
//! - `resolve`  deliver a price payload as the oracle
//! - `version`  print build version information
//!
//! Reports go to stdout as JSON; logs go to stderr.

mod cli;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;

use cli::{Commands, TallyNodeCli};

fn main() -> Result<()> {
    let cli = TallyNodeCli::parse();

    logging::init_logging(
        "tally_node=info,tally_contracts=info,tally_protocol=warn",
        cli.log_format.into(),
    );

    let report = match &cli.command {
        Commands::Init(args) => commands::init(args)?,
        Commands::Status(args) => commands::status(args)?,
        Commands::Balance(args) => commands::balance(args)?,
        Commands::Holdings(args) => commands::holdings(args)?,
        Commands::Quote(args) => commands::quote(args)?,
        Commands::Pending(args) => commands::pending(args)?,
        Commands::Trade(args) => commands::trade(args)?,
        Commands::Relay(args) => commands::relay(args)?,
        Commands::Resolve(args) => commands::resolve(args)?,
        Commands::Version => {
            print_version();
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("tally-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", tally_protocol::config::PROTOCOL_VERSION);
    println!("signing    {}", tally_protocol::config::SIGNING_ALGORITHM);
}
