//! CLI commands for the escrow wallet
//!
//! Offline tooling over the escrow engine: key generation, script creation
//! and inspection, payout previews, signing, and pending-record listing.

use crate::core::{Address, TransactionInput, TransactionOutput};
use crate::crypto::{public_key_from_hex, ExtendedKey};
use crate::escrow::{self, aggregate, create_signature, RedeemScript};
use crate::rpc::StaticRegistry;
use crate::storage::{JsonFileStore, PendingTxnStore, WatchedScriptIndex};
use crate::wallet::{KeyFile, WalletConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Parse `<public key hex>:<chain code hex>`
pub fn parse_extended_key(s: &str) -> CliResult<ExtendedKey> {
    let (key_hex, chain_hex) = s
        .split_once(':')
        .ok_or("extended key must be <public key>:<chain code>")?;
    let public_key = public_key_from_hex(key_hex)?;
    let chain_code = hex::decode(chain_hex.trim_start_matches("0x"))?;
    Ok(ExtendedKey::from_parts(
        &public_key.serialize(),
        &chain_code,
        false,
    )?)
}

/// Parse `<address>=<value>`
pub fn parse_output(s: &str) -> CliResult<TransactionOutput> {
    let (address, value) = s
        .split_once('=')
        .ok_or("output must be <address>=<value>")?;
    Ok(TransactionOutput::new(
        Address::from_hex(address)?,
        value.parse()?,
    ))
}

fn funding_inputs(values: &[u64]) -> Vec<TransactionInput> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| TransactionInput::new("cli", i as u32, *value))
        .collect()
}

/// Generate and save a new key file
pub fn cmd_keygen(output: &Path, label: Option<&str>) -> CliResult<()> {
    let key = KeyFile::generate(label);
    key.save(output)?;
    let extended = key.extended_public_key()?;

    println!("🔐 New key created!");
    println!("   📍 Address: {}", key.address());
    println!(
        "   🔑 Extended public key: {}:{}",
        key.key_pair().public_key_hex(),
        hex::encode(extended.chain_code())
    );
    if let Some(l) = &key.label {
        println!("   🏷️  Label: {}", l);
    }
    println!("\n   ⚠️  The private key is stored in {:?}. Keep it safe!", output);

    Ok(())
}

/// Options for `script create`
pub struct ScriptCreateArgs<'a> {
    pub buyer: &'a str,
    pub seller: &'a str,
    pub moderator: Option<&'a str>,
    pub threshold: usize,
    pub timeout_hours: u64,
    pub contract: &'a str,
}

/// Create an escrow script and add it to the watched scripts in the data dir
pub async fn cmd_script_create(config: &WalletConfig, args: &ScriptCreateArgs<'_>) -> CliResult<()> {
    let mut keys = vec![
        parse_extended_key(args.buyer)?,
        parse_extended_key(args.seller)?,
    ];
    if let Some(moderator) = args.moderator {
        keys.push(parse_extended_key(moderator)?);
    }
    // The buyer may reclaim alone once the timeout passes
    let timeout_key = keys[0].clone();

    let store = Arc::new(JsonFileStore::new(&config.data_dir)?);
    let index = WatchedScriptIndex::load(store)?;
    let registry = StaticRegistry::new(Address::from_hex(args.contract)?);

    let (address, serialized) = escrow::generate(
        &keys,
        args.threshold,
        Duration::from_secs(args.timeout_hours.saturating_mul(3600)),
        Some(&timeout_key),
        &registry,
        &config.escrow_contract_kind,
        &index,
    )
    .await?;

    println!("📜 Escrow script created!");
    println!("   📍 Escrow address: {}", address);
    println!("   📦 Script: {}", hex::encode(&serialized));
    Ok(())
}

/// Decode and print a serialized script
pub fn cmd_script_inspect(script_hex: &str) -> CliResult<()> {
    let script = RedeemScript::from_hex(script_hex)?;
    let (_, hash_hex) = script.content_hash();

    println!("📜 Escrow script ({})", script.description());
    println!("   ├─ Unique id: 0x{}", hex::encode(script.unique_id));
    println!("   ├─ Buyer: {}", script.buyer);
    println!("   ├─ Seller: {}", script.seller);
    if !script.moderator.is_zero() {
        println!("   ├─ Moderator: {}", script.moderator);
    }
    if script.timeout_hours > 0 {
        println!("   ├─ Timeout: {} hours", script.timeout_hours);
    }
    println!("   ├─ Contract: {}", script.multisig_address);
    println!("   ├─ Script hash: {}", hash_hex);
    println!("   └─ Escrow address: {}", script.escrow_address());
    Ok(())
}

/// Preview the payout table for a release
pub fn cmd_payout(script_hex: &str, inputs: &[u64], outputs: &[String]) -> CliResult<()> {
    let script = RedeemScript::from_hex(script_hex)?;
    let outputs = outputs
        .iter()
        .map(|o| parse_output(o))
        .collect::<CliResult<Vec<_>>>()?;
    let payouts = aggregate(&funding_inputs(inputs), &outputs, &script.moderator)?;

    println!("💸 Payouts ({} total)", payouts.total());
    for line in payouts.lines() {
        println!("   └─ {} = {}", line.destination, line.value);
    }
    Ok(())
}

/// Sign a release with a key file and print the partial signature as JSON
pub fn cmd_sign(
    key_path: &Path,
    script_hex: &str,
    inputs: &[u64],
    outputs: &[String],
) -> CliResult<()> {
    let key = KeyFile::load(key_path)?;
    let script = RedeemScript::from_hex(script_hex)?;
    let outputs = outputs
        .iter()
        .map(|o| parse_output(o))
        .collect::<CliResult<Vec<_>>>()?;

    let signature = create_signature(
        &funding_inputs(inputs),
        &outputs,
        key.key_pair(),
        &script.serialize(),
    )?;
    println!("{}", serde_json::to_string_pretty(&signature)?);
    Ok(())
}

/// List pending escrow transactions in the data dir
pub fn cmd_pending_list(config: &WalletConfig) -> CliResult<()> {
    let store = JsonFileStore::new(&config.data_dir)?;
    let records = store.pending()?;

    if records.is_empty() {
        println!("📭 No pending transactions");
        return Ok(());
    }

    println!("⏳ Pending transactions:");
    for record in &records {
        println!(
            "   {} order {} - {} to {} (nonce {}, since {})",
            record.tx_id,
            record.order_id,
            record.amount,
            record.to,
            record.nonce,
            record.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
