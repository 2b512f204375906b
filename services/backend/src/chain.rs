//! Chain bridge: the escrow contract bindings, the Deposited /
//! WithdrawalExecuted subscription, and on-demand block-range replay.
//!
//! Ingestion failures are logged and the subscription keeps running;
//! per-wallet ordering is whatever the chain provides. Replays are
//! idempotent because the ledger checks each txHash against the log.

use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{BlockNumberOrTag, BlockTransactionsKind, Filter, Log};
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy::transports::Transport;
use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;

use crate::error::ApiError;
use crate::escrow;
use crate::AppState;

sol! {
    #[sol(rpc)]
    interface ICloutCards {
        function computeWithdrawDigest(address from, address to, uint256 amountWei, uint256 expiry)
            external view returns (bytes32 digest, uint256 nonce);

        event Deposited(address indexed player, address indexed depositor, uint256 amount);
        event WithdrawalExecuted(address indexed player, address indexed to, uint256 amount, uint256 nonce);
    }
}

/// Ask the contract which digest and nonce it requires for this
/// withdrawal next.
pub async fn compute_withdraw_digest(
    state: &AppState,
    from: Address,
    to: Address,
    amount_wei: U256,
    expiry_unix: u64,
) -> Result<(B256, U256), ApiError> {
    let contract_address = state
        .config
        .contract_address
        .ok_or_else(|| ApiError::upstream("escrow contract not configured"))?;
    let url = state
        .config
        .rpc_url
        .parse()
        .map_err(|_| ApiError::internal("invalid RPC_URL"))?;
    let provider = ProviderBuilder::new().on_http(url);
    let contract = ICloutCards::new(contract_address, provider);

    let out = contract
        .computeWithdrawDigest(from, to, amount_wei, U256::from(expiry_unix))
        .call()
        .await
        .map_err(|e| ApiError::upstream(format!("computeWithdrawDigest failed: {}", e)))?;
    Ok((out.digest, out.nonce))
}

/// Current contract balance, floor-converted to gwei.
pub async fn contract_balance_gwei(state: &AppState) -> Result<U256, ApiError> {
    let contract_address = state
        .config
        .contract_address
        .ok_or_else(|| ApiError::upstream("escrow contract not configured"))?;
    let url = state
        .config
        .rpc_url
        .parse()
        .map_err(|_| ApiError::internal("invalid RPC_URL"))?;
    let provider = ProviderBuilder::new().on_http(url);
    let wei = provider
        .get_balance(contract_address)
        .await
        .map_err(|e| ApiError::upstream(format!("get_balance failed: {}", e)))?;
    Ok(escrow::wei_to_gwei(wei))
}

/// Long-lived subscription task; reconnects with a backoff on failure.
pub fn spawn_listener(state: AppState) {
    let Some(contract_address) = state.config.contract_address else {
        tracing::warn!("CLOUTCARDS_CONTRACT_ADDRESS not set — chain listener disabled");
        return;
    };

    tokio::spawn(async move {
        loop {
            if let Err(e) = run_subscription(&state, contract_address).await {
                tracing::error!("chain subscription lost: {:#}; reconnecting", e);
            }
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        }
    });
}

fn escrow_filter(contract_address: Address) -> Filter {
    Filter::new().address(contract_address).event_signature(vec![
        ICloutCards::Deposited::SIGNATURE_HASH,
        ICloutCards::WithdrawalExecuted::SIGNATURE_HASH,
    ])
}

async fn run_subscription(state: &AppState, contract_address: Address) -> anyhow::Result<()> {
    let ws = WsConnect::new(state.config.rpc_ws_url.clone());
    let provider = ProviderBuilder::new().on_ws(ws).await?;
    let sub = provider.subscribe_logs(&escrow_filter(contract_address)).await?;
    tracing::info!("subscribed to escrow events at {}", contract_address);

    let mut stream = sub.into_stream();
    while let Some(log) = stream.next().await {
        // Never let one bad event take the subscription down
        if let Err(e) = ingest_log(state, &provider, &log).await {
            tracing::error!("chain event ingestion failed: {:#}", e);
        }
    }
    anyhow::bail!("log subscription ended")
}

async fn block_timestamp<T: Transport + Clone, P: Provider<T>>(
    provider: &P,
    number: u64,
) -> anyhow::Result<DateTime<Utc>> {
    let block = provider
        .get_block_by_number(
            BlockNumberOrTag::Number(number),
            BlockTransactionsKind::Hashes,
        )
        .await?
        .ok_or_else(|| anyhow::anyhow!("block {} not found", number))?;
    DateTime::from_timestamp(block.header.timestamp as i64, 0)
        .ok_or_else(|| anyhow::anyhow!("block {} timestamp out of range", number))
}

async fn ingest_log<T: Transport + Clone, P: Provider<T>>(
    state: &AppState,
    provider: &P,
    log: &Log,
) -> anyhow::Result<()> {
    let block_number = log
        .block_number
        .ok_or_else(|| anyhow::anyhow!("log missing block number"))?;
    let tx_hash = log
        .transaction_hash
        .map(|h| format!("{:#x}", h))
        .ok_or_else(|| anyhow::anyhow!("log missing transaction hash"))?;
    let block_ts = block_timestamp(provider, block_number).await?;

    apply_escrow_log(state, log, &tx_hash, block_number, block_ts)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(())
}

/// Decode and apply one escrow log inside its own transaction. Returns
/// the event kind applied, or None when the txHash was already seen.
async fn apply_escrow_log(
    state: &AppState,
    log: &Log,
    tx_hash: &str,
    block_number: u64,
    block_ts: DateTime<Utc>,
) -> Result<Option<&'static str>, ApiError> {
    let mut tx = state.pool.begin().await?;

    let applied = match log.topic0() {
        Some(&ICloutCards::Deposited::SIGNATURE_HASH) => {
            let decoded = ICloutCards::Deposited::decode_log(&log.inner, true)
                .map_err(|e| ApiError::upstream(format!("undecodable Deposited log: {}", e)))?;
            let wallet = format!("{:#x}", decoded.data.player);
            let gwei = escrow::wei_to_gwei(decoded.data.amount);
            escrow::credit_deposit(
                &mut tx,
                &state.signer,
                state.config.tee_version,
                &wallet,
                gwei,
                tx_hash,
                block_number,
                block_ts,
            )
            .await?
            .map(|_| "deposit")
        }
        Some(&ICloutCards::WithdrawalExecuted::SIGNATURE_HASH) => {
            let decoded = ICloutCards::WithdrawalExecuted::decode_log(&log.inner, true).map_err(
                |e| ApiError::upstream(format!("undecodable WithdrawalExecuted log: {}", e)),
            )?;
            let wallet = format!("{:#x}", decoded.data.player);
            let gwei = escrow::wei_to_gwei(decoded.data.amount);
            escrow::apply_withdrawal_executed(
                &mut tx,
                &state.signer,
                state.config.tee_version,
                &wallet,
                gwei,
                decoded.data.nonce,
                tx_hash,
                block_number,
                block_ts,
            )
            .await?
            .map(|_| "withdrawal_executed")
        }
        _ => None,
    };

    tx.commit().await?;
    Ok(applied)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessEntry {
    pub tx_hash: String,
    pub kind: String,
    /// processed | skipped | error
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessSummary {
    pub from_block: u64,
    pub to_block: Option<u64>,
    pub dry_run: bool,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub events: Vec<ReprocessEntry>,
}

/// Replay a block range through the same ingestion path. Per-event
/// failures land in the summary instead of failing the batch.
pub async fn reprocess_events(
    state: &AppState,
    from_block: u64,
    to_block: Option<u64>,
    dry_run: bool,
) -> Result<ReprocessSummary, ApiError> {
    let contract_address = state
        .config
        .contract_address
        .ok_or_else(|| ApiError::upstream("escrow contract not configured"))?;
    let url = state
        .config
        .rpc_url
        .parse()
        .map_err(|_| ApiError::internal("invalid RPC_URL"))?;
    let provider = ProviderBuilder::new().on_http(url);

    let mut filter = escrow_filter(contract_address).from_block(from_block);
    filter = match to_block {
        Some(n) => filter.to_block(n),
        None => filter.to_block(BlockNumberOrTag::Latest),
    };

    let logs = provider
        .get_logs(&filter)
        .await
        .map_err(|e| ApiError::upstream(format!("get_logs failed: {}", e)))?;

    let mut summary = ReprocessSummary {
        from_block,
        to_block,
        dry_run,
        processed: 0,
        skipped: 0,
        errors: 0,
        events: Vec::with_capacity(logs.len()),
    };

    for log in &logs {
        let kind = match log.topic0() {
            Some(&ICloutCards::Deposited::SIGNATURE_HASH) => "deposit",
            Some(&ICloutCards::WithdrawalExecuted::SIGNATURE_HASH) => "withdrawal_executed",
            _ => continue,
        };
        let tx_hash = log
            .transaction_hash
            .map(|h| format!("{:#x}", h))
            .unwrap_or_default();

        let mut entry = ReprocessEntry {
            tx_hash: tx_hash.clone(),
            kind: kind.to_string(),
            status: "skipped".to_string(),
            detail: None,
        };

        if dry_run {
            let mut conn = state.pool.acquire().await?;
            let seen = crate::events::tx_hash_seen(&mut conn, &tx_hash).await?;
            if !seen {
                entry.status = "processed".to_string();
                entry.detail = Some("would apply (dry run)".to_string());
                summary.processed += 1;
            } else {
                summary.skipped += 1;
            }
            summary.events.push(entry);
            continue;
        }

        let block_number = log.block_number.unwrap_or_default();
        let applied = async {
            let block_ts = block_timestamp(&provider, block_number)
                .await
                .map_err(|e| ApiError::upstream(format!("{:#}", e)))?;
            apply_escrow_log(state, log, &tx_hash, block_number, block_ts).await
        }
        .await;

        match applied {
            Ok(Some(_)) => {
                entry.status = "processed".to_string();
                summary.processed += 1;
            }
            Ok(None) => {
                summary.skipped += 1;
            }
            Err(e) => {
                entry.status = "error".to_string();
                entry.detail = Some(e.to_string());
                summary.errors += 1;
            }
        }
        summary.events.push(entry);
    }

    Ok(summary)
}
