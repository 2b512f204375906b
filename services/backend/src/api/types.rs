//! Request and response shapes. Every 256-bit amount crosses the wire
//! as a decimal string; wallet addresses go out in checksum form.

use serde::{Deserialize, Serialize};

use crate::payload::iso_millis;
use crate::tables::{SessionRow, TableSummary};
use crate::wallet;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTableRequest {
    pub name: String,
    pub minimum_buy_in: String,
    pub maximum_buy_in: String,
    pub small_blind: String,
    pub big_blind: String,
    #[serde(default)]
    pub per_hand_rake: i32,
    pub max_seat_count: i32,
    pub action_timeout_seconds: Option<i32>,
    pub hand_start_delay_seconds: Option<i32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStatusRequest {
    pub is_active: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub id: i64,
    pub name: String,
    pub minimum_buy_in: String,
    pub maximum_buy_in: String,
    pub small_blind: String,
    pub big_blind: String,
    pub per_hand_rake: i32,
    pub max_seat_count: i32,
    pub is_active: bool,
    pub action_timeout_seconds: i32,
    pub hand_start_delay_seconds: i32,
    pub active_players: i64,
    pub has_open_hand: bool,
    pub next_hand_starts_at: Option<String>,
}

impl From<&TableSummary> for TableInfo {
    fn from(s: &TableSummary) -> Self {
        TableInfo {
            id: s.table.id,
            name: s.table.name.clone(),
            minimum_buy_in: s.table.minimum_buy_in.to_string(),
            maximum_buy_in: s.table.maximum_buy_in.to_string(),
            small_blind: s.table.small_blind.to_string(),
            big_blind: s.table.big_blind.to_string(),
            per_hand_rake: s.table.per_hand_rake,
            max_seat_count: s.table.max_seat_count,
            is_active: s.table.is_active,
            action_timeout_seconds: s.table.action_timeout_seconds,
            hand_start_delay_seconds: s.table.hand_start_delay_seconds,
            active_players: s.active_players,
            has_open_hand: s.has_open_hand,
            next_hand_starts_at: s.next_hand_starts_at.map(iso_millis),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub seat_number: i32,
    pub wallet_address: String,
    pub table_balance_gwei: String,
    pub twitter_handle: Option<String>,
    pub twitter_avatar_url: Option<String>,
    pub joined_at: String,
}

impl From<&SessionRow> for SessionInfo {
    fn from(s: &SessionRow) -> Self {
        SessionInfo {
            seat_number: s.seat_number,
            wallet_address: wallet::checksum(&s.wallet_address),
            table_balance_gwei: s.table_balance_gwei.to_string(),
            twitter_handle: s.twitter_handle.clone(),
            twitter_avatar_url: s.twitter_avatar_url.clone(),
            joined_at: iso_millis(s.joined_at),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTableRequest {
    pub table_id: i64,
    pub seat_number: i32,
    pub buy_in_gwei: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandUpRequest {
    pub table_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuyRequest {
    pub table_id: i64,
    pub amount_gwei: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub table_id: i64,
    /// FOLD | CHECK | CALL | BET | RAISE | ALL_IN
    pub action: String,
    pub amount_gwei: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub status: String,
    pub action: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignWithdrawalRequest {
    pub to_address: String,
    pub amount_gwei: String,
    pub expiry_seconds: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignWithdrawalResponse {
    pub nonce: String,
    /// Unix seconds, as the contract consumes it.
    pub expiry: u64,
    pub digest: String,
    pub v: u8,
    pub r: String,
    pub s: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWithdrawalInfo {
    pub nonce: Option<String>,
    pub expiry: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowBalanceResponse {
    pub wallet_address: String,
    pub balance_gwei: String,
    pub pending_withdrawal: Option<PendingWithdrawalInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessRequest {
    pub from_block: u64,
    pub to_block: Option<u64>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableIdQuery {
    pub table_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAddressQuery {
    pub wallet_address: String,
}

#[derive(Deserialize)]
pub struct AddressQuery {
    pub address: String,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
