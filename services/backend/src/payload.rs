//! Canonical event payloads.
//!
//! `payload_json` is the exact byte string that gets signed and stored,
//! so builders here are the only place payloads are rendered: recognized
//! keys per kind, big integers as decimal strings, timestamps ISO-8601
//! UTC with millisecond precision, hex lower-case with an 0x prefix.
//! Key order is the serializer's stable (sorted) order.

use alloy_primitives::U256;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::tables::TableRow;

pub fn iso_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `{id, name}` reference used by seating and hand events.
fn table_ref(table: &TableRow) -> Value {
    json!({ "id": table.id, "name": table.name })
}

/// Full table object for admin events, amounts as decimal strings.
fn table_full(table: &TableRow) -> Value {
    json!({
        "id": table.id,
        "name": table.name,
        "minimumBuyIn": table.minimum_buy_in.to_string(),
        "maximumBuyIn": table.maximum_buy_in.to_string(),
        "smallBlind": table.small_blind.to_string(),
        "bigBlind": table.big_blind.to_string(),
        "perHandRake": table.per_hand_rake,
        "maxSeatCount": table.max_seat_count,
        "isActive": table.is_active,
        "actionTimeoutSeconds": table.action_timeout_seconds,
        "handStartDelaySeconds": table.hand_start_delay_seconds,
    })
}

pub fn deposit(
    wallet: &str,
    amount_gwei: U256,
    tx_hash: &str,
    block_number: u64,
    block_ts: DateTime<Utc>,
) -> String {
    json!({
        "walletAddress": wallet,
        "amountGwei": amount_gwei.to_string(),
        "txHash": tx_hash,
        "blockNumber": block_number,
        "blockTimestamp": iso_millis(block_ts),
    })
    .to_string()
}

#[allow(clippy::too_many_arguments)]
pub fn withdrawal_request(
    wallet: &str,
    to: &str,
    amount_gwei: U256,
    amount_wei: U256,
    nonce: U256,
    expiry_unix: u64,
    digest: &str,
) -> String {
    json!({
        "walletAddress": wallet,
        "toAddress": to,
        "amountGwei": amount_gwei.to_string(),
        "amountWei": amount_wei.to_string(),
        "nonce": nonce.to_string(),
        "expiry": expiry_unix,
        "digest": digest,
    })
    .to_string()
}

pub fn withdrawal_executed(
    wallet: &str,
    amount_gwei: U256,
    nonce: U256,
    tx_hash: &str,
    block_number: u64,
    block_ts: DateTime<Utc>,
) -> String {
    json!({
        "walletAddress": wallet,
        "amountGwei": amount_gwei.to_string(),
        "nonce": nonce.to_string(),
        "txHash": tx_hash,
        "blockNumber": block_number,
        "blockTimestamp": iso_millis(block_ts),
    })
    .to_string()
}

/// Shared shape for create_table / table_activated / table_deactivated.
pub fn table_admin(kind: &str, admin: &str, table: &TableRow, ts: DateTime<Utc>) -> String {
    json!({
        "kind": kind,
        "admin": admin,
        "table": table_full(table),
        "timestamp": iso_millis(ts),
    })
    .to_string()
}

#[allow(clippy::too_many_arguments)]
pub fn join_table(
    player: &str,
    table: &TableRow,
    seat_number: i32,
    buy_in_gwei: U256,
    twitter_handle: Option<&str>,
    twitter_avatar_url: Option<&str>,
    is_rebuy: bool,
) -> String {
    let mut v = json!({
        "kind": "join_table",
        "player": player,
        "table": table_ref(table),
        "seatNumber": seat_number,
        "buyInAmountGwei": buy_in_gwei.to_string(),
    });
    let obj = v.as_object_mut().unwrap();
    if let Some(handle) = twitter_handle {
        obj.insert("twitterHandle".into(), json!(handle));
    }
    if let Some(url) = twitter_avatar_url {
        obj.insert("twitterAvatarUrl".into(), json!(url));
    }
    if is_rebuy {
        obj.insert("isRebuy".into(), json!(true));
    }
    v.to_string()
}

pub fn leave_table(
    player: &str,
    table: &TableRow,
    seat_number: i32,
    final_balance_gwei: U256,
    twitter_handle: Option<&str>,
    twitter_avatar_url: Option<&str>,
) -> String {
    let mut v = json!({
        "kind": "leave_table",
        "player": player,
        "table": table_ref(table),
        "seatNumber": seat_number,
        "finalBalanceGwei": final_balance_gwei.to_string(),
    });
    let obj = v.as_object_mut().unwrap();
    if let Some(handle) = twitter_handle {
        obj.insert("twitterHandle".into(), json!(handle));
    }
    if let Some(url) = twitter_avatar_url {
        obj.insert("twitterAvatarUrl".into(), json!(url));
    }
    v.to_string()
}

#[allow(clippy::too_many_arguments)]
pub fn hand_start(
    table: &TableRow,
    hand_id: i64,
    dealer_position: i32,
    small_blind_seat: i32,
    big_blind_seat: i32,
    shuffle_seed_hash: &str,
    players: &[(i32, String)],
) -> String {
    let players: Vec<Value> = players
        .iter()
        .map(|(seat, wallet)| json!({ "seatNumber": seat, "walletAddress": wallet }))
        .collect();
    json!({
        "kind": "hand_start",
        "table": table_ref(table),
        "hand": {
            "id": hand_id,
            "dealerPosition": dealer_position,
            "smallBlindSeat": small_blind_seat,
            "bigBlindSeat": big_blind_seat,
            "shuffleSeedHash": shuffle_seed_hash,
        },
        "players": players,
    })
    .to_string()
}

pub fn community_cards(
    table: &TableRow,
    hand_id: i64,
    round: &str,
    new_cards: &[String],
    all_cards: &[String],
) -> String {
    json!({
        "kind": "community_cards",
        "table": table_ref(table),
        "hand": { "id": hand_id, "round": round },
        "communityCards": new_cards,
        "allCommunityCards": all_cards,
    })
    .to_string()
}

#[allow(clippy::too_many_arguments)]
pub fn bet(
    table: &TableRow,
    hand_id: i64,
    round: &str,
    status: &str,
    action_type: &str,
    seat_number: i32,
    wallet: &str,
    amount: Option<U256>,
    is_all_in: bool,
    ts: DateTime<Utc>,
) -> String {
    let mut action = json!({
        "type": action_type,
        "seatNumber": seat_number,
        "walletAddress": wallet,
        "amount": amount.map(|a| a.to_string()),
        "timestamp": iso_millis(ts),
    });
    if is_all_in {
        action
            .as_object_mut()
            .unwrap()
            .insert("isAllIn".into(), json!(true));
    }
    json!({
        "kind": "bet",
        "table": table_ref(table),
        "hand": { "id": hand_id, "round": round, "status": status },
        "action": action,
    })
    .to_string()
}

pub struct HandEndPot {
    pub pot_number: i32,
    /// After rake.
    pub amount: U256,
    pub rake_amount: U256,
    pub winner_seat_numbers: Vec<i32>,
    /// (seat, wallet, amount won)
    pub winners: Vec<(i32, String, U256)>,
}

pub struct HandEndPlayer {
    pub seat_number: i32,
    pub wallet_address: String,
    pub status: String,
    /// Revealed only for non-folded players.
    pub hole_cards: Option<Vec<String>>,
    pub hand_rank: Option<String>,
}

pub struct HandEndAction {
    pub seat_number: i32,
    pub round: String,
    pub action: String,
    pub amount: Option<U256>,
    pub timestamp: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
pub fn hand_end(
    table: &TableRow,
    hand_id: i64,
    winner_seat_numbers: &[i32],
    total_pot_amount: U256,
    shuffle_seed: &str,
    deck: &[String],
    community_cards: &[String],
    completed_at: DateTime<Utc>,
    rake_bps: i32,
    pots: &[HandEndPot],
    players: &[HandEndPlayer],
    actions: &[HandEndAction],
) -> String {
    let pots: Vec<Value> = pots
        .iter()
        .map(|p| {
            let winners: Vec<Value> = p
                .winners
                .iter()
                .map(|(seat, wallet, amount)| {
                    json!({
                        "seatNumber": seat,
                        "walletAddress": wallet,
                        "amountWon": amount.to_string(),
                    })
                })
                .collect();
            json!({
                "potNumber": p.pot_number,
                "amount": p.amount.to_string(),
                "rakeAmount": p.rake_amount.to_string(),
                "winnerSeatNumbers": p.winner_seat_numbers,
                "winners": winners,
            })
        })
        .collect();

    let players: Vec<Value> = players
        .iter()
        .map(|p| {
            json!({
                "seatNumber": p.seat_number,
                "walletAddress": p.wallet_address,
                "status": p.status,
                "holeCards": p.hole_cards,
                "handRank": p.hand_rank,
            })
        })
        .collect();

    let actions: Vec<Value> = actions
        .iter()
        .map(|a| {
            json!({
                "seatNumber": a.seat_number,
                "round": a.round,
                "action": a.action,
                "amount": a.amount.map(|x| x.to_string()),
                "timestamp": iso_millis(a.timestamp),
            })
        })
        .collect();

    json!({
        "kind": "hand_end",
        "table": table_ref(table),
        "hand": {
            "id": hand_id,
            "winnerSeatNumbers": winner_seat_numbers,
            "totalPotAmount": total_pot_amount.to_string(),
            "shuffleSeed": shuffle_seed,
            "deck": deck,
            "completedAt": iso_millis(completed_at),
        },
        "rakeBps": rake_bps,
        "communityCards": community_cards,
        "players": players,
        "pots": pots,
        "actions": actions,
    })
    .to_string()
}

pub fn leaderboard_reset(admin: &str, ts: DateTime<Utc>) -> String {
    json!({
        "kind": "leaderboard_reset",
        "admin": admin,
        "timestamp": iso_millis(ts),
    })
    .to_string()
}

/// Fan-out routing key, parsed back out of the canonical payload.
pub fn extract_table_id(payload_json: &str) -> Option<i64> {
    let v: Value = serde_json::from_str(payload_json).ok()?;
    v.get("table")?.get("id")?.as_i64()
}

pub fn extract_hand_id(payload_json: &str) -> Option<i64> {
    let v: Value = serde_json::from_str(payload_json).ok()?;
    v.get("hand")?.get("id")?.as_i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableRow {
        TableRow {
            id: 7,
            name: "Main".to_string(),
            minimum_buy_in: U256::from(10_000_000u64),
            maximum_buy_in: U256::from(100_000_000u64),
            small_blind: U256::from(1_000_000u64),
            big_blind: U256::from(2_000_000u64),
            per_hand_rake: 0,
            max_seat_count: 8,
            is_active: true,
            action_timeout_seconds: 30,
            hand_start_delay_seconds: 5,
        }
    }

    #[test]
    fn test_payloads_are_byte_stable() {
        let t = table();
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let a = deposit("0xabc", U256::from(5u64), "0xd1", 12, ts);
        let b = deposit("0xabc", U256::from(5u64), "0xd1", 12, ts);
        assert_eq!(a, b);

        let j = join_table("0xabc", &t, 0, U256::from(50_000_000u64), None, None, false);
        assert!(!j.contains("twitterHandle"));
        assert!(!j.contains("isRebuy"));

        let r = join_table(
            "0xabc",
            &t,
            0,
            U256::from(50_000_000u64),
            Some("ace"),
            None,
            true,
        );
        assert!(r.contains(r#""isRebuy":true"#));
    }

    #[test]
    fn test_amounts_are_decimal_strings() {
        let t = table();
        let ts = DateTime::from_timestamp(1_700_000_000, 123_000_000).unwrap();
        let p = deposit("0xabc", U256::from(100_000_000u64), "0xd1", 12, ts);
        assert!(p.contains(r#""amountGwei":"100000000""#));
        assert!(p.contains(".123Z"));

        let admin = table_admin("create_table", "0xadmin", &t, ts);
        assert!(admin.contains(r#""smallBlind":"1000000""#));
    }

    #[test]
    fn test_extractors() {
        let t = table();
        let p = hand_start(&t, 42, 0, 0, 1, "hash", &[(0, "0xa".into()), (1, "0xb".into())]);
        assert_eq!(extract_table_id(&p), Some(7));
        assert_eq!(extract_hand_id(&p), Some(42));

        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let d = deposit("0xabc", U256::from(5u64), "0xd1", 12, ts);
        assert_eq!(extract_table_id(&d), None);
        assert_eq!(extract_hand_id(&d), None);
    }
}
