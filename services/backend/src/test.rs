//! End-to-end flows against a real Postgres instance, driven through
//! the same transactional entry points the HTTP layer uses.

use std::sync::Arc;

use alloy_primitives::{B256, U256};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::escrow;
use crate::events::{self, EventKind};
use crate::game::state::{self, HandStatus};
use crate::game::{self, PlayerAction};
use crate::signer::EventSigner;
use crate::tables;
use crate::{payload, AppState};

const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";
const ADMIN: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

fn wallet(n: u8) -> String {
    format!("0x{}", hex::encode([n; 20]))
}

fn test_state(pool: PgPool) -> AppState {
    let config = AppConfig {
        database_url: String::new(),
        mnemonic: TEST_MNEMONIC.to_string(),
        chain_id: 31337,
        contract_address: None,
        rpc_url: "http://localhost:8545".to_string(),
        rpc_ws_url: "ws://localhost:8545".to_string(),
        admin_addresses: vec![ADMIN.to_string()],
        tee_version: 1,
        app_port: 0,
        cors_origin: None,
        environment: "test".to_string(),
    };
    let signer = EventSigner::from_mnemonic(TEST_MNEMONIC, config.chain_id).unwrap();
    let (notices, _) = broadcast::channel(64);
    AppState {
        pool,
        config: Arc::new(config),
        signer: Arc::new(signer),
        notices,
    }
}

async fn deposit(state: &AppState, wallet: &str, gwei: u64, tx_hash: &str) {
    let mut tx = state.pool.begin().await.unwrap();
    escrow::credit_deposit(
        &mut tx,
        &state.signer,
        1,
        wallet,
        U256::from(gwei),
        tx_hash,
        1,
        Utc::now(),
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
}

async fn make_table(state: &AppState, sb: u64, bb: u64, rake_bps: i32) -> tables::TableRow {
    tables::create(
        state,
        ADMIN,
        tables::CreateTableInput {
            name: "test".to_string(),
            minimum_buy_in: U256::from(10_000_000u64),
            maximum_buy_in: U256::from(100_000_000u64),
            small_blind: U256::from(sb),
            big_blind: U256::from(bb),
            per_hand_rake: rake_bps,
            max_seat_count: 8,
            action_timeout_seconds: 30,
            // Keep follow-up hands from auto-starting mid-test
            hand_start_delay_seconds: 3600,
        },
    )
    .await
    .unwrap()
}

/// Seat a wallet directly, bypassing the join flow, so multi-player
/// hands can be arranged before any hand fires.
async fn seat_player(state: &AppState, table_id: i64, wallet: &str, seat: i32, balance: u64) {
    sqlx::query(
        "INSERT INTO table_seat_sessions \
           (table_id, wallet_address, seat_number, table_balance_gwei, is_active) \
         VALUES ($1, $2, $3, $4::numeric, TRUE)",
    )
    .bind(table_id)
    .bind(wallet)
    .bind(seat)
    .bind(balance.to_string())
    .execute(&state.pool)
    .await
    .unwrap();
}

async fn session_balance(state: &AppState, table_id: i64, wallet: &str) -> U256 {
    tables::session_for_wallet(&state.pool, table_id, wallet)
        .await
        .unwrap()
        .map(|s| s.table_balance_gwei)
        .unwrap_or(U256::ZERO)
}

async fn escrow_balance(state: &AppState, wallet: &str) -> U256 {
    escrow::get(&state.pool, wallet)
        .await
        .unwrap()
        .map(|a| a.balance_gwei)
        .unwrap_or(U256::ZERO)
}

async fn act(state: &AppState, table_id: i64, wallet: &str, action: PlayerAction) {
    game::apply_action(state, table_id, wallet, action)
        .await
        .unwrap()
}

async fn count_events(state: &AppState, kind: &str) -> i64 {
    sqlx::query_scalar("SELECT count(*) FROM events WHERE kind = $1")
        .bind(kind)
        .fetch_one(&state.pool)
        .await
        .unwrap()
}

#[sqlx::test]
async fn test_deposit_is_idempotent_by_tx_hash(pool: PgPool) {
    let state = test_state(pool);
    let a = wallet(0x11);

    deposit(&state, &a, 100_000_000, "0xd1").await;
    assert_eq!(escrow_balance(&state, &a).await, U256::from(100_000_000u64));

    // Replaying the same chain event must be a no-op
    let mut tx = state.pool.begin().await.unwrap();
    let replay = escrow::credit_deposit(
        &mut tx,
        &state.signer,
        1,
        &a,
        U256::from(100_000_000u64),
        "0xd1",
        1,
        Utc::now(),
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    assert!(replay.is_none());
    assert_eq!(escrow_balance(&state, &a).await, U256::from(100_000_000u64));
    assert_eq!(count_events(&state, "deposit").await, 1);
}

#[sqlx::test]
async fn test_event_log_is_append_only(pool: PgPool) {
    let state = test_state(pool);
    deposit(&state, &wallet(0x11), 1_000, "0xd1").await;

    let update = sqlx::query("UPDATE events SET kind = 'withdrawal_request'")
        .execute(&state.pool)
        .await;
    assert!(update.is_err());
    let delete = sqlx::query("DELETE FROM events")
        .execute(&state.pool)
        .await;
    assert!(delete.is_err());
}

#[sqlx::test]
async fn test_join_flow_starts_heads_up_hand(pool: PgPool) {
    let state = test_state(pool);
    let (a, b) = (wallet(0x11), wallet(0x22));
    deposit(&state, &a, 100_000_000, "0xd1").await;
    deposit(&state, &b, 100_000_000, "0xd2").await;
    let table = make_table(&state, 1_000_000, 2_000_000, 0).await;

    tables::join(
        &state,
        &a,
        Some("alice"),
        None,
        tables::JoinInput {
            table_id: table.id,
            seat_number: 0,
            buy_in_gwei: U256::from(50_000_000u64),
        },
    )
    .await
    .unwrap();
    assert_eq!(escrow_balance(&state, &a).await, U256::from(50_000_000u64));
    assert!(state::open_hand(&state.pool, table.id).await.unwrap().is_none());

    tables::join(
        &state,
        &b,
        None,
        None,
        tables::JoinInput {
            table_id: table.id,
            seat_number: 1,
            buy_in_gwei: U256::from(50_000_000u64),
        },
    )
    .await
    .unwrap();

    // Second join triggers the opportunistic hand start
    let hand = state::open_hand(&state.pool, table.id).await.unwrap().unwrap();
    assert_eq!(hand.status, HandStatus::PreFlop);
    // Heads-up: dealer posts the small blind and acts first
    assert_eq!(hand.dealer_position, 0);
    assert_eq!(hand.small_blind_seat, 0);
    assert_eq!(hand.big_blind_seat, 1);
    assert_eq!(hand.current_action_seat, Some(0));
    assert_eq!(hand.current_bet, U256::from(2_000_000u64));

    let pots = state::pots(&state.pool, hand.id).await.unwrap();
    assert_eq!(pots.len(), 1);
    assert_eq!(pots[0].amount, U256::from(3_000_000u64));

    assert_eq!(count_events(&state, "join_table").await, 2);
    assert_eq!(count_events(&state, "hand_start").await, 1);
}

#[sqlx::test]
async fn test_heads_up_hand_to_showdown(pool: PgPool) {
    let state = test_state(pool);
    let (a, b) = (wallet(0x11), wallet(0x22));
    let table = make_table(&state, 1_000_000, 2_000_000, 0).await;
    seat_player(&state, table.id, &a, 0, 50_000_000).await;
    seat_player(&state, table.id, &b, 1, 50_000_000).await;
    let hand_id = game::start_hand(&state, table.id).await.unwrap();

    // Pre-flop: dealer/SB calls; the BB keeps its option
    act(&state, table.id, &a, PlayerAction::Call).await;
    let hand = state::hand_by_id(&state.pool, hand_id).await.unwrap().unwrap();
    assert_eq!(hand.status, HandStatus::PreFlop);
    assert_eq!(hand.current_action_seat, Some(1));

    // BB checks the option, closing pre-flop
    act(&state, table.id, &b, PlayerAction::Check).await;
    let hand = state::hand_by_id(&state.pool, hand_id).await.unwrap().unwrap();
    assert_eq!(hand.status, HandStatus::Flop);
    assert_eq!(hand.community_cards.len(), 3);
    // Post-flop the non-dealer acts first
    assert_eq!(hand.current_action_seat, Some(1));

    for _ in 0..3 {
        act(&state, table.id, &b, PlayerAction::Check).await;
        act(&state, table.id, &a, PlayerAction::Check).await;
    }

    let hand = state::hand_by_id(&state.pool, hand_id).await.unwrap().unwrap();
    assert_eq!(hand.status, HandStatus::Completed);
    assert_eq!(hand.community_cards.len(), 5);
    assert!(hand.completed_at.is_some());

    // Commit-reveal: the seed now on the row reproduces the committed deck
    let seed: u64 = hand.shuffle_seed.clone().unwrap().parse().unwrap();
    assert!(poker_core::verify_commitment(
        seed,
        hand.deck_nonce.as_deref().unwrap(),
        &hand.shuffle_seed_hash
    ));
    assert!(hand.shuffle_secret.is_none());

    // Chips conserved: the blind-call pot went to the winner(s), no rake
    let total = session_balance(&state, table.id, &a).await
        + session_balance(&state, table.id, &b).await;
    assert_eq!(total, U256::from(100_000_000u64));

    let pots = state::pots(&state.pool, hand_id).await.unwrap();
    assert_eq!(pots.len(), 1);
    assert_eq!(pots[0].amount, U256::from(4_000_000u64));
    let winners = pots[0].winner_seat_numbers.clone().unwrap();
    assert!(!winners.is_empty());

    // The hand_end event reveals and verifies
    let hand_events = events::by_hand(&state.pool, hand_id).await.unwrap();
    let end = hand_events
        .iter()
        .find(|e| e.kind == "hand_end")
        .expect("hand_end appended");
    assert!(events::verify_row(&state.signer, end));
    assert!(end.payload_json.contains("shuffleSeed"));
}

#[sqlx::test]
async fn test_preflop_all_in_with_folded_blind_side_pot(pool: PgPool) {
    let state = test_state(pool);
    let table = make_table(&state, 1_000_000, 2_000_000, 0).await;
    let players: Vec<String> = (0u8..4).map(|i| wallet(0x10 * (i + 1))).collect();
    seat_player(&state, table.id, &players[0], 0, 100_000_000).await;
    seat_player(&state, table.id, &players[1], 1, 100_000_000).await;
    seat_player(&state, table.id, &players[2], 2, 50_000_000).await;
    seat_player(&state, table.id, &players[3], 3, 50_000_000).await;
    let hand_id = game::start_hand(&state, table.id).await.unwrap();

    let hand = state::hand_by_id(&state.pool, hand_id).await.unwrap().unwrap();
    assert_eq!(hand.dealer_position, 0);
    assert_eq!(hand.small_blind_seat, 1);
    assert_eq!(hand.big_blind_seat, 2);
    assert_eq!(hand.current_action_seat, Some(3));

    // UTG shoves, dealer and small blind fold, big blind shoves too
    act(&state, table.id, &players[3], PlayerAction::AllIn).await;
    act(&state, table.id, &players[0], PlayerAction::Fold).await;
    act(&state, table.id, &players[1], PlayerAction::Fold).await;
    act(&state, table.id, &players[2], PlayerAction::AllIn).await;

    // No betting remains: the board runs out and the hand settles
    let hand = state::hand_by_id(&state.pool, hand_id).await.unwrap().unwrap();
    assert_eq!(hand.status, HandStatus::Completed);
    assert_eq!(hand.community_cards.len(), 5);

    // One pot: 50M + 50M shoves plus the folded small blind's 1M
    let pots = state::pots(&state.pool, hand_id).await.unwrap();
    assert_eq!(pots.len(), 1);
    assert_eq!(pots[0].amount, U256::from(101_000_000u64));
    assert_eq!(pots[0].eligible_seat_numbers, vec![2, 3]);

    // Dealer untouched, small blind out 1M, shovers share 101M
    assert_eq!(
        session_balance(&state, table.id, &players[0]).await,
        U256::from(100_000_000u64)
    );
    assert_eq!(
        session_balance(&state, table.id, &players[1]).await,
        U256::from(99_000_000u64)
    );
    let shover_total = session_balance(&state, table.id, &players[2]).await
        + session_balance(&state, table.id, &players[3]).await;
    assert_eq!(shover_total, U256::from(101_000_000u64));
}

#[sqlx::test]
async fn test_stand_up_rejected_while_active_in_hand(pool: PgPool) {
    let state = test_state(pool);
    let (a, b) = (wallet(0x11), wallet(0x22));
    let table = make_table(&state, 1_000_000, 2_000_000, 0).await;
    seat_player(&state, table.id, &a, 0, 50_000_000).await;
    seat_player(&state, table.id, &b, 1, 50_000_000).await;
    game::start_hand(&state, table.id).await.unwrap();

    let err = tables::stand_up(&state, &a, table.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    let session = tables::session_for_wallet(&state.pool, table.id, &a)
        .await
        .unwrap()
        .unwrap();
    assert!(session.is_active);
    assert_eq!(count_events(&state, "leave_table").await, 0);

    // After folding, the player may leave
    act(&state, table.id, &a, PlayerAction::Fold).await;
    tables::stand_up(&state, &a, table.id).await.unwrap();
    assert_eq!(count_events(&state, "leave_table").await, 1);
}

#[sqlx::test]
async fn test_withdrawal_double_request_conflicts(pool: PgPool) {
    let state = test_state(pool);
    let a = wallet(0x11);
    deposit(&state, &a, 10_000_000, "0xd1").await;

    let expiry = (Utc::now() + Duration::seconds(60)).timestamp() as u64;
    let auth = escrow::reserve_and_sign(
        &state.pool,
        &state.signer,
        1,
        &a,
        &a,
        U256::from(5_000_000u64),
        B256::repeat_byte(0x42),
        U256::from(7u64),
        expiry,
    )
    .await
    .unwrap();
    assert_eq!(auth.nonce, U256::from(7u64));
    assert!(auth.v == 27 || auth.v == 28);

    // The reservation now blocks a second signature
    let account = escrow::get(&state.pool, &a).await.unwrap().unwrap();
    assert!(account.has_pending_withdrawal(Utc::now()));
    let err = escrow::validate_withdrawal(
        &a,
        &a,
        U256::from(1_000_000u64),
        60,
        Some(&account),
    )
    .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    let err = escrow::reserve_and_sign(
        &state.pool,
        &state.signer,
        1,
        &a,
        &a,
        U256::from(1_000_000u64),
        B256::repeat_byte(0x43),
        U256::from(8u64),
        expiry,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    assert_eq!(escrow_balance(&state, &a).await, U256::from(10_000_000u64));
    assert_eq!(count_events(&state, "withdrawal_request").await, 1);

    // Chain executes it: reservation clears, nonce is recorded
    let mut tx = state.pool.begin().await.unwrap();
    escrow::apply_withdrawal_executed(
        &mut tx,
        &state.signer,
        1,
        &a,
        U256::from(5_000_000u64),
        U256::from(7u64),
        "0xe1",
        2,
        Utc::now(),
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let account = escrow::get(&state.pool, &a).await.unwrap().unwrap();
    assert_eq!(account.balance_gwei, U256::from(5_000_000u64));
    assert!(!account.has_pending_withdrawal(Utc::now()));
}

#[sqlx::test]
async fn test_pending_withdrawal_blocks_join(pool: PgPool) {
    let state = test_state(pool);
    let a = wallet(0x11);
    deposit(&state, &a, 50_000_000, "0xd1").await;
    let table = make_table(&state, 1_000_000, 2_000_000, 0).await;

    let expiry = (Utc::now() + Duration::seconds(60)).timestamp() as u64;
    escrow::reserve_and_sign(
        &state.pool,
        &state.signer,
        1,
        &a,
        &a,
        U256::from(1_000_000u64),
        B256::repeat_byte(0x42),
        U256::from(1u64),
        expiry,
    )
    .await
    .unwrap();

    let err = tables::join(
        &state,
        &a,
        None,
        None,
        tables::JoinInput {
            table_id: table.id,
            seat_number: 0,
            buy_in_gwei: U256::from(20_000_000u64),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[sqlx::test]
async fn test_table_events_resume_query(pool: PgPool) {
    let state = test_state(pool);
    deposit(&state, &wallet(0x11), 100_000_000, "0xd1").await;
    let table7 = make_table(&state, 1_000_000, 2_000_000, 0).await;
    let table9 = make_table(&state, 1_000_000, 2_000_000, 0).await;

    // Interleave events for the two tables
    for i in 0..6 {
        let target = if i % 2 == 0 { &table7 } else { &table9 };
        let mut tx = state.pool.begin().await.unwrap();
        let p = payload::table_admin("table_activated", ADMIN, target, Utc::now());
        events::append(&mut tx, &state.signer, 1, EventKind::TableActivated, &p, None, None)
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let all7 = events::by_table_since(&state.pool, table7.id, 0, 100)
        .await
        .unwrap();
    // create_table + the three interleaved appends
    assert_eq!(all7.len(), 4);
    assert!(all7.windows(2).all(|w| w[0].event_id < w[1].event_id));
    assert!(all7.iter().all(|e| e.table_id == Some(table7.id)));

    // Resuming from the middle yields only the later events
    let resume_from = all7[1].event_id;
    let tail = events::by_table_since(&state.pool, table7.id, resume_from, 100)
        .await
        .unwrap();
    assert_eq!(tail.len(), 2);
    assert!(tail.iter().all(|e| e.event_id > resume_from));
}

#[sqlx::test]
async fn test_rake_credits_the_house(pool: PgPool) {
    let state = test_state(pool);
    let (a, b) = (wallet(0x11), wallet(0x22));
    // 5% rake; blinds 2.5M/5M so a blind-call pot is exactly 10M
    let table = make_table(&state, 2_500_000, 5_000_000, 500).await;
    seat_player(&state, table.id, &a, 0, 50_000_000).await;
    seat_player(&state, table.id, &b, 1, 50_000_000).await;
    let hand_id = game::start_hand(&state, table.id).await.unwrap();

    act(&state, table.id, &a, PlayerAction::Call).await;
    act(&state, table.id, &b, PlayerAction::Check).await;
    for _ in 0..3 {
        act(&state, table.id, &b, PlayerAction::Check).await;
        act(&state, table.id, &a, PlayerAction::Check).await;
    }

    let hand = state::hand_by_id(&state.pool, hand_id).await.unwrap().unwrap();
    assert_eq!(hand.status, HandStatus::Completed);

    let pots = state::pots(&state.pool, hand_id).await.unwrap();
    assert_eq!(pots[0].amount, U256::from(9_500_000u64));

    // floor(10M * 500 / 10000) to the trusted key's own balance
    assert_eq!(escrow_balance(&state, ADMIN).await, U256::from(500_000u64));

    let total = session_balance(&state, table.id, &a).await
        + session_balance(&state, table.id, &b).await;
    assert_eq!(total, U256::from(99_500_000u64));
}

#[sqlx::test]
async fn test_action_timeout_auto_folds(pool: PgPool) {
    let state = test_state(pool);
    let (a, b) = (wallet(0x11), wallet(0x22));
    let table = make_table(&state, 1_000_000, 2_000_000, 0).await;
    seat_player(&state, table.id, &a, 0, 50_000_000).await;
    seat_player(&state, table.id, &b, 1, 50_000_000).await;
    let hand_id = game::start_hand(&state, table.id).await.unwrap();

    sqlx::query("UPDATE hands SET action_timeout_at = now() - interval '5 seconds' WHERE id = $1")
        .bind(hand_id)
        .execute(&state.pool)
        .await
        .unwrap();

    // Seat 0 (dealer/SB) times out and folds; seat 1 takes the blinds
    assert!(game::fold_for_timeout(&state, hand_id).await.unwrap());
    let hand = state::hand_by_id(&state.pool, hand_id).await.unwrap().unwrap();
    assert_eq!(hand.status, HandStatus::Completed);
    assert_eq!(
        session_balance(&state, table.id, &b).await,
        U256::from(51_000_000u64)
    );

    // Firing again on the settled hand is a no-op
    assert!(!game::fold_for_timeout(&state, hand_id).await.unwrap());
}

#[sqlx::test]
async fn test_rebuy_rules(pool: PgPool) {
    let state = test_state(pool);
    let (a, b) = (wallet(0x11), wallet(0x22));
    deposit(&state, &a, 200_000_000, "0xd1").await;
    let table = make_table(&state, 1_000_000, 2_000_000, 0).await;
    seat_player(&state, table.id, &a, 0, 50_000_000).await;
    seat_player(&state, table.id, &b, 1, 50_000_000).await;

    // Over the table maximum
    let err = tables::rebuy(&state, &a, table.id, U256::from(60_000_000u64))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let session = tables::rebuy(&state, &a, table.id, U256::from(30_000_000u64))
        .await
        .unwrap();
    assert_eq!(session.table_balance_gwei, U256::from(80_000_000u64));
    assert_eq!(escrow_balance(&state, &a).await, U256::from(170_000_000u64));

    // Not while playing the live hand
    game::start_hand(&state, table.id).await.unwrap();
    let err = tables::rebuy(&state, &a, table.id, U256::from(10_000_000u64))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[sqlx::test]
async fn test_not_your_turn_and_seat_conflicts(pool: PgPool) {
    let state = test_state(pool);
    let (a, b, c) = (wallet(0x11), wallet(0x22), wallet(0x33));
    deposit(&state, &c, 100_000_000, "0xd3").await;
    let table = make_table(&state, 1_000_000, 2_000_000, 0).await;
    seat_player(&state, table.id, &a, 0, 50_000_000).await;
    seat_player(&state, table.id, &b, 1, 50_000_000).await;

    // Taken seat
    let err = tables::join(
        &state,
        &c,
        None,
        None,
        tables::JoinInput {
            table_id: table.id,
            seat_number: 1,
            buy_in_gwei: U256::from(50_000_000u64),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    game::start_hand(&state, table.id).await.unwrap();

    // Heads-up pre-flop action is on the dealer, not the big blind
    let err = game::apply_action(&state, table.id, &b, PlayerAction::Check)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[sqlx::test]
async fn test_deactivated_table_completes_hand_but_rejects_new(pool: PgPool) {
    let state = test_state(pool);
    let (a, b, c) = (wallet(0x11), wallet(0x22), wallet(0x33));
    deposit(&state, &c, 100_000_000, "0xd3").await;
    let table = make_table(&state, 1_000_000, 2_000_000, 0).await;
    seat_player(&state, table.id, &a, 0, 50_000_000).await;
    seat_player(&state, table.id, &b, 1, 50_000_000).await;
    game::start_hand(&state, table.id).await.unwrap();

    tables::set_active(&state, table.id, false, ADMIN).await.unwrap();

    // No-op transition is a conflict
    let err = tables::set_active(&state, table.id, false, ADMIN)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    // New joins are rejected
    let err = tables::join(
        &state,
        &c,
        None,
        None,
        tables::JoinInput {
            table_id: table.id,
            seat_number: 2,
            buy_in_gwei: U256::from(50_000_000u64),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    // The live hand still plays to completion
    act(&state, table.id, &a, PlayerAction::Fold).await;
    let hand = state::open_hand(&state.pool, table.id).await.unwrap();
    assert!(hand.is_none());

    // But no new hand may start
    let err = game::start_hand(&state, table.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[sqlx::test]
async fn test_big_blind_option_raise_reopens_action(pool: PgPool) {
    let state = test_state(pool);
    let (a, b) = (wallet(0x11), wallet(0x22));
    let table = make_table(&state, 1_000_000, 2_000_000, 0).await;
    seat_player(&state, table.id, &a, 0, 50_000_000).await;
    seat_player(&state, table.id, &b, 1, 50_000_000).await;
    let hand_id = game::start_hand(&state, table.id).await.unwrap();

    act(&state, table.id, &a, PlayerAction::Call).await;

    // BB raises its option instead of checking
    act(&state, table.id, &b, PlayerAction::Raise(U256::from(4_000_000u64))).await;
    let hand = state::hand_by_id(&state.pool, hand_id).await.unwrap().unwrap();
    assert_eq!(hand.status, HandStatus::PreFlop);
    assert_eq!(hand.current_bet, U256::from(6_000_000u64));
    assert_eq!(hand.current_action_seat, Some(0));

    act(&state, table.id, &a, PlayerAction::Call).await;
    let hand = state::hand_by_id(&state.pool, hand_id).await.unwrap().unwrap();
    assert_eq!(hand.status, HandStatus::Flop);

    let pots = state::pots(&state.pool, hand_id).await.unwrap();
    assert_eq!(pots[0].amount, U256::from(12_000_000u64));
}
