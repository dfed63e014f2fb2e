// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_bitfield::BitField;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use num_traits::Zero;

use fil_actor_miner::{
    ext, reward_for_consensus_slash_report, Actor as MinerActor, ChangeWorkerAddressParams,
    ChangePeerIdParams, CronEventPayload, CronEventType, Method, ProveCommitSectorParams,
    TerminateSectorsParams, PRE_COMMIT_CHALLENGE_DELAY, WORKER_KEY_CHANGE_DELAY,
    WPOST_PROVING_PERIOD,
};
use fil_actors_runtime::test_utils::*;
use fil_actors_runtime::{STORAGE_MARKET_ACTOR_ADDR, STORAGE_POWER_ACTOR_ADDR};

mod util;
use util::*;

const PERIOD_BOUNDARY: u64 = 100;

#[test]
fn change_worker_address_stages_and_commits_key() {
    let h = ActorHarness::new();
    let mut rt = h.new_runtime(PERIOD_BOUNDARY);
    h.construct_and_verify(&mut rt);

    let new_worker = Address::new_id(999);
    rt.actor_code_cids.insert(new_worker, *ACCOUNT_ACTOR_CODE_ID);

    let effective_at = rt.epoch + WORKER_KEY_CHANGE_DELAY;

    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, h.owner);
    rt.expect_validate_caller_addr(vec![h.owner]);
    // the new worker's pubkey address is fetched
    rt.expect_send(
        new_worker,
        ext::account::PUBKEY_ADDRESS_METHOD,
        RawBytes::default(),
        TokenAmount::zero(),
        RawBytes::serialize(new_bls_addr(7)).unwrap(),
        ExitCode::OK,
    );
    h.expect_enroll_cron(
        &mut rt,
        effective_at,
        CronEventPayload { event_type: CronEventType::WorkerKeyChange, sectors: None },
    );

    rt.call::<MinerActor>(
        Method::ChangeWorkerAddress as u64,
        &RawBytes::serialize(ChangeWorkerAddressParams { new_worker }).unwrap(),
    )
    .unwrap();
    rt.verify();

    let st = get_state(&rt);
    assert_eq!(h.worker, st.info.worker);
    let pending = st.info.pending_worker_key.clone().unwrap();
    assert_eq!(new_worker, pending.new_worker);
    assert_eq!(effective_at, pending.effective_at);

    // Confirming before the effective epoch is forbidden.
    rt.expect_validate_caller_any();
    expect_abort(
        ExitCode::USR_FORBIDDEN,
        rt.call::<MinerActor>(Method::ConfirmUpdateWorkerKey as u64, &RawBytes::default()),
    );
    rt.reset();

    // The enrolled cron event commits the change.
    rt.set_epoch(effective_at);
    rt.set_caller(*POWER_ACTOR_CODE_ID, STORAGE_POWER_ACTOR_ADDR);
    rt.expect_validate_caller_addr(vec![STORAGE_POWER_ACTOR_ADDR]);
    rt.call::<MinerActor>(
        Method::OnDeferredCronEvent as u64,
        &RawBytes::serialize(CronEventPayload {
            event_type: CronEventType::WorkerKeyChange,
            sectors: None,
        })
        .unwrap(),
    )
    .unwrap();
    rt.verify();

    let st = get_state(&rt);
    assert_eq!(new_worker, st.info.worker);
    assert!(st.info.pending_worker_key.is_none());

    check_state(&rt);
}

#[test]
fn change_peer_id_by_worker() {
    let h = ActorHarness::new();
    let mut rt = h.new_runtime(PERIOD_BOUNDARY);
    h.construct_and_verify(&mut rt);

    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, h.worker);
    rt.expect_validate_caller_addr(vec![h.worker]);
    rt.call::<MinerActor>(
        Method::ChangePeerId as u64,
        &RawBytes::serialize(ChangePeerIdParams { new_id: b"other".to_vec() }).unwrap(),
    )
    .unwrap();
    rt.verify();

    assert_eq!(b"other".to_vec(), get_state(&rt).info.peer_id);
    check_state(&rt);
}

#[test]
fn terminate_sector_notifies_market_for_its_deals() {
    let h = ActorHarness::new();
    let mut rt = h.new_runtime(PERIOD_BOUNDARY);
    h.construct_and_verify(&mut rt);

    let precommit_epoch = 11;
    rt.set_epoch(precommit_epoch);

    let expiration = PERIOD_BOUNDARY as i64 + 2 * WPOST_PROVING_PERIOD - 1;
    let mut precommit = h.make_pre_commit(100, 1, expiration);
    precommit.deal_ids = vec![1, 2];
    h.pre_commit_sector(&mut rt, precommit.clone());

    rt.set_epoch(precommit_epoch + PRE_COMMIT_CHALLENGE_DELAY);
    h.prove_commit_sector(
        &mut rt,
        &precommit,
        precommit_epoch,
        ProveCommitSectorParams { sector_number: 100, proof: b"proof".to_vec() },
    );

    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, h.worker);
    rt.expect_validate_caller_addr(vec![h.worker]);
    rt.expect_send(
        STORAGE_MARKET_ACTOR_ADDR,
        ext::market::ON_MINER_SECTORS_TERMINATE_METHOD,
        RawBytes::serialize(ext::market::OnMinerSectorsTerminateParams {
            deal_ids: vec![1, 2],
        })
        .unwrap(),
        TokenAmount::zero(),
        RawBytes::default(),
        ExitCode::OK,
    );

    rt.call::<MinerActor>(
        Method::TerminateSectors as u64,
        &RawBytes::serialize(TerminateSectorsParams {
            sectors: BitField::try_from_bits([100]).unwrap(),
        })
        .unwrap(),
    )
    .unwrap();
    rt.verify();

    let st = get_state(&rt);
    assert!(st.get_sector(rt.store(), 100).unwrap().is_none());
    assert_empty_bitfield(&st.new_sectors);
    assert!(st.get_sector_expirations(rt.store(), expiration).unwrap().is_empty());

    check_state(&rt);
}

#[test]
fn consensus_slash_reporter_share_grows_with_age_and_is_capped() {
    let collateral = TokenAmount::from_atto(1_000_000u64);

    // share starts at 1/1000 and grows by 101251/100000 per epoch
    let r1 = reward_for_consensus_slash_report(1, collateral.clone());
    assert_eq!(TokenAmount::from_atto(1012u64), r1);

    let r2 = reward_for_consensus_slash_report(2, collateral.clone());
    assert!(r2 > r1);

    // an ancient fault report is capped at half the collateral
    let r_old = reward_for_consensus_slash_report(10_000, collateral.clone());
    assert_eq!(TokenAmount::from_atto(500_000u64), r_old);
}
