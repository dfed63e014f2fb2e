// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_bitfield::BitField;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::randomness::Randomness;
use fvm_shared::sector::{PoStProof, RegisteredPoStProof, WindowPoStVerifyInfo};
use num_traits::Zero;

use fil_actor_miner::{
    Actor as MinerActor, DeclareFaultsParams, DeclareFaultsRecoveredParams, Method,
    ProveCommitSectorParams, SubmitWindowedPoStParams, PRE_COMMIT_CHALLENGE_DELAY,
    WPOST_CHALLENGE_LOOKBACK, WPOST_CHALLENGE_WINDOW, WPOST_PROVING_PERIOD,
};
use fil_actors_runtime::runtime::DomainSeparationTag;
use fil_actors_runtime::test_utils::*;

mod util;
use util::*;

const PERIOD_BOUNDARY: u64 = 100;

// The fixed test hasher makes every hash-derived quantity equal to PERIOD_BOUNDARY, so a new
// sector is always assigned to deadline PERIOD_BOUNDARY % WPoStPeriodDeadlines.
const ASSIGNED_DEADLINE: u64 = PERIOD_BOUNDARY % fil_actor_miner::WPOST_PERIOD_DEADLINES;

#[test]
fn empty_period_cron_reenrolls() {
    let h = ActorHarness::new();
    let mut rt = h.new_runtime(PERIOD_BOUNDARY);
    h.construct_and_verify(&mut rt);

    // Cron fires on the final epoch of each proving period.
    rt.set_epoch(PERIOD_BOUNDARY as i64 - 1);
    h.on_proving_period_cron(&mut rt);

    rt.set_epoch(PERIOD_BOUNDARY as i64 + WPOST_PROVING_PERIOD - 1);
    h.on_proving_period_cron(&mut rt);

    check_state(&rt);
}

/// Commits a sector and runs the period cron so the sector lands in its deadline.
/// Returns the epoch of the start of the next full proving period.
fn commit_and_assign_sector(h: &ActorHarness, rt: &mut MockRuntime) -> i64 {
    let precommit_epoch = 11;
    rt.set_epoch(precommit_epoch);

    // Expires at the end of the second full period.
    let expiration = PERIOD_BOUNDARY as i64 + 2 * WPOST_PROVING_PERIOD - 1;
    let precommit = h.make_pre_commit(100, 1, expiration);
    h.pre_commit_sector(rt, precommit.clone());

    rt.set_epoch(precommit_epoch + PRE_COMMIT_CHALLENGE_DELAY);
    h.prove_commit_sector(
        rt,
        &precommit,
        precommit_epoch,
        ProveCommitSectorParams { sector_number: 100, proof: b"proof".to_vec() },
    );

    // Period-end cron assigns the new sector to a deadline.
    rt.set_epoch(PERIOD_BOUNDARY as i64 - 1);
    h.on_proving_period_cron(rt);

    let st = get_state(rt);
    assert_empty_bitfield(&st.new_sectors);
    let deadlines = st.load_deadlines(rt.store()).unwrap();
    assert!(deadlines.due[ASSIGNED_DEADLINE as usize].get(100));

    PERIOD_BOUNDARY as i64
}

#[test]
fn new_sector_assigned_to_deadline_at_period_boundary() {
    let h = ActorHarness::new();
    let mut rt = h.new_runtime(PERIOD_BOUNDARY);
    h.construct_and_verify(&mut rt);

    commit_and_assign_sector(&h, &mut rt);
    check_state(&rt);
}

#[test]
fn missed_post_becomes_fault_at_period_end() {
    let h = ActorHarness::new();
    let mut rt = h.new_runtime(PERIOD_BOUNDARY);
    h.construct_and_verify(&mut rt);

    let period_start = commit_and_assign_sector(&h, &mut rt);

    // No proof is submitted during the period. The period-end cron detects the
    // missed deadline and marks the sector faulty.
    rt.set_epoch(period_start + WPOST_PROVING_PERIOD - 1);
    h.on_proving_period_cron(&mut rt);

    let st = get_state(&rt);
    assert!(st.faults.get(100));
    assert_empty_bitfield(&st.post_submissions);

    // The fault is recorded against the period in which it was detected.
    let mut fault_epochs = Vec::new();
    st.for_each_fault_epoch(rt.store(), |epoch, faults| {
        fault_epochs.push((epoch, faults.clone()));
        Ok(())
    })
    .unwrap();
    assert_eq!(1, fault_epochs.len());
    assert_eq!(period_start, fault_epochs[0].0);
    assert!(fault_epochs[0].1.get(100));

    check_state(&rt);
}

#[test]
fn declared_fault_recovers_through_post() {
    let h = ActorHarness::new();
    let mut rt = h.new_runtime(PERIOD_BOUNDARY);
    h.construct_and_verify(&mut rt);

    let period_start = commit_and_assign_sector(&h, &mut rt);

    let deadline_open = period_start + ASSIGNED_DEADLINE as i64 * WPOST_CHALLENGE_WINDOW;

    // Declare the sector faulty well before its deadline opens.
    rt.set_epoch(period_start + 1);
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, h.worker);
    rt.expect_validate_caller_addr(vec![h.worker]);
    rt.call::<MinerActor>(
        Method::DeclareFaults as u64,
        &RawBytes::serialize(DeclareFaultsParams {
            faults: BitField::try_from_bits([100]).unwrap(),
        })
        .unwrap(),
    )
    .unwrap();
    rt.verify();

    let st = get_state(&rt);
    assert!(st.faults.get(100));
    check_state(&rt);

    // Declare it recovered.
    rt.expect_validate_caller_addr(vec![h.worker]);
    rt.call::<MinerActor>(
        Method::DeclareFaultsRecovered as u64,
        &RawBytes::serialize(DeclareFaultsRecoveredParams {
            recoveries: BitField::try_from_bits([100]).unwrap(),
        })
        .unwrap(),
    )
    .unwrap();
    rt.verify();

    let st = get_state(&rt);
    assert!(st.recoveries.get(100));
    check_state(&rt);

    // A valid PoSt in the sector's window completes the recovery.
    rt.set_epoch(deadline_open);
    let st = get_state(&rt);
    let sector = st.get_sector(rt.store(), 100).unwrap().unwrap();

    rt.expect_validate_caller_addr(vec![h.worker]);
    let entropy = RawBytes::serialize(h.receiver).unwrap();
    let randomness = Randomness(b"postrand".to_vec());
    rt.expect_get_randomness_from_tickets(
        DomainSeparationTag::WindowedPoStChallengeSeed,
        deadline_open - WPOST_CHALLENGE_LOOKBACK,
        entropy.to_vec(),
        randomness.clone(),
    );

    let proofs = vec![PoStProof {
        post_proof: RegisteredPoStProof::StackedDRGWindow2KiBV1,
        proof_bytes: b"post".to_vec(),
    }];
    rt.expect_verify_post(
        WindowPoStVerifyInfo {
            randomness,
            proofs: proofs.clone(),
            challenged_sectors: vec![sector.as_sector_info()],
            prover: h.receiver.id().unwrap(),
        },
        ExitCode::OK,
    );

    rt.call::<MinerActor>(
        Method::SubmitWindowedPoSt as u64,
        &RawBytes::serialize(SubmitWindowedPoStParams {
            deadline: ASSIGNED_DEADLINE,
            partitions: vec![0],
            proofs,
        })
        .unwrap(),
    )
    .unwrap();
    rt.verify();

    let st = get_state(&rt);
    assert_empty_bitfield(&st.faults);
    assert_empty_bitfield(&st.recoveries);
    assert!(st.post_submissions.get(0));

    // The period-end cron sees the proven deadline and detects no fault.
    rt.set_epoch(period_start + WPOST_PROVING_PERIOD - 1);
    h.on_proving_period_cron(&mut rt);

    let st = get_state(&rt);
    assert_empty_bitfield(&st.faults);
    assert_empty_bitfield(&st.post_submissions);

    check_state(&rt);
}

#[test]
fn fault_declaration_too_close_to_deadline_is_rejected() {
    let h = ActorHarness::new();
    let mut rt = h.new_runtime(PERIOD_BOUNDARY);
    h.construct_and_verify(&mut rt);

    let period_start = commit_and_assign_sector(&h, &mut rt);
    let deadline_open = period_start + ASSIGNED_DEADLINE as i64 * WPOST_CHALLENGE_WINDOW;

    // Declaration at the cutoff is too late.
    rt.set_epoch(deadline_open - fil_actor_miner::FAULT_DECLARATION_CUTOFF);
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, h.worker);
    rt.expect_validate_caller_addr(vec![h.worker]);
    expect_abort(
        ExitCode::USR_ILLEGAL_ARGUMENT,
        rt.call::<MinerActor>(
            Method::DeclareFaults as u64,
            &RawBytes::serialize(DeclareFaultsParams {
                faults: BitField::try_from_bits([100]).unwrap(),
            })
            .unwrap(),
        ),
    );
    rt.reset();
    check_state(&rt);
}

#[test]
fn sector_expiring_at_period_end_is_removed_by_cron() {
    let h = ActorHarness::new();
    let mut rt = h.new_runtime(PERIOD_BOUNDARY);
    h.construct_and_verify(&mut rt);

    let precommit_epoch = 11;
    rt.set_epoch(precommit_epoch);

    // Expires at the end of the first full period.
    let expiration = PERIOD_BOUNDARY as i64 + WPOST_PROVING_PERIOD - 1;
    let precommit = h.make_pre_commit(100, 1, expiration);
    h.pre_commit_sector(&mut rt, precommit.clone());

    rt.set_epoch(precommit_epoch + PRE_COMMIT_CHALLENGE_DELAY);
    h.prove_commit_sector(
        &mut rt,
        &precommit,
        precommit_epoch,
        ProveCommitSectorParams { sector_number: 100, proof: b"proof".to_vec() },
    );

    // First cron assigns the sector.
    rt.set_epoch(PERIOD_BOUNDARY as i64 - 1);
    h.on_proving_period_cron(&mut rt);
    assert!(get_state(&rt).get_sector(rt.store(), 100).unwrap().is_some());

    // PoSt the sector through its period so no fault intervenes.
    let deadline_open =
        PERIOD_BOUNDARY as i64 + ASSIGNED_DEADLINE as i64 * WPOST_CHALLENGE_WINDOW;
    rt.set_epoch(deadline_open);
    let st = get_state(&rt);
    let sector = st.get_sector(rt.store(), 100).unwrap().unwrap();

    rt.expect_validate_caller_addr(vec![h.worker]);
    let entropy = RawBytes::serialize(h.receiver).unwrap();
    let randomness = Randomness(b"postrand".to_vec());
    rt.expect_get_randomness_from_tickets(
        DomainSeparationTag::WindowedPoStChallengeSeed,
        deadline_open - WPOST_CHALLENGE_LOOKBACK,
        entropy.to_vec(),
        randomness.clone(),
    );
    let proofs = vec![PoStProof {
        post_proof: RegisteredPoStProof::StackedDRGWindow2KiBV1,
        proof_bytes: b"post".to_vec(),
    }];
    rt.expect_verify_post(
        WindowPoStVerifyInfo {
            randomness,
            proofs: proofs.clone(),
            challenged_sectors: vec![sector.as_sector_info()],
            prover: h.receiver.id().unwrap(),
        },
        ExitCode::OK,
    );
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, h.worker);
    rt.call::<MinerActor>(
        Method::SubmitWindowedPoSt as u64,
        &RawBytes::serialize(SubmitWindowedPoStParams {
            deadline: ASSIGNED_DEADLINE,
            partitions: vec![0],
            proofs,
        })
        .unwrap(),
    )
    .unwrap();
    rt.verify();

    // The cron at the expiration epoch deletes the sector.
    rt.set_epoch(expiration);
    h.on_proving_period_cron(&mut rt);

    let st = get_state(&rt);
    assert!(st.get_sector(rt.store(), 100).unwrap().is_none());
    assert!(st.get_sector_expirations(rt.store(), expiration).unwrap().is_empty());
    let deadlines = st.load_deadlines(rt.store()).unwrap();
    assert!(deadlines.due[ASSIGNED_DEADLINE as usize].is_empty());

    check_state(&rt);
}

#[test]
fn withdraw_balance_limited_to_available() {
    let h = ActorHarness::new();
    let mut rt = h.new_runtime(PERIOD_BOUNDARY);
    h.construct_and_verify(&mut rt);

    rt.set_balance(TokenAmount::from_atto(100u8));

    // Requesting more than the balance fails.
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, h.owner);
    rt.expect_validate_caller_addr(vec![h.owner]);
    expect_abort(
        ExitCode::USR_INSUFFICIENT_FUNDS,
        rt.call::<MinerActor>(
            Method::WithdrawBalance as u64,
            &RawBytes::serialize(fil_actor_miner::WithdrawBalanceParams {
                amount_requested: TokenAmount::from_atto(101u8),
            })
            .unwrap(),
        ),
    );
    rt.reset();

    // A withdrawal within the available balance is sent to the owner.
    rt.expect_validate_caller_addr(vec![h.owner]);
    rt.expect_send(
        h.owner,
        fvm_shared::METHOD_SEND,
        RawBytes::default(),
        TokenAmount::from_atto(40u8),
        RawBytes::default(),
        ExitCode::OK,
    );
    rt.call::<MinerActor>(
        Method::WithdrawBalance as u64,
        &RawBytes::serialize(fil_actor_miner::WithdrawBalanceParams {
            amount_requested: TokenAmount::from_atto(40u8),
        })
        .unwrap(),
    )
    .unwrap();
    rt.verify();

    assert_eq!(TokenAmount::from_atto(60u8), rt.balance.borrow().clone());
    check_state(&rt);
}
