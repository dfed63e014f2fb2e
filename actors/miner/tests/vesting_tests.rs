// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use num_traits::Zero;

use fil_actor_miner::VestSpec;

use state_harness::*;

struct TestCase {
    desc: &'static str,
    vspec: VestSpec,
    vepocs: Vec<i64>,
}

#[test]
fn test_vesting() {
    let vest_sum = 100;

    let tests = [
        TestCase {
            desc: "vest funds in a single epoch",
            vspec: VestSpec { initial_delay: 0, vest_period: 1, step_duration: 1, quantization: 1 },
            vepocs: vec![0, 0, 100, 0],
        },
        TestCase {
            desc: "vest funds with period=2",
            vspec: VestSpec { initial_delay: 0, vest_period: 2, step_duration: 1, quantization: 1 },
            vepocs: vec![0, 0, 50, 50, 0],
        },
        TestCase {
            desc: "vest funds with period=2 quantization=2",
            vspec: VestSpec { initial_delay: 0, vest_period: 2, step_duration: 1, quantization: 2 },
            vepocs: vec![0, 0, 0, 100, 0],
        },
        TestCase {
            desc: "vest funds with period=3",
            vspec: VestSpec { initial_delay: 0, vest_period: 3, step_duration: 1, quantization: 1 },
            vepocs: vec![0, 0, 33, 33, 34, 0],
        },
        TestCase {
            desc: "vest funds with period=3 quantization=2",
            vspec: VestSpec { initial_delay: 0, vest_period: 3, step_duration: 1, quantization: 2 },
            vepocs: vec![0, 0, 0, 66, 0, 34, 0],
        },
        TestCase {
            desc: "vest funds with period=2 step=2",
            vspec: VestSpec { initial_delay: 0, vest_period: 2, step_duration: 2, quantization: 1 },
            vepocs: vec![0, 0, 0, 100, 0],
        },
        TestCase {
            desc: "vest funds with period=5 step=2",
            vspec: VestSpec { initial_delay: 0, vest_period: 5, step_duration: 2, quantization: 1 },
            vepocs: vec![0, 0, 0, 40, 0, 40, 0, 20, 0],
        },
        TestCase {
            desc: "vest funds with delay=1 period=5 step=2",
            vspec: VestSpec { initial_delay: 1, vest_period: 5, step_duration: 2, quantization: 1 },
            vepocs: vec![0, 0, 0, 0, 40, 0, 40, 0, 20, 0],
        },
        TestCase {
            desc: "vest funds with period=5 step=3 quantization=1",
            vspec: VestSpec { initial_delay: 0, vest_period: 5, step_duration: 3, quantization: 1 },
            vepocs: vec![0, 0, 0, 0, 60, 0, 0, 40, 0],
        },
    ];

    for test in tests {
        let mut h = StateHarness::new(0);
        h.st.add_locked_funds(&h.store, 0, &TokenAmount::from_atto(vest_sum), &test.vspec)
            .unwrap();
        assert_eq!(TokenAmount::from_atto(vest_sum), h.st.locked_funds, "{}", test.desc);

        let mut total_vested = 0;
        for (e, &expected) in test.vepocs.iter().enumerate() {
            let vested =
                h.st.unlock_vested_funds(&h.store, e as ChainEpoch).unwrap();
            assert_eq!(
                TokenAmount::from_atto(expected),
                vested,
                "{} epoch {}",
                test.desc,
                e
            );
            total_vested += expected;
        }

        assert_eq!(vest_sum, total_vested, "{}", test.desc);
        assert!(h.st.locked_funds.is_zero(), "{}", test.desc);
    }
}

#[test]
fn vesting_table_shape_and_partial_unlock() {
    // AddLockedFunds(now=0, sum=1000, spec={Delay=0, Period=100, Step=10, Quant=10})
    let mut h = StateHarness::new(0);
    let spec = VestSpec { initial_delay: 0, vest_period: 100, step_duration: 10, quantization: 10 };
    h.st.add_locked_funds(&h.store, 0, &TokenAmount::from_atto(1000), &spec).unwrap();

    assert_eq!(TokenAmount::from_atto(1000), h.st.locked_funds);
    for epoch in (10..=100).step_by(10) {
        assert_eq!(TokenAmount::from_atto(100), h.vesting_funds_at(epoch));
    }

    // Everything vesting before epoch 55 unlocks.
    let unlocked = h.st.unlock_vested_funds(&h.store, 55).unwrap();
    assert_eq!(TokenAmount::from_atto(500), unlocked);
    assert_eq!(TokenAmount::from_atto(500), h.st.locked_funds);

    for epoch in (10..=50).step_by(10) {
        assert!(h.vesting_funds_at(epoch).is_zero());
    }
    for epoch in (60..=100).step_by(10) {
        assert_eq!(TokenAmount::from_atto(100), h.vesting_funds_at(epoch));
    }
}

#[test]
fn unlock_unvested_funds_takes_earliest_unvested_entries() {
    let mut h = StateHarness::new(0);
    let spec = VestSpec { initial_delay: 0, vest_period: 100, step_duration: 10, quantization: 10 };
    h.st.add_locked_funds(&h.store, 0, &TokenAmount::from_atto(1000), &spec).unwrap();

    // Slash 300: the entries at epochs 10, 20, 30 are consumed.
    let unlocked =
        h.st.unlock_unvested_funds(&h.store, 0, &TokenAmount::from_atto(300)).unwrap();
    assert_eq!(TokenAmount::from_atto(300), unlocked);
    assert_eq!(TokenAmount::from_atto(700), h.st.locked_funds);
    assert!(h.vesting_funds_at(10).is_zero());
    assert!(h.vesting_funds_at(30).is_zero());
    assert_eq!(TokenAmount::from_atto(100), h.vesting_funds_at(40));

    // A partial entry is left in place.
    let unlocked =
        h.st.unlock_unvested_funds(&h.store, 0, &TokenAmount::from_atto(50)).unwrap();
    assert_eq!(TokenAmount::from_atto(50), unlocked);
    assert_eq!(TokenAmount::from_atto(50), h.vesting_funds_at(40));

    // Only entries at or after the current epoch are touched.
    let unlocked =
        h.st.unlock_unvested_funds(&h.store, 95, &TokenAmount::from_atto(1000)).unwrap();
    assert_eq!(TokenAmount::from_atto(100), unlocked);
    assert!(h.vesting_funds_at(100).is_zero());

    // Unvested unlocking is capped by what the table holds.
    let remaining = h.st.locked_funds.clone();
    let unlocked = h.st.unlock_unvested_funds(&h.store, 0, &remaining).unwrap();
    assert_eq!(remaining, unlocked);
    assert!(h.st.locked_funds.is_zero());
}
