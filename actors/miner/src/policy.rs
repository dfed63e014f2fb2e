// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::bigint::{BigInt, Integer};
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::sector::{RegisteredSealProof, SectorSize};
use lazy_static::lazy_static;
use num_traits::{Pow, Zero};

use super::types::SectorOnChainInfo;

/// The duration of a chain epoch.
/// This is used for deriving epoch-denominated periods that are more naturally expressed in
/// clock time.
pub const EPOCH_DURATION_SECONDS: i64 = 25;
pub const SECONDS_IN_YEAR: i64 = 31556925;
pub const SECONDS_IN_DAY: i64 = 86400;

pub const EPOCHS_IN_DAY: ChainEpoch = SECONDS_IN_DAY / EPOCH_DURATION_SECONDS;
pub const EPOCHS_IN_YEAR: ChainEpoch = SECONDS_IN_YEAR / EPOCH_DURATION_SECONDS;

/// The period over which all a miner's active sectors will be challenged.
pub const WPOST_PROVING_PERIOD: ChainEpoch = SECONDS_IN_DAY / EPOCH_DURATION_SECONDS;

/// The duration of a deadline's challenge window, the period before a deadline when the
/// challenge is available. Half an hour (=48 per day).
pub const WPOST_CHALLENGE_WINDOW: ChainEpoch = 1800 / EPOCH_DURATION_SECONDS;

/// The number of non-overlapping PoSt deadlines in each proving period.
pub const WPOST_PERIOD_DEADLINES: u64 = (WPOST_PROVING_PERIOD / WPOST_CHALLENGE_WINDOW) as u64;

/// The maximum number of sectors in a single window PoSt proof.
pub const WPOST_PARTITION_SECTORS: u64 = 2350;

/// The maximum number of partitions that may be submitted in a single message.
/// This bounds the size of a list/set of sector numbers that might be instantiated to process
/// a submission.
pub const WPOST_MESSAGE_PARTITIONS_MAX: u64 = 100_000 / WPOST_PARTITION_SECTORS;

// Check that the challenge windows divide the proving period evenly.
const _: () = assert!(WPOST_PROVING_PERIOD % WPOST_CHALLENGE_WINDOW == 0);
const _: () =
    assert!(WPOST_PERIOD_DEADLINES as i64 * WPOST_CHALLENGE_WINDOW == WPOST_PROVING_PERIOD);

/// The maximum number of sectors that a miner can have simultaneously active.
/// This also bounds the number of faults that can be declared, etc.
pub const SECTORS_MAX: u64 = 32 << 20; // PARAM_FINISH

/// The maximum number of proving partitions a miner can have simultaneously active.
pub const PARTITIONS_MAX: u64 = (SECTORS_MAX / WPOST_PARTITION_SECTORS) + WPOST_PERIOD_DEADLINES;

/// The maximum number of sectors assigned to a single deadline.
pub const DEADLINE_SECTORS_MAX: u64 =
    WPOST_PARTITION_SECTORS * (PARTITIONS_MAX / WPOST_PERIOD_DEADLINES);

/// The maximum number of new sectors that may be staged by a miner during a single proving period.
pub const NEW_SECTORS_PER_PERIOD_MAX: u64 = 128 << 10;

/// An approximation to chain state finality (should include message propagation time as well).
pub const CHAIN_FINALITYISH: ChainEpoch = 500; // PARAM_FINISH

/// Maximum duration to allow for the sealing process for seal algorithms.
/// Dependent on algorithm and sector size.
pub fn max_seal_duration(proof: RegisteredSealProof) -> Option<ChainEpoch> {
    use RegisteredSealProof::*;
    match proof {
        StackedDRG32GiBV1 | StackedDRG2KiBV1 | StackedDRG8MiBV1 | StackedDRG512MiBV1 => {
            Some(10000) // PARAM_FINISH
        }
        _ => None,
    }
}

/// Number of epochs between publishing the precommit and when the challenge for interactive
/// PoRep is drawn, used to ensure it is not predictable by miner.
pub const PRE_COMMIT_CHALLENGE_DELAY: ChainEpoch = 10;

/// Lookback from the current epoch for state view for leader elections.
pub const ELECTION_LOOKBACK: ChainEpoch = 1; // PARAM_FINISH

/// Lookback from the deadline's challenge window opening from which to sample chain randomness
/// for the challenge seed.
pub const WPOST_CHALLENGE_LOOKBACK: ChainEpoch = 20; // PARAM_FINISH

/// Minimum period before a deadline's challenge window opens that a fault must be declared for
/// that deadline. A fault declaration may appear in the challenge epoch, since it must have been
/// posted before the epoch completed, and hence before the challenge was knowable.
pub const FAULT_DECLARATION_CUTOFF: ChainEpoch = WPOST_CHALLENGE_LOOKBACK; // PARAM_FINISH

/// The maximum age of a fault before the sector is terminated.
pub const FAULT_MAX_AGE: ChainEpoch = WPOST_PROVING_PERIOD * 14 - 1;

/// Staging period for a miner worker key change.
pub const WORKER_KEY_CHANGE_DELAY: ChainEpoch = 2 * ELECTION_LOOKBACK; // PARAM_FINISH

/// Deposit per sector required at pre-commitment, refunded after the commitment is proven
/// (else burned).
pub fn precommit_deposit(sector_size: SectorSize, _duration: ChainEpoch) -> TokenAmount {
    let deposit_per_byte = TokenAmount::zero(); // PARAM_FINISH
    deposit_per_byte * (sector_size as u64)
}

/// Penalty to locked pledge collateral for the termination of a sector before scheduled expiry.
pub fn pledge_penalty_for_sector_termination(_sector: &SectorOnChainInfo) -> TokenAmount {
    TokenAmount::zero() // PARAM_FINISH
}

/// Penalty to locked pledge collateral for a "skipped" sector or missing PoSt fault.
pub fn pledge_penalty_for_sector_undeclared_fault(_sector: &SectorOnChainInfo) -> TokenAmount {
    TokenAmount::zero() // PARAM_FINISH
}

/// Penalty to locked pledge collateral for a declared or on-going sector fault.
pub fn pledge_penalty_for_sector_declared_fault(_sector: &SectorOnChainInfo) -> TokenAmount {
    TokenAmount::zero() // PARAM_FINISH
}

struct BigFrac {
    numerator: BigInt,
    denominator: BigInt,
}

lazy_static! {
    static ref CONSENSUS_FAULT_REPORTER_INITIAL_SHARE: BigFrac = BigFrac {
        // PARAM_FINISH
        numerator: BigInt::from(1),
        denominator: BigInt::from(1000),
    };
    static ref CONSENSUS_FAULT_REPORTER_SHARE_GROWTH_RATE: BigFrac = BigFrac {
        // PARAM_FINISH
        numerator: BigInt::from(101251),
        denominator: BigInt::from(100000),
    };
}

/// Specification for a linear vesting schedule.
pub struct VestSpec {
    /// Delay before any amount starts vesting.
    pub initial_delay: ChainEpoch,
    /// Period over which the total should vest, after the initial delay.
    pub vest_period: ChainEpoch,
    /// Duration between successive incremental vests (independent of vesting period).
    pub step_duration: ChainEpoch,
    /// Maximum precision of vesting table (limits cardinality of table).
    pub quantization: ChainEpoch,
}

pub const PLEDGE_VESTING_SPEC: VestSpec = VestSpec {
    initial_delay: EPOCHS_IN_YEAR,          // 1 year, PARAM_FINISH
    vest_period: EPOCHS_IN_YEAR,            // 1 year, PARAM_FINISH
    step_duration: 7 * EPOCHS_IN_DAY,       // 1 week, PARAM_FINISH
    quantization: EPOCHS_IN_DAY,            // 1 day, PARAM_FINISH
};

/// The share of a slashed miner's collateral awarded to the reporter of the fault, growing
/// with the time between fault and report and capped at half the collateral.
/// Computed in rationals to avoid precision loss.
pub fn reward_for_consensus_slash_report(
    elapsed_epoch: ChainEpoch,
    collateral: TokenAmount,
) -> TokenAmount {
    // var growthRate = SLASHER_SHARE_GROWTH_RATE_NUM / SLASHER_SHARE_GROWTH_RATE_DENOM
    // var multiplier = growthRate^elapsedEpoch
    // var slasherProportion = min(INITIAL_SLASHER_SHARE * multiplier, 0.5)
    // return collateral * slasherProportion
    let max_reporter_share_num = BigInt::from(1);
    let max_reporter_share_den = BigInt::from(2);

    let elapsed = elapsed_epoch.max(0) as u64;
    let slasher_share_numerator =
        Pow::pow(&CONSENSUS_FAULT_REPORTER_SHARE_GROWTH_RATE.numerator, elapsed);
    let slasher_share_denominator =
        Pow::pow(&CONSENSUS_FAULT_REPORTER_SHARE_GROWTH_RATE.denominator, elapsed);

    let num: BigInt = slasher_share_numerator
        * &CONSENSUS_FAULT_REPORTER_INITIAL_SHARE.numerator
        * collateral.atto();
    let denom = slasher_share_denominator * &CONSENSUS_FAULT_REPORTER_INITIAL_SHARE.denominator;

    std::cmp::min(
        TokenAmount::from_atto(num.div_floor(&denom)),
        TokenAmount::from_atto(
            (collateral.atto() * max_reporter_share_num).div_floor(&max_reporter_share_den),
        ),
    )
}
