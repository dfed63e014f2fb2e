// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::clock::ChainEpoch;

use fil_actors_runtime::{actor_error, ActorError};

use super::policy::*;
use super::state::Deadlines;

/// Deadline calculations with respect to a current epoch.
/// "Deadline" refers to the window during which proofs may be submitted.
/// Windows are non-overlapping ranges [Open, Close), but the challenge epoch for a window occurs
/// before the window opens.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct DeadlineInfo {
    /// Epoch at which this info was calculated.
    pub current_epoch: ChainEpoch,
    /// First epoch of the proving period (<= CurrentEpoch).
    pub period_start: ChainEpoch,
    /// Current deadline index, in [0..WPoStPeriodDeadlines).
    pub index: u64,
    /// First epoch from which a proof may be submitted (>= CurrentEpoch).
    pub open: ChainEpoch,
    /// First epoch from which a proof may no longer be submitted (>= Open).
    pub close: ChainEpoch,
    /// Epoch at which to sample the chain for challenge (< Open).
    pub challenge: ChainEpoch,
    /// First epoch at which a fault declaration is rejected (< Open).
    pub fault_cutoff: ChainEpoch,
}

impl DeadlineInfo {
    /// The last epoch in the proving period.
    pub fn period_end(&self) -> ChainEpoch {
        self.period_start + WPOST_PROVING_PERIOD - 1
    }

    /// The first epoch in the next proving period.
    pub fn next_period_start(&self) -> ChainEpoch {
        self.period_start + WPOST_PROVING_PERIOD
    }

    /// Whether the current deadline is currently open.
    pub fn is_open(&self) -> bool {
        self.current_epoch >= self.open && self.current_epoch < self.close
    }

    /// Whether the current deadline has already closed.
    pub fn has_elapsed(&self) -> bool {
        self.current_epoch >= self.close
    }

    /// Whether the deadline's fault cutoff has passed.
    pub fn fault_cutoff_passed(&self) -> bool {
        self.current_epoch >= self.fault_cutoff
    }
}

/// Computes the deadline index and window for `curr_epoch` within the proving period anchored
/// at `period_boundary`. The period start is the greatest epoch <= `curr_epoch` congruent to the
/// boundary modulo the proving period; it may be negative during the miner's first period.
pub fn compute_proving_period_deadline(
    period_boundary: ChainEpoch,
    curr_epoch: ChainEpoch,
) -> DeadlineInfo {
    let period_start = if curr_epoch < period_boundary {
        period_boundary - WPOST_PROVING_PERIOD
    } else {
        period_boundary + ((curr_epoch - period_boundary) / WPOST_PROVING_PERIOD) * WPOST_PROVING_PERIOD
    };

    let index = ((curr_epoch - period_start) / WPOST_CHALLENGE_WINDOW) as u64;
    let open = period_start + (index as i64) * WPOST_CHALLENGE_WINDOW;

    DeadlineInfo {
        current_epoch: curr_epoch,
        period_start,
        index,
        open,
        close: open + WPOST_CHALLENGE_WINDOW,
        challenge: open - WPOST_CHALLENGE_LOOKBACK,
        fault_cutoff: open - FAULT_DECLARATION_CUTOFF,
    }
}

/// Computes the first partition index and number of sectors for a deadline.
/// Partitions are numbered globally for the miner, not per-deadline.
pub fn partitions_for_deadline(
    deadlines: &Deadlines,
    deadline_idx: u64,
) -> Result<(u64, u64), ActorError> {
    if deadline_idx >= WPOST_PERIOD_DEADLINES {
        return Err(actor_error!(
            illegal_argument,
            "invalid deadline index {} of {}",
            deadline_idx,
            WPOST_PERIOD_DEADLINES
        ));
    }

    let mut partition_count_so_far = 0;
    for i in 0..WPOST_PERIOD_DEADLINES {
        let sector_count = deadlines.due[i as usize].len();
        if i == deadline_idx {
            return Ok((partition_count_so_far, sector_count));
        }
        partition_count_so_far += deadline_partition_count(sector_count);
    }
    unreachable!()
}

/// The number of partitions needed to prove a number of sectors.
pub fn deadline_partition_count(sector_count: u64) -> u64 {
    (sector_count + WPOST_PARTITION_SECTORS - 1) / WPOST_PARTITION_SECTORS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_bounds_hold_for_any_epoch() {
        for boundary in [0, 1, WPOST_PROVING_PERIOD / 2, WPOST_PROVING_PERIOD - 1] {
            for epoch in [0, 1, boundary, boundary + 1, 5 * WPOST_PROVING_PERIOD + 7] {
                let d = compute_proving_period_deadline(boundary, epoch);
                assert!(d.period_start <= epoch);
                assert!(epoch < d.period_start + WPOST_PROVING_PERIOD);
                assert!(d.index < WPOST_PERIOD_DEADLINES);
                assert!(d.open <= epoch && epoch < d.close);
                assert_eq!(d.period_end(), d.period_start + WPOST_PROVING_PERIOD - 1);
            }
        }
    }

    #[test]
    fn first_period_starts_before_genesis() {
        let boundary = 100;
        let d = compute_proving_period_deadline(boundary, 0);
        assert_eq!(boundary - WPOST_PROVING_PERIOD, d.period_start);
        assert_eq!(boundary - 1, d.period_end());
    }
}
