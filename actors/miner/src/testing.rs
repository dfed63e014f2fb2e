// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_bitfield::BitField;
use fvm_ipld_blockstore::Blockstore;
use fvm_shared::econ::TokenAmount;
use num_traits::Zero;

use fil_actors_runtime::{make_map_with_root, parse_uint_key, MessageAccumulator};

use crate::{
    SectorPreCommitOnChainInfo, State, NEW_SECTORS_PER_PERIOD_MAX, SECTORS_MAX,
    WPOST_PERIOD_DEADLINES,
};

pub struct StateSummary {
    pub sector_count: u64,
    pub vesting_total: TokenAmount,
}

/// Checks the invariants of the miner actor's state: containment between the
/// sector-indexed collections, the fault/recovery subset chain, and vesting
/// totals matching the locked funds counter.
pub fn check_state_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
    balance: &TokenAmount,
) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();

    acc.require(
        !state.pre_commit_deposits.is_negative(),
        &format!("negative precommit deposits {}", state.pre_commit_deposits),
    );
    acc.require(
        !state.locked_funds.is_negative(),
        &format!("negative locked funds {}", state.locked_funds),
    );
    acc.require(
        balance >= &(&state.pre_commit_deposits + &state.locked_funds),
        &format!(
            "balance {balance} below locked funds {} + precommit deposits {}",
            state.locked_funds, state.pre_commit_deposits
        ),
    );

    // vesting table total must match locked funds
    let mut vesting_total = TokenAmount::zero();
    let vesting = fil_actors_runtime::Array::<TokenAmount, BS>::load(&state.vesting_funds, store);
    match vesting {
        Ok(vesting) => {
            let ret = vesting.for_each(|_, amount| {
                vesting_total += amount;
                Ok(())
            });
            acc.require_no_error(ret, "error iterating vesting funds");
            acc.require(
                vesting_total == state.locked_funds,
                &format!(
                    "vesting table total {vesting_total} does not equal locked funds {}",
                    state.locked_funds
                ),
            );
        }
        Err(e) => acc.add(&format!("error loading vesting funds: {e}")),
    }

    // precommit deposits must equal the sum over outstanding precommitments
    let mut deposit_total = TokenAmount::zero();
    match make_map_with_root::<_, SectorPreCommitOnChainInfo>(&state.pre_committed_sectors, store)
    {
        Ok(precommitted) => {
            let ret = precommitted.for_each(|key, precommit| {
                let sector_number = parse_uint_key(key)?;
                if precommit.info.sector_number != sector_number {
                    anyhow::bail!(
                        "precommit for {} stored under key {}",
                        precommit.info.sector_number,
                        sector_number
                    );
                }
                deposit_total += &precommit.pre_commit_deposit;
                Ok(())
            });
            acc.require_no_error(ret, "error iterating precommitted sectors");
            acc.require(
                deposit_total == state.pre_commit_deposits,
                &format!(
                    "precommit deposit total {deposit_total} does not equal counter {}",
                    state.pre_commit_deposits
                ),
            );
        }
        Err(e) => acc.add(&format!("error loading precommitted sectors: {e}")),
    }

    // all sector numbers, for containment checks
    let mut all_sectors = BitField::new();
    let mut sector_count = 0u64;
    match fil_actors_runtime::Array::<crate::SectorOnChainInfo, BS>::load(&state.sectors, store) {
        Ok(sectors) => {
            let ret = sectors.for_each(|sector_number, sector| {
                all_sectors.set(sector_number);
                sector_count += 1;
                if sector.info.sector_number != sector_number {
                    anyhow::bail!(
                        "sector {} stored under key {}",
                        sector.info.sector_number,
                        sector_number
                    );
                }
                Ok(())
            });
            acc.require_no_error(ret, "error iterating sectors");
        }
        Err(e) => acc.add(&format!("error loading sectors: {e}")),
    }

    // Keys(Sectors) == union(SectorExpirations.Values())
    let mut expiring_sectors = BitField::new();
    let ret = state.for_each_sector_expiration(store, |_, sectors| {
        expiring_sectors |= sectors;
        Ok(())
    });
    acc.require_no_error(ret, "error iterating sector expirations");
    acc.require(
        expiring_sectors == all_sectors,
        "sector expiration index does not cover exactly the sector set",
    );

    // Recoveries ⊆ Faults ⊆ Keys(Sectors)
    acc.require(all_sectors.contains_all(&state.faults), "faults not contained in sectors");
    acc.require(state.faults.contains_all(&state.recoveries), "recoveries not contained in faults");

    // Faults == union(FaultEpochs.Values())
    let mut epoch_faults = BitField::new();
    let ret = state.for_each_fault_epoch(store, |_, faults| {
        epoch_faults |= faults;
        Ok(())
    });
    acc.require_no_error(ret, "error iterating fault epochs");
    acc.require(epoch_faults == state.faults, "fault epochs do not cover exactly the fault set");

    acc.require(
        state.new_sectors.len() <= NEW_SECTORS_PER_PERIOD_MAX,
        "too many new sectors staged",
    );
    acc.require(state.faults.len() <= SECTORS_MAX, "too many faults");

    match state.load_deadlines(store) {
        Ok(deadlines) => {
            acc.require(
                deadlines.due.len() as u64 == WPOST_PERIOD_DEADLINES,
                &format!("deadlines has {} entries", deadlines.due.len()),
            );
            for due in &deadlines.due {
                acc.require(
                    all_sectors.contains_all(due),
                    "deadline sectors not contained in sector set",
                );
            }
        }
        Err(e) => acc.add(&format!("error loading deadlines: {e}")),
    }

    (StateSummary { sector_count, vesting_total }, acc)
}
