// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::{BTreeMap, BTreeSet};

use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::Address;
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;
use num_traits::Zero;

use fil_actors_runtime::{MessageAccumulator, SetMultimap};

use crate::balance_table::BalanceTable;
use crate::{DealArray, DealMetaArray, State};

pub struct StateSummary {
    pub deal_count: u64,
    pub escrow_total: TokenAmount,
    pub locked_total: TokenAmount,
}

/// Checks the invariants of the market actor's state: balance-table ordering,
/// key containment between proposals and states, and the party index being an
/// exact mirror of the proposals.
pub fn check_state_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();

    let mut escrow_total = TokenAmount::zero();
    let mut locked_total = TokenAmount::zero();

    // escrow and locked tables
    let escrow_table = BalanceTable::from_root(store, &state.escrow_table);
    let locked_table = BalanceTable::from_root(store, &state.locked_table);
    match (escrow_table, locked_table) {
        (Ok(escrow_table), Ok(locked_table)) => {
            let ret = escrow_table.0.for_each(|key, escrow| {
                let address = Address::from_bytes(key)?;
                let locked = locked_table.get(&address)?;

                acc.require(
                    !escrow.is_negative(),
                    &format!("escrow balance for {address} is negative: {escrow}"),
                );
                acc.require(
                    locked <= *escrow,
                    &format!("locked {locked} exceeds escrow {escrow} for {address}"),
                );

                escrow_total += escrow;
                locked_total += &locked;
                Ok(())
            });
            acc.require_no_error(ret, "error iterating escrow table");
        }
        (escrow_table, locked_table) => {
            acc.require_no_error(escrow_table.map(|_| ()), "error loading escrow table");
            acc.require_no_error(locked_table.map(|_| ()), "error loading locked table");
        }
    }

    // proposals
    let mut proposal_stats = BTreeMap::<DealID, (Address, Address)>::new();
    let mut deal_count = 0u64;
    match DealArray::load(&state.proposals, store) {
        Ok(proposals) => {
            let ret = proposals.for_each(|deal_id, proposal| {
                acc.require(
                    deal_id < state.next_id,
                    &format!("deal id {deal_id} >= next id {}", state.next_id),
                );
                proposal_stats.insert(deal_id, (proposal.client, proposal.provider));
                deal_count += 1;
                Ok(())
            });
            acc.require_no_error(ret, "error iterating proposals");
        }
        Err(e) => acc.add(&format!("error loading proposals: {e}")),
    };

    // deal states
    match DealMetaArray::load(&state.states, store) {
        Ok(states) => {
            let ret = states.for_each(|deal_id, _state| {
                acc.require(
                    proposal_stats.contains_key(&deal_id),
                    &format!("deal state {deal_id} has no corresponding proposal"),
                );
                Ok(())
            });
            acc.require_no_error(ret, "error iterating deal states");
        }
        Err(e) => acc.add(&format!("error loading deal states: {e}")),
    }

    // deal ids by party mirror the proposals exactly
    let mut indexed_ids = BTreeMap::<DealID, BTreeSet<Vec<u8>>>::new();
    match SetMultimap::from_root(store, &state.deal_ids_by_party) {
        Ok(dbp) => {
            let ret = dbp.0.for_each(|key, deal_ids| {
                // the outer key must parse as an address
                acc.require_no_error(
                    Address::from_bytes(key),
                    &format!("deal index key {key:?} is not a valid address"),
                );

                for id in deal_ids.iter() {
                    indexed_ids.entry(id).or_default().insert(key.to_vec());
                }
                Ok(())
            });
            acc.require_no_error(ret, "error iterating deal index");
        }
        Err(e) => acc.add(&format!("error loading deal index: {e}")),
    }

    for (deal_id, (client, provider)) in &proposal_stats {
        let parties = indexed_ids.get(deal_id);
        match parties {
            Some(parties) => {
                acc.require(
                    parties.contains(&client.to_bytes()),
                    &format!("deal {deal_id} not indexed under client {client}"),
                );
                acc.require(
                    parties.contains(&provider.to_bytes()),
                    &format!("deal {deal_id} not indexed under provider {provider}"),
                );
            }
            None => acc.add(&format!("deal {deal_id} missing from party index")),
        }
    }
    for deal_id in indexed_ids.keys() {
        acc.require(
            proposal_stats.contains_key(deal_id),
            &format!("indexed deal {deal_id} has no proposal"),
        );
    }

    (StateSummary { deal_count, escrow_total, locked_total }, acc)
}
