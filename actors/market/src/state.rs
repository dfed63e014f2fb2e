// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::anyhow;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::Cbor;
use fvm_shared::address::Address;
use fvm_shared::clock::{ChainEpoch, EPOCH_UNDEFINED};
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use num_traits::Zero;

use fil_actors_runtime::{actor_error, ActorDowncast, ActorError, SetMultimap};

use crate::balance_table::BalanceTable;

use super::policy::*;
use super::types::*;
use super::{DealProposal, DealState};

/// Storage market actor state
#[derive(Clone, Default, Serialize_tuple, Deserialize_tuple, Debug)]
pub struct State {
    /// Amount locked, indexed by actor address.
    /// Note: the amounts in this table do not affect the overall amount in escrow:
    /// only the _portion_ of the total escrow amount that is locked.
    pub escrow_table: Cid,
    pub locked_table: Cid,

    /// Proposals are deals that have been proposed and not yet cleaned up after expiry or termination.
    /// Array<DealID, DealProposal>
    pub proposals: Cid,

    /// States contains state for deals that have been proposed and not yet cleaned up.
    /// Invariant: keys(States) ⊆ keys(Proposals).
    /// Array<DealID, DealState>
    pub states: Cid,

    /// Metadata cached for efficient iteration over deals.
    /// SetMultimap<Address, DealID>
    pub deal_ids_by_party: Cid,

    /// Deal id state sequential incrementer
    pub next_id: DealID,
}

impl Cbor for State {}

impl State {
    pub fn new<BS: Blockstore>(store: &BS) -> anyhow::Result<Self> {
        let empty_proposals_array =
            DealArray::<BS>::new_with_bit_width(store, PROPOSALS_AMT_BITWIDTH)
                .flush()
                .map_err(|e| anyhow!("failed to create empty proposals array: {}", e))?;
        let empty_states_array = DealMetaArray::<BS>::new_with_bit_width(store, STATES_AMT_BITWIDTH)
            .flush()
            .map_err(|e| anyhow!("failed to create empty states array: {}", e))?;

        let empty_balance_table = BalanceTable::new(store)
            .root()
            .map_err(|e| anyhow!("failed to create empty balance table map: {}", e))?;

        let empty_deal_ids_multimap = SetMultimap::new(store)
            .root()
            .map_err(|e| anyhow!("failed to create empty multiset: {}", e))?;

        Ok(Self {
            escrow_table: empty_balance_table,
            locked_table: empty_balance_table,
            proposals: empty_proposals_array,
            states: empty_states_array,
            deal_ids_by_party: empty_deal_ids_multimap,
            next_id: 0,
        })
    }

    pub(super) fn generate_storage_deal_id(&mut self) -> DealID {
        let ret = self.next_id;
        self.next_id += 1;
        ret
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Balance table operations
    ////////////////////////////////////////////////////////////////////////////////

    pub fn get_escrow_balance<BS: Blockstore>(
        &self,
        store: &BS,
        addr: &Address,
    ) -> Result<TokenAmount, ActorError> {
        let escrow_table = BalanceTable::from_root(store, &self.escrow_table)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load escrow table"))?;
        escrow_table
            .get(addr)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to get escrow balance"))
    }

    pub fn get_locked_balance<BS: Blockstore>(
        &self,
        store: &BS,
        addr: &Address,
    ) -> Result<TokenAmount, ActorError> {
        let locked_table = BalanceTable::from_root(store, &self.locked_table)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load locked table"))?;
        locked_table
            .get(addr)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to get locked balance"))
    }

    pub(super) fn add_escrow_balance<BS: Blockstore>(
        &mut self,
        store: &BS,
        addr: &Address,
        amount: &TokenAmount,
    ) -> anyhow::Result<()> {
        let mut escrow_table = BalanceTable::from_root(store, &self.escrow_table)
            .map_err(|e| e.downcast_wrap("failed to load escrow table"))?;

        escrow_table.add(addr, amount).map_err(|e| e.downcast_wrap("failed to add escrow balance"))?;

        self.escrow_table =
            escrow_table.root().map_err(|e| e.downcast_wrap("failed to flush escrow table"))?;
        Ok(())
    }

    pub(super) fn add_locked_balance<BS: Blockstore>(
        &mut self,
        store: &BS,
        addr: &Address,
        amount: &TokenAmount,
    ) -> anyhow::Result<()> {
        let mut locked_table = BalanceTable::from_root(store, &self.locked_table)
            .map_err(|e| e.downcast_wrap("failed to load locked table"))?;

        locked_table.add(addr, amount).map_err(|e| e.downcast_wrap("failed to add locked balance"))?;

        self.locked_table =
            locked_table.root().map_err(|e| e.downcast_wrap("failed to flush locked table"))?;
        Ok(())
    }

    /// Withdraws from escrow, leaving at least the locked balance behind.
    /// Returns the amount actually extracted.
    pub(super) fn withdraw_from_escrow<BS: Blockstore>(
        &mut self,
        store: &BS,
        addr: &Address,
        requested: &TokenAmount,
    ) -> Result<TokenAmount, ActorError> {
        let min_balance = self.get_locked_balance(store, addr)?;

        let mut escrow_table = BalanceTable::from_root(store, &self.escrow_table)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load escrow table"))?;

        let extracted = escrow_table.subtract_with_minimum(addr, requested, &min_balance).map_err(
            |e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to subtract from escrow table"),
        )?;

        self.escrow_table = escrow_table.root().map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to flush escrow table")
        })?;

        Ok(extracted)
    }

    /// Locks an additional amount for an address, aborting with insufficient funds
    /// if its escrow cannot cover it.
    pub(super) fn lock_balance_or_abort<BS: Blockstore>(
        &mut self,
        store: &BS,
        addr: &Address,
        amount: &TokenAmount,
    ) -> Result<(), ActorError> {
        if amount.is_negative() {
            return Err(actor_error!(illegal_state, "cannot lock negative amount {}", amount));
        }

        let escrow_balance = self.get_escrow_balance(store, addr)?;
        let prev_locked = self.get_locked_balance(store, addr)?;

        if &prev_locked + amount > escrow_balance {
            return Err(actor_error!(insufficient_funds;
                    "not enough balance to lock for addr {}: \
                    escrow balance {} < prev locked {} + amount {}",
                    addr, escrow_balance, prev_locked, amount));
        }

        self.add_locked_balance(store, addr, amount).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to add locked balance")
        })?;

        Ok(())
    }

    fn unlock_balance<BS: Blockstore>(
        &mut self,
        store: &BS,
        addr: &Address,
        amount: &TokenAmount,
    ) -> anyhow::Result<()> {
        if amount.is_negative() {
            return Err(actor_error!(illegal_state, "unlock negative amount: {}", amount).into());
        }

        let mut locked_table = BalanceTable::from_root(store, &self.locked_table)
            .map_err(|e| e.downcast_wrap("failed to load locked table"))?;

        locked_table
            .must_subtract(addr, amount)
            .map_err(|e| e.downcast_wrap("subtract from locked table failed"))?;

        self.locked_table =
            locked_table.root().map_err(|e| e.downcast_wrap("failed to flush locked table"))?;

        Ok(())
    }

    /// Moves an amount from the locked escrow of one party to the unlocked escrow of another.
    fn transfer_balance<BS: Blockstore>(
        &mut self,
        store: &BS,
        from_addr: &Address,
        to_addr: &Address,
        amount: &TokenAmount,
    ) -> Result<(), ActorError> {
        if amount.is_negative() {
            return Err(actor_error!(illegal_state, "transfer negative amount: {}", amount));
        }

        let mut escrow_table = BalanceTable::from_root(store, &self.escrow_table).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load escrow table")
        })?;

        // Subtract from locked and escrow tables
        escrow_table
            .must_subtract(from_addr, amount)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "subtract from escrow"))?;

        self.unlock_balance(store, from_addr, amount)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "subtract from locked"))?;

        // Add subtracted amount to the recipient
        escrow_table
            .add(to_addr, amount)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "add to escrow"))?;

        self.escrow_table = escrow_table.root().map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to flush escrow table")
        })?;

        Ok(())
    }

    fn slash_balance<BS: Blockstore>(
        &mut self,
        store: &BS,
        addr: &Address,
        amount: &TokenAmount,
    ) -> anyhow::Result<()> {
        if amount.is_negative() {
            return Err(actor_error!(illegal_state, "negative amount to slash: {}", amount).into());
        }

        let mut escrow_table = BalanceTable::from_root(store, &self.escrow_table)
            .map_err(|e| e.downcast_wrap("failed to load escrow table"))?;

        // Subtract from locked and escrow tables
        escrow_table
            .must_subtract(addr, amount)
            .map_err(|e| e.downcast_wrap("subtract from escrow failed"))?;

        self.escrow_table =
            escrow_table.root().map_err(|e| e.downcast_wrap("failed to flush escrow table"))?;

        self.unlock_balance(store, addr, amount)
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Deal table operations
    ////////////////////////////////////////////////////////////////////////////////

    pub fn must_get_deal<BS: Blockstore>(
        &self,
        store: &BS,
        deal_id: DealID,
    ) -> Result<DealProposal, ActorError> {
        let proposals = DealArray::load(&self.proposals, store)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load proposals"))?;

        proposals
            .get(deal_id)
            .map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to get deal proposal")
            })?
            .cloned()
            .ok_or_else(|| actor_error!(not_found, "no such deal {}", deal_id))
    }

    pub fn must_get_deal_state<BS: Blockstore>(
        &self,
        store: &BS,
        deal_id: DealID,
    ) -> Result<DealState, ActorError> {
        let states = DealMetaArray::load(&self.states, store)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load deal states"))?;

        states
            .get(deal_id)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to get deal state"))?
            .copied()
            .ok_or_else(|| actor_error!(not_found, "no state for deal {}", deal_id))
    }

    fn set_deal_state<BS: Blockstore>(
        &mut self,
        store: &BS,
        deal_id: DealID,
        state: DealState,
    ) -> Result<(), ActorError> {
        let mut states = DealMetaArray::load(&self.states, store)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load deal states"))?;

        states
            .set(deal_id, state)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to set deal state"))?;

        self.states = states
            .flush()
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to flush deal states"))?;

        Ok(())
    }

    /// Removes all record of a deal: the proposal, its state and both party index entries.
    fn delete_deal<BS: Blockstore>(
        &mut self,
        store: &BS,
        deal_id: DealID,
        deal: &DealProposal,
    ) -> Result<(), ActorError> {
        let mut proposals = DealArray::load(&self.proposals, store)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load proposals"))?;
        proposals
            .delete(deal_id)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to delete proposal"))?;
        self.proposals = proposals
            .flush()
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to flush proposals"))?;

        let mut states = DealMetaArray::load(&self.states, store)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load deal states"))?;
        states
            .delete(deal_id)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to delete deal state"))?;
        self.states = states
            .flush()
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to flush deal states"))?;

        let mut dbp = SetMultimap::from_root(store, &self.deal_ids_by_party).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load deal index")
        })?;
        dbp.remove(&deal.client, deal_id).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to drop client deal index")
        })?;
        dbp.remove(&deal.provider, deal_id).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to drop provider deal index")
        })?;
        self.deal_ids_by_party = dbp.root().map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to flush deal index")
        })?;

        Ok(())
    }

    /// Inserts a published deal: the proposal, a fresh state record, and the
    /// index entries for both parties.
    pub(super) fn put_deal<BS: Blockstore>(
        &mut self,
        store: &BS,
        deal_id: DealID,
        deal: &DealProposal,
    ) -> Result<(), ActorError> {
        let mut proposals = DealArray::load(&self.proposals, store)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load proposals"))?;
        proposals
            .set(deal_id, deal.clone())
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to set proposal"))?;
        self.proposals = proposals
            .flush()
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to flush proposals"))?;

        self.set_deal_state(
            store,
            deal_id,
            DealState {
                sector_start_epoch: EPOCH_UNDEFINED,
                last_updated_epoch: EPOCH_UNDEFINED,
                slash_epoch: EPOCH_UNDEFINED,
            },
        )?;

        let mut dbp = SetMultimap::from_root(store, &self.deal_ids_by_party).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load deal index")
        })?;
        dbp.put(&deal.client, deal_id).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to set client deal index")
        })?;
        dbp.put(&deal.provider, deal_id).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to set provider deal index")
        })?;
        self.deal_ids_by_party = dbp.root().map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to flush deal index")
        })?;

        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Deferred deal state updates
    ////////////////////////////////////////////////////////////////////////////////

    /// Executes all deferred deal-state updates for deals in which the given party
    /// participates. Returns the total amount slashed, to be burnt by the caller.
    ///
    /// The set of ids is snapshotted from the index before any mutation, so deletions
    /// performed by the updates don't perturb iteration.
    pub(super) fn update_pending_deal_states_for_party<BS: Blockstore>(
        &mut self,
        store: &BS,
        epoch: ChainEpoch,
        addr: &Address,
    ) -> Result<TokenAmount, ActorError> {
        let dbp = SetMultimap::from_root(store, &self.deal_ids_by_party).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load deal index")
        })?;

        let mut deal_ids = Vec::new();
        dbp.for_each(addr, |id| {
            deal_ids.push(id);
            Ok(())
        })
        .map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to iterate deal index")
        })?;

        self.update_pending_deal_states(store, &deal_ids, epoch)
    }

    pub(super) fn update_pending_deal_states<BS: Blockstore>(
        &mut self,
        store: &BS,
        deal_ids: &[DealID],
        epoch: ChainEpoch,
    ) -> Result<TokenAmount, ActorError> {
        let mut amount_slashed_total = TokenAmount::zero();

        for deal_id in deal_ids {
            amount_slashed_total += self.update_pending_deal_state(store, *deal_id, epoch)?;
        }

        Ok(amount_slashed_total)
    }

    /// Advances a single deal's state to the given epoch: accrues payment,
    /// applies init-timeout, termination and expiry transitions, and deletes
    /// the deal when it reaches a terminal state.
    /// Idempotent at a fixed epoch. Returns the amount slashed.
    pub(super) fn update_pending_deal_state<BS: Blockstore>(
        &mut self,
        store: &BS,
        deal_id: DealID,
        epoch: ChainEpoch,
    ) -> Result<TokenAmount, ActorError> {
        let deal = self.must_get_deal(store, deal_id)?;
        let mut state = self.must_get_deal_state(store, deal_id)?;

        let ever_updated = state.last_updated_epoch != EPOCH_UNDEFINED;
        let ever_slashed = state.slash_epoch != EPOCH_UNDEFINED;

        // if the deal was ever updated, make sure it didn't happen in the future
        if ever_updated && state.last_updated_epoch > epoch {
            return Err(actor_error!(
                illegal_state,
                "deal updated at future epoch {}",
                state.last_updated_epoch
            ));
        }

        if state.sector_start_epoch == EPOCH_UNDEFINED {
            // Deal has not been activated.
            if epoch > deal.start_epoch {
                // Activation deadline elapsed: the deal is cleaned up and the
                // provider's collateral slashed.
                return self.process_deal_init_timed_out(store, deal_id, &deal);
            }
            return Ok(TokenAmount::zero());
        }

        // Payment accrues no earlier than the nominal start, and resumes from the
        // last settlement.
        let mut payment_start = std::cmp::max(deal.start_epoch, state.sector_start_epoch);
        if ever_updated && state.last_updated_epoch > payment_start {
            payment_start = state.last_updated_epoch;
        }

        if ever_slashed {
            if epoch < state.slash_epoch {
                return Err(actor_error!(
                    illegal_state,
                    "current epoch less than deal slash epoch {}",
                    state.slash_epoch
                ));
            }
            if state.slash_epoch > deal.end_epoch {
                return Err(actor_error!(
                    illegal_state,
                    "deal slash epoch {} after deal end {}",
                    state.slash_epoch,
                    deal.end_epoch
                ));
            }

            let payment_end = std::cmp::max(state.slash_epoch, payment_start);
            let elapsed = payment_end - payment_start;
            if elapsed > 0 {
                let total_payment = &deal.storage_price_per_epoch * elapsed;
                self.transfer_balance(store, &deal.client, &deal.provider, &total_payment)?;
            }

            return self.process_deal_slashed(store, deal_id, &deal, &state);
        }

        let payment_end = std::cmp::min(deal.end_epoch, epoch);
        if payment_end > payment_start {
            let total_payment = &deal.storage_price_per_epoch * (payment_end - payment_start);
            self.transfer_balance(store, &deal.client, &deal.provider, &total_payment)?;
        }

        if epoch >= deal.end_epoch {
            self.process_deal_expired(store, deal_id, &deal, &state)?;
            return Ok(TokenAmount::zero());
        }

        state.last_updated_epoch = epoch;
        self.set_deal_state(store, deal_id, state)?;

        Ok(TokenAmount::zero())
    }

    /// Deal start deadline elapsed without appearing in a proven sector.
    /// Slash provider collateral, and unlock the remaining collaterals for both
    /// provider and client.
    pub(super) fn process_deal_init_timed_out<BS: Blockstore>(
        &mut self,
        store: &BS,
        deal_id: DealID,
        deal: &DealProposal,
    ) -> Result<TokenAmount, ActorError> {
        self.unlock_balance(store, &deal.client, &deal.client_balance_requirement()).map_err(
            |e| {
                e.downcast_default(
                    ExitCode::USR_ILLEGAL_STATE,
                    "failure unlocking client balance requirement",
                )
            },
        )?;

        let amount_slashed =
            collateral_penalty_for_deal_activation_missed(deal.provider_collateral.clone());
        let amount_remaining = deal.provider_balance_requirement() - &amount_slashed;

        self.slash_balance(store, &deal.provider, &amount_slashed).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to slash balance")
        })?;

        self.unlock_balance(store, &deal.provider, &amount_remaining).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to unlock deal provider balance")
        })?;

        self.delete_deal(store, deal_id, deal)?;

        Ok(amount_slashed)
    }

    /// Deal was terminated before its scheduled end: unlock the client's unpaid
    /// storage fee and collateral, slash the provider's collateral.
    fn process_deal_slashed<BS: Blockstore>(
        &mut self,
        store: &BS,
        deal_id: DealID,
        deal: &DealProposal,
        state: &DealState,
    ) -> Result<TokenAmount, ActorError> {
        let payment_remaining = deal_get_payment_remaining(deal, state.slash_epoch)?;
        self.unlock_balance(store, &deal.client, &payment_remaining).map_err(|e| {
            e.downcast_default(
                ExitCode::USR_ILLEGAL_STATE,
                "failed to unlock remaining client storage fee",
            )
        })?;

        self.unlock_balance(store, &deal.client, &deal.client_collateral).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to unlock client collateral")
        })?;

        let slashed = deal.provider_collateral.clone();
        self.slash_balance(store, &deal.provider, &slashed)
            .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "slashing balance"))?;

        self.delete_deal(store, deal_id, deal)?;

        Ok(slashed)
    }

    /// Normal expiration. Unlock collaterals for both miner and client.
    fn process_deal_expired<BS: Blockstore>(
        &mut self,
        store: &BS,
        deal_id: DealID,
        deal: &DealProposal,
        state: &DealState,
    ) -> Result<(), ActorError> {
        if state.sector_start_epoch == EPOCH_UNDEFINED {
            return Err(actor_error!(illegal_state, "start sector epoch undefined"));
        }

        self.unlock_balance(store, &deal.provider, &deal.provider_collateral).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed unlocking deal provider balance")
        })?;

        self.unlock_balance(store, &deal.client, &deal.client_collateral).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed unlocking deal client balance")
        })?;

        self.delete_deal(store, deal_id, deal)
    }
}

fn deal_get_payment_remaining(
    deal: &DealProposal,
    mut slash_epoch: ChainEpoch,
) -> Result<TokenAmount, ActorError> {
    if slash_epoch > deal.end_epoch {
        return Err(actor_error!(
            illegal_state,
            "deal slash epoch {} after end epoch {}",
            slash_epoch,
            deal.end_epoch
        ));
    }

    // Payments are always for start -> end epoch irrespective of when the deal is slashed.
    slash_epoch = std::cmp::max(slash_epoch, deal.start_epoch);

    let duration_remaining = deal.end_epoch - slash_epoch;
    if duration_remaining < 0 {
        return Err(actor_error!(
            illegal_state,
            "deal remaining duration negative: {}",
            duration_remaining
        ));
    }

    Ok(&deal.storage_price_per_epoch * duration_remaining)
}
