// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::bigint::BigInt;
use fvm_shared::clock::EPOCH_UNDEFINED;
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::piece::PieceInfo;
use fvm_shared::sector::StoragePower;
use fvm_shared::{MethodNum, METHOD_CONSTRUCTOR, METHOD_SEND};
use num_derive::FromPrimitive;
use num_traits::{FromPrimitive, Zero};

use fil_actors_runtime::cbor::{deserialize_params, serialize};
use fil_actors_runtime::runtime::{ActorCode, Runtime, Type};
use fil_actors_runtime::{
    actor_error, request_miner_control_addrs, ActorDowncast, ActorError, BURNT_FUNDS_ACTOR_ADDR,
    CALLER_TYPES_SIGNABLE, SYSTEM_ACTOR_ADDR, VERIFIED_REGISTRY_ACTOR_ADDR,
};

use self::policy::*;

pub use self::deal::*;
pub use self::state::*;
pub use self::types::*;

// exports for testing
pub mod balance_table;
#[doc(hidden)]
pub mod ext;
pub mod policy;
pub mod testing;

mod deal;
mod state;
mod types;

/// Market actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    AddBalance = 2,
    WithdrawBalance = 3,
    HandleExpiredDeals = 4,
    PublishStorageDeals = 5,
    VerifyDealsOnSectorProveCommit = 6,
    OnMinerSectorsTerminate = 7,
    ComputeDataCommitment = 8,
    HandleInitTimeoutDeals = 9,
}

/// Market Actor
pub struct Actor;

impl Actor {
    pub fn constructor<BS, RT>(rt: &mut RT) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;

        let st = State::new(rt.store()).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to create market state")
        })?;
        rt.create(&st)?;
        Ok(())
    }

    /// Deposits the received value into the balance held in escrow.
    fn add_balance<BS, RT>(rt: &mut RT, provider_or_client: Address) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        let (nominal, _) = escrow_address(rt, &provider_or_client)?;

        let msg_value = rt.message().value_received();

        rt.transaction(|st: &mut State, rt| {
            st.add_escrow_balance(rt.store(), &nominal, &msg_value).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "adding to escrow table")
            })?;

            // ensure there is an entry in the locked table
            st.add_locked_balance(rt.store(), &nominal, &TokenAmount::zero()).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_ARGUMENT, "adding to locked table")
            })?;

            Ok(())
        })?;

        Ok(())
    }

    /// Attempt to withdraw the specified amount from the balance held in escrow.
    /// If less than the specified amount is available, yields the entire available balance.
    fn withdraw_balance<BS, RT>(rt: &mut RT, params: WithdrawBalanceParams) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        if params.amount.is_negative() {
            return Err(actor_error!(illegal_argument, "negative amount: {}", params.amount));
        }

        let (nominal, recipient) = escrow_address(rt, &params.provider_or_client)?;

        let mut amount_slashed_total = TokenAmount::zero();
        let amount_extracted = rt.transaction(|st: &mut State, rt| {
            // Before any operations that check the balance tables for funds, execute all deferred
            // deal state updates.
            amount_slashed_total +=
                st.update_pending_deal_states_for_party(rt.store(), rt.curr_epoch(), &nominal)?;

            st.withdraw_from_escrow(rt.store(), &nominal, &params.amount)
        })?;

        if amount_slashed_total.is_positive() {
            log::info!("burning {} slashed during deferred updates", amount_slashed_total);
            rt.send(BURNT_FUNDS_ACTOR_ADDR, METHOD_SEND, RawBytes::default(), amount_slashed_total)
                .map_err(|e| e.wrap("failed to burn slashed funds"))?;
        }

        rt.send(recipient, METHOD_SEND, RawBytes::default(), amount_extracted)
            .map_err(|e| e.wrap("failed to send funds"))?;

        Ok(())
    }

    /// Publish a new set of storage deals (not yet included in a sector).
    fn publish_storage_deals<BS, RT>(
        rt: &mut RT,
        params: PublishStorageDealsParams,
    ) -> Result<PublishStorageDealsReturn, ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        // Deal message must have a From field identical to the provider of all the deals.
        // This allows us to retain and verify only the client's signature in each deal proposal itself.
        rt.validate_immediate_caller_type(CALLER_TYPES_SIGNABLE)?;
        if params.deals.is_empty() {
            return Err(actor_error!(illegal_argument, "empty deals parameter"));
        }

        // All deals should have the same provider so get worker once
        let provider_raw = params.deals[0].proposal.provider;
        let provider = rt.resolve_address(&provider_raw).ok_or_else(|| {
            actor_error!(not_found, "failed to resolve provider address {}", provider_raw)
        })?;

        let (_, worker) = request_miner_control_addrs(rt, provider)?;
        if worker != rt.message().caller() {
            return Err(actor_error!(forbidden, "caller is not provider {}", provider));
        }

        for deal in &params.deals {
            // Check VerifiedClient allowed cap and deduct PieceSize from cap.
            // Either the DealSize is within the available DataCap of the VerifiedClient
            // or this message will fail. We do not allow a deal that is partially verified.
            if deal.proposal.verified_deal {
                rt.send(
                    VERIFIED_REGISTRY_ACTOR_ADDR,
                    ext::verifreg::USE_BYTES_METHOD,
                    serialize(
                        &ext::verifreg::UseBytesParams {
                            address: deal.proposal.client,
                            deal_size: StoragePower::from(deal.proposal.piece_size.0),
                        },
                        "use bytes params",
                    )?,
                    TokenAmount::zero(),
                )
                .map_err(|e| {
                    e.wrap(format!(
                        "failed to add verified deal for client: {}",
                        deal.proposal.client
                    ))
                })?;
            }
        }

        let mut amount_slashed_total = TokenAmount::zero();
        let mut new_deal_ids: Vec<DealID> = Vec::with_capacity(params.deals.len());

        rt.transaction(|st: &mut State, rt| {
            // All storage proposals will be added in an atomic transaction; this operation will be
            // unrolled if any of them fails.
            for mut deal in params.deals {
                validate_deal(rt, &deal)?;

                if deal.proposal.provider != provider && deal.proposal.provider != provider_raw {
                    return Err(actor_error!(
                        illegal_argument,
                        "cannot publish deals from different providers at the same time"
                    ));
                }

                let client = rt.resolve_address(&deal.proposal.client).ok_or_else(|| {
                    actor_error!(
                        not_found,
                        "failed to resolve client address {}",
                        deal.proposal.client
                    )
                })?;
                // Normalise provider and client addresses in the proposal stored on chain
                // (after signature verification).
                deal.proposal.provider = provider;
                deal.proposal.client = client;

                // Before any operations that check the balance tables for funds, execute all
                // deferred deal state updates.
                //
                // Note: as an optimization, implementations may cache efficient data structures
                // indicating which of the following set of updates are redundant and can be skipped.
                amount_slashed_total += st.update_pending_deal_states_for_party(
                    rt.store(),
                    rt.curr_epoch(),
                    &client,
                )?;
                amount_slashed_total += st.update_pending_deal_states_for_party(
                    rt.store(),
                    rt.curr_epoch(),
                    &provider,
                )?;

                st.lock_balance_or_abort(
                    rt.store(),
                    &client,
                    &deal.proposal.client_balance_requirement(),
                )?;
                st.lock_balance_or_abort(
                    rt.store(),
                    &provider,
                    deal.proposal.provider_balance_requirement(),
                )?;

                let id = st.generate_storage_deal_id();
                st.put_deal(rt.store(), id, &deal.proposal)?;

                new_deal_ids.push(id);
            }
            Ok(())
        })?;

        rt.send(BURNT_FUNDS_ACTOR_ADDR, METHOD_SEND, RawBytes::default(), amount_slashed_total)
            .map_err(|e| e.wrap("failed to burn funds"))?;

        Ok(PublishStorageDealsReturn { ids: new_deal_ids })
    }

    /// Verify that a given set of storage deals is valid for a sector currently being ProveCommitted,
    /// update the market's internal state accordingly, and return DealWeight of the set of storage
    /// deals given.
    /// Note: in the case of a capacity-commitment sector (one with zero deals), this function
    /// should succeed vacuously.
    fn verify_deals_on_sector_prove_commit<BS, RT>(
        rt: &mut RT,
        params: VerifyDealsOnSectorProveCommitParams,
    ) -> Result<VerifyDealsOnSectorProveCommitReturn, ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Miner))?;
        let miner_addr = rt.message().caller();

        let mut total_deal_space_time = BigInt::zero();
        let mut total_verified_deal_space_time = BigInt::zero();

        rt.transaction(|st: &mut State, rt| {
            // if there are no deal ids, it is a CommittedCapacity sector
            // and the totalDealSpaceTime should be zero
            let curr_epoch = rt.curr_epoch();
            for deal_id in &params.deal_ids {
                let proposal = st.must_get_deal(rt.store(), *deal_id)?;
                let mut state = st.must_get_deal_state(rt.store(), *deal_id)?;

                validate_deal_can_activate(
                    curr_epoch,
                    &miner_addr,
                    params.sector_expiry,
                    &state,
                    &proposal,
                )?;

                state.sector_start_epoch = curr_epoch;
                st.set_deal_state(rt.store(), *deal_id, state)?;

                // Compute deal weight
                let deal_space_time =
                    BigInt::from(proposal.piece_size.0) * BigInt::from(proposal.duration());
                if proposal.verified_deal {
                    total_verified_deal_space_time += deal_space_time;
                } else {
                    total_deal_space_time += deal_space_time;
                }
            }
            Ok(())
        })?;

        Ok(VerifyDealsOnSectorProveCommitReturn {
            deal_weight: total_deal_space_time,
            verified_deal_weight: total_verified_deal_space_time,
        })
    }

    fn compute_data_commitment<BS, RT>(
        rt: &mut RT,
        params: ComputeDataCommitmentParams,
    ) -> Result<Cid, ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Miner))?;

        let st: State = rt.state()?;
        let mut pieces: Vec<PieceInfo> = Vec::with_capacity(params.deal_ids.len());
        for deal_id in &params.deal_ids {
            let deal = st.must_get_deal(rt.store(), *deal_id)?;
            pieces.push(PieceInfo { cid: deal.piece_cid, size: deal.piece_size });
        }

        let commd = rt.compute_unsealed_sector_cid(params.sector_type, &pieces).map_err(
            |e| actor_error!(illegal_argument; "failed to compute unsealed sector CID: {}", e),
        )?;

        Ok(commd)
    }

    /// Terminate a set of deals in response to their containing sector being terminated.
    /// Slashing is deferred: this only records the slash epoch against each deal,
    /// to be processed by a later deal-state update.
    fn on_miner_sectors_terminate<BS, RT>(
        rt: &mut RT,
        params: OnMinerSectorsTerminateParams,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Miner))?;
        let miner_addr = rt.message().caller();

        rt.transaction(|st: &mut State, rt| {
            for deal_id in &params.deal_ids {
                let deal = st.must_get_deal(rt.store(), *deal_id)?;
                if deal.provider != miner_addr {
                    return Err(actor_error!(
                        forbidden,
                        "caller {} is not the provider {} of deal {}",
                        miner_addr,
                        deal.provider,
                        deal_id
                    ));
                }

                let mut state = st.must_get_deal_state(rt.store(), *deal_id)?;

                // Note: balance transfers are not performed here, but rather deferred
                // until the deal's next state update processes the slash epoch.
                state.slash_epoch = rt.curr_epoch();
                st.set_deal_state(rt.store(), *deal_id, state)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn handle_expired_deals<BS, RT>(
        rt: &mut RT,
        params: HandleExpiredDealsParams,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_type(CALLER_TYPES_SIGNABLE)?;

        let slashed = rt.transaction(|st: &mut State, rt| {
            st.update_pending_deal_states(rt.store(), &params.deals, rt.curr_epoch())
        })?;

        // TODO: award some small portion of slashed to caller as incentive

        rt.send(BURNT_FUNDS_ACTOR_ADDR, METHOD_SEND, RawBytes::default(), slashed)
            .map_err(|e| e.wrap("failed to burn funds"))?;
        Ok(())
    }

    fn handle_init_timeout_deals<BS, RT>(
        rt: &mut RT,
        params: HandleInitTimeoutDealsParams,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_type(CALLER_TYPES_SIGNABLE)?;

        let mut verified_deals: Vec<DealProposal> = Vec::new();
        let slashed_amount = rt.transaction(|st: &mut State, rt| {
            let mut slashed = TokenAmount::zero();
            for deal_id in &params.deals {
                let deal = st.must_get_deal(rt.store(), *deal_id)?;
                let state = st.must_get_deal_state(rt.store(), *deal_id)?;

                // Deal has not been activated.
                if state.sector_start_epoch == EPOCH_UNDEFINED {
                    // Now is after StartEpoch when the Deal should have been activated, hence clean up.
                    if rt.curr_epoch() > deal.start_epoch {
                        // Store VerifiedDeal to restore bytes for VerifiedClient.
                        if deal.verified_deal {
                            verified_deals.push(deal.clone());
                        }
                        slashed += st.process_deal_init_timed_out(rt.store(), *deal_id, &deal)?;
                    } else {
                        // All deals must have timed out.
                        return Err(actor_error!(
                            illegal_argument,
                            "not all deals have timed out: {}",
                            deal_id
                        ));
                    }
                }
            }
            Ok(slashed)
        })?;

        // TODO: award some small portion of slashed to caller as incentive

        // Restore verified dataset allowance for verified clients.
        for deal in &verified_deals {
            rt.send(
                VERIFIED_REGISTRY_ACTOR_ADDR,
                ext::verifreg::RESTORE_BYTES_METHOD,
                serialize(
                    &ext::verifreg::RestoreBytesParams {
                        address: deal.client,
                        deal_size: StoragePower::from(deal.piece_size.0),
                    },
                    "restore bytes params",
                )?,
                TokenAmount::zero(),
            )
            .map_err(|e| {
                e.wrap(format!("failed to restore bytes for verified client: {}", deal.client))
            })?;
        }

        rt.send(BURNT_FUNDS_ACTOR_ADDR, METHOD_SEND, RawBytes::default(), slashed_amount)
            .map_err(|e| e.wrap("failed to burn funds"))?;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Checks
////////////////////////////////////////////////////////////////////////////////

fn validate_deal_can_activate(
    curr_epoch: fvm_shared::clock::ChainEpoch,
    miner_addr: &Address,
    sector_expiration: fvm_shared::clock::ChainEpoch,
    state: &DealState,
    proposal: &DealProposal,
) -> Result<(), ActorError> {
    if &proposal.provider != miner_addr {
        return Err(actor_error!(illegal_argument, "deal has incorrect miner as its provider"));
    }

    if state.sector_start_epoch != EPOCH_UNDEFINED {
        return Err(actor_error!(illegal_argument, "deal has already appeared in proven sector"));
    }

    if curr_epoch > proposal.start_epoch {
        return Err(actor_error!(illegal_argument, "deal start epoch has already elapsed"));
    }

    if proposal.end_epoch > sector_expiration {
        return Err(actor_error!(illegal_argument, "deal would outlive its containing sector"));
    }

    Ok(())
}

fn validate_deal<BS, RT>(rt: &RT, deal: &ClientDealProposal) -> Result<(), ActorError>
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    deal_proposal_is_internally_valid(rt, deal)?;

    let proposal = &deal.proposal;

    if proposal.label.len() > detail::DEAL_MAX_LABEL_SIZE {
        return Err(actor_error!(
            illegal_argument,
            "deal label can be at most {} bytes, is {}",
            detail::DEAL_MAX_LABEL_SIZE,
            proposal.label.len()
        ));
    }

    if rt.curr_epoch() > proposal.start_epoch {
        return Err(actor_error!(illegal_argument, "deal start epoch has already elapsed"));
    }

    let (min_duration, max_duration) = deal_duration_bounds(proposal.piece_size);
    if proposal.duration() < min_duration || proposal.duration() > max_duration {
        return Err(actor_error!(illegal_argument, "deal duration out of bounds"));
    }

    let (min_price, max_price) =
        deal_price_per_epoch_bounds(proposal.piece_size, proposal.duration());
    if proposal.storage_price_per_epoch < min_price || &proposal.storage_price_per_epoch > max_price
    {
        return Err(actor_error!(illegal_argument, "storage price out of bounds"));
    }

    let (min_provider_collateral, max_provider_collateral) =
        deal_provider_collateral_bounds(proposal.piece_size, proposal.duration());
    if proposal.provider_collateral < min_provider_collateral
        || &proposal.provider_collateral > max_provider_collateral
    {
        return Err(actor_error!(illegal_argument, "provider collateral out of bounds"));
    }

    let (min_client_collateral, max_client_collateral) =
        deal_client_collateral_bounds(proposal.piece_size, proposal.duration());
    if proposal.client_collateral < min_client_collateral
        || &proposal.client_collateral > max_client_collateral
    {
        return Err(actor_error!(illegal_argument, "client collateral out of bounds"));
    }

    Ok(())
}

fn deal_proposal_is_internally_valid<BS, RT>(
    rt: &RT,
    proposal: &ClientDealProposal,
) -> Result<(), ActorError>
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    if proposal.proposal.end_epoch <= proposal.proposal.start_epoch {
        return Err(actor_error!(illegal_argument, "proposal end before proposal start"));
    }

    // Generate unsigned bytes
    let sv_bz = serialize(&proposal.proposal, "deal proposal")?;

    rt.verify_signature(&proposal.client_signature, &proposal.proposal.client, &sv_bz)
        .map_err(|e| actor_error!(illegal_argument; "invalid deal proposal signature: {}", e))?;

    Ok(())
}

/// Resolves a provider or client address to the canonical form against which a balance should be
/// held, and the designated recipient address of withdrawals (which is the same, for simple
/// account parties).
fn escrow_address<BS, RT>(rt: &mut RT, addr: &Address) -> Result<(Address, Address), ActorError>
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    // Resolve the provided address to the canonical form against which the balance is held.
    let nominal = rt
        .resolve_address(addr)
        .ok_or_else(|| actor_error!(illegal_argument, "failed to resolve address {}", addr))?;

    let code_id = rt
        .get_actor_code_cid(&nominal)
        .ok_or_else(|| actor_error!(illegal_argument, "no code for address {}", nominal))?;

    if rt.resolve_builtin_actor_type(&code_id) == Some(Type::Miner) {
        // Storage miner actor entry; implied funds recipient is the associated owner address.
        let (owner_addr, worker_addr) = request_miner_control_addrs(rt, nominal)?;
        rt.validate_immediate_caller_is([owner_addr, worker_addr].iter())?;
        return Ok((nominal, owner_addr));
    }

    // Ordinary account-style actor entry; funds recipient is just the entry address itself.
    rt.validate_immediate_caller_type(CALLER_TYPES_SIGNABLE)?;
    Ok((nominal, nominal))
}

impl ActorCode for Actor {
    fn invoke_method<BS, RT>(
        rt: &mut RT,
        method: MethodNum,
        params: &RawBytes,
    ) -> Result<RawBytes, ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        match FromPrimitive::from_u64(method) {
            Some(Method::Constructor) => {
                Self::constructor(rt)?;
                Ok(RawBytes::default())
            }
            Some(Method::AddBalance) => {
                Self::add_balance(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::WithdrawBalance) => {
                Self::withdraw_balance(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::HandleExpiredDeals) => {
                Self::handle_expired_deals(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::PublishStorageDeals) => {
                let res = Self::publish_storage_deals(rt, deserialize_params(params)?)?;
                Ok(RawBytes::serialize(res)?)
            }
            Some(Method::VerifyDealsOnSectorProveCommit) => {
                let res = Self::verify_deals_on_sector_prove_commit(rt, deserialize_params(params)?)?;
                Ok(RawBytes::serialize(res)?)
            }
            Some(Method::OnMinerSectorsTerminate) => {
                Self::on_miner_sectors_terminate(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::ComputeDataCommitment) => {
                let res = Self::compute_data_commitment(rt, deserialize_params(params)?)?;
                Ok(RawBytes::serialize(res)?)
            }
            Some(Method::HandleInitTimeoutDeals) => {
                Self::handle_init_timeout_deals(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            None => Err(actor_error!(unhandled_message; "Invalid method")),
        }
    }
}
