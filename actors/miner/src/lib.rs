// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::multihash::Code;
use cid::Cid;
use fvm_ipld_bitfield::BitField;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::{CborStore, RawBytes};
use fvm_shared::address::{Address, Protocol};
use fvm_shared::clock::ChainEpoch;
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::randomness::Randomness;
use fvm_shared::sector::{SealVerifyInfo, SectorID, WindowPoStVerifyInfo};
use fvm_shared::{MethodNum, METHOD_CONSTRUCTOR, METHOD_SEND};
use log::{info, warn};
use num_derive::FromPrimitive;
use num_traits::{FromPrimitive, Zero};

use fil_actors_runtime::cbor::{deserialize, deserialize_params, serialize};
use fil_actors_runtime::runtime::{ActorCode, DomainSeparationTag, Runtime, Type};
use fil_actors_runtime::{
    actor_error, make_empty_map, ActorDowncast, ActorError, Array, BURNT_FUNDS_ACTOR_ADDR,
    CALLER_TYPES_SIGNABLE, INIT_ACTOR_ADDR, STORAGE_MARKET_ACTOR_ADDR, STORAGE_POWER_ACTOR_ADDR,
};
use fvm_shared::HAMT_BIT_WIDTH;

pub use self::deadlines::*;
pub use self::policy::*;
pub use self::state::*;
pub use self::types::*;

// exports for testing
#[doc(hidden)]
pub mod ext;
pub mod testing;

mod deadlines;
mod policy;
mod state;
mod types;

/// Storage Miner actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    ControlAddresses = 2,
    ChangeWorkerAddress = 3,
    ChangePeerId = 4,
    SubmitWindowedPoSt = 5,
    OnDeferredCronEvent = 6,
    PreCommitSector = 7,
    ProveCommitSector = 8,
    ExtendSectorExpiration = 9,
    TerminateSectors = 10,
    DeclareFaults = 11,
    DeclareFaultsRecovered = 12,
    ConfirmUpdateWorkerKey = 13,
    ReportConsensusFault = 14,
    WithdrawBalance = 15,
}

/// Storage Miner actor
pub struct Actor;

impl Actor {
    pub fn constructor<BS, RT>(rt: &mut RT, params: ConstructorParams) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_is(std::iter::once(&INIT_ACTOR_ADDR))?;

        let owner = resolve_owner_address(rt, params.owner_addr)?;
        let worker = resolve_worker_address(rt, params.worker_addr)?;

        let empty_array = Array::<(), BS>::new(rt.store()).flush().map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to construct empty array")
        })?;
        let empty_map = make_empty_map::<BS, ()>(rt.store(), HAMT_BIT_WIDTH).flush().map_err(
            |e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to construct empty map"),
        )?;
        let empty_deadlines =
            rt.store().put_cbor(&Deadlines::new(), Code::Blake2b256).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to construct deadlines")
            })?;

        let receiver = rt.message().receiver();
        let period_boundary = assign_proving_period_boundary(rt, receiver);

        let st = State::new(
            empty_array,
            empty_map,
            empty_deadlines,
            owner,
            worker,
            params.peer_id,
            params.sector_size,
            period_boundary,
        );
        rt.create(&st)?;

        // Register cron callback for the end of the current proving period, which a new miner is
        // part-way through.
        let deadline = compute_proving_period_deadline(period_boundary, rt.curr_epoch());
        enroll_cron_event(
            rt,
            deadline.period_end(),
            CronEventPayload { event_type: CronEventType::ProvingPeriod, sectors: None },
        )?;

        Ok(())
    }

    fn control_addresses<BS, RT>(rt: &mut RT) -> Result<GetControlAddressesReturn, ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_accept_any()?;
        let st: State = rt.state()?;
        Ok(GetControlAddressesReturn { owner: st.info.owner, worker: st.info.worker })
    }

    /// Stages a new worker key, to be committed after the key change delay.
    fn change_worker_address<BS, RT>(
        rt: &mut RT,
        params: ChangeWorkerAddressParams,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.info.owner))?;

        let worker = resolve_worker_address(rt, params.new_worker)?;

        let effective_epoch = rt.curr_epoch() + WORKER_KEY_CHANGE_DELAY;

        rt.transaction(|st: &mut State, _| {
            st.info.pending_worker_key =
                Some(WorkerKeyChange { new_worker: worker, effective_at: effective_epoch });
            Ok(())
        })?;

        enroll_cron_event(
            rt,
            effective_epoch,
            CronEventPayload { event_type: CronEventType::WorkerKeyChange, sectors: None },
        )?;

        Ok(())
    }

    /// Commits a staged worker key once its effective epoch has been reached.
    fn confirm_update_worker_key<BS, RT>(rt: &mut RT) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_accept_any()?;

        rt.transaction(|st: &mut State, rt| {
            let key = st
                .info
                .pending_worker_key
                .as_ref()
                .ok_or_else(|| actor_error!(illegal_argument, "no pending worker key change"))?;

            if rt.curr_epoch() < key.effective_at {
                return Err(actor_error!(
                    forbidden,
                    "worker key change effective at {}, current epoch {}",
                    key.effective_at,
                    rt.curr_epoch()
                ));
            }

            st.info.worker = key.new_worker;
            st.info.pending_worker_key = None;
            Ok(())
        })
    }

    fn change_peer_id<BS, RT>(rt: &mut RT, params: ChangePeerIdParams) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.info.worker))?;

        rt.transaction(|st: &mut State, _| {
            st.info.peer_id = params.new_id;
            Ok(())
        })
    }

    /// Proposes a sector commitment, placing it in the pre-committed set until proven.
    fn pre_commit_sector<BS, RT>(
        rt: &mut RT,
        params: PreCommitSectorParams,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.info.worker))?;

        let curr_epoch = rt.curr_epoch();

        let max_seal = max_seal_duration(params.registered_proof).ok_or_else(|| {
            actor_error!(illegal_argument, "unsupported seal proof type {:?}", params.registered_proof)
        })?;

        if params.seal_rand_epoch >= curr_epoch {
            return Err(actor_error!(
                illegal_argument,
                "seal challenge epoch {} must be before now {}",
                params.seal_rand_epoch,
                curr_epoch
            ));
        }
        if params.seal_rand_epoch < curr_epoch - CHAIN_FINALITYISH - max_seal {
            return Err(actor_error!(
                illegal_argument,
                "seal challenge epoch {} too old, must be after {}",
                params.seal_rand_epoch,
                curr_epoch - CHAIN_FINALITYISH - max_seal
            ));
        }

        if params.expiration <= curr_epoch {
            return Err(actor_error!(
                illegal_argument,
                "sector expiration {} must be after now {}",
                params.expiration,
                curr_epoch
            ));
        }
        validate_expiration_alignment(&st, params.expiration)?;

        if st.has_sector_no(rt.store(), params.sector_number).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to check sector")
        })? {
            return Err(actor_error!(
                illegal_argument,
                "sector {} already committed",
                params.sector_number
            ));
        }
        if st
            .get_precommitted_sector(rt.store(), params.sector_number)
            .map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to check precommit")
            })?
            .is_some()
        {
            return Err(actor_error!(
                illegal_argument,
                "sector {} already pre-committed",
                params.sector_number
            ));
        }

        let deposit_req = precommit_deposit(st.get_sector_size(), params.expiration - curr_epoch);
        if rt.message().value_received() < deposit_req {
            return Err(actor_error!(
                insufficient_funds,
                "insufficient precommit deposit: {}",
                deposit_req
            ));
        }

        let sector_number = params.sector_number;
        let registered_proof = params.registered_proof;

        rt.transaction(|st: &mut State, rt| {
            st.put_precommitted_sector(
                rt.store(),
                SectorPreCommitOnChainInfo {
                    info: params,
                    pre_commit_deposit: deposit_req.clone(),
                    pre_commit_epoch: curr_epoch,
                },
            )
            .map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to write precommit")
            })?;
            st.add_pre_commit_deposit(&deposit_req);
            Ok(())
        })?;

        // Request deferred Cron check for PreCommit expiry check.
        let expiry_bound = curr_epoch + max_seal_duration(registered_proof).unwrap_or_default() + 1;
        enroll_cron_event(
            rt,
            expiry_bound,
            CronEventPayload {
                event_type: CronEventType::PreCommitExpiry,
                sectors: Some(BitField::try_from_bits([sector_number]).map_err(
                    |_| actor_error!(illegal_argument; "invalid sector number {}", sector_number),
                )?),
            },
        )?;

        Ok(())
    }

    /// Proves a pre-committed sector, activating its deals and adding it to the proving set.
    fn prove_commit_sector<BS, RT>(
        rt: &mut RT,
        params: ProveCommitSectorParams,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_accept_any()?;

        let st: State = rt.state()?;
        let curr_epoch = rt.curr_epoch();
        let sector_number = params.sector_number;

        let precommit = st
            .get_precommitted_sector(rt.store(), sector_number)
            .map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load precommit")
            })?
            .ok_or_else(|| actor_error!(not_found, "no precommitted sector {}", sector_number))?;

        let max_seal = max_seal_duration(precommit.info.registered_proof).ok_or_else(|| {
            actor_error!(illegal_state, "no seal duration for proof {:?}", precommit.info.registered_proof)
        })?;
        if curr_epoch > precommit.pre_commit_epoch + max_seal {
            return Err(actor_error!(
                illegal_argument,
                "commitment proof for {} too late at {}, due {}",
                sector_number,
                curr_epoch,
                precommit.pre_commit_epoch + max_seal
            ));
        }
        let interactive_epoch = precommit.pre_commit_epoch + PRE_COMMIT_CHALLENGE_DELAY;
        if curr_epoch < interactive_epoch {
            return Err(actor_error!(
                illegal_argument,
                "commitment proof for {} too early at {}, due {}",
                sector_number,
                curr_epoch,
                interactive_epoch
            ));
        }

        // Compute the on-chain data commitment for the sector's deals.
        let ret = rt.send(
            STORAGE_MARKET_ACTOR_ADDR,
            ext::market::COMPUTE_DATA_COMMITMENT_METHOD,
            serialize(
                &ext::market::ComputeDataCommitmentParams {
                    deal_ids: precommit.info.deal_ids.clone(),
                    sector_type: precommit.info.registered_proof,
                },
                "compute data commitment params",
            )?,
            TokenAmount::zero(),
        )?;
        let unsealed_cid: Cid = deserialize(&ret, "unsealed sector cid")?;

        let entropy = serialize(&rt.message().receiver(), "receiver address")?;
        let randomness = rt.get_randomness_from_tickets(
            DomainSeparationTag::SealRandomness,
            precommit.info.seal_rand_epoch,
            &entropy,
        )?;
        let interactive_randomness = rt.get_randomness_from_tickets(
            DomainSeparationTag::InteractiveSealChallengeSeed,
            interactive_epoch,
            &entropy,
        )?;

        let miner_id = rt
            .message()
            .receiver()
            .id()
            .map_err(|e| actor_error!(illegal_state; "receiver must be id address: {}", e))?;

        rt.verify_seal(&SealVerifyInfo {
            registered_proof: precommit.info.registered_proof,
            sector_id: SectorID { miner: miner_id, number: sector_number },
            deal_ids: precommit.info.deal_ids.clone(),
            randomness,
            interactive_randomness,
            proof: params.proof,
            sealed_cid: precommit.info.sealed_cid,
            unsealed_cid,
        })
        .map_err(|e| actor_error!(illegal_argument; "invalid seal proof: {}", e))?;

        // Check (and activate) storage deals associated to sector. Abort if checks failed.
        let ret = rt.send(
            STORAGE_MARKET_ACTOR_ADDR,
            ext::market::VERIFY_DEALS_ON_SECTOR_PROVE_COMMIT_METHOD,
            serialize(
                &ext::market::VerifyDealsOnSectorProveCommitParams {
                    deal_ids: precommit.info.deal_ids.clone(),
                    sector_size: st.get_sector_size(),
                    sector_expiry: precommit.info.expiration,
                },
                "verify deals params",
            )?,
            TokenAmount::zero(),
        )?;
        let deal_weights: ext::market::VerifyDealsOnSectorProveCommitReturn =
            deserialize(&ret, "verify deals return")?;

        let initial_pledge = rt.transaction(|st: &mut State, rt| {
            st.delete_precommitted_sector(rt.store(), sector_number).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to delete precommit")
            })?;
            st.subtract_pre_commit_deposit(&precommit.pre_commit_deposit);

            let new_sector = SectorOnChainInfo {
                info: precommit.info.clone(),
                activation_epoch: rt.curr_epoch(),
                deal_weight: deal_weights.deal_weight,
                verified_deal_weight: deal_weights.verified_deal_weight,
            };

            st.put_sector(rt.store(), new_sector).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to put sector")
            })?;
            st.add_new_sectors(&[sector_number]).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to add new sector")
            })?;
            st.add_sector_expirations(rt.store(), precommit.info.expiration, &[sector_number])
                .map_err(|e| {
                    e.downcast_default(
                        ExitCode::USR_ILLEGAL_STATE,
                        "failed to add sector expiration",
                    )
                })?;

            // Lock the initial pledge requirement as slowly-vesting collateral.
            let initial_pledge = initial_pledge_for_weight();
            if initial_pledge.is_positive() {
                st.add_locked_funds(
                    rt.store(),
                    rt.curr_epoch(),
                    &initial_pledge,
                    &PLEDGE_VESTING_SPEC,
                )
                .map_err(|e| {
                    e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to lock pledge")
                })?;
            }
            Ok(initial_pledge)
        })?;

        if initial_pledge.is_positive() {
            notify_pledge_change(rt, &initial_pledge)?;
        }

        Ok(())
    }

    /// Submits a window proof-of-spacetime for the currently open deadline,
    /// and effects any declared recoveries.
    fn submit_windowed_post<BS, RT>(
        rt: &mut RT,
        params: SubmitWindowedPoStParams,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.info.worker))?;

        let curr_epoch = rt.curr_epoch();
        let deadline = st.deadline_info(curr_epoch);

        if !deadline.is_open() {
            return Err(actor_error!(
                illegal_state,
                "proving period {} not yet open at {}",
                deadline.period_start,
                curr_epoch
            ));
        }
        if params.deadline != deadline.index {
            return Err(actor_error!(
                illegal_argument,
                "invalid deadline {} at epoch {}, expected {}",
                params.deadline,
                curr_epoch,
                deadline.index
            ));
        }
        if params.partitions.len() as u64 > WPOST_MESSAGE_PARTITIONS_MAX {
            return Err(actor_error!(
                illegal_argument,
                "too many partitions {}, max {}",
                params.partitions.len(),
                WPOST_MESSAGE_PARTITIONS_MAX
            ));
        }

        let deadlines = st.load_deadlines(rt.store()).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load deadlines")
        })?;

        let (first_partition, sector_count) =
            partitions_for_deadline(&deadlines, params.deadline)?;
        if sector_count == 0 {
            return Err(actor_error!(
                illegal_argument,
                "no sectors due at deadline {}",
                params.deadline
            ));
        }
        let partition_count = deadline_partition_count(sector_count);
        for p in &params.partitions {
            if *p < first_partition || *p >= first_partition + partition_count {
                return Err(actor_error!(
                    illegal_argument,
                    "invalid partition {} at deadline {}",
                    p,
                    params.deadline
                ));
            }
        }

        let due = &deadlines.due[params.deadline as usize];

        // Load sector infos for proof verification, substituting a good sector for any faulty
        // ones. Sectors with a declared recovery are expected to be proven.
        let fault_mask = &st.faults - &st.recoveries;
        let sector_infos = if fault_mask.contains_any(due) {
            let good = due
                .iter()
                .find(|i| !fault_mask.get(*i))
                .ok_or_else(|| actor_error!(illegal_state, "no good sector to stand in"))?;
            st.load_sector_infos_with_fault_mask(rt.store(), due, &fault_mask, good)
        } else {
            st.load_sector_infos(rt.store(), due)
        }
        .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load sectors"))?;

        let entropy = serialize(&rt.message().receiver(), "receiver address")?;
        let randomness: Randomness = rt.get_randomness_from_tickets(
            DomainSeparationTag::WindowedPoStChallengeSeed,
            deadline.challenge,
            &entropy,
        )?;

        let miner_id = rt
            .message()
            .receiver()
            .id()
            .map_err(|e| actor_error!(illegal_state; "receiver must be id address: {}", e))?;

        rt.verify_post(&WindowPoStVerifyInfo {
            randomness,
            proofs: params.proofs,
            challenged_sectors: sector_infos.iter().map(|s| s.as_sector_info()).collect(),
            prover: miner_id,
        })
        .map_err(|e| actor_error!(illegal_argument; "invalid PoSt: {}", e))?;

        rt.transaction(|st: &mut State, rt| {
            let partitions = BitField::try_from_bits(params.partitions.iter().copied())
                .map_err(|_| actor_error!(illegal_argument; "invalid partition numbers"))?;
            st.add_post_submissions(&partitions);

            // Declared recoveries in the proven deadline become effective.
            let deadlines = st.load_deadlines(rt.store()).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load deadlines")
            })?;
            let recovered = &st.recoveries & &deadlines.due[deadline.index as usize];
            st.remove_faults(rt.store(), &recovered).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to remove faults")
            })?;
            st.remove_recoveries(&recovered);
            Ok(())
        })?;

        Ok(())
    }

    /// Marks some sectors as faulty before their next proving deadline, reducing the penalty
    /// compared with a missed proof.
    fn declare_faults<BS, RT>(rt: &mut RT, params: DeclareFaultsParams) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.info.worker))?;

        let curr_epoch = rt.curr_epoch();
        let deadline = st.deadline_info(curr_epoch);

        let penalty = rt.transaction(|st: &mut State, rt| {
            let deadlines = st.load_deadlines(rt.store()).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load deadlines")
            })?;

            // Every declared sector must be assigned to a deadline whose challenge window is
            // far enough away for the declaration to matter.
            for sector in params.faults.iter() {
                let mut assigned = None;
                for (idx, due) in deadlines.due.iter().enumerate() {
                    if due.get(sector) {
                        assigned = Some(idx as u64);
                        break;
                    }
                }
                let assigned = assigned.ok_or_else(|| {
                    actor_error!(illegal_argument, "sector {} not assigned to a deadline", sector)
                })?;

                let next_open = next_deadline_open(&deadline, assigned);
                if curr_epoch + FAULT_DECLARATION_CUTOFF >= next_open {
                    return Err(actor_error!(
                        illegal_argument,
                        "fault for sector {} declared too close to its deadline at {}",
                        sector,
                        next_open
                    ));
                }
            }

            let sector_infos =
                st.load_sector_infos(rt.store(), &params.faults).map_err(|e| {
                    e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load sectors")
                })?;

            st.add_faults(rt.store(), &params.faults, deadline.period_start).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to add faults")
            })?;

            let max_allowed = st.get_max_allowed_faults(rt.store()).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to count sectors")
            })?;
            if st.faults.len() > max_allowed {
                return Err(actor_error!(illegal_argument, "too many faults declared"));
            }

            let penalty_target: TokenAmount =
                sector_infos.iter().map(pledge_penalty_for_sector_declared_fault).sum();
            st.unlock_unvested_funds(rt.store(), curr_epoch, &penalty_target).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to unlock penalty")
            })
        })?;

        burn_funds_if_positive(rt, &penalty)?;
        Ok(())
    }

    /// Marks some faulty sectors as expected to recover at the next valid PoSt.
    fn declare_faults_recovered<BS, RT>(
        rt: &mut RT,
        params: DeclareFaultsRecoveredParams,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.info.worker))?;

        rt.transaction(|st: &mut State, _| {
            if !st.faults.contains_all(&params.recoveries) {
                return Err(actor_error!(
                    illegal_argument,
                    "declared recoveries not all currently faulty"
                ));
            }

            st.add_recoveries(&params.recoveries).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to add recoveries")
            })
        })
    }

    /// Changes the expiration epoch for a sector to a new, later one.
    fn extend_sector_expiration<BS, RT>(
        rt: &mut RT,
        params: ExtendSectorExpirationParams,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.info.worker))?;

        validate_expiration_alignment(&st, params.new_expiration)?;

        rt.transaction(|st: &mut State, rt| {
            let mut sector = st
                .get_sector(rt.store(), params.sector_number)
                .map_err(|e| {
                    e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load sector")
                })?
                .ok_or_else(|| {
                    actor_error!(not_found, "no such sector {}", params.sector_number)
                })?;

            let old_expiration = sector.info.expiration;
            if params.new_expiration <= old_expiration {
                return Err(actor_error!(
                    illegal_argument,
                    "cannot reduce sector expiration {} to {}",
                    old_expiration,
                    params.new_expiration
                ));
            }

            st.remove_sector_expirations(rt.store(), old_expiration, &[params.sector_number])
                .map_err(|e| {
                    e.downcast_default(
                        ExitCode::USR_ILLEGAL_STATE,
                        "failed to remove sector expiration",
                    )
                })?;
            st.add_sector_expirations(rt.store(), params.new_expiration, &[params.sector_number])
                .map_err(|e| {
                    e.downcast_default(
                        ExitCode::USR_ILLEGAL_STATE,
                        "failed to add sector expiration",
                    )
                })?;

            sector.info.expiration = params.new_expiration;
            st.put_sector(rt.store(), sector).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to update sector")
            })
        })
    }

    /// Removes sectors from state, notifying the market so their deals are slashed.
    fn terminate_sectors<BS, RT>(
        rt: &mut RT,
        params: TerminateSectorsParams,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.info.worker))?;

        terminate_sectors_internal(rt, &params.sectors, pledge_penalty_for_sector_termination)
    }

    /// Invoked by the power actor at the epoch committed for a deferred event.
    fn on_deferred_cron_event<BS, RT>(
        rt: &mut RT,
        payload: CronEventPayload,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_is(std::iter::once(&STORAGE_POWER_ACTOR_ADDR))?;

        match payload.event_type {
            CronEventType::ProvingPeriod => Self::handle_proving_period(rt),
            CronEventType::PreCommitExpiry => {
                Self::check_precommit_expiry(rt, payload.sectors.unwrap_or_default())
            }
            CronEventType::WorkerKeyChange => Self::commit_worker_key_change(rt),
        }
    }

    /// Invoked at the end of each proving period, at the last epoch of the period.
    fn handle_proving_period<BS, RT>(rt: &mut RT) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        let curr_epoch = rt.curr_epoch();
        let receiver = rt.message().receiver();

        let mut penalty_total = TokenAmount::zero();
        let mut terminated_deals: Vec<DealID> = Vec::new();

        rt.transaction(|st: &mut State, rt| {
            let deadline = st.deadline_info(curr_epoch);
            let store = rt.store();

            // Vest locked funds.
            st.unlock_vested_funds(store, curr_epoch).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to vest funds")
            })?;

            let mut deadlines = st.load_deadlines(store).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load deadlines")
            })?;

            // Detect undeclared faults: sectors due at a deadline with a missing proof that
            // were not already faulty.
            let mut penalty_target = TokenAmount::zero();
            let mut detected_faults = BitField::new();
            {
                let mut first_partition = 0u64;
                for i in 0..WPOST_PERIOD_DEADLINES {
                    let due = &deadlines.due[i as usize];
                    let partition_count = deadline_partition_count(due.len());
                    if due.is_empty() {
                        continue;
                    }

                    let mut proven = true;
                    for p in first_partition..first_partition + partition_count {
                        if !st.post_submissions.get(p) {
                            proven = false;
                        }
                    }
                    first_partition += partition_count;

                    if !proven {
                        detected_faults |= &(due - &st.faults);
                    }
                }
            }
            if !detected_faults.is_empty() {
                warn!("{} sectors detected faulty at close of proving period", detected_faults.len());
            }
            let detected_infos = st.load_sector_infos(store, &detected_faults).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load faulty sectors")
            })?;
            penalty_target += detected_infos
                .iter()
                .map(pledge_penalty_for_sector_undeclared_fault)
                .sum::<TokenAmount>();

            // Ongoing, already-declared faults are penalised at the declared-fault rate.
            let ongoing_faults = &st.faults - &detected_faults;
            let ongoing_infos = st.load_sector_infos(store, &ongoing_faults).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load faulty sectors")
            })?;
            penalty_target += ongoing_infos
                .iter()
                .map(pledge_penalty_for_sector_declared_fault)
                .sum::<TokenAmount>();

            st.add_faults(store, &detected_faults, deadline.period_start).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to add faults")
            })?;

            // Terminate sectors that have been faulty for too long.
            let mut expired_faults = BitField::new();
            let mut fault_epochs_to_clear = Vec::<ChainEpoch>::new();
            st.for_each_fault_epoch(store, |epoch, faults| {
                if epoch <= curr_epoch - FAULT_MAX_AGE {
                    expired_faults |= faults;
                    fault_epochs_to_clear.push(epoch);
                }
                Ok(())
            })
            .map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to iterate fault epochs")
            })?;

            if !expired_faults.is_empty() {
                let (deals, termination_penalty) =
                    remove_terminated_sectors(st, store, &mut deadlines, &expired_faults)?;
                terminated_deals.extend(deals);
                penalty_target += termination_penalty;
                st.clear_fault_epochs(store, &fault_epochs_to_clear).map_err(|e| {
                    e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to clear fault epochs")
                })?;
            }

            // Expire sectors whose expiration epoch has been reached, without penalty.
            let mut expired_sectors = BitField::new();
            let mut expiry_epochs_to_clear = Vec::<ChainEpoch>::new();
            st.for_each_sector_expiration(store, |expiry, sectors| {
                if expiry <= curr_epoch {
                    expired_sectors |= sectors;
                    expiry_epochs_to_clear.push(expiry);
                }
                Ok(())
            })
            .map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to iterate expirations")
            })?;

            if !expired_sectors.is_empty() {
                st.delete_sectors(store, &expired_sectors).map_err(|e| {
                    e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to delete sectors")
                })?;
                deadlines.remove_from_all_deadlines(&expired_sectors);
                st.remove_faults(store, &expired_sectors).map_err(|e| {
                    e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to remove faults")
                })?;
                st.remove_recoveries(&expired_sectors);
                st.clear_sector_expirations(store, &expiry_epochs_to_clear).map_err(|e| {
                    e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to clear expirations")
                })?;
            }

            // Assign new sectors to deadlines, spreading them pseudo-randomly.
            let new_sectors: Vec<u64> = st.new_sectors.iter().collect();
            for sector_number in new_sectors {
                let assigned = assign_new_sector_deadline(
                    rt,
                    &deadlines,
                    &receiver,
                    deadline.period_start,
                    sector_number,
                );
                deadlines.add_to_deadline(assigned, &[sector_number]).map_err(|e| {
                    e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to assign deadline")
                })?;
            }
            st.clear_new_sectors();

            st.save_deadlines(rt.store(), &deadlines).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to save deadlines")
            })?;

            st.clear_post_submissions();

            // Penalties are paid from unvested pledge.
            penalty_total =
                st.unlock_unvested_funds(rt.store(), curr_epoch, &penalty_target).map_err(|e| {
                    e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to unlock penalty")
                })?;

            Ok(())
        })?;

        if !terminated_deals.is_empty() {
            request_terminate_deals(rt, terminated_deals)?;
        }
        burn_funds_if_positive(rt, &penalty_total)?;

        // Establish the next proving period.
        enroll_cron_event(
            rt,
            curr_epoch + WPOST_PROVING_PERIOD,
            CronEventPayload { event_type: CronEventType::ProvingPeriod, sectors: None },
        )?;

        Ok(())
    }

    /// Burns the deposit of any pre-commitments that were not proven in time.
    fn check_precommit_expiry<BS, RT>(rt: &mut RT, sectors: BitField) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        let curr_epoch = rt.curr_epoch();

        let deposit_to_burn = rt.transaction(|st: &mut State, rt| {
            let mut deposit_to_burn = TokenAmount::zero();
            for sector_number in sectors.iter() {
                let precommit = match st
                    .get_precommitted_sector(rt.store(), sector_number)
                    .map_err(|e| {
                        e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load precommit")
                    })? {
                    Some(p) => p,
                    // already proven (or never existed), nothing to do
                    None => continue,
                };

                let max_seal =
                    max_seal_duration(precommit.info.registered_proof).unwrap_or_default();
                if curr_epoch - precommit.pre_commit_epoch <= max_seal {
                    continue;
                }

                info!(
                    "burning pre-commit deposit for unproven sector {} (deadline passed)",
                    sector_number
                );
                st.delete_precommitted_sector(rt.store(), sector_number).map_err(|e| {
                    e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to delete precommit")
                })?;
                st.subtract_pre_commit_deposit(&precommit.pre_commit_deposit);
                deposit_to_burn += precommit.pre_commit_deposit;
            }
            Ok(deposit_to_burn)
        })?;

        burn_funds_if_positive(rt, &deposit_to_burn)?;
        Ok(())
    }

    fn commit_worker_key_change<BS, RT>(rt: &mut RT) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.transaction(|st: &mut State, rt| {
            match &st.info.pending_worker_key {
                Some(key) if rt.curr_epoch() >= key.effective_at => {
                    st.info.worker = key.new_worker;
                    st.info.pending_worker_key = None;
                }
                // A change staged after this cron was enrolled will be committed by its own event.
                _ => {}
            }
            Ok(())
        })
    }

    /// Slashes the miner's unvested pledge for a proven consensus fault, rewarding the reporter.
    fn report_consensus_fault<BS, RT>(
        rt: &mut RT,
        params: ReportConsensusFaultParams,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_type(CALLER_TYPES_SIGNABLE)?;
        let reporter = rt.message().caller();

        let fault = rt
            .verify_consensus_fault(&params.header1, &params.header2, &params.header_extra)
            .map_err(|e| actor_error!(illegal_argument; "failed to verify consensus fault: {}", e))?
            .ok_or_else(|| actor_error!(illegal_argument, "no consensus fault found"))?;

        let curr_epoch = rt.curr_epoch();
        let fault_age = curr_epoch - fault.epoch;
        if fault_age <= 0 {
            return Err(actor_error!(
                illegal_argument,
                "invalid fault epoch {} ahead of current {}",
                fault.epoch,
                curr_epoch
            ));
        }

        let slashed = rt.transaction(|st: &mut State, rt| {
            let target = st.locked_funds.clone();
            st.unlock_unvested_funds(rt.store(), curr_epoch, &target).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to slash pledge")
            })
        })?;

        let reward = reward_for_consensus_slash_report(fault_age, slashed.clone());
        rt.send(reporter, METHOD_SEND, RawBytes::default(), reward.clone())
            .map_err(|e| e.wrap("failed to reward reporter"))?;
        burn_funds_if_positive(rt, &(slashed - reward))?;

        Ok(())
    }

    fn withdraw_balance<BS, RT>(
        rt: &mut RT,
        params: WithdrawBalanceParams,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.info.owner))?;

        if params.amount_requested.is_negative() {
            return Err(actor_error!(
                illegal_argument,
                "negative fund requested for withdrawal: {}",
                params.amount_requested
            ));
        }

        let owner = st.info.owner;

        rt.transaction(|st: &mut State, rt| {
            st.unlock_vested_funds(rt.store(), rt.curr_epoch()).map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to vest funds")
            })?;

            let available = st.get_available_balance(&rt.current_balance());
            if params.amount_requested > available {
                return Err(actor_error!(
                    insufficient_funds,
                    "insufficient funds for withdrawal, available {} requested {}",
                    available,
                    params.amount_requested
                ));
            }
            Ok(())
        })?;

        rt.send(owner, METHOD_SEND, RawBytes::default(), params.amount_requested)
            .map_err(|e| e.wrap("failed to withdraw funds"))?;

        let st: State = rt.state()?;
        st.assert_balance_invariants(&rt.current_balance());
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Helpers
////////////////////////////////////////////////////////////////////////////////

/// Initial pledge for a newly proven sector. PARAM_FINISH
fn initial_pledge_for_weight() -> TokenAmount {
    TokenAmount::zero()
}

/// Resolves the owner address and confirms it is backed by a signable actor.
fn resolve_owner_address<BS, RT>(rt: &mut RT, raw: Address) -> Result<Address, ActorError>
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    let resolved = rt
        .resolve_address(&raw)
        .ok_or_else(|| actor_error!(illegal_argument, "unable to resolve address {}", raw))?;

    let owner_code = rt
        .get_actor_code_cid(&resolved)
        .ok_or_else(|| actor_error!(illegal_argument, "no code for address {}", resolved))?;
    let is_principal = rt
        .resolve_builtin_actor_type(&owner_code)
        .map(|t| CALLER_TYPES_SIGNABLE.contains(&t))
        .unwrap_or(false);
    if !is_principal {
        return Err(actor_error!(
            illegal_argument,
            "owner actor type must be a principal, was {}",
            owner_code
        ));
    }

    Ok(resolved)
}

/// Resolves the worker address, and confirms its backing public key is BLS.
fn resolve_worker_address<BS, RT>(rt: &mut RT, raw: Address) -> Result<Address, ActorError>
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    let resolved = rt
        .resolve_address(&raw)
        .ok_or_else(|| actor_error!(illegal_argument, "unable to resolve address {}", raw))?;

    let worker_code = rt
        .get_actor_code_cid(&resolved)
        .ok_or_else(|| actor_error!(illegal_argument, "no code for address {}", resolved))?;
    if rt.resolve_builtin_actor_type(&worker_code) != Some(Type::Account) {
        return Err(actor_error!(
            illegal_argument,
            "worker actor type must be an account, was {}",
            worker_code
        ));
    }

    if raw.protocol() != Protocol::BLS {
        let ret = rt.send(
            resolved,
            ext::account::PUBKEY_ADDRESS_METHOD,
            RawBytes::default(),
            TokenAmount::zero(),
        )?;
        let pub_key: Address = deserialize(&ret, "address response")?;
        if pub_key.protocol() != Protocol::BLS {
            return Err(actor_error!(
                illegal_argument,
                "worker account {} must have BLS pubkey, was {}",
                resolved,
                pub_key.protocol()
            ));
        }
    }

    Ok(resolved)
}

/// Selects a proving-period boundary for a new miner by hashing its address,
/// to spread period boundaries across epochs.
fn assign_proving_period_boundary<BS, RT>(rt: &RT, addr: Address) -> ChainEpoch
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    let digest = rt.hash_blake2b(&addr.to_bytes());
    let offset = u64::from_be_bytes(digest[..8].try_into().unwrap());
    (offset % WPOST_PROVING_PERIOD as u64) as ChainEpoch
}

/// Selects the deadline at which a new sector will be proven, from a hash of the miner address,
/// period and sector number. Probes forward past any deadline already at capacity.
fn assign_new_sector_deadline<BS, RT>(
    rt: &RT,
    deadlines: &Deadlines,
    receiver: &Address,
    period_start: ChainEpoch,
    sector_number: u64,
) -> u64
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    let mut entropy = receiver.to_bytes();
    entropy.extend_from_slice(&period_start.to_be_bytes());
    entropy.extend_from_slice(&sector_number.to_be_bytes());
    let digest = rt.hash_blake2b(&entropy);

    let mut assigned =
        u64::from_be_bytes(digest[..8].try_into().unwrap()) % WPOST_PERIOD_DEADLINES;
    while deadlines.due[assigned as usize].len() >= DEADLINE_SECTORS_MAX {
        assigned = (assigned + 1) % WPOST_PERIOD_DEADLINES;
    }
    assigned
}

/// The next epoch at which the given deadline index opens, from the perspective of the
/// current deadline.
fn next_deadline_open(current: &DeadlineInfo, deadline_idx: u64) -> ChainEpoch {
    let open = current.period_start + (deadline_idx as i64) * WPOST_CHALLENGE_WINDOW;
    if open > current.current_epoch {
        open
    } else {
        open + WPOST_PROVING_PERIOD
    }
}

/// Requires the given expiration epoch to land on the final epoch of some proving period.
fn validate_expiration_alignment(st: &State, expiration: ChainEpoch) -> Result<(), ActorError> {
    let offset = (expiration + 1 - st.info.proving_period_boundary).rem_euclid(WPOST_PROVING_PERIOD);
    if offset != 0 {
        return Err(actor_error!(
            illegal_argument,
            "sector expiration {} not aligned to proving period end (boundary {})",
            expiration,
            st.info.proving_period_boundary
        ));
    }
    Ok(())
}

/// Removes terminated sectors from all state structures, returning their deal ids and the
/// penalty target assessed for the termination.
fn remove_terminated_sectors<BS: Blockstore>(
    st: &mut State,
    store: &BS,
    deadlines: &mut Deadlines,
    sectors: &BitField,
) -> Result<(Vec<DealID>, TokenAmount), ActorError> {
    let sector_infos = st
        .load_sector_infos(store, sectors)
        .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load sectors"))?;

    let mut deal_ids = Vec::new();
    let mut penalty = TokenAmount::zero();
    for sector in &sector_infos {
        deal_ids.extend_from_slice(&sector.info.deal_ids);
        penalty += pledge_penalty_for_sector_termination(sector);
        st.remove_sector_expirations(store, sector.info.expiration, &[sector.info.sector_number])
            .map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to remove expiration")
            })?;
    }

    st.delete_sectors(store, sectors)
        .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to delete sectors"))?;
    st.remove_new_sectors(sectors);
    deadlines.remove_from_all_deadlines(sectors);
    st.remove_faults(store, sectors)
        .map_err(|e| e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to remove faults"))?;
    st.remove_recoveries(sectors);

    Ok((deal_ids, penalty))
}

/// Terminates a set of sectors immediately: state cleanup, market notification, penalty burn.
fn terminate_sectors_internal<BS, RT>(
    rt: &mut RT,
    sectors: &BitField,
    penalty_fn: fn(&SectorOnChainInfo) -> TokenAmount,
) -> Result<(), ActorError>
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    let curr_epoch = rt.curr_epoch();

    let mut terminated_deals: Vec<DealID> = Vec::new();
    let penalty = rt.transaction(|st: &mut State, rt| {
        let store = rt.store();
        let sector_infos = st.load_sector_infos(store, sectors).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load sectors")
        })?;

        let mut deadlines = st.load_deadlines(store).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to load deadlines")
        })?;

        let mut penalty_target = TokenAmount::zero();
        for sector in &sector_infos {
            terminated_deals.extend_from_slice(&sector.info.deal_ids);
            penalty_target += penalty_fn(sector);
            st.remove_sector_expirations(
                store,
                sector.info.expiration,
                &[sector.info.sector_number],
            )
            .map_err(|e| {
                e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to remove expiration")
            })?;
        }

        st.delete_sectors(store, sectors).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to delete sectors")
        })?;
        st.remove_new_sectors(sectors);
        deadlines.remove_from_all_deadlines(sectors);
        st.remove_faults(store, sectors).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to remove faults")
        })?;
        st.remove_recoveries(sectors);

        st.save_deadlines(rt.store(), &deadlines).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to save deadlines")
        })?;

        st.unlock_unvested_funds(rt.store(), curr_epoch, &penalty_target).map_err(|e| {
            e.downcast_default(ExitCode::USR_ILLEGAL_STATE, "failed to unlock penalty")
        })
    })?;

    if !terminated_deals.is_empty() {
        request_terminate_deals(rt, terminated_deals)?;
    }
    burn_funds_if_positive(rt, &penalty)?;

    Ok(())
}

fn request_terminate_deals<BS, RT>(rt: &mut RT, deal_ids: Vec<DealID>) -> Result<(), ActorError>
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    rt.send(
        STORAGE_MARKET_ACTOR_ADDR,
        ext::market::ON_MINER_SECTORS_TERMINATE_METHOD,
        serialize(
            &ext::market::OnMinerSectorsTerminateParams { deal_ids },
            "terminate deals params",
        )?,
        TokenAmount::zero(),
    )
    .map_err(|e| e.wrap("failed to terminate deals, ABORTING"))?;
    Ok(())
}

fn enroll_cron_event<BS, RT>(
    rt: &mut RT,
    event_epoch: ChainEpoch,
    payload: CronEventPayload,
) -> Result<(), ActorError>
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    let payload = serialize(&payload, "cron payload")?;
    rt.send(
        STORAGE_POWER_ACTOR_ADDR,
        ext::power::ENROLL_CRON_EVENT_METHOD,
        serialize(
            &ext::power::EnrollCronEventParams { event_epoch, payload },
            "enroll cron params",
        )?,
        TokenAmount::zero(),
    )
    .map_err(|e| e.wrap("failed to enroll cron event"))?;
    Ok(())
}

fn notify_pledge_change<BS, RT>(rt: &mut RT, pledge_delta: &TokenAmount) -> Result<(), ActorError>
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    rt.send(
        STORAGE_POWER_ACTOR_ADDR,
        ext::power::UPDATE_PLEDGE_TOTAL_METHOD,
        serialize(
            &ext::power::UpdatePledgeTotalParams { pledge_delta: pledge_delta.clone() },
            "update pledge params",
        )?,
        TokenAmount::zero(),
    )
    .map_err(|e| e.wrap("failed to update total pledge"))?;
    Ok(())
}

fn burn_funds_if_positive<BS, RT>(rt: &mut RT, amount: &TokenAmount) -> Result<(), ActorError>
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    if amount.is_positive() {
        rt.send(BURNT_FUNDS_ACTOR_ADDR, METHOD_SEND, RawBytes::default(), amount.clone())
            .map_err(|e| e.wrap("failed to burn funds"))?;
    }
    Ok(())
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
                Self::constructor(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::ControlAddresses) => {
                let res = Self::control_addresses(rt)?;
                Ok(RawBytes::serialize(res)?)
            }
            Some(Method::ChangeWorkerAddress) => {
                Self::change_worker_address(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::ChangePeerId) => {
                Self::change_peer_id(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::SubmitWindowedPoSt) => {
                Self::submit_windowed_post(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::OnDeferredCronEvent) => {
                Self::on_deferred_cron_event(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::PreCommitSector) => {
                Self::pre_commit_sector(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::ProveCommitSector) => {
                Self::prove_commit_sector(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::ExtendSectorExpiration) => {
                Self::extend_sector_expiration(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::TerminateSectors) => {
                Self::terminate_sectors(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::DeclareFaults) => {
                Self::declare_faults(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::DeclareFaultsRecovered) => {
                Self::declare_faults_recovered(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::ConfirmUpdateWorkerKey) => {
                Self::confirm_update_worker_key(rt)?;
                Ok(RawBytes::default())
            }
            Some(Method::ReportConsensusFault) => {
                Self::report_consensus_fault(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::WithdrawBalance) => {
                Self::withdraw_balance(rt, deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            None => Err(actor_error!(unhandled_message; "Invalid method")),
        }
    }
}
