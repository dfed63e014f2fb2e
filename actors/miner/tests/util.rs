// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

#![allow(dead_code)]

use fvm_ipld_bitfield::BitField;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::randomness::Randomness;
use fvm_shared::sector::{RegisteredSealProof, SealVerifyInfo, SectorID, SectorSize};
use num_traits::Zero;

use fil_actor_miner::{
    ext, Actor as MinerActor, ConstructorParams, CronEventPayload, CronEventType,
    GetControlAddressesReturn, Method, ProveCommitSectorParams, SectorPreCommitInfo, State,
};
use fil_actors_runtime::runtime::DomainSeparationTag;
use fil_actors_runtime::test_utils::*;
use fil_actors_runtime::{INIT_ACTOR_ADDR, STORAGE_MARKET_ACTOR_ADDR, STORAGE_POWER_ACTOR_ADDR};

pub const SECTOR_SIZE: SectorSize = SectorSize::_2KiB;
pub const SEAL_PROOF: RegisteredSealProof = RegisteredSealProof::StackedDRG2KiBV1;

pub struct ActorHarness {
    pub owner: Address,
    pub worker: Address,
    pub worker_key: Address,
    pub receiver: Address,
}

impl ActorHarness {
    pub fn new() -> Self {
        Self {
            owner: Address::new_id(100),
            worker: Address::new_id(101),
            worker_key: new_bls_addr(0),
            receiver: Address::new_id(1000),
        }
    }

    pub fn new_runtime(&self, period_boundary: u64) -> MockRuntime {
        let mut rt = MockRuntime {
            receiver: self.receiver,
            caller: INIT_ACTOR_ADDR,
            caller_type: *INIT_ACTOR_CODE_ID,
            ..Default::default()
        };
        rt.actor_code_cids.insert(self.owner, *ACCOUNT_ACTOR_CODE_ID);
        rt.actor_code_cids.insert(self.worker, *ACCOUNT_ACTOR_CODE_ID);
        rt.set_hasher(fixed_hasher(period_boundary));
        rt
    }

    pub fn construct_and_verify(&self, rt: &mut MockRuntime) {
        let params = ConstructorParams {
            owner_addr: self.owner,
            worker_addr: self.worker,
            sector_size: SECTOR_SIZE,
            peer_id: b"peer".to_vec(),
        };

        rt.set_caller(*INIT_ACTOR_CODE_ID, INIT_ACTOR_ADDR);
        rt.expect_validate_caller_addr(vec![INIT_ACTOR_ADDR]);
        // Fetch worker pubkey.
        rt.expect_send(
            self.worker,
            ext::account::PUBKEY_ADDRESS_METHOD,
            RawBytes::default(),
            TokenAmount::zero(),
            RawBytes::serialize(self.worker_key).unwrap(),
            ExitCode::OK,
        );
        // Register proving period cron.
        let boundary = {
            // mirror the actor's boundary derivation with the fixed hasher
            let digest = (rt.hash_func)(&self.receiver.to_bytes());
            (u64::from_be_bytes(digest[..8].try_into().unwrap())
                % fil_actor_miner::WPOST_PROVING_PERIOD as u64) as ChainEpoch
        };
        let deadline =
            fil_actor_miner::compute_proving_period_deadline(boundary, rt.epoch);
        self.expect_enroll_cron(
            rt,
            deadline.period_end(),
            CronEventPayload { event_type: CronEventType::ProvingPeriod, sectors: None },
        );

        let ret = rt
            .call::<MinerActor>(Method::Constructor as u64, &RawBytes::serialize(params).unwrap())
            .unwrap();
        assert_eq!(RawBytes::default(), ret);
        rt.verify();
    }

    pub fn expect_enroll_cron(
        &self,
        rt: &mut MockRuntime,
        event_epoch: ChainEpoch,
        payload: CronEventPayload,
    ) {
        let payload = RawBytes::serialize(payload).unwrap();
        let params = ext::power::EnrollCronEventParams { event_epoch, payload };
        rt.expect_send(
            STORAGE_POWER_ACTOR_ADDR,
            ext::power::ENROLL_CRON_EVENT_METHOD,
            RawBytes::serialize(params).unwrap(),
            TokenAmount::zero(),
            RawBytes::default(),
            ExitCode::OK,
        );
    }

    pub fn control_addresses(&self, rt: &mut MockRuntime) -> (Address, Address) {
        rt.expect_validate_caller_any();
        let ret: GetControlAddressesReturn = rt
            .call::<MinerActor>(Method::ControlAddresses as u64, &RawBytes::default())
            .unwrap()
            .deserialize()
            .unwrap();
        rt.verify();
        (ret.owner, ret.worker)
    }

    pub fn pre_commit_sector(&self, rt: &mut MockRuntime, params: SectorPreCommitInfo) {
        rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, self.worker);
        rt.expect_validate_caller_addr(vec![self.worker]);

        let expiry_bound = rt.epoch
            + fil_actor_miner::max_seal_duration(params.registered_proof).unwrap()
            + 1;
        self.expect_enroll_cron(
            rt,
            expiry_bound,
            CronEventPayload {
                event_type: CronEventType::PreCommitExpiry,
                sectors: Some(BitField::try_from_bits([params.sector_number]).unwrap()),
            },
        );

        rt.call::<MinerActor>(
            Method::PreCommitSector as u64,
            &RawBytes::serialize(params).unwrap(),
        )
        .unwrap();
        rt.verify();
    }

    pub fn prove_commit_sector(
        &self,
        rt: &mut MockRuntime,
        precommit: &SectorPreCommitInfo,
        precommit_epoch: ChainEpoch,
        params: ProveCommitSectorParams,
    ) {
        rt.expect_validate_caller_any();

        let commd = make_piece_cid(b"commd");
        rt.expect_send(
            STORAGE_MARKET_ACTOR_ADDR,
            ext::market::COMPUTE_DATA_COMMITMENT_METHOD,
            RawBytes::serialize(ext::market::ComputeDataCommitmentParams {
                deal_ids: precommit.deal_ids.clone(),
                sector_type: precommit.registered_proof,
            })
            .unwrap(),
            TokenAmount::zero(),
            RawBytes::serialize(commd).unwrap(),
            ExitCode::OK,
        );

        let entropy = RawBytes::serialize(self.receiver).unwrap();
        let randomness = Randomness(b"sealrand".to_vec());
        let interactive_randomness = Randomness(b"interactive".to_vec());
        rt.expect_get_randomness_from_tickets(
            DomainSeparationTag::SealRandomness,
            precommit.seal_rand_epoch,
            entropy.to_vec(),
            randomness.clone(),
        );
        rt.expect_get_randomness_from_tickets(
            DomainSeparationTag::InteractiveSealChallengeSeed,
            precommit_epoch + fil_actor_miner::PRE_COMMIT_CHALLENGE_DELAY,
            entropy.to_vec(),
            interactive_randomness.clone(),
        );

        rt.expect_verify_seal(
            SealVerifyInfo {
                registered_proof: precommit.registered_proof,
                sector_id: SectorID {
                    miner: self.receiver.id().unwrap(),
                    number: precommit.sector_number,
                },
                deal_ids: precommit.deal_ids.clone(),
                randomness,
                interactive_randomness,
                proof: params.proof.clone(),
                sealed_cid: precommit.sealed_cid,
                unsealed_cid: commd,
            },
            ExitCode::OK,
        );

        rt.expect_send(
            STORAGE_MARKET_ACTOR_ADDR,
            ext::market::VERIFY_DEALS_ON_SECTOR_PROVE_COMMIT_METHOD,
            RawBytes::serialize(ext::market::VerifyDealsOnSectorProveCommitParams {
                deal_ids: precommit.deal_ids.clone(),
                sector_size: SECTOR_SIZE,
                sector_expiry: precommit.expiration,
            })
            .unwrap(),
            TokenAmount::zero(),
            RawBytes::serialize(ext::market::VerifyDealsOnSectorProveCommitReturn {
                deal_weight: 0.into(),
                verified_deal_weight: 0.into(),
            })
            .unwrap(),
            ExitCode::OK,
        );

        rt.call::<MinerActor>(
            Method::ProveCommitSector as u64,
            &RawBytes::serialize(params).unwrap(),
        )
        .unwrap();
        rt.verify();
    }

    /// Fires the proving-period cron handler, expecting re-enrollment for the next period.
    pub fn on_proving_period_cron(&self, rt: &mut MockRuntime) {
        rt.expect_validate_caller_addr(vec![STORAGE_POWER_ACTOR_ADDR]);
        self.expect_enroll_cron(
            rt,
            rt.epoch + fil_actor_miner::WPOST_PROVING_PERIOD,
            CronEventPayload { event_type: CronEventType::ProvingPeriod, sectors: None },
        );
        rt.set_caller(*POWER_ACTOR_CODE_ID, STORAGE_POWER_ACTOR_ADDR);
        rt.call::<MinerActor>(
            Method::OnDeferredCronEvent as u64,
            &RawBytes::serialize(CronEventPayload {
                event_type: CronEventType::ProvingPeriod,
                sectors: None,
            })
            .unwrap(),
        )
        .unwrap();
        rt.verify();
    }

    pub fn make_pre_commit(
        &self,
        sector_number: u64,
        challenge: ChainEpoch,
        expiration: ChainEpoch,
    ) -> SectorPreCommitInfo {
        SectorPreCommitInfo {
            registered_proof: SEAL_PROOF,
            sector_number,
            sealed_cid: make_sealed_cid(b"commr"),
            seal_rand_epoch: challenge,
            deal_ids: Vec::new(),
            expiration,
        }
    }
}

impl Default for ActorHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn get_state(rt: &MockRuntime) -> State {
    rt.get_state::<State>()
}

pub fn check_state(rt: &MockRuntime) {
    let (_, acc) = fil_actor_miner::testing::check_state_invariants(
        &get_state(rt),
        rt.store(),
        &rt.balance.borrow().clone(),
    );
    acc.assert_empty();
}

pub fn assert_empty_bitfield(b: &BitField) {
    assert!(b.is_empty());
}

/// Returns a fake hashing function that always arranges the first 8 bytes of the digest to be
/// the binary encoding of a target uint64.
pub fn fixed_hasher(target: u64) -> Box<dyn Fn(&[u8]) -> [u8; 32]> {
    Box::new(move |_| {
        let mut digest = [0u8; 32];
        digest[..8].copy_from_slice(&target.to_be_bytes());
        digest
    })
}
