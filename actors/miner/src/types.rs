// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_bitfield::BitField;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::{serde_bytes, Cbor};
use fvm_shared::address::Address;
use fvm_shared::bigint::bigint_ser;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;
use fvm_shared::sector::{
    PoStProof, RegisteredSealProof, SectorInfo, SectorNumber, SectorSize,
};
use serde_repr::{Deserialize_repr, Serialize_repr};

use fil_actors_runtime::DealWeight;

#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct ConstructorParams {
    pub owner_addr: Address,
    pub worker_addr: Address,
    pub sector_size: SectorSize,
    #[serde(with = "serde_bytes")]
    pub peer_id: Vec<u8>,
}

impl Cbor for ConstructorParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct GetControlAddressesReturn {
    pub owner: Address,
    pub worker: Address,
}

impl Cbor for GetControlAddressesReturn {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
#[serde(transparent)]
pub struct ChangeWorkerAddressParams {
    pub new_worker: Address,
}

impl Cbor for ChangeWorkerAddressParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
#[serde(transparent)]
pub struct ChangePeerIdParams {
    #[serde(with = "serde_bytes")]
    pub new_id: Vec<u8>,
}

impl Cbor for ChangePeerIdParams {}

/// Information submitted by a miner to provide a Window PoSt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct SubmitWindowedPoStParams {
    /// The deadline index which the submission targets.
    pub deadline: u64,
    /// The partition indices being proven.
    /// Partitions are counted across all deadlines, such that all sectors assigned to one of the
    /// first deadline's partitions come before any sectors assigned to the second deadline.
    pub partitions: Vec<u64>,
    /// The proof verification inputs.
    pub proofs: Vec<PoStProof>,
}

impl Cbor for SubmitWindowedPoStParams {}

/// Information provided by a miner when pre-committing a sector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct SectorPreCommitInfo {
    pub registered_proof: RegisteredSealProof,
    pub sector_number: SectorNumber,
    /// CommR
    pub sealed_cid: Cid,
    pub seal_rand_epoch: ChainEpoch,
    pub deal_ids: Vec<DealID>,
    /// Sector expiration
    pub expiration: ChainEpoch,
}

impl Cbor for SectorPreCommitInfo {}

pub type PreCommitSectorParams = SectorPreCommitInfo;

/// Information stored on-chain for a pre-committed sector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct SectorPreCommitOnChainInfo {
    pub info: SectorPreCommitInfo,
    pub pre_commit_deposit: TokenAmount,
    pub pre_commit_epoch: ChainEpoch,
}

impl Cbor for SectorPreCommitOnChainInfo {}

/// Information stored on-chain for a proven sector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct SectorOnChainInfo {
    pub info: SectorPreCommitInfo,
    /// Epoch at which SectorProveCommit is accepted
    pub activation_epoch: ChainEpoch,
    /// Integral of active deals over sector lifetime
    #[serde(with = "bigint_ser")]
    pub deal_weight: DealWeight,
    /// Integral of active verified deals over sector lifetime
    #[serde(with = "bigint_ser")]
    pub verified_deal_weight: DealWeight,
}

impl Cbor for SectorOnChainInfo {}

impl SectorOnChainInfo {
    pub fn as_sector_info(&self) -> SectorInfo {
        SectorInfo {
            proof: self.info.registered_proof,
            sector_number: self.info.sector_number,
            sealed_cid: self.info.sealed_cid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct ProveCommitSectorParams {
    pub sector_number: SectorNumber,
    #[serde(with = "serde_bytes")]
    pub proof: Vec<u8>,
}

impl Cbor for ProveCommitSectorParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct ExtendSectorExpirationParams {
    pub sector_number: SectorNumber,
    pub new_expiration: ChainEpoch,
}

impl Cbor for ExtendSectorExpirationParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
#[serde(transparent)]
pub struct TerminateSectorsParams {
    pub sectors: BitField,
}

impl Cbor for TerminateSectorsParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
#[serde(transparent)]
pub struct DeclareFaultsParams {
    pub faults: BitField,
}

impl Cbor for DeclareFaultsParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
#[serde(transparent)]
pub struct DeclareFaultsRecoveredParams {
    pub recoveries: BitField,
}

impl Cbor for DeclareFaultsRecoveredParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct ReportConsensusFaultParams {
    #[serde(with = "serde_bytes")]
    pub header1: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub header2: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub header_extra: Vec<u8>,
}

impl Cbor for ReportConsensusFaultParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
#[serde(transparent)]
pub struct WithdrawBalanceParams {
    pub amount_requested: TokenAmount,
}

impl Cbor for WithdrawBalanceParams {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i64)]
pub enum CronEventType {
    WorkerKeyChange = 0,
    PreCommitExpiry = 1,
    ProvingPeriod = 2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct CronEventPayload {
    pub event_type: CronEventType,
    pub sectors: Option<BitField>,
}

impl Cbor for CronEventPayload {}
