// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::{Cbor, RawBytes};
use fvm_shared::bigint::bigint_ser;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::deal::DealID;
use fvm_shared::sector::{RegisteredSealProof, SectorSize};

use fil_actors_runtime::DealWeight;

pub mod account {
    pub const PUBKEY_ADDRESS_METHOD: u64 = 2;
}

pub mod market {
    use super::*;

    pub const VERIFY_DEALS_ON_SECTOR_PROVE_COMMIT_METHOD: u64 = 6;
    pub const ON_MINER_SECTORS_TERMINATE_METHOD: u64 = 7;
    pub const COMPUTE_DATA_COMMITMENT_METHOD: u64 = 8;

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq)]
    pub struct VerifyDealsOnSectorProveCommitParams {
        pub deal_ids: Vec<DealID>,
        pub sector_size: SectorSize,
        pub sector_expiry: ChainEpoch,
    }

    impl Cbor for VerifyDealsOnSectorProveCommitParams {}

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
    pub struct VerifyDealsOnSectorProveCommitReturn {
        #[serde(with = "bigint_ser")]
        pub deal_weight: DealWeight,
        #[serde(with = "bigint_ser")]
        pub verified_deal_weight: DealWeight,
    }

    impl Cbor for VerifyDealsOnSectorProveCommitReturn {}

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
    pub struct ComputeDataCommitmentParams {
        pub deal_ids: Vec<DealID>,
        pub sector_type: RegisteredSealProof,
    }

    impl Cbor for ComputeDataCommitmentParams {}

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
    #[serde(transparent)]
    pub struct OnMinerSectorsTerminateParams {
        pub deal_ids: Vec<DealID>,
    }

    impl Cbor for OnMinerSectorsTerminateParams {}
}

pub mod power {
    use super::*;
    use fvm_shared::econ::TokenAmount;

    pub const ENROLL_CRON_EVENT_METHOD: u64 = 4;
    pub const UPDATE_PLEDGE_TOTAL_METHOD: u64 = 6;

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
    pub struct EnrollCronEventParams {
        pub event_epoch: ChainEpoch,
        pub payload: RawBytes,
    }

    impl Cbor for EnrollCronEventParams {}

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
    #[serde(transparent)]
    pub struct UpdatePledgeTotalParams {
        pub pledge_delta: TokenAmount,
    }

    impl Cbor for UpdatePledgeTotalParams {}
}
