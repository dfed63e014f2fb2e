// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::Cbor;
use fvm_shared::address::Address;
use fvm_shared::bigint::bigint_ser;
use fvm_shared::sector::StoragePower;

pub mod account {
    pub const PUBKEY_ADDRESS_METHOD: u64 = 2;
}

pub mod miner {
    use super::*;

    pub const CONTROL_ADDRESSES_METHOD: u64 = 2;

    #[derive(Serialize_tuple, Deserialize_tuple)]
    pub struct GetControlAddressesReturnParams {
        pub owner: Address,
        pub worker: Address,
    }
}

pub mod verifreg {
    use super::*;

    pub const USE_BYTES_METHOD: u64 = 5;
    pub const RESTORE_BYTES_METHOD: u64 = 6;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
    pub struct UseBytesParams {
        /// Address of verified client.
        pub address: Address,
        /// Number of bytes to use.
        #[serde(with = "bigint_ser")]
        pub deal_size: StoragePower,
    }

    impl Cbor for UseBytesParams {}

    #[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
    pub struct RestoreBytesParams {
        /// Address of verified client.
        pub address: Address,
        /// Number of bytes to restore.
        #[serde(with = "bigint_ser")]
        pub deal_size: StoragePower,
    }

    impl Cbor for RestoreBytesParams {}
}
