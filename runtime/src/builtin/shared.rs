// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::MethodNum;
use num_traits::Zero;

use crate::runtime::{Runtime, Type};
use crate::{cbor, ActorError};

/// Types of actors which can originate signed messages.
pub const CALLER_TYPES_SIGNABLE: &[Type] = &[Type::Account, Type::Multisig];

/// Method number of the miner actor's ControlAddresses method.
pub const MINER_CONTROL_ADDRESSES_METHOD: MethodNum = 2;

#[derive(Serialize_tuple, Deserialize_tuple)]
struct MinerAddrs {
    owner: Address,
    worker: Address,
}

/// Fetches the owner and worker addresses of a miner actor.
pub fn request_miner_control_addrs<BS, RT>(
    rt: &mut RT,
    miner_addr: Address,
) -> Result<(Address, Address), ActorError>
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    let ret = rt.send(
        miner_addr,
        MINER_CONTROL_ADDRESSES_METHOD,
        RawBytes::default(),
        TokenAmount::zero(),
    )?;
    let addrs: MinerAddrs = cbor::deserialize(&ret, "miner control addresses")?;

    Ok((addrs.owner, addrs.worker))
}
