// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

#![allow(dead_code)]

use cid::Cid;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::piece::PaddedPieceSize;
use fvm_shared::sector::{SectorSize, StoragePower};
use fvm_shared::{MethodNum, METHOD_SEND};
use num_traits::Zero;

use fil_actor_market::ext::verifreg::{RestoreBytesParams, UseBytesParams};
use fil_actor_market::{
    Actor as MarketActor, ClientDealProposal, DealProposal, DealState, Method,
    PublishStorageDealsParams, PublishStorageDealsReturn, State,
    VerifyDealsOnSectorProveCommitParams, VerifyDealsOnSectorProveCommitReturn,
    WithdrawBalanceParams,
};
use fil_actors_runtime::runtime::Type;
use fil_actors_runtime::test_utils::*;
use fil_actors_runtime::{
    ActorError, BURNT_FUNDS_ACTOR_ADDR, STORAGE_MARKET_ACTOR_ADDR, SYSTEM_ACTOR_ADDR,
    VERIFIED_REGISTRY_ACTOR_ADDR,
};

pub const OWNER_ID: u64 = 101;
pub const PROVIDER_ID: u64 = 102;
pub const WORKER_ID: u64 = 103;
pub const CLIENT_ID: u64 = 104;

pub const OWNER_ADDR: Address = Address::new_id(OWNER_ID);
pub const PROVIDER_ADDR: Address = Address::new_id(PROVIDER_ID);
pub const WORKER_ADDR: Address = Address::new_id(WORKER_ID);
pub const CLIENT_ADDR: Address = Address::new_id(CLIENT_ID);

pub const MINER_CONTROL_ADDRESSES_METHOD: MethodNum = 2;

/// Mirrors the return shape of the miner actor's ControlAddresses method.
#[derive(Serialize_tuple, Deserialize_tuple)]
pub struct MinerControlAddrs {
    pub owner: Address,
    pub worker: Address,
}

pub fn setup() -> MockRuntime {
    let mut rt = MockRuntime {
        receiver: STORAGE_MARKET_ACTOR_ADDR,
        caller: SYSTEM_ACTOR_ADDR,
        caller_type: *INIT_ACTOR_CODE_ID,
        ..Default::default()
    };
    rt.actor_code_cids.insert(OWNER_ADDR, *ACCOUNT_ACTOR_CODE_ID);
    rt.actor_code_cids.insert(WORKER_ADDR, *ACCOUNT_ACTOR_CODE_ID);
    rt.actor_code_cids.insert(CLIENT_ADDR, *ACCOUNT_ACTOR_CODE_ID);
    rt.actor_code_cids.insert(PROVIDER_ADDR, *MINER_ACTOR_CODE_ID);

    construct_and_verify(&mut rt);
    rt
}

pub fn construct_and_verify(rt: &mut MockRuntime) {
    rt.set_caller(*SYSTEM_ACTOR_CODE_ID, SYSTEM_ACTOR_ADDR);
    rt.expect_validate_caller_addr(vec![SYSTEM_ACTOR_ADDR]);
    assert_eq!(
        RawBytes::default(),
        rt.call::<MarketActor>(Method::Constructor as u64, &RawBytes::default()).unwrap()
    );
    rt.verify();
}

pub fn get_state(rt: &MockRuntime) -> State {
    rt.get_state::<State>()
}

pub fn get_escrow_balance(rt: &MockRuntime, addr: &Address) -> TokenAmount {
    let st = get_state(rt);
    st.get_escrow_balance(rt.store(), addr).unwrap()
}

pub fn get_locked_balance(rt: &MockRuntime, addr: &Address) -> TokenAmount {
    let st = get_state(rt);
    st.get_locked_balance(rt.store(), addr).unwrap()
}

pub fn expect_get_control_addresses(rt: &mut MockRuntime, provider: Address) {
    let ret = MinerControlAddrs { owner: OWNER_ADDR, worker: WORKER_ADDR };
    rt.expect_send(
        provider,
        MINER_CONTROL_ADDRESSES_METHOD,
        RawBytes::default(),
        TokenAmount::zero(),
        RawBytes::serialize(ret).unwrap(),
        ExitCode::OK,
    )
}

/// Adds escrow for a simple account party.
pub fn add_participant_funds(rt: &mut MockRuntime, addr: Address, amount: TokenAmount) {
    rt.set_value(amount.clone());
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, addr);
    rt.expect_validate_caller_type(vec![Type::Account, Type::Multisig]);

    assert!(rt
        .call::<MarketActor>(Method::AddBalance as u64, &RawBytes::serialize(addr).unwrap())
        .is_ok());
    rt.verify();

    rt.add_balance(amount);
}

/// Adds escrow for a miner party, routed through its control addresses.
pub fn add_provider_funds(rt: &mut MockRuntime, provider: Address, amount: TokenAmount) {
    rt.set_value(amount.clone());
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, OWNER_ADDR);
    expect_get_control_addresses(rt, provider);
    rt.expect_validate_caller_addr(vec![OWNER_ADDR, WORKER_ADDR]);

    assert!(rt
        .call::<MarketActor>(Method::AddBalance as u64, &RawBytes::serialize(provider).unwrap())
        .is_ok());
    rt.verify();

    rt.add_balance(amount);
}

pub fn withdraw_client_balance(
    rt: &mut MockRuntime,
    client: Address,
    withdraw_amount: TokenAmount,
    expected_send: TokenAmount,
) {
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, client);
    rt.expect_validate_caller_type(vec![Type::Account, Type::Multisig]);
    rt.expect_send(
        client,
        METHOD_SEND,
        RawBytes::default(),
        expected_send,
        RawBytes::default(),
        ExitCode::OK,
    );

    let params = WithdrawBalanceParams { provider_or_client: client, amount: withdraw_amount };
    rt.call::<MarketActor>(Method::WithdrawBalance as u64, &RawBytes::serialize(params).unwrap())
        .unwrap();
    rt.verify();
}

pub fn generate_deal_proposal(
    client: Address,
    provider: Address,
    start_epoch: ChainEpoch,
    end_epoch: ChainEpoch,
) -> DealProposal {
    let piece_cid = make_piece_cid("1".as_bytes());
    DealProposal {
        piece_cid,
        piece_size: PaddedPieceSize(1024),
        verified_deal: false,
        client,
        provider,
        label: "label".to_string(),
        start_epoch,
        end_epoch,
        storage_price_per_epoch: TokenAmount::from_atto(1),
        provider_collateral: TokenAmount::from_atto(10),
        client_collateral: TokenAmount::from_atto(5),
    }
}

pub fn sign_proposal(proposal: &DealProposal) -> ClientDealProposal {
    ClientDealProposal {
        proposal: proposal.clone(),
        client_signature: Signature::new_bls(b"does not matter".to_vec()),
    }
}

/// Publishes deals from a single provider, with all mock expectations, returning the new ids.
pub fn publish_deals(rt: &mut MockRuntime, proposals: &[DealProposal]) -> Vec<DealID> {
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, WORKER_ADDR);
    rt.expect_validate_caller_type(vec![Type::Account, Type::Multisig]);

    expect_get_control_addresses(rt, proposals[0].provider);

    let mut deals: Vec<ClientDealProposal> = Vec::new();
    for proposal in proposals {
        if proposal.verified_deal {
            rt.expect_send(
                VERIFIED_REGISTRY_ACTOR_ADDR,
                fil_actor_market::ext::verifreg::USE_BYTES_METHOD,
                RawBytes::serialize(UseBytesParams {
                    address: proposal.client,
                    deal_size: StoragePower::from(proposal.piece_size.0),
                })
                .unwrap(),
                TokenAmount::zero(),
                RawBytes::default(),
                ExitCode::OK,
            );
        }
        deals.push(sign_proposal(proposal));
    }

    for deal in &deals {
        let buf = RawBytes::serialize(&deal.proposal).expect("failed to marshal deal proposal");
        rt.expect_verify_signature(ExpectedVerifySig {
            sig: deal.client_signature.clone(),
            signer: deal.proposal.client,
            plaintext: buf.to_vec(),
            result: Ok(()),
        });
    }

    // No pre-existing deals require updates in these tests, so the slash burn is always zero.
    rt.expect_send(
        BURNT_FUNDS_ACTOR_ADDR,
        METHOD_SEND,
        RawBytes::default(),
        TokenAmount::zero(),
        RawBytes::default(),
        ExitCode::OK,
    );

    let params = PublishStorageDealsParams { deals };
    let ret: PublishStorageDealsReturn = rt
        .call::<MarketActor>(
            Method::PublishStorageDeals as u64,
            &RawBytes::serialize(params).unwrap(),
        )
        .unwrap()
        .deserialize()
        .unwrap();
    rt.verify();

    assert_eq!(ret.ids.len(), proposals.len());
    ret.ids
}

/// Activates deals as the provider, as during a sector prove-commit.
pub fn activate_deals(
    rt: &mut MockRuntime,
    deal_ids: &[DealID],
    sector_expiry: ChainEpoch,
) -> VerifyDealsOnSectorProveCommitReturn {
    rt.set_caller(*MINER_ACTOR_CODE_ID, PROVIDER_ADDR);
    rt.expect_validate_caller_type(vec![Type::Miner]);

    let params = VerifyDealsOnSectorProveCommitParams {
        deal_ids: deal_ids.to_vec(),
        sector_size: SectorSize::_2KiB,
        sector_expiry,
    };
    let ret: VerifyDealsOnSectorProveCommitReturn = rt
        .call::<MarketActor>(
            Method::VerifyDealsOnSectorProveCommit as u64,
            &RawBytes::serialize(params).unwrap(),
        )
        .unwrap()
        .deserialize()
        .unwrap();
    rt.verify();
    ret
}

/// Drives the deferred update for a set of deals, expecting `expected_burn` to be slashed.
pub fn handle_expired_deals(rt: &mut MockRuntime, deal_ids: &[DealID], expected_burn: TokenAmount) {
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, CLIENT_ADDR);
    rt.expect_validate_caller_type(vec![Type::Account, Type::Multisig]);
    rt.expect_send(
        BURNT_FUNDS_ACTOR_ADDR,
        METHOD_SEND,
        RawBytes::default(),
        expected_burn,
        RawBytes::default(),
        ExitCode::OK,
    );

    rt.call::<MarketActor>(
        Method::HandleExpiredDeals as u64,
        &RawBytes::serialize(deal_ids.to_vec()).unwrap(),
    )
    .unwrap();
    rt.verify();
}

pub fn handle_init_timeout_deals(
    rt: &mut MockRuntime,
    deal_ids: &[DealID],
    restore_bytes_for: &[&DealProposal],
    expected_burn: TokenAmount,
) -> Result<RawBytes, ActorError> {
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, CLIENT_ADDR);
    rt.expect_validate_caller_type(vec![Type::Account, Type::Multisig]);
    for proposal in restore_bytes_for {
        rt.expect_send(
            VERIFIED_REGISTRY_ACTOR_ADDR,
            fil_actor_market::ext::verifreg::RESTORE_BYTES_METHOD,
            RawBytes::serialize(RestoreBytesParams {
                address: proposal.client,
                deal_size: StoragePower::from(proposal.piece_size.0),
            })
            .unwrap(),
            TokenAmount::zero(),
            RawBytes::default(),
            ExitCode::OK,
        );
    }
    rt.expect_send(
        BURNT_FUNDS_ACTOR_ADDR,
        METHOD_SEND,
        RawBytes::default(),
        expected_burn,
        RawBytes::default(),
        ExitCode::OK,
    );

    let res = rt.call::<MarketActor>(
        Method::HandleInitTimeoutDeals as u64,
        &RawBytes::serialize(deal_ids.to_vec()).unwrap(),
    );
    if res.is_ok() {
        rt.verify();
    } else {
        rt.reset();
    }
    res
}

pub fn terminate_deals(rt: &mut MockRuntime, deal_ids: &[DealID]) {
    rt.set_caller(*MINER_ACTOR_CODE_ID, PROVIDER_ADDR);
    rt.expect_validate_caller_type(vec![Type::Miner]);

    rt.call::<MarketActor>(
        Method::OnMinerSectorsTerminate as u64,
        &RawBytes::serialize(deal_ids.to_vec()).unwrap(),
    )
    .unwrap();
    rt.verify();
}

pub fn get_deal_state(rt: &MockRuntime, deal_id: DealID) -> DealState {
    let st = get_state(rt);
    st.must_get_deal_state(rt.store(), deal_id).unwrap()
}

pub fn get_deal_proposal(rt: &MockRuntime, deal_id: DealID) -> DealProposal {
    let st = get_state(rt);
    st.must_get_deal(rt.store(), deal_id).unwrap()
}

pub fn assert_deal_deleted(rt: &MockRuntime, deal_id: DealID) {
    let st = get_state(rt);
    assert!(st.must_get_deal(rt.store(), deal_id).is_err());
    assert!(st.must_get_deal_state(rt.store(), deal_id).is_err());
}

pub fn check_state(rt: &MockRuntime) {
    let (_, acc) = fil_actor_market::testing::check_state_invariants(&get_state(rt), rt.store());
    acc.assert_empty();
}

#[allow(dead_code)]
pub fn piece_cid_for_deal() -> Cid {
    make_piece_cid("1".as_bytes())
}
