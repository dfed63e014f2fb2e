// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::anyhow;
use cid::multihash::Code;
use cid::Cid;
use fvm_ipld_bitfield::BitField;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::{serde_bytes, Cbor, CborStore};
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::sector::{SectorNumber, SectorSize};
use num_traits::Zero;

use fil_actors_runtime::{make_map_with_root, Array};

use super::deadlines::{compute_proving_period_deadline, DeadlineInfo};
use super::policy::*;
use super::types::{SectorOnChainInfo, SectorPreCommitOnChainInfo};

/// Balance of a Miner Actor should be greater than or equal to
/// the sum of PreCommitDeposits and LockedFunds.
/// Excess balance as computed by `get_available_balance` will be
/// withdrawable or usable for pre-commit deposit or pledge lock-up.
#[derive(Clone, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct State {
    /// Information not related to sectors.
    pub info: MinerInfo,

    /// Total funds locked as pre-commit deposits
    pub pre_commit_deposits: TokenAmount,
    /// Total unvested funds locked as pledge collateral
    pub locked_funds: TokenAmount,
    /// Array, AMT[ChainEpoch]TokenAmount
    pub vesting_funds: Cid,

    /// Sectors that have been pre-committed but not yet proven.
    /// Map, HAMT[SectorNumber]SectorPreCommitOnChainInfo
    pub pre_committed_sectors: Cid,

    /// Information for all proven and not-yet-expired sectors.
    /// Array, AMT[SectorNumber]SectorOnChainInfo (sparse)
    pub sectors: Cid,

    /// Sector numbers prove-committed since period start, to be added to Deadlines at next
    /// proving period boundary.
    pub new_sectors: BitField,

    /// Sector numbers indexed by expiry epoch (which are on proving period boundaries).
    /// Invariant: Keys(Sectors) == union(SectorExpirations.Values())
    /// Array, AMT[ChainEpoch]BitField
    pub sector_expirations: Cid,

    /// The sector numbers due for PoSt at each deadline in the current proving period, frozen
    /// at period start. New sectors are added and expired ones removed at proving period boundary.
    /// Faults are not subtracted from this in state, but on the fly.
    pub deadlines: Cid,

    /// All currently known faulty sectors, mutated eagerly.
    /// These sectors are exempt from inclusion in PoSt.
    pub faults: BitField,

    /// Faulty sector numbers indexed by the start epoch of the proving period in which detected.
    /// Used to track fault durations for eventual sector termination.
    /// At most 14 entries, b/c sectors faulty longer expire.
    /// Invariant: Faults == union(FaultEpochs.Values())
    /// AMT[ChainEpoch]BitField
    pub fault_epochs: Cid,

    /// Faulty sectors that will recover when next included in a valid PoSt.
    /// Invariant: Recoveries ⊆ Faults.
    pub recoveries: BitField,

    /// Records successful PoSt submission in the current proving period by partition number.
    /// The presence of a partition number indicates on-time PoSt received.
    pub post_submissions: BitField,
}

impl Cbor for State {}

#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct MinerInfo {
    /// Account that owns this miner.
    /// - Income and returned collateral are paid to this address.
    /// - This address is also allowed to change the worker address for the miner.
    /// Must be an ID-address.
    pub owner: Address,

    /// Worker account for this miner.
    /// The associated pubkey-type address is used to sign blocks and messages on behalf of this
    /// miner. Must be an ID-address.
    pub worker: Address,

    pub pending_worker_key: Option<WorkerKeyChange>,

    /// Libp2p identity that should be used when connecting to this miner.
    #[serde(with = "serde_bytes")]
    pub peer_id: Vec<u8>,

    /// Amount of space in each sector committed to the network by this miner.
    pub sector_size: SectorSize,

    /// The offset of this miner's proving period from zero.
    /// An un-changing number in range [0, proving period).
    /// A miner's current proving period start is the highest multiple of this boundary
    /// <= the current epoch.
    pub proving_period_boundary: ChainEpoch,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct WorkerKeyChange {
    /// Must be an ID address
    pub new_worker: Address,
    pub effective_at: ChainEpoch,
}

/// A bitfield of sector numbers due at each deadline.
/// The sectors for each deadline are logically grouped into sequential partitions for proving.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
#[serde(transparent)]
pub struct Deadlines {
    pub due: Vec<BitField>,
}

impl Cbor for Deadlines {}

impl Default for Deadlines {
    fn default() -> Self {
        Self::new()
    }
}

impl Deadlines {
    pub fn new() -> Self {
        Self { due: vec![BitField::new(); WPOST_PERIOD_DEADLINES as usize] }
    }

    /// Adds sector numbers to a deadline.
    pub fn add_to_deadline(
        &mut self,
        deadline: u64,
        new_sectors: &[u64],
    ) -> anyhow::Result<()> {
        let ns = BitField::try_from_bits(new_sectors.iter().copied())?;
        let due = self
            .due
            .get_mut(deadline as usize)
            .ok_or_else(|| anyhow!("invalid deadline index {}", deadline))?;
        *due = &*due | &ns;
        Ok(())
    }

    /// Removes sector numbers from all deadlines.
    pub fn remove_from_all_deadlines(&mut self, sector_nos: &BitField) {
        for due in self.due.iter_mut() {
            *due = &*due - sector_nos;
        }
    }
}

impl State {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        empty_array_cid: Cid,
        empty_map_cid: Cid,
        empty_deadlines_cid: Cid,
        owner_addr: Address,
        worker_addr: Address,
        peer_id: Vec<u8>,
        sector_size: SectorSize,
        period_boundary: ChainEpoch,
    ) -> Self {
        Self {
            info: MinerInfo {
                owner: owner_addr,
                worker: worker_addr,
                pending_worker_key: None,
                peer_id,
                sector_size,
                proving_period_boundary: period_boundary,
            },

            pre_commit_deposits: TokenAmount::zero(),
            locked_funds: TokenAmount::zero(),
            vesting_funds: empty_array_cid,

            pre_committed_sectors: empty_map_cid,
            sectors: empty_array_cid,
            new_sectors: BitField::new(),
            sector_expirations: empty_array_cid,
            deadlines: empty_deadlines_cid,
            faults: BitField::new(),
            fault_epochs: empty_array_cid,
            recoveries: BitField::new(),
            post_submissions: BitField::new(),
        }
    }

    pub fn get_worker(&self) -> Address {
        self.info.worker
    }

    pub fn get_sector_size(&self) -> SectorSize {
        self.info.sector_size
    }

    /// Computes the current proving period deadline info.
    pub fn deadline_info(&self, curr_epoch: ChainEpoch) -> DeadlineInfo {
        compute_proving_period_deadline(self.info.proving_period_boundary, curr_epoch)
    }

    pub fn get_sector_count<BS: Blockstore>(&self, store: &BS) -> anyhow::Result<u64> {
        let sectors = Array::<SectorOnChainInfo, BS>::load(&self.sectors, store)?;
        Ok(sectors.count())
    }

    pub fn get_max_allowed_faults<BS: Blockstore>(&self, store: &BS) -> anyhow::Result<u64> {
        let sector_count = self.get_sector_count(store)?;
        Ok(2 * sector_count)
    }

    //
    // Pre-committed sectors
    //

    pub fn put_precommitted_sector<BS: Blockstore>(
        &mut self,
        store: &BS,
        info: SectorPreCommitOnChainInfo,
    ) -> anyhow::Result<()> {
        let mut precommitted =
            make_map_with_root::<_, SectorPreCommitOnChainInfo>(&self.pre_committed_sectors, store)?;

        precommitted
            .set(sector_key(info.info.sector_number), info)
            .map_err(|e| anyhow!("failed to store precommitment: {}", e))?;

        self.pre_committed_sectors = precommitted.flush()?;
        Ok(())
    }

    pub fn get_precommitted_sector<BS: Blockstore>(
        &self,
        store: &BS,
        sector_num: SectorNumber,
    ) -> anyhow::Result<Option<SectorPreCommitOnChainInfo>> {
        let precommitted =
            make_map_with_root::<_, SectorPreCommitOnChainInfo>(&self.pre_committed_sectors, store)?;

        Ok(precommitted
            .get(&sector_key(sector_num))
            .map_err(|e| anyhow!("failed to load precommitment for {}: {}", sector_num, e))?
            .cloned())
    }

    pub fn delete_precommitted_sector<BS: Blockstore>(
        &mut self,
        store: &BS,
        sector_num: SectorNumber,
    ) -> anyhow::Result<()> {
        let mut precommitted =
            make_map_with_root::<_, SectorPreCommitOnChainInfo>(&self.pre_committed_sectors, store)?;

        precommitted
            .delete(&sector_key(sector_num))
            .map_err(|e| anyhow!("failed to delete precommitment for {}: {}", sector_num, e))?;

        self.pre_committed_sectors = precommitted.flush()?;
        Ok(())
    }

    //
    // Sectors
    //

    pub fn has_sector_no<BS: Blockstore>(
        &self,
        store: &BS,
        sector_num: SectorNumber,
    ) -> anyhow::Result<bool> {
        let sectors = Array::<SectorOnChainInfo, BS>::load(&self.sectors, store)?;
        Ok(sectors.get(sector_num)?.is_some())
    }

    pub fn put_sector<BS: Blockstore>(
        &mut self,
        store: &BS,
        sector: SectorOnChainInfo,
    ) -> anyhow::Result<()> {
        let mut sectors = Array::load(&self.sectors, store)?;

        sectors
            .set(sector.info.sector_number, sector)
            .map_err(|e| anyhow!("failed to put sector: {}", e))?;

        self.sectors = sectors.flush()?;
        Ok(())
    }

    pub fn get_sector<BS: Blockstore>(
        &self,
        store: &BS,
        sector_num: SectorNumber,
    ) -> anyhow::Result<Option<SectorOnChainInfo>> {
        let sectors = Array::<SectorOnChainInfo, BS>::load(&self.sectors, store)?;
        Ok(sectors
            .get(sector_num)
            .map_err(|e| anyhow!("failed to get sector {}: {}", sector_num, e))?
            .cloned())
    }

    pub fn delete_sectors<BS: Blockstore>(
        &mut self,
        store: &BS,
        sector_nos: &BitField,
    ) -> anyhow::Result<()> {
        let mut sectors = Array::<SectorOnChainInfo, BS>::load(&self.sectors, store)?;

        for sector_num in sector_nos.iter() {
            sectors
                .delete(sector_num)
                .map_err(|e| anyhow!("failed to delete sector {}: {}", sector_num, e))?;
        }

        self.sectors = sectors.flush()?;
        Ok(())
    }

    /// Loads sector info for a sequence of sectors.
    pub fn load_sector_infos<BS: Blockstore>(
        &self,
        store: &BS,
        sectors: &BitField,
    ) -> anyhow::Result<Vec<SectorOnChainInfo>> {
        let mut sector_infos = Vec::new();
        for i in sectors.iter() {
            let sector_on_chain = self
                .get_sector(store, i)?
                .ok_or_else(|| anyhow!("can't find sector {}", i))?;
            sector_infos.push(sector_on_chain);
        }
        Ok(sector_infos)
    }

    /// Loads sector info for a sequence of sectors, substituting info for a stand-in sector
    /// for any that are faulty.
    pub fn load_sector_infos_with_fault_mask<BS: Blockstore>(
        &self,
        store: &BS,
        sectors: &BitField,
        faults: &BitField,
        fault_stand_in: SectorNumber,
    ) -> anyhow::Result<Vec<SectorOnChainInfo>> {
        let stand_in_info = self
            .get_sector(store, fault_stand_in)?
            .ok_or_else(|| anyhow!("can't find stand-in sector {}", fault_stand_in))?;

        // Load the sector infos, masking out fault sectors with a good one.
        let mut sector_infos = Vec::new();
        for i in sectors.iter() {
            let sector = if faults.get(i) {
                stand_in_info.clone()
            } else {
                self.get_sector(store, i)?
                    .ok_or_else(|| anyhow!("can't find sector {}", i))?
            };
            sector_infos.push(sector);
        }
        Ok(sector_infos)
    }

    //
    // New sectors
    //

    /// Adds some sector numbers to the new sectors bitfield.
    pub fn add_new_sectors(&mut self, sector_nos: &[SectorNumber]) -> anyhow::Result<()> {
        let ns = BitField::try_from_bits(sector_nos.iter().copied())?;
        self.new_sectors = &self.new_sectors | &ns;

        let count = self.new_sectors.len();
        if count > NEW_SECTORS_PER_PERIOD_MAX {
            return Err(anyhow!("too many new sectors {}, max {}", count, NEW_SECTORS_PER_PERIOD_MAX));
        }
        Ok(())
    }

    /// Removes some sector numbers from the new sectors bitfield, if present.
    pub fn remove_new_sectors(&mut self, sector_nos: &BitField) {
        self.new_sectors = &self.new_sectors - sector_nos;
    }

    /// Clears the new sectors bitfield.
    pub fn clear_new_sectors(&mut self) {
        self.new_sectors = BitField::new();
    }

    //
    // Sector expirations
    //

    /// Gets the sector numbers expiring at some epoch.
    pub fn get_sector_expirations<BS: Blockstore>(
        &self,
        store: &BS,
        expiry: ChainEpoch,
    ) -> anyhow::Result<BitField> {
        let arr = Array::<BitField, BS>::load(&self.sector_expirations, store)?;
        Ok(arr.get(epoch_key(expiry))?.cloned().unwrap_or_default())
    }

    /// Iterates sector expiration groups in order.
    pub fn for_each_sector_expiration<BS: Blockstore, F>(
        &self,
        store: &BS,
        mut f: F,
    ) -> anyhow::Result<()>
    where
        F: FnMut(ChainEpoch, &BitField) -> anyhow::Result<()>,
    {
        let arr = Array::<BitField, BS>::load(&self.sector_expirations, store)?;
        arr.for_each(|i, v| f(i as ChainEpoch, v))?;
        Ok(())
    }

    /// Adds some sector numbers to the set expiring at an epoch.
    /// The sector numbers are given as uint64s to avoid pointless conversions.
    pub fn add_sector_expirations<BS: Blockstore>(
        &mut self,
        store: &BS,
        expiry: ChainEpoch,
        sectors: &[u64],
    ) -> anyhow::Result<()> {
        let mut arr = Array::<BitField, BS>::load(&self.sector_expirations, store)?;

        let prev = arr.get(epoch_key(expiry))?.cloned().unwrap_or_default();
        let merged = &prev | &BitField::try_from_bits(sectors.iter().copied())?;
        if merged.len() > SECTORS_MAX {
            return Err(anyhow!(
                "too many sectors at expiration {}, {}, max {}",
                expiry,
                merged.len(),
                SECTORS_MAX
            ));
        }

        arr.set(epoch_key(expiry), merged)?;

        self.sector_expirations = arr.flush()?;
        Ok(())
    }

    /// Removes some sector numbers from the set expiring at an epoch.
    pub fn remove_sector_expirations<BS: Blockstore>(
        &mut self,
        store: &BS,
        expiry: ChainEpoch,
        sectors: &[u64],
    ) -> anyhow::Result<()> {
        let mut arr = Array::<BitField, BS>::load(&self.sector_expirations, store)?;

        let prev = arr.get(epoch_key(expiry))?.cloned().unwrap_or_default();
        let reduced = &prev - &BitField::try_from_bits(sectors.iter().copied())?;
        arr.set(epoch_key(expiry), reduced)?;

        self.sector_expirations = arr.flush()?;
        Ok(())
    }

    /// Removes all sector numbers from the set expiring some epochs.
    pub fn clear_sector_expirations<BS: Blockstore>(
        &mut self,
        store: &BS,
        expirations: &[ChainEpoch],
    ) -> anyhow::Result<()> {
        let mut arr = Array::<BitField, BS>::load(&self.sector_expirations, store)?;

        for &exp in expirations {
            arr.delete(epoch_key(exp))?;
        }

        self.sector_expirations = arr.flush()?;
        Ok(())
    }

    //
    // Faults
    //

    /// Adds sector numbers to faults and fault epochs.
    pub fn add_faults<BS: Blockstore>(
        &mut self,
        store: &BS,
        sector_nos: &BitField,
        fault_epoch: ChainEpoch,
    ) -> anyhow::Result<()> {
        if sector_nos.is_empty() {
            return Ok(());
        }

        self.faults = &self.faults | sector_nos;

        let count = self.faults.len();
        if count > SECTORS_MAX {
            return Err(anyhow!("too many faults {}, max {}", count, SECTORS_MAX));
        }

        let mut epoch_fault_arr = Array::<BitField, BS>::load(&self.fault_epochs, store)?;
        let prev = epoch_fault_arr.get(epoch_key(fault_epoch))?.cloned().unwrap_or_default();
        epoch_fault_arr.set(epoch_key(fault_epoch), &prev | sector_nos)?;

        self.fault_epochs = epoch_fault_arr.flush()?;
        Ok(())
    }

    /// Removes sector numbers from faults and fault epochs, if present.
    pub fn remove_faults<BS: Blockstore>(
        &mut self,
        store: &BS,
        sector_nos: &BitField,
    ) -> anyhow::Result<()> {
        if sector_nos.is_empty() {
            return Ok(());
        }

        self.faults = &self.faults - sector_nos;

        let mut arr = Array::<BitField, BS>::load(&self.fault_epochs, store)?;

        let mut changed: Vec<(u64, BitField)> = Vec::new();
        arr.for_each(|i, faults: &BitField| {
            let reduced = faults - sector_nos;
            if reduced.len() != faults.len() {
                changed.push((i, reduced));
            }
            Ok(())
        })?;

        for (i, field) in changed {
            arr.set(i, field)?;
        }

        self.fault_epochs = arr.flush()?;
        Ok(())
    }

    /// Iterates faults by declaration epoch, in order.
    pub fn for_each_fault_epoch<BS: Blockstore, F>(
        &self,
        store: &BS,
        mut f: F,
    ) -> anyhow::Result<()>
    where
        F: FnMut(ChainEpoch, &BitField) -> anyhow::Result<()>,
    {
        let arr = Array::<BitField, BS>::load(&self.fault_epochs, store)?;
        arr.for_each(|i, v| f(i as ChainEpoch, v))?;
        Ok(())
    }

    pub fn clear_fault_epochs<BS: Blockstore>(
        &mut self,
        store: &BS,
        epochs: &[ChainEpoch],
    ) -> anyhow::Result<()> {
        let mut arr = Array::<BitField, BS>::load(&self.fault_epochs, store)?;

        for &exp in epochs {
            arr.delete(epoch_key(exp))?;
        }

        self.fault_epochs = arr.flush()?;
        Ok(())
    }

    //
    // Recoveries
    //

    /// Adds sectors to recoveries.
    pub fn add_recoveries(&mut self, sector_nos: &BitField) -> anyhow::Result<()> {
        if sector_nos.is_empty() {
            return Ok(());
        }

        self.recoveries = &self.recoveries | sector_nos;

        let count = self.recoveries.len();
        if count > SECTORS_MAX {
            return Err(anyhow!("too many recoveries {}, max {}", count, SECTORS_MAX));
        }
        Ok(())
    }

    /// Removes sectors from recoveries, if present.
    pub fn remove_recoveries(&mut self, sector_nos: &BitField) {
        if sector_nos.is_empty() {
            return;
        }
        self.recoveries = &self.recoveries - sector_nos;
    }

    //
    // PoSt submissions
    //

    /// Adds partition numbers to the set of PoSt submissions.
    pub fn add_post_submissions(&mut self, partition_nos: &BitField) {
        self.post_submissions = &self.post_submissions | partition_nos;
    }

    /// Removes all PoSt submissions.
    pub fn clear_post_submissions(&mut self) {
        self.post_submissions = BitField::new();
    }

    //
    // Deadlines
    //

    pub fn load_deadlines<BS: Blockstore>(&self, store: &BS) -> anyhow::Result<Deadlines> {
        store
            .get_cbor::<Deadlines>(&self.deadlines)?
            .ok_or_else(|| anyhow!("failed to load deadlines ({})", self.deadlines))
    }

    pub fn save_deadlines<BS: Blockstore>(
        &mut self,
        store: &BS,
        deadlines: &Deadlines,
    ) -> anyhow::Result<()> {
        self.deadlines = store.put_cbor(deadlines, Code::Blake2b256)?;
        Ok(())
    }

    //
    // Funds and vesting
    //

    pub fn add_pre_commit_deposit(&mut self, amount: &TokenAmount) {
        self.pre_commit_deposits += amount;
    }

    pub fn subtract_pre_commit_deposit(&mut self, amount: &TokenAmount) {
        self.pre_commit_deposits -= amount;
    }

    /// Schedules new locked funds to vest according to the given spec.
    /// Nothing unlocks here, this just sets the clock running.
    pub fn add_locked_funds<BS: Blockstore>(
        &mut self,
        store: &BS,
        curr_epoch: ChainEpoch,
        vesting_sum: &TokenAmount,
        spec: &VestSpec,
    ) -> anyhow::Result<()> {
        if vesting_sum.is_negative() {
            return Err(anyhow!("negative vesting sum {}", vesting_sum));
        }
        let mut vesting_funds = Array::<TokenAmount, BS>::load(&self.vesting_funds, store)?;

        let vest_begin = curr_epoch + spec.initial_delay;

        let mut vested_so_far = TokenAmount::zero();
        let mut e = vest_begin + spec.step_duration;
        while &vested_so_far < vesting_sum {
            let vest_epoch = quantize_up(e, spec.quantization);
            let elapsed = vest_epoch - vest_begin;

            let target_vest = if elapsed < spec.vest_period {
                // Linear vesting, PARAM_FINISH
                (vesting_sum * elapsed).div_floor(spec.vest_period)
            } else {
                vesting_sum.clone()
            };

            let vest_this_time = &target_vest - &vested_so_far;
            vested_so_far = target_vest;

            // Load existing entry, else set a new one
            let key = epoch_key(vest_epoch);
            let locked_fund_entry = vesting_funds.get(key)?.cloned().unwrap_or_default();
            vesting_funds.set(key, locked_fund_entry + vest_this_time)?;

            e += spec.step_duration;
        }

        self.vesting_funds = vesting_funds.flush()?;
        self.locked_funds += vesting_sum;

        Ok(())
    }

    /// Unlocks an amount of funds that have *not yet vested*, if possible.
    /// The soonest-vesting entries are unlocked first.
    /// Returns the amount actually unlocked.
    pub fn unlock_unvested_funds<BS: Blockstore>(
        &mut self,
        store: &BS,
        curr_epoch: ChainEpoch,
        target: &TokenAmount,
    ) -> anyhow::Result<TokenAmount> {
        let mut vesting_funds = Array::<TokenAmount, BS>::load(&self.vesting_funds, store)?;

        let mut amount_unlocked = TokenAmount::zero();
        let mut to_delete = Vec::<u64>::new();
        let mut to_set = Vec::<(u64, TokenAmount)>::new();

        // Iterate vesting funds in order of release.
        vesting_funds.for_each_while(|k, locked_entry: &TokenAmount| {
            if &amount_unlocked >= target {
                return Ok(false);
            }
            if k as ChainEpoch >= curr_epoch {
                let unlock_amount =
                    std::cmp::min(target - &amount_unlocked, locked_entry.clone());
                amount_unlocked += &unlock_amount;
                let remaining = locked_entry - &unlock_amount;

                if remaining.is_zero() {
                    to_delete.push(k);
                } else {
                    to_set.push((k, remaining));
                }
            }
            Ok(true)
        })?;

        for (k, v) in to_set {
            vesting_funds.set(k, v)?;
        }
        delete_many(&mut vesting_funds, &to_delete)?;

        self.locked_funds -= &amount_unlocked;
        if self.locked_funds.is_negative() {
            return Err(anyhow!("negative locked funds {} after unlock", self.locked_funds));
        }
        self.vesting_funds = vesting_funds.flush()?;

        Ok(amount_unlocked)
    }

    /// Unlocks all vesting funds that have vested before the provided epoch.
    /// Returns the amount unlocked.
    pub fn unlock_vested_funds<BS: Blockstore>(
        &mut self,
        store: &BS,
        curr_epoch: ChainEpoch,
    ) -> anyhow::Result<TokenAmount> {
        let mut vesting_funds = Array::<TokenAmount, BS>::load(&self.vesting_funds, store)?;

        let mut amount_unlocked = TokenAmount::zero();
        let mut to_delete = Vec::<u64>::new();

        // Iterate vesting funds in order of release.
        vesting_funds.for_each_while(|k, locked_entry: &TokenAmount| {
            if (k as ChainEpoch) < curr_epoch {
                amount_unlocked += locked_entry;
                to_delete.push(k);
                Ok(true)
            } else {
                // stop iterating
                Ok(false)
            }
        })?;

        delete_many(&mut vesting_funds, &to_delete)?;

        self.locked_funds -= &amount_unlocked;
        if self.locked_funds.is_negative() {
            return Err(anyhow!("negative locked funds {} after vest", self.locked_funds));
        }
        self.vesting_funds = vesting_funds.flush()?;

        Ok(amount_unlocked)
    }

    pub fn get_available_balance(&self, actor_balance: &TokenAmount) -> TokenAmount {
        actor_balance - &self.locked_funds - &self.pre_commit_deposits
    }

    pub fn assert_balance_invariants(&self, balance: &TokenAmount) {
        assert!(!self.pre_commit_deposits.is_negative());
        assert!(!self.locked_funds.is_negative());
        assert!(balance >= &(&self.pre_commit_deposits + &self.locked_funds));
    }
}

//
// Misc helpers
//

fn delete_many<BS: Blockstore>(
    arr: &mut Array<TokenAmount, BS>,
    keys: &[u64],
) -> anyhow::Result<()> {
    // If AMT exposed a batch delete we could save some writes here.
    for &i in keys {
        arr.delete(i)?;
    }
    Ok(())
}

/// Rounds e to the nearest exact multiple of the quantization unit, rounding up.
/// Precondition: unit >= 0 else behaviour is undefined
pub fn quantize_up(e: ChainEpoch, unit: ChainEpoch) -> ChainEpoch {
    let remainder = e % unit;
    if remainder == 0 {
        return e;
    }
    e - remainder + unit
}

fn sector_key(e: SectorNumber) -> fvm_ipld_hamt::BytesKey {
    fil_actors_runtime::u64_key(e)
}

fn epoch_key(e: ChainEpoch) -> u64 {
    e as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_up_idempotent() {
        for (e, unit) in [(0, 10), (1, 10), (10, 10), (11, 7), (13, 1)] {
            let q = quantize_up(e, unit);
            assert_eq!(q, quantize_up(q, unit));
            assert!(q >= e);
            assert_eq!(0, q % unit);
        }
    }
}
