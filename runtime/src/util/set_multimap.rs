// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_bitfield::BitField;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_hamt::{BytesKey, Error as HamtError};
use fvm_shared::address::Address;
use fvm_shared::deal::DealID;
use fvm_shared::HAMT_BIT_WIDTH;

use crate::{make_empty_map, make_map_with_root_and_bitwidth, Map};

/// SetMultimap is a HAMT with bitfield values, keyed by address.
/// It acts as a multimap from an address to a set of deal ids, with the set
/// compressed as run-length encoded intervals. Union, difference and iteration
/// all operate on the encoded runs; iteration yields values in ascending order.
pub struct SetMultimap<'a, BS>(pub Map<'a, BS, BitField>);

impl<'a, BS: Blockstore> SetMultimap<'a, BS> {
    /// Initializes a new empty SetMultimap.
    pub fn new(bs: &'a BS) -> Self {
        Self(make_empty_map(bs, HAMT_BIT_WIDTH))
    }

    /// Initializes a SetMultimap from a root Cid.
    pub fn from_root(bs: &'a BS, cid: &Cid) -> Result<Self, HamtError> {
        Ok(Self(make_map_with_root_and_bitwidth(cid, bs, HAMT_BIT_WIDTH)?))
    }

    /// Retrieve root from the SetMultimap.
    #[inline]
    pub fn root(&mut self) -> Result<Cid, HamtError> {
        self.0.flush()
    }

    /// Puts a deal id in the set stored at the key, creating the set if absent.
    pub fn put(&mut self, key: &Address, value: DealID) -> Result<(), HamtError> {
        let mut set = self.get(key)?.unwrap_or_default();
        set.set(value);

        self.0.set(Self::key(key), set)?;
        Ok(())
    }

    /// Gets the set stored at the given key, if any.
    #[inline]
    pub fn get(&self, key: &Address) -> Result<Option<BitField>, HamtError> {
        Ok(self.0.get(&Self::key(key))?.cloned())
    }

    /// Removes a deal id from the set stored at the key, if present.
    #[inline]
    pub fn remove(&mut self, key: &Address, v: DealID) -> Result<(), HamtError> {
        let mut set = match self.get(key)? {
            Some(s) => s,
            None => return Ok(()),
        };
        set.unset(v);

        if set.is_empty() {
            self.0.delete(&Self::key(key))?;
        } else {
            self.0.set(Self::key(key), set)?;
        }
        Ok(())
    }

    /// Removes the whole set stored at the key.
    #[inline]
    pub fn remove_all(&mut self, key: &Address) -> Result<(), HamtError> {
        self.0.delete(&Self::key(key))?;
        Ok(())
    }

    /// Iterates through all deal ids for a key, in ascending order.
    pub fn for_each<F>(&self, key: &Address, mut f: F) -> anyhow::Result<()>
    where
        F: FnMut(DealID) -> anyhow::Result<()>,
    {
        let set = match self.get(key)? {
            Some(s) => s,
            None => return Ok(()),
        };

        for id in set.iter() {
            f(id)?;
        }
        Ok(())
    }

    #[inline]
    fn key(key: &Address) -> BytesKey {
        key.to_bytes().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fvm_ipld_blockstore::MemoryBlockstore;

    #[test]
    fn put_remove_iterate() {
        let store = MemoryBlockstore::new();
        let mut smm = SetMultimap::new(&store);

        let addr = Address::new_id(100);
        smm.put(&addr, 8).unwrap();
        smm.put(&addr, 2).unwrap();
        smm.put(&addr, 5).unwrap();

        let mut seen = Vec::new();
        smm.for_each(&addr, |id| {
            seen.push(id);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![2, 5, 8]);

        smm.remove(&addr, 5).unwrap();
        assert_eq!(smm.get(&addr).unwrap().unwrap().len(), 2);

        smm.remove_all(&addr).unwrap();
        assert!(smm.get(&addr).unwrap().is_none());
    }

    #[test]
    fn remove_all_absent_key() {
        let store = MemoryBlockstore::new();
        let mut smm = SetMultimap::new(&store);
        smm.remove_all(&Address::new_id(42)).expect("expected no error");
    }
}
