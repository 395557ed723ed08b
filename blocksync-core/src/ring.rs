//! Consistent hash ring for block placement
//!
//! Servers sit on the ring at `sha256(address)`. A block belongs to the first
//! server whose key is >= the block hash, wrapping to the smallest key. Adding
//! or removing one server only moves the blocks on its arc.

use crate::error::{Result, SyncError};
use crate::storage::compute_hash;
use crate::types::BlockStoreMap;
use std::collections::BTreeMap;
use std::ops::Bound;

#[derive(Debug, Clone, Default)]
pub struct ConsistentHashRing {
    // server hash -> address
    ring: BTreeMap<String, String>,
}

impl ConsistentHashRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_addrs<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ring = Self::new();
        for addr in addrs {
            ring.insert(addr.as_ref());
        }
        ring
    }

    pub fn hash(addr: &str) -> String {
        compute_hash(addr.as_bytes())
    }

    pub fn insert(&mut self, addr: &str) {
        self.ring.insert(Self::hash(addr), addr.to_string());
    }

    /// Returns false when the address was not on the ring.
    pub fn remove(&mut self, addr: &str) -> bool {
        self.ring.remove(&Self::hash(addr)).is_some()
    }

    pub fn responsible_server(&self, block_hash: &str) -> Result<&str> {
        self.ring
            .range::<str, _>((Bound::Included(block_hash), Bound::Unbounded))
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, addr)| addr.as_str())
            .ok_or(SyncError::NoServersAvailable)
    }

    /// Group block hashes by the server responsible for them.
    pub fn assign(&self, block_hashes: &[String]) -> Result<BlockStoreMap> {
        let mut map = BlockStoreMap::new();
        for hash in block_hashes {
            let addr = self.responsible_server(hash)?;
            map.entry(addr.to_string()).or_default().push(hash.clone());
        }
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Addresses in ring order.
    pub fn addrs(&self) -> impl Iterator<Item = &str> {
        self.ring.values().map(String::as_str)
    }
}
