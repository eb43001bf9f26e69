//! In-memory range index.
//!
//! Active bindings are sorted by start address; `reach[i]` holds the largest end
//! address among `entries[..=i]`. A lookup binary-searches the last binding that
//! starts at or before the address and walks backwards only while `reach` still
//! covers it, so disjoint ranges cost one binary search.

use async_trait::async_trait;

use super::{IpRangeBinding, RangeDirectory, UserId};
use crate::iplogin::address::AddressKey;
use crate::iplogin::error::Result;

#[derive(Clone, Debug, Default)]
pub struct MemoryRangeDirectory {
    entries: Vec<IpRangeBinding>,
    reach: Vec<AddressKey>,
}

impl MemoryRangeDirectory {
    /// Build the index. Inactive bindings are dropped up front.
    pub fn new(bindings: impl IntoIterator<Item = IpRangeBinding>) -> Self {
        let mut entries: Vec<IpRangeBinding> = bindings
            .into_iter()
            .filter(IpRangeBinding::active)
            .collect();
        entries.sort_by_key(|binding| (binding.ip_start(), binding.user_id()));

        let mut reach = Vec::with_capacity(entries.len());
        let mut furthest: Option<AddressKey> = None;
        for binding in &entries {
            let next = furthest.map_or(binding.ip_end(), |end| end.max(binding.ip_end()));
            reach.push(next);
            furthest = Some(next);
        }

        Self { entries, reach }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Synchronous form of [`RangeDirectory::lookup`].
    #[must_use]
    pub fn find(&self, address: AddressKey) -> Option<UserId> {
        let upper = self
            .entries
            .partition_point(|binding| binding.ip_start() <= address);

        let mut winner: Option<UserId> = None;
        for index in (0..upper).rev() {
            if self.reach[index] < address {
                break;
            }
            let binding = &self.entries[index];
            if binding.ip_end() >= address {
                winner = winner.max(Some(binding.user_id()));
            }
        }
        winner
    }
}

#[async_trait]
impl RangeDirectory for MemoryRangeDirectory {
    async fn lookup(&self, address: AddressKey) -> Result<Option<UserId>> {
        Ok(self.find(address))
    }
}
