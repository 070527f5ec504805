//! Per-type member table

use super::types::MemberInfo;
use rustc_hash::FxHashMap;

/// Members declared by a single type, indexed by slot name
///
/// Inherited members are not copied; lookups walk the parent chain.
#[derive(Debug, Clone, Default)]
pub struct VTable {
    /// Members in declaration order
    members: Vec<MemberInfo>,
    /// Slot name to member index
    index: FxHashMap<String, usize>,
}

impl VTable {
    /// Create a new empty vtable
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member, replacing an earlier declaration of the same slot
    pub fn add_member(&mut self, member: MemberInfo) {
        match self.index.get(&member.name) {
            Some(&slot) => self.members[slot] = member,
            None => {
                self.index.insert(member.name.clone(), self.members.len());
                self.members.push(member);
            }
        }
    }

    /// Get member by slot name
    pub fn get(&self, name: &str) -> Option<&MemberInfo> {
        self.index.get(name).and_then(|slot| self.members.get(*slot))
    }

    /// Check if a slot is declared here
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Iterate over members in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &MemberInfo> {
        self.members.iter()
    }

    /// Get number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
