use std::collections::HashMap;

use crate::model::{BaseRecord, BusinessKey, MatchOutcome};

/// Business key → positions in the base dataset, first occurrence first.
///
/// A key is only present with at least one position.
#[derive(Debug, Default, Clone)]
pub struct KeyIndex {
    positions: HashMap<BusinessKey, Vec<usize>>,
}

impl KeyIndex {
    pub fn build(base: &[BaseRecord]) -> Self {
        let mut positions: HashMap<BusinessKey, Vec<usize>> = HashMap::new();
        for (pos, record) in base.iter().enumerate() {
            if let Some(key) = record.key {
                positions.entry(key).or_default().push(pos);
            }
        }
        Self { positions }
    }

    pub fn lookup(&self, key: BusinessKey) -> MatchOutcome<'_> {
        match self.positions.get(&key).map(Vec::as_slice) {
            None | Some([]) => MatchOutcome::NotFound,
            Some([pos]) => MatchOutcome::Unique(*pos),
            Some(all) => MatchOutcome::Duplicate(all),
        }
    }

    pub fn positions(&self, key: BusinessKey) -> &[usize] {
        self.positions.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn unique_keys(&self) -> usize {
        self.positions.len()
    }

    /// Keys that appear more than once in the base.
    pub fn duplicate_keys(&self) -> usize {
        self.positions.values().filter(|p| p.len() > 1).count()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
