// src/matching/blocking.rs - Partition records into candidate-duplicate blocks
use std::collections::HashMap;

use crate::matching::normalize::normalize_name;
use crate::models::OrganizationRecord;

/// `normalize(name) + "_" + lower(trim(country))`.
///
/// The separator is not escaped, so distinct pairs can share a key: name
/// "a_b" in country "c" and name "a" in country "b_c" both give "a_b_c".
/// Such records land in one block and are still compared pairwise.
pub fn blocking_key(org: &OrganizationRecord) -> String {
    format!(
        "{}_{}",
        normalize_name(&org.name),
        org.country.trim().to_lowercase()
    )
}

#[derive(Debug, Clone)]
pub struct Block {
    pub key: String,
    pub members: Vec<OrganizationRecord>,
}

impl Block {
    pub fn needs_comparison(&self) -> bool {
        self.members.len() > 1
    }
}

/// Blocks in order of each key's first appearance in the input, so repeated
/// runs over the same input visit blocks identically.
#[derive(Debug, Clone, Default)]
pub struct BlockingIndex {
    blocks: Vec<Block>,
}

impl BlockingIndex {
    pub fn build(records: Vec<OrganizationRecord>) -> Self {
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut blocks: Vec<Block> = Vec::new();

        for record in records {
            let key = blocking_key(&record);
            match positions.get(&key) {
                Some(&idx) => blocks[idx].members.push(record),
                None => {
                    positions.insert(key.clone(), blocks.len());
                    blocks.push(Block {
                        key,
                        members: vec![record],
                    });
                }
            }
        }
        Self { blocks }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn candidate_block_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.needs_comparison()).count()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn org(id: &str, name: &str, country: &str) -> OrganizationRecord {
        OrganizationRecord::new(id, name, country, Utc::now())
    }

    #[test]
    fn test_blocking_key_format() {
        assert_eq!(blocking_key(&org("1", "The Fire Corp.", "USA")), "fire_usa");
    }

    #[test]
    fn test_blocking_key_invariants() {
        let base = blocking_key(&org("1", "Cal Fire", "USA"));
        assert_eq!(blocking_key(&org("2", "THE CAL FIRE", "usa")), base);
        assert_eq!(blocking_key(&org("3", "the Cal Fire", "  USA  ")), base);
        assert_ne!(blocking_key(&org("4", "Cal Fire", "Canada")), base);
    }

    #[test]
    fn test_blocking_key_separator_can_collide() {
        let left = org("1", "a_b", "c");
        let right = org("2", "a", "b_c");
        assert_eq!(blocking_key(&left), "a_b_c");
        assert_eq!(blocking_key(&left), blocking_key(&right));

        let index = BlockingIndex::build(vec![left, right]);
        assert_eq!(index.blocks().len(), 1);
    }

    #[test]
    fn test_index_groups_and_preserves_first_appearance_order() {
        let index = BlockingIndex::build(vec![
            org("1", "Cal Fire", "USA"),
            org("2", "Red Cross", "USA"),
            org("3", "The Cal Fire", "USA"),
            org("4", "Cal Fire", "Australia"),
        ]);

        assert_eq!(index.len(), 3);
        assert_eq!(index.candidate_block_count(), 1);

        let blocks = index.blocks();
        assert_eq!(blocks[0].key, "cal fire_usa");
        let ids: Vec<&str> = blocks[0].members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(blocks[1].key, "red cross_usa");
        assert!(!blocks[1].needs_comparison());
        assert_eq!(blocks[2].key, "cal fire_australia");
    }

    #[test]
    fn test_empty_index() {
        let index = BlockingIndex::build(Vec::new());
        assert!(index.is_empty());
        assert_eq!(index.candidate_block_count(), 0);
    }
}
