//! Near-duplicate detection: group files whose perceptual hashes are
//! within a configurable Hamming distance of each other.
//!
//! `intersect_all_with_prefix` gives a cheap adjacency list (any two
//! fingerprints sharing a 16-bit part are *candidates*); this module does
//! the precise distance check and the union-find grouping on top.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::Configuration;
use crate::db::Handle;
use crate::domain::Fingerprint;
use crate::error::CoreResult;
use crate::path::Path;
use crate::repository;

pub struct DuplicateGroup {
    pub file_ids: Vec<Uuid>,
}

pub struct DuplicateFinderService {
    db: Arc<Handle>,
    config: Configuration,
}

impl DuplicateFinderService {
    pub fn new(db: Arc<Handle>, config: Configuration) -> Self {
        DuplicateFinderService { db, config }
    }

    /// Group every file under `path` whose fingerprint lies within
    /// `config.dedup_max_distance` of another's, transitively -- if `a` is
    /// close to `b` and `b` is close to `c`, all three land in one group
    /// even if `a` and `c` alone wouldn't qualify.
    pub async fn find_in_folder(&self, ns: &str, path: &Path) -> CoreResult<Vec<DuplicateGroup>> {
        let ns_owned = ns.to_string();
        let path_owned = path.clone();
        let fingerprints = self
            .db
            .atomic(self.config.db_retry_attempts, |tx| repository::fingerprint::intersect_all_with_prefix(tx, &ns_owned, &path_owned))?;
        Ok(group_by_distance(&fingerprints, self.config.dedup_max_distance))
    }
}

/// Union-find over candidate pairs within `max_distance`, O(n^2) in the
/// candidate set -- acceptable since `intersect_all_with_prefix` has
/// already narrowed it down to fingerprints sharing at least one part.
fn group_by_distance(fingerprints: &[Fingerprint], max_distance: u32) -> Vec<DuplicateGroup> {
    let n = fingerprints.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], x: usize) -> usize {
        if parent[x] != x {
            parent[x] = find(parent, parent[x]);
        }
        parent[x]
    }

    fn union(parent: &mut [usize], a: usize, b: usize) {
        let ra = find(parent, a);
        let rb = find(parent, b);
        if ra != rb {
            parent[ra] = rb;
        }
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if fingerprints[i].hamming_distance(&fingerprints[j]) <= max_distance {
                union(&mut parent, i, j);
            }
        }
    }

    let mut groups: HashMap<usize, Vec<Uuid>> = HashMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(fingerprints[i].file_id);
    }

    groups.into_values().filter(|g| g.len() > 1).map(|file_ids| DuplicateGroup { file_ids }).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn fp(id: u8, value: u64) -> Fingerprint {
        Fingerprint { file_id: Uuid::from_u128(id as u128), value }
    }

    #[test]
    fn groups_transitively_close_fingerprints() {
        let a = fp(1, 0b0000_0000);
        let b = fp(2, 0b0000_0001); // distance 1 from a
        let c = fp(3, 0b0000_0011); // distance 1 from b, distance 2 from a
        let groups = group_by_distance(&[a, b, c], 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].file_ids.len(), 3);
    }

    #[test]
    fn singletons_produce_no_group() {
        let a = fp(1, 0x0000_0000_0000_0000);
        let b = fp(2, 0xFFFF_FFFF_FFFF_FFFF);
        let groups = group_by_distance(&[a, b], 1);
        assert!(groups.is_empty());
    }
}
