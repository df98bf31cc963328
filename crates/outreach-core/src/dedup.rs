use std::collections::BTreeMap;

use crate::{ContactId, DuplicateGroup};

/// The columns that decide whether two contacts are the same person.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IdentityRow {
    pub id: ContactId,
    pub name: String,
    pub company: Option<String>,
}

/// A set of contacts that share a normalised (name, company) key.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DuplicateCluster {
    pub keep: ContactId,
    pub remove: Vec<ContactId>,
    pub name: String,
    pub company: String,
    pub count: usize,
}

impl DuplicateCluster {
    #[must_use]
    pub fn to_group(&self) -> DuplicateGroup {
        DuplicateGroup {
            name: self.name.clone(),
            company: self.company.clone(),
            count: self.count,
        }
    }
}

/// Case folding only. Whitespace and punctuation differences keep rows apart, and a
/// missing company never matches an empty one.
fn identity_key(row: &IdentityRow) -> (String, Option<String>) {
    (
        row.name.to_lowercase(),
        row.company.as_deref().map(str::to_lowercase),
    )
}

/// Group rows by case-insensitive (name, company) and return every group with more than
/// one member. Each cluster keeps its lowest id. Clusters are ordered by size descending,
/// then by the surviving id.
#[must_use]
pub fn duplicate_clusters(rows: &[IdentityRow]) -> Vec<DuplicateCluster> {
    let mut groups: BTreeMap<(String, Option<String>), Vec<&IdentityRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(identity_key(row)).or_default().push(row);
    }

    let mut clusters = groups
        .into_values()
        .filter(|members| members.len() > 1)
        .filter_map(|mut members| {
            members.sort_by_key(|row| row.id);
            let (survivor, rest) = members.split_first()?;
            Some(DuplicateCluster {
                keep: survivor.id,
                remove: rest.iter().map(|row| row.id).collect(),
                name: survivor.name.clone(),
                company: survivor.company.clone().unwrap_or_default(),
                count: members.len(),
            })
        })
        .collect::<Vec<_>>();

    clusters.sort_by(|left, right| {
        right
            .count
            .cmp(&left.count)
            .then(left.keep.cmp(&right.keep))
    });
    clusters
}

#[must_use]
pub fn ids_to_remove(clusters: &[DuplicateCluster]) -> Vec<ContactId> {
    let mut ids = clusters
        .iter()
        .flat_map(|cluster| cluster.remove.iter().copied())
        .collect::<Vec<_>>();
    ids.sort_unstable();
    ids
}
