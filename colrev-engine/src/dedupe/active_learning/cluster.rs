//! Clustering of scored pairs
//!
//! Union-find over the pairs scoring above the partition threshold; a
//! cluster's score is the mean of its edge scores.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Record indices, ascending
    pub members: Vec<usize>,
    pub score: f64,
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // smaller index becomes the root so results do not depend on edge order
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

/// Clusters of `n` records from scored pairs `(i, j, score)`
///
/// Only clusters with at least two members are returned, ordered by their
/// smallest member.
pub fn partition(n: usize, scored: &[(usize, usize, f64)], threshold: f64) -> Vec<Cluster> {
    let edges: Vec<&(usize, usize, f64)> = scored.iter().filter(|(_, _, s)| *s > threshold).collect();
    let mut uf = UnionFind::new(n);
    for (i, j, _) in &edges {
        uf.union(*i, *j);
    }

    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut scores: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
    for i in 0..n {
        let root = uf.find(i);
        members.entry(root).or_default().push(i);
    }
    for (i, _, score) in &edges {
        let root = uf.find(*i);
        scores.entry(root).or_default().push(*score);
    }

    members
        .into_iter()
        .filter(|(_, m)| m.len() > 1)
        .map(|(root, members)| {
            let edge_scores = scores.get(&root).map(Vec::as_slice).unwrap_or(&[]);
            let score = if edge_scores.is_empty() {
                0.0
            } else {
                edge_scores.iter().sum::<f64>() / edge_scores.len() as f64
            };
            Cluster { members, score }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitive_edges_form_one_cluster() {
        let scored = vec![(0, 1, 0.9), (1, 2, 0.7), (3, 4, 0.4)];
        let clusters = partition(5, &scored, 0.5);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![0, 1, 2]);
        assert!((clusters[0].score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn edge_order_does_not_matter() {
        let a = partition(4, &[(2, 3, 0.9), (0, 2, 0.9)], 0.5);
        let b = partition(4, &[(0, 2, 0.9), (2, 3, 0.9)], 0.5);
        assert_eq!(a, b);
    }
}
