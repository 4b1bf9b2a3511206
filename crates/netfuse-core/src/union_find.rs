//! Union-Find (disjoint set) structure used to split the match graph into
//! connected components before community refinement.
//!
//! Path compression uses iterative path-halving: during [`UnionFind::find`]
//! each visited node is pointed directly at its grandparent, halving the path
//! length without needing a second pass or recursion. Union-by-rank keeps
//! trees shallow; when ranks are equal the **lower ordinal** becomes the
//! root, so [`UnionFind::find`] returns a deterministic representative
//! regardless of the order in which match edges were processed.

/// A union-find (disjoint set) structure with path-halving and union-by-rank.
///
/// Each element is identified by a `usize` ordinal in `[0, n)` where `n` is
/// the number of elements supplied at construction time.
///
/// # Determinism
///
/// When two sets of equal rank are merged, the lower ordinal is chosen as the
/// new root. This guarantees that `find` returns the same representative for
/// any given merge history, independent of the order in which `union` is
/// called — and therefore that component enumeration via [`UnionFind::groups`]
/// is stable across runs.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    /// Creates a new `UnionFind` with `n` singleton sets.
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0u8; n],
        }
    }

    /// Returns the representative of the set containing `x`.
    ///
    /// Uses iterative path-halving: each node visited during the traversal is
    /// linked directly to its grandparent, achieving the inverse-Ackermann
    /// amortized bound without recursion.
    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            let grandparent = self.parent[self.parent[x]];
            self.parent[x] = grandparent;
            x = grandparent;
        }
        x
    }

    /// Merges the sets containing `a` and `b`.
    ///
    /// Uses union-by-rank. When ranks are equal, the **lower ordinal** becomes
    /// the new root, providing a deterministic tie-break for commutativity.
    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);

        if ra == rb {
            return;
        }

        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => {
                self.parent[ra] = rb;
            }
            std::cmp::Ordering::Greater => {
                self.parent[rb] = ra;
            }
            std::cmp::Ordering::Equal => {
                if ra < rb {
                    self.parent[rb] = ra;
                    self.rank[ra] += 1;
                } else {
                    self.parent[ra] = rb;
                    self.rank[rb] += 1;
                }
            }
        }
    }

    /// Returns the number of elements in this `UnionFind`.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Returns `true` if this `UnionFind` contains no elements.
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Enumerates the disjoint sets as sorted member lists.
    ///
    /// Groups are ordered by their representative's ordinal and members
    /// within a group ascend, so the output is fully deterministic for a
    /// given merge history.
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let n = self.len();
        let mut by_root: Vec<Vec<usize>> = vec![Vec::new(); n];
        for x in 0..n {
            let root = self.find(x);
            by_root[root].push(x);
        }
        by_root.into_iter().filter(|g| !g.is_empty()).collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn new_creates_singletons() {
        let mut uf = UnionFind::new(5);
        for i in 0..5 {
            assert_eq!(
                uf.find(i),
                i,
                "element {i} should be its own representative"
            );
        }
    }

    #[test]
    fn union_two_elements_same_set() {
        let mut uf = UnionFind::new(4);
        uf.union(0, 1);
        assert_eq!(
            uf.find(0),
            uf.find(1),
            "after union, elements should share a representative"
        );
        assert_ne!(uf.find(0), uf.find(2));
    }

    #[test]
    fn transitive_closure() {
        let mut uf = UnionFind::new(3);
        uf.union(0, 1);
        uf.union(1, 2);
        assert_eq!(uf.find(0), uf.find(2));
    }

    #[test]
    fn deterministic_representative_lower_ordinal_wins_on_tie() {
        let mut uf = UnionFind::new(5);
        uf.union(3, 1);
        assert_eq!(uf.find(3), 1, "lower ordinal 1 should win over 3");
    }

    #[test]
    fn union_commutativity_same_representative() {
        let mut uf_ab = UnionFind::new(2);
        uf_ab.union(0, 1);

        let mut uf_ba = UnionFind::new(2);
        uf_ba.union(1, 0);

        assert_eq!(uf_ab.find(0), uf_ba.find(0), "union must be commutative");
    }

    #[test]
    fn groups_enumerates_components_in_order() {
        let mut uf = UnionFind::new(6);
        uf.union(4, 2);
        uf.union(0, 5);
        let groups = uf.groups();
        assert_eq!(groups, vec![vec![0, 5], vec![1], vec![2, 4], vec![3]]);
    }

    #[test]
    fn groups_of_empty_structure_is_empty() {
        let mut uf = UnionFind::new(0);
        assert!(uf.groups().is_empty());
    }

    #[test]
    fn groups_cover_every_element_exactly_once() {
        let mut uf = UnionFind::new(10);
        uf.union(0, 9);
        uf.union(3, 4);
        uf.union(4, 5);
        let groups = uf.groups();
        let mut seen: Vec<usize> = groups.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }
}
