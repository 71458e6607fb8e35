//! The `(row count, cost)` pair every estimate boils down to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Estimated output rows and abstract cost (work units, not wall-clock time).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    row_count: u64,
    cost: f64,
}

impl CostEstimate {
    pub fn new(row_count: u64, cost: f64) -> Self {
        debug_assert!(cost >= 0.0, "negative cost {cost}");
        Self { row_count, cost }
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// `next` runs after `self` on its output: costs add, rows come from `next`.
    #[must_use]
    pub fn sequence(&self, next: &CostEstimate) -> CostEstimate {
        CostEstimate::new(next.row_count, self.cost + next.cost)
    }

    /// `inner` runs once per row of `self`.
    #[must_use]
    pub fn nest(&self, inner: &CostEstimate) -> CostEstimate {
        CostEstimate::new(
            self.row_count.saturating_mul(inner.row_count),
            self.cost + self.row_count as f64 * inner.cost,
        )
    }

    /// Alternative branches whose outputs are concatenated.
    #[must_use]
    pub fn union(&self, other: &CostEstimate) -> CostEstimate {
        CostEstimate::new(
            self.row_count.saturating_add(other.row_count),
            self.cost + other.cost,
        )
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rows = {}, cost = {:.6}", self.row_count, self.cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_takes_later_row_count() {
        let a = CostEstimate::new(10, 5.0);
        let b = CostEstimate::new(3, 2.5);
        let s = a.sequence(&b);
        assert_eq!(s.row_count(), 3);
        assert_eq!(s.cost(), 7.5);
    }

    #[test]
    fn nest_multiplies_inner_cost_by_outer_rows() {
        let outer = CostEstimate::new(4, 1.0);
        let inner = CostEstimate::new(5, 2.0);
        let n = outer.nest(&inner);
        assert_eq!(n.row_count(), 20);
        assert_eq!(n.cost(), 1.0 + 4.0 * 2.0);
    }

    #[test]
    fn union_adds_both() {
        let a = CostEstimate::new(7, 1.25);
        let b = CostEstimate::new(8, 2.5);
        let u = a.union(&b);
        assert_eq!(u.row_count(), 15);
        assert_eq!(u.cost(), a.cost() + b.cost());
    }

    #[test]
    fn same_kind_chains_associate() {
        let a = CostEstimate::new(2, 1.0);
        let b = CostEstimate::new(3, 2.0);
        let c = CostEstimate::new(4, 4.0);
        assert_eq!(a.sequence(&b).sequence(&c), a.sequence(&b.sequence(&c)));
        assert_eq!(a.union(&b).union(&c), a.union(&b.union(&c)));
        assert_eq!(a.nest(&b).nest(&c), a.nest(&b.nest(&c)));
    }
}
