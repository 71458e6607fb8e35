//! Estimator configuration: calibration constants and thresholds.
//!
//! Constants are grouped by the micro-benchmark that measured them so a
//! recalibration replaces one group without touching any formula.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered-tree access, measured by the tree scan benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeScanCosts {
    pub random_access_per_row: f64,
    pub random_access_per_byte: f64,
    pub sequential_access_per_row: f64,
    pub sequential_access_per_byte: f64,
}

impl Default for TreeScanCosts {
    fn default() -> Self {
        Self {
            random_access_per_row: 17.7,
            random_access_per_byte: 0.01,
            sequential_access_per_row: 0.48,
            sequential_access_per_byte: 0.0061,
        }
    }
}

/// Full sort.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortCosts {
    pub setup: f64,
    pub per_row: f64,
    pub mixed_mode_factor: f64,
}

impl Default for SortCosts {
    fn default() -> Self {
        Self {
            setup: 53.0,
            per_row: 7.0,
            mixed_mode_factor: 1.5,
        }
    }
}

/// Insertion sort bounded by a limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortLimitCosts {
    pub per_row: f64,
    pub per_field_factor: f64,
}

impl Default for SortLimitCosts {
    fn default() -> Self {
        Self {
            per_row: 1.0,
            per_field_factor: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectCosts {
    pub per_row: f64,
}

impl Default for SelectCosts {
    fn default() -> Self {
        Self { per_row: 0.22 }
    }
}

/// Project plus per-expression evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectCosts {
    pub per_row: f64,
    pub per_field: f64,
}

impl Default for ProjectCosts {
    fn default() -> Self {
        Self {
            per_row: 0.26,
            per_field: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistinctCosts {
    pub per_row: f64,
}

impl Default for DistinctCosts {
    fn default() -> Self {
        Self { per_row: 6.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductCosts {
    pub per_row: f64,
}

impl Default for ProductCosts {
    fn default() -> Self {
        Self { per_row: 40.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapCosts {
    pub per_row: f64,
}

impl Default for MapCosts {
    fn default() -> Self {
        Self { per_row: 0.15 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenCosts {
    pub overhead: f64,
    pub per_row: f64,
}

impl Default for FlattenCosts {
    fn default() -> Self {
        Self {
            overhead: 49.0,
            per_row: 41.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntersectCosts {
    pub per_row: f64,
}

impl Default for IntersectCosts {
    fn default() -> Self {
        Self { per_row: 0.25 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnionCosts {
    pub per_row: f64,
}

impl Default for UnionCosts {
    fn default() -> Self {
        Self { per_row: 0.2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HKeyUnionCosts {
    pub per_row: f64,
}

impl Default for HKeyUnionCosts {
    fn default() -> Self {
        Self { per_row: 1.1 }
    }
}

/// Semi-join through a bloom filter: load the filter, then probe it per input row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomFilterCosts {
    pub load_per_row: f64,
    pub scan_per_row: f64,
    pub scan_selectivity_coefficient: f64,
}

impl Default for BloomFilterCosts {
    fn default() -> Self {
        Self {
            load_per_row: 0.24,
            scan_per_row: 0.39,
            scan_selectivity_coefficient: 7.41,
        }
    }
}

/// Hash-table semi-join and hash join.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashTableCosts {
    pub load_per_row: f64,
    pub load_per_field: f64,
    pub hash_per_join_field: f64,
    pub probe_per_row: f64,
    pub unload_per_field: f64,
    pub probe_selectivity_coefficient: f64,
}

impl Default for HashTableCosts {
    fn default() -> Self {
        Self {
            load_per_row: 0.7,
            load_per_field: 0.05,
            hash_per_join_field: 0.12,
            probe_per_row: 0.45,
            unload_per_field: 0.05,
            probe_selectivity_coefficient: 2.1,
        }
    }
}

/// Every calibrated constant the cost model uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorCosts {
    pub tree_scan: TreeScanCosts,
    pub sort: SortCosts,
    pub sort_limit: SortLimitCosts,
    pub select: SelectCosts,
    pub project: ProjectCosts,
    pub distinct: DistinctCosts,
    pub product: ProductCosts,
    pub map: MapCosts,
    pub flatten: FlattenCosts,
    pub intersect: IntersectCosts,
    pub union: UnionCosts,
    pub hkey_union: HKeyUnionCosts,
    pub bloom_filter: BloomFilterCosts,
    pub hash_table: HashTableCosts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Largest limit for which a sort is priced as an insertion sort.
    pub insertion_sort_max_limit: u64,

    /// Selectivity assumed per condition when no statistics are available.
    pub missing_stats_selectivity: f64,

    /// Flat cost of one call out to the full-text index.
    pub full_text_scan_cost: f64,

    /// Resolution of the lat/lon z-order space.
    pub spatial_bits_per_dimension: u32,

    /// When set, plans are costed with the randomized model seeded from this.
    pub random_seed: Option<u64>,

    pub costs: OperatorCosts,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            insertion_sort_max_limit: 100,
            missing_stats_selectivity: 0.85,
            full_text_scan_cost: 1.0,
            spatial_bits_per_dimension: 26,
            random_seed: None,
            costs: OperatorCosts::default(),
        }
    }
}

impl EstimatorConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `COSTWISE_INSERTION_SORT_MAX_LIMIT`: insertion sort threshold
    /// - `COSTWISE_MISSING_STATS_SELECTIVITY`: selectivity without statistics
    /// - `COSTWISE_FULL_TEXT_SCAN_COST`: full-text call cost
    /// - `COSTWISE_SPATIAL_BITS`: z-order bits per dimension
    /// - `COSTWISE_RANDOM_SEED`: seed for the randomized cost model
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("COSTWISE_INSERTION_SORT_MAX_LIMIT") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.insertion_sort_max_limit = v;
            }
        }

        if let Ok(s) = std::env::var("COSTWISE_MISSING_STATS_SELECTIVITY") {
            if let Ok(v) = s.parse::<f64>() {
                cfg.missing_stats_selectivity = v;
            }
        }

        if let Ok(s) = std::env::var("COSTWISE_FULL_TEXT_SCAN_COST") {
            if let Ok(v) = s.parse::<f64>() {
                cfg.full_text_scan_cost = v;
            }
        }

        if let Ok(s) = std::env::var("COSTWISE_SPATIAL_BITS") {
            if let Ok(v) = s.parse::<u32>() {
                cfg.spatial_bits_per_dimension = v;
            }
        }

        if let Ok(s) = std::env::var("COSTWISE_RANDOM_SEED") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.random_seed = Some(v);
            }
        }

        cfg
    }

    /// Parse a (possibly partial) JSON override; missing fields keep defaults.
    pub fn from_json_str(src: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(src)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.missing_stats_selectivity > 0.0 && self.missing_stats_selectivity <= 1.0) {
            return Err(Error::Config(format!(
                "missing_stats_selectivity must be in (0, 1], got {}",
                self.missing_stats_selectivity
            )));
        }
        if self.spatial_bits_per_dimension == 0 || self.spatial_bits_per_dimension > 28 {
            return Err(Error::Config(format!(
                "spatial_bits_per_dimension must be in 1..=28, got {}",
                self.spatial_bits_per_dimension
            )));
        }
        if self.full_text_scan_cost < 0.0 {
            return Err(Error::Config("full_text_scan_cost must not be negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_other_defaults() {
        let cfg = EstimatorConfig::from_json_str(
            r#"{ "insertion_sort_max_limit": 10, "costs": { "sort": { "per_row": 9.0 } } }"#,
        )
        .unwrap();
        assert_eq!(cfg.insertion_sort_max_limit, 10);
        assert_eq!(cfg.costs.sort.per_row, 9.0);
        assert_eq!(cfg.costs.sort.setup, SortCosts::default().setup);
        assert_eq!(cfg.costs.flatten, FlattenCosts::default());
    }

    #[test]
    fn rejects_out_of_range_selectivity() {
        let err = EstimatorConfig::from_json_str(r#"{ "missing_stats_selectivity": 1.5 }"#);
        assert!(matches!(err, Err(Error::Config(_))));
    }
}
