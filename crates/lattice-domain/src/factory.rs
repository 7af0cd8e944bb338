//! Child build construction for matrix expansion.

use lattice_state::{BuildConfig, NewBuild};

use crate::expand::Row;

/// `"{parent}.{index}"`, with a 1-based index.
pub fn child_number(parent_number: Option<&str>, index: usize) -> String {
    format!("{}.{}", parent_number.unwrap_or_default(), index)
}

/// Config map for one row. A later duplicate key overwrites an earlier one.
pub fn row_config(row: &Row) -> BuildConfig {
    let mut config = BuildConfig::new();
    for (key, value) in row {
        config.insert(key.clone(), value.clone());
    }
    config
}

/// Creation parameters for the `index`-th child of `parent`.
///
/// Every parent attribute is inherited except `number` and `config`. The
/// store links `parent_id` when the children are persisted with the parent.
pub fn child_build(parent: &NewBuild, index: usize, row: &Row) -> NewBuild {
    NewBuild {
        number: Some(child_number(parent.number.as_deref(), index)),
        config: row_config(row),
        ..parent.clone()
    }
}

/// All children of `parent`, numbered in row order.
pub fn child_builds(parent: &NewBuild, rows: &[Row]) -> Vec<NewBuild> {
    rows.iter()
        .enumerate()
        .map(|(ix, row)| child_build(parent, ix + 1, row))
        .collect()
}
