//! Matrix expansion.
//!
//! A matrix is described as a list of *levels*. Each level offers a list of
//! alternatives, and each alternative is a partial row of `(key, value)`
//! cells. Expansion picks one alternative per level, walking the levels in
//! order and concatenating the picked cells, so the first level varies
//! slowest and key order within a row follows level order.

use serde_json::Value;

/// One `(axis key, value)` assignment.
pub type Cell = (String, Value);

/// One concrete combination: the cells of a single child build.
pub type Row = Vec<Cell>;

/// Enumerate every combination of one alternative per level.
///
/// Zero levels yield a single empty row; a level with no alternatives
/// yields no rows at all.
pub fn expand(levels: &[Vec<Row>]) -> Vec<Row> {
    expand_from(levels, Row::new())
}

fn expand_from(levels: &[Vec<Row>], prefix: Row) -> Vec<Row> {
    let Some((level, rest)) = levels.split_first() else {
        return vec![prefix];
    };
    level
        .iter()
        .flat_map(|alternative| {
            let mut row = prefix.clone();
            row.extend(alternative.iter().cloned());
            expand_from(rest, row)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cell(key: &str, value: &str) -> Cell {
        (key.to_string(), json!(value))
    }

    #[test]
    fn no_levels_yield_one_empty_row() {
        assert_eq!(expand(&[]), vec![Row::new()]);
    }

    #[test]
    fn empty_level_yields_nothing() {
        let levels = vec![vec![vec![cell("rvm", "1.9.2")]], vec![]];
        assert!(expand(&levels).is_empty());
    }

    #[test]
    fn single_level_yields_one_row_per_alternative() {
        let levels = vec![vec![
            vec![cell("rvm", "1.8.7")],
            vec![cell("rvm", "1.9.2")],
            vec![cell("rvm", "ree")],
        ]];
        let rows = expand(&levels);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec![cell("rvm", "ree")]);
    }

    #[test]
    fn independent_levels_cross_with_first_level_slowest() {
        let levels = vec![
            vec![vec![cell("rvm", "1.8.7")], vec![cell("rvm", "1.9.2")]],
            vec![
                vec![cell("env", "A=1")],
                vec![cell("env", "A=2")],
                vec![cell("env", "A=3")],
            ],
        ];
        let rows = expand(&levels);

        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0], vec![cell("rvm", "1.8.7"), cell("env", "A=1")]);
        assert_eq!(rows[2], vec![cell("rvm", "1.8.7"), cell("env", "A=3")]);
        assert_eq!(rows[3], vec![cell("rvm", "1.9.2"), cell("env", "A=1")]);
    }

    #[test]
    fn multi_cell_alternatives_are_flattened_one_level() {
        let levels = vec![
            vec![
                vec![cell("rvm", "1.8.7"), cell("gemfile", "a")],
                vec![cell("rvm", "1.9.2")],
            ],
            vec![vec![cell("env", "X=1")]],
        ];
        let rows = expand(&levels);

        assert_eq!(
            rows,
            vec![
                vec![cell("rvm", "1.8.7"), cell("gemfile", "a"), cell("env", "X=1")],
                vec![cell("rvm", "1.9.2"), cell("env", "X=1")],
            ]
        );
    }
}
