//! Matrix axis extraction.
//!
//! Only keys from a fixed vocabulary count as axes. The matrix width is the
//! longest list among them; when it exceeds one, every axis is padded to that
//! width so the axes can be zipped index by index into rows.

use lattice_state::BuildConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expand::{expand, Row};

/// Axis keys recognized when no vocabulary is configured.
pub const DEFAULT_AXIS_KEYS: [&str; 3] = ["rvm", "gemfile", "env"];

/// Ordered set of configuration keys that may hold matrix axes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisVocabulary(Vec<String>);

impl AxisVocabulary {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocabulary: Vec<String> = Vec::new();
        for key in keys.into_iter().map(Into::into) {
            if !vocabulary.contains(&key) {
                vocabulary.push(key);
            }
        }
        Self(vocabulary)
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|k| k == key)
    }
}

impl Default for AxisVocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_AXIS_KEYS)
    }
}

/// A single padded axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub key: String,
    pub values: Vec<Value>,
}

impl Axis {
    /// Wrap scalars into one-element lists and repeat the last element of
    /// short lists until `width` is reached. An empty list pads with `null`.
    fn padded(key: &str, value: &Value, width: usize) -> Self {
        let mut values = match value {
            Value::Array(items) => items.clone(),
            scalar => vec![scalar.clone()],
        };
        let fill = values.last().cloned().unwrap_or(Value::Null);
        values.resize(width, fill);
        Self {
            key: key.to_string(),
            values,
        }
    }
}

/// The matrix axes of one configuration.
///
/// Computed once per save and carried through it; never cached on a build.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixAxes {
    keys: Vec<String>,
    width: usize,
    axes: Vec<Axis>,
}

impl MatrixAxes {
    /// Inspect `config` for recognized axis keys.
    ///
    /// Malformed values are never an error: scalars count as length one and
    /// a config without recognized keys is simply not a matrix.
    pub fn extract(config: &BuildConfig, vocabulary: &AxisVocabulary) -> Self {
        let keys: Vec<String> = vocabulary
            .keys()
            .iter()
            .filter(|key| config.contains_key(key.as_str()))
            .cloned()
            .collect();

        let width = keys
            .iter()
            .filter_map(|key| config.get(key))
            .map(|value| value.as_array().map_or(1, Vec::len))
            .max()
            .unwrap_or(1);

        let axes = if width > 1 {
            keys.iter()
                .filter_map(|key| config.get(key).map(|value| Axis::padded(key, value, width)))
                .collect()
        } else {
            Vec::new()
        };

        Self { keys, width, axes }
    }

    /// Recognized axis keys present in the config, in vocabulary order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Padded axes; empty unless this is a matrix.
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn is_matrix(&self) -> bool {
        self.width > 1
    }

    /// One row per index across the padded axes, `width` rows in total.
    /// Empty when the config is not a matrix.
    pub fn rows(&self) -> Vec<Row> {
        if !self.is_matrix() {
            return Vec::new();
        }
        let zipped: Vec<Row> = (0..self.width)
            .map(|ix| {
                self.axes
                    .iter()
                    .map(|axis| (axis.key.clone(), axis.values[ix].clone()))
                    .collect()
            })
            .collect();
        expand(&[zipped])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> BuildConfig {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    fn extract(value: Value) -> MatrixAxes {
        MatrixAxes::extract(&config(value), &AxisVocabulary::default())
    }

    #[test]
    fn no_recognized_keys_is_not_a_matrix() {
        let axes = extract(json!({"script": ["rake", "rspec"], "language": "ruby"}));

        assert!(axes.keys().is_empty());
        assert_eq!(axes.width(), 1);
        assert!(!axes.is_matrix());
        assert!(axes.rows().is_empty());
    }

    #[test]
    fn scalar_axes_are_not_a_matrix() {
        let axes = extract(json!({"rvm": "1.9.2", "env": "FOO=1"}));

        assert_eq!(axes.keys(), ["rvm", "env"]);
        assert_eq!(axes.width(), 1);
        assert!(!axes.is_matrix());
    }

    #[test]
    fn single_element_list_is_not_a_matrix() {
        let axes = extract(json!({"rvm": ["1.9.2"]}));

        assert_eq!(axes.width(), 1);
        assert!(axes.rows().is_empty());
    }

    #[test]
    fn empty_list_alone_is_not_a_matrix() {
        let axes = extract(json!({"gemfile": []}));

        assert_eq!(axes.width(), 0);
        assert!(!axes.is_matrix());
    }

    #[test]
    fn keys_follow_vocabulary_order() {
        let axes = extract(json!({"env": ["A=1", "A=2"], "rvm": ["1.8.7", "1.9.2"]}));

        assert_eq!(axes.keys(), ["rvm", "env"]);
        assert_eq!(axes.rows()[0][0].0, "rvm");
        assert_eq!(axes.rows()[0][1].0, "env");
    }

    #[test]
    fn single_axis_yields_one_row_per_value() {
        let axes = extract(json!({"rvm": ["1.8.7", "1.9.2", "ree"], "script": "rake"}));
        let rows = axes.rows();

        assert_eq!(rows.len(), 3);
        for (ix, value) in ["1.8.7", "1.9.2", "ree"].iter().enumerate() {
            assert_eq!(rows[ix], vec![("rvm".to_string(), json!(value))]);
        }
    }

    #[test]
    fn scalar_axis_is_repeated_across_rows() {
        let axes = extract(json!({"rvm": ["1.9.3", "2.0.0"], "env": "FOO=1"}));

        assert!(axes.is_matrix());
        assert_eq!(axes.width(), 2);
        assert_eq!(
            axes.rows(),
            vec![
                vec![("rvm".to_string(), json!("1.9.3")), ("env".to_string(), json!("FOO=1"))],
                vec![("rvm".to_string(), json!("2.0.0")), ("env".to_string(), json!("FOO=1"))],
            ]
        );
    }

    #[test]
    fn short_axes_repeat_their_last_value() {
        let axes = extract(json!({
            "rvm": ["1.8.7", "1.9.2", "ree"],
            "gemfile": ["gemfiles/rails-2.3"],
            "env": ["A=1", "A=2"]
        }));
        let rows = axes.rows();

        assert_eq!(rows.len(), 3);
        assert_eq!(axes.axes()[1].values, vec![json!("gemfiles/rails-2.3"); 3]);
        assert_eq!(rows[2][2], ("env".to_string(), json!("A=2")));
    }

    #[test]
    fn empty_list_pads_with_null() {
        let axes = extract(json!({"rvm": ["1.8.7", "1.9.2"], "gemfile": []}));

        assert_eq!(axes.axes()[1].values, vec![Value::Null, Value::Null]);
    }

    #[test]
    fn custom_vocabulary_recognizes_other_keys() {
        let vocabulary = AxisVocabulary::new(["jdk", "env", "jdk"]);
        let axes = MatrixAxes::extract(
            &config(json!({"jdk": ["openjdk6", "openjdk7"], "rvm": ["1.8.7", "1.9.2", "ree"]})),
            &vocabulary,
        );

        assert_eq!(vocabulary.keys(), ["jdk", "env"]);
        assert_eq!(axes.width(), 2);
        assert_eq!(axes.keys(), ["jdk"]);
    }
}
