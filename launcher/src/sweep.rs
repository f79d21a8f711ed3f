use crate::descriptor::{Argument, Scalar};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hyperparameter sweep: every flag maps to the values it should take.
/// Expands into the cartesian product over all flags, one job per combination.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Sweep {
    axes: BTreeMap<String, Vec<Scalar>>,
}

impl Sweep {
    pub fn new() -> Self {
        Self::default()
    }

    /// add (or replace) the values taken by `flag`
    pub fn axis<I, V>(mut self, flag: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.axes
            .insert(flag.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.axes.keys().map(String::as_str)
    }

    /// flags without any value, these would collapse the whole product
    pub fn empty_axes(&self) -> Vec<&str> {
        self.axes
            .iter()
            .filter(|(_, values)| values.is_empty())
            .map(|(flag, _)| flag.as_str())
            .collect_vec()
    }

    /// number of jobs the sweep expands into, an empty sweep is a single job
    pub fn combination_count(&self) -> usize {
        self.axes.values().map(Vec::len).product()
    }

    /// All combinations as argument lists, flags in sorted order and the last
    /// flag varying fastest.
    pub fn combinations(&self) -> Vec<Vec<Argument>> {
        if self.axes.is_empty() {
            return vec![Vec::new()];
        }

        self.axes
            .iter()
            .map(|(flag, values)| {
                values
                    .iter()
                    .map(|value| Argument::pair(flag.as_str(), value.as_str()))
                    .collect_vec()
            })
            .multi_cartesian_product()
            .collect_vec()
    }
}

/// insert `suffix` before the extension of the file name in `path`
pub(crate) fn suffixed(path: &str, suffix: &str) -> String {
    let file_start = path.rfind('/').map_or(0, |index| index + 1);

    match path[file_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let split = file_start + dot;
            format!("{}{suffix}{}", &path[..split], &path[split..])
        }
        _ => format!("{path}{suffix}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sweep_is_one_job() {
        let sweep = Sweep::new();
        assert_eq!(sweep.combination_count(), 1);
        assert_eq!(sweep.combinations(), vec![Vec::<Argument>::new()]);
    }

    #[test]
    fn product_in_sorted_flag_order() {
        let sweep = Sweep::new()
            .axis("-p", ["uniform", "varratio"])
            .axis("-lr", ["0.1", "0.01", "0.001"]);

        assert_eq!(sweep.combination_count(), 6);

        let combinations = sweep.combinations();
        assert_eq!(combinations.len(), 6);
        assert_eq!(
            combinations[0],
            vec![Argument::pair("-lr", "0.1"), Argument::pair("-p", "uniform")]
        );
        assert_eq!(
            combinations[1],
            vec![Argument::pair("-lr", "0.1"), Argument::pair("-p", "varratio")]
        );
        assert_eq!(
            combinations[5],
            vec![Argument::pair("-lr", "0.001"), Argument::pair("-p", "varratio")]
        );
    }

    #[test]
    fn empty_axis_collapses_product() {
        let sweep = Sweep::new()
            .axis("-p", ["uniform"])
            .axis("-seed", Vec::<&str>::new());

        assert_eq!(sweep.empty_axes(), vec!["-seed"]);
        assert_eq!(sweep.combination_count(), 0);
        assert!(sweep.combinations().is_empty());
    }

    #[test]
    fn deserializes_mixed_scalars() {
        let sweep: Sweep = serde_yaml::from_str("-lr: [0.01, \"1e-3\"]\n-bayes: [true, false]\n").unwrap();

        assert_eq!(sweep.flags().collect_vec(), vec!["-bayes", "-lr"]);
        assert_eq!(
            sweep.combinations()[1],
            vec![Argument::pair("-bayes", "true"), Argument::pair("-lr", "1e-3")]
        );
    }

    #[test]
    fn values_keep_their_written_text() {
        let sweep: Sweep = serde_yaml::from_str("-lr: [0.010, 1e-3, 1.10]\n").unwrap();

        assert_eq!(
            sweep.combinations(),
            vec![
                vec![Argument::pair("-lr", "0.010")],
                vec![Argument::pair("-lr", "1e-3")],
                vec![Argument::pair("-lr", "1.10")],
            ]
        );
    }

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(suffixed("out.txt", "_3"), "out_3.txt");
        assert_eq!(suffixed("logs/run.v2/out", "_0"), "logs/run.v2/out_0");
        assert_eq!(suffixed("logs/.hidden", "_1"), "logs/.hidden_1");
        assert_eq!(suffixed("bayesianAL", "_2"), "bayesianAL_2");
    }
}
