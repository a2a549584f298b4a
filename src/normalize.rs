// normalize.rs

use clap::ValueEnum;
use log::debug;
use ndarray::Array2;

use crate::matrix::FeatureMatrix;

/// Standardization mode for the expression matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Standardize {
    /// Pass the matrix through unchanged.
    None,
    /// Z-score each feature (column) across samples.
    PerFeature,
    /// Z-score each sample (row) across features.
    PerSample,
}

/// Output of [`normalize`]: the surviving matrix plus the ids of any sample
/// rows that were excluded because the log transform left them non-finite.
#[derive(Debug)]
pub(crate) struct NormalizedMatrix {
    pub(crate) matrix: FeatureMatrix,
    pub(crate) excluded: Vec<String>,
}

// Standard deviations this small are treated as zero variance; dividing by
// them would blow up constant columns, so the divisor becomes 1.0 and the
// centered values stay at 0.
const MIN_STD: f64 = 1e-9;

/// Normalizes a feature matrix: optional `log10(x + 1)` compression, then the
/// selected z-score mode. Pure function of its inputs.
///
/// Rows containing a non-finite value after the log transform (e.g. a raw
/// value below -1) are dropped before standardization and reported in
/// `excluded`. Zero-variance columns/rows standardize to zeros rather than
/// producing NaNs.
pub(crate) fn normalize(
    matrix: &FeatureMatrix,
    mode: Standardize,
    log_transform: bool,
) -> NormalizedMatrix {
    let mut values = matrix.values.clone();
    if log_transform {
        values.mapv_inplace(|x| (x + 1.0).log10());
    }

    let keep: Vec<bool> = values
        .rows()
        .into_iter()
        .map(|row| row.iter().all(|v| v.is_finite()))
        .collect();
    let excluded: Vec<String> = matrix
        .sample_ids
        .iter()
        .zip(&keep)
        .filter(|(_, &k)| !k)
        .map(|(id, _)| id.clone())
        .collect();

    let (sample_ids, mut values) = if excluded.is_empty() {
        (matrix.sample_ids.clone(), values)
    } else {
        debug!(
            "Excluding {} sample(s) with non-finite transformed values: {:?}",
            excluded.len(),
            excluded
        );
        let kept_ids: Vec<String> = matrix
            .sample_ids
            .iter()
            .zip(&keep)
            .filter(|(_, &k)| k)
            .map(|(id, _)| id.clone())
            .collect();
        let mut kept = Array2::<f64>::zeros((kept_ids.len(), matrix.n_features()));
        let mut dst = 0usize;
        for (row, &k) in values.rows().into_iter().zip(&keep) {
            if k {
                kept.row_mut(dst).assign(&row);
                dst += 1;
            }
        }
        (kept_ids, kept)
    };

    if values.nrows() > 0 {
        match mode {
            Standardize::None => {}
            Standardize::PerFeature => {
                for mut column in values.columns_mut() {
                    let mean = column.mean().unwrap_or(0.0);
                    let std = sanitize_std(column.std(0.0));
                    column.mapv_inplace(|v| (v - mean) / std);
                }
            }
            Standardize::PerSample => {
                for mut row in values.rows_mut() {
                    let mean = row.mean().unwrap_or(0.0);
                    let std = sanitize_std(row.std(0.0));
                    row.mapv_inplace(|v| (v - mean) / std);
                }
            }
        }
    }

    NormalizedMatrix {
        matrix: FeatureMatrix {
            sample_ids,
            feature_names: matrix.feature_names.clone(),
            values,
        },
        excluded,
    }
}

fn sanitize_std(std: f64) -> f64 {
    if std.abs() < MIN_STD {
        1.0
    } else {
        std
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Axis};

    fn fixture(values: ndarray::Array2<f64>) -> FeatureMatrix {
        let sample_ids = (0..values.nrows()).map(|i| format!("s{}", i)).collect();
        let feature_names = (0..values.ncols()).map(|j| format!("g{}", j)).collect();
        FeatureMatrix {
            sample_ids,
            feature_names,
            values,
        }
    }

    #[test]
    fn none_mode_is_passthrough() {
        let m = fixture(array![[1.0, 2.0], [3.0, 4.0]]);
        let out = normalize(&m, Standardize::None, false);
        assert_eq!(out.matrix.values, m.values);
        assert!(out.excluded.is_empty());
    }

    #[test]
    fn per_feature_columns_have_zero_mean_unit_variance() {
        let m = fixture(array![[1.0, 10.0], [2.0, 20.0], [3.0, 35.0], [4.0, 50.0]]);
        let out = normalize(&m, Standardize::PerFeature, false);
        for column in out.matrix.values.axis_iter(Axis(1)) {
            let mean = column.mean().unwrap();
            let var = column.mapv(|v| (v - mean).powi(2)).mean().unwrap();
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(var, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn per_sample_rows_have_zero_mean_unit_variance() {
        let m = fixture(array![[1.0, 5.0, 9.0], [2.0, 4.0, 6.0]]);
        let out = normalize(&m, Standardize::PerSample, false);
        for row in out.matrix.values.axis_iter(Axis(0)) {
            let mean = row.mean().unwrap();
            let var = row.mapv(|v| (v - mean).powi(2)).mean().unwrap();
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(var, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn constant_column_becomes_zeros_without_nan() {
        let m = fixture(array![[5.0, 1.0], [5.0, 2.0], [5.0, 3.0]]);
        let out = normalize(&m, Standardize::PerFeature, false);
        for &v in out.matrix.values.column(0).iter() {
            assert!(v.is_finite());
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn log_transform_excludes_rows_that_go_non_finite() {
        // log10(-2 + 1) is NaN, so the second row must be dropped and reported.
        let m = fixture(array![[1.0, 2.0], [-2.0, 3.0], [4.0, 5.0]]);
        let out = normalize(&m, Standardize::PerFeature, true);
        assert_eq!(out.excluded, vec!["s1".to_string()]);
        assert_eq!(out.matrix.n_samples(), 2);
        assert_eq!(out.matrix.sample_ids, vec!["s0", "s2"]);
        assert!(out.matrix.values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn log_minus_one_is_also_excluded() {
        // log10(0) is -inf; still non-finite, still dropped.
        let m = fixture(array![[-1.0, 2.0], [1.0, 3.0], [2.0, 4.0]]);
        let out = normalize(&m, Standardize::None, true);
        assert_eq!(out.excluded, vec!["s0".to_string()]);
    }

    #[test]
    fn log_transform_applies_log10_plus_one() {
        let m = fixture(array![[9.0, 99.0], [0.0, 9.0]]);
        let out = normalize(&m, Standardize::None, true);
        assert_abs_diff_eq!(out.matrix.values[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.matrix.values[[0, 1]], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.matrix.values[[1, 0]], 0.0, epsilon = 1e-12);
    }
}
