// pca.rs

use log::debug;
use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::{Eigh, UPLO};

use crate::error::{PipelineError, Result};

/// Result of the dimensionality reduction.
///
/// With S samples and F features, k = min(S, F) components are produced.
/// The sign of each axis, and the order among exactly-tied eigenvalues, is
/// whatever the LAPACK decomposition returns after our descending sort;
/// callers must not rely on either.
#[derive(Debug)]
pub(crate) struct PcaResult {
    /// Percentage of total variance per component, descending, sums to <= 100.
    pub(crate) variance_explained: Vec<f64>,
    /// Sample coordinates in component space, shape (S, k).
    pub(crate) projected: Array2<f64>,
    /// Per-component weight vectors over the original features, shape (k, F).
    /// Rows are unit-norm, except degenerate axes which are all zero.
    pub(crate) loadings: Array2<f64>,
}

// Eigenvalue sums below this are "no variance to explain".
const ZERO_VARIANCE_EPS: f64 = 1e-12;

/// Computes a full PCA of the (already normalized) matrix.
///
/// Columns are mean-centered, then the covariance matrix (F <= S) or the Gram
/// matrix with back-projection (F > S) is eigen-decomposed. Everything is
/// recomputed from scratch on every call.
pub(crate) fn reduce(matrix: &Array2<f64>) -> Result<PcaResult> {
    let n_samples = matrix.nrows();
    let n_features = matrix.ncols();

    if n_samples < 2 {
        return Err(PipelineError::Dimensionality(format!(
            "PCA requires at least 2 samples, found {}",
            n_samples
        )));
    }
    if n_features == 0 {
        return Err(PipelineError::Dimensionality(
            "PCA requires at least 1 feature, found 0".to_string(),
        ));
    }

    let mean = matrix.mean_axis(Axis(0)).ok_or_else(|| {
        PipelineError::Dimensionality("failed to compute column means".to_string())
    })?;
    let centered = matrix - &mean;

    let k = n_samples.min(n_features);
    let (eigenvalues, loadings) = if n_features <= n_samples {
        decompose_covariance(&centered, n_samples, k)?
    } else {
        decompose_gram(&centered, n_samples, k)?
    };

    let total: f64 = eigenvalues.iter().sum();
    if total <= ZERO_VARIANCE_EPS {
        return Err(PipelineError::Dimensionality(
            "total variance is zero; all samples are identical".to_string(),
        ));
    }

    let variance_explained: Vec<f64> =
        eigenvalues.iter().map(|v| v / total * 100.0).collect();
    let projected = centered.dot(&loadings.t());

    debug!(
        "PCA: {} samples x {} features -> {} components, top component explains {:.2}%",
        n_samples, n_features, k, variance_explained[0]
    );

    Ok(PcaResult {
        variance_explained,
        projected,
        loadings,
    })
}

/// Eigen-decomposes the F x F covariance matrix. Used when F <= S.
fn decompose_covariance(
    centered: &Array2<f64>,
    n_samples: usize,
    k: usize,
) -> Result<(Vec<f64>, Array2<f64>)> {
    let n_features = centered.ncols();
    let mut cov = centered.t().dot(centered);
    cov /= (n_samples - 1) as f64;

    let (vals, vecs) = cov.eigh(UPLO::Upper).map_err(|e| {
        PipelineError::Dimensionality(format!(
            "eigen decomposition of covariance matrix failed: {}",
            e
        ))
    })?;
    let pairs = sorted_eig_pairs(vals, vecs);

    let mut eigenvalues = Vec::with_capacity(k);
    let mut loadings = Array2::<f64>::zeros((k, n_features));
    for (i, (val, vec)) in pairs.into_iter().take(k).enumerate() {
        eigenvalues.push(val.max(0.0));
        loadings.row_mut(i).assign(&unit_or_zero(vec));
    }
    Ok((eigenvalues, loadings))
}

/// Eigen-decomposes the S x S Gram matrix and back-projects the eigenvectors
/// into feature space. Used when F > S to avoid the F x F covariance matrix.
fn decompose_gram(
    centered: &Array2<f64>,
    n_samples: usize,
    k: usize,
) -> Result<(Vec<f64>, Array2<f64>)> {
    let n_features = centered.ncols();
    let mut gram = centered.dot(&centered.t());
    gram /= (n_samples - 1) as f64;

    let (vals, vecs) = gram.eigh(UPLO::Upper).map_err(|e| {
        PipelineError::Dimensionality(format!(
            "eigen decomposition of Gram matrix failed: {}",
            e
        ))
    })?;
    let pairs = sorted_eig_pairs(vals, vecs);

    let mut eigenvalues = Vec::with_capacity(k);
    let mut loadings = Array2::<f64>::zeros((k, n_features));
    for (i, (val, u_col)) in pairs.into_iter().take(k).enumerate() {
        eigenvalues.push(val.max(0.0));
        // axis = X^T u / (sqrt(lambda) * sqrt(S - 1)); the clamp keeps the
        // division defined when lambda underflows for a rank-deficient axis.
        let lam_sqrt = val.max(ZERO_VARIANCE_EPS).sqrt();
        let denom = lam_sqrt * ((n_samples - 1) as f64).sqrt();
        let axis = centered.t().dot(&u_col) / denom;
        loadings.row_mut(i).assign(&unit_or_zero(axis));
    }
    Ok((eigenvalues, loadings))
}

/// Pairs eigenvalues with their (column) eigenvectors, sorted descending.
fn sorted_eig_pairs(vals: Array1<f64>, vecs: Array2<f64>) -> Vec<(f64, Array1<f64>)> {
    let mut pairs: Vec<(f64, Array1<f64>)> = vals
        .into_iter()
        .zip(vecs.columns().into_iter().map(|col| col.to_owned()))
        .collect();
    pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    pairs
}

/// Normalizes a vector to unit length; vectors with vanishing norm become
/// all-zero rather than amplifying noise.
fn unit_or_zero(mut v: Array1<f64>) -> Array1<f64> {
    let norm = v.dot(&v).sqrt();
    if norm > 1e-9 {
        v.mapv_inplace(|x| x / norm);
    } else {
        v.fill(0.0);
    }
    v
}
