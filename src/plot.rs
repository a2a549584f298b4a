// plot.rs

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView1};
use serde::Serialize;

use crate::error::{PipelineError, Result};

/// One feature's weight in a principal component, for the ranked view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct RankedLoading {
    pub(crate) feature: String,
    pub(crate) weight: f64,
}

/// Bar-chart series for variance explained: one bar per component.
#[derive(Debug, Serialize)]
pub(crate) struct VarianceSeries {
    pub(crate) labels: Vec<String>,
    pub(crate) values: Vec<f64>,
    /// Hover text, percentage formatted to 2 decimal places.
    pub(crate) text: Vec<String>,
}

/// One scatter trace over the first three principal components.
#[derive(Debug, Serialize)]
pub(crate) struct ProjectionTrace {
    pub(crate) name: String,
    pub(crate) sample_ids: Vec<String>,
    pub(crate) x: Vec<f64>,
    pub(crate) y: Vec<f64>,
    pub(crate) z: Vec<f64>,
    /// Per-point scale values; only set in continuous mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) color_values: Option<Vec<f64>>,
}

/// Chart-ready 3-axis projection. Grouped when the coloring attribute is
/// categorical (one trace per distinct value), continuous when every value of
/// the attribute parses as a number.
#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub(crate) enum ProjectionSeries {
    Grouped {
        axis_titles: [String; 3],
        traces: Vec<ProjectionTrace>,
    },
    Continuous {
        axis_titles: [String; 3],
        color_scale: String,
        trace: ProjectionTrace,
    },
}

/// Ranks one component's loadings by descending absolute weight, truncated to
/// the top `max` features. Ranking is always per component; a caller wanting
/// another component ranks that component's row.
pub(crate) fn rank_loadings(
    loadings_row: ArrayView1<f64>,
    feature_names: &[String],
    max: usize,
) -> Vec<RankedLoading> {
    let mut ranked: Vec<RankedLoading> = feature_names
        .iter()
        .zip(loadings_row.iter())
        .map(|(feature, &weight)| RankedLoading {
            feature: feature.clone(),
            weight,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.weight
            .abs()
            .partial_cmp(&a.weight.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(max);
    ranked
}

/// Builds the variance-explained bar series: `PC1..PCk` labels with
/// 2-decimal-place percentage text.
pub(crate) fn build_variance_series(variance_explained: &[f64]) -> VarianceSeries {
    VarianceSeries {
        labels: (1..=variance_explained.len())
            .map(|i| format!("PC{}", i))
            .collect(),
        values: variance_explained.to_vec(),
        text: variance_explained
            .iter()
            .map(|v| format!("{:.2}%", v))
            .collect(),
    }
}

/// Builds the 3-axis projection series colored by one label column.
///
/// Mode selection is type-driven: if every value of the color column parses
/// as f64 the series is continuous; otherwise one trace per distinct value.
/// Fewer than three computed components is an `InsufficientComponents` error,
/// never an index fault.
pub(crate) fn build_projection_series(
    projected: &Array2<f64>,
    variance_explained: &[f64],
    sample_ids: &[String],
    color_name: &str,
    color_values: &[String],
) -> Result<ProjectionSeries> {
    let available = projected.ncols().min(variance_explained.len());
    if available < 3 {
        return Err(PipelineError::InsufficientComponents {
            needed: 3,
            available,
        });
    }

    let axis_titles = [
        format!("PC1 ({:.2}% of variance)", variance_explained[0]),
        format!("PC2 ({:.2}% of variance)", variance_explained[1]),
        format!("PC3 ({:.2}% of variance)", variance_explained[2]),
    ];

    let numeric: Option<Vec<f64>> = color_values
        .iter()
        .map(|v| v.trim().parse::<f64>().ok())
        .collect();

    if let Some(scale_values) = numeric {
        let trace = ProjectionTrace {
            name: color_name.to_string(),
            sample_ids: sample_ids.to_vec(),
            x: projected.column(0).to_vec(),
            y: projected.column(1).to_vec(),
            z: projected.column(2).to_vec(),
            color_values: Some(scale_values),
        };
        return Ok(ProjectionSeries::Continuous {
            axis_titles,
            color_scale: "Viridis".to_string(),
            trace,
        });
    }

    // Categorical: group sample indices by label value, deterministically.
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, value) in color_values.iter().enumerate() {
        groups.entry(value.as_str()).or_default().push(idx);
    }
    let traces = groups
        .into_iter()
        .map(|(value, members)| ProjectionTrace {
            name: value.to_string(),
            sample_ids: members.iter().map(|&i| sample_ids[i].clone()).collect(),
            x: members.iter().map(|&i| projected[[i, 0]]).collect(),
            y: members.iter().map(|&i| projected[[i, 1]]).collect(),
            z: members.iter().map(|&i| projected[[i, 2]]).collect(),
            color_values: None,
        })
        .collect();

    Ok(ProjectionSeries::Grouped {
        axis_titles,
        traces,
    })
}
