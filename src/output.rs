// output.rs

use std::fs::File;
use std::io::{BufWriter, Write};

use log::info;
use ndarray::Array2;
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::pca::PcaResult;
use crate::plot::{self, ProjectionSeries, VarianceSeries};

fn create_output_file(prefix: &str, suffix: &str) -> Result<BufWriter<File>> {
    let filename = format!("{}.{}", prefix, suffix);
    File::create(&filename).map(BufWriter::new).map_err(|e| {
        PipelineError::Configuration(format!(
            "failed to create output file {}: {}",
            filename, e
        ))
    })
}

/// Writes projected sample coordinates to `<prefix>.pca.tsv`.
pub(crate) fn write_projected(
    prefix: &str,
    sample_ids: &[String],
    projected: &Array2<f64>,
) -> Result<()> {
    if projected.ncols() == 0 {
        info!("No principal components to write.");
        return Ok(());
    }
    let mut writer = create_output_file(prefix, "pca.tsv")?;
    info!("Writing projected coordinates to {}.pca.tsv", prefix);

    write!(writer, "SampleID")?;
    for i in 1..=projected.ncols() {
        write!(writer, "\tPC{}", i)?;
    }
    writeln!(writer)?;

    for (sample_idx, sample_id) in sample_ids.iter().enumerate() {
        write!(writer, "{}", sample_id)?;
        for pc_idx in 0..projected.ncols() {
            write!(writer, "\t{:.6}", projected[[sample_idx, pc_idx]])?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Writes variance-explained percentages to `<prefix>.variance.tsv`.
pub(crate) fn write_variance(prefix: &str, variance_explained: &[f64]) -> Result<()> {
    if variance_explained.is_empty() {
        info!("No variance percentages to write.");
        return Ok(());
    }
    let mut writer = create_output_file(prefix, "variance.tsv")?;
    info!("Writing variance explained to {}.variance.tsv", prefix);

    writeln!(writer, "PC\tVarianceExplainedPct")?;
    for (i, pct) in variance_explained.iter().enumerate() {
        writeln!(writer, "PC{}\t{:.6}", i + 1, pct)?;
    }
    Ok(())
}

/// Writes the full loadings table to `<prefix>.loadings.tsv`, one row per
/// feature, one column per component.
pub(crate) fn write_loadings(
    prefix: &str,
    feature_names: &[String],
    loadings: &Array2<f64>,
) -> Result<()> {
    if loadings.nrows() == 0 {
        info!("No loadings to write (0 components).");
        return Ok(());
    }
    let mut writer = create_output_file(prefix, "loadings.tsv")?;
    info!("Writing feature loadings to {}.loadings.tsv", prefix);

    write!(writer, "Feature")?;
    for i in 1..=loadings.nrows() {
        write!(writer, "\tPC{}_loading", i)?;
    }
    writeln!(writer)?;

    for (feature_idx, feature) in feature_names.iter().enumerate() {
        write!(writer, "{}", feature)?;
        for pc_idx in 0..loadings.nrows() {
            write!(writer, "\t{:.6}", loadings[[pc_idx, feature_idx]])?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Writes the per-component ranked top loadings to `<prefix>.top_loadings.tsv`.
pub(crate) fn write_top_loadings(
    prefix: &str,
    result: &PcaResult,
    feature_names: &[String],
    max: usize,
) -> Result<()> {
    if result.loadings.nrows() == 0 {
        info!("No ranked loadings to write (0 components).");
        return Ok(());
    }
    let mut writer = create_output_file(prefix, "top_loadings.tsv")?;
    info!("Writing top-{} loadings to {}.top_loadings.tsv", max, prefix);

    writeln!(writer, "PC\tRank\tFeature\tWeight")?;
    for pc_idx in 0..result.loadings.nrows() {
        let ranked = plot::rank_loadings(result.loadings.row(pc_idx), feature_names, max);
        for (rank, entry) in ranked.iter().enumerate() {
            writeln!(
                writer,
                "PC{}\t{}\t{}\t{:.6}",
                pc_idx + 1,
                rank + 1,
                entry.feature,
                entry.weight
            )?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct SeriesFile<'a> {
    variance: &'a VarianceSeries,
    #[serde(skip_serializing_if = "Option::is_none")]
    projection: Option<&'a ProjectionSeries>,
}

/// Writes the chart-ready series records to `<prefix>.series.json`.
///
/// The projection entry is absent when fewer than 3 components were computed
/// or no coloring attribute was available.
pub(crate) fn write_series(
    prefix: &str,
    variance: &VarianceSeries,
    projection: Option<&ProjectionSeries>,
) -> Result<()> {
    let mut writer = create_output_file(prefix, "series.json")?;
    info!("Writing chart series to {}.series.json", prefix);
    serde_json::to_writer_pretty(
        &mut writer,
        &SeriesFile {
            variance,
            projection,
        },
    )
    .map_err(|e| {
        PipelineError::Configuration(format!("failed to serialize chart series: {}", e))
    })?;
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::fs;

    #[test]
    fn writes_projected_tsv_with_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("run").display().to_string();
        let projected = array![[1.0, 2.0], [3.0, 4.0]];
        let ids = vec!["gsm1".to_string(), "gsm2".to_string()];
        write_projected(&prefix, &ids, &projected).unwrap();

        let content = fs::read_to_string(format!("{}.pca.tsv", prefix)).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), "SampleID\tPC1\tPC2");
        assert_eq!(lines.next().unwrap(), "gsm1\t1.000000\t2.000000");
        assert_eq!(lines.next().unwrap(), "gsm2\t3.000000\t4.000000");
    }

    #[test]
    fn writes_variance_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("run").display().to_string();
        write_variance(&prefix, &[61.5, 38.5]).unwrap();

        let content = fs::read_to_string(format!("{}.variance.tsv", prefix)).unwrap();
        assert!(content.starts_with("PC\tVarianceExplainedPct\n"));
        assert!(content.contains("PC1\t61.500000"));
        assert!(content.contains("PC2\t38.500000"));
    }

    #[test]
    fn writes_loadings_feature_major() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("run").display().to_string();
        // 2 components x 3 features.
        let loadings = array![[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]];
        let features = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        write_loadings(&prefix, &features, &loadings).unwrap();

        let content = fs::read_to_string(format!("{}.loadings.tsv", prefix)).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), "Feature\tPC1_loading\tPC2_loading");
        assert_eq!(lines.next().unwrap(), "a\t0.100000\t0.400000");
    }

    #[test]
    fn unwritable_prefix_is_a_configuration_error() {
        let err = write_variance("/nonexistent-dir/run", &[100.0]).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
