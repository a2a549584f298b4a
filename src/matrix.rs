// matrix.rs

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;
use ndarray::Array2;

use crate::error::{PipelineError, Result};

/// Dense expression matrix: samples as rows, named numeric features as columns.
///
/// Every sample carries the same feature set in the same order and the matrix
/// holds no missing values; rows that become non-finite during normalization
/// are removed (and reported) before the decomposition ever sees them.
#[derive(Debug, Clone)]
pub(crate) struct FeatureMatrix {
    pub(crate) sample_ids: Vec<String>,
    pub(crate) feature_names: Vec<String>,
    pub(crate) values: Array2<f64>,
}

impl FeatureMatrix {
    pub(crate) fn n_samples(&self) -> usize {
        self.values.nrows()
    }

    pub(crate) fn n_features(&self) -> usize {
        self.values.ncols()
    }

    /// Reads a TSV file: header row is `<id-column>\t<feature>...`, each data
    /// row is `<sample-id>\t<value>...`.
    pub(crate) fn from_tsv(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "cannot open matrix file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_reader(BufReader::new(file), &path.display().to_string())
    }

    pub(crate) fn from_reader<R: BufRead>(reader: R, source: &str) -> Result<Self> {
        let mut lines = reader.lines();

        let header = match lines.next() {
            Some(line) => line?,
            None => {
                return Err(PipelineError::Configuration(format!(
                    "matrix file {} is empty",
                    source
                )))
            }
        };
        let mut header_fields = header.split('\t');
        header_fields.next(); // id column label, unused
        let feature_names: Vec<String> = header_fields.map(str::to_owned).collect();
        if feature_names.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "matrix file {} has no feature columns",
                source
            )));
        }

        let mut sample_ids = Vec::new();
        let mut flat = Vec::new();
        for (line_no, line) in lines.enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let sample_id = fields
                .next()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    PipelineError::Configuration(format!(
                        "matrix file {} line {}: missing sample id",
                        source,
                        line_no + 2
                    ))
                })?;

            let mut row_len = 0usize;
            for field in fields {
                let value: f64 = field.trim().parse().map_err(|_| {
                    PipelineError::Configuration(format!(
                        "matrix file {} line {}: '{}' is not a number",
                        source,
                        line_no + 2,
                        field
                    ))
                })?;
                flat.push(value);
                row_len += 1;
            }
            if row_len != feature_names.len() {
                return Err(PipelineError::Configuration(format!(
                    "matrix file {} line {}: expected {} values, found {}",
                    source,
                    line_no + 2,
                    feature_names.len(),
                    row_len
                )));
            }
            sample_ids.push(sample_id.to_owned());
        }

        if sample_ids.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "matrix file {} contains no sample rows",
                source
            )));
        }

        let values = Array2::from_shape_vec((sample_ids.len(), feature_names.len()), flat)
            .map_err(|e| {
                PipelineError::Configuration(format!("matrix file {}: {}", source, e))
            })?;
        debug!(
            "Loaded matrix from {}: {} samples x {} features",
            source,
            sample_ids.len(),
            feature_names.len()
        );
        Ok(Self {
            sample_ids,
            feature_names,
            values,
        })
    }
}

/// Sample annotations keyed by the same ids as the feature matrix.
///
/// Purely for downstream coloring/grouping; never feeds the decomposition.
/// Values stay as strings here, the presentation adapter decides per column
/// whether a numeric interpretation applies.
#[derive(Debug, Clone)]
pub(crate) struct LabelTable {
    pub(crate) sample_ids: Vec<String>,
    pub(crate) columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl LabelTable {
    pub(crate) fn from_tsv(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "cannot open label file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_reader(BufReader::new(file), &path.display().to_string())
    }

    pub(crate) fn from_reader<R: BufRead>(reader: R, source: &str) -> Result<Self> {
        let mut lines = reader.lines();

        let header = match lines.next() {
            Some(line) => line?,
            None => {
                return Err(PipelineError::Configuration(format!(
                    "label file {} is empty",
                    source
                )))
            }
        };
        let mut header_fields = header.split('\t');
        header_fields.next();
        let columns: Vec<String> = header_fields.map(str::to_owned).collect();
        if columns.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "label file {} has no label columns",
                source
            )));
        }

        let mut sample_ids = Vec::new();
        let mut rows = Vec::new();
        for (line_no, line) in lines.enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let sample_id = fields
                .next()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    PipelineError::Configuration(format!(
                        "label file {} line {}: missing sample id",
                        source,
                        line_no + 2
                    ))
                })?;
            let row: Vec<String> = fields.map(str::to_owned).collect();
            if row.len() != columns.len() {
                return Err(PipelineError::Configuration(format!(
                    "label file {} line {}: expected {} values, found {}",
                    source,
                    line_no + 2,
                    columns.len(),
                    row.len()
                )));
            }
            sample_ids.push(sample_id.to_owned());
            rows.push(row);
        }

        Ok(Self {
            sample_ids,
            columns,
            rows,
        })
    }

    /// Reorders the table to match `sample_ids` exactly. Every requested id
    /// must be present; a missing annotation is a configuration error, not a
    /// silent drop.
    pub(crate) fn align(&self, sample_ids: &[String]) -> Result<LabelTable> {
        let index: HashMap<&str, usize> = self
            .sample_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut rows = Vec::with_capacity(sample_ids.len());
        for id in sample_ids {
            let row_idx = index.get(id.as_str()).ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "sample '{}' present in the matrix has no row in the label table",
                    id
                ))
            })?;
            rows.push(self.rows[*row_idx].clone());
        }

        Ok(LabelTable {
            sample_ids: sample_ids.to_vec(),
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Values of one label column, in row order.
    pub(crate) fn column(&self, name: &str) -> Result<Vec<String>> {
        let col_idx = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "label column '{}' not found (available: {})",
                    name,
                    self.columns.join(", ")
                ))
            })?;
        Ok(self.rows.iter().map(|row| row[col_idx].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn matrix_tsv() -> &'static str {
        "SampleID\tgeneA\tgeneB\ngsm1\t1.0\t2.0\ngsm2\t3.0\t4.0\ngsm3\t5.0\t6.0\n"
    }

    #[test]
    fn reads_matrix_tsv() {
        let m = FeatureMatrix::from_reader(Cursor::new(matrix_tsv()), "test").unwrap();
        assert_eq!(m.sample_ids, vec!["gsm1", "gsm2", "gsm3"]);
        assert_eq!(m.feature_names, vec!["geneA", "geneB"]);
        assert_eq!(m.n_samples(), 3);
        assert_eq!(m.n_features(), 2);
        assert_eq!(m.values[[1, 1]], 4.0);
    }

    #[test]
    fn rejects_non_numeric_cell() {
        let tsv = "SampleID\tgeneA\ngsm1\tabc\n";
        let err = FeatureMatrix::from_reader(Cursor::new(tsv), "test").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn rejects_ragged_row() {
        let tsv = "SampleID\tgeneA\tgeneB\ngsm1\t1.0\n";
        let err = FeatureMatrix::from_reader(Cursor::new(tsv), "test").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn rejects_empty_matrix() {
        let err = FeatureMatrix::from_reader(Cursor::new("SampleID\tgeneA\n"), "test")
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn aligns_labels_to_matrix_order() {
        let tsv = "SampleID\tgroup\ngsm3\tcontrol\ngsm1\ttreated\ngsm2\tcontrol\n";
        let labels = LabelTable::from_reader(Cursor::new(tsv), "test").unwrap();
        let order = vec!["gsm1".to_string(), "gsm2".to_string(), "gsm3".to_string()];
        let aligned = labels.align(&order).unwrap();
        assert_eq!(aligned.sample_ids, order);
        assert_eq!(
            aligned.column("group").unwrap(),
            vec!["treated", "control", "control"]
        );
    }

    #[test]
    fn align_fails_on_missing_sample() {
        let tsv = "SampleID\tgroup\ngsm1\tcontrol\n";
        let labels = LabelTable::from_reader(Cursor::new(tsv), "test").unwrap();
        let err = labels
            .align(&["gsm1".to_string(), "gsm9".to_string()])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn unknown_label_column_is_an_error() {
        let tsv = "SampleID\tgroup\ngsm1\tcontrol\n";
        let labels = LabelTable::from_reader(Cursor::new(tsv), "test").unwrap();
        assert!(matches!(
            labels.column("missing").unwrap_err(),
            PipelineError::Configuration(_)
        ));
    }
}
