// enrichr.rs

use std::thread;
use std::time::Duration;

use log::{debug, info};
use reqwest::blocking::multipart::Form;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{PipelineError, Result};

pub(crate) const DEFAULT_BASE_URL: &str = "http://amp.pharm.mssm.edu/Enrichr";

// The service needs a moment to index a freshly added list before the
// enrichment endpoint will answer for it.
const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(2);

/// Identifiers returned by the `/addList` endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ListIds {
    #[serde(rename = "userListId")]
    pub(crate) user_list_id: u64,
    #[serde(rename = "shortId")]
    pub(crate) short_id: String,
}

/// Blocking client for the Enrichr gene-set enrichment service.
pub(crate) struct EnrichrClient {
    base_url: String,
    poll_delay: Duration,
    http: reqwest::blocking::Client,
}

impl EnrichrClient {
    pub(crate) fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Client against a non-default server, e.g. a mirror or a test fixture.
    pub(crate) fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            poll_delay: DEFAULT_POLL_DELAY,
            http: reqwest::blocking::Client::new(),
        }
    }

    pub(crate) fn poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// POSTs a gene list and returns the ids the service assigned to it.
    pub(crate) fn add_list(&self, genes: &[String], description: &str) -> Result<ListIds> {
        let form = Form::new()
            .text("list", genes.join("\n"))
            .text("description", description.to_string());
        let response = self
            .http
            .post(format!("{}/addList", self.base_url))
            .multipart(form)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::ExternalService {
                status: status.as_u16(),
            });
        }
        let ids: ListIds = response.json()?;
        debug!(
            "Enrichr accepted {} gene(s): userListId={}, shortId={}",
            genes.len(),
            ids.user_list_id,
            ids.short_id
        );
        Ok(ids)
    }

    /// POSTs a gene list and returns a browser link to its enrichment page.
    pub(crate) fn link(&self, genes: &[String], description: &str) -> Result<String> {
        let ids = self.add_list(genes, description)?;
        Ok(format!("{}/enrich?dataset={}", self.base_url, ids.short_id))
    }

    /// POSTs a gene list and fetches the enrichment results for one gene-set
    /// library. A non-success response status is fatal to the call.
    pub(crate) fn result(
        &self,
        genes: &[String],
        description: &str,
        library: &str,
    ) -> Result<Value> {
        let ids = self.add_list(genes, description)?;
        thread::sleep(self.poll_delay);

        let url = enrich_url(&self.base_url, ids.user_list_id, library);
        info!("Fetching enrichment results from {}", url);
        let response = self.http.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::ExternalService {
                status: status.as_u16(),
            });
        }
        Ok(response.json()?)
    }

    /// Convenience wrapper returning only (term, combined score) pairs for
    /// the given library.
    pub(crate) fn term_scores(
        &self,
        genes: &[String],
        description: &str,
        library: &str,
    ) -> Result<Vec<(String, f64)>> {
        let results = self.result(genes, description, library)?;
        Ok(extract_term_scores(&results, library))
    }
}

fn enrich_url(base_url: &str, user_list_id: u64, library: &str) -> String {
    format!(
        "{}/enrich?userListId={}&backgroundType={}",
        base_url, user_list_id, library
    )
}

/// Pulls (term, combined score) pairs out of the enrichment payload.
///
/// Each entry under the library key is an array whose element 1 is the term
/// name and element 4 the combined score; entries that do not match that
/// shape are skipped.
fn extract_term_scores(results: &Value, library: &str) -> Vec<(String, f64)> {
    let entries = match results.get(library).and_then(Value::as_array) {
        Some(entries) => entries,
        None => return Vec::new(),
    };
    entries
        .iter()
        .filter_map(|entry| {
            let fields = entry.as_array()?;
            let term = fields.get(1)?.as_str()?;
            let score = fields.get(4)?.as_f64()?;
            Some((term.to_string(), score))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enrich_url_matches_service_format() {
        let url = enrich_url(DEFAULT_BASE_URL, 12345, "KEGG_2019_Human");
        assert_eq!(
            url,
            "http://amp.pharm.mssm.edu/Enrichr/enrich?userListId=12345&backgroundType=KEGG_2019_Human"
        );
    }

    #[test]
    fn list_ids_deserialize_from_service_payload() {
        let payload = r#"{"userListId": 363320, "shortId": "4xz"}"#;
        let ids: ListIds = serde_json::from_str(payload).unwrap();
        assert_eq!(ids.user_list_id, 363320);
        assert_eq!(ids.short_id, "4xz");
    }

    #[test]
    fn term_scores_extract_name_and_combined_score() {
        let results = json!({
            "KEGG_2019_Human": [
                [1, "Cell cycle", 0.001, 2.5, 42.7, ["CDK1"], 0.01],
                [2, "Apoptosis", 0.002, 1.9, 17.3, ["TP53"], 0.02]
            ]
        });
        let scores = extract_term_scores(&results, "KEGG_2019_Human");
        assert_eq!(
            scores,
            vec![
                ("Cell cycle".to_string(), 42.7),
                ("Apoptosis".to_string(), 17.3)
            ]
        );
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let results = json!({
            "KEGG_2019_Human": [
                [1, "Cell cycle", 0.001, 2.5, 42.7],
                "not-an-array",
                [2, "Too short"]
            ]
        });
        let scores = extract_term_scores(&results, "KEGG_2019_Human");
        assert_eq!(scores.len(), 1);
    }

    #[test]
    fn poll_delay_is_configurable() {
        let client = EnrichrClient::with_base_url("http://localhost:1")
            .poll_delay(Duration::from_millis(0));
        assert_eq!(client.poll_delay, Duration::from_millis(0));
        assert_eq!(client.base_url, "http://localhost:1");
    }

    #[test]
    fn missing_library_yields_empty_scores() {
        let results = json!({"OtherLibrary": []});
        assert!(extract_term_scores(&results, "KEGG_2019_Human").is_empty());
    }
}
