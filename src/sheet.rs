use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::JobError;

/// Downloads one tab of the source spreadsheet as tab-separated text.
pub trait SheetClient: Send + Sync {
    fn download_tab(&self, tab_id: &str, destination: &Path) -> Result<(), JobError>;
}

#[derive(Clone)]
pub struct SheetHttpClient {
    client: Client,
    base_url: String,
    document_id: String,
}

impl SheetHttpClient {
    pub fn new(document_id: &str) -> Result<Self, JobError> {
        Self::with_base_url("https://docs.google.com/spreadsheets/d", document_id)
    }

    pub fn with_base_url(base_url: &str, document_id: &str) -> Result<Self, JobError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("relief-jobs/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| JobError::SheetHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| JobError::SheetHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            document_id: document_id.to_string(),
        })
    }

    pub fn export_url(&self, tab_id: &str) -> String {
        format!(
            "{}/{}/export?gid={tab_id}&format=tsv",
            self.base_url, self.document_id
        )
    }

    fn write_response_to_file(
        &self,
        mut response: reqwest::blocking::Response,
        destination: &Path,
    ) -> Result<(), JobError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "spreadsheet export failed".to_string());
            return Err(JobError::SheetStatus { status, message });
        }
        let mut file =
            File::create(destination).map_err(|err| JobError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| JobError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl SheetClient for SheetHttpClient {
    fn download_tab(&self, tab_id: &str, destination: &Path) -> Result<(), JobError> {
        let response = self
            .client
            .get(self.export_url(tab_id))
            .send()
            .map_err(|err| JobError::SheetHttp(err.to_string()))?;
        self.write_response_to_file(response, destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_url_selects_tab_and_format() {
        let client = SheetHttpClient::with_base_url("https://sheets.test/d/", "DOC").unwrap();
        assert_eq!(
            client.export_url("1234"),
            "https://sheets.test/d/DOC/export?gid=1234&format=tsv"
        );
    }
}
