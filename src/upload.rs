//! Upload sink client.
//!
//! The webservice accepting the record batches is opaque to the pipeline;
//! it takes the flattened records plus database credentials and answers
//! with a plain HTTP status.

use crate::error::UploadError;
use crate::extract::MetricRecord;
use serde_derive::Serialize;

/// Records per upload request. Large batches are split so a single
/// oversized cycle cannot exceed the sink's request limits.
const UPLOAD_BATCH_SIZE: usize = 500;

/// Database credentials forwarded with every batch.
#[derive(Serialize, Debug, Clone)]
pub struct UploadCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    records: &'a [MetricRecord],
    username: &'a str,
    password: &'a str,
}

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Posts the batch in fixed-size chunks. Chunks already accepted stay
    /// accepted when a later chunk fails; the sink deduplicates on its own
    /// schedule.
    pub async fn write(
        &self,
        records: &[MetricRecord],
        credentials: &UploadCredentials,
    ) -> Result<(), UploadError> {
        let url = format!("{}/upload", self.base_url.trim_end_matches('/'));

        for chunk in records.chunks(UPLOAD_BATCH_SIZE) {
            let request = UploadRequest {
                records: chunk,
                username: &credentials.username,
                password: &credentials.password,
            };
            let response = self.http.post(&url).json(&request).send().await?;

            let code = response.status().as_u16();
            if !(200..300).contains(&code) {
                let message = response.text().await.unwrap_or_default();
                return Err(UploadError::Rejected { code, message });
            }
        }
        Ok(())
    }
}
