//! HTTP client for the external speech-to-text service
//!
//! The service exposes two passes over a user's accumulated audio: a cheap
//! low-latency `quick_pass` over the open window and a slower, more
//! accurate `revise_pass` over a completed window. Both are consumed as
//! opaque GET operations; model internals live entirely on the other side.

use crate::error::AdapterError;
use crate::protocol::TranscriptPayload;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Seam between the relay and the speech service, mockable in tests
pub trait SpeechAdapter {
    /// Fast, low-accuracy transcription of the window containing `sequence`
    fn quick_pass(
        &self,
        uid: &str,
        sequence: u64,
    ) -> impl Future<Output = Result<TranscriptPayload, AdapterError>> + Send;

    /// High-accuracy re-transcription of the completed window ending at
    /// `sequence`, spanning `window_size` segments
    fn revise_pass(
        &self,
        uid: &str,
        sequence: u64,
        window_size: u32,
    ) -> impl Future<Output = Result<TranscriptPayload, AdapterError>> + Send;
}

/// `SpeechAdapter` backed by the HTTP speech service
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAdapter {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL for one pass. The uid is client-declared, so it goes through
    /// the query encoder rather than straight into the string.
    fn pass_url(&self, name: &str, uid: &str, sequence: u64) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, name))?;
        url.query_pairs_mut()
            .append_pair("uid", uid)
            .append_pair("segment", &sequence.to_string());
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<TranscriptPayload, AdapterError> {
        debug!(url = %url, "calling speech service");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::ServerError {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

impl SpeechAdapter for HttpAdapter {
    async fn quick_pass(&self, uid: &str, sequence: u64) -> Result<TranscriptPayload, AdapterError> {
        let url = self.pass_url("quick_pass", uid, sequence)?;
        self.get(url).await
    }

    async fn revise_pass(
        &self,
        uid: &str,
        sequence: u64,
        window_size: u32,
    ) -> Result<TranscriptPayload, AdapterError> {
        let mut url = self.pass_url("revise_pass", uid, sequence)?;
        url.query_pairs_mut()
            .append_pair("window", &window_size.to_string());
        self.get(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_is_encoded_into_the_query() {
        let adapter = HttpAdapter::new("http://127.0.0.1:40349/", Duration::from_secs(1)).unwrap();

        let url = adapter.pass_url("quick_pass", "room/42&x=1", 3).unwrap();
        assert_eq!(url.path(), "/quick_pass");
        assert_eq!(url.query(), Some("uid=room%2F42%26x%3D1&segment=3"));

        let mut url = adapter.pass_url("revise_pass", "plain", 8).unwrap();
        url.query_pairs_mut().append_pair("window", "8");
        assert_eq!(url.query(), Some("uid=plain&segment=8&window=8"));
    }
}
