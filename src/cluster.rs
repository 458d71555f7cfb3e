//! Client for the behavioral analytics service, which assigns each user a
//! cluster label used to pick a sensitivity profile.

use std::time::Duration;

use log::{info, warn};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ClusterResponse {
    cluster_name: String,
    #[serde(default)]
    confidence: f64,
}

/// Thin HTTP client over the analytics service. Lookup failures degrade to
/// default thresholds rather than blocking activity startup.
pub struct ClusterClient {
    http: reqwest::Client,
    base_url: String,
}

impl ClusterClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetches the user's cluster label. None means "no profile": the user
    /// is unclustered, the service is down, or the response was malformed.
    pub async fn get_user_cluster(&self, user_id: i64) -> Option<String> {
        let url = format!("{}/clustering/users/{}/cluster", self.base_url, user_id);

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!("cluster lookup failed for user {user_id}: {err}");
                return None;
            }
        };

        if !response.status().is_success() {
            // 404 is the normal path for users the pipeline has not seen.
            info!(
                "no cluster for user {user_id} (status {})",
                response.status()
            );
            return None;
        }

        match response.json::<ClusterResponse>().await {
            Ok(body) => {
                info!(
                    "user {user_id} assigned cluster '{}' (confidence {:.2})",
                    body.cluster_name, body.confidence
                );
                Some(body.cluster_name)
            }
            Err(err) => {
                warn!("malformed cluster response for user {user_id}: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = ClusterClient::new("http://analytics.local/").unwrap();
        assert_eq!(client.base_url, "http://analytics.local");
    }

    #[tokio::test]
    async fn unreachable_service_degrades_to_none() {
        let client = ClusterClient::new("http://127.0.0.1:1").unwrap();
        assert_eq!(client.get_user_cluster(42).await, None);
    }
}
