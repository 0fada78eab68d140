use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

// Models at or above this size tend to swap on a 12 GB card once the KV cache
// grows, so the recommendation sticks to smaller ones.
pub const SAFE_MODEL_SIZE_GB: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct RuntimeInventory {
    pub version: Option<String>,
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub name: String,
    pub size_bytes: u64,
}

impl ModelEntry {
    pub fn size_gb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0 / 1024.0 / 1024.0
    }

    pub fn is_safe_size(&self) -> bool {
        self.size_gb() < SAFE_MODEL_SIZE_GB
    }
}

impl RuntimeInventory {
    pub fn recommended_model(&self) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.is_safe_size())
    }
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
    #[serde(default)]
    size: u64,
}

pub async fn fetch_inventory(
    client: &Client,
    base_url: &str,
    timeout: Duration,
) -> Result<RuntimeInventory, reqwest::Error> {
    let base = base_url.trim_end_matches('/');

    let tags_text = client
        .get(format!("{base}/api/tags"))
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let models = parse_tags(&tags_text);

    let version = fetch_version(client, base, timeout).await;

    Ok(RuntimeInventory { version, models })
}

// Version is decoration on top of the tags call, so its failure never turns
// an otherwise reachable runtime into "unavailable".
async fn fetch_version(client: &Client, base: &str, timeout: Duration) -> Option<String> {
    let text = client
        .get(format!("{base}/api/version"))
        .timeout(timeout)
        .send()
        .await
        .ok()?
        .error_for_status()
        .ok()?
        .text()
        .await
        .ok()?;

    serde_json::from_str::<VersionResponse>(&text)
        .ok()
        .map(|v| v.version)
}

fn parse_tags(text: &str) -> Vec<ModelEntry> {
    let Ok(parsed) = serde_json::from_str::<TagsResponse>(text) else {
        return Vec::new();
    };

    parsed
        .models
        .into_iter()
        .map(|m| ModelEntry {
            name: m.name,
            size_bytes: m.size,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tags_payload() {
        let payload = r#"{
            "models": [
                {"name": "llama3:8b", "model": "llama3:8b", "size": 4661224676},
                {"name": "qwen2.5:14b", "size": 8988124173}
            ]
        }"#;
        let models = parse_tags(payload);
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "llama3:8b");
        assert_eq!(models[0].size_bytes, 4661224676);
    }

    #[test]
    fn malformed_tags_payload_yields_empty_list() {
        assert!(parse_tags("not json").is_empty());
        assert!(parse_tags("{}").is_empty());
    }

    #[test]
    fn parses_version_payload() {
        let parsed: VersionResponse =
            serde_json::from_str(r#"{"version": "0.5.7"}"#).expect("version payload");
        assert_eq!(parsed.version, "0.5.7");
    }

    #[test]
    fn recommendation_picks_first_model_under_the_limit() {
        let inventory = RuntimeInventory {
            version: Some("0.5.7".to_string()),
            models: vec![
                ModelEntry {
                    name: "qwen2.5:14b".to_string(),
                    size_bytes: 9 * 1024 * 1024 * 1024,
                },
                ModelEntry {
                    name: "llama3:8b".to_string(),
                    size_bytes: 4 * 1024 * 1024 * 1024,
                },
                ModelEntry {
                    name: "phi3:mini".to_string(),
                    size_bytes: 2 * 1024 * 1024 * 1024,
                },
            ],
        };
        let pick = inventory.recommended_model().expect("one model fits");
        assert_eq!(pick.name, "llama3:8b");
    }

    #[test]
    fn no_recommendation_when_everything_is_oversized() {
        let inventory = RuntimeInventory {
            version: None,
            models: vec![ModelEntry {
                name: "mixtral:8x7b".to_string(),
                size_bytes: 26 * 1024 * 1024 * 1024,
            }],
        };
        assert!(inventory.recommended_model().is_none());
    }
}
