use std::env;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Result};
use image::DynamicImage;
use numa_contracts::events::{payload, EventWriter};
use numa_contracts::meals::MealAnalysis;
use numa_contracts::AnalysisError;
use serde_json::json;
use sha2::{Digest, Sha256};

pub mod credentials;
pub mod documents;
pub mod parser;
pub mod preprocess;
pub mod profile_store;
pub mod vision;
pub mod worker;

pub use credentials::{ApiCredential, CredentialResolver, CredentialSource};
pub use documents::{
    DisabledDocumentStore, DocumentStore, FirestoreConfig, FirestoreDocumentStore,
    MemoryDocumentStore,
};
pub use preprocess::{load_image, EncodedImage, ImagePreprocessor};
pub use profile_store::ProfileStore;
pub use vision::{ReqwestTransport, VisionClient, VisionConfig, VisionTransport};
pub use worker::{Pending, ProfileWorker};

#[derive(Debug, Clone, Default)]
pub struct AnalyzerConfig {
    pub vision: VisionConfig,
    pub preprocessor: ImagePreprocessor,
    pub credentials: CredentialResolver,
}

impl AnalyzerConfig {
    pub fn from_env() -> Self {
        let mut credentials = CredentialResolver::default();
        if let Some(path) = non_empty_env("NUMA_CONFIG_PATH") {
            credentials = credentials.with_config_path(path);
        }
        Self {
            vision: VisionConfig::from_env(),
            preprocessor: ImagePreprocessor::default(),
            credentials,
        }
    }
}

/// Photo in, meal record out: credentials, connectivity probe, JPEG
/// preparation, the vision request and response parsing, in that order.
pub struct MealAnalyzer<T: VisionTransport = ReqwestTransport> {
    client: VisionClient<T>,
    preprocessor: ImagePreprocessor,
    credentials: CredentialResolver,
    events: Option<EventWriter>,
}

impl MealAnalyzer<ReqwestTransport> {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self::with_transport(ReqwestTransport::new(), config)
    }
}

impl<T: VisionTransport> MealAnalyzer<T> {
    pub fn with_transport(transport: T, config: AnalyzerConfig) -> Self {
        Self {
            client: VisionClient::with_transport(transport, config.vision),
            preprocessor: config.preprocessor,
            credentials: config.credentials,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn client(&self) -> &VisionClient<T> {
        &self.client
    }

    pub fn analyze(&self, image: &DynamicImage) -> Result<MealAnalysis, AnalysisError> {
        let started = Instant::now();
        self.record(
            "analysis_started",
            payload([
                ("width", json!(image.width())),
                ("height", json!(image.height())),
                ("model", json!(self.client.config().model)),
            ]),
        );

        match self.run_pipeline(image) {
            Ok((meal, digest)) => {
                log::info!(
                    "meal {} analyzed: {} kcal, confidence {:.2}",
                    meal.id,
                    meal.estimated_calories,
                    meal.confidence
                );
                self.record(
                    "analysis_completed",
                    payload([
                        ("meal_id", json!(meal.id)),
                        ("calories", json!(meal.estimated_calories)),
                        ("confidence", json!(meal.confidence)),
                        ("image_sha256", json!(digest)),
                        ("elapsed_ms", json!(started.elapsed().as_millis() as u64)),
                    ]),
                );
                Ok(meal)
            }
            Err(err) => {
                log::error!("meal analysis failed: {err}");
                self.record(
                    "analysis_failed",
                    payload([
                        ("kind", json!(err.kind())),
                        ("message_key", json!(err.message_key())),
                        ("detail", json!(err.detail())),
                        ("elapsed_ms", json!(started.elapsed().as_millis() as u64)),
                    ]),
                );
                Err(err)
            }
        }
    }

    pub fn analyze_path(&self, path: &Path) -> Result<MealAnalysis, AnalysisError> {
        let image = load_image(path)?;
        self.analyze(&image)
    }

    fn run_pipeline(&self, image: &DynamicImage) -> Result<(MealAnalysis, String), AnalysisError> {
        let credential = self.credentials.resolve().ok_or_else(|| {
            log::error!("no vision API key configured");
            AnalysisError::ApiKeyMissing
        })?;
        self.client.check_connectivity()?;
        let encoded = self.preprocessor.encode(image)?;
        log::debug!(
            "meal photo encoded at quality {} ({} bytes)",
            encoded.quality,
            encoded.byte_len
        );
        let digest = sha256_hex(encoded.base64.as_bytes());
        let completion = self.client.request_analysis(&credential.key, &encoded)?;
        let meal = parser::parse_completion(&completion)?;
        Ok((meal, digest))
    }

    fn record(&self, event_type: &str, event: numa_contracts::events::EventPayload) {
        if let Some(events) = &self.events {
            events.record(event_type, event);
        }
    }
}

impl<T: VisionTransport + 'static> MealAnalyzer<T> {
    /// Runs [`MealAnalyzer::analyze`] on a worker thread.
    pub fn spawn_analysis(
        self: &Arc<Self>,
        image: DynamicImage,
    ) -> Result<Pending<Result<MealAnalysis, AnalysisError>>> {
        let (reply, pending) = Pending::channel();
        let analyzer = Arc::clone(self);
        thread::Builder::new()
            .name("numa-analysis".to_string())
            .spawn(move || {
                let _ = reply.send(analyzer.analyze(&image));
            })
            .map_err(|err| anyhow!("analysis worker spawn failed: {err}"))?;
        Ok(pending)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Reads `key`, trimmed; `None` when unset or blank.
pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::{Rgb, RgbImage};
    use serde_json::Value;

    use super::*;
    use crate::vision::tests::ScriptedTransport;
    use crate::vision::TransportError;

    const EGGS: &str = r#"{"choices":[{"message":{"role":"assistant","content":"Here you go:\n{\"ingredients\":[\"egg\",\"toast\"],\"estimated_calories\":320,\"macros\":{\"protein\":18,\"carbs\":24,\"fat\":15},\"confidence\":0.82,\"analysis_text\":\"Fried eggs on toast\"}"}}]}"#;

    fn photo() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 24, Rgb([200, 160, 90])))
    }

    fn config_with_key(key: Option<&str>) -> AnalyzerConfig {
        AnalyzerConfig {
            credentials: CredentialResolver {
                env_var: "NUMA_TEST_UNSET_VISION_KEY".to_string(),
                config_path: None,
                build_time: key.map(str::to_string),
            },
            ..AnalyzerConfig::default()
        }
    }

    #[test]
    fn analyze_returns_parsed_meal() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let analyzer = MealAnalyzer::with_transport(
            ScriptedTransport::replying(200, EGGS),
            config_with_key(Some("sk-test")),
        )
        .with_events(EventWriter::new(&events_path, "test"));

        let meal = analyzer.analyze(&photo())?;
        assert_eq!(meal.ingredients, vec!["egg", "toast"]);
        assert_eq!(meal.estimated_calories, 320);
        assert_eq!(meal.analysis_text.as_deref(), Some("Fried eggs on toast"));

        let rows: Vec<Value> = std::fs::read_to_string(events_path)?
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["type"], json!("analysis_started"));
        assert_eq!(rows[1]["type"], json!("analysis_completed"));
        assert_eq!(rows[1]["meal_id"], json!(meal.id));
        assert_eq!(rows[1]["image_sha256"].as_str().map(str::len), Some(64));
        Ok(())
    }

    #[test]
    fn missing_key_never_reaches_the_network() {
        let analyzer = MealAnalyzer::with_transport(
            ScriptedTransport::replying(200, EGGS),
            config_with_key(None),
        );
        assert_eq!(analyzer.analyze(&photo()), Err(AnalysisError::ApiKeyMissing));
        assert_eq!(analyzer.client().transport().probe_count(), 0);
        assert_eq!(analyzer.client().transport().post_count(), 0);
    }

    #[test]
    fn missing_key_wins_over_being_offline() {
        let mut transport = ScriptedTransport::replying(200, EGGS);
        transport.probe = Err(TransportError::new("offline"));
        let analyzer = MealAnalyzer::with_transport(transport, config_with_key(None));
        assert_eq!(analyzer.analyze(&photo()), Err(AnalysisError::ApiKeyMissing));
        assert_eq!(analyzer.client().transport().probe_count(), 0);
    }

    #[test]
    fn blank_env_values_read_as_unset() {
        env::set_var("NUMA_TEST_BLANK_ENV", "   ");
        assert_eq!(non_empty_env("NUMA_TEST_BLANK_ENV"), None);
        env::set_var("NUMA_TEST_PADDED_ENV", "  .numa-test  ");
        assert_eq!(
            non_empty_env("NUMA_TEST_PADDED_ENV").as_deref(),
            Some(".numa-test")
        );
    }

    #[test]
    fn rejected_key_is_reported_as_missing() {
        let analyzer = MealAnalyzer::with_transport(
            ScriptedTransport::replying(401, "{\"error\":\"invalid key\"}"),
            config_with_key(Some("sk-revoked")),
        );
        assert_eq!(analyzer.analyze(&photo()), Err(AnalysisError::ApiKeyMissing));
    }

    #[test]
    fn offline_probe_short_circuits() {
        let mut transport = ScriptedTransport::replying(200, EGGS);
        transport.probe = Err(TransportError::new("network unreachable"));
        let analyzer = MealAnalyzer::with_transport(transport, config_with_key(Some("sk-test")));
        assert_eq!(
            analyzer.analyze(&photo()),
            Err(AnalysisError::NoInternetConnection)
        );
        assert_eq!(analyzer.client().transport().post_count(), 0);
    }

    #[test]
    fn low_confidence_reply_means_no_food() -> anyhow::Result<()> {
        let body = r#"{"choices":[{"message":{"content":"{\"ingredients\":[],\"estimated_calories\":0,\"macros\":{\"protein\":0,\"carbs\":0,\"fat\":0},\"confidence\":0.1}"}}]}"#;
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let analyzer = MealAnalyzer::with_transport(
            ScriptedTransport::replying(200, body),
            config_with_key(Some("sk-test")),
        )
        .with_events(EventWriter::new(&events_path, "test"));
        assert_eq!(analyzer.analyze(&photo()), Err(AnalysisError::NoFoodDetected));

        let raw = std::fs::read_to_string(events_path)?;
        let last: Value = raw
            .lines()
            .last()
            .and_then(|line| serde_json::from_str(line).ok())
            .unwrap_or(Value::Null);
        assert_eq!(last["type"], json!("analysis_failed"));
        assert_eq!(last["kind"], json!(AnalysisError::NoFoodDetected.kind()));
        Ok(())
    }

    #[test]
    fn spawned_analysis_delivers_once() -> anyhow::Result<()> {
        let analyzer = Arc::new(MealAnalyzer::with_transport(
            ScriptedTransport::replying(200, EGGS),
            config_with_key(Some("sk-test")),
        ));
        let pending = analyzer.spawn_analysis(photo())?;
        let outcome = pending.wait_timeout(Duration::from_secs(10))?;
        let meal = outcome.ok_or_else(|| anyhow!("analysis did not finish"))??;
        assert_eq!(meal.estimated_calories, 320);
        Ok(())
    }
}
