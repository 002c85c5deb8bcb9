use anyhow::{anyhow, bail, Context, Result};
use numa_contracts::meals::MealAnalysis;
use numa_contracts::profile::Profile;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response as HttpResponse};
use reqwest::StatusCode;
use serde_json::{json, Map, Number, Value};

use super::{DocumentStore, MEALS_COLLECTION, USERS_COLLECTION};
use crate::non_empty_env;

const DEFAULT_API_BASE: &str = "https://firestore.googleapis.com/v1";
const LIST_PAGE_SIZE: u32 = 300;

/// Fields written as Firestore timestamps rather than strings.
const TIMESTAMP_FIELDS: [&str; 3] = ["created_at", "updated_at", "timestamp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub api_base: String,
    pub api_key: Option<String>,
    pub bearer_token: Option<String>,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: "(default)".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            bearer_token: None,
        }
    }

    /// `None` unless `NUMA_FIRESTORE_PROJECT` is set.
    pub fn from_env() -> Option<Self> {
        let mut config = Self::new(non_empty_env("NUMA_FIRESTORE_PROJECT")?);
        if let Some(base) = non_empty_env("NUMA_FIRESTORE_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        config.api_key = non_empty_env("NUMA_FIRESTORE_API_KEY");
        config.bearer_token = non_empty_env("NUMA_FIRESTORE_TOKEN");
        Some(config)
    }

    pub fn documents_root(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents",
            self.api_base.trim_end_matches('/'),
            self.project_id,
            self.database
        )
    }
}

/// Firestore REST v1 client: `users/{id}` and `users/{id}/meals/{meal_id}`.
pub struct FirestoreDocumentStore {
    config: FirestoreConfig,
    http: HttpClient,
}

impl FirestoreDocumentStore {
    pub fn new(config: FirestoreConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    fn profile_url(&self, profile_id: &str) -> String {
        format!(
            "{}/{USERS_COLLECTION}/{profile_id}",
            self.config.documents_root()
        )
    }

    fn meals_url(&self, profile_id: &str) -> String {
        format!("{}/{MEALS_COLLECTION}", self.profile_url(profile_id))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request;
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("key", key.as_str())]);
        }
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }
        request
    }

    fn put_document(&self, url: &str, payload: &Value) -> Result<()> {
        let body = json!({ "fields": encode_fields(payload)? });
        let response = self
            .authorize(self.http.patch(url))
            .json(&body)
            .send()
            .with_context(|| format!("Firestore write failed ({url})"))?;
        response_json_or_error(response)?;
        Ok(())
    }
}

impl DocumentStore for FirestoreDocumentStore {
    fn name(&self) -> &str {
        "firestore"
    }

    fn load_profile(&self, profile_id: &str) -> Result<Option<Profile>> {
        let url = self.profile_url(profile_id);
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .with_context(|| format!("Firestore read failed ({url})"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document = response_json_or_error(response)?;
        let profile = serde_json::from_value(decode_document(&document)?)
            .context("Firestore profile document has an unexpected shape")?;
        Ok(Some(profile))
    }

    fn save_profile(&self, profile: &Profile) -> Result<()> {
        let payload = serde_json::to_value(profile)?;
        self.put_document(&self.profile_url(&profile.id), &payload)
    }

    fn save_meal(&self, profile_id: &str, meal: &MealAnalysis) -> Result<()> {
        let payload = serde_json::to_value(meal)?;
        let url = format!("{}/{}", self.meals_url(profile_id), meal.id);
        self.put_document(&url, &payload)
    }

    fn list_meals(&self, profile_id: &str) -> Result<Vec<MealAnalysis>> {
        let url = self.meals_url(profile_id);
        let mut meals = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .authorize(self.http.get(&url))
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = request
                .send()
                .with_context(|| format!("Firestore list failed ({url})"))?;
            let page = response_json_or_error(response)?;

            for document in page
                .get("documents")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
            {
                let meal = serde_json::from_value(decode_document(&document)?)
                    .context("Firestore meal document has an unexpected shape")?;
                meals.push(meal);
            }

            page_token = page
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }

        Ok(meals)
    }
}

fn response_json_or_error(response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .context("Firestore response body read failed")?;
    if !status.is_success() {
        bail!(
            "Firestore request failed ({}): {}",
            status.as_u16(),
            body.chars().take(512).collect::<String>()
        );
    }
    if body.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(&body).context("Firestore returned invalid JSON payload")
}

/// Encodes a JSON object as a Firestore `fields` map.
pub(crate) fn encode_fields(payload: &Value) -> Result<Map<String, Value>> {
    let object = payload
        .as_object()
        .ok_or_else(|| anyhow!("Firestore documents must be JSON objects"))?;
    Ok(object
        .iter()
        .map(|(key, value)| {
            let encoded = match value {
                Value::String(text) if TIMESTAMP_FIELDS.contains(&key.as_str()) => {
                    json!({ "timestampValue": text })
                }
                other => encode_value(other),
            };
            (key.clone(), encoded)
        })
        .collect())
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(flag) => json!({ "booleanValue": flag }),
        Value::Number(number) => match number.as_i64() {
            Some(int) => json!({ "integerValue": int.to_string() }),
            None => json!({ "doubleValue": number.as_f64().unwrap_or_default() }),
        },
        Value::String(text) => json!({ "stringValue": text }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(_) => json!({
            "mapValue": { "fields": encode_fields(value).unwrap_or_default() }
        }),
    }
}

/// Decodes a Firestore document (`{name, fields}`) back into plain JSON.
pub(crate) fn decode_document(document: &Value) -> Result<Value> {
    let fields = document
        .get("fields")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    decode_fields(&fields)
}

fn decode_fields(fields: &Map<String, Value>) -> Result<Value> {
    let mut out = Map::new();
    for (key, value) in fields {
        out.insert(key.clone(), decode_value(value)?);
    }
    Ok(Value::Object(out))
}

fn decode_value(value: &Value) -> Result<Value> {
    let (kind, inner) = value
        .as_object()
        .and_then(|object| object.iter().next())
        .ok_or_else(|| anyhow!("malformed Firestore value: {value}"))?;
    let decoded = match (kind.as_str(), inner) {
        ("nullValue", _) => Value::Null,
        ("booleanValue", flag) => Value::Bool(flag.as_bool().unwrap_or(false)),
        ("integerValue", raw) => {
            let parsed = match raw {
                Value::String(text) => text
                    .parse::<i64>()
                    .with_context(|| format!("bad integerValue '{text}'"))?,
                other => other
                    .as_i64()
                    .ok_or_else(|| anyhow!("bad integerValue {other}"))?,
            };
            Value::Number(parsed.into())
        }
        ("doubleValue", raw) => {
            let parsed = raw
                .as_f64()
                .ok_or_else(|| anyhow!("bad doubleValue {raw}"))?;
            Number::from_f64(parsed)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }
        ("stringValue", text) | ("timestampValue", text) | ("referenceValue", text) => {
            Value::String(text.as_str().unwrap_or_default().to_string())
        }
        ("arrayValue", array) => Value::Array(
            array
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect::<Result<Vec<_>>>())
                .transpose()?
                .unwrap_or_default(),
        ),
        ("mapValue", map) => decode_fields(
            &map.get("fields")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        )?,
        (other, _) => bail!("unsupported Firestore value type '{other}'"),
    };
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use numa_contracts::meals::{Macros, MealEstimate};
    use numa_contracts::profile::{ActivityLevel, Goal};

    use super::*;

    #[test]
    fn documents_root_uses_default_database() {
        let config = FirestoreConfig::new("numa-app");
        assert_eq!(
            config.documents_root(),
            "https://firestore.googleapis.com/v1/projects/numa-app/databases/(default)/documents"
        );
        let store = FirestoreDocumentStore::new(config);
        assert!(store.meals_url("u1").ends_with("/documents/users/u1/meals"));
    }

    #[test]
    fn scalar_encoding() -> Result<()> {
        let fields = encode_fields(&json!({
            "height": 180,
            "current_weight": 72.5,
            "goal": "lose_weight",
            "onboarding_complete": true,
            "age": null,
            "created_at": "2025-07-21T10:00:00Z",
        }))?;
        assert_eq!(fields["height"], json!({"integerValue": "180"}));
        assert_eq!(fields["current_weight"], json!({"doubleValue": 72.5}));
        assert_eq!(fields["goal"], json!({"stringValue": "lose_weight"}));
        assert_eq!(fields["onboarding_complete"], json!({"booleanValue": true}));
        assert_eq!(fields["age"], json!({"nullValue": null}));
        assert_eq!(
            fields["created_at"],
            json!({"timestampValue": "2025-07-21T10:00:00Z"})
        );
        Ok(())
    }

    #[test]
    fn profile_document_round_trip() -> Result<()> {
        let mut profile = Profile::with_id("u1");
        profile.goal = Some(Goal::GainWeight);
        profile.current_weight = Some(60.0);
        profile.height = Some(172);
        profile.activity_level = Some(ActivityLevel::Light);

        let document = json!({
            "name": "projects/p/databases/(default)/documents/users/u1",
            "fields": encode_fields(&serde_json::to_value(&profile)?)?,
        });
        let decoded: Profile = serde_json::from_value(decode_document(&document)?)?;
        assert_eq!(decoded, profile);
        Ok(())
    }

    #[test]
    fn meal_document_round_trip() -> Result<()> {
        let meal = MealAnalysis::from_estimate(MealEstimate {
            ingredients: vec!["egg".to_string(), "toast".to_string()],
            estimated_calories: 310,
            macros: Macros {
                protein: 18.0,
                carbs: 24.5,
                fat: 14.0,
            },
            confidence: 0.82,
            analysis_text: Some("Breakfast plate".to_string()),
        });
        let fields = encode_fields(&serde_json::to_value(&meal)?)?;
        assert!(fields["ingredients"]["arrayValue"]["values"].is_array());
        assert!(fields["macros"]["mapValue"]["fields"]["protein"].is_object());

        let decoded: MealAnalysis =
            serde_json::from_value(decode_document(&json!({ "fields": fields }))?)?;
        assert_eq!(decoded, meal);
        Ok(())
    }

    #[test]
    fn empty_arrays_and_unknown_types() -> Result<()> {
        assert_eq!(decode_value(&json!({"arrayValue": {}}))?, json!([]));
        assert!(decode_value(&json!({"geoPointValue": {"latitude": 1.0}})).is_err());
        assert!(decode_value(&json!("bare")).is_err());
        Ok(())
    }
}
