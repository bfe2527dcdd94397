//! AnkiConnect client.
//!
//! Every call is a `POST` of `{"action", "version": 6, "params"}`; AnkiConnect answers
//! with `{"result", "error"}` and reports failures through `error` with a 200 status.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::{Instant, sleep};

use crate::config::{Anki, TemplateFields};
use crate::error::{TargetError, TargetResult};

const API_VERSION: u32 = 6;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub type NoteId = u64;

/// A card ready to be sent, with fields keyed by the template's field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCard {
    pub deck: String,
    pub model: String,
    pub primary_field: String,
    pub primary: String,
    pub secondary_field: String,
    pub secondary: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardOutcome {
    Created(NoteId),
    Duplicate(Option<NoteId>),
}

#[async_trait]
pub trait FlashcardTarget: Send + Sync {
    async fn is_ready(&self) -> bool;

    /// Best-effort launch. Returns whether the target looks reachable afterwards.
    async fn wake(&self) -> bool;

    async fn ensure_collection(&self, name: &str) -> TargetResult<()>;

    /// Checks the template and its fields exist. Templates are never created.
    async fn ensure_template(&self, name: &str, fields: &TemplateFields) -> TargetResult<()>;

    async fn create_card(&self, card: &NewCard, duplicate_check: bool) -> TargetResult<CardOutcome>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: Option<T>,
    error: Option<String>,
}

pub struct AnkiConnect {
    client: Client,
    url: String,
    app_path: Option<PathBuf>,
    launch_wait: Duration,
}

impl AnkiConnect {
    pub fn new(cfg: &Anki) -> TargetResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            url: cfg.connect_url.clone(),
            app_path: cfg.app_path.clone(),
            launch_wait: Duration::from_secs(cfg.launch_wait_seconds),
        })
    }

    async fn invoke<T: DeserializeOwned>(
        &self,
        action: &str,
        params: serde_json::Value,
    ) -> TargetResult<T> {
        let body = json!({
            "action": action,
            "version": API_VERSION,
            "params": params,
        });

        let response: ApiResponse<T> = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(message) = response.error {
            return Err(TargetError::Api {
                action: action.to_string(),
                message,
            });
        }

        response.result.ok_or_else(|| TargetError::Api {
            action: action.to_string(),
            message: "empty result".to_string(),
        })
    }

    fn launch_command(app: &Path) -> Command {
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.arg(app);
            cmd
        } else {
            Command::new(app)
        }
    }
}

/// Quotes a value for an Anki search, escaping the characters Anki treats as syntax.
fn search_term(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '"' | '*' | '_' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

fn duplicate_query(card: &NewCard) -> String {
    format!(
        "deck:\"{}\" note:\"{}\" \"{}:{}\"",
        search_term(&card.deck),
        search_term(&card.model),
        search_term(&card.primary_field),
        search_term(&card.primary),
    )
}

fn is_duplicate_rejection(err: &TargetError) -> bool {
    matches!(err, TargetError::Api { message, .. } if message.to_lowercase().contains("duplicate"))
}

#[async_trait]
impl FlashcardTarget for AnkiConnect {
    async fn is_ready(&self) -> bool {
        match self.invoke::<u32>("version", json!({})).await {
            Ok(version) => {
                tracing::debug!(version, "ankiconnect is responsive");
                true
            }
            Err(e) => {
                tracing::debug!(error = %crate::unpack_error(&e), url = %self.url, "ankiconnect not responsive");
                false
            }
        }
    }

    async fn wake(&self) -> bool {
        let Some(app) = &self.app_path else {
            tracing::warn!("no anki application path configured, cannot launch it");
            return false;
        };

        tracing::info!(path = ?app, "launching anki");
        let spawned = Self::launch_command(app)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        if let Err(e) = spawned {
            tracing::error!(error = %e, path = ?app, "failed to launch anki");
            return false;
        }

        let deadline = Instant::now() + self.launch_wait;
        loop {
            if self.is_ready().await {
                tracing::info!("anki is up");
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!(waited = ?self.launch_wait, "anki did not become responsive in time");
                return false;
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn ensure_collection(&self, name: &str) -> TargetResult<()> {
        let decks: Vec<String> = self.invoke("deckNames", json!({})).await?;
        if decks.iter().any(|d| d == name) {
            return Ok(());
        }

        tracing::info!(deck = name, "deck not found, creating it");
        let id: u64 = self.invoke("createDeck", json!({ "deck": name })).await?;
        tracing::info!(deck = name, id, "deck created");
        Ok(())
    }

    async fn ensure_template(&self, name: &str, fields: &TemplateFields) -> TargetResult<()> {
        let models: Vec<String> = self.invoke("modelNames", json!({})).await?;
        if !models.iter().any(|m| m == name) {
            return Err(TargetError::MissingTemplate(name.to_string()));
        }

        let field_names: Vec<String> = self
            .invoke("modelFieldNames", json!({ "modelName": name }))
            .await?;
        for field in [&fields.primary, &fields.secondary] {
            if !field_names.contains(field) {
                return Err(TargetError::MissingField {
                    template: name.to_string(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    async fn create_card(&self, card: &NewCard, duplicate_check: bool) -> TargetResult<CardOutcome> {
        if duplicate_check {
            let existing: Vec<NoteId> = self
                .invoke("findNotes", json!({ "query": duplicate_query(card) }))
                .await?;
            if let Some(id) = existing.first() {
                return Ok(CardOutcome::Duplicate(Some(*id)));
            }
        }

        let mut fields = serde_json::Map::new();
        fields.insert(card.primary_field.clone(), json!(card.primary));
        fields.insert(card.secondary_field.clone(), json!(card.secondary));

        let note = json!({
            "deckName": card.deck,
            "modelName": card.model,
            "fields": fields,
            "options": {
                "allowDuplicate": !duplicate_check,
                "duplicateScope": "deck",
            },
            "tags": card.tags,
        });

        match self.invoke::<NoteId>("addNote", json!({ "note": note })).await {
            Ok(id) => Ok(CardOutcome::Created(id)),
            Err(e) if duplicate_check && is_duplicate_rejection(&e) => Ok(CardOutcome::Duplicate(None)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(word: &str) -> NewCard {
        NewCard {
            deck: "English::Vocab".to_string(),
            model: "Basic".to_string(),
            primary_field: "Front".to_string(),
            primary: word.to_string(),
            secondary_field: "Back".to_string(),
            secondary: String::new(),
            tags: vec![],
        }
    }

    #[test]
    fn test_duplicate_query_escapes_search_syntax() {
        assert_eq!(
            duplicate_query(&card("serendipity")),
            r#"deck:"English::Vocab" note:"Basic" "Front:serendipity""#
        );
        assert_eq!(
            duplicate_query(&card(r#"a "b"_c*"#)),
            r#"deck:"English::Vocab" note:"Basic" "Front:a \"b\"\_c\*""#
        );
    }

    #[test]
    fn test_duplicate_rejection_detection() {
        let dup = TargetError::Api {
            action: "addNote".to_string(),
            message: "cannot create note because it is a duplicate".to_string(),
        };
        let other = TargetError::Api {
            action: "addNote".to_string(),
            message: "model was not found".to_string(),
        };
        assert!(is_duplicate_rejection(&dup));
        assert!(!is_duplicate_rejection(&other));
    }
}
