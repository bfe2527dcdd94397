use serde_json::json;
use std::collections::HashMap;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wordsync::anki::{AnkiConnect, CardOutcome, FlashcardTarget, NewCard};
use wordsync::config::{Anki, TemplateFields};
use wordsync::error::TargetError;

fn client(server: &MockServer, app_path: Option<&str>) -> AnkiConnect {
    AnkiConnect::new(&Anki {
        connect_url: server.uri(),
        deck: "Vocabulary".to_string(),
        model: "Basic".to_string(),
        app_path: app_path.map(Into::into),
        launch_wait_seconds: 0,
        duplicate_check: true,
        templates: HashMap::new(),
    })
    .unwrap()
}

fn ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "result": result, "error": null }))
}

fn anki_error(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "result": null, "error": message }))
}

async fn on(server: &MockServer, action: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "action": action, "version": 6 })))
        .respond_with(response)
        .mount(server)
        .await;
}

fn card(word: &str) -> NewCard {
    NewCard {
        deck: "Vocabulary".to_string(),
        model: "Basic".to_string(),
        primary_field: "Front".to_string(),
        primary: word.to_string(),
        secondary_field: "Back".to_string(),
        secondary: "(n)<br>meaning".to_string(),
        tags: vec!["readwise_import".to_string(), "vocabulary".to_string()],
    }
}

#[tokio::test]
async fn test_is_ready() {
    let mock_server = MockServer::start().await;
    on(&mock_server, "version", ok(json!(6))).await;

    assert!(client(&mock_server, None).is_ready().await);
}

#[tokio::test]
async fn test_is_not_ready_on_error() {
    let mock_server = MockServer::start().await;
    on(&mock_server, "version", anki_error("collection is not available")).await;

    assert!(!client(&mock_server, None).is_ready().await);
}

#[tokio::test]
async fn test_wake_without_app_path() {
    let mock_server = MockServer::start().await;

    assert!(!client(&mock_server, None).wake().await);
}

#[tokio::test]
async fn test_wake_with_unlaunchable_app() {
    let mock_server = MockServer::start().await;

    // on macOS `open` itself spawns fine and the zero launch wait runs out instead
    let anki = client(&mock_server, Some("/nonexistent/wordsync-test/anki"));
    assert!(!anki.wake().await);
}

#[tokio::test]
async fn test_ensure_collection_creates_missing_deck() {
    let mock_server = MockServer::start().await;
    on(&mock_server, "deckNames", ok(json!(["Default"]))).await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "action": "createDeck", "params": { "deck": "Vocabulary" } })))
        .respond_with(ok(json!(1651445861967_u64)))
        .expect(1)
        .mount(&mock_server)
        .await;

    client(&mock_server, None).ensure_collection("Vocabulary").await.unwrap();
}

#[tokio::test]
async fn test_ensure_collection_existing_deck() {
    let mock_server = MockServer::start().await;
    on(&mock_server, "deckNames", ok(json!(["Default", "Vocabulary"]))).await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "action": "createDeck" })))
        .respond_with(ok(json!(1)))
        .expect(0)
        .mount(&mock_server)
        .await;

    client(&mock_server, None).ensure_collection("Vocabulary").await.unwrap();
}

#[tokio::test]
async fn test_ensure_template() {
    let mock_server = MockServer::start().await;
    on(&mock_server, "modelNames", ok(json!(["Basic", "Cloze"]))).await;
    on(&mock_server, "modelFieldNames", ok(json!(["Front", "Back"]))).await;
    let anki = client(&mock_server, None);

    anki.ensure_template("Basic", &TemplateFields::default()).await.unwrap();

    let err = anki
        .ensure_template("Vocab Word", &TemplateFields::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TargetError::MissingTemplate(ref name) if name == "Vocab Word"));
    assert!(err.is_configuration());

    let fields = TemplateFields {
        primary: "Word".to_string(),
        secondary: "Back".to_string(),
    };
    let err = anki.ensure_template("Basic", &fields).await.unwrap_err();
    assert!(matches!(err, TargetError::MissingField { ref field, .. } if field == "Word"));
}

#[tokio::test]
async fn test_create_card_skips_existing_note() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "action": "findNotes",
            "params": { "query": "deck:\"Vocabulary\" note:\"Basic\" \"Front:serendipity\"" }
        })))
        .respond_with(ok(json!([42])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "action": "addNote" })))
        .respond_with(ok(json!(1)))
        .expect(0)
        .mount(&mock_server)
        .await;

    let outcome = client(&mock_server, None)
        .create_card(&card("serendipity"), true)
        .await
        .unwrap();
    assert_eq!(outcome, CardOutcome::Duplicate(Some(42)));
}

#[tokio::test]
async fn test_create_card_adds_note() {
    let mock_server = MockServer::start().await;
    on(&mock_server, "findNotes", ok(json!([]))).await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "action": "addNote",
            "params": { "note": {
                "deckName": "Vocabulary",
                "modelName": "Basic",
                "fields": { "Front": "serendipity", "Back": "(n)<br>meaning" },
                "options": { "allowDuplicate": false, "duplicateScope": "deck" },
                "tags": ["readwise_import", "vocabulary"],
            }}
        })))
        .respond_with(ok(json!(1496198395707_u64)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let outcome = client(&mock_server, None)
        .create_card(&card("serendipity"), true)
        .await
        .unwrap();
    assert_eq!(outcome, CardOutcome::Created(1496198395707));
}

#[tokio::test]
async fn test_create_card_without_duplicate_check() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "action": "findNotes" })))
        .respond_with(ok(json!([42])))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "action": "addNote",
            "params": { "note": { "options": { "allowDuplicate": true } } }
        })))
        .respond_with(ok(json!(7)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let outcome = client(&mock_server, None)
        .create_card(&card("serendipity"), false)
        .await
        .unwrap();
    assert_eq!(outcome, CardOutcome::Created(7));
}

#[tokio::test]
async fn test_create_card_duplicate_rejection() {
    let mock_server = MockServer::start().await;
    on(&mock_server, "findNotes", ok(json!([]))).await;
    on(&mock_server, "addNote", anki_error("cannot create note because it is a duplicate")).await;

    let outcome = client(&mock_server, None)
        .create_card(&card("serendipity"), true)
        .await
        .unwrap();
    assert_eq!(outcome, CardOutcome::Duplicate(None));
}

#[tokio::test]
async fn test_create_card_failure() {
    let mock_server = MockServer::start().await;
    on(&mock_server, "findNotes", ok(json!([]))).await;
    on(&mock_server, "addNote", anki_error("model was not found: Basic")).await;

    let err = client(&mock_server, None)
        .create_card(&card("serendipity"), true)
        .await
        .unwrap_err();
    assert!(matches!(err, TargetError::Api { ref action, .. } if action == "addNote"));
}
