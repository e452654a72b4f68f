mod common;

use std::sync::Arc;

use common::*;
use json_tree_rag::{
    api::NOT_FOUND_MESSAGE,
    ingest,
    models::{EmbeddedEntry, IndexEntry},
    vector_store::{InMemoryVectorIndex, VectorIndex},
};
use serde_json::{json, Value};

async fn post_chat(base: &str, body: Value) -> (reqwest::StatusCode, String) {
    let response = reqwest::Client::new()
        .post(format!("{base}/v1/chat/completions"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.text().await.unwrap())
}

fn chat_body(question: &str) -> Value {
    json!({
        "model": "qwen-test",
        "stream": true,
        "messages": [
            { "role": "system", "content": "Eres un mecánico." },
            { "role": "user", "content": question }
        ]
    })
}

fn parse_chunks(data: &[String]) -> Vec<Value> {
    data.iter()
        .filter(|d| d.as_str() != "[DONE]")
        .map(|d| serde_json::from_str(d).unwrap())
        .collect()
}

fn contents(chunks: &[Value]) -> Vec<String> {
    chunks
        .iter()
        .filter_map(|c| c["choices"][0]["delta"]["content"].as_str().map(str::to_string))
        .collect()
}

async fn indexed_engine_tree() -> Arc<InMemoryVectorIndex> {
    let index = Arc::new(InMemoryVectorIndex::new());
    ingest::index_tree(&engine_tree(), &engine_embedder(), index.as_ref())
        .await
        .unwrap();
    index
}

/// Comprueba la forma de la respuesta "sin contexto": un único fragmento de
/// disculpa, el fragmento de cierre y `[DONE]`.
fn assert_not_found_shape(status: reqwest::StatusCode, body: &str) {
    assert_eq!(status, reqwest::StatusCode::OK);
    let data = sse_data(body);
    assert_eq!(data.len(), 3, "cuerpo inesperado: {body}");
    assert_eq!(data[2], "[DONE]");

    let chunks = parse_chunks(&data);
    assert_eq!(contents(&chunks), vec![NOT_FOUND_MESSAGE.to_string()]);
    assert!(chunks[0]["choices"][0]["finish_reason"].is_null());
    assert_eq!(chunks[1]["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn answers_with_resolved_path_and_subtree() {
    let completion = Arc::new(RecordingCompletion::with_chunks(vec!["Revise ", "", "la batería"]));
    let state = app_state(
        engine_tree(),
        Arc::new(engine_embedder()),
        indexed_engine_tree().await,
        completion.clone(),
    );
    let base = spawn_app(state).await;

    let (status, body) = post_chat(&base, chat_body("Mi coche no arranca")).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let data = sse_data(&body);
    assert_eq!(data.last().map(String::as_str), Some("[DONE]"));
    let chunks = parse_chunks(&data);
    assert_eq!(contents(&chunks), vec!["Revise ", "la batería"]);

    let id = chunks[0]["id"].clone();
    for chunk in &chunks {
        assert_eq!(chunk["id"], id);
        assert_eq!(chunk["object"], "chat.completion.chunk");
        assert_eq!(chunk["model"], "qwen-test");
    }
    let last = chunks.last().unwrap();
    assert_eq!(last["choices"][0]["finish_reason"], "stop");
    assert!(last["choices"][0]["delta"]["content"].is_null());

    let requests = completion.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "qwen-test");
    let prompt = &requests[0].prompt;
    assert!(prompt.contains("Engine -> Won't Start"));
    assert!(prompt.contains("\"name\": \"Won't Start\""));
    assert!(prompt.contains("\"desc\": \"Check battery\""));
    assert!(prompt.contains("Mi coche no arranca"));
}

#[tokio::test]
async fn empty_search_streams_apology() {
    let completion = Arc::new(RecordingCompletion::with_chunks(vec!["nunca"]));
    let state = app_state(
        engine_tree(),
        Arc::new(engine_embedder()),
        Arc::new(InMemoryVectorIndex::new()),
        completion.clone(),
    );
    let base = spawn_app(state).await;

    let (status, body) = post_chat(&base, chat_body("Mi coche no arranca")).await;
    assert_not_found_shape(status, &body);
    assert!(completion.requests().is_empty());
}

#[tokio::test]
async fn stale_index_entry_streams_the_same_apology() {
    let index = Arc::new(InMemoryVectorIndex::new());
    index
        .upsert(&[EmbeddedEntry {
            entry: IndexEntry {
                path_id: "Ghost>Node".to_string(),
                name: "Node".to_string(),
                document: "Node".to_string(),
            },
            embedding: vec![1.0, 0.0],
        }])
        .await
        .unwrap();

    let completion = Arc::new(RecordingCompletion::with_chunks(vec!["nunca"]));
    let state = app_state(engine_tree(), Arc::new(engine_embedder()), index, completion.clone());
    let base = spawn_app(state).await;

    let (status, body) = post_chat(&base, chat_body("Mi coche no arranca")).await;
    assert_not_found_shape(status, &body);
    assert!(completion.requests().is_empty());
}

#[tokio::test]
async fn embedding_failure_streams_the_same_apology() {
    let state = app_state(
        engine_tree(),
        Arc::new(FailingEmbedder),
        indexed_engine_tree().await,
        Arc::new(RecordingCompletion::default()),
    );
    let base = spawn_app(state).await;

    let (status, body) = post_chat(&base, chat_body("Mi coche no arranca")).await;
    assert_not_found_shape(status, &body);
}

#[tokio::test]
async fn upstream_failure_becomes_final_diagnostic_chunk() {
    let completion = Arc::new(RecordingCompletion {
        chunks: vec!["Revise "],
        fail_after_chunks: Some("connection reset by peer"),
        ..RecordingCompletion::default()
    });
    let state = app_state(
        engine_tree(),
        Arc::new(engine_embedder()),
        indexed_engine_tree().await,
        completion,
    );
    let base = spawn_app(state).await;

    let (status, body) = post_chat(&base, chat_body("Mi coche no arranca")).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let data = sse_data(&body);
    assert_eq!(data.last().map(String::as_str), Some("[DONE]"));
    let chunks = parse_chunks(&data);
    let texts = contents(&chunks);
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[0], "Revise ");
    assert!(texts[1].starts_with("Error:"));
    assert!(texts[1].contains("connection reset by peer"));
    assert_eq!(chunks.last().unwrap()["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn missing_model_falls_back_to_configured_default() {
    let completion = Arc::new(RecordingCompletion::with_chunks(vec!["ok"]));
    let state = app_state(
        engine_tree(),
        Arc::new(engine_embedder()),
        indexed_engine_tree().await,
        completion.clone(),
    );
    let base = spawn_app(state).await;

    let body = json!({
        "stream": true,
        "messages": [{ "role": "user", "content": "Mi coche no arranca" }]
    });
    let (_, body) = post_chat(&base, body).await;
    let chunks = parse_chunks(&sse_data(&body));
    assert_eq!(chunks[0]["model"], "default-model");
    assert_eq!(completion.requests()[0].model, "default-model");
}

#[tokio::test]
async fn non_streaming_requests_are_rejected() {
    let completion = Arc::new(RecordingCompletion::default());
    let state = app_state(
        engine_tree(),
        Arc::new(engine_embedder()),
        Arc::new(InMemoryVectorIndex::new()),
        completion.clone(),
    );
    let base = spawn_app(state).await;

    let mut body = chat_body("Mi coche no arranca");
    body["stream"] = json!(false);
    let (status, text) = post_chat(&base, body).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(error["error"]["type"], "invalid_request_error");
    assert!(completion.requests().is_empty());
}

#[tokio::test]
async fn requests_without_user_question_are_rejected() {
    let state = app_state(
        engine_tree(),
        Arc::new(engine_embedder()),
        Arc::new(InMemoryVectorIndex::new()),
        Arc::new(RecordingCompletion::default()),
    );
    let base = spawn_app(state).await;

    let body = json!({
        "stream": true,
        "messages": [
            { "role": "system", "content": "Eres un mecánico." },
            { "role": "user", "content": "   " }
        ]
    });
    let (status, _) = post_chat(&base, body).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn root_and_health_respond() {
    let state = app_state(
        engine_tree(),
        Arc::new(engine_embedder()),
        Arc::new(InMemoryVectorIndex::new()),
        Arc::new(RecordingCompletion::default()),
    );
    let base = spawn_app(state).await;

    let health: Value = reqwest::get(format!("{base}/health")).await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");
    let root = reqwest::get(format!("{base}/")).await.unwrap();
    assert!(root.status().is_success());
}
