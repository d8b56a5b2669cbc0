//! `OpenAiClient` and `ChatSession` against a wiremock upstream.

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use policy_copilot::chat::{ChatError, ChatSession, Role, StreamEnd};
use policy_copilot::llm::{CompletionRequest, LlmError, OpenAiClient};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

fn delta(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": text } }] })
    )
}

fn endpoint(server: &MockServer) -> String {
    format!("{}{COMPLETIONS_PATH}", server.uri())
}

async fn mount(server: &MockServer, key: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("api-key", key))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

async fn only_request_body(server: &MockServer) -> serde_json::Value {
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
    requests[0].body_json().unwrap()
}

#[tokio::test]
async fn streamed_turn_end_to_end() {
    let server = MockServer::start().await;
    let body = format!("{}{}{}data: [DONE]\n\n", delta("Add "), delta("<set-header>"), delta(" here."));
    mount(
        &server,
        "test-key",
        ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
    )
    .await;

    let session = ChatSession::new(OpenAiClient::with_endpoint("test-key".into(), endpoint(&server)));
    let mut seen = Vec::new();
    let outcome = session
        .send("How do I add a header?", "<policies/>", |d, so_far| {
            seen.push((d.text.clone(), so_far.to_string()));
        })
        .await
        .unwrap();

    assert_eq!(outcome.text, "Add <set-header> here.");
    assert_eq!(outcome.end, StreamEnd::Done);
    assert_eq!(outcome.deltas, 3);
    assert_eq!(seen[0], ("Add ".to_string(), "Add ".to_string()));
    assert_eq!(seen.last().unwrap().1, "Add <set-header> here.");

    let log = session.messages();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].role, Role::User);
    assert_eq!(log[1].role, Role::Assistant);
    assert_eq!(log[1].text, "Add <set-header> here.");

    let sent = only_request_body(&server).await;
    assert_eq!(sent["model"], "gpt-4");
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["max_tokens"], 500);
    assert_eq!(sent["n"], 1);
    assert_eq!(sent["temperature"], 0.7);
    assert_eq!(sent["messages"][0]["role"], "system");
    let user = sent["messages"][1]["content"].as_str().unwrap();
    assert!(user.contains("How do I add a header?"));
    assert!(user.contains("<policies/>"));
}

#[tokio::test]
async fn stream_closed_without_done_keeps_reply() {
    let server = MockServer::start().await;
    let body = format!("{}data: {{\"cho", delta("partial"));
    mount(&server, "k", ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")).await;

    let session = ChatSession::new(OpenAiClient::with_endpoint("k".into(), endpoint(&server)));
    let outcome = session.send("hi", "", |_, _| {}).await.unwrap();

    assert_eq!(outcome.end, StreamEnd::Closed);
    assert_eq!(outcome.text, "partial");
    assert_eq!(session.messages()[1].text, "partial");
}

#[tokio::test]
async fn rejected_stream_surfaces_api_error() {
    let server = MockServer::start().await;
    mount(
        &server,
        "bad",
        ResponseTemplate::new(401)
            .set_body_json(serde_json::json!({ "error": { "message": "Incorrect API key provided" } })),
    )
    .await;

    let session = ChatSession::new(OpenAiClient::with_endpoint("bad".into(), endpoint(&server)));
    let err = session.send("hi", "", |_, _| {}).await.unwrap_err();
    match err {
        ChatError::Transport(LlmError::Api { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // the user message is logged, no reply is
    assert_eq!(session.messages().len(), 1);
}

#[tokio::test]
async fn single_shot_completion_is_trimmed() {
    let server = MockServer::start().await;
    mount(
        &server,
        "k",
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "  ader name=\"X\" />\n" } }]
        })),
    )
    .await;

    let client = OpenAiClient::with_endpoint("k".into(), endpoint(&server));
    let text = client
        .complete(&CompletionRequest::suggestion("<set-he", "<policies/>"))
        .await
        .unwrap();
    assert_eq!(text.as_deref(), Some("ader name=\"X\" />"));

    let sent = only_request_body(&server).await;
    assert_eq!(sent["max_tokens"], 100);
    assert!(sent.get("stream").is_none());
}

#[tokio::test]
async fn error_body_with_success_status_is_an_error() {
    let server = MockServer::start().await;
    mount(
        &server,
        "k",
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "error": { "message": "model overloaded" } })),
    )
    .await;

    let client = OpenAiClient::with_endpoint("k".into(), endpoint(&server));
    let err = client
        .complete(&CompletionRequest::suggestion("<set-he", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::Api { status: 200, ref message } if message == "model overloaded"));
}
