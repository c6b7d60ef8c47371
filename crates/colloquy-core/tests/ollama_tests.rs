use colloquy_core::llm::{LlmClient, Message, OllamaClient, SamplingOptions, StreamEvent};
use colloquy_core::tools::ToolRegistry;
use futures::StreamExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAMED_REPLY: &str = concat!(
    r#"{"model":"llama3.1:8b","message":{"role":"assistant","content":"Three "},"done":false}"#,
    "\n",
    r#"{"model":"llama3.1:8b","message":{"role":"assistant","content":"papers"},"done":false}"#,
    "\n",
    r#"{"model":"llama3.1:8b","message":{"role":"assistant","content":""},"done":true,"eval_count":2}"#,
    "\n",
);

const TOOL_CALL_REPLY: &str = concat!(
    r#"{"message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"arxiv_search","arguments":{"query":"llm agents","max_results":9}}}]},"done":false}"#,
    "\n",
    r#"{"message":{"role":"assistant","content":""},"done":true}"#,
    "\n",
);

#[tokio::test]
async fn streams_text_deltas_until_done() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({
            "model": "llama3.1:8b",
            "stream": true,
            "options": {"temperature": 0.5, "top_k": 10}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(STREAMED_REPLY))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new("llama3.1:8b")
        .with_base_url(server.uri())
        .with_options(SamplingOptions {
            temperature: Some(0.5),
            top_k: Some(10),
        });

    let rx = client.chat_stream(&[Message::user("find papers")], &[]).await.unwrap();
    let events: Vec<StreamEvent> = rx.collect().await;

    assert_eq!(
        events,
        vec![
            StreamEvent::TextDelta("Three ".into()),
            StreamEvent::TextDelta("papers".into()),
            StreamEvent::Done,
        ]
    );
}

#[tokio::test]
async fn tool_calls_arrive_as_start_delta_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TOOL_CALL_REPLY))
        .mount(&server)
        .await;

    let client = OllamaClient::new("llama3.1:8b").with_base_url(server.uri());
    let tools = ToolRegistry::builtin().definitions();
    let rx = client.chat_stream(&[Message::user("find papers")], &tools).await.unwrap();
    let events: Vec<StreamEvent> = rx.collect().await;

    assert_eq!(events.len(), 4);
    let StreamEvent::ToolCallStart { ref id, ref name } = events[0] else {
        panic!("expected tool call start, got {:?}", events[0]);
    };
    assert_eq!(name, "arxiv_search");
    match &events[1] {
        StreamEvent::ToolCallDelta { id: delta_id, arguments_delta } => {
            assert_eq!(delta_id, id);
            let args: serde_json::Value = serde_json::from_str(arguments_delta).unwrap();
            assert_eq!(args["max_results"], 9);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(events[2], StreamEvent::ToolCallEnd { id: id.clone() });
    assert_eq!(events[3], StreamEvent::Done);
}

#[tokio::test]
async fn http_errors_surface_as_llm_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"error":"model 'nope' not found"}"#))
        .mount(&server)
        .await;

    let client = OllamaClient::new("nope").with_base_url(server.uri());
    let Err(err) = client.chat_stream(&[Message::user("hi")], &[]).await else {
        panic!("expected the request to fail");
    };

    assert_eq!(err.kind(), colloquy_core::ErrorKind::DependencyUnavailable);
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn non_streaming_chat_returns_whole_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"message":{"role":"assistant","content":"Reviewer"},"done":true,"prompt_eval_count":40,"eval_count":1}"#,
        ))
        .mount(&server)
        .await;

    let client = OllamaClient::new("granite3.3:8b").with_base_url(server.uri());
    let response = client.chat(&[Message::user("who next?")], &[]).await.unwrap();

    assert_eq!(response.message.content, "Reviewer");
    assert_eq!(response.usage.map(|u| u.output_tokens), Some(1));
}
