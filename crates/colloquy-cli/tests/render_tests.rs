use colloquy_cli::render_markdown;
use colloquy_core::agent::{ParticipantId, TurnEvent};
use colloquy_core::error::ErrorKind;
use colloquy_core::tools::{ToolCall, ToolResult};
use colloquy_core::transcript::{Transcript, TranscriptAggregator};
use serde_json::json;

fn literature_run() -> Transcript {
    let researcher = ParticipantId::assistant("Researcher");
    let reviewer = ParticipantId::assistant("Reviewer");
    let call = ToolCall::new(
        "arxiv_search",
        json!({"query": "context-aware agents", "max_results": 9}),
        researcher.clone(),
    );

    let mut agg = TranscriptAggregator::new();
    agg.post(&ParticipantId::user(), "Write a review of context-aware agents");
    agg.ingest(&researcher, &TurnEvent::ToolRequest(call.clone())).unwrap();
    agg.ingest(&researcher, &TurnEvent::ToolResult(ToolResult::success(call, "Paper 1: ...")))
        .unwrap();
    agg.ingest(&researcher, &TurnEvent::TurnEnd).unwrap();
    agg.ingest(&reviewer, &TurnEvent::TextDelta("  Selected 3 papers.\n".into()))
        .unwrap();
    agg.ingest(&reviewer, &TurnEvent::TurnEnd).unwrap();
    agg.into_transcript()
}

#[test]
fn test_text_blocks_carry_the_speaker() {
    let md = render_markdown(&literature_run());
    assert!(md.starts_with("**user**:\n\nWrite a review of context-aware agents"));
    assert!(md.ends_with("**Reviewer**:\n\nSelected 3 papers."));
}

#[test]
fn test_tool_call_shows_pretty_arguments() {
    let md = render_markdown(&literature_run());
    assert!(md.contains("**Tool Call**: `Researcher` is calling `arxiv_search` with arguments:\n```json\n{"));
    assert!(md.contains("\"max_results\": 9"));
    assert!(md.contains("**Tool Result**: `arxiv_search` returned data successfully."));
}

#[test]
fn test_failed_tool_result_names_the_kind() {
    let researcher = ParticipantId::assistant("Researcher");
    let call = ToolCall::new("arxiv_search", json!({"query": "zzqx", "max_results": 2}), researcher.clone());
    let mut agg = TranscriptAggregator::new();
    agg.ingest(&researcher, &TurnEvent::ToolRequest(call.clone())).unwrap();
    agg.ingest(
        &researcher,
        &TurnEvent::ToolResult(ToolResult::failure(call, ErrorKind::EmptyResult, "no papers")),
    )
    .unwrap();

    let md = render_markdown(&agg.into_transcript());
    assert!(md.ends_with("**Tool Result**: `arxiv_search` reported `empty_result`: no papers"));
}

#[test]
fn test_empty_transcript_renders_nothing() {
    assert_eq!(render_markdown(&Transcript::new()), "");
}
