use serde::{Deserialize, Serialize};
use std::fmt;

/// Role tags a participant can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Finds source material, usually with a search tool
    Researcher,
    /// Evaluates and selects what the researcher found
    Reviewer,
    /// Turns the reviewed material into the final text
    Writer,
    /// A person answering at the terminal or in a UI
    Human,
    /// A general model-backed participant
    Assistant,
    /// The author of the task. Never scheduled.
    User,
}

impl AgentRole {
    pub fn name(&self) -> &str {
        match self {
            AgentRole::Researcher => "Researcher",
            AgentRole::Reviewer => "Reviewer",
            AgentRole::Writer => "Writer",
            AgentRole::Human => "Human",
            AgentRole::Assistant => "Assistant",
            AgentRole::User => "User",
        }
    }

    /// Default system prompt for model-backed roles
    pub fn system_prompt(&self) -> Option<&'static str> {
        match self {
            AgentRole::Researcher => Some(RESEARCHER_PROMPT),
            AgentRole::Reviewer => Some(REVIEWER_PROMPT),
            AgentRole::Writer => Some(WRITER_PROMPT),
            AgentRole::Assistant => Some(ASSISTANT_PROMPT),
            AgentRole::Human | AgentRole::User => None,
        }
    }
}

/// Stable identity of a participant: name, role tag and a one-line
/// capability description used by dynamic selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId {
    pub name: String,
    pub role: AgentRole,
    pub description: String,
}

impl ParticipantId {
    pub fn new(name: impl Into<String>, role: AgentRole, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            description: description.into(),
        }
    }

    pub fn assistant(name: impl Into<String>) -> Self {
        Self::new(name, AgentRole::Assistant, "")
    }

    pub fn human(name: impl Into<String>) -> Self {
        Self::new(name, AgentRole::Human, "A person who reviews and approves the work")
    }

    /// The speaker of the task message that opens every run.
    pub fn user() -> Self {
        Self::new("user", AgentRole::User, "The author of the task")
    }

    pub fn is_human(&self) -> bool {
        self.role == AgentRole::Human
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ── Role Prompts ────────────────────────────────────────────

const RESEARCHER_PROMPT: &str = r#"You are a research assistant specialized in academic paper discovery.

Your task:
1. Analyze the user's research topic
2. Formulate the most effective arXiv search query
3. Use the arxiv_search tool to find relevant papers
4. Retrieve three times the number of papers the user asked for
5. Pass ALL found papers with complete information to the Reviewer

Always include title, authors, published date, summary and PDF URL.
Don't filter papers yourself - that's the Reviewer's job.
If no explicit number is given, the number is 3."#;

const REVIEWER_PROMPT: &str = r#"You are an academic paper reviewer with expertise in evaluating research relevance.

Select EXACTLY the number of papers the user requested, choosing the most relevant ones.
Rank by direct relevance first, then recency, quality and coverage of different aspects.

Output:
1. Selection rationale (3-5 sentences)
2. The selected papers with title, authors, published date, summary, PDF URL
   and a relevance score (High/Medium/Low with one sentence of justification)"#;

const WRITER_PROMPT: &str = r#"You are an expert academic writer specializing in literature reviews.

Synthesize the curated papers into a cohesive review with these sections:
1. Introduction & Scope
2. Thematic Synthesis - 2-3 themes, comparing and contrasting the papers
3. Methodological Overview
4. Limitations & Gaps
5. Conclusion & Future Directions
6. Reviewed Papers - for each: Paper, Authors, Published Date, Summary, PDF URL, Relevance Score

Cite paper titles whenever you reference their work."#;

const ASSISTANT_PROMPT: &str = r#"You are a helpful member of a team working on a shared task.
Build on what the other participants have said and keep your contribution focused."#;
