mod traits;
mod arxiv;
mod gateway;
pub mod schema;

pub use traits::*;
pub use arxiv::{parse_feed, render_papers, ArxivSearchTool, Paper, ARXIV_API_URL, MAX_RESULTS};
pub use gateway::ToolGateway;
