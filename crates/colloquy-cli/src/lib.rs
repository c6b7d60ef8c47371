// Library interface for colloquy-cli, shared by the binary and integration tests

pub mod app;
pub mod human;
pub mod render;

pub use render::{render_markdown, status_line};
