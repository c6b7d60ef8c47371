use colloquy_core::agent::{HumanInput, ParticipantId};
use colloquy_core::error::ColloquyError;
use colloquy_core::transcript::Transcript;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Reads a human participant's reply from stdin, one line per turn.
pub struct StdinInput {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl StdinInput {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HumanInput for StdinInput {
    async fn request_input(
        &self,
        participant: &ParticipantId,
        _transcript: &Transcript,
    ) -> Result<String, ColloquyError> {
        eprint!("\n[{participant}] > ");
        let mut lines = self.lines.lock().await;
        match lines.next_line().await? {
            Some(line) => Ok(line),
            None => Err(ColloquyError::DependencyUnavailable("stdin closed".into())),
        }
    }
}
