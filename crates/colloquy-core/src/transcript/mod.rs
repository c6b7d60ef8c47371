mod aggregator;
mod message;

pub use aggregator::TranscriptAggregator;
pub use message::{Message, MessageKind, Transcript};
