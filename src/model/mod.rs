pub mod batch;
pub mod comparison;
pub mod config;
pub mod extraction;
pub mod ticket;

pub use batch::{BatchItem, BatchJob, ItemResult, ItemStatus, JobStatus, ProcessingMode};
pub use comparison::{
    Branch, BranchOutcome, BranchReport, BranchResult, ComparisonRecord, FrameType, ProgressFrame,
    Stage,
};
pub use config::{BatchConfig, Config, LlmConfig, RetrySettings};
pub use extraction::{ExtractionMethod, ExtractionResult};
pub use ticket::{Department, Priority, Sentiment, SupportTicket, TokenUsage};
