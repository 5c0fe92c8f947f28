pub mod batch;
pub mod classification;
pub mod comparison;
pub mod decode;
pub mod extraction;
pub mod generation;
pub mod llm;
pub mod schema;

pub use batch::{BatchService, InMemoryJobStore, JobStore};
pub use classification::ClassificationService;
pub use comparison::ComparisonService;
pub use extraction::UnstructuredService;
pub use generation::ConstrainedGenerator;
pub use llm::{ChatProvider, OpenAiClient};
