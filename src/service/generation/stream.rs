//! Accumulation of streamed completion fragments

use thiserror::Error;

use crate::model::TokenUsage;
use crate::service::llm::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    Idle,
    Accumulating,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccumulatorError {
    #[error("Stream already finished")]
    AlreadyFinished,

    #[error("Stream ended without any content")]
    Empty,

    #[error("Stream failed after {received} characters: {source}")]
    Failed {
        received: usize,
        source: ProviderError,
    },
}

/// Assembles text or tool-argument deltas into one raw output.
///
/// `Idle -> Accumulating -> Complete | Failed`. `Complete` and `Failed` are
/// terminal; a failed accumulator keeps its partial buffer.
#[derive(Debug)]
pub struct StreamAccumulator {
    state: AccumulatorState,
    buffer: String,
    usage: Option<TokenUsage>,
    failure: Option<ProviderError>,
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self {
            state: AccumulatorState::Idle,
            buffer: String::new(),
            usage: None,
            failure: None,
        }
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Text received so far, including after a failure
    pub fn partial(&self) -> &str {
        &self.buffer
    }

    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }

    /// Append a fragment and return the accumulated length in characters
    pub fn push(&mut self, fragment: &str) -> Result<usize, AccumulatorError> {
        self.ensure_open()?;
        self.buffer.push_str(fragment);
        self.state = AccumulatorState::Accumulating;
        Ok(self.buffer.chars().count())
    }

    pub fn record_usage(&mut self, usage: TokenUsage) {
        self.usage = Some(usage);
    }

    /// Move to `Failed`, keeping the partial buffer
    pub fn fail(&mut self, error: ProviderError) -> AccumulatorError {
        let received = self.buffer.chars().count();
        if !self.is_terminal() {
            self.state = AccumulatorState::Failed;
            self.failure = Some(error.clone());
        }
        AccumulatorError::Failed {
            received,
            source: error,
        }
    }

    /// Close the stream and hand back the assembled text
    pub fn finish(&mut self) -> Result<String, AccumulatorError> {
        self.ensure_open()?;
        if self.buffer.trim().is_empty() {
            self.state = AccumulatorState::Failed;
            return Err(AccumulatorError::Empty);
        }
        self.state = AccumulatorState::Complete;
        Ok(self.buffer.clone())
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            AccumulatorState::Complete | AccumulatorState::Failed
        )
    }

    fn ensure_open(&self) -> Result<(), AccumulatorError> {
        match (&self.state, &self.failure) {
            (AccumulatorState::Failed, Some(source)) => Err(AccumulatorError::Failed {
                received: self.buffer.chars().count(),
                source: source.clone(),
            }),
            _ if self.is_terminal() => Err(AccumulatorError::AlreadyFinished),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_in_order() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.state(), AccumulatorState::Idle);
        assert_eq!(acc.push("{\"sent").unwrap(), 6);
        assert_eq!(acc.state(), AccumulatorState::Accumulating);
        acc.push("iment\":1}").unwrap();
        assert_eq!(acc.finish().unwrap(), "{\"sentiment\":1}");
        assert_eq!(acc.state(), AccumulatorState::Complete);
    }

    #[test]
    fn test_push_after_complete_rejected() {
        let mut acc = StreamAccumulator::new();
        acc.push("done").unwrap();
        acc.finish().unwrap();
        assert_eq!(acc.push("more"), Err(AccumulatorError::AlreadyFinished));
        assert_eq!(acc.finish(), Err(AccumulatorError::AlreadyFinished));
    }

    #[test]
    fn test_finish_empty_is_failure() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.finish(), Err(AccumulatorError::Empty));
        assert_eq!(acc.state(), AccumulatorState::Failed);
    }

    #[test]
    fn test_failure_keeps_partial_buffer() {
        let mut acc = StreamAccumulator::new();
        acc.push("{\"sentiment\":").unwrap();
        let err = acc.fail(ProviderError::Network("connection reset".to_string()));

        assert!(matches!(err, AccumulatorError::Failed { received: 13, .. }));
        assert_eq!(acc.state(), AccumulatorState::Failed);
        assert_eq!(acc.partial(), "{\"sentiment\":");
        assert!(matches!(
            acc.push("\"x\""),
            Err(AccumulatorError::Failed { .. })
        ));
    }
}
