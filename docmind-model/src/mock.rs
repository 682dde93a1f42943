//! Scripted provider for tests and offline runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ModelError, Result};
use crate::llm::{GenerationRequest, LlmProvider};

type Responder = Arc<dyn Fn(&GenerationRequest) -> String + Send + Sync>;

/// A provider that returns canned responses.
///
/// Responses queued with [`with_responses`](Self::with_responses) are
/// consumed in order; once the queue is empty the fallback response
/// (or responder) is used for every further call.
#[derive(Clone)]
pub struct MockLlm {
    name: String,
    queue: Arc<Mutex<VecDeque<String>>>,
    fallback: String,
    responder: Option<Responder>,
    delay: Option<Duration>,
    failure: Option<String>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockLlm {
    /// Create a mock that answers with an empty string.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            fallback: String::new(),
            responder: None,
            delay: None,
            failure: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer every call with `response`.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.fallback = response.into();
        self
    }

    /// Answer successive calls with the given responses, in order.
    pub fn with_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(responses.into_iter().map(Into::into));
        }
        self
    }

    /// Compute the response from the request.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&GenerationRequest) -> String + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with [`ModelError::Unavailable`].
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = &self.failure {
            return Err(ModelError::Unavailable(reason.clone()));
        }

        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(response) = queued {
            return Ok(response);
        }

        match &self.responder {
            Some(responder) => Ok(responder(request)),
            None => Ok(self.fallback.clone()),
        }
    }
}

impl std::fmt::Debug for MockLlm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLlm")
            .field("name", &self.name)
            .field("delay", &self.delay)
            .field("failing", &self.failure.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_responses_precede_fallback() {
        let llm = MockLlm::new("m").with_response("fallback").with_responses(["one", "two"]);
        let req = GenerationRequest::new("q");
        assert_eq!(llm.generate(&req).await.unwrap(), "one");
        assert_eq!(llm.generate(&req).await.unwrap(), "two");
        assert_eq!(llm.generate(&req).await.unwrap(), "fallback");
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test]
    async fn responder_sees_request() {
        let llm = MockLlm::new("m").with_responder(|req| req.prompt.to_uppercase());
        let out = llm.generate(&GenerationRequest::new("hello")).await.unwrap();
        assert_eq!(out, "HELLO");
    }

    #[tokio::test]
    async fn failing_mock_errors_and_records_call() {
        let llm = MockLlm::new("m").failing("down");
        let err = llm.generate(&GenerationRequest::new("q")).await.unwrap_err();
        assert!(matches!(err, ModelError::Unavailable(_)));
        assert_eq!(llm.requests().len(), 1);
    }
}
