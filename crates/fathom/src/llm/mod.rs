pub mod retry;
pub mod types;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::llm::types::{CompletionRequest, CompletionResponse};

/// Callback invoked with each text delta during streaming.
pub type OnText = dyn Fn(&str) + Send + Sync;

/// Trait for LLM providers.
///
/// Uses RPITIT (`impl Future`) which means this trait is NOT dyn-compatible.
/// Consumers are generic over `P: LlmProvider`; when a single erased type is
/// needed (heterogeneous configs, collections of agents), wrap the provider
/// in [`BoxedProvider`].
pub trait LlmProvider: Send + Sync {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, Error>> + Send;

    /// Stream a completion, calling `on_text` for each text delta as it
    /// arrives. The returned response contains the full accumulated content.
    ///
    /// Default: falls back to `complete()` (no incremental streaming).
    fn stream_complete(
        &self,
        request: CompletionRequest,
        on_text: &OnText,
    ) -> impl Future<Output = Result<CompletionResponse, Error>> + Send {
        let _ = on_text;
        self.complete(request)
    }

    /// Return the model identifier, if known. Default returns `None`.
    fn model_name(&self) -> Option<&str> {
        None
    }
}

/// A shared provider is itself a provider. This is what lets the `task`
/// tool hand the same `Arc<P>` to sub-agent loops without an adapter type.
impl<P: LlmProvider> LlmProvider for Arc<P> {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        self.as_ref().complete(request).await
    }

    async fn stream_complete(
        &self,
        request: CompletionRequest,
        on_text: &OnText,
    ) -> Result<CompletionResponse, Error> {
        self.as_ref().stream_complete(request, on_text).await
    }

    fn model_name(&self) -> Option<&str> {
        self.as_ref().model_name()
    }
}

/// Object-safe bridge behind [`BoxedProvider`]. `LlmProvider` cannot be a
/// trait object (RPITIT), so this private mirror boxes the futures; the
/// blanket impl keeps it invisible to implementors.
trait ErasedProvider: Send + Sync {
    fn complete_boxed<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, Error>> + Send + 'a>>;

    fn stream_boxed<'a>(
        &'a self,
        request: CompletionRequest,
        on_text: &'a OnText,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, Error>> + Send + 'a>>;

    fn erased_model_name(&self) -> Option<&str>;
}

impl<P: LlmProvider> ErasedProvider for P {
    fn complete_boxed<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, Error>> + Send + 'a>> {
        Box::pin(self.complete(request))
    }

    fn stream_boxed<'a>(
        &'a self,
        request: CompletionRequest,
        on_text: &'a OnText,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, Error>> + Send + 'a>> {
        Box::pin(self.stream_complete(request, on_text))
    }

    fn erased_model_name(&self) -> Option<&str> {
        self.model_name()
    }
}

/// Type-erased LLM provider for call sites that cannot stay generic.
///
/// Any provider goes in, including a shared `Arc<P>` (which implements
/// `LlmProvider` itself). `BoxedProvider` implements `LlmProvider`, so it
/// slots into `DeepAgent<BoxedProvider>` unchanged.
pub struct BoxedProvider(Box<dyn ErasedProvider>);

impl BoxedProvider {
    pub fn new<P: LlmProvider + 'static>(provider: P) -> Self {
        Self(Box::new(provider))
    }
}

impl LlmProvider for BoxedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        self.0.complete_boxed(request).await
    }

    async fn stream_complete(
        &self,
        request: CompletionRequest,
        on_text: &OnText,
    ) -> Result<CompletionResponse, Error> {
        self.0.stream_boxed(request, on_text).await
    }

    fn model_name(&self) -> Option<&str> {
        self.0.erased_model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{ContentBlock, Message, StopReason, TokenUsage};
    use std::sync::Mutex;

    struct FakeProvider;

    impl LlmProvider for FakeProvider {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, Error> {
            Ok(CompletionResponse {
                content: vec![ContentBlock::Text {
                    text: "fake".into(),
                }],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            })
        }
    }

    struct StreamingFakeProvider;

    impl LlmProvider for StreamingFakeProvider {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, Error> {
            panic!("should call stream_complete, not complete");
        }

        async fn stream_complete(
            &self,
            _request: CompletionRequest,
            on_text: &OnText,
        ) -> Result<CompletionResponse, Error> {
            on_text("hello");
            on_text(" world");
            Ok(CompletionResponse {
                content: vec![ContentBlock::Text {
                    text: "hello world".into(),
                }],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            })
        }
    }

    fn test_request() -> CompletionRequest {
        CompletionRequest {
            system: String::new(),
            messages: vec![Message::user("test")],
            tools: vec![],
            max_tokens: 100,
        }
    }

    #[tokio::test]
    async fn boxed_provider_delegates_complete() {
        let provider = BoxedProvider::new(FakeProvider);
        let response = provider.complete(test_request()).await.unwrap();
        assert_eq!(response.text(), "fake");
    }

    #[tokio::test]
    async fn boxed_provider_delegates_stream_complete() {
        let provider = BoxedProvider::new(StreamingFakeProvider);
        let received = Arc::new(Mutex::new(Vec::<String>::new()));
        let received_clone = received.clone();
        let on_text: &OnText = &move |text: &str| {
            received_clone
                .lock()
                .expect("test lock")
                .push(text.to_string());
        };

        let response = provider
            .stream_complete(test_request(), on_text)
            .await
            .unwrap();
        assert_eq!(response.text(), "hello world");

        let texts = received.lock().expect("test lock");
        assert_eq!(*texts, vec!["hello", " world"]);
    }

    #[tokio::test]
    async fn boxed_provider_default_stream_falls_back_to_complete() {
        let provider = BoxedProvider::new(FakeProvider);
        let on_text: &OnText = &|_| {};
        let response = provider
            .stream_complete(test_request(), on_text)
            .await
            .unwrap();
        assert_eq!(response.text(), "fake");
    }

    #[tokio::test]
    async fn shared_arc_provider_is_a_provider() {
        let shared = Arc::new(FakeProvider);
        // Both handles drive the same underlying provider, no adapter needed
        let response = shared.clone().complete(test_request()).await.unwrap();
        assert_eq!(response.text(), "fake");

        let boxed = BoxedProvider::new(shared);
        let response = boxed.complete(test_request()).await.unwrap();
        assert_eq!(response.text(), "fake");
    }

    #[test]
    fn boxed_provider_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BoxedProvider>();
    }

    #[test]
    fn boxed_provider_preserves_model_name() {
        struct NamedProvider;
        impl LlmProvider for NamedProvider {
            async fn complete(
                &self,
                _request: CompletionRequest,
            ) -> Result<CompletionResponse, Error> {
                unimplemented!()
            }
            fn model_name(&self) -> Option<&str> {
                Some("test-model")
            }
        }
        let boxed = BoxedProvider::new(NamedProvider);
        assert_eq!(boxed.model_name(), Some("test-model"));
    }
}
