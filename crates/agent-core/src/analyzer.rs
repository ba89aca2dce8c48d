//! Core Analyzer trait definition

use crate::{Payload, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Uniform contract implemented by every pluggable analysis capability
///
/// Analyzers are stateless per invocation: everything they need arrives in
/// the input payload, and everything they produce leaves in the output
/// payload. Each analyzer validates its own input schema and reports a
/// mismatch as [`crate::Error::InvalidInput`].
///
/// The `cancel` token is a cooperative signal. Long-running analyzers should
/// check it between steps (or `select!` on `cancel.cancelled()`) and return
/// [`crate::Error::Cancelled`] promptly once it fires.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze the input payload and return the output payload
    async fn analyze(&self, input: Payload, cancel: CancellationToken) -> Result<Payload>;

    /// Get the analyzer's name
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl Analyzer for Echo {
        async fn analyze(&self, input: Payload, cancel: CancellationToken) -> Result<Payload> {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            Ok(input)
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_trait_object_dispatch() {
        let analyzer: Arc<dyn Analyzer> = Arc::new(Echo);
        let input = Payload::new().with_symbol("000001");

        let output = analyzer
            .analyze(input.clone(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output, input);
        assert_eq!(analyzer.name(), "echo");
    }

    #[tokio::test]
    async fn test_cancelled_token_is_observed() {
        let token = CancellationToken::new();
        token.cancel();

        let result = Echo.analyze(Payload::new(), token).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
