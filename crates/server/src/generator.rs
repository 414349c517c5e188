use async_trait::async_trait;

/// Produces the continuation of a chat log. Only the first line of the reply
/// is kept by the caller.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Answers every prompt with the same reply.
#[derive(Debug, Clone)]
pub struct CannedGenerator {
    reply: String,
}

impl CannedGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl Generator for CannedGenerator {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok(self.reply.clone())
    }
}
