//! Explanation generation.

use std::sync::Arc;

use tracing::{info, instrument};

use freshdocs_providers::CompletionProvider;
use freshdocs_shared::{FreshDocsError, Result};

use crate::prompt::explanation_prompt;

/// Turns official documentation into an explanatory article via a completion
/// backend.
pub struct Generator {
    provider: Arc<dyn CompletionProvider>,
}

impl Generator {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    #[instrument(skip_all, fields(topic = %topic_title))]
    pub async fn generate(
        &self,
        official_content: &str,
        topic_title: &str,
        course_title: &str,
    ) -> Result<String> {
        let prompt = explanation_prompt(official_content, topic_title, course_title);
        let text = self.provider.complete(&prompt).await?;
        if text.trim().is_empty() {
            return Err(FreshDocsError::Generation(
                "provider returned no usable text".into(),
            ));
        }
        info!(chars = text.len(), "explanation generated");
        Ok(text)
    }
}
