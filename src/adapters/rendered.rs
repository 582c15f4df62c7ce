use crate::adapters::{
    extract_fields, extract_title, Adapter, AdapterKind, FetchError, FetchErrorKind, FetchRequest, Payload,
    SessionPool,
};
use async_trait::async_trait;
use std::time::Duration;

/// Fetches pages through a headless browser so script-built content is present
///
/// The whole checkout, navigation and settle sequence shares the task's
/// timeout; overrunning it yields `RenderTimeout` and the session is discarded.
pub struct RenderedAdapter {
    pool: SessionPool,
    settle: Duration,
    min_content_bytes: usize,
}

impl RenderedAdapter {
    /// Creates a rendered adapter
    ///
    /// # Arguments
    ///
    /// * `pool` - Browser sessions to render with
    /// * `settle` - Extra wait after DOM-ready for late scripts
    /// * `min_content_bytes` - Rendered documents shorter than this count as empty
    pub fn new(pool: SessionPool, settle: Duration, min_content_bytes: usize) -> Self {
        Self {
            pool,
            settle,
            min_content_bytes,
        }
    }
}

#[async_trait]
impl Adapter for RenderedAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Rendered
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Payload, FetchError> {
        let render = async {
            let mut guard = self.pool.checkout().await?;
            let page = guard.render(&request.url, self.settle).await?;
            guard.mark_healthy();
            Ok::<_, FetchError>(page)
        };

        let page = tokio::time::timeout(request.timeout, render)
            .await
            .map_err(|_| {
                FetchError::new(
                    FetchErrorKind::RenderTimeout,
                    format!(
                        "{} did not finish rendering within {}ms",
                        request.url,
                        request.timeout.as_millis()
                    ),
                )
            })??;

        let trimmed_len = page.html.trim().len();
        if trimmed_len < self.min_content_bytes {
            return Err(FetchError::new(
                FetchErrorKind::EmptyContent,
                format!(
                    "{} rendered {} bytes of content (minimum {})",
                    page.final_url, trimmed_len, self.min_content_bytes
                ),
            ));
        }

        let title = page.title.or_else(|| extract_title(&page.html));
        let fields = extract_fields(&page.html, &request.selectors);
        tracing::debug!("Rendered {} ({} bytes)", page.final_url, page.html.len());

        Ok(Payload::Text {
            body: page.html,
            content_type: "text/html".to_string(),
            title,
            final_url: page.final_url,
            fields,
        })
    }
}
