use crate::adapters::{
    classify_reqwest_error, extract_fields, extract_title, mime_essence, Adapter, AdapterKind,
    FetchError, FetchErrorKind, FetchRequest, Payload,
};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

/// Fetches documents with a plain HTTP GET
///
/// # Response Handling
///
/// | Condition | Result |
/// |-----------|--------|
/// | Status >= 400 | `Http { status }` |
/// | Timeout | `Timeout` |
/// | Connect/DNS failure | `Network` |
/// | HTML body shorter than the minimum after trimming | `EmptyContent` |
/// | Any other body that is blank | `EmptyContent` |
/// | Otherwise | `Payload::Text`; HTML bodies also get their `<title>` and fields |
///
/// Only HTML is held to the minimum length, since a thin HTML shell is the
/// sign of a script-built page. A short JSON or plain-text body is complete.
pub struct StaticAdapter {
    client: Client,
    min_content_bytes: usize,
}

impl StaticAdapter {
    /// Creates a static adapter over a shared client
    ///
    /// # Arguments
    ///
    /// * `client` - The HTTP client (see [`crate::adapters::build_http_client`])
    /// * `min_content_bytes` - HTML bodies shorter than this after trimming count as empty
    pub fn new(client: Client, min_content_bytes: usize) -> Self {
        Self {
            client,
            min_content_bytes,
        }
    }
}

#[async_trait]
impl Adapter for StaticAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Static
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Payload, FetchError> {
        let response = self
            .client
            .get(request.url.clone())
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::http(status.as_u16(), &request.url));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let is_html = is_html_type(&content_type);
        let trimmed_len = body.trim().len();
        let minimum = if is_html { self.min_content_bytes.max(1) } else { 1 };
        if trimmed_len < minimum {
            return Err(FetchError::new(
                FetchErrorKind::EmptyContent,
                format!(
                    "{} returned {} bytes of content (minimum {})",
                    final_url, trimmed_len, minimum
                ),
            ));
        }

        let (title, fields) = if is_html {
            (extract_title(&body), extract_fields(&body, &request.selectors))
        } else {
            (None, Default::default())
        };

        tracing::debug!("Static fetch of {} returned {} bytes", final_url, body.len());

        Ok(Payload::Text {
            body,
            content_type,
            title,
            final_url,
            fields,
        })
    }
}

/// HTML, XHTML, or no declared type at all
fn is_html_type(content_type: &str) -> bool {
    let essence = mime_essence(content_type);
    essence.is_empty() || essence.contains("html")
}
