//! Rendering backends
//!
//! With the `chrome` feature, sessions are tabs of a headless Chromium driven
//! through `chromiumoxide`; the browser is launched on first use. Without it,
//! every session request fails with a navigation error so rendered fetches
//! degrade into ordinary per-task failures.

use crate::adapters::{BrowserBackend, BrowserSession, FetchError, FetchErrorKind};
use crate::config::Config;
use async_trait::async_trait;
use std::sync::Arc;

/// Returns the rendering backend this build supports
pub fn default_backend(config: &Config) -> crate::Result<Arc<dyn BrowserBackend>> {
    #[cfg(feature = "chrome")]
    {
        Ok(Arc::new(headless::ChromeBackend::new(
            crate::adapters::user_agent_string(&config.user_agent),
        )))
    }

    #[cfg(not(feature = "chrome"))]
    {
        let _ = config;
        Ok(Arc::new(UnavailableBackend))
    }
}

/// Backend used when no browser support is compiled in
pub struct UnavailableBackend;

#[async_trait]
impl BrowserBackend for UnavailableBackend {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>, FetchError> {
        Err(FetchError::new(
            FetchErrorKind::Navigation,
            "rendering backend unavailable (build with the `chrome` feature)",
        ))
    }
}

#[cfg(feature = "chrome")]
mod headless {
    use super::*;
    use crate::adapters::RenderedPage;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::Page;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::sync::OnceCell;
    use url::Url;

    fn navigation_error(context: &str, error: impl std::fmt::Display) -> FetchError {
        FetchError::new(FetchErrorKind::Navigation, format!("{}: {}", context, error))
    }

    /// Lazily launched headless Chromium
    pub struct ChromeBackend {
        user_agent: String,
        browser: OnceCell<Arc<Browser>>,
    }

    impl ChromeBackend {
        pub fn new(user_agent: String) -> Self {
            Self {
                user_agent,
                browser: OnceCell::new(),
            }
        }

        async fn browser(&self) -> Result<Arc<Browser>, FetchError> {
            self.browser
                .get_or_try_init(|| async {
                    let config = BrowserConfig::builder()
                        .arg("--no-sandbox")
                        .arg("--disable-gpu")
                        .arg("--disable-dev-shm-usage")
                        .arg("--disable-software-rasterizer")
                        .build()
                        .map_err(|e| navigation_error("Failed to build browser config", e))?;

                    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
                        navigation_error(
                            "Failed to launch browser (is Chrome or Chromium installed?)",
                            e,
                        )
                    })?;

                    tokio::spawn(async move { while handler.next().await.is_some() {} });
                    tracing::info!("Launched headless browser");

                    Ok(Arc::new(browser))
                })
                .await
                .cloned()
        }
    }

    #[async_trait]
    impl BrowserBackend for ChromeBackend {
        async fn open_session(&self) -> Result<Box<dyn BrowserSession>, FetchError> {
            let browser = self.browser().await?;
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| navigation_error("Failed to open tab", e))?;
            page.set_user_agent(&self.user_agent)
                .await
                .map_err(|e| navigation_error("Failed to set user agent", e))?;

            Ok(Box::new(ChromeSession { page }))
        }
    }

    /// One browser tab reused across fetches
    struct ChromeSession {
        page: Page,
    }

    #[async_trait]
    impl BrowserSession for ChromeSession {
        async fn render(&mut self, url: &Url, settle: Duration) -> Result<RenderedPage, FetchError> {
            self.page
                .goto(url.as_str())
                .await
                .map_err(|e| navigation_error("Navigation failed", e))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| navigation_error("Navigation failed", e))?;

            tokio::time::sleep(settle).await;

            let html = self
                .page
                .content()
                .await
                .map_err(|e| navigation_error("Failed to read document", e))?;
            let title = self.page.get_title().await.ok().flatten();
            let final_url = self
                .page
                .url()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| url.to_string());

            Ok(RenderedPage {
                html,
                title,
                final_url,
            })
        }
    }
}
