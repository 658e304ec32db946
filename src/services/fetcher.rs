// src/services/fetcher.rs

//! Source page fetching.
//!
//! The dashboard is a JS-rendered page whose data path is not stable: rows
//! sometimes arrive through XHR/fetch responses, sometimes only exist in the
//! rendered DOM. `BrowserFetcher` therefore captures both channels from one
//! headless browser session and hands them to the extractor together.
//!
//! `StaticFetcher` is the degraded reqwest-only path used when the crate is
//! built without the `browser` feature.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::FetcherConfig;

/// Everything one fetch pass produced.
#[derive(Debug, Default)]
pub struct PageCapture {
    /// JSON bodies captured from non-asset network responses.
    pub payloads: Vec<Value>,
    /// Final rendered document, when available.
    pub html: Option<String>,
}

/// A source page fetcher driving one session against one URL.
#[async_trait]
pub trait PageFetcher: Send {
    /// Load the page and return both capture channels.
    async fn fetch(&mut self, url: &str) -> Result<PageCapture>;
}

/// Plain HTTP fetcher; no JS execution, no network capture beyond the
/// document itself.
pub struct StaticFetcher {
    client: reqwest::Client,
}

impl StaticFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.nav_timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&mut self, url: &str) -> Result<PageCapture> {
        let response = self.client.get(url).send().await?;
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("json"))
            .unwrap_or(false);

        let body = response.text().await?;

        if is_json {
            if let Ok(payload) = serde_json::from_str::<Value>(&body) {
                return Ok(PageCapture {
                    payloads: vec![payload],
                    html: None,
                });
            }
        }

        Ok(PageCapture {
            payloads: Vec::new(),
            html: Some(body),
        })
    }
}

#[cfg(feature = "browser")]
pub use browser::BrowserFetcher;

#[cfg(feature = "browser")]
mod browser {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::cdp::browser_protocol::network::{
        EnableParams, EventResponseReceived, GetResponseBodyParams, ResourceType,
    };
    use chromiumoxide::Page;
    use futures::{Stream, StreamExt};
    use serde_json::Value;
    use tokio::sync::Mutex;
    use tokio::time::{sleep, timeout, Duration};

    use crate::error::{AppError, Result};
    use crate::models::FetcherConfig;
    use crate::services::fetcher::{PageCapture, PageFetcher};

    /// Headless-browser fetcher with network response capture.
    ///
    /// One browser session is launched lazily and reused across poll cycles;
    /// each cycle gets a fresh page.
    pub struct BrowserFetcher {
        config: FetcherConfig,
        browser: Option<Browser>,
    }

    impl BrowserFetcher {
        pub fn new(config: FetcherConfig) -> Self {
            Self {
                config,
                browser: None,
            }
        }

        /// Launch the browser if this session doesn't have one yet.
        async fn ensure_browser(&mut self) -> Result<()> {
            if self.browser.is_some() {
                return Ok(());
            }

            log::info!("Launching headless browser session");
            let browser_config = BrowserConfig::builder()
                .no_sandbox()
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                .arg("--disable-blink-features=AutomationControlled")
                .arg(format!("--user-agent={}", self.config.user_agent))
                .build()
                .map_err(AppError::browser)?;

            let (browser, mut handler) = Browser::launch(browser_config)
                .await
                .map_err(AppError::browser)?;

            tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            self.browser = Some(browser);
            Ok(())
        }
    }

    #[async_trait]
    impl PageFetcher for BrowserFetcher {
        async fn fetch(&mut self, url: &str) -> Result<PageCapture> {
            self.ensure_browser().await?;
            let browser = self
                .browser
                .as_ref()
                .ok_or_else(|| AppError::browser("browser session unavailable"))?;

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(AppError::browser)?;
            page.execute(EnableParams::default())
                .await
                .map_err(AppError::browser)?;

            // Responses stream into the batch as they arrive, independent of
            // how far navigation gets.
            let payloads: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
            let events = page
                .event_listener::<EventResponseReceived>()
                .await
                .map_err(AppError::browser)?;
            let capture_task = tokio::spawn(capture_responses(
                page.clone(),
                events,
                Arc::clone(&payloads),
                self.config.max_body_bytes,
            ));

            let navigation = timeout(Duration::from_secs(self.config.nav_timeout_secs), async {
                page.goto(url).await?;
                page.wait_for_navigation().await?;
                Ok::<_, chromiumoxide::error::CdpError>(())
            })
            .await;

            match navigation {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // A rejected/blocked load fails the cycle; the poll loop
                    // backs off and retries.
                    let _ = page.close().await;
                    capture_task.abort();
                    return Err(AppError::fetch(url, e));
                }
                Err(_) => {
                    log::warn!(
                        "Navigation to {} timed out after {}s, continuing with current DOM",
                        url,
                        self.config.nav_timeout_secs
                    );
                }
            }

            sleep(Duration::from_millis(self.config.settle_ms)).await;

            if let Err(e) = scroll_through(
                &page,
                &self.config.scroll_container,
                self.config.scroll_steps,
            )
            .await
            {
                log::debug!("Scroll pass failed: {}", e);
            }

            sleep(Duration::from_millis(self.config.settle_ms)).await;

            let html = page.content().await.ok();
            let _ = page.close().await;
            capture_task.abort();

            let captured = {
                let mut guard = payloads.lock().await;
                std::mem::take(&mut *guard)
            };

            log::debug!(
                "Captured {} JSON responses, dom: {}",
                captured.len(),
                html.is_some()
            );

            Ok(PageCapture {
                payloads: captured,
                html,
            })
        }
    }

    /// Side-channel task: collect every non-asset JSON response body.
    async fn capture_responses(
        page: Page,
        mut events: impl Stream<Item = Arc<EventResponseReceived>> + Send + Unpin + 'static,
        sink: Arc<Mutex<Vec<Value>>>,
        max_body_bytes: usize,
    ) {
        while let Some(event) = events.next().await {
            if is_asset_type(&event.r#type) {
                continue;
            }

            // The body lags the response event slightly.
            sleep(Duration::from_millis(120)).await;

            let body = match page
                .execute(GetResponseBodyParams::new(event.request_id.clone()))
                .await
            {
                Ok(response) => {
                    if response.result.base64_encoded {
                        continue;
                    }
                    response.result.body.clone()
                }
                // Body already evicted; the DOM channel still covers the row.
                Err(_) => continue,
            };

            if body.len() > max_body_bytes {
                continue;
            }
            if let Ok(payload) = serde_json::from_str::<Value>(&body) {
                sink.lock().await.push(payload);
            }
        }
    }

    fn is_asset_type(resource_type: &ResourceType) -> bool {
        matches!(
            resource_type,
            ResourceType::Image
                | ResourceType::Stylesheet
                | ResourceType::Font
                | ResourceType::Script
                | ResourceType::Media
        )
    }

    /// Scroll the list container to its full extent and back so virtualized
    /// rows mount into the DOM.
    async fn scroll_through(page: &Page, container: &str, steps: u32) -> Result<()> {
        let selector = serde_json::to_string(container)?;
        let steps = steps.max(1);

        for step in 1..=steps {
            let js = format!(
                "(() => {{ const el = document.querySelector({selector}) || document.scrollingElement; \
                 if (!el) return 0; el.scrollTop = el.scrollHeight * {step} / {steps}; return el.scrollTop; }})()"
            );
            page.evaluate(js).await.map_err(AppError::browser)?;
            sleep(Duration::from_millis(250)).await;
        }

        let back = format!(
            "(() => {{ const el = document.querySelector({selector}) || document.scrollingElement; \
             if (el) el.scrollTop = 0; return 0; }})()"
        );
        page.evaluate(back).await.map_err(AppError::browser)?;
        Ok(())
    }
}
