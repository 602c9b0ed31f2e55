//! HTTP implementation of the frame source boundary.
//!
//! The composition frontend is treated as an opaque navigable endpoint:
//! a session resource, a frame-seek control, a pending-work readiness
//! gate, and a capture call. Nothing else about its internals is
//! assumed.

use std::time::Duration;

use serde::Deserialize;

use framecast_common::error::{FramecastError, FramecastResult};
use framecast_render_model::CompositionMetadata;

use crate::source::{FrameSource, FrameSourceProvider, SourceConfig};

/// Margin added to the server-side long-poll timeout so the HTTP
/// request itself does not race the gate it is waiting on.
const READY_POLL_MARGIN_MS: u64 = 2_000;

#[derive(Debug, Deserialize)]
struct SessionOpened {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct ReadyStatus {
    /// Outstanding asynchronous work the composition is still awaiting.
    pending: u32,
}

/// Provider handing out HTTP capture sessions against one frontend.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl FrameSourceProvider for HttpProvider {
    async fn metadata(&self, composition_id: &str) -> FramecastResult<CompositionMetadata> {
        let url = format!("{}/compositions/{composition_id}", self.base_url);
        let response = self.client.get(&url).send().await.map_err(connection_err)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FramecastError::composition_not_found(composition_id));
        }
        let response = check_status(response, "composition metadata")?;

        response
            .json::<CompositionMetadata>()
            .await
            .map_err(|e| FramecastError::connection(format!("invalid metadata payload: {e}")))
    }

    fn open_source(&self) -> Box<dyn FrameSource> {
        Box::new(HttpFrameSource {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            session: None,
            last_seeked: None,
        })
    }
}

/// One capture session against the composition frontend.
pub struct HttpFrameSource {
    client: reqwest::Client,
    base_url: String,
    session: Option<OpenSession>,
    last_seeked: Option<u32>,
}

struct OpenSession {
    id: String,
    config: SourceConfig,
}

#[async_trait::async_trait]
impl FrameSource for HttpFrameSource {
    async fn open(&mut self, config: &SourceConfig) -> FramecastResult<()> {
        if self.session.is_some() {
            return Err(FramecastError::connection("session already open"));
        }

        let url = format!("{}/sessions", self.base_url);
        let body = serde_json::json!({
            "composition_id": config.composition_id,
            "width": config.width,
            "height": config.height,
            "scale": config.scale,
            "input_props": config.input_props,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(connection_err)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FramecastError::composition_not_found(&config.composition_id));
        }
        let response = check_status(response, "session open")?;

        let opened: SessionOpened = response
            .json()
            .await
            .map_err(|e| FramecastError::connection(format!("invalid session payload: {e}")))?;

        tracing::debug!(
            session = %opened.session_id,
            composition = %config.composition_id,
            "Capture session opened"
        );

        self.session = Some(OpenSession {
            id: opened.session_id,
            config: config.clone(),
        });
        Ok(())
    }

    async fn seek_and_capture(&mut self, frame: u32) -> FramecastResult<Vec<u8>> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| FramecastError::connection("seek on a closed session"))?;
        let sid = session.id.clone();
        let config = &session.config;

        // Seek the external clock. Arbitrary targets are allowed; the
        // frontend owns forward/backward navigation.
        let seek_url = format!("{}/sessions/{sid}/frame", self.base_url);
        let response = self
            .client
            .post(&seek_url)
            .json(&serde_json::json!({ "frame": frame }))
            .send()
            .await
            .map_err(connection_err)?;
        check_status(response, "frame seek")?;

        self.wait_until_settled(&sid, frame, config).await?;

        let capture_url = format!(
            "{}/sessions/{sid}/capture?format={}&quality={}",
            self.base_url,
            config.image_format.as_str(),
            config.image_quality
        );
        let response = self
            .client
            .get(&capture_url)
            .send()
            .await
            .map_err(connection_err)?;
        let response = check_status(response, "frame capture")?;

        let bytes = response.bytes().await.map_err(connection_err)?;
        self.last_seeked = Some(frame);
        Ok(bytes.to_vec())
    }

    async fn close(&mut self) -> FramecastResult<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        let url = format!("{}/sessions/{}", self.base_url, session.id);
        match self.client.delete(&url).send().await {
            Ok(_) => {
                tracing::debug!(session = %session.id, "Capture session closed");
            }
            Err(e) => {
                // The session will be reaped server-side; closing is
                // best-effort so teardown paths never fail on it.
                tracing::warn!(session = %session.id, error = %e, "Failed to close capture session");
            }
        }
        Ok(())
    }
}

impl HttpFrameSource {
    /// The frame index of the most recent successful capture.
    pub fn last_seeked(&self) -> Option<u32> {
        self.last_seeked
    }

    /// Bounded wait for the composition's pending-work counter to reach
    /// zero. Each attempt is a server-side long-poll capped by the
    /// configured timeout; the retry budget caps the number of attempts.
    async fn wait_until_settled(
        &self,
        sid: &str,
        frame: u32,
        config: &SourceConfig,
    ) -> FramecastResult<()> {
        let attempts = config.capture_retries + 1;
        let url = format!(
            "{}/sessions/{sid}/ready?timeout_ms={}",
            self.base_url, config.capture_timeout_ms
        );

        let mut last_pending = 0;
        for attempt in 1..=attempts {
            let response = self
                .client
                .get(&url)
                .timeout(Duration::from_millis(
                    config.capture_timeout_ms + READY_POLL_MARGIN_MS,
                ))
                .send()
                .await
                .map_err(connection_err)?;
            let response = check_status(response, "readiness poll")?;

            let status: ReadyStatus = response
                .json()
                .await
                .map_err(|e| FramecastError::connection(format!("invalid ready payload: {e}")))?;

            if status.pending == 0 {
                return Ok(());
            }
            last_pending = status.pending;
            tracing::debug!(
                frame,
                attempt,
                pending = status.pending,
                "Composition still has pending work"
            );
        }

        Err(FramecastError::render_timeout(
            frame,
            attempts,
            format!("{last_pending} delay handles still pending"),
        ))
    }
}

fn connection_err(e: reqwest::Error) -> FramecastError {
    FramecastError::connection(e.to_string())
}

fn check_status(response: reqwest::Response, what: &str) -> FramecastResult<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(FramecastError::connection(format!(
            "{what} failed: HTTP {status}"
        )));
    }
    Ok(response)
}
