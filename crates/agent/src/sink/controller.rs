//! Controller — batches process output and POSTs it to the controller.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use url::Url;

use super::{wants, Logger};
use crate::batch::{BatchBuffer, BatchError};
use crate::pm::{Command, Message};

pub struct ControllerLogger {
    buffer: Arc<BatchBuffer<Message>>,
    levels: Vec<i32>,
}

impl ControllerLogger {
    /// Must be called from within a tokio runtime; batches are posted on it.
    pub fn new(endpoints: Vec<Url>, bufsize: usize, flush_interval: Duration, levels: Vec<i32>) -> Self {
        let client = reqwest::Client::new();
        let endpoints: Arc<[Url]> = endpoints.into();
        let runtime = Handle::current();

        let buffer = BatchBuffer::new(bufsize, flush_interval, move |batch: Vec<Message>| {
            let body = serde_json::to_vec(&batch).map_err(|e| BatchError::Encode(e.to_string()))?;
            runtime.spawn(post_batch(client.clone(), Arc::clone(&endpoints), body));
            Ok(())
        });

        Self::with_buffer(buffer, levels)
    }

    pub fn with_buffer(buffer: Arc<BatchBuffer<Message>>, levels: Vec<i32>) -> Self {
        Self { buffer, levels }
    }

    pub fn flush(&self) {
        self.buffer.flush();
    }
}

impl Logger for ControllerLogger {
    fn log(&self, command: &Command, message: &Message) {
        if wants(&self.levels, command, message) {
            self.buffer.append(message.clone());
        }
    }
}

/// POST one encoded batch to every endpoint. Failures are logged and the
/// batch is not retried.
async fn post_batch(client: reqwest::Client, endpoints: Arc<[Url]>, body: Vec<u8>) {
    for endpoint in endpoints.iter() {
        let response = client
            .post(endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone())
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                // drain so the connection goes back to the pool
                let _ = response.bytes().await;
                if status.is_success() {
                    debug!(endpoint = %endpoint, "log batch sent");
                } else {
                    warn!(endpoint = %endpoint, status = %status, "controller rejected log batch");
                }
            }
            Err(e) => warn!(endpoint = %endpoint, error = %e, "failed to send log batch"),
        }
    }
}
