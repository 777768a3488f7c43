//! Simple stateless pub-sub event handler
//!
//! Components subscribe to engine events by registering a handler. Handlers receive only the event, never the engine
//! state, and may be async. Each event is handled in its own task, so a slow or failing handler never blocks the
//! publisher. A handler that returns an error is retried with backoff; once its retries are exhausted the event is
//! logged and dropped.
use std::{
    future::Future,
    pin::Pin,
    sync::{atomic::AtomicI64, Arc},
};

use log::*;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::helpers::{retry_with_backoff, RetryConfig};

#[derive(Debug, Clone, Error)]
#[error("Event hook failed: {0}")]
pub struct HookError(pub String);

pub type HookResult = Result<(), HookError>;

pub type HookFuture = Pin<Box<dyn Future<Output = HookResult> + Send>>;

pub type Handler<E> = Arc<dyn Fn(E) -> HookFuture + Send + Sync>;

pub struct EventHandler<E: Clone + Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
    retry: RetryConfig,
}

impl<E: Clone + Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        Self::with_retry(buffer_size, handler, RetryConfig::default())
    }

    pub fn with_retry(buffer_size: usize, handler: Handler<E>, retry: RetryConfig) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler, retry }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // drop the internal sender so that when the last subscriber is dropped, we can automatically shut down the
        // handler
        drop(self.sender);
        let jobs = Arc::new(AtomicI64::new(0));
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            let retry = self.retry.clone();
            jobs.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let job = jobs.clone();
            tokio::spawn(async move {
                let result = retry_with_backoff(&retry, "📬️ Event hook", |_| true, |_| (handler)(ev.clone())).await;
                if let Err(e) = result {
                    error!("📬️ Event could not be delivered and has been dropped. {e}");
                }
                job.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                trace!("📬️ Event handled");
            });
        }
        while jobs.load(std::sync::atomic::Ordering::SeqCst) > 0 {
            debug!("📬️ Waiting for jobs to complete");
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}
