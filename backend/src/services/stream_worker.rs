//! Background consumer for a node event subscription.
//!
//! A worker owns exactly one task which waits on three things: the next event,
//! a stream error, or the quit signal. The subscription context is cancelled
//! whenever the task exits, for whatever reason, so the node side of the
//! stream is always torn down. Reconnecting is left to the caller.

use adapters::Subscription;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::errors::MonitorError;

pub struct StreamWorker {
    name: &'static str,
    quit: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StreamWorker {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            quit: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Spawns the consumer task. `handler` runs on the task for every event;
    /// an error from it is reported to `errors` and ends the task.
    ///
    /// `ctx` must be the token the subscription was opened with.
    pub async fn spawn<T, F>(
        &self,
        ctx: CancellationToken,
        subscription: Subscription<T>,
        errors: mpsc::Sender<MonitorError>,
        mut handler: F,
    ) -> Result<(), MonitorError>
    where
        T: Send + 'static,
        F: FnMut(T) -> Result<(), MonitorError> + Send + 'static,
    {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            ctx.cancel();
            return Err(MonitorError::AlreadyStarted(self.name));
        }

        let name = self.name;
        let quit = self.quit.clone();
        let Subscription {
            events: mut event_rx,
            errors: mut stream_err_rx,
        } = subscription;

        *handle = Some(tokio::spawn(async move {
            let _cancel_on_exit = ctx.drop_guard();

            let exit = loop {
                // Producers send their error before closing the event channel,
                // so the error branch is polled first to keep the cause. Quit is
                // polled before events.
                tokio::select! {
                    biased;

                    err = stream_err_rx.recv() => match err {
                        Some(source) => {
                            break Some(MonitorError::StreamExited { stream: name, source });
                        }
                        // The producer dropped its error sender; keep draining
                        // events until the data channel closes too.
                        None => {
                            debug!(stream = name, "stream error channel closed");
                            break consume_events(name, &mut event_rx, &quit, &mut handler).await;
                        }
                    },
                    _ = quit.cancelled() => {
                        info!(stream = name, "stream monitor shutting down");
                        break None;
                    }
                    event = event_rx.recv() => match event {
                        Some(event) => {
                            if let Err(err) = handler(event) {
                                break Some(err);
                            }
                        }
                        None => break Some(match stream_err_rx.try_recv() {
                            Ok(source) => MonitorError::StreamExited { stream: name, source },
                            Err(_) => MonitorError::StreamTerminated(name),
                        }),
                    },
                }
            };

            if let Some(err) = exit {
                error!(stream = name, %err, "stream monitor exited");
                report(&errors, err);
            }
        }));

        Ok(())
    }

    /// Signals the task to quit and waits for it to exit. Safe to call more
    /// than once and before `spawn`.
    pub async fn stop(&self) {
        self.quit.cancel();

        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(stream = self.name, %err, "stream monitor task failed");
            }
        }
    }
}

async fn consume_events<T, F>(
    name: &'static str,
    event_rx: &mut mpsc::Receiver<T>,
    quit: &CancellationToken,
    handler: &mut F,
) -> Option<MonitorError>
where
    F: FnMut(T) -> Result<(), MonitorError>,
{
    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(event) => {
                    if let Err(err) = handler(event) {
                        return Some(err);
                    }
                }
                None => return Some(MonitorError::StreamTerminated(name)),
            },
            _ = quit.cancelled() => {
                info!(stream = name, "stream monitor shutting down");
                return None;
            }
        }
    }
}

/// Hands an error to the sink without blocking. The sink is buffered and only
/// the first fatal error matters to the orchestrator.
pub(crate) fn report(errors: &mpsc::Sender<MonitorError>, err: MonitorError) {
    if let Err(err) = errors.try_send(err) {
        debug!(%err, "error sink unavailable, dropping error");
    }
}
