//! HTTP transport: `ANY /:job_name` starts a job.
//!
//! Responds with `job {name} started` as soon as the work is dispatched, or
//! 503 once shutdown has closed the dispatcher's gate.

use crate::dispatch::{Dispatcher, StopAccepting};
use crate::error::{Error, Result};
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use parking_lot::Mutex;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Build the trigger router around a dispatcher.
pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/:job_name", any(start_job))
        .with_state(dispatcher)
}

async fn start_job(
    State(dispatcher): State<Dispatcher>,
    Path(job_name): Path<String>,
) -> Response {
    match dispatcher.handle_trigger(&job_name) {
        Ok(ack) => (StatusCode::OK, ack.body()).into_response(),
        Err(Error::NotAccepting { phase }) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("not accepting jobs ({phase})"),
        )
            .into_response(),
        Err(e) => {
            error!(job = %job_name, error = %e, "trigger dispatch failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// A running HTTP server that can be told to stop accepting.
pub struct HttpTransport {
    local_addr: SocketAddr,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl HttpTransport {
    /// Bind `addr` and start serving `router` in the background.
    pub async fn bind(addr: SocketAddr, router: Router) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        info!(%local_addr, "listening for triggers");
        Ok(Self {
            local_addr,
            stop: Mutex::new(Some(stop_tx)),
            task: Mutex::new(Some(task)),
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl StopAccepting for HttpTransport {
    /// Stop the listener and wait for in-flight requests to finish.
    ///
    /// Errors if already stopped or if the server task failed.
    async fn stop_accepting(&self) -> Result<()> {
        let stop = self.stop.lock().take();
        let Some(stop) = stop else {
            return Err(Error::Transport("server already stopped".to_string()));
        };
        // The server may have exited on its own; the join below reports why.
        let _ = stop.send(());

        let task = self.task.lock().take();
        let Some(task) = task else {
            return Err(Error::Transport("server task missing".to_string()));
        };
        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Transport(format!("server exited with error: {e}"))),
            Err(e) => Err(Error::Transport(format!("server task failed: {e}"))),
        }
    }
}
