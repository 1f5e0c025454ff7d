//! OS termination signals.
//!
//! On unix, listens for SIGINT and SIGTERM. Elsewhere, Ctrl+C. Handlers are
//! installed once at subscription and keep delivering, so repeated signals
//! arrive as repeated `recv` results rather than killing the process.

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Which termination request arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Interrupt,
    Terminate,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Termination::Interrupt => "SIGINT",
            Termination::Terminate => "SIGTERM",
        };
        write!(f, "{s}")
    }
}

/// Subscription to the process's termination signals.
#[derive(Debug)]
pub struct Signals {
    #[cfg(unix)]
    interrupt: Signal,
    #[cfg(unix)]
    terminate: Signal,
}

impl Signals {
    /// Install the signal handlers.
    pub fn subscribe() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next termination signal.
    ///
    /// Returns `None` if the signal streams have closed.
    pub async fn recv(&mut self) -> Option<Termination> {
        #[cfg(unix)]
        {
            tokio::select! {
                sig = self.interrupt.recv() => sig.map(|()| Termination::Interrupt),
                sig = self.terminate.recv() => sig.map(|()| Termination::Terminate),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .ok()
                .map(|()| Termination::Interrupt)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sigterm_to_own_process_is_received() {
        let mut signals = Signals::subscribe().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let received = tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .expect("SIGTERM was not delivered");
        assert_eq!(received, Some(Termination::Terminate));
    }
}
