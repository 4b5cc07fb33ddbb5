//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Telling every open connection to finish the request it is serving and
//!    close. Idle keep-alive connections close at once.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.

use std::future::Future;
use std::net::SocketAddr;

use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{error, info};

use crate::adapter::HyperService;
use crate::error::{BoxError, Error};
use crate::handler::Handler;

enum Bind {
    Addr(SocketAddr),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
}

impl Server {
    /// Configures the server to bind to `addr` when serving starts.
    ///
    /// ```rust
    /// use gatehouse::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr.parse().map_err(|_| Error::Addr(addr.to_owned()))?;
        Ok(Self { bind: Bind::Addr(addr) })
    }

    /// Serves on an already-bound listener.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { bind: Bind::Listener(listener) }
    }

    /// The address the server will listen on. For a listener bound to port
    /// `0` this is the port the OS picked.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        match &self.bind {
            Bind::Addr(addr) => Ok(*addr),
            Bind::Listener(listener) => Ok(listener.local_addr()?),
        }
    }

    /// Starts accepting connections and dispatching them to `handler`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, handler: impl Handler) -> Result<(), Error> {
        self.serve_with_shutdown(handler, shutdown_signal()).await
    }

    /// Like [`serve`](Self::serve), but stops accepting when `signal`
    /// resolves instead of on a process signal.
    pub async fn serve_with_shutdown(
        self,
        handler: impl Handler,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), Error> {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(listener) => listener,
        };
        let service = HyperService::new(handler);

        info!(addr = %listener.local_addr()?, "gatehouse listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        // Flipped once on shutdown. Every connection watches it and finishes
        // its in-flight request, then closes instead of waiting for the next
        // keep-alive request.
        let (drain_tx, drain_rx) = watch::channel(false);

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal immediately stops accepting
                // new connections, even if more are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let service = service.clone();
                    let drain = drain_rx.clone();

                    tasks.spawn(async move {
                        if let Err(e) = serve_connection(TokioIo::new(stream), service, drain).await {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Drop the listener so late connects are refused rather than queued.
        drop(listener);
        let _ = drain_tx.send(true);

        // Drain: wait for every in-flight connection to finish before we return.
        while tasks.join_next().await.is_some() {}

        info!("gatehouse stopped");
        Ok(())
    }
}

/// Serves one connection until the client closes it or `drain` flips, in
/// which case the request in flight (if any) completes and the connection
/// closes.
async fn serve_connection(
    io: TokioIo<TcpStream>,
    service: HyperService,
    mut drain: watch::Receiver<bool>,
) -> Result<(), BoxError> {
    // `auto::Builder` transparently handles both HTTP/1.1 and HTTP/2,
    // whatever the client negotiates.
    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(io, service);
    tokio::pin!(conn);

    let mut draining = *drain.borrow();
    if draining {
        conn.as_mut().graceful_shutdown();
    }
    loop {
        tokio::select! {
            res = conn.as_mut() => return res,
            // A closed channel means the server is gone; shut down too.
            _ = drain.changed(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C). On
/// Windows only Ctrl-C is available. A handler that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_address_is_an_error() {
        assert!(matches!(Server::bind("not an address"), Err(Error::Addr(_))));
    }

    #[tokio::test]
    async fn local_addr_reports_the_picked_port() {
        let bound = Server::bind("127.0.0.1:8080").unwrap();
        assert_eq!(bound.local_addr().unwrap().port(), 8080);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert_eq!(Server::from_listener(listener).local_addr().unwrap().port(), port);
    }
}
