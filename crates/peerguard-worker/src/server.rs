//! Accept loop: one thread per client session.

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use crate::config::WorkerConfig;
use crate::connection;
use crate::error::WorkerResult;

pub fn bind(config: &WorkerConfig) -> WorkerResult<TcpListener> {
    let listener = TcpListener::bind(&config.listen)?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    Ok(listener)
}

/// Serve sessions until the listener fails.
pub fn run(listener: &TcpListener, config: WorkerConfig) -> WorkerResult<()> {
    let config = Arc::new(config);
    let mut next_session = 0u64;

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        next_session = next_session.wrapping_add(1);
        let session_id = next_session;
        let config = Arc::clone(&config);

        let spawned = thread::Builder::new()
            .name(format!("peerguard-session-{session_id}"))
            .spawn(move || {
                if let Err(e) = connection::serve(stream, &config, session_id) {
                    tracing::warn!(session_id, error = %e, "session ended with error");
                }
            });
        if let Err(e) = spawned {
            tracing::error!(session_id, error = %e, "could not start session thread");
        }
    }
    Ok(())
}
