//! One client session: greeting, watchdog setup and the command loop.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use peerguard_probe::encoder::protocol_version;
use peerguard_watchdog::prelude::*;
use serde_json::json;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::protocol::{Request, parse_hello};

/// How often a running statement checks for cancellation.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Serve one client until it quits, disconnects or is found dead.
///
/// Returns the session's final probe counters.
pub fn serve(
    stream: TcpStream,
    config: &WorkerConfig,
    session_id: u64,
) -> WorkerResult<StatsSnapshot> {
    let peer = stream.peer_addr()?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream.try_clone()?;

    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(StatsSnapshot::default());
    }
    let major = match parse_hello(&line) {
        Ok(major) => major,
        Err(reason) => {
            write_line(&mut writer, &format!("ERR {reason}"))?;
            return Err(WorkerError::AuthenticationFailed(reason));
        }
    };

    let registry = Arc::new(TimerRegistry::with_clock(
        Arc::new(peerguard_watchdog::MonotonicClock),
        config.timer_slots,
    ));
    let session = Arc::new(TcpPeerSession::from_protocol_version(
        stream,
        protocol_version(major, 0),
    ));
    let framing = session.framing();
    let controller = WatchdogController::builder(session)
        .config(config.watchdog)
        .registry(Arc::clone(&registry))
        .build()?;
    let _driver = AlarmDriver::spawn(registry, format!("peerguard-alarm-{session_id}"))?;

    controller.on_authenticated(AuthStatus::Ok)?;
    write_line(&mut writer, &format!("OK {framing}"))?;
    tracing::info!(session_id, %peer, %framing, "session started");

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::info!(session_id, error = %e, "peer went away");
                break;
            }
        }
        let request = match Request::parse(&line) {
            Ok(request) => request,
            Err(reason) => {
                if !send_reply(&mut writer, &format!("ERR {reason}")) {
                    break;
                }
                continue;
            }
        };

        controller.on_unit_of_work(request.kind())?;
        let Some(reply) = execute(&controller, &request) else {
            send_reply(&mut writer, "BYE");
            break;
        };
        if !send_reply(&mut writer, &reply) {
            break;
        }
    }

    let stats = controller.stats();
    tracing::info!(session_id, ?stats, "session ended");
    Ok(stats)
}

/// Write `text` and its newline as one buffer, so a status frame written by the
/// alarm thread can only land between lines.
fn write_line(writer: &mut TcpStream, text: &str) -> std::io::Result<()> {
    writer.write_all(format!("{text}\n").as_bytes())
}

/// Write one reply line. `false` means the peer can no longer be reached.
fn send_reply(writer: &mut TcpStream, reply: &str) -> bool {
    match write_line(writer, reply) {
        Ok(()) => true,
        Err(e) => {
            tracing::info!(error = %e, "reply not delivered; peer went away");
            false
        }
    }
}

/// Run one request. `None` ends the session.
fn execute(controller: &WatchdogController, request: &Request) -> Option<String> {
    let reply = match *request {
        Request::Sleep { secs } => {
            match run_statement(controller.token(), Duration::from_secs(secs)) {
                Ok(elapsed) => format!("DONE {}", elapsed.as_millis()),
                Err(Cancelled) => {
                    let previous = controller.reset_for_next_unit();
                    tracing::warn!(%previous, "statement cancelled");
                    "CANCELLED".to_string()
                }
            }
        }
        Request::Ping => "PONG".to_string(),
        Request::SetEnabled(enabled) => {
            controller.set_enabled(enabled);
            "OK".to_string()
        }
        Request::SetInterval(secs) => match controller.set_interval_secs(secs) {
            Ok(()) => "OK".to_string(),
            Err(e) => format!("ERR {e}"),
        },
        Request::Show => json!({
            "config": controller.config(),
            "state": controller.state().as_str(),
            "stats": controller.stats(),
        })
        .to_string(),
        Request::Quit => return None,
    };
    Some(reply)
}

/// Stand-in for real work: sleeps in small steps, honouring cancellation.
pub fn run_statement(token: &CancelToken, duration: Duration) -> Result<Duration, Cancelled> {
    let started = Instant::now();
    loop {
        token.check()?;
        let elapsed = started.elapsed();
        let Some(left) = duration.checked_sub(elapsed).filter(|d| !d.is_zero()) else {
            return Ok(elapsed);
        };
        thread::sleep(left.min(CANCEL_POLL_INTERVAL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::read_reply;
    use std::io::BufReader;
    use std::net::TcpListener;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    struct Client {
        reader: BufReader<TcpStream>,
        writer: TcpStream,
    }

    impl Client {
        fn send(&mut self, line: &str) -> TestResult {
            writeln!(self.writer, "{line}")?;
            Ok(())
        }

        fn reply(&mut self) -> Result<String, Box<dyn std::error::Error>> {
            Ok(read_reply(&mut self.reader)?.ok_or("connection closed")?)
        }
    }

    type Started = (Client, thread::JoinHandle<WorkerResult<StatsSnapshot>>);

    fn start(config: WorkerConfig) -> Result<Started, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let client = TcpStream::connect(listener.local_addr()?)?;
        let (server, _) = listener.accept()?;
        let handle = thread::spawn(move || serve(server, &config, 1));
        client.set_read_timeout(Some(Duration::from_secs(10)))?;
        Ok((
            Client {
                reader: BufReader::new(client.try_clone()?),
                writer: client,
            },
            handle,
        ))
    }

    #[test]
    fn statement_runs_to_completion() -> TestResult {
        let token = CancelToken::new();
        let elapsed = run_statement(&token, Duration::from_millis(150));
        assert!(matches!(elapsed, Ok(d) if d >= Duration::from_millis(150)));
        Ok(())
    }

    #[test]
    fn statement_observes_cancellation() {
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            canceller.request();
        });

        let started = Instant::now();
        assert_eq!(run_statement(&token, Duration::from_secs(10)), Err(Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(handle.join().is_ok());
    }

    #[test]
    fn greeting_is_required() -> TestResult {
        let (mut client, handle) = start(WorkerConfig::default())?;
        client.send("PING")?;
        assert!(client.reply()?.starts_with("ERR"));

        let result = handle.join().map_err(|_panic| "server panicked")?;
        assert!(matches!(result, Err(WorkerError::AuthenticationFailed(_))));
        Ok(())
    }

    #[test]
    fn session_commands() -> TestResult {
        let (mut client, handle) = start(WorkerConfig::default())?;
        client.send("HELLO 3")?;
        assert_eq!(client.reply()?, "OK modern");

        client.send("PING")?;
        assert_eq!(client.reply()?, "PONG");

        client.send("SET interval 7")?;
        assert_eq!(client.reply()?, "OK");

        client.send("SLEEP 0")?;
        assert!(client.reply()?.starts_with("DONE"));

        client.send("NOPE")?;
        assert!(client.reply()?.starts_with("ERR"));

        client.send("SHOW")?;
        let shown: serde_json::Value = serde_json::from_str(&client.reply()?)?;
        assert_eq!(shown["config"]["interval_secs"], 7);
        assert_eq!(shown["config"]["enabled"], false);
        assert_eq!(shown["state"], "Idle");

        client.send("QUIT")?;
        assert_eq!(client.reply()?, "BYE");
        assert!(handle.join().map_err(|_panic| "server panicked")?.is_ok());
        Ok(())
    }

    #[test]
    fn legacy_greeting_selects_legacy_framing() -> TestResult {
        let (mut client, handle) = start(WorkerConfig::default())?;
        client.send("HELLO 2")?;
        assert_eq!(client.reply()?, "OK legacy");
        client.send("QUIT")?;
        assert_eq!(client.reply()?, "BYE");
        assert!(handle.join().map_err(|_panic| "server panicked")?.is_ok());
        Ok(())
    }

    #[test]
    fn replies_survive_interleaved_status_frames() -> TestResult {
        let mut config = WorkerConfig::default();
        config.watchdog.enabled = true;
        config.watchdog.interval_secs = 1;

        let (mut client, handle) = start(config)?;
        client.send("HELLO 3")?;
        assert_eq!(client.reply()?, "OK modern");

        client.send("SLEEP 3")?;
        assert!(client.reply()?.starts_with("DONE"));
        client.send("PING")?;
        assert_eq!(client.reply()?, "PONG");
        client.send("QUIT")?;
        assert_eq!(client.reply()?, "BYE");

        let stats = handle.join().map_err(|_panic| "server panicked")??;
        assert!(stats.probes_sent >= 1);
        assert_eq!(stats.cancellations, 0);
        Ok(())
    }

    #[test]
    fn vanished_client_cancels_statement() -> TestResult {
        let mut config = WorkerConfig::default();
        config.watchdog.enabled = true;
        config.watchdog.interval_secs = 1;

        let (mut client, handle) = start(config)?;
        client.send("HELLO 3")?;
        assert_eq!(client.reply()?, "OK modern");
        client.send("SLEEP 30")?;
        drop(client);

        let started = Instant::now();
        let stats = handle.join().map_err(|_panic| "server panicked")??;
        assert!(started.elapsed() < Duration::from_secs(20));
        assert_eq!(stats.cancellations, 1);
        assert!(stats.failures >= 1);
        Ok(())
    }
}
