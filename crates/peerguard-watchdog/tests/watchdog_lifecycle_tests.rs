//! End-to-end watchdog lifecycle over a real loopback TCP connection.

use peerguard_watchdog::prelude::*;
use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn connected_pair() -> std::io::Result<(TcpStream, TcpStream)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let client = TcpStream::connect(listener.local_addr()?)?;
    let (server, _) = listener.accept()?;
    Ok((server, client))
}

fn start_watchdog(
    server: TcpStream,
    framing: FramingVariant,
    interval_secs: u32,
) -> Result<(Arc<WatchdogController>, AlarmDriver), Box<dyn std::error::Error>> {
    let session = Arc::new(TcpPeerSession::new(server, framing));
    let controller = WatchdogController::builder(session)
        .config(
            WatchdogConfig::builder()
                .enabled(true)
                .interval_secs(interval_secs)
                .build()?,
        )
        .build()?;
    let driver = AlarmDriver::spawn(Arc::clone(controller.registry()), "test-alarm")?;
    controller.on_authenticated(AuthStatus::Ok)?;
    Ok((controller, driver))
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

/// Stand-in for a long-running statement that polls for cancellation.
fn run_unit_of_work(token: CancelToken, budget: Duration) -> Result<Duration, Cancelled> {
    let started = Instant::now();
    while started.elapsed() < budget {
        token.check()?;
        thread::sleep(Duration::from_millis(50));
    }
    Ok(started.elapsed())
}

#[test]
fn test_peer_loss_cancels_running_work() -> TestResult {
    let (server, client) = connected_pair()?;
    let (controller, _driver) = start_watchdog(server, FramingVariant::Modern, 1)?;

    assert!(controller.on_unit_of_work(CommandKind::Statement)?);
    let token = controller.token().clone();
    let executor = thread::spawn(move || run_unit_of_work(token, Duration::from_secs(15)));

    // First probe at ~1s reaches a live peer.
    assert!(wait_until(Duration::from_secs(5), || controller.stats().probes_sent >= 1));
    assert!(controller.stats().cancellations == 0);

    // Closing with the probe still unread resets the connection.
    drop(client);

    let outcome = executor.join().map_err(|_panic| "executor panicked")?;
    assert_eq!(outcome, Err(Cancelled));

    let stats = controller.stats();
    assert_eq!(stats.cancellations, 1);
    assert!(stats.failures >= 1);
    assert_eq!(controller.state(), WatchdogState::CancelRequested);
    assert!(controller.token().is_requested());
    Ok(())
}

#[test]
fn test_live_peer_receives_parameter_status_probes() -> TestResult {
    let (server, mut client) = connected_pair()?;
    let (controller, _driver) = start_watchdog(server, FramingVariant::Modern, 1)?;
    controller.on_unit_of_work(CommandKind::Statement)?;

    client.set_read_timeout(Some(Duration::from_secs(5)))?;
    for _ in 0..2 {
        let mut header = [0u8; 5];
        client.read_exact(&mut header)?;
        assert_eq!(header[0], b'S');

        let declared = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        let mut body = vec![0u8; declared as usize - 4];
        client.read_exact(&mut body)?;
        assert_eq!(body.iter().filter(|b| **b == 0).count(), 2);
    }

    // The counters are updated after the write returns, so they may lag the
    // bytes the client has already read.
    assert!(wait_until(Duration::from_secs(5), || {
        controller.stats().probes_sent >= 2 && controller.state() == WatchdogState::Idle
    }));
    assert_eq!(controller.stats().cancellations, 0);
    Ok(())
}

#[test]
fn test_legacy_peer_receives_notice() -> TestResult {
    let (server, mut client) = connected_pair()?;
    let (controller, _driver) = start_watchdog(server, FramingVariant::Legacy, 0)?;
    controller.on_unit_of_work(CommandKind::Statement)?;

    client.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut tag = [0u8; 1];
    client.read_exact(&mut tag)?;
    assert_eq!(tag[0], b'N');

    // Stop the rapid zero-interval probing before the peer goes away.
    controller.set_enabled(false);
    Ok(())
}

#[test]
fn test_reset_allows_next_unit_of_work() -> TestResult {
    let (server, client) = connected_pair()?;
    let (controller, _driver) = start_watchdog(server, FramingVariant::Modern, 1)?;
    controller.on_unit_of_work(CommandKind::Statement)?;
    drop(client);

    assert!(wait_until(Duration::from_secs(10), || {
        controller.state() == WatchdogState::CancelRequested
    }));
    assert!(!controller.on_unit_of_work(CommandKind::Statement)?);

    assert_eq!(controller.reset_for_next_unit(), WatchdogState::CancelRequested);
    assert!(controller.token().check().is_ok());
    assert!(controller.on_unit_of_work(CommandKind::Statement)?);
    Ok(())
}

#[test]
fn test_utility_commands_do_not_arm() -> TestResult {
    let (server, _client) = connected_pair()?;
    let (controller, _driver) = start_watchdog(server, FramingVariant::Modern, 1)?;

    assert!(!controller.on_unit_of_work(CommandKind::Utility)?);
    thread::sleep(Duration::from_millis(1500));
    assert_eq!(controller.stats().attempts(), 0);
    Ok(())
}
