mod common;

use common::ScriptedCaller;
use cycleq::config::{BreakerConfig, DownstreamConfig};
use cycleq::downstream::{
    CircuitBreaker, CircuitState, CommandCaller, DownstreamCaller, DownstreamError,
    ProtectedCaller, RateTracker,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn breaker_config() -> BreakerConfig {
    BreakerConfig {
        request_volume_threshold: 4,
        failure_ratio: 0.5,
        delay_ms: 1000,
        success_threshold: 2,
    }
}

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn breaker_waits_for_volume_before_opening() {
    let breaker = CircuitBreaker::new(breaker_config());

    for _ in 0..3 {
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), CircuitState::Closed);

    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(matches!(breaker.try_acquire(), Err(DownstreamError::CircuitOpen)));
}

#[tokio::test(start_paused = true)]
async fn breaker_stays_closed_below_ratio() {
    let breaker = CircuitBreaker::new(breaker_config());

    for _ in 0..20 {
        breaker.record_success();
        breaker.record_success();
        breaker.record_success();
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(breaker.try_acquire().is_ok());
}

#[tokio::test(start_paused = true)]
async fn breaker_half_opens_after_delay_and_closes_on_successes() {
    let breaker = CircuitBreaker::new(breaker_config());
    for _ in 0..4 {
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(999)).await;
    assert!(breaker.try_acquire().is_err());

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(breaker.try_acquire().is_ok());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);

    // Window was reset: a single failure does not reopen.
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn half_open_failure_reopens() {
    let breaker = CircuitBreaker::new(breaker_config());
    for _ in 0..4 {
        breaker.record_failure();
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(breaker.try_acquire().is_ok());

    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(breaker.try_acquire().is_err());
}

#[test]
fn circuit_state_labels() {
    assert_eq!(CircuitState::Closed.to_string(), "closed");
    assert_eq!(CircuitState::Open.to_string(), "open");
    assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
}

// ---------------------------------------------------------------------------
// Protected caller
// ---------------------------------------------------------------------------

fn downstream_config() -> DownstreamConfig {
    DownstreamConfig {
        timeout_ms: 500,
        rate_warning_threshold: 95,
        breaker: breaker_config(),
    }
}

#[tokio::test(start_paused = true)]
async fn protected_caller_times_out_slow_calls() {
    let caller = ProtectedCaller::new(ScriptedCaller::new(), &downstream_config());

    let err = caller.invoke("slow-call").await.unwrap_err();
    assert!(matches!(err, DownstreamError::Timeout(d) if d == Duration::from_millis(500)));
    assert!(caller.invoke("ok").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn protected_caller_rejects_while_open() {
    let caller = ProtectedCaller::new(ScriptedCaller::new(), &downstream_config());

    for _ in 0..4 {
        assert!(matches!(
            caller.invoke("fail").await,
            Err(DownstreamError::Failed(_))
        ));
    }
    assert_eq!(caller.breaker().state(), CircuitState::Open);
    assert!(matches!(
        caller.invoke("ok").await,
        Err(DownstreamError::CircuitOpen)
    ));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(caller.invoke("ok").await.is_ok());
    assert!(caller.invoke("ok").await.is_ok());
    assert_eq!(caller.breaker().state(), CircuitState::Closed);
}

/// Collects formatted log lines for assertions.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[tokio::test(start_paused = true)]
async fn open_circuit_rejection_is_logged_at_warn() {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let caller = ProtectedCaller::new(ScriptedCaller::new(), &downstream_config());
    for _ in 0..4 {
        let _ = caller.invoke("fail").await;
    }
    assert!(matches!(
        caller.invoke("ok").await,
        Err(DownstreamError::CircuitOpen)
    ));

    let out = logs.contents();
    assert!(out.contains("WARN"), "{out}");
    assert!(out.contains("circuit open, downstream call rejected"), "{out}");
    assert!(out.contains("breaker=\"downstream\""), "{out}");
}

// ---------------------------------------------------------------------------
// Rate tracker
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn rate_tracker_counts_per_second() {
    let rate = RateTracker::new(2);
    assert_eq!(rate.track(), 1);
    assert_eq!(rate.track(), 2);
    // Over threshold: still counted, only warned about.
    assert_eq!(rate.track(), 3);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(rate.track(), 1);
}

// ---------------------------------------------------------------------------
// Command caller
// ---------------------------------------------------------------------------

#[tokio::test]
async fn command_caller_success_on_zero_exit() {
    let caller = CommandCaller::new(Path::new("/bin/cat"), "jobs").unwrap();
    assert!(caller.invoke("{\"job\":1}").await.is_ok());

    let caller = CommandCaller::new(Path::new("/bin/true"), "jobs").unwrap();
    assert!(caller.invoke("").await.is_ok());
}

#[tokio::test]
async fn command_caller_fails_on_nonzero_exit() {
    let caller = CommandCaller::new(Path::new("/bin/false"), "jobs").unwrap();
    match caller.invoke("").await {
        Err(DownstreamError::Failed(msg)) => assert!(msg.contains("status 1")),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn command_caller_reports_missing_binary() {
    let caller = CommandCaller::new(Path::new("no/such/hook"), "jobs").unwrap();
    match caller.invoke("payload").await {
        Err(DownstreamError::Failed(msg)) => assert!(msg.contains("spawn")),
        other => panic!("expected Failed, got {other:?}"),
    }
}
