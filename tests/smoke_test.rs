// tests/smoke_test.rs

//! Smoke test state machine against an in-process fake MPD.

mod common;

use common::{FakeMpd, FakeMpdLauncher, LINUX_BANNER, fake_installed_bin};
use mpd_kitchen::recipe::bundled_recipe;
use mpd_kitchen::{Error, OsFamily, Platform, Verifier, VerifyState};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;

fn verifier(launcher: &Arc<FakeMpdLauncher>, platform: Platform) -> Verifier {
    Verifier::new(platform)
        .with_launcher(launcher.clone())
        .with_banner_timeout(Duration::from_millis(500))
        .with_io_timeout(Duration::from_secs(2))
}

fn linux() -> Platform {
    Platform::new(OsFamily::Linux, None)
}

#[test]
fn test_healthy_daemon_passes() {
    let tmp = TempDir::new().unwrap();
    let (_keg, bin) = fake_installed_bin(tmp.path());
    let recipe = bundled_recipe().unwrap();
    let launcher = Arc::new(FakeMpdLauncher::new(FakeMpd::Healthy));

    let report = verifier(&launcher, linux()).verify(&recipe, &bin).unwrap();

    assert!(report.passed());
    assert_eq!(
        report.history,
        vec![
            VerifyState::NotStarted,
            VerifyState::ProcessSpawned,
            VerifyState::AwaitingBanner,
            VerifyState::ConnectionOpen,
            VerifyState::PingSent,
            VerifyState::PingAcknowledged,
            VerifyState::Closed,
        ]
    );
    assert_eq!(report.banner.as_deref(), Some(LINUX_BANNER));
    assert_eq!(report.greeting.as_deref(), Some("OK MPD 0.23.5"));
    assert_eq!(report.response.as_deref(), Some("OK"));

    // Daemon got the generated config and was stopped afterwards
    let args = launcher.launched_args.lock().unwrap().clone();
    assert_eq!(&args[..2], &["--stdout".to_string(), "--no-daemon".to_string()]);
    assert!(args[2].ends_with("mpd.conf"));
    assert_eq!(launcher.received.lock().unwrap().as_slice(), &["ping".to_string()]);
    assert!(launcher.terminated.load(Ordering::SeqCst));
}

#[test]
fn test_silent_daemon_times_out_without_connecting() {
    let tmp = TempDir::new().unwrap();
    let (_keg, bin) = fake_installed_bin(tmp.path());
    let recipe = bundled_recipe().unwrap();
    let launcher = Arc::new(FakeMpdLauncher::new(FakeMpd::Silent));

    let err = verifier(&launcher, linux()).verify(&recipe, &bin).unwrap_err();

    assert!(
        matches!(err, Error::VerificationTimeout { ref waiting_for, .. } if waiting_for.contains("banner")),
        "got {:?}",
        err
    );
    assert_eq!(launcher.connections.load(Ordering::SeqCst), 0);
    assert!(launcher.terminated.load(Ordering::SeqCst));
}

#[test]
fn test_wrong_greeting_is_a_protocol_mismatch() {
    let tmp = TempDir::new().unwrap();
    let (_keg, bin) = fake_installed_bin(tmp.path());
    let recipe = bundled_recipe().unwrap();
    let launcher = Arc::new(FakeMpdLauncher::new(FakeMpd::WrongGreeting));

    let err = verifier(&launcher, linux()).verify(&recipe, &bin).unwrap_err();

    match err {
        Error::VerificationProtocolMismatch { expected, got } => {
            assert_eq!(expected, "OK MPD");
            assert!(got.starts_with("SSH-2.0"));
        }
        other => panic!("expected protocol mismatch, got {:?}", other),
    }
    // No command is sent after a bad greeting
    assert!(launcher.received.lock().unwrap().is_empty());
    assert!(launcher.terminated.load(Ordering::SeqCst));
}

#[test]
fn test_rejected_ping_is_a_protocol_mismatch() {
    let tmp = TempDir::new().unwrap();
    let (_keg, bin) = fake_installed_bin(tmp.path());
    let recipe = bundled_recipe().unwrap();
    let launcher = Arc::new(FakeMpdLauncher::new(FakeMpd::RejectsPing));

    let err = verifier(&launcher, linux()).verify(&recipe, &bin).unwrap_err();

    match err {
        Error::VerificationProtocolMismatch { got, .. } => assert!(got.starts_with("ACK")),
        other => panic!("expected protocol mismatch, got {:?}", other),
    }
    assert_eq!(launcher.connections.load(Ordering::SeqCst), 1);
}

#[test]
fn test_daemon_exit_before_banner_fails() {
    let tmp = TempDir::new().unwrap();
    let (_keg, bin) = fake_installed_bin(tmp.path());
    let recipe = bundled_recipe().unwrap();
    let launcher = Arc::new(FakeMpdLauncher::new(FakeMpd::Crashes));

    let err = verifier(&launcher, linux()).verify(&recipe, &bin).unwrap_err();

    match err {
        Error::VerificationProtocolMismatch { got, .. } => {
            assert!(got.contains("Failed to open audio output"));
        }
        other => panic!("expected protocol mismatch, got {:?}", other),
    }
}

#[test]
fn test_skipped_on_linux_ci() {
    let tmp = TempDir::new().unwrap();
    let (_keg, bin) = fake_installed_bin(tmp.path());
    let recipe = bundled_recipe().unwrap();
    let launcher = Arc::new(FakeMpdLauncher::new(FakeMpd::Healthy));
    let platform = linux().with_env("HOMEBREW_GITHUB_ACTIONS");

    let report = verifier(&launcher, platform).verify(&recipe, &bin).unwrap();

    assert!(report.skipped());
    assert!(!report.passed());
    assert_eq!(report.state(), VerifyState::Skipped);
    assert!(report.skip_reason.unwrap().contains("HOMEBREW_GITHUB_ACTIONS"));
    // Never launched
    assert!(launcher.launched_args.lock().unwrap().is_empty());
}

#[test]
fn test_not_skipped_on_macos_ci() {
    let tmp = TempDir::new().unwrap();
    let (_keg, bin) = fake_installed_bin(tmp.path());
    let recipe = bundled_recipe().unwrap();
    let launcher = Arc::new(FakeMpdLauncher::new(FakeMpd::Healthy));
    let platform = Platform::new(OsFamily::Macos, Some("13.0")).with_env("HOMEBREW_GITHUB_ACTIONS");

    // The fake prints the Linux banner, which the macOS override does not match
    let err = verifier(&launcher, platform).verify(&recipe, &bin).unwrap_err();
    assert!(matches!(err, Error::VerificationTimeout { .. }), "got {:?}", err);
    assert!(!launcher.launched_args.lock().unwrap().is_empty());
}

#[test]
fn test_refuses_without_installed_binary() {
    let tmp = TempDir::new().unwrap();
    let recipe = bundled_recipe().unwrap();
    let launcher = Arc::new(FakeMpdLauncher::new(FakeMpd::Healthy));

    let err = verifier(&launcher, linux())
        .verify(&recipe, &tmp.path().join("bin"))
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(_)), "got {:?}", err);
    assert!(launcher.launched_args.lock().unwrap().is_empty());
}

#[test]
fn test_repeated_runs_pass() {
    let tmp = TempDir::new().unwrap();
    let (_keg, bin) = fake_installed_bin(tmp.path());
    let recipe = bundled_recipe().unwrap();

    let first = verifier(&Arc::new(FakeMpdLauncher::new(FakeMpd::Healthy)), linux())
        .verify(&recipe, &bin)
        .unwrap();
    let second = verifier(&Arc::new(FakeMpdLauncher::new(FakeMpd::Healthy)), linux())
        .verify(&recipe, &bin)
        .unwrap();

    assert!(first.passed());
    assert!(second.passed());
    assert!(first.port.is_some() && second.port.is_some());
}
