use super::*;
use std::{
    os::unix::net::UnixStream,
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

fn wait_until(what: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !what() {
        assert!(Instant::now() < deadline, "condition not reached");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_suspend_waits_for_requests_in_flight() {
    let gate = SuspendGate::new();
    thread::scope(|s| {
        let busy = gate.begin_request();
        let start = Instant::now();
        s.spawn(move || {
            thread::sleep(Duration::from_millis(200));
            drop(busy);
        });
        gate.suspend();
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(gate.is_suspended());
        gate.resume();
    });
}

#[test]
fn test_suspended_gate_parks_workers() {
    let gate = SuspendGate::new();
    gate.suspend();
    let (tx, rx) = mpsc::channel();
    thread::scope(|s| {
        s.spawn(|| {
            let _busy = gate.begin_request();
            tx.send(()).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        gate.resume();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    });
}

#[test]
fn test_snapshot_socket() {
    let gate = SuspendGate::new();
    let (mut launcher, secure_env) = UnixStream::pair().unwrap();
    thread::scope(|s| {
        let server = s.spawn(|| serve(secure_env, &gate));

        launcher.write_all(&[SUSPEND]).unwrap();
        let mut ack = [0u8];
        launcher.read_exact(&mut ack).unwrap();
        assert_eq!(ack[0], SUSPEND_ACK);
        assert!(gate.is_suspended());

        launcher.write_all(&[RESUME]).unwrap();
        wait_until(|| !gate.is_suspended());

        drop(launcher);
        server.join().unwrap();
    });
}

#[test]
fn test_snapshot_socket_bad_command_resumes() {
    let gate = SuspendGate::new();
    let (mut launcher, secure_env) = UnixStream::pair().unwrap();
    thread::scope(|s| {
        let server = s.spawn(|| serve(secure_env, &gate));
        launcher.write_all(&[SUSPEND]).unwrap();
        let mut ack = [0u8];
        launcher.read_exact(&mut ack).unwrap();
        launcher.write_all(&[SUSPEND_ACK]).unwrap();
        server.join().unwrap();
    });
    assert!(!gate.is_suspended());
}
