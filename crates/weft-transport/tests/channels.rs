//! Integration tests for the TCP channel and codec robustness.

use std::io::Cursor;
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use weft_transport::codec::{decode_message, encode_message};
use weft_transport::{Channel, DataFrame, FieldPayload, Message, TcpChannel, TransportError};

const TIMEOUT: Duration = Duration::from_secs(5);

fn free_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

// ── TCP ─────────────────────────────────────────────────────────

#[test]
fn tcp_channel_exchanges_frames() {
    let (listener, addr) = free_listener();
    let server = thread::spawn(move || {
        let mut ch = TcpChannel::accept_on(listener, "SolverOne", "SolverTwo", TIMEOUT).unwrap();
        let msg = ch.recv().unwrap();
        ch.send(msg).unwrap();
        assert_eq!(ch.recv().unwrap(), Message::Goodbye);
        ch.send(Message::Goodbye).unwrap();
    });

    let mut ch = TcpChannel::connect("SolverTwo", "SolverOne", &addr, TIMEOUT).unwrap();
    assert_eq!(ch.peer(), "SolverOne");
    let frame = Message::Data(DataFrame {
        window: 1,
        iteration: 1,
        converged: None,
        fields: vec![FieldPayload {
            name: "Velocities".into(),
            values: vec![0.1, 0.2, 0.3],
        }],
    });
    ch.send(frame.clone()).unwrap();
    assert_eq!(ch.recv().unwrap(), frame);
    ch.send(Message::Goodbye).unwrap();
    assert_eq!(ch.recv().unwrap(), Message::Goodbye);
    server.join().unwrap();
}

#[test]
fn tcp_handshake_rejects_wrong_peer() {
    let (listener, addr) = free_listener();
    let server = thread::spawn(move || {
        TcpChannel::accept_on(listener, "SolverOne", "SolverTwo", TIMEOUT)
    });

    let _intruder = TcpChannel::connect("SolverThree", "SolverOne", &addr, TIMEOUT);
    let result = server.join().unwrap();
    assert!(matches!(
        result,
        Err(TransportError::PeerMismatch { ref found, .. }) if found == "SolverThree"
    ));
}

#[test]
fn tcp_connect_gives_up_after_deadline() {
    // Bind and drop to get a port nobody listens on.
    let (listener, addr) = free_listener();
    drop(listener);
    let result = TcpChannel::connect("A", "B", &addr, Duration::from_millis(120));
    assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
}

#[test]
fn tcp_accept_times_out_without_peer() {
    let (listener, _addr) = free_listener();
    let result = TcpChannel::accept_on(listener, "A", "B", Duration::from_millis(120));
    assert!(matches!(result, Err(TransportError::Timeout { .. })));
}

#[test]
fn tcp_recv_waits_past_connect_timeout_when_unbounded() {
    let (listener, addr) = free_listener();
    let server = thread::spawn(move || {
        let mut ch = TcpChannel::accept_on(listener, "SolverOne", "SolverTwo", TIMEOUT).unwrap();
        thread::sleep(Duration::from_millis(400));
        ch.send(Message::Goodbye).unwrap();
        ch
    });

    let short = Duration::from_millis(150);
    let mut ch = TcpChannel::connect("SolverTwo", "SolverOne", &addr, TIMEOUT).unwrap();
    ch.set_recv_timeout(Some(short)).unwrap();
    assert!(matches!(ch.recv(), Err(TransportError::Timeout { .. })));
    ch.set_recv_timeout(None).unwrap();
    assert_eq!(ch.recv().unwrap(), Message::Goodbye);
    drop(server.join().unwrap());
}

// ── Codec properties ────────────────────────────────────────────

fn arb_message() -> impl Strategy<Value = Message> {
    let field = ("[A-Za-z]{1,12}", prop::collection::vec(-1e6f64..1e6, 0..32))
        .prop_map(|(name, values)| FieldPayload { name, values });
    let frame = (
        any::<u32>(),
        any::<u32>(),
        prop::option::of(any::<bool>()),
        prop::collection::vec(field, 0..4),
    )
        .prop_map(|(window, iteration, converged, fields)| {
            Message::Data(DataFrame {
                window,
                iteration,
                converged,
                fields,
            })
        });
    prop_oneof![
        "[A-Za-z0-9]{0,16}".prop_map(|participant| Message::Hello { participant }),
        Just(Message::Goodbye),
        frame,
    ]
}

proptest! {
    #[test]
    fn decoded_message_equals_encoded(msg in arb_message()) {
        let mut buf = Vec::new();
        encode_message(&mut buf, &msg).unwrap();
        let decoded = decode_message(&mut Cursor::new(buf)).unwrap();
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode_message(&mut Cursor::new(bytes));
    }
}
