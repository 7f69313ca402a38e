use std::io::{Read, Write};
use std::net::TcpListener;
use std::time::Duration;

use framesync_frame::{FieldKind, FieldValue, HeaderLayout, PayloadLength, Protocol, Signature};
use framesync_session::{
    ManagedWorker, MessageQueue, QueueError, Reactor, SessionError, TransportSession,
};
use framesync_transport::Transport;

fn protocol() -> Protocol {
    let layout = HeaderLayout::builder()
        .field("seq", FieldKind::U8)
        .field("length", FieldKind::U8)
        .build()
        .unwrap();
    Protocol::new(
        Signature::new(&[0xAA, 0x55]).unwrap(),
        layout,
        PayloadLength::field("length"),
        128,
    )
    .unwrap()
}

#[test]
fn tcp_frames_flow_to_consumer_worker() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let reactor = Reactor::new("framesync-reactor").unwrap();
    let transport = reactor.run(Transport::tcp_connect(addr)).unwrap().unwrap();
    let (mut peer, _) = listener.accept().unwrap();

    let queue = MessageQueue::new();
    let mut session = TransportSession::new(transport, protocol(), queue.clone());
    let task = session.start(reactor.handle()).unwrap();

    let mut consumer = ManagedWorker::spawn("consumer", move || {
        queue
            .iter()
            .map(|frame| (frame.field::<u8>("seq").unwrap(), frame.payload().to_vec()))
            .collect::<Vec<_>>()
    })
    .unwrap();

    let protocol = protocol();
    let mut wire = vec![0x00, 0xAA];
    for seq in 0..20u8 {
        let payload = format!("frame-{seq}");
        wire.extend_from_slice(
            &protocol
                .encode_to_bytes(&[("seq", FieldValue::Unsigned(seq.into()))], payload.as_bytes())
                .unwrap(),
        );
    }
    // Dribble the stream in small pieces to exercise partial reads.
    for chunk in wire.chunks(7) {
        peer.write_all(chunk).unwrap();
    }
    drop(peer);

    let err = task.wait().unwrap_err();
    assert!(matches!(err, SessionError::TransportClosed { discarded: 0, .. }));

    let received = consumer.join().unwrap();
    assert_eq!(received.len(), 20);
    for (i, (seq, payload)) in received.iter().enumerate() {
        assert_eq!(*seq as usize, i);
        assert_eq!(payload, format!("frame-{i}").as_bytes());
    }

    let stats = session.stats();
    assert_eq!(stats.frames_delivered, 20);
    assert_eq!(stats.resync_bytes, 2);
    assert_eq!(stats.bytes_received, wire.len() as u64);
    reactor.shutdown().unwrap();
}

#[test]
fn stop_from_another_thread_ends_session_cleanly() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let reactor = Reactor::new("framesync-reactor-stop").unwrap();
    let transport = reactor.run(Transport::tcp_connect(addr)).unwrap().unwrap();
    let (mut peer, _) = listener.accept().unwrap();

    let mut session = TransportSession::new(transport, protocol(), MessageQueue::new());
    let task = session.start(reactor.handle()).unwrap();

    let write = session.write_frame(&[("seq", FieldValue::Unsigned(9))], b"out").unwrap();
    assert_eq!(write.wait().unwrap(), 7);
    let mut echoed = [0u8; 7];
    peer.read_exact(&mut echoed).unwrap();
    assert_eq!(&echoed, &[0xAA, 0x55, 9, 3, b'o', b'u', b't']);

    // Half a frame, then stop: the partial frame is discarded, not delivered.
    peer.write_all(&[0xAA, 0x55, 1, 10, b'x']).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let stop = session.stop_handle();
    let stopper = ManagedWorker::spawn("stopper", move || stop.stop()).unwrap();
    drop(stopper);

    let summary = task.wait().unwrap();
    assert_eq!(summary.discarded_partial, 5);
    assert_eq!(summary.stats.frames_delivered, 0);
    assert_eq!(summary.stats.bytes_written, 7);
    assert_eq!(session.queue().try_get(Duration::ZERO), Err(QueueError::Closed));

    assert!(matches!(
        session.write(&b"late"[..]),
        Err(SessionError::Cancelled)
    ));
    reactor.shutdown().unwrap();
}
