use std::net::UdpSocket;
use std::time::{Duration, Instant};

use linetrace::ingest::Scene;
use linetrace::{
    CommandChannel, ControlLoop, ControlSettings, FrameSource, RecordingActuator, Segmenter,
    SegmenterConfig, StaticColorRange, SyntheticSource, UdpCommandChannel,
};

fn poll_until_some(channel: &mut UdpCommandChannel) -> Option<u8> {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if let Some(byte) = channel.poll() {
            return Some(byte);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    None
}

#[test]
fn datagram_bytes_are_delivered_one_per_poll() {
    let mut channel = UdpCommandChannel::bind("127.0.0.1:0").unwrap();
    let addr = channel.local_addr().unwrap();
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

    assert_eq!(channel.poll(), None);
    sender.send_to(b"1w", addr).unwrap();
    assert_eq!(poll_until_some(&mut channel), Some(b'1'));
    assert_eq!(channel.poll(), Some(b'w'));
    assert_eq!(channel.poll(), None);
}

#[test]
fn operator_quit_over_udp_ends_the_run() {
    let channel = UdpCommandChannel::bind("127.0.0.1:0").unwrap();
    let addr = channel.local_addr().unwrap();

    let mut source = SyntheticSource::new(Scene::Floor, 0, 100);
    source.connect().unwrap();
    let segmenter =
        Segmenter::new(SegmenterConfig::default(), StaticColorRange::default()).unwrap();
    let mut control = ControlLoop::new(
        source,
        channel,
        RecordingActuator::new(),
        segmenter,
        ControlSettings::default(),
    );

    let sender = std::thread::spawn(move || {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        std::thread::sleep(Duration::from_millis(50));
        socket.send_to(b"t", addr).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        socket.send_to(b"q", addr).unwrap();
    });

    let summary = control.run().unwrap();
    sender.join().unwrap();

    assert!(summary.cycles >= 2);
    assert_eq!(
        control.actuator().commands,
        vec![linetrace::ActuatorCommand::Takeoff]
    );
}
