use libnetdump::{
    decode, CaptureConfig, CaptureLoop, DecodeError, DecodedPacket, FieldValue, LoopState, Mode,
    PacketHandler, SourceSelector, StopReason,
};
use libnetdump_tools::{
    CaptureHandle, Error, FileHandle, Frame, LinkType, NextFrame, Stage, Timestamp,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("libnetdump-{}-{name}", std::process::id()))
}

const TCP: u8 = 6;
const UDP: u8 = 17;

/// Ethernet + IPv4 + TCP or UDP, with a small payload
fn eth_ipv4(proto: u8, sport: u16, dport: u16) -> Vec<u8> {
    let l4_len: usize = if proto == TCP { 20 } else { 8 };
    let payload = b"netdump";
    let total_length = (20 + l4_len + payload.len()) as u16;
    let mut v = vec![
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0x08, 0x00,
    ];
    v.extend_from_slice(&[0x45, 0x00]);
    v.extend_from_slice(&total_length.to_be_bytes());
    v.extend_from_slice(&[0x12, 0x34, 0x40, 0x00, 64, proto, 0x00, 0x00]);
    v.extend_from_slice(&[10, 0, 0, 1, 10, 0, 0, 2]);
    v.extend_from_slice(&sport.to_be_bytes());
    v.extend_from_slice(&dport.to_be_bytes());
    if proto == TCP {
        v.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0, 0x50, 0x18, 0xff, 0xff, 0, 0, 0, 0]);
    } else {
        v.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        v.extend_from_slice(&[0, 0]);
    }
    v.extend_from_slice(payload);
    v
}

fn frame(i: u32, data: Vec<u8>) -> Frame {
    Frame::new(
        Timestamp::new(1_600_000_000 + i, i * 1000),
        LinkType::Ethernet,
        data,
    )
}

/// Five frames, two of which are TCP with port 80
fn sample_frames() -> Vec<Frame> {
    vec![
        frame(0, eth_ipv4(TCP, 40000, 80)),
        frame(1, eth_ipv4(TCP, 80, 40000)),
        frame(2, eth_ipv4(TCP, 40001, 443)),
        frame(3, eth_ipv4(UDP, 53, 80)),
        frame(4, eth_ipv4(TCP, 5555, 8080)),
    ]
}

fn write_capture(name: &str, frames: &[Frame]) -> PathBuf {
    let path = temp_path(name);
    let mut sink = FileHandle::create(path.to_str().expect("path"), LinkType::Ethernet)
        .expect("create capture");
    sink.activate().expect("activate sink");
    for f in frames {
        sink.write_frame(f).expect("write frame");
    }
    sink.close();
    path
}

fn read_capture(path: &PathBuf) -> Vec<Frame> {
    let mut source = FileHandle::open(path.to_str().expect("path")).expect("open capture");
    source.activate().expect("activate source");
    let mut frames = Vec::new();
    loop {
        match source.next_frame().expect("next frame") {
            NextFrame::Frame(f) => frames.push(f),
            NextFrame::TimedOut => (),
            NextFrame::EndOfStream => break,
        }
    }
    frames
}

/// Keeps owned copies of what the loop emitted
#[derive(Default)]
struct Collect {
    seen: Vec<(u64, Frame, Vec<&'static str>, bool)>,
    errors: Vec<(u64, DecodeError)>,
}

impl PacketHandler for Collect {
    fn handle_packet(
        &mut self,
        index: u64,
        frame: &Frame,
        packet: &DecodedPacket,
    ) -> Result<(), Error> {
        let names = packet.layers.iter().map(|l| l.name).collect();
        self.seen
            .push((index, frame.clone(), names, packet.is_incomplete()));
        Ok(())
    }

    fn handle_decode_error(
        &mut self,
        index: u64,
        _frame: &Frame,
        error: &DecodeError,
    ) -> Result<(), Error> {
        self.errors.push((index, error.clone()));
        Ok(())
    }
}

#[test]
fn tcp_port_80_is_filtered() {
    let frames = sample_frames();
    let path = write_capture("port80.pcap", &frames);
    let config =
        CaptureConfig::new(SourceSelector::File(path.clone()), Mode::Print).with_filter("tcp port 80");
    let mut capture = CaptureLoop::new(config);
    assert_eq!(capture.state(), LoopState::Idle);
    let mut handler = Collect::default();
    let running = AtomicBool::new(true);
    let summary = capture.run(&mut handler, &running).expect("run");

    assert_eq!(capture.state(), LoopState::Stopped);
    assert_eq!(summary.stop, StopReason::EndOfStream);
    assert_eq!(summary.frames_read, 5);
    assert_eq!(summary.frames_admitted, 2);
    assert_eq!(summary.frames_filtered, 3);
    assert_eq!(summary.decode_errors, 0);

    assert_eq!(handler.seen.len(), 2);
    assert_eq!(handler.seen[0].0, 1);
    assert_eq!(handler.seen[0].1, frames[0]);
    assert_eq!(handler.seen[1].0, 2);
    assert_eq!(handler.seen[1].1, frames[1]);
    assert_eq!(
        handler.seen[0].2,
        vec!["ethernet", "ipv4", "tcp", "payload"]
    );
    let _ = std::fs::remove_file(path);
}

#[test]
fn count_limit_stops_early() {
    let frames = sample_frames();
    let path = write_capture("count.pcap", &frames);
    let config = CaptureConfig::new(SourceSelector::File(path.clone()), Mode::Print).with_count(2);
    let mut capture = CaptureLoop::new(config);
    let mut handler = Collect::default();
    let running = AtomicBool::new(true);
    let summary = capture.run(&mut handler, &running).expect("run");

    assert_eq!(capture.state(), LoopState::Stopped);
    assert_eq!(summary.stop, StopReason::CountReached);
    assert_eq!(summary.frames_read, 2);
    let indexes: Vec<u64> = handler.seen.iter().map(|s| s.0).collect();
    assert_eq!(indexes, vec![1, 2]);
    assert_eq!(handler.seen[1].1, frames[1]);
    let _ = std::fs::remove_file(path);
}

#[test]
fn count_applies_to_admitted_frames() {
    let frames = sample_frames();
    let path = write_capture("count-filter.pcap", &frames);
    let config = CaptureConfig::new(SourceSelector::File(path.clone()), Mode::Print)
        .with_filter("udp")
        .with_count(1);
    let mut capture = CaptureLoop::new(config);
    let mut handler = Collect::default();
    let running = AtomicBool::new(true);
    let summary = capture.run(&mut handler, &running).expect("run");
    assert_eq!(summary.stop, StopReason::CountReached);
    assert_eq!(summary.frames_read, 4);
    assert_eq!(summary.frames_filtered, 3);
    assert_eq!(handler.seen.len(), 1);
    assert_eq!(handler.seen[0].1, frames[3]);
    let _ = std::fs::remove_file(path);
}

#[test]
fn forward_mode_writes_admitted_frames() {
    let frames = sample_frames();
    let input = write_capture("forward-in.pcap", &frames);
    let output = temp_path("forward-out.pcap");
    let config = CaptureConfig::new(
        SourceSelector::File(input.clone()),
        Mode::Forward {
            path: output.clone(),
        },
    )
    .with_filter("tcp port 80");
    let mut capture = CaptureLoop::new(config);
    let mut handler = Collect::default();
    let running = AtomicBool::new(true);
    let summary = capture.run(&mut handler, &running).expect("run");
    assert_eq!(summary.frames_admitted, 2);
    // nothing decoded in forward mode
    assert!(handler.seen.is_empty());

    let forwarded = read_capture(&output);
    assert_eq!(forwarded, vec![frames[0].clone(), frames[1].clone()]);
    assert!(forwarded.iter().all(|f| f.link_type == LinkType::Ethernet));
    let _ = std::fs::remove_file(input);
    let _ = std::fs::remove_file(output);
}

#[test]
fn truncated_frame_does_not_stop_the_loop() {
    let mut frames = sample_frames();
    // cut inside the IPv4 header
    let mut short = frames[0].clone();
    short.data.truncate(24);
    short.origlen = frames[0].caplen();
    frames.insert(1, short);
    let path = write_capture("truncated.pcap", &frames);
    let config = CaptureConfig::new(SourceSelector::File(path.clone()), Mode::Print);
    let mut capture = CaptureLoop::new(config);
    let mut handler = Collect::default();
    let running = AtomicBool::new(true);
    let summary = capture.run(&mut handler, &running).expect("run");

    assert_eq!(capture.state(), LoopState::Stopped);
    assert_eq!(summary.frames_admitted, 6);
    assert_eq!(summary.decode_errors, 1);
    assert_eq!(handler.seen.len(), 6);
    let (_, _, names, incomplete) = &handler.seen[1];
    assert_eq!(names, &vec!["ethernet", "ipv4"]);
    assert!(incomplete);
    assert!(!handler.seen[2].3);
    let _ = std::fs::remove_file(path);
}

#[test]
fn empty_frame_reports_decode_error() {
    let frames = vec![frame(0, Vec::new()), frame(1, eth_ipv4(UDP, 1, 2))];
    let path = write_capture("empty-frame.pcap", &frames);
    let config = CaptureConfig::new(SourceSelector::File(path.clone()), Mode::Print);
    let mut capture = CaptureLoop::new(config);
    let mut handler = Collect::default();
    let running = AtomicBool::new(true);
    let summary = capture.run(&mut handler, &running).expect("run");
    assert_eq!(summary.decode_errors, 1);
    assert_eq!(handler.errors, vec![(1, DecodeError::EmptyFrame)]);
    assert_eq!(handler.seen.len(), 1);
    assert_eq!(handler.seen[0].0, 2);
    let _ = std::fs::remove_file(path);
}

#[test]
fn cancelled_before_first_frame() {
    let path = write_capture("cancel.pcap", &sample_frames());
    let config = CaptureConfig::new(SourceSelector::File(path.clone()), Mode::Print);
    let mut capture = CaptureLoop::new(config);
    let mut handler = Collect::default();
    let running = AtomicBool::new(false);
    let summary = capture.run(&mut handler, &running).expect("run");
    assert_eq!(summary.stop, StopReason::Cancelled);
    assert_eq!(summary.frames_read, 0);
    assert_eq!(capture.state(), LoopState::Stopped);
    let _ = std::fs::remove_file(path);
}

#[test]
fn setup_failures_are_fatal() {
    let mut handler = Collect::default();
    let running = AtomicBool::new(true);

    let config = CaptureConfig::new(
        SourceSelector::File(temp_path("does-not-exist.pcap")),
        Mode::Print,
    );
    let mut capture = CaptureLoop::new(config);
    let err = capture.run(&mut handler, &running).expect_err("missing file");
    assert_eq!(err.stage(), Stage::Open);
    assert_eq!(capture.state(), LoopState::Failed);

    let path = write_capture("bad-filter.pcap", &sample_frames());
    let config =
        CaptureConfig::new(SourceSelector::File(path.clone()), Mode::Print).with_filter("tcp port");
    let mut capture = CaptureLoop::new(config);
    let err = capture.run(&mut handler, &running).expect_err("invalid filter");
    assert!(matches!(err, Error::InvalidExpression(_)));
    assert_eq!(err.stage(), Stage::Filter);
    assert_eq!(capture.state(), LoopState::Failed);
    assert!(handler.seen.is_empty());

    // a loop runs only once
    assert!(capture.run(&mut handler, &running).is_err());
    let _ = std::fs::remove_file(path);
}

/// Source failing after a few frames
struct FailingSource {
    remaining: Vec<Frame>,
}

impl CaptureHandle for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }
    fn activate(&mut self) -> Result<(), Error> {
        Ok(())
    }
    fn link_type(&self) -> LinkType {
        LinkType::Ethernet
    }
    fn next_frame(&mut self) -> Result<NextFrame, Error> {
        match self.remaining.pop() {
            Some(f) => Ok(NextFrame::Frame(f)),
            None => Err(Error::ReadFailed("device went away".to_owned())),
        }
    }
    fn write_frame(&mut self, _frame: &Frame) -> Result<(), Error> {
        Err(Error::WriteFailed("read-only".to_owned()))
    }
    fn close(&mut self) {
        self.remaining.clear();
    }
    fn state(&self) -> libnetdump_tools::HandleState {
        libnetdump_tools::HandleState::Activated
    }
}

#[test]
fn read_error_fails_the_run() {
    let source = FailingSource {
        remaining: vec![frame(0, eth_ipv4(TCP, 1, 2))],
    };
    let config = CaptureConfig::new(SourceSelector::Interface("failing".into()), Mode::Print);
    let mut capture = CaptureLoop::new(config);
    let mut handler = Collect::default();
    let running = AtomicBool::new(true);
    let err = capture
        .run_with_source(Box::new(source), &mut handler, &running)
        .expect_err("read error");
    assert_eq!(err.stage(), Stage::Capture);
    assert_eq!(capture.state(), LoopState::Failed);
    // the frame read before the error was still handled
    assert_eq!(handler.seen.len(), 1);
}

/// Source replaying a fixed sequence of reads, as a live interface would
struct ScriptedSource {
    script: VecDeque<NextFrame>,
}

impl CaptureHandle for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }
    fn activate(&mut self) -> Result<(), Error> {
        Ok(())
    }
    fn link_type(&self) -> LinkType {
        LinkType::Ethernet
    }
    fn next_frame(&mut self) -> Result<NextFrame, Error> {
        Ok(self.script.pop_front().unwrap_or(NextFrame::EndOfStream))
    }
    fn write_frame(&mut self, _frame: &Frame) -> Result<(), Error> {
        Err(Error::WriteFailed("read-only".to_owned()))
    }
    fn close(&mut self) {
        self.script.clear();
    }
    fn state(&self) -> libnetdump_tools::HandleState {
        libnetdump_tools::HandleState::Activated
    }
}

fn live_config() -> CaptureConfig {
    CaptureConfig::new(SourceSelector::Interface("scripted".into()), Mode::Print)
}

#[test]
fn read_timeouts_are_retried() {
    let frames = sample_frames();
    let source = ScriptedSource {
        script: VecDeque::from(vec![
            NextFrame::TimedOut,
            NextFrame::Frame(frames[0].clone()),
            NextFrame::TimedOut,
            NextFrame::TimedOut,
            NextFrame::Frame(frames[1].clone()),
            NextFrame::TimedOut,
            NextFrame::EndOfStream,
        ]),
    };
    let mut capture = CaptureLoop::new(live_config());
    let mut handler = Collect::default();
    let running = AtomicBool::new(true);
    let summary = capture
        .run_with_source(Box::new(source), &mut handler, &running)
        .expect("run");
    assert_eq!(capture.state(), LoopState::Stopped);
    assert_eq!(summary.stop, StopReason::EndOfStream);
    assert_eq!(summary.frames_read, 2);
    assert_eq!(summary.frames_admitted, 2);
    assert_eq!(handler.seen.len(), 2);
    assert_eq!(handler.seen[1].1, frames[1]);
}

/// Clears the running flag once the first packet has been handled
struct StopAfterFirst<'a> {
    running: &'a AtomicBool,
    handled: u64,
}

impl PacketHandler for StopAfterFirst<'_> {
    fn handle_packet(
        &mut self,
        _index: u64,
        _frame: &Frame,
        _packet: &DecodedPacket,
    ) -> Result<(), Error> {
        self.handled += 1;
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn cancelled_while_waiting_for_traffic() {
    let frames = sample_frames();
    let source = ScriptedSource {
        script: VecDeque::from(vec![
            NextFrame::Frame(frames[0].clone()),
            NextFrame::TimedOut,
            NextFrame::Frame(frames[1].clone()),
            NextFrame::Frame(frames[2].clone()),
        ]),
    };
    let mut capture = CaptureLoop::new(live_config());
    let running = AtomicBool::new(true);
    let mut handler = StopAfterFirst {
        running: &running,
        handled: 0,
    };
    let summary = capture
        .run_with_source(Box::new(source), &mut handler, &running)
        .expect("run");
    assert_eq!(capture.state(), LoopState::Stopped);
    assert_eq!(summary.stop, StopReason::Cancelled);
    assert_eq!(summary.frames_read, 1);
    assert_eq!(handler.handled, 1);
}

#[cfg(target_os = "linux")]
#[test]
fn sink_write_error_fails_the_run() {
    let path = write_capture("full-in.pcap", &sample_frames());
    let config = CaptureConfig::new(
        SourceSelector::File(path.clone()),
        Mode::Forward {
            path: PathBuf::from("/dev/full"),
        },
    );
    let mut capture = CaptureLoop::new(config);
    let mut handler = Collect::default();
    let running = AtomicBool::new(true);
    let err = capture
        .run(&mut handler, &running)
        .expect_err("no space left on device");
    assert!(matches!(err, Error::WriteFailed(_)));
    assert_eq!(err.stage(), Stage::Write);
    assert_eq!(capture.state(), LoopState::Failed);
    let _ = std::fs::remove_file(path);
}

#[test]
fn decoding_is_pure() {
    let f = frame(0, eth_ipv4(TCP, 40000, 80));
    let copy = f.clone();
    let a = decode(&f).expect("decode");
    let b = decode(&f).expect("decode");
    assert_eq!(a, b);
    assert_eq!(f, copy);
    let tcp = a.layer("tcp").expect("tcp layer");
    assert_eq!(tcp.get("dport"), Some(&FieldValue::U16(80)));
    assert_eq!(
        a.layer("payload").and_then(|l| l.get("data")),
        Some(&FieldValue::Bytes(b"netdump"))
    );
}

#[test]
fn decoded_packet_serializes() {
    let f = frame(0, eth_ipv4(UDP, 53, 4000));
    let packet = decode(&f).expect("decode");
    let value = serde_json::to_value(&packet).expect("json");
    let layers = value["layers"].as_array().expect("layers");
    assert_eq!(layers.len(), 4);
    assert_eq!(layers[1]["name"], "ipv4");
    assert_eq!(layers[1]["fields"]["src"], "10.0.0.1");
    assert_eq!(layers[2]["fields"]["sport"], 53);
    assert_eq!(layers[3]["fields"]["data"], "6e657464756d70");
    assert_eq!(layers[2]["incomplete"], false);
}
