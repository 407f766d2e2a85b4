use libnetdump_tools::{
    CaptureHandle, Error, FileHandle, Frame, HandleState, LinkType, NextFrame, Timestamp,
};
use std::fs;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("libnetdump-tools-{}-{name}", std::process::id()));
    path
}

fn sample_frames(link_type: LinkType) -> Vec<Frame> {
    (0..5u8)
        .map(|i| {
            let data: Vec<u8> = (0..(60 + u32::from(i) * 7)).map(|b| (b as u8) ^ i).collect();
            let mut frame = Frame::new(
                Timestamp::new(1_600_000_000 + u32::from(i), 1000 * u32::from(i)),
                link_type,
                data,
            );
            if i == 3 {
                // snaplen-truncated frame
                frame.origlen = 1514;
            }
            frame
        })
        .collect()
}

fn read_all(path: &str) -> (LinkType, Vec<Frame>) {
    let mut source = FileHandle::open(path).expect("open source");
    source.activate().expect("activate source");
    let link_type = source.link_type();
    let mut frames = Vec::new();
    loop {
        match source.next_frame().expect("next_frame") {
            NextFrame::Frame(f) => frames.push(f),
            NextFrame::EndOfStream => break,
            NextFrame::TimedOut => panic!("file source cannot time out"),
        }
    }
    source.close();
    (link_type, frames)
}

#[test]
fn pcap_roundtrip() {
    let path = temp_path("roundtrip.pcap");
    let path_s = path.to_str().unwrap();
    let frames = sample_frames(LinkType::Ethernet);
    {
        let mut sink = FileHandle::create(path_s, LinkType::Ethernet).expect("create sink");
        sink.activate().expect("activate sink");
        for f in &frames {
            sink.write_frame(f).expect("write_frame");
        }
        // sink is closed when dropped
    }
    let (link_type, read) = read_all(path_s);
    fs::remove_file(&path).expect("Could not remove output file");

    assert_eq!(link_type, LinkType::Ethernet);
    assert_eq!(read, frames);
    assert!(read[3].is_truncated());
}

#[test]
fn pcap_roundtrip_keeps_link_type() {
    let path = temp_path("roundtrip-sll.pcap");
    let path_s = path.to_str().unwrap();
    let frames = sample_frames(LinkType::LinuxSll);
    let mut sink = FileHandle::create(path_s, LinkType::LinuxSll).expect("create sink");
    sink.activate().expect("activate sink");
    sink.write_frame(&frames[0]).expect("write_frame");
    sink.close();
    // close is idempotent
    sink.close();
    assert_eq!(sink.state(), HandleState::Closed);

    let (link_type, read) = read_all(path_s);
    fs::remove_file(&path).expect("Could not remove output file");
    assert_eq!(link_type, LinkType::LinuxSll);
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].link_type, LinkType::LinuxSll);
    assert_eq!(read[0].data, frames[0].data);
}

#[test]
fn empty_capture_is_end_of_stream() {
    let path = temp_path("empty.pcap");
    let path_s = path.to_str().unwrap();
    let mut sink = FileHandle::create(path_s, LinkType::Raw).expect("create sink");
    sink.activate().expect("activate sink");
    drop(sink);

    let (link_type, read) = read_all(path_s);
    fs::remove_file(&path).expect("Could not remove output file");
    assert_eq!(link_type, LinkType::Raw);
    assert!(read.is_empty());
}

#[test]
fn open_missing_file() {
    let path = temp_path("does-not-exist.pcap");
    match FileHandle::open(path.to_str().unwrap()) {
        Err(Error::SourceUnavailable(_)) => (),
        Err(e) => panic!("unexpected error {e:?}"),
        Ok(_) => panic!("opening a missing file must fail"),
    }
}

#[test]
fn activate_garbage_file() {
    let path = temp_path("garbage.pcap");
    fs::write(&path, b"this is definitely not a capture file").unwrap();
    let mut source = FileHandle::open(path.to_str().unwrap()).expect("open");
    let res = source.activate();
    fs::remove_file(&path).unwrap();
    assert!(matches!(res, Err(Error::ActivationFailed(_))));
    assert_eq!(source.state(), HandleState::Failed);
    assert!(source.next_frame().is_err());
}

#[test]
fn io_requires_activation() {
    let path = temp_path("not-activated.pcap");
    let path_s = path.to_str().unwrap();
    let mut sink = FileHandle::create(path_s, LinkType::Ethernet).expect("create sink");
    let frame = Frame::new(Timestamp::default(), LinkType::Ethernet, vec![0; 14]);
    assert!(matches!(sink.write_frame(&frame), Err(Error::NotActivated)));
    sink.activate().expect("activate");
    assert!(matches!(
        sink.activate(),
        Err(Error::ActivationFailed(_))
    ));
    // a sink cannot be read from
    assert!(matches!(sink.next_frame(), Err(Error::ReadFailed(_))));
    drop(sink);
    fs::remove_file(&path).unwrap();
}

fn write_pcap(path: &str, link_type: LinkType, frames: &[Frame]) {
    let mut sink = FileHandle::create(path, link_type).expect("create sink");
    sink.activate().expect("activate sink");
    for f in frames {
        sink.write_frame(f).expect("write_frame");
    }
    sink.flush().expect("flush");
}

fn gzip_file(input: &PathBuf, output: &PathBuf) {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&fs::read(input).expect("read pcap"))
        .expect("compress");
    fs::write(output, encoder.finish().expect("finish")).expect("write gz");
}

#[test]
fn gzip_input_is_decompressed() {
    let path = temp_path("plain.pcap");
    let frames = sample_frames(LinkType::Raw);
    write_pcap(path.to_str().unwrap(), LinkType::Raw, &frames);
    let gz_path = temp_path("compressed.pcap.gz");
    gzip_file(&path, &gz_path);

    let (link_type, read) = read_all(gz_path.to_str().unwrap());
    fs::remove_file(&path).expect("Could not remove output file");
    fs::remove_file(&gz_path).expect("Could not remove output file");

    assert_eq!(link_type, LinkType::Raw);
    assert_eq!(read, frames);
}

#[test]
fn gzip_input_with_large_frames() {
    // xorshift noise, so that gzip cannot shrink the frames and the
    // decompressor returns them in several short reads
    let mut state: u32 = 0x1234_5678;
    let frames: Vec<Frame> = (0..3u32)
        .map(|i| {
            let data = (0..60_000)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    state as u8
                })
                .collect();
            Frame::new(Timestamp::new(1_700_000_000 + i, 0), LinkType::Raw, data)
        })
        .collect();
    let path = temp_path("large.pcap");
    write_pcap(path.to_str().unwrap(), LinkType::Raw, &frames);
    let gz_path = temp_path("large.pcap.gz");
    gzip_file(&path, &gz_path);

    let (_, read) = read_all(gz_path.to_str().unwrap());
    fs::remove_file(&path).expect("Could not remove output file");
    fs::remove_file(&gz_path).expect("Could not remove output file");

    assert_eq!(read.len(), 3);
    assert_eq!(read, frames);
}

#[test]
fn truncated_file_ends_the_stream() {
    let path = temp_path("truncated.pcap");
    let frames = sample_frames(LinkType::Ethernet);
    write_pcap(path.to_str().unwrap(), LinkType::Ethernet, &frames);
    let mut data = fs::read(&path).expect("read pcap");
    data.truncate(data.len() - 10);
    fs::write(&path, &data).expect("write truncated pcap");

    let (_, read) = read_all(path.to_str().unwrap());
    fs::remove_file(&path).expect("Could not remove output file");
    assert_eq!(read, frames[..4]);
}

#[cfg(target_os = "linux")]
#[test]
fn flush_reports_write_errors() {
    let mut sink = FileHandle::create("/dev/full", LinkType::Ethernet).expect("create sink");
    sink.activate().expect("activate sink");
    let frame = Frame::new(Timestamp::default(), LinkType::Ethernet, vec![0; 60]);
    // buffered, the device is not written yet
    sink.write_frame(&frame).expect("write_frame");
    assert!(matches!(sink.flush(), Err(Error::WriteFailed(_))));
}
