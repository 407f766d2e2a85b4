use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};
use xz2::read::XzDecoder;

/// Container wrapped around a capture file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    Lz4,
}

// https://en.wikipedia.org/wiki/LZ4_(compression_algorithm)
fn lz4_matcher(buf: &[u8]) -> bool {
    buf.len() >= 4 && buf[0] == 0x04 && buf[1] == 0x22 && buf[2] == 0x4d && buf[3] == 0x18
}

/// Guess the container from the first bytes of a file, falling back to its extension
pub fn detect_compression(magic: &[u8], filename: &str) -> Compression {
    let mut info = infer::Infer::new();
    info.add("custom/lz4", "lz4", lz4_matcher);
    let by_magic = info.get(magic).and_then(|kind| match kind.extension() {
        "gz" => Some(Compression::Gzip),
        "xz" => Some(Compression::Xz),
        "lz4" => Some(Compression::Lz4),
        _ => None,
    });
    let by_name = if filename.ends_with(".gz") {
        Compression::Gzip
    } else if filename.ends_with(".xz") {
        Compression::Xz
    } else if filename.ends_with(".lz4") {
        Compression::Lz4
    } else {
        Compression::None
    };
    match by_magic {
        Some(c) => {
            if c != by_name {
                warn!("Inferred file type is {c:?} but file extension does not match ({filename})");
            }
            c
        }
        None => by_name,
    }
}

/// Open a capture file for reading, decompressing it if needed
///
/// The special name `-` reads from standard input (without decompression).
pub fn open_input(filename: &str) -> io::Result<Box<dyn Read + Send>> {
    if filename == "-" {
        return Ok(Box::new(io::stdin()));
    }
    let mut file = File::open(Path::new(filename))?;
    let mut magic = Vec::with_capacity(12);
    (&mut file).take(12).read_to_end(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    let compression = detect_compression(&magic, filename);
    debug!("Opening {filename} (compression: {compression:?})");
    let reader: Box<dyn Read + Send> = match compression {
        Compression::None => Box::new(file),
        Compression::Gzip => Box::new(GzDecoder::new(file)),
        Compression::Xz => Box::new(XzDecoder::new(file)),
        Compression::Lz4 => Box::new(lz4::Decoder::new(file)?),
    };
    Ok(reader)
}
