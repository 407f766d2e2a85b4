use libnetdump::{DecodeError, DecodedPacket, PacketHandler};
use libnetdump_tools::{Error, Frame, Timestamp};
use serde_json::json;
use std::io::{self, Write};
use time::OffsetDateTime;

/// `HH:MM:SS.micros`, in UTC
pub fn format_time(ts: Timestamp) -> String {
    match OffsetDateTime::from_unix_timestamp(i64::from(ts.secs)) {
        Ok(t) => format!(
            "{:02}:{:02}:{:02}.{:06}",
            t.hour(),
            t.minute(),
            t.second(),
            ts.micros
        ),
        Err(_) => ts.to_string(),
    }
}

/// One line per frame: index, time, captured length, then the layers
pub struct TextPrinter<W: Write> {
    out: W,
}

impl<W: Write> TextPrinter<W> {
    pub fn new(out: W) -> Self {
        TextPrinter { out }
    }
}

impl<W: Write> PacketHandler for TextPrinter<W> {
    fn handle_packet(
        &mut self,
        index: u64,
        frame: &Frame,
        packet: &DecodedPacket,
    ) -> Result<(), Error> {
        writeln!(
            self.out,
            "{index} {} {} bytes: {packet}",
            format_time(frame.ts),
            frame.caplen()
        )?;
        Ok(())
    }

    fn handle_decode_error(
        &mut self,
        index: u64,
        frame: &Frame,
        error: &DecodeError,
    ) -> Result<(), Error> {
        writeln!(
            self.out,
            "{index} {} {} bytes: [{error}]",
            format_time(frame.ts),
            frame.caplen()
        )?;
        Ok(())
    }
}

/// One JSON object per line
pub struct JsonPrinter<W: Write> {
    out: W,
}

impl<W: Write> JsonPrinter<W> {
    pub fn new(out: W) -> Self {
        JsonPrinter { out }
    }

    fn emit(&mut self, value: &serde_json::Value) -> Result<(), Error> {
        serde_json::to_writer(&mut self.out, value).map_err(io::Error::from)?;
        writeln!(self.out)?;
        Ok(())
    }
}

impl<W: Write> PacketHandler for JsonPrinter<W> {
    fn handle_packet(
        &mut self,
        index: u64,
        frame: &Frame,
        packet: &DecodedPacket,
    ) -> Result<(), Error> {
        let value = json!({
            "index": index,
            "ts": frame.ts,
            "time": format_time(frame.ts),
            "caplen": frame.caplen(),
            "origlen": frame.origlen,
            "link_type": frame.link_type.to_string(),
            "layers": packet.layers,
        });
        self.emit(&value)
    }

    fn handle_decode_error(
        &mut self,
        index: u64,
        frame: &Frame,
        error: &DecodeError,
    ) -> Result<(), Error> {
        let value = json!({
            "index": index,
            "ts": frame.ts,
            "time": format_time(frame.ts),
            "caplen": frame.caplen(),
            "origlen": frame.origlen,
            "link_type": frame.link_type.to_string(),
            "error": error.to_string(),
        });
        self.emit(&value)
    }
}
