use libnetdump_tools::{
    check_activate, check_active, CaptureHandle, Error, Frame, HandleState, LinkType, LiveOptions,
    NextFrame, Timestamp,
};
use pcap::{Active, Capture, Device};
use tracing::{debug, error, trace};

/// Capture handle bound to a network interface
///
/// The interface is resolved by `open`, but nothing is captured until
/// `activate`. Reads block for at most the configured timeout, after which
/// `next_frame` returns `NextFrame::TimedOut`.
pub struct LiveHandle {
    name: String,
    device: Option<Device>,
    options: LiveOptions,
    cap: Option<Capture<Active>>,
    link_type: LinkType,
    state: HandleState,
}

impl LiveHandle {
    /// Resolve `interface_name` among the interfaces known to libpcap
    pub fn open(interface_name: &str, options: &LiveOptions) -> Result<LiveHandle, Error> {
        let interfaces = Device::list().map_err(|e| {
            error!("Could not list network interfaces: {e:?}");
            Error::SourceUnavailable(format!(
                "{interface_name}: {e} (are you running with CAP_NET_RAW?)"
            ))
        })?;
        let device = interfaces
            .into_iter()
            .find(|iface| iface.name == interface_name)
            .ok_or_else(|| Error::SourceUnavailable(format!("{interface_name}: no such device")))?;
        debug!("Live: found interface {}", device.name);
        Ok(LiveHandle {
            name: interface_name.to_owned(),
            device: Some(device),
            options: options.clone(),
            cap: None,
            link_type: LinkType::Other(-1),
            state: HandleState::Opened,
        })
    }

    fn do_activate(&mut self) -> Result<(), Error> {
        let device = self
            .device
            .take()
            .ok_or_else(|| Error::ActivationFailed("device already consumed".to_owned()))?;
        let activation = |e: pcap::Error| Error::ActivationFailed(format!("{}: {e}", self.name));
        let cap = Capture::from_device(device)
            .map_err(activation)?
            .promisc(self.options.promisc)
            .snaplen(self.options.snaplen)
            .timeout(self.options.timeout_ms)
            .immediate_mode(self.options.immediate)
            .open()
            .map_err(activation)?;

        // convert from `pcap` crate format to our own
        self.link_type = LinkType::from_raw(cap.get_datalink().0);
        debug!("Live: {} activated, link type {}", self.name, self.link_type);
        self.cap = Some(cap);
        Ok(())
    }
}

impl CaptureHandle for LiveHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn activate(&mut self) -> Result<(), Error> {
        check_activate(self.state)?;
        match self.do_activate() {
            Ok(()) => {
                self.state = HandleState::Activated;
                Ok(())
            }
            Err(e) => {
                self.state = HandleState::Failed;
                Err(e)
            }
        }
    }

    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn next_frame(&mut self) -> Result<NextFrame, Error> {
        check_active(self.state)?;
        let cap = self.cap.as_mut().ok_or(Error::NotActivated)?;
        match cap.next_packet() {
            Ok(packet) => {
                let header = packet.header;
                let ts = Timestamp::new(header.ts.tv_sec as u32, header.ts.tv_usec as u32);
                trace!("Live: packet caplen={} len={}", header.caplen, header.len);
                let frame = Frame {
                    ts,
                    link_type: self.link_type,
                    origlen: header.len,
                    data: packet.data.to_vec(),
                };
                Ok(NextFrame::Frame(frame))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(NextFrame::TimedOut),
            Err(pcap::Error::NoMorePackets) => Ok(NextFrame::EndOfStream),
            Err(e) => {
                debug!("Live mode: getting next packet failed: {e:?}");
                Err(Error::ReadFailed(format!("{}: {e}", self.name)))
            }
        }
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        check_active(self.state)?;
        let cap = self.cap.as_mut().ok_or(Error::NotActivated)?;
        cap.sendpacket(frame.data.as_slice())
            .map_err(|e| Error::WriteFailed(format!("{}: {e}", self.name)))
    }

    fn close(&mut self) {
        if self.state == HandleState::Closed {
            return;
        }
        if self.cap.take().is_some() {
            debug!("Live: closing {}", self.name);
        }
        self.device = None;
        self.state = HandleState::Closed;
    }

    fn state(&self) -> HandleState {
        self.state
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_unknown_interface() {
        let options = LiveOptions::default();
        match LiveHandle::open("netdump-no-such-if0", &options) {
            Err(e) => assert_eq!(e.stage(), libnetdump_tools::Stage::Open),
            Ok(_) => panic!("interface should not exist"),
        }
    }
}
