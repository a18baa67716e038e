//! Byte transports under [`MavLink`](crate::mav::MavLink).
//!
//! Sockets and serial ports are opened with a short read timeout, so the
//! reader thread wakes regularly and can see its stop flag.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mavlink::common::MavMessage;
use mavlink::error::MessageReadError;
use mavlink::peek_reader::PeekReader;
use mavlink::{MavHeader, MavlinkVersion};
use tracing::{debug, info};

use crate::mav::{Endpoint, NetScheme};

pub(crate) const READ_TIMEOUT: Duration = Duration::from_millis(50);

const DATAGRAM_MAX: usize = 2048;

pub(crate) type Frame = (MavHeader, MavMessage);

/// Where UDP replies go. Fixed for udpout/udpbcast, learned from the first
/// valid datagram for udpin.
type Peer = Arc<Mutex<Option<SocketAddr>>>;

pub(crate) struct Wire {
    pub reader: WireReader,
    pub writer: WireWriter,
    pub local: Option<SocketAddr>,
}

pub(crate) enum WireReader {
    Udp { sock: UdpSocket, peer: Peer, learn: bool, buf: Vec<u8> },
    Stream(PeekReader<Box<dyn Read + Send>>),
}

pub(crate) enum WireWriter {
    Udp { sock: UdpSocket, peer: Peer },
    Stream(Box<dyn Write + Send>),
}

pub(crate) fn open(endpoint: &Endpoint) -> io::Result<Wire> {
    match endpoint {
        Endpoint::Net { scheme, host, port } => {
            let addr = resolve(host, *port)?;
            match scheme {
                NetScheme::UdpIn => udp(UdpSocket::bind(addr)?, None),
                NetScheme::UdpOut => udp(UdpSocket::bind(unspecified(addr))?, Some(addr)),
                NetScheme::UdpBcast => {
                    let sock = UdpSocket::bind(unspecified(addr))?;
                    sock.set_broadcast(true)?;
                    udp(sock, Some(addr))
                }
                NetScheme::TcpOut => tcp(TcpStream::connect(addr)?),
                NetScheme::TcpIn => {
                    info!("wire: waiting for a tcp client on {}", addr);
                    let (stream, from) = TcpListener::bind(addr)?.accept()?;
                    info!("wire: tcp client {}", from);
                    tcp(stream)
                }
            }
        }
        Endpoint::Serial { dev, baud } => {
            let port = tokio_serial::new(dev.as_str(), *baud)
                .timeout(READ_TIMEOUT)
                .open()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("open serial device {}: {}", dev, e)))?;
            let reader: Box<dyn Read + Send> = Box::new(
                port.try_clone()
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("clone serial device {}: {}", dev, e)))?,
            );
            Ok(Wire {
                reader: WireReader::Stream(PeekReader::new(reader)),
                writer: WireWriter::Stream(Box::new(port)),
                local: None,
            })
        }
    }
}

fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{} resolves to nothing", host)))
}

fn unspecified(like: SocketAddr) -> SocketAddr {
    match like {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    }
}

fn udp(sock: UdpSocket, fixed: Option<SocketAddr>) -> io::Result<Wire> {
    sock.set_read_timeout(Some(READ_TIMEOUT))?;
    let local = sock.local_addr().ok();
    let learn = fixed.is_none();
    let peer: Peer = Arc::new(Mutex::new(fixed));
    Ok(Wire {
        reader: WireReader::Udp { sock: sock.try_clone()?, peer: Arc::clone(&peer), learn, buf: vec![0; DATAGRAM_MAX] },
        writer: WireWriter::Udp { sock, peer },
        local,
    })
}

fn tcp(stream: TcpStream) -> io::Result<Wire> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.set_nodelay(true)?;
    let local = stream.local_addr().ok();
    let reader: Box<dyn Read + Send> = Box::new(stream.try_clone()?);
    Ok(Wire {
        reader: WireReader::Stream(PeekReader::new(reader)),
        writer: WireWriter::Stream(Box::new(stream)),
        local,
    })
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

impl WireReader {
    /// Read what arrives within one read timeout and append the decoded
    /// frames to `out`. Timeouts and undecodable bytes are not errors.
    pub fn read_frames(&mut self, out: &mut Vec<Frame>) -> io::Result<()> {
        match self {
            WireReader::Udp { sock, peer, learn, buf } => {
                let (n, from) = match sock.recv_from(buf) {
                    Ok(got) => got,
                    Err(e) if is_timeout(&e) => return Ok(()),
                    Err(e) => return Err(e),
                };
                let before = out.len();
                decode_datagram(&buf[..n], out);
                if *learn && out.len() > before {
                    let mut peer = peer.lock().unwrap_or_else(PoisonError::into_inner);
                    if *peer != Some(from) {
                        debug!("wire: replying to {}", from);
                        *peer = Some(from);
                    }
                }
                Ok(())
            }
            WireReader::Stream(reader) => match mavlink::read_versioned_msg::<MavMessage, _>(reader, mavlink::ReadVersion::Single(MavlinkVersion::V2)) {
                Ok(frame) => {
                    out.push(frame);
                    Ok(())
                }
                Err(MessageReadError::Io(e)) if is_timeout(&e) => Ok(()),
                Err(MessageReadError::Io(e)) => Err(e),
                Err(e) => {
                    debug!("wire: dropping frame: {}", e);
                    Ok(())
                }
            },
        }
    }
}

/// One datagram may carry several frames back to back.
pub(crate) fn decode_datagram(datagram: &[u8], out: &mut Vec<Frame>) {
    let mut reader = PeekReader::new(datagram);
    loop {
        match mavlink::read_versioned_msg::<MavMessage, _>(&mut reader, mavlink::ReadVersion::Single(MavlinkVersion::V2)) {
            Ok(frame) => out.push(frame),
            // end of datagram
            Err(MessageReadError::Io(_)) => return,
            Err(e) => debug!("wire: dropping frame: {}", e),
        }
    }
}

pub(crate) fn encode(hdr: MavHeader, msg: &MavMessage) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(280);
    mavlink::write_versioned_msg(&mut buf, MavlinkVersion::V2, hdr, msg)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    Ok(buf)
}

impl WireWriter {
    pub fn write_frame(&mut self, hdr: MavHeader, msg: &MavMessage) -> io::Result<()> {
        let buf = encode(hdr, msg)?;
        match self {
            WireWriter::Udp { sock, peer } => {
                let to = *peer.lock().unwrap_or_else(PoisonError::into_inner);
                let to = to.ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no udp peer yet"))?;
                sock.send_to(&buf, to)?;
            }
            WireWriter::Stream(w) => {
                w.write_all(&buf)?;
                w.flush()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{MavCmd, MavResult, COMMAND_ACK_DATA};

    fn ack(command: MavCmd) -> MavMessage {
        MavMessage::COMMAND_ACK(COMMAND_ACK_DATA { command, result: MavResult::MAV_RESULT_ACCEPTED, ..Default::default() })
    }

    #[test]
    fn datagram_with_two_frames() {
        let hdr = MavHeader { system_id: 1, component_id: 1, sequence: 7 };
        let mut datagram = encode(hdr, &ack(MavCmd::MAV_CMD_DO_SET_MODE)).unwrap();
        datagram.extend(encode(hdr, &ack(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM)).unwrap());

        let mut out = Vec::new();
        decode_datagram(&datagram, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, hdr);
        assert!(matches!(&out[1].1, MavMessage::COMMAND_ACK(a) if a.command == MavCmd::MAV_CMD_COMPONENT_ARM_DISARM));
    }

    #[test]
    fn garbage_is_skipped() {
        let hdr = MavHeader { system_id: 1, component_id: 1, sequence: 0 };
        let mut datagram = vec![0x00, 0x13, 0x37, 0x42];
        datagram.extend(encode(hdr, &ack(MavCmd::MAV_CMD_DO_SET_MODE)).unwrap());

        let mut out = Vec::new();
        decode_datagram(&datagram, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn udpin_needs_a_peer_before_sending() {
        let ep: Endpoint = "udpin:127.0.0.1:0".parse().unwrap();
        let mut wire = open(&ep).unwrap();
        let hdr = MavHeader { system_id: 255, component_id: 190, sequence: 0 };
        let err = wire.writer.write_frame(hdr, &ack(MavCmd::MAV_CMD_DO_SET_MODE)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
