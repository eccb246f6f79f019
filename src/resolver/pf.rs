//! macOS packet-filter state lookup (`DIOCNATLOOK` on `/dev/pf`).

use std::fs::File;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::os::unix::io::AsRawFd;

use tokio::net::TcpStream;

use crate::resolver::ResolveError;

/// `_IOWR('D', 23, struct pfioc_natlook)`.
const DIOCNATLOOK: libc::c_ulong = 0xC054_4417;

/// `PF_OUT`: match the state as created by the outbound packet.
const PF_OUT: u8 = 2;

const PF_DEVICE: &str = "/dev/pf";

/// `struct pf_addr`: IPv4 lives in the first four bytes.
type PfAddr = [u8; 16];

/// `union pf_state_xport`: the port is the first two bytes, network order.
type PfPort = [u8; 4];

#[repr(C)]
#[derive(Debug, Default)]
struct PfiocNatlook {
    saddr: PfAddr,
    daddr: PfAddr,
    rsaddr: PfAddr,
    rdaddr: PfAddr,
    sxport: PfPort,
    dxport: PfPort,
    rsxport: PfPort,
    rdxport: PfPort,
    af: u8,
    proto: u8,
    proto_variant: u8,
    direction: u8,
}

fn set_addr(slot: &mut PfAddr, ip: IpAddr) {
    match ip {
        IpAddr::V4(v4) => slot[..4].copy_from_slice(&v4.octets()),
        IpAddr::V6(v6) => slot.copy_from_slice(&v6.octets()),
    }
}

fn set_port(slot: &mut PfPort, port: u16) {
    slot[..2].copy_from_slice(&port.to_be_bytes());
}

fn get_port(slot: &PfPort) -> u16 {
    u16::from_be_bytes([slot[0], slot[1]])
}

/// Look up the pf state matching `stream`'s 4-tuple and return its
/// pre-translation destination.
pub fn original_dst(stream: &TcpStream) -> Result<SocketAddr, ResolveError> {
    let peer = stream.peer_addr().map_err(ResolveError::Io)?;
    let local = stream.local_addr().map_err(ResolveError::Io)?;

    let mut nl = PfiocNatlook {
        af: match peer {
            SocketAddr::V4(_) => libc::AF_INET as u8,
            SocketAddr::V6(_) => libc::AF_INET6 as u8,
        },
        proto: libc::IPPROTO_TCP as u8,
        direction: PF_OUT,
        ..Default::default()
    };
    set_addr(&mut nl.saddr, peer.ip());
    set_addr(&mut nl.daddr, local.ip());
    set_port(&mut nl.sxport, peer.port());
    set_port(&mut nl.dxport, local.port());

    natlook(&mut nl).map_err(|e| match e.raw_os_error() {
        Some(libc::ENOENT) => ResolveError::NoRedirectEntry(e),
        _ => ResolveError::Io(e),
    })?;

    let ip: IpAddr = match peer {
        SocketAddr::V4(_) => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&nl.rdaddr[..4]);
            Ipv4Addr::from(octets).into()
        }
        SocketAddr::V6(_) => Ipv6Addr::from(nl.rdaddr).into(),
    };
    Ok(SocketAddr::new(ip, get_port(&nl.rdxport)))
}

fn natlook(nl: &mut PfiocNatlook) -> io::Result<()> {
    let dev = File::open(PF_DEVICE)?;
    // SAFETY: `nl` is a live, correctly laid out pfioc_natlook for the
    // duration of the call.
    let ret = unsafe { libc::ioctl(dev.as_raw_fd(), DIOCNATLOOK, nl as *mut PfiocNatlook) };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
