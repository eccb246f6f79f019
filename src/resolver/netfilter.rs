//! Linux connection-tracking lookup (`SO_ORIGINAL_DST`).

use std::io;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::os::unix::io::AsRawFd;

use tokio::net::TcpStream;

use crate::resolver::ResolveError;

/// `SO_ORIGINAL_DST` from `linux/netfilter_ipv4.h`.
const SO_ORIGINAL_DST: libc::c_int = 80;

/// `IP6T_SO_ORIGINAL_DST` from `linux/netfilter_ipv6/ip6_tables.h`.
const IP6T_SO_ORIGINAL_DST: libc::c_int = 80;

/// Ask conntrack for the pre-NAT destination of `stream`.
pub fn original_dst(stream: &TcpStream) -> Result<SocketAddr, ResolveError> {
    let ipv4 = match stream.local_addr().map_err(ResolveError::Io)? {
        SocketAddr::V4(_) => true,
        SocketAddr::V6(v6) => v6.ip().to_ipv4_mapped().is_some(),
    };

    let result = if ipv4 { lookup_v4(stream) } else { lookup_v6(stream) };
    result.map_err(|e| match e.raw_os_error() {
        Some(libc::ENOENT) => ResolveError::NoRedirectEntry(e),
        _ => ResolveError::Io(e),
    })
}

fn lookup_v4(stream: &TcpStream) -> io::Result<SocketAddr> {
    // SAFETY: sockaddr_in is plain old data; the kernel fills at most `len` bytes.
    let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

    let ret = unsafe {
        libc::getsockopt(
            stream.as_raw_fd(),
            libc::SOL_IP,
            SO_ORIGINAL_DST,
            &mut addr as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
    Ok(SocketAddr::new(ip.into(), u16::from_be(addr.sin_port)))
}

fn lookup_v6(stream: &TcpStream) -> io::Result<SocketAddr> {
    // SAFETY: as above, for sockaddr_in6.
    let mut addr: libc::sockaddr_in6 = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;

    let ret = unsafe {
        libc::getsockopt(
            stream.as_raw_fd(),
            libc::SOL_IPV6,
            IP6T_SO_ORIGINAL_DST,
            &mut addr as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
    Ok(SocketAddr::new(ip.into(), u16::from_be(addr.sin6_port)))
}
