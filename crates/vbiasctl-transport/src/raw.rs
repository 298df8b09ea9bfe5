use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info};

use crate::address::MacAddr;
use crate::error::{Result, TransportError};
use crate::link::PacketLink;

/// Largest untagged Ethernet frame without FCS.
const MAX_FRAME_LEN: usize = 1514;

/// `sll_pkttype` value for frames this host transmitted.
const PACKET_OUTGOING: u8 = 4;

/// A raw Ethernet link on one network interface (Linux `AF_PACKET`).
///
/// The socket captures every protocol in promiscuous mode, so frames with
/// an 802.3 length field (as the Vbias boards send) are delivered too.
/// Frames the host transmitted itself are never returned by
/// [`recv_packet`](PacketLink::recv_packet). Opening requires
/// `CAP_NET_RAW`.
pub struct RawSocket {
    fd: OwnedFd,
    interface: String,
    mac: MacAddr,
    filter: Option<MacAddr>,
    read_timeout: Option<Duration>,
    buf: Vec<u8>,
}

impl RawSocket {
    /// Open a raw link on `interface` (for example `eth0`).
    pub fn open(interface: &str) -> Result<Self> {
        let name = interface_name(interface)?;
        let open_err = |source: io::Error| TransportError::Open {
            interface: interface.to_string(),
            source,
        };

        // SAFETY: plain socket(2) call; the result is checked before use.
        let raw = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW,
                libc::c_int::from(eth_p_all()),
            )
        };
        if raw < 0 {
            return Err(open_err(io::Error::last_os_error()));
        }
        // SAFETY: `raw` is a freshly created descriptor that nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: `name` is a valid NUL-terminated string.
        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            return Err(open_err(io::Error::last_os_error()));
        }
        let ifindex = ifindex as libc::c_int;

        let mac = hardware_address(fd.as_raw_fd(), interface, &name)?;

        // SAFETY: all-zero is a valid `sockaddr_ll`.
        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = eth_p_all();
        addr.sll_ifindex = ifindex;
        // SAFETY: `addr` is an initialized `sockaddr_ll` and the length matches it.
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&addr as *const libc::sockaddr_ll).cast::<libc::sockaddr>(),
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(open_err(io::Error::last_os_error()));
        }

        // SAFETY: all-zero is a valid `packet_mreq`.
        let mut mreq: libc::packet_mreq = unsafe { std::mem::zeroed() };
        mreq.mr_ifindex = ifindex;
        mreq.mr_type = libc::PACKET_MR_PROMISC as libc::c_ushort;
        set_option(
            fd.as_raw_fd(),
            libc::SOL_PACKET,
            libc::PACKET_ADD_MEMBERSHIP,
            &mreq,
        )
        .map_err(open_err)?;

        info!(interface, %mac, "opened raw ethernet link");

        Ok(Self {
            fd,
            interface: interface.to_string(),
            mac,
            filter: None,
            read_timeout: None,
            buf: vec![0u8; MAX_FRAME_LEN],
        })
    }

    /// The receive timeout currently programmed into the socket.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Reprogram the kernel receive timeout, but only when it changes.
    fn apply_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        if self.read_timeout == Some(timeout) {
            return Ok(());
        }
        // A zero timeval means "block forever" to the kernel.
        let effective = timeout.max(Duration::from_micros(1));
        let tv = libc::timeval {
            tv_sec: effective.as_secs() as libc::time_t,
            tv_usec: effective.subsec_micros() as libc::suseconds_t,
        };
        set_option(self.fd.as_raw_fd(), libc::SOL_SOCKET, libc::SO_RCVTIMEO, &tv).map_err(
            |source| TransportError::Receive {
                interface: self.interface.clone(),
                source,
            },
        )?;
        debug!(interface = %self.interface, ?timeout, "read timeout renegotiated");
        self.read_timeout = Some(timeout);
        Ok(())
    }

    /// Receive one frame. `Ok(None)` means nothing arrived in time.
    fn recv_once(&mut self, flags: libc::c_int) -> io::Result<Option<(usize, u8)>> {
        loop {
            // SAFETY: all-zero is a valid `sockaddr_ll`.
            let mut from: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
            let mut from_len = std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
            // SAFETY: `buf` is writable for `buf.len()` bytes and `from`/`from_len`
            // describe a writable `sockaddr_ll`.
            let n = unsafe {
                libc::recvfrom(
                    self.fd.as_raw_fd(),
                    self.buf.as_mut_ptr().cast::<libc::c_void>(),
                    self.buf.len(),
                    flags,
                    (&mut from as *mut libc::sockaddr_ll).cast::<libc::sockaddr>(),
                    &mut from_len,
                )
            };
            if n >= 0 {
                return Ok(Some((n as usize, from.sll_pkttype)));
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => return Ok(None),
                _ => return Err(err),
            }
        }
    }

    fn passes_filter(&self, len: usize) -> bool {
        match self.filter {
            None => true,
            Some(source) => self.buf.get(6..12) == Some(&source.0[..]) && len >= 12,
        }
    }
}

impl PacketLink for RawSocket {
    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        // SAFETY: `packet` is readable for `packet.len()` bytes; the socket is bound,
        // so send(2) uses the bound interface.
        let n = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                packet.as_ptr().cast::<libc::c_void>(),
                packet.len(),
                0,
            )
        };
        if n < 0 {
            return Err(TransportError::Send {
                interface: self.interface.clone(),
                source: io::Error::last_os_error(),
            });
        }
        if n as usize != packet.len() {
            return Err(TransportError::Send {
                interface: self.interface.clone(),
                source: io::Error::new(io::ErrorKind::WriteZero, "short frame write"),
            });
        }
        Ok(())
    }

    fn recv_packet(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        self.apply_read_timeout(timeout)?;
        let started = Instant::now();
        loop {
            let received = self.recv_once(0).map_err(|source| TransportError::Receive {
                interface: self.interface.clone(),
                source,
            })?;
            let Some((len, pkttype)) = received else {
                return Ok(None);
            };
            if pkttype != PACKET_OUTGOING && self.passes_filter(len) {
                return Ok(Some(Bytes::copy_from_slice(&self.buf[..len])));
            }
            if started.elapsed() >= timeout {
                return Ok(None);
            }
        }
    }

    fn drain(&mut self) -> Result<usize> {
        let mut drained = 0usize;
        while self
            .recv_once(libc::MSG_DONTWAIT)
            .map_err(|source| TransportError::Receive {
                interface: self.interface.clone(),
                source,
            })?
            .is_some()
        {
            drained += 1;
        }
        Ok(drained)
    }

    fn set_source_filter(&mut self, source: Option<MacAddr>) {
        if self.filter != source {
            debug!(interface = %self.interface, ?source, "source filter changed");
            self.filter = source;
        }
    }

    fn local_mac(&self) -> MacAddr {
        self.mac
    }

    fn interface(&self) -> &str {
        &self.interface
    }
}

impl std::fmt::Debug for RawSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawSocket")
            .field("interface", &self.interface)
            .field("mac", &self.mac)
            .field("filter", &self.filter)
            .finish()
    }
}

/// Look up the hardware address of a local Ethernet interface.
pub fn host_mac_address(interface: &str) -> Result<MacAddr> {
    let name = interface_name(interface)?;
    // SAFETY: plain socket(2) call; the result is checked before use.
    let raw = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if raw < 0 {
        return Err(TransportError::Open {
            interface: interface.to_string(),
            source: io::Error::last_os_error(),
        });
    }
    // SAFETY: `raw` is a freshly created descriptor that nothing else owns.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };
    hardware_address(fd.as_raw_fd(), interface, &name)
}

fn hardware_address(fd: RawFd, interface: &str, name: &CString) -> Result<MacAddr> {
    // SAFETY: all-zero is a valid `ifreq`.
    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(name.as_bytes()) {
        *dst = *src as libc::c_char;
    }
    // SAFETY: `ifr` is a valid `ifreq` carrying a NUL-terminated interface name.
    let rc = unsafe { libc::ioctl(fd, libc::SIOCGIFHWADDR as _, &mut ifr) };
    if rc < 0 {
        return Err(TransportError::Open {
            interface: interface.to_string(),
            source: io::Error::last_os_error(),
        });
    }
    // SAFETY: SIOCGIFHWADDR fills the `ifru_hwaddr` member of the union.
    let hwaddr = unsafe { ifr.ifr_ifru.ifru_hwaddr };
    if hwaddr.sa_family != libc::ARPHRD_ETHER {
        return Err(TransportError::NotEthernet {
            interface: interface.to_string(),
        });
    }
    let mut octets = [0u8; 6];
    for (dst, src) in octets.iter_mut().zip(hwaddr.sa_data.iter()) {
        *dst = *src as u8;
    }
    Ok(MacAddr(octets))
}

fn interface_name(interface: &str) -> Result<CString> {
    let max = libc::IFNAMSIZ - 1;
    if interface.is_empty() || interface.len() > max || interface.contains('\0') {
        return Err(TransportError::InvalidInterface {
            name: interface.to_string(),
            len: interface.len(),
            max,
        });
    }
    CString::new(interface).map_err(|_| TransportError::InvalidInterface {
        name: interface.to_string(),
        len: interface.len(),
        max,
    })
}

fn set_option<T>(
    fd: RawFd,
    level: libc::c_int,
    name: libc::c_int,
    value: &T,
) -> io::Result<()> {
    // SAFETY: `value` is a live reference to a `T` and the length passed is its size.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            (value as *const T).cast::<libc::c_void>(),
            std::mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn eth_p_all() -> u16 {
    (libc::ETH_P_ALL as u16).to_be()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_interface_name() {
        let result = RawSocket::open("");
        assert!(matches!(
            result,
            Err(TransportError::InvalidInterface { len: 0, .. })
        ));
    }

    #[test]
    fn rejects_overlong_interface_name() {
        let name = "e".repeat(40);
        let result = host_mac_address(&name);
        assert!(matches!(
            result,
            Err(TransportError::InvalidInterface { len: 40, .. })
        ));
    }

    #[test]
    fn loopback_is_not_ethernet() {
        let result = host_mac_address("lo");
        assert!(matches!(result, Err(TransportError::NotEthernet { .. })));
    }

    #[test]
    fn unknown_interface_fails_to_open() {
        let result = host_mac_address("vbiasnone0");
        assert!(matches!(result, Err(TransportError::Open { .. })));
    }

    #[test]
    fn ethertype_is_network_order() {
        assert_eq!(eth_p_all().to_ne_bytes(), [0x00, 0x03]);
    }
}
