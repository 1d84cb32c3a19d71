use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Send/receive capability the executor drives for one attempt.
///
/// `recv` yields whole datagrams as delivered by the kernel, IPv4 header
/// included.
pub trait IcmpTransport {
    fn send_to(&self, packet: &[u8], target: Ipv4Addr) -> io::Result<usize>;
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>>;
}

/// Opens a fresh transport. Called with the attempt's runtime entered, so
/// implementations may register with the tokio reactor.
pub trait TransportFactory: Send + Sync {
    type Transport: IcmpTransport;

    fn open(&self) -> anyhow::Result<Self::Transport>;
}

/// Opens a [`RawIcmpSocket`] per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSocketFactory;

impl TransportFactory for RawSocketFactory {
    type Transport = RawIcmpSocket;

    fn open(&self) -> anyhow::Result<RawIcmpSocket> {
        RawIcmpSocket::new()
    }
}

fn new_raw_socket() -> anyhow::Result<Socket> {
    Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).map_err(|e| {
        anyhow::anyhow!(
            "Failed to create raw socket: {}. Administrator privileges may be required.",
            e
        )
    })
}

fn endpoint(target: Ipv4Addr) -> socket2::SockAddr {
    SocketAddr::new(IpAddr::V4(target), 0).into()
}

#[cfg(unix)]
pub use self::unix::RawIcmpSocket;

#[cfg(not(unix))]
pub use self::blocking::RawIcmpSocket;

#[cfg(unix)]
mod unix {
    use super::*;
    use std::io::Read;
    use tokio::io::unix::AsyncFd;

    /// Raw ICMPv4 socket registered with the tokio reactor.
    pub struct RawIcmpSocket {
        inner: AsyncFd<Socket>,
    }

    impl RawIcmpSocket {
        pub fn new() -> anyhow::Result<Self> {
            let socket = new_raw_socket()?;
            socket.set_nonblocking(true)?;
            let inner = AsyncFd::new(socket)?;
            Ok(Self { inner })
        }
    }

    impl IcmpTransport for RawIcmpSocket {
        fn send_to(&self, packet: &[u8], target: Ipv4Addr) -> io::Result<usize> {
            log::debug!("Sending ICMP packet to {}: {} bytes", target, packet.len());
            self.inner.get_ref().send_to(packet, &endpoint(target))
        }

        async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            loop {
                let mut guard = self.inner.readable().await?;
                let result = guard.try_io(|inner| {
                    let mut socket: &Socket = inner.get_ref();
                    socket.read(buf)
                });
                match result {
                    Ok(received) => return received,
                    Err(_would_block) => continue,
                }
            }
        }
    }
}

#[cfg(not(unix))]
mod blocking {
    use super::*;
    use std::mem::MaybeUninit;
    use std::time::Duration;

    // Bounds how long a blocking-pool thread can outlive an abandoned receive.
    const READ_TIMEOUT: Duration = Duration::from_secs(1);

    /// Raw ICMPv4 socket whose receives run on the blocking pool.
    pub struct RawIcmpSocket {
        socket: Socket,
    }

    impl RawIcmpSocket {
        pub fn new() -> anyhow::Result<Self> {
            let socket = new_raw_socket()?;
            socket.set_nonblocking(false)?;
            socket.set_read_timeout(Some(READ_TIMEOUT))?;
            Ok(Self { socket })
        }
    }

    impl IcmpTransport for RawIcmpSocket {
        fn send_to(&self, packet: &[u8], target: Ipv4Addr) -> io::Result<usize> {
            log::debug!("Sending ICMP packet to {}: {} bytes", target, packet.len());
            self.socket.send_to(packet, &endpoint(target))
        }

        async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            loop {
                let socket = self.socket.try_clone()?;
                let capacity = buf.len();
                let received = tokio::task::spawn_blocking(move || {
                    let mut buffer = vec![MaybeUninit::<u8>::uninit(); capacity];
                    let len = socket.recv(&mut buffer)?;
                    // SAFETY: recv initialised the first `len` bytes.
                    let data = buffer[..len]
                        .iter()
                        .map(|byte| unsafe { byte.assume_init() })
                        .collect::<Vec<u8>>();
                    Ok::<Vec<u8>, io::Error>(data)
                })
                .await
                .map_err(io::Error::other)?;

                match received {
                    Ok(data) => {
                        buf[..data.len()].copy_from_slice(&data);
                        return Ok(data.len());
                    }
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }
}
