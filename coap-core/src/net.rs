use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// Data that came from (or is going to) a network socket, paired with the
/// endpoint on the other end.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub struct Addrd<T>(pub T, pub SocketAddr);

impl<T> Addrd<T> {
  /// Borrow the contents of this `Addrd`
  pub fn as_ref(&self) -> Addrd<&T> {
    Addrd(&self.0, self.1)
  }

  /// Discard the socket address and get the data
  pub fn unwrap(self) -> T {
    self.0
  }

  /// Map the data, keeping the address
  pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Addrd<R> {
    Addrd(f(self.0), self.1)
  }

  /// Map the data with access to the address
  pub fn map_with_addr<R>(self, f: impl FnOnce(T, SocketAddr) -> R) -> Addrd<R> {
    Addrd(f(self.0, self.1), self.1)
  }

  /// Borrow the contents
  pub fn data(&self) -> &T {
    &self.0
  }

  /// Mutably borrow the contents
  pub fn data_mut(&mut self) -> &mut T {
    &mut self.0
  }

  /// Copy the address
  pub fn addr(&self) -> SocketAddr {
    self.1
  }

  /// Consume into `(data, addr)`
  pub fn fold<R>(self, f: impl FnOnce(T, SocketAddr) -> R) -> R {
    f(self.0, self.1)
  }
}

/// A CoAP network socket.
///
/// Mirrors `std::net::UdpSocket`, but non-blocking `recv`/`send` report
/// "nothing yet" as `nb::Error::WouldBlock` rather than an OS error, so the
/// endpoint's event loop can poll it uniformly alongside timers.
pub trait Socket: Sized {
  /// Error yielded by socket operations
  type Error: std::fmt::Debug;

  /// The local address this socket is bound to
  fn local_addr(&self) -> Result<SocketAddr, Self::Error>;

  /// Bind to an address in non-blocking mode
  fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, Self::Error>;

  /// Send a datagram to a remote address
  fn send(&self, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error>;

  /// Receive a datagram, if one is queued
  fn recv(&self, buf: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error>;
}

/// [`Socket`] implementation backed by `std::net::UdpSocket`.
#[derive(Debug)]
pub struct UdpSock(UdpSocket);

impl Socket for UdpSock {
  type Error = io::Error;

  fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
    self.0.local_addr()
  }

  fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, Self::Error> {
    let sock = UdpSocket::bind(addr)?;
    sock.set_nonblocking(true)?;
    Ok(UdpSock(sock))
  }

  fn send(&self, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error> {
    let Addrd(bytes, addr) = msg;
    self.0.send_to(bytes, addr).map(|_| ()).map_err(to_nb)
  }

  fn recv(&self, buf: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error> {
    self.0.recv_from(buf).map(|(n, addr)| Addrd(n, addr)).map_err(to_nb)
  }
}

fn to_nb(e: io::Error) -> nb::Error<io::Error> {
  if e.kind() == io::ErrorKind::WouldBlock {
    nb::Error::WouldBlock
  } else {
    nb::Error::Other(e)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn loopback_send_recv() {
    let a = UdpSock::bind("127.0.0.1:0").unwrap();
    let b = UdpSock::bind("127.0.0.1:0").unwrap();
    let b_addr = b.local_addr().unwrap();

    a.send(Addrd(b"hi".as_ref(), b_addr)).unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));

    let mut buf = [0u8; 16];
    let Addrd(n, _) = b.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hi");
  }
}
