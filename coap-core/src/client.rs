//! Blocking client (§6 "Embedder API"): `get`/`post`/`put`/`delete`
//! returning a response or error, built on the same [`Reliability`] and
//! [`Matcher`] state the server side uses rather than a separate
//! implementation of CON retransmission.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Instant;

use coap_msg::msg::CodeKind;
use coap_msg::{Id, Message, Token, TryFromBytes, TryIntoBytes};
use rand::RngCore;

use crate::config::Config;
use crate::exchange::{Reliability, RetransmitOutcome};
use crate::matcher::Matcher;
use crate::net::{Addrd, Socket};
use crate::req::{Method, ReqBuilder};
use crate::resp::Resp;

/// What can go wrong sending a blocking request.
#[derive(Debug)]
pub enum Error<E> {
  /// Couldn't resolve the destination.
  Host,
  /// The socket errored.
  Sock(E),
  /// `MAX_RETRANSMIT` retries elapsed with no ACK/response.
  TimedOut,
  /// A reply arrived but didn't parse as a response.
  MalformedReply,
}

/// A blocking CoAP client. Each call sends a request and spins on
/// [`Socket::recv`], servicing due retransmits, until the matching response
/// arrives or the retry budget is exhausted.
pub struct Client<S: Socket> {
  socket: S,
  config: Config,
  reliability: Reliability,
  matcher: Matcher,
  next_mid: u16,
}

impl<S: Socket> Client<S> {
  /// Bind a client socket with default [`Config`].
  pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, S::Error> {
    Self::bind_with_config(addr, Config::default())
  }

  /// Bind a client socket with an explicit [`Config`].
  pub fn bind_with_config<A: ToSocketAddrs>(addr: A, config: Config) -> Result<Self, S::Error> {
    let socket = S::bind(addr)?;
    Ok(Client { socket, config, reliability: Reliability::default(), matcher: Matcher::default(), next_mid: 0 })
  }

  fn fresh_mid(&mut self) -> Id {
    let id = Id(self.next_mid);
    self.next_mid = self.next_mid.wrapping_add(1);
    id
  }

  fn fresh_token() -> Token {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    Token(bytes.to_vec())
  }

  /// `GET path` from `addr`.
  pub fn get<A: ToSocketAddrs>(&mut self, addr: A, path: &str) -> Result<Resp, Error<S::Error>> {
    self.request(addr, Method::Get, path, None)
  }

  /// `POST path` with `payload` to `addr`.
  pub fn post<A: ToSocketAddrs>(&mut self, addr: A, path: &str, payload: Vec<u8>, content_format: u16) -> Result<Resp, Error<S::Error>> {
    self.request(addr, Method::Post, path, Some((payload, content_format)))
  }

  /// `PUT path` with `payload` to `addr`.
  pub fn put<A: ToSocketAddrs>(&mut self, addr: A, path: &str, payload: Vec<u8>, content_format: u16) -> Result<Resp, Error<S::Error>> {
    self.request(addr, Method::Put, path, Some((payload, content_format)))
  }

  /// `DELETE path` at `addr`.
  pub fn delete<A: ToSocketAddrs>(&mut self, addr: A, path: &str) -> Result<Resp, Error<S::Error>> {
    self.request(addr, Method::Delete, path, None)
  }

  fn request<A: ToSocketAddrs>(&mut self, addr: A, method: Method, path: &str, payload: Option<(Vec<u8>, u16)>) -> Result<Resp, Error<S::Error>> {
    let addr: SocketAddr = addr.to_socket_addrs().map_err(|_| Error::Host)?.next().ok_or(Error::Host)?;

    let mid = self.fresh_mid();
    let token = Self::fresh_token();
    let mut builder = ReqBuilder::new(method, mid, token.clone()).path(path);
    if let Some((bytes, cf)) = payload {
      builder = builder.payload(bytes, cf);
    }
    let req = builder.build();

    let bytes = (&req.0).try_into_bytes().map_err(|_| Error::MalformedReply)?;
    let now = Instant::now();
    self.socket.send(Addrd(&bytes, addr)).map_err(Self::sock_err)?;
    self.matcher.track(addr, token, mid, now);
    self.reliability.track_outbound(Addrd(mid, addr), bytes, self.config.msg.con.unacked_retry_strategy, self.config.msg.con.max_attempts, now);

    loop {
      let now = Instant::now();
      for outcome in self.reliability.poll_retransmits(now) {
        match outcome {
          | RetransmitOutcome::Resend(Addrd(bytes, dest)) => {
            let _ = self.socket.send(Addrd(&bytes, dest));
          },
          | RetransmitOutcome::TimedOut(_) => return Err(Error::TimedOut),
        }
      }

      let mut buf = [0u8; 2048];
      match self.socket.recv(&mut buf) {
        | Ok(Addrd(n, from)) if from == addr => {
          let msg = Message::try_from_bytes(&buf[..n]).map_err(|_| Error::MalformedReply)?;
          match msg.code.kind() {
            | CodeKind::Empty => {
              self.reliability.resolve(Addrd(msg.id, from));
            },
            | CodeKind::Response if self.matcher.resolve_by_token(from, &msg.token).is_some() => {
              self.reliability.resolve(Addrd(msg.id, from));
              return Resp::new(msg).ok_or(Error::MalformedReply);
            },
            | _ => {},
          }
        },
        | Ok(_) => {},
        | Err(nb::Error::WouldBlock) => {},
        | Err(nb::Error::Other(e)) => return Err(Error::Sock(e)),
      }
    }
  }

  fn sock_err(e: nb::Error<S::Error>) -> Error<S::Error> {
    match e {
      | nb::Error::WouldBlock => Error::TimedOut,
      | nb::Error::Other(e) => Error::Sock(e),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::net::UdpSocket;

  use super::*;
  use crate::net::UdpSock;

  #[test]
  fn get_roundtrips_against_a_bare_udp_echo_responder() {
    let mut client = Client::<UdpSock>::bind("127.0.0.1:0").unwrap();
    let server = UdpSocket::bind("127.0.0.1:0").unwrap();
    server.set_nonblocking(true).unwrap();
    let server_addr = server.local_addr().unwrap();

    let handle = std::thread::spawn(move || {
      let mut buf = [0u8; 2048];
      loop {
        match server.recv_from(&mut buf) {
          | Ok((n, from)) => {
            let req = Message::try_from_bytes(&buf[..n]).unwrap();
            let mut resp = Message::new(coap_msg::Type::Ack, coap_msg::Code::CONTENT, req.id, req.token);
            resp.payload = coap_msg::Payload(b"hi".to_vec());
            let bytes = (&resp).try_into_bytes().unwrap();
            server.send_to(&bytes, from).unwrap();
            return;
          },
          | Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            std::thread::sleep(std::time::Duration::from_millis(5));
          },
          | Err(e) => panic!("{e:?}"),
        }
      }
    });

    let resp = client.get(server_addr, "/basic").unwrap();
    assert_eq!(resp.0.payload.0, b"hi");
    handle.join().unwrap();
  }
}
