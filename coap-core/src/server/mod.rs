//! The endpoint (§2 C8): owns the socket and every piece of mutable
//! protocol state, and drives the single-threaded cooperative poll loop
//! described in §5.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Instant;

use coap_msg::msg::opt::known::block::Block;
use coap_msg::msg::opt::known::observe::SequenceNumber;
use coap_msg::msg::opt::known::is_known;
use coap_msg::{Code, Id, Message, TryFromBytes, TryIntoBytes, Type};
use log::{debug, trace, warn};

use crate::block::{AssembleOutcome, Block1Assembler, Block2Cache};
use crate::config::Config;
use crate::error::{Error, What, When};
use crate::exchange::{Reliability, RetransmitOutcome};
use crate::matcher::Matcher;
use crate::net::{Addrd, Socket};
use crate::observe::Observers;
use crate::option::MessageOptionsExt;
use crate::proxy::Proxy;
use crate::req::{Method, Req};
use crate::resource::{Resource, ResourceId, ResourceTree};
use crate::resp::Resp;
use crate::step::dispatch::{self, Dispatched};

/// A request parked because its handler returned
/// [`crate::resource::HandlerOutcome::Pending`]. Resumed on every
/// subsequent `poll()` tick (§4.2/§5 separate response) until the handler
/// stops declining.
struct Deferred {
  req: Req,
  addr: SocketAddr,
  observe_requested: Option<SequenceNumber>,
  /// Type the eventual response must carry: `Con` if the original request
  /// was CON (already ACKed, so the final reply needs its own MID and its
  /// own retransmission), otherwise whatever the request itself was.
  final_ty: Type,
}

/// A running CoAP endpoint: resource tree, reliability/matcher/observe/
/// blockwise/proxy state, and the UDP socket they all funnel through.
pub struct Endpoint<S: Socket> {
  socket: S,
  config: Config,
  tree: ResourceTree,
  reliability: Reliability,
  matcher: Matcher,
  observers: Observers,
  block2: Block2Cache,
  block1: Block1Assembler,
  proxy: Proxy,
  deferred: Vec<Deferred>,
  next_mid: u16,
  last_purge: Instant,
}

impl<S: Socket> Endpoint<S> {
  /// Bind a new endpoint with default [`Config`].
  pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, S::Error> {
    Self::bind_with_config(addr, Config::default())
  }

  /// Bind a new endpoint with an explicit [`Config`].
  pub fn bind_with_config<A: ToSocketAddrs>(addr: A, config: Config) -> Result<Self, S::Error> {
    let socket = S::bind(addr)?;
    let block1 = Block1Assembler::new(config.max_payload * 16);
    Ok(Endpoint { socket,
                  config,
                  tree: ResourceTree::default(),
                  reliability: Reliability::default(),
                  matcher: Matcher::default(),
                  observers: Observers::default(),
                  block2: Block2Cache::default(),
                  block1,
                  proxy: Proxy::default(),
                  deferred: Vec::new(),
                  next_mid: 0,
                  last_purge: Instant::now() })
  }

  /// Register a resource at `path`, creating invisible structural parents
  /// as needed.
  pub fn add_resource(&mut self, path: &str, resource: Resource) -> ResourceId {
    self.tree.add_resource(path, resource)
  }

  /// The address this endpoint's socket is bound to.
  pub fn local_addr(&self) -> Result<SocketAddr, S::Error> {
    self.socket.local_addr()
  }

  fn fresh_mid(&mut self) -> Id {
    let id = Id(self.next_mid);
    self.next_mid = self.next_mid.wrapping_add(1);
    id
  }

  fn send(&self, addr: SocketAddr, msg: &Message) -> Result<(), Error> {
    let bytes = msg.try_into_bytes().map_err(|e| Error::new(When::Sending, What::ToBytes(e)))?;
    match self.socket.send(Addrd(&bytes, addr)) {
      | Ok(()) | Err(nb::Error::WouldBlock) => Ok(()),
      | Err(nb::Error::Other(e)) => Err(Error::new(When::Sending, What::SockError(e))),
    }
  }

  /// One tick of the event loop: drain at most one inbound datagram,
  /// service due retransmits, and run the periodic purge sweep.
  pub fn poll(&mut self, now: Instant) -> Result<(), Error> {
    let mut buf = [0u8; 2048];
    match self.socket.recv(&mut buf) {
      | Ok(Addrd(n, addr)) => self.handle_datagram(Addrd(&buf[..n], addr), now),
      | Err(nb::Error::WouldBlock) => {},
      | Err(nb::Error::Other(e)) => return Err(Error::new(When::Polling, What::SockError(e))),
    }

    self.resume_deferred(now);

    for outcome in self.reliability.poll_retransmits(now) {
      match outcome {
        | RetransmitOutcome::Resend(Addrd(bytes, addr)) => {
          if let Err(nb::Error::Other(e)) = self.socket.send(Addrd(&bytes, addr)) {
            warn!("retransmit to {addr} failed: {e:?}");
          }
        },
        | RetransmitOutcome::TimedOut(id) => {
          debug!("exchange {:?} timed out after MAX_RETRANSMIT", id.data());
          if let Some((downstream_addr, downstream_token, downstream_mid)) = self.proxy.fail_upstream_mid(*id.data()) {
            let err = Message::new(Type::Con, Code::GATEWAY_TIMEOUT, downstream_mid, downstream_token);
            let _ = self.send(downstream_addr, &err);
          }
        },
      }
    }

    if now.saturating_duration_since(self.last_purge) >= self.config.exchange_lifetime() / 2 {
      self.reliability.purge(now, self.config.exchange_lifetime());
      self.matcher.purge(now, self.config.exchange_lifetime());
      self.block2.purge(now, self.config.exchange_lifetime());
      self.block1.purge(now, self.config.exchange_lifetime());
      self.last_purge = now;
    }

    Ok(())
  }

  fn handle_datagram(&mut self, datagram: Addrd<&[u8]>, now: Instant) {
    let Addrd(bytes, addr) = datagram;
    let msg = match Message::try_from_bytes(bytes) {
      | Ok(msg) => msg,
      | Err(e) => {
        trace!("malformed datagram from {addr}: {e:?}");
        return;
      },
    };

    match msg.code.kind() {
      | coap_msg::msg::CodeKind::Empty => self.handle_empty(msg, addr, now),
      | coap_msg::msg::CodeKind::Request => self.handle_request(msg, addr, now),
      | coap_msg::msg::CodeKind::Response => self.handle_response(msg, addr),
    }
  }

  fn handle_empty(&mut self, msg: Message, addr: SocketAddr, _now: Instant) {
    let id = Addrd(msg.id, addr);
    self.reliability.resolve(id);

    if let Some(token) = self.matcher.resolve_by_mid(addr, msg.id) {
      if msg.ty == Type::Rst {
        self.matcher.resolve_by_token(addr, &token);
        self.observers.deregister(addr, &token);
      }
    }

    if msg.ty == Type::Rst {
      if let Some((downstream_addr, downstream_token, downstream_mid)) = self.proxy.fail_upstream_mid(msg.id) {
        let err = Message::new(Type::Con, Code::GATEWAY_TIMEOUT, downstream_mid, downstream_token);
        let _ = self.send(downstream_addr, &err);
      }
    }
  }

  fn handle_response(&mut self, msg: Message, addr: SocketAddr) {
    if let Some((downstream_addr, downstream_token, downstream_mid)) = self.proxy.resolve_upstream_token(&msg.token) {
      self.reliability.resolve(Addrd(msg.id, addr));
      let mut forwarded = msg;
      forwarded.id = downstream_mid;
      forwarded.token = downstream_token;
      forwarded.ty = Type::Con;
      let _ = self.send(downstream_addr, &forwarded);
      return;
    }

    match self.matcher.resolve_by_token(addr, &msg.token) {
      | Some(_) => {
        self.reliability.resolve(Addrd(msg.id, addr));
      },
      | None => {
        warn!("unsolicited response from {addr}, token {:?} — replying RST", msg.token);
        let rst = Message::empty(Type::Rst, msg.id);
        let _ = self.send(addr, &rst);
      },
    }
  }

  fn handle_request(&mut self, msg: Message, addr: SocketAddr, now: Instant) {
    let exchange_id = Addrd(msg.id, addr);

    // For CON, resend the cached reply (or do nothing if the original is
    // still in flight). For NON there's nothing to resend — the client
    // isn't waiting on a retransmit timer — so a duplicate is just
    // dropped silently without re-invoking the handler (§4.2).
    if let Some(cached) = self.reliability.check_duplicate(exchange_id, now) {
      if msg.ty == Type::Con {
        if let Some(bytes) = cached {
          let _ = self.socket.send(Addrd(&bytes, addr));
        }
      }
      return;
    }

    if msg.proxy_uri().is_some() {
      self.handle_proxy_request(msg, addr, now);
      return;
    }

    let Some(mut req) = Req::new(msg) else {
      return;
    };

    let ack_type = if req.0.ty == Type::Con { Type::Ack } else { Type::Non };

    if let Some(bad) = req.0.opts.keys().find(|n| n.is_critical() && !is_known(n.0)).copied() {
      warn!("unrecognized critical option {} from {addr}, replying 4.02", bad.0);
      let resp = Resp::to(&req.0, ack_type, Code::BAD_OPTION);
      if let Ok(bytes) = resp.0.clone().try_into_bytes() {
        self.reliability.cache_response(exchange_id, bytes);
      }
      let _ = self.send(addr, &resp.0);
      return;
    }

    if let Some(block1) = req.block1() {
      match self.block1.accept(addr, req.0.token.clone(), block1, &req.0.payload.0, now) {
        | AssembleOutcome::Continue => {
          let mid = if req.0.ty == Type::Con { req.0.id } else { self.fresh_mid() };
          let mut resp = Resp::to(&req.0, if req.0.ty == Type::Con { Type::Ack } else { Type::Non }, Code::CONTINUE);
          resp.0.id = mid;
          resp.set_block1(block1);
          let _ = self.send(addr, &resp.0);
          if req.0.ty == Type::Con {
            self.reliability.cache_response(exchange_id, resp.0.clone().try_into_bytes().unwrap_or_default());
          }
          return;
        },
        | AssembleOutcome::Complete(full_body) => {
          req.0.payload = coap_msg::Payload(full_body);
        },
        | AssembleOutcome::TooLarge => {
          let mut resp = Resp::to(&req.0, if req.0.ty == Type::Con { Type::Ack } else { Type::Non }, Code::REQUEST_ENTITY_TOO_LARGE);
          resp.set_size1(self.config.max_payload as u32);
          let _ = self.send(addr, &resp.0);
          return;
        },
      }
    }

    if req.method() == Method::Get {
      if let Some(block2) = req.block2() {
        if block2.num > 0 {
          if let Some(served) = self.block2.serve(addr, &req.0.token, block2.num, block2.szx) {
            let mut resp = Resp::to(&req.0, if req.0.ty == Type::Con { Type::Ack } else { Type::Non }, Code::CONTENT);
            resp.set_payload(served.data.to_vec(), served.content_format.unwrap_or(0));
            resp.set_block2(Block { num: block2.num, more: served.more, szx: block2.szx.min(self.config.default_block_szx) });
            if let Some(etag) = served.etag {
              resp.set_etag(etag.to_vec());
            }
            let _ = self.send(addr, &resp.0);
            return;
          }
        }
      }
    }

    let observe_requested = req.observe();
    let method = req.method();
    let path = req.path_segments().map(|s| s.join("/")).unwrap_or_default();

    let dispatched = dispatch::dispatch(&mut self.tree, &req, ack_type);

    if dispatched.resp.is_none() {
      // Handler isn't ready yet. Stop the client's retransmit timer with an
      // empty ACK (CON only — NON has none to stop) and park the request;
      // `resume_deferred` re-dispatches it on a later tick. The eventual
      // reply to a CON request goes out as a fresh CON (§4.2), since the
      // ACK already consumed this MID.
      let final_ty = if req.0.ty == Type::Con {
        let ack = Message::empty(Type::Ack, req.0.id);
        let _ = self.send(addr, &ack);
        Type::Con
      } else {
        req.0.ty
      };
      self.deferred.push(Deferred { req, addr, observe_requested, final_ty });
      return;
    }

    self.finish_dispatch(&req, addr, dispatched, observe_requested, method, &path, now, false);
  }

  /// Re-dispatch every parked request. Still-pending handlers stay parked
  /// for the next tick; resolved ones get their deferred reply sent.
  fn resume_deferred(&mut self, now: Instant) {
    let parked = std::mem::take(&mut self.deferred);
    for entry in parked {
      let dispatch_ty = if entry.req.0.ty == Type::Con { Type::Ack } else { Type::Non };
      let mut dispatched = dispatch::dispatch(&mut self.tree, &entry.req, dispatch_ty);

      if dispatched.resp.is_none() {
        self.deferred.push(entry);
        continue;
      }

      if let Some(resp) = dispatched.resp.as_mut() {
        resp.0.ty = entry.final_ty;
      }

      let method = entry.req.method();
      let path = entry.req.path_segments().map(|s| s.join("/")).unwrap_or_default();
      self.finish_dispatch(&entry.req, entry.addr, dispatched, entry.observe_requested, method, &path, now, true);
    }
  }

  /// Shared tail of request handling: observe registration, oversized-GET
  /// blockwise split, send, and mutation fan-out. `deferred_completion`
  /// distinguishes a piggybacked/immediate reply (cached for CON dedup)
  /// from a separate response completing a parked handler (assigned a
  /// fresh MID and tracked for retransmission instead).
  fn finish_dispatch(&mut self, req: &Req, addr: SocketAddr, mut dispatched: Dispatched, observe_requested: Option<SequenceNumber>, method: Method, path: &str, now: Instant, deferred_completion: bool) {
    let mut resp = dispatched.resp.take().expect("finish_dispatch requires a resolved dispatch");

    if deferred_completion && req.0.ty == Type::Con {
      resp.0.id = self.fresh_mid();
    }

    if let Some(resource) = dispatched.resource {
      match observe_requested {
        | Some(seq) if seq.0 == 0 && method == Method::Get => {
          if self.tree.get(resource).map(|r| r.observable).unwrap_or(false) {
            let current = self.tree.get(resource).map(|r| r.observe_seq).unwrap_or_default();
            self.observers.register(addr, req.0.token.clone(), path.to_string(), current, resp.0.id, req.content_format(), req.0.ty);
            resp.set_observe(current);
          }
        },
        | Some(seq) if seq.0 == 1 => {
          self.observers.deregister(addr, &req.0.token);
        },
        | _ => {},
      }
    }

    if coap_msg::serialized_len(&resp.0) > self.config.max_payload && method == Method::Get {
      let szx = self.config.default_block_szx;
      let full = resp.0.payload.0.clone();
      let etag = resp.0.get_option(coap_msg::msg::opt::known::ETAG).map(|v| v.0.clone());
      let cf = resp.content_format();
      self.block2.store(addr, req.0.token.clone(), full.clone(), etag.clone(), cf, szx, now);
      let size = Block::size_for_szx(szx);
      let more = full.len() > size;
      resp.0.payload = coap_msg::Payload(full[..size.min(full.len())].to_vec());
      resp.set_block2(Block { num: 0, more, szx });
    }

    let bytes = resp.0.clone().try_into_bytes().ok();
    let _ = self.send(addr, &resp.0);

    if deferred_completion {
      if resp.0.ty == Type::Con {
        if let Some(bytes) = bytes {
          self.reliability.track_outbound(Addrd(resp.0.id, addr), bytes, self.config.msg.con.acked_retry_strategy, self.config.msg.con.max_attempts, now);
        }
      }
    } else if let Some(bytes) = bytes {
      self.reliability.cache_response(Addrd(req.0.id, addr), bytes);
    }

    if dispatched.mutated {
      if let Some(resource) = dispatched.resource {
        if method == Method::Delete {
          self.notify_deletion(path);
          for (_, descendant_path) in self.tree.remove(resource) {
            if descendant_path != path {
              // Already torn down in `notify_deletion`; cascaded children
              // just lose their observers without an individual 4.04.
              self.observers.remove_all_of_path(&descendant_path);
            }
          }
        } else {
          self.notify_mutation(resource, path, now);
        }
      }
    }
  }

  fn notify_mutation(&mut self, resource: ResourceId, path: &str, now: Instant) {
    let Some(res) = self.tree.get(resource) else { return };
    let seq = res.observe_seq;
    let payload = res.payload.clone();
    let content_format = res.content_format;

    let targets: Vec<_> = self.observers.of_path(path).map(|(id, obs)| (id, obs.notify_as)).collect();
    for (id, notify_as) in targets {
      if !self.observers.is_fresh(&id, seq) {
        continue;
      }
      let mid = self.fresh_mid();
      let mut notification = Message::new(notify_as, Code::CONTENT, mid, id.data().clone());
      notification.set_content_format(content_format);
      notification.payload = coap_msg::Payload(payload.clone());
      notification.set_observe(seq);

      if notify_as == Type::Con {
        if let Ok(bytes) = (&notification).try_into_bytes() {
          self.reliability.track_outbound(Addrd(mid, id.addr()), bytes, self.config.msg.con.unacked_retry_strategy, self.config.msg.con.max_attempts, now);
        }
      }
      let _ = self.send(id.addr(), &notification);
      self.observers.record_notified(&id, seq, mid);
    }
  }

  fn notify_deletion(&mut self, path: &str) {
    let removed = self.observers.remove_all_of_path(path);
    for (id, _obs) in removed {
      let mid = self.fresh_mid();
      let notification = Message::new(Type::Non, Code::NOT_FOUND, mid, id.data().clone());
      let _ = self.send(id.addr(), &notification);
    }
  }

  fn handle_proxy_request(&mut self, msg: Message, addr: SocketAddr, now: Instant) {
    // Forwarding is inherently asynchronous relative to the downstream CON
    // (the upstream reply arrives on a later poll tick), so ACK the
    // downstream request immediately to stop its retransmits; the eventual
    // reply goes back as a fresh CON (handled in handle_response).
    if msg.ty == Type::Con {
      let ack = Message::empty(Type::Ack, msg.id);
      let _ = self.send(addr, &ack);
    }

    match self.proxy.build_upstream_request(addr, &msg) {
      | Ok(((host, port), upstream)) => {
        let Some(upstream_addr) = (host.as_str(), port).to_socket_addrs().ok().and_then(|mut a| a.next()) else {
          let _ = self.proxy.fail_upstream_mid(upstream.id);
          let err = Message::new(Type::Con, Code::PROXYING_NOT_SUPPORTED, self.fresh_mid(), msg.token);
          let _ = self.send(addr, &err);
          return;
        };

        if let Ok(bytes) = (&upstream).try_into_bytes() {
          self.reliability.track_outbound(Addrd(upstream.id, upstream_addr), bytes, self.config.msg.con.unacked_retry_strategy, self.config.msg.con.max_attempts, now);
        }
        let _ = self.send(upstream_addr, &upstream);
      },
      | Err(_) => {
        let err = Message::new(Type::Con, Code::PROXYING_NOT_SUPPORTED, self.fresh_mid(), msg.token);
        let _ = self.send(addr, &err);
      },
    }
  }
}
