//! End-to-end scenarios against a real `Endpoint<UdpSock>` over loopback
//! UDP: the request lifecycle, dedup, observe, blockwise and the forward
//! proxy.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use coap_core::option::MessageOptionsExt;
use coap_core::resource::{HandlerOutcome, HandlerResponse, Resource};
use coap_core::{Client, Config, Endpoint, UdpSock};
use coap_msg::msg::opt::known::block::Block;
use coap_msg::msg::opt::known::observe::SequenceNumber;
use coap_msg::{Code, Id, Message, Token, TryFromBytes, TryIntoBytes, Type};

/// Runs an endpoint's poll loop on a background thread until the returned
/// flag is cleared, mirroring the `loop { endpoint.poll(..) }` shape every
/// example in this crate uses.
fn spawn_endpoint(endpoint: Endpoint<UdpSock>) -> (SocketAddr, Arc<AtomicBool>) {
  let mut endpoint = endpoint;
  let addr = endpoint.local_addr().unwrap();
  let running = Arc::new(AtomicBool::new(true));
  let running_thread = running.clone();
  std::thread::spawn(move || {
    while running_thread.load(Ordering::Relaxed) {
      let _ = endpoint.poll(Instant::now());
      std::thread::sleep(Duration::from_millis(2));
    }
  });
  (addr, running)
}

/// Config with short, fixed retry delays so the gateway-timeout scenario
/// doesn't need to wait out the real `ACK_TIMEOUT` defaults.
fn fast_config() -> Config {
  let mut cfg = Config::default();
  cfg.msg.con.unacked_retry_strategy = coap_core::retry::Strategy::Delay { min: Duration::from_millis(20), max: Duration::from_millis(20) };
  cfg.msg.con.max_attempts = coap_core::retry::Attempts(2);
  cfg
}

#[test]
fn get_basic_resource_end_to_end() {
  let mut endpoint = Endpoint::<UdpSock>::bind("127.0.0.1:0").unwrap();
  endpoint.add_resource("/basic",
                         Resource::new("basic").with_payload(b"Basic Resource".to_vec(), 0)
                                                .on_get(|_, r| HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()), ..Default::default() })));
  let (addr, running) = spawn_endpoint(endpoint);

  let mut client = Client::<UdpSock>::bind("127.0.0.1:0").unwrap();
  let resp = client.get(addr, "/basic").unwrap();
  assert_eq!(resp.0.code, Code::CONTENT);
  assert_eq!(resp.0.payload.0, b"Basic Resource");

  running.store(false, Ordering::Relaxed);
}

#[test]
fn duplicate_con_is_answered_from_cache_without_rerunning_the_handler() {
  let calls = Arc::new(AtomicUsize::new(0));
  let calls_handler = calls.clone();

  let mut endpoint = Endpoint::<UdpSock>::bind("127.0.0.1:0").unwrap();
  endpoint.add_resource("/basic",
                         Resource::new("basic").with_payload(b"hi".to_vec(), 0).on_get(move |_, r| {
                           calls_handler.fetch_add(1, Ordering::Relaxed);
                           HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()), ..Default::default() })
                         }));
  let (addr, running) = spawn_endpoint(endpoint);

  let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
  sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

  let mut req = Message::new(Type::Con, Code::GET, Id(42), Token(vec![7]));
  req.set_path("/basic");
  let bytes = (&req).try_into_bytes().unwrap();

  sock.send_to(&bytes, addr).unwrap();
  let mut buf = [0u8; 2048];
  let (n1, _) = sock.recv_from(&mut buf).unwrap();
  let first = Message::try_from_bytes(&buf[..n1]).unwrap();

  // Same MID from the same peer: this is a retransmit, not a new request.
  sock.send_to(&bytes, addr).unwrap();
  let (n2, _) = sock.recv_from(&mut buf).unwrap();
  let second = Message::try_from_bytes(&buf[..n2]).unwrap();

  assert_eq!(first, second);
  assert_eq!(calls.load(Ordering::Relaxed), 1);

  running.store(false, Ordering::Relaxed);
}

#[test]
fn observe_lifecycle_registers_and_notifies_on_mutation() {
  let mut endpoint = Endpoint::<UdpSock>::bind("127.0.0.1:0").unwrap();
  endpoint.add_resource("/counter",
                         Resource::new("counter").observable(true)
                                                  .with_payload(b"0".to_vec(), 0)
                                                  .on_get(|_, r| HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()), ..Default::default() }))
                                                  .on_put(|req, r| {
                                                    r.payload = req.payload.clone();
                                                    HandlerOutcome::Ok(HandlerResponse::default())
                                                  }));
  let (addr, running) = spawn_endpoint(endpoint);

  let observer = UdpSocket::bind("127.0.0.1:0").unwrap();
  observer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

  let mut register = Message::new(Type::Con, Code::GET, Id(1), Token(vec![1, 2, 3]));
  register.set_path("/counter");
  register.set_observe(SequenceNumber::new(0));
  let bytes = (&register).try_into_bytes().unwrap();
  observer.send_to(&bytes, addr).unwrap();

  let mut buf = [0u8; 2048];
  let (n, _) = observer.recv_from(&mut buf).unwrap();
  let first = Message::try_from_bytes(&buf[..n]).unwrap();
  assert_eq!(first.code, Code::CONTENT);
  assert!(first.observe().is_some());

  let mut client = Client::<UdpSock>::bind("127.0.0.1:0").unwrap();
  client.put(addr, "/counter", b"1".to_vec(), 0).unwrap();

  let (n, _) = observer.recv_from(&mut buf).unwrap();
  let notification = Message::try_from_bytes(&buf[..n]).unwrap();
  assert_eq!(notification.token, Token(vec![1, 2, 3]));
  assert_eq!(notification.payload.0, b"1");
  let seq = notification.observe().unwrap();
  assert!(seq.is_newer_than(SequenceNumber::new(0)));

  running.store(false, Ordering::Relaxed);
}

#[test]
fn blockwise_get_serves_successive_blocks() {
  let body: Vec<u8> = (0..2500u32).map(|i| (i % 256) as u8).collect();

  let mut endpoint = Endpoint::<UdpSock>::bind("127.0.0.1:0").unwrap();
  endpoint.add_resource("/big",
                         Resource::new("big").with_payload(body.clone(), 0).on_get(|_, r| HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()), ..Default::default() })));
  let (addr, running) = spawn_endpoint(endpoint);

  let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
  sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

  let mut assembled = Vec::new();
  let token = Token(vec![0x55]);
  let mut num = 0u32;
  loop {
    let mut req = Message::new(Type::Con, Code::GET, Id(num as u16), token.clone());
    req.set_path("/big");
    if num > 0 {
      req.set_block2(Block { num, more: false, szx: 6 });
    }
    let bytes = (&req).try_into_bytes().unwrap();
    sock.send_to(&bytes, addr).unwrap();

    let mut buf = [0u8; 2048];
    let (n, _) = sock.recv_from(&mut buf).unwrap();
    let resp = Message::try_from_bytes(&buf[..n]).unwrap();
    assert_eq!(resp.code, Code::CONTENT);

    let block = resp.block2().unwrap();
    assembled.extend_from_slice(&resp.payload.0);
    if !block.more {
      break;
    }
    num = block.num + 1;
  }

  assert_eq!(assembled, body);
  running.store(false, Ordering::Relaxed);
}

#[test]
fn forward_proxy_relays_a_request_to_the_origin_and_back() {
  let mut origin = Endpoint::<UdpSock>::bind("127.0.0.1:0").unwrap();
  origin.add_resource("/basic",
                       Resource::new("basic").with_payload(b"from origin".to_vec(), 0)
                                              .on_get(|_, r| HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()), ..Default::default() })));
  let (origin_addr, origin_running) = spawn_endpoint(origin);

  let proxy = Endpoint::<UdpSock>::bind("127.0.0.1:0").unwrap();
  let (proxy_addr, proxy_running) = spawn_endpoint(proxy);

  let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
  sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

  let mut req = Message::new(Type::Con, Code::GET, Id(1), Token(vec![9]));
  req.set_option(coap_msg::msg::opt::known::PROXY_URI, format!("coap://{origin_addr}/basic").into_bytes());
  let bytes = (&req).try_into_bytes().unwrap();
  sock.send_to(&bytes, proxy_addr).unwrap();

  let mut buf = [0u8; 2048];

  // Immediate empty ACK stopping our retransmits.
  let (n, _) = sock.recv_from(&mut buf).unwrap();
  let ack = Message::try_from_bytes(&buf[..n]).unwrap();
  assert_eq!(ack.ty, Type::Ack);
  assert_eq!(ack.code, Code::EMPTY);

  // Then the forwarded reply, as a fresh CON carrying our original token.
  let (n, _) = sock.recv_from(&mut buf).unwrap();
  let reply = Message::try_from_bytes(&buf[..n]).unwrap();
  assert_eq!(reply.code, Code::CONTENT);
  assert_eq!(reply.token, Token(vec![9]));
  assert_eq!(reply.payload.0, b"from origin");

  origin_running.store(false, Ordering::Relaxed);
  proxy_running.store(false, Ordering::Relaxed);
}

#[test]
fn forward_proxy_reports_gateway_timeout_when_origin_never_answers() {
  // Bind and immediately drop a socket: its address is very unlikely to be
  // reused during the test, so the upstream CON just goes unanswered.
  let dead_origin = UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap();

  let proxy = Endpoint::<UdpSock>::bind_with_config("127.0.0.1:0", fast_config()).unwrap();
  let (proxy_addr, proxy_running) = spawn_endpoint(proxy);

  let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
  sock.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

  let mut req = Message::new(Type::Con, Code::GET, Id(1), Token(vec![3]));
  req.set_option(coap_msg::msg::opt::known::PROXY_URI, format!("coap://{dead_origin}/basic").into_bytes());
  let bytes = (&req).try_into_bytes().unwrap();
  sock.send_to(&bytes, proxy_addr).unwrap();

  let mut buf = [0u8; 2048];
  let (n, _) = sock.recv_from(&mut buf).unwrap();
  let ack = Message::try_from_bytes(&buf[..n]).unwrap();
  assert_eq!(ack.ty, Type::Ack);

  let (n, _) = sock.recv_from(&mut buf).unwrap();
  let reply = Message::try_from_bytes(&buf[..n]).unwrap();
  assert_eq!(reply.code, Code::GATEWAY_TIMEOUT);
  assert_eq!(reply.token, Token(vec![3]));

  proxy_running.store(false, Ordering::Relaxed);
}

#[test]
fn slow_handler_gets_an_empty_ack_then_a_separate_response() {
  let attempts = Arc::new(AtomicUsize::new(0));
  let attempts_handler = attempts.clone();

  let mut endpoint = Endpoint::<UdpSock>::bind("127.0.0.1:0").unwrap();
  endpoint.add_resource("/separate",
                         Resource::new("separate").on_get(move |_, _| {
                           if attempts_handler.fetch_add(1, Ordering::Relaxed) < 3 {
                             HandlerOutcome::Pending
                           } else {
                             HandlerOutcome::Ok(HandlerResponse { payload: Some(b"done".to_vec()), ..Default::default() })
                           }
                         }));
  let (addr, running) = spawn_endpoint(endpoint);

  let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
  sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

  let mut req = Message::new(Type::Con, Code::GET, Id(5), Token(vec![4]));
  req.set_path("/separate");
  let bytes = (&req).try_into_bytes().unwrap();
  sock.send_to(&bytes, addr).unwrap();

  let mut buf = [0u8; 2048];
  let (n, _) = sock.recv_from(&mut buf).unwrap();
  let ack = Message::try_from_bytes(&buf[..n]).unwrap();
  assert_eq!(ack.ty, Type::Ack);
  assert_eq!(ack.code, Code::EMPTY);

  let (n, _) = sock.recv_from(&mut buf).unwrap();
  let reply = Message::try_from_bytes(&buf[..n]).unwrap();
  assert_eq!(reply.ty, Type::Con);
  assert_eq!(reply.code, Code::CONTENT);
  assert_eq!(reply.token, Token(vec![4]));
  assert_eq!(reply.payload.0, b"done");
  assert_ne!(reply.id, Id(5));

  running.store(false, Ordering::Relaxed);
}

#[test]
fn duplicate_non_is_dropped_without_rerunning_the_handler() {
  let calls = Arc::new(AtomicUsize::new(0));
  let calls_handler = calls.clone();

  let mut endpoint = Endpoint::<UdpSock>::bind("127.0.0.1:0").unwrap();
  endpoint.add_resource("/basic",
                         Resource::new("basic").with_payload(b"hi".to_vec(), 0).on_get(move |_, r| {
                           calls_handler.fetch_add(1, Ordering::Relaxed);
                           HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()), ..Default::default() })
                         }));
  let (addr, running) = spawn_endpoint(endpoint);

  let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
  sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

  let mut req = Message::new(Type::Non, Code::GET, Id(99), Token(vec![8]));
  req.set_path("/basic");
  let bytes = (&req).try_into_bytes().unwrap();

  sock.send_to(&bytes, addr).unwrap();
  let mut buf = [0u8; 2048];
  let (n1, _) = sock.recv_from(&mut buf).unwrap();
  let first = Message::try_from_bytes(&buf[..n1]).unwrap();
  assert_eq!(first.code, Code::CONTENT);

  // Same MID from the same peer, sent NON: no retransmit timer to stop, so
  // it's dropped silently rather than answered from cache.
  sock.send_to(&bytes, addr).unwrap();
  sock.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
  assert!(sock.recv_from(&mut buf).is_err());

  assert_eq!(calls.load(Ordering::Relaxed), 1);

  running.store(false, Ordering::Relaxed);
}
