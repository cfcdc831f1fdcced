//! A small endpoint exercising most of the surface: a plain resource, an
//! observable counter bumped by PUT, and a child-creating collection.

use coap_core::resource::{HandlerOutcome, HandlerResponse, Resource};
use coap_core::{Endpoint, UdpSock};

mod service {
  use super::*;

  pub fn hello() -> Resource {
    Resource::new("hello").with_payload(b"hello, world!".to_vec(), 0)
                          .on_get(|_, r| {
                            log::info!("a client said hello");
                            HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()), ..Default::default() })
                          })
  }

  pub fn counter() -> Resource {
    Resource::new("counter").with_payload(b"0".to_vec(), 0)
                            .observable(true)
                            .on_get(|_, r| HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()), ..Default::default() }))
                            .on_put(|req, r| {
                              log::info!("counter bumped by {} bytes of payload", req.payload.len());
                              let n: u64 = std::str::from_utf8(&r.payload).ok().and_then(|s| s.parse().ok()).unwrap_or(0);
                              let next = (n + 1).to_string().into_bytes();
                              HandlerOutcome::Ok(HandlerResponse { payload: Some(next), ..Default::default() })
                            })
  }

  pub fn things() -> Resource {
    let mut things = Resource::new("things").allow_children(true)
                                            .on_get(|_, r| HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()), ..Default::default() }));
    things.handlers.new_resource = Some(Box::new(|segment| {
      log::info!("creating /things/{segment}");
      Resource::new(segment).on_get(|_, r| HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()), ..Default::default() }))
    }));
    things
  }
}

fn main() {
  simple_logger::init_with_level(log::Level::Info).unwrap();

  let mut endpoint = Endpoint::<UdpSock>::bind("127.0.0.1:5683").unwrap();
  endpoint.add_resource("/hello", service::hello());
  endpoint.add_resource("/counter", service::counter());
  endpoint.add_resource("/things", service::things());

  log::info!("listening on 127.0.0.1:5683");

  loop {
    if let Err(e) = endpoint.poll(std::time::Instant::now()) {
      log::error!("poll error: {e:?}");
    }
    std::thread::sleep(std::time::Duration::from_millis(10));
  }
}
