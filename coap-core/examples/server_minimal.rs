//! Smallest possible endpoint: one GET-only resource, no logging setup.

use coap_core::resource::{HandlerOutcome, HandlerResponse, Resource};
use coap_core::{Endpoint, UdpSock};

fn main() {
  let mut endpoint = Endpoint::<UdpSock>::bind("127.0.0.1:5683").unwrap();

  endpoint.add_resource("/hello", Resource::new("hello")
                                            .with_payload(b"hello, world!".to_vec(), 0)
                                            .on_get(|_, r| HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()),
                                                                                                 ..Default::default() })));

  loop {
    if let Err(e) = endpoint.poll(std::time::Instant::now()) {
      log::error!("poll error: {e:?}");
    }
    std::thread::sleep(std::time::Duration::from_millis(10));
  }
}
