//! CoAP (RFC 7252) endpoint core: reliability, request dispatch, the
//! observe (RFC 7641) and blockwise (RFC 7959) extensions, and a forward
//! proxy, layered over [`coap_msg`]'s wire codec.
//!
//! The pieces, leaves first: [`exchange`] (CON retransmission + dedup),
//! [`matcher`] (token-keyed request/response correlation), [`resource`]
//! (the path-dispatched resource tree), [`observe`] and [`block`] (the two
//! RFC extensions), [`proxy`] (forward proxying), and [`server`], which
//! glues all of the above to a [`net::Socket`] in a single-threaded
//! cooperative poll loop. [`client`] is the blocking embedder-facing
//! counterpart.

#![forbid(unsafe_code)]
#![deny(missing_copy_implementations)]

/// Blocking request/response client (§6 "Embedder API").
pub mod client;

/// Runtime configuration and RFC 7252 §4.8.1 timing defaults.
pub mod config;
/// Error types surfaced by the endpoint core.
pub mod error;
/// Outbound CON retransmission and inbound dedup (§4.2).
pub mod exchange;
/// Request/response correlation by (endpoint, token) (§4.3).
pub mod matcher;
/// Network transport abstraction ([`net::Socket`]) and the
/// endpoint-paired-with-address wrapper [`net::Addrd`].
pub mod net;
/// Typed option accessors shared by [`req::Req`] and [`resp::Resp`].
pub mod option;
/// RFC 7641 observe subscriptions and notification fan-out (§4.5).
pub mod observe;
/// RFC 7959 blockwise transfer (§4.6).
pub mod block;
/// Forward proxy (§4.7).
pub mod proxy;
/// Inbound request wrapper and builder.
pub mod req;
/// Outbound/inbound response wrapper.
pub mod resp;
/// The resource tree and method-dispatch handler contract (§4.4).
pub mod resource;
/// The endpoint event loop (§5, C8).
pub mod server;
/// Non-blocking retry timer and backoff strategies.
pub mod retry;
/// Request-dispatch pipeline: path resolution, preconditions, handler
/// invocation, response shaping (§4.4 steps 1-7).
pub mod step;

pub use client::{Client, Error as ClientError};
pub use config::Config;
pub use error::{Error, What, When};
pub use net::{Addrd, Socket, UdpSock};
pub use req::{Method, Req};
pub use req::builder::ReqBuilder;
pub use resource::{Handler, HandlerOutcome, HandlerRequest, HandlerResponse, Resource, ResourceId, ResourceTree};
pub use resp::Resp;
pub use server::Endpoint;
