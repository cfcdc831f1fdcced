//! The hierarchical resource tree (§4.4, §3 "Resource", "Resource tree").

use coap_msg::msg::opt::known::observe::SequenceNumber;

/// The resource tree, and path lookup over it.
pub mod tree;

#[doc(inline)]
pub use tree::{ResourceId, ResourceTree};

use crate::req::Method;

/// The immutable view of the inbound request a handler is invoked with.
///
/// Handlers see this, plus a mutable reference to their own [`Resource`] —
/// never the tree itself, so they can't reach into a sibling's state
/// without going through another request.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
  /// Method being invoked
  pub method: Method,
  /// Full path that was resolved to this resource
  pub path: String,
  /// Uri-Query segments
  pub query: Vec<String>,
  /// Request payload
  pub payload: Vec<u8>,
  /// `Content-Format` of the payload, if any
  pub content_format: Option<u16>,
  /// `Accept` requested by the client, if any
  pub accept: Option<u16>,
}

/// What a handler did with the request.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
  /// Request succeeded.
  Ok(HandlerResponse),
  /// The handler exists but declines to service this particular request
  /// (distinct from "no handler for this method", which the dispatcher
  /// catches before ever calling in).
  InternalError,
  /// The handler isn't ready to answer yet. The endpoint sends an empty
  /// ACK (if the request was CON) to stop the client's retransmit timer,
  /// parks the request, and calls the handler again on a later `poll()`
  /// tick — the separate-response pattern of §4.2, modeled here as the
  /// handler repeatedly declining until it has an answer rather than as a
  /// future it hands back once.
  Pending,
}

/// Data a successful handler invocation hands back to the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct HandlerResponse {
  /// New representation, if the method produces one (GET/POST/PUT)
  pub payload: Option<Vec<u8>>,
  /// Override the response ETag (defaults to the resource's current one)
  pub etag: Option<Vec<u8>>,
  /// `Location-Path` for a create response
  pub location_path: Option<Vec<String>>,
  /// `Location-Query` for a create response
  pub location_query: Option<Vec<String>>,
  /// `Content-Format` of `payload`
  pub content_format: Option<u16>,
}

/// A method handler: given the request and mutable access to the resource
/// it was dispatched to, produce a response.
///
/// Boxed rather than generic so a [`Resource`] can hold up to four
/// different handlers (one per method) in a single field without the tree
/// becoming generic over all of them.
pub type Handler = Box<dyn FnMut(&HandlerRequest, &mut Resource) -> HandlerOutcome>;

/// Factory invoked by POST-to-create or PUT-to-create to build the child
/// resource, given the path segment it will live at.
pub type NewResourceFn = Box<dyn FnMut(&str) -> Resource>;

/// Per-method handlers attached to a [`Resource`].
#[derive(Default)]
pub struct Handlers {
  /// `GET` handler
  pub get: Option<Handler>,
  /// `POST` handler
  pub post: Option<Handler>,
  /// `PUT` handler
  pub put: Option<Handler>,
  /// `DELETE` handler
  pub delete: Option<Handler>,
  /// Factory for children created via POST/PUT
  pub new_resource: Option<NewResourceFn>,
}

impl Handlers {
  fn slot(&mut self, method: Method) -> &mut Option<Handler> {
    match method {
      | Method::Get => &mut self.get,
      | Method::Post => &mut self.post,
      | Method::Put => &mut self.put,
      | Method::Delete => &mut self.delete,
    }
  }
}

/// A node in the resource tree (§3 "Resource").
pub struct Resource {
  /// This resource's path segment (not the full path)
  pub segment: String,
  /// Whether this resource appears in `/.well-known/core` discovery
  pub visible: bool,
  /// Whether GET+Observe=0 may register an observer on this resource
  pub observable: bool,
  /// Whether POST/PUT may create children under this resource
  pub allow_children: bool,
  /// Current representation
  pub payload: Vec<u8>,
  /// `Content-Format` of `payload`
  pub content_format: u16,
  /// Monotonic version tag, incremented on every mutation
  pub etag: u64,
  /// Seconds a cached representation may be reused for
  pub max_age: u32,
  /// CoRE Link Format `rt=` attribute
  pub resource_type: Option<String>,
  /// CoRE Link Format `if=` attribute
  pub interface_type: Option<String>,
  /// CoRE Link Format `sz=` attribute (advisory size hint)
  pub maximum_size_estimate: Option<usize>,
  /// RFC 7641 observe sequence number, incremented on every mutation
  pub observe_seq: SequenceNumber,
  /// Per-method handlers
  pub handlers: Handlers,
  pub(crate) parent: Option<ResourceId>,
  pub(crate) children: Vec<ResourceId>,
}

impl Resource {
  /// A new resource with no handlers, empty payload, invisible to
  /// discovery by default (call [`Resource::visible`] to opt in).
  pub fn new(segment: impl Into<String>) -> Self {
    Resource { segment: segment.into(),
               visible: true,
               observable: false,
               allow_children: false,
               payload: Vec::new(),
               content_format: 0,
               etag: 0,
               max_age: 60,
               resource_type: None,
               interface_type: None,
               maximum_size_estimate: None,
               observe_seq: SequenceNumber::default(),
               handlers: Handlers::default(),
               parent: None,
               children: Vec::new() }
  }

  /// Builder: mark observable.
  pub fn observable(mut self, yes: bool) -> Self {
    self.observable = yes;
    self
  }

  /// Builder: mark visible in discovery.
  pub fn visible(mut self, yes: bool) -> Self {
    self.visible = yes;
    self
  }

  /// Builder: allow POST/PUT to create children.
  pub fn allow_children(mut self, yes: bool) -> Self {
    self.allow_children = yes;
    self
  }

  /// Builder: set the initial payload and content format.
  pub fn with_payload(mut self, payload: impl Into<Vec<u8>>, content_format: u16) -> Self {
    self.payload = payload.into();
    self.content_format = content_format;
    self
  }

  /// Builder: attach a GET handler.
  pub fn on_get(mut self, f: impl FnMut(&HandlerRequest, &mut Resource) -> HandlerOutcome + 'static) -> Self {
    self.handlers.get = Some(Box::new(f));
    self
  }

  /// Builder: attach a POST handler.
  pub fn on_post(mut self, f: impl FnMut(&HandlerRequest, &mut Resource) -> HandlerOutcome + 'static) -> Self {
    self.handlers.post = Some(Box::new(f));
    self
  }

  /// Builder: attach a PUT handler.
  pub fn on_put(mut self, f: impl FnMut(&HandlerRequest, &mut Resource) -> HandlerOutcome + 'static) -> Self {
    self.handlers.put = Some(Box::new(f));
    self
  }

  /// Builder: attach a DELETE handler.
  pub fn on_delete(mut self, f: impl FnMut(&HandlerRequest, &mut Resource) -> HandlerOutcome + 'static) -> Self {
    self.handlers.delete = Some(Box::new(f));
    self
  }

  /// Every resource mutation increments both the ETag and the observe
  /// sequence number (§3 "Resource": "Every mutation increments ETag and
  /// observe-count").
  pub fn mark_mutated(&mut self) {
    self.etag = self.etag.wrapping_add(1);
    self.observe_seq = self.observe_seq.next();
  }

  /// Current ETag as its minimum-length big-endian byte encoding.
  pub fn etag_bytes(&self) -> Vec<u8> {
    coap_msg::OptValue::from_uint(self.etag as u32).0
  }

  /// Temporarily remove the handler for `method` so it can be invoked
  /// with `&mut self` without a double-mutable-borrow; pair with
  /// [`Resource::put_handler_back`].
  pub(crate) fn take_handler(&mut self, method: Method) -> Option<Handler> {
    self.handlers.slot(method).take()
  }

  /// Restore a handler taken via [`Resource::take_handler`].
  pub(crate) fn put_handler_back(&mut self, method: Method, handler: Handler) {
    *self.handlers.slot(method) = Some(handler);
  }
}

impl std::fmt::Debug for Resource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Resource")
     .field("segment", &self.segment)
     .field("visible", &self.visible)
     .field("observable", &self.observable)
     .field("etag", &self.etag)
     .field("observe_seq", &self.observe_seq)
     .finish_non_exhaustive()
  }
}
