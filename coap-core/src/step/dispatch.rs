//! §4.4 steps 1-6: resolve path, check preconditions, invoke the handler,
//! shape the response.

use coap_msg::msg::opt::known::LINK_FORMAT;
use coap_msg::{Code, Type};

use crate::option::MessageOptionsExt;
use crate::req::{Method, Req};
use crate::resource::tree::DispatchTarget;
use crate::resource::{HandlerOutcome, HandlerRequest, ResourceId, ResourceTree};
use crate::resp::Resp;

const WELL_KNOWN_CORE: &str = "well-known/core";

/// Everything the caller (the endpoint event loop) needs to finish
/// handling a dispatched request: the response to send, and — if the
/// request mutated or created a resource — enough to drive observe
/// notification fan-out.
pub struct Dispatched {
  /// Response to send, or `None` if the handler returned
  /// [`HandlerOutcome::Pending`] — the caller should park this exchange
  /// and call [`dispatch`] again on a later tick.
  pub resp: Option<Resp>,
  /// Resource that was read or mutated, if any (not set for
  /// `/.well-known/core` or error responses with no target).
  pub resource: Option<ResourceId>,
  /// Whether this request just mutated `resource` (so the caller should
  /// fan out observe notifications and bump ETag/observe-count).
  pub mutated: bool,
}

fn error_resp(req: &Req, code: Code) -> Resp {
  Resp::to(&req.0, Type::Ack, code)
}

/// Dispatch an inbound request against the tree, producing the response
/// to send. `ack_type` is the transmission type the response should be
/// sent as (`Ack` for a piggy-backed reply to a CON, `Non`/`Con` for a
/// separate response) — callers choose it based on the reliability
/// layer's state, not this function.
pub fn dispatch(tree: &mut ResourceTree, req: &Req, ack_type: Type) -> Dispatched {
  let path = req.path_segments().map(|segs| segs.join("/")).unwrap_or_default();

  if path == WELL_KNOWN_CORE {
    return dispatch_discovery(tree, req, ack_type);
  }

  let target = match tree.resolve_for_dispatch(&path) {
    | DispatchTarget::NotFound => return Dispatched { resp: Some(error_resp(req, Code::NOT_FOUND)), resource: None, mutated: false },
    | DispatchTarget::Found(id) => id,
    | DispatchTarget::CreatableUnder { parent, segment } => match create_child(tree, parent, &segment, req.method()) {
      | Some(id) => id,
      | None => return Dispatched { resp: Some(error_resp(req, Code::NOT_FOUND)), resource: None, mutated: false },
    },
  };

  let existed_before = matches!(tree.resolve_for_dispatch(&path), DispatchTarget::Found(_));

  dispatch_to_resource(tree, req, ack_type, target, existed_before)
}

fn create_child(tree: &mut ResourceTree, parent: ResourceId, segment: &str, method: Method) -> Option<ResourceId> {
  if !matches!(method, Method::Post | Method::Put) {
    return None;
  }
  let mut factory = tree.get_mut(parent)?.handlers.new_resource.take()?;
  let child = factory(segment);
  tree.get_mut(parent)?.handlers.new_resource = Some(factory);
  let parent_path = tree.path_of(parent);
  let full_path = if parent_path.is_empty() { segment.to_string() } else { format!("{parent_path}/{segment}") };
  Some(tree.add_resource(&full_path, child))
}

fn dispatch_discovery(tree: &ResourceTree, req: &Req, ack_type: Type) -> Dispatched {
  if req.method() != Method::Get {
    return Dispatched { resp: Some(error_resp(req, Code::METHOD_NOT_ALLOWED)), resource: None, mutated: false };
  }
  let mut resp = Resp::to(&req.0, ack_type, Code::CONTENT);
  resp.set_payload(tree.discovery_link_format().into_bytes(), LINK_FORMAT as u16);
  Dispatched { resp: Some(resp), resource: None, mutated: false }
}

fn dispatch_to_resource(tree: &mut ResourceTree, req: &Req, ack_type: Type, target: ResourceId, existed_before: bool) -> Dispatched {
  let method = req.method();

  let Some(resource) = tree.get_mut(target) else {
    return Dispatched { resp: Some(error_resp(req, Code::NOT_FOUND)), resource: None, mutated: false };
  };

  if req.if_match_wildcard() {
    // wildcard If-Match: satisfied as long as the resource exists, which it does
  } else if let Some(etags) = req.if_match() {
    let current = resource.etag_bytes();
    if !etags.iter().any(|e| e.0 == current) {
      return Dispatched { resp: Some(error_resp(req, Code::PRECONDITION_FAILED)), resource: Some(target), mutated: false };
    }
  }

  if req.if_none_match() && existed_before {
    return Dispatched { resp: Some(error_resp(req, Code::PRECONDITION_FAILED)), resource: Some(target), mutated: false };
  }

  if let Some(accept) = req.accept() {
    if method == Method::Get && accept != resource.content_format {
      return Dispatched { resp: Some(error_resp(req, Code::NOT_ACCEPTABLE)), resource: Some(target), mutated: false };
    }
  }

  // A GET carrying an ETag the resource still has current can be answered
  // `2.03 Valid` with no payload (RFC 7252 §5.10.6) without ever invoking
  // the handler.
  if method == Method::Get {
    let current = resource.etag_bytes();
    if req.etags().iter().any(|e| e.0 == current) {
      let mut resp = Resp::to(&req.0, ack_type, Code::VALID);
      resp.set_etag(current);
      return Dispatched { resp: Some(resp), resource: Some(target), mutated: false };
    }
  }

  let Some(mut handler) = resource.take_handler(method) else {
    return Dispatched { resp: Some(error_resp(req, Code::METHOD_NOT_ALLOWED)), resource: Some(target), mutated: false };
  };

  let handler_req = HandlerRequest { method,
                                      path: req.path_segments().map(|s| s.join("/")).unwrap_or_default(),
                                      query: req.query_segments().map(|q| q.into_iter().map(str::to_string).collect()).unwrap_or_default(),
                                      payload: req.0.payload.0.clone(),
                                      content_format: req.content_format(),
                                      accept: req.accept() };

  let outcome = handler(&handler_req, resource);
  resource.put_handler_back(method, handler);

  match outcome {
    | HandlerOutcome::InternalError => Dispatched { resp: Some(error_resp(req, Code::INTERNAL_SERVER_ERROR)), resource: Some(target), mutated: false },
    | HandlerOutcome::Pending => Dispatched { resp: None, resource: Some(target), mutated: false },
    | HandlerOutcome::Ok(handler_resp) => {
      let mutates = matches!(method, Method::Post | Method::Put | Method::Delete);
      if mutates {
        resource.mark_mutated();
      }
      if mutates {
        if let Some(payload) = &handler_resp.payload {
          resource.payload = payload.clone();
          if let Some(cf) = handler_resp.content_format {
            resource.content_format = cf;
          }
        }
      }

      let code = match method {
        | Method::Get => Code::CONTENT,
        | Method::Post if !existed_before => Code::CREATED,
        | Method::Post => Code::CHANGED,
        | Method::Put if !existed_before => Code::CREATED,
        | Method::Put => Code::CHANGED,
        | Method::Delete => Code::DELETED,
      };

      let etag = handler_resp.etag.clone().unwrap_or_else(|| resource.etag_bytes());

      let mut resp = Resp::to(&req.0, ack_type, code);
      if method == Method::Get {
        resp.set_payload(resource.payload.clone(), resource.content_format);
        resp.set_etag(etag);
      }
      if let Some(loc) = &handler_resp.location_path {
        resp.set_location_path(loc);
      }
      if let Some(query) = &handler_resp.location_query {
        resp.set_location_query(query);
      }

      Dispatched { resp: Some(resp), resource: Some(target), mutated: mutates }
    },
  }
}

#[cfg(test)]
mod tests {
  use coap_msg::{Id, Token};

  use super::*;
  use crate::req::builder::ReqBuilder;
  use crate::resource::{HandlerResponse, Resource};

  fn get(path: &str) -> Req {
    ReqBuilder::new(Method::Get, Id(1), Token(vec![1])).path(path).build()
  }

  #[test]
  fn get_existing_resource_returns_content() {
    let mut tree = ResourceTree::default();
    tree.add_resource("/basic", Resource::new("basic").with_payload(b"Basic Resource".to_vec(), 0).on_get(|_, r| HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()), ..Default::default() })));

    let dispatched = dispatch(&mut tree, &get("/basic"), Type::Ack);
    let resp = dispatched.resp.unwrap();
    assert_eq!(resp.0.code, Code::CONTENT);
    assert_eq!(resp.0.payload.0, b"Basic Resource");
  }

  #[test]
  fn missing_resource_is_not_found() {
    let mut tree = ResourceTree::default();
    let dispatched = dispatch(&mut tree, &get("/missing"), Type::Ack);
    assert_eq!(dispatched.resp.unwrap().0.code, Code::NOT_FOUND);
  }

  #[test]
  fn missing_handler_is_method_not_allowed() {
    let mut tree = ResourceTree::default();
    tree.add_resource("/basic", Resource::new("basic"));
    let dispatched = dispatch(&mut tree, &get("/basic"), Type::Ack);
    assert_eq!(dispatched.resp.unwrap().0.code, Code::METHOD_NOT_ALLOWED);
  }

  #[test]
  fn discovery_lists_visible_resources() {
    let mut tree = ResourceTree::default();
    tree.add_resource("/basic", Resource::new("basic").visible(true));
    let dispatched = dispatch(&mut tree, &get("/well-known/core"), Type::Ack);
    let resp = dispatched.resp.unwrap();
    assert_eq!(resp.0.code, Code::CONTENT);
    assert!(String::from_utf8(resp.0.payload.0).unwrap().contains("</basic>"));
  }

  #[test]
  fn get_with_matching_etag_returns_valid_with_no_payload() {
    let mut tree = ResourceTree::default();
    let id = tree.add_resource("/basic", Resource::new("basic").with_payload(b"Basic Resource".to_vec(), 0).on_get(|_, r| HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()), ..Default::default() })));
    let etag = tree.get(id).unwrap().etag_bytes();

    let mut req = get("/basic");
    req.set_etag(etag);

    let dispatched = dispatch(&mut tree, &req, Type::Ack);
    let resp = dispatched.resp.unwrap();
    assert_eq!(resp.0.code, Code::VALID);
    assert!(resp.0.payload.0.is_empty());
  }

  #[test]
  fn pending_outcome_defers_the_response() {
    let mut tree = ResourceTree::default();
    tree.add_resource("/slow", Resource::new("slow").on_get(|_, _| HandlerOutcome::Pending));
    let dispatched = dispatch(&mut tree, &get("/slow"), Type::Ack);
    assert!(dispatched.resp.is_none());
    assert!(dispatched.resource.is_some());
  }

  #[test]
  fn handler_location_query_is_emitted_on_create() {
    let mut tree = ResourceTree::default();
    let mut things = Resource::new("things").allow_children(true)
                                             .on_post(|_, _| HandlerOutcome::Ok(HandlerResponse { location_query: Some(vec!["id=7".into()]), ..Default::default() }));
    things.handlers.new_resource = Some(Box::new(|seg| Resource::new(seg).on_post(|_, r| HandlerOutcome::Ok(HandlerResponse { payload: Some(r.payload.clone()), location_query: Some(vec!["id=7".into()]), ..Default::default() }))));
    tree.add_resource("/things", things);

    let req = ReqBuilder::new(Method::Post, Id(1), Token(vec![1])).path("/things/new").build();
    let dispatched = dispatch(&mut tree, &req, Type::Ack);
    let resp = dispatched.resp.unwrap();
    assert_eq!(resp.0.location_query().unwrap(), vec!["id=7"]);
  }
}
