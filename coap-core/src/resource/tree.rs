use std::fmt::Write as _;

use super::Resource;

/// Arena index into a [`ResourceTree`].
///
/// The tree is modeled as an arena (RFC 9 design note: cyclic
/// parent/child references can't be plain owned pointers in safe Rust, so
/// we index into a `Vec` instead) rather than `Rc<RefCell<_>>` links.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ResourceId(pub(crate) usize);

/// Result of resolving a request path against the tree (§4.4 step 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
  /// The path resolved to an existing resource.
  Found(ResourceId),
  /// Every segment but the last matched, and the matched parent allows
  /// creating children — a POST/PUT may create `segment` under `parent`.
  CreatableUnder {
    parent: ResourceId,
    segment: String,
  },
  /// No existing resource, and no parent willing to create one.
  NotFound,
}

/// Rooted n-ary tree of [`Resource`]s, keyed by path segment.
///
/// The root (index 0) is invisible, non-observable, and cannot be removed;
/// it exists purely to anchor lookups and has no segment of its own.
pub struct ResourceTree {
  nodes: Vec<Option<Resource>>,
}

impl Default for ResourceTree {
  fn default() -> Self {
    let mut root = Resource::new("");
    root.visible = false;
    root.observable = false;
    root.allow_children = true;
    ResourceTree { nodes: vec![Some(root)] }
  }
}

impl ResourceTree {
  /// The root node's id.
  pub const ROOT: ResourceId = ResourceId(0);

  /// Borrow a resource by id.
  pub fn get(&self, id: ResourceId) -> Option<&Resource> {
    self.nodes.get(id.0).and_then(|n| n.as_ref())
  }

  /// Mutably borrow a resource by id.
  pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
    self.nodes.get_mut(id.0).and_then(|n| n.as_mut())
  }

  /// Split the path into non-empty segments.
  pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
  }

  /// Walk from the root, matching one segment per path component. Returns
  /// the deepest node reached along with how many segments matched, so
  /// callers can tell a full match from a partial one.
  fn walk<'a>(&self, segments: &[&'a str]) -> (ResourceId, usize) {
    let mut cur = Self::ROOT;
    for (i, seg) in segments.iter().enumerate() {
      let Some(node) = self.get(cur) else { return (cur, i) };
      let Some(&child) = node.children.iter().find(|&&c| self.get(c).map(|r| r.segment == *seg).unwrap_or(false)) else {
        return (cur, i);
      };
      cur = child;
    }
    (cur, segments.len())
  }

  /// Look up a resource by its full path. Returns `None` unless every
  /// segment matched an existing node.
  pub fn lookup(&self, path: &str) -> Option<ResourceId> {
    let segments = Self::split_path(path);
    let (id, matched) = self.walk(&segments);
    (matched == segments.len()).then_some(id)
  }

  /// Resolve a path for request dispatch (§4.4 step 1): either the
  /// existing resource, or — if every segment but the last matched, and
  /// that parent allows POST/PUT-created children — the parent plus the
  /// not-yet-existing final segment.
  pub fn resolve_for_dispatch(&self, path: &str) -> DispatchTarget {
    let segments = Self::split_path(path);
    let (id, matched) = self.walk(&segments);

    if matched == segments.len() {
      return DispatchTarget::Found(id);
    }

    if matched == segments.len().saturating_sub(1) {
      if let Some(node) = self.get(id) {
        if node.allow_children {
          return DispatchTarget::CreatableUnder { parent: id, segment: segments[matched].to_string() };
        }
      }
    }

    DispatchTarget::NotFound
  }

  /// Add (or replace) a resource at `path`, creating invisible structural
  /// placeholders for any missing intermediate segments.
  ///
  /// Returns the new resource's id.
  pub fn add_resource(&mut self, path: &str, mut resource: Resource) -> ResourceId {
    let segments = Self::split_path(path);
    let (mut cur, matched) = self.walk(&segments);

    for seg in &segments[matched..] {
      let placeholder = Resource::new(*seg);
      let id = ResourceId(self.nodes.len());
      let mut placeholder = placeholder;
      placeholder.parent = Some(cur);
      self.nodes.push(Some(placeholder));
      if let Some(parent) = self.get_mut(cur) {
        parent.children.push(id);
      }
      cur = id;
    }

    resource.parent = self.get(cur).and_then(|r| r.parent);
    if let Some(existing) = self.get(cur) {
      resource.children = existing.children.clone();
      resource.parent = existing.parent;
    }
    self.nodes[cur.0] = Some(resource);
    cur
  }

  /// Remove a resource and every descendant, returning each removed id
  /// together with its full path (deepest-first, so callers tearing down
  /// observations see children before parents).
  pub fn remove(&mut self, id: ResourceId) -> Vec<(ResourceId, String)> {
    if id == Self::ROOT {
      return Vec::new();
    }

    let mut stack = vec![id];
    let mut order = Vec::new();
    while let Some(cur) = stack.pop() {
      order.push((cur, self.path_of(cur)));
      if let Some(node) = self.get(cur) {
        stack.extend(node.children.iter().copied());
      }
    }

    // detach from parent first
    if let Some(parent_id) = self.get(id).and_then(|r| r.parent) {
      if let Some(parent) = self.get_mut(parent_id) {
        parent.children.retain(|&c| c != id);
      }
    }

    let mut removed = Vec::new();
    for (cur, path) in order.into_iter().rev() {
      self.nodes[cur.0] = None;
      removed.push((cur, path));
    }
    removed
  }

  /// Full path (no leading/trailing slash handling beyond joining
  /// segments) from the root to `id`.
  pub fn path_of(&self, id: ResourceId) -> String {
    let mut segs = Vec::new();
    let mut cur = id;
    while cur != Self::ROOT {
      let Some(node) = self.get(cur) else { break };
      segs.push(node.segment.clone());
      let Some(parent) = node.parent else { break };
      cur = parent;
    }
    segs.reverse();
    segs.join("/")
  }

  /// Render the visible subtree as CoRE Link Format (RFC 6690), for
  /// `/.well-known/core`.
  pub fn discovery_link_format(&self) -> String {
    let mut out = String::new();
    let mut first = true;
    self.render_links(Self::ROOT, &mut out, &mut first);
    out
  }

  fn render_links(&self, id: ResourceId, out: &mut String, first: &mut bool) {
    let Some(node) = self.get(id) else { return };

    if id != Self::ROOT && node.visible {
      if !*first {
        out.push(',');
      }
      *first = false;
      let _ = write!(out, "<{}>", self.path_of(id));
      if let Some(rt) = &node.resource_type {
        let _ = write!(out, ";rt=\"{rt}\"");
      }
      if let Some(ift) = &node.interface_type {
        let _ = write!(out, ";if=\"{ift}\"");
      }
      let _ = write!(out, ";ct={}", node.content_format);
      if node.observable {
        out.push_str(";obs");
      }
      if let Some(sz) = node.maximum_size_estimate {
        let _ = write!(out, ";sz={sz}");
      }
    }

    for &child in &node.children {
      self.render_links(child, out, first);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn add_and_lookup() {
    let mut tree = ResourceTree::default();
    tree.add_resource("/basic", Resource::new("basic"));
    assert!(tree.lookup("/basic").is_some());
    assert!(tree.lookup("/missing").is_none());
  }

  #[test]
  fn nested_path_creates_placeholders() {
    let mut tree = ResourceTree::default();
    tree.add_resource("/a/b/c", Resource::new("c"));
    assert!(tree.lookup("/a").is_some());
    assert!(tree.lookup("/a/b").is_some());
    assert!(tree.lookup("/a/b/c").is_some());
  }

  #[test]
  fn remove_cascades_to_children() {
    let mut tree = ResourceTree::default();
    tree.add_resource("/a/b", Resource::new("b"));
    let a = tree.lookup("/a").unwrap();
    let removed = tree.remove(a);
    assert_eq!(removed.len(), 2);
    assert!(removed.iter().any(|(_, p)| p == "a"));
    assert!(removed.iter().any(|(_, p)| p == "a/b"));
    assert!(tree.lookup("/a").is_none());
    assert!(tree.lookup("/a/b").is_none());
  }

  #[test]
  fn discovery_lists_visible_resources_only() {
    let mut tree = ResourceTree::default();
    tree.add_resource("/basic", Resource::new("basic").visible(true));
    tree.add_resource("/hidden", Resource::new("hidden").visible(false));
    let rendered = tree.discovery_link_format();
    assert!(rendered.contains("</basic>"));
    assert!(!rendered.contains("hidden"));
  }
}
