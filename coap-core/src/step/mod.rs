//! Request-layer processing stages (§4.4), each a plain function rather
//! than a generic pipeline — see `DESIGN.md` for why this departs from
//! the trait-object `Step<P>` composition the reference design uses.

/// Path resolution, preconditions, method dispatch, response shaping.
pub mod dispatch;
