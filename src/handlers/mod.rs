// Handlers are grouped by security tier:
// public (no auth) → protected (JWT + tenant + user) → elevated (root JWT).
// Routing and middleware layering live in `crate::app`.

pub mod elevated;
pub mod protected;
pub mod public;
