pub mod backend;
pub mod reconciler;
pub mod router;

// Public API
pub use backend::{AudioMode, NoopRouteBackend, RouteBackend, ScoState};
pub use reconciler::{RouteLog, RouteReport, RouteTiming};
pub use router::RouterController;
