//! convoy-routing — load balancer rule allocation.
//!
//! Maps deployed services onto listener rules: target group creation,
//! collision-free priority allocation, host/path conditions, and
//! identity-provider auth handling.

pub mod allocator;
pub mod error;

pub use allocator::RuleAllocator;
pub use error::{RoutingError, RoutingResult};
