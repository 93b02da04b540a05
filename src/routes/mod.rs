/// Router Module Index
///
/// Routes are split by access level so the admin gate is applied once, at the
/// router layer, rather than inside individual handlers.

/// Public pages and the contact form. No session required.
pub mod public;

/// Admin session endpoints plus the gated admin area.
pub mod admin;
