//! HTTP middleware and extractors.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (`http_request` span)
//! 3. Request ID (recorded on the span, echoed in the response)
//! 4. Security headers
//! 5. CORS (when origins are configured)
//!
//! Authentication is per handler via the [`RequireEmployee`] and
//! [`RequireManager`] extractors.

pub mod auth;
pub mod request_id;
pub mod security_headers;

pub use auth::{AuthError, Claims, CurrentEmployee, JwtKeys, RequireEmployee, RequireManager};
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
pub use security_headers::security_headers_middleware;
