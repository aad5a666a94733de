//! Issue bearer tokens for API access.
//!
//! The token is printed to stdout so it can be piped into other tools:
//!
//! ```bash
//! export TOKEN=$(garage-cli token issue -e 1 -n "Ana Silva" -r manager)
//! ```

use garage_admin::config::{ConfigError, JwtConfig};
use garage_admin::middleware::{AuthError, JwtKeys};
use garage_core::{EmployeeId, EmployeeRole};
use thiserror::Error;

/// Errors that can occur while issuing a token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid role: {0}. Valid roles: admin, manager, employee")]
    InvalidRole(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Issue a token signed with `GARAGE_JWT_SECRET`.
///
/// # Errors
///
/// Returns an error if the secret is missing or weak, or the role is unknown.
pub fn issue(employee_id: i32, name: &str, role: &str) -> Result<(), TokenError> {
    let role: EmployeeRole = role
        .parse()
        .map_err(|_| TokenError::InvalidRole(role.to_owned()))?;

    let config = JwtConfig::from_env()?;
    let token = JwtKeys::new(&config).issue(EmployeeId::new(employee_id), name, role)?;

    tracing::info!(
        employee_id,
        role = %role,
        ttl_minutes = config.ttl_minutes,
        "Token issued"
    );

    #[allow(clippy::print_stdout)]
    {
        println!("{token}");
    }
    Ok(())
}
