//! Username registration.

use crate::api::{ApiResponse, GameApi};
use crate::config::RegistrationPolicy;
use crate::error::{ClientError, ClientErrorKind};
use crate::identity::{IdentityStore, PlayerIdentity};
use tracing::{info, instrument, warn};

/// How a registration attempt ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// The server created the user.
    Created,
    /// The server already knows the name; the client keeps using it.
    AlreadyExists {
        /// Status the server answered with.
        status: u16,
    },
}

/// Applies `policy` to a registration response.
#[instrument(skip(response), fields(status = response.status))]
pub fn classify(
    policy: &RegistrationPolicy,
    response: &ApiResponse,
) -> Result<RegistrationStatus, ClientError> {
    if response.is_success() {
        return Ok(RegistrationStatus::Created);
    }
    if policy.proceed_statuses().contains(&response.status) {
        return Ok(RegistrationStatus::AlreadyExists {
            status: response.status,
        });
    }
    Err(ClientError::new(ClientErrorKind::RegistrationRejected {
        status: response.status,
        body: response.body.trim().to_string(),
    }))
}

/// Validates `raw`, registers it and remembers it on success.
///
/// Validation happens before any request; an invalid name never reaches
/// the network.
#[instrument(skip(api, identities, policy))]
pub async fn register(
    api: &dyn GameApi,
    identities: &IdentityStore,
    policy: &RegistrationPolicy,
    raw: &str,
) -> Result<(PlayerIdentity, RegistrationStatus), ClientError> {
    let identity = PlayerIdentity::parse(raw)?;
    let response = api.register(identity.username()).await?;
    let status = match classify(policy, &response) {
        Ok(status) => status,
        Err(e) => {
            warn!(username = %identity, status = response.status, "Registration rejected");
            return Err(e);
        }
    };
    identities.remember(&identity)?;
    info!(username = %identity, ?status, "Registered");
    Ok((identity, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_proceeds_on_conflict_only() {
        let policy = RegistrationPolicy::default();
        assert_eq!(
            classify(&policy, &ApiResponse::new(202, String::new())).unwrap(),
            RegistrationStatus::Created
        );
        assert_eq!(
            classify(&policy, &ApiResponse::new(409, "exists".into())).unwrap(),
            RegistrationStatus::AlreadyExists { status: 409 }
        );
        let err = classify(&policy, &ApiResponse::new(400, " bad name \n".into())).unwrap_err();
        assert_eq!(
            err.kind(),
            &ClientErrorKind::RegistrationRejected {
                status: 400,
                body: "bad name".to_string()
            }
        );
    }

    #[test]
    fn policy_is_configurable() {
        let policy = RegistrationPolicy::default().with_proceed_statuses(vec![400, 409]);
        assert!(classify(&policy, &ApiResponse::new(400, String::new())).is_ok());
        assert!(classify(&policy, &ApiResponse::new(500, String::new())).is_err());
    }
}
