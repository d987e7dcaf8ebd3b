//! Contacts of a delivery ticket.
//!
//! The PI is mandatory whenever it can be looked up: an operator-given email
//! wins, otherwise the order's PI email is used, and any failure on that path
//! is fatal. Extra members are collected from operator-given emails, the
//! bioinformatics contact and optionally the order owner; a member that cannot
//! be resolved is left out with a warning.

use tracing::{info, warn};

use crate::error::{DeliveryError, DeliveryResult};
use crate::gateway::{IdentityResolver, OrderDetail, OrderPortal};

/// Resolved remote identities for a delivery ticket
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryContacts {
    pub pi_identity: Option<String>,
    pub member_identities: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactRequest {
    pub pi_email: Option<String>,
    pub member_emails: Vec<String>,
    pub add_project_owner: bool,
}

pub async fn resolve_contacts(
    project_id: &str,
    identities: &dyn IdentityResolver,
    portal: Option<&dyn OrderPortal>,
    request: &ContactRequest,
) -> DeliveryResult<DeliveryContacts> {
    let order = match portal {
        Some(portal) => match portal.order_detail(project_id).await {
            Ok(order) => Some(order),
            Err(e) if request.pi_email.is_none() => {
                tracing::error!(
                    project_id = %project_id,
                    error = %e,
                    "Cannot fetch the order to find the PI email"
                );
                return Err(e);
            }
            Err(e) => {
                warn!(project_id = %project_id, error = %e, "Order detail unavailable");
                None
            }
        },
        None => None,
    };

    let pi_email = pi_email(project_id, request, order.as_ref())?;
    let pi_identity = match &pi_email {
        Some(email) => {
            let identity = identities.resolve_email(email).await?;
            info!(project_id = %project_id, pi_identity = %identity, "PI identity resolved");
            Some(identity)
        }
        None => {
            warn!(
                project_id = %project_id,
                "No PI email given and no order portal configured, ticket will have no PI"
            );
            None
        }
    };

    let member_emails = member_emails(request, order.as_ref(), pi_email.as_deref());
    if !member_emails.is_empty() {
        info!(
            project_id = %project_id,
            members = %member_emails.join(", "),
            "Additional contacts will be added to the delivery ticket"
        );
    }

    let mut member_identities: Vec<String> = Vec::new();
    for email in &member_emails {
        match identities.resolve_email(email).await {
            Ok(identity) => {
                let is_pi = pi_identity.as_deref() == Some(identity.as_str());
                if !is_pi && !member_identities.contains(&identity) {
                    member_identities.push(identity);
                }
            }
            Err(e) => warn!(
                email = %email,
                error = %e,
                "Could not resolve contact, it will not be added to the delivery ticket"
            ),
        }
    }

    Ok(DeliveryContacts {
        pi_identity,
        member_identities,
    })
}

fn pi_email(
    project_id: &str,
    request: &ContactRequest,
    order: Option<&OrderDetail>,
) -> DeliveryResult<Option<String>> {
    if let Some(email) = &request.pi_email {
        warn!(project_id = %project_id, pi_email = %email, "PI email specified by operator");
        return Ok(Some(email.clone()));
    }
    match order {
        Some(order) => order
            .pi_email()
            .map(|email| Some(email.to_string()))
            .ok_or_else(|| {
                DeliveryError::RemoteServiceError(format!(
                    "Order of project {project_id} has no PI email"
                ))
            }),
        None => Ok(None),
    }
}

fn member_emails(
    request: &ContactRequest,
    order: Option<&OrderDetail>,
    pi_email: Option<&str>,
) -> Vec<String> {
    let mut candidates: Vec<&str> = request.member_emails.iter().map(String::as_str).collect();
    if let Some(order) = order {
        if request.add_project_owner {
            candidates.extend(order.owner_email());
        }
        candidates.extend(order.bioinfo_email());
    }

    let mut emails: Vec<String> = Vec::new();
    for email in candidates {
        if Some(email) != pi_email && !emails.iter().any(|e| e == email) {
            emails.push(email.to_string());
        }
    }
    emails
}
