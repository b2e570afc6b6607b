use std::collections::HashSet;

use thiserror::Error;
use tracing::info;

use crate::gateway::{ContactListRequest, GatewayError, UpstreamGateway};
use crate::records::{Record, REFERENCED_USER_PROFILE_ID};

#[derive(Debug, Error)]
pub enum ContactsError {
    #[error("Contact list name is required.")]
    MissingName,

    #[error("No referencedUserProfileId values found in filtered records.")]
    NoProfiles,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    // upstream text is surfaced as-is
    #[error("{message}")]
    Rejected { status: u16, message: String },
}

fn rejected_message(status: u16, body: &str) -> String {
    if body.trim().is_empty() {
        format!("Request failed ({status})")
    } else {
        body.to_string()
    }
}

/// Profile ids referenced by `records`, first-seen order, blanks dropped.
pub fn distinct_user_profile_ids<'a>(records: impl IntoIterator<Item = &'a Record>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for record in records {
        let id = record.field_value(REFERENCED_USER_PROFILE_ID);
        if id.is_empty() {
            continue;
        }
        if seen.insert(id.clone()) {
            out.push(id);
        }
    }
    out
}

/// Single POST, no retry. Returns how many profile ids were sent.
pub async fn create_contact_list(
    gateway: &dyn UpstreamGateway,
    base: &str,
    api_key: &str,
    name: &str,
    user_profile_ids: Vec<String>,
) -> Result<usize, ContactsError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ContactsError::MissingName);
    }
    if user_profile_ids.is_empty() {
        return Err(ContactsError::NoProfiles);
    }

    let request = ContactListRequest {
        group_list_name: name.to_string(),
        user_profile_ids,
    };
    let resp = gateway.create_contact_list(base, api_key, &request).await?;
    if !(200..300).contains(&resp.status) {
        return Err(ContactsError::Rejected {
            status: resp.status,
            message: rejected_message(resp.status, &resp.body),
        });
    }
    info!(name, profiles = request.user_profile_ids.len(), "contact list created");
    Ok(request.user_profile_ids.len())
}
