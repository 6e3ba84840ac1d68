//! Authenticated caller identity.

use serde::{Deserialize, Serialize};

use crate::address::Pubkey;

/// Role of an org member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    Admin,
    #[default]
    Member,
}

/// Who is making the request. Each variant carries only its own fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Caller {
    Individual {
        account_id: i64,
        email: Option<String>,
        wallet: Option<Pubkey>,
        /// Keep identity off the ledger while still requiring proof of it.
        privacy_mode: bool,
    },
    Org {
        org_id: i64,
        org_domain: String,
        role: OrgRole,
    },
}

impl Caller {
    pub fn individual(account_id: i64) -> Self {
        Caller::Individual {
            account_id,
            email: None,
            wallet: None,
            privacy_mode: false,
        }
    }

    pub fn privacy_mode(&self) -> bool {
        matches!(self, Caller::Individual { privacy_mode: true, .. })
    }

    /// Reference stored as the record's submitter.
    pub fn submitter_ref(&self) -> String {
        match self {
            Caller::Individual { account_id, .. } => format!("account:{account_id}"),
            Caller::Org { org_id, .. } => format!("org:{org_id}"),
        }
    }

    /// Domain of the email on file, if any.
    pub fn email_domain(&self) -> Option<&str> {
        match self {
            Caller::Individual { email: Some(email), .. } => email.rsplit_once('@').map(|(_, d)| d),
            _ => None,
        }
    }

    pub fn org(&self) -> Option<(i64, &str)> {
        match self {
            Caller::Org {
                org_id, org_domain, ..
            } => Some((*org_id, org_domain.as_str())),
            Caller::Individual { .. } => None,
        }
    }
}
