use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(LawyerId);
id_newtype!(ClientId);

/// Composite key of a consultation: one anonymous visitor talking to
/// one lawyer. Immutable for the lifetime of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub lawyer_id: LawyerId,
    pub client_id: ClientId,
}

impl ConversationKey {
    pub fn new(lawyer_id: LawyerId, client_id: ClientId) -> Self {
        Self {
            lawyer_id,
            client_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Client,
    Lawyer,
}

impl ParticipantRole {
    /// The other side of the conversation.
    pub fn counterpart(self) -> Self {
        match self {
            ParticipantRole::Client => ParticipantRole::Lawyer,
            ParticipantRole::Lawyer => ParticipantRole::Client,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantRole::Client => "client",
            ParticipantRole::Lawyer => "lawyer",
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantRole {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "client" => Ok(ParticipantRole::Client),
            "lawyer" => Ok(ParticipantRole::Lawyer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown participant role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_path_segment() {
        assert_eq!("client".parse::<ParticipantRole>(), Ok(ParticipantRole::Client));
        assert_eq!("lawyer".parse::<ParticipantRole>(), Ok(ParticipantRole::Lawyer));
        assert!("admin".parse::<ParticipantRole>().is_err());
        assert_eq!(ParticipantRole::Lawyer.as_str(), "lawyer");
    }

    #[test]
    fn counterpart_flips_role() {
        assert_eq!(ParticipantRole::Client.counterpart(), ParticipantRole::Lawyer);
        assert_eq!(ParticipantRole::Lawyer.counterpart(), ParticipantRole::Client);
    }
}
