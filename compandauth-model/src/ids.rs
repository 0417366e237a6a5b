use uuid::Uuid;

/// Strongly typed ID for the credential that owns a counter
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CredentialId(pub Uuid);

impl Default for CredentialId {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialId {
    pub fn new() -> Self {
        CredentialId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl AsRef<Uuid> for CredentialId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for CredentialId {
    fn from(id: Uuid) -> Self {
        CredentialId(id)
    }
}

impl std::fmt::Display for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
