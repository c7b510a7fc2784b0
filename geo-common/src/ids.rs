use crate::hub::HubUrlError;

/// Check if a client name or secret is acceptable to the hub.
/// The hub only accepts ASCII alphanumeric names and secrets; the empty string is allowed.
pub fn identifier_acceptable(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Reduce a free-form vehicle identity (e.g. a train number like "ICE 1234") to a client name.
pub fn sanitize_identifier(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Decides which client name points are logged under.
#[derive(Debug, Clone)]
pub struct ClientResolver {
    /// The client name set in configuration, if any.
    configured: Option<String>,
    /// Used when neither configuration nor the point carry an identity.
    fallback: &'static str,
}

impl ClientResolver {
    pub fn new(configured: &str, fallback: &'static str) -> Result<Self, HubUrlError> {
        if !identifier_acceptable(configured) {
            return Err(HubUrlError::InvalidClient(configured.to_owned()));
        }

        let configured = if configured.is_empty() {
            None
        } else {
            Some(configured.to_owned())
        };

        Ok(Self {
            configured,
            fallback,
        })
    }

    /// Resolve the client name: configured value first, then the point's own vehicle identity, then
    /// the fallback literal.
    pub fn resolve(&self, vehicle: Option<&str>) -> String {
        if let Some(configured) = &self.configured {
            return configured.clone();
        }

        match vehicle.map(sanitize_identifier) {
            Some(name) if !name.is_empty() => name,
            _ => self.fallback.to_owned(),
        }
    }
}
