//! Node identity attached to every published document
//!
//! Built once at startup and shared read-only (`Arc<PublisherContext>`)
//! by all publish calls. There is no way to mutate it afterwards.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of the node reporting statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    #[default]
    Silo,
    Client,
}

impl NodeRole {
    pub fn is_silo(self) -> bool {
        matches!(self, NodeRole::Silo)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Silo => f.write_str("silo"),
            NodeRole::Client => f.write_str("client"),
        }
    }
}

impl FromStr for NodeRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silo" | "server" => Ok(NodeRole::Silo),
            "client" => Ok(NodeRole::Client),
            other => Err(ConfigError::invalid("node.role", format!("unknown role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherContext {
    deployment_id: String,
    node_id: String,
    role: NodeRole,
    node_name: String,
    address: String,
    gateway_address: String,
    host_name: String,
}

impl PublisherContext {
    pub fn builder() -> PublisherContextBuilder {
        PublisherContextBuilder::default()
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn gateway_address(&self) -> &str {
        &self.gateway_address
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublisherContextBuilder {
    deployment_id: Option<String>,
    node_id: Option<String>,
    role: NodeRole,
    node_name: Option<String>,
    address: String,
    gateway_address: String,
    host_name: String,
}

impl PublisherContextBuilder {
    pub fn deployment_id(mut self, id: impl Into<String>) -> Self {
        self.deployment_id = Some(id.into());
        self
    }

    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    pub fn role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    pub fn node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = Some(name.into());
        self
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn gateway_address(mut self, address: impl Into<String>) -> Self {
        self.gateway_address = address.into();
        self
    }

    pub fn host_name(mut self, host: impl Into<String>) -> Self {
        self.host_name = host.into();
        self
    }

    /// Validate identity fields; a missing node id gets a random one
    pub fn build(self) -> Result<PublisherContext, ConfigError> {
        let deployment_id = required(self.deployment_id, "node.deployment_id")?;
        let node_name = required(self.node_name, "node.name")?;
        let node_id = match self.node_id {
            Some(id) if id.trim().is_empty() => return Err(ConfigError::Missing("node.id")),
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };

        Ok(PublisherContext {
            deployment_id,
            node_id,
            role: self.role,
            node_name,
            address: self.address,
            gateway_address: self.gateway_address,
            host_name: self.host_name,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_complete_context() {
        let ctx = PublisherContext::builder()
            .deployment_id("prod-eu")
            .node_id("S10.0.0.5:11111:1")
            .role(NodeRole::Silo)
            .node_name("silo-1")
            .address("10.0.0.5:11111")
            .gateway_address("10.0.0.5:30000")
            .host_name("host-a")
            .build()
            .unwrap();

        assert_eq!(ctx.deployment_id(), "prod-eu");
        assert_eq!(ctx.node_id(), "S10.0.0.5:11111:1");
        assert!(ctx.role().is_silo());
        assert_eq!(ctx.gateway_address(), "10.0.0.5:30000");
    }

    #[test]
    fn test_missing_identity_is_rejected() {
        let no_deployment = PublisherContext::builder().node_name("silo-1").build();
        assert!(matches!(no_deployment, Err(ConfigError::Missing("node.deployment_id"))));

        let blank_name = PublisherContext::builder()
            .deployment_id("dev")
            .node_name("   ")
            .build();
        assert!(matches!(blank_name, Err(ConfigError::Missing("node.name"))));
    }

    #[test]
    fn test_node_id_generated_when_absent() {
        let ctx = PublisherContext::builder()
            .deployment_id("dev")
            .node_name("client-7")
            .role(NodeRole::Client)
            .build()
            .unwrap();
        assert!(!ctx.node_id().is_empty());
        assert!(!ctx.role().is_silo());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Silo".parse::<NodeRole>().unwrap(), NodeRole::Silo);
        assert_eq!("server".parse::<NodeRole>().unwrap(), NodeRole::Silo);
        assert_eq!("client".parse::<NodeRole>().unwrap(), NodeRole::Client);
        assert!("gateway".parse::<NodeRole>().is_err());
    }
}
