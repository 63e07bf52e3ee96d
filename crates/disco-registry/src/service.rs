use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use disco_types::DiscoError;

/// A service as stored in either view and returned by queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    /// Announcing node for dynamic services; `None` for static ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub service_type: String,
    pub pool: String,
    pub location: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Service {
    pub fn matches(&self, service_type: &str, pool: Option<&str>) -> bool {
        self.service_type == service_type && pool.map_or(true, |p| self.pool == p)
    }
}

/// One service within a dynamic announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicServiceAnnouncement {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Everything a node currently offers. Replaces the node's previous
/// announcement as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicAnnouncement {
    pub environment: String,
    pub pool: String,
    #[serde(default)]
    pub location: Option<String>,
    pub services: Vec<DynamicServiceAnnouncement>,
}

impl DynamicAnnouncement {
    pub fn validate(&self) -> Result<(), DiscoError> {
        if self.environment.is_empty() {
            return Err(DiscoError::InvalidArgument("environment is required".into()));
        }
        if self.pool.is_empty() {
            return Err(DiscoError::InvalidArgument("pool is required".into()));
        }
        if self.services.is_empty() {
            return Err(DiscoError::InvalidArgument("at least one service is required".into()));
        }
        if let Some(s) = self.services.iter().find(|s| s.service_type.is_empty()) {
            return Err(DiscoError::InvalidArgument(format!("service {} has no type", s.id)));
        }
        Ok(())
    }

    /// Expand into stored service records for `node_id`.
    pub fn to_services(&self, node_id: Uuid) -> Vec<Service> {
        let location = self
            .location
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| placeholder_location(node_id));
        self.services
            .iter()
            .map(|s| Service {
                id: s.id,
                node_id: Some(node_id),
                service_type: s.service_type.clone(),
                pool: self.pool.clone(),
                location: location.clone(),
                properties: s.properties.clone(),
            })
            .collect()
    }
}

/// A manually registered, non-expiring service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticAnnouncement {
    pub environment: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub pool: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl StaticAnnouncement {
    pub fn validate(&self) -> Result<(), DiscoError> {
        if self.environment.is_empty() {
            return Err(DiscoError::InvalidArgument("environment is required".into()));
        }
        if self.service_type.is_empty() {
            return Err(DiscoError::InvalidArgument("type is required".into()));
        }
        if self.pool.is_empty() {
            return Err(DiscoError::InvalidArgument("pool is required".into()));
        }
        Ok(())
    }

    /// Assign a fresh id and build the stored record.
    pub fn into_service(self) -> Service {
        let id = Uuid::new_v4();
        let location = self
            .location
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| placeholder_location(id));
        Service {
            id,
            node_id: None,
            service_type: self.service_type,
            pool: self.pool,
            location,
            properties: self.properties,
        }
    }
}

/// Location recorded for services announced without one.
pub fn placeholder_location(id: Uuid) -> String {
    format!("/somewhere/{id}")
}

pub(crate) fn encode(service: &Service) -> Result<Vec<u8>, DiscoError> {
    serde_json::to_vec(service).map_err(|e| DiscoError::Codec(e.to_string()))
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Service, DiscoError> {
    serde_json::from_slice(bytes).map_err(|e| DiscoError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement(services: Vec<DynamicServiceAnnouncement>) -> DynamicAnnouncement {
        DynamicAnnouncement {
            environment: "prod".into(),
            pool: "general".into(),
            location: None,
            services,
        }
    }

    fn svc(service_type: &str) -> DynamicServiceAnnouncement {
        DynamicServiceAnnouncement {
            id: Uuid::new_v4(),
            service_type: service_type.into(),
            properties: BTreeMap::from([("http".to_string(), "http://10.0.0.1:8080".to_string())]),
        }
    }

    #[test]
    fn dynamic_validation() {
        assert!(announcement(vec![svc("api")]).validate().is_ok());
        assert!(announcement(vec![]).validate().is_err());
        assert!(announcement(vec![svc("")]).validate().is_err());

        let mut a = announcement(vec![svc("api")]);
        a.environment.clear();
        assert!(a.validate().is_err());

        let mut a = announcement(vec![svc("api")]);
        a.pool.clear();
        assert!(a.validate().is_err());
    }

    #[test]
    fn missing_location_uses_node_placeholder() {
        let node_id = Uuid::new_v4();
        let services = announcement(vec![svc("api"), svc("web")]).to_services(node_id);
        assert_eq!(services.len(), 2);
        for s in &services {
            assert_eq!(s.location, format!("/somewhere/{node_id}"));
            assert_eq!(s.node_id, Some(node_id));
            assert_eq!(s.pool, "general");
        }
    }

    #[test]
    fn static_gets_fresh_id_and_placeholder() {
        let ann = StaticAnnouncement {
            environment: "prod".into(),
            service_type: "db".into(),
            pool: "general".into(),
            location: Some(String::new()),
            properties: BTreeMap::new(),
        };
        assert!(ann.validate().is_ok());
        let a = ann.clone().into_service();
        let b = ann.into_service();
        assert_ne!(a.id, b.id);
        assert_eq!(a.location, placeholder_location(a.id));
        assert_eq!(a.node_id, None);
    }

    #[test]
    fn record_json_uses_type_field() {
        let s = StaticAnnouncement {
            environment: "prod".into(),
            service_type: "db".into(),
            pool: "general".into(),
            location: Some("/dc1/rack2".into()),
            properties: BTreeMap::new(),
        }
        .into_service();
        let json: serde_json::Value = serde_json::from_slice(&encode(&s).unwrap()).unwrap();
        assert_eq!(json["type"], "db");
        assert_eq!(json["location"], "/dc1/rack2");
        assert!(json.get("node_id").is_none());
        assert_eq!(decode(&encode(&s).unwrap()).unwrap(), s);
    }

    #[test]
    fn matches_type_and_optional_pool() {
        let s = announcement(vec![svc("api")]).to_services(Uuid::new_v4()).remove(0);
        assert!(s.matches("api", None));
        assert!(s.matches("api", Some("general")));
        assert!(!s.matches("api", Some("other")));
        assert!(!s.matches("web", None));
    }
}
