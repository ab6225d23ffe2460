//! Resource/Traffic Wrappers
use serde::{Deserialize, Serialize};
use std::fmt;

/// ResourceType represents the classification of the resources
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResourceType {
    Common = 0,
    Web,
    RPC,
    APIGateway,
    DBSQL,
    Cache,
    MQ,
}

impl Default for ResourceType {
    fn default() -> ResourceType {
        ResourceType::Common
    }
}

impl From<u8> for ResourceType {
    fn from(num: u8) -> ResourceType {
        match num {
            1 => ResourceType::Web,
            2 => ResourceType::RPC,
            3 => ResourceType::APIGateway,
            4 => ResourceType::DBSQL,
            5 => ResourceType::Cache,
            6 => ResourceType::MQ,
            _ => ResourceType::Common,
        }
    }
}

/// TrafficType describes the traffic type: Inbound or Outbound
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrafficType {
    Outbound,
    Inbound,
}

impl Default for TrafficType {
    fn default() -> TrafficType {
        TrafficType::Outbound
    }
}

/// ResourceWrapper represents the invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceWrapper {
    /// global unique resource name
    name: String,
    resource_type: ResourceType,
    /// Inbound or Outbound
    traffic_type: TrafficType,
}

impl fmt::Display for ResourceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ResourceWrapper{{name={}, traffic_type={:?}, resource_type={:?}}}",
            self.name, self.traffic_type, self.resource_type
        )
    }
}

impl ResourceWrapper {
    pub fn new(name: String, resource_type: ResourceType, traffic_type: TrafficType) -> Self {
        ResourceWrapper {
            name,
            resource_type,
            traffic_type,
        }
    }

    pub fn name(&self) -> &String {
        &self.name
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn traffic_type(&self) -> &TrafficType {
        &self.traffic_type
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resource_type_from_u8() {
        assert_eq!(ResourceType::from(2), ResourceType::RPC);
        assert_eq!(ResourceType::from(6), ResourceType::MQ);
        assert_eq!(ResourceType::from(42), ResourceType::Common);
    }

    #[test]
    fn display() {
        let res = ResourceWrapper::new("abc".into(), ResourceType::Web, TrafficType::Inbound);
        assert_eq!(
            format!("{}", res),
            "ResourceWrapper{name=abc, traffic_type=Inbound, resource_type=Web}"
        );
    }
}
