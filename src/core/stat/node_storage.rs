use super::ResourceNode;
use crate::{
    base::{ResourceType, DEFAULT_MAX_RESOURCE_AMOUNT, TOTAL_IN_BOUND_RESOURCE_NAME},
    logging, Result,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type ResourceNodeMap = HashMap<String, Arc<ResourceNode>>;

/// Owns the resource nodes of a slot chain.
/// A node is created exactly once per resource name.
#[derive(Debug)]
pub struct NodeStorage {
    inbound: Arc<ResourceNode>,
    nodes: RwLock<ResourceNodeMap>,
}

impl NodeStorage {
    pub fn new() -> Result<Self> {
        Ok(NodeStorage {
            inbound: Arc::new(ResourceNode::new(
                TOTAL_IN_BOUND_RESOURCE_NAME.into(),
                ResourceType::Common,
            )?),
            nodes: RwLock::new(ResourceNodeMap::new()),
        })
    }

    /// Aggregate node of all inbound traffic.
    pub fn inbound_node(&self) -> Arc<ResourceNode> {
        self.inbound.clone()
    }

    /// resource_node_list returns all existing resource nodes.
    pub fn resource_node_list(&self) -> Vec<Arc<ResourceNode>> {
        self.nodes.read().unwrap().values().cloned().collect()
    }

    pub fn get_resource_node(&self, res_name: &str) -> Option<Arc<ResourceNode>> {
        self.nodes.read().unwrap().get(res_name).cloned()
    }

    pub fn get_or_create_resource_node(
        &self,
        res_name: &str,
        resource_type: ResourceType,
    ) -> Result<Arc<ResourceNode>> {
        if let Some(node) = self.get_resource_node(res_name) {
            return Ok(node);
        }
        let mut nodes = self.nodes.write().unwrap();
        // double check, another caller may have created it
        if let Some(node) = nodes.get(res_name) {
            return Ok(node.clone());
        }
        if nodes.len() >= DEFAULT_MAX_RESOURCE_AMOUNT {
            logging::warn!(
                "[NodeStorage] Resource amount exceeds the threshold {}",
                DEFAULT_MAX_RESOURCE_AMOUNT
            );
        }
        let node = Arc::new(ResourceNode::new(res_name.into(), resource_type)?);
        nodes.insert(res_name.into(), node.clone());
        Ok(node)
    }

    pub fn reset_resource_map(&self) {
        self.nodes.write().unwrap().clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn create_once() {
        let storage = Arc::new(NodeStorage::new().unwrap());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let storage = storage.clone();
            handles.push(thread::spawn(move || {
                storage
                    .get_or_create_resource_node("abc", ResourceType::Common)
                    .unwrap()
            }));
        }
        let nodes: Vec<Arc<ResourceNode>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for node in &nodes {
            assert!(Arc::ptr_eq(node, &nodes[0]));
        }
        assert_eq!(storage.resource_node_list().len(), 1);
        assert!(storage.get_resource_node("abd").is_none());
        storage.reset_resource_map();
        assert!(storage.get_resource_node("abc").is_none());
    }
}
