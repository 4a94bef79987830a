use crate::InstanceType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Mapping,
    CrossWorkflow,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Mapping => "mapping",
            Stage::CrossWorkflow => "cross_workflow",
        }
    }
}

/// One hop of a lineage chain, read from `from_*` into `to_*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageRow {
    pub chain_id: usize,
    pub step_no: usize,
    pub level: usize,
    pub mapping: String,
    pub from_instance: String,
    pub from_port: String,
    pub from_type: InstanceType,
    pub to_instance: String,
    pub to_port: String,
    pub to_type: InstanceType,
    pub operation: String,
    pub expression: String,
    pub join_condition: String,
    pub stage: Stage,
    pub evidence: String,
}

/// A port that can start a lineage chain for a queried field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCandidate {
    pub port_id: String,
    pub instance_id: String,
    pub port_name: String,
    pub instance_name: String,
    pub mapping_name: String,
}
