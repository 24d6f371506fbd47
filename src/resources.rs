//! Custom resource types served by the API front-ends
//!
//! All types live in the `hobbyfarm.io/v1` group and are namespaced. Field names
//! on the wire are snake_case so that the JSON projections returned to the UI are
//! the serialized specs themselves.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group shared by every resource in this crate.
pub const API_GROUP: &str = "hobbyfarm.io";

/// Label linking a resource to a user session.
pub const SESSION_LABEL: &str = "hobbyfarm.io/session";
/// Label linking a resource to the user that owns it.
pub const USER_LABEL: &str = "hobbyfarm.io/user";
/// Label linking a resource to a scheduled event.
pub const SCHEDULED_EVENT_LABEL: &str = "hobbyfarm.io/scheduledevent";
/// Label marking whether a progress record is complete (`"true"` / `"false"`).
pub const FINISHED_LABEL: &str = "finished";

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "hobbyfarm.io",
    version = "v1",
    kind = "Environment",
    plural = "environments",
    namespaced
)]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub dnssuffix: String,
    #[serde(default)]
    pub provider: String,
    /// template name -> provider specific key/value settings
    #[serde(default)]
    pub template_mapping: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub environment_specifics: BTreeMap<String, String>,
    #[serde(default)]
    pub ip_translation_map: BTreeMap<String, String>,
    #[serde(default)]
    pub ws_endpoint: String,
    /// template name -> number of machines the environment can host
    #[serde(default)]
    pub count_capacity: BTreeMap<String, i32>,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "hobbyfarm.io",
    version = "v1",
    kind = "Progress",
    plural = "progresses",
    namespaced
)]
pub struct ProgressSpec {
    #[serde(default)]
    pub current_step: i32,
    #[serde(default)]
    pub max_step: i32,
    #[serde(default)]
    pub total_step: i32,
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(default, rename = "user")]
    pub user_id: String,
    #[serde(default)]
    pub started: String,
    #[serde(default)]
    pub last_update: String,
    #[serde(default)]
    pub finished: String,
    #[serde(default, rename = "progress")]
    pub steps: Vec<ProgressStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ProgressStep {
    pub step: i32,
    pub timestamp: String,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "hobbyfarm.io",
    version = "v1",
    kind = "VirtualMachineClaim",
    plural = "virtualmachineclaims",
    status = "VirtualMachineClaimStatus",
    namespaced
)]
pub struct VirtualMachineClaimSpec {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "user")]
    pub user_id: String,
    #[serde(default)]
    pub restricted_bind: bool,
    #[serde(default)]
    pub restricted_bind_value: String,
    #[serde(default, rename = "vm")]
    pub virtual_machines: BTreeMap<String, VirtualMachineClaimVm>,
    #[serde(default)]
    pub base_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct VirtualMachineClaimVm {
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub vm_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct VirtualMachineClaimStatus {
    #[serde(default)]
    pub bind_mode: String,
    #[serde(default)]
    pub static_bind_attempts: i32,
    #[serde(default)]
    pub bound: bool,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub tainted: bool,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "hobbyfarm.io",
    version = "v1",
    kind = "ScheduledEvent",
    plural = "scheduledevents",
    status = "ScheduledEventStatus",
    namespaced
)]
pub struct ScheduledEventSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    /// environment -> template -> machines reserved for the event
    #[serde(default)]
    pub required_vms: BTreeMap<String, BTreeMap<String, i32>>,
    #[serde(default)]
    pub on_demand: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ScheduledEventStatus {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub finished: bool,
}
