pub mod filetype;
pub mod policy;
pub mod properties;

pub use filetype::{ArtifactFormat, BridgedArtifact, bridge_in, bridge_out, clear_patches};
pub use policy::{
    PolicyRule, PolicySet, compile_glob, compile_glob_set, default_policy_rules,
};
pub use properties::{
    json_to_properties, properties_to_json, properties_to_structured, structured_to_properties,
};
