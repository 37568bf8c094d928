use agesync_events::{ObjectKey, SdlValue};
use serde::{Deserialize, Serialize};

use crate::sdl::{VariableDescriptor, VariableFlags};

/// An age-level shared variable declared directly in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableConfig {
    pub name: String,

    /// Default value, e.g. `[false]` or `[0, 0, 0]`
    pub default: SdlValue,

    /// Object whose owner may write this variable
    pub object: ObjectKey,

    /// Send to every client (default: true)
    #[serde(default = "default_replicated")]
    pub replicated: bool,

    /// Chronicle entry that seeds the default
    #[serde(default)]
    pub chronicle: Option<String>,
}

fn default_replicated() -> bool {
    true
}

impl VariableConfig {
    pub fn descriptor(&self) -> VariableDescriptor {
        let flags = if self.replicated {
            VariableFlags::REPLICATED
        } else {
            VariableFlags::INTERNAL
        };
        let mut descriptor =
            VariableDescriptor::new(&self.name, self.default.clone(), self.object.clone())
                .with_flags(flags);
        if let Some(key) = &self.chronicle {
            descriptor = descriptor.with_chronicle(key);
        }
        descriptor
    }
}
