pub mod age_config;
pub mod gate_config;
pub mod paths;
pub mod puzzle_config;
pub mod variable_config;

pub use age_config::{AgeConfig, AgeSection, EXAMPLE_CONFIG};
pub use gate_config::GateConfig;
pub use paths::ProjectPaths;
pub use puzzle_config::{MatchPolicy, PuzzleConfig};
pub use variable_config::VariableConfig;
