use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{GateConfig, ProjectPaths, PuzzleConfig, VariableConfig};
use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeSection {
    /// World instance name
    pub name: String,

    /// Script tick interval in milliseconds (default: 50ms = 20Hz)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval() -> u64 {
    50
}

impl Default for AgeSection {
    fn default() -> Self {
        Self {
            name: "Age".to_string(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

/// Everything needed to stand up one world instance's scripts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgeConfig {
    #[serde(default)]
    pub age: AgeSection,

    #[serde(default)]
    pub variables: Vec<VariableConfig>,

    #[serde(default)]
    pub puzzles: Vec<PuzzleConfig>,

    #[serde(default)]
    pub gates: Vec<GateConfig>,
}

impl AgeConfig {
    pub fn default_path() -> PathBuf {
        ProjectPaths::new("agesync")
            .map(|p| p.config_dir().join("age.toml"))
            .unwrap_or_else(|| PathBuf::from("age.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded age config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no script could run against
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for id in self
            .puzzles
            .iter()
            .map(|p| &p.id)
            .chain(self.gates.iter().map(|g| &g.id))
        {
            if !ids.insert(id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate script id '{}'", id)));
            }
        }

        let mut names = HashSet::new();
        for variable in &self.variables {
            if !names.insert(variable.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate variable '{}'",
                    variable.name
                )));
            }
            if variable.default.arity() == 0 {
                return Err(ConfigError::Invalid(format!(
                    "variable '{}' has an empty default",
                    variable.name
                )));
            }
        }

        for puzzle in &self.puzzles {
            if puzzle.solution.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "puzzle '{}' has an empty solution",
                    puzzle.id
                )));
            }
            if puzzle.buttons.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "puzzle '{}' has no buttons",
                    puzzle.id
                )));
            }
            let button_count = puzzle.buttons.len();
            if let Some(button) = puzzle
                .solution
                .iter()
                .find(|&&b| b as usize >= button_count)
            {
                return Err(ConfigError::Invalid(format!(
                    "puzzle '{}' solution uses button {} but only {} are configured",
                    puzzle.id,
                    button,
                    button_count
                )));
            }
        }

        for gate in &self.gates {
            if gate.enter_region == gate.exit_region {
                return Err(ConfigError::Invalid(format!(
                    "gate '{}' uses the same region for entry and exit",
                    gate.id
                )));
            }
        }

        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self)?;
        fs::write(path, content)?;
        info!("Saved age config to {}", path.display());
        Ok(())
    }
}

/// Sample configuration written by `agesync init`
pub const EXAMPLE_CONFIG: &str = r#"# agesync age configuration

[age]
name = "Garrison"
tick_interval_ms = 50

[[variables]]
name = "grsnGearRideOpen"
default = [false]
object = "GearRideBrain"
chronicle = "GearRideOpen"

[[variables]]
name = "grsnWellDoorOpen"
default = [false]
object = "WellComboBrain"

[[puzzles]]
id = "wellCombo"
object = "WellComboBrain"
buttons = ["btn00", "btn01", "btn02", "btn03", "btn04", "btn05", "btn06", "btn07", "btn08", "btn09"]
solution = [3, 2, 5, 0]
mode = "exact"
press_responder = "respButtonPush"
solved_responder = "respWellDoorOpen"
solved_variable = "grsnWellDoorOpen"

[[gates]]
id = "gearRide"
object = "GearRideBrain"
gate_variable = "grsnGearRideOpen"
enter_region = "rgnGearEnter"
exit_region = "rgnGearExit"
subworld = "GearRideSubworld"
camera = "camGearRide"
exit_point = "GearRideExitPoint"
exclusion_regions = ["xrgnGearDoor"]
settle_ms = 500
"#;
