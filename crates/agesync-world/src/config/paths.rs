use std::path::PathBuf;

/// XDG-style locations for config and data files.
///
/// On Windows both resolve under %APPDATA%.
pub struct ProjectPaths {
    name: String,
}

impl ProjectPaths {
    /// Returns None when no home directory can be found
    pub fn new(name: &str) -> Option<Self> {
        home_dir()?;
        Some(ProjectPaths {
            name: name.to_string(),
        })
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base("XDG_CONFIG_HOME", &[".config"])
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base("XDG_DATA_HOME", &[".local", "share"])
    }

    fn base(&self, xdg_var: &str, fallback: &[&str]) -> PathBuf {
        if cfg!(target_os = "windows") {
            if let Ok(appdata) = std::env::var("APPDATA") {
                return PathBuf::from(appdata).join(&self.name);
            }
        }

        std::env::var(xdg_var)
            .ok()
            .map(PathBuf::from)
            .or_else(|| home_dir().map(|home| fallback.iter().fold(home, |p, part| p.join(part))))
            .unwrap_or_else(|| fallback.iter().collect())
            .join(&self.name)
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_end_with_name() {
        if let Some(paths) = ProjectPaths::new("agesync") {
            assert!(paths.config_dir().ends_with("agesync"));
            assert!(paths.data_dir().ends_with("agesync"));
        }
    }
}
