//! Engine configuration, fixed at startup.

use serde::Deserialize;
use std::error::Error;

/// Window sizing for the visibility engine. The table dimensions bound the
/// precomputed geometry; the view dimensions are the per-viewer default and
/// may be overridden per session up to the table size.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub table_width: i32,
    pub table_height: i32,
    pub view_width: i32,
    pub view_height: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            table_width: 25,
            table_height: 25,
            view_width: 11,
            view_height: 11,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let cfg: EngineConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Window geometry needs a true center cell, so every dimension must be
    /// odd, and a view cannot exceed the precomputed table.
    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        let odd = |label: &str, v: i32, min: i32| -> Result<(), Box<dyn Error>> {
            if v < min || v % 2 == 0 {
                return Err(format!("{label} must be odd and at least {min}, got {v}").into());
            }
            Ok(())
        };
        odd("table_width", self.table_width, 3)?;
        odd("table_height", self.table_height, 3)?;
        odd("view_width", self.view_width, 1)?;
        odd("view_height", self.view_height, 1)?;
        if self.view_width > self.table_width || self.view_height > self.table_height {
            return Err(format!(
                "view {}x{} exceeds table {}x{}",
                self.view_width, self.view_height, self.table_width, self.table_height
            )
            .into());
        }
        Ok(())
    }
}
