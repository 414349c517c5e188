use std::{collections::HashMap, fs, path::PathBuf};

use serde::Deserialize;
use tracing::warn;

pub const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub characters_file: PathBuf,
    pub tree_file: PathBuf,
    pub generator_reply: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:5000".into(),
            characters_file: "characters.json".into(),
            tree_file: "tree.json".into(),
            generator_reply: "...".into(),
        }
    }
}

/// Defaults, then `server.toml` in the working directory, then the environment.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

pub(crate) fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, String>>(raw) {
        Ok(cfg) => cfg,
        Err(err) => {
            warn!(%err, file = SETTINGS_FILE, "ignoring unreadable settings file");
            return;
        }
    };

    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("characters_file") {
        settings.characters_file = v.into();
    }
    if let Some(v) = file_cfg.get("tree_file") {
        settings.tree_file = v.into();
    }
    if let Some(v) = file_cfg.get("generator_reply") {
        settings.generator_reply = v.clone();
    }
}

/// Later keys win, so `APP__*` overrides the bare name.
pub(crate) fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    for key in ["SERVER_BIND", "APP__BIND_ADDR"] {
        if let Some(v) = var(key) {
            settings.server_bind = v;
        }
    }
    for key in ["CHARACTERS_FILE", "APP__CHARACTERS_FILE"] {
        if let Some(v) = var(key) {
            settings.characters_file = v.into();
        }
    }
    for key in ["TREE_FILE", "APP__TREE_FILE"] {
        if let Some(v) = var(key) {
            settings.tree_file = v.into();
        }
    }
    if let Some(v) = var("APP__GENERATOR_REPLY") {
        settings.generator_reply = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
