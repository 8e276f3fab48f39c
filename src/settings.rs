use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_APP_URL: &str = "http://localhost:4173/";

const DEPLOY_PLACEHOLDER: &str = "REPLACE_WITH_ACTUAL_KEY_DURING_DEPLOYMENT";
const MIN_DEPLOY_KEY_LEN: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelParams {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self { temperature: 1.2, top_k: 40, top_p: 0.95 }
    }
}

/// One configuration layer; unset fields fall through to the next one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SettingsLayer {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub app_url: Option<String>,
    pub database_url: Option<String>,
}

impl SettingsLayer {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            model: get("GEMINI_MODEL"),
            base_url: get("GEMINI_BASE_URL"),
            app_url: get("APP_URL"),
            database_url: get("DATABASE_URL"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveSettings {
    pub model: String,
    pub base_url: String,
    pub app_url: String,
    pub database_url: Option<String>,
    pub model_params: ModelParams,
}

/// CLI flags win over the environment, which wins over built-in defaults.
pub fn resolve_effective_settings(env: &SettingsLayer, cli: &SettingsLayer) -> EffectiveSettings {
    EffectiveSettings {
        model: cli
            .model
            .clone()
            .or_else(|| env.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.into()),
        base_url: cli
            .base_url
            .clone()
            .or_else(|| env.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.into()),
        app_url: cli
            .app_url
            .clone()
            .or_else(|| env.app_url.clone())
            .unwrap_or_else(|| DEFAULT_APP_URL.into()),
        database_url: cli.database_url.clone().or_else(|| env.database_url.clone()),
        model_params: ModelParams::default(),
    }
}

/// The key the user typed in takes precedence over anything injected at
/// build or deploy time.
pub fn resolve_credential(user_override: Option<&str>, deploy_default: Option<&str>) -> Option<String> {
    user_override
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .or_else(|| deploy_default.map(str::trim).filter(|k| !k.is_empty()))
        .map(str::to_string)
}

/// Credential provided by the deployment: runtime `API_KEY` /
/// `GEMINI_API_KEY`, then an `API_KEY` baked in at build time.
pub fn deploy_default_credential() -> Option<String> {
    deploy_default_from(|name| std::env::var(name).ok(), option_env!("API_KEY"))
}

pub fn deploy_default_from(lookup: impl Fn(&str) -> Option<String>, build_time: Option<&str>) -> Option<String> {
    ["API_KEY", "GEMINI_API_KEY"]
        .into_iter()
        .filter_map(|name| lookup(name))
        .chain(build_time.map(str::to_string))
        .map(|k| k.trim().to_string())
        .find(|k| usable_deploy_key(k))
}

fn usable_deploy_key(key: &str) -> bool {
    key != DEPLOY_PLACEHOLDER && key.len() > MIN_DEPLOY_KEY_LEN
}
