use std::collections::HashMap;
use std::fs;

use anyhow::Context;
use serde::Deserialize;
use url::Url;

use crate::validate::ExpiryCutoff;

/// Settings for the wizard controller.
///
/// Defaults carry the shipped business-rule literals (promo code, expiry
/// cutoff); a local `enroll.toml` and then environment variables override
/// them.
#[derive(Debug, Clone, Deserialize)]
pub struct WizardSettings {
    pub backend_url: String,
    pub promo_code: String,
    pub expiry_cutoff_month: u32,
    pub expiry_cutoff_year: u32,
    pub notification_endpoint: Option<String>,
    pub notification_template: String,
    pub request_timeout_secs: u64,
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".into(),
            promo_code: "CI25MP3".into(),
            expiry_cutoff_month: 3,
            expiry_cutoff_year: 25,
            notification_endpoint: None,
            notification_template: "registration_welcome".into(),
            request_timeout_secs: 10,
        }
    }
}

impl WizardSettings {
    pub fn expiry_cutoff(&self) -> ExpiryCutoff {
        ExpiryCutoff {
            month: self.expiry_cutoff_month,
            year: self.expiry_cutoff_year,
        }
    }

    /// Backend base URL with any trailing slash removed, validated as http(s).
    pub fn backend_base(&self) -> anyhow::Result<String> {
        let url = Url::parse(self.backend_url.trim())
            .with_context(|| format!("invalid backend url '{}'", self.backend_url))?;
        match url.scheme() {
            "http" | "https" => {}
            other => anyhow::bail!("backend url must be http or https, got '{other}'"),
        }
        Ok(self.backend_url.trim().trim_end_matches('/').to_string())
    }
}

pub fn load_settings() -> WizardSettings {
    let mut settings = WizardSettings::default();

    if let Ok(raw) = fs::read_to_string("enroll.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            apply_overrides(&mut settings, |key| file_cfg.get(key).cloned());
        }
    }

    apply_overrides(&mut settings, |key| {
        std::env::var(format!("ENROLL_{}", key.to_ascii_uppercase())).ok()
    });

    settings
}

fn apply_overrides(settings: &mut WizardSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("backend_url") {
        settings.backend_url = v;
    }
    if let Some(v) = lookup("promo_code") {
        settings.promo_code = v;
    }
    if let Some(v) = lookup("expiry_cutoff_month") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.expiry_cutoff_month = parsed;
        }
    }
    if let Some(v) = lookup("expiry_cutoff_year") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.expiry_cutoff_year = parsed;
        }
    }
    if let Some(v) = lookup("notification_endpoint") {
        settings.notification_endpoint = Some(v);
    }
    if let Some(v) = lookup("notification_template") {
        settings.notification_template = v;
    }
    if let Some(v) = lookup("request_timeout_secs") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
}
