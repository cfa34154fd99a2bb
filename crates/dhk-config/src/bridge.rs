//! Typed, validated view of the merged configuration.
//!
//! Every problem is collected before failing so an operator fixes the
//! whole file in one pass.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use anyhow::{bail, Result};
use dhk_schemas::GroupSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Scheduler settings
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSettings {
    /// Poll period `P`.
    pub update_interval_secs: u64,
    /// Trigger checks run once every `multiplier` polls, i.e. every `P × multiplier`.
    pub trigger_multiplier: u32,
    pub max_request_tries: u32,
    pub retry_delay_secs: u64,
    pub retry_jitter_ms: u64,
    /// Pause after every gated envelope before the gate is released.
    pub cooldown_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            update_interval_secs: 30,
            trigger_multiplier: 5,
            max_request_tries: 3,
            retry_delay_secs: 5,
            retry_jitter_ms: 1000,
            cooldown_secs: 1,
            http_timeout_secs: 60,
        }
    }
}

impl SchedulerSettings {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn retry_jitter(&self) -> Duration {
        Duration::from_millis(self.retry_jitter_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    fn validate(&self, errors: &mut Vec<String>) {
        if self.update_interval_secs == 0 {
            errors.push("scheduler.update_interval_secs must be at least 1".to_string());
        }
        if self.trigger_multiplier == 0 {
            errors.push("scheduler.trigger_multiplier must be at least 1".to_string());
        }
        if self.max_request_tries == 0 {
            errors.push("scheduler.max_request_tries must be at least 1".to_string());
        }
        if self.http_timeout_secs == 0 {
            errors.push("scheduler.http_timeout_secs must be at least 1".to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// One configured installation and the credentials of its account.
#[derive(Clone, PartialEq, Eq)]
pub struct SystemConfig {
    pub login: String,
    pub password: String,
    pub system_id: i64,
    pub transmitter_id: String,
    pub central_id: String,
    pub master_code: u16,
    pub name: String,
    pub stay_groups: GroupSet,
    pub night_groups: GroupSet,
    /// Accept trigger notices for this account through the daemon.
    pub trigger_feed: bool,
}

impl fmt::Debug for SystemConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemConfig")
            .field("login", &self.login)
            .field("password", &"REDACTED")
            .field("system_id", &self.system_id)
            .field("transmitter_id", &self.transmitter_id)
            .field("central_id", &self.central_id)
            .field("master_code", &"REDACTED")
            .field("name", &self.name)
            .field("stay_groups", &self.stay_groups)
            .field("night_groups", &self.night_groups)
            .field("trigger_feed", &self.trigger_feed)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSystem {
    login: Option<String>,
    password: Option<String>,
    /// Name of an environment variable holding the password.
    password_env: Option<String>,
    system_id: Option<i64>,
    transmitter_id: Option<String>,
    central_id: Option<String>,
    master_code: Option<i64>,
    name: Option<String>,
    stay_groups: Option<Vec<i64>>,
    night_groups: Option<Vec<i64>>,
    trigger_feed: Option<bool>,
}

// ---------------------------------------------------------------------------
// Bridge config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    pub scheduler: SchedulerSettings,
    pub systems: Vec<SystemConfig>,
}

impl BridgeConfig {
    /// Validate a merged configuration document.
    ///
    /// `password_env` entries are resolved from the process environment.
    pub fn from_json(doc: &Value) -> Result<Self> {
        Self::from_json_with_env(doc, |name| std::env::var(name).ok())
    }

    pub fn from_json_with_env<F>(doc: &Value, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut errors: Vec<String> = Vec::new();

        if let Some(obj) = doc.as_object() {
            for key in obj.keys() {
                if key != "scheduler" && key != "systems" {
                    errors.push(format!("unknown top-level key '{key}'"));
                }
            }
        } else if !doc.is_null() {
            errors.push("configuration root must be a mapping".to_string());
        }

        let scheduler = match doc.get("scheduler") {
            None | Some(Value::Null) => SchedulerSettings::default(),
            Some(v) => match serde_json::from_value::<SchedulerSettings>(v.clone()) {
                Ok(s) => s,
                Err(e) => {
                    errors.push(format!("scheduler: {e}"));
                    SchedulerSettings::default()
                }
            },
        };
        scheduler.validate(&mut errors);

        let mut systems = Vec::new();
        match doc.get("systems") {
            Some(Value::Array(items)) if !items.is_empty() => {
                for (i, item) in items.iter().enumerate() {
                    let section = format!("systems[{i}]");
                    match serde_json::from_value::<RawSystem>(item.clone()) {
                        Ok(raw) => {
                            if let Some(sys) = validate_system(&section, raw, &env, &mut errors) {
                                systems.push(sys);
                            }
                        }
                        Err(e) => errors.push(format!("{section}: {e}")),
                    }
                }
            }
            Some(Value::Array(_)) | None | Some(Value::Null) => {
                errors.push("no systems configured".to_string());
            }
            Some(_) => errors.push("systems must be a list".to_string()),
        }

        let mut seen = BTreeSet::new();
        for s in &systems {
            if !seen.insert(s.system_id) {
                errors.push(format!("system_id {} is configured more than once", s.system_id));
            }
        }

        if !errors.is_empty() {
            bail!("CONFIG_INVALID: {} problem(s)\n{}", errors.len(), errors.join("\n"));
        }
        Ok(Self { scheduler, systems })
    }
}

fn validate_system<F>(
    section: &str,
    raw: RawSystem,
    env: &F,
    errors: &mut Vec<String>,
) -> Option<SystemConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let before = errors.len();
    let mut required = |field: &str, present: bool| {
        if !present {
            errors.push(format!("{section}: required option {field}"));
        }
    };
    required("login", raw.login.is_some());
    required("system_id", raw.system_id.is_some());
    required("transmitter_id", raw.transmitter_id.is_some());
    required("central_id", raw.central_id.is_some());
    required("master_code", raw.master_code.is_some());
    required("name", raw.name.is_some());

    let password = match (raw.password, raw.password_env) {
        (Some(p), None) => Some(p),
        (None, Some(var)) => match env(&var) {
            Some(p) => Some(p),
            None => {
                errors.push(format!("{section}: password_env {var} is not set"));
                None
            }
        },
        (Some(_), Some(_)) => {
            errors.push(format!("{section}: set either password or password_env, not both"));
            None
        }
        (None, None) => {
            errors.push(format!("{section}: required option password"));
            None
        }
    };

    if let Some(login) = &raw.login {
        if !looks_like_email(login) {
            errors.push(format!("{section}: invalid option login"));
        }
    }
    for (field, value) in [
        ("transmitter_id", &raw.transmitter_id),
        ("central_id", &raw.central_id),
    ] {
        if let Some(v) = value {
            if !is_upper_hex(v) {
                errors.push(format!("{section}: invalid option {field} (uppercase hex expected)"));
            }
        }
    }
    let master_code = match raw.master_code {
        Some(code) => match u16::try_from(code) {
            Ok(c) if c <= 9999 => Some(c),
            _ => {
                errors.push(format!("{section}: invalid option master_code (0..=9999)"));
                None
            }
        },
        None => None,
    };

    let stay_groups = groups_option(section, "stay_groups", raw.stay_groups, 1, errors);
    let night_groups = groups_option(section, "night_groups", raw.night_groups, 2, errors);

    if errors.len() != before {
        return None;
    }
    Some(SystemConfig {
        login: raw.login?,
        password: password?,
        system_id: raw.system_id?,
        transmitter_id: raw.transmitter_id?,
        central_id: raw.central_id?,
        master_code: master_code?,
        name: raw.name?,
        stay_groups: stay_groups?,
        night_groups: night_groups?,
        trigger_feed: raw.trigger_feed.unwrap_or(false),
    })
}

fn groups_option(
    section: &str,
    field: &str,
    ids: Option<Vec<i64>>,
    default_group: i64,
    errors: &mut Vec<String>,
) -> Option<GroupSet> {
    let ids = ids.unwrap_or_else(|| vec![default_group]);
    if ids.is_empty() {
        errors.push(format!("{section}: {field} must not be empty"));
        return None;
    }
    match GroupSet::new(ids) {
        Ok(g) => Some(g),
        Err(e) => {
            errors.push(format!("{section}: {field}: {e}"));
            None
        }
    }
}

fn looks_like_email(s: &str) -> bool {
    s.split_once('@')
        .map(|(_, domain)| domain.contains('.'))
        .unwrap_or(false)
}

fn is_upper_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
}
