use anyhow::{Context, Result};
use dhk_schemas::wire::RemoteSystem;
use serde::Serialize;

use crate::SchedulerSettings;

/// Environment variable named in generated configurations.
pub const SAMPLE_PASSWORD_ENV: &str = "DHK_PASSWORD";

#[derive(Serialize)]
struct SampleDoc<'a> {
    scheduler: SchedulerSettings,
    systems: Vec<SampleSystem<'a>>,
}

#[derive(Serialize)]
struct SampleSystem<'a> {
    login: &'a str,
    password_env: &'static str,
    system_id: i64,
    name: &'a str,
    transmitter_id: &'static str,
    central_id: &'static str,
    master_code: u16,
    stay_groups: Vec<i64>,
    night_groups: Vec<i64>,
    trigger_feed: bool,
}

/// YAML skeleton listing every installation of an account.
///
/// Transmitter id, central id and master code are not exposed by the
/// listing and are left blank; the result does not validate until they
/// are filled in.
pub fn render_sample(login: &str, systems: &[RemoteSystem]) -> Result<String> {
    let doc = SampleDoc {
        scheduler: SchedulerSettings::default(),
        systems: systems
            .iter()
            .map(|s| SampleSystem {
                login,
                password_env: SAMPLE_PASSWORD_ENV,
                system_id: s.id,
                name: &s.name,
                transmitter_id: "",
                central_id: "",
                master_code: 0,
                stay_groups: vec![1],
                night_groups: vec![2],
                trigger_feed: false,
            })
            .collect(),
    };
    serde_yaml::to_string(&doc).context("sample config serialize failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_lists_every_remote_system() {
        let systems = vec![
            RemoteSystem {
                id: 12,
                role: 1,
                name: "Maison".to_string(),
                installation_complete: true,
                standalone: false,
            },
            RemoteSystem {
                id: 13,
                role: 0,
                name: "Garage".to_string(),
                installation_complete: true,
                standalone: true,
            },
        ];
        let yaml = render_sample("a@b.c", &systems).unwrap();
        assert!(yaml.contains("system_id: 12"), "{yaml}");
        assert!(yaml.contains("name: Garage"), "{yaml}");
        assert!(yaml.contains("password_env: DHK_PASSWORD"), "{yaml}");
    }
}
