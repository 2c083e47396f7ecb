use std::{collections::HashMap, path::Path, sync::Arc};

use plugin_core::{Plugin, PluginRegistry, PluginSpec};
use tracing::{info, warn};

/// Registers `plugins` under the configured specs and hands each its config.
///
/// Specs come from `specs` (the bot config), topped up with each plugin's
/// default triggers, with `<plugins_dir>/<id>/config.yaml` merged over the
/// inline config when present.
pub async fn build_registry(
    specs: &[PluginSpec],
    plugins: &[Arc<dyn Plugin>],
    plugins_dir: &str,
) -> Arc<PluginRegistry> {
    let registry = Arc::new(PluginRegistry::new());
    apply_specs(&registry, specs, plugins, plugins_dir).await;
    registry
}

/// (Re)applies specs to an existing registry.
pub async fn apply_specs(
    registry: &PluginRegistry,
    specs: &[PluginSpec],
    plugins: &[Arc<dyn Plugin>],
    plugins_dir: &str,
) {
    let by_id: HashMap<&'static str, &Arc<dyn Plugin>> =
        plugins.iter().map(|p| (p.id(), p)).collect();

    let mut specs = specs.to_vec();
    for p in plugins {
        merge_default_spec(&mut specs, p.spec(serde_yaml::Value::Null));
    }

    for mut spec in specs {
        let Some(plugin) = by_id.get(spec.id.as_str()) else {
            warn!("Unknown plugin ID: {}", spec.id);
            continue;
        };
        if let Some(file_cfg) = load_plugin_config(plugins_dir, &spec.id) {
            spec.config = merge_yaml(file_cfg, spec.config);
        }
        if let Err(e) = plugin.on_configuration_change(&spec).await {
            warn!(plugin = %spec.id, error = %e, "Plugin rejected its configuration");
        }
        info!(plugin = %spec.id, enabled = spec.enabled, commands = ?spec.triggers.commands, help = plugin.help(), "Plugin registered");
        registry.register(spec, Arc::clone(plugin)).await;
    }
}

/// Plugin config directory: `PLUGINS_DIR`, else `./plugins`.
pub fn plugins_dir() -> String {
    std::env::var("PLUGINS_DIR").unwrap_or_else(|_| "./plugins".to_owned())
}

/// Deep-merges two YAML values; on conflicts `file_cfg` wins.
fn merge_yaml(file_cfg: serde_yaml::Value, spec_cfg: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::Value::{Mapping, Null, Sequence};
    match (file_cfg, spec_cfg) {
        (Mapping(mut a), Mapping(b)) => {
            for (k, v_b) in b {
                match a.get_mut(&k) {
                    Some(v_a) => {
                        let merged = merge_yaml(v_a.clone(), v_b);
                        *v_a = merged;
                    }
                    None => {
                        a.insert(k, v_b);
                    }
                }
            }
            Mapping(a)
        }
        (Sequence(mut a), Sequence(b)) => {
            a.extend(b);
            Sequence(a)
        }
        (Null, b) => b,
        (a, _b) => a,
    }
}

fn load_plugin_config(root: &str, id: &str) -> Option<serde_yaml::Value> {
    let path = Path::new(root.trim_end_matches('/')).join(id).join("config.yaml");
    match std::fs::read_to_string(&path) {
        Ok(s) => match serde_yaml::from_str::<serde_yaml::Value>(&s) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(plugin = %id, file = %path.display(), error = %e, "Failed to parse plugin config YAML");
                None
            }
        },
        Err(e) => {
            if path.exists() {
                warn!(plugin = %id, file = %path.display(), error = %e, "Failed to read plugin config file");
            }
            None
        }
    }
}

fn merge_default_spec(specs: &mut Vec<PluginSpec>, default: PluginSpec) {
    if let Some(existing) = specs.iter_mut().find(|s| s.id == default.id) {
        for cmd in default.triggers.commands {
            if !existing
                .triggers
                .commands
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&cmd))
            {
                existing.triggers.commands.push(cmd);
            }
        }
    } else {
        specs.push(default);
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use plugin_core::{CommandArgs, PluginTriggers};
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        configs: Mutex<Vec<serde_yaml::Value>>,
    }

    #[async_trait]
    impl Plugin for Recorder {
        fn id(&self) -> &'static str {
            "webex"
        }
        fn help(&self) -> &'static str {
            ""
        }
        fn spec(&self, config: serde_yaml::Value) -> PluginSpec {
            PluginSpec {
                id: "webex".to_owned(),
                enabled: true,
                triggers: PluginTriggers {
                    commands: vec!["!webex".to_owned()],
                },
                config,
            }
        }
        async fn on_configuration_change(&self, spec: &PluginSpec) -> Result<()> {
            self.configs.lock().await.push(spec.config.clone());
            Ok(())
        }
        async fn execute_command(&self, _args: &CommandArgs) -> Result<()> {
            Ok(())
        }
    }

    fn yaml(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn file_config_wins_on_conflict() {
        let merged = merge_yaml(
            yaml("site_host: file.webex.com\nnested: {a: 1}"),
            yaml("site_host: inline.webex.com\nurl_conversion: false\nnested: {b: 2}"),
        );
        assert_eq!(
            merged,
            yaml("site_host: file.webex.com\nurl_conversion: false\nnested: {a: 1, b: 2}")
        );
        assert_eq!(merge_yaml(serde_yaml::Value::Null, yaml("a: 1")), yaml("a: 1"));
    }

    #[test]
    fn default_triggers_are_merged_without_duplicates() {
        let mut specs = vec![PluginSpec {
            id: "webex".to_owned(),
            enabled: false,
            triggers: PluginTriggers {
                commands: vec!["!WEBEX".to_owned(), "!meet".to_owned()],
            },
            config: serde_yaml::Value::Null,
        }];
        merge_default_spec(&mut specs, Recorder::default().spec(serde_yaml::Value::Null));
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].triggers.commands, vec!["!WEBEX", "!meet"]);
        assert!(!specs[0].enabled);
    }

    #[tokio::test]
    async fn registry_applies_file_config_and_notifies_plugin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("webex")).unwrap();
        std::fs::write(
            dir.path().join("webex").join("config.yaml"),
            "site_host: acme.webex.com\n",
        )
        .unwrap();

        let recorder = Arc::new(Recorder::default());
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::clone(&recorder) as Arc<dyn Plugin>];
        let specs = vec![PluginSpec {
            id: "webex".to_owned(),
            enabled: true,
            triggers: PluginTriggers::default(),
            config: yaml("url_conversion: false"),
        }];

        let registry =
            build_registry(&specs, &plugins, dir.path().to_str().unwrap()).await;
        assert!(registry.entry_by_command("!webex").await.is_some());
        assert_eq!(
            *recorder.configs.lock().await,
            vec![yaml("site_host: acme.webex.com\nurl_conversion: false")]
        );
    }

    #[tokio::test]
    async fn unknown_plugins_are_skipped() {
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(Recorder::default())];
        let specs = vec![PluginSpec {
            id: "zoom".to_owned(),
            enabled: true,
            triggers: PluginTriggers::default(),
            config: serde_yaml::Value::Null,
        }];
        let registry = build_registry(&specs, &plugins, "/nonexistent").await;
        assert!(registry.entry("zoom").await.is_none());
        assert!(registry.entry("webex").await.is_some());
    }
}
