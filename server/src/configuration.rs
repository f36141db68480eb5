use crate::{
    cli::{GeneralConfigOpts, LdapsOpts, RunOpts},
    database_string::DatabaseUrl,
};
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const ENV_PREFIX: &str = "IDBRIDGE_";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct LdapsOptions {
    pub enabled: bool,
    pub port: u16,
    pub cert_file: String,
    pub key_file: String,
}

impl Default for LdapsOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 6360,
            cert_file: "cert.pem".to_string(),
            key_file: "key.pem".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct HealthcheckOptions {
    /// Host the healthcheck connects to.
    pub ldap_host: String,
}

impl Default for HealthcheckOptions {
    fn default() -> Self {
        Self {
            ldap_host: "localhost".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, derive_builder::Builder)]
#[builder(pattern = "owned")]
pub struct Configuration {
    #[builder(default = r#"String::from("0.0.0.0")"#)]
    pub ldap_host: String,
    #[builder(default = "3890")]
    pub ldap_port: u16,
    #[builder(default)]
    pub database_url: DatabaseUrl,
    #[builder(default = "false")]
    pub verbose: bool,
    #[builder(default)]
    pub ldaps_options: LdapsOptions,
    #[builder(default)]
    pub healthcheck_options: HealthcheckOptions,
}

impl ConfigurationBuilder {
    #[cfg(test)]
    pub fn for_tests() -> Configuration {
        ConfigurationBuilder::default()
            .verbose(true)
            .build()
            .unwrap()
    }
}

pub trait ConfigOverrider {
    fn override_config(&self, config: &mut Configuration);
}

pub trait TopLevelCommandOpts {
    fn general_config(&self) -> &GeneralConfigOpts;
}

impl TopLevelCommandOpts for RunOpts {
    fn general_config(&self) -> &GeneralConfigOpts {
        &self.general_config
    }
}

impl ConfigOverrider for RunOpts {
    fn override_config(&self, config: &mut Configuration) {
        self.general_config.override_config(config);
        if let Some(host) = self.ldap_host.as_ref() {
            config.ldap_host.clone_from(host);
        }
        if let Some(port) = self.ldap_port {
            config.ldap_port = port;
        }
        if let Some(database_url) = self.database_url.as_ref() {
            config.database_url = DatabaseUrl::from(database_url.as_str());
        }
        self.ldaps_opts.override_config(config);
    }
}

impl ConfigOverrider for LdapsOpts {
    fn override_config(&self, config: &mut Configuration) {
        if let Some(enabled) = self.ldaps_enabled {
            config.ldaps_options.enabled = enabled;
        }
        if let Some(port) = self.ldaps_port {
            config.ldaps_options.port = port;
        }
        if let Some(path) = self.ldaps_cert_file.as_ref() {
            config.ldaps_options.cert_file.clone_from(path);
        }
        if let Some(path) = self.ldaps_key_file.as_ref() {
            config.ldaps_options.key_file.clone_from(path);
        }
    }
}

impl ConfigOverrider for GeneralConfigOpts {
    fn override_config(&self, config: &mut Configuration) {
        if self.verbose {
            config.verbose = true;
        }
    }
}

/// Flattens a figment dictionary into the environment variable names that
/// would set each of its leaves.
fn extract_keys(dict: &figment::value::Dict) -> BTreeSet<String> {
    use figment::value::{Dict, Value};
    fn process_value(value: &Dict, keys: &mut BTreeSet<String>, path: &mut Vec<String>) {
        for (key, value) in value {
            match value {
                Value::Dict(_, dict) => {
                    path.push(format!("{}__", key.to_ascii_uppercase()));
                    process_value(dict, keys, path);
                    path.pop();
                }
                _ => {
                    keys.insert(format!(
                        "{ENV_PREFIX}{}{}",
                        path.join(""),
                        key.to_ascii_uppercase()
                    ));
                }
            }
        }
    }
    let mut keys = BTreeSet::new();
    let mut path = Vec::new();
    process_value(dict, &mut keys, &mut path);
    keys
}

fn expected_keys(defaults: &Configuration) -> Result<BTreeSet<String>> {
    use figment::{Profile, Provider};
    let data = Serialized::defaults(defaults).data()?;
    let mut keys = data
        .get(&Profile::default())
        .map(extract_keys)
        .unwrap_or_default();
    // CLI-only values.
    keys.insert(format!("{ENV_PREFIX}CONFIG_FILE"));
    Ok(keys)
}

fn env_variable_provider() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

/// Returns the `IDBRIDGE_*` environment variables that match no
/// configuration key.
fn unknown_environment_variables(defaults: &Configuration) -> Result<Vec<String>> {
    use figment::{Profile, Provider};
    let expected_keys = expected_keys(defaults)?;
    let data = env_variable_provider().data()?;
    Ok(data
        .get(&Profile::default())
        .map(extract_keys)
        .unwrap_or_default()
        .into_iter()
        .filter(|k| !expected_keys.contains(k.as_str()))
        .collect())
}

pub fn init<C>(overrides: C) -> Result<Configuration>
where
    C: TopLevelCommandOpts + ConfigOverrider,
{
    let config_file = &overrides.general_config().config_file;
    println!("Loading configuration from {}", config_file);
    let defaults = ConfigurationBuilder::default().build()?;
    let mut config: Configuration = Figment::from(Serialized::defaults(&defaults))
        .merge(Toml::file(config_file))
        .merge(env_variable_provider())
        .extract()
        .with_context(|| format!("while reading the configuration from {config_file}"))?;
    overrides.override_config(&mut config);
    if config.verbose {
        println!("Configuration: {:#?}", &config);
    }
    for key in unknown_environment_variables(&defaults)? {
        eprintln!("WARNING: Unknown environment variable: {}", key);
    }
    Ok(config)
}
