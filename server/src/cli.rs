use clap::{Args, Parser, Subcommand};

/// idbridge serves the users of an identity platform over LDAP.
#[derive(Debug, Parser, Clone)]
#[clap(version, author)]
pub struct CLIOpts {
    /// Export
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the LDAP server.
    #[clap(name = "run")]
    Run(RunOpts),
    /// Check that the LDAP (and LDAPS, if enabled) endpoints answer.
    #[clap(name = "healthcheck")]
    HealthCheck(RunOpts),
    /// Create the `user` and `organization` tables if they don't exist.
    /// Meant for local setups, the identity platform normally owns them.
    #[clap(name = "create_schema")]
    CreateSchema(RunOpts),
}

#[derive(Debug, Args, Clone)]
#[clap(next_help_heading = Some("GENERAL"))]
pub struct GeneralConfigOpts {
    /// Change config file name.
    #[clap(
        short,
        long,
        default_value = "idbridge_config.toml",
        env = "IDBRIDGE_CONFIG_FILE"
    )]
    pub config_file: String,

    /// Set verbose logging.
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct RunOpts {
    #[clap(flatten)]
    pub general_config: GeneralConfigOpts,

    /// Change ldap host. Default: "0.0.0.0"
    #[clap(long, env = "IDBRIDGE_LDAP_HOST")]
    pub ldap_host: Option<String>,

    /// Change ldap port. Default: 3890
    #[clap(long, env = "IDBRIDGE_LDAP_PORT")]
    pub ldap_port: Option<u16>,

    /// Database connection URL
    #[clap(long, env = "IDBRIDGE_DATABASE_URL")]
    pub database_url: Option<String>,

    #[clap(flatten)]
    pub ldaps_opts: LdapsOpts,
}

#[derive(Debug, Args, Clone)]
#[clap(next_help_heading = Some("LDAPS"))]
pub struct LdapsOpts {
    /// Enable LDAPS. Default: false.
    #[clap(long, env = "IDBRIDGE_LDAPS_OPTIONS__ENABLED")]
    pub ldaps_enabled: Option<bool>,

    /// Change ldap ssl port. Default: 6360
    #[clap(long, env = "IDBRIDGE_LDAPS_OPTIONS__PORT")]
    pub ldaps_port: Option<u16>,

    /// Set ldaps certificate
    #[clap(long, env = "IDBRIDGE_LDAPS_OPTIONS__CERT_FILE")]
    pub ldaps_cert_file: Option<String>,

    /// Set ldaps certificate key
    #[clap(long, env = "IDBRIDGE_LDAPS_OPTIONS__KEY_FILE")]
    pub ldaps_key_file: Option<String>,
}

pub fn init() -> CLIOpts {
    CLIOpts::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_run() {
        let opts = CLIOpts::parse_from([
            "idbridge",
            "run",
            "--config-file",
            "other.toml",
            "--ldap-port",
            "1389",
            "--ldaps-enabled",
            "true",
            "-v",
        ]);
        let Command::Run(run) = opts.command else {
            panic!("Expected the run command");
        };
        assert_eq!(run.general_config.config_file, "other.toml");
        assert!(run.general_config.verbose);
        assert_eq!(run.ldap_port, Some(1389));
        assert_eq!(run.ldaps_opts.ldaps_enabled, Some(true));
        assert_eq!(run.database_url, None);
    }

    #[test]
    fn test_parse_healthcheck() {
        let opts = CLIOpts::parse_from(["idbridge", "healthcheck"]);
        assert!(matches!(opts.command, Command::HealthCheck(_)));
    }
}
