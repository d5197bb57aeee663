use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Launch description of one external tool-server process.
///
/// `inherit_env = false` hands the child exactly the `env` map and nothing
/// else; providers that take credentials through the environment rely on
/// this full override.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub inherit_env: bool,
    pub workdir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawServer {
    #[serde(default)]
    pub(crate) name: String,
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default = "default_inherit_env")]
    inherit_env: bool,
    workdir: Option<String>,
}

fn default_inherit_env() -> bool {
    true
}

impl From<RawServer> for ServerConfig {
    fn from(raw: RawServer) -> Self {
        let expand = |s: &str| -> String {
            shellexpand::full(s)
                .map(|cow| cow.into_owned())
                .unwrap_or_else(|_| s.to_string())
        };

        let command = PathBuf::from(expand(&raw.command));
        let workdir = raw.workdir.map(|d| PathBuf::from(expand(&d)));
        let args = raw.args.iter().map(|arg| expand(arg)).collect();
        // Values are expanded so credentials can be forwarded as
        // `KEY = "${KEY}"`; keys are taken literally.
        let env = raw
            .env
            .into_iter()
            .map(|(key, value)| {
                let expanded = expand(&value);
                (key, expanded)
            })
            .collect();

        Self {
            name: raw.name,
            command,
            args,
            env,
            inherit_env: raw.inherit_env,
            workdir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn expands_env_vars_in_command_args_and_env_values() {
        unsafe {
            env::set_var("TEST_BRIDGE_ROOT", "/path/to/servers");
            env::set_var("TEST_BRIDGE_CRED", "secret-token");
        }

        let raw = RawServer {
            name: "filesystem".to_string(),
            command: "${TEST_BRIDGE_ROOT}/server".to_string(),
            args: vec!["--flag".to_string(), "${TEST_BRIDGE_CRED}".to_string()],
            env: HashMap::from([(
                "API_TOKEN".to_string(),
                "${TEST_BRIDGE_CRED}".to_string(),
            )]),
            inherit_env: false,
            workdir: Some("${TEST_BRIDGE_ROOT}/work".to_string()),
        };

        let config = ServerConfig::from(raw);

        let cmd = config.command.to_str().expect("valid utf8");
        assert!(cmd.contains("/path/to/servers/server"));
        assert!(config.args.contains(&"secret-token".to_string()));
        assert_eq!(
            config.env.get("API_TOKEN").map(String::as_str),
            Some("secret-token")
        );
        assert!(!config.inherit_env);

        let workdir = config.workdir.expect("workdir exists");
        assert!(workdir.to_str().expect("valid utf8").contains("/path/to/servers/work"));

        unsafe {
            env::remove_var("TEST_BRIDGE_ROOT");
            env::remove_var("TEST_BRIDGE_CRED");
        }
    }

    #[test]
    fn inherit_env_defaults_to_true() {
        let raw: RawServer = toml::from_str(
            r#"
name = "memory"
command = "npx"
args = ["-y", "@modelcontextprotocol/server-memory"]
"#,
        )
        .expect("parse raw server");
        let config = ServerConfig::from(raw);
        assert!(config.inherit_env);
        assert!(config.env.is_empty());
    }
}
