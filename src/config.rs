//! Agent configuration.
//!
//! The file holds one `KEY = "value"` pair per line, which the `config` crate
//! reads as TOML. Environment variables of the same name win over the file.

use config::{Case, Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::client::{ConnectionParams, DEFAULT_CREDENTIAL, DEFAULT_PORT, DEFAULT_VHOST};
use crate::consumer::ReplyTarget;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentConfig {
    #[serde(rename = "RABBITMQ_HOST")]
    pub rabbitmq_host: String,

    #[serde(rename = "RABBITMQ_PORT", default = "default_port")]
    pub rabbitmq_port: u16,

    #[serde(rename = "RABBITMQ_VHOST", default = "default_vhost")]
    pub rabbitmq_vhost: String,

    #[serde(rename = "RABBITMQ_USERNAME", default = "default_credential")]
    pub rabbitmq_username: String,

    #[serde(rename = "RABBITMQ_PASSWORD", default = "default_credential")]
    pub rabbitmq_password: String,

    /// Queue the agent takes tasks from.
    #[serde(rename = "RABBITMQ_INPUT_QUEUE")]
    pub rabbitmq_input_queue: String,

    /// Routing key every reply is published under.
    #[serde(rename = "RABBITMQ_RESULT_ROUTING_KEY")]
    pub rabbitmq_result_routing_key: String,

    #[serde(rename = "RABBITMQ_RESULT_EXCHANGE", default)]
    pub rabbitmq_result_exchange: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_vhost() -> String {
    DEFAULT_VHOST.to_string()
}

fn default_credential() -> String {
    DEFAULT_CREDENTIAL.to_string()
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::Configuration(format!(
                "cannot read configuration file '{}'",
                path.display()
            )));
        }

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            // Environment lowercases keys; put them back in the file's case.
            .add_source(
                Environment::with_prefix("RABBITMQ")
                    .keep_prefix(true)
                    .convert_case(Case::UpperSnake),
            )
            .build()?;
        let config: AgentConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("RABBITMQ_HOST", &self.rabbitmq_host),
            ("RABBITMQ_INPUT_QUEUE", &self.rabbitmq_input_queue),
            ("RABBITMQ_RESULT_ROUTING_KEY", &self.rabbitmq_result_routing_key),
        ];
        for (key, value) in required.iter() {
            if value.is_empty() {
                return Err(Error::Configuration(format!("key {} is empty", key)));
            }
        }
        Ok(())
    }

    pub fn connection(&self) -> ConnectionParams {
        ConnectionParams {
            host: self.rabbitmq_host.clone(),
            port: self.rabbitmq_port,
            vhost: self.rabbitmq_vhost.clone(),
            username: self.rabbitmq_username.clone(),
            password: self.rabbitmq_password.clone(),
        }
    }

    pub fn reply_target(&self) -> ReplyTarget {
        ReplyTarget::new(self.rabbitmq_result_routing_key.clone())
            .with_exchange(self.rabbitmq_result_exchange.clone())
    }
}

impl fmt::Display for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "RABBITMQ_HOST = {}", self.rabbitmq_host)?;
        writeln!(f, "RABBITMQ_PORT = {}", self.rabbitmq_port)?;
        writeln!(f, "RABBITMQ_VHOST = {}", self.rabbitmq_vhost)?;
        writeln!(f, "RABBITMQ_USERNAME = {}", self.rabbitmq_username)?;
        writeln!(f, "RABBITMQ_PASSWORD = ****")?;
        writeln!(f, "RABBITMQ_INPUT_QUEUE = {}", self.rabbitmq_input_queue)?;
        writeln!(f, "RABBITMQ_RESULT_ROUTING_KEY = {}", self.rabbitmq_result_routing_key)?;
        write!(f, "RABBITMQ_RESULT_EXCHANGE = {}", self.rabbitmq_result_exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::NamedTempFile;

    // Every test here reads the process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sets a variable for the lifetime of the guard.
    struct EnvVar(&'static str);

    impl EnvVar {
        fn set(key: &'static str, value: &str) -> Self {
            env::set_var(key, value);
            EnvVar(key)
        }
    }

    impl Drop for EnvVar {
        fn drop(&mut self) {
            env::remove_var(self.0);
        }
    }

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("create temp config");
        file.write_all(contents.as_bytes()).expect("write temp config");
        file
    }

    #[test]
    fn reads_every_key() {
        let _env = env_lock();
        let file = write_config(
            r#"
            RABBITMQ_HOST = "broker.local"
            RABBITMQ_PORT = "5673"
            RABBITMQ_VHOST = "tenant"
            RABBITMQ_USERNAME = "agent"
            RABBITMQ_PASSWORD = "secret"
            RABBITMQ_INPUT_QUEUE = "tasks"
            RABBITMQ_RESULT_ROUTING_KEY = "results"
            RABBITMQ_RESULT_EXCHANGE = "murano"
            "#,
        );

        let config = AgentConfig::load(file.path()).expect("load config");
        assert_eq!(config.rabbitmq_host, "broker.local");
        assert_eq!(config.rabbitmq_port, 5673);
        assert_eq!(config.rabbitmq_vhost, "tenant");
        assert_eq!(config.rabbitmq_username, "agent");
        assert_eq!(config.rabbitmq_password, "secret");
        assert_eq!(config.rabbitmq_input_queue, "tasks");
        assert_eq!(config.rabbitmq_result_routing_key, "results");

        let target = config.reply_target();
        assert_eq!(target.exchange, "murano");
        assert_eq!(target.routing_key, "results");
    }

    #[test]
    fn optional_keys_fall_back_to_defaults() {
        let _env = env_lock();
        let file = write_config(
            r#"
            RABBITMQ_HOST = "localhost"
            RABBITMQ_INPUT_QUEUE = "tasks"
            RABBITMQ_RESULT_ROUTING_KEY = "results"
            "#,
        );

        let config = AgentConfig::load(file.path()).expect("load config");
        let params = config.connection();
        assert_eq!(params, ConnectionParams::new("localhost", DEFAULT_PORT));
        assert_eq!(config.reply_target().exchange, "");
    }

    #[test]
    fn missing_required_key_is_a_configuration_error() {
        let _env = env_lock();
        let file = write_config(
            r#"
            RABBITMQ_HOST = "localhost"
            RABBITMQ_RESULT_ROUTING_KEY = "results"
            "#,
        );

        match AgentConfig::load(file.path()) {
            Err(Error::Configuration(_)) => {}
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn empty_required_key_is_rejected() {
        let _env = env_lock();
        let file = write_config(
            r#"
            RABBITMQ_HOST = "localhost"
            RABBITMQ_INPUT_QUEUE = ""
            RABBITMQ_RESULT_ROUTING_KEY = "results"
            "#,
        );

        let err = AgentConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("RABBITMQ_INPUT_QUEUE"));
    }

    #[test]
    fn unreadable_file_is_a_configuration_error() {
        let _env = env_lock();
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = AgentConfig::load(&dir.path().join("agent.conf")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn display_masks_the_password() {
        let _env = env_lock();
        let file = write_config(
            r#"
            RABBITMQ_HOST = "localhost"
            RABBITMQ_PASSWORD = "hunter2"
            RABBITMQ_INPUT_QUEUE = "tasks"
            RABBITMQ_RESULT_ROUTING_KEY = "results"
            "#,
        );

        let shown = AgentConfig::load(file.path()).expect("load config").to_string();
        assert!(shown.contains("RABBITMQ_INPUT_QUEUE = tasks"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn environment_wins_over_the_file() {
        let _env = env_lock();
        let _host = EnvVar::set("RABBITMQ_HOST", "envhost");
        let _port = EnvVar::set("RABBITMQ_PORT", "5999");
        let file = write_config(
            r#"
            RABBITMQ_HOST = "filehost"
            RABBITMQ_PORT = "5672"
            RABBITMQ_INPUT_QUEUE = "tasks"
            RABBITMQ_RESULT_ROUTING_KEY = "results"
            "#,
        );

        let config = AgentConfig::load(file.path()).expect("load config");
        assert_eq!(config.rabbitmq_host, "envhost");
        assert_eq!(config.rabbitmq_port, 5999);
        assert_eq!(config.rabbitmq_input_queue, "tasks");
    }

    #[test]
    fn environment_fills_keys_missing_from_the_file() {
        let _env = env_lock();
        let _exchange = EnvVar::set("RABBITMQ_RESULT_EXCHANGE", "murano");
        let _queue = EnvVar::set("RABBITMQ_INPUT_QUEUE", "from-env");
        let file = write_config(
            r#"
            RABBITMQ_HOST = "localhost"
            RABBITMQ_RESULT_ROUTING_KEY = "results"
            "#,
        );

        let config = AgentConfig::load(file.path()).expect("load config");
        assert_eq!(config.rabbitmq_input_queue, "from-env");
        assert_eq!(config.reply_target().exchange, "murano");
    }
}
