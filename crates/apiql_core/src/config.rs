use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ExecutionError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "table" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Process wide configuration, fixed for the lifetime of the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Log http requests and responses by default in new sessions.
    pub http_log_enabled: bool,
    /// Timeout applied to every outbound http request.
    pub request_timeout: Duration,
    /// Maximum nesting of BEGIN. Unbounded if not set.
    pub max_transaction_depth: Option<usize>,
    pub output_format: OutputFormat,
    /// Render queries instead of executing them.
    pub dry_run: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            http_log_enabled: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_transaction_depth: None,
            output_format: OutputFormat::Text,
            dry_run: false,
        }
    }
}

/// Per-session variables, changeable with `SET` and `USE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionVars {
    pub http_log_enabled: bool,
    pub application_name: String,
    /// Provider used for two-part table references. Set with `USE`.
    pub current_provider: Option<String>,
}

impl SessionVars {
    pub fn new(conf: &RuntimeConfig) -> Self {
        SessionVars {
            http_log_enabled: conf.http_log_enabled,
            application_name: String::new(),
            current_provider: None,
        }
    }

    pub fn set(&mut self, name: &str, value: &Value) -> Result<(), ExecutionError> {
        let func = GET_SET_FUNCTIONS
            .get(name.to_ascii_lowercase().as_str())
            .ok_or_else(|| ExecutionError::UnknownSetting(name.to_string()))?;
        (func.set)(value, self)
    }

    pub fn get(&self, name: &str) -> Result<Value, ExecutionError> {
        let func = GET_SET_FUNCTIONS
            .get(name.to_ascii_lowercase().as_str())
            .ok_or_else(|| ExecutionError::UnknownSetting(name.to_string()))?;
        Ok((func.get)(self))
    }

    /// Names and descriptions of every known setting, sorted by name.
    pub fn settings() -> Vec<(&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, funcs)| (*name, funcs.description))
            .collect();
        settings.sort_unstable();
        settings
    }
}

struct SettingFunctions {
    set: fn(value: &Value, vars: &mut SessionVars) -> Result<(), ExecutionError>,
    get: fn(vars: &SessionVars) -> Value,
    description: &'static str,
}

impl SettingFunctions {
    const fn new<S: SessionSetting>() -> Self {
        SettingFunctions {
            set: S::set_from_value as _,
            get: S::get_as_value as _,
            description: S::DESCRIPTION,
        }
    }
}

fn insert_setting<S: SessionSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<HttpLogEnabled>(&mut map);
    insert_setting::<ApplicationName>(&mut map);

    map
});

pub trait SessionSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_value(value: &Value, vars: &mut SessionVars) -> Result<(), ExecutionError>;
    fn get_as_value(vars: &SessionVars) -> Value;
}

pub struct HttpLogEnabled;

impl SessionSetting for HttpLogEnabled {
    const NAME: &'static str = "http_log_enabled";
    const DESCRIPTION: &'static str = "Log outbound http requests and response statuses.";

    fn set_from_value(value: &Value, vars: &mut SessionVars) -> Result<(), ExecutionError> {
        vars.http_log_enabled = value_as_bool(Self::NAME, value)?;
        Ok(())
    }

    fn get_as_value(vars: &SessionVars) -> Value {
        Value::Bool(vars.http_log_enabled)
    }
}

pub struct ApplicationName;

impl SessionSetting for ApplicationName {
    const NAME: &'static str = "application_name";
    const DESCRIPTION: &'static str = "Name of the application using this session.";

    fn set_from_value(value: &Value, vars: &mut SessionVars) -> Result<(), ExecutionError> {
        vars.application_name = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        Ok(())
    }

    fn get_as_value(vars: &SessionVars) -> Value {
        Value::String(vars.application_name.clone())
    }
}

fn value_as_bool(name: &str, value: &Value) -> Result<bool, ExecutionError> {
    let invalid = || ExecutionError::InvalidSetting {
        name: name.to_string(),
        reason: format!("expected a boolean, got {value}"),
    };

    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Ok(true),
            "false" | "off" | "no" | "0" => Ok(false),
            _ => Err(invalid()),
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_settings() {
        let mut vars = SessionVars::new(&RuntimeConfig::default());
        assert_eq!(Value::Bool(false), vars.get("http_log_enabled").unwrap());

        vars.set("HTTP_LOG_ENABLED", &Value::String("on".to_string()))
            .unwrap();
        assert!(vars.http_log_enabled);

        vars.set("application_name", &Value::String("cli".to_string()))
            .unwrap();
        assert_eq!(
            Value::String("cli".to_string()),
            vars.get("application_name").unwrap()
        );
    }

    #[test]
    fn unknown_setting() {
        let mut vars = SessionVars::new(&RuntimeConfig::default());
        let err = vars.set("does_not_exist", &Value::Bool(true)).unwrap_err();
        assert!(matches!(err, ExecutionError::UnknownSetting(_)));
    }

    #[test]
    fn invalid_bool() {
        let mut vars = SessionVars::new(&RuntimeConfig::default());
        let err = vars
            .set("http_log_enabled", &Value::String("maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidSetting { .. }));
    }

    #[test]
    fn settings_sorted() {
        let names: Vec<_> = SessionVars::settings().into_iter().map(|(n, _)| n).collect();
        assert_eq!(vec!["application_name", "http_log_enabled"], names);
    }

    #[test]
    fn output_format_from_str() {
        assert_eq!(OutputFormat::Json, "JSON".parse().unwrap());
        assert_eq!(OutputFormat::Text, "table".parse().unwrap());
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
