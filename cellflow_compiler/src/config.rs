use std::{
    fmt::{Display, Formatter},
    fs,
    path::{Path, PathBuf},
};
use toml::Value;

use crate::naming::object_type_module;

pub const CONFIG_FILE: &str = "cellflow.toml";

/// Where generated programs import things from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Types shipped with the runtime library rather than with the project.
    pub built_in_types: Vec<String>,
    pub built_in_module: String,
    pub object_types_package: String,
    pub resources_module: String,
    /// Directory of object-type sources, relative to the config file.
    pub object_types_dir: PathBuf,
    /// Sources of the built-in types, read for their actions only.
    pub built_in_types_dir: PathBuf,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            built_in_types: vec!["Generic".to_string(), "Robot".to_string()],
            built_in_module: "arcor2.object_types".to_string(),
            object_types_package: "object_types".to_string(),
            resources_module: "resources".to_string(),
            object_types_dir: PathBuf::from("object_types"),
            built_in_types_dir: PathBuf::from("built_in_types"),
        }
    }
}

impl CompilerConfig {
    pub fn is_built_in(&self, type_name: &str) -> bool {
        self.built_in_types.iter().any(|t| t == type_name)
    }

    /// Module the generated program imports `type_name` from.
    pub fn type_module(&self, type_name: &str) -> String {
        if self.is_built_in(type_name) {
            self.built_in_module.clone()
        } else {
            format!("{}.{}", self.object_types_package, object_type_module(type_name))
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    ParseToml(toml::de::Error),
    InvalidField(&'static str, String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::ParseToml(err) => write!(f, "{err}"),
            Self::InvalidField(field, reason) => write!(f, "invalid field `{field}`: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::ParseToml(value)
    }
}

/// Reads `cellflow.toml` from `root`; defaults when the file does not exist.
pub fn load_config(root: &Path) -> Result<CompilerConfig, ConfigError> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        log::debug!("no {} in {}, using defaults", CONFIG_FILE, root.display());
        return Ok(CompilerConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<CompilerConfig, ConfigError> {
    let value: Value = contents.parse::<Value>()?;
    let mut config = CompilerConfig::default();

    let Some(compiler) = value.get("compiler") else {
        return Ok(config);
    };
    let compiler = compiler.as_table().ok_or(ConfigError::InvalidField(
        "compiler",
        "must be a table".to_string(),
    ))?;

    if let Some(raw) = compiler.get("built_in_types") {
        let list = raw.as_array().ok_or(ConfigError::InvalidField(
            "compiler.built_in_types",
            "must be an array of type names".to_string(),
        ))?;
        config.built_in_types = list
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or(ConfigError::InvalidField(
                    "compiler.built_in_types",
                    "must be an array of type names".to_string(),
                ))
            })
            .collect::<Result<_, _>>()?;
    }

    if let Some(module) = string_field(compiler, "built_in_module", "compiler.built_in_module")? {
        validate_module_path("compiler.built_in_module", &module)?;
        config.built_in_module = module;
    }
    if let Some(package) =
        string_field(compiler, "object_types_package", "compiler.object_types_package")?
    {
        validate_module_path("compiler.object_types_package", &package)?;
        config.object_types_package = package;
    }
    if let Some(module) = string_field(compiler, "resources_module", "compiler.resources_module")? {
        validate_module_path("compiler.resources_module", &module)?;
        config.resources_module = module;
    }
    if let Some(dir) = string_field(compiler, "object_types_dir", "compiler.object_types_dir")? {
        config.object_types_dir = PathBuf::from(dir);
    }
    if let Some(dir) = string_field(compiler, "built_in_types_dir", "compiler.built_in_types_dir")? {
        config.built_in_types_dir = PathBuf::from(dir);
    }

    Ok(config)
}

fn string_field(
    table: &toml::map::Map<String, Value>,
    key: &str,
    field: &'static str,
) -> Result<Option<String>, ConfigError> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or(ConfigError::InvalidField(field, "must be a string".to_string())),
    }
}

fn validate_module_path(field: &'static str, module: &str) -> Result<(), ConfigError> {
    let valid = !module.is_empty()
        && module
            .split('.')
            .all(cellflow_source::lexer::is_identifier);
    if valid {
        return Ok(());
    }
    Err(ConfigError::InvalidField(
        field,
        "must be a dotted module path, for example `arcor2.object_types`".to_string(),
    ))
}
