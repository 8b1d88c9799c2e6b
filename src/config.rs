//! 配置模块，负责从JSON文件加载字段schema和实体表映射

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::schema::{FieldRegistry, SchemaDocument};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.display().to_string(),
        source,
    })
}

impl FieldRegistry {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let doc: SchemaDocument =
            serde_json::from_str(json).map_err(|source| ConfigError::Json {
                path: "<inline>".to_string(),
                source,
            })?;
        Self::from_document(doc)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let doc: SchemaDocument = read_json(path.as_ref())?;
        Self::from_document(doc)
    }
}

/// 实体类型 -> 后端表名
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableMappingConfig {
    #[serde(flatten)]
    pub mappings: HashMap<String, String>,
}

impl TableMappingConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mappings: HashMap<String, String> = read_json(path.as_ref())?;
        Ok(Self { mappings })
    }

    /// 获取实体对应的表名，如果不存在则返回实体类型本身
    pub fn table_name<'a>(&'a self, entity_type: &'a str) -> &'a str {
        self.mappings
            .get(entity_type)
            .map(String::as_str)
            .unwrap_or(entity_type)
    }

    pub fn mappings(&self) -> &HashMap<String, String> {
        &self.mappings
    }
}

/// 查询控制台和谓词编译器启动时需要的全部配置
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub registry: FieldRegistry,
    pub tables: TableMappingConfig,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            registry: FieldRegistry::global().clone(),
            tables: TableMappingConfig::default(),
        }
    }
}

impl QueryConfig {
    /// 加载可选的schema和表映射文件，文件不存在或无效时使用内置配置
    pub fn load(schema: Option<&Path>, tables: Option<&Path>) -> Self {
        let mut config = Self::default();

        if let Some(path) = schema {
            match FieldRegistry::from_json_file(path) {
                Ok(registry) => {
                    info!(path = %path.display(), "loaded field schema");
                    config.registry = registry;
                }
                Err(e) => warn!(error = %e, "using built-in field schema"),
            }
        }

        if let Some(path) = tables {
            match TableMappingConfig::from_json_file(path) {
                Ok(mapping) => {
                    info!(path = %path.display(), count = mapping.mappings.len(), "loaded table mapping");
                    config.tables = mapping;
                }
                Err(e) => warn!(error = %e, "using entity types as table names"),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_load_valid_table_mapping() {
        let file = temp_json(
            r#"{
            "iocs": "threat_iocs",
            "actors": "threat_actors"
        }"#,
        );

        let config = TableMappingConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.table_name("iocs"), "threat_iocs");
        assert_eq!(config.table_name("actors"), "threat_actors");
        assert_eq!(config.table_name("incidents"), "incidents");
    }

    #[test]
    fn test_invalid_json_config() {
        let file = temp_json("invalid json");
        let result = TableMappingConfig::from_json_file(file.path());
        assert!(matches!(result, Err(ConfigError::Json { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = TableMappingConfig::from_json_file("non_existent_file.json");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_schema_file() {
        let file = temp_json(
            r#"{
            "entities": {
                "malware": {
                    "fields": [
                        {"name": "family", "type": "string", "aliases": ["malware"]},
                        {"name": "platform", "type": "enum", "values": ["windows", "linux", "macos"]},
                        {"name": "samples", "type": "number"}
                    ],
                    "text_search": ["family"]
                }
            },
            "common_aliases": {"fam": "family"}
        }"#,
        );

        let registry = FieldRegistry::from_json_file(file.path()).unwrap();
        assert_eq!(registry.lookup("malware", "malware").unwrap().name, "family");
        assert_eq!(
            registry.lookup("malware", "platform").unwrap().enum_values().unwrap(),
            ["windows", "linux", "macos"]
        );
        assert_eq!(registry.resolve(None, "fam").unwrap().name, "family");
        assert_eq!(registry.entity("malware").unwrap().text_columns(), ["family"]);
    }

    #[test]
    fn test_schema_with_unknown_type_is_rejected() {
        let result = FieldRegistry::from_json_str(
            r#"{"entities": {"x": {"fields": [{"name": "a", "type": "blob"}]}}}"#,
        );
        assert!(matches!(result, Err(ConfigError::Json { .. })));
    }

    #[test]
    fn test_load_falls_back_to_builtins() {
        let config = QueryConfig::load(
            Some(Path::new("missing_schema.json")),
            Some(Path::new("missing_tables.json")),
        );
        assert!(config.registry.entity("iocs").is_some());
        assert_eq!(config.tables.table_name("iocs"), "iocs");
    }
}
