//! Field Schema Registry.
//!
//! Per entity type, maps every user-facing field name (canonical names and their
//! aliases) to a [`FieldSpec`] holding the canonical name, declared value type and,
//! for enum fields, the legal values. The Condition Builder, the Validator and the
//! Suggestion Engine all read from the same registry.
//!
//! The built-in registry is immutable and shared process-wide through
//! [`FieldRegistry::global`]. Alternative registries can be loaded from JSON
//! ([`SchemaDocument`]) at startup.

use std::collections::HashMap;
use std::sync::LazyLock;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Date,
    Enum,
}

/// Declaration of one canonical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Canonical field name.
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Legal values of an enum field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl FieldSpec {
    pub fn new(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            values: Vec::new(),
            aliases: Vec::new(),
        }
    }

    pub fn enumeration(name: &str, values: &[&str]) -> Self {
        Self {
            values: values.iter().map(|v| v.to_string()).collect(),
            ..Self::new(name, ValueType::Enum)
        }
    }

    pub fn alias(mut self, aliases: &[&str]) -> Self {
        self.aliases.extend(aliases.iter().map(|a| a.to_string()));
        self
    }

    pub fn enum_values(&self) -> Option<&[String]> {
        match self.value_type {
            ValueType::Enum => Some(&self.values),
            _ => None,
        }
    }
}

/// Serialized form of a registry, as read from a schema JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub entities: IndexMap<String, EntityDocument>,
    /// Aliases resolved regardless of entity type, `alias -> canonical field`.
    #[serde(default)]
    pub common_aliases: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityDocument {
    pub fields: Vec<FieldSpec>,
    /// Columns searched by freetext conditions.
    #[serde(default)]
    pub text_search: Vec<String>,
}

/// The resolved schema of one entity type.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    name: String,
    fields: Vec<FieldSpec>,
    /// Canonical names and aliases -> index into `fields`.
    lookup: HashMap<String, usize>,
    text_columns: Vec<String>,
}

impl EntitySchema {
    fn from_document(name: &str, doc: EntityDocument) -> Result<Self, ConfigError> {
        let mut lookup = HashMap::new();
        for (index, spec) in doc.fields.iter().enumerate() {
            if spec.value_type == ValueType::Enum && spec.values.is_empty() {
                return Err(ConfigError::InvalidSchema(format!(
                    "enum field '{}.{}' declares no values",
                    name, spec.name
                )));
            }
            for key in std::iter::once(&spec.name).chain(&spec.aliases) {
                if lookup.insert(key.clone(), index).is_some() {
                    return Err(ConfigError::InvalidSchema(format!(
                        "field name '{}' is declared twice for entity '{}'",
                        key, name
                    )));
                }
            }
        }

        for column in &doc.text_search {
            if !doc.fields.iter().any(|f| &f.name == column) {
                return Err(ConfigError::InvalidSchema(format!(
                    "text search column '{}' is not a field of entity '{}'",
                    column, name
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            fields: doc.fields,
            lookup,
            text_columns: doc.text_search,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-sensitive lookup of a canonical name or alias.
    pub fn lookup(&self, alias: &str) -> Option<&FieldSpec> {
        self.lookup.get(alias).map(|&i| &self.fields[i])
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Every accepted field name in declaration order, each canonical name
    /// followed by its aliases.
    pub fn names(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().flat_map(|spec| {
            std::iter::once(spec.name.as_str())
                .chain(spec.aliases.iter().map(String::as_str))
                .map(move |name| (name, spec))
        })
    }

    pub fn text_columns(&self) -> &[String] {
        &self.text_columns
    }
}

#[derive(Debug, Clone)]
pub struct FieldRegistry {
    entities: IndexMap<String, EntitySchema>,
    common_aliases: IndexMap<String, String>,
}

static BUILTIN: LazyLock<FieldRegistry> = LazyLock::new(|| {
    FieldRegistry::from_document(builtin_document()).expect("built-in schema is consistent")
});

impl FieldRegistry {
    /// The built-in registry, initialised on first use.
    pub fn global() -> &'static FieldRegistry {
        &BUILTIN
    }

    pub fn from_document(doc: SchemaDocument) -> Result<Self, ConfigError> {
        let mut entities = IndexMap::with_capacity(doc.entities.len());
        for (name, entity) in doc.entities {
            let schema = EntitySchema::from_document(&name, entity)?;
            entities.insert(name, schema);
        }

        for (alias, target) in &doc.common_aliases {
            let declared = entities
                .values()
                .any(|e: &EntitySchema| e.fields.iter().any(|f| &f.name == target));
            if !declared {
                return Err(ConfigError::InvalidSchema(format!(
                    "common alias '{}' targets undeclared field '{}'",
                    alias, target
                )));
            }
        }

        Ok(Self {
            entities,
            common_aliases: doc.common_aliases,
        })
    }

    pub fn entity(&self, entity_type: &str) -> Option<&EntitySchema> {
        self.entities.get(entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Looks an alias up in one entity's schema only. Unknown entity types and
    /// unknown aliases both return `None`.
    pub fn lookup(&self, entity_type: &str, alias: &str) -> Option<&FieldSpec> {
        self.entity(entity_type)?.lookup(alias)
    }

    /// Resolves a typed field name for condition building: the entity's own
    /// schema first, then the common alias table, then any entity declaring
    /// the name.
    pub fn resolve(&self, entity_type: Option<&str>, alias: &str) -> Option<&FieldSpec> {
        if let Some(spec) = entity_type.and_then(|e| self.lookup(e, alias)) {
            return Some(spec);
        }
        let name = self
            .common_aliases
            .get(alias)
            .map(String::as_str)
            .unwrap_or(alias);
        self.entities.values().find_map(|e| e.lookup(name))
    }
}

/// The schema shipped with the dashboard.
pub fn builtin_document() -> SchemaDocument {
    use ValueType::{Boolean, Date, Number, String as Text};

    const SEVERITY: &[&str] = &["critical", "high", "medium", "low"];

    let mut entities = IndexMap::new();
    entities.insert(
        "iocs".to_string(),
        EntityDocument {
            fields: vec![
                FieldSpec::new("value", Text).alias(&["ip", "hash", "domain", "url", "indicator"]),
                FieldSpec::enumeration("type", &["ip", "domain", "url", "hash", "email", "cve"]),
                FieldSpec::enumeration("severity", SEVERITY),
                FieldSpec::new("confidence", Number),
                FieldSpec::new("source", Text).alias(&["feed"]),
                FieldSpec::new("malware_family", Text).alias(&["malware"]),
                FieldSpec::new("threat_actor", Text),
                FieldSpec::new("tags", Text).alias(&["tag"]),
                FieldSpec::new("is_active", Boolean).alias(&["active"]),
                FieldSpec::new("first_seen", Date),
                FieldSpec::new("last_seen", Date),
                FieldSpec::new("created_at", Date).alias(&["created"]),
            ],
            text_search: columns(&["value", "malware_family", "threat_actor", "tags", "source"]),
        },
    );
    entities.insert(
        "actors".to_string(),
        EntityDocument {
            fields: vec![
                FieldSpec::new("name", Text).alias(&["actor"]),
                FieldSpec::new("aliases", Text).alias(&["aka"]),
                FieldSpec::enumeration(
                    "actor_type",
                    &["apt", "ransomware", "cybercrime", "hacktivist"],
                )
                .alias(&["type"]),
                FieldSpec::new("origin_country", Text).alias(&["country"]),
                FieldSpec::new("target_sectors", Text).alias(&["sector"]),
                FieldSpec::new("target_countries", Text).alias(&["target"]),
                FieldSpec::enumeration("trend_status", &["ESCALATING", "STABLE", "DECLINING"])
                    .alias(&["trend"]),
                FieldSpec::new("incident_count", Number).alias(&["incidents"]),
                FieldSpec::new("first_seen", Date),
                FieldSpec::new("last_seen", Date),
                FieldSpec::new("description", Text),
            ],
            text_search: columns(&["name", "aliases", "description"]),
        },
    );
    entities.insert(
        "vulnerabilities".to_string(),
        EntityDocument {
            fields: vec![
                FieldSpec::new("cve_id", Text).alias(&["cve"]),
                FieldSpec::new("vendor", Text),
                FieldSpec::new("product", Text),
                FieldSpec::new("cvss_score", Number).alias(&["cvss"]),
                FieldSpec::new("epss_score", Number).alias(&["epss"]),
                FieldSpec::enumeration("severity", SEVERITY),
                FieldSpec::new("kev", Boolean).alias(&["is_kev"]),
                FieldSpec::new("kev_date_added", Date).alias(&["kev_added"]),
                FieldSpec::new("ransomware_use", Boolean).alias(&["ransomware"]),
                FieldSpec::new("published_date", Date).alias(&["published"]),
                FieldSpec::new("description", Text),
            ],
            text_search: columns(&["cve_id", "vendor", "product", "description"]),
        },
    );
    entities.insert(
        "incidents".to_string(),
        EntityDocument {
            fields: vec![
                FieldSpec::new("victim_name", Text).alias(&["victim"]),
                FieldSpec::new("actor_name", Text).alias(&["actor"]),
                FieldSpec::new("victim_sector", Text).alias(&["sector"]),
                FieldSpec::new("victim_country", Text).alias(&["country"]),
                FieldSpec::enumeration("severity", SEVERITY),
                FieldSpec::enumeration("status", &["new", "investigating", "confirmed", "resolved"]),
                FieldSpec::new("discovered_date", Date).alias(&["discovered", "date"]),
                FieldSpec::new("source", Text),
                FieldSpec::new("description", Text),
            ],
            text_search: columns(&["victim_name", "actor_name", "description"]),
        },
    );

    let common_aliases = [
        ("actor", "name"),
        ("ip", "value"),
        ("hash", "value"),
        ("domain", "value"),
        ("cve", "cve_id"),
        ("cvss", "cvss_score"),
        ("victim", "victim_name"),
        ("sector", "target_sectors"),
        ("country", "origin_country"),
        ("trend", "trend_status"),
    ]
    .into_iter()
    .map(|(alias, field)| (alias.to_string(), field.to_string()))
    .collect();

    SchemaDocument {
        entities,
        common_aliases,
    }
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_loads() {
        let registry = FieldRegistry::global();
        let types: Vec<_> = registry.entity_types().collect();
        assert_eq!(types, vec!["iocs", "actors", "vulnerabilities", "incidents"]);
    }

    #[test]
    fn test_canonical_names_are_their_own_alias() {
        let registry = FieldRegistry::global();
        for entity in registry.entity_types() {
            let schema = registry.entity(entity).unwrap();
            for spec in schema.fields() {
                assert_eq!(schema.lookup(&spec.name).unwrap().name, spec.name);
            }
        }
    }

    #[test]
    fn test_entity_alias_lookup() {
        let registry = FieldRegistry::global();
        assert_eq!(registry.lookup("actors", "actor").unwrap().name, "name");
        assert_eq!(registry.lookup("iocs", "ip").unwrap().name, "value");
        assert_eq!(registry.lookup("iocs", "hash").unwrap().name, "value");
        assert_eq!(registry.lookup("vulnerabilities", "cvss").unwrap().name, "cvss_score");
        assert_eq!(registry.lookup("vulnerabilities", "cve").unwrap().name, "cve_id");
        assert_eq!(registry.lookup("incidents", "victim").unwrap().name, "victim_name");
        assert_eq!(registry.lookup("actors", "sector").unwrap().name, "target_sectors");
        assert_eq!(registry.lookup("actors", "country").unwrap().name, "origin_country");
        assert_eq!(registry.lookup("actors", "trend").unwrap().name, "trend_status");
    }

    #[test]
    fn test_lookup_is_case_sensitive_and_never_panics() {
        let registry = FieldRegistry::global();
        assert!(registry.lookup("iocs", "Type").is_none());
        assert!(registry.lookup("iocs", "nope").is_none());
        assert!(registry.lookup("no_such_entity", "type").is_none());
    }

    #[test]
    fn test_enum_values() {
        let registry = FieldRegistry::global();
        let ioc_type = registry.lookup("iocs", "type").unwrap();
        assert_eq!(
            ioc_type.enum_values().unwrap(),
            ["ip", "domain", "url", "hash", "email", "cve"]
        );
        let trend = registry.lookup("actors", "trend").unwrap();
        assert_eq!(trend.enum_values().unwrap(), ["ESCALATING", "STABLE", "DECLINING"]);
        assert!(registry.lookup("iocs", "value").unwrap().enum_values().is_none());
    }

    #[test]
    fn test_resolve_falls_back_to_common_aliases() {
        let registry = FieldRegistry::global();
        assert_eq!(registry.resolve(None, "actor").unwrap().name, "name");
        assert_eq!(registry.resolve(None, "cvss").unwrap().value_type, ValueType::Number);
        // entity schema wins over the common table
        assert_eq!(registry.resolve(Some("incidents"), "actor").unwrap().name, "actor_name");
        // unknown to iocs, known through the common table
        assert_eq!(registry.resolve(Some("iocs"), "cvss").unwrap().name, "cvss_score");
        assert!(registry.resolve(Some("iocs"), "unknownfield").is_none());
    }

    #[test]
    fn test_names_lists_canonical_then_aliases() {
        let registry = FieldRegistry::global();
        let names: Vec<_> = registry
            .entity("iocs")
            .unwrap()
            .names()
            .map(|(n, _)| n)
            .take(7)
            .collect();
        assert_eq!(names, vec!["value", "ip", "hash", "domain", "url", "indicator", "type"]);
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let mut doc = SchemaDocument::default();
        doc.entities.insert(
            "iocs".to_string(),
            EntityDocument {
                fields: vec![
                    FieldSpec::new("value", ValueType::String).alias(&["ip"]),
                    FieldSpec::new("ip", ValueType::String),
                ],
                text_search: Vec::new(),
            },
        );
        assert!(matches!(
            FieldRegistry::from_document(doc),
            Err(ConfigError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_rejects_empty_enum_and_dangling_alias() {
        let mut doc = SchemaDocument::default();
        doc.entities.insert(
            "iocs".to_string(),
            EntityDocument {
                fields: vec![FieldSpec::enumeration("type", &[])],
                text_search: Vec::new(),
            },
        );
        assert!(FieldRegistry::from_document(doc).is_err());

        let mut doc = SchemaDocument::default();
        doc.entities.insert(
            "iocs".to_string(),
            EntityDocument {
                fields: vec![FieldSpec::new("value", ValueType::String)],
                text_search: vec!["missing".to_string()],
            },
        );
        assert!(FieldRegistry::from_document(doc).is_err());

        let mut doc = SchemaDocument::default();
        doc.entities.insert(
            "iocs".to_string(),
            EntityDocument {
                fields: vec![FieldSpec::new("value", ValueType::String)],
                text_search: Vec::new(),
            },
        );
        doc.common_aliases
            .insert("actor".to_string(), "name".to_string());
        assert!(FieldRegistry::from_document(doc).is_err());
    }
}
