//! Schema registry for node metadata.
//!
//! Every metadata key the graph understands is declared here once, at
//! startup, as a [`FieldDefinition`]: its namespace, typed [`FieldType`]
//! (which carries the sanitize/validate behaviour, see [`crate::engine`]),
//! default value, and label. The registry is immutable after construction
//! and is shared by reference between the engine, the metadata facade, and
//! the HTTP layer.
//!
//! # Lookup order
//!
//! Keys are unique within a namespace. When a lookup omits the namespace,
//! namespaces are scanned in declared order (`graph`, `project`,
//! `illustration`) and the first match wins.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

pub const SHOW_IN_GRAPH: &str = "_archi_show_in_graph";
pub const NODE_COLOR: &str = "_archi_node_color";
pub const NODE_SIZE: &str = "_archi_node_size";
pub const PRIORITY_LEVEL: &str = "_archi_priority_level";
pub const NODE_SHAPE: &str = "_archi_node_shape";
pub const PIN_NODE: &str = "_archi_pin_node";
pub const HIDE_LINKS: &str = "_archi_hide_links";
pub const GRAPH_POSITION: &str = "_archi_graph_position";
pub const RELATED_ARTICLES: &str = "_archi_related_articles";

/// A grouping of field definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Graph,
    Project,
    Illustration,
}

impl Namespace {
    /// Declared scan order for namespace-less lookups.
    pub const ALL: [Namespace; 3] = [Namespace::Graph, Namespace::Project, Namespace::Illustration];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Graph => "graph",
            Namespace::Project => "project",
            Namespace::Illustration => "illustration",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "graph" => Ok(Namespace::Graph),
            "project" => Ok(Namespace::Project),
            "illustration" => Ok(Namespace::Illustration),
            other => anyhow::bail!(
                "Unknown namespace: '{}'. Must be graph, project, or illustration.",
                other
            ),
        }
    }
}

/// The type of a field, with the rule parameters its validator checks.
///
/// `Position` and `IdList` are composite array-typed fields whose custom
/// validators replace the generic rule sequence.
#[derive(Debug, Clone)]
pub enum FieldType {
    /// Stored as `"0"` / `"1"`.
    Boolean,
    /// `#rrggbb`, lowercase.
    Color,
    Number {
        min: Option<f64>,
        max: Option<f64>,
        integer: bool,
    },
    Select {
        options: &'static [&'static str],
    },
    Text {
        max_len: Option<usize>,
        pattern: Option<Regex>,
    },
    /// `{x, y}` integer coordinates.
    Position,
    /// Deduplicated list of positive entity ids.
    IdList,
}

impl FieldType {
    /// The type name exposed to editor clients.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::Color => "color",
            FieldType::Number { .. } => "number",
            FieldType::Select { .. } => "select",
            FieldType::Text { .. } => "text",
            FieldType::Position | FieldType::IdList => "array",
        }
    }
}

/// An immutable metadata field declaration.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub key: &'static str,
    pub namespace: Namespace,
    pub field_type: FieldType,
    pub default: Value,
    pub label: &'static str,
}

/// Serializable description of a field, for editor UIs and the CLI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSummary {
    pub key: &'static str,
    pub namespace: Namespace,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub label: &'static str,
    pub default: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<&'static [&'static str]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl FieldDefinition {
    pub fn summary(&self) -> FieldSummary {
        let mut summary = FieldSummary {
            key: self.key,
            namespace: self.namespace,
            kind: self.field_type.kind(),
            label: self.label,
            default: self.default.clone(),
            options: None,
            min: None,
            max: None,
            max_length: None,
            pattern: None,
        };
        match &self.field_type {
            FieldType::Boolean => summary.options = Some(BOOLEAN_OPTIONS),
            FieldType::Color => summary.pattern = Some(COLOR_PATTERN.to_string()),
            FieldType::Number { min, max, .. } => {
                summary.min = *min;
                summary.max = *max;
            }
            FieldType::Select { options } => summary.options = Some(*options),
            FieldType::Text { max_len, pattern } => {
                summary.max_length = *max_len;
                summary.pattern = pattern.as_ref().map(|p| p.as_str().to_string());
            }
            FieldType::Position | FieldType::IdList => {}
        }
        summary
    }
}

pub(crate) const BOOLEAN_OPTIONS: &[&str] = &["0", "1"];
pub(crate) const COLOR_PATTERN: &str = "^#[0-9a-f]{6}$";

const PRIORITY_OPTIONS: &[&str] = &["low", "normal", "high", "featured"];
const SHAPE_OPTIONS: &[&str] = &["circle", "square", "diamond", "triangle", "hexagon"];
const PROJECT_STATUS_OPTIONS: &[&str] = &["planned", "in_progress", "completed"];

/// Process-wide registry of field definitions, grouped by namespace.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    namespaces: Vec<(Namespace, Vec<FieldDefinition>)>,
}

impl SchemaRegistry {
    /// Build a registry from arbitrary definitions. Fails if a key is
    /// declared twice within the same namespace.
    pub fn from_definitions(definitions: Vec<FieldDefinition>) -> anyhow::Result<Self> {
        let mut seen = HashSet::new();
        for def in &definitions {
            if !seen.insert((def.namespace, def.key)) {
                anyhow::bail!(
                    "duplicate field definition '{}' in namespace '{}'",
                    def.key,
                    def.namespace
                );
            }
        }
        Ok(Self::group(definitions))
    }

    fn group(definitions: Vec<FieldDefinition>) -> Self {
        let namespaces = Namespace::ALL
            .iter()
            .map(|ns| {
                let fields = definitions
                    .iter()
                    .filter(|d| d.namespace == *ns)
                    .cloned()
                    .collect();
                (*ns, fields)
            })
            .collect();
        Self { namespaces }
    }

    /// The registry of every field the graph editor and theme understand.
    pub fn builtin() -> Self {
        Self::group(builtin_definitions())
    }

    /// Resolve a key, optionally restricted to one namespace.
    pub fn lookup(&self, key: &str, namespace: Option<Namespace>) -> Option<&FieldDefinition> {
        match namespace {
            Some(ns) => self.definitions_for(ns).iter().find(|d| d.key == key),
            None => self.all().find(|d| d.key == key),
        }
    }

    /// Definitions of one namespace, in declared order.
    pub fn definitions_for(&self, namespace: Namespace) -> &[FieldDefinition] {
        self.namespaces
            .iter()
            .find(|(ns, _)| *ns == namespace)
            .map(|(_, fields)| fields.as_slice())
            .unwrap_or(&[])
    }

    /// Every definition, namespaces in declared order.
    pub fn all(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.namespaces.iter().flat_map(|(_, fields)| fields.iter())
    }

    pub fn len(&self) -> usize {
        self.namespaces.iter().map(|(_, f)| f.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn pattern(src: &str) -> Regex {
    Regex::new(src).expect("built-in field pattern is a valid regex")
}

fn text(max_len: usize) -> FieldType {
    FieldType::Text {
        max_len: Some(max_len),
        pattern: None,
    }
}

fn field(
    namespace: Namespace,
    key: &'static str,
    field_type: FieldType,
    default: Value,
    label: &'static str,
) -> FieldDefinition {
    FieldDefinition {
        key,
        namespace,
        field_type,
        default,
        label,
    }
}

fn builtin_definitions() -> Vec<FieldDefinition> {
    use Namespace::{Graph, Illustration, Project};

    vec![
        field(Graph, SHOW_IN_GRAPH, FieldType::Boolean, json!("0"), "Show in graph"),
        field(Graph, NODE_COLOR, FieldType::Color, json!("#3498db"), "Node color"),
        field(
            Graph,
            NODE_SIZE,
            FieldType::Number {
                min: Some(40.0),
                max: Some(120.0),
                integer: true,
            },
            json!(60),
            "Node size",
        ),
        field(
            Graph,
            PRIORITY_LEVEL,
            FieldType::Select {
                options: PRIORITY_OPTIONS,
            },
            json!("normal"),
            "Priority level",
        ),
        field(
            Graph,
            NODE_SHAPE,
            FieldType::Select {
                options: SHAPE_OPTIONS,
            },
            json!("circle"),
            "Node shape",
        ),
        field(Graph, PIN_NODE, FieldType::Boolean, json!("0"), "Pin node position"),
        field(Graph, HIDE_LINKS, FieldType::Boolean, json!("0"), "Hide links"),
        field(
            Graph,
            GRAPH_POSITION,
            FieldType::Position,
            json!({ "x": 0, "y": 0 }),
            "Graph position",
        ),
        field(Graph, RELATED_ARTICLES, FieldType::IdList, json!([]), "Related articles"),
        field(
            Project,
            "_archi_project_surface",
            FieldType::Number {
                min: Some(0.0),
                max: Some(1_000_000.0),
                integer: false,
            },
            json!(0),
            "Surface (m²)",
        ),
        field(
            Project,
            "_archi_project_cost",
            FieldType::Number {
                min: Some(0.0),
                max: None,
                integer: false,
            },
            json!(0),
            "Cost",
        ),
        field(Project, "_archi_project_client", text(200), json!(""), "Client"),
        field(Project, "_archi_project_location", text(200), json!(""), "Location"),
        field(
            Project,
            "_archi_project_start_date",
            FieldType::Text {
                max_len: Some(10),
                pattern: Some(pattern(r"^\d{4}-\d{2}-\d{2}$")),
            },
            json!(""),
            "Start date",
        ),
        field(
            Project,
            "_archi_project_status",
            FieldType::Select {
                options: PROJECT_STATUS_OPTIONS,
            },
            json!("planned"),
            "Project status",
        ),
        field(Illustration, "_archi_illustration_technique", text(100), json!(""), "Technique"),
        field(Illustration, "_archi_illustration_dimensions", text(100), json!(""), "Dimensions"),
        field(Illustration, "_archi_illustration_software", text(200), json!(""), "Software"),
        field(
            Illustration,
            "_archi_illustration_year",
            FieldType::Text {
                max_len: Some(4),
                pattern: Some(pattern(r"^\d{4}$")),
            },
            json!(""),
            "Year",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_no_duplicate_keys() {
        let defs = builtin_definitions();
        let count = defs.len();
        let registry = SchemaRegistry::from_definitions(defs).unwrap();
        assert_eq!(registry.len(), count);
    }

    #[test]
    fn test_duplicate_rejected() {
        let defs = vec![
            field(Namespace::Graph, "k", FieldType::Boolean, json!("0"), "a"),
            field(Namespace::Graph, "k", FieldType::Color, json!("#000000"), "b"),
        ];
        assert!(SchemaRegistry::from_definitions(defs).is_err());
    }

    #[test]
    fn test_same_key_in_two_namespaces_first_declared_wins() {
        let defs = vec![
            field(Namespace::Illustration, "shared", text(5), json!("ill"), "i"),
            field(Namespace::Project, "shared", text(5), json!("proj"), "p"),
        ];
        let registry = SchemaRegistry::from_definitions(defs).unwrap();
        // Project is scanned before Illustration regardless of insertion order.
        let def = registry.lookup("shared", None).unwrap();
        assert_eq!(def.namespace, Namespace::Project);
        let def = registry.lookup("shared", Some(Namespace::Illustration)).unwrap();
        assert_eq!(def.default, json!("ill"));
    }

    #[test]
    fn test_lookup_respects_namespace() {
        let registry = SchemaRegistry::builtin();
        assert!(registry.lookup(NODE_SIZE, Some(Namespace::Graph)).is_some());
        assert!(registry.lookup(NODE_SIZE, Some(Namespace::Project)).is_none());
        assert!(registry.lookup("_archi_project_client", None).is_some());
        assert!(registry.lookup("_nope", None).is_none());
    }

    #[test]
    fn test_definitions_for_keeps_declared_order() {
        let registry = SchemaRegistry::builtin();
        let keys: Vec<&str> = registry
            .definitions_for(Namespace::Graph)
            .iter()
            .map(|d| d.key)
            .collect();
        assert_eq!(keys.first(), Some(&SHOW_IN_GRAPH));
        assert_eq!(keys.last(), Some(&RELATED_ARTICLES));
        assert_eq!(keys.len(), 9);
    }

    #[test]
    fn test_summary_exposes_rules() {
        let registry = SchemaRegistry::builtin();
        let size = registry.lookup(NODE_SIZE, None).unwrap().summary();
        assert_eq!(size.kind, "number");
        assert_eq!(size.min, Some(40.0));
        assert_eq!(size.max, Some(120.0));
        let pos = registry.lookup(GRAPH_POSITION, None).unwrap().summary();
        assert_eq!(pos.kind, "array");
        let json = serde_json::to_value(&size).unwrap();
        assert_eq!(json["type"], "number");
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_namespace_parse() {
        assert_eq!("Graph".parse::<Namespace>().unwrap(), Namespace::Graph);
        assert!("meta".parse::<Namespace>().is_err());
    }
}
