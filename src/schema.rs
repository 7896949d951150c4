//! Declarative extraction schema.
//!
//! A [`Schema`] is an ordered list of sections; each section is an ordered
//! list of [`SchemaNode`]s. A node is a single-answer field, a group of
//! nodes (a sub-object such as `shipper` or `origin`) or a list of
//! structured tuples (`transit_ports`). The tree is built once, wrapped in an
//! `Arc` and walked read-only by [`crate::pipeline::assemble`]; nothing in
//! the pipeline special-cases a section by name.
//!
//! Custom schemas use the same nested-object shape as the built-in one:
//!
//! ```json
//! {
//!   "booking_details": { "booking_number": {}, "service_contract_number": {} },
//!   "shipment_route": {
//!     "origin": { "location": {}, "terminal": {} },
//!     "transit_ports": [ { "port_name": {}, "eta": {} } ]
//!   }
//! }
//! ```

use crate::error::ExtractError;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

/// Key of the optional question override inside a list node.
pub const LIST_QUESTION_KEY: &str = "__question";

/// The complete, immutable extraction schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    sections: Vec<SectionSpec>,
}

/// One top-level section of the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSpec {
    pub name: String,
    pub nodes: Vec<SchemaNode>,
}

/// A named node inside a section or group.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub name: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Single string answer.
    Field,
    /// Sub-object whose fields share names with other groups.
    Group(Vec<SchemaNode>),
    /// Zero or more tuples, resolved with one open-ended question.
    List(ListSpec),
}

/// Columns of a list node and the question that asks for all of them.
#[derive(Debug, Clone, PartialEq)]
pub struct ListSpec {
    pub columns: Vec<String>,
    pub question: Option<String>,
}

impl ListSpec {
    /// The question sent for this list, e.g.
    /// "What are port_name and eta of all the transit_ports?".
    pub fn question_for(&self, list_name: &str) -> String {
        if let Some(q) = &self.question {
            return q.clone();
        }
        let cols = match self.columns.as_slice() {
            [] => String::new(),
            [only] => only.clone(),
            [init @ .., last] => format!("{} and {}", init.join(", "), last),
        };
        format!("What are {} of all the {}?", cols, list_name)
    }
}

impl SchemaNode {
    pub fn field(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::Field,
        }
    }

    pub fn group(name: &str, fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::Group(fields.iter().map(|f| SchemaNode::field(f)).collect()),
        }
    }

    pub fn list(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::List(ListSpec {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                question: None,
            }),
        }
    }
}

impl SectionSpec {
    pub fn new(name: &str, nodes: Vec<SchemaNode>) -> Self {
        Self {
            name: name.to_string(),
            nodes,
        }
    }
}

static FREIGHT_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema {
        sections: vec![
            SectionSpec::new(
                "booking_details",
                vec![
                    SchemaNode::field("booking_number"),
                    SchemaNode::field("service_contract_number"),
                ],
            ),
            SectionSpec::new(
                "shipment_route",
                vec![
                    SchemaNode::group("origin", &["location", "terminal"]),
                    SchemaNode::group("destination", &["location", "terminal"]),
                    SchemaNode::list("transit_ports", &["port_name", "eta"]),
                ],
            ),
            SectionSpec::new(
                "cargo_information",
                vec![
                    SchemaNode::field("cargo_type"),
                    SchemaNode::field("cargo_description"),
                    SchemaNode::group("container_details", &["quantity", "size", "type"]),
                    SchemaNode::field("total_weight"),
                ],
            ),
            SectionSpec::new(
                "vessel_information",
                vec![
                    SchemaNode::field("vessel_name"),
                    SchemaNode::field("vessel_voyage"),
                    SchemaNode::field("estimated_departure"),
                    SchemaNode::field("estimated_arrival"),
                ],
            ),
            SectionSpec::new(
                "parties_information",
                vec![
                    SchemaNode::group("shipper", &["name", "contact_details"]),
                    SchemaNode::group("carrier", &["name", "contact_details"]),
                ],
            ),
        ],
    }
});

impl Default for Schema {
    fn default() -> Self {
        Schema::freight().clone()
    }
}

impl Schema {
    /// Build a schema from sections, validating it the same way a schema
    /// file is validated.
    pub fn new(sections: Vec<SectionSpec>) -> Result<Self, ExtractError> {
        let schema = Self { sections };
        schema.validate()?;
        Ok(schema)
    }

    /// The built-in freight-forwarding schema (booking, route, cargo,
    /// vessel, parties).
    pub fn freight() -> &'static Schema {
        &FREIGHT_SCHEMA
    }

    pub fn sections(&self) -> &[SectionSpec] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&SectionSpec> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Section names in schema order; this is the classification vocabulary.
    pub fn section_names(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.name.clone()).collect()
    }

    /// Parse a schema file in the nested-object shape.
    pub fn from_json_str(s: &str) -> Result<Self, ExtractError> {
        let value: Value = serde_json::from_str(s)
            .map_err(|e| ExtractError::InvalidSchema(format!("not valid JSON: {e}")))?;
        Self::from_json_value(&value)
    }

    pub fn from_json_value(value: &Value) -> Result<Self, ExtractError> {
        let root = value
            .as_object()
            .ok_or_else(|| ExtractError::InvalidSchema("top level must be an object".into()))?;

        let mut sections = Vec::with_capacity(root.len());
        for (name, body) in root {
            let body = body.as_object().ok_or_else(|| {
                ExtractError::InvalidSchema(format!("section '{name}' must be an object"))
            })?;
            sections.push(SectionSpec {
                name: name.clone(),
                nodes: parse_nodes(name, body)?,
            });
        }
        Schema::new(sections)
    }

    /// Render the schema back into its nested-object template.
    pub fn to_json_value(&self) -> Value {
        let mut root = Map::new();
        for section in &self.sections {
            root.insert(section.name.clone(), Value::Object(nodes_to_json(&section.nodes)));
        }
        Value::Object(root)
    }

    fn validate(&self) -> Result<(), ExtractError> {
        if self.sections.is_empty() {
            return Err(ExtractError::InvalidSchema("schema has no sections".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for section in &self.sections {
            if !seen.insert(section.name.as_str()) {
                return Err(ExtractError::InvalidSchema(format!(
                    "duplicate section '{}'",
                    section.name
                )));
            }
            validate_nodes(&section.name, &section.nodes)?;
        }
        Ok(())
    }
}

fn validate_nodes(path: &str, nodes: &[SchemaNode]) -> Result<(), ExtractError> {
    if nodes.is_empty() {
        return Err(ExtractError::InvalidSchema(format!("'{path}' has no fields")));
    }
    for node in nodes {
        let here = format!("{path}.{}", node.name);
        match &node.kind {
            NodeKind::Field => {}
            NodeKind::Group(children) => validate_nodes(&here, children)?,
            NodeKind::List(spec) if spec.columns.is_empty() => {
                return Err(ExtractError::InvalidSchema(format!(
                    "list '{here}' has no columns"
                )));
            }
            NodeKind::List(_) => {}
        }
    }
    Ok(())
}

fn parse_nodes(path: &str, body: &Map<String, Value>) -> Result<Vec<SchemaNode>, ExtractError> {
    let mut nodes = Vec::with_capacity(body.len());
    for (name, value) in body {
        let here = format!("{path}.{name}");
        let kind = match value {
            Value::Object(children) if children.is_empty() => NodeKind::Field,
            Value::Object(children) => NodeKind::Group(parse_nodes(&here, children)?),
            Value::Array(items) => NodeKind::List(parse_list(&here, items)?),
            _ => {
                return Err(ExtractError::InvalidSchema(format!(
                    "'{here}' must be an object or an array"
                )))
            }
        };
        nodes.push(SchemaNode {
            name: name.clone(),
            kind,
        });
    }
    Ok(nodes)
}

fn parse_list(path: &str, items: &[Value]) -> Result<ListSpec, ExtractError> {
    let mut columns: Option<Vec<String>> = None;
    let mut question = None;

    for item in items {
        let obj = item.as_object().ok_or_else(|| {
            ExtractError::InvalidSchema(format!("items of list '{path}' must be objects"))
        })?;
        if let Some(q) = obj.get(LIST_QUESTION_KEY) {
            let q = q.as_str().ok_or_else(|| {
                ExtractError::InvalidSchema(format!("'{path}.{LIST_QUESTION_KEY}' must be a string"))
            })?;
            question = Some(q.to_string());
            continue;
        }
        if columns.is_some() {
            return Err(ExtractError::InvalidSchema(format!(
                "list '{path}' must have exactly one tuple template"
            )));
        }
        let mut cols = Vec::with_capacity(obj.len());
        for (col, v) in obj {
            if !v.as_object().is_some_and(|o| o.is_empty()) {
                return Err(ExtractError::InvalidSchema(format!(
                    "column '{path}.{col}' must be an empty object"
                )));
            }
            cols.push(col.clone());
        }
        columns = Some(cols);
    }

    Ok(ListSpec {
        columns: columns.unwrap_or_default(),
        question,
    })
}

fn nodes_to_json(nodes: &[SchemaNode]) -> Map<String, Value> {
    let mut out = Map::new();
    for node in nodes {
        let v = match &node.kind {
            NodeKind::Field => Value::Object(Map::new()),
            NodeKind::Group(children) => Value::Object(nodes_to_json(children)),
            NodeKind::List(spec) => {
                let mut tuple = Map::new();
                for c in &spec.columns {
                    tuple.insert(c.clone(), Value::Object(Map::new()));
                }
                let mut items = vec![Value::Object(tuple)];
                if let Some(q) = &spec.question {
                    let mut qobj = Map::new();
                    qobj.insert(LIST_QUESTION_KEY.to_string(), Value::String(q.clone()));
                    items.push(Value::Object(qobj));
                }
                Value::Array(items)
            }
        };
        out.insert(node.name.clone(), v);
    }
    out
}
