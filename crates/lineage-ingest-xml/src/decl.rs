//! Declarations read from the element tree.
//!
//! This layer only reads: it turns FOLDER / SOURCE / TARGET / MAPPLET /
//! MAPPING / TRANSFORMATION / INSTANCE / CONNECTOR elements into plain
//! structs, resolving attribute spellings. Graph construction happens in
//! `builder` and never touches XML.

use crate::attrs::Attr;
use crate::xml::XmlElement;
use crate::ParseError;
use lineage_model::full_name;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    pub dtype: String,
    pub port_type: String,
    pub expression: String,
}

/// A folder-level SOURCE or TARGET definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDecl {
    pub name: String,
    pub db: String,
    pub schema: String,
    pub full_name: String,
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformDecl {
    pub name: String,
    pub kind: String,
    pub fields: Vec<FieldDecl>,
    /// TABLEATTRIBUTE `(NAME, VALUE)` pairs in document order.
    pub attributes: Vec<(String, String)>,
}

impl TransformDecl {
    pub fn boundary(&self) -> Option<Boundary> {
        match self.kind.trim().to_lowercase().as_str() {
            "input transformation" | "mapplet input" => Some(Boundary::Input),
            "output transformation" | "mapplet output" => Some(Boundary::Output),
            _ => None,
        }
    }

    pub fn is_source_qualifier(&self) -> bool {
        self.kind.to_lowercase().contains("source qualifier")
    }

    pub fn is_lookup(&self) -> bool {
        self.kind.to_lowercase().contains("lookup")
    }

    /// The embedded SQL override, as `(attribute name, text)`.
    pub fn sql_override(&self) -> Option<(&str, &str)> {
        if !self.is_source_qualifier() && !self.is_lookup() {
            return None;
        }
        self.attributes
            .iter()
            .find(|(name, value)| {
                let name = name.to_lowercase();
                (name == "sql query" || name.contains("sql override")) && !value.trim().is_empty()
            })
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceDecl {
    pub name: String,
    pub type_attr: String,
    pub transformation_type: String,
    pub ref_name: String,
    pub assoc_sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorDecl {
    pub from_instance: String,
    pub from_port: String,
    pub to_instance: String,
    pub to_port: String,
}

/// Body of a MAPPING or MAPPLET: the same three element kinds either way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDecl {
    pub name: String,
    pub transformations: Vec<TransformDecl>,
    pub instances: Vec<InstanceDecl>,
    pub connectors: Vec<ConnectorDecl>,
}

impl ContainerDecl {
    pub fn boundary_transforms(&self, side: Boundary) -> impl Iterator<Item = &TransformDecl> {
        self.transformations
            .iter()
            .filter(move |t| t.boundary() == Some(side))
    }
}

/// Everything declared in one FOLDER; keys are upper-cased names.
#[derive(Debug, Clone, Default)]
pub struct FolderCatalog {
    pub name: String,
    pub sources: BTreeMap<String, TableDecl>,
    pub targets: BTreeMap<String, TableDecl>,
    pub mapplets: BTreeMap<String, ContainerDecl>,
    /// Reusable transformations declared at folder level.
    pub transformations: BTreeMap<String, TransformDecl>,
    pub mappings: Vec<ContainerDecl>,
}

impl FolderCatalog {
    pub fn source(&self, name: &str) -> Option<&TableDecl> {
        self.sources.get(&name.trim().to_uppercase())
    }

    pub fn target(&self, name: &str) -> Option<&TableDecl> {
        self.targets.get(&name.trim().to_uppercase())
    }

    pub fn mapplet(&self, name: &str) -> Option<&ContainerDecl> {
        self.mapplets.get(&name.trim().to_uppercase())
    }

    pub fn reusable_transform(&self, name: &str) -> Option<&TransformDecl> {
        self.transformations.get(&name.trim().to_uppercase())
    }
}

// ============================================================================
// Readers
// ============================================================================

/// Read every FOLDER in the document.
///
/// Fails when there is no FOLDER, or when no folder declares a MAPPING.
pub fn read_folders(doc: &XmlElement) -> Result<Vec<FolderCatalog>, ParseError> {
    let folder_els = doc.descendants_named("FOLDER");
    if folder_els.is_empty() {
        return Err(ParseError::MissingFolder);
    }

    let mut folders = Vec::with_capacity(folder_els.len());
    for el in &folder_els {
        folders.push(read_folder(el)?);
    }

    if folders.iter().all(|f| f.mappings.is_empty()) {
        return Err(ParseError::MissingMapping {
            folder: folders[0].name.clone(),
        });
    }
    Ok(folders)
}

fn read_folder(el: &XmlElement) -> Result<FolderCatalog, ParseError> {
    let mut folder = FolderCatalog {
        name: el.get(Attr::Name).unwrap_or("UNKNOWN").trim().to_string(),
        ..Default::default()
    };

    for s in el.children_named("SOURCE") {
        if let Some(table) = read_table(s, &["SOURCEFIELD", "FIELD"]) {
            folder.sources.insert(table.name.to_uppercase(), table);
        }
    }
    for t in el.children_named("TARGET") {
        if let Some(table) = read_table(t, &["TARGETFIELD", "FIELD"]) {
            folder.targets.insert(table.name.to_uppercase(), table);
        }
    }
    for t in el.children_named("TRANSFORMATION") {
        if let Some(tx) = read_transform(t) {
            folder.transformations.insert(tx.name.to_uppercase(), tx);
        }
    }
    for m in el.children_named("MAPPLET") {
        let container = read_container(m, "MAPPLET")?;
        folder
            .mapplets
            .insert(container.name.to_uppercase(), container);
    }

    // Mappings are normally direct children; tolerate wrapper elements.
    let mut mapping_els: Vec<&XmlElement> = el.children_named("MAPPING").collect();
    if mapping_els.is_empty() {
        mapping_els = el.descendants_named("MAPPING");
    }
    for m in mapping_els {
        folder.mappings.push(read_container(m, "MAPPING")?);
    }
    Ok(folder)
}

fn read_table(el: &XmlElement, field_tags: &[&str]) -> Option<TableDecl> {
    let name = el.get_or_empty(Attr::Name).to_string();
    if name.is_empty() {
        return None;
    }
    let db = el.get_or_empty(Attr::Db).to_uppercase();
    let schema = el.get_or_empty(Attr::Owner).to_uppercase();
    let full = full_name(&db, &schema, &name);
    Some(TableDecl {
        fields: read_fields(el, field_tags),
        full_name: full,
        name,
        db,
        schema,
    })
}

fn read_fields(el: &XmlElement, tags: &[&str]) -> Vec<FieldDecl> {
    let mut out = Vec::new();
    for tag in tags {
        for f in el.children_named(tag) {
            let name = f.get_or_empty(Attr::FieldName);
            if name.is_empty() {
                continue;
            }
            out.push(FieldDecl {
                name: name.to_string(),
                dtype: field_dtype(f),
                port_type: f.get_or_empty(Attr::PortType).to_string(),
                expression: f.get(Attr::Expression).unwrap_or("").to_string(),
            });
        }
    }
    out
}

/// Declared type, or `DECIMAL(p,s)` when only precision and scale are given.
fn field_dtype(f: &XmlElement) -> String {
    let dtype = f.get_or_empty(Attr::DataType);
    if !dtype.is_empty() {
        return dtype.to_string();
    }
    match (f.get(Attr::Precision), f.get(Attr::Scale)) {
        (Some(p), Some(s)) => format!("DECIMAL({},{})", p.trim(), s.trim()),
        _ => String::new(),
    }
}

fn read_transform(el: &XmlElement) -> Option<TransformDecl> {
    let name = el.get_or_empty(Attr::Name).to_string();
    if name.is_empty() {
        return None;
    }
    let attributes = el
        .children_named("TABLEATTRIBUTE")
        .map(|a| {
            (
                a.get_or_empty(Attr::Name).to_string(),
                a.get(Attr::Value).unwrap_or("").to_string(),
            )
        })
        .collect();
    Some(TransformDecl {
        kind: el.get_or_empty(Attr::Type).to_string(),
        fields: read_fields(el, &["TRANSFORMFIELD"]),
        attributes,
        name,
    })
}

fn read_container(el: &XmlElement, element: &'static str) -> Result<ContainerDecl, ParseError> {
    let name = el
        .get(Attr::Name)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ParseError::MissingAttribute {
            element,
            attribute: "NAME",
        })?
        .to_string();

    let transformations = el
        .children_named("TRANSFORMATION")
        .filter_map(read_transform)
        .collect();

    let instances = el
        .descendants_named("INSTANCE")
        .into_iter()
        .filter_map(|i| {
            let name = i.get_or_empty(Attr::InstanceName);
            if name.is_empty() {
                return None;
            }
            Some(InstanceDecl {
                name: name.to_string(),
                type_attr: i.get_or_empty(Attr::Type).to_string(),
                transformation_type: i.get_or_empty(Attr::TransformationType).to_string(),
                ref_name: i.get_or_empty(Attr::RefObject).to_string(),
                assoc_sources: i
                    .children_named("ASSOCIATED_SOURCE_INSTANCE")
                    .map(|a| a.get_or_empty(Attr::Name).to_string())
                    .filter(|n| !n.is_empty())
                    .collect(),
            })
        })
        .collect();

    let mut connectors = Vec::new();
    for c in el.descendants_named("CONNECTOR") {
        let (fi, fp, ti, tp) = (
            c.get_or_empty(Attr::FromInstance),
            c.get_or_empty(Attr::FromPort),
            c.get_or_empty(Attr::ToInstance),
            c.get_or_empty(Attr::ToPort),
        );
        if fi.is_empty() || fp.is_empty() || ti.is_empty() || tp.is_empty() {
            tracing::debug!(container = %name, "connector with missing endpoint skipped");
            continue;
        }
        connectors.push(ConnectorDecl {
            from_instance: fi.to_string(),
            from_port: fp.to_string(),
            to_instance: ti.to_string(),
            to_port: tp.to_string(),
        });
    }

    Ok(ContainerDecl {
        name,
        transformations,
        instances,
        connectors,
    })
}
