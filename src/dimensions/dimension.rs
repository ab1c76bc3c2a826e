// Dimension type
// Wraps the element graph with identity, token and subtype policy

use crate::core::{DimensionId, ElementId, OlapError, OlapResult};
use crate::dimensions::DimensionSubtype;
use crate::elements::{Element, ElementGraph, ElementKind};
use crate::tokens::Token;

/// Dimension of a database
#[derive(Debug, Clone)]
pub struct Dimension {
    /// Database-local identifier
    pub id: DimensionId,

    /// Display name, unique per database (case-insensitive)
    pub name: String,

    /// Subtype tag selecting the dimension's policy
    pub subtype: DimensionSubtype,

    /// Element graph
    pub graph: ElementGraph,

    /// Version counter, bumped on every element edit
    pub token: Token,

    /// May the dimension be deleted
    pub deletable: bool,

    /// May the dimension be renamed
    pub renamable: bool,

    /// May elements be added, removed or rewired
    pub changable: bool,

    /// For `Alias` dimensions: the mirrored system-database dimension
    pub alias_source: Option<DimensionId>,
}

impl Dimension {
    /// Create an empty dimension with the subtype's default flags
    pub fn new(id: DimensionId, name: &str, subtype: DimensionSubtype) -> Self {
        Self {
            id,
            name: name.to_string(),
            subtype,
            graph: ElementGraph::new(),
            token: Token::new(),
            deletable: subtype.default_deletable(),
            renamable: subtype.default_renamable(),
            changable: subtype.default_changable(),
            alias_source: None,
        }
    }

    /// Create an alias dimension mirroring a system-database dimension
    pub fn new_alias(id: DimensionId, name: &str, source: DimensionId) -> Self {
        let mut dimension = Self::new(id, name, DimensionSubtype::Alias);
        dimension.alias_source = Some(source);
        dimension
    }

    /// Fail unless structural element edits are allowed
    pub fn check_changable(&self) -> OlapResult<()> {
        if self.changable {
            Ok(())
        } else {
            Err(OlapError::DimensionUnchangable(self.name.clone()))
        }
    }

    /// Add an element, applying the subtype's kind policy
    pub fn add_element(&mut self, name: &str, kind: ElementKind) -> OlapResult<ElementId> {
        let kind = self.subtype.coerce_kind(kind)?;
        let id = self.graph.add(name, kind)?;
        self.token.bump();
        Ok(id)
    }

    /// Delete an element; the database layer cascades to cubes and rules
    pub fn delete_element(&mut self, id: ElementId) -> OlapResult<Element> {
        let element = self.graph.delete(id)?;
        self.token.bump();
        Ok(element)
    }

    /// Rename an element
    pub fn rename_element(&mut self, id: ElementId, new_name: &str) -> OlapResult<()> {
        self.graph.rename(id, new_name)?;
        self.token.bump();
        Ok(())
    }

    /// Change an element's kind, applying the subtype's policy
    pub fn change_element_kind(&mut self, id: ElementId, kind: ElementKind) -> OlapResult<()> {
        let kind = self.subtype.coerce_kind(kind)?;
        self.graph.change_kind(id, kind)?;
        self.token.bump();
        Ok(())
    }

    /// Append weighted children to a consolidated element
    pub fn add_children(
        &mut self,
        parent: ElementId,
        children: &[(ElementId, f64)],
    ) -> OlapResult<()> {
        self.graph.add_children(parent, children)?;
        self.token.bump();
        Ok(())
    }

    /// Remove all children of a consolidated element
    pub fn remove_children(&mut self, parent: ElementId) -> OlapResult<()> {
        self.graph.remove_children(parent)?;
        self.token.bump();
        Ok(())
    }

    /// Remove the children of a consolidated element not listed in `keep`
    pub fn remove_children_not_in(
        &mut self,
        parent: ElementId,
        keep: &std::collections::HashSet<ElementId>,
    ) -> OlapResult<()> {
        self.graph.remove_children_not_in(parent, keep)?;
        self.token.bump();
        Ok(())
    }

    /// Move an element to a new position
    pub fn move_element(&mut self, id: ElementId, position: u32) -> OlapResult<()> {
        self.graph.move_element(id, position)?;
        self.token.bump();
        Ok(())
    }

    /// Element lookup by name, case-insensitive
    pub fn find_element_by_name(&self, name: &str) -> OlapResult<&Element> {
        self.graph
            .find_by_name(name)
            .ok_or_else(|| OlapError::ElementNotFound(format!("'{}' in '{}'", name, self.name)))
    }

    /// Element lookup by id
    pub fn find_element(&self, id: ElementId) -> OlapResult<&Element> {
        self.graph.get(id).ok_or_else(|| {
            OlapError::ElementNotFound(format!("element id {} in '{}'", id, self.name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtype_defaults() {
        let d = Dimension::new(0, "Products", DimensionSubtype::Normal);
        assert!(d.deletable && d.renamable && d.changable);

        let meta = Dimension::new(1, "#_CUBE_", DimensionSubtype::CubeList);
        assert!(!meta.deletable && !meta.renamable && !meta.changable);
        assert!(meta.check_changable().is_err());
    }

    #[test]
    fn test_kind_coercion_on_add() {
        let mut rights = Dimension::new(0, "#_GROUP_", DimensionSubtype::Rights);
        let id = rights.add_element("admin", ElementKind::Numeric).unwrap();
        assert_eq!(rights.find_element(id).unwrap().kind, ElementKind::Text);
    }

    #[test]
    fn test_token_bumps_on_edit() {
        let mut d = Dimension::new(0, "Months", DimensionSubtype::Normal);
        let before = d.token.value();
        d.add_element("Jan", ElementKind::Numeric).unwrap();
        assert!(d.token.value() > before);
    }
}
