// Element graph with hierarchy caches
// Structural edits invalidate the caches; the next query recomputes them

use crate::core::{ElementId, OlapError, OlapResult};
use crate::elements::{Element, ElementKind};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Hierarchy data derived from the element edges, recomputed lazily
#[derive(Debug, Default, Clone)]
struct HierarchyCache {
    /// Longest child chain below each element (base elements are level 0)
    level: HashMap<ElementId, u32>,

    /// Depth following the first parent chain (roots are indent 1)
    indent: HashMap<ElementId, u32>,

    /// Longest path from any root (roots are depth 0)
    depth: HashMap<ElementId, u32>,

    /// Weighted numeric base expansion of each consolidated element
    base_sets: HashMap<ElementId, Vec<(ElementId, f64)>>,

    /// Consolidated elements with a string-typed descendant
    string_consolidated: HashSet<ElementId>,

    /// Consolidated elements ordered children-before-parents (Kahn)
    topological: Vec<ElementId>,

    max_level: u32,
    max_indent: u32,
    max_depth: u32,
}

/// Per-dimension element collection with parent/child edges
///
/// Name lookup is case-insensitive; positions form a dense sequence that
/// shifts on delete and move. The child relation is kept cycle-free.
#[derive(Debug)]
pub struct ElementGraph {
    elements: Vec<Option<Element>>,
    free: BTreeSet<ElementId>,
    by_name: HashMap<String, ElementId>,
    order: Vec<ElementId>,
    cache: RwLock<Option<HierarchyCache>>,
}

impl Default for ElementGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ElementGraph {
    fn clone(&self) -> Self {
        Self {
            elements: self.elements.clone(),
            free: self.free.clone(),
            by_name: self.by_name.clone(),
            order: self.order.clone(),
            cache: RwLock::new(None),
        }
    }
}

impl ElementGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            free: BTreeSet::new(),
            by_name: HashMap::new(),
            order: Vec::new(),
            cache: RwLock::new(None),
        }
    }

    fn invalidate(&self) {
        *self.cache.write() = None;
    }

    /// Number of live elements
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if the graph has no elements
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Element by id
    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id as usize).and_then(|e| e.as_ref())
    }

    fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.get_mut(id as usize).and_then(|e| e.as_mut())
    }

    /// Element by id, as an error-producing lookup
    pub fn require(&self, id: ElementId) -> OlapResult<&Element> {
        self.get(id)
            .ok_or_else(|| OlapError::ElementNotFound(format!("element id {}", id)))
    }

    /// Element by name, case-insensitive
    pub fn find_by_name(&self, name: &str) -> Option<&Element> {
        self.by_name
            .get(&name.to_lowercase())
            .and_then(|id| self.get(*id))
    }

    /// Elements in position order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.order.iter().filter_map(move |id| self.get(*id))
    }

    /// Element ids in position order
    pub fn element_ids(&self) -> Vec<ElementId> {
        self.order.clone()
    }

    fn check_name(&self, name: &str) -> OlapResult<()> {
        if name.is_empty() {
            return Err(OlapError::ElementNameInUse("empty name".to_string()));
        }
        if name.trim() != name {
            return Err(OlapError::ElementNameInUse(format!(
                "name '{}' has leading or trailing blanks",
                name
            )));
        }
        if name.contains(|c: char| c.is_control()) {
            return Err(OlapError::ElementNameInUse(format!(
                "name '{}' contains control characters",
                name
            )));
        }
        if self.by_name.contains_key(&name.to_lowercase()) {
            return Err(OlapError::ElementNameInUse(name.to_string()));
        }
        Ok(())
    }

    /// Add a new element at the end of the position order
    pub fn add(&mut self, name: &str, kind: ElementKind) -> OlapResult<ElementId> {
        self.check_name(name)?;

        let id = match self.free.iter().next().copied() {
            Some(id) => {
                self.free.remove(&id);
                id
            }
            None => {
                self.elements.push(None);
                (self.elements.len() - 1) as ElementId
            }
        };

        let position = self.order.len() as u32;
        self.elements[id as usize] = Some(Element::new(id, name.to_string(), position, kind));
        self.by_name.insert(name.to_lowercase(), id);
        self.order.push(id);
        self.invalidate();

        Ok(id)
    }

    /// Delete an element, removing its edges in both directions
    ///
    /// The cascade to cube cells and rules happens at the database level;
    /// the removed element is returned for it.
    pub fn delete(&mut self, id: ElementId) -> OlapResult<Element> {
        let element = self.require(id)?.clone();

        // detach from parents
        for parent in &element.parents {
            if let Some(p) = self.get_mut(*parent) {
                p.children.retain(|(c, _)| *c != id);
            }
        }

        // detach from children
        for (child, _) in &element.children {
            if let Some(c) = self.get_mut(*child) {
                c.parents.retain(|p| *p != id);
            }
        }

        self.by_name.remove(&element.name.to_lowercase());
        self.order.retain(|e| *e != id);
        self.elements[id as usize] = None;
        self.free.insert(id);
        self.renumber_positions();
        self.invalidate();

        Ok(element)
    }

    fn renumber_positions(&mut self) {
        for (pos, id) in self.order.clone().into_iter().enumerate() {
            if let Some(e) = self.get_mut(id) {
                e.position = pos as u32;
            }
        }
    }

    /// Rename an element, keeping case-insensitive uniqueness
    pub fn rename(&mut self, id: ElementId, new_name: &str) -> OlapResult<()> {
        let old_name = self.require(id)?.name.clone();

        if old_name.to_lowercase() != new_name.to_lowercase() {
            self.check_name(new_name)?;
        } else if old_name == new_name {
            return Ok(());
        }

        self.by_name.remove(&old_name.to_lowercase());
        self.by_name.insert(new_name.to_lowercase(), id);
        if let Some(e) = self.get_mut(id) {
            e.name = new_name.to_string();
        }

        Ok(())
    }

    /// Change the kind of an element
    ///
    /// Dropping the consolidated kind removes the element's child edges.
    pub fn change_kind(&mut self, id: ElementId, kind: ElementKind) -> OlapResult<()> {
        let element = self.require(id)?;
        if element.kind == kind {
            return Ok(());
        }

        let old_children: Vec<ElementId> = element.children.iter().map(|(c, _)| *c).collect();

        if let Some(e) = self.get_mut(id) {
            e.kind = kind;
            if kind != ElementKind::Consolidated {
                e.children.clear();
            }
        }

        if kind != ElementKind::Consolidated {
            for child in old_children {
                if let Some(c) = self.get_mut(child) {
                    c.parents.retain(|p| *p != id);
                }
            }
        }

        self.invalidate();
        Ok(())
    }

    /// True if `to` is reachable from `from` via child edges
    fn reaches(&self, from: ElementId, to: ElementId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(e) = self.get(current) {
                stack.extend(e.children.iter().map(|(c, _)| *c));
            }
        }

        false
    }

    /// Append weighted children to a consolidated element
    ///
    /// A child already present gets its weight replaced. Fails with
    /// `CircularReference` if any new edge would close a cycle.
    pub fn add_children(
        &mut self,
        parent: ElementId,
        children: &[(ElementId, f64)],
    ) -> OlapResult<()> {
        let parent_element = self.require(parent)?;
        if parent_element.kind != ElementKind::Consolidated {
            return Err(OlapError::InvalidPermission(format!(
                "element '{}' is not consolidated",
                parent_element.name
            )));
        }

        for (child, weight) in children {
            let child_element = self.require(*child)?;
            if !weight.is_finite() {
                return Err(OlapError::InvalidPermission(format!(
                    "weight for child '{}' is not finite",
                    child_element.name
                )));
            }
            if *child == parent || self.reaches(*child, parent) {
                return Err(OlapError::CircularReference(format!(
                    "adding '{}' below '{}'",
                    child_element.name,
                    self.require(parent)?.name
                )));
            }
        }

        for (child, weight) in children {
            let known = {
                let p = self.get_mut(parent).ok_or(OlapError::ElementNotFound(
                    format!("element id {}", parent),
                ))?;
                match p.children.iter_mut().find(|(c, _)| c == child) {
                    Some(entry) => {
                        entry.1 = *weight;
                        true
                    }
                    None => {
                        p.children.push((*child, *weight));
                        false
                    }
                }
            };

            if !known {
                if let Some(c) = self.get_mut(*child) {
                    c.parents.push(parent);
                }
            }
        }

        self.invalidate();
        Ok(())
    }

    /// Remove every child edge of a consolidated element
    pub fn remove_children(&mut self, parent: ElementId) -> OlapResult<()> {
        let children: Vec<ElementId> = self
            .require(parent)?
            .children
            .iter()
            .map(|(c, _)| *c)
            .collect();

        if let Some(p) = self.get_mut(parent) {
            p.children.clear();
        }
        for child in children {
            if let Some(c) = self.get_mut(child) {
                c.parents.retain(|p| *p != parent);
            }
        }

        self.invalidate();
        Ok(())
    }

    /// Remove the child edges not listed in `keep`
    pub fn remove_children_not_in(
        &mut self,
        parent: ElementId,
        keep: &HashSet<ElementId>,
    ) -> OlapResult<()> {
        let dropped: Vec<ElementId> = self
            .require(parent)?
            .children
            .iter()
            .map(|(c, _)| *c)
            .filter(|c| !keep.contains(c))
            .collect();

        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|(c, _)| keep.contains(c));
        }
        for child in dropped {
            if let Some(c) = self.get_mut(child) {
                c.parents.retain(|p| *p != parent);
            }
        }

        self.invalidate();
        Ok(())
    }

    /// Move an element to a new position, shifting the others
    pub fn move_element(&mut self, id: ElementId, new_position: u32) -> OlapResult<()> {
        self.require(id)?;
        if new_position as usize >= self.order.len() {
            return Err(OlapError::InvalidCoordinates(format!(
                "position {} out of range",
                new_position
            )));
        }

        self.order.retain(|e| *e != id);
        self.order.insert(new_position as usize, id);
        self.renumber_positions();
        Ok(())
    }

    /// Re-insert an element under its persisted id and position
    ///
    /// Used by the snapshot loader; edges are restored afterwards through
    /// `add_children` so the cycle check still runs. Position order is
    /// fixed up once every element is back.
    pub fn restore_element(
        &mut self,
        id: ElementId,
        name: &str,
        position: u32,
        kind: ElementKind,
    ) -> OlapResult<()> {
        self.check_name(name)?;
        while self.elements.len() <= id as usize {
            self.free.insert(self.elements.len() as ElementId);
            self.elements.push(None);
        }
        if self.elements[id as usize].is_some() {
            return Err(OlapError::CorruptFile(format!("duplicate element id {}", id)));
        }

        self.free.remove(&id);
        self.elements[id as usize] = Some(Element::new(id, name.to_string(), position, kind));
        self.by_name.insert(name.to_lowercase(), id);
        self.order.push(id);
        self.invalidate();
        Ok(())
    }

    /// Re-establish the dense position order after `restore_element` calls
    pub fn finish_restore(&mut self) {
        let mut order = std::mem::take(&mut self.order);
        order.sort_by_key(|id| {
            self.elements
                .get(*id as usize)
                .and_then(|e| e.as_ref())
                .map(|e| e.position)
                .unwrap_or(u32::MAX)
        });
        self.order = order;
        self.renumber_positions();
    }

    // hierarchy cache

    fn with_cache<R>(&self, f: impl FnOnce(&HierarchyCache) -> R) -> R {
        {
            let guard = self.cache.read();
            if let Some(cache) = guard.as_ref() {
                return f(cache);
            }
        }
        let cache = self.rebuild_cache();
        let result = f(&cache);
        *self.cache.write() = Some(cache);
        result
    }

    fn rebuild_cache(&self) -> HierarchyCache {
        let mut cache = HierarchyCache::default();

        // topological order over consolidated elements, children first
        let consolidated: Vec<ElementId> = self
            .elements()
            .filter(|e| e.kind == ElementKind::Consolidated)
            .map(|e| e.id)
            .collect();

        let mut pending: HashMap<ElementId, usize> = consolidated
            .iter()
            .map(|id| {
                let unresolved = self
                    .get(*id)
                    .map(|e| {
                        e.children
                            .iter()
                            .filter(|(c, _)| {
                                self.get(*c)
                                    .map(|ce| ce.kind == ElementKind::Consolidated)
                                    .unwrap_or(false)
                            })
                            .count()
                    })
                    .unwrap_or(0);
                (*id, unresolved)
            })
            .collect();

        let mut queue: VecDeque<ElementId> = consolidated
            .iter()
            .filter(|id| pending[*id] == 0)
            .copied()
            .collect();

        while let Some(id) = queue.pop_front() {
            cache.topological.push(id);
            if let Some(e) = self.get(id) {
                for parent in &e.parents {
                    if let Some(count) = pending.get_mut(parent) {
                        *count -= 1;
                        if *count == 0 {
                            queue.push_back(*parent);
                        }
                    }
                }
            }
        }

        // base sets and string consolidation, children resolved first
        for id in cache.topological.clone() {
            let mut base: BTreeMap<ElementId, f64> = BTreeMap::new();
            let mut string_valued = false;

            if let Some(e) = self.get(id) {
                for (child, weight) in &e.children {
                    match self.get(*child).map(|c| c.kind) {
                        Some(ElementKind::Numeric) => {
                            *base.entry(*child).or_insert(0.0) += weight;
                        }
                        Some(ElementKind::Text) => {
                            string_valued = true;
                        }
                        Some(ElementKind::Consolidated) => {
                            if cache.string_consolidated.contains(child) {
                                string_valued = true;
                            }
                            if let Some(child_base) = cache.base_sets.get(child) {
                                for (b, w) in child_base {
                                    *base.entry(*b).or_insert(0.0) += weight * w;
                                }
                            }
                        }
                        None => {}
                    }
                }
            }

            cache.base_sets.insert(id, base.into_iter().collect());
            if string_valued {
                cache.string_consolidated.insert(id);
            }
        }

        // levels bottom-up
        for e in self.elements() {
            if e.is_base() {
                cache.level.insert(e.id, 0);
            }
        }
        for id in cache.topological.clone() {
            let level = self
                .get(id)
                .map(|e| {
                    e.children
                        .iter()
                        .filter_map(|(c, _)| cache.level.get(c))
                        .max()
                        .copied()
                        .unwrap_or(0)
                        + 1
                })
                .unwrap_or(1);
            cache.level.insert(id, level);
        }

        // indents via first parent, depths via longest root path
        for e in self.elements() {
            let indent = self.indent_of(e.id, &mut HashSet::new());
            cache.indent.insert(e.id, indent);
            let depth = self.depth_of(e.id, &mut HashSet::new());
            cache.depth.insert(e.id, depth);
        }

        cache.max_level = cache.level.values().max().copied().unwrap_or(0);
        cache.max_indent = cache.indent.values().max().copied().unwrap_or(0);
        cache.max_depth = cache.depth.values().max().copied().unwrap_or(0);

        cache
    }

    fn indent_of(&self, id: ElementId, guard: &mut HashSet<ElementId>) -> u32 {
        if !guard.insert(id) {
            return 1;
        }
        match self.get(id).and_then(|e| e.parents.first().copied()) {
            Some(parent) => self.indent_of(parent, guard) + 1,
            None => 1,
        }
    }

    fn depth_of(&self, id: ElementId, guard: &mut HashSet<ElementId>) -> u32 {
        if !guard.insert(id) {
            return 0;
        }
        let parents = match self.get(id) {
            Some(e) if !e.parents.is_empty() => e.parents.clone(),
            _ => return 0,
        };
        parents
            .iter()
            .map(|p| self.depth_of(*p, &mut guard.clone()) + 1)
            .max()
            .unwrap_or(0)
    }

    /// Longest child chain below the element (base elements are level 0)
    pub fn level(&self, id: ElementId) -> u32 {
        self.with_cache(|c| c.level.get(&id).copied().unwrap_or(0))
    }

    /// Depth following the first parent chain (roots are indent 1)
    pub fn indent(&self, id: ElementId) -> u32 {
        self.with_cache(|c| c.indent.get(&id).copied().unwrap_or(1))
    }

    /// Longest path from any root (roots are depth 0)
    pub fn depth(&self, id: ElementId) -> u32 {
        self.with_cache(|c| c.depth.get(&id).copied().unwrap_or(0))
    }

    /// Largest level in the dimension
    pub fn max_level(&self) -> u32 {
        self.with_cache(|c| c.max_level)
    }

    /// Largest indent in the dimension
    pub fn max_indent(&self) -> u32 {
        self.with_cache(|c| c.max_indent)
    }

    /// Largest depth in the dimension
    pub fn max_depth(&self) -> u32 {
        self.with_cache(|c| c.max_depth)
    }

    /// Weighted numeric base expansion of an element
    ///
    /// Base elements expand to themselves with weight 1. Weights along
    /// multiple paths accumulate additively.
    pub fn base_set(&self, id: ElementId) -> Vec<(ElementId, f64)> {
        match self.get(id) {
            Some(e) if e.is_base() => {
                if e.kind == ElementKind::Numeric {
                    vec![(id, 1.0)]
                } else {
                    Vec::new()
                }
            }
            Some(_) => self.with_cache(|c| c.base_sets.get(&id).cloned().unwrap_or_default()),
            None => Vec::new(),
        }
    }

    /// True if the consolidation tree below the element reaches a
    /// string-typed element
    pub fn is_string_consolidated(&self, id: ElementId) -> bool {
        self.with_cache(|c| c.string_consolidated.contains(&id))
    }

    /// Consolidated elements ordered children-before-parents
    pub fn topological_order(&self) -> Vec<ElementId> {
        self.with_cache(|c| c.topological.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> ElementGraph {
        ElementGraph::new()
    }

    #[test]
    fn test_add_and_lookup() {
        let mut g = graph();
        let jan = g.add("Jan", ElementKind::Numeric).unwrap();
        let feb = g.add("Feb", ElementKind::Numeric).unwrap();

        assert_eq!(g.len(), 2);
        assert_eq!(g.get(jan).unwrap().position, 0);
        assert_eq!(g.get(feb).unwrap().position, 1);
        assert_eq!(g.find_by_name("JAN").unwrap().id, jan);
        assert!(g.add("jan", ElementKind::Numeric).is_err());
    }

    #[test]
    fn test_delete_shifts_positions() {
        let mut g = graph();
        let a = g.add("a", ElementKind::Numeric).unwrap();
        let b = g.add("b", ElementKind::Numeric).unwrap();
        let c = g.add("c", ElementKind::Numeric).unwrap();

        g.delete(b).unwrap();

        assert_eq!(g.get(a).unwrap().position, 0);
        assert_eq!(g.get(c).unwrap().position, 1);
        assert!(g.find_by_name("b").is_none());

        // freed id is reused
        let d = g.add("d", ElementKind::Numeric).unwrap();
        assert_eq!(d, b);
    }

    #[test]
    fn test_consolidation_edges_are_symmetric() {
        let mut g = graph();
        let x1 = g.add("x1", ElementKind::Numeric).unwrap();
        let x2 = g.add("x2", ElementKind::Numeric).unwrap();
        let xs = g.add("xs", ElementKind::Consolidated).unwrap();

        g.add_children(xs, &[(x1, 1.0), (x2, 2.0)]).unwrap();

        assert_eq!(g.get(xs).unwrap().children, vec![(x1, 1.0), (x2, 2.0)]);
        assert_eq!(g.get(x1).unwrap().parents, vec![xs]);
        assert_eq!(g.get(x2).unwrap().parents, vec![xs]);

        g.remove_children(xs).unwrap();
        assert!(g.get(xs).unwrap().children.is_empty());
        assert!(g.get(x1).unwrap().parents.is_empty());
    }

    #[test]
    fn test_cycle_rejected() {
        let mut g = graph();
        let a = g.add("a", ElementKind::Consolidated).unwrap();
        let b = g.add("b", ElementKind::Consolidated).unwrap();
        let leaf = g.add("leaf", ElementKind::Numeric).unwrap();

        g.add_children(a, &[(b, 1.0)]).unwrap();
        g.add_children(b, &[(leaf, 1.0)]).unwrap();

        assert!(matches!(
            g.add_children(b, &[(a, 1.0)]),
            Err(OlapError::CircularReference(_))
        ));
        assert!(matches!(
            g.add_children(a, &[(a, 1.0)]),
            Err(OlapError::CircularReference(_))
        ));
    }

    #[test]
    fn test_base_set_accumulates_weights() {
        let mut g = graph();
        let x1 = g.add("x1", ElementKind::Numeric).unwrap();
        let x2 = g.add("x2", ElementKind::Numeric).unwrap();
        let mid = g.add("mid", ElementKind::Consolidated).unwrap();
        let top = g.add("top", ElementKind::Consolidated).unwrap();

        g.add_children(mid, &[(x1, 2.0)]).unwrap();
        // x1 reachable directly (weight 1) and through mid (weight 3 * 2)
        g.add_children(top, &[(x1, 1.0), (x2, 1.0), (mid, 3.0)])
            .unwrap();

        let base: HashMap<ElementId, f64> = g.base_set(top).into_iter().collect();
        assert_eq!(base[&x1], 7.0);
        assert_eq!(base[&x2], 1.0);
    }

    #[test]
    fn test_string_consolidation_flag() {
        let mut g = graph();
        let s = g.add("s", ElementKind::Text).unwrap();
        let n = g.add("n", ElementKind::Numeric).unwrap();
        let c = g.add("c", ElementKind::Consolidated).unwrap();
        let top = g.add("top", ElementKind::Consolidated).unwrap();

        g.add_children(c, &[(s, 1.0)]).unwrap();
        g.add_children(top, &[(c, 1.0), (n, 1.0)]).unwrap();

        assert!(g.is_string_consolidated(c));
        assert!(g.is_string_consolidated(top));

        g.remove_children(c).unwrap();
        assert!(!g.is_string_consolidated(top));
    }

    #[test]
    fn test_levels_and_depths() {
        let mut g = graph();
        let leaf = g.add("leaf", ElementKind::Numeric).unwrap();
        let mid = g.add("mid", ElementKind::Consolidated).unwrap();
        let top = g.add("top", ElementKind::Consolidated).unwrap();

        g.add_children(mid, &[(leaf, 1.0)]).unwrap();
        g.add_children(top, &[(mid, 1.0)]).unwrap();

        assert_eq!(g.level(leaf), 0);
        assert_eq!(g.level(mid), 1);
        assert_eq!(g.level(top), 2);
        assert_eq!(g.max_level(), 2);

        assert_eq!(g.depth(top), 0);
        assert_eq!(g.depth(mid), 1);
        assert_eq!(g.depth(leaf), 2);

        assert_eq!(g.indent(top), 1);
        assert_eq!(g.indent(leaf), 3);
    }

    #[test]
    fn test_move_element() {
        let mut g = graph();
        let a = g.add("a", ElementKind::Numeric).unwrap();
        let b = g.add("b", ElementKind::Numeric).unwrap();
        let c = g.add("c", ElementKind::Numeric).unwrap();

        g.move_element(c, 0).unwrap();
        assert_eq!(g.element_ids(), vec![c, a, b]);
        assert_eq!(g.get(c).unwrap().position, 0);
        assert_eq!(g.get(b).unwrap().position, 2);

        assert!(g.move_element(a, 5).is_err());
    }

    #[test]
    fn test_change_kind_drops_children() {
        let mut g = graph();
        let leaf = g.add("leaf", ElementKind::Numeric).unwrap();
        let top = g.add("top", ElementKind::Consolidated).unwrap();
        g.add_children(top, &[(leaf, 1.0)]).unwrap();

        g.change_kind(top, ElementKind::Numeric).unwrap();

        assert!(g.get(top).unwrap().children.is_empty());
        assert!(g.get(leaf).unwrap().parents.is_empty());
        assert_eq!(g.level(top), 0);
    }

    #[test]
    fn test_topological_order_children_first() {
        let mut g = graph();
        let leaf = g.add("leaf", ElementKind::Numeric).unwrap();
        let mid = g.add("mid", ElementKind::Consolidated).unwrap();
        let top = g.add("top", ElementKind::Consolidated).unwrap();
        g.add_children(mid, &[(leaf, 1.0)]).unwrap();
        g.add_children(top, &[(mid, 1.0)]).unwrap();

        let topo = g.topological_order();
        let mid_at = topo.iter().position(|e| *e == mid).unwrap();
        let top_at = topo.iter().position(|e| *e == top).unwrap();
        assert!(mid_at < top_at);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // name, id and position indexes stay bijective over live elements
        #[test]
        fn prop_indexes_stay_bijective(ops in prop::collection::vec(0u8..4, 1..60)) {
            let mut g = ElementGraph::new();
            let mut counter = 0usize;

            for op in ops {
                match op {
                    0 | 1 => {
                        let _ = g.add(&format!("e{}", counter), ElementKind::Numeric);
                        counter += 1;
                    }
                    2 => {
                        if let Some(id) = g.element_ids().first().copied() {
                            let _ = g.delete(id);
                        }
                    }
                    _ => {
                        if let Some(id) = g.element_ids().last().copied() {
                            let pos = (id as usize) % g.len().max(1);
                            let _ = g.move_element(id, pos as u32);
                        }
                    }
                }

                let ids = g.element_ids();
                // positions dense and unique
                let mut positions: Vec<u32> =
                    ids.iter().map(|id| g.get(*id).unwrap().position).collect();
                positions.sort_unstable();
                prop_assert_eq!(&positions, &(0..ids.len() as u32).collect::<Vec<_>>());
                // names unique
                let names: std::collections::HashSet<String> = ids
                    .iter()
                    .map(|id| g.get(*id).unwrap().name.to_lowercase())
                    .collect();
                prop_assert_eq!(names.len(), ids.len());
            }
        }
    }
}
