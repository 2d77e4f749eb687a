//! Package tree

use super::class::ClassId;
use std::collections::BTreeMap;

pub const ROOT_PACKAGE_NAME: &str = "<root>";

/// A node of the package hierarchy. Classes are referenced by handle;
/// their data lives in the `ClassStore` arena.
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub name: String,
    children: BTreeMap<String, Package>,
    classes: BTreeMap<String, ClassId>,
}

impl Package {
    pub fn root() -> Self {
        Self {
            name: ROOT_PACKAGE_NAME.to_string(),
            ..Default::default()
        }
    }

    /// Walk (and create) the package for a dotted path. An empty path is
    /// the root itself.
    pub fn get_or_create_package(&mut self, path: &str) -> &mut Package {
        let mut node = self;
        for part in path.split('.').filter(|p| !p.is_empty()) {
            node = node.children.entry(part.to_string()).or_insert_with(|| Package {
                name: part.to_string(),
                ..Default::default()
            });
        }
        node
    }

    pub fn package(&self, path: &str) -> Option<&Package> {
        let mut node = self;
        for part in path.split('.').filter(|p| !p.is_empty()) {
            node = node.children.get(part)?;
        }
        Some(node)
    }

    pub fn insert_class(&mut self, name: &str, id: ClassId) {
        self.classes.insert(name.to_string(), id);
    }

    pub fn class(&self, name: &str) -> Option<ClassId> {
        self.classes.get(name).copied()
    }

    /// Every class in this package and below, depth first.
    pub fn all_classes(&self) -> Vec<ClassId> {
        let mut out: Vec<ClassId> = self.classes.values().copied().collect();
        for child in self.children.values() {
            out.extend(child.all_classes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_package_creation() {
        let mut root = Package::root();
        root.get_or_create_package("org.comroid.kscr")
            .insert_class("Main", ClassId(4));
        let pkg = root.package("org.comroid.kscr").map(|p| p.name.clone());
        assert_eq!(pkg.as_deref(), Some("kscr"));
        assert_eq!(root.package("org.comroid.kscr").and_then(|p| p.class("Main")), Some(ClassId(4)));
    }

    #[test]
    fn test_empty_path_is_root() {
        let mut root = Package::root();
        root.get_or_create_package("").insert_class("Main", ClassId(1));
        assert_eq!(root.class("Main"), Some(ClassId(1)));
    }

    #[test]
    fn test_all_classes_walks_children() {
        let mut root = Package::root();
        root.get_or_create_package("a").insert_class("X", ClassId(1));
        root.get_or_create_package("a.b").insert_class("Y", ClassId(2));
        root.insert_class("Z", ClassId(3));
        let mut all = root.all_classes();
        all.sort();
        assert_eq!(all, vec![ClassId(1), ClassId(2), ClassId(3)]);
    }
}
