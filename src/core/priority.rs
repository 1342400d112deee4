//! Priority-ordered registration tables
//!
//! Query extensions and pipeline stages are registered as
//! `(name, priority, tag)` entries. The table is resolved once at startup
//! into a fixed execution order:
//!
//! 1. higher priority first (a higher-priority stage wraps a lower one);
//! 2. equal priorities follow the tag's documented declaration list;
//! 3. names missing from that list come after it, sorted by name.
//!
//! Insertion order never takes part in the ordering, so two configuration
//! sources registering the same stages in a different order always produce
//! the same pipeline.

use crate::core::error::{ConfigError, PlatformResult};
use std::fmt;

/// Capability a registration belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageTag {
    Provider,
    Processor,
    CollectionExtension,
    ItemExtension,
}

impl StageTag {
    /// Documented tie-break order for the built-in entries of this tag
    pub fn declaration_order(&self) -> &'static [&'static str] {
        match self {
            StageTag::Provider => &[
                "negotiate",
                "bind_parameters",
                "access_pre_read",
                "read",
                "deserialize",
                "access_post_denormalize",
                "validate",
                "access_post_validate",
            ],
            StageTag::Processor => &["respond", "add_headers", "serialize", "write"],
            StageTag::CollectionExtension => &[
                "eager_loading",
                "filter",
                "filter_eager_loading",
                "order",
                "pagination",
            ],
            StageTag::ItemExtension => &["eager_loading"],
        }
    }
}

impl fmt::Display for StageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageTag::Provider => "provider",
            StageTag::Processor => "processor",
            StageTag::CollectionExtension => "collection extension",
            StageTag::ItemExtension => "item extension",
        };
        f.write_str(s)
    }
}

/// One registered entry
#[derive(Debug, Clone)]
pub struct Registration<T> {
    pub name: String,
    pub priority: i32,
    pub tag: StageTag,
    pub item: T,
}

/// Mutable registration table for one tag
#[derive(Debug, Clone)]
pub struct PriorityTable<T> {
    tag: StageTag,
    entries: Vec<Registration<T>>,
}

impl<T> PriorityTable<T> {
    pub fn new(tag: StageTag) -> Self {
        Self {
            tag,
            entries: Vec::new(),
        }
    }

    pub fn tag(&self) -> StageTag {
        self.tag
    }

    /// Register an entry; names are unique within the table
    pub fn register(&mut self, name: impl Into<String>, priority: i32, item: T) -> PlatformResult<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(ConfigError::DuplicateStage {
                name,
                tag: self.tag.to_string(),
            }
            .into());
        }
        self.entries.push(Registration {
            name,
            priority,
            tag: self.tag,
            item,
        });
        Ok(())
    }

    /// Remove an entry, returning whether it existed
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.name != name);
        before != self.entries.len()
    }

    /// Change the priority of an entry, returning whether it existed
    pub fn set_priority(&mut self, name: &str, priority: i32) -> bool {
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => {
                entry.priority = priority;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the table into its execution order
    pub fn into_sorted(self) -> Vec<Registration<T>> {
        let declared = self.tag.declaration_order();
        let rank = |name: &str| {
            declared
                .iter()
                .position(|candidate| *candidate == name)
                .unwrap_or(declared.len())
        };

        let mut entries = self.entries;
        entries.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| rank(&a.name).cmp(&rank(&b.name)))
                .then_with(|| a.name.cmp(&b.name))
        });
        entries
    }

    /// Execution order as names
    pub fn sorted_names(&self) -> Vec<String> {
        let table = PriorityTable {
            tag: self.tag,
            entries: self
                .entries
                .iter()
                .map(|entry| Registration {
                    name: entry.name.clone(),
                    priority: entry.priority,
                    tag: entry.tag,
                    item: (),
                })
                .collect(),
        };
        table.into_sorted().into_iter().map(|entry| entry.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names<T>(entries: Vec<Registration<T>>) -> Vec<String> {
        entries.into_iter().map(|entry| entry.name).collect()
    }

    #[test]
    fn test_higher_priority_runs_first() {
        let mut table = PriorityTable::new(StageTag::Provider);
        table.register("read", 4, ()).unwrap();
        table.register("deserialize", 2, ()).unwrap();
        table.register("access_pre_read", 10, ()).unwrap();

        assert_eq!(
            names(table.into_sorted()),
            vec!["access_pre_read", "read", "deserialize"]
        );
    }

    #[test]
    fn test_registration_order_does_not_matter() {
        let mut forward = PriorityTable::new(StageTag::Provider);
        forward.register("read", 4, ()).unwrap();
        forward.register("deserialize", 2, ()).unwrap();
        forward.register("access_pre_read", 10, ()).unwrap();

        let mut reversed = PriorityTable::new(StageTag::Provider);
        reversed.register("access_pre_read", 10, ()).unwrap();
        reversed.register("deserialize", 2, ()).unwrap();
        reversed.register("read", 4, ()).unwrap();

        assert_eq!(forward.sorted_names(), reversed.sorted_names());
    }

    #[test]
    fn test_ties_follow_declaration_list_then_name() {
        let mut table = PriorityTable::new(StageTag::Processor);
        table.register("zz_custom", 0, ()).unwrap();
        table.register("write", 0, ()).unwrap();
        table.register("aa_custom", 0, ()).unwrap();
        table.register("respond", 0, ()).unwrap();

        assert_eq!(
            table.sorted_names(),
            vec!["respond", "write", "aa_custom", "zz_custom"]
        );
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut table = PriorityTable::new(StageTag::CollectionExtension);
        table.register("order", -32, ()).unwrap();
        assert!(table.register("order", 5, ()).is_err());
    }

    #[test]
    fn test_remove_and_reprioritize() {
        let mut table = PriorityTable::new(StageTag::CollectionExtension);
        table.register("filter", 32, ()).unwrap();
        table.register("order", -32, ()).unwrap();

        assert!(table.set_priority("order", 64));
        assert!(!table.set_priority("missing", 1));
        assert_eq!(table.sorted_names(), vec!["order", "filter"]);

        assert!(table.remove("filter"));
        assert!(!table.remove("filter"));
        assert_eq!(table.len(), 1);
    }
}
