//! Pass 2a: expand list-of-list references in declaration order.

use crate::exceptions::quote_item;
use crate::types::catalog::{Catalog, CompiledList};

/// Expand every list into the compiled-lists table.
///
/// Items naming a list that has already been expanded are spliced in and the
/// referenced list is marked used; anything else is treated as a literal and
/// quoted. Declaration order means a forward reference is a literal — lists
/// are expected to be declared in dependency order.
pub fn expand_lists(catalog: &mut Catalog) {
    let Catalog {
        lists,
        compiled_lists,
        ordered_list_names,
        ..
    } = catalog;

    for name in ordered_list_names.iter() {
        let Some(def) = lists.get(name) else {
            continue;
        };
        let mut items = Vec::new();
        for item in &def.items {
            if let Some(prev) = compiled_lists.get_mut(item) {
                prev.used = true;
                items.extend_from_slice(&prev.items);
            } else {
                items.push(quote_item(item));
            }
        }
        compiled_lists.insert(
            name.clone(),
            CompiledList {
                items,
                used: false,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::defs::ListDef;

    fn list(name: &str, items: &[&str]) -> ListDef {
        ListDef {
            name: name.to_owned(),
            items: items.iter().map(|s| (*s).to_owned()).collect(),
            context: String::new(),
        }
    }

    fn catalog_with(lists: Vec<ListDef>) -> Catalog {
        let mut cat = Catalog::new();
        for l in lists {
            cat.store_list(l);
        }
        cat
    }

    #[test]
    fn splices_already_expanded_lists() {
        let mut cat = catalog_with(vec![
            list("shells", &["bash", "zsh"]),
            list("binaries", &["shells", "cat"]),
        ]);
        expand_lists(&mut cat);

        let binaries = &cat.compiled_lists["binaries"];
        assert_eq!(binaries.items, vec!["bash", "zsh", "cat"]);
        assert!(cat.compiled_lists["shells"].used);
        assert!(!binaries.used);
    }

    #[test]
    fn forward_reference_is_a_literal() {
        let mut cat = catalog_with(vec![
            list("binaries", &["shells", "cat"]),
            list("shells", &["bash"]),
        ]);
        expand_lists(&mut cat);

        assert_eq!(cat.compiled_lists["binaries"].items, vec!["shells", "cat"]);
        assert!(!cat.compiled_lists["shells"].used);
    }

    #[test]
    fn literals_are_quoted_when_spaced() {
        let mut cat = catalog_with(vec![list("progs", &["my proc", "cat"])]);
        expand_lists(&mut cat);

        assert_eq!(
            cat.compiled_lists["progs"].items,
            vec!["\"my proc\"", "cat"]
        );
    }

    #[test]
    fn self_reference_is_a_literal() {
        let mut cat = catalog_with(vec![list("l", &["l", "x"])]);
        expand_lists(&mut cat);
        assert_eq!(cat.compiled_lists["l"].items, vec!["l", "x"]);
    }
}
