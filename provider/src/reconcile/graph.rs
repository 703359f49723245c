use std::collections::{BTreeMap, BTreeSet};

use crate::address::Address;

/// Kahn's algorithm over `deps` (node -> nodes it depends on). Dependencies
/// outside the key set are ignored. Ties break in address order, so the
/// result is deterministic. On a cycle, returns the nodes left unordered.
pub(crate) fn topological_order(
    deps: &BTreeMap<Address, BTreeSet<Address>>,
) -> Result<Vec<Address>, Vec<Address>> {
    let mut pending: BTreeMap<&Address, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&Address, Vec<&Address>> = BTreeMap::new();
    for (node, targets) in deps {
        let targets: Vec<&Address> = targets.iter().filter(|t| deps.contains_key(*t)).collect();
        pending.insert(node, targets.len());
        for target in targets {
            dependents.entry(target).or_default().push(node);
        }
    }

    let mut ready: BTreeSet<&Address> = pending
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut order = Vec::with_capacity(deps.len());
    while let Some(node) = ready.pop_first() {
        order.push(node.clone());
        for dependent in dependents.get(node).into_iter().flatten() {
            if let Some(n) = pending.get_mut(dependent) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() == deps.len() {
        Ok(order)
    } else {
        let ordered: BTreeSet<&Address> = order.iter().collect();
        Err(deps
            .keys()
            .filter(|node| !ordered.contains(node))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(name: &str) -> Address {
        Address::managed("pomeriumzero_route", name)
    }

    fn graph(edges: Vec<(&str, Vec<&str>)>) -> BTreeMap<Address, BTreeSet<Address>> {
        edges
            .into_iter()
            .map(|(node, targets)| (addr(node), targets.into_iter().map(addr).collect()))
            .collect()
    }

    #[test]
    fn dependencies_come_first_and_ties_sort_by_address() {
        let order = topological_order(&graph(vec![
            ("c", vec!["a"]),
            ("b", vec![]),
            ("a", vec![]),
            ("d", vec!["c", "b"]),
        ]))
        .unwrap();
        let names: Vec<_> = order.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn cycles_are_reported() {
        let err = topological_order(&graph(vec![("a", vec!["b"]), ("b", vec!["a"]), ("c", vec![])]))
            .unwrap_err();
        assert_eq!(err, vec![addr("a"), addr("b")]);
    }

    #[test]
    fn external_dependencies_are_ignored() {
        let order = topological_order(&graph(vec![("a", vec!["gone"])])).unwrap();
        assert_eq!(order, vec![addr("a")]);
    }
}
