//! Transaction Resolver (§4.6).
//!
//! Transactions are processed in order, each folding over the sack plus the
//! previous transaction's resolved set (Design Note "Transaction chaining...
//! represent as a fold"): every package a prior transaction resolved is
//! carried into the next transaction already-installed, so later
//! transactions never solve for a second provider of a capability it already
//! satisfies. That carry-over is re-emitted alongside whatever the
//! transaction newly resolves, so each transaction's forward-action set is
//! the cumulative image through that point, not just its own delta — the
//! response's `packages` is the last transaction's forward-action set, which
//! is therefore the full cumulative image (§8 S2: two transactions chained
//! by a provided capability return both packages).
//!
//! Within one transaction, `package-specs` seed a `petgraph::DiGraph` where
//! an edge `a -> b` means "a requires b"; the graph is walked breadth-first,
//! resolving each `requires` capability against the sack's `provides` index.
//! The final list is read off in the order packages were first discovered,
//! not sorted (§4.6 "do not sort").

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::err::{Res, SolveError};
use crate::query::{classify, Matcher};
use crate::request::TransactionSpec;
use crate::sack::{Package, Sack};

fn key(pkg: &Package) -> String {
    format!(
        "{}:{}-{}-{}.{}",
        pkg.evr.epoch, pkg.name, pkg.evr.version, pkg.evr.release, pkg.arch
    )
}

fn satisfies(pkg: &Package, capability: &str) -> bool {
    pkg.name == capability || pkg.provides.iter().any(|c| c.name == capability)
}

/// Run every transaction in order; return the final transaction's
/// forward-action set (§4.6), which carries forward every prior
/// transaction's installs alongside whatever this run newly resolves.
pub fn run<'a>(sack: &'a Sack, transactions: &[TransactionSpec]) -> Res<Vec<&'a Package>> {
    let mut installed: IndexMap<String, &'a Package> = IndexMap::new();
    let mut forward: Vec<&'a Package> = Vec::new();

    let all_specs: Vec<&str> = transactions
        .iter()
        .flat_map(|t| t.package_specs.iter().map(String::as_str))
        .collect();

    for txn in transactions {
        forward = resolve_transaction(sack, txn, &installed, &all_specs)?;
        installed = IndexMap::new();
        for pkg in &forward {
            installed.insert(key(pkg), pkg);
        }
    }

    Ok(forward)
}

fn resolve_transaction<'a>(
    sack: &'a Sack,
    txn: &TransactionSpec,
    installed_before: &IndexMap<String, &'a Package>,
    all_specs: &[&str],
) -> Res<Vec<&'a Package>> {
    let repo_filter: Option<HashSet<&str>> = if txn.repo_ids.is_empty() {
        None
    } else {
        Some(txn.repo_ids.iter().map(String::as_str).collect())
    };
    let allowed_repo = |p: &Package| repo_filter.as_ref().map_or(true, |f| f.contains(p.repo_id.as_str()));

    let exclude_matchers: Vec<Matcher> = txn.exclude_specs.iter().map(|s| classify(s)).collect();
    let excluded = |p: &Package| exclude_matchers.iter().any(|m| m.matches(&p.name));

    // install_weak_deps is accepted for wire compatibility; the primary.xml
    // capability model carries no separate weak-deps list to gate on.
    let _ = txn.install_weak_deps;

    let mut graph: DiGraph<&'a Package, ()> = DiGraph::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
    let mut installed: IndexMap<String, &'a Package> = installed_before.clone();
    let mut queue: VecDeque<&'a Package> = VecDeque::new();

    for spec in &txn.package_specs {
        let matcher = classify(spec);
        let candidates: Vec<&Package> = sack
            .all()
            .iter()
            .filter(|p| matcher.matches(&p.name) || matcher.matches(&p.nevra()))
            .filter(|p| allowed_repo(p))
            .filter(|p| !excluded(p))
            .collect();
        if candidates.is_empty() {
            return Err(SolveError::marking(format!(
                "no package matches '{}'",
                spec
            )));
        }
        let mut by_name: HashMap<&str, &Package> = HashMap::new();
        for c in candidates {
            by_name
                .entry(c.name.as_str())
                .and_modify(|cur: &mut &Package| {
                    if c.evr > cur.evr {
                        *cur = c;
                    }
                })
                .or_insert(c);
        }
        for pkg in by_name.into_values() {
            queue.push_back(pkg);
        }
    }

    // Every already-installed package is part of this transaction's
    // forward-action set too -- it's carried forward into the cumulative
    // image even though this transaction didn't newly resolve it (§8 S2).
    let mut forward_order: Vec<&'a Package> = installed_before.values().copied().collect();
    let mut seen: HashSet<String> = installed_before.keys().cloned().collect();

    while let Some(pkg) = queue.pop_front() {
        let k = key(pkg);
        if seen.contains(&k) {
            continue;
        }
        seen.insert(k.clone());

        let node = *nodes
            .entry(k.clone())
            .or_insert_with(|| graph.add_node(pkg));

        installed.insert(k, pkg);
        forward_order.push(pkg);

        for req in &pkg.requires {
            if installed.values().any(|p| satisfies(p, &req.name)) {
                continue;
            }
            let providers: Vec<&Package> = sack
                .providers_of(&req.name)
                .into_iter()
                .filter(|p| allowed_repo(p))
                .filter(|p| !excluded(p))
                .collect();
            if providers.is_empty() {
                return Err(SolveError::depsolve(format!(
                    "nothing provides '{}' needed by {} (package-specs: {})",
                    req.name,
                    pkg.nevra(),
                    all_specs.join(", ")
                )));
            }
            let best = providers
                .into_iter()
                .max_by(|a, b| a.evr.cmp(&b.evr))
                .expect("providers checked non-empty above");

            let best_key = key(best);
            let best_node = *nodes
                .entry(best_key.clone())
                .or_insert_with(|| graph.add_node(best));
            graph.update_edge(node, best_node, ());

            if !installed.contains_key(&best_key) {
                queue.push_back(best);
            }
        }
    }

    Ok(forward_order)
}
