//! Transaction wait-for graph.
//!
//! An edge `holder -> waiter` means `waiter` is blocked behind a lock `holder`
//! owns. Edges are counted (the same pair can be blocked on several pages) and
//! every edge remembers the page that caused it, so that releasing one page
//! retracts exactly the edges that page introduced.
//!
//! The graph is kept acyclic: [`WaitForGraph::add_waits`] commits its edges
//! only if the result still has a topological order.

use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub struct WaitForGraph {
    /// holder -> waiter -> edge multiplicity
    edges: HashMap<TransactionId, HashMap<TransactionId, usize>>,
    /// number of incoming edges per node, counting multiplicity
    in_degree: HashMap<TransactionId, usize>,
    /// (holder, page) -> waiters whose edge from `holder` came from `page`
    provenance: HashMap<(TransactionId, PageId), Vec<TransactionId>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `waiter` is blocked on `page` behind `holders`.
    ///
    /// Holders whose edge for this page is already recorded are skipped.
    /// Returns `false`, leaving the graph untouched, if the new edges would
    /// close a cycle.
    pub fn add_waits(
        &mut self,
        waiter: TransactionId,
        page: PageId,
        holders: &[TransactionId],
    ) -> bool {
        self.in_degree.entry(waiter).or_insert(0);

        let mut added = Vec::new();
        for &holder in holders {
            if holder == waiter {
                continue;
            }
            let known = self
                .provenance
                .get(&(holder, page))
                .is_some_and(|waiters| waiters.contains(&waiter));
            if known || added.contains(&holder) {
                continue;
            }
            self.in_degree.entry(holder).or_insert(0);
            self.insert_edge(holder, waiter);
            added.push(holder);
        }

        if added.is_empty() {
            return true;
        }

        if self.is_acyclic() {
            for holder in added {
                self.provenance.entry((holder, page)).or_default().push(waiter);
            }
            true
        } else {
            for holder in added {
                self.remove_edge(holder, waiter);
            }
            false
        }
    }

    /// Retracts every edge `holder` introduced through `page`.
    pub fn release(&mut self, holder: TransactionId, page: PageId) {
        if let Some(waiters) = self.provenance.remove(&(holder, page)) {
            for waiter in waiters {
                self.remove_edge(holder, waiter);
            }
        }
    }

    /// Retracts the edges `waiter` accumulated while waiting for `page`.
    pub fn resolve_wait(&mut self, waiter: TransactionId, page: PageId) {
        let mut stale = Vec::new();
        for ((holder, p), waiters) in self.provenance.iter_mut() {
            if *p != page {
                continue;
            }
            if let Some(pos) = waiters.iter().position(|w| *w == waiter) {
                waiters.swap_remove(pos);
                stale.push(*holder);
            }
        }
        self.provenance.retain(|_, waiters| !waiters.is_empty());
        for holder in stale {
            self.remove_edge(holder, waiter);
        }
    }

    /// Drops a finished transaction and every edge touching it.
    pub fn remove_transaction(&mut self, tid: TransactionId) {
        if let Some(out) = self.edges.remove(&tid) {
            for (waiter, count) in out {
                if let Some(d) = self.in_degree.get_mut(&waiter) {
                    *d = d.saturating_sub(count);
                }
            }
        }
        for out in self.edges.values_mut() {
            out.remove(&tid);
        }
        self.edges.retain(|_, out| !out.is_empty());
        self.in_degree.remove(&tid);

        self.provenance.retain(|(holder, _), waiters| {
            if *holder == tid {
                return false;
            }
            waiters.retain(|w| *w != tid);
            !waiters.is_empty()
        });
    }

    /// Kahn's algorithm over a snapshot of the in-degree table.
    pub fn is_acyclic(&self) -> bool {
        let mut in_degree = self.in_degree.clone();
        let mut ready: VecDeque<TransactionId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(t, _)| *t)
            .collect();

        let mut visited = 0;
        while let Some(node) = ready.pop_front() {
            visited += 1;
            if let Some(out) = self.edges.get(&node) {
                for (waiter, count) in out {
                    if let Some(d) = in_degree.get_mut(waiter) {
                        *d -= count;
                        if *d == 0 {
                            ready.push_back(*waiter);
                        }
                    }
                }
            }
        }

        visited == in_degree.len()
    }

    pub fn has_edge(&self, holder: TransactionId, waiter: TransactionId) -> bool {
        self.edges
            .get(&holder)
            .is_some_and(|out| out.contains_key(&waiter))
    }

    pub fn in_degree(&self, tid: TransactionId) -> Option<usize> {
        self.in_degree.get(&tid).copied()
    }

    pub fn contains(&self, tid: TransactionId) -> bool {
        self.in_degree.contains_key(&tid)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().flat_map(|out| out.values()).sum()
    }

    fn insert_edge(&mut self, holder: TransactionId, waiter: TransactionId) {
        *self.edges.entry(holder).or_default().entry(waiter).or_insert(0) += 1;
        *self.in_degree.entry(waiter).or_insert(0) += 1;
    }

    fn remove_edge(&mut self, holder: TransactionId, waiter: TransactionId) {
        let Some(out) = self.edges.get_mut(&holder) else {
            return;
        };
        let Some(count) = out.get_mut(&waiter) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            out.remove(&waiter);
        }
        if out.is_empty() {
            self.edges.remove(&holder);
        }
        if let Some(d) = self.in_degree.get_mut(&waiter) {
            *d = d.saturating_sub(1);
        }
    }
}
