//! Translator resolution: shortest-cost format-conversion chains (spec §3
//! "Translator", §4.4 "Translator resolution").
//!
//! Each registered factory advertises a set of `(src, dst, cost)` edges.
//! On attach, if the consumer's declared format differs from the source's,
//! the registry builds a directed graph over format names and finds the
//! minimum-cost path with a textbook Dijkstra (the format catalog is small
//! enough — a handful of codecs — that anything fancier would be
//! over-engineering).

use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use crate::data_endpoint::{DataConsumer, DataFlags};
use crate::error::SwitchError;

/// One conversion a factory can perform.
#[derive(Clone, Copy, Debug)]
pub struct Edge {
    pub from: &'static str,
    pub to: &'static str,
    pub cost: u32,
}

/// Produces a [`DataConsumer`] that accepts `from`-format blocks, converts
/// them to `to`-format, and forwards the result to `downstream`. A
/// translator *is* a consumer-plus-source pair (spec §3): the source half
/// is implicit here — it is simply whatever `downstream.consume` does with
/// the converted bytes.
pub trait TranslatorFactory: Send + Sync {
    fn edges(&self) -> Vec<Edge>;

    fn make(&self, from: &'static str, to: &'static str, downstream: Arc<dyn DataConsumer>) -> Arc<dyn DataConsumer>;
}

struct ChainLink {
    convert: Box<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
    downstream: Arc<dyn DataConsumer>,
    to_format: &'static str,
}

impl DataConsumer for ChainLink {
    fn format(&self) -> Option<&str> {
        None
    }

    fn consume(&self, block: &[u8], ts: u32, flags: DataFlags) -> usize {
        let converted = (self.convert)(block);
        let n = converted.len();
        self.downstream.consume(&converted, ts, flags);
        let _ = self.to_format;
        n
    }
}

/// Registry of translator factories, consulted whenever a consumer's
/// declared format differs from its source's.
#[derive(Default)]
pub struct TranslatorRegistry {
    factories: Vec<Arc<dyn TranslatorFactory>>,
}

impl TranslatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn TranslatorFactory>) {
        self.factories.push(factory);
    }

    /// Finds the minimum-cost `from -> to` path and wraps `downstream` in
    /// the resulting chain of converters. Returns `FormatMismatch` if no
    /// path exists. `from`/`to` only need to live for the call — the format
    /// catalog itself (the edges) stays `'static`.
    pub fn resolve(
        &self,
        from: &str,
        to: &str,
        downstream: Arc<dyn DataConsumer>,
    ) -> Result<Arc<dyn DataConsumer>, SwitchError> {
        if from == to {
            return Ok(downstream);
        }

        let mut edges_by_factory: Vec<(usize, Edge)> = Vec::new();
        for (idx, factory) in self.factories.iter().enumerate() {
            for edge in factory.edges() {
                edges_by_factory.push((idx, edge));
            }
        }

        let path = shortest_path(&edges_by_factory, from, to).ok_or_else(|| SwitchError::FormatMismatch {
            from: from.to_owned(),
            to: to.to_owned(),
        })?;

        // Build the chain from the destination end backward so each link
        // closes over the already-built downstream consumer.
        let mut current = downstream;
        for (factory_idx, edge) in path.into_iter().rev() {
            current = self.factories[factory_idx].make(edge.from, edge.to, current);
        }
        Ok(current)
    }
}

/// Dijkstra over the format graph. Nodes are tracked as owned `String`s so
/// the search endpoints (`from`/`to`) don't need to outlive the call, even
/// though every edge in `edges` is keyed by `&'static str` literals from the
/// factory catalog.
fn shortest_path(edges: &[(usize, Edge)], from: &str, to: &str) -> Option<Vec<(usize, Edge)>> {
    #[derive(PartialEq, Eq)]
    struct QueueItem {
        cost: u32,
        node: String,
    }
    impl Ord for QueueItem {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            other.cost.cmp(&self.cost) // min-heap
        }
    }
    impl PartialOrd for QueueItem {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    let mut best: HashMap<String, u32> = HashMap::new();
    let mut prev: HashMap<String, (usize, Edge)> = HashMap::new();
    let mut heap = BinaryHeap::new();
    best.insert(from.to_owned(), 0);
    heap.push(QueueItem { cost: 0, node: from.to_owned() });

    while let Some(QueueItem { cost, node }) = heap.pop() {
        if node == to {
            break;
        }
        if cost > *best.get(&node).unwrap_or(&u32::MAX) {
            continue;
        }
        for &(idx, edge) in edges.iter().filter(|(_, e)| e.from == node.as_str()) {
            let next_cost = cost + edge.cost;
            if next_cost < *best.get(edge.to).unwrap_or(&u32::MAX) {
                best.insert(edge.to.to_owned(), next_cost);
                prev.insert(edge.to.to_owned(), (idx, edge));
                heap.push(QueueItem { cost: next_cost, node: edge.to.to_owned() });
            }
        }
    }

    if !best.contains_key(to) {
        return None;
    }
    let mut path = Vec::new();
    let mut node = to.to_owned();
    while node != from {
        let (idx, edge) = *prev.get(&node)?;
        path.push((idx, edge));
        node = edge.from.to_owned();
    }
    path.reverse();
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Sink(Arc<Mutex<Vec<u8>>>);
    impl DataConsumer for Sink {
        fn format(&self) -> Option<&str> {
            Some("alaw")
        }
        fn consume(&self, block: &[u8], _ts: u32, _flags: DataFlags) -> usize {
            self.0.lock().unwrap().extend_from_slice(block);
            block.len()
        }
    }

    struct SlinToAlaw;
    impl TranslatorFactory for SlinToAlaw {
        fn edges(&self) -> Vec<Edge> {
            vec![Edge { from: "slin", to: "alaw", cost: 5 }]
        }
        fn make(&self, _from: &'static str, _to: &'static str, downstream: Arc<dyn DataConsumer>) -> Arc<dyn DataConsumer> {
            Arc::new(ChainLink {
                convert: Box::new(|block| block.iter().map(|b| b.wrapping_add(1)).collect()),
                downstream,
                to_format: "alaw",
            })
        }
    }

    #[test]
    fn resolves_direct_edge_and_converts_bytes() {
        // Scenario 6 (spec §8).
        let mut registry = TranslatorRegistry::new();
        registry.register(Arc::new(SlinToAlaw));
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::new(Sink(received.clone()));
        let chain = registry.resolve("slin", "alaw", sink).unwrap();
        chain.consume(&[1, 2, 3], 0, DataFlags::empty());
        assert_eq!(*received.lock().unwrap(), vec![2, 3, 4]);
    }

    #[test]
    fn no_path_is_format_mismatch() {
        let registry = TranslatorRegistry::new();
        let sink = Arc::new(Sink(Arc::new(Mutex::new(Vec::new()))));
        let err = registry.resolve("slin", "g729", sink).unwrap_err();
        assert!(matches!(err, SwitchError::FormatMismatch { .. }));
    }

    #[test]
    fn same_format_short_circuits_with_no_conversion() {
        let registry = TranslatorRegistry::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::new(Sink(received.clone()));
        let chain = registry.resolve("alaw", "alaw", sink).unwrap();
        chain.consume(&[9], 0, DataFlags::empty());
        assert_eq!(*received.lock().unwrap(), vec![9]);
    }
}
