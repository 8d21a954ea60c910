//! Syllabifier: turns a letter string into a directed acyclic graph of
//! syllable edges over byte positions, using the prism for prefix matches.
//!
//! Construction is a best-first exploration: positions are visited in order,
//! and when several spelling types reach the same position only the most
//! preferred one survives. A backward pruning pass then removes everything
//! that does not lie on a path to the farthest interpreted position.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::prism::Prism;
use crate::spelling::{SpellingProperties, SpellingType, SyllableId};

/// Position -> best spelling type that reaches it.
pub type VertexMap = BTreeMap<usize, SpellingType>;
/// Syllable id -> properties of that spelling on one edge.
pub type SpellingMap = BTreeMap<SyllableId, SpellingProperties>;
/// End position -> spellings of the edge ending there.
pub type EndVertexMap = BTreeMap<usize, SpellingMap>;
/// Start position -> outgoing edges.
pub type EdgeMap = BTreeMap<usize, EndVertexMap>;

/// Transposed view: start -> syllable id -> properties, longest edge first.
pub type SpellingIndex = BTreeMap<SyllableId, Vec<SpellingProperties>>;
pub type SpellingIndices = BTreeMap<usize, SpellingIndex>;

#[derive(Debug, Default)]
pub struct SyllableGraph {
    pub input_length: usize,
    pub interpreted_length: usize,
    pub vertices: VertexMap,
    pub edges: EdgeMap,
    pub indices: SpellingIndices,
}

pub struct Syllabifier {
    delimiters: String,
    enable_completion: bool,
}

const EXPAND_SEARCH_LIMIT: usize = 512;
const COMPLETION_PENALTY: f64 = 0.5;
const AMBIGUOUS_SYLLABLE_PENALTY: f64 = 1e-10;

impl Syllabifier {
    pub fn new(delimiters: impl Into<String>, enable_completion: bool) -> Self {
        Syllabifier {
            delimiters: delimiters.into(),
            enable_completion,
        }
    }

    /// Build the syllable graph for `input` and return the farthest
    /// interpreted position.
    pub fn build_syllable_graph(
        &self,
        input: &str,
        prism: &Prism,
        graph: &mut SyllableGraph,
    ) -> usize {
        if input.is_empty() {
            return 0;
        }

        let mut farthest = 0usize;
        let mut queue: BinaryHeap<Reverse<(usize, SpellingType)>> = BinaryHeap::new();
        queue.push(Reverse((0, SpellingType::Normal)));

        while let Some(Reverse((current_pos, vertex_type))) = queue.pop() {
            // the preferred spelling type arrives first; discard revisits
            if graph.vertices.contains_key(&current_pos) {
                continue;
            }
            graph.vertices.insert(current_pos, vertex_type);

            let matches = prism.common_prefix_search(&input[current_pos..]);
            for m in matches {
                if m.length == 0 {
                    continue;
                }
                let mut end_pos = current_pos + m.length;
                // consume trailing delimiters
                while end_pos < input.len()
                    && self.delimiters.contains(input.as_bytes()[end_pos] as char)
                {
                    end_pos += 1;
                }
                if end_pos > farthest {
                    farthest = end_pos;
                }
                let spellings = graph
                    .edges
                    .entry(current_pos)
                    .or_default()
                    .entry(end_pos)
                    .or_default();
                let mut end_vertex_type = SpellingType::Invalid;
                for (syllable_id, mut props) in prism.query_spelling(m.value) {
                    props.end_pos = end_pos;
                    if props.kind < end_vertex_type {
                        end_vertex_type = props.kind;
                    }
                    spellings.insert(syllable_id, props);
                }
                // a path is no better than its worst step
                if end_vertex_type < vertex_type {
                    end_vertex_type = vertex_type;
                }
                queue.push(Reverse((end_pos, end_vertex_type)));
            }
        }

        self.prune(graph, farthest);

        if self.enable_completion && farthest < input.len() {
            farthest = self.add_completions(input, prism, graph, farthest);
        }

        graph.input_length = input.len();
        graph.interpreted_length = farthest;
        self.transpose(graph);
        farthest
    }

    /// Remove vertices and edges that do not lie on a path from 0 to
    /// `farthest`, and spellings whose type is worse than the best type that
    /// reaches the end. Joints of decomposable Normal edges are marked
    /// `Ambiguous` and kept.
    fn prune(&self, graph: &mut SyllableGraph, farthest: usize) {
        let mut good: BTreeSet<usize> = BTreeSet::new();
        good.insert(farthest);
        let mut last_type = graph
            .vertices
            .get(&farthest)
            .copied()
            .unwrap_or(SpellingType::Normal);

        for i in (0..farthest).rev() {
            if !graph.vertices.contains_key(&i) {
                continue;
            }
            let mut normal_edges: Vec<(usize, usize)> = Vec::new();
            if let Some(end_map) = graph.edges.get_mut(&i) {
                end_map.retain(|end, _| good.contains(end));
                for (end, spellings) in end_map.iter_mut() {
                    spellings.retain(|_, props| props.kind <= last_type);
                    let best = spellings.values().map(|p| p.kind).min();
                    if best == Some(SpellingType::Normal) {
                        normal_edges.push((i, *end));
                    }
                }
                end_map.retain(|_, spellings| !spellings.is_empty());
            }
            for (start, end) in normal_edges {
                self.mark_ambiguities(graph, start, end);
            }

            let empty = graph.edges.get(&i).map_or(true, |m| m.is_empty());
            let vertex_type = graph.vertices[&i];
            let prunable =
                vertex_type > last_type && vertex_type != SpellingType::Ambiguous;
            if prunable || empty {
                graph.vertices.remove(&i);
                graph.edges.remove(&i);
                continue;
            }
            good.insert(i);
            // an ambiguous joint is still a normal path underneath; it must
            // not relax the pruning threshold
            if vertex_type < last_type && vertex_type != SpellingType::Ambiguous {
                last_type = vertex_type;
            }
        }

        graph.edges.retain(|start, _| good.contains(start));
    }

    /// For every decomposition `[start, joint) + [joint, end)` of the edge
    /// `[start, end)`, flag the joint and discourage the shorter first part.
    fn mark_ambiguities(&self, graph: &mut SyllableGraph, start: usize, end: usize) {
        let joints: Vec<usize> = match graph.edges.get(&start) {
            Some(end_map) => end_map.keys().copied().filter(|&j| j > start && j < end).collect(),
            None => return,
        };
        for joint in joints {
            let closes = graph
                .edges
                .get(&joint)
                .map_or(false, |m| m.contains_key(&end));
            if !closes {
                continue;
            }
            if let Some(spellings) = graph.edges.get_mut(&start).and_then(|m| m.get_mut(&joint)) {
                for props in spellings.values_mut() {
                    props.credibility *= AMBIGUOUS_SYLLABLE_PENALTY;
                }
            }
            graph.vertices.insert(joint, SpellingType::Ambiguous);
        }
    }

    /// Best-effort completion edges covering the uninterpreted tail.
    fn add_completions(
        &self,
        input: &str,
        prism: &Prism,
        graph: &mut SyllableGraph,
        farthest: usize,
    ) -> usize {
        let code_length = input.len() - farthest;
        let keys = prism.expand_search(&input[farthest..], EXPAND_SEARCH_LIMIT);
        let mut end_pos = farthest;
        for m in keys {
            if m.length < code_length {
                continue;
            }
            end_pos = input.len();
            let spellings = graph
                .edges
                .entry(farthest)
                .or_default()
                .entry(end_pos)
                .or_default();
            for (syllable_id, mut props) in prism.query_spelling(m.value) {
                if props.kind > SpellingType::Normal {
                    continue;
                }
                props.kind = SpellingType::Completion;
                props.credibility *= COMPLETION_PENALTY;
                props.end_pos = end_pos;
                spellings.insert(syllable_id, props);
            }
        }
        if end_pos > farthest {
            graph
                .vertices
                .entry(end_pos)
                .or_insert(SpellingType::Completion);
        }
        end_pos
    }

    /// Build `indices` from `edges`, longest edge first per syllable.
    fn transpose(&self, graph: &mut SyllableGraph) {
        graph.indices.clear();
        for (start, end_map) in &graph.edges {
            let index = graph.indices.entry(*start).or_default();
            for (_, spellings) in end_map.iter().rev() {
                for (syllable_id, props) in spellings {
                    index.entry(*syllable_id).or_default().push(props.clone());
                }
            }
        }
    }
}

impl Default for Syllabifier {
    fn default() -> Self {
        Syllabifier::new("", false)
    }
}
