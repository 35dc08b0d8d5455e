use super::table::{StateKey, FEATURES};

#[derive(Debug, Clone)]
struct Node {
    key: StateKey,
    point: [f64; FEATURES],
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Static k-d tree over policy-table keys.
///
/// Built once from a sorted key list so the same table always yields the
/// same tree. Equidistant candidates resolve to the smallest key.
#[derive(Debug, Clone, Default)]
pub struct KdTree {
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl KdTree {
    pub fn build(mut keys: Vec<StateKey>) -> Self {
        keys.sort();
        keys.dedup();
        let mut tree = KdTree {
            nodes: Vec::with_capacity(keys.len()),
            root: None,
        };
        let mut points: Vec<(StateKey, [f64; FEATURES])> =
            keys.into_iter().map(|k| (k, k.features())).collect();
        tree.root = tree.build_rec(&mut points, 0);
        tree
    }

    fn build_rec(&mut self, points: &mut [(StateKey, [f64; FEATURES])], depth: usize) -> Option<usize> {
        if points.is_empty() {
            return None;
        }
        let axis = depth % FEATURES;
        // Stable sort with a key tie-break keeps the split deterministic.
        points.sort_by(|a, b| a.1[axis].total_cmp(&b.1[axis]).then(a.0.cmp(&b.0)));
        let mid = points.len() / 2;
        let (key, point) = points[mid];
        let idx = self.nodes.len();
        self.nodes.push(Node {
            key,
            point,
            axis,
            left: None,
            right: None,
        });
        let (lower, rest) = points.split_at_mut(mid);
        let left = self.build_rec(lower, depth + 1);
        let right = self.build_rec(&mut rest[1..], depth + 1);
        self.nodes[idx].left = left;
        self.nodes[idx].right = right;
        Some(idx)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nearest stored key to `query` and its Euclidean distance.
    pub fn nearest(&self, query: &[f64; FEATURES]) -> Option<(StateKey, f64)> {
        let mut best: Option<(StateKey, f64)> = None;
        if let Some(root) = self.root {
            self.search(root, query, &mut best);
        }
        best.map(|(key, d2)| (key, d2.sqrt()))
    }

    /// Nearest key no farther than `tolerance`.
    pub fn nearest_within(&self, query: &[f64; FEATURES], tolerance: f64) -> Option<(StateKey, f64)> {
        self.nearest(query).filter(|(_, d)| *d <= tolerance)
    }

    fn search(&self, idx: usize, query: &[f64; FEATURES], best: &mut Option<(StateKey, f64)>) {
        let node = &self.nodes[idx];
        let d2 = squared_distance(&node.point, query);
        let better = match best {
            None => true,
            Some((key, bd2)) => d2 < *bd2 || (d2 == *bd2 && node.key < *key),
        };
        if better {
            *best = Some((node.key, d2));
        }

        let diff = query[node.axis] - node.point[node.axis];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        if let Some(n) = near {
            self.search(n, query, best);
        }
        if let Some(f) = far {
            // `<=` so equidistant keys on the far side still get a chance
            // at the tie-break.
            let visit = match best {
                None => true,
                Some((_, bd2)) => diff * diff <= *bd2,
            };
            if visit {
                self.search(f, query, best);
            }
        }
    }
}

fn squared_distance(a: &[f64; FEATURES], b: &[f64; FEATURES]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
