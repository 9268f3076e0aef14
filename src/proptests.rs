use super::*;

use proptest::prelude::*;
use proptest::sample::Index;
use proptest_derive::Arbitrary;

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    Insert(#[proptest(strategy = "0u8..32")] u8),
    Delete(Index),
    Reinsert,
    Destruct,
    Lookup(#[proptest(strategy = "0u8..32")] u8),
}

/// Attached nodes in the order the tree must yield them: by key, then by
/// insertion time among equal keys.
struct Model {
    live: Vec<(u8, u64, NodeId)>,
    detached: Vec<NodeId>,
    clock: u64,
}

impl Model {
    fn new() -> Self {
        Self {
            live: Vec::new(),
            detached: Vec::new(),
            clock: 0,
        }
    }

    fn attach(&mut self, key: u8, id: NodeId) {
        self.clock += 1;
        self.live.push((key, self.clock, id));
    }

    fn expected(&self) -> Vec<NodeId> {
        let mut sorted = self.live.clone();
        sorted.sort_by_key(|&(key, stamp, _)| (key, stamp));
        sorted.into_iter().map(|(_, _, id)| id).collect()
    }
}

fn run_ops(threshold: u64, ops: Vec<Op>) -> std::result::Result<(), TestCaseError> {
    let config = TreeConfig::default().with_rebalance_threshold(threshold);
    let mut t = Tree::with_config(Lexicographic, config).unwrap();
    let base = t.memory_allocated();
    let mut m = Model::new();

    for op in ops {
        match op {
            Op::Insert(key) => {
                let id = t.construct_node_from(&[key], &m.clock.to_le_bytes()).unwrap();
                t.insert(id).unwrap();
                m.attach(key, id);
            }
            Op::Delete(index) => {
                if m.live.is_empty() {
                    continue;
                }
                let (_, _, id) = m.live.remove(index.index(m.live.len()));
                t.delete(id).unwrap();
                prop_assert!(!t.is_attached(id));
                m.detached.push(id);
            }
            Op::Reinsert => {
                if let Some(id) = m.detached.pop() {
                    t.insert(id).unwrap();
                    let key = t.key(id).unwrap()[0];
                    m.attach(key, id);
                }
            }
            Op::Destruct => {
                if let Some(id) = m.detached.pop() {
                    t.destruct_node(id).unwrap();
                    prop_assert_eq!(t.key(id), None);
                }
            }
            Op::Lookup(key) => {
                let found = t.get_equal(&[key]);
                let present = m.live.iter().any(|&(k, _, _)| k == key);
                prop_assert_eq!(found.is_some(), present);
                if let Some(id) = found {
                    prop_assert_eq!(t.key(id), Some(&[key][..]));
                }
            }
        }

        prop_assert!(t.is_valid());
        prop_assert_eq!(t.len(), m.live.len());
    }

    let got: Vec<NodeId> = t.iter().map(|(id, _, _)| id).collect();
    prop_assert_eq!(got, m.expected());

    let nodes = m.live.len() + m.detached.len();
    prop_assert_eq!(t.memory_allocated(), base + nodes * node_footprint(1, 8));

    // Duplicates carry consecutive instances in traversal order.
    let mut last: Option<(Vec<u8>, u64)> = None;
    for (id, key, _) in t.iter() {
        let instance = t.instance(id).unwrap();
        if let Some((prev_key, prev_instance)) = &last {
            if prev_key.as_slice() == key {
                prop_assert!(instance > *prev_instance);
            }
        }
        last = Some((key.to_vec(), instance));
    }

    for id in m.detached {
        t.destruct_node(id).unwrap();
    }
    t.clear().unwrap();
    prop_assert_eq!(t.memory_allocated(), base);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_matches_model(ops in prop::collection::vec(any::<Op>(), 0..=600)) {
        run_ops(DEFAULT_REBALANCE_THRESHOLD, ops)?;
    }

    #[test]
    fn prop_matches_model_any_threshold(
        threshold in 2u64..=6,
        ops in prop::collection::vec(any::<Op>(), 0..=300),
    ) {
        run_ops(threshold, ops)?;
    }

    #[test]
    fn prop_distinct_keys_count_and_depth(
        keys in prop::collection::btree_set(any::<u32>(), 1..400)
            .prop_map(|s| s.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
    ) {
        let mut t = Tree::new(BigEndianU64);
        for k in &keys {
            let id = t.construct_node_from(&k.to_be_bytes(), &[]).unwrap();
            t.insert(id).unwrap();
            prop_assert!(t.is_valid());
        }

        let n = keys.len();
        prop_assert_eq!(t.node_count(t.root()), n);
        let depth = t.max_depth(t.root());
        let lower = usize::BITS - n.leading_zeros();
        prop_assert!(depth >= lower as usize, "depth {} below {}", depth, lower);
        prop_assert!(depth <= n);
    }
}

/// Call `f` with every ordering of `0..n`, in lexicographic order.
fn for_each_ordering(n: usize, mut f: impl FnMut(&[usize])) {
    let mut order: Vec<usize> = (0..n).collect();
    loop {
        f(&order);
        let Some(pivot) = (1..n).rev().find(|&i| order[i - 1] < order[i]) else {
            return;
        };
        let swap = (pivot..n)
            .rev()
            .find(|&j| order[j] > order[pivot - 1])
            .unwrap();
        order.swap(pivot - 1, swap);
        order[pivot..].reverse();
    }
}

const SMALL_SET: [u64; 7] = [4, 1, 6, 4, 2, 7, 3];

#[test]
fn exhaustive_insert_order_small_set() {
    for_each_ordering(SMALL_SET.len(), |order| {
        let perm: Vec<u64> = order.iter().map(|&i| SMALL_SET[i]).collect();
        let mut t = Tree::new(BigEndianU64);
        for k in &perm {
            let id = t.construct_node_from(&k.to_be_bytes(), &[]).unwrap();
            t.insert(id).unwrap();
            assert!(t.is_valid());
        }

        let got: Vec<u64> = t
            .iter()
            .map(|(_, k, _)| u64::from_be_bytes(k.try_into().unwrap()))
            .collect();
        let mut expected = perm;
        expected.sort_unstable();
        assert_eq!(got, expected);
    });
}

#[test]
fn exhaustive_delete_order_small_set() {
    for_each_ordering(SMALL_SET.len(), |order| {
        let mut t = Tree::new(BigEndianU64);
        let base = t.memory_allocated();
        let ids: Vec<NodeId> = SMALL_SET
            .iter()
            .map(|k| {
                let id = t.construct_node_from(&k.to_be_bytes(), &[]).unwrap();
                t.insert(id).unwrap();
                id
            })
            .collect();

        for (removed, &i) in order.iter().enumerate() {
            t.delete(ids[i]).unwrap();
            t.destruct_node(ids[i]).unwrap();
            assert!(t.is_valid());
            assert_eq!(t.len(), SMALL_SET.len() - removed - 1);
        }
        assert!(t.is_empty());
        assert_eq!(t.memory_allocated(), base);
    });
}
