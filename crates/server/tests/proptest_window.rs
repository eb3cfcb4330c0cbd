use std::collections::HashMap;
use std::sync::Arc;

use mdbeta_core::ChunkKey;
use mdbeta_server::{is_visible, visible_keys, BroadcastHub, ChunkWindow, Outbox, SessionId};
use mdbeta_world::MemoryWorld;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Enable(ChunkKey),
    Disable(ChunkKey),
    Refresh(ChunkKey),
}

fn key_strategy() -> impl Strategy<Value = ChunkKey> {
    (-6i32..6, -6i32..6).prop_map(|(x, z)| ChunkKey::new(x, z))
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => key_strategy().prop_map(Op::Enable),
        1 => key_strategy().prop_map(Op::Disable),
        2 => key_strategy().prop_map(Op::Refresh),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn window_tracks_touches_and_never_evicts_visible_chunks(
        radius in 1i32..4,
        capacity in 1usize..48,
        ops in prop::collection::vec(op_strategy(), 1..24),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let hub = Arc::new(BroadcastHub::new());
        let (outbox, _rx) = Outbox::channel();
        let mut window = ChunkWindow::new(
            SessionId(1),
            Arc::new(MemoryWorld::default()),
            Arc::clone(&hub),
            outbox,
            radius,
            capacity,
        );
        let mut model: HashMap<ChunkKey, u64> = HashMap::new();

        for op in ops {
            match op {
                Op::Enable(key) => {
                    runtime.block_on(window.enable(key)).expect("enable");
                    *model.entry(key).or_insert(0) += 1;
                }
                Op::Disable(key) => {
                    prop_assert_eq!(window.disable(key), model.remove(&key).is_some());
                }
                Op::Refresh(center) => {
                    window.refresh_window(center);
                    let evicted = runtime.block_on(window.finish_refresh()).expect("refresh");
                    for key in visible_keys(center, radius) {
                        *model.entry(key).or_insert(0) += 1;
                    }
                    for key in &evicted {
                        prop_assert!(!is_visible(center, *key, radius));
                        prop_assert!(model.remove(key).is_some());
                    }
                    for key in visible_keys(center, radius) {
                        prop_assert!(window.contains(key));
                    }
                    prop_assert!(
                        window.len() <= capacity
                            || window.keys().iter().all(|key| is_visible(center, *key, radius))
                    );
                }
            }

            prop_assert_eq!(window.len(), model.len());
            for (key, touches) in &model {
                prop_assert_eq!(window.touches(*key), Some(*touches));
                prop_assert!(window.chunk(*key).is_some());
                prop_assert!(hub.interested_in(*key).contains(&SessionId(1)));
            }
        }
    }
}
