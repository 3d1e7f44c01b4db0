use std::collections::HashSet;

use chrono::Utc;
use nastro_core::SubscriptionRegistry;
use nastro_types::SubscriptionKind;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add { symbol: usize, kind: usize },
    RemoveNth(usize),
}

const SYMBOLS: [&str; 5] = ["AAPL", "MSFT", "TSLA", "SPY", "QQQ"];
const KINDS: [SubscriptionKind; 3] = [
    SubscriptionKind::Trades,
    SubscriptionKind::Depth,
    SubscriptionKind::Quotes,
];

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..SYMBOLS.len(), 0..KINDS.len()).prop_map(|(symbol, kind)| Op::Add { symbol, kind }),
        (0usize..64).prop_map(Op::RemoveNth),
    ]
}

proptest! {
    // For any interleaving of subscribes and unsubscribes, symbols_by_kind(k)
    // is exactly the set of symbols with at least one live subscription of
    // kind k.
    #[test]
    fn symbols_by_kind_matches_live_subscriptions(ops in proptest::collection::vec(op_strategy(), 1..80)) {
        let registry = SubscriptionRegistry::new(100_000);
        let mut live: Vec<(u64, usize, usize)> = Vec::new(); // (id, symbol, kind)

        for op in ops {
            match op {
                Op::Add { symbol, kind } => {
                    let sub = registry.add(SYMBOLS[symbol], KINDS[kind], Utc::now());
                    live.push((sub.id, symbol, kind));
                }
                Op::RemoveNth(n) => {
                    if !live.is_empty() {
                        let (id, _, _) = live.remove(n % live.len());
                        prop_assert!(registry.remove(id).is_some());
                    }
                }
            }
        }

        for (k, kind) in KINDS.iter().enumerate() {
            let expected: HashSet<&str> = live
                .iter()
                .filter(|(_, _, kk)| *kk == k)
                .map(|(_, s, _)| SYMBOLS[*s])
                .collect();
            let actual: HashSet<String> = registry.symbols_by_kind(*kind).into_iter().collect();
            let expected: HashSet<String> = expected.into_iter().map(str::to_string).collect();
            prop_assert_eq!(actual, expected);
        }
        prop_assert_eq!(registry.len(), live.len());
    }
}
