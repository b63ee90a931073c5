// Property-based tests for resolution invariants.
//
// 1. Byte-enable replication: each producer bit is repeated k times in order.
// 2. Byte-enable reduction: groups of k producer bits are OR-reduced, and the
//    result does not depend on the order of bits within a group.
// 3. Clock unification does not depend on declaration order.
// 4. Ports on the worker default clock follow the control clock.

use bitvec::vec::BitVec;
use interconnect::adapt::{Expr, Side, SignalRef};
use interconnect::decl::{AssemblyDecl, ConnectionDecl, InstanceDecl};
use interconnect::protocol::{PortProtocol, SignalKind};
use interconnect::Resolver;
use proptest::prelude::*;

mod common;
use common::{clock_assignment, link, load_assembly, setup_resolver};

/// Producer and consumer sharing a transport width, with `pu` and `cu` units.
fn byte_enable_expr(pu: usize, cu: usize) -> Option<Expr> {
    let data_width = 2 * pu * cu;
    let producer = PortProtocol::builder()
        .data_width(data_width)
        .byte_width(data_width / pu)
        .build()
        .unwrap();
    let consumer = PortProtocol::builder()
        .data_width(data_width)
        .byte_width(data_width / cu)
        .build()
        .unwrap();
    let mut resolver = Resolver::default();
    let resolved = resolver.resolve(link(producer, consumer)).unwrap();
    assert!(resolved.adapters.is_empty());
    let plan = resolved.plan("link").unwrap();
    let mut entries = plan
        .entries_for(SignalKind::ByteEnable)
        .filter(|e| e.target.side == Side::Consumer);
    let expr = entries.next().and_then(|e| e.expr().cloned());
    assert!(entries.next().is_none());
    expr
}

fn eval(expr: &Expr, input: &[bool]) -> Vec<bool> {
    let bits = input.iter().copied().collect::<BitVec>();
    expr.eval(&|s: &SignalRef| {
        assert_eq!(s.kind, SignalKind::ByteEnable);
        assert_eq!(s.width, bits.len());
        bits.clone()
    })
    .iter()
    .by_vals()
    .collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn byte_enables_replicate_in_order(
        (k, input) in (1usize..=4, 2usize..=8)
            .prop_flat_map(|(k, pu)| (Just(k), proptest::collection::vec(any::<bool>(), pu)))
    ) {
        let pu = input.len();
        match byte_enable_expr(pu, pu * k) {
            None => prop_assert_eq!(k, 1),
            Some(expr) => {
                prop_assert!(k > 1);
                let output = eval(&expr, &input);
                prop_assert_eq!(output.len(), pu * k);
                for (i, bit) in output.iter().enumerate() {
                    prop_assert_eq!(*bit, input[i / k]);
                }
            }
        }
    }

    #[test]
    fn byte_enables_or_reduce_groups(
        (k, input, rotation) in (2usize..=4, 2usize..=4)
            .prop_flat_map(|(k, cu)| (
                Just(k),
                proptest::collection::vec(any::<bool>(), cu * k),
                0usize..4,
            ))
    ) {
        let cu = input.len() / k;
        let expr = byte_enable_expr(cu * k, cu).unwrap();

        let output = eval(&expr, &input);
        prop_assert_eq!(output.len(), cu);
        for (j, bit) in output.iter().enumerate() {
            prop_assert_eq!(*bit, input[j * k..(j + 1) * k].iter().any(|b| *b));
        }

        let mut permuted = input.clone();
        for group in permuted.chunks_mut(k) {
            group.rotate_left(rotation % k);
        }
        prop_assert_eq!(eval(&expr, &permuted), output);
    }

    #[test]
    fn clock_unification_is_order_independent(
        instances in Just(load_assembly("capture").instances).prop_shuffle(),
        connections in Just(load_assembly("capture").connections).prop_shuffle(),
    ) {
        let reference = load_assembly("capture");
        let permuted = AssemblyDecl {
            instances: instances.clone(),
            connections: connections.clone(),
            ..reference.clone()
        };

        let mut resolver = setup_resolver();
        let expected = resolver.resolve_decl(&reference).unwrap();
        let actual = resolver.resolve_decl(&permuted).unwrap();
        prop_assert_eq!(
            clock_assignment(&expected.graph),
            clock_assignment(&actual.graph)
        );
    }

    #[test]
    fn control_clock_wins_any_order(
        order in Just(vec![0usize, 1, 2, 3]).prop_shuffle(),
    ) {
        let chain = [("a", "b"), ("b", "c"), ("c", "d"), ("d", "e")];
        let mut decl = AssemblyDecl::new("chain");
        decl.control_clock = Some("sys_clk".into());
        for name in ["a", "b", "c", "d", "e"] {
            decl.instances.push(InstanceDecl {
                name: name.into(),
                worker: "splitter".into(),
            });
        }
        for i in order {
            let (from, to) = chain[i];
            decl.connections.push(
                ConnectionDecl::new(format!("{from}_{to}"))
                    .with_attachment(format!("{from}.out[0]").as_str())
                    .with_attachment(format!("{to}.in").as_str()),
            );
        }

        let mut resolver = setup_resolver();
        let resolved = resolver.resolve_decl(&decl).unwrap();
        let clocks = clock_assignment(&resolved.graph);
        prop_assert!(clocks.values().all(|c| c == "sys_clk"), "{:?}", clocks);
    }
}
