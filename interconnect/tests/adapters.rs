use interconnect::adapt::expr::{bits_from_value, value_from_bits};
use interconnect::adapt::{Side, SignalRef};
use interconnect::protocol::{PortProtocol, SignalKind};
use interconnect::Resolver;

mod common;
use common::{link, load_assembly, setup_resolver, width};

#[test]
fn identical_ports_have_an_empty_plan() {
    let protocol = PortProtocol::builder()
        .data_width(64)
        .sideband_width(2)
        .early_request(true)
        .build()
        .unwrap();
    let mut resolver = Resolver::default();
    let resolved = resolver.resolve(link(protocol.clone(), protocol)).unwrap();

    assert!(resolved.adapters.is_empty());
    let plan = resolved.plan("link").unwrap();
    assert!(plan.is_empty(), "unexpected entries: {:?}", plan.entries);
}

#[test]
fn precise_bursts_into_an_imprecise_consumer() {
    let mut resolver = setup_resolver();
    let resolved = resolver.resolve_decl(&load_assembly("burst")).unwrap();

    assert!(resolved.adapters.is_empty());
    assert_eq!(resolved.graph.num_connections(), 1);

    let plan = resolved.plan("link").unwrap();
    let length = plan
        .entries_for(SignalKind::BurstLength)
        .find(|e| e.target.side == Side::Consumer)
        .unwrap();
    assert_eq!(length.target.wire.as_str(), "dst_in_burst_length");
    let expr = length.expr().unwrap();
    assert_eq!(expr.to_string(), "2'd2 - {1'd0, src_out_last}");

    let remaining = |last: usize| {
        value_from_bits(&expr.eval(&|s: &SignalRef| {
            assert_eq!(s.kind, SignalKind::Last);
            bits_from_value(last, 1)
        }))
    };
    assert_eq!(remaining(0), 2);
    assert_eq!(remaining(1), 1);

    let unused = plan
        .unused()
        .map(|e| e.target.wire.to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        unused,
        ["src_out_burst_precise", "src_out_burst_length"]
    );
}

#[test]
fn plans_render_as_wire_assignments() {
    let producer = PortProtocol::builder()
        .data_width(32)
        .byte_width(16)
        .build()
        .unwrap();
    let mut resolver = Resolver::default();
    let resolved = resolver.resolve(link(producer, width(32))).unwrap();

    let lines = resolved
        .plan("link")
        .unwrap()
        .entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    assert_eq!(
        lines,
        ["dst_in_byte_en = {{2{src_out_byte_en[1]}}, {2{src_out_byte_en[0]}}}"]
    );
}

#[test]
fn huge_precise_bursts_resolve() {
    let producer = PortProtocol::builder()
        .precise_burst(true)
        .imprecise_burst(false)
        .max_message_values(1 << 62)
        .build()
        .unwrap();
    let mut resolver = Resolver::default();
    let resolved = resolver
        .resolve(link(producer, PortProtocol::default()))
        .unwrap();

    let plan = resolved.plan("link").unwrap();
    let length = plan
        .unused()
        .find(|e| e.target.kind == SignalKind::BurstLength)
        .unwrap();
    assert_eq!(length.target.side, Side::Producer);
    // The message size in bits saturates, leaving 2^59 words.
    assert_eq!(length.target.width, 60);
}
