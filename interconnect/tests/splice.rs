use interconnect::graph::AdapterParams;
use interconnect::splice::{ADAPTER_INPUT, ADAPTER_OUTPUT};
use interconnect::Resolver;

mod common;
use common::{endpoints, link, load_assembly, setup_resolver, width};

#[test]
fn widening_inserts_one_adapter() {
    let mut resolver = setup_resolver();
    let resolved = resolver.resolve_decl(&load_assembly("widen")).unwrap();
    let graph = &resolved.graph;

    assert_eq!(resolved.adapters.len(), 1);
    let adapter = &resolved.adapters[0];
    assert_eq!(
        adapter.params,
        AdapterParams {
            input_width: 32,
            output_width: 128
        }
    );
    assert_eq!(
        graph.instance(adapter.instance).adapter(),
        Some(adapter.params)
    );
    assert_eq!(
        graph.instances().filter(|(_, i)| i.is_synthetic()).count(),
        1
    );

    assert_eq!(graph.num_connections(), 2);
    let original = graph.connection_by_name("link").unwrap();
    assert_eq!(original, adapter.original);
    assert_eq!(endpoints(graph, original), ["src.out", "width_adapter_0.in"]);
    assert_eq!(
        endpoints(graph, adapter.spliced),
        ["width_adapter_0.out", "dst.in"]
    );

    // The adapter runs in the domain of the connection it was spliced into.
    let input = graph
        .instance_port(adapter.instance, ADAPTER_INPUT)
        .unwrap();
    let output = graph
        .instance_port(adapter.instance, ADAPTER_OUTPUT)
        .unwrap();
    let src = graph.find_port("src", "out").unwrap();
    assert_eq!(graph.port_clock(input), graph.port_clock(src));
    assert_eq!(graph.port_clock(output), graph.port_clock(src));
    assert_eq!(
        graph.connection(adapter.spliced).clock(),
        graph.connection(original).clock()
    );
}

#[test]
fn spliced_connection_carries_producer_attributes() {
    let mut resolver = setup_resolver();
    let resolved = resolver.resolve_decl(&load_assembly("widen")).unwrap();

    // The burst mismatch moves with the consumer onto the spliced connection.
    assert!(resolved.plan("link").unwrap().is_empty());
    let spliced = resolved.graph.connection(resolved.adapters[0].spliced);
    let plan = resolved.plan(spliced.name()).unwrap();
    assert_eq!(
        plan.entries
            .iter()
            .find(|e| !e.is_unused())
            .unwrap()
            .to_string(),
        "dst_in_burst_length = 2'd2 - {1'd0, width_adapter_0_out_last}"
    );
}

#[test]
fn each_width_pair_gets_its_own_adapter() {
    let mut resolver = Resolver::default();
    for (w1, w2) in [(32, 64), (64, 32), (32, 64), (8, 256)] {
        let resolved = resolver.resolve(link(width(w1), width(w2))).unwrap();
        assert_eq!(resolved.adapters.len(), 1);
        assert_eq!(resolved.graph.num_connections(), 2);
        let params = resolved.adapters[0].params;
        assert_eq!((params.input_width, params.output_width), (w1, w2));
    }
    assert_eq!(resolver.adapters().num_templates(), 3);
    assert_eq!(resolver.adapters().num_instances(), 4);
}
