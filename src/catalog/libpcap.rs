// citywalk/src/catalog/libpcap.rs
//! Built-in catalog for libpcap.
//!
//! Compiled filter programs (bpf_program) are freed with pcap_freecode, never
//! with pcap_close; the capture handle and the program have independent
//! lifetimes and each must be released exactly once.

use super::{Catalog, LibraryId, LifecycleState, OpCategory, OperationSpec};

use LifecycleState::{Allocated, Configured};

const LIVE: &[LifecycleState] = &[Allocated, Configured];

pub fn catalog() -> Catalog {
    let mut c = Catalog::new(LibraryId::Libpcap);

    c.push(
        OperationSpec::new("pcap_open_dead", OpCategory::Allocate)
            .int("linktype", 1)
            .int("snaplen", 65535)
            .returns_handle("pcap_t"),
    );
    c.push(
        OperationSpec::new("pcap_compile", OpCategory::Allocate)
            .handle_in("p", "pcap_t", LIVE)
            .handle_out("fp", "bpf_program")
            .str("str", "tcp port 80")
            .int("optimize", 1)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("pcap_setfilter", OpCategory::Configure)
            .handle_in("p", "pcap_t", LIVE)
            .borrowed("fp", "bpf_program", LIVE)
            .transitions(0, Configured)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("pcap_set_snaplen", OpCategory::Configure)
            .handle_in("p", "pcap_t", LIVE)
            .int("snaplen", 2048)
            .transitions(0, Configured)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("pcap_offline_filter", OpCategory::Operate)
            .borrowed("fp", "bpf_program", LIVE)
            .buffer("pkt", 64)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("pcap_datalink", OpCategory::Validate)
            .borrowed("p", "pcap_t", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("pcap_snapshot", OpCategory::Validate)
            .borrowed("p", "pcap_t", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("pcap_lib_version", OpCategory::Validate).returns_primitive(),
    );
    c.push(
        OperationSpec::new("pcap_freecode", OpCategory::Free)
            .handle_in("fp", "bpf_program", LIVE)
            .frees(0),
    );
    c.push(
        OperationSpec::new("pcap_close", OpCategory::Free)
            .handle_in("p", "pcap_t", LIVE)
            .frees(0),
    );

    c
}
