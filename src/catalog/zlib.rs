// citywalk/src/catalog/zlib.rs
//! Built-in catalog for zlib.
//!
//! A z_stream is tracked from its *Init call, which allocates the internal
//! state that the matching *End call must release exactly once. Deflate and
//! inflate streams are separate handle types so an inflate stream can never
//! be passed to deflateEnd.

use super::{Catalog, LibraryId, LifecycleState, OpCategory, OperationSpec};

use LifecycleState::{Allocated, Configured};

const LIVE: &[LifecycleState] = &[Allocated, Configured];

pub fn catalog() -> Catalog {
    let mut c = Catalog::new(LibraryId::Zlib);

    c.push(
        OperationSpec::new("deflateInit", OpCategory::Allocate)
            .handle_out("strm", "z_stream_deflate")
            .int("level", 6)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("inflateInit", OpCategory::Allocate)
            .handle_out("strm", "z_stream_inflate")
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("deflateParams", OpCategory::Configure)
            .handle_in("strm", "z_stream_deflate", LIVE)
            .int("level", 9)
            .int("strategy", 0)
            .transitions(0, Configured)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("deflateSetDictionary", OpCategory::Configure)
            .handle_in("strm", "z_stream_deflate", LIVE)
            .buffer("dictionary", 32)
            .transitions(0, Configured)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("deflate", OpCategory::Operate)
            .handle_in("strm", "z_stream_deflate", LIVE)
            .int("flush", 4)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("inflate", OpCategory::Operate)
            .handle_in("strm", "z_stream_inflate", LIVE)
            .int("flush", 0)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("compress", OpCategory::Operate)
            .buffer("source", 64)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("crc32", OpCategory::Validate)
            .buffer("buf", 64)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("deflatePending", OpCategory::Validate)
            .borrowed("strm", "z_stream_deflate", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("zlibVersion", OpCategory::Validate).returns_primitive(),
    );
    c.push(
        OperationSpec::new("deflateEnd", OpCategory::Free)
            .handle_in("strm", "z_stream_deflate", LIVE)
            .frees(0)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("inflateEnd", OpCategory::Free)
            .handle_in("strm", "z_stream_inflate", LIVE)
            .frees(0)
            .returns_primitive(),
    );

    c
}
