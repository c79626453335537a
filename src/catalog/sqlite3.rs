// citywalk/src/catalog/sqlite3.rs
//! Built-in catalog for sqlite3.
//!
//! Connections and prepared statements are distinct handle types. A
//! statement must be finalized exactly once, and a connection closed exactly
//! once; both are critical operations.

use super::{Catalog, LibraryId, LifecycleState, OpCategory, OperationSpec};

use LifecycleState::{Allocated, Configured};

const LIVE: &[LifecycleState] = &[Allocated, Configured];

pub fn catalog() -> Catalog {
    let mut c = Catalog::new(LibraryId::Sqlite3);

    c.push(
        OperationSpec::new("sqlite3_open", OpCategory::Allocate)
            .str("filename", ":memory:")
            .handle_out("ppDb", "sqlite3")
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("sqlite3_prepare_v2", OpCategory::Allocate)
            .handle_in("db", "sqlite3", LIVE)
            .str("zSql", "CREATE TABLE t(x INTEGER);")
            .handle_out("ppStmt", "sqlite3_stmt")
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("sqlite3_bind_int", OpCategory::Configure)
            .handle_in("pStmt", "sqlite3_stmt", LIVE)
            .int("index", 1)
            .int("value", 7)
            .transitions(0, Configured)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("sqlite3_bind_text", OpCategory::Configure)
            .handle_in("pStmt", "sqlite3_stmt", LIVE)
            .int("index", 1)
            .str("value", "citywalk")
            .transitions(0, Configured)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("sqlite3_step", OpCategory::Operate)
            .handle_in("pStmt", "sqlite3_stmt", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("sqlite3_reset", OpCategory::Configure)
            .handle_in("pStmt", "sqlite3_stmt", LIVE)
            .transitions(0, Allocated)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("sqlite3_exec", OpCategory::Operate)
            .handle_in("db", "sqlite3", LIVE)
            .str("sql", "SELECT 1;")
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("sqlite3_column_int", OpCategory::Validate)
            .borrowed("pStmt", "sqlite3_stmt", LIVE)
            .int("iCol", 0)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("sqlite3_errmsg", OpCategory::Validate)
            .borrowed("db", "sqlite3", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("sqlite3_changes", OpCategory::Validate)
            .borrowed("db", "sqlite3", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("sqlite3_finalize", OpCategory::Free)
            .handle_in("pStmt", "sqlite3_stmt", LIVE)
            .frees(0)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("sqlite3_close", OpCategory::Free)
            .handle_in("db", "sqlite3", LIVE)
            .frees(0)
            .returns_primitive(),
    );

    c
}
