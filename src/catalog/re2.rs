// citywalk/src/catalog/re2.rs
//! Built-in catalog for RE2 via its C wrapper (cre2).
//!
//! Options objects outlive the regexps compiled from them and are deleted
//! separately.

use super::{Catalog, LibraryId, LifecycleState, OpCategory, OperationSpec};

use LifecycleState::{Allocated, Configured};

const LIVE: &[LifecycleState] = &[Allocated, Configured];

pub fn catalog() -> Catalog {
    let mut c = Catalog::new(LibraryId::Re2);

    c.push(
        OperationSpec::new("cre2_opt_new", OpCategory::Allocate).returns_handle("cre2_options_t"),
    );
    c.push(
        OperationSpec::new("cre2_opt_set_case_sensitive", OpCategory::Configure)
            .handle_in("opt", "cre2_options_t", LIVE)
            .int("flag", 1)
            .transitions(0, Configured),
    );
    c.push(
        OperationSpec::new("cre2_opt_set_longest_match", OpCategory::Configure)
            .handle_in("opt", "cre2_options_t", LIVE)
            .int("flag", 0)
            .transitions(0, Configured),
    );
    c.push(
        OperationSpec::new("cre2_new", OpCategory::Allocate)
            .str("pattern", "([a-z]+)-([0-9]+)")
            .int("pattern_len", 17)
            .borrowed("opt", "cre2_options_t", LIVE)
            .returns_handle("cre2_regexp_t"),
    );
    c.push(
        OperationSpec::new("cre2_match", OpCategory::Operate)
            .borrowed("rex", "cre2_regexp_t", LIVE)
            .str("text", "walk-42")
            .int("textlen", 7)
            .int("anchor", 1)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("cre2_find_and_consume", OpCategory::Operate)
            .borrowed("rex", "cre2_regexp_t", LIVE)
            .buffer("text", 32)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("cre2_num_capturing_groups", OpCategory::Validate)
            .borrowed("rex", "cre2_regexp_t", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("cre2_error_code", OpCategory::Validate)
            .borrowed("rex", "cre2_regexp_t", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("cre2_pattern", OpCategory::Validate)
            .borrowed("rex", "cre2_regexp_t", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("cre2_delete", OpCategory::Free)
            .handle_in("rex", "cre2_regexp_t", LIVE)
            .frees(0),
    );
    c.push(
        OperationSpec::new("cre2_opt_delete", OpCategory::Free)
            .handle_in("opt", "cre2_options_t", LIVE)
            .frees(0),
    );

    c
}
