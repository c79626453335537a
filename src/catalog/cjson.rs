// citywalk/src/catalog/cjson.rs
//! Built-in catalog for the cJSON library.
//!
//! cJSON containers own their children: adding an item to an object or array
//! transfers ownership, and deleting the container recursively frees every
//! attached child. A child added to a parent must never be freed separately.

use super::{Catalog, LibraryId, LifecycleState, OpCategory, OperationSpec};

use LifecycleState::{Allocated, Configured, Detached};

const LIVE: &[LifecycleState] = &[Allocated, Configured, Detached];

pub fn catalog() -> Catalog {
    let mut c = Catalog::new(LibraryId::CJson);

    c.push(OperationSpec::new("cJSON_CreateObject", OpCategory::Allocate).returns_handle("cJSON"));
    c.push(OperationSpec::new("cJSON_CreateArray", OpCategory::Allocate).returns_handle("cJSON"));
    c.push(
        OperationSpec::new("cJSON_CreateString", OpCategory::Allocate)
            .str("string", "citywalk")
            .returns_handle("cJSON"),
    );
    c.push(
        OperationSpec::new("cJSON_CreateNumber", OpCategory::Allocate)
            .float("num", 42.0)
            .returns_handle("cJSON"),
    );
    c.push(
        OperationSpec::new("cJSON_Parse", OpCategory::Allocate)
            .str("value", "{\"k\":1}")
            .returns_handle("cJSON"),
    );
    c.push(
        OperationSpec::new("cJSON_AddItemToObject", OpCategory::Configure)
            .handle_in("object", "cJSON", LIVE)
            .str("string", "field")
            .handle_in("item", "cJSON", &[Allocated, Configured, Detached])
            .distinct(0, 2)
            .attaches(2, 0)
            .critical(),
    );
    c.push(
        OperationSpec::new("cJSON_AddItemToArray", OpCategory::Configure)
            .handle_in("array", "cJSON", LIVE)
            .handle_in("item", "cJSON", &[Allocated, Configured, Detached])
            .distinct(0, 1)
            .attaches(1, 0)
            .critical(),
    );
    c.push(
        OperationSpec::new("cJSON_SetValuestring", OpCategory::Configure)
            .handle_in("object", "cJSON", LIVE)
            .str("valuestring", "updated")
            .transitions(0, Configured),
    );
    c.push(
        OperationSpec::new("cJSON_DetachItemViaPointer", OpCategory::Operate)
            .handle_in("parent", "cJSON", LIVE)
            .handle_in("item", "cJSON", &[LifecycleState::Attached])
            .distinct(0, 1)
            .detaches(1)
            .critical(),
    );
    c.push(
        OperationSpec::new("cJSON_Duplicate", OpCategory::Duplicate)
            .handle_in("item", "cJSON", &[Allocated, Configured, Detached, LifecycleState::Attached])
            .int("recurse", 1)
            .returns_handle("cJSON"),
    );
    c.push(
        OperationSpec::new("cJSON_Print", OpCategory::Validate)
            .borrowed("item", "cJSON", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("cJSON_GetArraySize", OpCategory::Validate)
            .borrowed("array", "cJSON", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("cJSON_IsObject", OpCategory::Validate)
            .borrowed("item", "cJSON", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("cJSON_Delete", OpCategory::Free)
            .handle_in("item", "cJSON", LIVE)
            .frees(0),
    );

    c
}
