// citywalk/src/catalog/libpng.rs
//! Built-in catalog for libpng.
//!
//! Info structs are destroyed separately from the read struct they were
//! created for, and png_destroy_info_struct must not receive the same pointer
//! twice; that aliasing mistake is a classic double free in real harnesses.

use super::{Catalog, LibraryId, LifecycleState, OpCategory, OperationSpec};

use LifecycleState::{Allocated, Configured};

const LIVE: &[LifecycleState] = &[Allocated, Configured];

pub fn catalog() -> Catalog {
    let mut c = Catalog::new(LibraryId::Libpng);

    c.push(
        OperationSpec::new("png_create_read_struct", OpCategory::Allocate)
            .str("user_png_ver", "1.6.40")
            .returns_handle("png_structp"),
    );
    c.push(
        OperationSpec::new("png_create_info_struct", OpCategory::Allocate)
            .borrowed("png_ptr", "png_structp", LIVE)
            .returns_handle("png_infop"),
    );
    c.push(
        OperationSpec::new("png_set_sig_bytes", OpCategory::Configure)
            .handle_in("png_ptr", "png_structp", LIVE)
            .int("num_bytes", 8)
            .transitions(0, Configured),
    );
    c.push(
        OperationSpec::new("png_set_interlace_handling", OpCategory::Configure)
            .handle_in("png_ptr", "png_structp", LIVE)
            .transitions(0, Configured)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("png_process_data", OpCategory::Operate)
            .handle_in("png_ptr", "png_structp", LIVE)
            .handle_in("info_ptr", "png_infop", LIVE)
            .buffer("buffer", 128),
    );
    c.push(
        OperationSpec::new("png_get_image_width", OpCategory::Validate)
            .borrowed("png_ptr", "png_structp", LIVE)
            .borrowed("info_ptr", "png_infop", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("png_get_bit_depth", OpCategory::Validate)
            .borrowed("png_ptr", "png_structp", LIVE)
            .borrowed("info_ptr", "png_infop", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("png_sig_cmp", OpCategory::Validate)
            .buffer("sig", 8)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("png_destroy_info_struct", OpCategory::Free)
            .handle_in("png_ptr", "png_structp", LIVE)
            .handle_in("info_ptr", "png_infop", LIVE)
            .distinct(0, 1)
            .frees(1),
    );
    c.push(
        // Info structs are passed as NULL here; they have their own destroy.
        OperationSpec::new("png_destroy_read_struct", OpCategory::Free)
            .handle_in("png_ptr_ptr", "png_structp", LIVE)
            .frees(0),
    );

    c
}
