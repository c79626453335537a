// citywalk/src/catalog/lcms.rs
//! Built-in catalog for Little CMS 2.
//!
//! Profiles, transforms, and tone curves are separate handle types with their
//! own close/delete/free calls. A transform borrows the profiles it was built
//! from; closing a profile while a transform still references it is legal in
//! lcms2, so profiles are not attached to transforms here.

use super::{Catalog, LibraryId, LifecycleState, OpCategory, OperationSpec};

use LifecycleState::{Allocated, Configured};

const LIVE: &[LifecycleState] = &[Allocated, Configured];

pub fn catalog() -> Catalog {
    let mut c = Catalog::new(LibraryId::Lcms);

    c.push(
        OperationSpec::new("cmsCreate_sRGBProfile", OpCategory::Allocate)
            .returns_handle("cmsHPROFILE"),
    );
    c.push(
        OperationSpec::new("cmsCreateXYZProfile", OpCategory::Allocate)
            .returns_handle("cmsHPROFILE"),
    );
    c.push(
        OperationSpec::new("cmsBuildGamma", OpCategory::Allocate)
            .float("gamma", 2.2)
            .returns_handle("cmsToneCurve"),
    );
    c.push(
        OperationSpec::new("cmsCreateTransform", OpCategory::Allocate)
            .borrowed("input", "cmsHPROFILE", LIVE)
            .int("inputFormat", 262169)
            .borrowed("output", "cmsHPROFILE", LIVE)
            .int("outputFormat", 262169)
            .int("intent", 0)
            .returns_handle("cmsHTRANSFORM"),
    );
    c.push(
        OperationSpec::new("cmsSetHeaderRenderingIntent", OpCategory::Configure)
            .handle_in("profile", "cmsHPROFILE", LIVE)
            .int("intent", 1)
            .transitions(0, Configured),
    );
    c.push(
        OperationSpec::new("cmsSmoothToneCurve", OpCategory::Configure)
            .handle_in("curve", "cmsToneCurve", LIVE)
            .float("lambda", 1.0)
            .transitions(0, Configured)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("cmsDoTransform", OpCategory::Operate)
            .handle_in("transform", "cmsHTRANSFORM", LIVE)
            .buffer("inputBuffer", 16)
            .int("size", 4),
    );
    c.push(
        OperationSpec::new("cmsEvalToneCurveFloat", OpCategory::Operate)
            .borrowed("curve", "cmsToneCurve", LIVE)
            .float("v", 0.5)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("cmsGetColorSpace", OpCategory::Validate)
            .borrowed("profile", "cmsHPROFILE", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("cmsIsToneCurveLinear", OpCategory::Validate)
            .borrowed("curve", "cmsToneCurve", LIVE)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("cmsCloseProfile", OpCategory::Free)
            .handle_in("profile", "cmsHPROFILE", LIVE)
            .frees(0)
            .returns_primitive(),
    );
    c.push(
        OperationSpec::new("cmsDeleteTransform", OpCategory::Free)
            .handle_in("transform", "cmsHTRANSFORM", LIVE)
            .frees(0),
    );
    c.push(
        OperationSpec::new("cmsFreeToneCurve", OpCategory::Free)
            .handle_in("curve", "cmsToneCurve", LIVE)
            .frees(0),
    );

    c
}
