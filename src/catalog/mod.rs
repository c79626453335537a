// citywalk/src/catalog/mod.rs
//! Library API catalogs: declarative descriptions of each callable operation
//! and its ownership/lifetime contract.
//!
//! A catalog is append-only while it is being built and read-only afterwards,
//! so workers share it freely without locking. Built-in catalogs exist for
//! the seven supported libraries; external catalogs load from JSON.

pub mod cjson;
pub mod lcms;
pub mod libpcap;
pub mod libpng;
pub mod re2;
pub mod sqlite3;
pub mod zlib;

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthError};

/// The native libraries with built-in catalogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LibraryId {
    CJson,
    Lcms,
    Libpcap,
    Libpng,
    Re2,
    Sqlite3,
    Zlib,
}

impl LibraryId {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryId::CJson => "cJSON",
            LibraryId::Lcms => "lcms",
            LibraryId::Libpcap => "libpcap",
            LibraryId::Libpng => "libpng",
            LibraryId::Re2 => "re2",
            LibraryId::Sqlite3 => "sqlite3",
            LibraryId::Zlib => "zlib",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        for id in Self::all() {
            if id.as_str().eq_ignore_ascii_case(name) {
                return Ok(id);
            }
        }
        Err(SynthError::UnknownLibrary(name.to_string()))
    }

    pub fn all() -> Vec<LibraryId> {
        vec![
            LibraryId::CJson,
            LibraryId::Lcms,
            LibraryId::Libpcap,
            LibraryId::Libpng,
            LibraryId::Re2,
            LibraryId::Sqlite3,
            LibraryId::Zlib,
        ]
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque per-library object type ("cJSON", "sqlite3_stmt", "cmsHPROFILE", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeTag(String);

impl TypeTag {
    pub fn new(name: &str) -> Self {
        TypeTag(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle states of a tracked object. `Freed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Uninitialized,
    Allocated,
    Configured,
    Attached,
    Detached,
    Freed,
}

impl LifecycleState {
    /// Whether the per-type state machine permits this transition.
    /// `Uninitialized → Allocated → (Configured)* → (Attached ↔ Detached)* → Freed`.
    pub fn can_transition(from: LifecycleState, to: LifecycleState) -> bool {
        use LifecycleState::*;
        match (from, to) {
            (Freed, _) => false,
            (Uninitialized, Allocated) => true,
            (Uninitialized, _) => false,
            (_, Freed) => true,
            (Allocated, Configured) | (Configured, Configured) => true,
            (Allocated, Attached) | (Configured, Attached) | (Detached, Attached) => true,
            (Attached, Detached) => true,
            (Detached, Configured) | (Detached, Allocated) => true,
            (Configured, Allocated) | (Allocated, Allocated) => true,
            _ => false,
        }
    }

    pub fn is_live(&self) -> bool {
        !matches!(self, LifecycleState::Freed)
    }
}

/// Verb class of an operation. Drives phase matching during synthesis and
/// lets the repair engine find a free or duplicate operation for a type
/// without matching on names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpCategory {
    Allocate,
    Configure,
    Operate,
    Validate,
    Duplicate,
    Free,
}

/// A concrete literal an operation parameter can be bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    Str(String),
    /// A buffer+length pair, carried as a length only; contents are the
    /// emitter's concern.
    Buffer(usize),
}

/// Semantic kind of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Primitive,
    OwnedHandleIn,
    OwnedHandleOut,
    BorrowedRef,
    Buffer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    /// Object type for handle-kind parameters; `None` for primitives/buffers.
    pub ty: Option<TypeTag>,
    /// Suggested literal for primitive/buffer parameters, used by candidate
    /// sources that do not invent their own values.
    pub sample: Option<LiteralValue>,
}

/// Semantic kind of the return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReturnKind {
    Void,
    Primitive,
    OwnedHandle(TypeTag),
    BorrowedRef(TypeTag),
}

/// A condition over the tracker's current state that must hold before the
/// operation may be applied. Parameter indices refer to `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Precondition {
    /// The bound handle must currently be in one of these states.
    InState {
        param: usize,
        any_of: Vec<LifecycleState>,
    },
    /// The bound handle must not be freed.
    Live { param: usize },
    /// The two parameters must not be bound to the same handle.
    Distinct { a: usize, b: usize },
}

/// A state transition the operation causes when applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Postcondition {
    /// The return value introduces a new tracked handle.
    CreatesReturn { ty: TypeTag, state: LifecycleState },
    /// An out-parameter introduces a new tracked handle.
    CreatesOut {
        param: usize,
        ty: TypeTag,
        state: LifecycleState,
    },
    /// An existing handle moves to a new lifecycle state.
    Transitions { param: usize, to: LifecycleState },
    /// Ownership of `child` transfers to `parent` (e.g. an item added to a
    /// container must no longer be freed separately).
    Attaches { child: usize, parent: usize },
    /// The handle is released from its owner and is independently owned again.
    Detaches { param: usize },
    /// The handle is freed; attached children are freed with it.
    Frees { param: usize },
}

/// One callable API operation of a library. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub ret: ReturnKind,
    pub pre: Vec<Precondition>,
    pub post: Vec<Postcondition>,
    pub category: OpCategory,
    /// Marks operations whose misuse is memory-unsafe
    /// (allocate/free/detach/replace-style calls).
    pub critical: bool,
}

impl OperationSpec {
    pub fn new(name: &str, category: OpCategory) -> Self {
        let critical = matches!(
            category,
            OpCategory::Allocate | OpCategory::Free | OpCategory::Duplicate
        );
        Self {
            name: name.to_string(),
            params: Vec::new(),
            ret: ReturnKind::Void,
            pre: Vec::new(),
            post: Vec::new(),
            category,
            critical,
        }
    }

    // Builder methods used by the built-in catalogs. Each handle parameter
    // records its state requirement as an explicit precondition.

    pub fn handle_in(mut self, name: &str, ty: &str, any_of: &[LifecycleState]) -> Self {
        let param = self.params.len();
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind: ParamKind::OwnedHandleIn,
            ty: Some(TypeTag::new(ty)),
            sample: None,
        });
        self.pre.push(Precondition::InState {
            param,
            any_of: any_of.to_vec(),
        });
        self
    }

    pub fn borrowed(mut self, name: &str, ty: &str, any_of: &[LifecycleState]) -> Self {
        let param = self.params.len();
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind: ParamKind::BorrowedRef,
            ty: Some(TypeTag::new(ty)),
            sample: None,
        });
        self.pre.push(Precondition::InState {
            param,
            any_of: any_of.to_vec(),
        });
        self
    }

    pub fn handle_out(mut self, name: &str, ty: &str) -> Self {
        let param = self.params.len();
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind: ParamKind::OwnedHandleOut,
            ty: Some(TypeTag::new(ty)),
            sample: None,
        });
        self.post.push(Postcondition::CreatesOut {
            param,
            ty: TypeTag::new(ty),
            state: LifecycleState::Allocated,
        });
        self
    }

    pub fn int(mut self, name: &str, sample: i64) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind: ParamKind::Primitive,
            ty: None,
            sample: Some(LiteralValue::Int(sample)),
        });
        self
    }

    pub fn float(mut self, name: &str, sample: f64) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind: ParamKind::Primitive,
            ty: None,
            sample: Some(LiteralValue::Float(sample)),
        });
        self
    }

    pub fn str(mut self, name: &str, sample: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind: ParamKind::Primitive,
            ty: None,
            sample: Some(LiteralValue::Str(sample.to_string())),
        });
        self
    }

    pub fn buffer(mut self, name: &str, sample_len: usize) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind: ParamKind::Buffer,
            ty: None,
            sample: Some(LiteralValue::Buffer(sample_len)),
        });
        self
    }

    pub fn returns_handle(mut self, ty: &str) -> Self {
        self.ret = ReturnKind::OwnedHandle(TypeTag::new(ty));
        self.post.push(Postcondition::CreatesReturn {
            ty: TypeTag::new(ty),
            state: LifecycleState::Allocated,
        });
        self
    }

    pub fn returns_primitive(mut self) -> Self {
        self.ret = ReturnKind::Primitive;
        self
    }

    pub fn transitions(mut self, param: usize, to: LifecycleState) -> Self {
        self.post.push(Postcondition::Transitions { param, to });
        self
    }

    pub fn attaches(mut self, child: usize, parent: usize) -> Self {
        self.post.push(Postcondition::Attaches { child, parent });
        self
    }

    pub fn detaches(mut self, param: usize) -> Self {
        self.post.push(Postcondition::Detaches { param });
        self
    }

    pub fn frees(mut self, param: usize) -> Self {
        self.post.push(Postcondition::Frees { param });
        self
    }

    pub fn distinct(mut self, a: usize, b: usize) -> Self {
        self.pre.push(Precondition::Distinct { a, b });
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    /// Indices of parameters that must be bound to tracked handles.
    pub fn handle_params(&self) -> impl Iterator<Item = (usize, &ParamSpec)> {
        self.params.iter().enumerate().filter(|(_, p)| {
            matches!(
                p.kind,
                ParamKind::OwnedHandleIn | ParamKind::BorrowedRef
            )
        })
    }

    /// Whether applying this operation introduces at least one new handle.
    pub fn creates_handle(&self) -> bool {
        self.post.iter().any(|p| {
            matches!(
                p,
                Postcondition::CreatesReturn { .. } | Postcondition::CreatesOut { .. }
            )
        })
    }

    /// Whether applying this operation frees at least one handle.
    pub fn frees_handle(&self) -> bool {
        self.post.iter().any(|p| matches!(p, Postcondition::Frees { .. }))
    }
}

/// Read-only database of the operations one library exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    library: LibraryId,
    ops: Vec<OperationSpec>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(library: LibraryId) -> Self {
        Self {
            library,
            ops: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn library(&self) -> LibraryId {
        self.library
    }

    /// Append one operation. Only valid during startup construction.
    pub fn push(&mut self, spec: OperationSpec) {
        self.index.insert(spec.name.clone(), self.ops.len());
        self.ops.push(spec);
    }

    pub fn lookup(&self, name: &str) -> Result<&OperationSpec> {
        self.index
            .get(name)
            .map(|&i| &self.ops[i])
            .ok_or_else(|| SynthError::UnknownOperation {
                library: self.library,
                name: name.to_string(),
            })
    }

    pub fn ops(&self) -> &[OperationSpec] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The free-class operation whose freed parameter matches `ty`.
    pub fn free_op_for(&self, ty: &TypeTag) -> Option<&OperationSpec> {
        self.ops.iter().find(|op| {
            op.category == OpCategory::Free
                && op.post.iter().any(|post| match post {
                    Postcondition::Frees { param } => {
                        op.params.get(*param).and_then(|p| p.ty.as_ref()) == Some(ty)
                    }
                    _ => false,
                })
        })
    }

    /// The operation producing a fresh handle of `ty` from an existing one,
    /// if the library has one.
    pub fn duplicate_op_for(&self, ty: &TypeTag) -> Option<&OperationSpec> {
        self.ops.iter().find(|op| {
            op.category == OpCategory::Duplicate
                && op.post.iter().any(|post| match post {
                    Postcondition::CreatesReturn { ty: created, .. }
                    | Postcondition::CreatesOut { ty: created, .. } => created == ty,
                    _ => false,
                })
        })
    }

    /// Load the built-in catalog for a library. Fails with `UnknownLibrary`
    /// when no specs exist for it.
    pub fn load(library: LibraryId) -> Result<&'static Catalog> {
        BUILTIN
            .get(&library)
            .ok_or_else(|| SynthError::UnknownLibrary(library.to_string()))
    }

    /// Parse a declarative catalog from its JSON input format.
    pub fn from_json(input: &str) -> Result<Catalog> {
        let file: CatalogFile = serde_json::from_str(input)?;
        let library = LibraryId::parse(&file.library)?;
        let mut catalog = Catalog::new(library);
        for op in file.operations {
            validate_spec(&op)?;
            catalog.push(op);
        }
        if catalog.is_empty() {
            return Err(SynthError::MalformedCatalog(format!(
                "catalog for {library} declares no operations"
            )));
        }
        Ok(catalog)
    }
}

/// On-disk shape of a declarative catalog.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    library: String,
    operations: Vec<OperationSpec>,
}

fn validate_spec(op: &OperationSpec) -> Result<()> {
    let arity = op.params.len();
    let check = |param: usize, what: &str| -> Result<()> {
        if param >= arity {
            return Err(SynthError::MalformedCatalog(format!(
                "{}: {what} refers to parameter {param} but arity is {arity}",
                op.name
            )));
        }
        Ok(())
    };
    for pre in &op.pre {
        match pre {
            Precondition::InState { param, .. } | Precondition::Live { param } => {
                check(*param, "precondition")?
            }
            Precondition::Distinct { a, b } => {
                check(*a, "precondition")?;
                check(*b, "precondition")?;
            }
        }
    }
    for post in &op.post {
        match post {
            Postcondition::CreatesOut { param, .. }
            | Postcondition::Transitions { param, .. }
            | Postcondition::Detaches { param }
            | Postcondition::Frees { param } => check(*param, "postcondition")?,
            Postcondition::Attaches { child, parent } => {
                check(*child, "postcondition")?;
                check(*parent, "postcondition")?;
            }
            Postcondition::CreatesReturn { .. } => {}
        }
    }
    if op.category == OpCategory::Free && !op.frees_handle() {
        return Err(SynthError::MalformedCatalog(format!(
            "{}: free-class operation frees nothing",
            op.name
        )));
    }
    Ok(())
}

static BUILTIN: Lazy<HashMap<LibraryId, Catalog>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(LibraryId::CJson, cjson::catalog());
    map.insert(LibraryId::Lcms, lcms::catalog());
    map.insert(LibraryId::Libpcap, libpcap::catalog());
    map.insert(LibraryId::Libpng, libpng::catalog());
    map.insert(LibraryId::Re2, re2::catalog());
    map.insert(LibraryId::Sqlite3, sqlite3::catalog());
    map.insert(LibraryId::Zlib, zlib::catalog());
    map
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalogs_load_for_every_library() {
        for id in LibraryId::all() {
            let catalog = Catalog::load(id).unwrap();
            assert!(!catalog.is_empty(), "{id} catalog is empty");
            // Every library must expose at least one allocator and one free.
            assert!(catalog.ops().iter().any(|o| o.creates_handle()));
            assert!(catalog.ops().iter().any(|o| o.frees_handle()));
        }
    }

    #[test]
    fn lookup_unknown_operation_fails() {
        let catalog = Catalog::load(LibraryId::CJson).unwrap();
        let err = catalog.lookup("cJSON_DoesNotExist").unwrap_err();
        assert!(matches!(err, SynthError::UnknownOperation { .. }));
    }

    #[test]
    fn parse_rejects_unknown_library() {
        let err = LibraryId::parse("openssl").unwrap_err();
        assert!(matches!(err, SynthError::UnknownLibrary(_)));
    }

    #[test]
    fn every_free_op_is_critical() {
        for id in LibraryId::all() {
            let catalog = Catalog::load(id).unwrap();
            for op in catalog.ops() {
                if op.category == OpCategory::Free {
                    assert!(op.critical, "{}: free op not marked critical", op.name);
                }
            }
        }
    }

    #[test]
    fn from_json_roundtrip() {
        let mut catalog = Catalog::new(LibraryId::Zlib);
        catalog.push(
            OperationSpec::new("deflateInit", OpCategory::Allocate).returns_handle("z_stream"),
        );
        catalog.push(
            OperationSpec::new("deflateEnd", OpCategory::Free)
                .handle_in("strm", "z_stream", &[LifecycleState::Allocated])
                .frees(0),
        );
        let json = serde_json::to_string(&CatalogFile {
            library: "zlib".to_string(),
            operations: catalog.ops().to_vec(),
        })
        .unwrap();
        let parsed = Catalog::from_json(&json).unwrap();
        assert_eq!(parsed.library(), LibraryId::Zlib);
        assert_eq!(parsed.len(), 2);
        assert!(parsed.lookup("deflateEnd").is_ok());
    }

    #[test]
    fn from_json_rejects_out_of_range_param() {
        let json = r#"{
            "library": "zlib",
            "operations": [{
                "name": "deflateEnd",
                "params": [],
                "ret": "Void",
                "pre": [],
                "post": [{"Frees": {"param": 3}}],
                "category": "Free",
                "critical": true
            }]
        }"#;
        let err = Catalog::from_json(json).unwrap_err();
        assert!(matches!(err, SynthError::MalformedCatalog(_)));
    }

    #[test]
    fn freed_is_terminal() {
        use LifecycleState::*;
        assert!(!LifecycleState::can_transition(Freed, Allocated));
        assert!(!LifecycleState::can_transition(Freed, Freed));
        assert!(LifecycleState::can_transition(Allocated, Freed));
        assert!(LifecycleState::can_transition(Attached, Detached));
        assert!(!LifecycleState::can_transition(Uninitialized, Configured));
    }
}
