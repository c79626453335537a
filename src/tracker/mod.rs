// citywalk/src/tracker/mod.rs
//! Sequence state tracker: an in-memory abstract machine that mirrors the
//! catalog's object model while a candidate sequence is assembled.
//!
//! The tracker owns an arena of [`ObjectHandle`]s for one in-progress
//! sequence. It answers feasibility queries (`can_apply`) and commits state
//! transitions (`apply`). It is single-threaded by design and never shared
//! across sequences.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{
    LifecycleState, LiteralValue, OperationSpec, ParamKind, Postcondition, Precondition, TypeTag,
};
use crate::error::SynthError;

/// Synthetic identifier of a tracked object. Never a raw pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub u32);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Who owns a tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ownership {
    /// Exclusively owned by the sequence step that created or detached it.
    Step(usize),
    /// Ownership was transferred to another handle (container semantics);
    /// freeing the owner frees this object too.
    AttachedTo(HandleId),
}

/// A tracked runtime value appearing in a sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectHandle {
    pub id: HandleId,
    pub ty: TypeTag,
    pub state: LifecycleState,
    pub owner: Ownership,
    pub created_at: usize,
}

/// One bound argument of a sequence step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgValue {
    Literal(LiteralValue),
    Handle(HandleId),
    /// Placeholder for an owned-handle-out parameter; the created handle is
    /// reported through [`AppliedEffect`].
    Out,
}

/// The committed outcome of applying one operation.
#[derive(Debug, Clone, Default)]
pub struct AppliedEffect {
    pub created: Vec<HandleId>,
    pub freed: Vec<HandleId>,
    pub transitioned: Vec<(HandleId, LifecycleState)>,
}

/// Why a proposal cannot be applied in the current state.
#[derive(Debug, Clone, PartialEq)]
pub enum Infeasibility {
    ArityMismatch { expected: usize, got: usize },
    ExpectsHandle { param: usize },
    ExpectsLiteral { param: usize },
    NoSuchHandle { handle: HandleId },
    TypeMismatch { param: usize, expected: TypeTag, found: TypeTag },
    FreedHandle { param: usize, handle: HandleId },
    WrongState { param: usize, handle: HandleId, state: LifecycleState },
    Aliased { a: usize, b: usize },
    IllegalTransition { handle: HandleId, from: LifecycleState, to: LifecycleState },
}

impl fmt::Display for Infeasibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Infeasibility::ArityMismatch { expected, got } => {
                write!(f, "arity mismatch: expected {expected} arguments, got {got}")
            }
            Infeasibility::ExpectsHandle { param } => {
                write!(f, "parameter {param} expects a handle")
            }
            Infeasibility::ExpectsLiteral { param } => {
                write!(f, "parameter {param} expects a literal")
            }
            Infeasibility::NoSuchHandle { handle } => write!(f, "{handle} does not exist"),
            Infeasibility::TypeMismatch { param, expected, found } => {
                write!(f, "parameter {param} expects {expected}, got {found}")
            }
            Infeasibility::FreedHandle { param, handle } => {
                write!(f, "parameter {param} references freed handle {handle}")
            }
            Infeasibility::WrongState { param, handle, state } => {
                write!(f, "parameter {param}: {handle} is in state {state:?}")
            }
            Infeasibility::Aliased { a, b } => {
                write!(f, "parameters {a} and {b} must be bound to distinct handles")
            }
            Infeasibility::IllegalTransition { handle, from, to } => {
                write!(f, "{handle} cannot move from {from:?} to {to:?}")
            }
        }
    }
}

/// Abstract machine tracking live objects for one in-progress sequence.
#[derive(Debug, Default)]
pub struct StateTracker {
    handles: Vec<ObjectHandle>,
    steps: usize,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, id: HandleId) -> Option<&ObjectHandle> {
        self.handles.get(id.0 as usize)
    }

    pub fn step_count(&self) -> usize {
        self.steps
    }

    /// All handles not yet freed, attached children included.
    pub fn live_handles(&self) -> impl Iterator<Item = &ObjectHandle> {
        self.handles.iter().filter(|h| h.state.is_live())
    }

    /// Live handles of `ty` currently in one of `any_of`, in creation order.
    pub fn handles_in_state<'a>(
        &'a self,
        ty: &'a TypeTag,
        any_of: &'a [LifecycleState],
    ) -> impl Iterator<Item = &'a ObjectHandle> {
        self.handles
            .iter()
            .filter(move |h| &h.ty == ty && any_of.contains(&h.state))
    }

    /// True iff every bound argument satisfies `spec`'s preconditions and no
    /// aliasing rule is violated. Returns the first reason on failure.
    pub fn can_apply(
        &self,
        spec: &OperationSpec,
        args: &[ArgValue],
    ) -> Result<(), Infeasibility> {
        if args.len() != spec.params.len() {
            return Err(Infeasibility::ArityMismatch {
                expected: spec.params.len(),
                got: args.len(),
            });
        }

        // Shape and type of every argument.
        for (i, (param, arg)) in spec.params.iter().zip(args).enumerate() {
            match (param.kind, arg) {
                (ParamKind::Primitive | ParamKind::Buffer, ArgValue::Literal(_)) => {}
                (ParamKind::Primitive | ParamKind::Buffer, _) => {
                    return Err(Infeasibility::ExpectsLiteral { param: i });
                }
                (ParamKind::OwnedHandleOut, ArgValue::Out) => {}
                (ParamKind::OwnedHandleOut, _) => {
                    return Err(Infeasibility::ExpectsLiteral { param: i });
                }
                (ParamKind::OwnedHandleIn | ParamKind::BorrowedRef, ArgValue::Handle(id)) => {
                    let handle = self
                        .handle(*id)
                        .ok_or(Infeasibility::NoSuchHandle { handle: *id })?;
                    if let Some(expected) = &param.ty {
                        if &handle.ty != expected {
                            return Err(Infeasibility::TypeMismatch {
                                param: i,
                                expected: expected.clone(),
                                found: handle.ty.clone(),
                            });
                        }
                    }
                    // A freed handle is rejected regardless of declared
                    // preconditions; Freed is terminal.
                    if !handle.state.is_live() {
                        return Err(Infeasibility::FreedHandle { param: i, handle: *id });
                    }
                }
                (ParamKind::OwnedHandleIn | ParamKind::BorrowedRef, _) => {
                    return Err(Infeasibility::ExpectsHandle { param: i });
                }
            }
        }

        // Declared preconditions.
        for pre in &spec.pre {
            match pre {
                Precondition::InState { param, any_of } => {
                    if let ArgValue::Handle(id) = &args[*param] {
                        let handle = self
                            .handle(*id)
                            .ok_or(Infeasibility::NoSuchHandle { handle: *id })?;
                        if !any_of.contains(&handle.state) {
                            return Err(Infeasibility::WrongState {
                                param: *param,
                                handle: *id,
                                state: handle.state,
                            });
                        }
                    }
                }
                Precondition::Live { param } => {
                    if let ArgValue::Handle(id) = &args[*param] {
                        let handle = self
                            .handle(*id)
                            .ok_or(Infeasibility::NoSuchHandle { handle: *id })?;
                        if !handle.state.is_live() {
                            return Err(Infeasibility::FreedHandle {
                                param: *param,
                                handle: *id,
                            });
                        }
                    }
                }
                Precondition::Distinct { a, b } => {
                    if let (ArgValue::Handle(ha), ArgValue::Handle(hb)) =
                        (&args[*a], &args[*b])
                    {
                        if ha == hb {
                            return Err(Infeasibility::Aliased { a: *a, b: *b });
                        }
                    }
                }
            }
        }

        // The transitions the postconditions would cause must be legal in the
        // per-type state machine.
        for post in &spec.post {
            let (param, to) = match post {
                Postcondition::Transitions { param, to } => (*param, *to),
                Postcondition::Attaches { child, .. } => (*child, LifecycleState::Attached),
                Postcondition::Detaches { param } => (*param, LifecycleState::Detached),
                Postcondition::Frees { param } => (*param, LifecycleState::Freed),
                Postcondition::CreatesReturn { .. } | Postcondition::CreatesOut { .. } => continue,
            };
            if let ArgValue::Handle(id) = &args[param] {
                let handle = self
                    .handle(*id)
                    .ok_or(Infeasibility::NoSuchHandle { handle: *id })?;
                if !LifecycleState::can_transition(handle.state, to) {
                    return Err(Infeasibility::IllegalTransition {
                        handle: *id,
                        from: handle.state,
                        to,
                    });
                }
            }
        }

        Ok(())
    }

    /// Commit the state transition. Re-checks feasibility; a failure here
    /// means the caller skipped `can_apply` or mutated state in between, and
    /// surfaces as `InvalidTransition`.
    pub fn apply(
        &mut self,
        spec: &OperationSpec,
        args: &[ArgValue],
    ) -> Result<AppliedEffect, SynthError> {
        if let Err(reason) = self.can_apply(spec, args) {
            return Err(SynthError::InvalidTransition(format!(
                "{}: {reason}",
                spec.name
            )));
        }

        let step = self.steps;
        let mut effect = AppliedEffect::default();

        for post in &spec.post {
            match post {
                Postcondition::CreatesReturn { ty, state }
                | Postcondition::CreatesOut { ty, state, .. } => {
                    let id = HandleId(self.handles.len() as u32);
                    self.handles.push(ObjectHandle {
                        id,
                        ty: ty.clone(),
                        state: *state,
                        owner: Ownership::Step(step),
                        created_at: step,
                    });
                    effect.created.push(id);
                }
                Postcondition::Transitions { param, to } => {
                    if let ArgValue::Handle(id) = &args[*param] {
                        self.handles[id.0 as usize].state = *to;
                        effect.transitioned.push((*id, *to));
                    }
                }
                Postcondition::Attaches { child, parent } => {
                    if let (ArgValue::Handle(c), ArgValue::Handle(p)) =
                        (&args[*child], &args[*parent])
                    {
                        let h = &mut self.handles[c.0 as usize];
                        h.state = LifecycleState::Attached;
                        h.owner = Ownership::AttachedTo(*p);
                        effect.transitioned.push((*c, LifecycleState::Attached));
                    }
                }
                Postcondition::Detaches { param } => {
                    if let ArgValue::Handle(id) = &args[*param] {
                        let h = &mut self.handles[id.0 as usize];
                        h.state = LifecycleState::Detached;
                        h.owner = Ownership::Step(step);
                        effect.transitioned.push((*id, LifecycleState::Detached));
                    }
                }
                Postcondition::Frees { param } => {
                    if let ArgValue::Handle(id) = &args[*param] {
                        self.free_cascading(*id, &mut effect.freed);
                    }
                }
            }
        }

        self.steps += 1;
        Ok(effect)
    }

    /// Free a handle and, transitively, everything attached to it.
    fn free_cascading(&mut self, root: HandleId, freed: &mut Vec<HandleId>) {
        let mut work = vec![root];
        let mut seen: HashSet<HandleId> = HashSet::new();
        while let Some(id) = work.pop() {
            if !seen.insert(id) {
                continue;
            }
            let h = &mut self.handles[id.0 as usize];
            if h.state.is_live() {
                h.state = LifecycleState::Freed;
                freed.push(id);
            }
            for child in self
                .handles
                .iter()
                .filter(|c| c.owner == Ownership::AttachedTo(id) && c.state.is_live())
                .map(|c| c.id)
                .collect::<Vec<_>>()
            {
                work.push(child);
            }
        }
    }

    /// Handles still live at sequence end; non-empty under a no-leak policy
    /// means the sequence leaks.
    pub fn finalize(&self) -> Vec<&ObjectHandle> {
        self.handles.iter().filter(|h| h.state.is_live()).collect()
    }
}
