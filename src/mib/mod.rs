//! MIB instrumentation: a flat OID-ordered object store
//!
//! This is the engine's instrumentation collaborator: `read_vars`,
//! `read_next_vars` and `write_vars` over registered scalars, with a
//! per-VarBind access callback consulted before every read or write and
//! a two-phase SET with rollback.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use crate::access::ViewType;
use crate::proto::{ErrorStatus, Oid, Value, VarBind};

/// Typed SMI error kinds surfaced by instrumentation (RFC 3416 / SMIv2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmiErrorKind {
    GenErr,
    NoAccess,
    WrongType,
    WrongLength,
    WrongValue,
    NoCreation,
    InconsistentValue,
    ResourceUnavailable,
    CommitFailed,
    UndoFailed,
    Authorization,
    NotWritable,
    InconsistentName,
}

impl SmiErrorKind {
    pub fn error_status(&self) -> ErrorStatus {
        match self {
            Self::GenErr => ErrorStatus::GenErr,
            Self::NoAccess => ErrorStatus::NoAccess,
            Self::WrongType => ErrorStatus::WrongType,
            Self::WrongLength => ErrorStatus::WrongLength,
            Self::WrongValue => ErrorStatus::WrongValue,
            Self::NoCreation => ErrorStatus::NoCreation,
            Self::InconsistentValue => ErrorStatus::InconsistentValue,
            Self::ResourceUnavailable => ErrorStatus::ResourceUnavailable,
            Self::CommitFailed => ErrorStatus::CommitFailed,
            Self::UndoFailed => ErrorStatus::UndoFailed,
            Self::Authorization => ErrorStatus::AuthorizationError,
            Self::NotWritable => ErrorStatus::NotWritable,
            Self::InconsistentName => ErrorStatus::InconsistentName,
        }
    }
}

/// An SMI error with the 0-based index of the offending VarBind. The
/// responder converts `idx + 1` into the PDU errorIndex. A populated
/// `report` asks the dispatcher for Report generation instead of an
/// error response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("SMI error {kind:?} at index {idx}")]
pub struct SmiError {
    pub kind: SmiErrorKind,
    pub idx: usize,
    pub report: Option<(Oid, Value)>,
}

impl SmiError {
    pub fn new(kind: SmiErrorKind, idx: usize) -> Self {
        Self {
            kind,
            idx,
            report: None,
        }
    }

    pub fn with_report(kind: SmiErrorKind, idx: usize, oid: Oid, value: Value) -> Self {
        Self {
            kind,
            idx,
            report: Some((oid, value)),
        }
    }
}

/// Outcome of the per-VarBind access callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    /// Not visible in the active view: reads surface an exception,
    /// GETNEXT walks skip past it.
    NotInView,
}

/// Access callback handed down by the command responder. Receives the
/// object name, the value (where one is known), the 0-based VarBind
/// index and the kind of access wanted.
pub type AccessCheck<'a> =
    dyn Fn(&Oid, Option<&Value>, usize, ViewType) -> Result<AccessDecision, SmiError> + 'a;

/// Max-access of a registered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MibAccess {
    ReadOnly,
    ReadWrite,
    NotAccessible,
}

type ValueFn = Arc<dyn Fn() -> Value + Send + Sync>;
type HookFn = Arc<dyn Fn(&Value) -> Result<(), SmiErrorKind> + Send + Sync>;

/// Value source: a stored scalar, or a closure for values the engine
/// computes on the fly (uptime, counters).
#[derive(Clone)]
pub enum MibObject {
    Scalar(Value),
    Dynamic(ValueFn),
}

impl fmt::Debug for MibObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

#[derive(Clone)]
pub struct MibEntry {
    pub object: MibObject,
    pub access: MibAccess,
    /// Phase-1 SET validation hook.
    pub validator: Option<HookFn>,
    /// Phase-2 SET commit hook; a failure here triggers rollback.
    pub on_commit: Option<HookFn>,
}

impl fmt::Debug for MibEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MibEntry")
            .field("object", &self.object)
            .field("access", &self.access)
            .field("validator", &self.validator.is_some())
            .field("on_commit", &self.on_commit.is_some())
            .finish()
    }
}

impl MibEntry {
    fn readable(&self) -> bool {
        matches!(self.access, MibAccess::ReadOnly | MibAccess::ReadWrite)
    }

    fn value(&self) -> Value {
        match &self.object {
            MibObject::Scalar(v) => v.clone(),
            MibObject::Dynamic(f) => f(),
        }
    }
}

/// The object store. Held by the engine behind a lock and consulted by
/// the command responder; never touched by the dispatch pipeline.
#[derive(Debug, Default)]
pub struct MibStore {
    entries: BTreeMap<Oid, MibEntry>,
}

impl MibStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_scalar(&mut self, oid: Oid, value: Value, access: MibAccess) {
        self.entries.insert(
            oid,
            MibEntry {
                object: MibObject::Scalar(value),
                access,
                validator: None,
                on_commit: None,
            },
        );
    }

    pub fn register_dynamic(&mut self, oid: Oid, getter: ValueFn) {
        self.entries.insert(
            oid,
            MibEntry {
                object: MibObject::Dynamic(getter),
                access: MibAccess::ReadOnly,
                validator: None,
                on_commit: None,
            },
        );
    }

    pub fn register_entry(&mut self, oid: Oid, entry: MibEntry) {
        self.entries.insert(oid, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current value of an exactly-registered readable object.
    pub fn current_value(&self, oid: &Oid) -> Option<Value> {
        self.entries
            .get(oid)
            .filter(|e| e.readable())
            .map(|e| e.value())
    }

    /// Exception marker for an unknown name: NoSuchInstance when the
    /// enclosing object exists, NoSuchObject otherwise.
    fn missing_marker(&self, name: &Oid) -> Value {
        if name.len() > 1 {
            let parent = Oid::new(name.components()[..name.len() - 1].to_vec());
            if self.entries.keys().any(|k| k.starts_with(&parent)) {
                return Value::NoSuchInstance;
            }
        }
        Value::NoSuchObject
    }

    /// GET semantics (RFC 3416 §4.2.1): exceptions travel as values,
    /// never as PDU errors.
    pub fn read_vars(
        &self,
        var_binds: &[VarBind],
        ac: &AccessCheck,
    ) -> Result<Vec<VarBind>, SmiError> {
        let mut out = Vec::with_capacity(var_binds.len());
        for (idx, vb) in var_binds.iter().enumerate() {
            let decision = ac(&vb.name, None, idx, ViewType::Read)?;
            let value = match decision {
                AccessDecision::NotInView => self.missing_marker(&vb.name),
                AccessDecision::Granted => match self.entries.get(&vb.name) {
                    Some(entry) if entry.readable() => entry.value(),
                    _ => self.missing_marker(&vb.name),
                },
            };
            out.push(VarBind::new(vb.name.clone(), value));
        }
        Ok(out)
    }

    /// GETNEXT semantics (RFC 3416 §4.2.2): advance past names the view
    /// or the access callback rejects.
    pub fn read_next_vars(
        &self,
        var_binds: &[VarBind],
        ac: &AccessCheck,
    ) -> Result<Vec<VarBind>, SmiError> {
        let mut out = Vec::with_capacity(var_binds.len());
        for (idx, vb) in var_binds.iter().enumerate() {
            let mut found = None;
            let range = self
                .entries
                .range::<Oid, _>((Bound::Excluded(&vb.name), Bound::Unbounded));
            for (name, entry) in range {
                if !entry.readable() {
                    continue;
                }
                let value = entry.value();
                match ac(name, Some(&value), idx, ViewType::Read)? {
                    AccessDecision::Granted => {
                        found = Some(VarBind::new(name.clone(), value));
                        break;
                    }
                    AccessDecision::NotInView => continue,
                }
            }
            out.push(found.unwrap_or_else(|| VarBind::new(vb.name.clone(), Value::EndOfMibView)));
        }
        Ok(out)
    }

    /// SET semantics (RFC 3416 §4.2.5): validate every binding, then
    /// commit all of them, rolling back on a failed commit.
    pub fn write_vars(
        &mut self,
        var_binds: &[VarBind],
        ac: &AccessCheck,
    ) -> Result<Vec<VarBind>, SmiError> {
        // phase 1: validation only, no state change
        for (idx, vb) in var_binds.iter().enumerate() {
            match ac(&vb.name, Some(&vb.value), idx, ViewType::Write)? {
                AccessDecision::Granted => {}
                AccessDecision::NotInView => {
                    return Err(SmiError::new(SmiErrorKind::NoAccess, idx))
                }
            }
            let entry = self
                .entries
                .get(&vb.name)
                .ok_or_else(|| SmiError::new(SmiErrorKind::NotWritable, idx))?;
            if entry.access != MibAccess::ReadWrite {
                return Err(SmiError::new(SmiErrorKind::NotWritable, idx));
            }
            let current = match &entry.object {
                MibObject::Scalar(v) => v,
                MibObject::Dynamic(_) => {
                    return Err(SmiError::new(SmiErrorKind::NotWritable, idx))
                }
            };
            if std::mem::discriminant(current) != std::mem::discriminant(&vb.value) {
                return Err(SmiError::new(SmiErrorKind::WrongType, idx));
            }
            if let Some(validator) = &entry.validator {
                validator(&vb.value).map_err(|kind| SmiError::new(kind, idx))?;
            }
        }

        // phase 2: commit, with undo on failure
        let mut committed: Vec<(Oid, Value)> = Vec::new();
        for (idx, vb) in var_binds.iter().enumerate() {
            let entry = self
                .entries
                .get_mut(&vb.name)
                .ok_or_else(|| SmiError::new(SmiErrorKind::GenErr, idx))?;
            let old = match &mut entry.object {
                MibObject::Scalar(v) => std::mem::replace(v, vb.value.clone()),
                MibObject::Dynamic(_) => return Err(SmiError::new(SmiErrorKind::GenErr, idx)),
            };
            if let Some(hook) = &entry.on_commit {
                if let Err(kind) = hook(&vb.value) {
                    // restore this binding and everything before it
                    if let MibObject::Scalar(v) = &mut entry.object {
                        *v = old;
                    }
                    if self.rollback(committed).is_err() {
                        return Err(SmiError::new(SmiErrorKind::UndoFailed, idx));
                    }
                    return Err(SmiError::new(kind, idx));
                }
            }
            committed.push((vb.name.clone(), old));
        }

        Ok(var_binds.to_vec())
    }

    fn rollback(&mut self, committed: Vec<(Oid, Value)>) -> Result<(), ()> {
        for (name, old) in committed.into_iter().rev() {
            match self.entries.get_mut(&name) {
                Some(entry) => {
                    if let MibObject::Scalar(v) = &mut entry.object {
                        *v = old;
                    } else {
                        return Err(());
                    }
                }
                None => return Err(()),
            }
        }
        Ok(())
    }
}

/// An access callback that grants everything; used where access control
/// has already been applied or is not configured.
pub fn allow_all(_: &Oid, _: Option<&Value>, _: usize, _: ViewType) -> Result<AccessDecision, SmiError> {
    Ok(AccessDecision::Granted)
}
