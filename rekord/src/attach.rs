//! Property attachment.
//!
//! Runs once per struct type, after its skeleton is built. Declared
//! properties are flattened into a worklist in which every property is
//! followed by the super properties it implies, so a derived entry always
//! comes after the entry it derives from. The worklist is then walked; any
//! entry needing user code (a derivation or a property guard) suspends into
//! the host and resumes at the same index. Supers' properties are inherited
//! last and the result is published on the type in one go.

use std::sync::Arc;

use crate::{
    PROP_CHECKED_PROCEDURE, PROP_PROCEDURE, ProcSpec, Resume, Step, StructError,
    StructProperty, StructType, Value,
    continuation::single_value,
    error::Result,
    struct_type::{ProcedureBinding, ResolvedProperties},
};

struct Entry {
    property: Arc<StructProperty>,
    value: Value,
    /// The property whose attached value `value` is a derivation of.
    derived_from: Option<Arc<StructProperty>>,
}

pub(crate) struct PropertyAttachment {
    ty: Arc<StructType>,
    entries: Vec<Entry>,
    index: usize,
    checked: bool,
    attached: Vec<(Arc<StructProperty>, Value)>,
    procedure: Option<ProcSpec>,
}

/// Starts attaching `declared` (and `proc_spec`, as an implicit
/// `prop:procedure` entry) to `ty`. The final step returns the five values
/// of [`crate::StructTypeDefinition::to_values`].
pub(crate) fn begin(
    ty: Arc<StructType>,
    declared: &[(Arc<StructProperty>, Value)],
    proc_spec: Option<Value>,
) -> Result<Step> {
    PropertyAttachment::flatten(ty, declared, proc_spec)?.attach()
}

fn push_entry(
    entries: &mut Vec<Entry>,
    property: &Arc<StructProperty>,
    value: Value,
    derived_from: Option<Arc<StructProperty>>,
) {
    entries.push(Entry {
        property: property.clone(),
        value,
        derived_from,
    });
    for (sup, derive) in property.supers() {
        push_entry(entries, sup, derive.clone(), Some(property.clone()));
    }
}

impl PropertyAttachment {
    fn flatten(
        ty: Arc<StructType>,
        declared: &[(Arc<StructProperty>, Value)],
        proc_spec: Option<Value>,
    ) -> Result<Self> {
        let duplicate = |property: &StructProperty| StructError::DuplicatePropertyBinding {
            type_name: ty.name().to_string(),
            property: property.name().to_string(),
        };

        let mut procedures = usize::from(proc_spec.is_some());
        let mut entries = Vec::with_capacity(declared.len() + 1);
        for (property, value) in declared {
            if property.is_a(&PROP_PROCEDURE) {
                procedures += 1;
                if procedures > 1 {
                    return Err(duplicate(&**PROP_PROCEDURE));
                }
            }
            if property.is_a(&PROP_CHECKED_PROCEDURE) && ty.total_field_count() < 2 {
                return Err(StructError::InsufficientFieldsForCheckedProcedure {
                    type_name: ty.name().to_string(),
                    fields: ty.total_field_count(),
                });
            }
            push_entry(&mut entries, property, value.clone(), None);
        }
        if let Some(spec) = proc_spec {
            push_entry(&mut entries, &PROP_PROCEDURE, spec, None);
        }

        Ok(Self {
            ty,
            entries,
            index: 0,
            checked: false,
            attached: Vec::new(),
            procedure: None,
        })
    }

    fn attached_value(&self, property: &StructProperty) -> Option<&Value> {
        self.attached
            .iter()
            .find(|(p, _)| std::ptr::eq(&**p, property))
            .map(|(_, value)| value)
    }

    fn attach(mut self) -> Result<Step> {
        while let Some(entry) = self.entries.get(self.index) {
            if let Some(source) = &entry.derived_from {
                if let Some(input) = self.attached_value(source).cloned() {
                    log::trace!(
                        "{}: deriving {} from {}",
                        self.ty.name(),
                        entry.property.name(),
                        source.name()
                    );
                    let derive = entry.value.clone();
                    return Ok(Step::call(derive, vec![input], SaveProperty {
                        state: self,
                        checked: false,
                    }));
                }
            }

            if !self.checked {
                if let Some(guard) = entry.property.guard().cloned() {
                    log::trace!(
                        "{}: running guard of {}",
                        self.ty.name(),
                        entry.property.name()
                    );
                    let info = Value::list(self.ty.reflective_info().to_values());
                    let args = vec![entry.value.clone(), info];
                    return Ok(Step::call(guard, args, SaveProperty {
                        state: self,
                        checked: true,
                    }));
                }
            }

            let property = entry.property.clone();
            let value = entry.value.clone();
            self.finalize(property, value)?;
            self.index += 1;
            self.checked = false;
        }
        self.inherit()
    }

    fn finalize(&mut self, property: Arc<StructProperty>, value: Value) -> Result<()> {
        if let Some(existing) = self.attached_value(&property) {
            if *existing == value {
                return Ok(());
            }
            return Err(StructError::DuplicatePropertyBinding {
                type_name: self.ty.name().to_string(),
                property: property.name().to_string(),
            });
        }
        if Arc::ptr_eq(&property, &*PROP_PROCEDURE) {
            let spec = ProcSpec::from_value(value.clone())?;
            if let ProcSpec::Field(index) = spec {
                if index >= self.ty.init_field_count() {
                    return Err(StructError::FieldIndexOutOfRange {
                        type_name: self.ty.name().to_string(),
                        index,
                        count: self.ty.init_field_count(),
                    });
                }
            }
            self.procedure = Some(spec);
        }
        self.attached.push((property, value));
        Ok(())
    }

    fn inherit(self) -> Result<Step> {
        let PropertyAttachment {
            ty,
            mut attached,
            procedure,
            ..
        } = self;

        let procedure = match procedure {
            Some(spec) => Some(ProcedureBinding {
                spec,
                source: ty.id(),
            }),
            None => ty
                .super_type()
                .and_then(|sup| sup.procedure().cloned()),
        };
        if let Some(sup) = ty.super_type() {
            attached.extend(sup.properties().iter().cloned());
        }

        if !ty.publish(ResolvedProperties {
            properties: attached,
            procedure,
        }) {
            log::debug!("{} was finalized concurrently; keeping the first", ty.name());
        }
        log::debug!(
            "defined struct type {} ({} fields, {} properties)",
            ty.name(),
            ty.total_field_count(),
            ty.properties().len()
        );
        Ok(Step::Return(ty.definition().to_values()))
    }
}

/// Resumes attachment with the result of a guard or derivation call.
struct SaveProperty {
    state: PropertyAttachment,
    checked: bool,
}

impl Resume for SaveProperty {
    fn resume(self: Box<Self>, results: Vec<Value>) -> Result<Step> {
        let SaveProperty { mut state, checked } = *self;
        let context = match state.entries.get(state.index) {
            Some(entry) => format!("{} guard", entry.property.name()),
            None => "property guard".to_owned(),
        };
        let value = single_value(&context, results)?;
        if let Some(entry) = state.entries.get_mut(state.index) {
            entry.value = value;
            entry.derived_from = None;
        }
        state.checked = checked;
        state.attach()
    }
}
