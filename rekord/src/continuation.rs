//! Suspend/resume contract with the host evaluator.
//!
//! Whenever this layer needs user code to run (a property guard, a property
//! derivation, a constructor guard, an arity-string renderer) it does not
//! call it. It returns [`Step::Call`] holding the procedure, its arguments
//! and a boxed [`Resume`] state that knows how to continue once the results
//! are known. The host decides when and how that happens. Dropping a step
//! abandons the work it describes; nothing half-built is ever published.

use crate::{Value, error::Result};

pub type Continuation = Box<dyn Resume>;

/// A suspended computation waiting for the results of a host call.
pub trait Resume: Send {
    fn resume(self: Box<Self>, results: Vec<Value>) -> Result<Step>;
}

impl<F> Resume for F
where
    F: FnOnce(Vec<Value>) -> Result<Step> + Send,
{
    fn resume(self: Box<Self>, results: Vec<Value>) -> Result<Step> {
        (*self)(results)
    }
}

pub enum Step {
    /// Finished with these results.
    Return(Vec<Value>),
    /// Apply `procedure` to `args`, then feed its results to `then`.
    Call {
        procedure: Value,
        args: Vec<Value>,
        then: Continuation,
    },
}

struct Compose {
    first: Continuation,
    next: Continuation,
}

impl Resume for Compose {
    fn resume(self: Box<Self>, results: Vec<Value>) -> Result<Step> {
        self.first.resume(results)?.and_then(self.next)
    }
}

impl Step {
    pub fn value(value: Value) -> Self {
        Step::Return(vec![value])
    }

    pub fn call(
        procedure: Value,
        args: Vec<Value>,
        then: impl Resume + 'static,
    ) -> Self {
        Step::Call {
            procedure,
            args,
            then: Box::new(then),
        }
    }

    /// A call whose results are the results of the whole step.
    pub fn tail_call(procedure: Value, args: Vec<Value>) -> Self {
        Self::call(procedure, args, |results: Vec<Value>| -> Result<Step> {
            Ok(Step::Return(results))
        })
    }

    /// Sequences `next` after this step.
    pub fn and_then(self, next: Continuation) -> Result<Step> {
        match self {
            Step::Return(results) => next.resume(results),
            Step::Call {
                procedure,
                args,
                then,
            } => Ok(Step::Call {
                procedure,
                args,
                then: Box::new(Compose { first: then, next }),
            }),
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Step::Call { .. })
    }
}

/// Extracts the single result of a host call.
pub fn single_value(context: &str, mut results: Vec<Value>) -> Result<Value> {
    if results.len() != 1 {
        return Err(crate::StructError::ResultCount {
            context: context.to_owned(),
            expected: 1,
            given: results.len(),
        });
    }
    Ok(results.swap_remove(0))
}

/// The host evaluator capability: invoke a procedure and resume with its
/// results.
pub trait Host {
    /// Applies `procedure` to `args` and returns its results. The default
    /// runs everything this crate can express directly.
    fn apply(&mut self, procedure: &Value, args: Vec<Value>) -> Result<Vec<Value>> {
        let step = procedure.apply(args)?;
        self.run(step)
    }

    /// Trampoline: drives `step` until it returns.
    fn run(&mut self, mut step: Step) -> Result<Vec<Value>> {
        loop {
            match step {
                Step::Return(results) => return Ok(results),
                Step::Call {
                    procedure,
                    args,
                    then,
                } => {
                    log::trace!("suspending into {procedure} with {} args", args.len());
                    let results = self.apply(&procedure, args)?;
                    step = then.resume(results)?;
                }
            }
        }
    }
}

/// A host with no evaluator of its own: native procedures and struct
/// capabilities are applied in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectHost;

impl Host for DirectHost {}
