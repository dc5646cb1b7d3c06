//! Deferred exception-type dispatch for try statements.
//!
//! A landing pad inside a try body is built as soon as the first throwing
//! call needs it, long before the try's catch clauses have all been compiled.
//! The selector call it contains is therefore created incomplete and parked in
//! the try's [`CatchData`]; [`CatchData::complete`] patches every parked
//! selector with the final clause list once the try statement ends.

use crate::builder::Builder;
use crate::core::{CompileError, CompileResult};
use crate::ir::{BlockId, Value};

/// A selector whose class list is not known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncompleteCatchSelector {
    /// The selector instruction.
    pub value: Value,
    /// Landing pad the selector lives in.
    pub block: BlockId,
}

/// One `catch` clause of a try statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchClause {
    pub class: String,
    /// Class info handed to the selector and typeid lookups.
    pub info: Value,
    /// Entry block of the clause body.
    pub block: BlockId,
}

/// Catch bookkeeping owned by a try statement.
#[derive(Debug, Default)]
pub struct CatchData {
    selectors: Vec<IncompleteCatchSelector>,
    clauses: Vec<CatchClause>,
    completed: bool,
}

impl CatchData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_selector(&mut self, selector: IncompleteCatchSelector) -> CompileResult<()> {
        if self.completed {
            return Err(CompileError::SelectorAlreadyComplete);
        }
        self.selectors.push(selector);
        Ok(())
    }

    pub fn add_clause(&mut self, clause: CatchClause) -> CompileResult<()> {
        if self.completed {
            return Err(CompileError::frame_stack(format!(
                "catch {} added after its try statement ended",
                clause.class
            )));
        }
        self.clauses.push(clause);
        Ok(())
    }

    pub fn selectors(&self) -> &[IncompleteCatchSelector] {
        &self.selectors
    }

    pub fn clauses(&self) -> &[CatchClause] {
        &self.clauses
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Class infos in clause order.
    pub fn class_infos(&self) -> Vec<Value> {
        self.clauses.iter().map(|c| c.info).collect()
    }

    /// Patch every pending selector with the clause list. Returns how many
    /// selectors were completed.
    pub fn complete(&mut self, builder: &mut dyn Builder) -> CompileResult<usize> {
        if self.completed {
            return Err(CompileError::SelectorAlreadyComplete);
        }
        let infos = self.class_infos();
        for selector in &self.selectors {
            builder.complete_selector(selector.value, &infos)?;
        }
        self.completed = true;
        Ok(self.selectors.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MockBuilder;
    use crate::ir::InstId;

    #[test]
    fn test_complete_once() {
        let mut builder = MockBuilder::new();
        let mut data = CatchData::new();
        data.add_selector(IncompleteCatchSelector {
            value: Value::Inst(InstId(3)),
            block: BlockId(1),
        })
        .unwrap();
        data.add_clause(CatchClause {
            class: "Error".to_string(),
            info: Value::Null,
            block: BlockId(2),
        })
        .unwrap();

        assert_eq!(data.complete(&mut builder).unwrap(), 1);
        assert!(data.is_complete());
        assert_eq!(builder.ops, vec!["complete selector 1"]);

        assert_eq!(
            data.complete(&mut builder),
            Err(CompileError::SelectorAlreadyComplete)
        );
        assert!(data
            .add_selector(IncompleteCatchSelector {
                value: Value::Null,
                block: BlockId(4),
            })
            .is_err());
    }
}
