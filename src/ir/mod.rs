//! In-memory target IR produced by [`crate::builder::IrBuilder`].
//!
//! The IR is deliberately small: it has exactly the instructions the scope
//! and unwind lowering needs (calls, invokes, landing-pad plumbing, loads and
//! stores of implicit variables, branches and terminators). Every name is
//! interned in the [`CompilationSession`] arena.
//!
//! # Textual form
//!
//! ```text
//! declare @release
//! define @main personality @__exception_personality {
//! entry:
//!   %0 = alloca x
//!   %1 = invoke @may_throw() to label %cont.1 unwind label %lp.2
//! ...
//! }
//! ```

use crate::core::{CompilationSession, CompileError, CompileResult};
use hashbrown::HashMap;

pub mod printer;
pub mod verify;

pub use verify::{verify_function, verify_module};

/// Names of the runtime surface every module exposes.
pub mod runtime {
    /// Retrieves the in-flight exception object inside a landing pad.
    pub const EXCEPTION_INTRINSIC: &str = "llvm.eh.exception";
    /// Exception-type dispatch: `(exception, personality, class infos...)`.
    pub const SELECTOR_FUNCTION: &str = "llvm.eh.selector";
    /// Maps a class info to the selector value the dispatch compares against.
    pub const TYPEID_FUNCTION: &str = "llvm.eh.typeid.for";
    pub const PERSONALITY: &str = "__exception_personality";
    pub const EXCEPTION_NEW: &str = "__exception_new";
    pub const THROW: &str = "__throw";
    pub const RETHROW: &str = "__rethrow";
    pub const TERMINATE: &str = "__terminate";

    pub const ALL: [&str; 8] = [
        EXCEPTION_INTRINSIC,
        SELECTOR_FUNCTION,
        TYPEID_FUNCTION,
        PERSONALITY,
        EXCEPTION_NEW,
        THROW,
        RETHROW,
        TERMINATE,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub u32);

/// An operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// Result of an instruction in the current function.
    Inst(InstId),
    /// Address of a function.
    Func(FuncId),
    /// Address of a global (class info records).
    Global(GlobalId),
    /// The null pointer.
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst<'arena> {
    Alloca {
        name: &'arena str,
    },
    Call {
        callee: FuncId,
        args: Vec<Value>,
    },
    /// A call that doubles as an unwind edge.
    Invoke {
        callee: FuncId,
        args: Vec<Value>,
        normal: BlockId,
        unwind: BlockId,
    },
    PtrCast {
        value: Value,
    },
    /// Exception selector call whose class list is filled in once every catch
    /// clause of the owning try is known. `clauses` is `None` until then.
    Selector {
        callee: FuncId,
        exception: Value,
        personality: Value,
        clauses: Option<Vec<Value>>,
    },
    Load {
        slot: Value,
    },
    Store {
        value: Value,
        slot: Value,
    },
    ICmpEq {
        lhs: Value,
        rhs: Value,
    },
    Br {
        target: BlockId,
    },
    CondBr {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret,
    /// Continue unwinding with the in-flight exception.
    Resume,
    Unreachable,
}

impl Inst<'_> {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Inst::Invoke { .. }
                | Inst::Br { .. }
                | Inst::CondBr { .. }
                | Inst::Ret
                | Inst::Resume
                | Inst::Unreachable
        )
    }

    /// Whether the instruction produces a value that can be used as an operand.
    pub fn is_def(&self) -> bool {
        matches!(
            self,
            Inst::Alloca { .. }
                | Inst::Call { .. }
                | Inst::Invoke { .. }
                | Inst::PtrCast { .. }
                | Inst::Selector { .. }
                | Inst::Load { .. }
                | Inst::ICmpEq { .. }
        )
    }

    pub fn opcode(&self) -> &'static str {
        match self {
            Inst::Alloca { .. } => "alloca",
            Inst::Call { .. } => "call",
            Inst::Invoke { .. } => "invoke",
            Inst::PtrCast { .. } => "ptrcast",
            Inst::Selector { .. } => "selector",
            Inst::Load { .. } => "load",
            Inst::Store { .. } => "store",
            Inst::ICmpEq { .. } => "icmp",
            Inst::Br { .. } => "br",
            Inst::CondBr { .. } => "condbr",
            Inst::Ret => "ret",
            Inst::Resume => "resume",
            Inst::Unreachable => "unreachable",
        }
    }

    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Inst::Invoke { normal, unwind, .. } => vec![*normal, *unwind],
            Inst::Br { target } => vec![*target],
            Inst::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'arena> {
    pub name: &'arena str,
    pub insts: Vec<InstId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function<'arena> {
    pub name: &'arena str,
    pub declaration: bool,
    pub personality: Option<FuncId>,
    pub blocks: Vec<Block<'arena>>,
    pub insts: Vec<Inst<'arena>>,
}

impl<'arena> Function<'arena> {
    fn declaration(name: &'arena str) -> Self {
        Self {
            name,
            declaration: true,
            personality: None,
            blocks: Vec::new(),
            insts: Vec::new(),
        }
    }

    pub fn block(&self, id: BlockId) -> CompileResult<&Block<'arena>> {
        self.blocks
            .get(id.0 as usize)
            .ok_or(CompileError::UnknownBlock { block: id.0 })
    }

    pub fn inst(&self, id: InstId) -> &Inst<'arena> {
        &self.insts[id.0 as usize]
    }

    pub fn block_insts(&self, id: BlockId) -> impl Iterator<Item = &Inst<'arena>> + '_ {
        self.blocks[id.0 as usize]
            .insts
            .iter()
            .map(move |inst| &self.insts[inst.0 as usize])
    }

    pub fn terminator(&self, id: BlockId) -> Option<&Inst<'arena>> {
        let block = self.blocks.get(id.0 as usize)?;
        let last = block.insts.last()?;
        let inst = &self.insts[last.0 as usize];
        inst.is_terminator().then_some(inst)
    }

    pub fn is_terminated(&self, id: BlockId) -> bool {
        self.terminator(id).is_some()
    }

    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        self.terminator(id)
            .map(|inst| inst.successors())
            .unwrap_or_default()
    }

    /// Blocks whose name starts with `prefix`, in creation order.
    pub fn blocks_named(&self, prefix: &str) -> Vec<BlockId> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.name.starts_with(prefix))
            .map(|(idx, _)| BlockId(idx as u32))
            .collect()
    }

    /// Label used by the printer; unique within the function.
    pub fn block_label(&self, id: BlockId) -> String {
        let name = self.blocks[id.0 as usize].name;
        if id.0 == 0 {
            name.to_string()
        } else {
            format!("{}.{}", name, id.0)
        }
    }
}

/// A class info record referenced by selectors and typeid lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global<'arena> {
    pub name: &'arena str,
}

#[derive(Debug, Clone)]
pub struct Module<'arena> {
    pub name: &'arena str,
    pub functions: Vec<Function<'arena>>,
    pub globals: Vec<Global<'arena>>,
    func_index: HashMap<&'arena str, FuncId>,
    global_index: HashMap<&'arena str, GlobalId>,
}

impl<'arena> Module<'arena> {
    pub fn new(session: &CompilationSession<'arena>, name: &str) -> Self {
        Self {
            name: session.intern_str(name),
            functions: Vec::new(),
            globals: Vec::new(),
            func_index: HashMap::new(),
            global_index: HashMap::new(),
        }
    }

    /// Create a module with the exception runtime already declared.
    pub fn with_runtime(session: &CompilationSession<'arena>, name: &str) -> Self {
        let mut module = Self::new(session, name);
        for name in runtime::ALL {
            module.declare_function(session, name);
        }
        module
    }

    /// Declare a function, returning the existing id if the name is known.
    pub fn declare_function(&mut self, session: &CompilationSession<'arena>, name: &str) -> FuncId {
        if let Some(&id) = self.func_index.get(name) {
            return id;
        }
        let name = session.intern_str(name);
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(Function::declaration(name));
        self.func_index.insert(name, id);
        id
    }

    /// Turn a (possibly new) declaration into an empty definition.
    pub fn define_function(
        &mut self,
        session: &CompilationSession<'arena>,
        name: &str,
    ) -> CompileResult<FuncId> {
        let id = self.declare_function(session, name);
        let func = &mut self.functions[id.0 as usize];
        if !func.declaration {
            return Err(CompileError::InvalidValue {
                reason: format!("function {} is already defined", name),
            });
        }
        func.declaration = false;
        Ok(id)
    }

    pub fn lookup_function(&self, name: &str) -> Option<FuncId> {
        self.func_index.get(name).copied()
    }

    pub fn function(&self, id: FuncId) -> &Function<'arena> {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function<'arena> {
        &mut self.functions[id.0 as usize]
    }

    /// Look up a function definition by name.
    pub fn function_named(&self, name: &str) -> Option<&Function<'arena>> {
        self.lookup_function(name).map(|id| self.function(id))
    }

    pub fn get_or_insert_global(&mut self, session: &CompilationSession<'arena>, name: &str) -> GlobalId {
        if let Some(&id) = self.global_index.get(name) {
            return id;
        }
        let name = session.intern_str(name);
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(Global { name });
        self.global_index.insert(name, id);
        id
    }

    pub fn lookup_global(&self, name: &str) -> Option<GlobalId> {
        self.global_index.get(name).copied()
    }

    pub fn global(&self, id: GlobalId) -> &Global<'arena> {
        &self.globals[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn test_runtime_declarations() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let module = Module::with_runtime(&session, "m");

        for name in runtime::ALL {
            let id = module.lookup_function(name).unwrap();
            assert!(module.function(id).declaration);
        }
        assert!(module.lookup_function("missing").is_none());
    }

    #[test]
    fn test_define_function_twice() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut module = Module::new(&session, "m");

        let decl = module.declare_function(&session, "f");
        let def = module.define_function(&session, "f").unwrap();
        assert_eq!(decl, def);
        assert!(!module.function(def).declaration);
        assert!(module.define_function(&session, "f").is_err());
    }

    #[test]
    fn test_terminator_info() {
        assert!(Inst::Resume.is_terminator());
        assert!(!Inst::Ret.is_def());
        let invoke = Inst::Invoke {
            callee: FuncId(0),
            args: vec![],
            normal: BlockId(1),
            unwind: BlockId(2),
        };
        assert!(invoke.is_terminator());
        assert!(invoke.is_def());
        assert_eq!(invoke.successors(), vec![BlockId(1), BlockId(2)]);
    }
}
