//! Textual printing of [`Module`]s.

use super::{Function, Inst, Module, Value};
use std::fmt::{self, Write};

impl Module<'_> {
    fn value_name(&self, value: Value) -> String {
        match value {
            Value::Inst(id) => format!("%{}", id.0),
            Value::Func(id) => format!("@{}", self.function(id).name),
            Value::Global(id) => format!("@{}", self.global(id).name),
            Value::Null => "null".to_string(),
        }
    }

    fn value_list(&self, values: &[Value]) -> String {
        values
            .iter()
            .map(|v| self.value_name(*v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn print_inst(&self, func: &Function, id: usize, inst: &Inst, out: &mut String) -> fmt::Result {
        write!(out, "  ")?;
        if inst.is_def() {
            write!(out, "%{} = ", id)?;
        }
        match inst {
            Inst::Alloca { name } => write!(out, "alloca {}", name),
            Inst::Call { callee, args } => write!(
                out,
                "call @{}({})",
                self.function(*callee).name,
                self.value_list(args)
            ),
            Inst::Invoke {
                callee,
                args,
                normal,
                unwind,
            } => write!(
                out,
                "invoke @{}({}) to label %{} unwind label %{}",
                self.function(*callee).name,
                self.value_list(args),
                func.block_label(*normal),
                func.block_label(*unwind)
            ),
            Inst::PtrCast { value } => write!(out, "ptrcast {}", self.value_name(*value)),
            Inst::Selector {
                callee,
                exception,
                personality,
                clauses,
            } => {
                write!(
                    out,
                    "selector @{}({}, {})",
                    self.function(*callee).name,
                    self.value_name(*exception),
                    self.value_name(*personality)
                )?;
                match clauses {
                    Some(clauses) => write!(out, " [{}]", self.value_list(clauses)),
                    None => write!(out, " <incomplete>"),
                }
            }
            Inst::Load { slot } => write!(out, "load {}", self.value_name(*slot)),
            Inst::Store { value, slot } => write!(
                out,
                "store {}, {}",
                self.value_name(*value),
                self.value_name(*slot)
            ),
            Inst::ICmpEq { lhs, rhs } => write!(
                out,
                "icmp eq {}, {}",
                self.value_name(*lhs),
                self.value_name(*rhs)
            ),
            Inst::Br { target } => write!(out, "br label %{}", func.block_label(*target)),
            Inst::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(
                out,
                "condbr {}, label %{}, label %{}",
                self.value_name(*cond),
                func.block_label(*then_block),
                func.block_label(*else_block)
            ),
            Inst::Ret => write!(out, "ret"),
            Inst::Resume => write!(out, "resume"),
            Inst::Unreachable => write!(out, "unreachable"),
        }?;
        out.push('\n');
        Ok(())
    }

    /// Print a single function.
    pub fn print_function(&self, func: &Function) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_function(func, &mut out);
        out
    }

    fn write_function(&self, func: &Function, out: &mut String) -> fmt::Result {
        if func.declaration {
            return writeln!(out, "declare @{}", func.name);
        }

        write!(out, "define @{}", func.name)?;
        if let Some(personality) = func.personality {
            write!(out, " personality @{}", self.function(personality).name)?;
        }
        writeln!(out, " {{")?;

        for (idx, block) in func.blocks.iter().enumerate() {
            writeln!(out, "{}:", func.block_label(super::BlockId(idx as u32)))?;
            for inst_id in &block.insts {
                let inst = &func.insts[inst_id.0 as usize];
                self.print_inst(func, inst_id.0 as usize, inst, out)?;
            }
        }
        writeln!(out, "}}")
    }

    /// Print only function definitions, skipping the runtime declarations.
    pub fn print_definitions(&self) -> String {
        self.functions
            .iter()
            .filter(|f| !f.declaration)
            .map(|f| self.print_function(f))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Module<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for global in &self.globals {
            writeln!(f, "@{} = classinfo", global.name)?;
        }
        for func in self.functions.iter().filter(|func| func.declaration) {
            write!(f, "{}", self.print_function(func))?;
        }
        for func in self.functions.iter().filter(|func| !func.declaration) {
            write!(f, "\n{}", self.print_function(func))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Block, BlockId, FuncId, InstId};
    use super::*;
    use crate::core::CompilationSession;
    use bumpalo::Bump;

    #[test]
    fn test_print_function() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut module = Module::new(&session, "m");
        let callee = module.declare_function(&session, "f");
        let id = module.define_function(&session, "main").unwrap();

        let func = module.function_mut(id);
        func.insts.push(Inst::Invoke {
            callee,
            args: vec![Value::Null],
            normal: BlockId(1),
            unwind: BlockId(1),
        });
        func.insts.push(Inst::Ret);
        func.blocks.push(Block {
            name: session.intern_str("entry"),
            insts: vec![InstId(0)],
        });
        func.blocks.push(Block {
            name: session.intern_str("cont"),
            insts: vec![InstId(1)],
        });

        let text = module.print_function(module.function(id));
        assert_eq!(
            text,
            "define @main {\nentry:\n  %0 = invoke @f(null) to label %cont.1 unwind label %cont.1\ncont.1:\n  ret\n}\n"
        );
        assert!(module.to_string().contains("declare @f"));
        assert_eq!(module.function(FuncId(0)).name, "f");
    }
}
