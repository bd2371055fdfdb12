//! Link pass: resolve labels, call targets and string literals.
//!
//! Runs once per program after every function is compiled. Function bodies
//! are concatenated in declaration order; per-function labels are resolved
//! by a single forward scan from each `FUNC` marker, string literals are
//! interned into the program's NUL-separated byte pool, and named calls are
//! rewritten to absolute targets in a second pass.

use std::collections::HashMap;

use crate::decl::{FnStore, FuncId};
use crate::error::CompileError;
use crate::opcode::Opcode;
use crate::symbol::SymbolTable;

pub(crate) struct LinkOutput {
    pub opcodes: Vec<Opcode>,
    pub strings: Vec<u8>,
    pub func_label_map: HashMap<String, usize>,
}

/// Link the intermediate opcode streams of every function visible to a
/// program's symbol table.
pub(crate) fn link(
    fn_ids: &[FuncId],
    fns: &FnStore,
    syms: &SymbolTable,
) -> Result<LinkOutput, CompileError> {
    let mut intermediate: Vec<&Opcode> = Vec::new();
    for &fid in fn_ids {
        intermediate.extend(fns.get(fid).opcodes.iter());
    }

    let mut out: Vec<Opcode> = Vec::new();
    let mut strings: Vec<u8> = Vec::new();
    let mut func_label_map: HashMap<String, usize> = HashMap::new();
    let mut labels: Vec<usize> = Vec::new();

    for (i, op) in intermediate.iter().enumerate() {
        match op {
            Opcode::Func(name) => {
                func_label_map.insert(name.clone(), out.len());

                // forward scan: map this function's labels to absolute indices
                labels.clear();
                let mut line = out.len();
                for ahead in &intermediate[i + 1..] {
                    match ahead {
                        Opcode::Label(label) => {
                            let idx = *label as usize;
                            if idx >= labels.len() {
                                labels.resize(idx + 1, usize::MAX);
                            }
                            labels[idx] = line;
                        }
                        Opcode::Func(_) => break,
                        _ => line += 1,
                    }
                }
            }
            Opcode::Label(_) => {}
            Opcode::JmpLabel(label) => out.push(Opcode::Jmp(labels[*label as usize])),
            Opcode::JfLabel(label) => out.push(Opcode::Jf(labels[*label as usize])),
            Opcode::StringLiteral(s) => {
                let pos = intern_string(&mut strings, s);
                out.push(Opcode::Int(pos as i32));
            }
            other => out.push((*other).clone()),
        }
    }

    // second pass: rewrite named calls into absolute targets
    for op in &mut out {
        if let Opcode::CallByName(name) = op {
            let target = func_label_map
                .get(name.as_str())
                .copied()
                .ok_or_else(|| CompileError::UnresolvedFunction { name: name.clone() })?;
            let fid = syms
                .get_function(name)
                .ok_or_else(|| CompileError::UnresolvedFunction { name: name.clone() })?;
            let args_size = fns.get(fid).args_size;
            *op = Opcode::Call { target, args_size };
        }
    }

    Ok(LinkOutput {
        opcodes: out,
        strings,
        func_label_map,
    })
}

/// Append a NUL-terminated string to the pool, returning its byte offset.
fn intern_string(pool: &mut Vec<u8>, s: &str) -> usize {
    let pos = pool.len();
    pool.extend_from_slice(s.as_bytes());
    pool.push(0);
    pos
}
