//! The `.wamb` bytecode file format.
//!
//! Magic `b"WAMB"`, a u32 version, a u32 code length, the code itself,
//! then the atom interner and call-point tables, all little-endian and
//! length-prefixed — a fixed byte layout, not a self-describing format,
//! so this is hand-rolled `Read`/`Write` rather than a serde codec (the
//! crate's `serde`/`serde_json` dependency is reserved for the CLI's
//! `--emit-json` debug dump instead).

use crate::instr::{Const, Instr, VarSlot};
use crate::intern::{FunctorId, FunctorTable, Interner};
use crate::module::{CompilerOptions, Linkage, Module};
use std::collections::HashMap;
use std::io::{self, Read, Write};

const MAGIC: &[u8; 4] = b"WAMB";
const VERSION: u32 = 1;

fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn write_i64<W: Write>(w: &mut W, v: i64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_i64<R: Read>(r: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_str<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    write_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn read_str<R: Read>(r: &mut R) -> io::Result<String> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_var_slot<W: Write>(w: &mut W, slot: VarSlot) -> io::Result<()> {
    match slot {
        VarSlot::Temp(r) => {
            write_u8(w, 0)?;
            write_u8(w, r)
        }
        VarSlot::Perm(y) => {
            write_u8(w, 1)?;
            write_u8(w, y)
        }
    }
}

fn read_var_slot<R: Read>(r: &mut R) -> io::Result<VarSlot> {
    match read_u8(r)? {
        0 => Ok(VarSlot::Temp(read_u8(r)?)),
        1 => Ok(VarSlot::Perm(read_u8(r)?)),
        tag => Err(io::Error::new(io::ErrorKind::InvalidData, format!("bad VarSlot tag {tag}"))),
    }
}

fn write_const<W: Write>(w: &mut W, c: Const) -> io::Result<()> {
    match c {
        Const::Atom(sym) => {
            write_u8(w, 0)?;
            write_u32(w, sym.index() as u32)
        }
        Const::Int(v) => {
            write_u8(w, 1)?;
            write_i64(w, v)
        }
        Const::Real(bits) => {
            write_u8(w, 2)?;
            write_u64(w, bits)
        }
    }
}

fn read_const<R: Read>(r: &mut R) -> io::Result<Const> {
    match read_u8(r)? {
        // The index is wrapped as a `Symbol` directly rather than resolved
        // here: the atom table is written after the code section, so the interner that index refers to isn't built yet
        // during this read. It resolves correctly once `read_module`
        // finishes loading the atom table into the same dense order.
        0 => Ok(Const::Atom(crate::intern::Symbol::from_index(read_u32(r)?))),
        1 => Ok(Const::Int(read_i64(r)?)),
        2 => Ok(Const::Real(read_u64(r)?)),
        tag => Err(io::Error::new(io::ErrorKind::InvalidData, format!("bad Const tag {tag}"))),
    }
}

fn write_functor<W: Write>(w: &mut W, f: FunctorId) -> io::Result<()> {
    write_u32(w, f.raw())
}

fn read_functor<R: Read>(r: &mut R) -> io::Result<FunctorId> {
    Ok(FunctorId::from_raw(read_u32(r)?))
}

fn write_instr<W: Write>(w: &mut W, instr: &Instr) -> io::Result<()> {
    match instr {
        Instr::GetVar { xn, ai } => {
            write_u8(w, 0)?;
            write_var_slot(w, *xn)?;
            write_u8(w, *ai)
        }
        Instr::GetVal { xn, ai } => {
            write_u8(w, 1)?;
            write_var_slot(w, *xn)?;
            write_u8(w, *ai)
        }
        Instr::GetConst { c, ai } => {
            write_u8(w, 2)?;
            write_const(w, *c)?;
            write_u8(w, *ai)
        }
        Instr::GetStruc { f, ai } => {
            write_u8(w, 3)?;
            write_functor(w, *f)?;
            write_u8(w, *ai)
        }
        Instr::GetList { ai } => {
            write_u8(w, 4)?;
            write_u8(w, *ai)
        }
        Instr::UnifyVar { xn } => {
            write_u8(w, 5)?;
            write_var_slot(w, *xn)
        }
        Instr::UnifyVal { xn } => {
            write_u8(w, 6)?;
            write_var_slot(w, *xn)
        }
        Instr::UnifyLocalVal { yn } => {
            write_u8(w, 7)?;
            write_u8(w, *yn)
        }
        Instr::UnifyConst { c } => {
            write_u8(w, 8)?;
            write_const(w, *c)
        }
        Instr::UnifyVoid { n } => {
            write_u8(w, 9)?;
            write_u8(w, *n)
        }
        Instr::PutVar { xn, ai } => {
            write_u8(w, 10)?;
            write_var_slot(w, *xn)?;
            write_u8(w, *ai)
        }
        Instr::PutVal { xn, ai } => {
            write_u8(w, 11)?;
            write_var_slot(w, *xn)?;
            write_u8(w, *ai)
        }
        Instr::PutUnsafeValue { yn, ai } => {
            write_u8(w, 12)?;
            write_u8(w, *yn)?;
            write_u8(w, *ai)
        }
        Instr::PutStruc { f, ai } => {
            write_u8(w, 13)?;
            write_functor(w, *f)?;
            write_u8(w, *ai)
        }
        Instr::PutList { ai } => {
            write_u8(w, 14)?;
            write_u8(w, *ai)
        }
        Instr::PutConst { c, ai } => {
            write_u8(w, 15)?;
            write_const(w, *c)?;
            write_u8(w, *ai)
        }
        Instr::SetVar { xn } => {
            write_u8(w, 16)?;
            write_var_slot(w, *xn)
        }
        Instr::SetVal { xn } => {
            write_u8(w, 17)?;
            write_var_slot(w, *xn)
        }
        Instr::SetLocalValue { yn } => {
            write_u8(w, 18)?;
            write_u8(w, *yn)
        }
        Instr::SetConst { c } => {
            write_u8(w, 19)?;
            write_const(w, *c)
        }
        Instr::SetVoid { n } => {
            write_u8(w, 20)?;
            write_u8(w, *n)
        }
        Instr::Call { entry, nvars, arity } => {
            write_u8(w, 21)?;
            write_u32(w, *entry)?;
            write_u8(w, *nvars)?;
            write_u8(w, *arity)
        }
        Instr::CallIndirect { nvars } => {
            write_u8(w, 22)?;
            write_u8(w, *nvars)
        }
        Instr::Execute { entry, arity } => {
            write_u8(w, 23)?;
            write_u32(w, *entry)?;
            write_u8(w, *arity)
        }
        Instr::ExecuteIndirect => write_u8(w, 24),
        Instr::Proceed => write_u8(w, 25),
        Instr::Allocate { n } => {
            write_u8(w, 26)?;
            write_u8(w, *n)
        }
        Instr::Deallocate => write_u8(w, 27),
        Instr::Fail => write_u8(w, 28),
        Instr::Jump { target } => {
            write_u8(w, 29)?;
            write_u32(w, *target)
        }
        Instr::Suspend => write_u8(w, 30),
        Instr::TryMeElse { alt } => {
            write_u8(w, 31)?;
            write_u32(w, *alt)
        }
        Instr::RetryMeElse { alt } => {
            write_u8(w, 32)?;
            write_u32(w, *alt)
        }
        Instr::TrustMe => write_u8(w, 33),
        Instr::Try { alt } => {
            write_u8(w, 34)?;
            write_u32(w, *alt)
        }
        Instr::Retry { alt } => {
            write_u8(w, 35)?;
            write_u32(w, *alt)
        }
        Instr::Trust { alt } => {
            write_u8(w, 36)?;
            write_u32(w, *alt)
        }
        Instr::SwitchOnTerm { on_var, on_const, on_list, on_struct } => {
            write_u8(w, 37)?;
            write_u32(w, *on_var)?;
            write_u32(w, *on_const)?;
            write_u32(w, *on_list)?;
            write_u32(w, *on_struct)
        }
        Instr::SwitchOnConst { table } => {
            write_u8(w, 38)?;
            write_u32(w, table.len() as u32)?;
            for (c, addr) in table {
                write_const(w, *c)?;
                write_u32(w, *addr)?;
            }
            Ok(())
        }
        Instr::SwitchOnStruc { table } => {
            write_u8(w, 39)?;
            write_u32(w, table.len() as u32)?;
            for (f, addr) in table {
                write_functor(w, *f)?;
                write_u32(w, *addr)?;
            }
            Ok(())
        }
        Instr::NeckCut => write_u8(w, 40),
        Instr::GetLevel { yn } => {
            write_u8(w, 41)?;
            write_u8(w, *yn)
        }
        Instr::Cut { yn } => {
            write_u8(w, 42)?;
            write_u8(w, *yn)
        }
    }
}

fn read_instr<R: Read>(r: &mut R) -> io::Result<Instr> {
    let tag = read_u8(r)?;
    Ok(match tag {
        0 => Instr::GetVar { xn: read_var_slot(r)?, ai: read_u8(r)? },
        1 => Instr::GetVal { xn: read_var_slot(r)?, ai: read_u8(r)? },
        2 => Instr::GetConst { c: read_const(r)?, ai: read_u8(r)? },
        3 => Instr::GetStruc { f: read_functor(r)?, ai: read_u8(r)? },
        4 => Instr::GetList { ai: read_u8(r)? },
        5 => Instr::UnifyVar { xn: read_var_slot(r)? },
        6 => Instr::UnifyVal { xn: read_var_slot(r)? },
        7 => Instr::UnifyLocalVal { yn: read_u8(r)? },
        8 => Instr::UnifyConst { c: read_const(r)? },
        9 => Instr::UnifyVoid { n: read_u8(r)? },
        10 => Instr::PutVar { xn: read_var_slot(r)?, ai: read_u8(r)? },
        11 => Instr::PutVal { xn: read_var_slot(r)?, ai: read_u8(r)? },
        12 => Instr::PutUnsafeValue { yn: read_u8(r)?, ai: read_u8(r)? },
        13 => Instr::PutStruc { f: read_functor(r)?, ai: read_u8(r)? },
        14 => Instr::PutList { ai: read_u8(r)? },
        15 => Instr::PutConst { c: read_const(r)?, ai: read_u8(r)? },
        16 => Instr::SetVar { xn: read_var_slot(r)? },
        17 => Instr::SetVal { xn: read_var_slot(r)? },
        18 => Instr::SetLocalValue { yn: read_u8(r)? },
        19 => Instr::SetConst { c: read_const(r)? },
        20 => Instr::SetVoid { n: read_u8(r)? },
        21 => Instr::Call { entry: read_u32(r)?, nvars: read_u8(r)?, arity: read_u8(r)? },
        22 => Instr::CallIndirect { nvars: read_u8(r)? },
        23 => Instr::Execute { entry: read_u32(r)?, arity: read_u8(r)? },
        24 => Instr::ExecuteIndirect,
        25 => Instr::Proceed,
        26 => Instr::Allocate { n: read_u8(r)? },
        27 => Instr::Deallocate,
        28 => Instr::Fail,
        29 => Instr::Jump { target: read_u32(r)? },
        30 => Instr::Suspend,
        31 => Instr::TryMeElse { alt: read_u32(r)? },
        32 => Instr::RetryMeElse { alt: read_u32(r)? },
        33 => Instr::TrustMe,
        34 => Instr::Try { alt: read_u32(r)? },
        35 => Instr::Retry { alt: read_u32(r)? },
        36 => Instr::Trust { alt: read_u32(r)? },
        37 => Instr::SwitchOnTerm {
            on_var: read_u32(r)?,
            on_const: read_u32(r)?,
            on_list: read_u32(r)?,
            on_struct: read_u32(r)?,
        },
        38 => {
            let n = read_u32(r)?;
            let mut table = Vec::with_capacity(n as usize);
            for _ in 0..n {
                table.push((read_const(r)?, read_u32(r)?));
            }
            Instr::SwitchOnConst { table }
        }
        39 => {
            let n = read_u32(r)?;
            let mut table = Vec::with_capacity(n as usize);
            for _ in 0..n {
                table.push((read_functor(r)?, read_u32(r)?));
            }
            Instr::SwitchOnStruc { table }
        }
        40 => Instr::NeckCut,
        41 => Instr::GetLevel { yn: read_u8(r)? },
        42 => Instr::Cut { yn: read_u8(r)? },
        tag => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("bad opcode {tag}"))),
    })
}

/// Writes `module` in the `.wamb` format. Beyond the spec's literal magic/version/code/interner/
/// call-point list, the module's `fail_stub` address and linkage mode
/// are also persisted (one `u32` and one `u8`) since a `Module` cannot be
/// reconstructed without them; see `DESIGN.md`.
pub fn write_module<W: Write>(module: &Module, w: &mut W) -> io::Result<()> {
    w.write_all(MAGIC)?;
    write_u32(w, VERSION)?;
    write_u32(w, module.code().len() as u32)?;
    for instr in module.code() {
        write_instr(w, instr)?;
    }

    let atoms: Vec<&str> = module.interner().entries().iter().skip(1).map(String::as_str).collect();
    write_u32(w, atoms.len() as u32)?;
    for atom in atoms {
        write_str(w, atom)?;
    }

    let functors: Vec<(&str, u8)> = module.functors().entries().collect();
    write_u32(w, functors.len() as u32)?;
    for (name, arity) in functors {
        write_str(w, name)?;
        write_u8(w, arity)?;
    }

    write_u32(w, module.call_points.len() as u32)?;
    for (&f, &addr) in module.call_points.iter() {
        write_functor(w, f)?;
        write_u32(w, addr)?;
    }

    write_u32(w, module.fail_stub())?;
    write_u8(w, match module.options().linkage {
        Linkage::Strict => 0,
        Linkage::Lenient => 1,
    })
}

/// Reads a module previously written by [`write_module`].
pub fn read_module<R: Read>(r: &mut R) -> io::Result<Module> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic, not a WAMB file"));
    }
    let version = read_u32(r)?;
    if version != VERSION {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unsupported WAMB version {version}")));
    }

    // Mirrors `write_module`'s section order exactly: code, atoms,
    // functors, call points. The code section's `Const::Atom` values
    // decode as bare indices (see `read_const`), so the atom table
    // doesn't need to exist yet at this point — it only has to be loaded
    // into the same dense order before anything calls `Interner::resolve`
    // on one of those indices.
    let code_len = read_u32(r)?;
    let mut interner = Interner::new();
    let mut code = Vec::with_capacity(code_len as usize);
    for _ in 0..code_len {
        code.push(read_instr(r)?);
    }

    let atom_count = read_u32(r)?;
    for _ in 0..atom_count {
        interner.intern(&read_str(r)?);
    }

    let functor_count = read_u32(r)?;
    let mut functors = FunctorTable::new();
    for _ in 0..functor_count {
        let name = read_str(r)?;
        let arity = read_u8(r)?;
        functors.intern(&name, arity);
    }

    let call_point_count = read_u32(r)?;
    let mut call_points = HashMap::with_capacity(call_point_count as usize);
    for _ in 0..call_point_count {
        let f = read_functor(r)?;
        let addr = read_u32(r)?;
        call_points.insert(f, addr);
    }

    let fail_stub = read_u32(r)?;
    let linkage = match read_u8(r)? {
        0 => Linkage::Strict,
        1 => Linkage::Lenient,
        tag => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("bad linkage tag {tag}"))),
    };

    Ok(Module::new(code, call_points, functors, interner, fail_stub, CompilerOptions { linkage }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use std::io::Cursor;

    #[test]
    fn module_round_trips_through_the_wamb_format() {
        let module = compile("color(red).\ncolor(green).\nlikes(mary, wine).\n").unwrap();
        let mut buf = Vec::new();
        write_module(&module, &mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        let reloaded = read_module(&mut cursor).unwrap();
        assert_eq!(reloaded.code().len(), module.code().len());

        let mut resolver = reloaded.prepare("color(X)").unwrap();
        let bindings = resolver.next().unwrap().unwrap();
        assert_eq!(bindings.get("X").unwrap().to_string(), "red");
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut cursor = Cursor::new(vec![0u8; 16]);
        assert!(read_module(&mut cursor).is_err());
    }
}
