//! Word-level SPIR-V decoder. Independent from the writer so generated
//! binaries can be checked against what a consumer would read.
use anyhow::{bail, Result};
use num_traits::FromPrimitive;
use spirv::Op;

use super::instr::SpirvHeader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstr {
    pub opcode: u16,
    /// `None` for opcodes unknown to the grammar.
    pub op: Option<Op>,
    /// Every word after the first, result type and id included.
    pub operands: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedModule {
    pub header: SpirvHeader,
    pub instrs: Vec<DecodedInstr>,
}
impl DecodedModule {
    pub fn count(&self, op: Op) -> usize {
        self.instrs.iter().filter(|x| x.op == Some(op)).count()
    }
    pub fn ops(&self) -> impl Iterator<Item = Option<Op>> + '_ {
        self.instrs.iter().map(|x| x.op)
    }
}

fn decode_header(words: &[u32]) -> Result<SpirvHeader> {
    let [magic, version, generator, bound, schema] = match words {
        [a, b, c, d, e, ..] => [*a, *b, *c, *d, *e],
        _ => bail!("spir-v binary is too short to hold a header ({} words)", words.len()),
    };
    if magic != spirv::MAGIC_NUMBER {
        bail!("invalid spir-v magic number {:#010x}", magic);
    }
    let major = (version >> 16) & 0xff;
    let minor = (version >> 8) & 0xff;
    if version & 0xff00_00ff != 0 || major != 1 || minor > 6 {
        bail!("unsupported spir-v version {:#010x}", version);
    }
    if bound == 0 {
        bail!("spir-v id bound must be greater than zero");
    }
    if schema != 0 {
        bail!("spir-v schema must be zero, found {}", schema);
    }
    Ok(SpirvHeader {
        magic,
        version,
        generator,
        bound,
        schema,
    })
}

pub fn decode(words: &[u32]) -> Result<DecodedModule> {
    let header = decode_header(words)?;
    let mut instrs = Vec::new();
    let mut rest = &words[5..];
    while let Some(first) = rest.first() {
        let offset = words.len() - rest.len();
        let len = (first >> 16) as usize;
        let opcode = (first & 0xffff) as u16;
        if len == 0 {
            bail!("instruction at word {} has a zero word count", offset);
        }
        if len > rest.len() {
            bail!(
                "instruction at word {} is truncated: expected {} words, {} remain",
                offset,
                len,
                rest.len()
            );
        }
        instrs.push(DecodedInstr {
            opcode,
            op: Op::from_u32(opcode as u32),
            operands: rest[1..len].to_vec(),
        });
        rest = &rest[len..];
    }
    Ok(DecodedModule { header, instrs })
}
