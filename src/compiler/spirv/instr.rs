//! Flat SPIR-V instructions with concrete ids, grouped by the section of
//! the logical layout they belong to.
use anyhow::{bail, Result};

/// Sections of a SPIR-V module, in logical layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    Capability,
    Extension,
    ExtInstImport,
    MemoryModel,
    EntryPoint,
    ExecutionMode,
    Debug,
    Annotation,
    Global,
    Function,
}
impl Section {
    pub const ALL: [Section; 10] = [
        Self::Capability,
        Self::Extension,
        Self::ExtInstImport,
        Self::MemoryModel,
        Self::EntryPoint,
        Self::ExecutionMode,
        Self::Debug,
        Self::Annotation,
        Self::Global,
        Self::Function,
    ];
}

#[derive(Debug, Clone)]
pub struct IdContext {
    counter: u32,
}
impl IdContext {
    pub fn new() -> Self {
        Self { counter: 1 }
    }

    pub fn alloc(&mut self) -> u32 {
        let id = self.counter;
        self.counter += 1;
        id
    }
    /// One past the greatest id allocated so far.
    pub fn bound(&self) -> u32 {
        self.counter
    }
}
impl Default for IdContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instr {
    pub opcode: u16,
    pub result_type: Option<u32>,
    pub result_id: Option<u32>,
    pub operands: Vec<u32>,
}
impl Instr {
    pub fn to_words(&self) -> Result<Vec<u32>> {
        let mut out = Vec::with_capacity(self.operands.len() + 3);
        out.push(self.opcode as u32);
        if let Some(result_type) = self.result_type {
            out.push(result_type);
        }
        if let Some(result_id) = self.result_id {
            out.push(result_id);
        }
        out.extend(self.operands.iter().cloned());
        let len = out.len() as u32;
        if len > u16::MAX as u32 {
            bail!("instruction length must be less than u16::MAX (65535)");
        }
        out[0] |= len << 16;
        Ok(out)
    }
}

/// Packs a literal string into nul-terminated little-endian words.
pub fn encode_str(text: &str) -> Vec<u32> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks(4)
        .map(|x| u32::from_le_bytes([x[0], x[1], x[2], x[3]]))
        .collect()
}

pub struct InstrBuilder<'a> {
    dst: &'a mut Vec<Instr>,
    opcode: u16,
    result_type: Option<u32>,
    result_id: Option<u32>,
    operands: Vec<u32>,
}
impl<'a> InstrBuilder<'a> {
    pub fn new(dst: &'a mut Vec<Instr>, op: spirv::Op) -> Self {
        Self {
            dst,
            opcode: op as u16,
            result_type: None,
            result_id: None,
            operands: Vec::new(),
        }
    }

    pub fn set_result_type(mut self, result_type: u32) -> Self {
        self.result_type = Some(result_type);
        self
    }
    pub fn set_result_id(mut self, result_id: u32) -> Self {
        self.result_id = Some(result_id);
        self
    }
    pub fn push(mut self, operand: u32) -> Self {
        self.operands.push(operand);
        self
    }
    pub fn push_all(mut self, operands: impl IntoIterator<Item = u32>) -> Self {
        self.operands.extend(operands);
        self
    }
    pub fn push_str(mut self, text: &str) -> Self {
        self.operands.extend(encode_str(text));
        self
    }

    pub fn build(self) {
        self.dst.push(Instr {
            opcode: self.opcode,
            result_type: self.result_type,
            result_id: self.result_id,
            operands: self.operands,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpirvHeader {
    pub magic: u32,
    pub version: u32,
    pub generator: u32,
    pub bound: u32,
    pub schema: u32,
}
impl SpirvHeader {
    pub fn new(version: u32, bound: u32) -> Self {
        Self {
            magic: spirv::MAGIC_NUMBER,
            version,
            generator: 0,
            bound,
            schema: 0,
        }
    }

    /// Major and minor version numbers.
    pub fn version_numbers(&self) -> (u32, u32) {
        ((self.version >> 16) & 0xff, (self.version >> 8) & 0xff)
    }

    pub fn to_words(&self) -> Vec<u32> {
        vec![self.magic, self.version, self.generator, self.bound, self.schema]
    }
}

#[derive(Debug, Clone)]
pub struct InstrContext {
    pub version: u32,
    pub ids: IdContext,
    sections: Vec<Vec<Instr>>,
}
impl InstrContext {
    pub fn new(version: u32) -> InstrContext {
        InstrContext {
            version,
            ids: IdContext::new(),
            sections: vec![Vec::new(); Section::ALL.len()],
        }
    }

    pub fn alloc_id(&mut self) -> u32 {
        self.ids.alloc()
    }
    pub fn section(&mut self, section: Section) -> &mut Vec<Instr> {
        &mut self.sections[section as usize]
    }
    pub fn build_instr(&mut self, section: Section, op: spirv::Op) -> InstrBuilder<'_> {
        InstrBuilder::new(self.section(section), op)
    }
}

pub struct SpirvBinary {
    pub header: SpirvHeader,
    pub instrs: Vec<Instr>,
}
impl SpirvBinary {
    pub fn from_ir(instr_ctxt: InstrContext) -> Self {
        Self {
            header: SpirvHeader::new(instr_ctxt.version, instr_ctxt.ids.bound()),
            instrs: instr_ctxt.sections.into_iter().flatten().collect(),
        }
    }

    pub fn to_words(&self) -> Result<Vec<u32>> {
        let mut out = self.header.to_words();
        for instr in self.instrs.iter() {
            out.extend(instr.to_words()?);
        }
        Ok(out)
    }
}
impl From<InstrContext> for SpirvBinary {
    fn from(ir: InstrContext) -> Self {
        Self::from_ir(ir)
    }
}
