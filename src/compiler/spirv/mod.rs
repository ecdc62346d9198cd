//! SPIR-V generation. Locals live in `Function` variables and are accessed
//! through access chains, parameters are passed by pointer, and entry point
//! IO structs are split into one `Input`/`Output` variable per field.
use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, bail, Result};
use spirv::{Capability, Decoration, Op, StorageClass};

use crate::compiler::ast::*;
use crate::compiler::common::{ConstantValue, PrimitiveType};
use crate::compiler::error::{BackendError, CompileError};
use crate::compiler::sema::{layout, Analysis, DeclId, ExpressionType, FieldInfo};

pub mod cache;
pub mod decode;
pub mod instr;
pub mod printer;

#[cfg(test)]
mod tests;

pub use cache::{ConstantKey, SpirvCache, SpirvType};
pub use decode::{decode, DecodedInstr, DecodedModule};
pub use instr::{Instr, InstrBuilder, InstrContext, Section, SpirvBinary, SpirvHeader};
pub use printer::{PrinterSettings, SpirvPrinter};

const GLSL_STD_450: &str = "GLSL.std.450";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpirvWriterOptions {
    pub spirv_major_version: u32,
    pub spirv_minor_version: u32,
    /// Whether the target accepts the `Float64` capability.
    pub allow_float64: bool,
}
impl Default for SpirvWriterOptions {
    fn default() -> Self {
        Self {
            spirv_major_version: 1,
            spirv_minor_version: 0,
            allow_float64: true,
        }
    }
}
impl SpirvWriterOptions {
    pub fn version_word(&self) -> Result<u32> {
        match (self.spirv_major_version, self.spirv_minor_version) {
            (1, minor @ 0..=6) => Ok((1 << 16) | (minor << 8)),
            (major, minor) => Err(BackendError::UnsupportedSpirvVersion(major, minor).into()),
        }
    }
    fn at_least(&self, minor: u32) -> bool {
        self.spirv_minor_version >= minor
    }
}

pub struct SpirvWriter {
    options: SpirvWriterOptions,
}
impl SpirvWriter {
    pub fn new(options: SpirvWriterOptions) -> Self {
        Self { options }
    }

    /// Generates a module holding every function, with one entry point per
    /// `[entry]` function of the root module.
    pub fn generate(&self, module: &Module, analysis: &Analysis) -> Result<Vec<u32>> {
        let version = self.options.version_word()?;
        let binary = SpirvState::new(&self.options, analysis, version).generate(module)?;
        let words = binary.to_words()?;
        tracing::debug!(
            words = words.len(),
            bound = binary.header.bound,
            instructions = binary.instrs.len(),
            "generated spir-v"
        );
        Ok(words)
    }
}
impl Default for SpirvWriter {
    fn default() -> Self {
        Self::new(SpirvWriterOptions::default())
    }
}

struct GlobalVar {
    id: u32,
    storage: StorageClass,
}

/// A variable and the access chain indices selecting a part of it.
struct Access {
    base: u32,
    storage: StorageClass,
    indices: Vec<u32>,
    ty: ExpressionType,
}

#[derive(Default)]
struct FunctionState {
    /// `OpVariable`s, hoisted to the first block.
    variables: Vec<Instr>,
    body: Vec<Instr>,
    locals: HashMap<DeclId, u32>,
    terminated: bool,
    returns_void: bool,
    /// Set while writing an entry point.
    stage: Option<ShaderStage>,
    /// Output variable, field index and type of every entry output.
    outputs: Vec<(u32, u32, ExpressionType)>,
}

struct SpirvState<'a, 'b> {
    options: &'b SpirvWriterOptions,
    analysis: &'b Analysis<'a>,
    ctxt: InstrContext,
    cache: SpirvCache,
    capabilities: Vec<Capability>,
    glsl_std: Option<u32>,
    globals: HashMap<DeclId, GlobalVar>,
    functions: HashMap<DeclId, u32>,
    blocks: HashSet<DeclId>,
    func: FunctionState,
}
impl<'a, 'b> SpirvState<'a, 'b> {
    fn new(options: &'b SpirvWriterOptions, analysis: &'b Analysis<'a>, version: u32) -> Self {
        Self {
            options,
            analysis,
            ctxt: InstrContext::new(version),
            cache: SpirvCache::new(),
            capabilities: Vec::new(),
            glsl_std: None,
            globals: HashMap::new(),
            functions: HashMap::new(),
            blocks: HashSet::new(),
            func: FunctionState::default(),
        }
    }

    fn generate(mut self, module: &Module) -> Result<SpirvBinary> {
        self.add_capability(Capability::Shader);
        self.ctxt
            .build_instr(Section::MemoryModel, Op::MemoryModel)
            .push(spirv::AddressingModel::Logical as u32)
            .push(spirv::MemoryModel::GLSL450 as u32)
            .build();

        let mut items = Vec::new();
        for imported in &module.imported_modules {
            self.items(&imported.module.statements, &mut items)?;
        }
        self.items(&module.statements, &mut items)?;

        for id in &items {
            if self.analysis.decl(*id).as_external().is_some() {
                self.external(*id)?;
            }
        }
        for id in &items {
            if self.analysis.decl(*id).as_function().is_some() {
                let fid = self.ctxt.alloc_id();
                self.functions.insert(*id, fid);
            }
        }
        for id in &items {
            if self.analysis.decl(*id).as_function().is_some() {
                self.function(*id)?;
            }
        }
        tracing::debug!(
            types = self.cache.type_count(),
            constants = self.cache.constant_count(),
            "spir-v caches"
        );
        Ok(SpirvBinary::from(self.ctxt))
    }

    fn items(&self, stmts: &[Statement], out: &mut Vec<DeclId>) -> Result<()> {
        for stmt in stmts {
            match &stmt.kind {
                StatementKind::DeclareFunction(decl) => out.extend(self.analysis.function_id(decl)),
                StatementKind::DeclareExternal(decl) => {
                    out.extend(decl.vars.iter().filter_map(|x| self.analysis.external_id(x)));
                }
                StatementKind::Multi(stmts) => self.items(stmts, out)?,
                StatementKind::Conditional(_) => bail!("cond attribute must be resolved before generating SPIR-V"),
                _ => {}
            }
        }
        Ok(())
    }

    // Module-level helpers.

    fn add_capability(&mut self, capability: Capability) {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
            self.ctxt
                .build_instr(Section::Capability, Op::Capability)
                .push(capability as u32)
                .build();
        }
    }

    fn require_f64(&mut self) -> Result<()> {
        if !self.options.allow_float64 {
            return Err(BackendError::UnsupportedCapability(Capability::Float64).into());
        }
        self.add_capability(Capability::Float64);
        Ok(())
    }

    fn glsl_std(&mut self) -> u32 {
        if let Some(id) = self.glsl_std {
            return id;
        }
        let id = self.ctxt.alloc_id();
        self.ctxt
            .build_instr(Section::ExtInstImport, Op::ExtInstImport)
            .set_result_id(id)
            .push_str(GLSL_STD_450)
            .build();
        self.glsl_std = Some(id);
        id
    }

    fn name(&mut self, id: u32, name: &str) {
        self.ctxt.build_instr(Section::Debug, Op::Name).push(id).push_str(name).build();
    }

    fn decorate(&mut self, id: u32, decoration: Decoration, extra: &[u32]) {
        self.ctxt
            .build_instr(Section::Annotation, Op::Decorate)
            .push(id)
            .push(decoration as u32)
            .push_all(extra.iter().copied())
            .build();
    }

    fn member_decorate(&mut self, id: u32, member: u32, decoration: Decoration, extra: &[u32]) {
        self.ctxt
            .build_instr(Section::Annotation, Op::MemberDecorate)
            .push(id)
            .push(member)
            .push(decoration as u32)
            .push_all(extra.iter().copied())
            .build();
    }

    // Types and constants.

    fn spirv_type(&self, ty: &ExpressionType) -> Result<SpirvType> {
        self.spirv_type_in(ty, MemoryLayout::Std140)
    }

    /// SPIR-V type of `ty`, with array strides computed under `rule`.
    fn spirv_type_in(&self, ty: &ExpressionType, rule: MemoryLayout) -> Result<SpirvType> {
        use ExpressionType as T;
        let out = match ty {
            T::NoType => SpirvType::Void,
            T::Primitive(x) => primitive_type(*x),
            T::Vector(x, n) => SpirvType::Vector(Box::new(primitive_type(*x)), *n),
            T::Matrix(x, c, r) => {
                let column = SpirvType::Vector(Box::new(primitive_type(*x)), *r);
                SpirvType::Matrix(Box::new(column), *c)
            }
            T::Array(element, length) => {
                let stride = layout::array_stride(self.analysis, element, rule)?;
                SpirvType::Array(Box::new(self.spirv_type_in(element, rule)?), *length, stride)
            }
            T::Struct(id) | T::Uniform(id) | T::Storage(id) => SpirvType::Struct(*id),
            T::Sampler(dim, sampled) => {
                let image = SpirvType::Image(*dim, Box::new(primitive_type(*sampled)));
                SpirvType::SampledImage(Box::new(image))
            }
            _ => bail!("{} has no SPIR-V type", ty),
        };
        Ok(out)
    }

    fn expr_type_id(&mut self, ty: &ExpressionType) -> Result<u32> {
        let ty = self.spirv_type(ty)?;
        self.type_id(&ty)
    }

    fn type_id(&mut self, ty: &SpirvType) -> Result<u32> {
        if let Some(id) = self.cache.get_type(ty) {
            return Ok(id);
        }
        let (op, operands) = match ty {
            SpirvType::Void => (Op::TypeVoid, vec![]),
            SpirvType::Bool => (Op::TypeBool, vec![]),
            SpirvType::Int { signed } => (Op::TypeInt, vec![32, *signed as u32]),
            SpirvType::Float { width } => {
                if *width == 64 {
                    self.require_f64()?;
                }
                (Op::TypeFloat, vec![*width])
            }
            SpirvType::Vector(component, count) => (Op::TypeVector, vec![self.type_id(component)?, *count]),
            SpirvType::Matrix(column, count) => (Op::TypeMatrix, vec![self.type_id(column)?, *count]),
            SpirvType::Array(element, length, _) => {
                let element = self.type_id(element)?;
                let length = self.constant_id(&ConstantValue::U32(*length))?;
                (Op::TypeArray, vec![element, length])
            }
            SpirvType::Image(dim, sampled) => {
                let dim = match dim {
                    SamplerDim::Dim1D => {
                        self.add_capability(Capability::Sampled1D);
                        spirv::Dim::Dim1D
                    }
                    SamplerDim::Dim2D => spirv::Dim::Dim2D,
                    SamplerDim::Dim3D => spirv::Dim::Dim3D,
                    SamplerDim::Cube => spirv::Dim::DimCube,
                };
                let sampled = self.type_id(sampled)?;
                // Not depth, not arrayed, single-sampled, used with a sampler.
                let operands = vec![sampled, dim as u32, 0, 0, 0, 1, spirv::ImageFormat::Unknown as u32];
                (Op::TypeImage, operands)
            }
            SpirvType::SampledImage(image) => (Op::TypeSampledImage, vec![self.type_id(image)?]),
            SpirvType::Pointer(storage, pointee) => (Op::TypePointer, vec![*storage as u32, self.type_id(pointee)?]),
            SpirvType::Function(ret, params) => {
                let mut operands = vec![self.type_id(ret)?];
                for param in params {
                    operands.push(self.type_id(param)?);
                }
                (Op::TypeFunction, operands)
            }
            SpirvType::Struct(decl) => return self.struct_type(*decl),
        };
        let id = self.ctxt.alloc_id();
        self.ctxt
            .build_instr(Section::Global, op)
            .set_result_id(id)
            .push_all(operands)
            .build();
        if let SpirvType::Array(_, _, stride) = ty {
            self.decorate(id, Decoration::ArrayStride, &[*stride]);
        }
        self.cache.insert_type(ty.clone(), id);
        Ok(id)
    }

    fn struct_type(&mut self, decl: DeclId) -> Result<u32> {
        let analysis = self.analysis;
        let info = analysis
            .struct_info(decl)
            .ok_or_else(|| anyhow!("declaration #{} is not a struct", decl))?;
        let rule = layout::layout_rule(analysis, decl, MemoryLayout::Std140);
        // Structs holding opaque types have no memory layout.
        let offsets = match layout::struct_layout(analysis, decl, rule) {
            Ok(x) => Some(x),
            Err(e) if e.is::<CompileError>() => return Err(e),
            Err(_) => None,
        };

        let mut members = Vec::with_capacity(info.fields.len());
        for field in &info.fields {
            let ty = self.spirv_type_in(&field.ty, rule)?;
            members.push(self.type_id(&ty)?);
        }
        let id = self.ctxt.alloc_id();
        self.ctxt
            .build_instr(Section::Global, Op::TypeStruct)
            .set_result_id(id)
            .push_all(members)
            .build();
        self.cache.insert_type(SpirvType::Struct(decl), id);

        self.name(id, &analysis.decl(decl).name);
        for (i, field) in info.fields.iter().enumerate() {
            self.ctxt
                .build_instr(Section::Debug, Op::MemberName)
                .push(id)
                .push(i as u32)
                .push_str(&field.name)
                .build();
        }
        if let Some(offsets) = offsets {
            for (i, (field, offset)) in info.fields.iter().zip(&offsets.fields).enumerate() {
                self.member_decorate(id, i as u32, Decoration::Offset, &[offset.offset]);
                if let ExpressionType::Matrix(base, _, rows) = field.ty {
                    let stride = layout::matrix_stride(base, rows, rule);
                    self.member_decorate(id, i as u32, Decoration::ColMajor, &[]);
                    self.member_decorate(id, i as u32, Decoration::MatrixStride, &[stride]);
                }
            }
        }
        Ok(id)
    }

    fn constant_id(&mut self, value: &ConstantValue) -> Result<u32> {
        if let ConstantValue::Vector(xs) = value {
            let mut components = Vec::with_capacity(xs.len());
            for x in xs {
                components.push(self.constant_id(x)?);
            }
            let ty = self.spirv_type(&ExpressionType::of_constant(value))?;
            let key = ConstantKey::Composite(ty.clone(), components.clone());
            if let Some(id) = self.cache.get_constant(&key) {
                return Ok(id);
            }
            let ty = self.type_id(&ty)?;
            let id = self.ctxt.alloc_id();
            self.ctxt
                .build_instr(Section::Global, Op::ConstantComposite)
                .set_result_type(ty)
                .set_result_id(id)
                .push_all(components)
                .build();
            self.cache.insert_constant(key, id);
            return Ok(id);
        }

        let key = ConstantKey::scalar(value).ok_or_else(|| anyhow!("vector constants are keyed by components"))?;
        if let Some(id) = self.cache.get_constant(&key) {
            return Ok(id);
        }
        let ty = self.type_id(&primitive_type(value.primitive_type()))?;
        let (op, operands) = match value {
            ConstantValue::Bool(true) => (Op::ConstantTrue, vec![]),
            ConstantValue::Bool(false) => (Op::ConstantFalse, vec![]),
            ConstantValue::I32(x) => (Op::Constant, vec![*x as u32]),
            ConstantValue::U32(x) => (Op::Constant, vec![*x]),
            ConstantValue::F32(x) => (Op::Constant, vec![x.to_bits()]),
            ConstantValue::F64(x) => {
                let bits = x.to_bits();
                (Op::Constant, vec![bits as u32, (bits >> 32) as u32])
            }
            ConstantValue::Vector(_) => bail!("vector constants are keyed by components"),
        };
        let id = self.ctxt.alloc_id();
        self.ctxt
            .build_instr(Section::Global, op)
            .set_result_type(ty)
            .set_result_id(id)
            .push_all(operands)
            .build();
        self.cache.insert_constant(key, id);
        Ok(id)
    }

    fn index_constant(&mut self, index: u32) -> Result<u32> {
        self.constant_id(&ConstantValue::I32(index as i32))
    }

    // Globals.

    fn external(&mut self, id: DeclId) -> Result<()> {
        let analysis = self.analysis;
        let decl = analysis.decl(id);
        let info = decl
            .as_external()
            .ok_or_else(|| anyhow!("{} is not an external", decl.name))?;
        let (storage, block) = match &info.ty {
            ExpressionType::Uniform(x) => (StorageClass::Uniform, Some((*x, Decoration::Block))),
            ExpressionType::Storage(x) if self.options.at_least(3) => {
                (StorageClass::StorageBuffer, Some((*x, Decoration::Block)))
            }
            ExpressionType::Storage(x) => (StorageClass::Uniform, Some((*x, Decoration::BufferBlock))),
            ExpressionType::Sampler(..) => (StorageClass::UniformConstant, None),
            ty => bail!("external {} cannot have type {}", decl.name, ty),
        };
        let pointee = self.spirv_type(&info.ty)?;
        if let Some((block, decoration)) = block {
            let struct_id = self.type_id(&pointee)?;
            if self.blocks.insert(block) {
                self.decorate(struct_id, decoration, &[]);
            }
        }
        let ptr = self.type_id(&SpirvType::pointer(storage, pointee))?;
        let var = self.ctxt.alloc_id();
        self.ctxt
            .build_instr(Section::Global, Op::Variable)
            .set_result_type(ptr)
            .set_result_id(var)
            .push(storage as u32)
            .build();
        self.name(var, &decl.name);

        let binding = info
            .var
            .binding
            .ok_or_else(|| anyhow!("external {} requires a binding", decl.name))?;
        self.decorate(var, Decoration::DescriptorSet, &[info.set]);
        self.decorate(var, Decoration::Binding, &[binding]);
        self.globals.insert(id, GlobalVar { id: var, storage });
        Ok(())
    }

    fn io_variable(&mut self, storage: StorageClass, field: &FieldInfo, stage: ShaderStage) -> Result<u32> {
        let ty = self.spirv_type(&field.ty)?;
        let ptr = self.type_id(&SpirvType::pointer(storage, ty))?;
        let var = self.ctxt.alloc_id();
        self.ctxt
            .build_instr(Section::Global, Op::Variable)
            .set_result_type(ptr)
            .set_result_id(var)
            .push(storage as u32)
            .build();
        self.name(var, &field.name);
        if let Some(builtin) = field.builtin {
            self.decorate(var, Decoration::BuiltIn, &[builtin_of(builtin) as u32]);
        } else if let Some(location) = field.location {
            self.decorate(var, Decoration::Location, &[location]);
            let integer = field.ty.base_type().map_or(false, |x| x.is_integer());
            if stage == ShaderStage::Fragment && storage == StorageClass::Input && integer {
                self.decorate(var, Decoration::Flat, &[]);
            }
        }
        Ok(var)
    }

    // Functions.

    fn function(&mut self, id: DeclId) -> Result<()> {
        let analysis = self.analysis;
        let decl = analysis.decl(id);
        let info = decl
            .as_function()
            .ok_or_else(|| anyhow!("{} is not a function", decl.name))?;
        let fid = *self
            .functions
            .get(&id)
            .ok_or_else(|| anyhow!("function {} has no id", decl.name))?;
        let stage = match decl.module {
            None => info.decl.entry,
            Some(_) => None,
        };

        let (ret, params) = match stage {
            Some(_) => (SpirvType::Void, Vec::new()),
            None => {
                let mut params = Vec::with_capacity(info.params.len());
                for param in &info.params {
                    let ty = analysis.decl_type(*param).unwrap_or(ExpressionType::NoType);
                    params.push(SpirvType::pointer(StorageClass::Function, self.spirv_type(&ty)?));
                }
                (self.spirv_type(&info.return_type)?, params)
            }
        };
        let ret_id = self.type_id(&ret)?;
        let fn_ty = self.type_id(&SpirvType::Function(Box::new(ret), params.clone()))?;

        self.func = FunctionState {
            returns_void: stage.is_some() || info.return_type == ExpressionType::NoType,
            stage,
            ..FunctionState::default()
        };
        let mut header = Vec::new();
        InstrBuilder::new(&mut header, Op::Function)
            .set_result_type(ret_id)
            .set_result_id(fid)
            .push(spirv::FunctionControl::NONE.bits())
            .push(fn_ty)
            .build();
        self.name(fid, &decl.name);
        if stage.is_none() {
            for (param, ty) in info.params.iter().zip(&params) {
                let ptr = self.type_id(ty)?;
                let pid = self.ctxt.alloc_id();
                InstrBuilder::new(&mut header, Op::FunctionParameter)
                    .set_result_type(ptr)
                    .set_result_id(pid)
                    .build();
                self.name(pid, &analysis.decl(*param).name);
                self.func.locals.insert(*param, pid);
            }
        }
        let label = self.ctxt.alloc_id();
        InstrBuilder::new(&mut header, Op::Label).set_result_id(label).build();

        let interface = match stage {
            Some(stage) => self.entry_prologue(stage, &info.params, &info.return_type)?,
            None => Vec::new(),
        };
        self.statements(&info.decl.body)?;
        if !self.func.terminated {
            let op = if self.func.returns_void { Op::Return } else { Op::Unreachable };
            self.emit(op).build();
        }

        let func = std::mem::take(&mut self.func);
        let section = self.ctxt.section(Section::Function);
        section.extend(header);
        section.extend(func.variables);
        section.extend(func.body);
        InstrBuilder::new(section, Op::FunctionEnd).build();

        if let Some(stage) = stage {
            self.entry_point(stage, info.decl, fid, interface);
        }
        Ok(())
    }

    /// Declares the IO variables of an entry point and copies its inputs
    /// into the local standing for the input parameter.
    fn entry_prologue(&mut self, stage: ShaderStage, params: &[DeclId], ret: &ExpressionType) -> Result<Vec<u32>> {
        let analysis = self.analysis;
        let mut interface = Vec::new();
        if let Some(param) = params.first() {
            let ty = analysis.decl_type(*param).unwrap_or(ExpressionType::NoType);
            let info = ty
                .struct_id()
                .and_then(|x| analysis.struct_info(x))
                .ok_or_else(|| anyhow!("entry input must be a struct, found {}", ty))?;
            let local = self.local_variable(&ty, Some(&analysis.decl(*param).name))?;
            self.func.locals.insert(*param, local);
            for (i, field) in info.fields.iter().enumerate() {
                let var = self.io_variable(StorageClass::Input, field, stage)?;
                interface.push(var);
                let field_ty = self.expr_type_id(&field.ty)?;
                let value = self.value_instr(Op::Load, field_ty, &[var]);
                let ptr_ty = self.type_id(&SpirvType::pointer(StorageClass::Function, self.spirv_type(&field.ty)?))?;
                let index = self.index_constant(i as u32)?;
                let ptr = self.value_instr(Op::AccessChain, ptr_ty, &[local, index]);
                self.emit(Op::Store).push(ptr).push(value).build();
            }
        }
        if let Some(info) = ret.struct_id().and_then(|x| analysis.struct_info(x)) {
            for (i, field) in info.fields.iter().enumerate() {
                let var = self.io_variable(StorageClass::Output, field, stage)?;
                interface.push(var);
                self.func.outputs.push((var, i as u32, field.ty.clone()));
            }
        }
        if self.options.at_least(4) {
            let mut globals = self.globals.values().map(|x| x.id).collect::<Vec<_>>();
            globals.sort_unstable();
            interface.extend(globals);
        }
        Ok(interface)
    }

    fn entry_point(&mut self, stage: ShaderStage, decl: &FunctionDecl, fid: u32, interface: Vec<u32>) {
        let model = match stage {
            ShaderStage::Vertex => spirv::ExecutionModel::Vertex,
            ShaderStage::Fragment => spirv::ExecutionModel::Fragment,
            ShaderStage::Compute => spirv::ExecutionModel::GLCompute,
        };
        self.ctxt
            .build_instr(Section::EntryPoint, Op::EntryPoint)
            .push(model as u32)
            .push(fid)
            .push_str("main")
            .push_all(interface)
            .build();

        let mut modes = Vec::new();
        match stage {
            ShaderStage::Fragment => {
                modes.push((spirv::ExecutionMode::OriginUpperLeft, vec![]));
                if decl.early_fragment_tests == Some(true) {
                    modes.push((spirv::ExecutionMode::EarlyFragmentTests, vec![]));
                }
                if let Some(mode) = decl.depth_write {
                    modes.push((spirv::ExecutionMode::DepthReplacing, vec![]));
                    match mode {
                        DepthWriteMode::Greater => modes.push((spirv::ExecutionMode::DepthGreater, vec![])),
                        DepthWriteMode::Less => modes.push((spirv::ExecutionMode::DepthLess, vec![])),
                        DepthWriteMode::Unchanged => modes.push((spirv::ExecutionMode::DepthUnchanged, vec![])),
                        DepthWriteMode::Replace => {}
                    }
                }
            }
            ShaderStage::Compute => {
                let [x, y, z] = decl.workgroup.unwrap_or([1, 1, 1]);
                modes.push((spirv::ExecutionMode::LocalSize, vec![x, y, z]));
            }
            ShaderStage::Vertex => {}
        }
        for (mode, operands) in modes {
            self.ctxt
                .build_instr(Section::ExecutionMode, Op::ExecutionMode)
                .push(fid)
                .push(mode as u32)
                .push_all(operands)
                .build();
        }
    }

    fn emit(&mut self, op: Op) -> InstrBuilder<'_> {
        InstrBuilder::new(&mut self.func.body, op)
    }

    fn value_instr(&mut self, op: Op, ty: u32, operands: &[u32]) -> u32 {
        let id = self.ctxt.alloc_id();
        InstrBuilder::new(&mut self.func.body, op)
            .set_result_type(ty)
            .set_result_id(id)
            .push_all(operands.iter().copied())
            .build();
        id
    }

    fn label(&mut self, id: u32) {
        self.emit(Op::Label).set_result_id(id).build();
        self.func.terminated = false;
    }

    fn terminate(&mut self, op: Op, operands: &[u32]) {
        self.emit(op).push_all(operands.iter().copied()).build();
        self.func.terminated = true;
    }

    fn local_variable(&mut self, ty: &ExpressionType, name: Option<&str>) -> Result<u32> {
        let ptr = self.type_id(&SpirvType::pointer(StorageClass::Function, self.spirv_type(ty)?))?;
        let id = self.ctxt.alloc_id();
        InstrBuilder::new(&mut self.func.variables, Op::Variable)
            .set_result_type(ptr)
            .set_result_id(id)
            .push(StorageClass::Function as u32)
            .build();
        if let Some(name) = name {
            self.name(id, name);
        }
        Ok(id)
    }

    // Statements.

    fn statements(&mut self, stmts: &[Statement]) -> Result<()> {
        for stmt in stmts {
            // Anything after a terminator is unreachable.
            if self.func.terminated {
                break;
            }
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Statement) -> Result<()> {
        match &stmt.kind {
            StatementKind::DeclareVariable(decl) => {
                let id = self
                    .analysis
                    .variable_id(decl)
                    .ok_or_else(|| anyhow!("variable {} was not analyzed", decl.name))?;
                let ty = self.analysis.decl_type(id).unwrap_or(ExpressionType::NoType);
                let ptr = self.local_variable(&ty, Some(&decl.name))?;
                self.func.locals.insert(id, ptr);
                if let Some(init) = &decl.init {
                    let value = self.value(init)?;
                    self.emit(Op::Store).push(ptr).push(value).build();
                }
            }
            StatementKind::Expression(expr) => {
                self.value(expr)?;
            }
            StatementKind::Branch(branch) => {
                if branch.is_const {
                    bail!("const if must be resolved before generating SPIR-V");
                }
                self.branch(&branch.cond_statements, branch.else_statement.as_deref())?;
            }
            StatementKind::Multi(stmts) | StatementKind::Scoped(stmts) => self.statements(stmts)?,
            StatementKind::Discard => self.terminate(Op::Kill, &[]),
            StatementKind::Return(None) => self.terminate(Op::Return, &[]),
            StatementKind::Return(Some(value)) if self.func.stage.is_some() => self.entry_return(value)?,
            StatementKind::Return(Some(value)) => {
                let value = self.value(value)?;
                self.terminate(Op::ReturnValue, &[value]);
            }
            // Struct types are declared when first used.
            StatementKind::DeclareStruct(_)
            | StatementKind::DeclareConst(_)
            | StatementKind::DeclareAlias(_)
            | StatementKind::DeclareOption(_) => {}
            StatementKind::Conditional(_) => bail!("cond attribute must be resolved before generating SPIR-V"),
            StatementKind::DeclareExternal(_) | StatementKind::DeclareFunction(_) => {
                bail!("only variables can be declared inside a function")
            }
        }
        Ok(())
    }

    /// Writes an `if`/`else if` chain as nested selections.
    fn branch(&mut self, arms: &[(Expression, Statement)], else_arm: Option<&Statement>) -> Result<()> {
        let Some(((cond, arm), rest)) = arms.split_first() else {
            if let Some(stmt) = else_arm {
                self.statement(stmt)?;
            }
            return Ok(());
        };
        let cond = self.value(cond)?;
        let merge = self.ctxt.alloc_id();
        let true_label = self.ctxt.alloc_id();
        let has_else = !rest.is_empty() || else_arm.is_some();
        let false_label = if has_else { self.ctxt.alloc_id() } else { merge };

        self.emit(Op::SelectionMerge)
            .push(merge)
            .push(spirv::SelectionControl::NONE.bits())
            .build();
        self.terminate(Op::BranchConditional, &[cond, true_label, false_label]);

        self.label(true_label);
        self.statement(arm)?;
        self.close_arm(merge);
        if has_else {
            self.label(false_label);
            self.branch(rest, else_arm)?;
            self.close_arm(merge);
        }
        self.label(merge);
        Ok(())
    }

    fn close_arm(&mut self, merge: u32) {
        if !self.func.terminated {
            self.terminate(Op::Branch, &[merge]);
        }
    }

    /// Stores every field of the returned struct to its output variable.
    fn entry_return(&mut self, value: &Expression) -> Result<()> {
        let value = self.value(value)?;
        let outputs = std::mem::take(&mut self.func.outputs);
        for (var, index, ty) in &outputs {
            let ty = self.expr_type_id(ty)?;
            let field = self.value_instr(Op::CompositeExtract, ty, &[value, *index]);
            self.emit(Op::Store).push(*var).push(field).build();
        }
        self.func.outputs = outputs;
        self.terminate(Op::Return, &[]);
        Ok(())
    }

    // Expressions.

    fn binding_access(&self, expr: &Expression, ty: ExpressionType) -> Option<Access> {
        let id = self.analysis.binding(expr)?;
        if let Some(ptr) = self.func.locals.get(&id) {
            return Some(Access {
                base: *ptr,
                storage: StorageClass::Function,
                indices: Vec::new(),
                ty,
            });
        }
        self.globals.get(&id).map(|x| Access {
            base: x.id,
            storage: x.storage,
            indices: Vec::new(),
            ty,
        })
    }

    /// Pointer form of an expression, when it designates memory.
    fn access(&mut self, expr: &Expression) -> Result<Option<Access>> {
        let ty = self.analysis.type_of(expr)?;
        let out = match &expr.kind {
            ExpressionKind::Identifier(_) => self.binding_access(expr, ty),
            ExpressionKind::AccessMember { expr: inner, .. } => {
                if self.analysis.binding(expr).is_some() {
                    return Ok(self.binding_access(expr, ty));
                }
                let Some((_, index)) = self.analysis.field_of(expr) else {
                    return Ok(None);
                };
                let Some(mut base) = self.access(inner)? else {
                    return Ok(None);
                };
                base.indices.push(self.index_constant(index as u32)?);
                base.ty = ty;
                Some(base)
            }
            ExpressionKind::AccessIndex { expr: inner, index } => {
                let Some(mut base) = self.access(inner)? else {
                    return Ok(None);
                };
                base.indices.push(self.value(index)?);
                base.ty = ty;
                Some(base)
            }
            ExpressionKind::Swizzle { expr: inner, components } if components.len() == 1 => {
                if !self.analysis.type_of(inner)?.is_vector() {
                    return Ok(None);
                }
                let Some(mut base) = self.access(inner)? else {
                    return Ok(None);
                };
                base.indices.push(self.index_constant(components[0])?);
                base.ty = ty;
                Some(base)
            }
            _ => None,
        };
        Ok(out)
    }

    fn pointer(&mut self, access: &Access) -> Result<u32> {
        if access.indices.is_empty() {
            return Ok(access.base);
        }
        let pointee = self.spirv_type(&access.ty)?;
        let ptr_ty = self.type_id(&SpirvType::pointer(access.storage, pointee))?;
        let mut operands = vec![access.base];
        operands.extend(access.indices.iter().copied());
        Ok(self.value_instr(Op::AccessChain, ptr_ty, &operands))
    }

    fn load(&mut self, access: &Access) -> Result<u32> {
        let ptr = self.pointer(access)?;
        let ty = self.expr_type_id(&access.ty)?;
        Ok(self.value_instr(Op::Load, ty, &[ptr]))
    }

    fn store(&mut self, target: &Expression, value: u32) -> Result<()> {
        if let Some(access) = self.access(target)? {
            let ptr = self.pointer(&access)?;
            self.emit(Op::Store).push(ptr).push(value).build();
            return Ok(());
        }
        // Multi-component swizzle: blend the new components into the vector.
        if let ExpressionKind::Swizzle { expr: inner, components } = &target.kind {
            if let (Some(access), ExpressionType::Vector(_, count)) = (self.access(inner)?, self.analysis.type_of(inner)?) {
                let ptr = self.pointer(&access)?;
                let ty = self.expr_type_id(&access.ty)?;
                let old = self.value_instr(Op::Load, ty, &[ptr]);
                let mut operands = vec![old, value];
                for i in 0..count {
                    let slot = components.iter().position(|x| *x == i);
                    operands.push(slot.map_or(i, |x| count + x as u32));
                }
                let blended = self.value_instr(Op::VectorShuffle, ty, &operands);
                self.emit(Op::Store).push(ptr).push(blended).build();
                return Ok(());
            }
        }
        bail!("expression is not assignable")
    }

    fn value(&mut self, expr: &Expression) -> Result<u32> {
        let ty = self.analysis.type_of(expr)?;
        match &expr.kind {
            ExpressionKind::Constant(value) => self.constant_id(value),
            ExpressionKind::Identifier(name) => match self.access(expr)? {
                Some(access) => self.load(&access),
                None => bail!("{} cannot be used as a value", name),
            },
            ExpressionKind::AccessMember { expr: inner, member } => {
                if let Some(access) = self.access(expr)? {
                    return self.load(&access);
                }
                let Some((_, index)) = self.analysis.field_of(expr) else {
                    bail!("{} cannot be used as a value", member);
                };
                let inner = self.value(inner)?;
                let ty = self.expr_type_id(&ty)?;
                Ok(self.value_instr(Op::CompositeExtract, ty, &[inner, index as u32]))
            }
            ExpressionKind::AccessIndex { expr: inner, index } => {
                if let Some(access) = self.access(expr)? {
                    return self.load(&access);
                }
                let inner_ty = self.analysis.type_of(inner)?;
                let base = self.value(inner)?;
                let ty_id = self.expr_type_id(&ty)?;
                let literal = match index.as_constant() {
                    Some(ConstantValue::I32(x)) if *x >= 0 => Some(*x as u32),
                    Some(ConstantValue::U32(x)) => Some(*x),
                    _ => None,
                };
                if let Some(literal) = literal {
                    return Ok(self.value_instr(Op::CompositeExtract, ty_id, &[base, literal]));
                }
                let index = self.value(index)?;
                if inner_ty.is_vector() {
                    return Ok(self.value_instr(Op::VectorExtractDynamic, ty_id, &[base, index]));
                }
                // Arrays and matrices are indexed dynamically through memory.
                let tmp = self.local_variable(&inner_ty, None)?;
                self.emit(Op::Store).push(tmp).push(base).build();
                self.load(&Access {
                    base: tmp,
                    storage: StorageClass::Function,
                    indices: vec![index],
                    ty,
                })
            }
            ExpressionKind::Swizzle { expr: inner, components } => {
                let inner_ty = self.analysis.type_of(inner)?;
                let ty_id = self.expr_type_id(&ty)?;
                if inner_ty.is_primitive() {
                    let value = self.value(inner)?;
                    if components.len() == 1 {
                        return Ok(value);
                    }
                    return Ok(self.value_instr(Op::CompositeConstruct, ty_id, &vec![value; components.len()]));
                }
                if components.len() == 1 {
                    if let Some(access) = self.access(expr)? {
                        return self.load(&access);
                    }
                    let value = self.value(inner)?;
                    return Ok(self.value_instr(Op::CompositeExtract, ty_id, &[value, components[0]]));
                }
                let value = self.value(inner)?;
                let mut operands = vec![value, value];
                operands.extend(components.iter().copied());
                Ok(self.value_instr(Op::VectorShuffle, ty_id, &operands))
            }
            ExpressionKind::Binary { op, lhs, rhs } => {
                let lhs_ty = self.analysis.type_of(lhs)?;
                let rhs_ty = self.analysis.type_of(rhs)?;
                let l = self.value(lhs)?;
                let r = self.value(rhs)?;
                self.binary(*op, (&lhs_ty, l), (&rhs_ty, r), &ty)
            }
            ExpressionKind::Unary { op, expr: inner } => {
                let value = self.value(inner)?;
                let ty_id = self.expr_type_id(&ty)?;
                let op = match op {
                    UnaryOp::LogicalNot => Op::LogicalNot,
                    UnaryOp::Minus if ty.base_type().map_or(false, |x| x.is_float()) => Op::FNegate,
                    UnaryOp::Minus => Op::SNegate,
                };
                Ok(self.value_instr(op, ty_id, &[value]))
            }
            ExpressionKind::Assign { op, lhs, rhs } => {
                let value = match op.binary_op() {
                    None => self.value(rhs)?,
                    Some(binary) => {
                        let rhs_ty = self.analysis.type_of(rhs)?;
                        let l = self.value(lhs)?;
                        let r = self.value(rhs)?;
                        self.binary(binary, (&ty, l), (&rhs_ty, r), &ty)?
                    }
                };
                self.store(lhs, value)?;
                Ok(value)
            }
            ExpressionKind::Cast { args, .. } => self.cast(&ty, args),
            ExpressionKind::CallFunction { callee, args } => self.call(callee, args, &ty),
            ExpressionKind::Intrinsic { intrinsic, args } => self.intrinsic(*intrinsic, args, &ty),
            ExpressionKind::Conditional { .. } => bail!("const_select must be resolved before generating SPIR-V"),
        }
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        (lhs_ty, l): (&ExpressionType, u32),
        (rhs_ty, r): (&ExpressionType, u32),
        ty: &ExpressionType,
    ) -> Result<u32> {
        use ExpressionType as T;

        let ty_id = self.expr_type_id(ty)?;
        if op.is_logical() {
            let op = if op == BinaryOp::LogicalAnd { Op::LogicalAnd } else { Op::LogicalOr };
            return Ok(self.value_instr(op, ty_id, &[l, r]));
        }
        let base = lhs_ty
            .base_type()
            .ok_or_else(|| anyhow!("operator {} is not defined for {}", op.symbol(), lhs_ty))?;
        if op.is_comparison() {
            return Ok(self.value_instr(comparison_op(op, base)?, ty_id, &[l, r]));
        }

        let out = match (lhs_ty, rhs_ty) {
            (T::Matrix(..), T::Matrix(..)) if op == BinaryOp::Multiply => {
                self.value_instr(Op::MatrixTimesMatrix, ty_id, &[l, r])
            }
            (T::Matrix(..), T::Vector(..)) => self.value_instr(Op::MatrixTimesVector, ty_id, &[l, r]),
            (T::Vector(..), T::Matrix(..)) => self.value_instr(Op::VectorTimesMatrix, ty_id, &[l, r]),
            (T::Matrix(..), T::Primitive(_)) => self.value_instr(Op::MatrixTimesScalar, ty_id, &[l, r]),
            (T::Primitive(_), T::Matrix(..)) => self.value_instr(Op::MatrixTimesScalar, ty_id, &[r, l]),
            (T::Matrix(_, columns, rows), T::Matrix(..)) => {
                // Component-wise, one column at a time.
                let column_ty = self.expr_type_id(&T::Vector(base, *rows))?;
                let arith = arith_op(op, base)?;
                let mut parts = Vec::with_capacity(*columns as usize);
                for i in 0..*columns {
                    let a = self.value_instr(Op::CompositeExtract, column_ty, &[l, i]);
                    let b = self.value_instr(Op::CompositeExtract, column_ty, &[r, i]);
                    parts.push(self.value_instr(arith, column_ty, &[a, b]));
                }
                self.value_instr(Op::CompositeConstruct, ty_id, &parts)
            }
            (T::Vector(..), T::Primitive(_)) if op == BinaryOp::Multiply && base.is_float() => {
                self.value_instr(Op::VectorTimesScalar, ty_id, &[l, r])
            }
            (T::Primitive(_), T::Vector(..)) if op == BinaryOp::Multiply && base.is_float() => {
                self.value_instr(Op::VectorTimesScalar, ty_id, &[r, l])
            }
            (T::Vector(_, n), T::Primitive(_)) => {
                let splat = self.value_instr(Op::CompositeConstruct, ty_id, &vec![r; *n as usize]);
                self.value_instr(arith_op(op, base)?, ty_id, &[l, splat])
            }
            (T::Primitive(_), T::Vector(_, n)) => {
                let splat = self.value_instr(Op::CompositeConstruct, ty_id, &vec![l; *n as usize]);
                self.value_instr(arith_op(op, base)?, ty_id, &[splat, r])
            }
            _ => self.value_instr(arith_op(op, base)?, ty_id, &[l, r]),
        };
        Ok(out)
    }

    fn cast(&mut self, ty: &ExpressionType, args: &[Expression]) -> Result<u32> {
        use ExpressionType as T;

        let ty_id = self.expr_type_id(ty)?;
        let mut values = Vec::with_capacity(args.len());
        let mut types = Vec::with_capacity(args.len());
        for arg in args {
            types.push(self.analysis.type_of(arg)?);
            values.push(self.value(arg)?);
        }
        match (ty, types.as_slice(), values.as_slice()) {
            (_, [from], [value]) if from == ty => Ok(*value),
            (T::Primitive(to), [T::Primitive(from)], [value]) => self.convert(*from, *to, ty_id, *value),
            (T::Vector(to, n), [T::Vector(from, m)], [value]) if n == m => self.convert(*from, *to, ty_id, *value),
            (T::Vector(_, n), [T::Primitive(_)], [value]) => {
                Ok(self.value_instr(Op::CompositeConstruct, ty_id, &vec![*value; *n as usize]))
            }
            _ => Ok(self.value_instr(Op::CompositeConstruct, ty_id, &values)),
        }
    }

    fn convert(&mut self, from: PrimitiveType, to: PrimitiveType, ty: u32, value: u32) -> Result<u32> {
        use PrimitiveType as P;

        let op = match (from, to) {
            _ if from == to => return Ok(value),
            (P::F32 | P::F64, P::I32) => Op::ConvertFToS,
            (P::F32 | P::F64, P::U32) => Op::ConvertFToU,
            (P::I32, P::F32 | P::F64) => Op::ConvertSToF,
            (P::U32, P::F32 | P::F64) => Op::ConvertUToF,
            (P::F32, P::F64) | (P::F64, P::F32) => Op::FConvert,
            (P::I32, P::U32) | (P::U32, P::I32) => Op::Bitcast,
            _ => bail!("cannot convert {} to {}", from, to),
        };
        Ok(self.value_instr(op, ty, &[value]))
    }

    fn call(&mut self, callee: &Expression, args: &[Expression], ty: &ExpressionType) -> Result<u32> {
        match self.analysis.type_of(callee)? {
            ExpressionType::Function(id) => {
                let fid = *self
                    .functions
                    .get(&id)
                    .ok_or_else(|| anyhow!("function {} has no id", self.analysis.decl(id).name))?;
                let mut operands = vec![fid];
                for arg in args {
                    let arg_ty = self.analysis.type_of(arg)?;
                    let value = self.value(arg)?;
                    let tmp = self.local_variable(&arg_ty, None)?;
                    self.emit(Op::Store).push(tmp).push(value).build();
                    operands.push(tmp);
                }
                let ret = self.expr_type_id(ty)?;
                Ok(self.value_instr(Op::FunctionCall, ret, &operands))
            }
            ExpressionType::Method(_, IntrinsicType::SampleTexture) => {
                let ExpressionKind::AccessMember { expr: sampler, .. } = &callee.kind else {
                    bail!("Sample must be called on a sampler");
                };
                let [coords] = args else {
                    bail!("Sample takes one coordinate argument");
                };
                let sampler = self.value(sampler)?;
                let coords = self.value(coords)?;
                let ty = self.expr_type_id(ty)?;
                match self.func.stage {
                    // Implicit derivatives only exist in fragment shaders.
                    Some(ShaderStage::Vertex | ShaderStage::Compute) => {
                        let lod = self.constant_id(&ConstantValue::F32(0.0))?;
                        let operands = [sampler, coords, spirv::ImageOperands::LOD.bits(), lod];
                        Ok(self.value_instr(Op::ImageSampleExplicitLod, ty, &operands))
                    }
                    _ => Ok(self.value_instr(Op::ImageSampleImplicitLod, ty, &[sampler, coords])),
                }
            }
            other => bail!("{} is not callable", other),
        }
    }

    fn intrinsic(&mut self, intrinsic: IntrinsicType, args: &[Expression], ty: &ExpressionType) -> Result<u32> {
        use spirv::GLOp;
        use PrimitiveType as P;

        let base = match args.first() {
            Some(arg) => self.analysis.type_of(arg)?.base_type(),
            None => None,
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.value(arg)?);
        }
        let ty_id = self.expr_type_id(ty)?;
        let by_base = |f: GLOp, s: GLOp, u: GLOp| match base {
            Some(P::I32) => s,
            Some(P::U32) => u,
            _ => f,
        };
        let op = match intrinsic {
            IntrinsicType::DotProduct => return Ok(self.value_instr(Op::Dot, ty_id, &values)),
            IntrinsicType::CrossProduct => GLOp::Cross,
            IntrinsicType::Exp => GLOp::Exp,
            IntrinsicType::Length => GLOp::Length,
            IntrinsicType::Normalize => GLOp::Normalize,
            IntrinsicType::Pow => GLOp::Pow,
            IntrinsicType::Reflect => GLOp::Reflect,
            IntrinsicType::Sqrt => GLOp::Sqrt,
            IntrinsicType::Lerp => GLOp::FMix,
            IntrinsicType::Max => by_base(GLOp::FMax, GLOp::SMax, GLOp::UMax),
            IntrinsicType::Min => by_base(GLOp::FMin, GLOp::SMin, GLOp::UMin),
            IntrinsicType::Clamp => by_base(GLOp::FClamp, GLOp::SClamp, GLOp::UClamp),
            IntrinsicType::SampleTexture => bail!("Sample must be called on a sampler"),
        };
        let set = self.glsl_std();
        let mut operands = vec![set, op as u32];
        operands.extend(values);
        Ok(self.value_instr(Op::ExtInst, ty_id, &operands))
    }
}

fn primitive_type(ty: PrimitiveType) -> SpirvType {
    match ty {
        PrimitiveType::Bool => SpirvType::Bool,
        PrimitiveType::I32 => SpirvType::Int { signed: true },
        PrimitiveType::U32 => SpirvType::Int { signed: false },
        PrimitiveType::F32 => SpirvType::Float { width: 32 },
        PrimitiveType::F64 => SpirvType::Float { width: 64 },
    }
}

fn builtin_of(builtin: BuiltinEntry) -> spirv::BuiltIn {
    match builtin {
        BuiltinEntry::FragCoord => spirv::BuiltIn::FragCoord,
        BuiltinEntry::FragDepth => spirv::BuiltIn::FragDepth,
        BuiltinEntry::Position => spirv::BuiltIn::Position,
        BuiltinEntry::VertexIndex => spirv::BuiltIn::VertexIndex,
        BuiltinEntry::GlobalInvocationIndices => spirv::BuiltIn::GlobalInvocationId,
        BuiltinEntry::LocalInvocationIndices => spirv::BuiltIn::LocalInvocationId,
        BuiltinEntry::WorkgroupIndices => spirv::BuiltIn::WorkgroupId,
    }
}

fn arith_op(op: BinaryOp, base: PrimitiveType) -> Result<Op> {
    use PrimitiveType as P;

    let out = match (op, base) {
        (BinaryOp::Add, P::F32 | P::F64) => Op::FAdd,
        (BinaryOp::Add, P::I32 | P::U32) => Op::IAdd,
        (BinaryOp::Subtract, P::F32 | P::F64) => Op::FSub,
        (BinaryOp::Subtract, P::I32 | P::U32) => Op::ISub,
        (BinaryOp::Multiply, P::F32 | P::F64) => Op::FMul,
        (BinaryOp::Multiply, P::I32 | P::U32) => Op::IMul,
        (BinaryOp::Divide, P::F32 | P::F64) => Op::FDiv,
        (BinaryOp::Divide, P::I32) => Op::SDiv,
        (BinaryOp::Divide, P::U32) => Op::UDiv,
        _ => bail!("operator {} is not defined for {}", op.symbol(), base),
    };
    Ok(out)
}

fn comparison_op(op: BinaryOp, base: PrimitiveType) -> Result<Op> {
    use BinaryOp as B;
    use PrimitiveType as P;

    let out = match (base, op) {
        (P::Bool, B::CompEq) => Op::LogicalEqual,
        (P::Bool, B::CompNe) => Op::LogicalNotEqual,
        (P::F32 | P::F64, B::CompEq) => Op::FOrdEqual,
        (P::F32 | P::F64, B::CompNe) => Op::FOrdNotEqual,
        (P::F32 | P::F64, B::CompLt) => Op::FOrdLessThan,
        (P::F32 | P::F64, B::CompLe) => Op::FOrdLessThanEqual,
        (P::F32 | P::F64, B::CompGt) => Op::FOrdGreaterThan,
        (P::F32 | P::F64, B::CompGe) => Op::FOrdGreaterThanEqual,
        (P::I32 | P::U32, B::CompEq) => Op::IEqual,
        (P::I32 | P::U32, B::CompNe) => Op::INotEqual,
        (P::I32, B::CompLt) => Op::SLessThan,
        (P::I32, B::CompLe) => Op::SLessThanEqual,
        (P::I32, B::CompGt) => Op::SGreaterThan,
        (P::I32, B::CompGe) => Op::SGreaterThanEqual,
        (P::U32, B::CompLt) => Op::ULessThan,
        (P::U32, B::CompLe) => Op::ULessThanEqual,
        (P::U32, B::CompGt) => Op::UGreaterThan,
        (P::U32, B::CompGe) => Op::UGreaterThanEqual,
        _ => bail!("operator {} is not defined for {}", op.symbol(), base),
    };
    Ok(out)
}
