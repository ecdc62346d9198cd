//! NZSL compiler. `Compiler` runs the whole pipeline over one source file;
//! the passes are also usable on their own through the submodules.
use anyhow::{bail, Context, Result};

pub mod ast;
pub mod common;
pub mod error;
pub mod glsl;
pub mod lang;
pub mod lex;
pub mod module;
pub mod opt;
pub mod sema;
pub mod spirv;
pub mod syn;
pub mod validate;

use self::ast::serialize::{deserialize_module, serialize_module};
use self::ast::{Module, ShaderStage};
use self::glsl::{GlslEnvironment, GlslWriter};
use self::lang::LangWriter;
use self::module::{expand_imports, MemoryModuleResolver, ModuleResolver};
use self::opt::OptionSet;
use self::spirv::{SpirvPrinter, SpirvWriter, SpirvWriterOptions};
use self::validate::ValidationOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Resolved and optimized NZSL source.
    Nzsl,
    Glsl,
    #[default]
    Spirv,
    /// SPIR-V in assembly form.
    SpirvAsm,
    /// Checked module in binary form (`.nzslb`), loadable by
    /// [`Compiler::compile_binary`].
    NzslBinary,
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub format: OutputFormat,
    /// Names of the options to enable.
    pub options: Vec<String>,
    /// Stage to generate. GLSL needs one when a module has several entries.
    pub stage: Option<ShaderStage>,
    pub glsl: GlslEnvironment,
    pub spirv: SpirvWriterOptions,
    /// Stop after semantic analysis, leaving options and compile-time
    /// branches unresolved. Only NZSL outputs can be produced this way.
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Nzsl(String),
    Glsl(String),
    Spirv(Vec<u32>),
    SpirvAsm(String),
    NzslBinary(Vec<u8>),
}
impl Output {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Output::Nzsl(x) | Output::Glsl(x) | Output::SpirvAsm(x) => Some(x),
            Output::Spirv(_) | Output::NzslBinary(_) => None,
        }
    }
    pub fn as_words(&self) -> Option<&[u32]> {
        match self {
            Output::Spirv(x) => Some(x),
            _ => None,
        }
    }
    /// Text as UTF-8, SPIR-V words as little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Output::Spirv(words) => words.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Output::NzslBinary(x) => x.clone(),
            Output::Nzsl(x) | Output::Glsl(x) | Output::SpirvAsm(x) => x.as_bytes().to_vec(),
        }
    }
    /// Output bytes as a comma-separated list of decimal values, to be
    /// `#include`d into a C or C++ array initializer.
    pub fn to_header(&self) -> String {
        self.to_bytes().iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",")
    }
}

pub struct Compiler {
    resolver: Box<dyn ModuleResolver>,
    options: CompileOptions,
}
impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            resolver: Box::new(MemoryModuleResolver::new()),
            options,
        }
    }
    /// Resolves imports through `resolver`. Resolved modules stay cached
    /// in it across compilations.
    pub fn with_resolver(mut self, resolver: impl ModuleResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }
    pub fn options_mut(&mut self) -> &mut CompileOptions {
        &mut self.options
    }

    pub fn compile(&mut self, source: &str) -> Result<Output> {
        let module = syn::parse_source(source)?;
        tracing::debug!(name = ?module.metadata.module_name, "parsed module");
        self.compile_module(&module)
    }

    /// Compiles a module stored by the `NzslBinary` format.
    pub fn compile_binary(&mut self, bytes: &[u8]) -> Result<Output> {
        let module = deserialize_module(bytes)?;
        tracing::debug!(name = ?module.metadata.module_name, "loaded binary module");
        self.compile_module(&module)
    }

    pub fn compile_module(&mut self, module: &Module) -> Result<Output> {
        let module = expand_imports(module, self.resolver.as_mut())?;
        tracing::debug!(imported = module.imported_modules.len(), "expanded imports");

        let analysis = sema::analyze(&module)?;
        if self.options.partial {
            let out = match self.options.format {
                OutputFormat::Nzsl => Output::Nzsl(LangWriter::new().generate(&module)),
                OutputFormat::NzslBinary => Output::NzslBinary(serialize_module(&module)),
                format => bail!("partial compilation cannot produce {:?} output", format),
            };
            return Ok(out);
        }
        let option_set = OptionSet::from_names(&analysis, &self.options.options)?;
        let optimized = opt::optimize(&module, &analysis, option_set)?;
        let analysis = sema::analyze(&optimized).context("cannot analyze optimized module")?;

        let validation = ValidationOptions {
            stages: self.options.stage.into_iter().collect(),
        };
        validate::validate(&optimized, &analysis, &validation)?;

        let out = match self.options.format {
            OutputFormat::Nzsl => Output::Nzsl(LangWriter::new().generate(&optimized)),
            OutputFormat::Glsl => {
                let writer = GlslWriter::new(self.options.glsl.clone());
                Output::Glsl(writer.generate(&optimized, &analysis, self.options.stage)?)
            }
            OutputFormat::Spirv => {
                let writer = SpirvWriter::new(self.options.spirv.clone());
                Output::Spirv(writer.generate(&optimized, &analysis)?)
            }
            OutputFormat::SpirvAsm => {
                let words = SpirvWriter::new(self.options.spirv.clone()).generate(&optimized, &analysis)?;
                Output::SpirvAsm(SpirvPrinter::default().print(&words)?)
            }
            OutputFormat::NzslBinary => Output::NzslBinary(serialize_module(&optimized)),
        };
        Ok(out)
    }
}
impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}
