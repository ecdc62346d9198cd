use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};

use nzslc::compiler::{
    ast::ShaderStage,
    common::Span,
    error::error_span,
    glsl::GlslEnvironment,
    module::FilesystemModuleResolver,
    spirv::SpirvWriterOptions,
    CompileOptions, Compiler, OutputFormat,
};

/// Compiles NZSL shaders to SPIR-V or GLSL. Inputs ending in `.nzslb` are
/// read as binary modules.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("format").args(["glsl", "spirv", "nzsl", "spirv_asm", "compile"])))]
struct Arguments {
    #[arg()]
    input: PathBuf,
    /// Output file. Defaults to the input path with the format's extension
    /// appended.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Generate GLSL source.
    #[arg(long)]
    glsl: bool,
    /// Generate a SPIR-V binary (default).
    #[arg(long)]
    spirv: bool,
    /// Print the resolved and optimized module as NZSL.
    #[arg(long)]
    nzsl: bool,
    /// Generate SPIR-V in assembly form.
    #[arg(long)]
    spirv_asm: bool,
    /// Store the checked module in binary form (`.nzslb`).
    #[arg(short, long)]
    compile: bool,
    /// Write the output as a comma-separated byte list to be included in
    /// C or C++ sources.
    #[arg(long)]
    header_file: bool,
    /// Stop after checking, keeping options unresolved. Needs --nzsl or
    /// --compile.
    #[arg(short, long)]
    partial: bool,

    /// Stage to generate: vert, frag or compute.
    #[arg(long, value_parser = parse_stage)]
    stage: Option<ShaderStage>,
    /// Sets an option, as `NAME` or `NAME=true|false`. Can be repeated.
    #[arg(long = "option", value_name = "NAME[=VALUE]")]
    options: Vec<String>,

    /// Target OpenGL version, as `major.minor`.
    #[arg(long, value_parser = parse_version, default_value = "3.3")]
    gl_version: (u32, u32),
    /// Target OpenGL ES instead of desktop OpenGL.
    #[arg(long)]
    gl_es: bool,
    /// Flips the Y coordinate of vertex positions through a uniform.
    #[arg(long)]
    gl_flip_y: bool,
    /// Target SPIR-V version, as `major.minor`.
    #[arg(long, value_parser = parse_version, default_value = "1.0")]
    spirv_version: (u32, u32),

    /// Directory searched for imported modules. Can be repeated.
    #[arg(short, long = "module-dir", value_name = "DIR")]
    module_dirs: Vec<PathBuf>,
    /// Increases log verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}
impl Arguments {
    fn format(&self) -> OutputFormat {
        if self.glsl {
            OutputFormat::Glsl
        } else if self.nzsl {
            OutputFormat::Nzsl
        } else if self.spirv_asm {
            OutputFormat::SpirvAsm
        } else if self.compile {
            OutputFormat::NzslBinary
        } else {
            OutputFormat::Spirv
        }
    }

    fn compile_options(&self) -> CompileOptions {
        let (gl_major_version, gl_minor_version) = self.gl_version;
        let (spirv_major_version, spirv_minor_version) = self.spirv_version;
        CompileOptions {
            format: self.format(),
            options: self.options.clone(),
            stage: self.stage,
            glsl: GlslEnvironment {
                gl_major_version,
                gl_minor_version,
                gl_es: self.gl_es,
                flip_y_position: self.gl_flip_y,
            },
            spirv: SpirvWriterOptions {
                spirv_major_version,
                spirv_minor_version,
                ..SpirvWriterOptions::default()
            },
            partial: self.partial,
        }
    }

    fn output_path(&self) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }
        let ext = match self.format() {
            OutputFormat::Glsl => "glsl",
            OutputFormat::Spirv => "spv",
            OutputFormat::SpirvAsm => "spvasm",
            OutputFormat::Nzsl => "nzsl",
            OutputFormat::NzslBinary => "nzslb",
        };
        let mut path = self.input.clone().into_os_string();
        path.push(".");
        path.push(ext);
        if self.header_file {
            path.push(".h");
        }
        path.into()
    }
}

fn parse_stage(text: &str) -> Result<ShaderStage, String> {
    ShaderStage::from_name(text).ok_or_else(|| format!("unknown stage '{}', expected vert, frag or compute", text))
}

fn parse_version(text: &str) -> Result<(u32, u32), String> {
    let (major, minor) = text.split_once('.').unwrap_or((text, "0"));
    match (major.parse(), minor.parse()) {
        (Ok(major), Ok(minor)) => Ok((major, minor)),
        _ => Err(format!("invalid version '{}', expected major.minor", text)),
    }
}

/// Renders an error with the offending source line and a caret underline.
fn render_error(path: &str, source: &str, err: &anyhow::Error) -> String {
    let mut out = format!("error: {:#}", err);
    let Some(span) = error_span(err).filter(Span::is_valid) else {
        return out;
    };
    let Some(line) = source.lines().nth(span.start.line as usize - 1) else {
        return out;
    };
    let start = span.start.column.max(1) as usize;
    let end = if span.end.line == span.start.line {
        (span.end.column as usize).max(start)
    } else {
        line.chars().count().max(start)
    };
    let number = span.start.line.to_string();
    let pad = " ".repeat(number.len());
    out.push_str(&format!("\n{}--> {}:{}:{}", pad, path, span.start.line, span.start.column));
    out.push_str(&format!("\n{} |", pad));
    out.push_str(&format!("\n{} | {}", number, line));
    out.push_str(&format!(
        "\n{} | {}{}",
        pad,
        " ".repeat(start - 1),
        "^".repeat(end - start + 1)
    ));
    out
}

/// Input file contents: NZSL source, or a binary module.
enum Input {
    Source(String),
    Binary(Vec<u8>),
}
impl Input {
    fn read(path: &Path) -> Result<Self> {
        let input = if path.extension().is_some_and(|x| x == "nzslb") {
            Input::Binary(fs::read(path)?)
        } else {
            Input::Source(fs::read_to_string(path)?)
        };
        Ok(input)
    }
    fn source(&self) -> &str {
        match self {
            Input::Source(x) => x,
            Input::Binary(_) => "",
        }
    }
}

fn run(args: &Arguments, input: &Input) -> Result<()> {
    let mut resolver = FilesystemModuleResolver::new();
    for dir in &args.module_dirs {
        resolver.register_directory(dir)?;
    }
    let mut compiler = Compiler::new(args.compile_options()).with_resolver(resolver);
    let output = match input {
        Input::Source(source) => compiler.compile(source)?,
        Input::Binary(bytes) => compiler.compile_binary(bytes)?,
    };
    let bytes = if args.header_file {
        output.to_header().into_bytes()
    } else {
        output.to_bytes()
    };

    let path = args.output_path();
    let mut w = {
        let f = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        io::BufWriter::new(f)
    };
    w.write_all(&bytes)?;
    w.flush()?;
    tracing::info!(output = %path.display(), "compiled {}", args.input.display());
    Ok(())
}

fn main() -> ExitCode {
    let args = Arguments::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let input = match Input::read(&args.input) {
        Ok(x) => x,
        Err(e) => {
            let err = e.context(format!("cannot read {}", args.input.display()));
            eprintln!("error: {:#}", err);
            return ExitCode::FAILURE;
        }
    };
    match run(&args, &input) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", render_error(&args.input.display().to_string(), input.source(), &err));
            ExitCode::FAILURE
        }
    }
}
