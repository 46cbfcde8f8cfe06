use std::path::{Component, Path, PathBuf};
use std::sync::Once;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use hookweave_core::{
    ClassDocument, Diagnostic, HookDocument, MissNotifier, SiteMiss, WeaveContext,
    desc::MethodDescriptor,
    exec::{Interpreter, Value},
    insn::disassemble,
};

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "hookweave=warn,hookweave_core=warn,hookweave_cli=info";


#[derive(Debug, Parser)]
#[command(
    name = "hookweave",
    author,
    version,
    about = "Weave hook handlers into compiled method bodies",
    long_about = None
)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply a hook document to a class document.
    Weave {
        /// Hook document (.yaml, .yml, .json or .toml)
        #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path)]
        hooks: PathBuf,
        /// Class document to transform
        #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path)]
        classes: PathBuf,
        /// Where to write the woven classes; defaults to stdout as JSON
        #[arg(short, long, value_name = "FILE", value_parser = parse_sanitized_path)]
        output: Option<PathBuf>,
        /// Fail when a hook cannot be set up or fails on a class
        #[arg(long)]
        strict: bool,
    },
    /// Disassemble the methods of a class document.
    Dump {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        classes: PathBuf,
        /// Only this class (internal or dotted name)
        #[arg(long)]
        class: Option<String>,
    },
    /// Execute a static method, optionally after weaving hooks into it.
    Run {
        #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path)]
        classes: PathBuf,
        #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path)]
        hooks: Option<PathBuf>,
        /// `owner.name(desc)`, e.g. `demo/Calc.compute(I)I`
        #[arg(value_name = "METHOD")]
        method: String,
        /// Arguments, parsed according to the method descriptor
        #[arg(value_name = "ARGS", allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

fn init_tracing() {
    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = std::env::var("HOOKWEAVE_LOG")
            .ok()
            .and_then(|raw| filter_expr_from(&raw))
            .or_else(|| std::env::var("RUST_LOG").ok().and_then(|raw| filter_expr_from(&raw)));

        let builder = fmt().with_writer(std::io::stderr).with_target(true);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

/// Splits `owner.name(desc)` at the last dot before the descriptor.
fn parse_method_ref(raw: &str) -> anyhow::Result<(String, String, String)> {
    let open = raw
        .find('(')
        .with_context(|| format!("'{}' has no descriptor; expected owner.name(desc)", raw))?;
    let (path, desc) = raw.split_at(open);
    let dot = path
        .rfind('.')
        .with_context(|| format!("'{}' has no owner; expected owner.name(desc)", raw))?;
    let owner = hookweave_core::desc::internal_class_name(&path[..dot]);
    let name = &path[dot + 1..];
    if owner.is_empty() || name.is_empty() {
        bail!("'{}' is not of the form owner.name(desc)", raw);
    }
    MethodDescriptor::parse(desc).with_context(|| format!("invalid descriptor in '{}'", raw))?;
    Ok((owner, name.to_string(), desc.to_string()))
}

/// Reports important misses on stderr.
struct StderrNotifier;

impl MissNotifier for StderrNotifier {
    fn notify(&self, miss: &SiteMiss) {
        eprintln!("warning: important hook '{}' matched nothing in {}", miss.hook, miss.class);
    }
}

struct WeaveSummary {
    sites: usize,
    failures: usize,
    setup_errors: usize,
}

fn weave_document(hooks: &HookDocument, classes: &mut ClassDocument) -> WeaveSummary {
    let (weaver, errors) = hooks.weaver();
    for err in &errors {
        eprintln!("error: {}", err);
    }
    let mut summary = WeaveSummary {
        sites: 0,
        failures: 0,
        setup_errors: errors.len(),
    };
    for class in &mut classes.classes {
        let mut ctx = WeaveContext::new()
            .with_mapper(hooks.mapper())
            .with_notifier(std::sync::Arc::new(StderrNotifier));
        weaver.transform_class(class, &mut ctx);
        for diagnostic in ctx.diagnostics() {
            match diagnostic {
                Diagnostic::Woven {
                    hook, class, method, sites, ..
                } => {
                    summary.sites += sites;
                    eprintln!("woven {} into {}.{} ({} site(s))", hook, class, method, sites);
                }
                Diagnostic::NativeRollback { class, method } => {
                    eprintln!("rolled back native {}.{}", class, method);
                }
                Diagnostic::Failed { hook, class, error } => {
                    summary.failures += 1;
                    eprintln!("error: hook '{}' failed on {}: {}", hook, class, error);
                }
                Diagnostic::Missing(_) => {}
            }
        }
    }
    summary
}

fn weave_cmd(hooks: &Path, classes: &Path, output: Option<&Path>, strict: bool) -> anyhow::Result<()> {
    let hooks = HookDocument::load(hooks)?;
    let mut doc = ClassDocument::load(classes)?;
    let summary = weave_document(&hooks, &mut doc);
    if strict && (summary.setup_errors > 0 || summary.failures > 0) {
        bail!(
            "{} hook(s) failed setup and {} weave(s) failed",
            summary.setup_errors,
            summary.failures
        );
    }
    match output {
        Some(path) => {
            doc.save(path)?;
            println!("{} site(s) woven, written to {}", summary.sites, path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&doc)?),
    }
    Ok(())
}

fn dump_cmd(classes: &Path, only: Option<&str>) -> anyhow::Result<()> {
    let doc = ClassDocument::load(classes)?;
    let only = only.map(hookweave_core::desc::internal_class_name);
    let mut shown = 0;
    for class in doc.classes.iter().filter(|c| only.as_deref().is_none_or(|n| n == c.name)) {
        shown += 1;
        println!("class {}", class.name);
        for method in &class.methods {
            println!(
                "  {}{} [{}] stack={} locals={}",
                method.name, method.desc, method.access, method.max_stack, method.max_locals
            );
            for line in disassemble(&method.code).lines() {
                println!("  {}", line);
            }
            for block in &method.try_catch {
                println!(
                    "    try L{}..L{} -> L{} {}",
                    block.start.0,
                    block.end.0,
                    block.handler.0,
                    block.catch_type.as_deref().unwrap_or("any")
                );
            }
        }
    }
    if shown == 0 {
        bail!("no matching class in {}", classes.display());
    }
    Ok(())
}

fn run_cmd(classes: &Path, hooks: Option<&Path>, method: &str, args: &[String]) -> anyhow::Result<()> {
    let (owner, name, desc) = parse_method_ref(method)?;
    let parsed = MethodDescriptor::parse(&desc)?;
    if parsed.params.len() != args.len() {
        bail!("{} takes {} argument(s), got {}", method, parsed.params.len(), args.len());
    }
    let values = parsed
        .params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(idx, (ty, raw))| Value::parse(ty, raw).with_context(|| format!("argument {}", idx)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut doc = ClassDocument::load(classes)?;
    if let Some(hooks) = hooks {
        let hooks = HookDocument::load(hooks)?;
        weave_document(&hooks, &mut doc);
    }

    let mut interp = Interpreter::new();
    for class in doc.classes {
        interp.load(class);
    }
    match interp.invoke(&owner, &name, &desc, values) {
        Ok(Some(value)) => println!("{}", value),
        Ok(None) => println!("(void)"),
        Err(unwind) => bail!("{}.{}{}: {}", owner, name, desc, unwind),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let CliArgs { command } = CliArgs::parse();
    match command {
        Commands::Weave {
            hooks,
            classes,
            output,
            strict,
        } => weave_cmd(&hooks, &classes, output.as_deref(), strict),
        Commands::Dump { classes, class } => dump_cmd(&classes, class.as_deref()),
        Commands::Run {
            classes,
            hooks,
            method,
            args,
        } => run_cmd(&classes, hooks.as_deref(), &method, &args),
    }
}
