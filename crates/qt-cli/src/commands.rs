use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use qt_object::Object;
use qt_resolve::{Mode, ObjectCache};
use qt_source::{RepositoryConfig, Session, SourceError, StoreOptions};
use qt_store::StoreError;
use qt_types::{ObjectName, QPath, ReleaseId};
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.repo)?;
    let json = matches!(cli.format, OutputFormat::Json);
    match cli.command {
        Command::Init(args) => cmd_init(&cli.repo, config, args),
        Command::Store(args) => cmd_store(config, args, json),
        Command::Fetch(args) => cmd_fetch(config, args),
        Command::Waste(args) => cmd_waste(config, args, json),
        Command::Resolve(args) => cmd_resolve(config, args),
        Command::Deps(args) => cmd_deps(config, args, json),
        Command::Lint(args) => cmd_lint(config, args, json),
        Command::Show(args) => cmd_show(config, args, json),
    }
}

/// `qt.toml` under `repo`, or defaults rooted at `repo`.
fn load_config(repo: &Path) -> anyhow::Result<RepositoryConfig> {
    let path = repo.join(RepositoryConfig::FILE_NAME);
    if path.is_file() {
        debug!(config = %path.display(), "loading repository config");
        return Ok(RepositoryConfig::load(&path)?);
    }
    Ok(RepositoryConfig {
        root: repo.to_path_buf(),
        ..RepositoryConfig::default()
    })
}

/// Print every diagnostic of `error` and turn it into a command failure.
fn report(error: SourceError) -> anyhow::Error {
    for diagnostic in error.to_diagnostics().iter() {
        eprintln!("{} {}", "✗".red().bold(), diagnostic);
    }
    anyhow::Error::new(error)
}

fn store_failure(error: StoreError) -> anyhow::Error {
    eprintln!("{} {}", "✗".red().bold(), error.to_diagnostic());
    anyhow::Error::new(error)
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_init(repo: &Path, config: RepositoryConfig, args: InitArgs) -> anyhow::Result<()> {
    let release = ReleaseId::parse(&args.release)?;
    let config_path = repo.join(RepositoryConfig::FILE_NAME);
    if !config_path.exists() {
        std::fs::create_dir_all(repo)
            .with_context(|| format!("creating {}", repo.display()))?;
        let mut written = config.clone();
        written.root = ".".into();
        std::fs::write(&config_path, written.to_toml_string()?)
            .with_context(|| format!("writing {}", config_path.display()))?;
        println!("  {} {}", "created:".green(), config_path.display());
    }
    let session = Session::new(config).map_err(report)?;
    session.init(&release).map_err(report)?;
    println!("{} Initialized release {}", "✓".green().bold(), release.to_string().yellow());
    Ok(())
}

fn cmd_store(config: RepositoryConfig, args: StoreArgs, json: bool) -> anyhow::Result<()> {
    let release = ReleaseId::parse(&args.release)?;
    let mut items = Vec::with_capacity(args.items.len());
    for item in &args.items {
        let (qpath, file) = item
            .split_once('=')
            .with_context(|| format!("expected QPATH=FILE, got `{item}`"))?;
        let data = std::fs::read(file).with_context(|| format!("reading {file}"))?;
        items.push((QPath::parse(qpath)?, data));
    }
    let options = StoreOptions {
        expected_digest: args.digest,
        user: args.user,
        at: None,
    };

    let session = Session::new(config).map_err(report)?;
    let store = session.open(&release, false).map_err(report)?;
    let results = store.store_list(&items, &options);

    let mut failed = 0;
    let mut summary = Vec::new();
    for ((path, _), result) in items.iter().zip(results) {
        match result {
            Ok(stored) => {
                if json {
                    summary.push(serde_json::json!({
                        "path": path.as_str(),
                        "changed": stored.changed,
                        "objects": stored.objects,
                    }));
                } else if stored.changed {
                    println!("  {} {}", "stored:".green(), path);
                    for (object, changed) in &stored.objects {
                        let state = if *changed { "changed" } else { "unchanged" };
                        println!("    {} {}", object.cyan(), state.dimmed());
                    }
                } else {
                    println!("  {} {}", "unchanged:".dimmed(), path);
                }
            }
            Err(e) => {
                failed += 1;
                if json {
                    summary.push(serde_json::json!({
                        "path": path.as_str(),
                        "error": e.code(),
                        "diagnostics": e.to_diagnostics().iter().map(ToString::to_string).collect::<Vec<_>>(),
                    }));
                } else {
                    report(e);
                }
            }
        }
    }
    if json {
        print_json(&serde_json::Value::Array(summary))?;
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} sources not stored", items.len());
    }
    Ok(())
}

fn cmd_fetch(config: RepositoryConfig, args: FetchArgs) -> anyhow::Result<()> {
    use std::io::Write;

    let release = ReleaseId::parse(&args.release)?;
    let path = QPath::parse(&args.path)?;
    let session = Session::new(config).map_err(report)?;
    let store = session.open(&release, true).map_err(report)?;
    let data = store.fetch(&path).map_err(report)?;
    std::io::stdout().write_all(&data)?;
    Ok(())
}

fn cmd_waste(config: RepositoryConfig, args: WasteArgs, json: bool) -> anyhow::Result<()> {
    let release = ReleaseId::parse(&args.release)?;
    let paths = args
        .paths
        .iter()
        .map(|p| QPath::parse(p))
        .collect::<Result<Vec<_>, _>>()?;
    let session = Session::new(config).map_err(report)?;
    let store = session.open(&release, false).map_err(report)?;

    let mut failed = 0;
    let mut summary = BTreeMap::new();
    for (path, result) in paths.iter().zip(store.waste_list(&paths)) {
        match result {
            Ok(removed) => {
                summary.insert(path.to_string(), serde_json::Value::Bool(removed));
                if !json {
                    let label = if removed { "wasted:".green() } else { "absent:".dimmed() };
                    println!("  {} {}", label, path);
                }
            }
            Err(e) => {
                failed += 1;
                summary.insert(path.to_string(), serde_json::Value::String(e.code().into()));
                if !json {
                    report(e);
                }
            }
        }
    }
    if json {
        print_json(&serde_json::json!(summary))?;
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} sources not wasted", paths.len());
    }
    Ok(())
}

fn cmd_resolve(config: RepositoryConfig, args: ResolveArgs) -> anyhow::Result<()> {
    let release = ReleaseId::parse(&args.release)?;
    let path = QPath::parse(&args.path)?;
    let mut texts = BTreeMap::new();
    for text in &args.text {
        let (name, value) = text
            .split_once('=')
            .with_context(|| format!("expected NAME=VALUE, got `{text}`"))?;
        texts.insert(name.to_string(), value.to_string());
    }

    let session = Session::new(config).map_err(report)?;
    let mode = match &args.mode {
        Some(letters) => letters.parse::<Mode>()?,
        None => session.mode(),
    };
    let store = session.open(&release, true).map_err(report)?;
    let mut cache = ObjectCache::new();
    let (text, error) = store
        .resolve(&path, mode, &mut cache, &texts)
        .map_err(report)?;
    print!("{text}");
    if let Some(e) = error {
        eprintln!("{} {}", "✗".red().bold(), e.to_diagnostic());
        anyhow::bail!("{} not fully resolved", path);
    }
    Ok(())
}

fn cmd_deps(config: RepositoryConfig, args: DepsArgs, json: bool) -> anyhow::Result<()> {
    let release = ReleaseId::parse(&args.release)?;
    let names = args
        .objects
        .iter()
        .map(|n| ObjectName::parse(n))
        .collect::<Result<Vec<_>, _>>()?;
    let session = Session::new(config).map_err(report)?;
    let store = session.open(&release, true).map_err(report)?;

    let found: Vec<Vec<String>> = if args.deep {
        store.objects().dependencies_deep(&names).map_err(store_failure)?
    } else {
        store
            .objects()
            .get_dependencies(&names)
            .into_iter()
            .collect::<Result<_, _>>()
            .map_err(store_failure)?
    };

    let mut summary = BTreeMap::new();
    for (name, referrers) in names.iter().zip(found) {
        if !json {
            println!("{} ({})", name.to_string().cyan().bold(), referrers.len());
            for referrer in &referrers {
                println!("  {referrer}");
            }
        }
        summary.insert(name.to_string(), referrers);
    }
    if json {
        print_json(&serde_json::json!(summary))?;
    }
    Ok(())
}

fn cmd_lint(config: RepositoryConfig, args: LintArgs, json: bool) -> anyhow::Result<()> {
    let release = ReleaseId::parse(&args.release)?;
    let paths = args
        .paths
        .iter()
        .map(|p| QPath::parse(p))
        .collect::<Result<Vec<_>, _>>()?;
    let session = Session::new(config).map_err(report)?;
    let store = session.open(&release, true).map_err(report)?;

    let mut findings = 0;
    let mut summary = BTreeMap::new();
    for (path, result) in paths.iter().zip(store.lint_list(&paths)) {
        let found = match result {
            Ok(found) => found,
            Err(e) => e.to_diagnostics(),
        };
        findings += found.len();
        if !json {
            if found.is_empty() {
                println!("  {} {}", "clean:".green(), path);
            }
            for diagnostic in found.iter() {
                println!("  {} {}", "✗".red().bold(), diagnostic);
            }
        }
        summary.insert(path.to_string(), found);
    }
    if json {
        print_json(&serde_json::to_value(&summary)?)?;
    }
    if findings > 0 {
        anyhow::bail!("{findings} findings in {} sources", paths.len());
    }
    Ok(())
}

fn cmd_show(config: RepositoryConfig, args: ShowArgs, json: bool) -> anyhow::Result<()> {
    let release = ReleaseId::parse(&args.release)?;
    let session = Session::new(config).map_err(report)?;
    let store = session.open(&release, true).map_err(report)?;

    if args.target.starts_with('/') {
        let path = QPath::parse(&args.target)?;
        let nature = store.nature(&path).map_err(report)?;
        let meta = store.meta(&path).map_err(report)?;
        if json {
            return print_json(&serde_json::json!({
                "path": path.as_str(),
                "nature": nature,
                "tags": nature.tags(),
                "meta": meta,
                "digest": meta.digest,
            }));
        }
        println!("{} {}", "source".bold(), path.to_string().yellow());
        println!("  nature:   {}", nature);
        println!("  digest:   {}", meta.digest.cyan());
        if !meta.mu.is_empty() {
            println!("  modified: {} by {}", meta.modified(), meta.mu);
        }
        return Ok(());
    }

    let name = ObjectName::parse(&args.target)?;
    let object: Object = store
        .objects()
        .fetch(&name)
        .map_err(store_failure)?;
    let record = object
        .to_record()
        .map_err(|e| anyhow::anyhow!(e.to_diagnostic().to_string()))?;
    if json {
        println!("{}", String::from_utf8_lossy(&record));
        return Ok(());
    }
    println!("{} {}", "object".bold(), name.to_string().cyan());
    println!("  defined in {} line {}", object.source.to_string().yellow(), object.line);
    println!("{}", String::from_utf8_lossy(&record));
    Ok(())
}
