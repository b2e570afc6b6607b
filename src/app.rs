use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{error::ErrorKind, CommandFactory, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::failover;
use crate::filter::{self, FilterEngine, SelectionStyle};
use crate::output::{self, OutputFormat};
use crate::records::is_temporal_field;
use crate::runner::{self, Options, Runner, RunnerError};
use crate::view::PageSize;

fn print_banner() {
    println!();
    println!(
        "  recordharvest v{} - custom object records, fetched, filtered, exported",
        env!("CARGO_PKG_VERSION")
    );
    println!();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<10}: {}", label, value);
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn render_custom_help() -> String {
    let cmd = CliArgs::command();
    let mut out = format!(
        "{} {}\n",
        cmd.get_name(),
        cmd.get_version().unwrap_or_default()
    );
    if let Some(long_about) = cmd.get_long_about().or(cmd.get_about()) {
        out.push_str(&format!("\n{long_about}\n"));
    }
    out.push_str(&format!("\nUsage: {} [OPTIONS]\n\n", cmd.get_name()));

    let mut sections: Vec<(String, Vec<&clap::Arg>)> = Vec::new();
    for arg in cmd.get_arguments().filter(|a| !a.is_hide_set()) {
        let heading = arg.get_help_heading().unwrap_or("Options");
        match sections.iter_mut().find(|(h, _)| h == heading) {
            Some((_, args)) => args.push(arg),
            None => sections.push((heading.to_string(), vec![arg])),
        }
    }

    for (heading, args) in sections {
        out.push_str(&format!("{heading}:\n"));
        for arg in args {
            let mut flags: Vec<String> = Vec::new();
            if let Some(short) = arg.get_short() {
                flags.push(format!("-{short}"));
            }
            if let Some(long) = arg.get_long() {
                flags.push(format!("--{long}"));
            }
            for alias in arg.get_visible_aliases().unwrap_or_default() {
                flags.push(format!("--{alias}"));
            }
            let mut line = flags.join(", ");
            if arg.get_action().takes_values() {
                let value_name = arg
                    .get_value_names()
                    .and_then(|names| names.first())
                    .map(|name| name.as_str())
                    .unwrap_or("VALUE");
                line.push_str(&format!(" <{value_name}>"));
            }
            out.push_str(&format!("  {line}\n"));
            if let Some(help) = arg.get_help() {
                out.push_str(&format!("          {}\n", help.to_string().trim()));
            }
            out.push('\n');
        }
    }
    out
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "warn,recordharvest=debug",
        _ => "warn,recordharvest=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Debug)]
struct RunConfig {
    options: Options,
    verbose: u8,
    no_color: bool,
    field: Option<String>,
    values: Vec<String>,
    select_none: bool,
    style: SelectionStyle,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    list_values: bool,
    page: usize,
    page_size: PageSize,
    columns: Option<Vec<String>>,
    output: Option<String>,
    output_format: OutputFormat,
    export: bool,
    contact_list: Option<String>,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let api_key = args.api_key.or(cfg.api_key).unwrap_or_default();
    let object_key = args.object_key.or(cfg.object_key).unwrap_or_default();
    if api_key.trim().is_empty() || object_key.trim().is_empty() {
        return Err(RunnerError::MissingCredentials.to_string());
    }

    let endpoints = if !args.endpoint.is_empty() {
        args.endpoint
    } else {
        cfg.endpoints.unwrap_or_else(failover::default_endpoints)
    };
    let max_pages = args
        .max_pages
        .or(cfg.max_pages)
        .unwrap_or(runner::DEFAULT_MAX_PAGES);
    if max_pages == 0 {
        return Err("invalid max_pages 0, expected positive integer".to_string());
    }
    let timeout_seconds = args
        .timeout
        .or(cfg.timeout)
        .unwrap_or(runner::DEFAULT_TIMEOUT_SECONDS);
    if timeout_seconds == 0 {
        return Err("invalid timeout 0, expected positive integer".to_string());
    }
    let proxy = args
        .proxy
        .or(cfg.proxy)
        .filter(|p| !p.trim().is_empty());

    let page_size = match args.page_size.or(cfg.page_size) {
        Some(size) => PageSize::new(size).map_err(|e| format!("invalid page_size: {e}"))?,
        None => PageSize::default(),
    };
    let style = if args.single_value || cfg.single_value.unwrap_or(false) {
        SelectionStyle::Single
    } else {
        SelectionStyle::Multi
    };
    if style == SelectionStyle::Single && args.value.len() > 1 {
        return Err("single-value mode accepts a single --value".to_string());
    }

    let output = args.output.or(cfg.output);
    let output_format = match args.output_format.or(cfg.output_format) {
        Some(raw) => OutputFormat::parse(&raw)
            .ok_or_else(|| format!("invalid output format '{raw}', expected csv, json or text"))?,
        None => output
            .as_deref()
            .and_then(output::infer_format_from_path)
            .unwrap_or(OutputFormat::Csv),
    };

    let columns = args.columns.map(|raw| {
        raw.split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
    });

    Ok(RunConfig {
        options: Options {
            api_key,
            object_key,
            endpoints,
            max_pages,
            timeout_seconds,
            proxy,
        },
        verbose: args.verbose,
        no_color: args.no_color || cfg.no_color.unwrap_or(false),
        field: args.field,
        values: args.value,
        select_none: args.none,
        style,
        from: args.from.as_deref().and_then(filter::parse_instant),
        to: args.to.as_deref().and_then(filter::parse_instant),
        list_values: args.list_values,
        page: args.page.unwrap_or(1),
        page_size,
        columns: columns.filter(|c| !c.is_empty()),
        output,
        output_format,
        export: args.export,
        contact_list: args.contact_list,
    })
}

/// Point the engine at the requested field and selection.
fn apply_filter(engine: &mut FilterEngine, run: &RunConfig) -> Result<(), String> {
    if let Some(field) = run.field.as_deref() {
        engine.select_field(field).map_err(|e| e.to_string())?;
    }
    if is_temporal_field(engine.field()) {
        if run.from.is_some() || run.to.is_some() {
            engine
                .set_range(run.from, run.to)
                .map_err(|e| e.to_string())?;
        }
    } else if run.select_none {
        engine.select_none().map_err(|e| e.to_string())?;
    } else if !run.values.is_empty() {
        engine
            .select_values(run.values.iter().map(String::as_str))
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    print_banner();

    let runner = Runner::new(run.options.clone()).map_err(|e| e.to_string())?;

    format_kv_line("Object", &run.options.object_key);
    format_kv_line(
        "Upstream",
        &format!(
            "endpoints={} max-pages={} timeout={}s proxy={}",
            runner.failover().endpoints().len(),
            run.options.max_pages,
            run.options.timeout_seconds,
            format_bool(run.options.proxy.is_some()),
        ),
    );
    format_kv_line(
        "View",
        &format!(
            "page={} page-size={} selection={}",
            run.page,
            run.page_size.get(),
            match run.style {
                SelectionStyle::Single => "single",
                SelectionStyle::Multi => "multi",
            }
        ),
    );
    if let Some(path) = run.output.as_deref() {
        format_kv_line(
            "Output",
            &format!("{path} ({})", run.output_format.extension()),
        );
    }
    println!();

    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_style(
        ProgressStyle::with_template(":: Fetching :: [{elapsed_precise}] :: {msg}")
            .map_err(|e| format!("failed to build progress bar style: {e}"))?,
    );
    pb.set_message("page 1");

    let fetched = runner.run_with_progress(&pb).await;
    pb.finish_and_clear();
    let fetched = fetched.map_err(|e| e.to_string())?;

    format_kv_line(
        "Fetched",
        &format!(
            "{} records in {} page(s) from {} ({:.1}s)",
            fetched.records.len(),
            fetched.pages,
            fetched.endpoint.as_deref().unwrap_or("-"),
            fetched.elapsed.as_secs_f64()
        ),
    );
    if fetched.truncated {
        println!(
            "{}",
            format!(
                ":: Stopped after {} pages while more were available; raise --max-pages to fetch the rest.",
                fetched.pages
            )
            .yellow()
        );
    }

    if fetched.records.is_empty() {
        println!();
        println!("No records found.");
        return Ok(());
    }

    let mut engine = FilterEngine::new(fetched.records, fetched.catalog, run.style);
    engine.set_page_size(run.page_size);
    apply_filter(&mut engine, &run)?;

    if run.list_values {
        println!();
        println!(":: Values of {}:", engine.field());
        for value in engine.options() {
            println!("   {value}");
        }
    }

    let display_fields: Vec<String> = match run.columns.as_ref() {
        Some(columns) => {
            if let Some(unknown) = columns.iter().find(|c| !engine.catalog().contains(c)) {
                return Err(format!("unknown column '{unknown}'"));
            }
            columns.clone()
        }
        None => engine.catalog().fields().to_vec(),
    };

    let field = engine.field().to_string();
    let label = engine.selection_label();
    let status = engine.status_message();

    engine.goto_page(run.page);
    {
        let (rows, meta) = engine.current_page();
        println!();
        if rows.is_empty() {
            println!("No records match the current filter.");
        } else {
            print!("{}", output::render_text(&display_fields, rows));
        }
        println!();
        println!("{}", meta.to_string().bold());
    }
    format_kv_line("Filter", &format!("{field} = {label}"));
    println!("{status}");

    if run.export {
        if engine.can_export() {
            let filename = output::export_filename(Utc::now(), OutputFormat::Csv);
            let csv = output::render_csv(engine.catalog().fields(), engine.filtered());
            output::write_file(&filename, csv.as_bytes()).await?;
            info!(path = %filename, rows = engine.filtered_len(), "exported");
            format_kv_line("Exported", &filename);
        } else {
            println!("{}", "Nothing to export.".yellow());
        }
    }

    if let Some(path) = run.output.as_deref() {
        let rendered = output::render(
            run.output_format,
            engine.catalog().fields(),
            engine.filtered(),
        );
        output::write_file(path, &rendered).await?;
        format_kv_line("Written", path);
    }

    if let Some(name) = run.contact_list.as_deref() {
        let started_at = Instant::now();
        let sent = runner
            .create_contact_list(name, engine.filtered())
            .await
            .map_err(|e| e.to_string())?;
        println!(
            "{}",
            format!(
                "Contact list \"{}\" created with {} contact{} ({:.1}s).",
                name.trim(),
                sent,
                if sent == 1 { "" } else { "s" },
                started_at.elapsed().as_secs_f64()
            )
            .green()
        );
    }

    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp => {
                print!("{}", render_custom_help());
                return Ok(());
            }
            ErrorKind::DisplayVersion => {
                let cmd = CliArgs::command();
                print!("{}", cmd.render_version());
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    let user_config_path = args.config.as_deref().map(config::expand_tilde);
    if args.init_config {
        let path = user_config_path
            .or_else(config::default_config_path)
            .ok_or_else(|| "could not determine a config path, pass --config".to_string())?;
        if config::ensure_default_config_file(&path)? {
            println!("wrote default config to {}", path.display());
        } else {
            println!("config already exists at {}", path.display());
        }
        return Ok(());
    }

    let cfg = match user_config_path.as_ref() {
        Some(path) => config::load_config(path, false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;
    init_tracing(run.verbose);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}
