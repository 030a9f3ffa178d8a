mod app;
mod cli;
mod cli_ops;
mod config;
mod db;
mod dispatch;
mod domain;
mod engine;
mod imports;
mod locks;
mod logging;
mod persistence;
mod remote;
mod ui;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("error: could not render JSON: {err}"),
    }
}

fn run() -> Result<(), app::AppError> {
    use clap::Parser;
    use cli::Commands;

    let cli = cli::Cli::parse();
    let options = open_options(&cli)?;
    let config = config::Config::load(&options.root, &options.state_dir())?;
    logging::init(&config.log);
    tracing::debug!(
        root = %options.root.display(),
        class = %options.class_id,
        "opening class"
    );

    let mut app = app::App::open(&options, config)?;
    let json = cli.json;

    match cli.command {
        Commands::Activity(args) => dispatch::run_activity(&mut app, args.command, json)?,
        Commands::Lesson(args) => dispatch::run_lesson(&mut app, args.command, json)?,
        Commands::HalfTerm(args) => dispatch::run_half_term(&mut app, args.command, json)?,
        Commands::Unit(args) => dispatch::run_unit(&mut app, args.command, json)?,
        Commands::Plan(args) => dispatch::run_plan(&mut app, args.command, json)?,
        Commands::Import(args) => {
            let outcome = app.import_jsonl(&args.file, args.dry_run)?;
            if json {
                print_json(&outcome);
            } else {
                let summary = &outcome.value;
                println!(
                    "import {} status={} processed={} imported={} skipped={} errors={} \
                     inserted={} updated={}",
                    summary.source_ref,
                    summary.status,
                    summary.processed_count,
                    summary.imported_count,
                    summary.skipped_count,
                    summary.error_count,
                    summary.merge.inserted,
                    summary.merge.updated
                );
                if let Some(error) = summary.last_error.as_deref() {
                    println!("last error: {error}");
                }
                ui::print_saves(&outcome.saves);
            }
        }
        Commands::Status => {
            let report = app.status()?;
            if json {
                print_json(&report);
            } else {
                ui::print_status(&report);
            }
        }
        Commands::Sync(args) => {
            let reports = app.sync(args.all)?;
            if json {
                print_json(&reports);
            } else {
                ui::print_saves(&reports);
            }
            let failed = reports.iter().filter(|report| report.is_degraded()).count();
            if failed > 0 {
                return Err(app::AppError::InvalidArgument(format!(
                    "{failed} collection(s) could not reach the remote; they stay pending"
                )));
            }
        }
    }

    Ok(())
}

fn open_options(cli: &cli::Cli) -> Result<app::OpenOptions, app::AppError> {
    let class_id = cli
        .class_id
        .as_deref()
        .map(str::trim)
        .filter(|class| !class.is_empty())
        .ok_or_else(|| {
            app::AppError::InvalidArgument(
                "no class selected; pass --class or set CADENCE_CLASS".to_string(),
            )
        })?;
    let mut options = app::OpenOptions::new(&cli.root, class_id);
    options.db_path = cli.db.clone();
    options.remote_path = cli.remote.clone();
    Ok(options)
}
