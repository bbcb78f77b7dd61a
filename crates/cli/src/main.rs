use std::{fs, process};

use clap::Parser;
use polysi_cli::{
    audit_options, describe_rejection, load_sessions, numeric_sessions, si_to_ser, App,
    AuditArgs, CliError, Command, ConvertArgs, Format, GenerateArgs, HistoryStats, InputArgs,
    Transform,
};
use polysi_core::history::raw::display::format_history;
use polysi_core::history::raw::types::Session;
use polysi_core::{Error, History};
use polysi_parser::{write_dbcop, DbcopLog};
use polysi_testgen::generator::{generate_mult_histories, HistParams};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const ACCEPT: i32 = 0;
const REJECT: i32 = 1;
const FAILURE: i32 = 2;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = App::parse();
    let outcome = match &app.command {
        Command::Audit(args) => audit(args),
        Command::Convert(args) => convert(args).map(|()| ACCEPT),
        Command::Stat(args) => stat(args).map(|()| ACCEPT),
        Command::Dump(args) => dump(args).map(|()| ACCEPT),
        Command::Generate(args) => generate(args).map(|()| ACCEPT),
        Command::Schema => schema().map(|()| ACCEPT),
    };
    match outcome {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(FAILURE);
        }
    }
}

fn input(args: &InputArgs) -> Result<Vec<Session<String, u64>>, CliError> {
    let format = args.format.unwrap_or_else(|| Format::detect(&args.path));
    load_sessions(&args.path, format)
}

fn audit(args: &AuditArgs) -> Result<i32, CliError> {
    let options = audit_options(args);
    let sessions = input(&args.input)?;
    let path = args.input.path.display().to_string();
    info!(path = %path, ?options, "auditing history");

    let (history, result) = match History::try_from(sessions.as_slice()) {
        Ok(history) => {
            let result = polysi_sat::audit(&history, &options);
            (history, result)
        }
        Err(err) => (History::new(), Err(Error::History(err))),
    };

    if let Err(err) = &result {
        if !err.is_violation() {
            return Err(CliError::Oracle(err.to_string()));
        }
    }

    if args.json {
        let verdict = match &result {
            Ok(witness) => serde_json::json!({
                "file": path,
                "level": options.level,
                "accept": true,
                "witness": witness,
            }),
            Err(err) => serde_json::json!({
                "file": path,
                "level": options.level,
                "accept": false,
                "error": err,
            }),
        };
        println!("{}", serde_json::to_string(&verdict)?);
    } else {
        match &result {
            Ok(_) => println!("[[[[ ACCEPT ]]]]"),
            Err(err) => {
                println!("[[[[ REJECT ]]]]");
                print!("{}", describe_rejection(&history, err));
            }
        }
    }

    Ok(match result {
        Ok(_) => ACCEPT,
        Err(err) => {
            warn!(path = %path, %err, "history rejected");
            REJECT
        }
    })
}

fn convert(args: &ConvertArgs) -> Result<(), CliError> {
    let from = args.from.unwrap_or_else(|| Format::detect(&args.input));
    let to = args.to.unwrap_or_else(|| Format::detect(&args.output));
    let mut sessions = load_sessions(&args.input, from)?;
    if args.transform == Transform::Si2ser {
        sessions = si_to_ser(&sessions)?;
    }

    match to {
        Format::Text => fs::write(&args.output, format_history(&sessions))?,
        Format::Dbcop => {
            let info = format!("converted from {}", args.input.display());
            let log = DbcopLog::from_sessions(numeric_sessions(&sessions), &info);
            fs::write(&args.output, write_dbcop(&log))?;
        }
        Format::Json => {
            let file = fs::File::create(&args.output)?;
            serde_json::to_writer_pretty(file, &numeric_sessions(&sessions))?;
        }
    }
    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        ?to,
        "converted history"
    );
    Ok(())
}

fn stat(args: &InputArgs) -> Result<(), CliError> {
    let sessions = input(args)?;
    print!("{}", HistoryStats::from_sessions(&sessions));
    Ok(())
}

fn dump(args: &InputArgs) -> Result<(), CliError> {
    let sessions = input(args)?;
    print!("{}", format_history(&sessions));
    Ok(())
}

fn generate(args: &GenerateArgs) -> Result<(), CliError> {
    if args.n_var == 0 {
        return Err(CliError::Usage("--n-var must be at least 1".into()));
    }
    fs::create_dir_all(&args.output_dir)?;

    let params = HistParams::builder()
        .id(0)
        .n_node(args.n_node)
        .n_variable(args.n_var)
        .n_transaction(args.n_txn)
        .n_event(args.n_evt)
        .staleness(args.staleness)
        .build();
    let histories = generate_mult_histories(&params, args.n_hist);

    for history in &histories {
        let path = args.output_dir.join(format!("{}.json", history.get_id()));
        let file = fs::File::create(&path)?;
        serde_json::to_writer_pretty(file, history)?;
    }

    println!(
        "Generated {} histories to {}",
        histories.len(),
        args.output_dir.display()
    );
    Ok(())
}

fn schema() -> Result<(), CliError> {
    let schema = schemars::schema_for!(Vec<Session<u64, u64>>);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
