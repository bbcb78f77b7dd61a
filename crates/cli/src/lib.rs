//! polysi CLI -- audit, convert and generate transactional histories.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::{fs, io};

use clap::{Parser, Subcommand, ValueEnum};
use derive_more::From;
use polysi_core::history::raw::types::{Event, Session, Transaction};
use polysi_core::history::transform::{
    snapshot_isolation_to_serializable, TransformedKey, TransformedValue,
};
use polysi_core::history::HistoryError;
use polysi_core::{AuditOptions, Error, History, IsolationLevel, PruningMode, Reachability};
use polysi_parser::{parse_dbcop, parse_history, LoadError};

/// Environment variable overriding the default pruning round budget.
pub const PRUNING_ROUNDS_ENV: &str = "POLYSI_PRUNING_ROUNDS";

#[derive(Debug, Parser)]
#[command(
    name = "polysi",
    about = "Snapshot isolation and serializability auditing for transactional histories"
)]
pub struct App {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check a history against an isolation level
    Audit(AuditArgs),
    /// Convert a history between formats, optionally reducing SI to SER
    Convert(ConvertArgs),
    /// Print history statistics
    Stat(InputArgs),
    /// Print a history in the text format
    Dump(InputArgs),
    /// Generate random transactional histories
    Generate(GenerateArgs),
    /// Print the JSON Schema for the JSON history format to stdout
    Schema,
}

#[derive(Debug, Parser)]
pub struct InputArgs {
    /// History file
    pub path: PathBuf,
    /// Input format; guessed from the extension when omitted
    #[arg(long)]
    pub format: Option<Format>,
}

#[derive(Debug, Parser)]
pub struct AuditArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Isolation level to check
    #[arg(long, default_value = "si")]
    pub level: Level,
    /// Pruning strategy
    #[arg(long, default_value = "iterative")]
    pub pruning: Pruning,
    /// Reachability algorithm used for closures
    #[arg(long, default_value = "dense")]
    pub reachability: ReachabilityArg,
    /// Pruning round budget
    #[arg(long, env = PRUNING_ROUNDS_ENV)]
    pub max_rounds: Option<usize>,
    /// Output the verdict as one JSON object
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ConvertArgs {
    /// Input history
    pub input: PathBuf,
    /// Output file
    pub output: PathBuf,
    /// Input format; guessed from the extension when omitted
    #[arg(long)]
    pub from: Option<Format>,
    /// Output format; guessed from the extension when omitted
    #[arg(long)]
    pub to: Option<Format>,
    #[arg(long, default_value = "identity")]
    pub transform: Transform,
}

#[derive(Debug, Parser)]
pub struct GenerateArgs {
    /// Number of histories to generate
    #[arg(long)]
    pub n_hist: u64,
    /// Number of nodes (sessions)
    #[arg(long)]
    pub n_node: u64,
    /// Number of variables
    #[arg(long)]
    pub n_var: u64,
    /// Number of transactions per node
    #[arg(long)]
    pub n_txn: u64,
    /// Number of events per transaction
    #[arg(long)]
    pub n_evt: u64,
    /// How many commits back a snapshot may lag; 0 generates serial histories
    #[arg(long, default_value_t = 0)]
    pub staleness: u64,
    /// Output directory for generated history files
    #[arg(long)]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Compact text format
    Text,
    /// DBCop binary log
    Dbcop,
    /// JSON sessions, bare or inside a generated-history envelope
    Json,
}

impl Format {
    /// Guesses the format of `path` from its extension.
    #[must_use]
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::Json,
            Some("log" | "bin" | "dbcop") => Self::Dbcop,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Level {
    Si,
    Ser,
}

impl From<Level> for IsolationLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Si => Self::SnapshotIsolation,
            Level::Ser => Self::Serializable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Pruning {
    Iterative,
    PreprocessOnly,
}

impl From<Pruning> for PruningMode {
    fn from(pruning: Pruning) -> Self {
        match pruning {
            Pruning::Iterative => Self::Iterative,
            Pruning::PreprocessOnly => Self::PreprocessOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReachabilityArg {
    Dense,
    Sparse,
}

impl From<ReachabilityArg> for Reachability {
    fn from(reachability: ReachabilityArg) -> Self {
        match reachability {
            ReachabilityArg::Dense => Self::Dense,
            ReachabilityArg::Sparse => Self::Sparse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transform {
    Identity,
    /// Reduce snapshot isolation checking to serializability checking
    Si2ser,
}

/// Failures that are not verdicts.
#[derive(Debug, From)]
pub enum CliError {
    Io(io::Error),
    Load(LoadError<String, u64>),
    Json(serde_json::Error),
    History(HistoryError<String, u64>),
    #[from(ignore)]
    Usage(String),
    /// The solver failed; no verdict was reached.
    #[from(ignore)]
    Oracle(String),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Load(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "invalid JSON history: {err}"),
            Self::History(err) => write!(f, "{err}"),
            Self::Usage(message) | Self::Oracle(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for CliError {}

/// Options of an audit run. The round budget comes from `--max-rounds`,
/// then [`PRUNING_ROUNDS_ENV`], then the built-in default.
#[must_use]
pub fn audit_options(args: &AuditArgs) -> AuditOptions {
    AuditOptions::builder()
        .level(args.level.into())
        .pruning(args.pruning.into())
        .reachability(args.reachability.into())
        .max_pruning_rounds(
            args.max_rounds
                .unwrap_or(polysi_core::consistency::DEFAULT_PRUNING_ROUNDS),
        )
        .build()
}

fn map_keys<K, F>(sessions: Vec<Session<K, u64>>, mut rename: F) -> Vec<Session<String, u64>>
where
    F: FnMut(K) -> String,
{
    sessions
        .into_iter()
        .map(|session| {
            session
                .into_iter()
                .map(|transaction| Transaction {
                    events: transaction
                        .events
                        .into_iter()
                        .map(|event| match event {
                            Event::Read { key, value } => Event::Read {
                                key: rename(key),
                                value,
                            },
                            Event::Write { key, value } => Event::Write {
                                key: rename(key),
                                value,
                            },
                        })
                        .collect(),
                    committed: transaction.committed,
                })
                .collect()
        })
        .collect()
}

/// Reads raw sessions from `path`. Keys of binary and JSON histories are
/// rendered as decimal strings.
///
/// # Errors
///
/// I/O, decoding and JSON errors.
pub fn load_sessions(path: &Path, format: Format) -> Result<Vec<Session<String, u64>>, CliError> {
    match format {
        Format::Text => {
            let input = fs::read_to_string(path)?;
            Ok(parse_history(&input).map_err(LoadError::<String, u64>::from)?)
        }
        Format::Dbcop => {
            let bytes = fs::read(path)?;
            let log = parse_dbcop::<String, u64>(&bytes)?;
            Ok(map_keys(log.sessions, |key| key.to_string()))
        }
        Format::Json => {
            let input = fs::read_to_string(path)?;
            let sessions = match serde_json::from_str::<polysi_testgen::generator::History>(&input) {
                Ok(envelope) => envelope.into_data(),
                Err(_) => serde_json::from_str::<Vec<Session<u64, u64>>>(&input)?,
            };
            Ok(map_keys(sessions, |key| key.to_string()))
        }
    }
}

/// Numeric keys for the binary and JSON formats. Keys that are all decimal
/// keep their value; otherwise keys are numbered by first appearance.
#[must_use]
pub fn numeric_sessions(sessions: &[Session<String, u64>]) -> Vec<Session<u64, u64>> {
    let keys = || {
        sessions
            .iter()
            .flatten()
            .flat_map(|transaction| &transaction.events)
            .map(Event::key)
    };
    let numeric = keys().all(|key| key.parse::<u64>().is_ok());
    let mut numbering: HashMap<&str, u64> = HashMap::new();
    for key in keys() {
        let next = numbering.len() as u64;
        numbering.entry(key.as_str()).or_insert(next);
    }
    let number = |key: &String| {
        if numeric {
            key.parse().unwrap_or_default()
        } else {
            numbering.get(key.as_str()).copied().unwrap_or_default()
        }
    };

    sessions
        .iter()
        .map(|session| {
            session
                .iter()
                .map(|transaction| Transaction {
                    events: transaction
                        .events
                        .iter()
                        .map(|event| match event {
                            Event::Read { key, value } => Event::Read {
                                key: number(key),
                                value: *value,
                            },
                            Event::Write { key, value } => Event::Write {
                                key: number(key),
                                value: *value,
                            },
                        })
                        .collect(),
                    committed: transaction.committed,
                })
                .collect()
        })
        .collect()
}

/// Raw sessions of `history`. The init transaction is left out and reads
/// of its writes become initial-value reads.
#[must_use]
pub fn raw_sessions<Key, Value>(history: &History<Key, Value>) -> Vec<Session<Key, Value>>
where
    Key: Eq + Hash + Clone,
    Value: Eq + Hash + Clone,
{
    history
        .sessions()
        .iter()
        .map(|session| {
            session
                .transactions
                .iter()
                .map(|transaction| Transaction {
                    events: transaction
                        .events
                        .iter()
                        .map(|event| {
                            if event.is_write() {
                                Event::write(event.key.clone(), event.value.clone())
                            } else if history
                                .writer_of(&event.key, &event.value)
                                .is_some_and(|writer| writer.transaction.is_init())
                            {
                                Event::read_initial(event.key.clone())
                            } else {
                                Event::read(event.key.clone(), event.value.clone())
                            }
                        })
                        .collect(),
                    committed: transaction.is_committed(),
                })
                .collect()
        })
        .collect()
}

/// Sessions whose serializability decides whether `sessions` are snapshot
/// isolated. Conflict keys are named `_c<n>`.
///
/// # Errors
///
/// - [`CliError::History`] when the sessions do not form a history;
/// - [`CliError::Usage`] when an input key could clash with a conflict key,
///   or the transformation fails.
pub fn si_to_ser(sessions: &[Session<String, u64>]) -> Result<Vec<Session<String, u64>>, CliError> {
    if let Some(key) = sessions
        .iter()
        .flatten()
        .flat_map(|transaction| &transaction.events)
        .map(Event::key)
        .find(|key| key.starts_with("_c"))
    {
        return Err(CliError::Usage(format!(
            "key {key:?} is reserved for generated conflict keys"
        )));
    }

    let history = History::try_from(sessions)?;
    let transformed = snapshot_isolation_to_serializable(&history)
        .map_err(|err| CliError::Usage(format!("cannot transform history: {err}")))?;
    let raw = raw_sessions(&transformed);
    Ok(raw
        .into_iter()
        .map(|session| {
            session
                .into_iter()
                .map(|transaction| Transaction {
                    events: transaction
                        .events
                        .into_iter()
                        .map(|event| {
                            let key = |key: TransformedKey<String>| match key {
                                TransformedKey::Original(key) => key,
                                conflict @ TransformedKey::Conflict(_) => conflict.to_string(),
                            };
                            let value = |value: TransformedValue<u64>| match value {
                                TransformedValue::Original(value)
                                | TransformedValue::Generated(value) => value,
                            };
                            match event {
                                Event::Read { key: k, value: v } => Event::Read {
                                    key: key(k),
                                    value: v.map(value),
                                },
                                Event::Write { key: k, value: v } => Event::Write {
                                    key: key(k),
                                    value: value(v),
                                },
                            }
                        })
                        .collect(),
                    committed: transaction.committed,
                })
                .collect()
        })
        .collect())
}

/// Shape of a history as printed by `polysi stat`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryStats {
    pub sessions: usize,
    pub transactions: usize,
    pub read_only: usize,
    pub write_only: usize,
    pub events: usize,
    pub reads: usize,
    pub writes: usize,
    pub keys: usize,
    /// writes per key -> number of keys written that often
    pub writes_per_key: BTreeMap<usize, usize>,
}

impl HistoryStats {
    #[must_use]
    pub fn from_sessions<Key: Ord, Value>(sessions: &[Session<Key, Value>]) -> Self {
        let mut stats = Self {
            sessions: sessions.len(),
            ..Self::default()
        };
        let mut keys = BTreeSet::new();
        let mut writes: BTreeMap<&Key, usize> = BTreeMap::new();
        for transaction in sessions.iter().flatten() {
            stats.transactions += 1;
            let n_writes = transaction.events.iter().filter(|e| e.is_write()).count();
            let n_reads = transaction.events.len() - n_writes;
            if n_writes == 0 {
                stats.read_only += 1;
            } else if n_reads == 0 {
                stats.write_only += 1;
            }
            stats.reads += n_reads;
            stats.writes += n_writes;
            for event in &transaction.events {
                keys.insert(event.key());
                if event.is_write() {
                    *writes.entry(event.key()).or_default() += 1;
                }
            }
        }
        stats.events = stats.reads + stats.writes;
        stats.keys = keys.len();
        for count in writes.into_values() {
            *stats.writes_per_key.entry(count).or_default() += 1;
        }
        stats
    }
}

impl Display for HistoryStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "sessions:     {}", self.sessions)?;
        writeln!(
            f,
            "transactions: {} ({} read-only, {} write-only)",
            self.transactions, self.read_only, self.write_only
        )?;
        writeln!(
            f,
            "events:       {} ({} reads, {} writes)",
            self.events, self.reads, self.writes
        )?;
        writeln!(f, "keys:         {}", self.keys)?;
        writeln!(f, "writes per key:")?;
        for (writes, keys) in &self.writes_per_key {
            writeln!(f, "  {writes:>4}: {keys}")?;
        }
        Ok(())
    }
}

/// Human-readable diagnostic for a rejected history, listing the events of
/// every implicated transaction.
#[must_use]
pub fn describe_rejection(history: &History<String, u64>, err: &Error<String, u64>) -> String {
    let mut out = format!("{err}\n");
    let implicated = match err {
        Error::Cycle { a, b, .. } => BTreeSet::from([*a, *b]),
        Error::Unsatisfiable { conflicts, .. } => {
            out.push_str(&conflicts.to_string());
            conflicts.transactions()
        }
        Error::History(_) | Error::Malformed(_) | Error::Oracle(_) => BTreeSet::new(),
    };
    if !implicated.is_empty() {
        out.push_str("transactions:\n");
        for transaction in implicated
            .into_iter()
            .filter_map(|id| history.transaction(id))
        {
            out.push_str(&format!("  {transaction}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use polysi_core::TransactionId;

    use super::*;

    fn sessions(input: &str) -> Vec<Session<String, u64>> {
        parse_history(input).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        App::command().debug_assert();
    }

    #[test]
    fn test_audit_flags() {
        let app = App::parse_from([
            "polysi",
            "audit",
            "h.log",
            "--level",
            "ser",
            "--pruning",
            "preprocess-only",
            "--reachability",
            "sparse",
            "--max-rounds",
            "7",
        ]);
        let Command::Audit(args) = app.command else {
            panic!("expected the audit command");
        };
        assert_eq!(args.input.format, None);
        assert_eq!(Format::detect(&args.input.path), Format::Dbcop);

        let options = audit_options(&args);
        assert_eq!(options.level, IsolationLevel::Serializable);
        assert_eq!(options.pruning, PruningMode::PreprocessOnly);
        assert_eq!(options.reachability, Reachability::Sparse);
        assert_eq!(options.max_pruning_rounds, 7);
        assert!(App::try_parse_from(["polysi", "audit", "h.log", "--max-rounds", "many"]).is_err());
    }

    #[test]
    fn test_max_rounds_reads_the_environment() {
        let command = App::command();
        let audit = command.find_subcommand("audit").unwrap();
        let max_rounds = audit
            .get_arguments()
            .find(|arg| arg.get_id() == "max_rounds")
            .unwrap();
        assert_eq!(
            max_rounds.get_env(),
            Some(std::ffi::OsStr::new(PRUNING_ROUNDS_ENV))
        );
    }

    #[test]
    fn test_audit_defaults() {
        let app = App::parse_from(["polysi", "audit", "h.hist", "--max-rounds", "3"]);
        let Command::Audit(args) = app.command else {
            panic!("expected the audit command");
        };
        let options = audit_options(&args);
        assert_eq!(options.max_pruning_rounds, 3);
        assert_eq!(options.level, IsolationLevel::SnapshotIsolation);
        assert_eq!(options.pruning, PruningMode::Iterative);
        assert_eq!(options.reachability, Reachability::Dense);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(Format::detect(Path::new("a/b.json")), Format::Json);
        assert_eq!(Format::detect(Path::new("history.log")), Format::Dbcop);
        assert_eq!(Format::detect(Path::new("history.hist")), Format::Text);
        assert_eq!(Format::detect(Path::new("history")), Format::Text);
    }

    #[test]
    fn test_stats() {
        let stats = HistoryStats::from_sessions(&sessions(
            "[x:=1 y:=1]\n[x==1]\n---\n[x==1 x:=2]\n[y==?]\n",
        ));
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.transactions, 4);
        assert_eq!(stats.read_only, 2);
        assert_eq!(stats.write_only, 1);
        assert_eq!((stats.events, stats.reads, stats.writes), (6, 3, 3));
        assert_eq!(stats.keys, 2);
        assert_eq!(stats.writes_per_key, BTreeMap::from([(1, 1), (2, 1)]));
        assert!(stats.to_string().contains("(3 reads, 3 writes)"));
    }

    #[test]
    fn test_numeric_keys() {
        let numbered = numeric_sessions(&sessions("[y:=1 x:=1]\n---\n[x==1]\n"));
        assert_eq!(numbered[0][0].events, vec![Event::write(0, 1), Event::write(1, 1)]);
        assert_eq!(numbered[1][0].events, vec![Event::read(1, 1)]);

        let kept = numeric_sessions(&sessions("[7:=1]\n[7==1 3==?]\n"));
        assert_eq!(kept[0][1].events, vec![Event::read(7, 1), Event::read_initial(3)]);
    }

    #[test]
    fn test_raw_sessions_restore_initial_reads() {
        let input = sessions("[x:=1 y==?]\n---\n[x==1]!\n");
        let history = History::try_from(input.as_slice()).unwrap();
        assert_eq!(raw_sessions(&history), input);
    }

    #[test]
    fn test_si_to_ser_splits_transactions() {
        let input = sessions("[x==? x:=1]\n---\n[x==? x:=2]\n");
        let output = si_to_ser(&input).unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].len(), 2);
        assert!(output[0][0].events.contains(&Event::read_initial("x".to_owned())));
        assert!(output[0][1].events.contains(&Event::write("x".to_owned(), 1)));
        assert!(output
            .iter()
            .flatten()
            .flat_map(|transaction| &transaction.events)
            .any(|event| event.key().starts_with("_c")));
        assert!(History::try_from(output.as_slice()).is_ok());

        assert!(matches!(
            si_to_ser(&sessions("[_c0:=1]\n")),
            Err(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_describe_cycle() {
        let input = sessions("[x:=1]\n[x==?]\n");
        let history = History::try_from(input.as_slice()).unwrap();
        let err = Error::Cycle {
            level: IsolationLevel::SnapshotIsolation,
            a: TransactionId::new(1, 0),
            b: TransactionId::new(1, 1),
        };
        let text = describe_rejection(&history, &err);
        assert!(text.starts_with("known edges violate snapshot isolation"));
        assert!(text.contains("  T(1:0) [w(x, 1)]\n"));
        assert!(text.contains("  T(1:1) [r(x, 0)]\n"));
    }
}
