use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Local};
use polysi_core::history::raw::types::{Event, Session, Transaction};
use rand::distr::{Distribution, Uniform};
use rand::RngExt;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
pub struct HistParams {
    pub id: u64,
    pub n_node: u64,
    pub n_variable: u64,
    pub n_transaction: u64,
    pub n_event: u64,
    /// How many commits back a transaction may take its snapshot from.
    /// Zero generates serial executions.
    #[builder(default)]
    #[serde(default)]
    pub staleness: u64,
}

/// A generated history with its parameters and generation time, as stored
/// in JSON files.
#[derive(Deserialize, Serialize, Debug)]
pub struct History {
    params: HistParams,
    info: String,
    start: DateTime<Local>,
    end: DateTime<Local>,
    data: Vec<Session<u64, u64>>,
}

impl History {
    #[must_use]
    pub const fn new(
        params: HistParams,
        info: String,
        start: DateTime<Local>,
        end: DateTime<Local>,
        data: Vec<Session<u64, u64>>,
    ) -> Self {
        Self {
            params,
            info,
            start,
            end,
            data,
        }
    }

    #[must_use]
    pub const fn get_id(&self) -> u64 {
        self.params.id
    }

    #[must_use]
    pub const fn get_data(&self) -> &Vec<Session<u64, u64>> {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> Vec<Session<u64, u64>> {
        self.data
    }

    #[must_use]
    pub const fn get_params(&self) -> &HistParams {
        &self.params
    }

    #[must_use]
    pub fn get_info(&self) -> &str {
        &self.info
    }

    #[must_use]
    pub fn get_duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Committed state after each commit. Variables missing from a state still
/// hold their initial value.
struct Snapshots {
    states: Vec<HashMap<u64, u64>>,
}

impl Snapshots {
    fn new() -> Self {
        Self {
            states: vec![HashMap::new()],
        }
    }

    fn latest(&self) -> &HashMap<u64, u64> {
        &self.states[self.states.len() - 1]
    }

    /// One of the last `staleness + 1` committed states.
    fn pick<R: RngExt>(&self, staleness: u64, rng: &mut R) -> HashMap<u64, u64> {
        let newest = self.states.len() - 1;
        let back = usize::try_from(staleness).unwrap_or(usize::MAX).min(newest);
        let offset = if back == 0 {
            0
        } else {
            rng.random_range(0..=back)
        };
        self.states[newest - offset].clone()
    }

    fn commit(&mut self, writes: &HashMap<u64, u64>) {
        let mut state = self.latest().clone();
        state.extend(writes.iter().map(|(&k, &v)| (k, v)));
        self.states.push(state);
    }
}

/// Generate a single history with `n_node` sessions, each containing
/// `n_transaction` transactions of `n_event` events over `n_variable` variables.
///
/// Sessions are interleaved at random, and every transaction runs against
/// one of the last `staleness + 1` committed states. A transaction reads a
/// variable at most once and sees its own earlier write of it; reads of a
/// never-written variable observe the initial value (`x==?`).
///
/// With `staleness == 0` the result is a serial execution, so it satisfies
/// both serializability and snapshot isolation. Larger values produce
/// stale reads and lost updates, violating either.
///
/// Written values are unique per variable and start at 1. All generated
/// transactions are committed.
///
/// # Panics
///
/// Panics if `n_variable` is zero (cannot create a uniform distribution over
/// an empty range).
#[must_use]
pub fn generate_single_history(
    n_node: u64,
    n_variable: u64,
    n_transaction: u64,
    n_event: u64,
    staleness: u64,
) -> Vec<Session<u64, u64>> {
    let mut counters: HashMap<u64, u64> = HashMap::new();
    let mut snapshots = Snapshots::new();
    let mut random_generator = rand::rng();
    let variable_range = Uniform::new(0, n_variable).unwrap();

    let mut sessions: Vec<Session<u64, u64>> = (0..n_node).map(|_| Vec::new()).collect();
    let mut pending: Vec<usize> = (0..sessions.len())
        .flat_map(|session| (0..n_transaction).map(move |_| session))
        .collect();

    while !pending.is_empty() {
        let pick = random_generator.random_range(0..pending.len());
        let session = pending.swap_remove(pick);

        let snapshot = snapshots.pick(staleness, &mut random_generator);
        let mut read_vars: HashSet<u64> = HashSet::new();
        let mut local: HashMap<u64, u64> = HashMap::new();
        let events = (0..n_event)
            .map(|_| {
                let variable = variable_range.sample(&mut random_generator);
                let want_read = random_generator.random::<bool>();
                if want_read && read_vars.insert(variable) {
                    match local.get(&variable).or_else(|| snapshot.get(&variable)) {
                        Some(&version) => Event::read(variable, version),
                        None => Event::read_initial(variable),
                    }
                } else {
                    let version = {
                        let entry = counters.entry(variable).or_default();
                        *entry += 1;
                        *entry
                    };
                    local.insert(variable, version);
                    Event::write(variable, version)
                }
            })
            .collect();

        snapshots.commit(&local);
        sessions[session].push(Transaction::committed(events));
    }

    sessions
}

#[must_use]
pub fn generate_mult_histories(params: &HistParams, n_hist: u64) -> Vec<History> {
    (0..n_hist)
        .into_par_iter()
        .map(|i_hist| {
            let start_time = Local::now();
            let hist = generate_single_history(
                params.n_node,
                params.n_variable,
                params.n_transaction,
                params.n_event,
                params.staleness,
            );
            let end_time = Local::now();
            History {
                params: HistParams {
                    id: params.id + i_hist,
                    ..params.clone()
                },
                info: "generated".to_string(),
                start: start_time,
                end: end_time,
                data: hist,
            }
        })
        .collect()
}
