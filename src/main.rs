/*!
A software OpenFlow datapath reading its flow rules from a CSV file.

The datapath installs the rules, keeps them in sync with the file and
expires them on their timeouts. Packet descriptors are read from stdin,
one per line, and the actions the pipeline decides on are printed:

```sh
$ echo 'in_port=1,eth_type=0x800,ip_proto=6,tcp_dst=80;60' | ofdatapath -vv -c datapath.ini flows.csv
output=2
```
*/

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
extern crate ofdatapath;
extern crate simple_logger;

#[cfg(unix)]
extern crate log_panics;
#[cfg(unix)]
extern crate syslog;

use ofdatapath::conf;
use ofdatapath::flows_csv;
use ofdatapath::flows_csv::{CsvParser, FlowRecord};
use ofdatapath::pipeline::{DatapathRegistry, LogSink, Pipeline, TimeoutManager, Verdict};

use std::collections::HashSet;
use std::io;
use std::io::prelude::*;
use std::process::exit;
use std::sync::mpsc;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;

/// Brings the pipeline from the `old` rule set to the `new` one.
/// Vanished rules are deleted before new ones are added.
fn apply_records(pipeline: &Pipeline, old: &HashSet<FlowRecord>, new: &HashSet<FlowRecord>) {
    let (removed, added) = flows_csv::diff(old, new);
    info!("Applying flow rules: {} removed, {} added", removed.len(), added.len());
    for rec in removed {
        if let Err(e) = pipeline.submit_flow_mod(rec.table_id, rec.to_delete()) {
            warn!("Could not remove {:?}: {}", rec, e);
        }
    }
    for rec in added {
        if let Err(e) = pipeline.submit_flow_mod(rec.table_id, rec.to_add()) {
            warn!("Could not install {:?}: {}", rec, e);
        }
    }
}

/// Applies every rule set the file watcher sends.
fn follow_records(pipeline: &Pipeline, mut records: HashSet<FlowRecord>, rx: &Receiver<HashSet<FlowRecord>>) {
    for new in rx.iter() {
        apply_records(pipeline, &records, &new);
        records = new;
    }
}

fn format_verdict(verdict: &Verdict) -> String {
    let mut out = if verdict.actions.is_empty() {
        "drop".to_owned()
    }
    else {
        let actions: Vec<String> = verdict.actions.iter().map(|a| a.to_string()).collect();
        actions.join(",")
    };
    if let Some(miss) = verdict.miss {
        out.push_str(&format!(" (miss in table {})", miss.table_id));
    }
    out
}

fn init_logging(use_syslog: bool, log_lvl: log::Level) {
    #[cfg(unix)]
    {
        if use_syslog {
            let app_name = Some(crate_name!());
            syslog::init(syslog::Facility::LOG_USER, log_lvl.to_level_filter(), app_name)
                .expect("error on logging initialization");
            log_panics::init();
            return;
        }
    }
    #[cfg(not(unix))]
    let _ = use_syslog;
    simple_logger::init_with_level(log_lvl).expect("error on logging initialization");
}

/// Reads command line arguments and calls the corresponding functions.
fn handle_cli_args() -> io::Result<()> {
    #[cfg(unix)]
    let unix_opts = "-s, --syslog      'Logs via syslog'
        ";
    #[cfg(not(unix))]
    let unix_opts = "";

    let usage = &format!(
        "{}-v...          'Repeat to set the level of verbosity'
        -c, --conf <ini>  'The INI configuration file'
        <csv>             'The CSV file with flow rules'",
        unix_opts
    );
    let matches = app_from_crate!().args_from_usage(usage).get_matches();

    let log_lvl = match matches.occurrences_of("v") {
        0 => log::Level::Error,
        1 => log::Level::Warn,
        2 => log::Level::Info,
        3 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    init_logging(matches.is_present("syslog"), log_lvl);

    let csv_path = matches.value_of("csv").expect("required csv argument").to_string();
    let conf = match matches.value_of("conf") {
        Some(path) => conf::parse_file(path)?,
        None => conf::Conf::default(),
    };

    let registry = Arc::new(DatapathRegistry::new(Arc::new(LogSink)));
    let pipeline = registry.connect(conf.datapath.dpid, &conf.pipeline);

    // first file read that terminates the program on errors
    let csv_parser = CsvParser::new(csv_path);
    let records = csv_parser.parse_file()?;
    apply_records(&pipeline, &HashSet::new(), &records);

    let timeouts = TimeoutManager::spawn(registry.clone(), conf.datapath.sweep_period)?;
    info!(
        "Datapath {:016x}: {} table(s), sweeping timeouts every {:?}",
        pipeline.dpid(),
        pipeline.n_tables(),
        timeouts.period()
    );

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || csv_parser.watch_file(&tx));
    let follower = pipeline.clone();
    thread::spawn(move || follow_records(&follower, records, &rx));

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match flows_csv::parse_packet(line) {
            Ok(packet) => println!("{}", format_verdict(&pipeline.process(&packet))),
            Err(e) => warn!("Skipping packet: {}", e),
        }
    }

    timeouts.shutdown();
    registry.disconnect(conf.datapath.dpid);
    Ok(())
}

/// Entry function with top level error handling.
fn main() {
    if let Err(e) = handle_cli_args() {
        error!("{}", e);
        exit(1);
    }
}
