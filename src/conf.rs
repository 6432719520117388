/*!
A parser for an INI file with the following structure:

```ini
[Datapath]
; the datapath id, hex or decimal
dpid=0x1
tables=4
; period of the timeout sweep
sweep_millis=1000

; one optional section per table
[Table0]
miss=controller
max_entries=1024
```

Every section and key is optional.
*/

use pipeline::{MissPolicy, PipelineConfig, OFPTT_MAX};

use ini::ini;
use ini::Ini;

use std::convert::From;
use std::error;
use std::fmt;
use std::io;
use std::num::ParseIntError;
use std::time::Duration;

const DATAPATH_SECTION: &str = "Datapath";
const DPID_KEY: &str = "dpid";
const TABLES_KEY: &str = "tables";
const SWEEP_KEY: &str = "sweep_millis";

const TABLE_SECTION_PREFIX: &str = "Table";
const MISS_KEY: &str = "miss";
const MAX_ENTRIES_KEY: &str = "max_entries";

const DEFAULT_DPID: u64 = 1;
const DEFAULT_SWEEP_MILLIS: u64 = 1000;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Ini(ini::Error),
    ParseNumber(&'static str, ParseIntError),
    InvalidTableCount(usize),
    InvalidSweepPeriod,
    InvalidMissPolicy(String),
    UnknownTable(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "{}", e),
            Error::Ini(ref e) => write!(f, "{}", e),
            Error::ParseNumber(k, ref e) => {
                write!(f, "Error on trying to parse the '{}' value: {}", k, e)
            }
            Error::InvalidTableCount(n) => write!(
                f,
                "A datapath has between 1 and {} tables, not {}",
                OFPTT_MAX as usize + 1,
                n
            ),
            Error::InvalidSweepPeriod => write!(f, "The sweep period must not be 0"),
            Error::InvalidMissPolicy(ref p) => {
                write!(f, "Table miss policy {} is neither drop nor controller", p)
            }
            Error::UnknownTable(ref s) => {
                write!(f, "The INI [{}] section names a table that does not exist", s)
            }
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(ioe) => ioe,
            _ => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}
impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
impl From<ini::Error> for Error {
    fn from(e: ini::Error) -> Self {
        Error::Ini(e)
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "INI configuration parser error"
    }
}

trait Section {
    type S;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error>;
}

/// Parses decimal or `0x` prefixed hexadecimal numbers
fn parse_number(key: &'static str, value: &str) -> Result<u64, Error> {
    let parsed = if value.starts_with("0x") || value.starts_with("0X") {
        u64::from_str_radix(&value[2..], 16)
    }
    else {
        value.parse()
    };
    parsed.map_err(|e| Error::ParseNumber(key, e))
}

fn parse_miss_policy(value: &str) -> Result<MissPolicy, Error> {
    match value {
        "drop" => Ok(MissPolicy::Drop),
        "controller" => Ok(MissPolicy::Controller),
        _ => Err(Error::InvalidMissPolicy(value.to_owned())),
    }
}

/// The switch level settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatapathConf {
    pub dpid: u64,
    pub tables: usize,
    /// Period of the timeout sweep
    pub sweep_period: Duration,
}

impl Default for DatapathConf {
    fn default() -> Self {
        DatapathConf {
            dpid: DEFAULT_DPID,
            tables: 1,
            sweep_period: Duration::from_millis(DEFAULT_SWEEP_MILLIS),
        }
    }
}

impl Section for DatapathConf {
    type S = DatapathConf;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", DATAPATH_SECTION);

        let mut dp = DatapathConf::default();
        if let Some(section) = conf.section(Some(DATAPATH_SECTION.to_owned())) {
            if let Some(dpid) = section.get(DPID_KEY) {
                dp.dpid = parse_number(DPID_KEY, dpid)?;
            }
            if let Some(tables) = section.get(TABLES_KEY) {
                dp.tables = parse_number(TABLES_KEY, tables)? as usize;
            }
            if let Some(millis) = section.get(SWEEP_KEY) {
                dp.sweep_period = Duration::from_millis(parse_number(SWEEP_KEY, millis)?);
            }
        }

        if dp.tables == 0 || dp.tables > OFPTT_MAX as usize + 1 {
            return Err(Error::InvalidTableCount(dp.tables));
        }
        if dp.sweep_period == Duration::from_millis(0) {
            return Err(Error::InvalidSweepPeriod);
        }

        debug!("Got {:?}", dp);
        Ok(dp)
    }
}

/// Reads the `[TableN]` sections of a pipeline with `n_tables` tables
fn pipeline_from_ini(conf: &Ini, n_tables: usize) -> Result<PipelineConfig, Error> {
    let mut pipeline = PipelineConfig::with_tables(n_tables);

    for (name, section) in conf.iter() {
        let name = match *name {
            Some(ref name) if name.starts_with(TABLE_SECTION_PREFIX) => name,
            _ => continue,
        };
        debug!("Reading [{}] section", name);

        let id: usize = name[TABLE_SECTION_PREFIX.len()..]
            .parse()
            .map_err(|_| Error::UnknownTable(name.to_owned()))?;
        let table = pipeline
            .tables
            .get_mut(id)
            .ok_or_else(|| Error::UnknownTable(name.to_owned()))?;

        if let Some(miss) = section.get(MISS_KEY) {
            table.miss_policy = parse_miss_policy(miss)?;
        }
        if let Some(max) = section.get(MAX_ENTRIES_KEY) {
            table.max_entries = parse_number(MAX_ENTRIES_KEY, max)? as usize;
        }
        debug!("Got {:?}", table);
    }

    Ok(pipeline)
}

/// Everything needed to bring up a datapath
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conf {
    pub datapath: DatapathConf,
    pub pipeline: PipelineConfig,
}

impl Default for Conf {
    fn default() -> Self {
        Conf {
            datapath: DatapathConf::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Conf {
    fn from_ini(conf: &Ini) -> Result<Conf, Error> {
        let datapath = DatapathConf::from_ini(conf)?;
        let pipeline = pipeline_from_ini(conf, datapath.tables)?;
        Ok(Conf { datapath, pipeline })
    }
}

pub fn parse_file(path: &str) -> Result<Conf, Error> {
    info!("Reading INI file {}", path);

    let conf = Ini::load_from_file(path)?;
    Conf::from_ini(&conf)
}

pub fn parse_str(content: &str) -> Result<Conf, Error> {
    let conf = Ini::load_from_str(content).map_err(ini::Error::Parse)?;
    Conf::from_ini(&conf)
}
