use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use luxmeters_core::cl200a::CctMethod;
use luxmeters_core::config::LuxConfig;
use luxmeters_core::error::LuxError;
use luxmeters_core::sensor::{Sensor, SensorModel};
use luxmeters_core::transport::list_ports;
use luxmeters_core::ut382::LuxReading;

mod output;

use output::{validate_strftime, TsvWriter, DEFAULT_STRFTIME};

#[derive(Parser)]
#[command(name = "luxmeters")]
#[command(about = "Read the Konica Minolta CL-200A and Uni-T UT382 light meters", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: <config dir>/luxmeters/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    List {
        /// Only ports whose USB manufacturer contains this
        #[arg(short, long)]
        manufacturer: Option<String>,
    },

    /// List supported sensors and what they measure
    Sensors,

    /// Query a CL-200A chroma meter
    Cl200a {
        /// What to measure
        #[arg(value_enum)]
        query: Query,

        /// Serial port (default: discover by manufacturer)
        #[arg(short, long)]
        port: Option<String>,

        /// Use a simulated meter
        #[arg(long)]
        demo: bool,

        /// Number of measurements
        #[arg(short, long, default_value_t = 1)]
        count: usize,

        /// Pause between measurements
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,

        /// CCT approximation
        #[arg(long, value_enum, default_value_t = Method::Mccamy)]
        method: Method,
    },

    /// Stream readings from a UT382 luxmeter as TSV
    Ut382 {
        /// Serial port (default: discover by manufacturer)
        #[arg(short, long)]
        port: Option<String>,

        /// Use a simulated meter
        #[arg(long)]
        demo: bool,

        /// Write TSV here instead of stdout ("-" is stdout)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Live samples, 8 per second
        #[arg(long)]
        monitor: bool,

        /// Only output data when the measurement changes
        #[arg(long)]
        delta: bool,

        /// Average together the last N seconds
        #[arg(long, value_name = "N")]
        moving_average: Option<u32>,

        /// Timestamp format
        #[arg(long, default_value = DEFAULT_STRFTIME)]
        strftime: String,

        /// Stop after this many rows
        #[arg(short, long)]
        count: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Query {
    /// Illuminance
    Lux,
    /// Tristimulus values
    Xyz,
    /// Illuminance, colour temperature and Δuv
    Ev,
    /// Correlated colour temperature from XYZ
    Cct,
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    Mccamy,
    Hernandez1999,
}

impl From<Method> for CctMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Mccamy => CctMethod::McCamy,
            Method::Hernandez1999 => CctMethod::Hernandez1999,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = LuxConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::List { manufacturer } => list(manufacturer.as_deref()),
        Commands::Sensors => sensors(),
        Commands::Cl200a {
            query,
            port,
            demo,
            count,
            interval_ms,
            method,
        } => cl200a(&config, query, port, demo, count, interval_ms, method.into()),
        Commands::Ut382 {
            port,
            demo,
            file,
            monitor,
            delta,
            moving_average,
            strftime,
            count,
        } => {
            let mut mode = Mode {
                monitor,
                delta,
                moving_average,
            };
            // No mode and no explicit port: monitor with delta and a 2 s average
            if !mode.any() && port.is_none() && !demo {
                mode = Mode {
                    monitor: true,
                    delta: true,
                    moving_average: Some(2),
                };
            }
            ut382(&config, port, demo, file, mode, &strftime, count)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn list(manufacturer: Option<&str>) -> Result<()> {
    let ports = list_ports();
    let mut shown = 0;
    for port in ports
        .iter()
        .filter(|p| manufacturer.map_or(true, |m| p.manufactured_by(m)))
    {
        println!(
            "{}\t{}\t{}",
            port.name,
            port.manufacturer.as_deref().unwrap_or("-"),
            port.product.as_deref().unwrap_or("-")
        );
        shown += 1;
    }
    if shown == 0 {
        println!("No serial ports found.");
    }
    Ok(())
}

fn sensors() -> Result<()> {
    for model in SensorModel::ALL {
        let capabilities: Vec<String> = model.capabilities().iter().map(|c| c.to_string()).collect();
        println!("{}\t{}\t{}", model.name(), model.label(), capabilities.join(","));
    }
    Ok(())
}

fn open_sensor(
    model: SensorModel,
    config: &LuxConfig,
    port: Option<String>,
    demo: bool,
) -> Result<Sensor> {
    if demo {
        return Ok(Sensor::demo(model, config)?);
    }
    let mut config = config.clone();
    match model {
        SensorModel::Cl200a => config.cl200a.port = port.or(config.cl200a.port),
        SensorModel::Ut382 => config.ut382.port = port.or(config.ut382.port),
    }
    Sensor::open(model, &config).with_context(|| format!("Failed to open {}", model.label()))
}

fn cl200a(
    config: &LuxConfig,
    query: Query,
    port: Option<String>,
    demo: bool,
    count: usize,
    interval_ms: u64,
    method: CctMethod,
) -> Result<()> {
    let Sensor::Cl200a(mut meter) = open_sensor(SensorModel::Cl200a, config, port, demo)? else {
        bail!("expected a CL-200A");
    };

    let stdout = io::stdout();
    let mut out = TsvWriter::new(stdout.lock(), DEFAULT_STRFTIME, false);
    let header: &[&str] = match query {
        Query::Lux => &["time", "lux"],
        Query::Xyz => &["time", "X", "Y", "Z"],
        Query::Ev => &["time", "lux", "tcp", "delta_uv"],
        Query::Cct => &["time", "cct"],
    };
    out.header(header)?;

    for i in 0..count {
        if i > 0 && interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(interval_ms));
        }
        let values = match query {
            Query::Lux => meter.lux()?.map(|lux| vec![lux.to_string()]),
            Query::Xyz => meter
                .xyz()?
                .map(|xyz| vec![xyz.x.to_string(), xyz.y.to_string(), xyz.z.to_string()]),
            Query::Ev => meter.ev_tcp_delta_uv()?.map(|r| {
                vec![r.ev.to_string(), r.tcp.to_string(), r.delta_uv.to_string()]
            }),
            Query::Cct => meter.cct_with(method)?.map(|cct| vec![format!("{:.1}", cct)]),
        };
        match values {
            Some(values) => out.row(&Local::now(), &values)?,
            None => warn!("CL-200A sent no reading"),
        }
    }
    meter.close();
    Ok(())
}

/// Which stream to print
#[derive(Clone, Copy)]
struct Mode {
    monitor: bool,
    delta: bool,
    moving_average: Option<u32>,
}

impl Mode {
    fn any(&self) -> bool {
        self.monitor || self.delta || self.moving_average.is_some()
    }
}

fn ut382(
    config: &LuxConfig,
    port: Option<String>,
    demo: bool,
    file: Option<PathBuf>,
    mode: Mode,
    strftime: &str,
    count: Option<usize>,
) -> Result<()> {
    if let Err(e) = validate_strftime(strftime) {
        bail!(e);
    }

    let Sensor::Ut382(mut meter) = open_sensor(SensorModel::Ut382, config, port, demo)? else {
        bail!("expected a UT382");
    };

    let sink: Box<dyn Write> = match file {
        Some(path) if path.as_os_str() != "-" => Box::new(
            File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        _ => Box::new(io::stdout().lock()),
    };
    let mut out = TsvWriter::new(sink, strftime, mode.delta);
    out.header(&["time", "light", "unit"])?;

    let average = mode.moving_average.filter(|n| *n > 0);
    {
        let source: Box<dyn Iterator<Item = Result<LuxReading, LuxError>> + '_> = match average {
            Some(seconds) => Box::new(meter.live_average(f64::from(seconds))),
            None => Box::new(meter.live_monitor()),
        };

        let mut written = 0;
        for reading in source {
            let reading = reading.context("Lost connection to the UT382")?;
            if out.reading(&reading, average.is_some())? {
                written += 1;
            }
            if count.is_some_and(|limit| written >= limit) {
                break;
            }
        }
    }
    meter.close();
    Ok(())
}
